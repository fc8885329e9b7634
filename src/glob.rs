/// Glob patterns used by SCAN MATCH, CONFIG GET and PSUBSCRIBE.
/// Supports: * (any sequence), ? (any single byte), [abc], [^abc], [a-z], \ (escape)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobPattern {
    tokens: Vec<Token>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(u8),
    AnyByte,
    AnySequence,
    Class { negated: bool, items: Vec<ClassItem> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClassItem {
    Byte(u8),
    Range(u8, u8),
}

impl GlobPattern {
    pub fn new(pattern: &[u8]) -> Self {
        let mut tokens = Vec::new();
        let mut i = 0;
        while i < pattern.len() {
            match pattern[i] {
                b'*' => {
                    // Consecutive stars behave like one.
                    if tokens.last() != Some(&Token::AnySequence) {
                        tokens.push(Token::AnySequence);
                    }
                    i += 1;
                }
                b'?' => {
                    tokens.push(Token::AnyByte);
                    i += 1;
                }
                b'\\' if i + 1 < pattern.len() => {
                    tokens.push(Token::Literal(pattern[i + 1]));
                    i += 2;
                }
                b'[' => match parse_class(&pattern[i..]) {
                    Some((token, consumed)) => {
                        tokens.push(token);
                        i += consumed;
                    }
                    // An unterminated class is matched literally.
                    None => {
                        tokens.push(Token::Literal(b'['));
                        i += 1;
                    }
                },
                b => {
                    tokens.push(Token::Literal(b));
                    i += 1;
                }
            }
        }
        GlobPattern { tokens }
    }

    /// Whether the pattern is a single `*`, i.e. matches everything.
    pub fn is_match_all(&self) -> bool {
        self.tokens == [Token::AnySequence]
    }

    pub fn matches(&self, subject: &[u8]) -> bool {
        let mut ti = 0;
        let mut si = 0;
        // Last `*` seen and the subject position it is currently covering up to.
        let mut backtrack: Option<(usize, usize)> = None;

        while si < subject.len() {
            match self.tokens.get(ti) {
                Some(Token::AnySequence) => {
                    backtrack = Some((ti, si));
                    ti += 1;
                    continue;
                }
                Some(token) if token.accepts(subject[si]) => {
                    ti += 1;
                    si += 1;
                    continue;
                }
                _ => {}
            }
            match backtrack {
                Some((star, covered)) => {
                    ti = star + 1;
                    si = covered + 1;
                    backtrack = Some((star, covered + 1));
                }
                None => return false,
            }
        }

        self.tokens[ti..].iter().all(|t| *t == Token::AnySequence)
    }
}

impl Token {
    fn accepts(&self, b: u8) -> bool {
        match self {
            Token::Literal(l) => *l == b,
            Token::AnyByte => true,
            Token::AnySequence => true,
            Token::Class { negated, items } => {
                let hit = items.iter().any(|item| match *item {
                    ClassItem::Byte(c) => c == b,
                    ClassItem::Range(lo, hi) => lo <= b && b <= hi,
                });
                hit != *negated
            }
        }
    }
}

/// Parse a `[...]` class at the start of `pattern`.
/// Returns the token and the number of pattern bytes consumed.
fn parse_class(pattern: &[u8]) -> Option<(Token, usize)> {
    let mut i = 1;
    let negated = pattern.get(i) == Some(&b'^');
    if negated {
        i += 1;
    }

    let mut items = Vec::new();
    while i < pattern.len() && pattern[i] != b']' {
        let mut b = pattern[i];
        if b == b'\\' && i + 1 < pattern.len() {
            i += 1;
            b = pattern[i];
        }
        if i + 2 < pattern.len() && pattern[i + 1] == b'-' && pattern[i + 2] != b']' {
            let (lo, hi) = (b, pattern[i + 2]);
            items.push(ClassItem::Range(lo.min(hi), lo.max(hi)));
            i += 3;
        } else {
            items.push(ClassItem::Byte(b));
            i += 1;
        }
    }

    if i >= pattern.len() {
        return None;
    }
    Some((Token::Class { negated, items }, i + 1))
}

/// One-shot convenience over [`GlobPattern`].
pub fn glob_match(pattern: &[u8], subject: &[u8]) -> bool {
    GlobPattern::new(pattern).matches(subject)
}
