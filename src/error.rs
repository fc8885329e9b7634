#[derive(Debug, thiserror::Error)]
pub enum MnemoError {
    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    TypeMismatch,

    #[error("ERR value is not an integer or out of range")]
    NotAnInteger,

    #[error("ERR value is not a valid float")]
    NotAFloat,

    #[error("ERR increment or decrement would overflow")]
    Overflow,

    #[error("ERR resulting score is not a number (NaN)")]
    NanScore,

    #[error("ERR no such key")]
    KeyNotFound,

    #[error("ERR syntax error")]
    SyntaxError,

    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArgCount(String),

    #[error("ERR unknown command '{0}'")]
    UnknownCommand(String),

    #[error("ERR invalid expire time in '{0}' command")]
    InvalidExpireTime(String),

    #[error("ERR {0}")]
    Generic(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl MnemoError {
    /// The leading error code a transport puts in front of the message.
    pub fn code(&self) -> &'static str {
        match self {
            MnemoError::TypeMismatch => "WRONGTYPE",
            _ => "ERR",
        }
    }
}

pub type MnemoResult<T> = Result<T, MnemoError>;
