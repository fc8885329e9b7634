use std::io::{self, BufRead, Write};

use mnemo::{Config, Engine, MnemoResult, Reply};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Split a line into arguments. Whitespace separates, double quotes group
/// and `\"` inside quotes is a literal quote.
fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut in_quotes = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                in_token = true;
            }
            '\\' if in_quotes => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            c if c.is_whitespace() && !in_quotes => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                current.push(c);
                in_token = true;
            }
        }
    }
    if in_token {
        tokens.push(current);
    }
    tokens
}

fn print_result(out: &mut impl Write, result: MnemoResult<Reply>) -> io::Result<()> {
    match result {
        Ok(reply) => writeln!(out, "{reply}"),
        Err(e) => writeln!(out, "(error) {e}"),
    }
}

fn main() -> io::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let pipeline = args.iter().any(|a| a == "--pipeline");
    let config = Config::from_args(&args);

    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.loglevel)),
        )
        .init();

    let engine = Engine::new(config).map_err(io::Error::other)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut pipe = engine.pipeline();

    for line in io::stdin().lock().lines() {
        let tokens = tokenize(&line?);
        if tokens.is_empty() {
            continue;
        }
        if pipeline {
            pipe.push_args(&tokens[..]);
        } else {
            print_result(&mut out, engine.call(&tokens[..]))?;
        }
    }

    if pipeline {
        info!(commands = pipe.len(), "running pipeline");
        for result in pipe.execute() {
            print_result(&mut out, result)?;
        }
    }
    out.flush()?;
    engine.shutdown();
    Ok(())
}
