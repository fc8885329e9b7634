use std::fmt::Write;

use bytes::Bytes;
use tracing::info;

use super::{Command, Context, arg_to_string, expect_args};
use crate::config::PARAMETERS;
use crate::error::{MnemoError, MnemoResult};
use crate::glob::GlobPattern;
use crate::reply::Reply;

pub fn parse_ping(args: &[Bytes]) -> MnemoResult<Command> {
    match args {
        [] => Ok(Command::Ping { message: None }),
        [message] => Ok(Command::Ping { message: Some(message.clone()) }),
        _ => Err(MnemoError::WrongArgCount("ping".to_string())),
    }
}

pub fn parse_dbsize(args: &[Bytes]) -> MnemoResult<Command> {
    expect_args(args, 0, "dbsize")?;
    Ok(Command::DbSize)
}

pub fn parse_flushdb(args: &[Bytes]) -> MnemoResult<Command> {
    expect_args(args, 0, "flushdb")?;
    Ok(Command::FlushDb)
}

pub fn parse_info(args: &[Bytes]) -> MnemoResult<Command> {
    match args {
        [] => Ok(Command::Info { section: None }),
        [section] => Ok(Command::Info {
            section: Some(arg_to_string(section).to_lowercase()),
        }),
        _ => Err(MnemoError::SyntaxError),
    }
}

/// CONFIG GET pattern | CONFIG SET name value | CONFIG RESETSTAT
pub fn parse_config(args: &[Bytes]) -> MnemoResult<Command> {
    let Some((sub, rest)) = args.split_first() else {
        return Err(MnemoError::WrongArgCount("config".to_string()));
    };
    let sub = arg_to_string(sub).to_uppercase();
    match (sub.as_str(), rest) {
        ("GET", [pattern]) => Ok(Command::ConfigGet { pattern: pattern.clone() }),
        ("SET", [parameter, value]) => Ok(Command::ConfigSet {
            parameter: arg_to_string(parameter).to_lowercase(),
            value: arg_to_string(value),
        }),
        ("RESETSTAT", []) => Ok(Command::ConfigResetStat),
        ("GET", _) => Err(MnemoError::WrongArgCount("config|get".to_string())),
        ("SET", _) => Err(MnemoError::WrongArgCount("config|set".to_string())),
        _ => Err(MnemoError::Generic(format!(
            "unknown subcommand or wrong number of arguments for CONFIG {sub}"
        ))),
    }
}

pub fn ping(message: Option<Bytes>) -> Reply {
    match message {
        Some(m) => Reply::Bulk(m),
        None => Reply::status("PONG"),
    }
}

pub fn dbsize(ctx: Context<'_>) -> Reply {
    Reply::Integer(ctx.keyspace.len() as i64)
}

pub fn flushdb(ctx: Context<'_>) -> Reply {
    let removed = ctx.keyspace.flush();
    info!(removed, "keyspace flushed");
    Reply::Ok
}

/// INFO [section]. Sections: keyspace, stats, pubsub, commandstats. No
/// section (or `all`) renders every one of them.
pub fn info(ctx: Context<'_>, section: Option<&str>) -> Reply {
    let show_all = matches!(section, None | Some("all") | Some("everything") | Some("default"));
    let show = |name: &str| show_all || section == Some(name);

    let mut out = String::new();
    if show("keyspace") {
        out.push_str("# Keyspace\r\n");
        let keys = ctx.keyspace.len();
        if keys > 0 {
            let _ = write!(
                out,
                "db0:keys={keys},expires={}\r\n",
                ctx.keyspace.volatile_len()
            );
        }
        out.push_str("\r\n");
    }
    if show("stats") {
        let lazy = ctx.keyspace.lazy_expired();
        let active = ctx.keyspace.active_expired();
        out.push_str("# Stats\r\n");
        let _ = write!(
            out,
            "total_commands_processed:{}\r\nexpired_keys:{}\r\nexpired_keys_active:{active}\r\nexpired_keys_lazy:{lazy}\r\n\r\n",
            ctx.stats.total_calls(),
            lazy + active,
        );
    }
    if show("pubsub") {
        let broker = ctx.broker;
        out.push_str("# Pubsub\r\n");
        let _ = write!(
            out,
            "pubsub_channels:{}\r\npubsub_patterns:{}\r\npubsub_subscribers:{}\r\n\
             published_messages:{}\r\ndelivered_messages:{}\r\ndropped_messages:{}\r\n\r\n",
            broker.channels(None).len(),
            broker.numpat(),
            broker.subscriber_count(),
            broker.published(),
            broker.delivered(),
            broker.dropped(),
        );
    }
    if show("commandstats") {
        out.push_str(&ctx.stats.render());
    }
    Reply::Bulk(Bytes::from(out))
}

/// Matching parameters and their current values, in listing order.
pub fn config_get(ctx: Context<'_>, pattern: &[u8]) -> Reply {
    let pattern = GlobPattern::new(&pattern.to_ascii_lowercase());
    let config = ctx.config.read();
    Reply::Map(
        PARAMETERS
            .iter()
            .copied()
            .filter(|name| pattern.matches(name.as_bytes()))
            .filter_map(|name| {
                config
                    .get(name)
                    .map(|value| (Bytes::from_static(name.as_bytes()), Reply::bulk(value)))
            })
            .collect(),
    )
}

pub fn config_set(ctx: Context<'_>, parameter: &str, value: &str) -> MnemoResult<Reply> {
    ctx.config
        .write()
        .set(parameter, value)
        .map_err(MnemoError::Generic)?;
    info!(parameter, value, "configuration changed");
    Ok(Reply::Ok)
}

pub fn config_resetstat(ctx: Context<'_>) -> Reply {
    ctx.stats.reset();
    Reply::Ok
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::super::tests::Fixture;
    use super::*;

    fn info_text(f: &Fixture, line: &str) -> String {
        String::from_utf8(f.ok(line).as_bulk().unwrap().to_vec()).unwrap()
    }

    #[test]
    fn test_ping() {
        let f = Fixture::new();
        assert_eq!(f.ok("PING"), Reply::status("PONG"));
        assert_eq!(f.ok("PING hello"), Reply::bulk("hello"));
        assert!(f.run("PING a b").is_err());
    }

    #[test]
    fn test_dbsize_flushdb() {
        let f = Fixture::new();
        f.ok("SET a 1");
        f.ok("RPUSH b x");
        f.ok("SADD c m");
        assert_eq!(f.ok("DBSIZE"), Reply::Integer(3));
        assert_eq!(f.ok("FLUSHDB"), Reply::Ok);
        assert_eq!(f.ok("DBSIZE"), Reply::Integer(0));
        assert_eq!(f.ok("GET a"), Reply::Nil);
        f.ok("SET a 2");
        assert_eq!(f.ok("GET a"), Reply::bulk("2"));
    }

    #[test]
    fn test_info_sections() {
        let f = Fixture::new();
        f.ok("SET a 1 EX 100");
        f.ok("SET b 2");
        let keyspace = info_text(&f, "INFO keyspace");
        assert!(keyspace.starts_with("# Keyspace\r\n"));
        assert!(keyspace.contains("db0:keys=2,expires=1\r\n"));
        assert!(!keyspace.contains("# Stats"));

        let all = info_text(&f, "INFO");
        for header in ["# Keyspace", "# Stats", "# Pubsub", "# Commandstats"] {
            assert!(all.contains(header), "{header}");
        }
        assert!(info_text(&f, "INFO pubsub").contains("pubsub_channels:0\r\n"));
    }

    #[test]
    fn test_info_commandstats() {
        let f = Fixture::new();
        f.stats.record("get", Duration::from_micros(4), false);
        let text = info_text(&f, "INFO commandstats");
        assert!(text.contains("cmdstat_get:calls=1,usec=4,usec_per_call=4.00,failed=0\r\n"));
        assert_eq!(f.ok("CONFIG RESETSTAT"), Reply::Ok);
        assert!(!info_text(&f, "INFO commandstats").contains("cmdstat_get"));
    }

    #[test]
    fn test_config_get() {
        let f = Fixture::new();
        assert_eq!(
            f.ok("CONFIG GET hz"),
            Reply::Map(vec![(Bytes::from_static(b"hz"), Reply::bulk("10"))])
        );
        let pubsub = f.ok("CONFIG GET pubsub-*").into_map().unwrap();
        let names: Vec<Bytes> = pubsub.into_iter().map(|(k, _)| k).collect();
        assert_eq!(
            names,
            vec!["pubsub-queue-capacity", "pubsub-publish-timeout", "pubsub-overflow"]
        );
        assert_eq!(f.ok("CONFIG GET *").into_map().unwrap().len(), PARAMETERS.len());
        assert_eq!(f.ok("CONFIG GET nothing"), Reply::Map(Vec::new()));
    }

    #[test]
    fn test_config_set() {
        let f = Fixture::new();
        assert_eq!(f.ok("CONFIG SET scan-count 50"), Reply::Ok);
        assert_eq!(f.config.read().scan_count, 50);
        assert_eq!(f.ok("CONFIG SET PUBSUB-OVERFLOW drop-oldest"), Reply::Ok);
        assert_eq!(
            f.ok("CONFIG GET pubsub-overflow"),
            Reply::Map(vec![(
                Bytes::from_static(b"pubsub-overflow"),
                Reply::bulk("drop-oldest")
            )])
        );
        assert!(matches!(f.run("CONFIG SET hz fast"), Err(MnemoError::Generic(_))));
        assert!(matches!(f.run("CONFIG SET nope 1"), Err(MnemoError::Generic(_))));
        assert!(matches!(f.run("CONFIG GET"), Err(MnemoError::WrongArgCount(_))));
        assert!(f.run("CONFIG REWRITE").is_err());
    }
}
