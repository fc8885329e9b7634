pub mod hash;
pub mod key;
pub mod list;
pub mod pubsub;
pub mod server;
pub mod set;
pub mod sorted_set;
pub mod string;

use std::time::Duration;

use bytes::Bytes;

use crate::config::SharedConfig;
use crate::error::{MnemoError, MnemoResult};
use crate::pubsub::Broker;
use crate::reply::Reply;
use crate::stats::CommandStats;
use crate::store::Keyspace;
use crate::types::string::parse_i64;

/// Which end of a list a push or pop works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum End {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SetCondition {
    #[default]
    Always,
    /// NX
    IfAbsent,
    /// XX
    IfPresent,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SetOptions {
    pub expire: Option<Duration>,
    pub condition: SetCondition,
    pub keep_ttl: bool,
    /// Return the previous value instead of OK.
    pub get: bool,
}

/// A parsed command, ready to run against an engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    // Server
    Ping { message: Option<Bytes> },
    DbSize,
    FlushDb,
    Info { section: Option<String> },
    ConfigGet { pattern: Bytes },
    ConfigSet { parameter: String, value: String },
    ConfigResetStat,

    // Strings and expiry
    Get { key: Bytes },
    MGet { keys: Vec<Bytes> },
    Set { key: Bytes, value: Bytes, options: SetOptions },
    IncrBy { key: Bytes, delta: i64 },
    Ttl { key: Bytes },
    Pttl { key: Bytes },
    Expire { key: Bytes, millis: i64 },
    Persist { key: Bytes },

    // Lists
    Push { key: Bytes, values: Vec<Bytes>, end: End, only_existing: bool },
    Pop { key: Bytes, end: End, count: Option<usize> },
    LRange { key: Bytes, start: i64, stop: i64 },
    LIndex { key: Bytes, index: i64 },
    LLen { key: Bytes },

    // Hashes
    HSet { key: Bytes, fields: Vec<(Bytes, Bytes)> },
    HGet { key: Bytes, field: Bytes },
    HMGet { key: Bytes, fields: Vec<Bytes> },
    HGetAll { key: Bytes },
    HIncrBy { key: Bytes, field: Bytes, delta: i64 },
    HExists { key: Bytes, field: Bytes },
    HKeys { key: Bytes },
    HDel { key: Bytes, fields: Vec<Bytes> },
    HLen { key: Bytes },

    // Sets
    SAdd { key: Bytes, members: Vec<Bytes> },
    SRem { key: Bytes, members: Vec<Bytes> },
    SMembers { key: Bytes },
    SIsMember { key: Bytes, member: Bytes },
    SCard { key: Bytes },
    SInter { keys: Vec<Bytes> },
    SUnion { keys: Vec<Bytes> },
    SDiff { keys: Vec<Bytes> },

    // Sorted sets
    ZAdd { key: Bytes, members: Vec<(f64, Bytes)> },
    ZRem { key: Bytes, members: Vec<Bytes> },
    ZRange { key: Bytes, start: i64, stop: i64, with_scores: bool, rev: bool },
    ZRank { key: Bytes, member: Bytes, rev: bool },
    ZScore { key: Bytes, member: Bytes },
    ZRangeByScore { key: Bytes, min: f64, max: f64, with_scores: bool },
    ZIncrBy { key: Bytes, delta: f64, member: Bytes },
    ZCard { key: Bytes },

    // Keys
    Exists { keys: Vec<Bytes> },
    Del { keys: Vec<Bytes> },
    Type { key: Bytes },
    Rename { source: Bytes, destination: Bytes },
    Scan { cursor: u64, pattern: Option<Bytes>, count: Option<usize>, kind: Option<String> },

    // Pub/Sub
    Publish { channel: Bytes, message: Bytes },
    PubSubChannels { pattern: Option<Bytes> },
    PubSubNumSub { channels: Vec<Bytes> },
    PubSubNumPat,
}

impl Command {
    /// Parse a command name followed by its arguments. The name is
    /// case-insensitive.
    pub fn from_args(argv: &[Bytes]) -> MnemoResult<Command> {
        let Some((name, args)) = argv.split_first() else {
            return Err(MnemoError::Generic("empty command".to_string()));
        };
        let upper = String::from_utf8_lossy(name).to_uppercase();
        match upper.as_str() {
            "PING" => server::parse_ping(args),
            "DBSIZE" => server::parse_dbsize(args),
            "FLUSHDB" => server::parse_flushdb(args),
            "INFO" => server::parse_info(args),
            "CONFIG" => server::parse_config(args),

            "GET" => string::parse_get(args),
            "MGET" => string::parse_mget(args),
            "SET" => string::parse_set(args),
            "SETEX" => string::parse_setex(args, "setex", Duration::from_secs),
            "PSETEX" => string::parse_setex(args, "psetex", Duration::from_millis),
            "INCR" => string::parse_incr(args, "incr", 1),
            "DECR" => string::parse_incr(args, "decr", -1),
            "INCRBY" => string::parse_incrby(args, "incrby", false),
            "DECRBY" => string::parse_incrby(args, "decrby", true),

            "TTL" => key::parse_ttl(args, "ttl"),
            "PTTL" => key::parse_ttl(args, "pttl"),
            "EXPIRE" => key::parse_expire(args, "expire", 1000),
            "PEXPIRE" => key::parse_expire(args, "pexpire", 1),
            "PERSIST" => key::parse_persist(args),
            "EXISTS" => key::parse_exists(args),
            "DEL" | "UNLINK" => key::parse_del(args),
            "TYPE" => key::parse_type(args),
            "RENAME" => key::parse_rename(args),
            "SCAN" => key::parse_scan(args),

            "LPUSH" => list::parse_push(args, "lpush", End::Left, false),
            "RPUSH" => list::parse_push(args, "rpush", End::Right, false),
            "LPUSHX" => list::parse_push(args, "lpushx", End::Left, true),
            "RPUSHX" => list::parse_push(args, "rpushx", End::Right, true),
            "LPOP" => list::parse_pop(args, "lpop", End::Left),
            "RPOP" => list::parse_pop(args, "rpop", End::Right),
            "LRANGE" => list::parse_lrange(args),
            "LINDEX" => list::parse_lindex(args),
            "LLEN" => list::parse_llen(args),

            "HSET" | "HMSET" => hash::parse_hset(args),
            "HGET" => hash::parse_hget(args),
            "HMGET" => hash::parse_hmget(args),
            "HGETALL" => hash::parse_hgetall(args),
            "HINCRBY" => hash::parse_hincrby(args),
            "HEXISTS" => hash::parse_hexists(args),
            "HKEYS" => hash::parse_hkeys(args),
            "HDEL" => hash::parse_hdel(args),
            "HLEN" => hash::parse_hlen(args),

            "SADD" => set::parse_sadd(args),
            "SREM" => set::parse_srem(args),
            "SMEMBERS" => set::parse_smembers(args),
            "SISMEMBER" => set::parse_sismember(args),
            "SCARD" => set::parse_scard(args),
            "SINTER" => set::parse_multi(args, "sinter").map(|keys| Command::SInter { keys }),
            "SUNION" => set::parse_multi(args, "sunion").map(|keys| Command::SUnion { keys }),
            "SDIFF" => set::parse_multi(args, "sdiff").map(|keys| Command::SDiff { keys }),

            "ZADD" => sorted_set::parse_zadd(args),
            "ZREM" => sorted_set::parse_zrem(args),
            "ZRANGE" => sorted_set::parse_zrange(args, "zrange", false),
            "ZREVRANGE" => sorted_set::parse_zrange(args, "zrevrange", true),
            "ZRANK" => sorted_set::parse_zrank(args, "zrank", false),
            "ZREVRANK" => sorted_set::parse_zrank(args, "zrevrank", true),
            "ZSCORE" => sorted_set::parse_zscore(args),
            "ZRANGEBYSCORE" => sorted_set::parse_zrangebyscore(args),
            "ZINCRBY" => sorted_set::parse_zincrby(args),
            "ZCARD" => sorted_set::parse_zcard(args),

            "PUBLISH" => pubsub::parse_publish(args),
            "PUBSUB" => pubsub::parse_pubsub(args),
            "SUBSCRIBE" | "UNSUBSCRIBE" | "PSUBSCRIBE" | "PUNSUBSCRIBE" => Err(MnemoError::Generic(
                format!("'{}' requires a subscription handle", upper.to_lowercase()),
            )),

            _ => Err(MnemoError::UnknownCommand(
                String::from_utf8_lossy(name).into_owned(),
            )),
        }
    }

    /// Lowercase name used for command statistics.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Ping { .. } => "ping",
            Command::DbSize => "dbsize",
            Command::FlushDb => "flushdb",
            Command::Info { .. } => "info",
            Command::ConfigGet { .. }
            | Command::ConfigSet { .. }
            | Command::ConfigResetStat => "config",
            Command::Get { .. } => "get",
            Command::MGet { .. } => "mget",
            Command::Set { .. } => "set",
            Command::IncrBy { .. } => "incrby",
            Command::Ttl { .. } => "ttl",
            Command::Pttl { .. } => "pttl",
            Command::Expire { .. } => "expire",
            Command::Persist { .. } => "persist",
            Command::Push { end: End::Left, only_existing: false, .. } => "lpush",
            Command::Push { end: End::Right, only_existing: false, .. } => "rpush",
            Command::Push { end: End::Left, only_existing: true, .. } => "lpushx",
            Command::Push { end: End::Right, only_existing: true, .. } => "rpushx",
            Command::Pop { end: End::Left, .. } => "lpop",
            Command::Pop { end: End::Right, .. } => "rpop",
            Command::LRange { .. } => "lrange",
            Command::LIndex { .. } => "lindex",
            Command::LLen { .. } => "llen",
            Command::HSet { .. } => "hset",
            Command::HGet { .. } => "hget",
            Command::HMGet { .. } => "hmget",
            Command::HGetAll { .. } => "hgetall",
            Command::HIncrBy { .. } => "hincrby",
            Command::HExists { .. } => "hexists",
            Command::HKeys { .. } => "hkeys",
            Command::HDel { .. } => "hdel",
            Command::HLen { .. } => "hlen",
            Command::SAdd { .. } => "sadd",
            Command::SRem { .. } => "srem",
            Command::SMembers { .. } => "smembers",
            Command::SIsMember { .. } => "sismember",
            Command::SCard { .. } => "scard",
            Command::SInter { .. } => "sinter",
            Command::SUnion { .. } => "sunion",
            Command::SDiff { .. } => "sdiff",
            Command::ZAdd { .. } => "zadd",
            Command::ZRem { .. } => "zrem",
            Command::ZRange { rev: false, .. } => "zrange",
            Command::ZRange { rev: true, .. } => "zrevrange",
            Command::ZRank { rev: false, .. } => "zrank",
            Command::ZRank { rev: true, .. } => "zrevrank",
            Command::ZScore { .. } => "zscore",
            Command::ZRangeByScore { .. } => "zrangebyscore",
            Command::ZIncrBy { .. } => "zincrby",
            Command::ZCard { .. } => "zcard",
            Command::Exists { .. } => "exists",
            Command::Del { .. } => "del",
            Command::Type { .. } => "type",
            Command::Rename { .. } => "rename",
            Command::Scan { .. } => "scan",
            Command::Publish { .. } => "publish",
            Command::PubSubChannels { .. }
            | Command::PubSubNumSub { .. }
            | Command::PubSubNumPat => "pubsub",
        }
    }

    /// Whether the command can change the keyspace.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Command::FlushDb
                | Command::Set { .. }
                | Command::IncrBy { .. }
                | Command::Expire { .. }
                | Command::Persist { .. }
                | Command::Push { .. }
                | Command::Pop { .. }
                | Command::HSet { .. }
                | Command::HIncrBy { .. }
                | Command::HDel { .. }
                | Command::SAdd { .. }
                | Command::SRem { .. }
                | Command::ZAdd { .. }
                | Command::ZRem { .. }
                | Command::ZIncrBy { .. }
                | Command::Del { .. }
                | Command::Rename { .. }
        )
    }
}

/// Everything a command needs to run.
#[derive(Clone, Copy)]
pub struct Context<'a> {
    pub keyspace: &'a Keyspace,
    pub broker: &'a Broker,
    pub config: &'a SharedConfig,
    pub stats: &'a CommandStats,
}

/// Run a parsed command.
pub fn execute(ctx: Context<'_>, cmd: Command) -> MnemoResult<Reply> {
    match cmd {
        Command::Ping { message } => Ok(server::ping(message)),
        Command::DbSize => Ok(server::dbsize(ctx)),
        Command::FlushDb => Ok(server::flushdb(ctx)),
        Command::Info { section } => Ok(server::info(ctx, section.as_deref())),
        Command::ConfigGet { pattern } => Ok(server::config_get(ctx, &pattern)),
        Command::ConfigSet { parameter, value } => server::config_set(ctx, &parameter, &value),
        Command::ConfigResetStat => Ok(server::config_resetstat(ctx)),

        Command::Get { key } => string::get(ctx, &key),
        Command::MGet { keys } => Ok(string::mget(ctx, &keys)),
        Command::Set { key, value, options } => string::set(ctx, key, value, options),
        Command::IncrBy { key, delta } => string::incr_by(ctx, &key, delta),
        Command::Ttl { key } => Ok(key::ttl(ctx, &key, false)),
        Command::Pttl { key } => Ok(key::ttl(ctx, &key, true)),
        Command::Expire { key, millis } => key::expire(ctx, &key, millis),
        Command::Persist { key } => Ok(key::persist(ctx, &key)),

        Command::Push { key, values, end, only_existing } => {
            list::push(ctx, &key, values, end, only_existing)
        }
        Command::Pop { key, end, count } => list::pop(ctx, &key, end, count),
        Command::LRange { key, start, stop } => list::lrange(ctx, &key, start, stop),
        Command::LIndex { key, index } => list::lindex(ctx, &key, index),
        Command::LLen { key } => list::llen(ctx, &key),

        Command::HSet { key, fields } => hash::hset(ctx, &key, fields),
        Command::HGet { key, field } => hash::hget(ctx, &key, &field),
        Command::HMGet { key, fields } => hash::hmget(ctx, &key, &fields),
        Command::HGetAll { key } => hash::hgetall(ctx, &key),
        Command::HIncrBy { key, field, delta } => hash::hincrby(ctx, &key, field, delta),
        Command::HExists { key, field } => hash::hexists(ctx, &key, &field),
        Command::HKeys { key } => hash::hkeys(ctx, &key),
        Command::HDel { key, fields } => hash::hdel(ctx, &key, &fields),
        Command::HLen { key } => hash::hlen(ctx, &key),

        Command::SAdd { key, members } => set::sadd(ctx, &key, members),
        Command::SRem { key, members } => set::srem(ctx, &key, &members),
        Command::SMembers { key } => set::smembers(ctx, &key),
        Command::SIsMember { key, member } => set::sismember(ctx, &key, &member),
        Command::SCard { key } => set::scard(ctx, &key),
        Command::SInter { keys } => set::combine(ctx, &keys, set::Algebra::Inter),
        Command::SUnion { keys } => set::combine(ctx, &keys, set::Algebra::Union),
        Command::SDiff { keys } => set::combine(ctx, &keys, set::Algebra::Diff),

        Command::ZAdd { key, members } => sorted_set::zadd(ctx, &key, members),
        Command::ZRem { key, members } => sorted_set::zrem(ctx, &key, &members),
        Command::ZRange { key, start, stop, with_scores, rev } => {
            sorted_set::zrange(ctx, &key, start, stop, with_scores, rev)
        }
        Command::ZRank { key, member, rev } => sorted_set::zrank(ctx, &key, &member, rev),
        Command::ZScore { key, member } => sorted_set::zscore(ctx, &key, &member),
        Command::ZRangeByScore { key, min, max, with_scores } => {
            sorted_set::zrangebyscore(ctx, &key, min, max, with_scores)
        }
        Command::ZIncrBy { key, delta, member } => sorted_set::zincrby(ctx, &key, delta, member),
        Command::ZCard { key } => sorted_set::zcard(ctx, &key),

        Command::Exists { keys } => Ok(key::exists(ctx, &keys)),
        Command::Del { keys } => Ok(key::del(ctx, &keys)),
        Command::Type { key } => Ok(key::key_type(ctx, &key)),
        Command::Rename { source, destination } => key::rename(ctx, source, destination),
        Command::Scan { cursor, pattern, count, kind } => {
            Ok(key::scan(ctx, cursor, pattern.as_deref(), count, kind.as_deref()))
        }

        Command::Publish { channel, message } => Ok(pubsub::publish(ctx, &channel, &message)),
        Command::PubSubChannels { pattern } => Ok(pubsub::channels(ctx, pattern.as_deref())),
        Command::PubSubNumSub { channels } => Ok(pubsub::numsub(ctx, &channels)),
        Command::PubSubNumPat => Ok(pubsub::numpat(ctx)),
    }
}

pub(crate) fn expect_args(args: &[Bytes], n: usize, cmd: &str) -> MnemoResult<()> {
    if args.len() != n {
        return Err(MnemoError::WrongArgCount(cmd.to_string()));
    }
    Ok(())
}

pub(crate) fn expect_min_args(args: &[Bytes], n: usize, cmd: &str) -> MnemoResult<()> {
    if args.len() < n {
        return Err(MnemoError::WrongArgCount(cmd.to_string()));
    }
    Ok(())
}

pub(crate) fn arg_to_i64(arg: &[u8]) -> MnemoResult<i64> {
    parse_i64(arg).ok_or(MnemoError::NotAnInteger)
}

/// Non-negative integer argument.
pub(crate) fn arg_to_usize(arg: &[u8]) -> MnemoResult<usize> {
    let n = arg_to_i64(arg)?;
    usize::try_from(n).map_err(|_| MnemoError::Generic("value is out of range, must be positive".to_string()))
}

/// Float argument. Accepts `inf`, `+inf` and `-inf`; rejects NaN.
pub(crate) fn arg_to_f64(arg: &[u8]) -> MnemoResult<f64> {
    let s = std::str::from_utf8(arg).map_err(|_| MnemoError::NotAFloat)?;
    let value: f64 = s.parse().map_err(|_| MnemoError::NotAFloat)?;
    if value.is_nan() {
        return Err(MnemoError::NotAFloat);
    }
    Ok(value)
}

pub(crate) fn arg_to_string(arg: &[u8]) -> String {
    String::from_utf8_lossy(arg).into_owned()
}

/// Case-insensitive keyword comparison.
pub(crate) fn is_keyword(arg: &[u8], keyword: &str) -> bool {
    arg.eq_ignore_ascii_case(keyword.as_bytes())
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use parking_lot::RwLock;

    use super::*;
    use crate::config::Config;

    /// A self-contained keyspace plus collaborators for command tests.
    pub struct Fixture {
        pub keyspace: Keyspace,
        pub broker: Arc<Broker>,
        pub config: SharedConfig,
        pub stats: CommandStats,
    }

    impl Fixture {
        pub fn new() -> Self {
            let config = Arc::new(RwLock::new(Config::default()));
            Fixture {
                keyspace: Keyspace::default(),
                broker: Arc::new(Broker::new(Arc::clone(&config))),
                config,
                stats: CommandStats::new(),
            }
        }

        pub fn ctx(&self) -> Context<'_> {
            Context {
                keyspace: &self.keyspace,
                broker: &self.broker,
                config: &self.config,
                stats: &self.stats,
            }
        }

        pub fn run(&self, line: &str) -> MnemoResult<Reply> {
            let argv: Vec<Bytes> = line
                .split_whitespace()
                .map(|s| Bytes::copy_from_slice(s.as_bytes()))
                .collect();
            execute(self.ctx(), Command::from_args(&argv)?)
        }

        pub fn ok(&self, line: &str) -> Reply {
            match self.run(line) {
                Ok(reply) => reply,
                Err(e) => panic!("{line}: {e}"),
            }
        }
    }

    pub fn bulks(items: &[&str]) -> Reply {
        Reply::Array(items.iter().map(|s| Reply::bulk(s.to_string())).collect())
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        let argv = vec![Bytes::from_static(b"gEt"), Bytes::from_static(b"k")];
        assert_eq!(
            Command::from_args(&argv).unwrap(),
            Command::Get { key: Bytes::from_static(b"k") }
        );
    }

    #[test]
    fn test_parse_errors() {
        let f = Fixture::new();
        assert!(matches!(f.run("NOPE"), Err(MnemoError::UnknownCommand(name)) if name == "NOPE"));
        assert!(matches!(f.run("GET"), Err(MnemoError::WrongArgCount(name)) if name == "get"));
        assert!(matches!(f.run("INCRBY k abc"), Err(MnemoError::NotAnInteger)));
        assert!(matches!(f.run("ZADD z nan m"), Err(MnemoError::NotAFloat)));
        assert!(matches!(f.run("SUBSCRIBE ch"), Err(MnemoError::Generic(_))));
        assert!(Command::from_args(&[]).is_err());
    }

    #[test]
    fn test_names() {
        let f = |line: &str| {
            let argv: Vec<Bytes> = line.split(' ').map(|s| Bytes::from(s.to_string())).collect();
            Command::from_args(&argv).unwrap().name()
        };
        assert_eq!(f("RPUSHX l a"), "rpushx");
        assert_eq!(f("ZREVRANK z m"), "zrevrank");
        assert_eq!(f("PUBSUB NUMPAT"), "pubsub");
        assert_eq!(f("DECR n"), "incrby");
    }

    #[test]
    fn test_arg_helpers() {
        assert_eq!(arg_to_f64(b"-inf").unwrap(), f64::NEG_INFINITY);
        assert_eq!(arg_to_f64(b"+inf").unwrap(), f64::INFINITY);
        assert_eq!(arg_to_f64(b"1.5").unwrap(), 1.5);
        assert!(arg_to_f64(b"NaN").is_err());
        assert!(arg_to_usize(b"-1").is_err());
        assert!(is_keyword(b"withScores", "WITHSCORES"));
    }
}
