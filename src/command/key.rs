use std::time::Duration;

use bytes::Bytes;

use super::{
    Command, Context, arg_to_i64, arg_to_string, arg_to_usize, expect_args, expect_min_args,
    is_keyword,
};
use crate::error::{MnemoError, MnemoResult};
use crate::glob::GlobPattern;
use crate::reply::Reply;

pub fn parse_ttl(args: &[Bytes], name: &str) -> MnemoResult<Command> {
    expect_args(args, 1, name)?;
    let key = args[0].clone();
    Ok(if name == "pttl" {
        Command::Pttl { key }
    } else {
        Command::Ttl { key }
    })
}

/// EXPIRE / PEXPIRE key ttl. `unit_ms` converts the argument to
/// milliseconds.
pub fn parse_expire(args: &[Bytes], name: &str, unit_ms: i64) -> MnemoResult<Command> {
    expect_args(args, 2, name)?;
    let millis = arg_to_i64(&args[1])?
        .checked_mul(unit_ms)
        .ok_or_else(|| MnemoError::InvalidExpireTime(name.to_string()))?;
    Ok(Command::Expire { key: args[0].clone(), millis })
}

pub fn parse_persist(args: &[Bytes]) -> MnemoResult<Command> {
    expect_args(args, 1, "persist")?;
    Ok(Command::Persist { key: args[0].clone() })
}

pub fn parse_exists(args: &[Bytes]) -> MnemoResult<Command> {
    expect_min_args(args, 1, "exists")?;
    Ok(Command::Exists { keys: args.to_vec() })
}

pub fn parse_del(args: &[Bytes]) -> MnemoResult<Command> {
    expect_min_args(args, 1, "del")?;
    Ok(Command::Del { keys: args.to_vec() })
}

pub fn parse_type(args: &[Bytes]) -> MnemoResult<Command> {
    expect_args(args, 1, "type")?;
    Ok(Command::Type { key: args[0].clone() })
}

pub fn parse_rename(args: &[Bytes]) -> MnemoResult<Command> {
    expect_args(args, 2, "rename")?;
    Ok(Command::Rename {
        source: args[0].clone(),
        destination: args[1].clone(),
    })
}

/// SCAN cursor [MATCH pattern] [COUNT count] [TYPE type]
pub fn parse_scan(args: &[Bytes]) -> MnemoResult<Command> {
    expect_min_args(args, 1, "scan")?;
    let cursor = std::str::from_utf8(&args[0])
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| MnemoError::Generic("invalid cursor".to_string()))?;

    let mut pattern = None;
    let mut count = None;
    let mut kind = None;
    let mut i = 1;
    while i < args.len() {
        let value = args.get(i + 1).ok_or(MnemoError::SyntaxError)?;
        if is_keyword(&args[i], "MATCH") {
            pattern = Some(value.clone());
        } else if is_keyword(&args[i], "COUNT") {
            let n = arg_to_usize(value)?;
            if n == 0 {
                return Err(MnemoError::SyntaxError);
            }
            count = Some(n);
        } else if is_keyword(&args[i], "TYPE") {
            kind = Some(arg_to_string(value).to_lowercase());
        } else {
            return Err(MnemoError::SyntaxError);
        }
        i += 2;
    }

    Ok(Command::Scan { cursor, pattern, count, kind })
}

/// Remaining TTL: -2 for a missing key, -1 for no expiry.
pub fn ttl(ctx: Context<'_>, key: &[u8], millis: bool) -> Reply {
    let now = ctx.keyspace.now();
    ctx.keyspace.read(key, |entry| match entry {
        None => Reply::Integer(-2),
        Some(e) if millis => Reply::Integer(e.ttl_millis(now)),
        Some(e) => Reply::Integer(e.ttl_seconds(now)),
    })
}

/// Set a relative expiry. A non-positive TTL deletes the key.
pub fn expire(ctx: Context<'_>, key: &Bytes, millis: i64) -> MnemoResult<Reply> {
    let now = ctx.keyspace.now();
    let expires_at = if millis > 0 {
        Some(
            now.checked_add(Duration::from_millis(millis as u64))
                .ok_or_else(|| MnemoError::InvalidExpireTime("expire".to_string()))?,
        )
    } else {
        None
    };
    Ok(ctx.keyspace.update(key, |slot| {
        let Some(entry) = slot.as_mut() else {
            return Reply::Integer(0);
        };
        match expires_at {
            Some(at) => entry.expires_at = Some(at),
            None => *slot = None,
        }
        Reply::Integer(1)
    }))
}

pub fn persist(ctx: Context<'_>, key: &Bytes) -> Reply {
    ctx.keyspace.update(key, |slot| match slot {
        Some(entry) if entry.expires_at.is_some() => {
            entry.expires_at = None;
            Reply::Integer(1)
        }
        _ => Reply::Integer(0),
    })
}

/// Number of named keys that exist. Repeated keys count each time.
pub fn exists(ctx: Context<'_>, keys: &[Bytes]) -> Reply {
    let n = keys.iter().filter(|k| ctx.keyspace.exists(k)).count();
    Reply::Integer(n as i64)
}

pub fn del(ctx: Context<'_>, keys: &[Bytes]) -> Reply {
    let n = keys.iter().filter(|k| ctx.keyspace.remove(k)).count();
    Reply::Integer(n as i64)
}

pub fn key_type(ctx: Context<'_>, key: &[u8]) -> Reply {
    let name = ctx
        .keyspace
        .read(key, |entry| entry.map_or("none", |e| e.value.type_name()));
    Reply::status(name)
}

/// Move the entry (and its expiry) from `source` to `destination`,
/// replacing whatever was there. Both keys are locked for the move.
pub fn rename(ctx: Context<'_>, source: Bytes, destination: Bytes) -> MnemoResult<Reply> {
    if source == destination {
        return if ctx.keyspace.exists(&source) {
            Ok(Reply::Ok)
        } else {
            Err(MnemoError::KeyNotFound)
        };
    }
    let keys = [source.clone(), destination.clone()];
    ctx.keyspace.with_locked(&keys, |locked| -> MnemoResult<Reply> {
        let entry = locked.take(&source).ok_or(MnemoError::KeyNotFound)?;
        locked.put(&destination, entry);
        Ok(Reply::Ok)
    })
}

/// One page of a keyspace scan: `[next cursor, [keys...]]`.
pub fn scan(
    ctx: Context<'_>,
    cursor: u64,
    pattern: Option<&[u8]>,
    count: Option<usize>,
    kind: Option<&str>,
) -> Reply {
    let count = count.unwrap_or_else(|| ctx.config.read().scan_count);
    let pattern = pattern.map(GlobPattern::new).filter(|p| !p.is_match_all());
    let (next, keys) = ctx.keyspace.scan(cursor, count, |key, entry| {
        pattern.as_ref().is_none_or(|p| p.matches(key))
            && kind.is_none_or(|k| type_matches(entry.value.type_name(), k))
    });
    Reply::Array(vec![
        Reply::bulk(next.to_string()),
        Reply::bulk_array(keys),
    ])
}

fn type_matches(actual: &str, wanted: &str) -> bool {
    actual.eq_ignore_ascii_case(wanted)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::super::tests::Fixture;
    use super::*;

    fn scan_all(f: &Fixture, extra: &str) -> HashSet<Bytes> {
        let mut seen = HashSet::new();
        let mut cursor = "0".to_string();
        loop {
            let reply = f.ok(&format!("SCAN {cursor} {extra}"));
            let mut parts = reply.into_array().unwrap().into_iter();
            let next = parts.next().unwrap();
            let keys = parts.next().unwrap().into_array().unwrap();
            seen.extend(keys.into_iter().map(|k| k.as_bulk().unwrap().clone()));
            cursor = String::from_utf8(next.as_bulk().unwrap().to_vec()).unwrap();
            if cursor == "0" {
                break;
            }
        }
        seen
    }

    #[test]
    fn test_exists_del_type() {
        let f = Fixture::new();
        f.ok("SET a 1");
        f.ok("RPUSH b x");
        f.ok("ZADD z 1 m");
        assert_eq!(f.ok("EXISTS a b c"), Reply::Integer(2));
        assert_eq!(f.ok("EXISTS a a"), Reply::Integer(2));
        assert_eq!(f.ok("TYPE a"), Reply::status("string"));
        assert_eq!(f.ok("TYPE b"), Reply::status("list"));
        assert_eq!(f.ok("TYPE z"), Reply::status("zset"));
        assert_eq!(f.ok("TYPE nope"), Reply::status("none"));
        assert_eq!(f.ok("DEL a b c"), Reply::Integer(2));
        assert_eq!(f.ok("EXISTS a b"), Reply::Integer(0));
    }

    #[test]
    fn test_expire_persist_ttl() {
        let f = Fixture::new();
        assert_eq!(f.ok("TTL missing"), Reply::Integer(-2));
        assert_eq!(f.ok("EXPIRE missing 10"), Reply::Integer(0));
        assert_eq!(f.ok("EXISTS missing"), Reply::Integer(0));

        f.ok("SET k v");
        assert_eq!(f.ok("TTL k"), Reply::Integer(-1));
        assert_eq!(f.ok("EXPIRE k 10"), Reply::Integer(1));
        assert_eq!(f.ok("TTL k"), Reply::Integer(10));
        assert_eq!(f.ok("PERSIST k"), Reply::Integer(1));
        assert_eq!(f.ok("PERSIST k"), Reply::Integer(0));
        assert_eq!(f.ok("TTL k"), Reply::Integer(-1));
        assert_eq!(f.ok("PEXPIRE k 0"), Reply::Integer(1));
        assert_eq!(f.ok("EXISTS k"), Reply::Integer(0));
        assert!(matches!(
            f.run(&format!("EXPIRE k {}", i64::MAX)),
            Err(MnemoError::InvalidExpireTime(_))
        ));
    }

    #[test]
    fn test_rename() {
        let f = Fixture::new();
        f.ok("SET src v EX 100");
        f.ok("RPUSH dst old");
        assert_eq!(f.ok("RENAME src dst"), Reply::Ok);
        assert_eq!(f.ok("GET dst"), Reply::bulk("v"));
        assert_eq!(f.ok("TTL dst"), Reply::Integer(100));
        assert_eq!(f.ok("EXISTS src"), Reply::Integer(0));
        assert!(matches!(f.run("RENAME src dst"), Err(MnemoError::KeyNotFound)));
        assert_eq!(f.ok("RENAME dst dst"), Reply::Ok);
        assert!(matches!(f.run("RENAME nope nope"), Err(MnemoError::KeyNotFound)));
    }

    #[test]
    fn test_scan_match_and_type() {
        let f = Fixture::new();
        for i in 0..30 {
            f.ok(&format!("SET user:{i} x"));
        }
        for i in 0..5 {
            f.ok(&format!("RPUSH queue:{i} x"));
        }
        assert_eq!(scan_all(&f, "COUNT 4").len(), 35);
        let users = scan_all(&f, "MATCH user:* COUNT 100");
        assert_eq!(users.len(), 30);
        assert!(users.iter().all(|k| k.starts_with(b"user:")));
        assert_eq!(scan_all(&f, "TYPE list").len(), 5);
        assert!(matches!(f.run("SCAN 0 COUNT 0"), Err(MnemoError::SyntaxError)));
        assert!(matches!(f.run("SCAN 0 MATCH"), Err(MnemoError::SyntaxError)));
        assert!(f.run("SCAN abc").is_err());
    }
}
