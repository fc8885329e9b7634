use std::time::Duration;

use bytes::Bytes;

use super::{
    Command, Context, SetCondition, SetOptions, arg_to_i64, expect_args, expect_min_args,
    is_keyword,
};
use crate::error::{MnemoError, MnemoResult};
use crate::reply::Reply;
use crate::store::entry::Entry;
use crate::types::Value;
use crate::types::string::StringValue;

pub fn parse_get(args: &[Bytes]) -> MnemoResult<Command> {
    expect_args(args, 1, "get")?;
    Ok(Command::Get { key: args[0].clone() })
}

pub fn parse_mget(args: &[Bytes]) -> MnemoResult<Command> {
    expect_min_args(args, 1, "mget")?;
    Ok(Command::MGet { keys: args.to_vec() })
}

/// SET key value [EX seconds | PX milliseconds | KEEPTTL] [NX | XX] [GET]
pub fn parse_set(args: &[Bytes]) -> MnemoResult<Command> {
    expect_min_args(args, 2, "set")?;
    let mut options = SetOptions::default();

    let mut i = 2;
    while i < args.len() {
        let opt = &args[i];
        if is_keyword(opt, "EX") || is_keyword(opt, "PX") {
            if options.expire.is_some() || options.keep_ttl {
                return Err(MnemoError::SyntaxError);
            }
            i += 1;
            let raw = args.get(i).ok_or(MnemoError::SyntaxError)?;
            let n = arg_to_i64(raw)?;
            if n <= 0 {
                return Err(MnemoError::InvalidExpireTime("set".to_string()));
            }
            options.expire = Some(if is_keyword(opt, "EX") {
                Duration::from_secs(n as u64)
            } else {
                Duration::from_millis(n as u64)
            });
        } else if is_keyword(opt, "NX") || is_keyword(opt, "XX") {
            if options.condition != SetCondition::Always {
                return Err(MnemoError::SyntaxError);
            }
            options.condition = if is_keyword(opt, "NX") {
                SetCondition::IfAbsent
            } else {
                SetCondition::IfPresent
            };
        } else if is_keyword(opt, "KEEPTTL") {
            if options.expire.is_some() {
                return Err(MnemoError::SyntaxError);
            }
            options.keep_ttl = true;
        } else if is_keyword(opt, "GET") {
            options.get = true;
        } else {
            return Err(MnemoError::SyntaxError);
        }
        i += 1;
    }

    Ok(Command::Set {
        key: args[0].clone(),
        value: args[1].clone(),
        options,
    })
}

/// SETEX / PSETEX key ttl value
pub fn parse_setex(args: &[Bytes], name: &str, unit: fn(u64) -> Duration) -> MnemoResult<Command> {
    expect_args(args, 3, name)?;
    let n = arg_to_i64(&args[1])?;
    if n <= 0 {
        return Err(MnemoError::InvalidExpireTime(name.to_string()));
    }
    Ok(Command::Set {
        key: args[0].clone(),
        value: args[2].clone(),
        options: SetOptions {
            expire: Some(unit(n as u64)),
            ..SetOptions::default()
        },
    })
}

pub fn parse_incr(args: &[Bytes], name: &str, delta: i64) -> MnemoResult<Command> {
    expect_args(args, 1, name)?;
    Ok(Command::IncrBy { key: args[0].clone(), delta })
}

pub fn parse_incrby(args: &[Bytes], name: &str, negate: bool) -> MnemoResult<Command> {
    expect_args(args, 2, name)?;
    let n = arg_to_i64(&args[1])?;
    let delta = if negate {
        n.checked_neg().ok_or(MnemoError::Overflow)?
    } else {
        n
    };
    Ok(Command::IncrBy { key: args[0].clone(), delta })
}

pub fn get(ctx: Context<'_>, key: &[u8]) -> MnemoResult<Reply> {
    ctx.keyspace.read(key, |entry| -> MnemoResult<Reply> {
        match entry {
            Some(e) => Ok(Reply::Bulk(e.value.as_string()?.as_bytes().clone())),
            None => Ok(Reply::Nil),
        }
    })
}

/// Values parallel to `keys`. Missing keys and keys holding another type
/// read as nil.
pub fn mget(ctx: Context<'_>, keys: &[Bytes]) -> Reply {
    let values = keys.iter().map(|key| {
        ctx.keyspace.read(key, |entry| {
            entry
                .and_then(|e| e.value.as_string().ok())
                .map_or(Reply::Nil, |s| Reply::Bulk(s.as_bytes().clone()))
        })
    });
    Reply::Array(values.collect())
}

pub fn set(ctx: Context<'_>, key: Bytes, value: Bytes, options: SetOptions) -> MnemoResult<Reply> {
    let now = ctx.keyspace.now();
    let expires_at = match options.expire {
        Some(ttl) => Some(
            now.checked_add(ttl)
                .ok_or_else(|| MnemoError::InvalidExpireTime("set".to_string()))?,
        ),
        None => None,
    };

    ctx.keyspace.update(&key, |slot| -> MnemoResult<Reply> {
        let previous = match (options.get, slot.as_ref()) {
            (true, Some(e)) => Some(e.value.as_string()?.as_bytes().clone()),
            _ => None,
        };
        let skip = match options.condition {
            SetCondition::Always => false,
            SetCondition::IfAbsent => slot.is_some(),
            SetCondition::IfPresent => slot.is_none(),
        };
        if !skip {
            let expires_at = match (expires_at, slot.as_ref()) {
                (Some(at), _) => Some(at),
                (None, Some(e)) if options.keep_ttl => e.expires_at,
                _ => None,
            };
            *slot = Some(Entry::with_expiry(
                Value::String(StringValue::new(value)),
                expires_at,
            ));
        }
        Ok(match (options.get, skip) {
            (true, _) => Reply::optional_bulk(previous),
            (false, true) => Reply::Nil,
            (false, false) => Reply::Ok,
        })
    })
}

/// Add `delta` to the integer at `key`, creating it from 0. Any expiry is
/// kept.
pub fn incr_by(ctx: Context<'_>, key: &Bytes, delta: i64) -> MnemoResult<Reply> {
    ctx.keyspace.update(key, |slot| -> MnemoResult<Reply> {
        match slot {
            Some(entry) => {
                let n = entry.value.as_string_mut()?.incr_by(delta)?;
                Ok(Reply::Integer(n))
            }
            None => {
                *slot = Some(Entry::new(Value::String(StringValue::from_i64(delta))));
                Ok(Reply::Integer(delta))
            }
        }
    })
}
