use bytes::Bytes;

use super::{Command, Context, arg_to_i64, expect_args, expect_min_args};
use crate::error::{MnemoError, MnemoResult};
use crate::reply::Reply;
use crate::store::entry::value_or_insert_with;
use crate::types::Value;
use crate::types::hash::HashValue;

/// HSET key field value [field value ...]
pub fn parse_hset(args: &[Bytes]) -> MnemoResult<Command> {
    if args.len() < 3 || args.len() % 2 != 1 {
        return Err(MnemoError::WrongArgCount("hset".to_string()));
    }
    let fields = args[1..]
        .chunks_exact(2)
        .map(|pair| (pair[0].clone(), pair[1].clone()))
        .collect();
    Ok(Command::HSet { key: args[0].clone(), fields })
}

pub fn parse_hget(args: &[Bytes]) -> MnemoResult<Command> {
    expect_args(args, 2, "hget")?;
    Ok(Command::HGet { key: args[0].clone(), field: args[1].clone() })
}

pub fn parse_hmget(args: &[Bytes]) -> MnemoResult<Command> {
    expect_min_args(args, 2, "hmget")?;
    Ok(Command::HMGet { key: args[0].clone(), fields: args[1..].to_vec() })
}

pub fn parse_hgetall(args: &[Bytes]) -> MnemoResult<Command> {
    expect_args(args, 1, "hgetall")?;
    Ok(Command::HGetAll { key: args[0].clone() })
}

pub fn parse_hincrby(args: &[Bytes]) -> MnemoResult<Command> {
    expect_args(args, 3, "hincrby")?;
    Ok(Command::HIncrBy {
        key: args[0].clone(),
        field: args[1].clone(),
        delta: arg_to_i64(&args[2])?,
    })
}

pub fn parse_hexists(args: &[Bytes]) -> MnemoResult<Command> {
    expect_args(args, 2, "hexists")?;
    Ok(Command::HExists { key: args[0].clone(), field: args[1].clone() })
}

pub fn parse_hkeys(args: &[Bytes]) -> MnemoResult<Command> {
    expect_args(args, 1, "hkeys")?;
    Ok(Command::HKeys { key: args[0].clone() })
}

pub fn parse_hdel(args: &[Bytes]) -> MnemoResult<Command> {
    expect_min_args(args, 2, "hdel")?;
    Ok(Command::HDel { key: args[0].clone(), fields: args[1..].to_vec() })
}

pub fn parse_hlen(args: &[Bytes]) -> MnemoResult<Command> {
    expect_args(args, 1, "hlen")?;
    Ok(Command::HLen { key: args[0].clone() })
}

/// Run `f` on the hash at `key`, or return `missing` when there is none.
fn with_hash<R>(
    ctx: Context<'_>,
    key: &[u8],
    missing: R,
    f: impl FnOnce(&HashValue) -> R,
) -> MnemoResult<R> {
    ctx.keyspace.read(key, |entry| -> MnemoResult<R> {
        match entry {
            Some(e) => Ok(f(e.value.as_hash()?)),
            None => Ok(missing),
        }
    })
}

/// Returns the number of fields that were newly created.
pub fn hset(ctx: Context<'_>, key: &Bytes, fields: Vec<(Bytes, Bytes)>) -> MnemoResult<Reply> {
    ctx.keyspace.update(key, |slot| -> MnemoResult<Reply> {
        let hash = value_or_insert_with(slot, || Value::Hash(HashValue::new())).as_hash_mut()?;
        let created = fields
            .into_iter()
            .map(|(field, value)| hash.set(field, value))
            .filter(|created| *created)
            .count();
        Ok(Reply::Integer(created as i64))
    })
}

pub fn hget(ctx: Context<'_>, key: &[u8], field: &[u8]) -> MnemoResult<Reply> {
    with_hash(ctx, key, Reply::Nil, |h| Reply::optional_bulk(h.get(field).cloned()))
}

pub fn hmget(ctx: Context<'_>, key: &[u8], fields: &[Bytes]) -> MnemoResult<Reply> {
    let missing = Reply::Array(vec![Reply::Nil; fields.len()]);
    with_hash(ctx, key, missing, |h| {
        Reply::Array(
            fields
                .iter()
                .map(|f| Reply::optional_bulk(h.get(f).cloned()))
                .collect(),
        )
    })
}

pub fn hgetall(ctx: Context<'_>, key: &[u8]) -> MnemoResult<Reply> {
    with_hash(ctx, key, Reply::Map(Vec::new()), |h| {
        Reply::Map(
            h.entries()
                .map(|(field, value)| (field.clone(), Reply::Bulk(value.clone())))
                .collect(),
        )
    })
}

pub fn hincrby(ctx: Context<'_>, key: &Bytes, field: Bytes, delta: i64) -> MnemoResult<Reply> {
    ctx.keyspace.update(key, |slot| -> MnemoResult<Reply> {
        let hash = value_or_insert_with(slot, || Value::Hash(HashValue::new())).as_hash_mut()?;
        Ok(Reply::Integer(hash.incr_by(field, delta)?))
    })
}

pub fn hexists(ctx: Context<'_>, key: &[u8], field: &[u8]) -> MnemoResult<Reply> {
    with_hash(ctx, key, Reply::Bool(false), |h| Reply::Bool(h.contains(field)))
}

pub fn hkeys(ctx: Context<'_>, key: &[u8]) -> MnemoResult<Reply> {
    with_hash(ctx, key, Reply::Array(Vec::new()), |h| {
        Reply::bulk_array(h.keys().cloned())
    })
}

pub fn hdel(ctx: Context<'_>, key: &Bytes, fields: &[Bytes]) -> MnemoResult<Reply> {
    ctx.keyspace.update(key, |slot| -> MnemoResult<Reply> {
        let Some(entry) = slot.as_mut() else {
            return Ok(Reply::Integer(0));
        };
        let hash = entry.value.as_hash_mut()?;
        let removed = fields.iter().filter(|f| hash.remove(f)).count();
        Ok(Reply::Integer(removed as i64))
    })
}

pub fn hlen(ctx: Context<'_>, key: &[u8]) -> MnemoResult<Reply> {
    with_hash(ctx, key, Reply::Integer(0), |h| Reply::Integer(h.len() as i64))
}
