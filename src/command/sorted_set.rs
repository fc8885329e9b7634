use bytes::Bytes;

use super::{Command, Context, arg_to_f64, arg_to_i64, expect_args, expect_min_args, is_keyword};
use crate::error::{MnemoError, MnemoResult};
use crate::reply::Reply;
use crate::store::entry::value_or_insert_with;
use crate::types::Value;
use crate::types::sorted_set::SortedSetValue;

/// ZADD key score member [score member ...]
pub fn parse_zadd(args: &[Bytes]) -> MnemoResult<Command> {
    if args.len() < 3 || args.len() % 2 != 1 {
        return Err(MnemoError::WrongArgCount("zadd".to_string()));
    }
    let members = args[1..]
        .chunks_exact(2)
        .map(|pair| -> MnemoResult<(f64, Bytes)> { Ok((arg_to_f64(&pair[0])?, pair[1].clone())) })
        .collect::<MnemoResult<Vec<_>>>()?;
    Ok(Command::ZAdd { key: args[0].clone(), members })
}

pub fn parse_zrem(args: &[Bytes]) -> MnemoResult<Command> {
    expect_min_args(args, 2, "zrem")?;
    Ok(Command::ZRem { key: args[0].clone(), members: args[1..].to_vec() })
}

/// ZRANGE key start stop [WITHSCORES] [REV] / ZREVRANGE key start stop [WITHSCORES]
pub fn parse_zrange(args: &[Bytes], name: &str, rev: bool) -> MnemoResult<Command> {
    expect_min_args(args, 3, name)?;
    let mut with_scores = false;
    let mut rev = rev;
    for opt in &args[3..] {
        if is_keyword(opt, "WITHSCORES") {
            with_scores = true;
        } else if is_keyword(opt, "REV") && name == "zrange" {
            rev = true;
        } else {
            return Err(MnemoError::SyntaxError);
        }
    }
    Ok(Command::ZRange {
        key: args[0].clone(),
        start: arg_to_i64(&args[1])?,
        stop: arg_to_i64(&args[2])?,
        with_scores,
        rev,
    })
}

pub fn parse_zrank(args: &[Bytes], name: &str, rev: bool) -> MnemoResult<Command> {
    expect_args(args, 2, name)?;
    Ok(Command::ZRank { key: args[0].clone(), member: args[1].clone(), rev })
}

pub fn parse_zscore(args: &[Bytes]) -> MnemoResult<Command> {
    expect_args(args, 2, "zscore")?;
    Ok(Command::ZScore { key: args[0].clone(), member: args[1].clone() })
}

/// ZRANGEBYSCORE key min max [WITHSCORES]. Bounds are inclusive and may be
/// `-inf` / `+inf`.
pub fn parse_zrangebyscore(args: &[Bytes]) -> MnemoResult<Command> {
    expect_min_args(args, 3, "zrangebyscore")?;
    let with_scores = match &args[3..] {
        [] => false,
        [opt] if is_keyword(opt, "WITHSCORES") => true,
        _ => return Err(MnemoError::SyntaxError),
    };
    Ok(Command::ZRangeByScore {
        key: args[0].clone(),
        min: arg_to_f64(&args[1])?,
        max: arg_to_f64(&args[2])?,
        with_scores,
    })
}

pub fn parse_zincrby(args: &[Bytes]) -> MnemoResult<Command> {
    expect_args(args, 3, "zincrby")?;
    Ok(Command::ZIncrBy {
        key: args[0].clone(),
        delta: arg_to_f64(&args[1])?,
        member: args[2].clone(),
    })
}

pub fn parse_zcard(args: &[Bytes]) -> MnemoResult<Command> {
    expect_args(args, 1, "zcard")?;
    Ok(Command::ZCard { key: args[0].clone() })
}

fn with_zset<R>(
    ctx: Context<'_>,
    key: &[u8],
    missing: R,
    f: impl FnOnce(&SortedSetValue) -> R,
) -> MnemoResult<R> {
    ctx.keyspace.read(key, |entry| -> MnemoResult<R> {
        match entry {
            Some(e) => Ok(f(e.value.as_sorted_set()?)),
            None => Ok(missing),
        }
    })
}

/// Returns the number of members that were added. Re-adding a member only
/// replaces its score.
pub fn zadd(ctx: Context<'_>, key: &Bytes, members: Vec<(f64, Bytes)>) -> MnemoResult<Reply> {
    ctx.keyspace.update(key, |slot| -> MnemoResult<Reply> {
        let zset = value_or_insert_with(slot, || Value::SortedSet(SortedSetValue::new()))
            .as_sorted_set_mut()?;
        let mut added = 0;
        for (score, member) in members {
            if zset.insert(member, score) {
                added += 1;
            }
        }
        Ok(Reply::Integer(added))
    })
}

pub fn zrem(ctx: Context<'_>, key: &Bytes, members: &[Bytes]) -> MnemoResult<Reply> {
    ctx.keyspace.update(key, |slot| -> MnemoResult<Reply> {
        let Some(entry) = slot.as_mut() else {
            return Ok(Reply::Integer(0));
        };
        let zset = entry.value.as_sorted_set_mut()?;
        let removed = members.iter().filter(|m| zset.remove(m)).count();
        Ok(Reply::Integer(removed as i64))
    })
}

pub fn zrange(
    ctx: Context<'_>,
    key: &[u8],
    start: i64,
    stop: i64,
    with_scores: bool,
    rev: bool,
) -> MnemoResult<Reply> {
    with_zset(ctx, key, Reply::Array(Vec::new()), |z| {
        Reply::scored(z.range(start, stop, rev), with_scores)
    })
}

pub fn zrank(ctx: Context<'_>, key: &[u8], member: &[u8], rev: bool) -> MnemoResult<Reply> {
    with_zset(ctx, key, Reply::Nil, |z| {
        let rank = if rev { z.rev_rank(member) } else { z.rank(member) };
        rank.map_or(Reply::Nil, |r| Reply::Integer(r as i64))
    })
}

pub fn zscore(ctx: Context<'_>, key: &[u8], member: &[u8]) -> MnemoResult<Reply> {
    with_zset(ctx, key, Reply::Nil, |z| {
        z.score(member).map_or(Reply::Nil, Reply::Double)
    })
}

pub fn zrangebyscore(
    ctx: Context<'_>,
    key: &[u8],
    min: f64,
    max: f64,
    with_scores: bool,
) -> MnemoResult<Reply> {
    with_zset(ctx, key, Reply::Array(Vec::new()), |z| {
        Reply::scored(z.range_by_score(min, max), with_scores)
    })
}

pub fn zincrby(ctx: Context<'_>, key: &Bytes, delta: f64, member: Bytes) -> MnemoResult<Reply> {
    ctx.keyspace.update(key, |slot| -> MnemoResult<Reply> {
        let zset = value_or_insert_with(slot, || Value::SortedSet(SortedSetValue::new()))
            .as_sorted_set_mut()?;
        Ok(Reply::Double(zset.incr_by(member, delta)?))
    })
}

pub fn zcard(ctx: Context<'_>, key: &[u8]) -> MnemoResult<Reply> {
    with_zset(ctx, key, Reply::Integer(0), |z| Reply::Integer(z.len() as i64))
}
