use bytes::Bytes;

use super::{Command, Context, expect_args, expect_min_args};
use crate::error::MnemoResult;
use crate::reply::Reply;
use crate::store::entry::value_or_insert_with;
use crate::types::Value;
use crate::types::set::{self as algebra, SetValue};

/// Set algebra operations over several keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algebra {
    Inter,
    Union,
    Diff,
}

pub fn parse_sadd(args: &[Bytes]) -> MnemoResult<Command> {
    expect_min_args(args, 2, "sadd")?;
    Ok(Command::SAdd { key: args[0].clone(), members: args[1..].to_vec() })
}

pub fn parse_srem(args: &[Bytes]) -> MnemoResult<Command> {
    expect_min_args(args, 2, "srem")?;
    Ok(Command::SRem { key: args[0].clone(), members: args[1..].to_vec() })
}

pub fn parse_smembers(args: &[Bytes]) -> MnemoResult<Command> {
    expect_args(args, 1, "smembers")?;
    Ok(Command::SMembers { key: args[0].clone() })
}

pub fn parse_sismember(args: &[Bytes]) -> MnemoResult<Command> {
    expect_args(args, 2, "sismember")?;
    Ok(Command::SIsMember { key: args[0].clone(), member: args[1].clone() })
}

pub fn parse_scard(args: &[Bytes]) -> MnemoResult<Command> {
    expect_args(args, 1, "scard")?;
    Ok(Command::SCard { key: args[0].clone() })
}

/// SINTER / SUNION / SDIFF key [key ...]
pub fn parse_multi(args: &[Bytes], name: &str) -> MnemoResult<Vec<Bytes>> {
    expect_min_args(args, 1, name)?;
    Ok(args.to_vec())
}

/// Set members come back sorted so replies are stable.
fn sorted_members(members: impl IntoIterator<Item = Bytes>) -> Reply {
    let mut members: Vec<Bytes> = members.into_iter().collect();
    members.sort_unstable();
    Reply::bulk_array(members)
}

pub fn sadd(ctx: Context<'_>, key: &Bytes, members: Vec<Bytes>) -> MnemoResult<Reply> {
    ctx.keyspace.update(key, |slot| -> MnemoResult<Reply> {
        let set = value_or_insert_with(slot, || Value::Set(SetValue::new())).as_set_mut()?;
        let mut added = 0;
        for member in members {
            if set.add(member) {
                added += 1;
            }
        }
        Ok(Reply::Integer(added))
    })
}

pub fn srem(ctx: Context<'_>, key: &Bytes, members: &[Bytes]) -> MnemoResult<Reply> {
    ctx.keyspace.update(key, |slot| -> MnemoResult<Reply> {
        let Some(entry) = slot.as_mut() else {
            return Ok(Reply::Integer(0));
        };
        let set = entry.value.as_set_mut()?;
        let removed = members.iter().filter(|m| set.remove(m)).count();
        Ok(Reply::Integer(removed as i64))
    })
}

pub fn smembers(ctx: Context<'_>, key: &[u8]) -> MnemoResult<Reply> {
    ctx.keyspace.read(key, |entry| -> MnemoResult<Reply> {
        match entry {
            Some(e) => Ok(sorted_members(e.value.as_set()?.iter().cloned())),
            None => Ok(Reply::Array(Vec::new())),
        }
    })
}

pub fn sismember(ctx: Context<'_>, key: &[u8], member: &[u8]) -> MnemoResult<Reply> {
    ctx.keyspace.read(key, |entry| -> MnemoResult<Reply> {
        match entry {
            Some(e) => Ok(Reply::Bool(e.value.as_set()?.contains(member))),
            None => Ok(Reply::Bool(false)),
        }
    })
}

pub fn scard(ctx: Context<'_>, key: &[u8]) -> MnemoResult<Reply> {
    ctx.keyspace.read(key, |entry| -> MnemoResult<Reply> {
        let len = match entry {
            Some(e) => e.value.as_set()?.len(),
            None => 0,
        };
        Ok(Reply::Integer(len as i64))
    })
}

/// SINTER / SUNION / SDIFF. Every operand is locked for the duration, so
/// the result reflects one instant. Missing keys are empty sets; any
/// non-set operand fails the whole command.
pub fn combine(ctx: Context<'_>, keys: &[Bytes], op: Algebra) -> MnemoResult<Reply> {
    ctx.keyspace.with_locked(keys, |locked| -> MnemoResult<Reply> {
        let operands = keys
            .iter()
            .map(|k| locked.get(k).map(|e| e.value.as_set()).transpose())
            .collect::<MnemoResult<Vec<Option<&SetValue>>>>()?;
        let result = match op {
            Algebra::Inter => algebra::intersection(&operands),
            Algebra::Union => algebra::union(&operands),
            Algebra::Diff => algebra::difference(&operands),
        };
        Ok(sorted_members(result))
    })
}
