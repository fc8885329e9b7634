use bytes::Bytes;

use super::{Command, Context, End, arg_to_i64, arg_to_usize, expect_args, expect_min_args};
use crate::error::{MnemoError, MnemoResult};
use crate::reply::Reply;
use crate::store::entry::value_or_insert_with;
use crate::types::Value;
use crate::types::list::ListValue;

pub fn parse_push(args: &[Bytes], name: &str, end: End, only_existing: bool) -> MnemoResult<Command> {
    expect_min_args(args, 2, name)?;
    Ok(Command::Push {
        key: args[0].clone(),
        values: args[1..].to_vec(),
        end,
        only_existing,
    })
}

/// LPOP / RPOP key [count]
pub fn parse_pop(args: &[Bytes], name: &str, end: End) -> MnemoResult<Command> {
    if args.is_empty() || args.len() > 2 {
        return Err(MnemoError::WrongArgCount(name.to_string()));
    }
    let count = args.get(1).map(|c| arg_to_usize(c)).transpose()?;
    Ok(Command::Pop { key: args[0].clone(), end, count })
}

pub fn parse_lrange(args: &[Bytes]) -> MnemoResult<Command> {
    expect_args(args, 3, "lrange")?;
    Ok(Command::LRange {
        key: args[0].clone(),
        start: arg_to_i64(&args[1])?,
        stop: arg_to_i64(&args[2])?,
    })
}

pub fn parse_lindex(args: &[Bytes]) -> MnemoResult<Command> {
    expect_args(args, 2, "lindex")?;
    Ok(Command::LIndex { key: args[0].clone(), index: arg_to_i64(&args[1])? })
}

pub fn parse_llen(args: &[Bytes]) -> MnemoResult<Command> {
    expect_args(args, 1, "llen")?;
    Ok(Command::LLen { key: args[0].clone() })
}

/// Push values one at a time, so LPUSH a b c leaves `c b a` at the head.
/// Returns the new length.
pub fn push(
    ctx: Context<'_>,
    key: &Bytes,
    values: Vec<Bytes>,
    end: End,
    only_existing: bool,
) -> MnemoResult<Reply> {
    ctx.keyspace.update(key, |slot| -> MnemoResult<Reply> {
        if only_existing && slot.is_none() {
            return Ok(Reply::Integer(0));
        }
        let list = value_or_insert_with(slot, || Value::List(ListValue::new())).as_list_mut()?;
        for value in values {
            match end {
                End::Left => list.push_front(value),
                End::Right => list.push_back(value),
            }
        }
        Ok(Reply::Integer(list.len() as i64))
    })
}

/// Without a count: the popped element or nil. With a count: an array of
/// up to `count` elements, or nil when the key is missing.
pub fn pop(ctx: Context<'_>, key: &Bytes, end: End, count: Option<usize>) -> MnemoResult<Reply> {
    ctx.keyspace.update(key, |slot| -> MnemoResult<Reply> {
        let Some(entry) = slot.as_mut() else {
            return Ok(Reply::Nil);
        };
        let list = entry.value.as_list_mut()?;
        let mut pop_one = || match end {
            End::Left => list.pop_front(),
            End::Right => list.pop_back(),
        };
        Ok(match count {
            None => Reply::optional_bulk(pop_one()),
            Some(n) => Reply::bulk_array(std::iter::from_fn(pop_one).take(n)),
        })
    })
}

pub fn lrange(ctx: Context<'_>, key: &[u8], start: i64, stop: i64) -> MnemoResult<Reply> {
    ctx.keyspace.read(key, |entry| -> MnemoResult<Reply> {
        match entry {
            Some(e) => Ok(Reply::bulk_array(e.value.as_list()?.range(start, stop))),
            None => Ok(Reply::Array(Vec::new())),
        }
    })
}

pub fn lindex(ctx: Context<'_>, key: &[u8], index: i64) -> MnemoResult<Reply> {
    ctx.keyspace.read(key, |entry| -> MnemoResult<Reply> {
        match entry {
            Some(e) => Ok(Reply::optional_bulk(e.value.as_list()?.get(index).cloned())),
            None => Ok(Reply::Nil),
        }
    })
}

pub fn llen(ctx: Context<'_>, key: &[u8]) -> MnemoResult<Reply> {
    ctx.keyspace.read(key, |entry| -> MnemoResult<Reply> {
        let len = match entry {
            Some(e) => e.value.as_list()?.len(),
            None => 0,
        };
        Ok(Reply::Integer(len as i64))
    })
}

#[cfg(test)]
mod tests {
    use super::super::tests::{Fixture, bulks};
    use super::*;

    #[test]
    fn test_push_and_range() {
        let f = Fixture::new();
        assert_eq!(f.ok("RPUSH queue a b c"), Reply::Integer(3));
        assert_eq!(f.ok("LRANGE queue 0 -1"), bulks(&["a", "b", "c"]));
        assert_eq!(f.ok("LPUSH queue z"), Reply::Integer(4));
        assert_eq!(f.ok("LRANGE queue 0 -1"), bulks(&["z", "a", "b", "c"]));
        assert_eq!(f.ok("LPUSH other 1 2 3"), Reply::Integer(3));
        assert_eq!(f.ok("LRANGE other 0 -1"), bulks(&["3", "2", "1"]));
    }

    #[test]
    fn test_range_clamps() {
        let f = Fixture::new();
        f.ok("RPUSH l a b c");
        assert_eq!(f.ok("LRANGE l -100 100"), bulks(&["a", "b", "c"]));
        assert_eq!(f.ok("LRANGE l -2 -1"), bulks(&["b", "c"]));
        assert_eq!(f.ok("LRANGE l 2 1"), bulks(&[]));
        assert_eq!(f.ok("LRANGE missing 0 -1"), bulks(&[]));
    }

    #[test]
    fn test_lindex() {
        let f = Fixture::new();
        f.ok("RPUSH l a b c");
        assert_eq!(f.ok("LINDEX l 0"), Reply::bulk("a"));
        assert_eq!(f.ok("LINDEX l -1"), Reply::bulk("c"));
        assert_eq!(f.ok("LINDEX l 3"), Reply::Nil);
        assert_eq!(f.ok("LINDEX l -4"), Reply::Nil);
        assert_eq!(f.ok("LINDEX missing 0"), Reply::Nil);
        assert!(matches!(f.run("LINDEX l x"), Err(MnemoError::NotAnInteger)));
    }

    #[test]
    fn test_pop() {
        let f = Fixture::new();
        f.ok("RPUSH l a b c d");
        assert_eq!(f.ok("LPOP l"), Reply::bulk("a"));
        assert_eq!(f.ok("RPOP l"), Reply::bulk("d"));
        assert_eq!(f.ok("LLEN l"), Reply::Integer(2));
        assert_eq!(f.ok("LPOP l 5"), bulks(&["b", "c"]));
        assert_eq!(f.ok("LPOP l"), Reply::Nil);
        assert_eq!(f.ok("LPOP l 2"), Reply::Nil);
        assert_eq!(f.ok("EXISTS l"), Reply::Integer(0));
        assert_eq!(f.ok("LLEN l"), Reply::Integer(0));
    }

    #[test]
    fn test_pushx() {
        let f = Fixture::new();
        assert_eq!(f.ok("RPUSHX l a"), Reply::Integer(0));
        assert_eq!(f.ok("EXISTS l"), Reply::Integer(0));
        f.ok("RPUSH l a");
        assert_eq!(f.ok("LPUSHX l b"), Reply::Integer(2));
        assert_eq!(f.ok("LRANGE l 0 -1"), bulks(&["b", "a"]));
    }

    #[test]
    fn test_wrong_type() {
        let f = Fixture::new();
        f.ok("SET s v");
        assert!(matches!(f.run("RPUSH s a"), Err(MnemoError::TypeMismatch)));
        assert!(matches!(f.run("LPOP s"), Err(MnemoError::TypeMismatch)));
        assert!(matches!(f.run("LRANGE s 0 -1"), Err(MnemoError::TypeMismatch)));
        assert_eq!(f.ok("GET s"), Reply::bulk("v"));
        assert!(matches!(f.run("LPOP s 1 2"), Err(MnemoError::WrongArgCount(_))));
    }
}
