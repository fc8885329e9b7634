use bytes::Bytes;

use super::{Command, Context, arg_to_string, expect_args};
use crate::error::{MnemoError, MnemoResult};
use crate::reply::Reply;

pub fn parse_publish(args: &[Bytes]) -> MnemoResult<Command> {
    expect_args(args, 2, "publish")?;
    Ok(Command::Publish {
        channel: args[0].clone(),
        message: args[1].clone(),
    })
}

/// PUBSUB CHANNELS [pattern] | PUBSUB NUMSUB [channel ...] | PUBSUB NUMPAT
pub fn parse_pubsub(args: &[Bytes]) -> MnemoResult<Command> {
    let Some((sub, rest)) = args.split_first() else {
        return Err(MnemoError::WrongArgCount("pubsub".to_string()));
    };
    let sub = arg_to_string(sub).to_uppercase();
    match (sub.as_str(), rest) {
        ("CHANNELS", []) => Ok(Command::PubSubChannels { pattern: None }),
        ("CHANNELS", [pattern]) => Ok(Command::PubSubChannels {
            pattern: Some(pattern.clone()),
        }),
        ("NUMSUB", channels) => Ok(Command::PubSubNumSub { channels: channels.to_vec() }),
        ("NUMPAT", []) => Ok(Command::PubSubNumPat),
        _ => Err(MnemoError::Generic(format!(
            "unknown subcommand or wrong number of arguments for PUBSUB {sub}"
        ))),
    }
}

/// Returns the number of subscribers that received the message.
pub fn publish(ctx: Context<'_>, channel: &Bytes, message: &Bytes) -> Reply {
    Reply::Integer(ctx.broker.publish(channel, message) as i64)
}

pub fn channels(ctx: Context<'_>, pattern: Option<&[u8]>) -> Reply {
    Reply::bulk_array(ctx.broker.channels(pattern))
}

pub fn numsub(ctx: Context<'_>, channels: &[Bytes]) -> Reply {
    Reply::Map(
        ctx.broker
            .numsub(channels)
            .into_iter()
            .map(|(channel, n)| (channel, Reply::Integer(n as i64)))
            .collect(),
    )
}

pub fn numpat(ctx: Context<'_>) -> Reply {
    Reply::Integer(ctx.broker.numpat() as i64)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::super::tests::{Fixture, bulks};
    use super::*;

    fn b(s: &'static str) -> Bytes {
        Bytes::from_static(s.as_bytes())
    }

    #[test]
    fn test_publish_counts_receivers() {
        let f = Fixture::new();
        assert_eq!(f.ok("PUBLISH news hello"), Reply::Integer(0));

        let first = f.broker.subscriber();
        let second = f.broker.subscriber();
        first.subscribe(&[b("news")]);
        second.subscribe(&[b("news"), b("sports")]);
        assert_eq!(f.ok("PUBLISH news hello"), Reply::Integer(2));
        assert_eq!(f.ok("PUBLISH sports goal"), Reply::Integer(1));

        let got = first.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(got.channel, b("news"));
        assert_eq!(got.payload, b("hello"));
        assert_eq!(second.pending(), 2);
    }

    #[test]
    fn test_no_replay_for_late_subscribers() {
        let f = Fixture::new();
        f.ok("PUBLISH news early");
        let sub = f.broker.subscriber();
        sub.subscribe(&[b("news")]);
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn test_introspection() {
        let f = Fixture::new();
        let a = f.broker.subscriber();
        let c = f.broker.subscriber();
        a.subscribe(&[b("news.tech"), b("weather")]);
        c.subscribe(&[b("news.tech")]);
        c.psubscribe(&[b("news.*")]);

        assert_eq!(f.ok("PUBSUB CHANNELS"), bulks(&["news.tech", "weather"]));
        assert_eq!(f.ok("PUBSUB CHANNELS news.*"), bulks(&["news.tech"]));
        assert_eq!(
            f.ok("PUBSUB NUMSUB news.tech weather nobody"),
            Reply::Map(vec![
                (b("news.tech"), Reply::Integer(2)),
                (b("weather"), Reply::Integer(1)),
                (b("nobody"), Reply::Integer(0)),
            ])
        );
        assert_eq!(f.ok("PUBSUB NUMPAT"), Reply::Integer(1));
        assert_eq!(f.ok("PUBLISH news.tech x"), Reply::Integer(3));

        drop(c);
        assert_eq!(f.ok("PUBSUB NUMPAT"), Reply::Integer(0));
        assert!(f.run("PUBSUB NUMPAT extra").is_err());
        assert!(f.run("PUBSUB").is_err());
    }
}
