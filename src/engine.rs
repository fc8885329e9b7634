use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use parking_lot::{Mutex, MutexGuard, RwLock};
use tracing::{debug, info};

use crate::command::{self, Command, Context};
use crate::config::{Config, SharedConfig};
use crate::error::MnemoResult;
use crate::pipeline::Pipeline;
use crate::pubsub::{Broker, Subscription};
use crate::reaper::ExpiryReaper;
use crate::reply::Reply;
use crate::stats::CommandStats;
use crate::store::Keyspace;
use crate::store::clock::{Clock, SystemClock};

struct Inner {
    keyspace: Arc<Keyspace>,
    broker: Arc<Broker>,
    config: SharedConfig,
    stats: CommandStats,
    /// Held for the length of a pipeline so two pipelines never interleave.
    pipeline_gate: Mutex<()>,
    reaper: Mutex<Option<ExpiryReaper>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(mut reaper) = self.reaper.get_mut().take() {
            reaper.shutdown();
        }
        info!("engine stopped");
    }
}

/// A shared handle to one keyspace, its pub/sub broker and its expiry
/// reaper. Cloning is cheap and every clone talks to the same data, so
/// hand one to each thread.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("keys", &self.inner.keyspace.resident_len())
            .field("broker", &self.inner.broker)
            .finish()
    }
}

impl Engine {
    pub fn new(config: Config) -> MnemoResult<Self> {
        Engine::with_clock(config, Arc::new(SystemClock))
    }

    /// Build an engine whose expiry decisions use `clock`.
    pub fn with_clock(config: Config, clock: Arc<dyn Clock>) -> MnemoResult<Self> {
        let hz = config.hz;
        let config: SharedConfig = Arc::new(RwLock::new(config));
        let keyspace = Arc::new(Keyspace::new(clock));
        let broker = Arc::new(Broker::new(Arc::clone(&config)));
        let reaper = ExpiryReaper::spawn(Arc::clone(&keyspace), Arc::clone(&config))?;
        info!(hz, "engine started");
        Ok(Engine {
            inner: Arc::new(Inner {
                keyspace,
                broker,
                config,
                stats: CommandStats::new(),
                pipeline_gate: Mutex::new(()),
                reaper: Mutex::new(Some(reaper)),
            }),
        })
    }

    fn context(&self) -> Context<'_> {
        Context {
            keyspace: &self.inner.keyspace,
            broker: &self.inner.broker,
            config: &self.inner.config,
            stats: &self.inner.stats,
        }
    }

    /// Run one command and record it in the command statistics.
    pub fn execute(&self, cmd: Command) -> MnemoResult<Reply> {
        let name = cmd.name();
        let write = cmd.is_write();
        let started = Instant::now();
        let result = command::execute(self.context(), cmd);
        self.inner
            .stats
            .record(name, started.elapsed(), result.is_err());
        if let Err(e) = &result {
            debug!(command = name, write, error = %e, "command failed");
        }
        result
    }

    /// Parse `argv` (command name first) and run it.
    pub fn call<A: AsRef<[u8]>>(&self, argv: &[A]) -> MnemoResult<Reply> {
        self.execute(parse_argv(argv)?)
    }

    /// Start a batch of commands that runs as one uninterrupted sequence
    /// with respect to other pipelines.
    pub fn pipeline(&self) -> Pipeline<'_> {
        Pipeline::new(self)
    }

    pub(crate) fn lock_pipeline(&self) -> MutexGuard<'_, ()> {
        self.inner.pipeline_gate.lock()
    }

    /// A subscriber handle with no subscriptions yet.
    pub fn subscriber(&self) -> Subscription {
        self.inner.broker.subscriber()
    }

    /// A subscriber handle already subscribed to `channels`.
    pub fn subscribe(&self, channels: &[Bytes]) -> Subscription {
        let sub = self.subscriber();
        sub.subscribe(channels);
        sub
    }

    /// A subscriber handle already subscribed to the glob `patterns`.
    pub fn psubscribe(&self, patterns: &[Bytes]) -> Subscription {
        let sub = self.subscriber();
        sub.psubscribe(patterns);
        sub
    }

    pub fn keyspace(&self) -> &Keyspace {
        &self.inner.keyspace
    }

    pub fn broker(&self) -> &Broker {
        &self.inner.broker
    }

    pub fn config(&self) -> &SharedConfig {
        &self.inner.config
    }

    pub fn stats(&self) -> &CommandStats {
        &self.inner.stats
    }

    /// Stop the expiry reaper. Commands keep working; expired keys are then
    /// only removed lazily on access.
    pub fn shutdown(&self) {
        if let Some(mut reaper) = self.inner.reaper.lock().take() {
            reaper.shutdown();
            info!("expiry reaper shut down");
        }
    }
}

pub(crate) fn parse_argv<A: AsRef<[u8]>>(argv: &[A]) -> MnemoResult<Command> {
    let argv: Vec<Bytes> = argv
        .iter()
        .map(|a| Bytes::copy_from_slice(a.as_ref()))
        .collect();
    Command::from_args(&argv)
}
