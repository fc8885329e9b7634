use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{RecvTimeoutError, Sender, bounded};
use tracing::{debug, info};

use crate::config::SharedConfig;
use crate::error::MnemoResult;
use crate::store::Keyspace;

/// Upper bound on sampling rounds in one cycle.
const MAX_ROUNDS: usize = 16;

/// Sample keys that carry an expiry and remove the ones that are due.
/// Repeats while more than a quarter of a sample was expired. Returns the
/// number of keys removed.
pub fn active_expire_cycle(keyspace: &Keyspace, sample_size: usize) -> usize {
    let mut total = 0;
    for _ in 0..MAX_ROUNDS {
        let sample = keyspace.sample_volatile(sample_size);
        if sample.is_empty() {
            break;
        }
        let expired = sample
            .iter()
            .filter(|key| keyspace.expire_if_due(key))
            .count();
        total += expired;
        if expired * 4 <= sample.len() {
            break;
        }
    }
    if total > 0 {
        debug!(expired = total, "active expire cycle");
    }
    total
}

/// Background thread running [`active_expire_cycle`] `hz` times a second.
/// Stops when shut down or dropped.
#[derive(Debug)]
pub struct ExpiryReaper {
    stop: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl ExpiryReaper {
    pub fn spawn(keyspace: Arc<Keyspace>, config: SharedConfig) -> MnemoResult<Self> {
        let (stop, stopped) = bounded::<()>(1);
        let handle = thread::Builder::new()
            .name("mnemo-expiry".to_owned())
            .spawn(move || {
                loop {
                    let (hz, enabled, sample) = {
                        let cfg = config.read();
                        (cfg.hz, cfg.active_expire_enabled, cfg.active_expire_sample)
                    };
                    let interval = Duration::from_millis(1000 / hz.max(1));
                    match stopped.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    if enabled {
                        active_expire_cycle(&keyspace, sample);
                    }
                }
                debug!("expiry reaper stopped");
            })?;
        info!("expiry reaper started");
        Ok(ExpiryReaper {
            stop,
            handle: Some(handle),
        })
    }

    pub fn shutdown(&mut self) {
        let _ = self.stop.try_send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ExpiryReaper {
    fn drop(&mut self) {
        self.shutdown();
    }
}
