use std::fmt::Write;
use std::time::Duration;

use dashmap::DashMap;

/// Per-command counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandStat {
    pub calls: u64,
    pub failed: u64,
    pub usec: u64,
}

impl CommandStat {
    pub fn usec_per_call(&self) -> f64 {
        if self.calls == 0 {
            0.0
        } else {
            self.usec as f64 / self.calls as f64
        }
    }
}

/// Call counts and cumulative latency keyed by lowercase command name.
#[derive(Debug, Default)]
pub struct CommandStats {
    stats: DashMap<&'static str, CommandStat>,
}

impl CommandStats {
    pub fn new() -> Self {
        CommandStats::default()
    }

    pub fn record(&self, name: &'static str, elapsed: Duration, failed: bool) {
        let mut stat = self.stats.entry(name).or_default();
        stat.calls += 1;
        stat.usec += elapsed.as_micros() as u64;
        if failed {
            stat.failed += 1;
        }
    }

    pub fn get(&self, name: &str) -> Option<CommandStat> {
        self.stats.get(name).map(|r| *r.value())
    }

    /// All counters, sorted by command name.
    pub fn snapshot(&self) -> Vec<(&'static str, CommandStat)> {
        let mut all: Vec<(&'static str, CommandStat)> =
            self.stats.iter().map(|r| (*r.key(), *r.value())).collect();
        all.sort_by_key(|(name, _)| *name);
        all
    }

    pub fn total_calls(&self) -> u64 {
        self.stats.iter().map(|r| r.value().calls).sum()
    }

    pub fn reset(&self) {
        self.stats.clear();
    }

    /// The `# Commandstats` INFO section.
    pub fn render(&self) -> String {
        let mut out = String::from("# Commandstats\r\n");
        for (name, stat) in self.snapshot() {
            let _ = write!(
                out,
                "cmdstat_{name}:calls={},usec={},usec_per_call={:.2},failed={}\r\n",
                stat.calls,
                stat.usec,
                stat.usec_per_call(),
                stat.failed
            );
        }
        out
    }
}
