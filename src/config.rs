use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use crate::pubsub::OverflowPolicy;

#[derive(Debug, Clone)]
pub struct Config {
    /// Expiry reaper ticks per second.
    pub hz: u64,
    pub loglevel: String,
    pub active_expire_enabled: bool,
    pub active_expire_sample: usize,
    pub pubsub_queue_capacity: usize,
    pub pubsub_publish_timeout: Duration,
    pub pubsub_overflow: OverflowPolicy,
    /// SCAN page size when no COUNT is given.
    pub scan_count: usize,
}

/// Names accepted by CONFIG GET / CONFIG SET, in listing order.
pub const PARAMETERS: &[&str] = &[
    "hz",
    "loglevel",
    "active-expire",
    "active-expire-sample",
    "pubsub-queue-capacity",
    "pubsub-publish-timeout",
    "pubsub-overflow",
    "scan-count",
];

impl Default for Config {
    fn default() -> Self {
        Config {
            hz: 10,
            loglevel: "info".to_string(),
            active_expire_enabled: true,
            active_expire_sample: 20,
            pubsub_queue_capacity: 1024,
            pubsub_publish_timeout: Duration::from_millis(100),
            pubsub_overflow: OverflowPolicy::Block,
            scan_count: 10,
        }
    }
}

impl Config {
    /// Parse `--name value` pairs. Unknown flags and unparsable values are
    /// ignored and leave the default in place.
    pub fn from_args(args: &[String]) -> Self {
        let mut config = Config::default();
        let mut i = 0;
        while i < args.len() {
            if let Some(name) = args[i].strip_prefix("--") {
                if PARAMETERS.contains(&name) && i + 1 < args.len() {
                    let _ = config.set(name, &args[i + 1]);
                    i += 1;
                }
            }
            i += 1;
        }
        config
    }

    pub fn get(&self, key: &str) -> Option<String> {
        match key.to_lowercase().as_str() {
            "hz" => Some(self.hz.to_string()),
            "loglevel" => Some(self.loglevel.clone()),
            "active-expire" => Some(yes_no(self.active_expire_enabled).to_string()),
            "active-expire-sample" => Some(self.active_expire_sample.to_string()),
            "pubsub-queue-capacity" => Some(self.pubsub_queue_capacity.to_string()),
            "pubsub-publish-timeout" => {
                Some(self.pubsub_publish_timeout.as_millis().to_string())
            }
            "pubsub-overflow" => Some(self.pubsub_overflow.as_str().to_string()),
            "scan-count" => Some(self.scan_count.to_string()),
            _ => None,
        }
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key.to_lowercase().as_str() {
            "hz" => {
                let hz: u64 = value.parse().map_err(|_| "Invalid hz value".to_string())?;
                self.hz = hz.clamp(1, 500);
                Ok(())
            }
            "loglevel" => {
                self.loglevel = value.to_lowercase();
                Ok(())
            }
            "active-expire" => {
                self.active_expire_enabled = parse_yes_no(value)?;
                Ok(())
            }
            "active-expire-sample" => {
                let n: usize = value.parse().map_err(|_| "Invalid value".to_string())?;
                self.active_expire_sample = n.max(1);
                Ok(())
            }
            "pubsub-queue-capacity" => {
                let n: usize = value.parse().map_err(|_| "Invalid value".to_string())?;
                self.pubsub_queue_capacity = n.max(1);
                Ok(())
            }
            "pubsub-publish-timeout" => {
                let ms: u64 = value.parse().map_err(|_| "Invalid value".to_string())?;
                self.pubsub_publish_timeout = Duration::from_millis(ms);
                Ok(())
            }
            "pubsub-overflow" => {
                self.pubsub_overflow = value.parse()?;
                Ok(())
            }
            "scan-count" => {
                let n: usize = value.parse().map_err(|_| "Invalid value".to_string())?;
                self.scan_count = n.max(1);
                Ok(())
            }
            _ => Err(format!("Unknown option or number of arguments for CONFIG SET - '{key}'")),
        }
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

fn parse_yes_no(value: &str) -> Result<bool, String> {
    match value.to_lowercase().as_str() {
        "yes" => Ok(true),
        "no" => Ok(false),
        _ => Err("argument must be 'yes' or 'no'".to_string()),
    }
}

pub type SharedConfig = Arc<RwLock<Config>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_args() {
        let args: Vec<String> = ["--hz", "50", "--pubsub-overflow", "drop-oldest", "--bogus", "1"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let config = Config::from_args(&args);
        assert_eq!(config.hz, 50);
        assert_eq!(config.pubsub_overflow, OverflowPolicy::DropOldest);
        assert_eq!(config.scan_count, 10);
    }

    #[test]
    fn test_get_set() {
        let mut config = Config::default();
        assert_eq!(config.get("active-expire").as_deref(), Some("yes"));
        config.set("active-expire", "no").unwrap();
        assert!(!config.active_expire_enabled);
        config.set("PUBSUB-PUBLISH-TIMEOUT", "250").unwrap();
        assert_eq!(config.get("pubsub-publish-timeout").as_deref(), Some("250"));
        assert!(config.set("hz", "fast").is_err());
        assert!(config.set("pubsub-overflow", "explode").is_err());
        assert!(config.set("nope", "1").is_err());
        assert_eq!(config.get("nope"), None);
    }

    #[test]
    fn test_every_parameter_readable() {
        let config = Config::default();
        for name in PARAMETERS {
            assert!(config.get(name).is_some(), "{name}");
        }
    }
}
