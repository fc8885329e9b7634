//! # Mnemo
//!
//! An embeddable, multi-threaded in-memory data store with Redis-style
//! commands.
//!
//! Mnemo keeps strings, lists, hashes, sets and sorted sets in one shared
//! keyspace with per-key locking, expires keys both lazily and from a
//! background reaper, and fans published messages out to subscriber queues.
//! There is no network transport: callers drive an [`Engine`] directly.

pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod glob;
pub mod pipeline;
pub mod pubsub;
pub mod reaper;
pub mod reply;
pub mod stats;
pub mod store;
pub mod types;

pub use command::Command;
pub use config::Config;
pub use engine::Engine;
pub use error::{MnemoError, MnemoResult};
pub use pipeline::Pipeline;
pub use pubsub::{Message, Subscription};
pub use reply::Reply;
