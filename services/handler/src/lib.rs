//! Node-local droplet handler.
//!
//! A long-running daemon, one per host, that receives control messages
//! from the shared pub/sub channel and provisions, boots, tracks, and
//! tears down isolated game-server droplets derived from named templates.
//! Droplet liveness is published back on the channel so the routing proxy
//! can direct clients.
//!
//! ## Architecture
//!
//! ```text
//! main (supervisor: lock, config, signals, shutdown fan-out)
//! ├── bus receive loop ─► codec ─► Handler (lifecycle coordinator)
//! │                                  ├── Registry (identifier → droplet)
//! │                                  ├── Materializer (runtime artifacts)
//! │                                  └── reaper tasks (identify timeout)
//! └── reporter loop (periodic droplet status)
//! ```
//!
//! ## Modules
//!
//! - `handler`: the lifecycle coordinator
//! - `registry`: shared droplet registry with allocation
//! - `bus` / `redis_bus`: channel capabilities and the Redis driver
//! - `materializer` / `workdir`: artifact lifecycle and the filesystem
//!   backend

pub mod bus;
pub mod codec;
pub mod config;
pub mod droplet;
pub mod handler;
pub mod host;
pub mod lock;
pub mod materializer;
pub mod redis_bus;
pub mod registry;
pub mod reporter;
pub mod template;
pub mod workdir;

// Re-export commonly used types
pub use bus::{Bus, BusSubscription, MemoryBus};
pub use config::{Config, Timings};
pub use droplet::Droplet;
pub use handler::Handler;
pub use materializer::{Materializer, MockMaterializer};
pub use registry::Registry;
pub use template::Template;
