pub mod bus;
pub mod capture;
pub mod config;
pub mod constants;
pub mod dedup;
pub mod diffs;
pub mod error;
pub mod listeners;
pub mod logging;
pub mod metrics;
pub mod monitor;
pub mod pipeline;
pub mod recentchanges;

pub use bus::{EventBus, InMemoryBus};
pub use config::Config;
pub use dedup::DedupStore;
pub use error::{MonitorError, Result};
pub use recentchanges::{ChangeKind, NormalizedChangeEvent, Source};
