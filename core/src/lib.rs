pub mod backoff;
pub mod config;
pub mod error;
pub mod telemetry;

pub use config::{Config, FilterKind, Granularity, Target};
pub use error::{Error, Result};
