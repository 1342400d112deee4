//! Building and hosting the platform
//!
//! [`PlatformBuilder`] turns a [`PlatformConfig`](crate::config::PlatformConfig)
//! into a [`PlatformHost`]; exposures route transport requests into it.

pub mod builder;
pub mod exposure;
pub mod host;
pub mod response;
pub mod telemetry;

pub use builder::PlatformBuilder;
pub use exposure::RestExposure;
pub use host::PlatformHost;
pub use response::ErrorMapper;
pub use telemetry::init_tracing;
