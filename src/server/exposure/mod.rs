//! Transport exposures
//!
//! Each exposure consumes a `PlatformHost` and produces a router for its
//! protocol.

pub mod rest;

pub use rest::RestExposure;
