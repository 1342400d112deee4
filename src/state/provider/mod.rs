//! Built-in providers

pub mod access;
pub mod deserialize;
pub mod negotiate;
pub mod parameters;
pub mod read;
pub mod validate;

pub use access::{AccessCheckProvider, AccessStage};
pub use deserialize::DeserializeProvider;
pub use negotiate::NegotiateProvider;
pub use parameters::{BindParametersProvider, parse_query};
pub use read::ReadProvider;
pub use validate::ValidateProvider;

/// Default provider priorities, higher runs first
pub const DEFAULT_PRIORITIES: &[(&str, i32)] = &[
    ("negotiate", 100),
    ("bind_parameters", 90),
    ("access_pre_read", 80),
    ("read", 50),
    ("deserialize", 40),
    ("access_post_denormalize", 30),
    ("validate", 20),
    ("access_post_validate", 10),
];
