//! Built-in processors

pub mod headers;
pub mod respond;
pub mod serialize;
pub mod write;

pub use headers::AddHeadersProcessor;
pub use respond::{RespondProcessor, default_status};
pub use serialize::{CollectionSerializer, ResourceSerializer, SerializeProcessor};
pub use write::WriteProcessor;

/// Default processor priorities; higher wraps lower
pub const DEFAULT_PRIORITIES: &[(&str, i32)] = &[
    ("respond", 400),
    ("add_headers", 300),
    ("serialize", 200),
    ("write", 100),
];
