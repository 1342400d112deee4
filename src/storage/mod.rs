//! Storage implementations

pub(crate) mod eval;
pub mod in_memory;

pub use in_memory::InMemoryStore;
