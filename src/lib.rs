//! # This Platform
//!
//! Resource query composition and request state pipeline for REST APIs over
//! relational entities.
//!
//! ## Features
//!
//! - **Query extensions**: eager loading, filters, ordering and pagination
//!   compose one query AST per request
//! - **Pagination strategies**: cheap windows for flat queries, identity
//!   based windows when fetch joins or composite identifiers are involved
//! - **State pipeline**: priority-ordered providers and processors with
//!   content negotiation, access checks, validation and persistence
//! - **Configuration-based**: entities, filters and resources in one YAML
//!   document
//! - **In-memory storage**: the whole pipeline runs without a database
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use platform::prelude::*;
//!
//! let config = PlatformConfig::from_yaml_file("platform.yaml")?;
//! init_tracing(&config.logging)?;
//!
//! let host = Arc::new(PlatformBuilder::new(config).build()?);
//! let app = RestExposure::build_router(host, vec![])?;
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//! axum::serve(listener, app).await?;
//! ```

pub mod config;
pub mod core;
pub mod extension;
pub mod filter;
pub mod query;
pub mod server;
pub mod state;
pub mod storage;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Core ===
    pub use crate::core::{
        AuthContext, AuthPolicy, ClassMetadata, ClassMetadataFactory, CollectionResult,
        HttpMethod, Operation, OperationKind, OrderDirection, Persister, PlatformError,
        PlatformResult, QueryExecutor, ResourceMetadataFactory, Validator,
    };

    // === Query ===
    pub use crate::query::{QueryBuilder, QueryContext};

    // === Extensions & filters ===
    pub use crate::extension::{CollectionExtension, ExtensionPipeline, ItemExtension};
    pub use crate::filter::{FilterRegistry, QueryFilter};

    // === State pipeline ===
    pub use crate::state::{
        Processor, ProcessorNext, Provider, ProviderNext, ResourceData, ResourceRequest,
        ResourceResponse, StateContext, UriVariables,
    };

    // === Config ===
    pub use crate::config::PlatformConfig;

    // === Storage ===
    pub use crate::storage::InMemoryStore;

    // === Server ===
    pub use crate::server::{PlatformBuilder, PlatformHost, RestExposure, init_tracing};

    // === External dependencies ===
    pub use async_trait::async_trait;
    pub use serde_json::{Value, json};
    pub use std::sync::Arc;
}
