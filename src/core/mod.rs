//! Core module containing fundamental types and seams of the platform

pub mod auth;
pub mod error;
pub mod metadata;
pub mod operation;
pub mod paginator;
pub mod priority;
pub mod service;
pub mod validation;

pub use auth::{AuthContext, AuthPolicy};
pub use error::{PlatformError, PlatformResult};
pub use metadata::{
    Association, AssociationKind, ClassMetadata, ClassMetadataFactory, EntityMetadataRegistry,
    FetchMode, FieldType, IdentifierShape, ResourceMetadata, ResourceMetadataFactory,
    ResourceMetadataRegistry,
};
pub use operation::{HttpMethod, Operation, OperationKind, OrderDirection, PaginationOptions};
pub use paginator::{CollectionResult, Paginator, PartialPaginator};
pub use priority::{PriorityTable, Registration, StageTag};
pub use service::{
    Change, PageRequest, PageSlice, PaginationStrategy, Persister, QueryExecutor, UnitOfWork,
};
pub use validation::{RuleValidator, ValidationRule, Validator};
