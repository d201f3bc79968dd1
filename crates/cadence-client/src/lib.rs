//! # cadence-client
//!
//! The surface an application talks to.
//!
//! - [`GenerationSession`]: submit one generation task at a time over the
//!   worker channel and observe its [`SessionRecord`](cadence_core::SessionRecord).
//! - [`CatalogClient`]: list, fetch, download, and delete finished artifacts
//!   through the worker's REST API, and poll jobs started over REST.
//!
//! The two never call each other. A completed session hands back an
//! [`ArtifactDescriptor`](cadence_core::ArtifactDescriptor); turning it into
//! bytes is the caller's choice.

pub mod catalog;
pub mod session;

pub use catalog::{
    ArtifactSummary, BackendStatus, CatalogClient, CatalogError, DeleteReceipt, FileQuery,
    GenerationJob, HealthReport, HealthStatus, JobStatus, Page, SearchResults, SortBy, SortOrder,
    DEFAULT_BASE_URL,
};
pub use session::{GenerationSession, DEFAULT_FALLBACK_GRACE};
