//! Client for the remote model properties indexing service.
//!
//! The service builds an index over one or more design versions, exposes the
//! index's field list, and runs structured queries against it. Both index
//! builds and queries are asynchronous jobs that move through
//! `pending → processing → {finished | failed}`.
//!
//! The agent depends on the [`IndexService`] trait only. [`ModelPropertiesClient`]
//! implements it over HTTP; [`MockIndexService`] (behind the `testing` feature)
//! implements it in memory with call counters.

pub mod client;
pub mod error;
pub mod service;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod mock;

pub use client::{ClientConfig, HttpConnector, ModelPropertiesClient};
pub use error::{ApsError, Result};
#[cfg(any(test, feature = "testing"))]
pub use mock::{CallCounts, MockConnector, MockIndexService};
pub use service::{IndexService, ServiceConnector, SharedIndexService};
pub use types::{
    AccessToken, FieldDescriptor, IndexRequest, IndexStatus, JobState, QueryStatus,
    StructuredQuery, VersionRef,
};
