//! Request parameters → validated spec → backend request.

pub mod builder;
pub mod params;
pub mod request;
pub mod spec;

pub use builder::{build, build_lookup};
pub use params::{parse, RawParams};
pub use request::{BackendRequest, Clause, ExactLookup, RangeBounds, SortSpec};
pub use spec::{QuerySpec, SortDir, SortField};
