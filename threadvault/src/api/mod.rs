//! HTTP surface

pub mod error;
pub mod routes;
pub mod server;

pub use error::ErrorBody;
pub use server::{ApiServer, AppState, MetricsRender};
