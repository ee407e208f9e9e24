pub mod aggregations;
pub mod analyzer;
pub mod api;
pub mod backend;
pub mod config;
pub mod content_type;
pub mod error;
pub mod gateway;
pub mod ids;
pub mod metrics;
pub mod normalize;
pub mod query;
pub mod time_range;

pub use config::Config;
pub use content_type::ContentType;
pub use error::{Error, Result, ValidationError};
pub use gateway::Gateway;
pub use normalize::NormalizedResult;
