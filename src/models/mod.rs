mod api;

pub use api::{HealthResponse, StatsResponse};
