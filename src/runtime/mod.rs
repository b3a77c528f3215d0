//! API surface for hosts embedding the pool.

pub mod api;

pub use api::{health, submit_execution, Health, RouteRequest, RouteResponse};
