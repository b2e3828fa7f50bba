//! Operator control panel over HTTP

pub mod routes;

pub use routes::{build_router, AppError};
