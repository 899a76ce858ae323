//! API Gateway reverse proxy with a Basic-Auth custom authorizer.
//!
//! Two Lambda entry points share this library:
//! - `lambda-auth-proxy` forwards every request to a single `UPSTREAM` origin.
//! - `authorizer` checks Basic credentials against SSM Parameter Store.

pub mod authorizer;
pub mod cache;
pub mod config;
pub mod logging;
pub mod models;
pub mod proxy;
pub mod retry;
pub mod secrets;
