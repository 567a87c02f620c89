//! # r2s-server
//!
//! Axum HTTP surface for the revision pipeline.
//!
//! - `/api/solve`, `/api/save`, `/api/download-csv`: stateless pipeline calls
//! - `/api/db-status` and `/api/snapshots/*`: optional snapshot persistence
//! - `/health`: liveness check

#![deny(unsafe_code)]

pub mod config;
pub mod error;
mod form;
mod handlers;
pub mod health;
pub mod server;
mod snapshots;

pub use config::ServerConfig;
pub use error::ApiError;
pub use server::{build_router, start, AppState, ServerHandle};
