//! Toolcrib - Workshop Tool Inventory
//!
//! Tracks tools through check-out, check-in, maintenance and calibration,
//! escalates long check-outs and overdue calibrations, and keeps an audit
//! trail of every change, behind a REST JSON API.

use std::sync::Arc;

pub mod api;
pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}
