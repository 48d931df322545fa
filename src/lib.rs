//! Libris digital library server
//!
//! REST JSON API for a lending library: catalog, borrowing lifecycle with
//! fines and timed auto-cancellation, reviews, favorites, notifications and
//! an admin-approved password reset workflow.

use std::sync::Arc;

pub mod api;
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
