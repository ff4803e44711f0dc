pub mod agent;
pub mod app;
pub mod auth;
pub mod browser;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod handlers;
pub mod html;
pub mod icons;
pub mod models;
pub mod routes;
pub mod threads;
pub mod tools;

// Re-export key functions for convenience
pub use app::{create_app, init_tracing};
