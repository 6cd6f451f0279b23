pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod geo;
pub mod models;
pub mod notify;
pub mod observability;
pub mod orders;
pub mod presence;
pub mod router;
pub mod session;
pub mod state;
pub mod storage;
