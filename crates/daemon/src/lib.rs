// Re-export modules for library use
pub mod api;
pub mod config;
pub mod controller;
pub mod server;
pub mod stream;
