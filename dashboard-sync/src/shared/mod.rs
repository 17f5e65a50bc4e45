/// Shared modules for the dashboard sync library
pub mod analytics;
pub mod coerce;
pub mod derived;
pub mod rest;
pub mod store;
pub mod types;
pub mod websocket;
