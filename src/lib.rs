//! webserv - Event-driven static HTTP server
//!
//! Core library: HTTP parsing and response writing, the readiness reactor
//! with its worker pool and idle timers, and the credential store behind
//! the login and registration pages.

pub mod config;
pub mod http;
pub mod server;
pub mod store;
pub mod sync;
