//! HTTP API for the tutor learning platform.
//!
//! Wires accounts and sessions ([`auth`]), lessons, saved code and graded
//! runs ([`coursework`]), profile photos ([`avatars`]) behind an axum router with same-origin checks,
//! security headers and per-address login throttling.

#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]

pub mod auth;
pub mod avatars;
pub mod bootstrap;
pub mod config;
pub mod coursework;
pub mod error;
pub mod extract;
pub mod password;
pub mod rate_limit;
pub mod routes;
pub mod security;
pub mod session_cookie;
pub mod state;
pub mod sweeper;

pub use error::ApiError;
