//! Tollgate - in-process rate limiting and caching for HTTP backends
//!
//! This crate provides a fixed-window rate limiter and a bounded expiring
//! cache, both swept periodically in the background, together with the
//! axum middleware that applies the limiter to inbound requests.

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
pub mod sweeper;
