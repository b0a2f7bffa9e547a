//! Easytrip - Group Trip Planning API
//!
//! This crate implements the core of a multi-tenant trip planning service:
//! travel groups with members, destinations, shared expenses and polls.
//! Requests are admitted by a per-client token bucket, authenticated with a
//! bearer token and only see groups the caller belongs to. Multi-row writes
//! are atomic and each user votes at most once per poll.

pub mod auth;
pub mod config;
pub mod error;
pub mod gate;
pub mod http;
pub mod membership;
pub mod model;
pub mod ratelimit;
pub mod store;
