//! Quaderno: a small notes and blog API with rotating refresh-token sessions.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
