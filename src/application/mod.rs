//! Application services layer.

pub mod audit;
pub mod auth;
pub mod error;
pub mod posts;
pub mod repos;
pub mod uploads;
