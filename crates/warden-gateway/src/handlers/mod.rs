//! HTTP request handlers.

pub mod health;
pub mod permissions;
pub mod roles;
