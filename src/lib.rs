//! Renders a dynamic site into a static tree and keeps it consistent with
//! tag-based invalidation and queue-driven regeneration.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
