//! Application services: generation, queue draining and the seams they call.

pub mod error;
pub mod generator;
pub mod jobs;
pub mod locks;
pub mod repos;
pub mod report;
pub mod resolver;
