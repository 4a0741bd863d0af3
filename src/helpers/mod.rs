//! Filesystem and path helpers shared across the engine.
pub mod fs;
pub mod paths;
