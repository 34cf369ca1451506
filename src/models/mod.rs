// src/models/mod.rs

pub mod assignment;
pub mod group;
pub mod module_version;
pub mod progress;
