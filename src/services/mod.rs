// src/services/mod.rs

pub mod attempt_service;

pub use attempt_service::{AttemptService, ModuleCompletion};
