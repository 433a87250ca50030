// src/lib.rs

pub mod config;
pub mod error;
pub mod task_type;
pub mod context;
pub mod provider;
pub mod client;
pub mod optimizer;
pub mod extractor;
pub mod session;
pub mod storage;
pub mod workflow;

pub use config::EngineConfig;
pub use error::{EngineError, Result};
