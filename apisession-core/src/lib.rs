//! apisession core - data structures, trait definitions and shared infrastructure
//!
//! Defines the session, storage and token provider abstractions used by the
//! session managers, together with error handling, configuration and logging

pub mod config;
pub mod error;
pub mod logging;
pub mod traits;
pub mod types;

pub use config::*;
pub use error::*;
pub use logging::*;
pub use traits::*;
pub use types::*;

// Re-export commonly used external types
pub use async_trait::async_trait;
pub use tokio;
pub use tracing;
