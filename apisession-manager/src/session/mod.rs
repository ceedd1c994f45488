//! Session Management Module
//!
//! Token session variants and the session manager that keeps them alive.

pub mod manager;
pub mod options;
pub mod types;

pub use manager::SessionManager;
pub use options::ResolvedOptions;
pub use types::*;
