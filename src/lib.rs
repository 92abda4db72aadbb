// Exports the application modules for the binary and the tests.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod logger;
pub mod middleware;
pub mod models;
pub mod schema;
pub mod services;
pub mod vision;

// Re-export common types
pub use crate::config::AppConfig;
pub use crate::config::DbPool;
pub use crate::errors::ApiError;
pub use crate::middleware::UserSession;
pub use crate::vision::VisionClient;
