pub mod archive;
pub mod capture;
pub mod config;
pub mod enhance;
pub mod error;
pub mod labels;
pub mod schedule;
pub mod schema;
pub mod stats;

pub use archive::ArchiveStore;
pub use config::AppConfig;
pub use error::{CoreError, Result};
pub use schema::{BatchDeleteReport, Scope, ScreenshotRecord};
