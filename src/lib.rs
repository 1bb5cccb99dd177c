pub mod browser;
pub mod config;
pub mod engine;
pub mod extractor;
pub mod models;
pub mod retry;
pub mod scheduler;
pub mod utils;

// Re-export commonly used types
pub use config::AppConfig;
pub use engine::{BatchHandle, ExecuteOptions, ScrapingEngine};
pub use models::{
    BatchReport, BatchStats, ListingStatus, Marketplace, ProgressEvent, ScrapingResult, ScrapingTask,
};
pub use utils::error::AppError;

pub type Result<T> = std::result::Result<T, AppError>;
