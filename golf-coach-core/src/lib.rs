pub mod analysis;
pub mod config;
pub mod db;
pub mod error;
pub mod images;
pub mod models;
pub mod prompt;
pub mod vision;

pub use config::GolfCoachConfig;
pub use error::GolfCoachError;
pub use vision::{ClaudeVisionClient, VisionBackend, VisionError, VisionImage, VisionRequest};
