//! Swiftora listing client
//!
//! This library submits a photographed item to the Swiftora analysis backend
//! and decodes the generated listing: detected attributes, comparable
//! listings, a suggested price band and marketing copy.

pub mod app_state;
pub mod config;
pub mod models;
pub mod services;

pub use app_state::AppContext;
pub use config::AppConfig;
pub use models::{Comp, Detected, GeneratedCopy, ImageUpload, SuggestedPrice, UserJob};
pub use services::analysis::{AnalysisClient, AnalysisError, ClientSettings, FailureKind};
