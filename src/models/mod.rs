pub mod health;
pub mod job;
pub mod request;

pub use health::HealthStatus;
pub use job::{Comp, Detected, GeneratedCopy, SuggestedPrice, UserJob};
pub use request::{AnalyzeRequest, FormPart, ImageUpload};
