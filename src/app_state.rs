use std::sync::Arc;

use crate::config::AppConfig;
use crate::models::{ImageUpload, UserJob};
use crate::services::analysis::{AnalysisClient, AnalysisError};
use crate::services::task::AnalysisTask;

/// Context handed to every consumer that submits or displays jobs.
///
/// Built once at startup and passed explicitly; there is no global client.
#[derive(Debug, Clone)]
pub struct AppContext {
    pub client: Arc<AnalysisClient>,
    pub user_id: String,
    pub demo_mode: bool,
}

impl AppContext {
    pub fn new(client: AnalysisClient, user_id: impl Into<String>, demo_mode: bool) -> Self {
        Self {
            client: Arc::new(client),
            user_id: user_id.into(),
            demo_mode,
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, reqwest::Error> {
        let client = AnalysisClient::new(config.client_settings())?;
        Ok(Self::new(client, config.user_id.clone(), config.demo_mode))
    }

    /// Submit an image for the current user and wait for the job.
    pub async fn submit(&self, image: &ImageUpload, notes: &str) -> Result<UserJob, AnalysisError> {
        let notes = (!notes.is_empty()).then_some(notes);
        self.client.analyze(image, notes, &self.user_id).await
    }

    /// Submit in the background; the returned task can be cancelled or joined.
    pub fn submit_task(&self, image: ImageUpload, notes: &str) -> AnalysisTask {
        let notes = (!notes.is_empty()).then(|| notes.to_string());
        AnalysisTask::spawn(Arc::clone(&self.client), image, notes, self.user_id.clone())
    }
}
