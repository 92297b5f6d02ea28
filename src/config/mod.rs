use std::time::Duration;

use serde::Deserialize;

use crate::services::analysis::{ClientSettings, DEFAULT_MAX_RESPONSE_BYTES};
use crate::services::image_prep::{EncodingOptions, ImageEncoding, DEFAULT_JPEG_QUALITY};

/// Prefix shared by every environment variable the client reads.
pub const ENV_PREFIX: &str = "SWIFTORA_";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Backend base URL (e.g., "http://localhost:8000")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Identifier sent as the `userId` part
    #[serde(default = "default_user_id")]
    pub user_id: String,

    /// Demo mode talks to a local backend with canned data
    #[serde(default = "default_demo_mode")]
    pub demo_mode: bool,

    /// Whole-request timeout, in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// TCP/TLS connect timeout, in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Largest accepted response body, in bytes
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: usize,

    /// Upload encoding: jpeg, png or original
    #[serde(default)]
    pub image_encoding: ImageEncoding,

    /// JPEG quality 1-100, only used with the jpeg encoding
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_user_id() -> String {
    "demo_user".to_string()
}

fn default_demo_mode() -> bool {
    true
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_max_response_bytes() -> usize {
    DEFAULT_MAX_RESPONSE_BYTES
}

fn default_jpeg_quality() -> u8 {
    DEFAULT_JPEG_QUALITY
}

impl AppConfig {
    /// Load from `SWIFTORA_*` environment variables, reading `.env` first.
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        Self::from_vars(std::env::vars())
    }

    /// Load from an explicit set of variables, without touching `.env`.
    pub fn from_vars<I>(vars: I) -> Result<Self, envy::Error>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::prefixed(ENV_PREFIX).from_iter(vars)
    }

    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            base_url: self.base_url.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            max_response_bytes: self.max_response_bytes,
            encoding: EncodingOptions {
                encoding: self.image_encoding,
                jpeg_quality: self.jpeg_quality.clamp(1, 100),
            },
        }
    }
}
