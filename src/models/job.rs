use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};

/// Attributes the backend managed to extract from the photographed item.
///
/// Every field is best-effort. `None` means the backend did not report the
/// attribute at all, which is distinct from `Some("")`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct Detected {
    #[garde(skip)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    #[garde(skip)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,

    #[garde(skip)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[garde(skip)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,

    #[garde(skip)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,

    #[garde(skip)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    #[garde(skip)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notable_features: Option<Vec<String>>,

    #[garde(skip)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defects: Option<Vec<String>>,
}

/// A comparable marketplace listing used as pricing evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Comp {
    #[garde(skip)]
    pub source: String,

    #[garde(skip)]
    pub url: String,

    #[garde(range(min = 0.0))]
    pub price: f64,

    #[garde(length(min = 1))]
    pub currency: String,

    #[garde(skip)]
    pub title: String,

    #[garde(skip)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[garde(skip)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    #[garde(range(min = 0.0))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipping: Option<f64>,
}

/// Suggested low/mid/high price band with a confidence score in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
pub struct SuggestedPrice {
    #[garde(range(min = 0.0))]
    pub low: f64,

    #[garde(range(min = 0.0))]
    pub mid: f64,

    #[garde(range(min = 0.0))]
    pub high: f64,

    #[garde(range(min = 0.0, max = 1.0))]
    pub confidence: f64,
}

impl SuggestedPrice {
    /// Whether the band satisfies `low <= mid <= high`.
    ///
    /// Decoding never enforces this; consumers that rely on it should check.
    pub fn is_ordered(&self) -> bool {
        self.low <= self.mid && self.mid <= self.high
    }
}

/// Templated listing title and display-ordered bullet points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct GeneratedCopy {
    #[garde(length(min = 1))]
    pub title: String,

    #[garde(skip)]
    pub bullets: Vec<String>,
}

impl GeneratedCopy {
    /// Bullets joined one per line.
    pub fn description(&self) -> String {
        self.bullets.join("\n")
    }

    /// Title, a blank line, then the description.
    pub fn full_text(&self) -> String {
        format!("{}\n\n{}", self.title, self.description())
    }
}

/// One completed analysis result for one submitted image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UserJob {
    #[garde(skip)]
    pub id: String,

    #[garde(skip)]
    pub user_id: String,

    #[garde(skip)]
    pub image_url: String,

    #[garde(skip)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    #[garde(dive)]
    pub detected: Detected,

    #[garde(dive)]
    pub comps: Vec<Comp>,

    #[garde(dive)]
    pub suggested_price: SuggestedPrice,

    #[garde(dive)]
    pub copy: GeneratedCopy,

    /// Kept exactly as the backend sent it.
    #[garde(skip)]
    pub created_at: String,
}

impl UserJob {
    /// Decode a backend response body.
    pub fn from_json_slice(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    /// Decode a job from JSON text.
    pub fn from_json_str(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }

    /// Compact JSON with absent optional fields omitted.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Indented form of [`UserJob::to_json`].
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parse `createdAt` as an RFC 3339 timestamp.
    pub fn created_at_utc(&self) -> Result<DateTime<Utc>, chrono::ParseError> {
        DateTime::parse_from_rfc3339(&self.created_at).map(|dt| dt.with_timezone(&Utc))
    }

    /// Consumer-side sanity checks. Decoding does not run these.
    ///
    /// Returns every problem found, one human-readable line each.
    pub fn check(&self) -> Result<(), Vec<String>> {
        let mut problems = Vec::new();

        if let Err(report) = self.validate() {
            for (path, error) in report.iter() {
                problems.push(format!("{}: {}", path, error));
            }
        }

        if !self.suggested_price.is_ordered() {
            let band = &self.suggested_price;
            problems.push(format!(
                "suggestedPrice: expected low <= mid <= high, got {} / {} / {}",
                band.low, band.mid, band.high
            ));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems)
        }
    }
}
