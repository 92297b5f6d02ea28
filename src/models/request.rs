use garde::Validate;
use reqwest::multipart::{Form, Part};

use crate::services::image_prep::PreparedImage;

pub const FILE_PART: &str = "file";
pub const NOTES_PART: &str = "notes";
pub const USER_ID_PART: &str = "userId";

/// Raw image handed in by the caller, before any re-encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub bytes: Vec<u8>,
    /// Declared content type, e.g. `image/heic` or `image/png`. Only logged:
    /// the type sent to the backend is sniffed from `bytes`.
    pub content_type: String,
}

impl ImageUpload {
    pub fn new(bytes: impl Into<Vec<u8>>, content_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: content_type.into(),
        }
    }
}

/// Description of one multipart part, used for logging and inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormPart {
    pub name: &'static str,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub len: usize,
}

/// A fully prepared `/analyze` request.
#[derive(Debug, Clone, Validate)]
pub struct AnalyzeRequest {
    #[garde(skip)]
    image: PreparedImage,

    #[garde(skip)]
    notes: Option<String>,

    #[garde(length(min = 1))]
    user_id: String,
}

impl AnalyzeRequest {
    /// Empty notes are treated the same as no notes.
    pub fn new(image: PreparedImage, notes: Option<&str>, user_id: &str) -> Self {
        Self {
            image,
            notes: notes.filter(|n| !n.is_empty()).map(str::to_string),
            user_id: user_id.to_string(),
        }
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn image(&self) -> &PreparedImage {
        &self.image
    }

    /// The parts `into_form` will emit, in order.
    pub fn parts(&self) -> Vec<FormPart> {
        let mut parts = vec![FormPart {
            name: FILE_PART,
            file_name: Some(self.image.file_name.clone()),
            content_type: Some(self.image.content_type.clone()),
            len: self.image.bytes.len(),
        }];

        if let Some(notes) = &self.notes {
            parts.push(FormPart {
                name: NOTES_PART,
                file_name: None,
                content_type: None,
                len: notes.len(),
            });
        }

        parts.push(FormPart {
            name: USER_ID_PART,
            file_name: None,
            content_type: None,
            len: self.user_id.len(),
        });

        parts
    }

    pub fn into_form(self) -> Result<Form, reqwest::Error> {
        let file = Part::bytes(self.image.bytes)
            .file_name(self.image.file_name)
            .mime_str(&self.image.content_type)?;

        let mut form = Form::new().part(FILE_PART, file);
        if let Some(notes) = self.notes {
            form = form.text(NOTES_PART, notes);
        }
        Ok(form.text(USER_ID_PART, self.user_id))
    }
}
