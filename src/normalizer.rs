//! Turns an [`AnalysisInput`] into the prompt handed to the model.
//!
//! Never touches the network.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use url::Url;

use crate::errors::AnalysisError;
use crate::models::{AnalysisInput, FilePayload};
use crate::prompt;

/// Binary document sent next to the directive.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// Output of [`normalize`].
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedPrompt {
    /// User-role instruction text.
    pub directive: String,
    /// Only set for file input.
    pub attachment: Option<Attachment>,
    /// The invoker may enable provider-side web retrieval.
    pub allow_retrieval: bool,
}

pub fn normalize(input: &AnalysisInput) -> Result<NormalizedPrompt, AnalysisError> {
    match input {
        AnalysisInput::Url(value) => {
            let url = value.trim();
            if url.is_empty() {
                return Err(AnalysisError::Validation(
                    "Please enter a valid URL".to_string(),
                ));
            }
            if !is_web_address(url) {
                return Err(AnalysisError::Validation(format!(
                    "'{}' is not a valid web address",
                    url
                )));
            }
            Ok(NormalizedPrompt {
                directive: prompt::url_directive(url),
                attachment: None,
                allow_retrieval: true,
            })
        }
        AnalysisInput::File(payload) => {
            let attachment = decode_attachment(payload)?;
            tracing::debug!(
                "Normalized file input: {} bytes of {}",
                attachment.bytes.len(),
                attachment.mime_type
            );
            Ok(NormalizedPrompt {
                directive: prompt::file_directive(),
                attachment: Some(attachment),
                allow_retrieval: false,
            })
        }
        AnalysisInput::Text(value) => {
            let text = value.trim();
            if text.is_empty() {
                return Err(AnalysisError::Validation(
                    "Please paste the ToS text content".to_string(),
                ));
            }
            Ok(NormalizedPrompt {
                directive: prompt::text_directive(text),
                attachment: None,
                allow_retrieval: false,
            })
        }
    }
}

/// Accepts absolute http(s) URLs, and bare hosts such as `example.com/terms`.
fn is_web_address(candidate: &str) -> bool {
    if candidate.chars().any(char::is_whitespace) {
        return false;
    }
    let parsed = Url::parse(candidate)
        .ok()
        .filter(|u| matches!(u.scheme(), "http" | "https"))
        .or_else(|| Url::parse(&format!("https://{}", candidate)).ok());

    match parsed {
        Some(url) => url.host_str().is_some_and(|h| h.contains('.') || h == "localhost"),
        None => false,
    }
}

fn decode_attachment(payload: &FilePayload) -> Result<Attachment, AnalysisError> {
    let data = payload.data.trim();
    // Tolerate a full data URL from FileReader.readAsDataURL
    let data = match data.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => data,
    };
    if data.is_empty() {
        return Err(AnalysisError::Validation(
            "Please upload a PDF document".to_string(),
        ));
    }

    let bytes = STANDARD.decode(data).map_err(|e| {
        AnalysisError::Validation(format!("Uploaded document is not valid base64: {}", e))
    })?;
    if bytes.is_empty() {
        return Err(AnalysisError::Validation(
            "Uploaded document is empty".to_string(),
        ));
    }

    Ok(Attachment {
        bytes,
        mime_type: payload.mime_type_or_default().to_string(),
    })
}
