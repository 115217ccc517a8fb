use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// MIME type assumed for uploads that arrive without one.
pub const DEFAULT_DOCUMENT_MIME: &str = "application/pdf";

// ============ Request Models ============

/// Body of `POST /api/analyze`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AnalyzeRequest {
    /// `{"type": "url"|"file"|"text", "value": ...}`
    #[schema(value_type = Object)]
    pub input: AnalysisInput,
}

/// One of the three ways a document can be submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum AnalysisInput {
    /// Address of the site whose terms should be analyzed.
    Url(String),
    /// Uploaded document.
    File(FilePayload),
    /// Pasted terms text.
    Text(String),
}

impl AnalysisInput {
    /// Wire name of the variant, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisInput::Url(_) => "url",
            AnalysisInput::File(_) => "file",
            AnalysisInput::Text(_) => "text",
        }
    }
}

/// Uploaded document as it travels over JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FilePayload {
    /// Base64 encoded document bytes.
    pub data: String,
    /// Declared MIME type; `application/pdf` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl FilePayload {
    pub fn mime_type_or_default(&self) -> &str {
        self.mime_type
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_DOCUMENT_MIME)
    }
}

// ============ Result Models ============

/// Overall judgement of a terms document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum Verdict {
    Safe,
    Caution,
    Risky,
    #[serde(rename = "Extreme Risk")]
    ExtremeRisk,
}

impl Verdict {
    pub const ALLOWED: [&'static str; 4] = ["Safe", "Caution", "Risky", "Extreme Risk"];

    /// Parses the wire value. Both `"Extreme Risk"` and `"ExtremeRisk"` are accepted.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "Safe" => Some(Verdict::Safe),
            "Caution" => Some(Verdict::Caution),
            "Risky" => Some(Verdict::Risky),
            "Extreme Risk" | "ExtremeRisk" => Some(Verdict::ExtremeRisk),
            _ => None,
        }
    }
}

/// Severity of a single flagged clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum Severity {
    High,
    Medium,
    Low,
}

impl Severity {
    pub const ALLOWED: [&'static str; 3] = ["High", "Medium", "Low"];

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "High" => Some(Severity::High),
            "Medium" => Some(Severity::Medium),
            "Low" => Some(Severity::Low),
            _ => None,
        }
    }
}

/// A clause the model flagged as dangerous.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CriticalPoint {
    pub title: String,
    pub description: String,
    pub severity: Severity,
}

/// Structured risk assessment returned to the caller.
///
/// Every field is required; the validator never produces a partial value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    /// Subject identified by the model. Also the history key.
    pub company_name: String,
    pub summary: String,
    /// 0 (harmless) to 100 (predatory).
    #[schema(minimum = 0, maximum = 100)]
    pub risk_score: u8,
    pub verdict: Verdict,
    /// Usually at most five entries.
    pub critical_points: Vec<CriticalPoint>,
    pub expert_opinion: String,
}

/// Failure body returned by the HTTP endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}
