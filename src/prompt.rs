//! Prompt text sent to the model.
//!
//! The system instruction and the result shape it describes must stay in sync
//! with [`crate::models::AnalysisResult`] and [`response_schema`].

use serde_json::{json, Value};

/// Fixed persona and output contract for every analysis.
pub const SYSTEM_INSTRUCTION: &str = r#"You are a cynical, highly protective consumer rights attorney.

CRITICAL RULES:
- Be blunt and opinionated.
- Look for arbitration clauses, liability waivers, forced data sharing, auto-renew traps.
- ALWAYS respond in STRICT VALID JSON only.
- Do NOT include markdown.
- Do NOT include explanation outside JSON.

Return JSON in this exact structure:

{
  "companyName": "string",
  "summary": "string",
  "riskScore": number,
  "verdict": "Safe | Caution | Risky | Extreme Risk",
  "criticalPoints": [
    {
      "title": "string",
      "description": "string",
      "severity": "High | Medium | Low"
    }
  ],
  "expertOpinion": "string"
}"#;

pub fn url_directive(url: &str) -> String {
    format!(
        "Analyze the Terms of Service and Privacy Policy for this website:\n{}\n\n\
         Identify top 5 risks. If you cannot browse the site, rely on what you \
         know about this company's published terms.",
        url
    )
}

/// The document itself travels as a separate attachment part.
pub fn file_directive() -> String {
    "Analyze the top 5 most dangerous clauses in this document.".to_string()
}

pub fn text_directive(text: &str) -> String {
    format!(
        "Analyze this legal text and identify:\n\n\
         1. Top 5 risky clauses\n\
         2. Overall risk score (0-100)\n\
         3. Clear summary\n\
         4. Expert legal opinion\n\n\
         Text:\n{}",
        text
    )
}

/// JSON schema for schema-constrained generation.
pub fn response_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "companyName": { "type": "string" },
            "summary": { "type": "string" },
            "riskScore": { "type": "integer", "minimum": 0, "maximum": 100 },
            "verdict": { "type": "string", "enum": ["Safe", "Caution", "Risky", "Extreme Risk"] },
            "criticalPoints": {
                "type": "array",
                "maxItems": 5,
                "items": {
                    "type": "object",
                    "properties": {
                        "title": { "type": "string" },
                        "description": { "type": "string" },
                        "severity": { "type": "string", "enum": ["High", "Medium", "Low"] }
                    },
                    "required": ["title", "description", "severity"],
                    "additionalProperties": false
                }
            },
            "expertOpinion": { "type": "string" }
        },
        "required": [
            "companyName",
            "summary",
            "riskScore",
            "verdict",
            "criticalPoints",
            "expertOpinion"
        ],
        "additionalProperties": false
    })
}
