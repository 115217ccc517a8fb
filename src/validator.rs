//! Response validation: model text in, typed [`AnalysisResult`] out.
//!
//! Nothing here panics on model output. Every failure becomes an
//! [`AnalysisError`] that carries the raw text for diagnostics.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

use crate::errors::AnalysisError;
use crate::models::{AnalysisResult, CriticalPoint, Severity, Verdict};

const MAX_UPSTREAM_MESSAGE_CHARS: usize = 300;

fn embedded_fence() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| Regex::new(r"(?s)```(?i:json)?[ \t]*\r?\n?(.*?)```").unwrap())
}

/// Removes markdown code fences surrounding the model output.
///
/// Handles a fence wrapping the whole text, with or without a `json` tag and
/// with or without the closing marker. Backticks inside the text are left
/// alone. Text without fences is returned trimmed.
pub fn strip_code_fences(raw: &str) -> &str {
    let mut text = raw.trim();

    if let Some(rest) = text.strip_prefix("```") {
        let rest = rest.trim_start_matches([' ', '\t']);
        text = match rest.get(..4) {
            Some(tag) if tag.eq_ignore_ascii_case("json") => &rest[4..],
            _ => rest,
        };
        text = text.trim_start();
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest.trim_end();
    }
    text
}

/// First fenced block inside surrounding prose.
fn embedded_block(text: &str) -> Option<&str> {
    embedded_fence()
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
}

/// Parses the fence-stripped text, falling back to an embedded fenced block
/// only when the text as a whole is not JSON.
fn parse_model_json(raw: &str) -> Result<Value, serde_json::Error> {
    let stripped = strip_code_fences(raw);
    serde_json::from_str::<Value>(stripped).or_else(|e| {
        embedded_block(stripped)
            .and_then(|block| serde_json::from_str(block).ok())
            .ok_or(e)
    })
}

/// Parses and validates model output against the result schema.
///
/// `riskScore` may arrive as a number or a numeric string; fractional values
/// are rounded. Any missing field or out-of-enum value rejects the whole result.
pub fn validate(raw: &str) -> Result<AnalysisResult, AnalysisError> {
    let value = parse_model_json(raw).map_err(|e| {
        tracing::debug!("Model output is not JSON: {}", e);
        AnalysisError::MalformedResponse {
            message: "Model did not return valid JSON".to_string(),
            raw: raw.trim().to_string(),
        }
    })?;

    let Some(obj) = value.as_object() else {
        return Err(AnalysisError::SchemaViolation {
            issues: vec!["expected a JSON object at the top level".to_string()],
            raw: raw.trim().to_string(),
        });
    };

    let mut issues = Vec::new();

    let company_name = required_string(obj, "companyName", "companyName", &mut issues);
    let summary = required_string(obj, "summary", "summary", &mut issues);
    let risk_score = risk_score(obj.get("riskScore"), &mut issues);
    let verdict = verdict(obj.get("verdict"), &mut issues);
    let critical_points = critical_points(obj.get("criticalPoints"), &mut issues);
    let expert_opinion = required_string(obj, "expertOpinion", "expertOpinion", &mut issues);

    match (
        company_name,
        summary,
        risk_score,
        verdict,
        critical_points,
        expert_opinion,
    ) {
        (
            Some(company_name),
            Some(summary),
            Some(risk_score),
            Some(verdict),
            Some(critical_points),
            Some(expert_opinion),
        ) if issues.is_empty() => {
            if critical_points.len() > 5 {
                tracing::warn!(
                    "Model returned {} critical points (expected at most 5)",
                    critical_points.len()
                );
            }
            Ok(AnalysisResult {
                company_name,
                summary,
                risk_score,
                verdict,
                critical_points,
                expert_opinion,
            })
        }
        _ => Err(AnalysisError::SchemaViolation {
            issues,
            raw: raw.trim().to_string(),
        }),
    }
}

fn present<'a>(value: Option<&'a Value>) -> Option<&'a Value> {
    value.filter(|v| !v.is_null())
}

fn required_string(
    obj: &Map<String, Value>,
    key: &str,
    path: &str,
    issues: &mut Vec<String>,
) -> Option<String> {
    match present(obj.get(key)) {
        None => {
            issues.push(format!("missing field `{}`", path));
            None
        }
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => {
            issues.push(format!("`{}` must be a string, got {}", path, type_name(other)));
            None
        }
    }
}

fn risk_score(value: Option<&Value>, issues: &mut Vec<String>) -> Option<u8> {
    let number = match present(value) {
        None => {
            issues.push("missing field `riskScore`".to_string());
            return None;
        }
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };

    match number {
        Some(n) if n.is_finite() && (0.0..=100.0).contains(&n) => Some(n.round() as u8),
        Some(n) if n.is_finite() => {
            issues.push(format!("`riskScore` must be between 0 and 100, got {}", n));
            None
        }
        _ => {
            issues.push("`riskScore` must be numeric".to_string());
            None
        }
    }
}

fn verdict(value: Option<&Value>, issues: &mut Vec<String>) -> Option<Verdict> {
    match present(value) {
        None => {
            issues.push("missing field `verdict`".to_string());
            None
        }
        Some(Value::String(s)) => {
            let parsed = Verdict::parse(s);
            if parsed.is_none() {
                issues.push(format!(
                    "`verdict` must be one of {:?}, got {:?}",
                    Verdict::ALLOWED,
                    s
                ));
            }
            parsed
        }
        Some(other) => {
            issues.push(format!("`verdict` must be a string, got {}", type_name(other)));
            None
        }
    }
}

fn critical_points(value: Option<&Value>, issues: &mut Vec<String>) -> Option<Vec<CriticalPoint>> {
    let entries = match present(value) {
        None => {
            issues.push("missing field `criticalPoints`".to_string());
            return None;
        }
        Some(Value::Array(entries)) => entries,
        Some(other) => {
            issues.push(format!(
                "`criticalPoints` must be an array, got {}",
                type_name(other)
            ));
            return None;
        }
    };

    entries
        .iter()
        .enumerate()
        .map(|(i, entry)| critical_point(i, entry, issues))
        .collect::<Vec<_>>()
        .into_iter()
        .collect()
}

fn critical_point(index: usize, entry: &Value, issues: &mut Vec<String>) -> Option<CriticalPoint> {
    let Some(obj) = entry.as_object() else {
        issues.push(format!(
            "`criticalPoints[{}]` must be an object, got {}",
            index,
            type_name(entry)
        ));
        return None;
    };

    let title = required_string(obj, "title", &format!("criticalPoints[{}].title", index), issues);
    let description = required_string(
        obj,
        "description",
        &format!("criticalPoints[{}].description", index),
        issues,
    );
    let severity = match present(obj.get("severity")) {
        None => {
            issues.push(format!("missing field `criticalPoints[{}].severity`", index));
            None
        }
        Some(Value::String(s)) => {
            let parsed = Severity::parse(s);
            if parsed.is_none() {
                issues.push(format!(
                    "`criticalPoints[{}].severity` must be one of {:?}, got {:?}",
                    index,
                    Severity::ALLOWED,
                    s
                ));
            }
            parsed
        }
        Some(other) => {
            issues.push(format!(
                "`criticalPoints[{}].severity` must be a string, got {}",
                index,
                type_name(other)
            ));
            None
        }
    };

    Some(CriticalPoint {
        title: title?,
        description: description?,
        severity: severity?,
    })
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Classifies a failed upstream answer by HTTP status and any structured
/// error code or message found in its body.
pub fn classify_upstream_failure(status: u16, body: &str) -> AnalysisError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let error = parsed.as_ref().and_then(|v| v.get("error"));

    let code = error
        .and_then(|e| e.get("code"))
        .and_then(|c| c.as_u64().or_else(|| c.as_str().and_then(|s| s.parse().ok())))
        .and_then(|c| u16::try_from(c).ok());

    let message = error
        .and_then(|e| e.get("message").and_then(Value::as_str).or_else(|| e.as_str()))
        .or_else(|| parsed.as_ref().and_then(|v| v.get("message")).and_then(Value::as_str))
        .unwrap_or_else(|| body.trim());
    let message = if message.is_empty() {
        format!("HTTP {}", status)
    } else {
        message.chars().take(MAX_UPSTREAM_MESSAGE_CHARS).collect()
    };

    let lowered = message.to_lowercase();
    let any_code = |codes: &[u16]| codes.contains(&status) || code.is_some_and(|c| codes.contains(&c));

    if any_code(&[401, 403])
        || lowered.contains("invalid api key")
        || lowered.contains("api_key_invalid")
        || lowered.contains("no auth credentials")
    {
        return AnalysisError::Auth(message);
    }

    if any_code(&[402, 429])
        || lowered.contains("quota")
        || lowered.contains("rate limit")
        || lowered.contains("rate-limit")
        || lowered.contains("resource_exhausted")
        || lowered.contains("too many requests")
    {
        return AnalysisError::Quota(message);
    }

    AnalysisError::Upstream {
        status: code.unwrap_or(status),
        message,
    }
}
