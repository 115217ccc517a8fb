use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

use crate::config::Config;
use crate::errors::AnalysisError;
use crate::normalizer::{Attachment, NormalizedPrompt};
use crate::prompt;
use crate::validator::classify_upstream_failure;

/// Everything the model needs for one analysis.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system_instruction: String,
    pub directive: String,
    pub attachment: Option<Attachment>,
    pub allow_retrieval: bool,
    /// Present when schema-constrained generation is enabled.
    pub response_schema: Option<Value>,
}

impl CompletionRequest {
    pub fn new(prompt: NormalizedPrompt, with_schema: bool) -> Self {
        Self {
            system_instruction: prompt::SYSTEM_INSTRUCTION.to_string(),
            directive: prompt.directive,
            attachment: prompt.attachment,
            allow_retrieval: prompt.allow_retrieval,
            response_schema: with_schema.then(prompt::response_schema),
        }
    }
}

/// Sends a completion request to an LLM and returns the raw response text.
///
/// Exactly one outbound call per invocation; implementations never retry.
#[async_trait]
pub trait ModelInvoker: Send + Sync {
    async fn invoke(&self, request: &CompletionRequest) -> Result<String, AnalysisError>;
}

/// Client for the OpenRouter chat-completions API.
#[derive(Clone)]
pub struct OpenRouterClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    app_url: Option<String>,
    web_search: bool,
}

impl OpenRouterClient {
    pub fn new(config: &Config) -> Result<Self, AnalysisError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.upstream_timeout_secs))
            .build()
            .map_err(|e| {
                AnalysisError::Internal(format!("Failed to create OpenRouter client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: config.openrouter_base_url.clone(),
            api_key: config.openrouter_api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            app_url: config.app_url.clone(),
            web_search: config.enable_web_search,
        })
    }

    fn build_body(&self, request: &CompletionRequest) -> ChatRequest {
        let user_content = match &request.attachment {
            None => MessageContent::Text(request.directive.clone()),
            Some(attachment) => MessageContent::Parts(vec![
                ContentPart::Text {
                    text: request.directive.clone(),
                },
                attachment_part(attachment),
            ]),
        };

        let plugins = if request.allow_retrieval && self.web_search {
            Some(vec![Plugin { id: "web" }])
        } else {
            None
        };

        let response_format = request.response_schema.as_ref().map(|schema| ResponseFormat {
            kind: "json_schema",
            json_schema: JsonSchemaFormat {
                name: "analysis_result",
                strict: true,
                schema: schema.clone(),
            },
        });

        ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: MessageContent::Text(request.system_instruction.clone()),
                },
                ChatMessage {
                    role: "user",
                    content: user_content,
                },
            ],
            temperature: self.temperature,
            plugins,
            response_format,
        }
    }
}

#[async_trait]
impl ModelInvoker for OpenRouterClient {
    async fn invoke(&self, request: &CompletionRequest) -> Result<String, AnalysisError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AnalysisError::Config("Missing OPENROUTER_API_KEY".to_string()))?;

        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_body(request);
        tracing::info!(
            "Requesting analysis from {} (attachment: {}, web search: {})",
            self.model,
            request.attachment.is_some(),
            body.plugins.is_some()
        );

        let mut builder = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&body);
        if let Some(app_url) = &self.app_url {
            builder = builder.header("HTTP-Referer", app_url);
        }

        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            tracing::warn!("OpenRouter returned {}: {}", status, text);
            return Err(classify_upstream_failure(status.as_u16(), &text));
        }

        extract_content(&text)
    }
}

/// Pulls `choices[0].message.content` out of a successful response body.
///
/// Some providers answer 200 with an `error` object instead of choices; that
/// is classified like a non-2xx answer.
fn extract_content(body: &str) -> Result<String, AnalysisError> {
    let data: Value = serde_json::from_str(body).map_err(|_| AnalysisError::MalformedResponse {
        message: "Invalid AI response".to_string(),
        raw: body.to_string(),
    })?;

    if let Some(error) = data.get("error").filter(|e| !e.is_null()) {
        let code = error
            .get("code")
            .and_then(|c| c.as_u64().or_else(|| c.as_str().and_then(|s| s.parse().ok())))
            .and_then(|c| u16::try_from(c).ok())
            .unwrap_or(500);
        tracing::warn!("OpenRouter returned an embedded error: {}", error);
        return Err(classify_upstream_failure(code, body));
    }

    let content = data
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"));

    let text = match content {
        Some(Value::String(s)) => s.trim().to_string(),
        // Some providers return content as an array of text parts
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
            .collect::<Vec<_>>()
            .join("")
            .trim()
            .to_string(),
        _ => String::new(),
    };

    if text.is_empty() {
        return Err(AnalysisError::MalformedResponse {
            message: "Invalid AI response".to_string(),
            raw: body.to_string(),
        });
    }

    tracing::debug!("Raw model output: {}", text);
    Ok(text)
}

fn attachment_part(attachment: &Attachment) -> ContentPart {
    let data_url = format!(
        "data:{};base64,{}",
        attachment.mime_type,
        STANDARD.encode(&attachment.bytes)
    );
    if attachment.mime_type.starts_with("image/") {
        ContentPart::ImageUrl {
            image_url: ImageUrl { url: data_url },
        }
    } else {
        let extension = attachment
            .mime_type
            .rsplit('/')
            .next()
            .filter(|e| !e.is_empty())
            .unwrap_or("bin");
        ContentPart::File {
            file: FileData {
                filename: format!("document.{}", extension),
                file_data: data_url,
            },
        }
    }
}

// ============ Wire Types ============

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    plugins: Option<Vec<Plugin>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: MessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
    File { file: FileData },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Serialize)]
struct FileData {
    filename: String,
    file_data: String,
}

#[derive(Debug, Serialize)]
struct Plugin {
    id: &'static str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
    json_schema: JsonSchemaFormat,
}

#[derive(Debug, Serialize)]
struct JsonSchemaFormat {
    name: &'static str,
    strict: bool,
    schema: Value,
}
