pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "meta-llama/llama-3-70b-instruct";
pub const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:5173,https://tosllm.vercel.app";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Upstream credential. Absence is reported per request, not at startup.
    pub openrouter_api_key: Option<String>,
    pub openrouter_base_url: String,
    pub model: String,
    pub app_url: Option<String>, // Optional HTTP-Referer attribution
    pub temperature: f32,
    pub upstream_timeout_secs: u64,
    pub enable_web_search: bool,
    pub enable_structured_output: bool,
    /// Empty means any origin.
    pub allowed_origins: Vec<String>,
    pub max_body_bytes: usize,
    pub rate_limit_replenish_secs: u64,
    pub rate_limit_burst: u32,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    ///
    /// `from_env` delegates here; tests pass a map lookup instead of touching
    /// the process environment.
    pub fn from_vars<F>(var: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        let config = Self {
            port: non_empty("PORT")
                .unwrap_or_else(|| "3002".to_string())
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            openrouter_api_key: non_empty("OPENROUTER_API_KEY").map(|k| k.trim().to_string()),
            openrouter_base_url: non_empty("OPENROUTER_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim()
                .trim_end_matches('/')
                .to_string(),
            model: non_empty("OPENROUTER_MODEL")
                .map(|m| m.trim().to_string())
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            app_url: non_empty("OPENROUTER_APP_URL").map(|u| u.trim().to_string()),
            temperature: non_empty("ANALYSIS_TEMPERATURE")
                .unwrap_or_else(|| "0.2".to_string())
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("ANALYSIS_TEMPERATURE must be a number"))
                .and_then(|t: f32| {
                    if !(0.0..=2.0).contains(&t) {
                        anyhow::bail!("ANALYSIS_TEMPERATURE must be between 0 and 2");
                    }
                    Ok(t)
                })?,
            upstream_timeout_secs: non_empty("UPSTREAM_TIMEOUT_SECS")
                .unwrap_or_else(|| "60".to_string())
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("UPSTREAM_TIMEOUT_SECS must be a whole number"))
                .and_then(|secs: u64| {
                    if secs == 0 {
                        anyhow::bail!("UPSTREAM_TIMEOUT_SECS must be greater than zero");
                    }
                    Ok(secs)
                })?,
            enable_web_search: parse_flag("ENABLE_WEB_SEARCH", non_empty("ENABLE_WEB_SEARCH"))?,
            enable_structured_output: parse_flag(
                "ENABLE_STRUCTURED_OUTPUT",
                non_empty("ENABLE_STRUCTURED_OUTPUT"),
            )?,
            allowed_origins: parse_origins(
                &non_empty("CORS_ALLOWED_ORIGINS")
                    .unwrap_or_else(|| DEFAULT_ALLOWED_ORIGINS.to_string()),
            ),
            max_body_bytes: non_empty("MAX_BODY_BYTES")
                .unwrap_or_else(|| (50 * 1024 * 1024).to_string())
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("MAX_BODY_BYTES must be a whole number"))?,
            rate_limit_replenish_secs: non_empty("RATE_LIMIT_REPLENISH_SECS")
                .unwrap_or_else(|| "2".to_string())
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("RATE_LIMIT_REPLENISH_SECS must be a whole number"))?,
            rate_limit_burst: non_empty("RATE_LIMIT_BURST")
                .unwrap_or_else(|| "10".to_string())
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("RATE_LIMIT_BURST must be a whole number"))?,
        };

        if !config.openrouter_base_url.starts_with("http://")
            && !config.openrouter_base_url.starts_with("https://")
        {
            anyhow::bail!("OPENROUTER_BASE_URL must start with http:// or https://");
        }

        // Log successful configuration load (without sensitive values)
        tracing::debug!("OpenRouter Base URL: {}", config.openrouter_base_url);
        tracing::debug!("Model: {}", config.model);
        tracing::debug!(
            "Web search: {}, structured output: {}",
            config.enable_web_search,
            config.enable_structured_output
        );
        tracing::debug!("Server Port: {}", config.port);
        if config.openrouter_api_key.is_none() {
            tracing::warn!("OPENROUTER_API_KEY is not set; analysis requests will be rejected");
        }

        Ok(config)
    }
}

fn parse_flag(name: &str, value: Option<String>) -> anyhow::Result<bool> {
    match value.as_deref().map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(false),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => anyhow::bail!("{} must be a boolean (true/false)", name),
        },
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    if raw.trim() == "*" {
        return Vec::new();
    }
    raw.split(',')
        .map(|o| o.trim().trim_end_matches('/').to_string())
        .filter(|o| !o.is_empty())
        .collect()
}
