//! Shared helpers for integration tests.
#![allow(dead_code)]

use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tos_guardian_api::analysis::AnalysisService;
use tos_guardian_api::config::Config;
use tos_guardian_api::handlers::{self, AppState};
use tos_guardian_api::llm_client::OpenRouterClient;

pub const TEST_KEY: &str = "sk-or-test-key";
pub const FRONTEND_ORIGIN: &str = "http://localhost:5173";

/// Config pointing the OpenRouter client at a mock server.
pub fn test_config(upstream_uri: &str, api_key: Option<&str>) -> Config {
    Config {
        port: 0,
        openrouter_api_key: api_key.map(str::to_string),
        openrouter_base_url: format!("{}/api/v1", upstream_uri),
        model: "meta-llama/llama-3-70b-instruct".to_string(),
        app_url: None,
        temperature: 0.2,
        upstream_timeout_secs: 5,
        enable_web_search: false,
        enable_structured_output: false,
        allowed_origins: vec![FRONTEND_ORIGIN.to_string()],
        max_body_bytes: 2 * 1024 * 1024,
        rate_limit_replenish_secs: 1,
        rate_limit_burst: 100,
    }
}

/// Serves the application on an ephemeral port and returns its base URL.
pub async fn spawn_app(config: Config) -> String {
    serve(config, false).await
}

/// Like [`spawn_app`], with the per-IP limiter enabled.
pub async fn spawn_rate_limited_app(config: Config) -> String {
    serve(config, true).await
}

async fn serve(config: Config, rate_limited: bool) -> String {
    let invoker = OpenRouterClient::new(&config).expect("client");
    let analysis = AnalysisService::new(
        Arc::new(invoker),
        Duration::from_secs(config.upstream_timeout_secs),
        config.enable_structured_output,
    );
    let state = Arc::new(AppState { config, analysis });
    let app = handlers::router(state, rate_limited).expect("router");

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .expect("server");
    });

    format!("http://{}", addr)
}

/// OpenRouter chat-completions body whose first choice carries `content`.
pub fn completion(content: &str) -> Value {
    json!({
        "id": "gen-test",
        "model": "meta-llama/llama-3-70b-instruct",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }]
    })
}

/// A schema-conformant model answer.
pub fn model_answer(company: &str, score: u8, verdict: &str) -> Value {
    json!({
        "companyName": company,
        "summary": "Binding arbitration and broad data sharing.",
        "riskScore": score,
        "verdict": verdict,
        "criticalPoints": [
            {
                "title": "Mandatory arbitration",
                "description": "Disputes go to private arbitration and class actions are waived.",
                "severity": "High"
            },
            {
                "title": "Automatic renewal",
                "description": "The plan renews every year unless cancelled 30 days ahead.",
                "severity": "Medium"
            }
        ],
        "expertOpinion": "Walk away unless you are comfortable giving up your day in court."
    })
}

/// Roughly 500 words of terms with an arbitration clause in the middle.
pub fn sample_terms() -> String {
    let boilerplate = "By accessing or using the Service you agree to be bound by these Terms \
        and all policies referenced herein, as amended from time to time at our sole discretion \
        without further notice to you. ";
    let arbitration = "Any dispute arising out of or relating to these Terms shall be resolved \
        exclusively by final and binding arbitration, and you waive any right to participate \
        in a class action or jury trial. ";

    let mut terms = String::from("ACME CORP TERMS OF SERVICE. ");
    for i in 0..14 {
        terms.push_str(boilerplate);
        if i == 7 {
            terms.push_str(arbitration);
        }
    }
    terms
}
