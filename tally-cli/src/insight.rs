//! Insight collaborator over HTTP: OpenAI-compatible chat completions or the
//! Anthropic messages API. Each attempt is bounded by the configured timeout
//! and a failed attempt is retried exactly once.

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tally_core::InsightResult;
use tally_finance::{InsightCollaborator, InsightError, InsightRequest};
use tracing::{debug, warn};

use crate::auth::AuthState;
use crate::config::InsightSection;

const SYSTEM_PROMPT: &str = "You are a careful personal-finance assistant. You receive one bank \
statement as JSON: transactions (amounts as decimal strings, debits negative) and a summary with \
per-category totals. Reply with a JSON object {\"advice\": string, \"risk_flags\": [string]}. \
Keep advice under 200 words and grounded in the numbers given. Use risk_flags for concrete \
concerns such as overdraft fees, spending above income, or unusually large single charges.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Anthropic,
    OpenAI,
}

impl Provider {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Some(Provider::OpenAI),
            "anthropic" => Some(Provider::Anthropic),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Provider::Anthropic => "Anthropic",
            Provider::OpenAI => "OpenAI",
        }
    }

    pub fn key_prefix(&self) -> &'static str {
        match self {
            Provider::Anthropic => "sk-ant-",
            Provider::OpenAI => "sk-",
        }
    }

    fn auth_command(&self) -> &'static str {
        match self {
            Provider::Anthropic => "tally auth paste-anthropic-token",
            Provider::OpenAI => "tally auth paste-openai-api-key",
        }
    }

    fn default_base_url(&self) -> &'static str {
        match self {
            Provider::Anthropic => "https://api.anthropic.com",
            Provider::OpenAI => "https://api.openai.com",
        }
    }
}

pub struct HttpInsight {
    provider: Provider,
    model: String,
    base_url: String,
    timeout: Duration,
    key: String,
    client: reqwest::Client,
}

impl HttpInsight {
    pub fn from_config(section: &InsightSection, auth: &AuthState) -> Result<Self, InsightError> {
        let provider = Provider::parse(&section.provider)
            .ok_or_else(|| InsightError::NotConfigured(format!("unknown provider '{}'", section.provider)))?;

        let key = auth.key_for(provider).map(str::to_string).ok_or_else(|| {
            InsightError::NotConfigured(format!(
                "missing {} key; run: {}",
                provider.label(),
                provider.auth_command()
            ))
        })?;

        let base_url = section
            .base_url
            .clone()
            .unwrap_or_else(|| provider.default_base_url().to_string());

        Ok(Self {
            provider,
            model: section.model.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(section.timeout_secs.max(1)),
            key,
            client: reqwest::Client::new(),
        })
    }

    async fn generate_async(&self, request: &InsightRequest) -> Result<InsightResult, InsightError> {
        let payload = serde_json::to_string(request).map_err(|e| InsightError::BadResponse(e.to_string()))?;
        let payload = payload.as_str();
        let secs = self.timeout.as_secs();

        let text = with_one_retry(|| async move {
            match tokio::time::timeout(self.timeout, self.complete(payload)).await {
                Ok(r) => r,
                Err(_) => Err(InsightError::Timeout(secs)),
            }
        })
        .await?;

        Ok(parse_reply(&text, &self.model))
    }

    async fn complete(&self, payload: &str) -> Result<String, InsightError> {
        match self.provider {
            Provider::Anthropic => self.anthropic_complete(payload).await,
            Provider::OpenAI => self.openai_complete(payload).await,
        }
    }

    async fn anthropic_complete(&self, payload: &str) -> Result<String, InsightError> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }

        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            max_tokens: i32,
            system: &'a str,
            messages: Vec<Msg<'a>>,
        }

        #[derive(Deserialize)]
        struct Resp {
            content: Vec<ContentBlock>,
        }

        #[derive(Deserialize)]
        struct ContentBlock {
            #[serde(rename = "type")]
            t: String,
            text: Option<String>,
        }

        let body = Req {
            model: &self.model,
            max_tokens: 700,
            system: SYSTEM_PROMPT,
            messages: vec![Msg {
                role: "user",
                content: payload,
            }],
        };

        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.key).map_err(|e| InsightError::NotConfigured(e.to_string()))?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static("2023-06-01"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let resp = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .headers(headers)
            .json(&body)
            .send()
            .await
            .map_err(|e| InsightError::Service(format!("anthropic request: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let txt = resp.text().await.unwrap_or_default();
            return Err(InsightError::Service(format!("anthropic error: {status} {txt}")));
        }

        let out: Resp = resp
            .json()
            .await
            .map_err(|e| InsightError::BadResponse(format!("parse anthropic response: {e}")))?;
        let mut s = String::new();
        for b in out.content {
            if b.t == "text" {
                if let Some(t) = b.text {
                    s.push_str(&t);
                }
            }
        }
        Ok(s.trim().to_string())
    }

    async fn openai_complete(&self, payload: &str) -> Result<String, InsightError> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }

        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
        }

        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }

        #[derive(Deserialize)]
        struct Choice {
            message: MsgOut,
        }

        #[derive(Deserialize)]
        struct MsgOut {
            content: Option<String>,
        }

        let body = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                Msg {
                    role: "user",
                    content: payload,
                },
            ],
            temperature: 0.2,
        };

        let resp = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header(AUTHORIZATION, format!("Bearer {}", self.key))
            .json(&body)
            .send()
            .await
            .map_err(|e| InsightError::Service(format!("openai request: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let txt = resp.text().await.unwrap_or_default();
            return Err(InsightError::Service(format!("openai error: {status} {txt}")));
        }

        let out: Resp = resp
            .json()
            .await
            .map_err(|e| InsightError::BadResponse(format!("parse openai response: {e}")))?;
        let content = out
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();
        Ok(content.trim().to_string())
    }
}

impl InsightCollaborator for HttpInsight {
    fn generate(&self, request: &InsightRequest) -> Result<InsightResult, InsightError> {
        // Called from a blocking pipeline thread; reuse the ambient runtime when there is one.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            tokio::task::block_in_place(|| handle.block_on(self.generate_async(request)))
        } else {
            let rt = tokio::runtime::Runtime::new()
                .map_err(|e| InsightError::Service(format!("create tokio runtime: {e}")))?;
            rt.block_on(self.generate_async(request))
        }
    }
}

/// Run `attempt`; on failure run it exactly once more.
async fn with_one_retry<F, Fut>(mut attempt: F) -> Result<String, InsightError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<String, InsightError>>,
{
    match attempt().await {
        Ok(text) => Ok(text),
        Err(e) => {
            warn!(error = %e, "insight attempt failed; retrying once");
            attempt().await
        }
    }
}

#[derive(Deserialize)]
struct Reply {
    advice: String,
    #[serde(default)]
    risk_flags: Vec<String>,
}

/// Prefer a `{advice, risk_flags}` object anywhere in the reply; fall back to
/// the raw text.
fn parse_reply(text: &str, model: &str) -> InsightResult {
    let structured = match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => serde_json::from_str::<Reply>(&text[start..=end]).ok(),
        _ => None,
    };

    let (text, risk_flags) = match structured {
        Some(r) => (r.advice, r.risk_flags),
        None => {
            debug!("insight reply was not structured; keeping raw text");
            (text.trim().to_string(), Vec::new())
        }
    };

    InsightResult {
        text,
        generated_at: Utc::now(),
        model: model.to_string(),
        risk_flags,
    }
}
