//! Concrete HTTP-backed model adapter and the `ILLMAdapter` contract.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;
use tracing::{instrument, warn};

use crate::domain::CouncilMember;
use crate::error::{Error, Result};

/// A council member's response from its backing model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouncilMemberResponse {
    pub content: String,
    pub confidence: u8,
    pub reasoning: Option<String>,
    pub model: Option<String>,
}

/// Uniform wrapper over an external model provider.
///
/// An adapter that is unavailable is skipped by the council, never treated
/// as a failure.
#[async_trait]
pub trait ILLMAdapter: Send + Sync {
    /// The council member this adapter backs.
    fn member(&self) -> CouncilMember;

    /// The backing model identifier.
    fn model_id(&self) -> &str;

    /// Query the model with a fixed, member-specific system prompt already
    /// compiled in. Enforces its own per-call timeout internally; on
    /// timeout returns `Error::AdapterTimeout` rather than propagating a
    /// transport error.
    async fn query(&self, prompt: &str) -> Result<CouncilMemberResponse>;

    /// Whether this adapter currently has a usable configuration (e.g. an
    /// API key). Availability is a capability, not a type discriminator.
    fn is_available(&self) -> bool;
}

/// Connection configuration shared by HTTP-backed adapters.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout_ms: u64,
}

impl ClientConfig {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key,
            base_url: None,
            timeout_ms: 15_000,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

fn build_http_client(timeout_ms: u64) -> Client {
    let timeout = Duration::from_millis(timeout_ms);

    // Some sandboxed environments panic during proxy auto-detection in
    // reqwest's default client builder. Fall back to no-proxy in that case.
    match catch_unwind(AssertUnwindSafe(|| Client::builder().timeout(timeout).build())) {
        Ok(Ok(client)) => client,
        Ok(Err(_)) | Err(_) => Client::builder()
            .no_proxy()
            .timeout(timeout)
            .build()
            .expect("failed to construct HTTP client"),
    }
}

/// A fixed per-member system prompt, compiled in, constraining the member
/// to direct, language-matched, technical output.
fn system_prompt_for(member: CouncilMember) -> &'static str {
    match member {
        CouncilMember::Kvasir => {
            "You are KVASIR, a council member valuing synthesized, well-sourced knowledge. Respond directly, in the user's language, with technical precision."
        }
        CouncilMember::Bragi => {
            "You are BRAGI, a council member valuing clear exposition. Respond directly, in the user's language, with technical precision."
        }
        CouncilMember::Nornes => {
            "You are NORNES, a council member attentive to temporal and causal structure. Respond directly, in the user's language, with technical precision."
        }
        CouncilMember::Saga => {
            "You are SAGA, a council member valuing historical and narrative accuracy. Respond directly, in the user's language, with technical precision."
        }
        CouncilMember::Syn => {
            "You are SYN, a council member acting as gatekeeper against unverified claims. Respond directly, in the user's language, with technical precision."
        }
        CouncilMember::Loki => {
            "You are LOKI, the council's adversarial challenger. Identify weaknesses, contradictions, and unsupported claims in the given responses."
        }
        CouncilMember::Tyr => {
            "You are TYR, the council's arbiter. Weigh the evidence and responses impartially."
        }
    }
}

/// Generic HTTP-backed adapter for any provider exposing a simple
/// `{prompt, system} -> {content}`-shaped completion endpoint.
pub struct HttpModelAdapter {
    member: CouncilMember,
    model_id: String,
    config: ClientConfig,
    http: Client,
}

impl HttpModelAdapter {
    pub fn new(member: CouncilMember, model_id: impl Into<String>, config: ClientConfig) -> Self {
        let http = build_http_client(config.timeout_ms);
        Self {
            member,
            model_id: model_id.into(),
            config,
            http,
        }
    }
}

#[derive(Serialize)]
struct CompletionRequestBody<'a> {
    model: &'a str,
    system: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct CompletionResponseBody {
    content: String,
    confidence: Option<u8>,
    reasoning: Option<String>,
}

#[async_trait]
impl ILLMAdapter for HttpModelAdapter {
    fn member(&self) -> CouncilMember {
        self.member
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    #[instrument(skip(self, prompt), fields(member = %self.member, model = %self.model_id))]
    async fn query(&self, prompt: &str) -> Result<CouncilMemberResponse> {
        if !self.is_available() {
            return Err(Error::adapter_unavailable(self.member.to_string()));
        }

        let base_url = self
            .config
            .base_url
            .as_deref()
            .ok_or_else(|| Error::adapter_unavailable(self.member.to_string()))?;
        let api_key = self.config.api_key.as_deref().unwrap_or_default();

        let body = CompletionRequestBody {
            model: &self.model_id,
            system: system_prompt_for(self.member),
            prompt,
        };

        let timeout = Duration::from_millis(self.config.timeout_ms);
        let send = self
            .http
            .post(base_url)
            .bearer_auth(api_key)
            .json(&body)
            .send();

        let response = match tokio::time::timeout(timeout, send).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(err)) => {
                warn!(member = %self.member, error = %err, "adapter request failed");
                return Err(Error::adapter_unavailable(self.member.to_string()));
            }
            Err(_) => {
                return Err(Error::adapter_timeout(
                    self.member.to_string(),
                    self.config.timeout_ms,
                ));
            }
        };

        let parsed: CompletionResponseBody = match response.json().await {
            Ok(p) => p,
            Err(err) => {
                warn!(member = %self.member, error = %err, "adapter response unparsable");
                return Err(Error::adapter_unavailable(self.member.to_string()));
            }
        };

        Ok(CouncilMemberResponse {
            content: parsed.content,
            confidence: parsed.confidence.unwrap_or(0).min(100),
            reasoning: parsed.reasoning,
            model: Some(self.model_id.clone()),
        })
    }

    fn is_available(&self) -> bool {
        self.config.api_key.is_some() && self.config.base_url.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_without_api_key_is_unavailable() {
        let adapter = HttpModelAdapter::new(
            CouncilMember::Kvasir,
            "test-model",
            ClientConfig::new(None),
        );
        assert!(!adapter.is_available());
    }

    #[tokio::test]
    async fn unavailable_adapter_query_is_skipped_not_failed() {
        let adapter = HttpModelAdapter::new(
            CouncilMember::Bragi,
            "test-model",
            ClientConfig::new(None),
        );
        let result = adapter.query("hello").await;
        assert!(matches!(result, Err(Error::AdapterUnavailable { .. })));
    }

    #[test]
    fn system_prompts_are_distinct_per_member() {
        let mut prompts: Vec<&str> = CouncilMember::ALL.iter().map(|m| system_prompt_for(*m)).collect();
        prompts.sort();
        prompts.dedup();
        assert_eq!(prompts.len(), CouncilMember::ALL.len());
    }
}
