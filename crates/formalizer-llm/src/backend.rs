//! Reasoning backend: one capability (`reason`) over a closed set of provider variants.
//!
//! Provider failures never escape as errors. Every call yields a [`ReasoningResult`]
//! so the pipeline owns the retry and escalation policy.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use formalizer_types::{FormalizerError, Result};

use crate::{
    AnthropicAdapter, DynProvider, LoggingMiddleware, Message, Middleware, OpenAiAdapter, Request,
};

const DEFAULT_SYSTEM_PROMPT: &str = "You are a clinical data management expert. \
You explain edit-check rules over case report form fields precisely and concisely.";

// ---------------------------------------------------------------------------
// ProviderKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
    Local,
    /// Reasoning switched off. The pipeline escalates instead of calling out.
    None,
}

impl FromStr for ProviderKind {
    type Err = FormalizerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "anthropic" => Ok(ProviderKind::Anthropic),
            "local" => Ok(ProviderKind::Local),
            "none" | "disabled" | "off" => Ok(ProviderKind::None),
            other => Err(FormalizerError::ConfigError(format!(
                "unknown reasoning provider '{other}' (expected openai, anthropic, local or none)"
            ))),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Local => "local",
            ProviderKind::None => "none",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// ReasoningConfig
// ---------------------------------------------------------------------------

/// Explicit per-run provider configuration. Nothing here is process-global.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningConfig {
    pub provider: ProviderKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_temperature() -> f32 {
    0.2
}

impl ReasoningConfig {
    pub fn new(provider: ProviderKind) -> Self {
        Self {
            provider,
            model: None,
            api_key: None,
            base_url: None,
            temperature: default_temperature(),
        }
    }

    /// Build a config for `provider`, reading its API key from the environment once.
    pub fn from_env(provider: &str) -> Result<Self> {
        let kind: ProviderKind = provider.parse()?;
        let mut config = Self::new(kind);
        config.api_key = match kind {
            ProviderKind::OpenAi => std::env::var("OPENAI_API_KEY").ok(),
            ProviderKind::Anthropic => std::env::var("ANTHROPIC_API_KEY").ok(),
            ProviderKind::Local | ProviderKind::None => None,
        };
        Ok(config)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }
}

// ---------------------------------------------------------------------------
// ReasoningResult
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningFailure {
    pub message: String,
    pub retryable: bool,
}

/// Outcome of a single `reason` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReasoningResult {
    Answer { text: String },
    /// The provider cannot reason (offline/local placeholder). A soft failure.
    Unsupported { provider: String },
    Failed(ReasoningFailure),
}

impl ReasoningResult {
    pub fn answer(text: impl Into<String>) -> Self {
        ReasoningResult::Answer { text: text.into() }
    }

    pub fn failed(message: impl Into<String>, retryable: bool) -> Self {
        ReasoningResult::Failed(ReasoningFailure {
            message: message.into(),
            retryable,
        })
    }

    pub fn is_usable(&self) -> bool {
        matches!(self, ReasoningResult::Answer { .. })
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ReasoningResult::Failed(f) if f.retryable)
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            ReasoningResult::Answer { text } => Some(text),
            _ => None,
        }
    }

    fn from_error(err: &FormalizerError) -> Self {
        ReasoningResult::failed(err.to_string(), err.is_retryable())
    }
}

// ---------------------------------------------------------------------------
// Reasoner capability
// ---------------------------------------------------------------------------

/// Stateless request/response reasoning. Every call is independent.
#[async_trait]
pub trait Reasoner: Send + Sync {
    async fn reason(&self, prompt: &str, max_tokens: u32) -> ReasoningResult;

    fn name(&self) -> &str;

    /// `false` when reasoning is switched off and callers should not call `reason`.
    fn is_enabled(&self) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// RemoteReasoner
// ---------------------------------------------------------------------------

/// A reasoner backed by a remote completion API.
pub struct RemoteReasoner {
    provider: DynProvider,
    model: String,
    temperature: f32,
    system_prompt: String,
    middleware: Vec<Box<dyn Middleware>>,
}

impl RemoteReasoner {
    pub fn new(provider: DynProvider) -> Self {
        let model = provider.default_model().to_string();
        Self {
            provider,
            model,
            temperature: default_temperature(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            middleware: Vec::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_middleware(mut self, m: impl Middleware + 'static) -> Self {
        self.middleware.push(Box::new(m));
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request(&self, prompt: &str, max_tokens: u32) -> Request {
        Request {
            model: self.model.clone(),
            messages: vec![
                Message::system(self.system_prompt.clone()),
                Message::user(prompt),
            ],
            max_tokens: Some(max_tokens),
            temperature: Some(self.temperature),
        }
    }
}

impl fmt::Debug for RemoteReasoner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteReasoner")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("middleware", &self.middleware.len())
            .finish()
    }
}

#[async_trait]
impl Reasoner for RemoteReasoner {
    async fn reason(&self, prompt: &str, max_tokens: u32) -> ReasoningResult {
        let mut request = self.build_request(prompt, max_tokens);
        for m in &self.middleware {
            m.before(&mut request);
        }

        let mut response = match self.provider.complete(&request).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(provider = self.provider.name(), error = %e, "Reasoning call failed");
                return ReasoningResult::from_error(&e);
            }
        };

        for m in self.middleware.iter().rev() {
            m.after(&request, &mut response);
        }

        let text = response.text.trim();
        if text.is_empty() {
            // An empty completion is usually a transient provider hiccup.
            return ReasoningResult::failed("provider returned an empty answer", true);
        }
        ReasoningResult::answer(text)
    }

    fn name(&self) -> &str {
        self.provider.name()
    }
}

// ---------------------------------------------------------------------------
// ReasoningBackend
// ---------------------------------------------------------------------------

/// The provider variants selectable by configuration.
#[derive(Debug)]
pub enum ReasoningBackend {
    Remote(RemoteReasoner),
    /// Offline placeholder: always answers `Unsupported`.
    Local { name: String },
    Disabled,
}

impl ReasoningBackend {
    pub fn local() -> Self {
        ReasoningBackend::Local {
            name: "local".to_string(),
        }
    }

    /// Construct the backend described by `config`.
    ///
    /// Remote providers require an API key; a missing key is a configuration error.
    pub fn from_config(config: &ReasoningConfig) -> Result<Self> {
        let require_key = |env: &str| {
            config.api_key.clone().ok_or_else(|| {
                FormalizerError::ConfigError(format!(
                    "provider '{}' requires an API key (set {env})",
                    config.provider
                ))
            })
        };

        let provider = match config.provider {
            ProviderKind::OpenAi => {
                let mut adapter = OpenAiAdapter::new(require_key("OPENAI_API_KEY")?);
                if let Some(url) = &config.base_url {
                    adapter = adapter.with_base_url(url.clone());
                }
                DynProvider::new(adapter)
            }
            ProviderKind::Anthropic => {
                let mut adapter = AnthropicAdapter::new(require_key("ANTHROPIC_API_KEY")?);
                if let Some(url) = &config.base_url {
                    adapter = adapter.with_base_url(url.clone());
                }
                DynProvider::new(adapter)
            }
            ProviderKind::Local => return Ok(ReasoningBackend::local()),
            ProviderKind::None => return Ok(ReasoningBackend::Disabled),
        };

        let mut remote = RemoteReasoner::new(provider)
            .with_temperature(config.temperature)
            .with_middleware(LoggingMiddleware);
        if let Some(model) = &config.model {
            remote = remote.with_model(model.clone());
        }
        Ok(ReasoningBackend::Remote(remote))
    }

    /// Attach `m` to a remote backend. Local and disabled backends make no calls,
    /// so they are returned unchanged.
    pub fn with_middleware(self, m: impl Middleware + 'static) -> Self {
        match self {
            ReasoningBackend::Remote(remote) => ReasoningBackend::Remote(remote.with_middleware(m)),
            other => other,
        }
    }
}

#[async_trait]
impl Reasoner for ReasoningBackend {
    async fn reason(&self, prompt: &str, max_tokens: u32) -> ReasoningResult {
        match self {
            ReasoningBackend::Remote(remote) => remote.reason(prompt, max_tokens).await,
            ReasoningBackend::Local { name } => ReasoningResult::Unsupported {
                provider: name.clone(),
            },
            ReasoningBackend::Disabled => ReasoningResult::Unsupported {
                provider: "none".to_string(),
            },
        }
    }

    fn name(&self) -> &str {
        match self {
            ReasoningBackend::Remote(remote) => remote.name(),
            ReasoningBackend::Local { name } => name,
            ReasoningBackend::Disabled => "none",
        }
    }

    fn is_enabled(&self) -> bool {
        !matches!(self, ReasoningBackend::Disabled)
    }
}
