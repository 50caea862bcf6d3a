//! Session configuration.
//!
//! A [`RepairConfig`] is built once (defaults, then CLI/env overrides) and
//! handed to the controller by value. Nothing in the crate reads global state.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RepairError, Result};

/// Sampling options forwarded to the completion model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelOptions {
    /// Model name as known to the completion service.
    pub name: String,
    pub temperature: f32,
    /// Upper bound on generated tokens.
    pub num_predict: u32,
    pub top_k: u32,
    pub top_p: f32,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            name: "qwen2.5-coder:0.5b".to_string(),
            temperature: 0.1,
            num_predict: 512,
            top_k: 10,
            top_p: 0.9,
        }
    }
}

/// Where and how to reach the completion service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceConfig {
    /// Base URL of an Ollama-compatible server.
    pub base_url: String,

    /// Deadline for a single completion request (seconds).
    pub request_timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            request_timeout_secs: 120,
        }
    }
}

/// Immutable configuration for one repair session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RepairConfig {
    /// Maximum number of diagnosed attempts before the session is exhausted.
    pub max_attempts: u32,

    /// Wall-clock limit for one run of the target (seconds).
    pub execution_timeout_secs: u64,

    /// Program used to run the target file.
    pub interpreter: String,

    /// Extra arguments placed before the target path.
    pub interpreter_args: Vec<String>,

    /// Language tag stripped from fenced code blocks in proposals.
    pub fence_language: String,

    pub model: ModelOptions,

    pub service: ServiceConfig,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            execution_timeout_secs: 30,
            interpreter: "python3".to_string(),
            interpreter_args: Vec::new(),
            fence_language: "python".to_string(),
            model: ModelOptions::default(),
            service: ServiceConfig::default(),
        }
    }
}

impl RepairConfig {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_execution_timeout_secs(mut self, secs: u64) -> Self {
        self.execution_timeout_secs = secs;
        self
    }

    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    pub fn with_interpreter_args(mut self, args: Vec<String>) -> Self {
        self.interpreter_args = args;
        self
    }

    pub fn with_fence_language(mut self, language: impl Into<String>) -> Self {
        self.fence_language = language.into();
        self
    }

    pub fn with_model(mut self, name: impl Into<String>) -> Self {
        self.model.name = name.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.model.temperature = temperature;
        self
    }

    pub fn with_service_url(mut self, base_url: impl Into<String>) -> Self {
        self.service.base_url = base_url.into();
        self
    }

    pub fn with_request_timeout_secs(mut self, secs: u64) -> Self {
        self.service.request_timeout_secs = secs;
        self
    }

    pub fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.execution_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.service.request_timeout_secs)
    }

    /// The fence opener that carries a language tag, e.g. "```python".
    pub fn language_fence(&self) -> String {
        format!("```{}", self.fence_language)
    }

    /// Reject settings that would make the loop meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(RepairError::InvalidInvocation(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.execution_timeout_secs == 0 {
            return Err(RepairError::InvalidInvocation(
                "execution timeout must be non-zero".to_string(),
            ));
        }
        if self.service.request_timeout_secs == 0 {
            return Err(RepairError::InvalidInvocation(
                "request timeout must be non-zero".to_string(),
            ));
        }
        if self.interpreter.trim().is_empty() {
            return Err(RepairError::InvalidInvocation(
                "interpreter must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
