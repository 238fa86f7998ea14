// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::AdapterConfig;
use crate::types::{LlmError, LlmResult, Provider};

static HTTP_CLIENT: Lazy<Client> = Lazy::new(|| Client::builder().build().expect("HTTP client"));

/// The one capability the pipeline asks of a text-generation service.
/// Output carries no schema guarantee; every consumer must validate it.
#[async_trait]
pub trait GenerativeService: Send + Sync {
    async fn generate(&self, prompt: &str) -> LlmResult<String>;
}

#[derive(Debug, Clone)]
pub struct HttpGenerativeAdapter {
    config: AdapterConfig,
}

impl HttpGenerativeAdapter {
    pub fn new(config: AdapterConfig) -> Self {
        Self { config }
    }

    pub fn from_env() -> LlmResult<Self> {
        Ok(Self::new(AdapterConfig::from_env()?))
    }

    fn provider(&self) -> Provider {
        let endpoint = &self.config.endpoint;
        if endpoint.contains("anthropic.com") {
            Provider::Anthropic
        } else if endpoint.contains("11434") || endpoint.contains("ollama") {
            Provider::Ollama
        } else if endpoint.contains("openai.com") {
            Provider::OpenAI
        } else {
            Provider::Anthropic
        }
    }

    fn build_payload(&self, provider: &Provider, prompt: &str) -> Value {
        let gen = &self.config.generation;
        match provider {
            Provider::Ollama => json!({
                "model": self.config.model,
                "prompt": prompt,
                "stream": false,
                "options": {
                    "temperature": gen.temperature,
                    "num_predict": gen.max_tokens
                }
            }),
            Provider::OpenAI => json!({
                "model": self.config.model,
                "max_tokens": gen.max_tokens,
                "temperature": gen.temperature,
                "messages": [{ "role": "user", "content": prompt }]
            }),
            _ => json!({
                "model": self.config.model,
                "max_tokens": gen.max_tokens,
                "temperature": gen.temperature,
                "messages": [{ "role": "user", "content": prompt }]
            }),
        }
    }

    fn extract_content(provider: &Provider, response: &Value) -> LlmResult<String> {
        let content = match provider {
            Provider::Anthropic => response["content"][0]["text"].as_str(),
            Provider::Ollama => response["response"].as_str(),
            Provider::OpenAI => response["choices"][0]["message"]["content"].as_str(),
            Provider::Custom(_) => response["content"][0]["text"]
                .as_str()
                .or_else(|| response["response"].as_str())
                .or_else(|| response["choices"][0]["message"]["content"].as_str()),
        };
        content
            .map(str::to_string)
            .ok_or_else(|| LlmError::Provider("Failed to extract content from response".into()))
    }
}

#[async_trait]
impl GenerativeService for HttpGenerativeAdapter {
    async fn generate(&self, prompt: &str) -> LlmResult<String> {
        let client = &*HTTP_CLIENT;
        let provider = self.provider();
        let payload = self.build_payload(&provider, prompt);
        debug!(?provider, prompt_len = prompt.len(), "Dispatching generative request");

        let mut request = client
            .post(&self.config.endpoint)
            .header("content-type", "application/json")
            .json(&payload);
        request = match provider {
            Provider::OpenAI => {
                request.header("authorization", format!("Bearer {}", self.config.api_key))
            }
            Provider::Ollama => request,
            _ => request
                .header("x-api-key", &self.config.api_key)
                .header("anthropic-version", &self.config.api_version),
        };

        let response = request.send().await?;
        let status = response.status();
        info!(%status, ?provider, "Received response from generative service");

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(LlmError::Provider(format!(
                "{provider:?} API error {status}: {error_body}"
            )));
        }

        let response_data: Value = response
            .json()
            .await
            .map_err(|e| LlmError::Serialisation(e.to_string()))?;
        Self::extract_content(&provider, &response_data)
    }
}
