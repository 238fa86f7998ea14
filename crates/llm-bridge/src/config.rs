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

use dotenvy::dotenv;
use serde::{Deserialize, Serialize};

use crate::types::{LlmError, LlmResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub max_tokens: u32,
    pub temperature: f32,
    pub stop_sequences: Option<Vec<String>>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_tokens: 4096,
            temperature: 0.2,
            stop_sequences: None,
        }
    }
}

/// Connection settings for the HTTP adapter, sourced from the environment.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub api_version: String,
    pub generation: GenerationConfig,
}

impl AdapterConfig {
    pub fn from_env() -> LlmResult<Self> {
        dotenv().ok();
        let api_key = std::env::var("CHARTGEN_LLM_API_KEY")
            .map_err(|_| LlmError::Configuration("CHARTGEN_LLM_API_KEY not set".to_string()))?;

        Ok(Self {
            endpoint: std::env::var("CHARTGEN_LLM_ENDPOINT")
                .unwrap_or_else(|_| "https://api.anthropic.com/v1/messages".to_string()),
            api_key,
            model: std::env::var("CHARTGEN_LLM_MODEL")
                .unwrap_or_else(|_| "claude-3-5-haiku-latest".to_string()),
            api_version: std::env::var("CHARTGEN_LLM_API_VERSION")
                .unwrap_or_else(|_| "2023-06-01".to_string()),
            generation: GenerationConfig {
                max_tokens: std::env::var("CHARTGEN_LLM_MAX_TOKENS")
                    .unwrap_or_else(|_| "4096".to_string())
                    .parse()
                    .unwrap_or(4096),
                temperature: std::env::var("CHARTGEN_LLM_TEMPERATURE")
                    .unwrap_or_else(|_| "0.2".to_string())
                    .parse()
                    .unwrap_or(0.2),
                stop_sequences: None,
            },
        })
    }

    pub fn ollama(model: String) -> Self {
        dotenv().ok();
        Self {
            endpoint: std::env::var("CHARTGEN_LLM_ENDPOINT")
                .unwrap_or_else(|_| "http://localhost:11434/api/generate".to_string()),
            api_key: String::new(),
            model,
            api_version: String::new(),
            generation: GenerationConfig::default(),
        }
    }
}
