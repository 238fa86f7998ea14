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

//! Orchestrates one request from question and raw result to an
//! optional rendering configuration. The staged contract: once intent
//! says a chart is wanted, some configuration always comes back, with
//! the deterministic fallback as the floor. Every external call runs
//! under a timeout; a timeout degrades the stage, never the request.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use llm_bridge::GenerativeService;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{QueryExecutionError, Result};
use crate::fallback::generate_fallback;
use crate::intent::{auto_select_family, classify_intent};
use crate::model::{
    normalise_variant, ChartFamily, ChartIntent, NormalisedRecord, RawQueryResult, RenderConfig,
};
use crate::options::synthesise_option;
use crate::sufficiency::check_sufficiency;
use crate::{shaper, sql, tabular};

/// Executes a supplementary query suggested by the sufficiency check.
/// Optional: without one the pipeline simply charts the data in hand.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(
        &self,
        query_text: &str,
    ) -> std::result::Result<RawQueryResult, QueryExecutionError>;
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Bound on each generative call.
    pub llm_timeout: Duration,
    /// Bound on a supplementary query execution.
    pub query_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            llm_timeout: Duration::from_secs(30),
            query_timeout: Duration::from_secs(30),
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        Self {
            llm_timeout: env_secs("CHARTGEN_LLM_TIMEOUT_SECS", 30),
            query_timeout: env_secs("CHARTGEN_QUERY_TIMEOUT_SECS", 30),
        }
    }
}

fn env_secs(key: &str, default: u64) -> Duration {
    let secs = std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default);
    Duration::from_secs(secs)
}

pub struct ChartPipeline {
    llm: Arc<dyn GenerativeService>,
    executor: Option<Arc<dyn QueryExecutor>>,
    config: PipelineConfig,
}

impl ChartPipeline {
    pub fn new(llm: Arc<dyn GenerativeService>) -> Self {
        Self {
            llm,
            executor: None,
            config: PipelineConfig::default(),
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn QueryExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Runs the full pipeline. `Ok(None)` means no chart was wanted;
    /// `Ok(Some(_))` carries a configuration that is always renderable.
    pub async fn synthesise(
        &self,
        question: &str,
        query_text: &str,
        raw: &RawQueryResult,
    ) -> Result<Option<RenderConfig>> {
        let intent = self.classify(question).await;
        if !intent.needs_chart {
            debug!(reasoning = %intent.reasoning, "No chart wanted");
            return Ok(None);
        }

        let columns = sql::recover_columns(query_text);
        let mut records = normalise_or_empty(raw, &columns);

        // Family before sufficiency: the checker judges the rows against
        // the chart that will actually be drawn.
        let family = self
            .resolve_family(&intent, question, query_text, &records)
            .await;

        if let Some(replacement) = self.supplement(question, family, &records).await {
            records = replacement;
        }

        let variant = normalise_variant(family, intent.variant);
        debug!(family = family.as_str(), ?variant, rows = records.len(), "Resolved chart request");

        let model = shaper::shape(&records, family, variant, question);
        if model.points.is_empty() {
            info!("No chartable rows, returning fallback configuration");
            return Ok(Some(generate_fallback(family, &model)));
        }

        let config = match timeout(
            self.config.llm_timeout,
            synthesise_option(self.llm.as_ref(), family, &model),
        )
        .await
        {
            Ok(Ok(config)) => config,
            Ok(Err(e)) => {
                warn!(error = %e, "Option synthesis failed, using fallback");
                generate_fallback(family, &model)
            }
            Err(_) => {
                warn!("Option synthesis timed out, using fallback");
                generate_fallback(family, &model)
            }
        };
        Ok(Some(config))
    }

    async fn classify(&self, question: &str) -> ChartIntent {
        match timeout(self.config.llm_timeout, classify_intent(self.llm.as_ref(), question)).await {
            Ok(intent) => intent,
            Err(_) => {
                warn!("Intent classification timed out");
                ChartIntent::none("Classification timed out")
            }
        }
    }

    async fn resolve_family(
        &self,
        intent: &ChartIntent,
        question: &str,
        query_text: &str,
        records: &[NormalisedRecord],
    ) -> ChartFamily {
        if let Some(family) = intent.family {
            return family;
        }
        let sample = sample_json(records);
        match timeout(
            self.config.llm_timeout,
            auto_select_family(self.llm.as_ref(), question, query_text, &sample),
        )
        .await
        {
            Ok(family) => family,
            Err(_) => {
                warn!("Chart family selection timed out, defaulting to bar");
                ChartFamily::Bar
            }
        }
    }

    /// At-most-once supplementary fetch. The replacement is adopted
    /// only when it actually normalises into rows; otherwise the
    /// original records stand.
    async fn supplement(
        &self,
        question: &str,
        family: ChartFamily,
        records: &[NormalisedRecord],
    ) -> Option<Vec<NormalisedRecord>> {
        let executor = self.executor.as_ref()?;

        let report = match timeout(
            self.config.llm_timeout,
            check_sufficiency(self.llm.as_ref(), question, family, records),
        )
        .await
        {
            Ok(report) => report,
            Err(_) => {
                warn!("Sufficiency check timed out, proceeding with available data");
                return None;
            }
        };
        if report.is_sufficient {
            return None;
        }
        let suggested = report.suggested_query?;

        info!(query = %suggested, "Fetching supplementary data");
        let raw = match timeout(self.config.query_timeout, executor.execute(&suggested)).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                warn!(error = %e, "Supplementary query failed, proceeding with available data");
                return None;
            }
            Err(_) => {
                warn!("Supplementary query timed out, proceeding with available data");
                return None;
            }
        };

        let columns = sql::recover_columns(&suggested);
        let replacement = normalise_or_empty(&raw, &columns);
        if replacement.is_empty() {
            warn!("Supplementary result had no usable rows, keeping original data");
            None
        } else {
            Some(replacement)
        }
    }
}

fn normalise_or_empty(raw: &RawQueryResult, columns: &[String]) -> Vec<NormalisedRecord> {
    match tabular::normalise(raw, columns) {
        Ok(records) => records,
        Err(e) => {
            warn!(error = %e, "Result normalisation failed, treating as empty");
            Vec::new()
        }
    }
}

fn sample_json(records: &[NormalisedRecord]) -> String {
    let head: Vec<&NormalisedRecord> = records.iter().take(5).collect();
    serde_json::to_string(&head).unwrap_or_else(|_| "[]".to_string())
}
