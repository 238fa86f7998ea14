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

//! Runs the chart synthesis pipeline over a sample question. With
//! CHARTGEN_LLM_API_KEY set the real generative adapter is used;
//! without it a canned service drives the same code paths offline.
//! The resulting configuration is written into a self-contained HTML
//! page next to the working directory.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chartgen::{ChartPipeline, RawQueryResult, RenderConfig};
use llm_bridge::{GenerativeService, HttpGenerativeAdapter, LlmError, LlmResult};
use tracing::{info, warn};

const QUESTION: &str = "Compare BEV and PHEV counts by county as a stacked bar chart";
const QUERY: &str = "SELECT County, [Electric Vehicle Type] AS Type, COUNT(*) AS Count \
                     FROM Electric_Vehicle_Population_Data GROUP BY County, [Electric Vehicle Type]";
const RESULT: &str = "[('King', 'Battery Electric Vehicle (BEV)', 5000), \
                      ('King', 'Plug-in Hybrid Electric Vehicle (PHEV)', 1200), \
                      ('Pierce', 'Battery Electric Vehicle (BEV)', 800)]";

/// Offline stand-in replaying the responses a live model would give
/// for the sample question.
struct CannedService {
    responses: Mutex<Vec<String>>,
}

impl CannedService {
    fn new() -> Arc<Self> {
        let responses = vec![
            r#"{"needs_graph": true, "chart_type": "bar", "variant": "stacked", "reasoning": "explicit stacked bar request"}"#.to_string(),
        ];
        Arc::new(Self {
            responses: Mutex::new(responses),
        })
    }
}

#[async_trait]
impl GenerativeService for CannedService {
    async fn generate(&self, _prompt: &str) -> LlmResult<String> {
        let mut responses = self.responses.lock().expect("canned responses");
        if responses.is_empty() {
            // Later stages degrade to the deterministic fallback.
            Err(LlmError::Provider("canned script exhausted".to_string()))
        } else {
            Ok(responses.remove(0))
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_target(false)
        .init();

    dotenvy::dotenv().ok();

    let llm: Arc<dyn GenerativeService> = match HttpGenerativeAdapter::from_env() {
        Ok(adapter) => {
            info!("Using configured generative endpoint");
            Arc::new(adapter)
        }
        Err(e) => {
            warn!(error = %e, "No generative endpoint configured, using canned responses");
            CannedService::new()
        }
    };

    let pipeline = ChartPipeline::new(llm);
    let config = pipeline
        .synthesise(QUESTION, QUERY, &RawQueryResult::from(RESULT))
        .await?;

    match config {
        Some(config) => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            let path = "chart.html";
            std::fs::write(path, render_html(&config)?)?;
            info!(path, "Wrote chart page");
        }
        None => info!("No chart wanted for this question"),
    }
    Ok(())
}

fn render_html(config: &RenderConfig) -> Result<String, serde_json::Error> {
    let option = serde_json::to_string(config)?;
    Ok(format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <script src="https://cdn.jsdelivr.net/npm/echarts@5.4.3/dist/echarts.min.js"></script>
    <style>
        body {{ margin: 0; padding: 10px; background: transparent; }}
        #chart {{ width: 100%; height: 400px; }}
    </style>
</head>
<body>
    <div id="chart"></div>
    <script>
        var chartDom = document.getElementById('chart');
        var myChart = echarts.init(chartDom);
        var option = {option};
        myChart.setOption(option);
        window.addEventListener('resize', function() {{
            myChart.resize();
        }});
    </script>
</body>
</html>
"#
    ))
}
