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

//! End-to-end pipeline tests over a scripted generative service. Each
//! script is the ordered list of responses the pipeline will consume.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chartgen::{
    ChartPipeline, QueryExecutionError, QueryExecutor, RawQueryResult,
};
use llm_bridge::{GenerativeService, LlmError, LlmResult};

struct ScriptedService {
    responses: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedService {
    fn new(responses: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.iter().map(|s| s.to_string()).collect()),
            prompts: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl GenerativeService for ScriptedService {
    async fn generate(&self, prompt: &str) -> LlmResult<String> {
        self.prompts.lock().expect("prompt lock").push(prompt.to_string());
        self.responses
            .lock()
            .expect("script lock")
            .pop_front()
            .ok_or_else(|| LlmError::Provider("script exhausted".to_string()))
    }
}

struct ScriptedExecutor {
    result: RawQueryResult,
    calls: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    fn new(result: RawQueryResult) -> Arc<Self> {
        Arc::new(Self {
            result,
            calls: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl QueryExecutor for ScriptedExecutor {
    async fn execute(&self, query_text: &str) -> Result<RawQueryResult, QueryExecutionError> {
        self.calls.lock().expect("call lock").push(query_text.to_string());
        Ok(self.result.clone())
    }
}

const EV_QUERY: &str = "SELECT County, [Electric Vehicle Type] AS Type, COUNT(*) AS Count \
                        FROM EVs GROUP BY County, [Electric Vehicle Type]";
const EV_RESULT: &str =
    "[('King', 'BEV', 5000), ('King', 'PHEV', 1200), ('Pierce', 'BEV', 800)]";

const STACKED_INTENT: &str = r#"{"needs_graph": true, "chart_type": "bar", "variant": "stacked", "reasoning": "explicit request"}"#;

#[tokio::test]
async fn stacked_bar_end_to_end() {
    // BEV/PHEV by county with one missing pair; the synthesised option
    // includes the zero fill so it passes the value gate verbatim.
    let option = r#"{
        "title": {"text": "EV adoption", "left": "center"},
        "legend": {"data": ["BEV", "PHEV"]},
        "xAxis": {"type": "category", "data": ["King", "Pierce"]},
        "yAxis": {"type": "value"},
        "series": [
            {"name": "BEV", "type": "bar", "stack": "total", "data": [5000, 800]},
            {"name": "PHEV", "type": "bar", "stack": "total", "data": [1200, 0]}
        ]
    }"#;
    let llm = ScriptedService::new(&[STACKED_INTENT, option]);
    let pipeline = ChartPipeline::new(llm);

    let config = pipeline
        .synthesise(
            "Compare BEV and PHEV counts by county as a stacked bar chart",
            EV_QUERY,
            &RawQueryResult::from(EV_RESULT),
        )
        .await
        .unwrap()
        .expect("a chart was requested");

    let series = config["series"].as_array().unwrap();
    assert_eq!(series.len(), 2);
    assert!(series.iter().all(|s| s["stack"] == "total"));
    assert_eq!(series[1]["data"][1], 0);
}

#[tokio::test]
async fn no_chart_request_returns_none() {
    let llm = ScriptedService::new(&[
        r#"{"needs_graph": false, "chart_type": null, "variant": null, "reasoning": "plain lookup"}"#,
    ]);
    let pipeline = ChartPipeline::new(llm);

    let config = pipeline
        .synthesise("What is the total?", "SELECT COUNT(*) AS n FROM EVs", &RawQueryResult::from("[(42,)]"))
        .await
        .unwrap();
    assert!(config.is_none());
}

#[tokio::test]
async fn unparseable_classification_degrades_to_none() {
    let llm = ScriptedService::new(&["I would recommend a nice bar chart here."]);
    let pipeline = ChartPipeline::new(llm);

    let config = pipeline
        .synthesise("chart it", EV_QUERY, &RawQueryResult::from(EV_RESULT))
        .await
        .unwrap();
    assert!(config.is_none());
}

#[tokio::test]
async fn trailing_commas_are_repaired_without_falling_back() {
    let option = r#"```json
{
    "title": {"text": "Synthesised"},
    "series": [
        {"type": "bar", "data": [5000, 1200, 800,],},
    ],
}
```"#;
    let llm = ScriptedService::new(&[
        r#"{"needs_graph": true, "chart_type": "bar", "variant": null, "reasoning": ""}"#,
        option,
    ]);
    let pipeline = ChartPipeline::new(llm);

    let config = pipeline
        .synthesise(
            "Chart the counts",
            "SELECT Label, Count FROM T",
            &RawQueryResult::from("[('King BEV', 5000), ('King PHEV', 1200), ('Pierce BEV', 800)]"),
        )
        .await
        .unwrap()
        .expect("chart requested");

    // The repaired response survived; the fallback titles differently.
    assert_eq!(config["title"]["text"], "Synthesised");
}

#[tokio::test]
async fn hallucinated_option_falls_back_with_correct_values() {
    let option = r#"{"series": [{"type": "bar", "data": [9999, 1200, 800]}]}"#;
    let llm = ScriptedService::new(&[
        r#"{"needs_graph": true, "chart_type": "bar", "variant": null, "reasoning": ""}"#,
        option,
    ]);
    let pipeline = ChartPipeline::new(llm);

    let config = pipeline
        .synthesise(
            "Chart the counts",
            "SELECT Label, Count FROM T",
            &RawQueryResult::from("[('a', 5000), ('b', 1200), ('c', 800)]"),
        )
        .await
        .unwrap()
        .expect("chart requested");

    let data = config["series"][0]["data"].as_array().unwrap();
    let values: Vec<f64> = data.iter().map(|v| v.as_f64().unwrap()).collect();
    assert_eq!(values, vec![5000.0, 1200.0, 800.0]);
    assert_eq!(config["xAxis"]["data"][0], "a");
}

#[tokio::test]
async fn synthesis_failure_lands_on_the_family_fallback() {
    // Script runs dry after classification: the synthesis call errors
    // and the pie fallback takes over. The stacked variant is
    // meaningless for pie and must leave no trace.
    let llm = ScriptedService::new(&[
        r#"{"needs_graph": true, "chart_type": "pie", "variant": "stacked", "reasoning": ""}"#,
    ]);
    let pipeline = ChartPipeline::new(llm);

    let config = pipeline
        .synthesise(
            "Share of vehicle types",
            "SELECT Type, COUNT(*) AS n FROM EVs GROUP BY Type",
            &RawQueryResult::from("[('BEV', 70000), ('PHEV', 30000)]"),
        )
        .await
        .unwrap()
        .expect("chart requested");

    assert_eq!(config["series"][0]["type"], "pie");
    assert_eq!(config["series"][0]["radius"], "50%");
    assert_eq!(config["series"][0]["data"][0]["name"], "BEV");
    assert_eq!(config["series"][0]["data"][0]["value"].as_f64(), Some(70000.0));
}

#[tokio::test]
async fn auto_selects_a_family_when_classification_leaves_it_open() {
    let llm = ScriptedService::new(&[
        r#"{"needs_graph": true, "chart_type": null, "variant": null, "reasoning": "visualize this"}"#,
        "line",
        r#"{"series": [{"type": "line", "data": [10, 20]}]}"#,
    ]);
    let pipeline = ChartPipeline::new(llm);

    let config = pipeline
        .synthesise(
            "Visualize registrations over time",
            "SELECT Year, COUNT(*) AS n FROM EVs GROUP BY Year",
            &RawQueryResult::from("[(2023, 10), (2024, 20)]"),
        )
        .await
        .unwrap()
        .expect("chart requested");
    assert_eq!(config["series"][0]["type"], "line");
}

#[tokio::test]
async fn insufficient_data_triggers_one_supplementary_fetch() {
    let suggested = "SELECT County, Type, COUNT(*) AS Count FROM EVs GROUP BY County, Type";
    let llm = ScriptedService::new(&[
        STACKED_INTENT,
        &format!(
            r#"{{"isSufficient": false, "missingInfo": "PHEV rows absent", "suggestedQuery": "{suggested}"}}"#
        ),
        "not json at all, synthesis will fall back",
    ]);
    let executor = ScriptedExecutor::new(RawQueryResult::from(EV_RESULT));
    let pipeline = ChartPipeline::new(llm).with_executor(executor.clone());

    let config = pipeline
        .synthesise(
            "Compare BEV and PHEV counts by county as a stacked bar chart",
            "SELECT County, COUNT(*) AS Count FROM EVs GROUP BY County",
            &RawQueryResult::from("[('King', 6200), ('Pierce', 800)]"),
        )
        .await
        .unwrap()
        .expect("chart requested");

    let calls = executor.calls.lock().unwrap();
    assert_eq!(calls.as_slice(), &[suggested.to_string()]);

    // Fallback built from the supplementary rows: two series including
    // the zero-filled (Pierce, PHEV) pair.
    let series = config["series"].as_array().unwrap();
    assert_eq!(series.len(), 2);
    assert_eq!(series[1]["name"], "PHEV");
    assert_eq!(series[1]["data"][1].as_f64(), Some(0.0));
}

#[tokio::test]
async fn family_is_resolved_before_the_sufficiency_check() {
    // Intent names no family, so the selection call must come second
    // and the sufficiency prompt must already carry the chosen family.
    let llm = ScriptedService::new(&[
        r#"{"needs_graph": true, "chart_type": null, "variant": null, "reasoning": "visualize this"}"#,
        "pie",
        r#"{"isSufficient": true, "missingInfo": null, "suggestedQuery": null}"#,
    ]);
    let executor = ScriptedExecutor::new(RawQueryResult::Empty);
    let pipeline = ChartPipeline::new(llm.clone()).with_executor(executor);

    pipeline
        .synthesise(
            "Visualize the share of vehicle types",
            "SELECT Type, COUNT(*) AS n FROM EVs GROUP BY Type",
            &RawQueryResult::from("[('BEV', 70000), ('PHEV', 30000)]"),
        )
        .await
        .unwrap()
        .expect("chart requested");

    let prompts = llm.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 4);
    assert!(prompts[1].contains("select the BEST chart type"));
    assert!(prompts[2].contains("Chart Family: pie"));
}

#[tokio::test]
async fn sufficient_data_skips_the_executor() {
    let llm = ScriptedService::new(&[
        STACKED_INTENT,
        r#"{"isSufficient": true, "missingInfo": null, "suggestedQuery": null}"#,
        "garbage, synthesis falls back",
    ]);
    let executor = ScriptedExecutor::new(RawQueryResult::Empty);
    let pipeline = ChartPipeline::new(llm).with_executor(executor.clone());

    pipeline
        .synthesise(
            "Compare BEV and PHEV counts by county as a stacked bar chart",
            EV_QUERY,
            &RawQueryResult::from(EV_RESULT),
        )
        .await
        .unwrap()
        .expect("chart requested");

    assert!(executor.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn empty_result_still_returns_a_renderable_config() {
    let llm = ScriptedService::new(&[
        r#"{"needs_graph": true, "chart_type": "bar", "variant": null, "reasoning": ""}"#,
    ]);
    let pipeline = ChartPipeline::new(llm);

    let config = pipeline
        .synthesise("Chart nothing", "SELECT a FROM empty", &RawQueryResult::from("[]"))
        .await
        .unwrap()
        .expect("chart requested");
    assert_eq!(config["title"]["text"], "No Data Available");
    assert!(config["series"][0]["data"].as_array().unwrap().is_empty());
}
