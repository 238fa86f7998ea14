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

//! Generative synthesis of the rendering configuration. The response
//! goes through strict parsing, one mechanical repair pass, and a
//! validation gate that re-checks the series values against the data
//! model; anything that fails the gate is rejected so the caller can
//! substitute the deterministic fallback. Repair is mechanical only,
//! never semantic.

use llm_bridge::{repair_json, strip_code_fences, GenerativeService};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::SynthesisError;
use crate::model::{ChartDataModel, ChartFamily, RenderConfig};

fn synthesis_prompt(family: ChartFamily, model: &ChartDataModel) -> String {
    let data_json =
        serde_json::to_string_pretty(model).unwrap_or_else(|_| "{}".to_string());
    let has_groups = model.points.iter().any(|p| p.group.is_some());
    format!(
        r#"Generate a complete ECharts option object in JSON format for a {family} chart.

Chart Type: {family}
Data: {data_json}
Has Groups: {has_groups}
Is Stacked: {stack}
Is Grouped: {group}
Is Smooth: {smooth}
Show Area: {area}
Inner Radius: {inner_radius}

CRITICAL INSTRUCTIONS FOR STACKED/GROUPED CHARTS:
1. If data has "group" field, create MULTIPLE series - one per unique group
2. For stacked bar: Each series should have same stack ID (e.g., "stack": "total")
3. For grouped bar: Each series should NOT have a stack property
4. Extract unique categories and groups from the data
5. Map data correctly to each series

Example for STACKED BAR with groups:
{{
  "title": {{"text": "Title", "left": "center"}},
  "tooltip": {{"trigger": "axis", "axisPointer": {{"type": "shadow"}}}},
  "legend": {{"data": ["BEV", "PHEV"]}},
  "xAxis": {{"type": "category", "data": ["King", "Pierce"]}},
  "yAxis": {{"type": "value"}},
  "series": [
    {{"name": "BEV", "type": "bar", "stack": "total", "data": [5000, 3000]}},
    {{"name": "PHEV", "type": "bar", "stack": "total", "data": [2000, 1500]}}
  ]
}}

Example for GROUPED BAR (no stack):
{{
  "title": {{"text": "Title", "left": "center"}},
  "tooltip": {{"trigger": "axis"}},
  "legend": {{"data": ["BEV", "PHEV"]}},
  "xAxis": {{"type": "category", "data": ["King", "Pierce"]}},
  "yAxis": {{"type": "value"}},
  "series": [
    {{"name": "BEV", "type": "bar", "data": [5000, 3000]}},
    {{"name": "PHEV", "type": "bar", "data": [2000, 1500]}}
  ]
}}

Example for SMOOTH LINE:
{{
  "series": [{{"type": "line", "smooth": true, "data": [100, 150]}}]
}}

Example for AREA LINE:
{{
  "series": [{{"type": "line", "areaStyle": {{}}, "data": [100, 150]}}]
}}

Example for DONUT PIE:
{{
  "series": [{{"type": "pie", "radius": ["40%", "70%"], "data": [{{"name": "BEV", "value": 70000}}]}}]
}}

Now generate the complete, professional ECharts option with:
- Proper title from the data
- Tooltips with appropriate triggers
- Legend (if multiple series)
- Axis labels (if applicable)
- Use ONLY the values present in the data, never invent numbers

Respond with ONLY valid JSON, no explanations:
"#,
        family = family.as_str(),
        stack = model.stack,
        group = model.group,
        smooth = model.smooth,
        area = model.area,
        inner_radius = model.inner_radius.unwrap_or(0.0),
    )
}

/// Asks the generative service for a rendering configuration and gates
/// the result. Errors here are a signal to fall back, not to abort.
pub async fn synthesise_option(
    llm: &dyn GenerativeService,
    family: ChartFamily,
    model: &ChartDataModel,
) -> Result<RenderConfig, SynthesisError> {
    let response = llm
        .generate(&synthesis_prompt(family, model))
        .await
        .map_err(|e| SynthesisError::Llm(e.to_string()))?;
    parse_and_validate(&response, model)
}

/// Fence-strip, strict parse, one repair pass, strict parse again, then
/// the validation gate.
pub fn parse_and_validate(
    response: &str,
    model: &ChartDataModel,
) -> Result<RenderConfig, SynthesisError> {
    let stripped = strip_code_fences(response);

    let parsed = match serde_json::from_str::<Value>(&stripped) {
        Ok(value) => value,
        Err(first_error) => {
            debug!(
                error = %first_error,
                fragment = %truncate(&stripped, 500),
                "Strict parse failed, attempting mechanical repair"
            );
            let repaired = repair_json(&stripped);
            serde_json::from_str::<Value>(&repaired).map_err(|e| {
                warn!(error = %e, "Repair pass did not yield valid JSON");
                SynthesisError::Unparsable(e.to_string())
            })?
        }
    };

    validate(&parsed, model)?;
    Ok(parsed)
}

/// A configuration is acceptable only if it is an object with at least
/// one series and its series data carries exactly the values of the
/// data model. Catches both hallucinated numbers and dropped rows.
fn validate(config: &Value, model: &ChartDataModel) -> Result<(), SynthesisError> {
    if !config.is_object() {
        return Err(SynthesisError::Rejected {
            reason: "response is not a JSON object".to_string(),
        });
    }

    let series = config
        .get("series")
        .and_then(Value::as_array)
        .ok_or_else(|| SynthesisError::Rejected {
            reason: "missing series array".to_string(),
        })?;
    if series.is_empty() {
        return Err(SynthesisError::Rejected {
            reason: "series array is empty".to_string(),
        });
    }

    if model.points.is_empty() {
        return Ok(());
    }

    let mut expected: Vec<f64> = model.points.iter().map(|p| p.value).collect();
    let mut actual = series_values(series);
    expected.sort_by(f64::total_cmp);
    actual.sort_by(f64::total_cmp);

    let matches = expected.len() == actual.len()
        && expected
            .iter()
            .zip(&actual)
            .all(|(e, a)| (e - a).abs() < 1e-6);
    if !matches {
        return Err(SynthesisError::Rejected {
            reason: format!(
                "series values do not round-trip the data model ({} expected, {} found)",
                expected.len(),
                actual.len()
            ),
        });
    }
    Ok(())
}

/// Flattens every numeric datum out of the series list. Entries may be
/// bare numbers, `{"value": n}` objects, or positional arrays whose
/// last element is the measure.
fn series_values(series: &[Value]) -> Vec<f64> {
    let mut values = Vec::new();
    for entry in series {
        let Some(data) = entry.get("data").and_then(Value::as_array) else {
            continue;
        };
        for datum in data {
            match datum {
                Value::Number(n) => {
                    if let Some(v) = n.as_f64() {
                        values.push(v);
                    }
                }
                Value::Object(obj) => {
                    if let Some(v) = obj.get("value").and_then(Value::as_f64) {
                        values.push(v);
                    }
                }
                Value::Array(triple) => {
                    if let Some(v) = triple.last().and_then(Value::as_f64) {
                        values.push(v);
                    }
                }
                _ => {}
            }
        }
    }
    values
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &s[..end])
    }
}
