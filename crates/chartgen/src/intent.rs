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

//! Classifies whether a question asks for a chart, and which family and
//! variant. Classification failures are never fatal to a chat turn:
//! every failure path degrades to "no chart wanted".

use llm_bridge::{extract_json_object, GenerativeService};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::IntentError;
use crate::model::{ChartFamily, ChartIntent, Variant};

/// Raw wire shape of the classification response.
#[derive(Debug, Deserialize)]
struct IntentWire {
    #[serde(default)]
    needs_graph: bool,
    #[serde(default)]
    chart_type: Option<String>,
    #[serde(default)]
    variant: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
}

fn classification_prompt(question: &str) -> String {
    format!(
        r#"Analyze the following user question and determine if they want a visualization/graph/chart.

User Question: "{question}"

Respond in JSON format with:
{{
    "needs_graph": true/false,
    "chart_type": "bar" | "line" | "pie" | "scatter" | "heatmap" | "candlestick" | "radar" | "gauge" | "funnel" | "sankey" | "treemap" | "sunburst" | "boxplot" | "graph" | "parallel" | "tree" | null,
    "variant": "stacked" | "grouped" | "smooth" | "area" | "donut" | null,
    "reasoning": "brief explanation"
}}

Chart type detection:
- If the user explicitly mentions a chart type (like "show me a bar chart"), set chart_type to that type
- If they want a graph but don't specify the type (like "visualize this"), set chart_type to null
- If they don't want a graph at all, set needs_graph to false

Variant detection:
- Bar charts: "stacked" (stacked bars) or "grouped" (side-by-side bars)
- Line charts: "smooth" (curved lines), "area" (filled area under line), "stacked" (stacked areas)
- Pie charts: "donut" (ring chart with hollow center)
- Set variant to null if no specific variant is mentioned

Common keywords:
- Graphs: chart, graph, plot, visualize, show, display, trend, distribution, comparison
- Stacked: stacked, cumulative, total
- Grouped: grouped, side-by-side, compared
- Smooth: smooth, curved
- Area: area, filled
- Donut: donut, ring
"#
    )
}

/// Classifies the question. Total: empty questions, transport failures,
/// and unparseable responses all come back as a no-chart intent.
pub async fn classify_intent(llm: &dyn GenerativeService, question: &str) -> ChartIntent {
    if question.trim().is_empty() {
        return ChartIntent::none("Empty question");
    }

    let response = match llm.generate(&classification_prompt(question)).await {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, "Intent classification call failed");
            return ChartIntent::none("Error in detection");
        }
    };

    match parse_intent_response(&response) {
        Ok(intent) => intent,
        Err(e) => {
            warn!(error = %e, "Could not parse intent classification response");
            return ChartIntent::none("Error in detection");
        }
    }
}

/// Parses a classification response: fenced or bare JSON, unknown
/// family and variant names dropped rather than propagated.
pub fn parse_intent_response(response: &str) -> Result<ChartIntent, IntentError> {
    let json = extract_json_object(response).ok_or(IntentError::JsonNotFound)?;
    let wire: IntentWire = serde_json::from_str(&json)?;

    let family = wire.chart_type.as_deref().and_then(|name| {
        let parsed = ChartFamily::parse(name);
        if parsed.is_none() {
            debug!(chart_type = name, "Unknown chart family in classification, deferring to auto-selection");
        }
        parsed
    });
    let variant = wire.variant.as_deref().and_then(parse_variant);

    Ok(ChartIntent {
        needs_chart: wire.needs_graph,
        family,
        variant,
        reasoning: wire.reasoning.unwrap_or_default(),
    })
}

fn parse_variant(name: &str) -> Option<Variant> {
    match name {
        "stacked" => Some(Variant::Stacked),
        "grouped" => Some(Variant::Grouped),
        "smooth" => Some(Variant::Smooth),
        "area" => Some(Variant::Area),
        "donut" => Some(Variant::Donut),
        other => {
            debug!(variant = other, "Unknown variant in classification, ignoring");
            None
        }
    }
}

fn selection_prompt(question: &str, query_text: &str, sample: &str) -> String {
    format!(
        r#"You are a data visualization expert. Based on the user's question, SQL query, and data structure, select the BEST chart type.

User Question: "{question}"
SQL Query: "{query_text}"
Data Sample: {sample}

Available chart types:
- bar: Compare categorical data, show rankings
- line: Show trends over time, continuous data
- pie: Show proportions and percentages
- scatter: Show relationships between two variables
- heatmap: Show data density or patterns in a matrix (especially geographic data with coordinates)
- radar: Compare multiple dimensions across items
- gauge: Show single KPI or progress
- funnel: Show conversion or process stages
- sankey: Show flow between states
- treemap: Show hierarchical data with size comparison
- sunburst: Show multi-level hierarchical data
- boxplot: Show statistical distribution
- candlestick: Show financial OHLC data
- graph: Show network relationships
- parallel: Show multi-dimensional data comparison
- tree: Show tree structure/hierarchy

Respond with ONLY the chart type name (one word, lowercase). Examples: "bar", "line", "pie", "heatmap"
"#
    )
}

/// Picks a family when the classification left it open. Total: any
/// failure or unrecognised answer defaults to bar.
pub async fn auto_select_family(
    llm: &dyn GenerativeService,
    question: &str,
    query_text: &str,
    sample: &str,
) -> ChartFamily {
    let truncated: String = sample.chars().take(500).collect();
    let response = match llm
        .generate(&selection_prompt(question, query_text, &truncated))
        .await
    {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, "Chart family selection call failed, defaulting to bar");
            return ChartFamily::Bar;
        }
    };

    let name = response
        .trim()
        .to_lowercase()
        .replace(['"', '\''], "");
    match ChartFamily::parse(&name) {
        Some(family) => family,
        None => {
            warn!(chart_type = %name, "Invalid chart family from selection, defaulting to bar");
            ChartFamily::Bar
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_full_classification() {
        let intent = parse_intent_response(
            r#"{"needs_graph": true, "chart_type": "bar", "variant": "stacked", "reasoning": "comparison"}"#,
        )
        .unwrap();
        assert!(intent.needs_chart);
        assert_eq!(intent.family, Some(ChartFamily::Bar));
        assert_eq!(intent.variant, Some(Variant::Stacked));
    }

    #[test]
    fn parses_fenced_responses() {
        let intent = parse_intent_response(
            "Here you go:\n```json\n{\"needs_graph\": false, \"chart_type\": null, \"variant\": null, \"reasoning\": \"tabular answer\"}\n```",
        )
        .unwrap();
        assert!(!intent.needs_chart);
        assert_eq!(intent.family, None);
    }

    #[test]
    fn unknown_family_defers_to_auto_selection() {
        let intent = parse_intent_response(
            r#"{"needs_graph": true, "chart_type": "histogram", "variant": null, "reasoning": ""}"#,
        )
        .unwrap();
        assert!(intent.needs_chart);
        assert_eq!(intent.family, None);
    }

    #[test]
    fn unknown_variant_is_dropped() {
        let intent = parse_intent_response(
            r#"{"needs_graph": true, "chart_type": "line", "variant": "wobbly", "reasoning": ""}"#,
        )
        .unwrap();
        assert_eq!(intent.variant, None);
    }

    #[test]
    fn prose_without_json_is_an_error() {
        assert!(matches!(
            parse_intent_response("I don't think a chart is needed here."),
            Err(IntentError::JsonNotFound)
        ));
    }

    #[test]
    fn missing_fields_default_to_no_chart() {
        let intent = parse_intent_response(r#"{"reasoning": "unclear"}"#).unwrap();
        assert!(!intent.needs_chart);
        assert_eq!(intent.family, None);
        assert_eq!(intent.variant, None);
    }
}
