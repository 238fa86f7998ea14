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

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One cell of a normalised query result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl CellValue {
    pub fn is_numeric(&self) -> bool {
        matches!(self, CellValue::Int(_) | CellValue::Float(_))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Int(v) => Some(*v as f64),
            CellValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Label form used for categories and group names.
    pub fn label(&self) -> String {
        match self {
            CellValue::Null => String::new(),
            CellValue::Bool(v) => v.to_string(),
            CellValue::Int(v) => v.to_string(),
            CellValue::Float(v) => v.to_string(),
            CellValue::Text(v) => v.clone(),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<i64> for CellValue {
    fn from(v: i64) -> Self {
        CellValue::Int(v)
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> Self {
        CellValue::Float(v)
    }
}

/// Column-labelled row. Insertion order is query-output order and is
/// shared by every record produced from one result.
pub type NormalisedRecord = IndexMap<String, CellValue>;

/// The ambiguous shapes a query result may arrive in.
#[derive(Debug, Clone)]
pub enum RawQueryResult {
    Records(Vec<NormalisedRecord>),
    Rows(Vec<Vec<CellValue>>),
    Text(String),
    Empty,
}

impl From<&str> for RawQueryResult {
    fn from(s: &str) -> Self {
        RawQueryResult::Text(s.to_string())
    }
}

impl From<String> for RawQueryResult {
    fn from(s: String) -> Self {
        RawQueryResult::Text(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartFamily {
    Bar,
    Line,
    Pie,
    Scatter,
    Heatmap,
    Radar,
    Gauge,
    Funnel,
    Sankey,
    Treemap,
    Sunburst,
    Boxplot,
    Candlestick,
    Graph,
    Parallel,
    Tree,
}

impl ChartFamily {
    pub const ALL: [ChartFamily; 16] = [
        ChartFamily::Bar,
        ChartFamily::Line,
        ChartFamily::Pie,
        ChartFamily::Scatter,
        ChartFamily::Heatmap,
        ChartFamily::Radar,
        ChartFamily::Gauge,
        ChartFamily::Funnel,
        ChartFamily::Sankey,
        ChartFamily::Treemap,
        ChartFamily::Sunburst,
        ChartFamily::Boxplot,
        ChartFamily::Candlestick,
        ChartFamily::Graph,
        ChartFamily::Parallel,
        ChartFamily::Tree,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChartFamily::Bar => "bar",
            ChartFamily::Line => "line",
            ChartFamily::Pie => "pie",
            ChartFamily::Scatter => "scatter",
            ChartFamily::Heatmap => "heatmap",
            ChartFamily::Radar => "radar",
            ChartFamily::Gauge => "gauge",
            ChartFamily::Funnel => "funnel",
            ChartFamily::Sankey => "sankey",
            ChartFamily::Treemap => "treemap",
            ChartFamily::Sunburst => "sunburst",
            ChartFamily::Boxplot => "boxplot",
            ChartFamily::Candlestick => "candlestick",
            ChartFamily::Graph => "graph",
            ChartFamily::Parallel => "parallel",
            ChartFamily::Tree => "tree",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.as_str() == s)
    }
}

/// A rendering sub-mode altering series composition, not category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    Stacked,
    Grouped,
    Smooth,
    Area,
    Donut,
}

impl Variant {
    /// The family × variant combination table. Anything not listed here
    /// is invalid and must be normalised away, never propagated.
    pub fn allowed_for(&self, family: ChartFamily) -> bool {
        match self {
            Variant::Stacked | Variant::Grouped => {
                matches!(family, ChartFamily::Bar | ChartFamily::Line)
            }
            Variant::Smooth | Variant::Area => matches!(family, ChartFamily::Line),
            Variant::Donut => matches!(family, ChartFamily::Pie),
        }
    }
}

/// Drops a variant that is meaningless for the resolved family.
pub fn normalise_variant(family: ChartFamily, variant: Option<Variant>) -> Option<Variant> {
    variant.filter(|v| v.allowed_for(family))
}

/// Outcome of intent classification over the user's question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartIntent {
    pub needs_chart: bool,
    pub family: Option<ChartFamily>,
    pub variant: Option<Variant>,
    pub reasoning: String,
}

impl ChartIntent {
    pub fn none(reasoning: &str) -> Self {
        Self {
            needs_chart: false,
            family: None,
            variant: None,
            reasoning: reasoning.to_string(),
        }
    }
}

/// Report from the data sufficiency check.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SufficiencyReport {
    pub is_sufficient: bool,
    #[serde(default)]
    pub missing_info: Option<String>,
    #[serde(default)]
    pub suggested_query: Option<String>,
}

impl SufficiencyReport {
    pub fn sufficient() -> Self {
        Self {
            is_sufficient: true,
            missing_info: None,
            suggested_query: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub category: String,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

/// The canonical, family-agnostic intermediate every rendering
/// configuration is derived from. Field names mirror the wire shape the
/// option synthesiser embeds in its prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartDataModel {
    #[serde(rename = "data")]
    pub points: Vec<DataPoint>,
    pub stack: bool,
    pub group: bool,
    pub smooth: bool,
    pub area: bool,
    #[serde(rename = "innerRadius", skip_serializing_if = "Option::is_none")]
    pub inner_radius: Option<f64>,
    pub title: String,
    #[serde(rename = "axisXTitle")]
    pub axis_x_title: Option<String>,
    #[serde(rename = "axisYTitle")]
    pub axis_y_title: Option<String>,
}

impl ChartDataModel {
    /// Distinct categories in first-seen order.
    pub fn categories(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for point in &self.points {
            if !seen.contains(&point.category.as_str()) {
                seen.push(point.category.as_str());
            }
        }
        seen
    }

    /// Distinct group labels in first-seen order.
    pub fn groups(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for point in &self.points {
            if let Some(group) = point.group.as_deref() {
                if !seen.contains(&group) {
                    seen.push(group);
                }
            }
        }
        seen
    }

    pub fn value_at(&self, category: &str, group: Option<&str>) -> Option<f64> {
        self.points
            .iter()
            .find(|p| p.category == category && p.group.as_deref() == group)
            .map(|p| p.value)
    }
}

/// Opaque nested mapping handed to the rendering engine. Created fresh
/// per request, never mutated after being returned.
pub type RenderConfig = serde_json::Value;
