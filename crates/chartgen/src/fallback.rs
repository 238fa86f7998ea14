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

//! Deterministic rendering configurations built directly from the data
//! model. Total over every family and every model: this is the floor
//! the pipeline lands on when synthesis fails, so it must never fail
//! itself.

use serde_json::{json, Value};

use crate::model::{ChartDataModel, ChartFamily, RenderConfig};

/// Builds a minimal but renderable configuration for any family.
pub fn generate_fallback(family: ChartFamily, model: &ChartDataModel) -> RenderConfig {
    match family {
        ChartFamily::Pie => pie_option(model),
        ChartFamily::Bar => cartesian_option(model, "bar"),
        ChartFamily::Line => cartesian_option(model, "line"),
        ChartFamily::Heatmap => heatmap_option(model),
        other => generic_option(model, other.as_str()),
    }
}

fn title_block(model: &ChartDataModel) -> Value {
    json!({"text": model.title, "left": "center"})
}

fn axis(kind: &str, name: Option<&str>, data: Option<Vec<String>>) -> Value {
    let mut axis = json!({"type": kind});
    if let Some(name) = name {
        axis["name"] = json!(name);
    }
    if let Some(data) = data {
        axis["data"] = json!(data);
    }
    axis
}

fn pie_option(model: &ChartDataModel) -> RenderConfig {
    let radius = if model.inner_radius.unwrap_or(0.0) > 0.0 {
        json!(["40%", "70%"])
    } else {
        json!("50%")
    };
    let data: Vec<Value> = model
        .points
        .iter()
        .map(|p| json!({"name": p.category, "value": p.value}))
        .collect();
    json!({
        "title": {"text": model.title, "left": "center", "top": "5%"},
        "tooltip": {"trigger": "item"},
        "legend": {"orient": "vertical", "left": "left"},
        "series": [{
            "name": model.title,
            "type": "pie",
            "radius": radius,
            "data": data,
            "emphasis": {
                "itemStyle": {
                    "shadowBlur": 10,
                    "shadowOffsetX": 0,
                    "shadowColor": "rgba(0, 0, 0, 0.5)"
                }
            }
        }]
    })
}

/// Bar and line share a frame; grouped data fans out into one series
/// per group, stacked series share the "total" stack id.
fn cartesian_option(model: &ChartDataModel, family: &str) -> RenderConfig {
    let categories: Vec<String> =
        model.categories().iter().map(|c| c.to_string()).collect();
    let groups: Vec<String> = model.groups().iter().map(|g| g.to_string()).collect();

    let series: Vec<Value> = if groups.is_empty() {
        vec![decorate_series(
            model,
            json!({
                "type": family,
                "data": model.points.iter().map(|p| p.value).collect::<Vec<f64>>()
            }),
        )]
    } else {
        groups
            .iter()
            .map(|group| {
                let data: Vec<f64> = categories
                    .iter()
                    .map(|category| {
                        model.value_at(category, Some(group.as_str())).unwrap_or(0.0)
                    })
                    .collect();
                let mut series = json!({"name": group, "type": family, "data": data});
                if model.stack {
                    series["stack"] = json!("total");
                }
                decorate_series(model, series)
            })
            .collect()
    };

    let mut option = json!({
        "title": title_block(model),
        "tooltip": if family == "bar" {
            json!({"trigger": "axis", "axisPointer": {"type": "shadow"}})
        } else {
            json!({"trigger": "axis"})
        },
        "xAxis": axis("category", model.axis_x_title.as_deref(), Some(categories)),
        "yAxis": axis("value", model.axis_y_title.as_deref(), None),
        "series": series
    });
    if groups.len() > 1 {
        option["legend"] = json!({"data": groups});
    }
    option
}

fn decorate_series(model: &ChartDataModel, mut series: Value) -> Value {
    if model.smooth {
        series["smooth"] = json!(true);
    }
    if model.area {
        series["areaStyle"] = json!({});
    }
    series
}

/// Heatmap cells are `[x, y, value]` triples indexed into the category
/// and group axis lists; the visual map spans the observed values.
fn heatmap_option(model: &ChartDataModel) -> RenderConfig {
    let categories: Vec<String> =
        model.categories().iter().map(|c| c.to_string()).collect();
    let groups: Vec<String> = model.groups().iter().map(|g| g.to_string()).collect();

    let cells: Vec<Value> = model
        .points
        .iter()
        .filter_map(|p| {
            let x = categories.iter().position(|c| c == &p.category)?;
            let y = p
                .group
                .as_deref()
                .and_then(|g| groups.iter().position(|candidate| candidate.as_str() == g))
                .unwrap_or(0);
            Some(json!([x, y, p.value]))
        })
        .collect();

    let values: Vec<f64> = model.points.iter().map(|p| p.value).collect();
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let (min, max) = if values.is_empty() { (0.0, 100.0) } else { (min, max) };

    json!({
        "title": title_block(model),
        "tooltip": {"position": "top"},
        "grid": {"height": "70%", "top": "10%"},
        "xAxis": {"type": "category", "data": categories},
        "yAxis": {"type": "category", "data": groups},
        "visualMap": {
            "min": min,
            "max": max,
            "calculable": true,
            "orient": "horizontal",
            "left": "center",
            "bottom": "5%"
        },
        "series": [{
            "name": model.title,
            "type": "heatmap",
            "data": cells,
            "label": {"show": true},
            "emphasis": {
                "itemStyle": {
                    "shadowBlur": 10,
                    "shadowColor": "rgba(0, 0, 0, 0.5)"
                }
            }
        }]
    })
}

fn generic_option(model: &ChartDataModel, family: &str) -> RenderConfig {
    json!({
        "title": title_block(model),
        "tooltip": {},
        "series": [{
            "type": family,
            "data": model.points.iter().map(|p| p.value).collect::<Vec<f64>>()
        }]
    })
}
