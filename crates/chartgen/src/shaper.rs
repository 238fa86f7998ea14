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

//! Shapes normalised records into the canonical chart data model.
//! Deterministic: column roles are assigned by inspection, values come
//! only from the records, and grouped data is completed with explicit
//! zeros so every group carries every category.

use tracing::debug;

use crate::model::{ChartDataModel, ChartFamily, DataPoint, NormalisedRecord, Variant};

/// Builds the data model for `records`. Total and pure; an empty record
/// set produces an empty, clearly-titled model rather than an error.
pub fn shape(
    records: &[NormalisedRecord],
    family: ChartFamily,
    variant: Option<Variant>,
    question: &str,
) -> ChartDataModel {
    let stack = variant == Some(Variant::Stacked);
    // Both series-splitting variants are grouped data; stacking only
    // adds the shared stack id on top.
    let group_flag = matches!(variant, Some(Variant::Stacked | Variant::Grouped));
    let smooth = variant == Some(Variant::Smooth);
    let area = variant == Some(Variant::Area);
    let inner_radius = (family == ChartFamily::Pie && variant == Some(Variant::Donut))
        .then_some(0.6);

    if records.is_empty() {
        return ChartDataModel {
            points: Vec::new(),
            stack,
            group: group_flag,
            smooth,
            area,
            inner_radius,
            title: "No Data Available".to_string(),
            axis_x_title: None,
            axis_y_title: None,
        };
    }

    let columns: Vec<&str> = records[0].keys().map(String::as_str).collect();
    let roles = assign_roles(records, &columns, family, variant);
    debug!(
        category = roles.category,
        value = roles.value,
        group = roles.group.unwrap_or("none"),
        "Assigned column roles"
    );

    let mut points: Vec<DataPoint> = records
        .iter()
        .map(|record| DataPoint {
            category: record
                .get(roles.category)
                .map(|v| v.label())
                .unwrap_or_default(),
            value: record
                .get(roles.value)
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0),
            group: roles
                .group
                .and_then(|name| record.get(name))
                .map(|v| v.label()),
        })
        .collect();

    if roles.group.is_some() {
        complete_groups(&mut points);
    }

    let uses_axes = !matches!(family, ChartFamily::Pie);
    ChartDataModel {
        points,
        stack,
        group: group_flag,
        smooth,
        area,
        inner_radius,
        title: chart_title(question),
        axis_x_title: uses_axes.then(|| roles.category.to_string()),
        axis_y_title: uses_axes.then(|| roles.value.to_string()),
    }
}

struct ColumnRoles<'a> {
    category: &'a str,
    value: &'a str,
    group: Option<&'a str>,
}

/// Value is the last column whose non-null cells are all numeric;
/// category is the first remaining column. A third column becomes the
/// group only where series splitting is meaningful for the requested
/// rendering.
fn assign_roles<'a>(
    records: &[NormalisedRecord],
    columns: &[&'a str],
    family: ChartFamily,
    variant: Option<Variant>,
) -> ColumnRoles<'a> {
    let value = columns
        .iter()
        .rev()
        .find(|name| is_numeric_column(records, name))
        .or_else(|| columns.last())
        .copied()
        .unwrap_or("value");

    let mut categorical = columns.iter().copied().filter(|&name| name != value);
    let category = categorical.next().unwrap_or(value);

    let wants_group = matches!(variant, Some(Variant::Stacked) | Some(Variant::Grouped))
        || family == ChartFamily::Heatmap;
    let group = if wants_group { categorical.next() } else { None };

    ColumnRoles {
        category,
        value,
        group,
    }
}

fn is_numeric_column(records: &[NormalisedRecord], name: &str) -> bool {
    let mut saw_numeric = false;
    for record in records {
        match record.get(name) {
            Some(v) if v.is_numeric() => saw_numeric = true,
            Some(crate::model::CellValue::Null) | None => {}
            Some(_) => return false,
        }
    }
    saw_numeric
}

/// Appends an explicit zero point for every (category, group) pair the
/// records left out, so stacked and grouped series stay rectangular.
/// Observed points keep their original order; fills come after.
fn complete_groups(points: &mut Vec<DataPoint>) {
    let categories: Vec<String> = first_seen(points.iter().map(|p| p.category.clone()));
    let groups: Vec<String> =
        first_seen(points.iter().filter_map(|p| p.group.clone()));

    for group in &groups {
        for category in &categories {
            let present = points
                .iter()
                .any(|p| &p.category == category && p.group.as_deref() == Some(group));
            if !present {
                points.push(DataPoint {
                    category: category.clone(),
                    value: 0.0,
                    group: Some(group.clone()),
                });
            }
        }
    }
}

fn first_seen(items: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = Vec::new();
    for item in items {
        if !seen.contains(&item) {
            seen.push(item);
        }
    }
    seen
}

fn chart_title(question: &str) -> String {
    let trimmed = question.trim().trim_end_matches('?').trim();
    if trimmed.is_empty() {
        "Chart".to_string()
    } else {
        trimmed.to_string()
    }
}
