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

//! Recovers output column names from the text of a SELECT query so the
//! normaliser can label positional rows. Purely lexical/syntactic: no
//! schema is consulted and nothing is executed.

use once_cell::sync::Lazy;
use regex::Regex;
use sqlparser::ast::{Expr, SelectItem, SetExpr, Statement};
use sqlparser::dialect::{GenericDialect, MsSqlDialect};
use sqlparser::parser::Parser;
use tracing::debug;

static IDENTIFIER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").expect("identifier regex"));
static PROJECTION_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)\bSELECT\s+(?:DISTINCT\s+|TOP\s+\d+\s+)?(.*?)\s+FROM\b")
        .expect("projection regex")
});
static ALIAS_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)\bAS\s+(.+)$").expect("alias regex"));

/// Extracts the ordered output column names of `query_text`. Malformed
/// SQL, missing projections, and non-SELECT statements all yield an
/// empty list rather than an error; downstream falls back to positional
/// placeholder names.
pub fn recover_columns(query_text: &str) -> Vec<String> {
    if query_text.trim().is_empty() {
        return Vec::new();
    }

    // MsSql dialect first: bracket-quoted identifiers and TOP n are the
    // shapes the upstream agent actually emits.
    for statements in [
        Parser::parse_sql(&MsSqlDialect {}, query_text).ok(),
        Parser::parse_sql(&GenericDialect {}, query_text).ok(),
    ]
    .into_iter()
    .flatten()
    {
        if let Some(columns) = columns_from_statements(&statements) {
            return columns;
        }
    }

    debug!("AST parse yielded no projection, falling back to lexical scan");
    lexical_columns(query_text)
}

fn columns_from_statements(statements: &[Statement]) -> Option<Vec<String>> {
    let query = statements.iter().find_map(|stmt| match stmt {
        Statement::Query(query) => Some(query),
        _ => None,
    })?;

    let select = match query.body.as_ref() {
        SetExpr::Select(select) => select,
        _ => return None,
    };

    let mut columns = Vec::new();
    for (index, item) in select.projection.iter().enumerate() {
        match item {
            SelectItem::ExprWithAlias { alias, .. } => columns.push(alias.value.clone()),
            SelectItem::UnnamedExpr(Expr::Identifier(ident)) => columns.push(ident.value.clone()),
            SelectItem::UnnamedExpr(Expr::CompoundIdentifier(parts)) => {
                if let Some(last) = parts.last() {
                    columns.push(last.value.clone());
                }
            }
            SelectItem::UnnamedExpr(expr) => {
                columns.push(
                    last_identifier_token(&expr.to_string())
                        .unwrap_or_else(|| format!("col_{index}")),
                );
            }
            SelectItem::Wildcard(_) | SelectItem::QualifiedWildcard(_, _) => {}
        }
    }
    Some(columns)
}

/// Permissive scan for queries the AST parser rejects: locate the
/// SELECT…FROM span and split at parenthesis-depth-zero commas.
fn lexical_columns(query_text: &str) -> Vec<String> {
    let projection = match PROJECTION_REGEX.captures(query_text) {
        Some(captures) => captures.get(1).map(|m| m.as_str().to_string()),
        None => None,
    };
    let Some(projection) = projection else {
        return Vec::new();
    };

    split_top_level(&projection)
        .iter()
        .enumerate()
        .filter_map(|(index, expr)| column_name_from_expression(expr, index))
        .collect()
}

fn split_top_level(projection: &str) -> Vec<String> {
    let mut columns = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    for ch in projection.chars() {
        match ch {
            '(' => {
                depth += 1;
                current.push(ch);
            }
            ')' => {
                depth -= 1;
                current.push(ch);
            }
            ',' if depth == 0 => {
                columns.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    if !current.trim().is_empty() {
        columns.push(current.trim().to_string());
    }
    columns
}

fn column_name_from_expression(expr: &str, index: usize) -> Option<String> {
    let expr = expr.trim();
    if expr.is_empty() {
        return None;
    }

    if let Some(captures) = ALIAS_REGEX.captures(expr) {
        let alias = captures.get(1)?.as_str().trim();
        return Some(strip_delimiters(alias));
    }

    let cleaned = strip_delimiters(expr);
    if cleaned == "*" {
        return None;
    }

    if cleaned.contains('(') {
        return Some(
            last_identifier_token(&cleaned).unwrap_or_else(|| format!("col_{index}")),
        );
    }

    // table.column projects as column
    let name = cleaned.rsplit('.').next().unwrap_or(&cleaned).trim();
    if name.is_empty() {
        Some(format!("col_{index}"))
    } else {
        Some(name.to_string())
    }
}

fn strip_delimiters(value: &str) -> String {
    value
        .trim()
        .trim_matches(|c| c == '[' || c == ']' || c == '"' || c == '`')
        .trim()
        .to_string()
}

fn last_identifier_token(expr: &str) -> Option<String> {
    IDENTIFIER_REGEX
        .find_iter(expr)
        .last()
        .map(|m| m.as_str().to_string())
}
