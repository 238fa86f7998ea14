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

//! Turns a query result of unknown shape into ordered, column-labelled
//! records. The primary path for serialized tuple lists is a strict
//! literal parser that treats delimiters inside quoted text as content;
//! a permissive regex split and a JSON pass remain as secondary
//! attempts. Nothing in here aborts a request: callers map an error to
//! an empty record set.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::error::NormaliseError;
use crate::model::{CellValue, NormalisedRecord, RawQueryResult};

static PLACEHOLDER_KEY_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^col_\d+$").expect("placeholder regex"));
static TUPLE_BOUNDARY_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\)\s*,\s*\(").expect("tuple boundary regex"));

/// Normalises `raw` into records labelled with `columns` (recovered
/// from the originating query text). Errors are non-fatal by contract;
/// the orchestrator degrades them to an empty record set.
pub fn normalise(
    raw: &RawQueryResult,
    columns: &[String],
) -> Result<Vec<NormalisedRecord>, NormaliseError> {
    match raw {
        RawQueryResult::Empty => Ok(Vec::new()),
        RawQueryResult::Records(records) => Ok(rekey_placeholder_records(records, columns)),
        RawQueryResult::Rows(rows) => Ok(rows_to_records(rows.clone(), columns)),
        RawQueryResult::Text(text) => normalise_text(text, columns),
    }
}

fn normalise_text(
    text: &str,
    columns: &[String],
) -> Result<Vec<NormalisedRecord>, NormaliseError> {
    let body = match text.split_once("Result:") {
        Some((_, rest)) => rest.trim(),
        None => text.trim(),
    };
    if body.is_empty() {
        return Ok(Vec::new());
    }

    if body.starts_with('[') && body.contains('(') {
        match literal::parse_rows(body) {
            Ok(rows) => return Ok(rows_to_records(rows, columns)),
            Err(e) => {
                debug!(error = %e, "Strict literal parse failed, trying regex extraction");
            }
        }
        if let Some(rows) = regex_rows(body) {
            return Ok(rows_to_records(rows, columns));
        }
    }

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(records) = json_records(&value, columns) {
            return Ok(records);
        }
    }

    warn!(preview = %truncate(body, 120), "Could not normalise query result");
    Err(NormaliseError::UnrecognisedEncoding {
        preview: truncate(body, 120),
    })
}

/// Already-labelled records pass through unchanged unless every key is
/// a positional placeholder, in which case the recovered column names
/// take over. This keeps normalisation idempotent.
fn rekey_placeholder_records(
    records: &[NormalisedRecord],
    columns: &[String],
) -> Vec<NormalisedRecord> {
    if columns.is_empty() || records.is_empty() {
        return records.to_vec();
    }
    let all_placeholders = records
        .iter()
        .flat_map(|r| r.keys())
        .all(|k| PLACEHOLDER_KEY_REGEX.is_match(k));
    if !all_placeholders {
        return records.to_vec();
    }

    records
        .iter()
        .map(|record| {
            record
                .values()
                .enumerate()
                .map(|(i, value)| (header_name(columns, i), value.clone()))
                .collect()
        })
        .collect()
}

fn header_name(columns: &[String], index: usize) -> String {
    columns
        .get(index)
        .cloned()
        .unwrap_or_else(|| format!("col_{index}"))
}

/// Zips positional rows with column names: fewer recovered names than
/// the row arity pads with `col_<i>`, extra names are truncated. When
/// no names were recovered and the first row is entirely textual while
/// later rows are not, the first row is treated as a header.
fn rows_to_records(rows: Vec<Vec<CellValue>>, columns: &[String]) -> Vec<NormalisedRecord> {
    let Some(first) = rows.first() else {
        return Vec::new();
    };
    let arity = first.len();

    let (headers, data_rows): (Vec<String>, &[Vec<CellValue>]) = if !columns.is_empty() {
        ((0..arity).map(|i| header_name(columns, i)).collect(), &rows[..])
    } else if rows.len() > 1
        && first.iter().all(|v| matches!(v, CellValue::Text(_)))
        && rows[1..]
            .iter()
            .any(|row| row.iter().any(|v| !matches!(v, CellValue::Text(_))))
    {
        (first.iter().map(CellValue::label).collect(), &rows[1..])
    } else {
        ((0..arity).map(|i| format!("col_{i}")).collect(), &rows[..])
    };

    data_rows
        .iter()
        .map(|row| {
            headers
                .iter()
                .enumerate()
                .map(|(i, name)| {
                    (name.clone(), row.get(i).cloned().unwrap_or(CellValue::Null))
                })
                .collect::<IndexMap<_, _>>()
        })
        .collect()
}

/// Secondary extraction pass: split the bracket body at `), (`
/// boundaries and the fields at bare commas. Known not to survive
/// nested delimiters; the strict parser is the primary path.
fn regex_rows(body: &str) -> Option<Vec<Vec<CellValue>>> {
    let inner = body.trim().trim_start_matches('[').trim_end_matches(']');
    if inner.trim().is_empty() {
        return None;
    }
    let rows: Vec<Vec<CellValue>> = TUPLE_BOUNDARY_REGEX
        .split(inner)
        .map(|tuple| {
            tuple
                .trim()
                .trim_matches(|c| c == '(' || c == ')')
                .split(',')
                .map(|field| coerce_scalar(field.trim().trim_matches(|c| c == '\'' || c == '"')))
                .collect()
        })
        .filter(|row: &Vec<CellValue>| !row.is_empty())
        .collect();
    if rows.is_empty() {
        None
    } else {
        Some(rows)
    }
}

fn json_records(value: &serde_json::Value, columns: &[String]) -> Option<Vec<NormalisedRecord>> {
    let array = value.as_array()?;
    if array.is_empty() {
        return Some(Vec::new());
    }

    if array.iter().all(|v| v.is_object()) {
        let records = array
            .iter()
            .filter_map(|v| v.as_object())
            .map(|obj| {
                obj.iter()
                    .map(|(k, v)| (k.clone(), json_scalar(v)))
                    .collect::<NormalisedRecord>()
            })
            .collect::<Vec<_>>();
        return Some(rekey_placeholder_records(&records, columns));
    }

    if array.iter().all(|v| v.is_array()) {
        let rows = array
            .iter()
            .filter_map(|v| v.as_array())
            .map(|row| row.iter().map(json_scalar).collect())
            .collect();
        return Some(rows_to_records(rows, columns));
    }

    None
}

fn json_scalar(value: &serde_json::Value) -> CellValue {
    match value {
        serde_json::Value::Null => CellValue::Null,
        serde_json::Value::Bool(b) => CellValue::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                CellValue::Int(i)
            } else {
                CellValue::Float(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => CellValue::Text(s.clone()),
        other => CellValue::Text(other.to_string()),
    }
}

/// Syntactically numeric strings become numbers; null markers become an
/// explicit null cell, never a dropped one.
pub(crate) fn coerce_scalar(field: &str) -> CellValue {
    match field {
        "" | "None" | "NULL" | "null" => return CellValue::Null,
        "True" | "true" => return CellValue::Bool(true),
        "False" | "false" => return CellValue::Bool(false),
        _ => {}
    }
    if let Ok(i) = field.parse::<i64>() {
        return CellValue::Int(i);
    }
    if let Ok(f) = field.parse::<f64>() {
        return CellValue::Float(f);
    }
    CellValue::Text(field.to_string())
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

mod literal {
    //! Strict recursive-descent parser for serialized literal rows:
    //! a list of tuples/lists of primitive literals, as produced by
    //! stringifying a driver's fetch result. Quoted strings may contain
    //! any delimiter; that is the whole reason this parser exists.

    use super::coerce_scalar;
    use crate::error::NormaliseError;
    use crate::model::CellValue;

    pub fn parse_rows(input: &str) -> Result<Vec<Vec<CellValue>>, NormaliseError> {
        let mut parser = Parser {
            chars: input.chars().collect(),
            pos: 0,
        };
        parser.skip_ws();
        parser.expect('[')?;
        let mut rows = Vec::new();
        loop {
            parser.skip_ws();
            if parser.eat(']') {
                break;
            }
            rows.push(parser.parse_row()?);
            parser.skip_ws();
            if !parser.eat(',') {
                parser.skip_ws();
                parser.expect(']')?;
                break;
            }
        }
        parser.skip_ws();
        if !parser.at_end() {
            return Err(parser.error("trailing content after list"));
        }
        Ok(rows)
    }

    struct Parser {
        chars: Vec<char>,
        pos: usize,
    }

    impl Parser {
        fn parse_row(&mut self) -> Result<Vec<CellValue>, NormaliseError> {
            let closer = if self.eat('(') {
                ')'
            } else if self.eat('[') {
                ']'
            } else {
                return Err(self.error("expected '(' or '[' to open a row"));
            };

            let mut row = Vec::new();
            loop {
                self.skip_ws();
                if self.eat(closer) {
                    break;
                }
                row.push(self.parse_scalar(closer)?);
                self.skip_ws();
                if !self.eat(',') {
                    self.expect(closer)?;
                    break;
                }
            }
            Ok(row)
        }

        fn parse_scalar(&mut self, closer: char) -> Result<CellValue, NormaliseError> {
            self.skip_ws();
            match self.peek() {
                Some('\'') | Some('"') => self.parse_quoted(),
                Some(_) => {
                    let mut token = String::new();
                    while let Some(ch) = self.peek() {
                        if ch == ',' || ch == closer {
                            break;
                        }
                        token.push(ch);
                        self.pos += 1;
                    }
                    Ok(coerce_scalar(token.trim()))
                }
                None => Err(self.error("unexpected end of input in row")),
            }
        }

        fn parse_quoted(&mut self) -> Result<CellValue, NormaliseError> {
            let quote = self.peek().ok_or_else(|| self.error("expected quote"))?;
            self.pos += 1;
            let mut value = String::new();
            loop {
                match self.peek() {
                    Some('\\') => {
                        self.pos += 1;
                        match self.peek() {
                            Some(escaped) => {
                                value.push(match escaped {
                                    'n' => '\n',
                                    't' => '\t',
                                    other => other,
                                });
                                self.pos += 1;
                            }
                            None => return Err(self.error("dangling escape in string")),
                        }
                    }
                    Some(ch) if ch == quote => {
                        self.pos += 1;
                        return Ok(CellValue::Text(value));
                    }
                    Some(ch) => {
                        value.push(ch);
                        self.pos += 1;
                    }
                    None => return Err(self.error("unterminated string literal")),
                }
            }
        }

        fn peek(&self) -> Option<char> {
            self.chars.get(self.pos).copied()
        }

        fn at_end(&self) -> bool {
            self.pos >= self.chars.len()
        }

        fn skip_ws(&mut self) {
            while matches!(self.peek(), Some(ch) if ch.is_whitespace()) {
                self.pos += 1;
            }
        }

        fn eat(&mut self, expected: char) -> bool {
            if self.peek() == Some(expected) {
                self.pos += 1;
                true
            } else {
                false
            }
        }

        fn expect(&mut self, expected: char) -> Result<(), NormaliseError> {
            if self.eat(expected) {
                Ok(())
            } else {
                Err(self.error(&format!("expected '{expected}'")))
            }
        }

        fn error(&self, reason: &str) -> NormaliseError {
            NormaliseError::LiteralParse {
                offset: self.pos,
                reason: reason.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RawQueryResult;

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn nested_parentheses_inside_quotes_do_not_break_tuples() {
        let raw = RawQueryResult::from("[(0, 'Battery Electric Vehicle (BEV)', 222)]");
        let records = normalise(&raw, &columns(&["District", "Type", "Count"])).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["District"], CellValue::Int(0));
        assert_eq!(
            records[0]["Type"],
            CellValue::Text("Battery Electric Vehicle (BEV)".to_string())
        );
        assert_eq!(records[0]["Count"], CellValue::Int(222));
    }

    #[test]
    fn multi_row_tuple_string_with_sql_columns() {
        let raw = RawQueryResult::from(
            "[(0, 'Battery Electric Vehicle (BEV)', 222), (0, 'Plug-in Hybrid Electric Vehicle (PHEV)', 119), \
             (1, 'Battery Electric Vehicle (BEV)', 5485), (1, 'Plug-in Hybrid Electric Vehicle (PHEV)', 1025)]",
        );
        let records = normalise(
            &raw,
            &columns(&["Legislative District", "Electric Vehicle Type", "vehicle_count"]),
        )
        .unwrap();
        assert_eq!(records.len(), 4);
        assert_eq!(records[0]["Legislative District"], CellValue::Int(0));
        assert_eq!(records[2]["vehicle_count"], CellValue::Int(5485));
    }

    #[test]
    fn result_prefix_is_stripped() {
        let raw = RawQueryResult::from("Result: [('King', 5000)]");
        let records = normalise(&raw, &columns(&["County", "Count"])).unwrap();
        assert_eq!(records[0]["County"], CellValue::Text("King".to_string()));
        assert_eq!(records[0]["Count"], CellValue::Int(5000));
    }

    #[test]
    fn normalising_records_is_idempotent() {
        let record: NormalisedRecord = [
            ("County".to_string(), CellValue::from("King")),
            ("Count".to_string(), CellValue::from(5000_i64)),
        ]
        .into_iter()
        .collect();
        let raw = RawQueryResult::Records(vec![record.clone()]);
        let once = normalise(&raw, &columns(&["ignored", "names"])).unwrap();
        assert_eq!(once, vec![record.clone()]);
        let twice = normalise(&RawQueryResult::Records(once.clone()), &[]).unwrap();
        assert_eq!(twice, once);
    }

    #[test]
    fn placeholder_keys_are_rekeyed_from_recovered_columns() {
        let record: NormalisedRecord = [
            ("col_0".to_string(), CellValue::from("King")),
            ("col_1".to_string(), CellValue::from(5000_i64)),
        ]
        .into_iter()
        .collect();
        let raw = RawQueryResult::Records(vec![record]);
        let records = normalise(&raw, &columns(&["County", "Count"])).unwrap();
        assert_eq!(
            records[0].keys().collect::<Vec<_>>(),
            vec!["County", "Count"]
        );
    }

    #[test]
    fn fewer_recovered_names_pad_with_placeholders() {
        let raw = RawQueryResult::from("[('King', 'BEV', 5000)]");
        let records = normalise(&raw, &columns(&["County"])).unwrap();
        assert_eq!(
            records[0].keys().collect::<Vec<_>>(),
            vec!["County", "col_1", "col_2"]
        );
    }

    #[test]
    fn extra_recovered_names_are_truncated() {
        let raw = RawQueryResult::from("[('King', 5000)]");
        let records = normalise(&raw, &columns(&["County", "Count", "Extra"])).unwrap();
        assert_eq!(records[0].keys().collect::<Vec<_>>(), vec!["County", "Count"]);
    }

    #[test]
    fn bare_tokens_parse_without_quotes() {
        let raw = RawQueryResult::from("[(King, 5000), (Pierce, 3000)]");
        let records = normalise(&raw, &[]).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["col_0"], CellValue::Text("King".to_string()));
        assert_eq!(records[1]["col_1"], CellValue::Int(3000));
    }

    #[test]
    fn header_row_is_detected_without_recovered_columns() {
        let raw = RawQueryResult::from("[('County', 'Count'), ('King', 5000)]");
        let records = normalise(&raw, &[]).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["County"], CellValue::Text("King".to_string()));
        assert_eq!(records[0]["Count"], CellValue::Int(5000));
    }

    #[test]
    fn json_encoded_arrays_are_accepted() {
        let raw = RawQueryResult::from(r#"[{"County": "King", "Count": 5000}]"#);
        let records = normalise(&raw, &[]).unwrap();
        assert_eq!(records[0]["Count"], CellValue::Int(5000));

        let raw = RawQueryResult::from(r#"[["King", 5000], ["Pierce", 3000]]"#);
        let records = normalise(&raw, &columns(&["County", "Count"])).unwrap();
        assert_eq!(records[1]["County"], CellValue::Text("Pierce".to_string()));
    }

    #[test]
    fn null_markers_become_explicit_nulls() {
        let raw = RawQueryResult::from("[('King', None)]");
        let records = normalise(&raw, &columns(&["County", "Count"])).unwrap();
        assert_eq!(records[0]["Count"], CellValue::Null);
    }

    #[test]
    fn floats_and_negatives_coerce() {
        let raw = RawQueryResult::from("[('King', -12, 3.5)]");
        let records = normalise(&raw, &[]).unwrap();
        assert_eq!(records[0]["col_1"], CellValue::Int(-12));
        assert_eq!(records[0]["col_2"], CellValue::Float(3.5));
    }

    #[test]
    fn unparsable_input_is_a_non_fatal_error() {
        let raw = RawQueryResult::from("completely unstructured prose");
        assert!(normalise(&raw, &[]).is_err());
    }

    #[test]
    fn empty_inputs_yield_empty_record_sets() {
        assert!(normalise(&RawQueryResult::Empty, &[]).unwrap().is_empty());
        assert!(normalise(&RawQueryResult::from(""), &[]).unwrap().is_empty());
        assert!(normalise(&RawQueryResult::from("[]"), &[]).unwrap().is_empty());
    }
}
