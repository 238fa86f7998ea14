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

//! Judges whether the rows already in hand can answer the question, and
//! if not, proposes a single replacement query. Fail-open: any failure
//! reports the data as sufficient so the pipeline proceeds with what it
//! has rather than stalling a chat turn.

use llm_bridge::{extract_json_object, GenerativeService};
use tracing::{debug, warn};

use crate::model::{ChartFamily, NormalisedRecord, SufficiencyReport};

fn sufficiency_prompt(
    question: &str,
    family: ChartFamily,
    sample: &str,
    total_rows: usize,
) -> String {
    format!(
        r#"You are a data analyst. Decide whether the query result below contains enough information to build the chart the user asked for.

User Question: "{question}"
Chart Family: {family}
Rows returned: {total_rows}
Data Sample: {sample}

Respond in JSON format with:
{{
    "isSufficient": true/false,
    "missingInfo": "what is missing, or null",
    "suggestedQuery": "a single SQL query that would retrieve the missing data, or null"
}}

Rules:
- Say the data is sufficient unless something the question explicitly asks for, or the chart family needs, is absent from the rows
- A suggested query must be a complete SELECT statement that retrieves the missing data
- Never suggest a query when isSufficient is true
"#,
        family = family.as_str(),
    )
}

/// Assesses `records` against the question. Total by contract; callers
/// act on a suggested query at most once per request.
pub async fn check_sufficiency(
    llm: &dyn GenerativeService,
    question: &str,
    family: ChartFamily,
    records: &[NormalisedRecord],
) -> SufficiencyReport {
    let sample = sample_records(records, 5);
    let response = match llm
        .generate(&sufficiency_prompt(question, family, &sample, records.len()))
        .await
    {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, "Sufficiency call failed, proceeding with available data");
            return SufficiencyReport::sufficient();
        }
    };

    let Some(json) = extract_json_object(&response) else {
        warn!("No JSON object in sufficiency response, proceeding with available data");
        return SufficiencyReport::sufficient();
    };

    match serde_json::from_str::<SufficiencyReport>(&json) {
        Ok(report) => {
            if !report.is_sufficient {
                debug!(
                    missing = report.missing_info.as_deref().unwrap_or(""),
                    "Data judged insufficient"
                );
            }
            report
        }
        Err(e) => {
            warn!(error = %e, "Could not parse sufficiency response, proceeding with available data");
            SufficiencyReport::sufficient()
        }
    }
}

fn sample_records(records: &[NormalisedRecord], limit: usize) -> String {
    let head: Vec<&NormalisedRecord> = records.iter().take(limit).collect();
    serde_json::to_string(&head).unwrap_or_else(|_| "[]".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CellValue;

    fn record(pairs: &[(&str, CellValue)]) -> NormalisedRecord {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn sample_is_valid_json_and_bounded() {
        let records: Vec<NormalisedRecord> = (0..20)
            .map(|i| record(&[("County", CellValue::from("King")), ("Count", CellValue::Int(i))]))
            .collect();
        let sample = sample_records(&records, 5);
        let parsed: serde_json::Value = serde_json::from_str(&sample).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 5);
    }

    #[test]
    fn prompt_names_the_resolved_family() {
        let records = vec![record(&[("Type", CellValue::from("BEV"))])];
        let prompt = sufficiency_prompt("share of types", ChartFamily::Pie, &sample_records(&records, 5), 1);
        assert!(prompt.contains("Chart Family: pie"));
    }

    #[test]
    fn report_deserialises_from_wire_keys() {
        let report: SufficiencyReport = serde_json::from_str(
            r#"{"isSufficient": false, "missingInfo": "missing PHEV counts", "suggestedQuery": "SELECT 1"}"#,
        )
        .unwrap();
        assert!(!report.is_sufficient);
        assert_eq!(report.suggested_query.as_deref(), Some("SELECT 1"));
    }
}
