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

//! Helpers for pulling structured JSON out of untrusted generative text.
//! Strict parse first, syntactic repair second; callers decide what a
//! still-unparsable response falls back to.

use once_cell::sync::Lazy;
use regex::Regex;

static MARKDOWN_JSON_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").expect("fence regex"));
static TRAILING_COMMA_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",(\s*[}\]])").expect("trailing comma regex"));
static LINE_COMMENT_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*//[^\n]*").expect("line comment regex"));
static BLOCK_COMMENT_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("block comment regex"));

/// Returns the body of the first fenced code block, or the input
/// unchanged when no fence is present.
pub fn strip_code_fences(content: &str) -> String {
    if let Some(captures) = MARKDOWN_JSON_REGEX.captures(content) {
        if let Some(body) = captures.get(1) {
            return body.as_str().to_string();
        }
    }
    content.trim().to_string()
}

/// Locates the first balanced JSON object in free text. Brace counting
/// is string-aware so braces inside quoted values do not terminate the
/// scan early.
pub fn extract_json_object(content: &str) -> Option<String> {
    let fenced = strip_code_fences(content);
    if serde_json::from_str::<serde_json::Value>(fenced.trim()).is_ok() {
        return Some(fenced.trim().to_string());
    }

    let start_pos = content.find('{')?;
    let mut brace_count = 0;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in content[start_pos..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '"' => in_string = !in_string,
            '\\' if in_string => escape_next = true,
            '{' if !in_string => brace_count += 1,
            '}' if !in_string => {
                brace_count -= 1;
                if brace_count == 0 {
                    let json_str = &content[start_pos..start_pos + i + 1];
                    if serde_json::from_str::<serde_json::Value>(json_str).is_ok() {
                        return Some(json_str.to_string());
                    }
                    break;
                }
            }
            _ => {}
        }
    }
    None
}

/// Applies the common repairs for near-JSON generative output: comment
/// tokens and trailing commas before closing brackets or braces.
pub fn repair_json(content: &str) -> String {
    let without_line_comments = LINE_COMMENT_REGEX.replace_all(content, "");
    let without_comments = BLOCK_COMMENT_REGEX.replace_all(&without_line_comments, "");
    TRAILING_COMMA_REGEX
        .replace_all(&without_comments, "$1")
        .to_string()
}
