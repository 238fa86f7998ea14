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

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChartGenError {
    #[error("Result normalisation error: {0}")]
    Normalise(#[from] NormaliseError),
    #[error("Intent classification error: {0}")]
    Intent(#[from] IntentError),
    #[error("Option synthesis error: {0}")]
    Synthesis(#[from] SynthesisError),
    #[error("Generative service error: {0}")]
    Llm(#[from] llm_bridge::LlmError),
    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum NormaliseError {
    #[error("Unrecognised result encoding: {preview}")]
    UnrecognisedEncoding { preview: String },
    #[error("Literal parse failed at offset {offset}: {reason}")]
    LiteralParse { offset: usize, reason: String },
}

#[derive(Error, Debug)]
pub enum IntentError {
    #[error("Could not find a valid JSON object in the classification response")]
    JsonNotFound,
    #[error("Failed to parse classification response: {0}")]
    ResponseParse(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum SynthesisError {
    #[error("Generative call failed: {0}")]
    Llm(String),
    #[error("Response was not valid JSON after repair: {0}")]
    Unparsable(String),
    #[error("Synthesised option rejected: {reason}")]
    Rejected { reason: String },
}

/// Failure of a supplementary query execution. Carried as a message
/// because executors front arbitrary drivers.
#[derive(Error, Debug)]
#[error("Query execution failed: {0}")]
pub struct QueryExecutionError(pub String);

pub type Result<T> = std::result::Result<T, ChartGenError>;
