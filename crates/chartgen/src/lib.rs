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

//! Chart synthesis for a BI assistant: takes a user question, the SQL
//! that answered it, and the raw query result, and produces a validated
//! ECharts-style rendering configuration, or nothing when no chart was
//! asked for.
//!
//! The stages are deliberately lossy in only one direction: generative
//! steps (intent, family selection, option synthesis) may degrade to
//! deterministic behaviour, but data values flow untouched from the
//! normalised records into whatever configuration is returned.

pub mod error;
pub mod fallback;
pub mod intent;
pub mod model;
pub mod options;
pub mod pipeline;
pub mod shaper;
pub mod sql;
pub mod sufficiency;
pub mod tabular;

pub use error::{ChartGenError, QueryExecutionError, Result};
pub use model::{
    CellValue, ChartDataModel, ChartFamily, ChartIntent, DataPoint, NormalisedRecord,
    RawQueryResult, RenderConfig, SufficiencyReport, Variant,
};
pub use pipeline::{ChartPipeline, PipelineConfig, QueryExecutor};
