//! Rollups over the committed table.
//!
//! Rows are read back from the store, coerced into [`types::StoredRow`],
//! aggregated into a summary plus trend and city × risk tables, written as
//! CSV/JSON reports and optionally uploaded to S3.

pub mod aggregate;
pub mod analyzer;
pub mod report;
pub mod types;
pub mod utility;
pub mod writetos3;
