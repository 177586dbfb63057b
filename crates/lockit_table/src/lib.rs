//! `lockit_table` v1:
//! Rust-side tabular data model consumed by sheet writers.
//!
//! - `spec`   : cell values/options/errors
//! - `table`  : table model and ingestion
//! - `derive` : regex-derived column transforms
//! - `util`   : shared helper functions

pub mod derive;
pub mod spec;
pub mod table;
mod util;

pub use spec::{EnumCellValue, SpecColumnsByRegexOptions, TableError};
pub use table::Table;
pub use util::derive_query_text;
