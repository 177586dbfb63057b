//! Table specification models and top-level error types.

use std::collections::BTreeMap;
use std::fmt;

////////////////////////////////////////////////////////////////////////////////
// #region CellValueSpecification

/// Normalized cell value consumed by sheet writers.
///
/// `Blank` is a defined sentinel for "no value"; rows never hold an absent
/// slot.
#[derive(Debug, Clone, PartialEq)]
pub enum EnumCellValue {
    /// Blank sentinel.
    Blank,
    /// Text value.
    Text(String),
    /// Numeric value.
    Number(f64),
    /// Boolean value.
    Boolean(bool),
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region TransformOptions

/// Options for [`crate::table::Table::add_columns_by_regex`].
#[derive(Debug, Clone, Default)]
pub struct SpecColumnsByRegexOptions {
    /// Derived column selection and order; `None` keeps pattern group order.
    pub column_order: Option<Vec<String>>,
    /// Per-column value remap applied to captured text.
    ///
    /// A mapping is total for its column: captured values without a mapping
    /// entry become blank.
    pub column_mappings: BTreeMap<String, BTreeMap<String, String>>,
    /// Derived columns emitted as presence booleans instead of text.
    pub cols_boolean: Vec<String>,
    /// Maximum worker threads for row capture.
    pub num_workers_max: Option<usize>,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ErrorSpecification

/// "Table operation failed" errors.
#[derive(Debug)]
pub enum TableError {
    /// Duplicate column names in table construction.
    DuplicateColumns(String),
    /// Referenced column does not exist.
    ColumnNotFound(String),
    /// Row holds more values than declared columns.
    RowTooWide {
        /// Incoming row width.
        width_row: usize,
        /// Declared table width.
        width_table: usize,
    },
    /// Column-wise join with mismatched heights.
    HeightMismatch {
        /// Height of the left table.
        height_left: usize,
        /// Height of the right table.
        height_right: usize,
    },
    /// Capture pattern failed to compile.
    InvalidPattern(String),
    /// DataFrame access or IPC payload decode failure.
    DataFrameDecodeFailed(String),
}

impl fmt::Display for TableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateColumns(msg) => write!(f, "{msg}"),
            Self::ColumnNotFound(c_name) => write!(f, "Column not found: {c_name:?}"),
            Self::RowTooWide {
                width_row,
                width_table,
            } => write!(
                f,
                "Row width {width_row} exceeds table width {width_table}."
            ),
            Self::HeightMismatch {
                height_left,
                height_right,
            } => write!(
                f,
                "Table heights differ: left={height_left} right={height_right}."
            ),
            Self::InvalidPattern(msg) => write!(f, "{msg}"),
            Self::DataFrameDecodeFailed(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for TableError {}

// #endregion
////////////////////////////////////////////////////////////////////////////////
