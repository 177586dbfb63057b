//! Shared writer specification models and error types.

use std::collections::BTreeMap;
use std::fmt;

use lockit_table::EnumCellValue;

////////////////////////////////////////////////////////////////////////////////
// #region CellFormatSpecification

/// Reusable cell format specification with optional-field overlay semantics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SpecCellFormat {
    /// Font family name.
    pub font_name: Option<String>,
    /// Font size in points.
    pub font_size: Option<i64>,
    /// Bold style.
    pub bold: Option<bool>,
    /// Italic style.
    pub italic: Option<bool>,

    /// Horizontal alignment.
    pub align: Option<String>,
    /// Vertical alignment.
    pub valign: Option<String>,
    /// Border style for all sides.
    pub border: Option<i64>,
    /// Text wrap.
    pub text_wrap: Option<bool>,

    /// Number format code.
    pub num_format: Option<String>,
    /// Background fill color.
    pub bg_color: Option<String>,
    /// Font color.
    pub font_color: Option<String>,

    /// Cell locked under sheet protection.
    pub if_locked: Option<bool>,
    /// Formula hidden under sheet protection.
    pub if_hidden: Option<bool>,
}

impl SpecCellFormat {
    /// Return a new format by overlaying `patch` onto `self`.
    pub fn with_(&self, patch: SpecCellFormat) -> SpecCellFormat {
        self.merge(&patch)
    }

    /// Merge two formats with right-side non-`None` overwrite semantics.
    pub fn merge(&self, other: &SpecCellFormat) -> SpecCellFormat {
        SpecCellFormat {
            font_name: other.font_name.clone().or_else(|| self.font_name.clone()),
            font_size: other.font_size.or(self.font_size),
            bold: other.bold.or(self.bold),
            italic: other.italic.or(self.italic),
            align: other.align.clone().or_else(|| self.align.clone()),
            valign: other.valign.clone().or_else(|| self.valign.clone()),
            border: other.border.or(self.border),
            text_wrap: other.text_wrap.or(self.text_wrap),
            num_format: other.num_format.clone().or_else(|| self.num_format.clone()),
            bg_color: other.bg_color.clone().or_else(|| self.bg_color.clone()),
            font_color: other.font_color.clone().or_else(|| self.font_color.clone()),
            if_locked: other.if_locked.or(self.if_locked),
            if_hidden: other.if_hidden.or(self.if_hidden),
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region WriteOpSpecification

/// Classified write operation emitted to a sink, derived once per cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum EnumWriteOp {
    /// Text cell.
    Text(String),
    /// Numeric cell.
    Number(f64),
    /// Boolean cell.
    Boolean(bool),
    /// Formula cell (full formula text, leading `=` included).
    Formula(String),
    /// Blank cell.
    Blank,
}

/// Replacement text policy for non-finite numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecValuePolicy {
    /// Replacement text for NaN.
    pub nan_str: String,
    /// Replacement text for positive infinity.
    pub posinf_str: String,
    /// Replacement text for negative infinity.
    pub neginf_str: String,
}

impl Default for SpecValuePolicy {
    fn default() -> Self {
        Self {
            nan_str: "NaN".to_string(),
            posinf_str: "Inf".to_string(),
            neginf_str: "-Inf".to_string(),
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region FormatRuleSpecification

/// Format-name selection rules for data cells.
///
/// Precedence per cell: by-cell > by-column > by-row > default. Row keys are
/// 0-based data row indices (header rows excluded); column keys are written
/// column names.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpecFormatRules {
    /// Per-row per-column overrides.
    pub fmt_name_by_cell: BTreeMap<usize, BTreeMap<String, String>>,
    /// Per-column format names.
    pub fmt_name_by_col: BTreeMap<String, String>,
    /// Per-row format names.
    pub fmt_name_by_row: BTreeMap<usize, String>,
    /// Fallback format name; `None` writes unformatted cells.
    pub fmt_name_default: Option<String>,
}

impl SpecFormatRules {
    /// Resolve the format name for one data cell.
    pub fn resolve(&self, idx_row_data: usize, name_col: &str) -> Option<&str> {
        if let Some(c_name) = self
            .fmt_name_by_cell
            .get(&idx_row_data)
            .and_then(|dict_row| dict_row.get(name_col))
        {
            return Some(c_name.as_str());
        }
        if let Some(c_name) = self.fmt_name_by_col.get(name_col) {
            return Some(c_name.as_str());
        }
        if let Some(c_name) = self.fmt_name_by_row.get(&idx_row_data) {
            return Some(c_name.as_str());
        }
        self.fmt_name_default.as_deref()
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ExtraColumnSpecification

/// Derived output column appended to the right of the written source columns.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecExtraColumn {
    /// Header name of the derived column.
    pub name: String,
    /// Value rule evaluated per data row.
    pub rule: EnumExtraColumnRule,
}

/// Value rule for one derived output column.
#[derive(Debug, Clone, PartialEq)]
pub enum EnumExtraColumnRule {
    /// Same value in every row.
    Constant(EnumCellValue),
    /// Formula template; `{row}` resolves to the 1-based sheet row number.
    FormulaByRow(String),
    /// First capture of `group` when `pattern` runs over a source column;
    /// blank when the row does not capture.
    CaptureByPattern {
        /// Capture pattern with named groups.
        pattern: String,
        /// Source column supplying the query text.
        source_column: String,
        /// Named group to keep.
        group: String,
    },
    /// Boolean column: whether the source text matches `pattern` at its start.
    MatchesPattern {
        /// Validation pattern.
        pattern: String,
        /// Source column supplying the query text.
        source_column: String,
    },
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ConditionalFormatSpecification

/// Conditional format applied over a written data range.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecConditionalFormat {
    /// Trigger rule.
    pub rule: EnumConditionalRule,
    /// Registered format name applied when the rule fires.
    pub fmt_name: String,
}

/// Conditional trigger rule.
#[derive(Debug, Clone, PartialEq)]
pub enum EnumConditionalRule {
    /// Cell value strictly greater than the bound.
    GreaterThan(f64),
    /// Cell value greater than or equal to the bound.
    GreaterThanOrEqualTo(f64),
    /// Cell value strictly less than the bound.
    LessThan(f64),
    /// Cell value less than or equal to the bound.
    LessThanOrEqualTo(f64),
    /// Cell value equal to the number.
    EqualToNumber(f64),
    /// Cell value not equal to the number.
    NotEqualToNumber(f64),
    /// Cell value inside the inclusive band.
    Between {
        /// Lower bound (inclusive).
        min: f64,
        /// Upper bound (inclusive).
        max: f64,
    },
    /// Cell value outside the inclusive band.
    NotBetween {
        /// Lower bound (inclusive).
        min: f64,
        /// Upper bound (inclusive).
        max: f64,
    },
    /// Cell text equal to the string.
    EqualToText(String),
    /// Free-form formula trigger.
    Formula(String),
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region SheetWriteOptions

/// Per-sheet options supplied to [`crate::writer::TableWriter::begin`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecSheetWriteOptions {
    /// Non-finite number replacement policy.
    pub value_policy: SpecValuePolicy,
    /// Header ignore globs; `None` selects
    /// [`crate::conf::TUP_HEADER_IGNORE_DEFAULT`].
    pub patterns_header_ignore: Option<Vec<String>>,
    /// Column width runs `(col_first, col_last, width)`, 0-based inclusive.
    pub widths_columns: Vec<(usize, usize, f64)>,
    /// Derived output columns appended after the source columns.
    pub cols_extra: Vec<SpecExtraColumn>,
}

/// Frozen pane coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecFreezePanes {
    /// Number of frozen top rows.
    pub n_rows: usize,
    /// Number of frozen left columns.
    pub n_cols: usize,
}

impl SpecFreezePanes {
    /// Freeze exactly the single header row.
    pub fn header() -> Self {
        Self { n_rows: 1, n_cols: 0 }
    }
}

/// Final layout directives applied by [`crate::writer::TableWriter::finalize`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpecFinalizeDirectives {
    /// Hidden data rows (0-based, relative to the first data row).
    pub rows_hidden: Vec<usize>,
    /// Hidden columns (0-based written-column indices).
    pub cols_hidden: Vec<usize>,
    /// Freeze panes; `None` leaves panes unfrozen.
    pub freeze_panes: Option<SpecFreezePanes>,
    /// Protect the sheet after layout.
    pub if_protect: bool,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ReportSpecification

/// Per-sheet write report.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpecWriteReport {
    /// Sheet name actually created on the sink.
    pub sheet_name: String,
    /// Header rows written.
    pub cnt_rows_header: usize,
    /// Data rows written.
    pub cnt_rows_data: usize,
    /// Cells emitted to the sink.
    pub cnt_cells_written: u64,
    /// Written column names in output order.
    pub cols_written: Vec<String>,
    /// Source column names dropped by the ignore rules.
    pub cols_skipped: Vec<String>,
    /// Non-fatal warnings.
    pub warnings: Vec<String>,
}

impl SpecWriteReport {
    /// Add a warning message.
    pub fn warn(&mut self, msg: impl AsRef<str>) {
        self.warnings.push(msg.as_ref().to_string());
    }

    /// Human-readable one-line summary.
    pub fn format(&self, prefix: &str) -> String {
        format!(
            "{prefix} sheet={:?} rows_header={} rows_data={} cells={} cols_written={} cols_skipped={} warnings={}",
            self.sheet_name,
            self.cnt_rows_header,
            self.cnt_rows_data,
            self.cnt_cells_written,
            self.cols_written.len(),
            self.cols_skipped.len(),
            self.warnings.len()
        )
    }
}

impl fmt::Display for SpecWriteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format("[WRITE]"))
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region PhaseSpecification

/// Writer lifecycle phase, strictly forward.
///
/// Construction via [`crate::writer::TableWriter::begin`] covers the
/// not-yet-begun state; a live writer always starts in `WritingHeader`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumWriterPhase {
    /// Sheet created; header row not yet written.
    WritingHeader,
    /// Header written; data rows and conditional formats accepted.
    WritingRows,
    /// Layout directives applied; no further writes accepted.
    Finalized,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ErrorSpecification

/// Writer and sink failure kinds. Surfaced synchronously, never retried.
#[derive(Debug)]
pub enum WriteError {
    /// Cell or range coordinates outside the addressable sheet space.
    InvalidAddress(String),
    /// Sheet name already claimed on this sink.
    DuplicateSheetName(String),
    /// Format name used without prior registration.
    UnresolvedFormat(String),
    /// Format name re-registered with a different specification.
    FormatNameConflict(String),
    /// Operation attempted outside its writer phase.
    InvalidPhase {
        /// Rejected operation name.
        operation: String,
        /// Phase the writer was in.
        phase: EnumWriterPhase,
    },
    /// Referenced source column missing from the table.
    ColumnNotFound(String),
    /// Range operation over zero written data rows.
    EmptyRange(String),
    /// Invalid caller-supplied argument.
    InvalidArgument(String),
    /// Sink-native write failure (opaque pass-through).
    SinkWrite(String),
}

impl fmt::Display for WriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidAddress(msg) => write!(f, "{msg}"),
            Self::DuplicateSheetName(name) => write!(f, "Duplicate sheet name: {name:?}"),
            Self::UnresolvedFormat(name) => write!(f, "Unresolved format name: {name:?}"),
            Self::FormatNameConflict(name) => write!(
                f,
                "Format name already registered with a different spec: {name:?}"
            ),
            Self::InvalidPhase { operation, phase } => {
                write!(f, "Operation {operation:?} not allowed in phase {phase:?}")
            }
            Self::ColumnNotFound(name) => write!(f, "Column not found: {name:?}"),
            Self::EmptyRange(msg) => write!(f, "{msg}"),
            Self::InvalidArgument(msg) => write!(f, "{msg}"),
            Self::SinkWrite(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for WriteError {}

// #endregion
////////////////////////////////////////////////////////////////////////////////
