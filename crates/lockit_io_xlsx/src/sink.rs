//! Workbook sinks: the output contract, its XLSX implementation, and an
//! in-memory recorder.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use rust_xlsxwriter::{
    ConditionalFormatCell, ConditionalFormatCellRule, ConditionalFormatFormula, Format,
    FormatAlign, FormatBorder, Formula, Workbook, Worksheet, XlsxError,
};

use crate::addr::{SpecCellAddress, SpecRangeAddress};
use crate::spec::{
    EnumConditionalRule, EnumWriteOp, SpecCellFormat, SpecConditionalFormat, WriteError,
};

////////////////////////////////////////////////////////////////////////////////
// #region FormatRegistry

/// Opaque token for a registered format on one sink. Handles are only valid
/// on the sink that issued them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FormatHandle(usize);

/// Name-to-spec format registry shared by every sink implementation.
#[derive(Debug, Default)]
pub(crate) struct FormatRegistry {
    dict_specs: BTreeMap<String, (usize, SpecCellFormat)>,
}

impl FormatRegistry {
    /// Register `spec` under `name`. Re-registering an identical spec returns
    /// the existing handle; a different spec under the same name is a
    /// conflict. The `bool` flags a newly assigned handle.
    pub(crate) fn register(
        &mut self,
        name: &str,
        spec: &SpecCellFormat,
    ) -> Result<(FormatHandle, bool), WriteError> {
        if let Some((n_idx, spec_existing)) = self.dict_specs.get(name) {
            if spec_existing == spec {
                return Ok((FormatHandle(*n_idx), false));
            }
            return Err(WriteError::FormatNameConflict(name.to_string()));
        }

        let n_idx = self.dict_specs.len();
        self.dict_specs
            .insert(name.to_string(), (n_idx, spec.clone()));
        Ok((FormatHandle(n_idx), true))
    }

    pub(crate) fn resolve(&self, name: &str) -> Result<FormatHandle, WriteError> {
        self.dict_specs
            .get(name)
            .map(|(n_idx, _)| FormatHandle(*n_idx))
            .ok_or_else(|| WriteError::UnresolvedFormat(name.to_string()))
    }

    pub(crate) fn name_of(&self, handle: FormatHandle) -> Option<&str> {
        self.dict_specs
            .iter()
            .find(|(_, (n_idx, _))| *n_idx == handle.0)
            .map(|(c_name, _)| c_name.as_str())
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region SinkContract

/// Output contract consumed by [`crate::writer::TableWriter`].
///
/// Sheet-level operations target the most recently added sheet. Cell rows are
/// 1-based, column indices 0-based, matching [`SpecCellAddress`].
pub trait WorkbookSink {
    /// Claim `name` and open it as the current sheet. Names are unique per
    /// sink.
    fn add_sheet(&mut self, name: &str) -> Result<(), WriteError>;

    /// Register `spec` under `name`. Re-registering an identical spec returns
    /// the existing handle.
    fn register_format(
        &mut self,
        name: &str,
        spec: &SpecCellFormat,
    ) -> Result<FormatHandle, WriteError>;

    /// Look up the handle for a previously registered format name.
    fn resolve_format(&self, name: &str) -> Result<FormatHandle, WriteError>;

    /// Emit one classified cell operation.
    fn write_cell(
        &mut self,
        address: SpecCellAddress,
        op: &EnumWriteOp,
        fmt: Option<FormatHandle>,
    ) -> Result<(), WriteError>;

    /// Set the width of the inclusive 0-based column run.
    fn set_column_width(
        &mut self,
        idx_col_first: usize,
        idx_col_last: usize,
        width: f64,
    ) -> Result<(), WriteError>;

    /// Hide one sheet row (1-based).
    fn set_row_hidden(&mut self, num_row: usize) -> Result<(), WriteError>;

    /// Hide one sheet column (0-based).
    fn set_column_hidden(&mut self, idx_col: usize) -> Result<(), WriteError>;

    /// Freeze the top `n_rows` rows and left `n_cols` columns.
    fn set_freeze_panes(&mut self, n_rows: usize, n_cols: usize) -> Result<(), WriteError>;

    /// Apply a conditional format over `range`. The format name in `config`
    /// must already be registered.
    fn apply_conditional_format(
        &mut self,
        range: SpecRangeAddress,
        config: &SpecConditionalFormat,
    ) -> Result<(), WriteError>;

    /// Protect the current sheet.
    fn protect_sheet(&mut self) -> Result<(), WriteError>;

    /// Flush and seal the sink. Idempotent; every write after the first
    /// `close` fails.
    fn close(&mut self) -> Result<(), WriteError>;

    /// Register every named format from `dict_formats`.
    fn register_formats(
        &mut self,
        dict_formats: &BTreeMap<String, SpecCellFormat>,
    ) -> Result<(), WriteError> {
        for (c_name, spec) in dict_formats {
            self.register_format(c_name, spec)?;
        }
        Ok(())
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region XlsxSink

/// XLSX-backed sink. The workbook is buffered in memory until
/// [`WorkbookSink::close`] saves it to the output path.
pub struct SinkXlsx {
    path_file_out: PathBuf,
    workbook: Workbook,
    registry: FormatRegistry,
    l_formats: Vec<Format>,
    set_sheet_names_existing: BTreeSet<String>,
    idx_sheet_current: Option<usize>,
    cnt_sheets: usize,
    if_closed: bool,
}

impl SinkXlsx {
    /// Create a sink bound to `path_file_out`.
    pub fn new(path_file_out: PathBuf) -> Self {
        Self {
            path_file_out,
            workbook: Workbook::new(),
            registry: FormatRegistry::default(),
            l_formats: Vec::new(),
            set_sheet_names_existing: BTreeSet::new(),
            idx_sheet_current: None,
            cnt_sheets: 0,
            if_closed: false,
        }
    }

    /// Return output file path as string.
    pub fn file_out(&self) -> String {
        self.path_file_out.to_string_lossy().to_string()
    }

    fn validate_open(&self) -> Result<(), WriteError> {
        if self.if_closed {
            return Err(WriteError::SinkWrite("Cannot write after close().".to_string()));
        }
        Ok(())
    }

    fn format_of(&self, handle: FormatHandle) -> Result<&Format, WriteError> {
        self.l_formats
            .get(handle.0)
            .ok_or_else(|| WriteError::UnresolvedFormat(format!("handle #{}", handle.0)))
    }

    fn worksheet_current(&mut self) -> Result<&mut Worksheet, WriteError> {
        let Some(n_idx) = self.idx_sheet_current else {
            return Err(WriteError::SinkWrite(
                "No sheet added yet; call add_sheet() first.".to_string(),
            ));
        };
        self.workbook
            .worksheet_from_index(n_idx)
            .map_err(derive_sink_error)
    }
}

impl WorkbookSink for SinkXlsx {
    fn add_sheet(&mut self, name: &str) -> Result<(), WriteError> {
        self.validate_open()?;
        if self.set_sheet_names_existing.contains(name) {
            return Err(WriteError::DuplicateSheetName(name.to_string()));
        }

        let worksheet = self.workbook.add_worksheet();
        worksheet.set_name(name).map_err(derive_sink_error)?;
        self.set_sheet_names_existing.insert(name.to_string());
        self.idx_sheet_current = Some(self.cnt_sheets);
        self.cnt_sheets += 1;
        Ok(())
    }

    fn register_format(
        &mut self,
        name: &str,
        spec: &SpecCellFormat,
    ) -> Result<FormatHandle, WriteError> {
        self.validate_open()?;
        let (handle, if_new) = self.registry.register(name, spec)?;
        if if_new {
            self.l_formats.push(derive_rust_xlsx_format(spec));
        }
        Ok(handle)
    }

    fn resolve_format(&self, name: &str) -> Result<FormatHandle, WriteError> {
        self.registry.resolve(name)
    }

    fn write_cell(
        &mut self,
        address: SpecCellAddress,
        op: &EnumWriteOp,
        fmt: Option<FormatHandle>,
    ) -> Result<(), WriteError> {
        self.validate_open()?;
        let n_row = cast_row_num(address.num_row - 1)?;
        let n_col = cast_col_num(address.idx_col)?;

        // Clone out of the format table before borrowing the worksheet.
        let fmt_cell: Option<Format> = match fmt {
            Some(handle) => Some(self.format_of(handle)?.clone()),
            None => None,
        };

        let worksheet = self.worksheet_current()?;
        match (op, fmt_cell) {
            // An unformatted blank has no cell record to emit.
            (EnumWriteOp::Blank, None) => {}
            (EnumWriteOp::Blank, Some(fmt_val)) => {
                worksheet
                    .write_blank(n_row, n_col, &fmt_val)
                    .map_err(derive_sink_error)?;
            }
            (EnumWriteOp::Text(val), Some(fmt_val)) => {
                worksheet
                    .write_string_with_format(n_row, n_col, val, &fmt_val)
                    .map_err(derive_sink_error)?;
            }
            (EnumWriteOp::Text(val), None) => {
                worksheet
                    .write_string(n_row, n_col, val)
                    .map_err(derive_sink_error)?;
            }
            (EnumWriteOp::Number(val), Some(fmt_val)) => {
                worksheet
                    .write_number_with_format(n_row, n_col, *val, &fmt_val)
                    .map_err(derive_sink_error)?;
            }
            (EnumWriteOp::Number(val), None) => {
                worksheet
                    .write_number(n_row, n_col, *val)
                    .map_err(derive_sink_error)?;
            }
            (EnumWriteOp::Boolean(val), Some(fmt_val)) => {
                worksheet
                    .write_boolean_with_format(n_row, n_col, *val, &fmt_val)
                    .map_err(derive_sink_error)?;
            }
            (EnumWriteOp::Boolean(val), None) => {
                worksheet
                    .write_boolean(n_row, n_col, *val)
                    .map_err(derive_sink_error)?;
            }
            (EnumWriteOp::Formula(val), Some(fmt_val)) => {
                worksheet
                    .write_formula_with_format(n_row, n_col, Formula::new(val.as_str()), &fmt_val)
                    .map_err(derive_sink_error)?;
            }
            (EnumWriteOp::Formula(val), None) => {
                worksheet
                    .write_formula(n_row, n_col, Formula::new(val.as_str()))
                    .map_err(derive_sink_error)?;
            }
        }
        Ok(())
    }

    fn set_column_width(
        &mut self,
        idx_col_first: usize,
        idx_col_last: usize,
        width: f64,
    ) -> Result<(), WriteError> {
        self.validate_open()?;
        if idx_col_last < idx_col_first {
            return Err(WriteError::InvalidArgument(
                "Arg `idx_col_last` must be >= `idx_col_first`.".to_string(),
            ));
        }
        let n_col_first = cast_col_num(idx_col_first)?;
        let n_col_last = cast_col_num(idx_col_last)?;

        let worksheet = self.worksheet_current()?;
        for n_col in n_col_first..=n_col_last {
            worksheet
                .set_column_width(n_col, width)
                .map_err(derive_sink_error)?;
        }
        Ok(())
    }

    fn set_row_hidden(&mut self, num_row: usize) -> Result<(), WriteError> {
        self.validate_open()?;
        if num_row == 0 {
            return Err(WriteError::InvalidAddress(
                "Row number is 1-based; 0 is not addressable.".to_string(),
            ));
        }
        let n_row = cast_row_num(num_row - 1)?;
        self.worksheet_current()?
            .set_row_hidden(n_row)
            .map_err(derive_sink_error)?;
        Ok(())
    }

    fn set_column_hidden(&mut self, idx_col: usize) -> Result<(), WriteError> {
        self.validate_open()?;
        let n_col = cast_col_num(idx_col)?;
        self.worksheet_current()?
            .set_column_hidden(n_col)
            .map_err(derive_sink_error)?;
        Ok(())
    }

    fn set_freeze_panes(&mut self, n_rows: usize, n_cols: usize) -> Result<(), WriteError> {
        self.validate_open()?;
        let n_row = cast_row_num(n_rows)?;
        let n_col = cast_col_num(n_cols)?;
        self.worksheet_current()?
            .set_freeze_panes(n_row, n_col)
            .map_err(derive_sink_error)?;
        Ok(())
    }

    fn apply_conditional_format(
        &mut self,
        range: SpecRangeAddress,
        config: &SpecConditionalFormat,
    ) -> Result<(), WriteError> {
        self.validate_open()?;
        let handle = self.registry.resolve(&config.fmt_name)?;
        let fmt_rule = self.format_of(handle)?.clone();

        let n_row_first = cast_row_num(range.start.num_row - 1)?;
        let n_col_first = cast_col_num(range.start.idx_col)?;
        let n_row_last = cast_row_num(range.end.num_row - 1)?;
        let n_col_last = cast_col_num(range.end.idx_col)?;

        let worksheet = self.worksheet_current()?;
        if let EnumConditionalRule::Formula(c_formula) = &config.rule {
            let cond = ConditionalFormatFormula::new()
                .set_rule(Formula::new(c_formula.as_str()))
                .set_format(fmt_rule);
            worksheet
                .add_conditional_format(n_row_first, n_col_first, n_row_last, n_col_last, &cond)
                .map_err(derive_sink_error)?;
            return Ok(());
        }

        let cond = derive_conditional_cell(&config.rule).set_format(fmt_rule);
        worksheet
            .add_conditional_format(n_row_first, n_col_first, n_row_last, n_col_last, &cond)
            .map_err(derive_sink_error)?;
        Ok(())
    }

    fn protect_sheet(&mut self) -> Result<(), WriteError> {
        self.validate_open()?;
        self.worksheet_current()?.protect();
        Ok(())
    }

    fn close(&mut self) -> Result<(), WriteError> {
        if self.if_closed {
            return Ok(());
        }
        self.workbook
            .save(&self.path_file_out)
            .map_err(derive_sink_error)?;
        self.if_closed = true;
        Ok(())
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region RecordingSink

/// One recorded sink operation. Addresses and format names are captured in
/// their text form.
#[derive(Debug, Clone, PartialEq)]
pub enum SpecSinkOp {
    /// Sheet claimed.
    AddSheet(String),
    /// Classified cell operation.
    WriteCell {
        /// `"A1"` style address.
        address: String,
        /// Classified operation.
        op: EnumWriteOp,
        /// Resolved format name.
        fmt_name: Option<String>,
    },
    /// Column width run.
    SetColumnWidth {
        /// First column (0-based, inclusive).
        idx_col_first: usize,
        /// Last column (0-based, inclusive).
        idx_col_last: usize,
        /// Width in character units.
        width: f64,
    },
    /// Row hidden (1-based).
    SetRowHidden(usize),
    /// Column hidden (0-based).
    SetColumnHidden(usize),
    /// Panes frozen.
    SetFreezePanes {
        /// Frozen top rows.
        n_rows: usize,
        /// Frozen left columns.
        n_cols: usize,
    },
    /// Conditional format applied.
    ApplyConditionalFormat {
        /// `"A1:B2"` style range.
        range: String,
        /// Format name applied by the rule.
        fmt_name: String,
    },
    /// Sheet protected.
    ProtectSheet,
    /// Sink sealed.
    Close,
}

/// Recording sink that captures the operation stream instead of producing a
/// workbook.
#[derive(Debug, Default)]
pub struct SinkRecorder {
    registry: FormatRegistry,
    set_sheet_names: BTreeSet<String>,
    l_ops: Vec<SpecSinkOp>,
    if_closed: bool,
}

impl SinkRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded operations in emission order.
    pub fn ops(&self) -> &[SpecSinkOp] {
        &self.l_ops
    }

    fn validate_open(&self) -> Result<(), WriteError> {
        if self.if_closed {
            return Err(WriteError::SinkWrite("Cannot write after close().".to_string()));
        }
        Ok(())
    }
}

impl WorkbookSink for SinkRecorder {
    fn add_sheet(&mut self, name: &str) -> Result<(), WriteError> {
        self.validate_open()?;
        if self.set_sheet_names.contains(name) {
            return Err(WriteError::DuplicateSheetName(name.to_string()));
        }
        self.set_sheet_names.insert(name.to_string());
        self.l_ops.push(SpecSinkOp::AddSheet(name.to_string()));
        Ok(())
    }

    fn register_format(
        &mut self,
        name: &str,
        spec: &SpecCellFormat,
    ) -> Result<FormatHandle, WriteError> {
        self.validate_open()?;
        let (handle, _) = self.registry.register(name, spec)?;
        Ok(handle)
    }

    fn resolve_format(&self, name: &str) -> Result<FormatHandle, WriteError> {
        self.registry.resolve(name)
    }

    fn write_cell(
        &mut self,
        address: SpecCellAddress,
        op: &EnumWriteOp,
        fmt: Option<FormatHandle>,
    ) -> Result<(), WriteError> {
        self.validate_open()?;
        let fmt_name = match fmt {
            Some(handle) => Some(
                self.registry
                    .name_of(handle)
                    .ok_or_else(|| {
                        WriteError::UnresolvedFormat(format!("handle #{}", handle.0))
                    })?
                    .to_string(),
            ),
            None => None,
        };
        self.l_ops.push(SpecSinkOp::WriteCell {
            address: address.format(),
            op: op.clone(),
            fmt_name,
        });
        Ok(())
    }

    fn set_column_width(
        &mut self,
        idx_col_first: usize,
        idx_col_last: usize,
        width: f64,
    ) -> Result<(), WriteError> {
        self.validate_open()?;
        self.l_ops.push(SpecSinkOp::SetColumnWidth {
            idx_col_first,
            idx_col_last,
            width,
        });
        Ok(())
    }

    fn set_row_hidden(&mut self, num_row: usize) -> Result<(), WriteError> {
        self.validate_open()?;
        self.l_ops.push(SpecSinkOp::SetRowHidden(num_row));
        Ok(())
    }

    fn set_column_hidden(&mut self, idx_col: usize) -> Result<(), WriteError> {
        self.validate_open()?;
        self.l_ops.push(SpecSinkOp::SetColumnHidden(idx_col));
        Ok(())
    }

    fn set_freeze_panes(&mut self, n_rows: usize, n_cols: usize) -> Result<(), WriteError> {
        self.validate_open()?;
        self.l_ops.push(SpecSinkOp::SetFreezePanes { n_rows, n_cols });
        Ok(())
    }

    fn apply_conditional_format(
        &mut self,
        range: SpecRangeAddress,
        config: &SpecConditionalFormat,
    ) -> Result<(), WriteError> {
        self.validate_open()?;
        self.registry.resolve(&config.fmt_name)?;
        self.l_ops.push(SpecSinkOp::ApplyConditionalFormat {
            range: range.format(),
            fmt_name: config.fmt_name.clone(),
        });
        Ok(())
    }

    fn protect_sheet(&mut self) -> Result<(), WriteError> {
        self.validate_open()?;
        self.l_ops.push(SpecSinkOp::ProtectSheet);
        Ok(())
    }

    fn close(&mut self) -> Result<(), WriteError> {
        if self.if_closed {
            return Ok(());
        }
        self.l_ops.push(SpecSinkOp::Close);
        self.if_closed = true;
        Ok(())
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region XlsxConversion

fn derive_rust_xlsx_format(spec: &SpecCellFormat) -> Format {
    let mut format = Format::new();

    if let Some(val) = &spec.font_name {
        format = format.set_font_name(val.clone());
    }
    if let Some(val) = spec.font_size {
        format = format.set_font_size(val as f64);
    }
    if spec.bold.unwrap_or(false) {
        format = format.set_bold();
    }
    if spec.italic.unwrap_or(false) {
        format = format.set_italic();
    }

    if let Some(val) = &spec.align
        && let Some(align) = derive_format_align(val)
    {
        format = format.set_align(align);
    }
    if let Some(val) = &spec.valign
        && let Some(align) = derive_format_align(val)
    {
        format = format.set_align(align);
    }

    if let Some(val) = &spec.num_format {
        format = format.set_num_format(val.clone());
    }
    if let Some(val) = &spec.bg_color {
        format = format.set_background_color(val.as_str());
    }
    if let Some(val) = &spec.font_color {
        format = format.set_font_color(val.as_str());
    }

    if let Some(val) = spec.border {
        format = format.set_border(derive_format_border(val));
    }
    if spec.text_wrap.unwrap_or(false) {
        format = format.set_text_wrap();
    }

    if let Some(val) = spec.if_locked {
        format = if val {
            format.set_locked()
        } else {
            format.set_unlocked()
        };
    }
    if spec.if_hidden.unwrap_or(false) {
        format = format.set_hidden();
    }

    format
}

fn derive_format_border(border: i64) -> FormatBorder {
    match border {
        0 => FormatBorder::None,
        1 => FormatBorder::Thin,
        2 => FormatBorder::Medium,
        3 => FormatBorder::Dashed,
        4 => FormatBorder::Dotted,
        5 => FormatBorder::Thick,
        6 => FormatBorder::Double,
        7 => FormatBorder::Hair,
        8 => FormatBorder::MediumDashed,
        9 => FormatBorder::DashDot,
        10 => FormatBorder::MediumDashDot,
        11 => FormatBorder::DashDotDot,
        12 => FormatBorder::MediumDashDotDot,
        13 => FormatBorder::SlantDashDot,
        _ => FormatBorder::None,
    }
}

fn derive_format_align(align: &str) -> Option<FormatAlign> {
    let value = align.trim().to_ascii_lowercase();
    match value.as_str() {
        "general" => Some(FormatAlign::General),
        "left" => Some(FormatAlign::Left),
        "center" => Some(FormatAlign::Center),
        "right" => Some(FormatAlign::Right),
        "fill" => Some(FormatAlign::Fill),
        "justify" => Some(FormatAlign::Justify),
        "center_across" => Some(FormatAlign::CenterAcross),
        "distributed" => Some(FormatAlign::Distributed),
        "top" => Some(FormatAlign::Top),
        "bottom" => Some(FormatAlign::Bottom),
        "vcenter" | "vertical_center" => Some(FormatAlign::VerticalCenter),
        "vjustify" | "vertical_justify" => Some(FormatAlign::VerticalJustify),
        "vdistributed" | "vertical_distributed" => Some(FormatAlign::VerticalDistributed),
        _ => None,
    }
}

// Formula rules never reach here; the sink branches on them first.
fn derive_conditional_cell(rule: &EnumConditionalRule) -> ConditionalFormatCell {
    let cond = ConditionalFormatCell::new();
    match rule {
        EnumConditionalRule::GreaterThan(val) => {
            cond.set_rule(ConditionalFormatCellRule::GreaterThan(*val))
        }
        EnumConditionalRule::GreaterThanOrEqualTo(val) => {
            cond.set_rule(ConditionalFormatCellRule::GreaterThanOrEqualTo(*val))
        }
        EnumConditionalRule::LessThan(val) => {
            cond.set_rule(ConditionalFormatCellRule::LessThan(*val))
        }
        EnumConditionalRule::LessThanOrEqualTo(val) => {
            cond.set_rule(ConditionalFormatCellRule::LessThanOrEqualTo(*val))
        }
        EnumConditionalRule::EqualToNumber(val) => {
            cond.set_rule(ConditionalFormatCellRule::EqualTo(*val))
        }
        EnumConditionalRule::NotEqualToNumber(val) => {
            cond.set_rule(ConditionalFormatCellRule::NotEqualTo(*val))
        }
        EnumConditionalRule::Between { min, max } => {
            cond.set_rule(ConditionalFormatCellRule::Between(*min, *max))
        }
        EnumConditionalRule::NotBetween { min, max } => {
            cond.set_rule(ConditionalFormatCellRule::NotBetween(*min, *max))
        }
        EnumConditionalRule::EqualToText(val) => {
            cond.set_rule(ConditionalFormatCellRule::EqualTo(val.clone()))
        }
        EnumConditionalRule::Formula(..) => cond,
    }
}

fn cast_row_num(value: usize) -> Result<u32, WriteError> {
    u32::try_from(value).map_err(|_| WriteError::InvalidAddress(format!("row index overflow: {value}")))
}

fn cast_col_num(value: usize) -> Result<u16, WriteError> {
    u16::try_from(value)
        .map_err(|_| WriteError::InvalidAddress(format!("column index overflow: {value}")))
}

fn derive_sink_error(err: XlsxError) -> WriteError {
    WriteError::SinkWrite(format!("xlsx write error: {err}"))
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
