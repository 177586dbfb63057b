//! Phased sheet writer that streams tables into a workbook sink.

use lockit_rex::RexPattern;
use lockit_table::{EnumCellValue, Table, derive_query_text};

use crate::addr::{SpecCellAddress, parse_range_address, resolve_range_template};
use crate::sink::{FormatHandle, WorkbookSink};
use crate::spec::{
    EnumExtraColumnRule, EnumWriteOp, EnumWriterPhase, SpecConditionalFormat, SpecExtraColumn,
    SpecFinalizeDirectives, SpecFormatRules, SpecSheetWriteOptions, SpecValuePolicy,
    SpecWriteReport, WriteError,
};
use crate::util::{
    SpecHeaderIgnoreRules, SpecWrittenColumn, classify_write_op, plan_written_columns,
    sanitize_sheet_name,
};

/// Phased writer for one sheet on a borrowed sink.
///
/// Lifecycle: [`Self::begin`] -> [`Self::write_header`] -> [`Self::write_rows`]
/// (repeatable) -> [`Self::finalize`]. Phases only move forward; an operation
/// attempted outside its phase fails with [`WriteError::InvalidPhase`] and
/// leaves the writer state untouched.
pub struct TableWriter<'a, S: WorkbookSink> {
    sink: &'a mut S,
    sheet_name: String,
    options: SpecSheetWriteOptions,
    rules_ignore: SpecHeaderIgnoreRules,
    phase: EnumWriterPhase,
    // Count of sheet rows written so far; the next row number is this plus one.
    n_row_cursor: usize,
    l_cols_written: Vec<SpecWrittenColumn>,
    cnt_rows_data: usize,
    finalize_applied: Option<SpecFinalizeDirectives>,
    report: SpecWriteReport,
}

impl<'a, S: WorkbookSink> TableWriter<'a, S> {
    /// Create the sheet on `sink` and start the header phase.
    ///
    /// `sheet_name` is sanitized before the sink claims it; the column width
    /// runs from `options` are applied up front.
    pub fn begin(
        sink: &'a mut S,
        sheet_name: &str,
        options: SpecSheetWriteOptions,
    ) -> Result<Self, WriteError> {
        let rules_ignore =
            SpecHeaderIgnoreRules::compile(options.patterns_header_ignore.as_deref())?;

        let sheet_name_clean = sanitize_sheet_name(sheet_name, "_");
        sink.add_sheet(&sheet_name_clean)?;
        for (idx_col_first, idx_col_last, width) in &options.widths_columns {
            sink.set_column_width(*idx_col_first, *idx_col_last, *width)?;
        }

        let report = SpecWriteReport {
            sheet_name: sheet_name_clean.clone(),
            ..SpecWriteReport::default()
        };

        Ok(Self {
            sink,
            sheet_name: sheet_name_clean,
            options,
            rules_ignore,
            phase: EnumWriterPhase::WritingHeader,
            n_row_cursor: 0,
            l_cols_written: Vec::new(),
            cnt_rows_data: 0,
            finalize_applied: None,
            report,
        })
    }

    /// Sanitized sheet name claimed on the sink.
    pub fn sheet_name(&self) -> &str {
        &self.sheet_name
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> EnumWriterPhase {
        self.phase
    }

    /// Immutable view of the running write report.
    pub fn report(&self) -> &SpecWriteReport {
        &self.report
    }

    /// Write the header row from `table` column names and advance to the row
    /// phase.
    ///
    /// Names matching the ignore rules are dropped and the kept columns are
    /// compacted left; extra columns from the options follow them. Header
    /// cells are plain text, never classified.
    pub fn write_header(
        &mut self,
        table: &Table,
        fmt_name_header: Option<&str>,
    ) -> Result<(), WriteError> {
        if self.phase != EnumWriterPhase::WritingHeader {
            return Err(self.derive_phase_error("write_header"));
        }

        let (l_cols_written, l_cols_skipped) =
            plan_written_columns(table.columns(), &self.rules_ignore, &self.options.cols_extra);
        if l_cols_written.is_empty() {
            self.report
                .warn("All source columns matched the ignore rules; header row is empty.");
        }
        if !l_cols_skipped.is_empty() {
            log::debug!(
                "Skipped {} header column(s) on sheet {:?}: {:?}",
                l_cols_skipped.len(),
                self.sheet_name,
                l_cols_skipped
            );
        }

        let fmt_header: Option<FormatHandle> = match fmt_name_header {
            Some(c_name) => Some(self.sink.resolve_format(c_name)?),
            None => None,
        };

        let num_row_sheet = self.n_row_cursor + 1;
        for (n_idx_out, col) in l_cols_written.iter().enumerate() {
            self.sink.write_cell(
                SpecCellAddress::new(n_idx_out, num_row_sheet)?,
                &EnumWriteOp::Text(col.name.clone()),
                fmt_header,
            )?;
            self.report.cnt_cells_written += 1;
        }

        self.report.cols_written = l_cols_written.iter().map(|col| col.name.clone()).collect();
        self.report.cols_skipped = l_cols_skipped;
        self.report.cnt_rows_header = 1;
        self.l_cols_written = l_cols_written;
        self.n_row_cursor += 1;
        self.phase = EnumWriterPhase::WritingRows;
        Ok(())
    }

    /// Append every row of `table` below the rows already written.
    ///
    /// Callable repeatedly. Source columns are rebound by name on each call,
    /// so consecutive tables only need matching column names, not matching
    /// order. Each cell value is classified exactly once; `rules` picks the
    /// format name with cell > column > row > default precedence.
    pub fn write_rows(&mut self, table: &Table, rules: &SpecFormatRules) -> Result<(), WriteError> {
        if self.phase != EnumWriterPhase::WritingRows {
            return Err(self.derive_phase_error("write_rows"));
        }

        let mut l_idx_src_by_out = Vec::with_capacity(self.l_cols_written.len());
        for col in &self.l_cols_written {
            let idx_src = match col.idx_src {
                Some(_) => Some(
                    table
                        .column_index(&col.name)
                        .ok_or_else(|| WriteError::ColumnNotFound(col.name.clone()))?,
                ),
                None => None,
            };
            l_idx_src_by_out.push(idx_src);
        }
        let l_plans_extra = compile_extra_plans(&self.options.cols_extra, table)?;
        let n_cols_source = l_idx_src_by_out.iter().filter(|idx| idx.is_some()).count();

        for row in table.rows() {
            let num_row_sheet = self.n_row_cursor + 1;
            let idx_row_data = self.cnt_rows_data;

            for (n_idx_out, col) in self.l_cols_written.iter().enumerate() {
                let op = match l_idx_src_by_out[n_idx_out] {
                    Some(n_idx_src) => {
                        classify_write_op(&row[n_idx_src], &self.options.value_policy)
                    }
                    None => derive_extra_op(
                        &l_plans_extra[n_idx_out - n_cols_source],
                        row,
                        num_row_sheet,
                        &self.options.value_policy,
                    ),
                };
                let fmt = match rules.resolve(idx_row_data, &col.name) {
                    Some(c_name) => Some(self.sink.resolve_format(c_name)?),
                    None => None,
                };

                self.sink
                    .write_cell(SpecCellAddress::new(n_idx_out, num_row_sheet)?, &op, fmt)?;
                self.report.cnt_cells_written += 1;
            }

            self.n_row_cursor += 1;
            self.cnt_rows_data += 1;
            self.report.cnt_rows_data += 1;
        }
        Ok(())
    }

    /// Apply a conditional format over the written data rows.
    ///
    /// `range_template` may use `{start}`/`{end}` placeholders; they resolve
    /// to the 1-based sheet row numbers of the first and last written data
    /// row. Requires at least one written data row.
    pub fn apply_conditional_format(
        &mut self,
        range_template: &str,
        config: &SpecConditionalFormat,
    ) -> Result<(), WriteError> {
        if self.phase != EnumWriterPhase::WritingRows {
            return Err(self.derive_phase_error("apply_conditional_format"));
        }
        if self.cnt_rows_data == 0 {
            return Err(WriteError::EmptyRange(
                "No data rows written; conditional format range would be empty.".to_string(),
            ));
        }

        let num_row_data_first = self.report.cnt_rows_header + 1;
        let num_row_data_last = self.n_row_cursor;
        let c_range = resolve_range_template(range_template, num_row_data_first, num_row_data_last);
        let range = parse_range_address(&c_range)?;
        self.sink.apply_conditional_format(range, config)
    }

    /// Apply layout directives and seal the writer.
    ///
    /// Hidden row indices are 0-based relative to the first data row; hidden
    /// column indices address written columns. Repeating `finalize` with the
    /// directives already applied is a no-op; different directives after
    /// sealing fail like any other out-of-phase operation.
    pub fn finalize(&mut self, directives: &SpecFinalizeDirectives) -> Result<(), WriteError> {
        if self.phase == EnumWriterPhase::Finalized {
            if self.finalize_applied.as_ref() == Some(directives) {
                return Ok(());
            }
            return Err(self.derive_phase_error("finalize"));
        }
        if self.phase != EnumWriterPhase::WritingRows {
            return Err(self.derive_phase_error("finalize"));
        }

        // Validate both index lists before touching the sink.
        for idx_row in &directives.rows_hidden {
            if *idx_row >= self.cnt_rows_data {
                return Err(WriteError::InvalidArgument(format!(
                    "Hidden row index {idx_row} out of range; {} data row(s) written.",
                    self.cnt_rows_data
                )));
            }
        }
        for idx_col in &directives.cols_hidden {
            if *idx_col >= self.l_cols_written.len() {
                return Err(WriteError::InvalidArgument(format!(
                    "Hidden column index {idx_col} out of range; {} column(s) written.",
                    self.l_cols_written.len()
                )));
            }
        }

        for idx_row in &directives.rows_hidden {
            self.sink
                .set_row_hidden(self.report.cnt_rows_header + 1 + *idx_row)?;
        }
        for idx_col in &directives.cols_hidden {
            self.sink.set_column_hidden(*idx_col)?;
        }
        if let Some(freeze_panes) = &directives.freeze_panes {
            self.sink
                .set_freeze_panes(freeze_panes.n_rows, freeze_panes.n_cols)?;
        }
        if directives.if_protect {
            self.sink.protect_sheet()?;
        }

        self.phase = EnumWriterPhase::Finalized;
        self.finalize_applied = Some(directives.clone());
        Ok(())
    }

    fn derive_phase_error(&self, operation: &str) -> WriteError {
        WriteError::InvalidPhase {
            operation: operation.to_string(),
            phase: self.phase,
        }
    }
}

/// Compiled per-sheet plan for one extra column.
enum EnumExtraPlan {
    Constant(EnumCellValue),
    FormulaByRow(String),
    CaptureByPattern {
        rex: RexPattern,
        idx_src: usize,
        group: String,
    },
    MatchesPattern {
        rex: RexPattern,
        idx_src: usize,
    },
}

fn compile_extra_plans(
    cols_extra: &[SpecExtraColumn],
    table: &Table,
) -> Result<Vec<EnumExtraPlan>, WriteError> {
    let mut l_plans = Vec::with_capacity(cols_extra.len());
    for spec_col in cols_extra {
        let plan = match &spec_col.rule {
            EnumExtraColumnRule::Constant(value) => EnumExtraPlan::Constant(value.clone()),
            EnumExtraColumnRule::FormulaByRow(template) => {
                EnumExtraPlan::FormulaByRow(template.clone())
            }
            EnumExtraColumnRule::CaptureByPattern {
                pattern,
                source_column,
                group,
            } => EnumExtraPlan::CaptureByPattern {
                rex: RexPattern::new(pattern)
                    .map_err(|e| WriteError::InvalidArgument(e.to_string()))?,
                idx_src: table
                    .column_index(source_column)
                    .ok_or_else(|| WriteError::ColumnNotFound(source_column.clone()))?,
                group: group.clone(),
            },
            EnumExtraColumnRule::MatchesPattern {
                pattern,
                source_column,
            } => EnumExtraPlan::MatchesPattern {
                rex: RexPattern::new(pattern)
                    .map_err(|e| WriteError::InvalidArgument(e.to_string()))?,
                idx_src: table
                    .column_index(source_column)
                    .ok_or_else(|| WriteError::ColumnNotFound(source_column.clone()))?,
            },
        };
        l_plans.push(plan);
    }
    Ok(l_plans)
}

fn derive_extra_op(
    plan: &EnumExtraPlan,
    row: &[EnumCellValue],
    num_row_sheet: usize,
    value_policy: &SpecValuePolicy,
) -> EnumWriteOp {
    match plan {
        EnumExtraPlan::Constant(value) => classify_write_op(value, value_policy),
        EnumExtraPlan::FormulaByRow(template) => {
            EnumWriteOp::Formula(template.replace("{row}", &num_row_sheet.to_string()))
        }
        EnumExtraPlan::CaptureByPattern {
            rex,
            idx_src,
            group,
        } => {
            let c_query = derive_query_text(&row[*idx_src]);
            match rex.first_captures(&c_query).remove(group.as_str()) {
                Some(value) => {
                    classify_write_op(&EnumCellValue::Text(value), value_policy)
                }
                None => EnumWriteOp::Blank,
            }
        }
        EnumExtraPlan::MatchesPattern { rex, idx_src } => {
            let c_query = derive_query_text(&row[*idx_src]);
            EnumWriteOp::Boolean(rex.is_format(&c_query))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use tempfile::tempdir;

    use super::*;
    use crate::conf::derive_default_formats;
    use crate::sink::{SinkRecorder, SinkXlsx, SpecSinkOp};
    use crate::spec::{EnumConditionalRule, SpecCellFormat, SpecFreezePanes};

    fn build_sink() -> SinkRecorder {
        let mut sink = SinkRecorder::new();
        sink.register_formats(&derive_default_formats())
            .expect("register formats");
        sink
    }

    fn build_table(columns: &[&str], rows: Vec<Vec<EnumCellValue>>) -> Table {
        let mut table =
            Table::new(columns.iter().map(ToString::to_string).collect()).expect("table");
        for row in rows {
            table.push_row(row).expect("row");
        }
        table
    }

    fn text(val: &str) -> EnumCellValue {
        EnumCellValue::Text(val.to_string())
    }

    #[test]
    fn test_write_header_skips_ignored_columns_and_compacts_left() {
        let mut sink = build_sink();
        let table = build_table(&["Name", "index", "Unnamed: 0", "Age"], vec![]);

        let mut writer =
            TableWriter::begin(&mut sink, "Report", SpecSheetWriteOptions::default())
                .expect("begin");
        writer.write_header(&table, None).expect("header");
        assert_eq!(writer.report().cols_written, vec!["Name", "Age"]);
        assert_eq!(writer.report().cols_skipped, vec!["index", "Unnamed: 0"]);
        assert_eq!(writer.report().cnt_rows_header, 1);
        assert_eq!(writer.report().cnt_cells_written, 2);
        drop(writer);

        assert_eq!(
            sink.ops(),
            &[
                SpecSinkOp::AddSheet("Report".to_string()),
                SpecSinkOp::WriteCell {
                    address: "A1".to_string(),
                    op: EnumWriteOp::Text("Name".to_string()),
                    fmt_name: None,
                },
                SpecSinkOp::WriteCell {
                    address: "B1".to_string(),
                    op: EnumWriteOp::Text("Age".to_string()),
                    fmt_name: None,
                },
            ]
        );
    }

    #[test]
    fn test_write_header_warns_when_every_column_is_ignored() {
        let mut sink = build_sink();
        let table = build_table(&["index"], vec![vec![EnumCellValue::Number(1.0)]]);

        let mut writer =
            TableWriter::begin(&mut sink, "Report", SpecSheetWriteOptions::default())
                .expect("begin");
        writer.write_header(&table, None).expect("header");
        assert_eq!(writer.report().warnings.len(), 1);
        assert!(writer.report().cols_written.is_empty());

        writer
            .write_rows(&table, &SpecFormatRules::default())
            .expect("rows");
        assert_eq!(writer.report().cnt_rows_data, 1);
        assert_eq!(writer.report().cnt_cells_written, 0);
    }

    #[test]
    fn test_begin_sanitizes_sheet_name_and_applies_widths() {
        let mut sink = build_sink();
        let options = SpecSheetWriteOptions {
            widths_columns: vec![(0, 2, 14.0), (3, 3, 30.0)],
            ..SpecSheetWriteOptions::default()
        };

        let writer = TableWriter::begin(&mut sink, "Plan: Q1/Q2", options).expect("begin");
        assert_eq!(writer.sheet_name(), "Plan_ Q1_Q2");
        assert_eq!(writer.report().sheet_name, "Plan_ Q1_Q2");
        drop(writer);

        assert_eq!(
            sink.ops(),
            &[
                SpecSinkOp::AddSheet("Plan_ Q1_Q2".to_string()),
                SpecSinkOp::SetColumnWidth {
                    idx_col_first: 0,
                    idx_col_last: 2,
                    width: 14.0,
                },
                SpecSinkOp::SetColumnWidth {
                    idx_col_first: 3,
                    idx_col_last: 3,
                    width: 30.0,
                },
            ]
        );
    }

    #[test]
    fn test_begin_rejects_duplicate_sheet_name() {
        let mut sink = build_sink();
        {
            TableWriter::begin(&mut sink, "Report", SpecSheetWriteOptions::default())
                .expect("first claim");
        }
        assert!(matches!(
            TableWriter::begin(&mut sink, "Report", SpecSheetWriteOptions::default()),
            Err(WriteError::DuplicateSheetName(_))
        ));
    }

    #[test]
    fn test_cursor_advances_exactly_once_per_row() {
        let mut sink = build_sink();
        let table = build_table(
            &["Name"],
            vec![vec![text("a")], vec![text("b")], vec![text("c")]],
        );

        let mut writer =
            TableWriter::begin(&mut sink, "Report", SpecSheetWriteOptions::default())
                .expect("begin");
        writer.write_header(&table, None).expect("header");
        writer
            .write_rows(&table, &SpecFormatRules::default())
            .expect("rows");
        assert_eq!(writer.report().cnt_rows_data, 3);
        drop(writer);

        let l_addresses: Vec<&str> = sink
            .ops()
            .iter()
            .filter_map(|op| match op {
                SpecSinkOp::WriteCell { address, .. } => Some(address.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(l_addresses, vec!["A1", "A2", "A3", "A4"]);
    }

    #[test]
    fn test_phase_violations_are_rejected() {
        let mut sink = build_sink();
        let table = build_table(&["Name"], vec![vec![text("a")]]);

        let mut writer =
            TableWriter::begin(&mut sink, "Report", SpecSheetWriteOptions::default())
                .expect("begin");
        assert!(matches!(
            writer.write_rows(&table, &SpecFormatRules::default()),
            Err(WriteError::InvalidPhase { operation, phase })
                if operation == "write_rows" && phase == EnumWriterPhase::WritingHeader
        ));
        assert!(matches!(
            writer.finalize(&SpecFinalizeDirectives::default()),
            Err(WriteError::InvalidPhase { .. })
        ));

        writer.write_header(&table, None).expect("header");
        assert!(matches!(
            writer.write_header(&table, None),
            Err(WriteError::InvalidPhase { operation, .. }) if operation == "write_header"
        ));

        writer
            .write_rows(&table, &SpecFormatRules::default())
            .expect("rows");
        writer
            .finalize(&SpecFinalizeDirectives::default())
            .expect("finalize");
        assert!(matches!(
            writer.write_rows(&table, &SpecFormatRules::default()),
            Err(WriteError::InvalidPhase { phase, .. }) if phase == EnumWriterPhase::Finalized
        ));
    }

    #[test]
    fn test_format_precedence_cell_over_column_over_row_over_default() {
        let mut sink = build_sink();
        for (c_name, n_size) in [("a", 10), ("b", 11), ("c", 12), ("d", 13)] {
            sink.register_format(
                c_name,
                &SpecCellFormat {
                    font_size: Some(n_size),
                    ..SpecCellFormat::default()
                },
            )
            .expect("register");
        }
        let table = build_table(
            &["Name", "Score"],
            vec![
                vec![text("ana"), EnumCellValue::Number(1.0)],
                vec![text("bo"), EnumCellValue::Number(2.0)],
            ],
        );
        let rules = SpecFormatRules {
            fmt_name_by_cell: BTreeMap::from([(
                0usize,
                BTreeMap::from([("Score".to_string(), "a".to_string())]),
            )]),
            fmt_name_by_col: BTreeMap::from([("Score".to_string(), "b".to_string())]),
            fmt_name_by_row: BTreeMap::from([(0usize, "c".to_string())]),
            fmt_name_default: Some("d".to_string()),
        };

        let mut writer =
            TableWriter::begin(&mut sink, "Report", SpecSheetWriteOptions::default())
                .expect("begin");
        writer.write_header(&table, None).expect("header");
        writer.write_rows(&table, &rules).expect("rows");
        drop(writer);

        let l_fmt_names: Vec<Option<&str>> = sink
            .ops()
            .iter()
            .filter_map(|op| match op {
                SpecSinkOp::WriteCell {
                    address, fmt_name, ..
                } if address != "A1" && address != "B1" => Some(fmt_name.as_deref()),
                _ => None,
            })
            .collect();
        assert_eq!(
            l_fmt_names,
            vec![Some("c"), Some("a"), Some("d"), Some("b")]
        );
    }

    #[test]
    fn test_write_rows_requires_resolvable_format_names() {
        let mut sink = build_sink();
        let table = build_table(&["Name"], vec![vec![text("ana")]]);
        let rules = SpecFormatRules {
            fmt_name_default: Some("ghost".to_string()),
            ..SpecFormatRules::default()
        };

        let mut writer =
            TableWriter::begin(&mut sink, "Report", SpecSheetWriteOptions::default())
                .expect("begin");
        writer.write_header(&table, None).expect("header");
        assert!(matches!(
            writer.write_rows(&table, &rules),
            Err(WriteError::UnresolvedFormat(_))
        ));
    }

    #[test]
    fn test_write_rows_rebinds_source_columns_by_name() {
        let mut sink = build_sink();
        let table_first = build_table(
            &["Name", "Score"],
            vec![vec![text("ana"), EnumCellValue::Number(1.0)]],
        );
        let table_second = build_table(
            &["Score", "Name"],
            vec![vec![EnumCellValue::Number(2.0), text("bo")]],
        );

        let mut writer =
            TableWriter::begin(&mut sink, "Report", SpecSheetWriteOptions::default())
                .expect("begin");
        writer.write_header(&table_first, None).expect("header");
        writer
            .write_rows(&table_first, &SpecFormatRules::default())
            .expect("first rows");
        writer
            .write_rows(&table_second, &SpecFormatRules::default())
            .expect("second rows");
        drop(writer);

        assert!(sink.ops().contains(&SpecSinkOp::WriteCell {
            address: "A3".to_string(),
            op: EnumWriteOp::Text("bo".to_string()),
            fmt_name: None,
        }));
        assert!(sink.ops().contains(&SpecSinkOp::WriteCell {
            address: "B3".to_string(),
            op: EnumWriteOp::Number(2.0),
            fmt_name: None,
        }));
    }

    #[test]
    fn test_write_rows_rejects_missing_source_column() {
        let mut sink = build_sink();
        let table_first = build_table(
            &["Name", "Score"],
            vec![vec![text("ana"), EnumCellValue::Number(1.0)]],
        );
        let table_second = build_table(&["Name"], vec![vec![text("bo")]]);

        let mut writer =
            TableWriter::begin(&mut sink, "Report", SpecSheetWriteOptions::default())
                .expect("begin");
        writer.write_header(&table_first, None).expect("header");
        assert!(matches!(
            writer.write_rows(&table_second, &SpecFormatRules::default()),
            Err(WriteError::ColumnNotFound(name)) if name == "Score"
        ));
    }

    #[test]
    fn test_cell_values_are_classified_once_per_cell() {
        let mut sink = build_sink();
        let table = build_table(
            &["Formula", "Empty", "Flag", "Nan"],
            vec![vec![
                text("=SUM(A2:A3)"),
                text(""),
                EnumCellValue::Boolean(true),
                EnumCellValue::Number(f64::NAN),
            ]],
        );

        let mut writer =
            TableWriter::begin(&mut sink, "Report", SpecSheetWriteOptions::default())
                .expect("begin");
        writer.write_header(&table, None).expect("header");
        writer
            .write_rows(&table, &SpecFormatRules::default())
            .expect("rows");
        drop(writer);

        let l_ops_data: Vec<&EnumWriteOp> = sink
            .ops()
            .iter()
            .filter_map(|op| match op {
                SpecSinkOp::WriteCell { address, op, .. } if address.ends_with('2') => Some(op),
                _ => None,
            })
            .collect();
        assert_eq!(
            l_ops_data,
            vec![
                &EnumWriteOp::Formula("=SUM(A2:A3)".to_string()),
                &EnumWriteOp::Blank,
                &EnumWriteOp::Boolean(true),
                &EnumWriteOp::Text("NaN".to_string()),
            ]
        );
    }

    #[test]
    fn test_extra_columns_derive_values_per_rule() {
        let mut sink = build_sink();
        let options = SpecSheetWriteOptions {
            cols_extra: vec![
                SpecExtraColumn {
                    name: "Batch".to_string(),
                    rule: EnumExtraColumnRule::Constant(text("batch-7")),
                },
                SpecExtraColumn {
                    name: "Doubled".to_string(),
                    rule: EnumExtraColumnRule::FormulaByRow("=B{row}*2".to_string()),
                },
                SpecExtraColumn {
                    name: "Tag".to_string(),
                    rule: EnumExtraColumnRule::CaptureByPattern {
                        pattern: r"^(?P<tag>[a-z]+)-".to_string(),
                        source_column: "Name".to_string(),
                        group: "tag".to_string(),
                    },
                },
                SpecExtraColumn {
                    name: "Tagged".to_string(),
                    rule: EnumExtraColumnRule::MatchesPattern {
                        pattern: r"[a-z]+-".to_string(),
                        source_column: "Name".to_string(),
                    },
                },
            ],
            ..SpecSheetWriteOptions::default()
        };
        let table = build_table(
            &["Name", "Score"],
            vec![
                vec![text("core-1"), EnumCellValue::Number(1.5)],
                vec![text("X9"), EnumCellValue::Number(2.5)],
            ],
        );

        let mut writer = TableWriter::begin(&mut sink, "Report", options).expect("begin");
        writer.write_header(&table, None).expect("header");
        assert_eq!(
            writer.report().cols_written,
            vec!["Name", "Score", "Batch", "Doubled", "Tag", "Tagged"]
        );
        writer
            .write_rows(&table, &SpecFormatRules::default())
            .expect("rows");
        drop(writer);

        let dict_ops: BTreeMap<String, EnumWriteOp> = sink
            .ops()
            .iter()
            .filter_map(|op| match op {
                SpecSinkOp::WriteCell { address, op, .. } => Some((address.clone(), op.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(dict_ops["C2"], EnumWriteOp::Text("batch-7".to_string()));
        assert_eq!(dict_ops["D2"], EnumWriteOp::Formula("=B2*2".to_string()));
        assert_eq!(dict_ops["D3"], EnumWriteOp::Formula("=B3*2".to_string()));
        assert_eq!(dict_ops["E2"], EnumWriteOp::Text("core".to_string()));
        assert_eq!(dict_ops["E3"], EnumWriteOp::Blank);
        assert_eq!(dict_ops["F2"], EnumWriteOp::Boolean(true));
        assert_eq!(dict_ops["F3"], EnumWriteOp::Boolean(false));
    }

    #[test]
    fn test_extra_columns_validate_pattern_and_source() {
        let mut sink = build_sink();
        let options = SpecSheetWriteOptions {
            cols_extra: vec![SpecExtraColumn {
                name: "Tagged".to_string(),
                rule: EnumExtraColumnRule::MatchesPattern {
                    pattern: r"[a-z]+".to_string(),
                    source_column: "Ghost".to_string(),
                },
            }],
            ..SpecSheetWriteOptions::default()
        };
        let table = build_table(&["Name"], vec![vec![text("ana")]]);

        let mut writer = TableWriter::begin(&mut sink, "Report", options).expect("begin");
        writer.write_header(&table, None).expect("header");
        assert!(matches!(
            writer.write_rows(&table, &SpecFormatRules::default()),
            Err(WriteError::ColumnNotFound(name)) if name == "Ghost"
        ));
        drop(writer);

        let mut sink_second = build_sink();
        let options_bad_pattern = SpecSheetWriteOptions {
            cols_extra: vec![SpecExtraColumn {
                name: "Tag".to_string(),
                rule: EnumExtraColumnRule::CaptureByPattern {
                    pattern: "(?P<broken".to_string(),
                    source_column: "Name".to_string(),
                    group: "broken".to_string(),
                },
            }],
            ..SpecSheetWriteOptions::default()
        };
        let mut writer_second =
            TableWriter::begin(&mut sink_second, "Report", options_bad_pattern).expect("begin");
        writer_second.write_header(&table, None).expect("header");
        assert!(matches!(
            writer_second.write_rows(&table, &SpecFormatRules::default()),
            Err(WriteError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_conditional_format_resolves_row_template() {
        let mut sink = build_sink();
        let table = build_table(
            &["Name", "Score"],
            vec![
                vec![text("ana"), EnumCellValue::Number(0.9)],
                vec![text("bo"), EnumCellValue::Number(0.4)],
                vec![text("chi"), EnumCellValue::Number(0.7)],
            ],
        );

        let mut writer =
            TableWriter::begin(&mut sink, "Report", SpecSheetWriteOptions::default())
                .expect("begin");
        writer.write_header(&table, None).expect("header");
        assert!(matches!(
            writer.apply_conditional_format(
                "B{start}:B{end}",
                &SpecConditionalFormat {
                    rule: EnumConditionalRule::GreaterThan(0.5),
                    fmt_name: "percent".to_string(),
                },
            ),
            Err(WriteError::EmptyRange(_))
        ));

        writer
            .write_rows(&table, &SpecFormatRules::default())
            .expect("rows");
        writer
            .apply_conditional_format(
                "B{start}:B{end}",
                &SpecConditionalFormat {
                    rule: EnumConditionalRule::GreaterThan(0.5),
                    fmt_name: "percent".to_string(),
                },
            )
            .expect("conditional");
        drop(writer);

        assert!(sink.ops().contains(&SpecSinkOp::ApplyConditionalFormat {
            range: "B2:B4".to_string(),
            fmt_name: "percent".to_string(),
        }));
    }

    #[test]
    fn test_finalize_applies_layout_directives() {
        let mut sink = build_sink();
        let table = build_table(
            &["Name", "Score"],
            vec![
                vec![text("ana"), EnumCellValue::Number(0.9)],
                vec![text("bo"), EnumCellValue::Number(0.4)],
                vec![text("chi"), EnumCellValue::Number(0.7)],
            ],
        );
        let directives = SpecFinalizeDirectives {
            rows_hidden: vec![0, 2],
            cols_hidden: vec![1],
            freeze_panes: Some(SpecFreezePanes::header()),
            if_protect: true,
        };

        let mut writer =
            TableWriter::begin(&mut sink, "Report", SpecSheetWriteOptions::default())
                .expect("begin");
        writer.write_header(&table, None).expect("header");
        writer
            .write_rows(&table, &SpecFormatRules::default())
            .expect("rows");
        writer.finalize(&directives).expect("finalize");
        assert_eq!(writer.phase(), EnumWriterPhase::Finalized);

        // Identical directives re-apply as a no-op; different ones fail.
        writer.finalize(&directives).expect("finalize is idempotent");
        assert!(matches!(
            writer.finalize(&SpecFinalizeDirectives::default()),
            Err(WriteError::InvalidPhase { .. })
        ));
        drop(writer);

        let n_ops = sink.ops().len();
        assert_eq!(
            &sink.ops()[n_ops - 5..],
            &[
                SpecSinkOp::SetRowHidden(2),
                SpecSinkOp::SetRowHidden(4),
                SpecSinkOp::SetColumnHidden(1),
                SpecSinkOp::SetFreezePanes { n_rows: 1, n_cols: 0 },
                SpecSinkOp::ProtectSheet,
            ]
        );
    }

    #[test]
    fn test_finalize_rejects_out_of_range_directives() {
        let mut sink = build_sink();
        let table = build_table(
            &["Name"],
            vec![vec![text("ana")], vec![text("bo")]],
        );

        let mut writer =
            TableWriter::begin(&mut sink, "Report", SpecSheetWriteOptions::default())
                .expect("begin");
        writer.write_header(&table, None).expect("header");
        writer
            .write_rows(&table, &SpecFormatRules::default())
            .expect("rows");

        assert!(matches!(
            writer.finalize(&SpecFinalizeDirectives {
                rows_hidden: vec![2],
                ..SpecFinalizeDirectives::default()
            }),
            Err(WriteError::InvalidArgument(_))
        ));
        assert!(matches!(
            writer.finalize(&SpecFinalizeDirectives {
                cols_hidden: vec![1],
                ..SpecFinalizeDirectives::default()
            }),
            Err(WriteError::InvalidArgument(_))
        ));
        // A failed finalize leaves the writer usable.
        assert_eq!(writer.phase(), EnumWriterPhase::WritingRows);
        writer
            .finalize(&SpecFinalizeDirectives::default())
            .expect("finalize");
        drop(writer);

        assert!(!sink
            .ops()
            .iter()
            .any(|op| matches!(op, SpecSinkOp::SetRowHidden(_) | SpecSinkOp::SetColumnHidden(_))));
    }

    #[test]
    fn test_end_to_end_xlsx_sheet() {
        let dir_tmp = tempdir().expect("tempdir");
        let path_file_out = dir_tmp.path().join("report.xlsx");
        let mut sink = SinkXlsx::new(path_file_out.clone());
        sink.register_formats(&derive_default_formats())
            .expect("register formats");

        let table = build_table(
            &["Name", "Score"],
            vec![
                vec![text("ana"), EnumCellValue::Number(0.91)],
                vec![text("bo"), EnumCellValue::Number(0.42)],
            ],
        );
        let rules = SpecFormatRules {
            fmt_name_by_col: BTreeMap::from([("Score".to_string(), "percent".to_string())]),
            fmt_name_default: Some("text".to_string()),
            ..SpecFormatRules::default()
        };

        {
            let mut writer =
                TableWriter::begin(&mut sink, "Scores", SpecSheetWriteOptions::default())
                    .expect("begin");
            writer.write_header(&table, Some("header")).expect("header");
            writer.write_rows(&table, &rules).expect("rows");
            writer
                .apply_conditional_format(
                    "B{start}:B{end}",
                    &SpecConditionalFormat {
                        rule: EnumConditionalRule::GreaterThan(0.5),
                        fmt_name: "percent".to_string(),
                    },
                )
                .expect("conditional");
            writer
                .finalize(&SpecFinalizeDirectives {
                    freeze_panes: Some(SpecFreezePanes::header()),
                    if_protect: true,
                    ..SpecFinalizeDirectives::default()
                })
                .expect("finalize");
            assert_eq!(writer.report().cnt_rows_data, 2);
            assert_eq!(writer.report().cnt_cells_written, 6);
        }

        sink.close().expect("close");
        let meta = std::fs::metadata(&path_file_out).expect("stat output");
        assert!(meta.len() > 0);
    }
}
