//! `lockit_io_xlsx` v1:
//! Cell addressing and phased sheet-writing kernel.
//!
//! - `addr`   : column-index codec and cell/range addresses
//! - `conf`   : constants and default presets
//! - `sink`   : workbook sink trait and backends
//! - `spec`   : specs/models/options
//! - `util`   : pure helper functions
//! - `writer` : phased table writer

pub mod addr;
pub mod conf;
pub mod sink;
pub mod spec;
pub mod util;
pub mod writer;

pub use addr::{
    SpecCellAddress, SpecRangeAddress, convert_index_to_label, convert_label_to_index,
    derive_cell_address, parse_cell_address, parse_range_address, plan_range_batches,
    resolve_range_template,
};
pub use conf::{
    N_LEN_EXCEL_SHEET_NAME_MAX, N_NCOLS_EXCEL_MAX, N_NROWS_EXCEL_MAX, TUP_EXCEL_ILLEGAL,
    TUP_HEADER_IGNORE_DEFAULT, derive_default_formats, derive_default_write_options,
};
pub use sink::{FormatHandle, SinkRecorder, SinkXlsx, SpecSinkOp, WorkbookSink};
pub use spec::{
    EnumConditionalRule, EnumExtraColumnRule, EnumWriteOp, EnumWriterPhase, SpecCellFormat,
    SpecConditionalFormat, SpecExtraColumn, SpecFinalizeDirectives, SpecFormatRules,
    SpecFreezePanes, SpecSheetWriteOptions, SpecValuePolicy, SpecWriteReport, WriteError,
};
pub use util::{classify_write_op, convert_nan_inf_to_str, sanitize_sheet_name};
pub use writer::TableWriter;
