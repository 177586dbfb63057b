//! XLSX constants and default preset factories.

use std::collections::BTreeMap;

use crate::spec::{SpecCellFormat, SpecSheetWriteOptions};

/// Excel worksheet maximum row count.
pub const N_NROWS_EXCEL_MAX: usize = 1_048_576;
/// Excel worksheet maximum column count.
pub const N_NCOLS_EXCEL_MAX: usize = 16_384;
/// Excel sheet name maximum length.
pub const N_LEN_EXCEL_SHEET_NAME_MAX: usize = 31;
/// Characters not allowed in sheet names.
pub const TUP_EXCEL_ILLEGAL: [&str; 7] = ["*", ":", "?", "/", "\\", "[", "]"];
/// Default header ignore globs, matched case-insensitively against column
/// names. `unnamed*` drops the placeholder columns tabular exports produce
/// for unlabeled indices (`Unnamed: 0` and friends).
pub const TUP_HEADER_IGNORE_DEFAULT: [&str; 2] = ["index", "unnamed*"];

/// Build the default named format presets callers register on a sink.
pub fn derive_default_formats() -> BTreeMap<String, SpecCellFormat> {
    let cfg_base_fmt_spec = SpecCellFormat {
        font_name: Some("Times New Roman".to_string()),
        font_size: Some(11),
        border: Some(1),
        align: Some("left".to_string()),
        valign: Some("vcenter".to_string()),
        ..Default::default()
    };

    let mut dict_fmt = BTreeMap::new();
    dict_fmt.insert("text".to_string(), cfg_base_fmt_spec.clone());
    dict_fmt.insert(
        "header".to_string(),
        cfg_base_fmt_spec.with_(SpecCellFormat {
            bold: Some(true),
            align: Some("center".to_string()),
            ..Default::default()
        }),
    );
    dict_fmt.insert(
        "integer".to_string(),
        cfg_base_fmt_spec.with_(SpecCellFormat {
            num_format: Some("0".to_string()),
            ..Default::default()
        }),
    );
    dict_fmt.insert(
        "decimal".to_string(),
        cfg_base_fmt_spec.with_(SpecCellFormat {
            num_format: Some("0.0000".to_string()),
            ..Default::default()
        }),
    );
    dict_fmt.insert(
        "percent".to_string(),
        cfg_base_fmt_spec.with_(SpecCellFormat {
            num_format: Some("0.00%".to_string()),
            ..Default::default()
        }),
    );
    dict_fmt.insert(
        "locked".to_string(),
        cfg_base_fmt_spec.with_(SpecCellFormat {
            if_locked: Some(true),
            ..Default::default()
        }),
    );
    dict_fmt.insert(
        "hidden".to_string(),
        cfg_base_fmt_spec.with_(SpecCellFormat {
            if_locked: Some(true),
            if_hidden: Some(true),
            ..Default::default()
        }),
    );

    dict_fmt
}

/// Build default per-sheet write options.
pub fn derive_default_write_options() -> SpecSheetWriteOptions {
    SpecSheetWriteOptions::default()
}
