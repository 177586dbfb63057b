//! Stateless helper utilities used by the sheet writer.

use globset::{GlobBuilder, GlobMatcher};
use lockit_table::EnumCellValue;

use crate::conf::{N_LEN_EXCEL_SHEET_NAME_MAX, TUP_EXCEL_ILLEGAL, TUP_HEADER_IGNORE_DEFAULT};
use crate::spec::{EnumWriteOp, SpecExtraColumn, SpecValuePolicy, WriteError};

////////////////////////////////////////////////////////////////////////////////
// #region WriteOpClassification

/// Convert a non-finite number to its policy text; finite values keep their
/// plain decimal form.
pub fn convert_nan_inf_to_str(x: f64, value_policy: &SpecValuePolicy) -> String {
    if x.is_nan() {
        return value_policy.nan_str.clone();
    }
    if x.is_infinite() {
        return if x.is_sign_positive() {
            value_policy.posinf_str.clone()
        } else {
            value_policy.neginf_str.clone()
        };
    }
    x.to_string()
}

/// Classify one cell value into its write operation.
///
/// Applied exactly once per value: text starting with `=` becomes a formula,
/// empty text a blank, non-finite numbers fall back to policy text. Numeric
/// zero stays a number; only the empty string blanks out.
pub fn classify_write_op(value: &EnumCellValue, value_policy: &SpecValuePolicy) -> EnumWriteOp {
    match value {
        EnumCellValue::Blank => EnumWriteOp::Blank,
        EnumCellValue::Boolean(b) => EnumWriteOp::Boolean(*b),
        EnumCellValue::Number(n) => {
            if n.is_finite() {
                EnumWriteOp::Number(*n)
            } else {
                EnumWriteOp::Text(convert_nan_inf_to_str(*n, value_policy))
            }
        }
        EnumCellValue::Text(s) => {
            if s.is_empty() {
                EnumWriteOp::Blank
            } else if s.starts_with('=') {
                EnumWriteOp::Formula(s.clone())
            } else {
                EnumWriteOp::Text(s.clone())
            }
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region HeaderPlanning

/// Compiled case-insensitive header ignore globs.
#[derive(Debug, Clone)]
pub(crate) struct SpecHeaderIgnoreRules {
    l_matchers: Vec<GlobMatcher>,
}

impl SpecHeaderIgnoreRules {
    /// Compile `patterns`; `None` selects [`TUP_HEADER_IGNORE_DEFAULT`].
    pub(crate) fn compile(patterns: Option<&[String]>) -> Result<Self, WriteError> {
        let l_patterns: Vec<String> = match patterns {
            Some(vals) => vals.to_vec(),
            None => TUP_HEADER_IGNORE_DEFAULT
                .iter()
                .map(ToString::to_string)
                .collect(),
        };

        let mut l_matchers = Vec::with_capacity(l_patterns.len());
        for pattern in &l_patterns {
            let matcher = GlobBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| {
                    WriteError::InvalidArgument(format!(
                        "Invalid header ignore pattern {pattern:?}: {e}"
                    ))
                })?
                .compile_matcher();
            l_matchers.push(matcher);
        }

        Ok(Self { l_matchers })
    }

    /// Whether `name` is dropped from the written output.
    pub(crate) fn is_ignored(&self, name: &str) -> bool {
        self.l_matchers.iter().any(|matcher| matcher.is_match(name))
    }
}

/// One written output column: header name plus optional source column index
/// (`None` marks a derived extra column).
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SpecWrittenColumn {
    pub(crate) name: String,
    pub(crate) idx_src: Option<usize>,
}

/// Plan the written columns: source columns minus ignored names (compacted,
/// source order kept), then the extra columns. Returns the plan and the
/// skipped source names.
pub(crate) fn plan_written_columns(
    columns: &[String],
    rules_ignore: &SpecHeaderIgnoreRules,
    cols_extra: &[SpecExtraColumn],
) -> (Vec<SpecWrittenColumn>, Vec<String>) {
    let mut l_cols_written = Vec::with_capacity(columns.len() + cols_extra.len());
    let mut l_cols_skipped = Vec::new();

    for (n_idx, c_name) in columns.iter().enumerate() {
        if rules_ignore.is_ignored(c_name) {
            l_cols_skipped.push(c_name.clone());
        } else {
            l_cols_written.push(SpecWrittenColumn {
                name: c_name.clone(),
                idx_src: Some(n_idx),
            });
        }
    }
    for spec_col_extra in cols_extra {
        l_cols_written.push(SpecWrittenColumn {
            name: spec_col_extra.name.clone(),
            idx_src: None,
        });
    }

    (l_cols_written, l_cols_skipped)
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region SheetNormalization

/// Replace invalid chars and trim to a valid Excel sheet name.
pub fn sanitize_sheet_name(name: &str, replace_to: &str) -> String {
    let mut c_name = name.to_string();
    for c_illegal in TUP_EXCEL_ILLEGAL {
        c_name = c_name.replace(c_illegal, replace_to);
    }
    c_name = c_name.trim().to_string();
    if c_name.is_empty() {
        c_name = "Sheet".to_string();
    }

    c_name.chars().take(N_LEN_EXCEL_SHEET_NAME_MAX).collect()
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
