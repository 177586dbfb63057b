//! Column-index codec and cell/range address arithmetic.

use std::collections::BTreeMap;
use std::fmt;

use lockit_rex::RexPattern;

use crate::conf::{N_NCOLS_EXCEL_MAX, N_NROWS_EXCEL_MAX};
use crate::spec::WriteError;

/// Range address pattern; `sheet` qualifier and `right`/`bottom` corner are
/// optional, so a bare cell like `B2` parses as a one-cell range.
const PATTERN_RANGE: &str =
    r"^(?:(?P<sheet>[^!]+)!)?(?P<left>[A-Za-z]+)(?P<top>[0-9]+)(?::(?P<right>[A-Za-z]+)(?P<bottom>[0-9]+))?$";

////////////////////////////////////////////////////////////////////////////////
// #region ColumnIndexCodec

/// Convert a 0-based column index to its letter label (`0 -> "A"`,
/// `25 -> "Z"`, `26 -> "AA"`, `701 -> "ZZ"`, `702 -> "AAA"`).
///
/// Bijective base-26; total over all `usize` inputs. Sheet-space limits are
/// enforced by [`SpecCellAddress`], not here.
pub fn convert_index_to_label(idx_col: usize) -> String {
    let mut c_label = String::new();
    let mut n_rem = idx_col;
    loop {
        c_label.insert(0, char::from(b'A' + (n_rem % 26) as u8));
        n_rem /= 26;
        if n_rem == 0 {
            break;
        }
        n_rem -= 1;
    }
    c_label
}

/// Convert a letter label back to its 0-based column index. Exact inverse of
/// [`convert_index_to_label`]; case-insensitive.
pub fn convert_label_to_index(label: &str) -> Result<usize, WriteError> {
    if label.is_empty() {
        return Err(WriteError::InvalidArgument(
            "Column label must not be empty.".to_string(),
        ));
    }

    let mut n_value: usize = 0;
    for chr in label.chars() {
        if !chr.is_ascii_alphabetic() {
            return Err(WriteError::InvalidArgument(format!(
                "Column label must be ASCII letters only: {label:?}"
            )));
        }
        let n_digit = (chr.to_ascii_uppercase() as u8 - b'A') as usize + 1;
        n_value = n_value
            .checked_mul(26)
            .and_then(|v| v.checked_add(n_digit))
            .ok_or_else(|| {
                WriteError::InvalidArgument(format!("Column label too long: {label:?}"))
            })?;
    }

    Ok(n_value - 1)
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region CellAddress

/// One cell position: 0-based column index, 1-based row number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SpecCellAddress {
    /// Zero-based column index.
    pub idx_col: usize,
    /// One-based row number.
    pub num_row: usize,
}

impl SpecCellAddress {
    /// Validate coordinates against the Excel sheet space.
    pub fn new(idx_col: usize, num_row: usize) -> Result<Self, WriteError> {
        if num_row == 0 {
            return Err(WriteError::InvalidAddress(
                "Row number is 1-based; 0 is not addressable.".to_string(),
            ));
        }
        if num_row > N_NROWS_EXCEL_MAX {
            return Err(WriteError::InvalidAddress(format!(
                "Row number {num_row} exceeds Excel limit {N_NROWS_EXCEL_MAX}."
            )));
        }
        if idx_col >= N_NCOLS_EXCEL_MAX {
            return Err(WriteError::InvalidAddress(format!(
                "Column index {idx_col} exceeds Excel limit {}.",
                N_NCOLS_EXCEL_MAX - 1
            )));
        }
        Ok(Self { idx_col, num_row })
    }

    /// `"A1"` style address text.
    pub fn format(&self) -> String {
        format!("{}{}", convert_index_to_label(self.idx_col), self.num_row)
    }
}

impl fmt::Display for SpecCellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format())
    }
}

/// Compose `"A1"` style text from a 0-based column and 1-based row.
pub fn derive_cell_address(idx_col: usize, num_row: usize) -> Result<String, WriteError> {
    Ok(SpecCellAddress::new(idx_col, num_row)?.format())
}

/// Parse `"A1"` style text into a validated address. A leading `Sheet!`
/// qualifier is tolerated and dropped; range text is rejected.
pub fn parse_cell_address(text: &str) -> Result<SpecCellAddress, WriteError> {
    let range = parse_range_address(text)?;
    if range.start != range.end {
        return Err(WriteError::InvalidAddress(format!(
            "Expected a single cell address, got a range: {text:?}"
        )));
    }
    Ok(range.start)
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region RangeAddress

/// Rectangular cell range, inclusive on both corners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecRangeAddress {
    /// Top-left corner.
    pub start: SpecCellAddress,
    /// Bottom-right corner.
    pub end: SpecCellAddress,
}

impl SpecRangeAddress {
    /// Validate corner ordering (start row/column <= end row/column).
    pub fn new(start: SpecCellAddress, end: SpecCellAddress) -> Result<Self, WriteError> {
        if end.num_row < start.num_row || end.idx_col < start.idx_col {
            return Err(WriteError::InvalidAddress(format!(
                "Range corners out of order: {} then {}",
                start.format(),
                end.format()
            )));
        }
        Ok(Self { start, end })
    }

    /// Rows spanned.
    pub fn height(&self) -> usize {
        self.end.num_row - self.start.num_row + 1
    }

    /// Columns spanned.
    pub fn width(&self) -> usize {
        self.end.idx_col - self.start.idx_col + 1
    }

    /// `"A1:B2"` style text; single-cell ranges collapse to `"A1"`.
    pub fn format(&self) -> String {
        if self.start == self.end {
            return self.start.format();
        }
        format!("{}:{}", self.start.format(), self.end.format())
    }
}

impl fmt::Display for SpecRangeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format())
    }
}

/// Parse `"A1"`, `"A1:B2"`, or `"Sheet!A1:B2"` text into a validated range.
pub fn parse_range_address(text: &str) -> Result<SpecRangeAddress, WriteError> {
    let rex_pattern =
        RexPattern::new(PATTERN_RANGE).map_err(|e| WriteError::InvalidArgument(e.to_string()))?;
    let dict_groups = rex_pattern
        .captures(text)
        .ok_or_else(|| WriteError::InvalidAddress(format!("Unrecognized range address: {text:?}")))?;

    let start = derive_address_from_captures(&dict_groups, "left", "top", text)?;
    let end = if dict_groups.contains_key("right") {
        derive_address_from_captures(&dict_groups, "right", "bottom", text)?
    } else {
        start
    };
    SpecRangeAddress::new(start, end)
}

fn derive_address_from_captures(
    dict_groups: &BTreeMap<String, String>,
    key_col: &str,
    key_row: &str,
    text: &str,
) -> Result<SpecCellAddress, WriteError> {
    let c_label = dict_groups.get(key_col).ok_or_else(|| {
        WriteError::InvalidAddress(format!("Unrecognized range address: {text:?}"))
    })?;
    let c_row = dict_groups.get(key_row).ok_or_else(|| {
        WriteError::InvalidAddress(format!("Unrecognized range address: {text:?}"))
    })?;

    let idx_col = convert_label_to_index(c_label)?;
    let num_row = c_row
        .parse::<usize>()
        .map_err(|_| WriteError::InvalidAddress(format!("Unparseable row number in {text:?}")))?;
    SpecCellAddress::new(idx_col, num_row)
}

/// Replace `{start}`/`{end}` placeholders with 1-based row numbers.
pub fn resolve_range_template(
    template: &str,
    num_row_start: usize,
    num_row_end: usize,
) -> String {
    template
        .replace("{start}", &num_row_start.to_string())
        .replace("{end}", &num_row_end.to_string())
}

/// Split a tall range into row batches of at most `rows_per_batch` rows,
/// keeping the column span.
pub fn plan_range_batches(
    range: &SpecRangeAddress,
    rows_per_batch: usize,
) -> Result<Vec<SpecRangeAddress>, WriteError> {
    if rows_per_batch == 0 {
        return Err(WriteError::InvalidArgument(
            "Arg `rows_per_batch` must be >= 1.".to_string(),
        ));
    }

    let mut l_batches = Vec::new();
    let mut num_row_cursor = range.start.num_row;
    while num_row_cursor <= range.end.num_row {
        // Rows remaining, not cursor plus batch size: the sum can overflow.
        let n_rows_batch = usize::min(rows_per_batch, range.end.num_row - num_row_cursor + 1);
        l_batches.push(SpecRangeAddress {
            start: SpecCellAddress {
                idx_col: range.start.idx_col,
                num_row: num_row_cursor,
            },
            end: SpecCellAddress {
                idx_col: range.end.idx_col,
                num_row: num_row_cursor + n_rows_batch - 1,
            },
        });
        num_row_cursor += n_rows_batch;
    }

    Ok(l_batches)
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
