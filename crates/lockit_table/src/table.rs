//! Rectangular table model and DataFrame ingestion.

use std::io::Cursor;

use polars::prelude::{DataFrame, IpcReader, SerReader};

use crate::spec::{EnumCellValue, TableError};
use crate::util::{convert_any_value, validate_unique_columns};

/// Ordered named columns over ordered rows of [`EnumCellValue`].
///
/// Column names are unique and every row holds exactly one value per
/// declared column.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    l_columns: Vec<String>,
    l_rows: Vec<Vec<EnumCellValue>>,
}

impl Table {
    /// Create an empty table with the given column names.
    pub fn new(columns: Vec<String>) -> Result<Self, TableError> {
        validate_unique_columns(&columns)?;
        Ok(Self {
            l_columns: columns,
            l_rows: Vec::new(),
        })
    }

    /// Number of declared columns.
    pub fn width(&self) -> usize {
        self.l_columns.len()
    }

    /// Number of rows.
    pub fn height(&self) -> usize {
        self.l_rows.len()
    }

    /// Declared column names in order.
    pub fn columns(&self) -> &[String] {
        &self.l_columns
    }

    /// Zero-based index of a column name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.l_columns.iter().position(|c_name| c_name == name)
    }

    /// Rows in insertion order.
    pub fn rows(&self) -> &[Vec<EnumCellValue>] {
        &self.l_rows
    }

    /// One cell by zero-based row/column index.
    pub fn cell(&self, idx_row: usize, idx_col: usize) -> Option<&EnumCellValue> {
        self.l_rows.get(idx_row).and_then(|row| row.get(idx_col))
    }

    /// Append one row. Short rows are padded with [`EnumCellValue::Blank`];
    /// rows wider than the table are rejected.
    pub fn push_row(&mut self, row: Vec<EnumCellValue>) -> Result<(), TableError> {
        if row.len() > self.l_columns.len() {
            return Err(TableError::RowTooWide {
                width_row: row.len(),
                width_table: self.l_columns.len(),
            });
        }

        let mut row = row;
        row.resize(self.l_columns.len(), EnumCellValue::Blank);
        self.l_rows.push(row);
        Ok(())
    }

    /// Append one column with exactly one value per existing row.
    pub fn add_column(
        &mut self,
        name: String,
        values: Vec<EnumCellValue>,
    ) -> Result<(), TableError> {
        if self.l_columns.contains(&name) {
            return Err(TableError::DuplicateColumns(format!(
                "Duplicate column names detected: {name:?} already exists"
            )));
        }
        if values.len() != self.l_rows.len() {
            return Err(TableError::HeightMismatch {
                height_left: self.l_rows.len(),
                height_right: values.len(),
            });
        }

        self.l_columns.push(name);
        for (row, value) in self.l_rows.iter_mut().zip(values) {
            row.push(value);
        }
        Ok(())
    }

    /// Column-wise join: append all of `other`'s columns to the right.
    ///
    /// Heights must match and the combined column names must stay unique.
    pub fn append_right(&mut self, other: Table) -> Result<(), TableError> {
        if other.height() != self.height() {
            return Err(TableError::HeightMismatch {
                height_left: self.height(),
                height_right: other.height(),
            });
        }

        let mut l_columns_joined = self.l_columns.clone();
        l_columns_joined.extend(other.l_columns.iter().cloned());
        validate_unique_columns(&l_columns_joined)?;

        self.l_columns = l_columns_joined;
        for (row, row_other) in self.l_rows.iter_mut().zip(other.l_rows) {
            row.extend(row_other);
        }
        Ok(())
    }

    /// Build a table from an in-memory DataFrame.
    ///
    /// Nulls become [`EnumCellValue::Blank`]; booleans and numerics keep
    /// their shape; any other dtype is folded to its text form.
    pub fn from_dataframe(df: &DataFrame) -> Result<Self, TableError> {
        let l_colnames: Vec<String> = df
            .get_column_names_str()
            .into_iter()
            .map(ToString::to_string)
            .collect();
        validate_unique_columns(&l_colnames)?;

        let n_height = df.height();
        let l_cols = df.get_columns();

        let mut table = Self {
            l_columns: l_colnames,
            l_rows: Vec::with_capacity(n_height),
        };
        for n_idx_row in 0..n_height {
            let mut row = Vec::with_capacity(l_cols.len());
            for col in l_cols {
                let value = col.get(n_idx_row).map_err(|err| {
                    TableError::DataFrameDecodeFailed(format!(
                        "Failed to access cell value: {err}"
                    ))
                })?;
                row.push(convert_any_value(value));
            }
            table.l_rows.push(row);
        }

        Ok(table)
    }

    /// Build a table from Polars IPC payload bytes.
    pub fn from_ipc_bytes(v_ipc_df: &[u8]) -> Result<Self, TableError> {
        let df = IpcReader::new(Cursor::new(v_ipc_df))
            .finish()
            .map_err(|err| {
                TableError::DataFrameDecodeFailed(format!(
                    "Failed to read IPC DataFrame bytes: {err}"
                ))
            })?;
        Self::from_dataframe(&df)
    }
}
