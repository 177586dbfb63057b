use std::collections::{BTreeMap, BTreeSet};

use polars::prelude::AnyValue;

use crate::spec::{EnumCellValue, TableError};

/// Validate that `columns` has no duplicated names.
pub(crate) fn validate_unique_columns(columns: &[String]) -> Result<(), TableError> {
    if columns.len() == columns.iter().collect::<BTreeSet<_>>().len() {
        return Ok(());
    }

    let mut dict_pos: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (n_idx, c_name) in columns.iter().enumerate() {
        dict_pos.entry(c_name).or_default().push(n_idx);
    }

    let c_msg = dict_pos
        .iter()
        .filter_map(|(c_name, l_pos)| {
            if l_pos.len() > 1 {
                Some(format!(
                    "{c_name:?} x{} at indices {:?}",
                    l_pos.len(),
                    l_pos
                ))
            } else {
                None
            }
        })
        .collect::<Vec<_>>()
        .join("; ");

    Err(TableError::DuplicateColumns(format!(
        "Duplicate column names detected: {c_msg}"
    )))
}

pub(crate) fn calculate_worker_limit(num_workers_max: Option<usize>) -> usize {
    let n_cpu = std::thread::available_parallelism()
        .map(|v| v.get())
        .unwrap_or(1);

    match num_workers_max {
        Some(n) => n.clamp(1, n_cpu),
        None => n_cpu.clamp(1, 8),
    }
}

pub(crate) fn convert_any_value(value: AnyValue<'_>) -> EnumCellValue {
    match value {
        AnyValue::Null => EnumCellValue::Blank,
        AnyValue::String(val) => EnumCellValue::Text(val.to_string()),
        AnyValue::StringOwned(val) => EnumCellValue::Text(val.to_string()),
        AnyValue::Boolean(val) => EnumCellValue::Boolean(val),
        AnyValue::UInt8(val) => EnumCellValue::Number(val as f64),
        AnyValue::UInt16(val) => EnumCellValue::Number(val as f64),
        AnyValue::UInt32(val) => EnumCellValue::Number(val as f64),
        AnyValue::UInt64(val) => EnumCellValue::Number(val as f64),
        AnyValue::Int8(val) => EnumCellValue::Number(val as f64),
        AnyValue::Int16(val) => EnumCellValue::Number(val as f64),
        AnyValue::Int32(val) => EnumCellValue::Number(val as f64),
        AnyValue::Int64(val) => EnumCellValue::Number(val as f64),
        AnyValue::Int128(val) => EnumCellValue::Number(val as f64),
        AnyValue::Float32(val) => EnumCellValue::Number(val as f64),
        AnyValue::Float64(val) => EnumCellValue::Number(val),
        _ => EnumCellValue::Text(value.to_string()),
    }
}

/// Text form used when a cell feeds a capture pattern.
pub fn derive_query_text(value: &EnumCellValue) -> String {
    match value {
        EnumCellValue::Blank => String::new(),
        EnumCellValue::Text(val) => val.clone(),
        EnumCellValue::Number(val) => val.to_string(),
        EnumCellValue::Boolean(val) => if *val { "true" } else { "false" }.to_string(),
    }
}
