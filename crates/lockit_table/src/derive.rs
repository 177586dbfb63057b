//! Regex-derived column expansion.

use std::collections::BTreeMap;

use lockit_rex::RexPattern;
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;

use crate::spec::{EnumCellValue, SpecColumnsByRegexOptions, TableError};
use crate::table::Table;
use crate::util::{calculate_worker_limit, derive_query_text, validate_unique_columns};

impl Table {
    /// Append one column per named group of `pattern`, captured from the text
    /// form of `source_column` row by row.
    ///
    /// Per row, each group takes its first non-empty capture; rows without a
    /// capture yield [`EnumCellValue::Blank`]. [`SpecColumnsByRegexOptions`]
    /// refines the result:
    /// - `column_mappings` rewrites captured values through a lookup table
    ///   (unmapped captures become blank),
    /// - `cols_boolean` folds a column to capture presence (after mapping),
    /// - `column_order` selects and orders which groups are appended,
    /// - `num_workers_max` bounds the capture worker pool.
    ///
    /// The table is only mutated once all derived names are validated.
    pub fn add_columns_by_regex(
        &mut self,
        pattern: &str,
        source_column: &str,
        options: &SpecColumnsByRegexOptions,
    ) -> Result<(), TableError> {
        let idx_src = self
            .column_index(source_column)
            .ok_or_else(|| TableError::ColumnNotFound(source_column.to_string()))?;
        let rex_pattern = RexPattern::new(pattern)
            .map_err(|e| TableError::InvalidPattern(e.to_string()))?;

        let l_groups = rex_pattern.group_names();
        let l_names_derived: Vec<String> = match &options.column_order {
            Some(l_order) => {
                for c_name in l_order {
                    if !l_groups.contains(c_name) {
                        return Err(TableError::ColumnNotFound(c_name.clone()));
                    }
                }
                l_order.clone()
            }
            None => l_groups,
        };
        validate_unique_columns(&l_names_derived)?;
        for c_name in &l_names_derived {
            if self.column_index(c_name).is_some() {
                return Err(TableError::DuplicateColumns(format!(
                    "Duplicate column names detected: {c_name:?} already exists"
                )));
            }
        }

        let l_queries: Vec<String> = self
            .rows()
            .iter()
            .map(|row| derive_query_text(&row[idx_src]))
            .collect();
        let n_workers_max = calculate_worker_limit(options.num_workers_max);
        let l_captures = derive_captures_per_row(&rex_pattern, &l_queries, n_workers_max);

        for c_name in &l_names_derived {
            let dict_mapping = options.column_mappings.get(c_name);
            let if_boolean = options.cols_boolean.iter().any(|c| c == c_name);

            let l_values: Vec<EnumCellValue> = l_captures
                .iter()
                .map(|dict_captures| {
                    let value_captured = dict_captures.get(c_name).cloned();
                    let value_mapped = match dict_mapping {
                        Some(dict_mapping) => {
                            value_captured.and_then(|v| dict_mapping.get(v.as_str()).cloned())
                        }
                        None => value_captured,
                    };
                    if if_boolean {
                        EnumCellValue::Boolean(value_mapped.is_some())
                    } else {
                        value_mapped
                            .map(EnumCellValue::Text)
                            .unwrap_or(EnumCellValue::Blank)
                    }
                })
                .collect();

            self.add_column(c_name.clone(), l_values)?;
        }

        Ok(())
    }
}

fn derive_captures_per_row(
    rex_pattern: &RexPattern,
    l_queries: &[String],
    n_workers_max: usize,
) -> Vec<BTreeMap<String, String>> {
    if n_workers_max <= 1 {
        return l_queries
            .iter()
            .map(|c_query| rex_pattern.first_captures(c_query))
            .collect();
    }

    let thread_pool = ThreadPoolBuilder::new()
        .num_threads(n_workers_max)
        .build();
    let Ok(thread_pool) = thread_pool else {
        log::warn!(
            "Failed to initialize thread pool (workers={n_workers_max}); fallback to serial capture."
        );
        return l_queries
            .iter()
            .map(|c_query| rex_pattern.first_captures(c_query))
            .collect();
    };

    thread_pool.install(|| {
        l_queries
            .par_iter()
            .map(|c_query| rex_pattern.first_captures(c_query))
            .collect::<Vec<_>>()
    })
}
