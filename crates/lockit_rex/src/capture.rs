//! Named-group capture helpers.
//!
//! Patterns are compiled per call by the free functions; callers running the
//! same pattern over many values should hold a [`RexPattern`] instead.

use std::collections::BTreeMap;

use regex::Regex;

use crate::spec::RexError;

/// Compiled pattern handle for repeated capture calls.
#[derive(Debug, Clone)]
pub struct RexPattern {
    regex: Regex,
}

impl RexPattern {
    /// Compile `pattern`, surfacing compiler errors as [`RexError`].
    pub fn new(pattern: &str) -> Result<Self, RexError> {
        let regex = Regex::new(pattern).map_err(|e| RexError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self { regex })
    }

    /// Named group names in pattern declaration order.
    pub fn group_names(&self) -> Vec<String> {
        self.regex
            .capture_names()
            .flatten()
            .map(ToString::to_string)
            .collect()
    }

    /// Collect every named group across all non-overlapping matches.
    ///
    /// Each matched occurrence appends one entry per group; groups that did
    /// not participate in a match append `None`. With `if_allow_empty=false`,
    /// unmatched and empty captures are dropped instead.
    pub fn capture_all(
        &self,
        query: &str,
        if_allow_empty: bool,
    ) -> BTreeMap<String, Vec<Option<String>>> {
        let l_group_names: Vec<&str> = self.regex.capture_names().flatten().collect();

        let mut dict_captures: BTreeMap<String, Vec<Option<String>>> = BTreeMap::new();
        for caps in self.regex.captures_iter(query) {
            for c_name in &l_group_names {
                let value = caps.name(c_name).map(|m| m.as_str().to_string());
                if !if_allow_empty && value.as_deref().unwrap_or("").is_empty() {
                    continue;
                }
                dict_captures
                    .entry((*c_name).to_string())
                    .or_default()
                    .push(value);
            }
        }

        dict_captures
    }

    /// First non-empty captured value per named group (earliest match wins).
    pub fn first_captures(&self, query: &str) -> BTreeMap<String, String> {
        self.capture_all(query, false)
            .into_iter()
            .filter_map(|(c_name, l_values)| {
                l_values
                    .into_iter()
                    .flatten()
                    .next()
                    .map(|value| (c_name, value))
            })
            .collect()
    }

    /// Named groups of the first match only. `None` when `query` does not match.
    ///
    /// Groups that did not participate in the match are absent from the map.
    pub fn captures(&self, query: &str) -> Option<BTreeMap<String, String>> {
        let caps = self.regex.captures(query)?;
        let mut dict_groups = BTreeMap::new();
        for c_name in self.regex.capture_names().flatten() {
            if let Some(m) = caps.name(c_name) {
                dict_groups.insert(c_name.to_string(), m.as_str().to_string());
            }
        }
        Some(dict_groups)
    }

    /// Test whether `query` matches the pattern anchored at its start.
    pub fn is_format(&self, query: &str) -> bool {
        self.regex.find(query).is_some_and(|m| m.start() == 0)
    }
}

/// Collect every named group of `pattern` across all matches in `query`.
pub fn capture_all(
    pattern: &str,
    query: &str,
    if_allow_empty: bool,
) -> Result<BTreeMap<String, Vec<Option<String>>>, RexError> {
    Ok(RexPattern::new(pattern)?.capture_all(query, if_allow_empty))
}

/// First non-empty captured value per named group of `pattern` in `query`.
pub fn derive_first_captures(
    pattern: &str,
    query: &str,
) -> Result<BTreeMap<String, String>, RexError> {
    Ok(RexPattern::new(pattern)?.first_captures(query))
}

/// Test whether `query` matches `pattern` anchored at its start.
pub fn is_format(pattern: &str, query: &str) -> Result<bool, RexError> {
    Ok(RexPattern::new(pattern)?.is_format(query))
}
