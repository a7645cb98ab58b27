//! Antibiogram request filter and its validation
//!
//! A [`Filter`] is the declarative request shape shared by every report
//! kind. It is validated once per request and discarded afterwards.

use crate::{
    AntibugError, AntibugResult, Gender, PastDuration, RegionScope, SubjectId, ValidationError,
};
use serde::{Deserialize, Serialize};

/// Days per year used when comparing patient ages.
pub const DAYS_PER_YEAR: i32 = 365;

/// A subject requested in a report.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubjectRef {
    pub id: SubjectId,
    pub name: String,
}

impl SubjectRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Demographic constraints applied when `Filter::advanced` is set.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AdvancedFilter {
    pub gender: Gender,
    pub age_min_days: i32,
    pub age_max_days: i32,
}

impl AdvancedFilter {
    /// Age bounds in whole years, or `None` when the range is empty.
    ///
    /// Uses truncating division, so ages are compared in whole years.
    pub fn age_range_years(&self) -> Option<(i32, i32)> {
        if self.age_min_days < self.age_max_days {
            Some((
                self.age_min_days / DAYS_PER_YEAR,
                self.age_max_days / DAYS_PER_YEAR,
            ))
        } else {
            None
        }
    }
}

/// Aggregation request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default)]
    pub past_duration: PastDuration,
    #[serde(default)]
    pub region_scope: RegionScope,
    /// Region identifiers. Order is significant for cache keys.
    #[serde(default)]
    pub scope_values: Vec<String>,
    /// Subjects to report on. Order is not significant for cache keys.
    #[serde(default)]
    pub input_values: Vec<SubjectRef>,
    #[serde(default)]
    pub advanced: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advanced_filter: Option<AdvancedFilter>,
}

impl Filter {
    /// Check the request invariants.
    ///
    /// - `input_values` must not be empty
    /// - `scope_values` must not be empty unless the scope is country-wide
    pub fn validate(&self) -> AntibugResult<()> {
        if self.input_values.is_empty() {
            return Err(AntibugError::missing_field("input_values"));
        }
        if self.region_scope.requires_values() && self.scope_values.is_empty() {
            return Err(AntibugError::missing_field("scope_values"));
        }
        Ok(())
    }

    /// Resolve the subject at `index`.
    pub fn subject(&self, index: usize) -> AntibugResult<&SubjectRef> {
        self.input_values.get(index).ok_or_else(|| {
            ValidationError::SubjectIndexOutOfRange {
                index,
                len: self.input_values.len(),
            }
            .into()
        })
    }

    /// The advanced filter, only when `advanced` is switched on.
    pub fn active_advanced_filter(&self) -> Option<&AdvancedFilter> {
        if self.advanced {
            self.advanced_filter.as_ref()
        } else {
            None
        }
    }
}

/// Validate an optional filter, treating `None` as a missing request.
pub fn validate_filter(filter: Option<&Filter>) -> AntibugResult<&Filter> {
    let filter = filter.ok_or_else(|| AntibugError::missing_field("filter"))?;
    filter.validate()?;
    Ok(filter)
}
