//! Filter normalization into culture store queries
//!
//! A [`CultureQuery`] is a conjunction of [`Predicate`]s derived from a
//! validated [`Filter`]. It can be evaluated against a record in memory or
//! rendered to SQL (see [`crate::sql`]).

use antibug_core::{
    AntibugResult, CultureRecord, Filter, RegionScope, SubjectId, SubjectKind, TimestampSec,
};
use chrono::{DateTime, Utc};

/// Record column a region scope restricts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionField {
    CountyCode,
    SubCountyCode,
    FacilityId,
}

impl RegionField {
    /// Column restricted by `scope`, or `None` for country-wide requests.
    pub fn for_scope(scope: RegionScope) -> Option<Self> {
        match scope {
            RegionScope::Country => None,
            RegionScope::County => Some(RegionField::CountyCode),
            RegionScope::SubCounty => Some(RegionField::SubCountyCode),
            RegionScope::Facility => Some(RegionField::FacilityId),
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            RegionField::CountyCode => "county_code",
            RegionField::SubCountyCode => "sub_county_code",
            RegionField::FacilityId => "facility_id",
        }
    }

    fn value<'a>(&self, record: &'a CultureRecord) -> &'a str {
        match self {
            RegionField::CountyCode => &record.county_code,
            RegionField::SubCountyCode => &record.sub_county_code,
            RegionField::FacilityId => &record.facility_id,
        }
    }
}

/// A single conjunct of a culture query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// `results_timestamp_sec >= min_timestamp_sec`
    ResultsSince { min_timestamp_sec: TimestampSec },
    /// Region column is one of `values`.
    RegionIn {
        field: RegionField,
        values: Vec<String>,
    },
    /// Patient gender is one of the listed values.
    GenderIn(&'static [&'static str]),
    /// Patient age in whole years, inclusive on both ends.
    AgeBetween { min_years: i32, max_years: i32 },
    /// The record's id list for `kind` contains `id`.
    SubjectMember { kind: SubjectKind, id: SubjectId },
}

impl Predicate {
    pub fn matches(&self, record: &CultureRecord) -> bool {
        match self {
            Predicate::ResultsSince { min_timestamp_sec } => {
                record.results_timestamp_sec >= *min_timestamp_sec
            }
            Predicate::RegionIn { field, values } => {
                let value = field.value(record);
                values.iter().any(|v| v == value)
            }
            Predicate::GenderIn(genders) => genders.contains(&record.patient_gender.as_str()),
            Predicate::AgeBetween {
                min_years,
                max_years,
            } => (*min_years..=*max_years).contains(&record.patient_age),
            Predicate::SubjectMember { kind, id } => {
                record.subject_ids(*kind).iter().any(|s| s == id)
            }
        }
    }
}

/// Conjunctive query over culture records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CultureQuery {
    predicates: Vec<Predicate>,
}

impl CultureQuery {
    /// Normalize a filter into a query, evaluated relative to `now`.
    ///
    /// The filter is validated first; an invalid filter yields
    /// `InvalidArgument` without building anything.
    pub fn from_filter(filter: &Filter, now: DateTime<Utc>) -> AntibugResult<Self> {
        filter.validate()?;

        let mut predicates = Vec::new();

        if let Some(window) = filter.past_duration.window_secs() {
            predicates.push(Predicate::ResultsSince {
                min_timestamp_sec: now.timestamp() - window,
            });
        }

        if let Some(field) = RegionField::for_scope(filter.region_scope) {
            predicates.push(Predicate::RegionIn {
                field,
                values: filter.scope_values.clone(),
            });
        }

        if let Some(advanced) = filter.active_advanced_filter() {
            predicates.push(Predicate::GenderIn(advanced.gender.db_values()));
            if let Some((min_years, max_years)) = advanced.age_range_years() {
                predicates.push(Predicate::AgeBetween {
                    min_years,
                    max_years,
                });
            }
        }

        Ok(Self { predicates })
    }

    /// Restrict the query to cultures indexed under the given subject.
    pub fn with_subject(mut self, kind: SubjectKind, id: impl Into<SubjectId>) -> Self {
        self.predicates.push(Predicate::SubjectMember {
            kind,
            id: id.into(),
        });
        self
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn is_unrestricted(&self) -> bool {
        self.predicates.is_empty()
    }

    /// True when every predicate holds for `record`.
    pub fn matches(&self, record: &CultureRecord) -> bool {
        self.predicates.iter().all(|p| p.matches(record))
    }
}
