//! SQL rendering of culture queries
//!
//! Produces a parameterized `WHERE` clause for PostgreSQL. Placeholders are
//! numbered in predicate order starting at `$1`.

use crate::query::{CultureQuery, Predicate};
use antibug_core::SubjectKind;

/// Table holding culture records.
pub const CULTURES_TABLE: &str = "cultures";

/// Columns selected for a [`antibug_core::CultureRecord`], in row order.
pub const CULTURE_COLUMNS: &[&str] = &[
    "culture_id",
    "lab_tech_id",
    "facility_id",
    "county_code",
    "sub_county_code",
    "patient_id",
    "patient_gender",
    "patient_age",
    "culture_source",
    "test_method",
    "pathogens_found",
    "antimicrobials_used",
    "culture_results",
    "results_timestamp_sec",
];

/// A bound parameter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlParam {
    BigInt(i64),
    Int(i32),
    Text(String),
    TextArray(Vec<String>),
}

/// A rendered `WHERE` clause and its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlWhere {
    pub clause: String,
    pub params: Vec<SqlParam>,
}

/// JSONB id-list column checked by a membership predicate.
pub fn subject_column(kind: SubjectKind) -> &'static str {
    match kind {
        SubjectKind::Pathogen => "pathogens_found",
        SubjectKind::Antimicrobial => "antimicrobials_used",
    }
}

/// Render the query into a `WHERE` clause body.
///
/// An unrestricted query renders as `TRUE`.
pub fn render_where(query: &CultureQuery) -> SqlWhere {
    let mut clauses = Vec::with_capacity(query.predicates().len());
    let mut params = Vec::new();

    for predicate in query.predicates() {
        let next = params.len() + 1;
        match predicate {
            Predicate::ResultsSince { min_timestamp_sec } => {
                clauses.push(format!("results_timestamp_sec >= ${next}"));
                params.push(SqlParam::BigInt(*min_timestamp_sec));
            }
            Predicate::RegionIn { field, values } => {
                clauses.push(format!("{} = ANY(${next})", field.column()));
                params.push(SqlParam::TextArray(values.clone()));
            }
            Predicate::GenderIn(genders) => {
                clauses.push(format!("patient_gender = ANY(${next})"));
                params.push(SqlParam::TextArray(
                    genders.iter().map(|g| g.to_string()).collect(),
                ));
            }
            Predicate::AgeBetween {
                min_years,
                max_years,
            } => {
                clauses.push(format!(
                    "patient_age BETWEEN ${} AND ${}",
                    next,
                    next + 1
                ));
                params.push(SqlParam::Int(*min_years));
                params.push(SqlParam::Int(*max_years));
            }
            Predicate::SubjectMember { kind, id } => {
                clauses.push(format!("{} ? ${next}", subject_column(*kind)));
                params.push(SqlParam::Text(id.clone()));
            }
        }
    }

    let clause = if clauses.is_empty() {
        "TRUE".to_string()
    } else {
        clauses.join(" AND ")
    };

    SqlWhere { clause, params }
}

/// Full `SELECT` statement for the query.
pub fn render_select(query: &CultureQuery) -> SqlWhere {
    let SqlWhere { clause, params } = render_where(query);
    SqlWhere {
        clause: format!(
            "SELECT {} FROM {} WHERE {}",
            CULTURE_COLUMNS.join(", "),
            CULTURES_TABLE,
            clause
        ),
        params,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use antibug_core::{AdvancedFilter, Filter, Gender, PastDuration, RegionScope, SubjectRef};
    use chrono::DateTime;

    #[test]
    fn test_unrestricted_query_renders_true() {
        let rendered = render_where(&CultureQuery::default());
        assert_eq!(rendered.clause, "TRUE");
        assert!(rendered.params.is_empty());
    }

    #[test]
    fn test_placeholders_follow_predicate_order() {
        let filter = Filter {
            past_duration: PastDuration::PastOneYear,
            region_scope: RegionScope::County,
            scope_values: vec!["047".to_string()],
            input_values: vec![SubjectRef::new("p1", "E. coli")],
            advanced: true,
            advanced_filter: Some(AdvancedFilter {
                gender: Gender::Female,
                age_min_days: 365,
                age_max_days: 3650,
            }),
        };
        let now = DateTime::from_timestamp(1_000_000_000, 0).unwrap();
        let query = CultureQuery::from_filter(&filter, now)
            .unwrap()
            .with_subject(SubjectKind::Pathogen, "p1");

        let rendered = render_where(&query);
        assert_eq!(
            rendered.clause,
            "results_timestamp_sec >= $1 AND county_code = ANY($2) \
             AND patient_gender = ANY($3) AND patient_age BETWEEN $4 AND $5 \
             AND pathogens_found ? $6"
        );
        assert_eq!(
            rendered.params,
            vec![
                SqlParam::BigInt(1_000_000_000 - 360 * 24 * 60 * 60),
                SqlParam::TextArray(vec!["047".to_string()]),
                SqlParam::TextArray(vec!["female".to_string()]),
                SqlParam::Int(1),
                SqlParam::Int(10),
                SqlParam::Text("p1".to_string()),
            ]
        );
    }

    #[test]
    fn test_select_statement() {
        let query = CultureQuery::default().with_subject(SubjectKind::Antimicrobial, "a1");
        let rendered = render_select(&query);
        assert!(rendered.clause.starts_with("SELECT culture_id, lab_tech_id"));
        assert!(rendered.clause.ends_with("FROM cultures WHERE antimicrobials_used ? $1"));
    }
}
