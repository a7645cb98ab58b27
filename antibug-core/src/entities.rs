//! Record and report entities

use crate::{Label, SubjectKind, TestMethod};
use serde::{Deserialize, Serialize};

/// Identifier of a pathogen or antimicrobial.
pub type SubjectId = String;

/// Unix timestamp in seconds.
pub type TimestampSec = i64;

// ============================================================================
// LAB RECORDS
// ============================================================================

/// One antimicrobial susceptibility test inside a culture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabTestResult {
    pub pathogen_id: SubjectId,
    pub pathogen_name: String,
    pub antimicrobial_id: SubjectId,
    pub antimicrobial_name: String,
    pub susceptibility_score: f64,
    pub label: Label,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_diameter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_comment: Option<String>,
}

impl LabTestResult {
    /// Id of this result in the subject role for `kind`.
    pub fn subject_id(&self, kind: SubjectKind) -> &str {
        match kind {
            SubjectKind::Pathogen => &self.pathogen_id,
            SubjectKind::Antimicrobial => &self.antimicrobial_id,
        }
    }

    /// Id and name of the counterpart when `kind` is the subject.
    pub fn counterpart(&self, kind: SubjectKind) -> (&str, &str) {
        match kind {
            SubjectKind::Pathogen => (&self.antimicrobial_id, &self.antimicrobial_name),
            SubjectKind::Antimicrobial => (&self.pathogen_id, &self.pathogen_name),
        }
    }
}

/// A lab culture with its susceptibility results. Read-only to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CultureRecord {
    pub culture_id: String,
    pub lab_tech_id: String,
    pub facility_id: String,
    pub county_code: String,
    pub sub_county_code: String,
    pub patient_id: String,
    /// `male`, `female` or `all`
    pub patient_gender: String,
    /// Whole years
    pub patient_age: i32,
    pub culture_source: String,
    pub test_method: TestMethod,
    pub pathogens_found: Vec<SubjectId>,
    pub antimicrobials_used: Vec<SubjectId>,
    pub culture_results: Vec<LabTestResult>,
    pub results_timestamp_sec: TimestampSec,
}

impl CultureRecord {
    /// Subject ids this culture is indexed under for `kind`.
    pub fn subject_ids(&self, kind: SubjectKind) -> &[SubjectId] {
        match kind {
            SubjectKind::Pathogen => &self.pathogens_found,
            SubjectKind::Antimicrobial => &self.antimicrobials_used,
        }
    }
}

// ============================================================================
// REPORTS
// ============================================================================

/// Aggregated susceptibility of one counterpart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectSusceptibility {
    pub name: String,
    pub id: SubjectId,
    pub isolate_count: u32,
    pub susceptibility_score: f64,
    pub label: Label,
}

/// Antibiogram of a single subject. The unit that is cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectAntibiogram {
    pub subject_name: String,
    pub subject_id: SubjectId,
    pub susceptibilities: Vec<SubjectSusceptibility>,
}

impl SubjectAntibiogram {
    /// Look up the susceptibility entry for a counterpart id.
    pub fn susceptibility(&self, counterpart_id: &str) -> Option<&SubjectSusceptibility> {
        self.susceptibilities
            .iter()
            .find(|s| s.id == counterpart_id)
    }

    /// Total isolates across every counterpart.
    pub fn total_isolates(&self) -> u64 {
        self.susceptibilities
            .iter()
            .map(|s| u64::from(s.isolate_count))
            .sum()
    }
}

/// Antibiograms for every subject of a batch request that succeeded.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BatchAntibiogram {
    pub antibiograms: Vec<SubjectAntibiogram>,
}

impl BatchAntibiogram {
    pub fn len(&self) -> usize {
        self.antibiograms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.antibiograms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(pathogen: &str, antimicrobial: &str) -> LabTestResult {
        LabTestResult {
            pathogen_id: pathogen.to_string(),
            pathogen_name: pathogen.to_uppercase(),
            antimicrobial_id: antimicrobial.to_string(),
            antimicrobial_name: antimicrobial.to_uppercase(),
            susceptibility_score: 50.0,
            label: Label::Susceptible,
            disk_diameter: None,
            result_comment: None,
        }
    }

    #[test]
    fn test_lab_result_roles_flip_with_kind() {
        let r = result("p1", "a1");
        assert_eq!(r.subject_id(SubjectKind::Pathogen), "p1");
        assert_eq!(r.counterpart(SubjectKind::Pathogen), ("a1", "A1"));
        assert_eq!(r.subject_id(SubjectKind::Antimicrobial), "a1");
        assert_eq!(r.counterpart(SubjectKind::Antimicrobial), ("p1", "P1"));
    }

    #[test]
    fn test_antibiogram_serde_round_trip() -> Result<(), serde_json::Error> {
        let antibiogram = SubjectAntibiogram {
            subject_name: "E. coli".to_string(),
            subject_id: "p1".to_string(),
            susceptibilities: vec![SubjectSusceptibility {
                name: "Amoxicillin".to_string(),
                id: "amoxicillin".to_string(),
                isolate_count: 2,
                susceptibility_score: 80.0,
                label: Label::Resistant,
            }],
        };
        let json = serde_json::to_string(&antibiogram)?;
        let back: SubjectAntibiogram = serde_json::from_str(&json)?;
        assert_eq!(back, antibiogram);
        assert_eq!(back.total_isolates(), 2);
        assert!(back.susceptibility("amoxicillin").is_some());
        Ok(())
    }
}
