//! Enum types for antibiogram filters and lab results

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// Days in a reporting month. Windows are whole multiples of this.
const DAYS_PER_MONTH: i64 = 30;

// ============================================================================
// FILTER ENUMS
// ============================================================================

/// Lookback window applied to culture results timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PastDuration {
    /// No time restriction
    #[default]
    Unrestricted,
    PastSixMonths,
    PastOneYear,
    PastTwoYears,
    PastFourYears,
    PastEightYears,
    PastSixteenYears,
    PastThirtyTwoYears,
}

impl PastDuration {
    /// Stable integer code, used in cache fingerprints.
    pub fn code(&self) -> i32 {
        match self {
            PastDuration::Unrestricted => 0,
            PastDuration::PastSixMonths => 1,
            PastDuration::PastOneYear => 2,
            PastDuration::PastTwoYears => 3,
            PastDuration::PastFourYears => 4,
            PastDuration::PastEightYears => 5,
            PastDuration::PastSixteenYears => 6,
            PastDuration::PastThirtyTwoYears => 7,
        }
    }

    /// Window length in months, or `None` when unrestricted.
    pub fn months(&self) -> Option<i64> {
        match self {
            PastDuration::Unrestricted => None,
            PastDuration::PastSixMonths => Some(6),
            PastDuration::PastOneYear => Some(12),
            PastDuration::PastTwoYears => Some(24),
            PastDuration::PastFourYears => Some(48),
            PastDuration::PastEightYears => Some(96),
            PastDuration::PastSixteenYears => Some(192),
            PastDuration::PastThirtyTwoYears => Some(384),
        }
    }

    /// Window length in seconds (30-day months), or `None` when unrestricted.
    pub fn window_secs(&self) -> Option<i64> {
        self.months()
            .map(|months| months * DAYS_PER_MONTH * SECONDS_PER_DAY)
    }
}

/// Administrative level at which results are scoped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegionScope {
    /// Country-wide, no region predicate
    #[default]
    Country,
    County,
    SubCounty,
    Facility,
}

impl RegionScope {
    /// Stable integer code, used in cache fingerprints.
    pub fn code(&self) -> i32 {
        match self {
            RegionScope::Country => 0,
            RegionScope::County => 1,
            RegionScope::SubCounty => 2,
            RegionScope::Facility => 3,
        }
    }

    /// Whether this scope requires explicit scope values.
    pub fn requires_values(&self) -> bool {
        !matches!(self, RegionScope::Country)
    }
}

/// Patient gender constraint in an advanced filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Gender {
    #[default]
    All,
    Male,
    Female,
}

impl Gender {
    /// Stable integer code, used in cache fingerprints.
    pub fn code(&self) -> i32 {
        match self {
            Gender::All => 0,
            Gender::Male => 1,
            Gender::Female => 2,
        }
    }

    /// Patient gender column values this constraint accepts.
    pub fn db_values(&self) -> &'static [&'static str] {
        match self {
            Gender::All => &["male", "female", "all"],
            Gender::Male => &["male"],
            Gender::Female => &["female"],
        }
    }
}

// ============================================================================
// LAB RESULT ENUMS
// ============================================================================

/// Interpretation category of a susceptibility test.
///
/// Declaration order is the code order. Most-frequent-label ties are broken
/// toward the lowest code.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Label {
    Susceptible,
    Intermediate,
    Resistant,
    #[default]
    Unknown,
}

impl Label {
    /// All labels in code order.
    pub const ALL: [Label; 4] = [
        Label::Susceptible,
        Label::Intermediate,
        Label::Resistant,
        Label::Unknown,
    ];

    /// Stable integer code.
    pub fn code(&self) -> i32 {
        match self {
            Label::Susceptible => 0,
            Label::Intermediate => 1,
            Label::Resistant => 2,
            Label::Unknown => 3,
        }
    }

    /// Position of this label in [`Label::ALL`].
    pub fn index(&self) -> usize {
        self.code() as usize
    }

    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Label::Susceptible => "susceptible",
            Label::Intermediate => "intermediate",
            Label::Resistant => "resistant",
            Label::Unknown => "unknown",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, EnumParseError> {
        match s.to_lowercase().as_str() {
            "susceptible" | "s" => Ok(Label::Susceptible),
            "intermediate" | "i" => Ok(Label::Intermediate),
            "resistant" | "r" => Ok(Label::Resistant),
            "unknown" => Ok(Label::Unknown),
            _ => Err(EnumParseError::new("label", s)),
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for Label {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Method used to produce a culture's susceptibility results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestMethod {
    #[default]
    DiskDiffusion,
    BrothDilution,
    Etest,
    Automated,
}

impl TestMethod {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            TestMethod::DiskDiffusion => "disk_diffusion",
            TestMethod::BrothDilution => "broth_dilution",
            TestMethod::Etest => "etest",
            TestMethod::Automated => "automated",
        }
    }

    pub fn from_db_str(s: &str) -> Result<Self, EnumParseError> {
        match s.to_lowercase().as_str() {
            "disk_diffusion" => Ok(TestMethod::DiskDiffusion),
            "broth_dilution" => Ok(TestMethod::BrothDilution),
            "etest" => Ok(TestMethod::Etest),
            "automated" => Ok(TestMethod::Automated),
            _ => Err(EnumParseError::new("test method", s)),
        }
    }
}

// ============================================================================
// REPORT ENUMS
// ============================================================================

/// Which side of a lab result a report is generated for.
///
/// A pathogen report aggregates antimicrobial counterparts and vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectKind {
    Pathogen,
    Antimicrobial,
}

impl SubjectKind {
    /// Short tag used in cache keys and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectKind::Pathogen => "pathogen",
            SubjectKind::Antimicrobial => "antimicrobial",
        }
    }

    /// The kind on the other side of a lab result.
    pub fn counterpart(&self) -> SubjectKind {
        match self {
            SubjectKind::Pathogen => SubjectKind::Antimicrobial,
            SubjectKind::Antimicrobial => SubjectKind::Pathogen,
        }
    }
}

impl fmt::Display for SubjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SubjectKind {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pathogen" | "pathogens" => Ok(SubjectKind::Pathogen),
            "antimicrobial" | "antimicrobials" => Ok(SubjectKind::Antimicrobial),
            _ => Err(EnumParseError::new("subject kind", s)),
        }
    }
}

/// Error when parsing an invalid enum string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumParseError {
    pub kind: &'static str,
    pub value: String,
}

impl EnumParseError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

impl fmt::Display for EnumParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid {}: {}", self.kind, self.value)
    }
}

impl std::error::Error for EnumParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_secs_uses_thirty_day_months() {
        assert_eq!(PastDuration::Unrestricted.window_secs(), None);
        assert_eq!(
            PastDuration::PastSixMonths.window_secs(),
            Some(180 * 24 * 60 * 60)
        );
        assert_eq!(
            PastDuration::PastThirtyTwoYears.window_secs(),
            Some(11_520 * 24 * 60 * 60)
        );
    }

    #[test]
    fn test_codes_are_distinct() {
        let durations = [
            PastDuration::Unrestricted,
            PastDuration::PastSixMonths,
            PastDuration::PastOneYear,
            PastDuration::PastTwoYears,
            PastDuration::PastFourYears,
            PastDuration::PastEightYears,
            PastDuration::PastSixteenYears,
            PastDuration::PastThirtyTwoYears,
        ];
        let codes: Vec<i32> = durations.iter().map(|d| d.code()).collect();
        assert_eq!(codes, (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn test_label_order_matches_code() {
        for (idx, label) in Label::ALL.iter().enumerate() {
            assert_eq!(label.index(), idx);
        }
        assert!(Label::Susceptible < Label::Unknown);
    }

    #[test]
    fn test_label_round_trip_db_str() {
        for label in Label::ALL {
            assert_eq!(Label::from_db_str(label.as_db_str()), Ok(label));
        }
        assert!(Label::from_db_str("maybe").is_err());
    }

    #[test]
    fn test_gender_db_values() {
        assert_eq!(Gender::All.db_values(), &["male", "female", "all"]);
        assert_eq!(Gender::Female.db_values(), &["female"]);
    }

    #[test]
    fn test_subject_kind_counterpart() {
        assert_eq!(SubjectKind::Pathogen.counterpart(), SubjectKind::Antimicrobial);
        assert_eq!(
            "antimicrobials".parse::<SubjectKind>(),
            Ok(SubjectKind::Antimicrobial)
        );
        assert!("virus".parse::<SubjectKind>().is_err());
    }
}
