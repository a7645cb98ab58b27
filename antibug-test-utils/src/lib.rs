//! Antibug Test Utilities
//!
//! Shared test infrastructure for the antibug workspace:
//! - Store and cache doubles with call counters and injected failures
//! - Proptest generators for filters and culture records
//! - Fixtures for common antibiogram scenarios
//! - Assertions on error classification

pub use antibug_core::{
    AntibugError, AntibugResult, CultureRecord, ErrorKind, Filter, LabTestResult, Label,
    SubjectKind, SubjectRef,
};
pub use antibug_storage::{InMemoryCacheBackend, InMemoryCultureStore};

use antibug_core::{CacheError, StorageError};
use antibug_storage::{CacheBackend, CacheStats, CultureQuery, CultureStore, Predicate};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

// ============================================================================
// STORE DOUBLES
// ============================================================================

/// Culture store that counts `find` calls and delegates to an inner store.
#[derive(Debug, Default)]
pub struct CountingStore<S = InMemoryCultureStore> {
    inner: S,
    finds: AtomicUsize,
}

impl<S> CountingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            finds: AtomicUsize::new(0),
        }
    }

    pub fn find_count(&self) -> usize {
        self.finds.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: CultureStore> CultureStore for CountingStore<S> {
    async fn find(&self, query: &CultureQuery) -> AntibugResult<Vec<CultureRecord>> {
        self.finds.fetch_add(1, Ordering::SeqCst);
        self.inner.find(query).await
    }
}

/// Culture store that fails queries for selected subjects.
#[derive(Debug, Default)]
pub struct FailingStore {
    inner: InMemoryCultureStore,
    failing: HashSet<String>,
}

impl FailingStore {
    /// Fail any query scoped to one of `subject_ids`.
    pub fn failing_for(
        inner: InMemoryCultureStore,
        subject_ids: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            inner,
            failing: subject_ids.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl CultureStore for FailingStore {
    async fn find(&self, query: &CultureQuery) -> AntibugResult<Vec<CultureRecord>> {
        let failing = query.predicates().iter().find_map(|p| match p {
            Predicate::SubjectMember { id, .. } if self.failing.contains(id) => Some(id),
            _ => None,
        });
        if let Some(id) = failing {
            return Err(StorageError::QueryFailed {
                operation: "find".to_string(),
                reason: format!("injected failure for {}", id),
            }
            .into());
        }
        self.inner.find(query).await
    }
}

/// Culture store that stalls before answering, or never answers.
#[derive(Debug, Clone, Copy)]
pub struct StallingStore {
    delay: Option<Duration>,
}

impl StallingStore {
    /// Answer with no records after `delay`.
    pub fn delayed(delay: Duration) -> Self {
        Self { delay: Some(delay) }
    }

    /// Never answer.
    pub fn forever() -> Self {
        Self { delay: None }
    }
}

#[async_trait]
impl CultureStore for StallingStore {
    async fn find(&self, _query: &CultureQuery) -> AntibugResult<Vec<CultureRecord>> {
        match self.delay {
            Some(delay) => tokio::time::sleep(delay).await,
            None => std::future::pending::<()>().await,
        }
        Ok(Vec::new())
    }
}

// ============================================================================
// CACHE DOUBLES
// ============================================================================

/// In-memory cache with switchable read and write failures.
#[derive(Debug, Default)]
pub struct FaultyCache {
    inner: InMemoryCacheBackend,
    fail_gets: AtomicBool,
    fail_sets: AtomicBool,
    gets: AtomicUsize,
    sets: AtomicUsize,
}

impl FaultyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_gets(self) -> Self {
        self.fail_gets.store(true, Ordering::SeqCst);
        self
    }

    pub fn fail_sets(self) -> Self {
        self.fail_sets.store(true, Ordering::SeqCst);
        self
    }

    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn set_count(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    /// The backing cache, bypassing injected failures and counters.
    pub fn inner(&self) -> &InMemoryCacheBackend {
        &self.inner
    }

    fn injected(command: &str) -> AntibugError {
        CacheError::CommandFailed {
            command: command.to_string(),
            reason: "injected failure".to_string(),
        }
        .into()
    }
}

#[async_trait]
impl CacheBackend for FaultyCache {
    async fn get(&self, key: &[u8]) -> AntibugResult<Option<Vec<u8>>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(Self::injected("GET"));
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &[u8], value: &[u8], ttl: Duration) -> AntibugResult<()> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        if self.fail_sets.load(Ordering::SeqCst) {
            return Err(Self::injected("SET"));
        }
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &[u8]) -> AntibugResult<bool> {
        self.inner.delete(key).await
    }

    async fn stats(&self) -> AntibugResult<CacheStats> {
        self.inner.stats().await
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

/// Proptest generators for antibiogram types.
pub mod generators {
    use antibug_core::{
        AdvancedFilter, CultureRecord, Filter, Gender, LabTestResult, Label, PastDuration,
        RegionScope, SubjectRef, TestMethod,
    };
    use proptest::prelude::*;

    pub fn arb_label() -> impl Strategy<Value = Label> {
        prop_oneof![
            Just(Label::Susceptible),
            Just(Label::Intermediate),
            Just(Label::Resistant),
            Just(Label::Unknown),
        ]
    }

    pub fn arb_past_duration() -> impl Strategy<Value = PastDuration> {
        prop_oneof![
            Just(PastDuration::Unrestricted),
            Just(PastDuration::PastSixMonths),
            Just(PastDuration::PastOneYear),
            Just(PastDuration::PastTwoYears),
            Just(PastDuration::PastFourYears),
            Just(PastDuration::PastEightYears),
            Just(PastDuration::PastSixteenYears),
            Just(PastDuration::PastThirtyTwoYears),
        ]
    }

    pub fn arb_region_scope() -> impl Strategy<Value = RegionScope> {
        prop_oneof![
            Just(RegionScope::Country),
            Just(RegionScope::County),
            Just(RegionScope::SubCounty),
            Just(RegionScope::Facility),
        ]
    }

    pub fn arb_gender() -> impl Strategy<Value = Gender> {
        prop_oneof![Just(Gender::All), Just(Gender::Male), Just(Gender::Female)]
    }

    pub fn arb_test_method() -> impl Strategy<Value = TestMethod> {
        prop_oneof![
            Just(TestMethod::DiskDiffusion),
            Just(TestMethod::BrothDilution),
            Just(TestMethod::Etest),
            Just(TestMethod::Automated),
        ]
    }

    /// Pathogen references from a small id pool, so generated records collide.
    pub fn arb_pathogen() -> impl Strategy<Value = SubjectRef> {
        (1u8..=3).prop_map(|n| SubjectRef::new(format!("p{}", n), format!("Pathogen {}", n)))
    }

    /// Antimicrobial references from a small id pool.
    pub fn arb_antimicrobial() -> impl Strategy<Value = SubjectRef> {
        (1u8..=3).prop_map(|n| SubjectRef::new(format!("a{}", n), format!("Antimicrobial {}", n)))
    }

    pub fn arb_subject_ref() -> impl Strategy<Value = SubjectRef> {
        ("[a-z][a-z0-9]{0,7}", "[A-Za-z ]{1,16}").prop_map(|(id, name)| SubjectRef::new(id, name))
    }

    pub fn arb_advanced_filter() -> impl Strategy<Value = AdvancedFilter> {
        (arb_gender(), 0i32..40_000, 0i32..40_000).prop_map(|(gender, a, b)| AdvancedFilter {
            gender,
            age_min_days: a.min(b),
            age_max_days: a.max(b),
        })
    }

    /// Filters that pass validation.
    pub fn arb_filter() -> impl Strategy<Value = Filter> {
        (
            arb_past_duration(),
            arb_region_scope(),
            prop::collection::vec("[0-9]{3}", 1..4),
            prop::collection::vec(arb_subject_ref(), 1..5),
            any::<bool>(),
            prop::option::of(arb_advanced_filter()),
        )
            .prop_map(
                |(past_duration, region_scope, scope_values, input_values, advanced, advanced_filter)| {
                    Filter {
                        past_duration,
                        region_scope,
                        scope_values,
                        input_values,
                        advanced,
                        advanced_filter,
                    }
                },
            )
    }

    pub fn arb_lab_result() -> impl Strategy<Value = LabTestResult> {
        (arb_pathogen(), arb_antimicrobial(), 0.0f64..=100.0, arb_label()).prop_map(
            |(pathogen, antimicrobial, score, label)| LabTestResult {
                pathogen_id: pathogen.id,
                pathogen_name: pathogen.name,
                antimicrobial_id: antimicrobial.id,
                antimicrobial_name: antimicrobial.name,
                susceptibility_score: score,
                label,
                disk_diameter: None,
                result_comment: None,
            },
        )
    }

    /// Culture records whose id lists match their results.
    pub fn arb_culture_record() -> impl Strategy<Value = CultureRecord> {
        (
            "[a-f0-9]{12}",
            prop::collection::vec(arb_lab_result(), 0..6),
            prop_oneof![Just("male"), Just("female")],
            0i32..110,
            arb_test_method(),
            0i64..2_000_000_000,
        )
            .prop_map(|(culture_id, results, gender, age, test_method, timestamp)| {
                let mut record = super::fixtures::culture(results, timestamp);
                record.culture_id = culture_id;
                record.patient_gender = gender.to_string();
                record.patient_age = age;
                record.test_method = test_method;
                record
            })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

/// Common fixtures for antibiogram tests.
pub mod fixtures {
    use antibug_core::{
        CultureRecord, Filter, LabTestResult, Label, SubjectRef, TestMethod, TimestampSec,
    };
    use uuid::Uuid;

    /// Results timestamp used by fixture cultures.
    pub const RESULTS_TIMESTAMP_SEC: TimestampSec = 1_700_000_000;

    pub fn e_coli() -> SubjectRef {
        SubjectRef::new("p1", "E. coli")
    }

    pub fn klebsiella() -> SubjectRef {
        SubjectRef::new("p2", "K. pneumoniae")
    }

    pub fn amoxicillin() -> SubjectRef {
        SubjectRef::new("a1", "Amoxicillin")
    }

    pub fn ciprofloxacin() -> SubjectRef {
        SubjectRef::new("a2", "Ciprofloxacin")
    }

    /// Country-wide, unrestricted filter over `subjects`.
    pub fn country_filter(subjects: Vec<SubjectRef>) -> Filter {
        Filter {
            input_values: subjects,
            ..Default::default()
        }
    }

    pub fn e_coli_filter() -> Filter {
        country_filter(vec![e_coli()])
    }

    pub fn lab_result(
        pathogen: &SubjectRef,
        antimicrobial: &SubjectRef,
        score: f64,
        label: Label,
    ) -> LabTestResult {
        LabTestResult {
            pathogen_id: pathogen.id.clone(),
            pathogen_name: pathogen.name.clone(),
            antimicrobial_id: antimicrobial.id.clone(),
            antimicrobial_name: antimicrobial.name.clone(),
            susceptibility_score: score,
            label,
            disk_diameter: None,
            result_comment: None,
        }
    }

    /// A culture holding `results`, with id lists derived from them.
    pub fn culture(results: Vec<LabTestResult>, timestamp: TimestampSec) -> CultureRecord {
        let mut pathogens_found: Vec<String> = Vec::new();
        let mut antimicrobials_used: Vec<String> = Vec::new();
        for result in &results {
            if !pathogens_found.contains(&result.pathogen_id) {
                pathogens_found.push(result.pathogen_id.clone());
            }
            if !antimicrobials_used.contains(&result.antimicrobial_id) {
                antimicrobials_used.push(result.antimicrobial_id.clone());
            }
        }

        CultureRecord {
            culture_id: Uuid::now_v7().to_string(),
            lab_tech_id: "tech-1".to_string(),
            facility_id: "facility-1".to_string(),
            county_code: "047".to_string(),
            sub_county_code: "047-01".to_string(),
            patient_id: Uuid::now_v7().to_string(),
            patient_gender: "female".to_string(),
            patient_age: 34,
            culture_source: "urine".to_string(),
            test_method: TestMethod::DiskDiffusion,
            pathogens_found,
            antimicrobials_used,
            culture_results: results,
            results_timestamp_sec: timestamp,
        }
    }

    /// One culture per score, each with a single E. coli / amoxicillin result.
    pub fn e_coli_amoxicillin_cultures(scored: &[(f64, Label)]) -> Vec<CultureRecord> {
        scored
            .iter()
            .map(|&(score, label)| {
                culture(
                    vec![lab_result(&e_coli(), &amoxicillin(), score, label)],
                    RESULTS_TIMESTAMP_SEC,
                )
            })
            .collect()
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

/// Assertions for antibiogram results.
pub mod assertions {
    use antibug_core::{AntibugResult, ErrorKind};
    use std::fmt::Debug;

    /// Assert that `result` failed with an error of `kind`.
    pub fn assert_kind<T: Debug>(result: &AntibugResult<T>, kind: ErrorKind) {
        match result {
            Ok(value) => panic!("expected {:?} error, got Ok({:?})", kind, value),
            Err(e) => assert_eq!(e.kind(), kind, "unexpected error kind for: {}", e),
        }
    }

    /// Assert two scores are equal within floating point tolerance.
    pub fn assert_score_eq(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "score {} != expected {}",
            actual,
            expected
        );
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use antibug_core::SubjectKind;

    fn query_for(subject: &str) -> CultureQuery {
        CultureQuery::default().with_subject(SubjectKind::Pathogen, subject)
    }

    #[test]
    fn test_culture_fixture_derives_id_lists() {
        let record = culture(
            vec![
                lab_result(&e_coli(), &amoxicillin(), 70.0, Label::Susceptible),
                lab_result(&e_coli(), &ciprofloxacin(), 20.0, Label::Resistant),
            ],
            RESULTS_TIMESTAMP_SEC,
        );
        assert_eq!(record.pathogens_found, vec!["p1"]);
        assert_eq!(record.antimicrobials_used, vec!["a1", "a2"]);
    }

    #[tokio::test]
    async fn test_failing_store_only_fails_selected_subjects() {
        let store = FailingStore::failing_for(
            InMemoryCultureStore::with_records(e_coli_amoxicillin_cultures(&[(70.0, Label::Susceptible)])),
            ["p2"],
        );
        assert_eq!(store.find(&query_for("p1")).await.unwrap().len(), 1);
        assert!(store.find(&query_for("p2")).await.is_err());
    }

    #[tokio::test]
    async fn test_faulty_cache_counts_and_fails() {
        let cache = FaultyCache::new().fail_sets();
        assert!(cache.set(b"k", b"v", Duration::from_secs(1)).await.is_err());
        assert_eq!(cache.get(b"k").await.unwrap(), None);
        assert_eq!(cache.set_count(), 1);
        assert_eq!(cache.get_count(), 1);
    }
}
