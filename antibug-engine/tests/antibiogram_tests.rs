//! End-to-end tests for the antibiogram engine over in-memory and LMDB caches

use std::sync::Arc;
use std::time::Duration;

use antibug_core::{
    AntibugResult, EngineConfig, Filter, Label, PastDuration, RegionScope, SubjectKind, SubjectRef,
};
use antibug_engine::{AntibiogramEngine, AntibiogramService, RequestContext};
use antibug_storage::{
    fingerprint_for_subject, CacheBackend, CultureStore, InMemoryCacheBackend,
    InMemoryCultureStore, LmdbCacheBackend,
};
use antibug_test_utils::assertions::{assert_kind, assert_score_eq};
use antibug_test_utils::fixtures::*;
use antibug_test_utils::{
    CountingStore, ErrorKind, FailingStore, FaultyCache, StallingStore,
};
use chrono::DateTime;

fn engine<S: CultureStore, C: CacheBackend>(
    store: S,
    cache: C,
    config: EngineConfig,
) -> AntibiogramEngine<S, C> {
    AntibiogramEngine::new(Arc::new(store), Arc::new(cache), config).unwrap()
}

fn counting(records: Vec<antibug_core::CultureRecord>) -> CountingStore {
    CountingStore::new(InMemoryCultureStore::with_records(records))
}

// ============================================================================
// AGGREGATION THROUGH THE ENGINE
// ============================================================================

#[tokio::test]
async fn test_pathogen_antibiogram_end_to_end() -> AntibugResult<()> {
    let cultures =
        e_coli_amoxicillin_cultures(&[(70.0, Label::Susceptible), (90.0, Label::Susceptible)]);
    let service = AntibiogramService::new(Arc::new(engine(
        counting(cultures),
        InMemoryCacheBackend::new(),
        EngineConfig::default(),
    )));

    let report = service
        .pathogen_antibiogram(&RequestContext::background(), Some(&e_coli_filter()))
        .await?;

    assert_eq!(report.subject_id, "p1");
    assert_eq!(report.subject_name, "E. coli");
    assert_eq!(report.susceptibilities.len(), 1);
    let amox = report.susceptibility("a1").unwrap();
    assert_eq!(amox.name, "Amoxicillin");
    assert_eq!(amox.isolate_count, 2);
    assert_score_eq(amox.susceptibility_score, 80.0);
    assert_eq!(amox.label, Label::Susceptible);
    Ok(())
}

#[tokio::test]
async fn test_scores_blend_in_arrival_order() -> AntibugResult<()> {
    let cultures = e_coli_amoxicillin_cultures(&[
        (80.0, Label::Susceptible),
        (40.0, Label::Resistant),
    ]);
    let store = InMemoryCultureStore::with_records(cultures);
    let engine = engine(store.clone(), InMemoryCacheBackend::new(), EngineConfig::default());
    let ctx = RequestContext::background();

    let report = engine
        .get_or_compute(&ctx, &e_coli_filter(), SubjectKind::Pathogen, 0)
        .await?;
    assert_score_eq(report.susceptibility("a1").unwrap().susceptibility_score, 60.0);
    // One of each label: the lower code wins the tie.
    assert_eq!(report.susceptibility("a1").unwrap().label, Label::Susceptible);

    // A fresh cache sees the third culture.
    store.insert(e_coli_amoxicillin_cultures(&[(100.0, Label::Resistant)]).remove(0))?;
    let fresh = AntibiogramEngine::new(
        Arc::new(store),
        Arc::new(InMemoryCacheBackend::new()),
        EngineConfig::default(),
    )?;
    let report = fresh
        .get_or_compute(&ctx, &e_coli_filter(), SubjectKind::Pathogen, 0)
        .await?;
    let amox = report.susceptibility("a1").unwrap();
    assert_score_eq(amox.susceptibility_score, 80.0);
    assert_eq!(amox.isolate_count, 3);
    assert_eq!(amox.label, Label::Resistant);
    Ok(())
}

#[tokio::test]
async fn test_antimicrobial_view_of_same_cultures() -> AntibugResult<()> {
    let mut cultures =
        e_coli_amoxicillin_cultures(&[(70.0, Label::Susceptible), (90.0, Label::Susceptible)]);
    cultures.push(culture(
        vec![lab_result(&klebsiella(), &amoxicillin(), 10.0, Label::Resistant)],
        RESULTS_TIMESTAMP_SEC,
    ));
    let engine = engine(counting(cultures), InMemoryCacheBackend::new(), EngineConfig::default());

    let report = engine
        .get_or_compute(
            &RequestContext::background(),
            &country_filter(vec![amoxicillin()]),
            SubjectKind::Antimicrobial,
            0,
        )
        .await?;

    let ids: Vec<_> = report.susceptibilities.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["p1", "p2"]);
    assert_score_eq(report.susceptibility("p1").unwrap().susceptibility_score, 80.0);
    assert_eq!(report.susceptibility("p2").unwrap().label, Label::Resistant);
    assert_eq!(report.total_isolates(), 3);
    Ok(())
}

#[tokio::test]
async fn test_past_duration_excludes_old_cultures() -> AntibugResult<()> {
    let mut cultures = e_coli_amoxicillin_cultures(&[(90.0, Label::Susceptible)]);
    let mut old = e_coli_amoxicillin_cultures(&[(10.0, Label::Resistant)]);
    old[0].results_timestamp_sec = RESULTS_TIMESTAMP_SEC - 400 * 86_400;
    cultures.append(&mut old);

    let now = DateTime::from_timestamp(RESULTS_TIMESTAMP_SEC + 86_400, 0).unwrap();
    let engine = engine(counting(cultures), InMemoryCacheBackend::new(), EngineConfig::default())
        .with_clock(Arc::new(move || now));
    let filter = Filter {
        past_duration: PastDuration::PastSixMonths,
        ..e_coli_filter()
    };

    let report = engine
        .get_or_compute(&RequestContext::background(), &filter, SubjectKind::Pathogen, 0)
        .await?;
    let amox = report.susceptibility("a1").unwrap();
    assert_eq!(amox.isolate_count, 1);
    assert_score_eq(amox.susceptibility_score, 90.0);
    Ok(())
}

// ============================================================================
// CACHE-ASIDE
// ============================================================================

#[tokio::test]
async fn test_second_request_served_from_cache() -> AntibugResult<()> {
    let cultures = e_coli_amoxicillin_cultures(&[(70.0, Label::Susceptible)]);
    let engine = engine(counting(cultures), FaultyCache::new(), EngineConfig::default());
    let ctx = RequestContext::background();

    let first = engine
        .get_or_compute(&ctx, &e_coli_filter(), SubjectKind::Pathogen, 0)
        .await?;
    let second = engine
        .get_or_compute(&ctx, &e_coli_filter(), SubjectKind::Pathogen, 0)
        .await?;

    assert_eq!(first, second);
    assert_eq!(engine.store().find_count(), 1);
    assert_eq!(engine.cache().get_count(), 2);
    assert_eq!(engine.cache().set_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_cached_score_matches_computed_score_exactly() -> AntibugResult<()> {
    let score = 97.51117451039677;
    let cultures = e_coli_amoxicillin_cultures(&[(score, Label::Susceptible)]);
    let engine = engine(counting(cultures), InMemoryCacheBackend::new(), EngineConfig::default());
    let ctx = RequestContext::background();

    let computed = engine
        .get_or_compute(&ctx, &e_coli_filter(), SubjectKind::Pathogen, 0)
        .await?;
    let cached = engine
        .get_or_compute(&ctx, &e_coli_filter(), SubjectKind::Pathogen, 0)
        .await?;

    assert_eq!(computed, cached);
    assert_eq!(
        cached.susceptibility("a1").unwrap().susceptibility_score.to_bits(),
        score.to_bits()
    );
    assert_eq!(engine.store().find_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_subject_order_shares_cache_entry() -> AntibugResult<()> {
    let engine = engine(counting(Vec::new()), InMemoryCacheBackend::new(), EngineConfig::default());
    let ctx = RequestContext::background();

    let forward = country_filter(vec![e_coli(), klebsiella()]);
    let reverse = country_filter(vec![klebsiella(), e_coli()]);
    engine.get_or_compute(&ctx, &forward, SubjectKind::Pathogen, 0).await?;
    engine.get_or_compute(&ctx, &reverse, SubjectKind::Pathogen, 1).await?;

    assert_eq!(engine.store().find_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_scope_order_changes_cache_entry() -> AntibugResult<()> {
    let engine = engine(counting(Vec::new()), InMemoryCacheBackend::new(), EngineConfig::default());
    let ctx = RequestContext::background();

    let county = |values: &[&str]| Filter {
        region_scope: RegionScope::County,
        scope_values: values.iter().map(|v| v.to_string()).collect(),
        ..e_coli_filter()
    };
    engine
        .get_or_compute(&ctx, &county(&["047", "001"]), SubjectKind::Pathogen, 0)
        .await?;
    engine
        .get_or_compute(&ctx, &county(&["001", "047"]), SubjectKind::Pathogen, 0)
        .await?;

    assert_eq!(engine.store().find_count(), 2);
    Ok(())
}

#[tokio::test]
async fn test_report_kinds_are_cached_separately() -> AntibugResult<()> {
    let engine = engine(counting(Vec::new()), InMemoryCacheBackend::new(), EngineConfig::default());
    let ctx = RequestContext::background();
    let filter = country_filter(vec![SubjectRef::new("x1", "Shared id")]);

    engine.get_or_compute(&ctx, &filter, SubjectKind::Pathogen, 0).await?;
    engine.get_or_compute(&ctx, &filter, SubjectKind::Antimicrobial, 0).await?;

    assert_eq!(engine.store().find_count(), 2);
    assert_eq!(engine.cache().len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_corrupt_cached_payload_is_internal_and_kept() {
    let engine = engine(counting(Vec::new()), FaultyCache::new(), EngineConfig::default());
    let filter = e_coli_filter();
    let key = fingerprint_for_subject(&filter, SubjectKind::Pathogen, "p1");
    engine
        .cache()
        .inner()
        .set(key.as_bytes(), b"not an antibiogram", Duration::from_secs(60))
        .await
        .unwrap();

    let result = engine
        .get_or_compute(&RequestContext::background(), &filter, SubjectKind::Pathogen, 0)
        .await;

    assert_kind(&result, ErrorKind::Internal);
    assert_eq!(engine.store().find_count(), 0);
    let stored = engine.cache().inner().get(key.as_bytes()).await.unwrap();
    assert_eq!(stored.as_deref(), Some(&b"not an antibiogram"[..]));
}

#[tokio::test]
async fn test_cache_read_failure_skips_store() {
    let engine = engine(counting(Vec::new()), FaultyCache::new().fail_gets(), EngineConfig::default());

    let result = engine
        .get_or_compute(&RequestContext::background(), &e_coli_filter(), SubjectKind::Pathogen, 0)
        .await;

    assert_kind(&result, ErrorKind::Internal);
    assert_eq!(engine.store().find_count(), 0);
}

#[tokio::test]
async fn test_cache_write_failure_discards_result() {
    let cultures = e_coli_amoxicillin_cultures(&[(70.0, Label::Susceptible)]);
    let engine = engine(counting(cultures), FaultyCache::new().fail_sets(), EngineConfig::default());

    let result = engine
        .get_or_compute(&RequestContext::background(), &e_coli_filter(), SubjectKind::Pathogen, 0)
        .await;

    assert_kind(&result, ErrorKind::Internal);
    assert_eq!(engine.store().find_count(), 1);
    assert!(engine.cache().inner().is_empty());
}

#[tokio::test]
async fn test_invalid_filter_touches_nothing() {
    let engine = engine(counting(Vec::new()), FaultyCache::new(), EngineConfig::default());
    let filter = Filter {
        region_scope: RegionScope::Facility,
        ..e_coli_filter()
    };

    let result = engine
        .get_or_compute(&RequestContext::background(), &filter, SubjectKind::Pathogen, 0)
        .await;

    assert_kind(&result, ErrorKind::InvalidArgument);
    assert_eq!(engine.cache().get_count(), 0);
    assert_eq!(engine.store().find_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_single_flight_collapses_concurrent_misses() {
    for (single_flight, expected_finds) in [(false, 4), (true, 1)] {
        let engine = engine(
            CountingStore::new(StallingStore::delayed(Duration::from_millis(50))),
            InMemoryCacheBackend::new(),
            EngineConfig::default().with_single_flight(single_flight),
        );
        let ctx = RequestContext::background();
        let filter = e_coli_filter();

        let calls = (0..4).map(|_| engine.get_or_compute(&ctx, &filter, SubjectKind::Pathogen, 0));
        let results = futures_util::future::join_all(calls).await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(engine.store().find_count(), expected_finds);
    }
}

// ============================================================================
// FAN-OUT
// ============================================================================

#[tokio::test]
async fn test_batch_skips_failed_subject() -> AntibugResult<()> {
    let store = FailingStore::failing_for(InMemoryCultureStore::new(), ["p2"]);
    let engine = engine(store, InMemoryCacheBackend::new(), EngineConfig::default());
    let filter = country_filter(vec![
        SubjectRef::new("p1", "First"),
        SubjectRef::new("p2", "Second"),
        SubjectRef::new("p3", "Third"),
    ]);

    let batch = engine
        .generate_batch(&RequestContext::background(), &filter, SubjectKind::Pathogen)
        .await?;

    let ids: Vec<_> = batch.antibiograms.iter().map(|a| a.subject_id.as_str()).collect();
    assert_eq!(ids, vec!["p1", "p3"]);
    Ok(())
}

#[tokio::test]
async fn test_batch_with_every_subject_failing_is_empty() -> AntibugResult<()> {
    let store = FailingStore::failing_for(InMemoryCultureStore::new(), ["p1", "p2"]);
    let engine = engine(store, InMemoryCacheBackend::new(), EngineConfig::default());

    let batch = engine
        .generate_batch(
            &RequestContext::background(),
            &country_filter(vec![e_coli(), klebsiella()]),
            SubjectKind::Pathogen,
        )
        .await?;

    assert!(batch.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_single_report_surfaces_store_failure() {
    let store = FailingStore::failing_for(InMemoryCultureStore::new(), ["p1"]);
    let engine = engine(store, InMemoryCacheBackend::new(), EngineConfig::default());

    let result = engine
        .generate_single(&RequestContext::background(), &e_coli_filter(), SubjectKind::Pathogen)
        .await;

    assert_kind(&result, ErrorKind::Internal);
}

#[tokio::test]
async fn test_batch_subjects_get_distinct_entries() -> AntibugResult<()> {
    let cultures = vec![culture(
        vec![
            lab_result(&e_coli(), &amoxicillin(), 70.0, Label::Susceptible),
            lab_result(&klebsiella(), &ciprofloxacin(), 30.0, Label::Resistant),
        ],
        RESULTS_TIMESTAMP_SEC,
    )];
    let engine = engine(counting(cultures), InMemoryCacheBackend::new(), EngineConfig::default());
    let filter = country_filter(vec![e_coli(), klebsiella()]);

    let batch = engine
        .generate_batch(&RequestContext::background(), &filter, SubjectKind::Pathogen)
        .await?;

    assert_eq!(batch.len(), 2);
    assert!(batch.antibiograms[0].susceptibility("a1").is_some());
    assert!(batch.antibiograms[0].susceptibility("a2").is_none());
    assert!(batch.antibiograms[1].susceptibility("a2").is_some());
    assert_eq!(engine.cache().len(), 2);
    Ok(())
}

// ============================================================================
// CANCELLATION AND DEADLINES
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_cancelled_request_stops_waiting_on_store() {
    let engine = engine(StallingStore::forever(), InMemoryCacheBackend::new(), EngineConfig::default());
    let (ctx, canceller) = RequestContext::new();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        canceller.cancel();
    });

    let result = engine
        .get_or_compute(&ctx, &e_coli_filter(), SubjectKind::Pathogen, 0)
        .await;

    assert_kind(&result, ErrorKind::Cancelled);
    assert!(engine.cache().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_deadline_fails_whole_batch() {
    let engine = engine(StallingStore::forever(), InMemoryCacheBackend::new(), EngineConfig::default());
    let ctx = RequestContext::background().with_timeout(Duration::from_millis(100));
    let filter = country_filter(vec![e_coli(), klebsiella()]);

    let result = engine
        .generate_batch(&ctx, &filter, SubjectKind::Pathogen)
        .await;

    assert_kind(&result, ErrorKind::DeadlineExceeded);
}

// ============================================================================
// LMDB CACHE
// ============================================================================

#[tokio::test]
async fn test_lmdb_cache_survives_engine_restart() -> AntibugResult<()> {
    let dir = tempfile::tempdir().unwrap();
    let cultures =
        e_coli_amoxicillin_cultures(&[(70.0, Label::Susceptible), (90.0, Label::Susceptible)]);
    let ctx = RequestContext::background();

    let first = {
        let cache = LmdbCacheBackend::new(dir.path(), 16)?;
        let engine = engine(counting(cultures), cache, EngineConfig::default());
        engine
            .get_or_compute(&ctx, &e_coli_filter(), SubjectKind::Pathogen, 0)
            .await?
    };

    let cache = LmdbCacheBackend::new(dir.path(), 16)?;
    let engine = engine(counting(Vec::new()), cache, EngineConfig::default());
    let second = engine
        .get_or_compute(&ctx, &e_coli_filter(), SubjectKind::Pathogen, 0)
        .await?;

    assert_eq!(first, second);
    assert_eq!(engine.store().find_count(), 0);
    assert_eq!(engine.cache().stats().await?.hits, 1);
    Ok(())
}
