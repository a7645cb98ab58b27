//! Antibiogram Report Generator
//!
//! Loads culture records from a JSON file, runs a batch antibiogram for the
//! filter and prints the result as JSON to stdout. Reports are cached in the
//! LMDB environment configured by `ANTIBUG_CACHE_PATH`.
//!
//! Usage:
//!   cargo run -p antibug-engine --bin antibiogram-report -- <pathogen|antimicrobial> <filter.json> <records.json>

use std::path::Path;
use std::sync::Arc;

use antibug_core::{
    AntibugError, AntibugResult, BatchAntibiogram, CultureRecord, EngineConfig, Filter, SubjectKind,
};
use antibug_engine::{
    init_tracing, AntibiogramEngine, AntibiogramService, RequestContext, TelemetryConfig,
};
use antibug_storage::{InMemoryCultureStore, LmdbCacheConfig};
use serde::de::DeserializeOwned;

fn usage() -> ! {
    eprintln!("Usage: antibiogram-report <pathogen|antimicrobial> <filter.json> <records.json>");
    eprintln!();
    eprintln!("Example:");
    eprintln!("  antibiogram-report pathogen filter.json cultures.json");
    std::process::exit(2);
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    serde_json::from_str(&content).map_err(|e| format!("Failed to parse {}: {}", path.display(), e))
}

async fn run(
    kind: SubjectKind,
    filter: Filter,
    records: Vec<CultureRecord>,
) -> AntibugResult<BatchAntibiogram> {
    let config = EngineConfig::from_env();
    let cache_config = LmdbCacheConfig::from_env();
    let cache = cache_config.open()?;
    tracing::info!(
        kind = %kind,
        records = records.len(),
        cache_path = %cache_config.path.display(),
        "generating antibiogram report"
    );

    let store = InMemoryCultureStore::with_records(records);
    let engine = AntibiogramEngine::new(Arc::new(store), Arc::new(cache), config)?;
    let service = AntibiogramService::new(Arc::new(engine));
    let ctx = RequestContext::background();

    let batch = match kind {
        SubjectKind::Pathogen => service.pathogens_antibiogram(&ctx, Some(&filter)).await?,
        SubjectKind::Antimicrobial => {
            service.antimicrobials_antibiogram(&ctx, Some(&filter)).await?
        }
    };
    tracing::info!(antibiograms = batch.len(), "report complete");
    Ok(batch)
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 4 {
        usage();
    }

    if let Err(e) = init_tracing(&TelemetryConfig::from_env()) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let kind: SubjectKind = match args[1].parse() {
        Ok(kind) => kind,
        Err(e) => {
            eprintln!("{}", e);
            usage();
        }
    };

    let inputs = read_json::<Filter>(Path::new(&args[2]))
        .and_then(|filter| Ok((filter, read_json::<Vec<CultureRecord>>(Path::new(&args[3]))?)));
    let (filter, records) = match inputs {
        Ok(inputs) => inputs,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    match run(kind, filter, records).await {
        Ok(batch) => match serde_json::to_string_pretty(&batch) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Failed to serialize report: {}", e);
                std::process::exit(1);
            }
        },
        Err(e) => {
            let code = match e {
                AntibugError::Validation(_) => 2,
                _ => 1,
            };
            eprintln!("Failed to generate antibiogram: {}", e);
            std::process::exit(code);
        }
    }
}
