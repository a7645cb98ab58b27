//! Cache payload encoding for antibiograms.

use antibug_core::{AntibugResult, CacheError, SubjectAntibiogram};

const ENTITY: &str = "SubjectAntibiogram";

pub fn encode(antibiogram: &SubjectAntibiogram) -> AntibugResult<Vec<u8>> {
    serde_json::to_vec(antibiogram).map_err(|e| {
        CacheError::Serialization {
            entity: ENTITY.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

pub fn decode(bytes: &[u8]) -> AntibugResult<SubjectAntibiogram> {
    serde_json::from_slice(bytes).map_err(|e| {
        CacheError::Deserialization {
            entity: ENTITY.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}
