//! Content-addressed cache keys for antibiogram requests.
//!
//! A fingerprint is the SHA-224 digest of a canonical string built from the
//! filter. Subject ids are sorted before hashing so the order of
//! `input_values` does not matter; `scope_values` are hashed as given.

use std::fmt;

use antibug_core::{Filter, SubjectKind};
use sha2::{Digest, Sha224};

/// Length of a fingerprint in bytes.
pub const FINGERPRINT_LEN: usize = 28;

/// Raw SHA-224 digest used as a cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; FINGERPRINT_LEN]);

impl Fingerprint {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    fn digest(material: &str) -> Self {
        let mut hasher = Sha224::new();
        hasher.update(material.as_bytes());
        Self(hasher.finalize().into())
    }
}

impl AsRef<[u8]> for Fingerprint {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Canonical string hashed by [`fingerprint`].
///
/// Layout: duration code, scope code, comma-joined scope values, the
/// `advanced` flag, then the sorted comma-joined subject ids, then gender code,
/// max age and min age when an advanced filter is attached.
pub fn fingerprint_material(filter: &Filter) -> String {
    let mut material = format!(
        "{}{}{}{}",
        filter.past_duration.code(),
        filter.region_scope.code(),
        filter.scope_values.join(","),
        filter.advanced
    );

    if !filter.input_values.is_empty() {
        let mut ids: Vec<&str> = filter.input_values.iter().map(|s| s.id.as_str()).collect();
        ids.sort_unstable();
        material.push_str(&ids.join(","));
    }

    // Hashed whenever present, even with `advanced` switched off.
    if let Some(advanced) = &filter.advanced_filter {
        material.push_str(&format!(
            "{}{}{}",
            advanced.gender.code(),
            advanced.age_max_days,
            advanced.age_min_days
        ));
    }

    material
}

/// Fingerprint of the whole filter.
pub fn fingerprint(filter: &Filter) -> Fingerprint {
    Fingerprint::digest(&fingerprint_material(filter))
}

/// Fingerprint of one subject's report under `filter`.
///
/// Extends the filter material with `|kind:subject_id`, so every subject of a
/// batch and each report kind gets its own entry.
pub fn fingerprint_for_subject(filter: &Filter, kind: SubjectKind, subject_id: &str) -> Fingerprint {
    let material = format!(
        "{}|{}:{}",
        fingerprint_material(filter),
        kind.as_str(),
        subject_id
    );
    Fingerprint::digest(&material)
}
