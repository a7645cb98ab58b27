//! Antibug Core - Antibiogram Types
//!
//! Pure data structures shared by the storage and engine crates: the request
//! filter, culture records, report shapes, enums, configuration and errors.
//! No I/O lives here.

mod config;
mod entities;
mod enums;
mod error;
mod filter;

pub use config::{EngineConfig, DEFAULT_CACHE_TTL, DEFAULT_MAX_CONCURRENT_SUBJECTS};
pub use entities::{
    BatchAntibiogram, CultureRecord, LabTestResult, SubjectAntibiogram, SubjectId,
    SubjectSusceptibility, TimestampSec,
};
pub use enums::{EnumParseError, Gender, Label, PastDuration, RegionScope, SubjectKind, TestMethod};
pub use error::{
    AntibugError, AntibugResult, CacheError, ConfigError, ErrorKind, StorageError,
    ValidationError,
};
pub use filter::{validate_filter, AdvancedFilter, Filter, SubjectRef, DAYS_PER_YEAR};
