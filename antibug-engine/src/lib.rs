//! Antibug Engine - Antibiogram Generation
//!
//! Turns a request [`Filter`](antibug_core::Filter) into pathogen or
//! antimicrobial antibiograms:
//!
//! - [`aggregate`]: fold culture results into per-counterpart susceptibilities
//! - [`AntibiogramEngine::get_or_compute`]: cache-aside for one subject
//! - [`AntibiogramEngine::generate_batch`]: bounded fan-out over all subjects
//! - [`AntibiogramService`]: request entry points with an authentication seam
//!
//! Store and cache calls honour the [`RequestContext`] cancellation signal
//! and deadline.

pub mod aggregate;
pub mod codec;
pub mod context;
pub mod engine;
pub mod fanout;
pub mod service;
pub mod telemetry;

pub use aggregate::{aggregate, LabelTally};
pub use context::{Canceller, RequestContext};
pub use engine::{AntibiogramEngine, Clock};
pub use service::{AllowAll, AntibiogramService, RequestAuthenticator};
pub use telemetry::{init_tracing, LogFormat, TelemetryConfig};
