//! Fan-out over the subjects of a request
//!
//! A batch runs the cache-aside path once per input value with bounded
//! concurrency. Failed subjects are logged and left out; the batch itself
//! only fails when the request is cancelled or runs past its deadline.

use antibug_core::{
    AntibugError, AntibugResult, BatchAntibiogram, ErrorKind, Filter, SubjectAntibiogram,
    SubjectKind,
};
use antibug_storage::{CacheBackend, CultureStore};
use futures_util::future::join_all;
use tokio::sync::Semaphore;
use tracing::warn;

use crate::context::RequestContext;
use crate::engine::AntibiogramEngine;

impl<S, C> AntibiogramEngine<S, C>
where
    S: CultureStore + ?Sized,
    C: CacheBackend + ?Sized,
{
    /// Antibiogram of the first input value. Any failure is returned.
    pub async fn generate_single(
        &self,
        ctx: &RequestContext,
        filter: &Filter,
        kind: SubjectKind,
    ) -> AntibugResult<SubjectAntibiogram> {
        self.get_or_compute(ctx, filter, kind, 0).await
    }

    /// Antibiograms of every input value, in input order.
    ///
    /// At most `max_concurrent_subjects` subjects are in flight at once.
    pub async fn generate_batch(
        &self,
        ctx: &RequestContext,
        filter: &Filter,
        kind: SubjectKind,
    ) -> AntibugResult<BatchAntibiogram> {
        filter.validate()?;

        let limiter = Semaphore::new(self.config().max_concurrent_subjects);
        let limiter = &limiter;

        let tasks = (0..filter.input_values.len()).map(|index| async move {
            let _permit = limiter.acquire().await.map_err(|_| AntibugError::Cancelled {
                operation: "subject permit".to_string(),
            })?;
            self.get_or_compute(ctx, filter, kind, index).await
        });
        let results = join_all(tasks).await;

        let mut antibiograms = Vec::with_capacity(results.len());
        for (index, result) in results.into_iter().enumerate() {
            match result {
                Ok(antibiogram) => antibiograms.push(antibiogram),
                Err(e) if is_request_abort(&e) => return Err(e),
                Err(e) => {
                    let subject_id = filter
                        .input_values
                        .get(index)
                        .map(|s| s.id.as_str())
                        .unwrap_or_default();
                    warn!(
                        subject_id = %subject_id,
                        kind = %kind,
                        error = %e,
                        "skipping subject in batch antibiogram"
                    );
                }
            }
        }

        Ok(BatchAntibiogram { antibiograms })
    }
}

fn is_request_abort(error: &AntibugError) -> bool {
    matches!(
        error.kind(),
        ErrorKind::Cancelled | ErrorKind::DeadlineExceeded
    )
}
