//! Antibiogram report service
//!
//! Request-level entry points for both report kinds. Each request is checked
//! in a fixed order: a filter must be present, the caller must authenticate,
//! and the filter must validate. Only then is the engine consulted.

use std::sync::Arc;

use antibug_core::{
    validate_filter, AntibugError, AntibugResult, BatchAntibiogram, Filter, SubjectAntibiogram,
    SubjectKind,
};
use antibug_storage::{CacheBackend, CultureStore};
use async_trait::async_trait;

use crate::context::RequestContext;
use crate::engine::AntibiogramEngine;

/// Authentication precondition run before every report request.
#[async_trait]
pub trait RequestAuthenticator: Send + Sync {
    async fn authenticate(&self, ctx: &RequestContext) -> AntibugResult<()>;
}

/// Authenticator that accepts every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl RequestAuthenticator for AllowAll {
    async fn authenticate(&self, _ctx: &RequestContext) -> AntibugResult<()> {
        Ok(())
    }
}

/// Pathogen and antimicrobial antibiogram reports.
pub struct AntibiogramService<S: ?Sized, C: ?Sized> {
    engine: Arc<AntibiogramEngine<S, C>>,
    authenticator: Arc<dyn RequestAuthenticator>,
}

impl<S: ?Sized, C: ?Sized> Clone for AntibiogramService<S, C> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            authenticator: Arc::clone(&self.authenticator),
        }
    }
}

impl<S, C> AntibiogramService<S, C>
where
    S: CultureStore + ?Sized,
    C: CacheBackend + ?Sized,
{
    /// Service that accepts every request.
    pub fn new(engine: Arc<AntibiogramEngine<S, C>>) -> Self {
        Self::with_authenticator(engine, Arc::new(AllowAll))
    }

    pub fn with_authenticator(
        engine: Arc<AntibiogramEngine<S, C>>,
        authenticator: Arc<dyn RequestAuthenticator>,
    ) -> Self {
        Self {
            engine,
            authenticator,
        }
    }

    pub fn engine(&self) -> &Arc<AntibiogramEngine<S, C>> {
        &self.engine
    }

    /// Antibiogram of the first pathogen in `filter`.
    pub async fn pathogen_antibiogram(
        &self,
        ctx: &RequestContext,
        filter: Option<&Filter>,
    ) -> AntibugResult<SubjectAntibiogram> {
        self.single(ctx, filter, SubjectKind::Pathogen).await
    }

    /// Antibiograms of every pathogen in `filter`.
    pub async fn pathogens_antibiogram(
        &self,
        ctx: &RequestContext,
        filter: Option<&Filter>,
    ) -> AntibugResult<BatchAntibiogram> {
        self.batch(ctx, filter, SubjectKind::Pathogen).await
    }

    /// Antibiogram of the first antimicrobial in `filter`.
    pub async fn antimicrobial_antibiogram(
        &self,
        ctx: &RequestContext,
        filter: Option<&Filter>,
    ) -> AntibugResult<SubjectAntibiogram> {
        self.single(ctx, filter, SubjectKind::Antimicrobial).await
    }

    /// Antibiograms of every antimicrobial in `filter`.
    pub async fn antimicrobials_antibiogram(
        &self,
        ctx: &RequestContext,
        filter: Option<&Filter>,
    ) -> AntibugResult<BatchAntibiogram> {
        self.batch(ctx, filter, SubjectKind::Antimicrobial).await
    }

    async fn single(
        &self,
        ctx: &RequestContext,
        filter: Option<&Filter>,
        kind: SubjectKind,
    ) -> AntibugResult<SubjectAntibiogram> {
        let filter = self.admit(ctx, filter).await?;
        self.engine.generate_single(ctx, filter, kind).await
    }

    async fn batch(
        &self,
        ctx: &RequestContext,
        filter: Option<&Filter>,
        kind: SubjectKind,
    ) -> AntibugResult<BatchAntibiogram> {
        let filter = self.admit(ctx, filter).await?;
        self.engine.generate_batch(ctx, filter, kind).await
    }

    async fn admit<'f>(
        &self,
        ctx: &RequestContext,
        filter: Option<&'f Filter>,
    ) -> AntibugResult<&'f Filter> {
        let filter = filter.ok_or_else(|| AntibugError::missing_field("filter"))?;
        self.authenticator.authenticate(ctx).await?;
        validate_filter(Some(filter))
    }
}
