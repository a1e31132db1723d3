//! Tenant workflows: the operator-level sequences over store, pipeline and registry.

use crate::engine::EngineKind;
use crate::error::{AppError, StoreError};
use crate::provision::{ProvisionReport, ProvisioningPipeline};
use crate::registry::PoolRegistry;
use crate::store::TenantStore;
use crate::tenant::TenantDescriptor;
use serde::Serialize;
use std::sync::Arc;

#[derive(Serialize, Debug, Clone)]
pub struct TenantSummary {
    pub id: Option<i64>,
    pub name: String,
    pub engine: EngineKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// A pool is live in the registry.
    pub routable: bool,
}

#[derive(Serialize, Debug, Clone)]
pub struct Provisioned {
    pub tenant: TenantSummary,
    pub report: ProvisionReport,
}

#[derive(Serialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct ReplaySummary {
    pub loaded: Vec<String>,
    pub failed: Vec<String>,
}

pub struct TenantService {
    store: Arc<dyn TenantStore>,
    registry: Arc<PoolRegistry>,
    pipeline: Arc<ProvisioningPipeline>,
}

impl TenantService {
    pub fn new(store: Arc<dyn TenantStore>, registry: Arc<PoolRegistry>, pipeline: Arc<ProvisioningPipeline>) -> Self {
        TenantService {
            store,
            registry,
            pipeline,
        }
    }

    pub fn registry(&self) -> &Arc<PoolRegistry> {
        &self.registry
    }

    /// New tenant: create and migrate its database, persist the descriptor, then
    /// make it routable. Nothing is saved or registered if the pipeline fails.
    pub async fn provision(&self, descriptor: TenantDescriptor) -> Result<Provisioned, AppError> {
        let report = self.pipeline.run(&descriptor).await?;
        let saved = self.store.save(&descriptor).await?;
        self.registry.upsert(&saved).await?;
        Ok(Provisioned {
            tenant: self.summarize(&saved),
            report,
        })
    }

    /// Bring a stored tenant's schema up to date and (re)install its pool.
    /// A failed migration leaves the registry untouched.
    pub async fn activate(&self, id: i64) -> Result<Provisioned, AppError> {
        let descriptor = self
            .store
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("tenant id {}", id)))?;
        let report = self.pipeline.run(&descriptor).await?;
        self.registry.upsert(&descriptor).await?;
        tracing::info!(tenant = %descriptor.name, id, "tenant activated");
        Ok(Provisioned {
            tenant: self.summarize(&descriptor),
            report,
        })
    }

    /// Tear down the pool only; the stored descriptor is kept.
    pub async fn remove(&self, name: &str) -> bool {
        self.registry.remove(name).await
    }

    pub async fn list(&self) -> Result<Vec<TenantSummary>, StoreError> {
        let descriptors = self.store.find_all().await?;
        Ok(descriptors.iter().map(|d| self.summarize(d)).collect())
    }

    pub async fn test_connectivity(&self, descriptor: &TenantDescriptor) -> Result<bool, AppError> {
        Ok(self.registry.test_connectivity(descriptor).await?)
    }

    /// Rebuild every stored tenant's pool. A tenant that fails is logged and
    /// skipped; only an unreachable store fails the replay.
    pub async fn replay(&self) -> Result<ReplaySummary, StoreError> {
        let descriptors = self.store.find_all().await?;
        let mut summary = ReplaySummary::default();
        for descriptor in descriptors {
            match self.registry.upsert(&descriptor).await {
                Ok(()) => summary.loaded.push(descriptor.name),
                Err(e) => {
                    tracing::warn!(tenant = %descriptor.name, error = %e, "could not restore tenant pool");
                    summary.failed.push(descriptor.name);
                }
            }
        }
        tracing::info!(loaded = summary.loaded.len(), failed = summary.failed.len(), "tenant replay finished");
        Ok(summary)
    }

    fn summarize(&self, descriptor: &TenantDescriptor) -> TenantSummary {
        let url = descriptor.connection_url().ok();
        TenantSummary {
            id: descriptor.id,
            name: descriptor.name.clone(),
            engine: descriptor.engine(),
            server: url.as_ref().map(|u| u.server()),
            database: url.as_ref().map(|u| u.database().to_string()),
            routable: self.registry.contains(&descriptor.name),
        }
    }
}
