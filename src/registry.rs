//! Pool registry: the routing table from tenant name to live pool, plus the
//! fallback pool for the registry database.
//!
//! Writes for one name are ordered by a generation ticket taken when the write
//! starts. Pools are built outside any lock; installing is a single map-entry
//! swap, and the displaced pool is drained only after the swap, so a lookup
//! sees either the old pool or the new one, never neither.
//!
//! A removal that races an in-flight upsert leaves a tombstone so the older
//! upsert cannot resurrect the tenant. Tombstones exist only while such an
//! upsert is pending. Lock order is always `pending` before `slots`.

use crate::config::{validate_descriptor, PoolPolicy};
use crate::error::RegistryError;
use crate::pool::{probe_connectivity, TenantPool};
use crate::tenant::TenantDescriptor;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

struct Slot {
    generation: u64,
    /// `None` once the tenant has been removed.
    pool: Option<TenantPool>,
}

enum Install {
    Installed { replaced: Option<TenantPool> },
    Superseded(TenantPool),
}

pub struct PoolRegistry {
    policy: PoolPolicy,
    fallback: TenantPool,
    slots: DashMap<String, Slot>,
    /// Tickets of upserts still building their pool, per name.
    pending: DashMap<String, Vec<u64>>,
    generation: AtomicU64,
}

impl PoolRegistry {
    pub fn new(fallback: TenantPool, policy: PoolPolicy) -> Self {
        PoolRegistry {
            policy,
            fallback,
            slots: DashMap::new(),
            pending: DashMap::new(),
            generation: AtomicU64::new(0),
        }
    }

    pub fn policy(&self) -> &PoolPolicy {
        &self.policy
    }

    /// Pool for the registry database, used when no tenant is selected.
    pub fn fallback(&self) -> &TenantPool {
        &self.fallback
    }

    pub fn get(&self, name: &str) -> Option<TenantPool> {
        self.slots.get(name).and_then(|slot| slot.pool.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slots.get(name).map(|slot| slot.pool.is_some()).unwrap_or(false)
    }

    /// Names with a live pool, sorted.
    pub fn tenant_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .slots
            .iter()
            .filter(|entry| entry.value().pool.is_some())
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    /// Build a pool for `descriptor` and install it under `descriptor.name`.
    /// A displaced pool is drained after the new one is live. If a later write
    /// for the same name has already landed, the freshly built pool is closed
    /// instead of installed. On build failure the previous pool stays in place.
    pub async fn upsert(&self, descriptor: &TenantDescriptor) -> Result<(), RegistryError> {
        let url = validate_descriptor(descriptor)?;
        let generation = self.begin_write(&descriptor.name);
        let built = TenantPool::connect(descriptor, &url.tenant_address(), &self.policy).await;
        let installed = built.map(|pool| self.install(&descriptor.name, generation, pool));
        self.end_write(&descriptor.name, generation);

        let installed = installed.map_err(|source| RegistryError::PoolBuild {
            tenant: descriptor.name.clone(),
            server: url.server(),
            source,
        })?;
        match installed {
            Install::Installed { replaced: None } => {
                tracing::info!(tenant = %descriptor.name, engine = %descriptor.engine(), generation, "tenant pool installed");
            }
            Install::Installed { replaced: Some(old) } => {
                tracing::info!(tenant = %descriptor.name, engine = %descriptor.engine(), generation, "tenant pool replaced");
                self.drain(&descriptor.name, old).await;
            }
            Install::Superseded(fresh) => {
                tracing::warn!(tenant = %descriptor.name, generation, "newer pool already installed, discarding this one");
                self.drain(&descriptor.name, fresh).await;
            }
        }
        Ok(())
    }

    /// Remove and drain the pool for `name`. Returns whether a pool was live.
    pub async fn remove(&self, name: &str) -> bool {
        let removed = {
            let pending = self.pending.get(name);
            let generation = self.next_generation();
            match self.slots.entry(name.to_string()) {
                Entry::Occupied(mut entry) => {
                    if entry.get().generation > generation {
                        None
                    } else if pending.is_some() {
                        let slot = entry.get_mut();
                        slot.generation = generation;
                        slot.pool.take()
                    } else {
                        entry.remove().pool
                    }
                }
                Entry::Vacant(entry) => {
                    if pending.is_some() {
                        entry.insert(Slot {
                            generation,
                            pool: None,
                        });
                    }
                    None
                }
            }
        };
        match removed {
            Some(pool) => {
                self.drain(name, pool).await;
                tracing::info!(tenant = %name, "tenant pool removed");
                true
            }
            None => false,
        }
    }

    /// Throwaway single-connection check. Errors only on a malformed descriptor.
    pub async fn test_connectivity(&self, descriptor: &TenantDescriptor) -> Result<bool, RegistryError> {
        let url = validate_descriptor(descriptor)?;
        Ok(probe_connectivity(descriptor, &url.tenant_address(), &self.policy).await)
    }

    /// Close every tenant pool, then the fallback.
    pub async fn shutdown(&self) {
        for name in self.tenant_names() {
            self.remove(&name).await;
        }
        self.fallback.close().await;
        tracing::info!("pool registry shut down");
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Take a ticket and record it as pending, atomically with respect to `remove`.
    fn begin_write(&self, name: &str) -> u64 {
        let mut pending = self.pending.entry(name.to_string()).or_default();
        let generation = self.next_generation();
        pending.push(generation);
        generation
    }

    /// Retire a ticket and drop a tombstone no pending write can be older than.
    fn end_write(&self, name: &str, generation: u64) {
        let Entry::Occupied(mut pending) = self.pending.entry(name.to_string()) else {
            return;
        };
        pending.get_mut().retain(|&g| g != generation);
        let oldest = pending.get().iter().copied().min();
        self.slots.remove_if(name, |_, slot| {
            slot.pool.is_none() && oldest.map_or(true, |oldest| slot.generation < oldest)
        });
        if pending.get().is_empty() {
            pending.remove();
        }
    }

    /// Entries in the routing table, tombstones included.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    fn install(&self, name: &str, generation: u64, pool: TenantPool) -> Install {
        match self.slots.entry(name.to_string()) {
            Entry::Occupied(mut entry) => {
                let slot = entry.get_mut();
                if slot.generation > generation {
                    return Install::Superseded(pool);
                }
                slot.generation = generation;
                Install::Installed {
                    replaced: slot.pool.replace(pool),
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(Slot {
                    generation,
                    pool: Some(pool),
                });
                Install::Installed { replaced: None }
            }
        }
    }

    async fn drain(&self, name: &str, pool: TenantPool) {
        if tokio::time::timeout(self.policy.drain_timeout, pool.close()).await.is_err() {
            tracing::warn!(
                tenant = %name,
                open = pool.size(),
                "drain timed out; remaining connections close when returned"
            );
        }
    }
}
