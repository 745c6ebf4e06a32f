// src/deps/tracker.rs

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, RwLock};

use tracing::{debug, warn};

use crate::metadata::{MetadataError, PackageMetadataProvider};
use crate::types::PackageName;

type Cache = RwLock<HashMap<PackageName, Vec<PackageName>>>;

/// Per-package dependency cache, filtered to a fixed valid set.
///
/// Caches are owned by the instance, so independent runs never share
/// state. Two threads missing on the same key both compute the answer;
/// the first insert wins and the second result is identical, so the race
/// is harmless.
pub struct DependencyTracker {
    provider: Arc<dyn PackageMetadataProvider>,
    valid: BTreeSet<PackageName>,
    direct: Cache,
    transitive: Cache,
    dependents: Cache,
}

impl fmt::Debug for DependencyTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyTracker")
            .field("valid", &self.valid)
            .finish_non_exhaustive()
    }
}

impl DependencyTracker {
    pub fn new(
        provider: Arc<dyn PackageMetadataProvider>,
        valid: impl IntoIterator<Item = PackageName>,
    ) -> Self {
        Self {
            provider,
            valid: valid.into_iter().collect(),
            direct: RwLock::default(),
            transitive: RwLock::default(),
            dependents: RwLock::default(),
        }
    }

    /// Tracker over every package the provider knows.
    pub fn for_all_packages(provider: Arc<dyn PackageMetadataProvider>) -> Self {
        let valid = provider.list();
        Self::new(provider, valid)
    }

    /// Fresh tracker sharing this provider but filtering to `valid`.
    pub fn with_valid_set(&self, valid: impl IntoIterator<Item = PackageName>) -> Self {
        Self::new(Arc::clone(&self.provider), valid)
    }

    pub fn provider(&self) -> &Arc<dyn PackageMetadataProvider> {
        &self.provider
    }

    pub fn valid_set(&self) -> &BTreeSet<PackageName> {
        &self.valid
    }

    pub fn is_valid(&self, pkg: &str) -> bool {
        self.valid.contains(pkg)
    }

    /// Direct dependencies of `pkg` that are in the valid set.
    pub fn direct_deps(&self, pkg: &str) -> Vec<PackageName> {
        cached(&self.direct, pkg, || {
            let deps = self
                .provider
                .direct_dependencies(pkg)
                .unwrap_or_else(|e| self.no_edges(pkg, e));
            self.filter_valid(deps)
        })
    }

    /// Transitive dependencies of `pkg` that are in the valid set.
    pub fn transitive_deps(&self, pkg: &str) -> Vec<PackageName> {
        cached(&self.transitive, pkg, || {
            let deps = self
                .provider
                .transitive_dependencies(pkg)
                .unwrap_or_else(|e| self.no_edges(pkg, e));
            self.filter_valid(deps)
        })
    }

    /// Valid packages that transitively depend on `pkg`.
    pub fn dependents(&self, pkg: &str) -> Vec<PackageName> {
        cached(&self.dependents, pkg, || {
            self.valid
                .iter()
                .filter(|candidate| candidate.as_str() != pkg)
                .filter(|candidate| self.transitive_deps(candidate).iter().any(|d| d == pkg))
                .cloned()
                .collect()
        })
    }

    /// Drop every cached answer.
    pub fn reset(&self) {
        for cache in [&self.direct, &self.transitive, &self.dependents] {
            cache
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .clear();
        }
        debug!("dependency tracker caches cleared");
    }

    fn filter_valid(&self, deps: Vec<PackageName>) -> Vec<PackageName> {
        deps.into_iter().filter(|d| self.valid.contains(d)).collect()
    }

    fn no_edges(&self, pkg: &str, err: MetadataError) -> Vec<PackageName> {
        warn!(package = %pkg, error = %err, "metadata lookup failed; package contributes no dependency edges");
        Vec::new()
    }
}

fn cached(cache: &Cache, key: &str, compute: impl FnOnce() -> Vec<PackageName>) -> Vec<PackageName> {
    {
        let guard = cache.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(hit) = guard.get(key) {
            return hit.clone();
        }
    }

    // Computed outside the lock; a concurrent miss computes the same value.
    let value = compute();

    let mut guard = cache.write().unwrap_or_else(|poisoned| poisoned.into_inner());
    guard.entry(key.to_string()).or_insert(value).clone()
}
