// src/flags/tracker.rs

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, RwLock};

use tracing::{debug, info, warn};

use crate::deps::DependencyTracker;
use crate::errors::Result;
use crate::flags::markers::MarkerStore;
use crate::types::{Marker, PackageName};

const NOBUILD_CONTENTS: &str = "created by pkgmake to mark as installed\n";

/// Raw marker presence for one package, probed once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PackageFlags {
    pub blacklisted: bool,
    pub nobuild: bool,
    pub has_descriptor: bool,
}

/// Single classification of a package, in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageState {
    Normal,
    Blacklisted,
    PreInstalled,
    MissingDescriptor,
}

impl From<PackageFlags> for PackageState {
    fn from(flags: PackageFlags) -> Self {
        if flags.blacklisted {
            PackageState::Blacklisted
        } else if flags.nobuild {
            PackageState::PreInstalled
        } else if !flags.has_descriptor {
            PackageState::MissingDescriptor
        } else {
            PackageState::Normal
        }
    }
}

impl fmt::Display for PackageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PackageState::Normal => "normal",
            PackageState::Blacklisted => "blacklisted",
            PackageState::PreInstalled => "installed",
            PackageState::MissingDescriptor => "no build descriptor",
        })
    }
}

/// Whether a package should be built, and whether its dependents may
/// still be built if it is not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildabilityVerdict {
    pub buildable: bool,
    pub blocks_dependents: bool,
    pub reason: String,
}

impl BuildabilityVerdict {
    fn buildable() -> Self {
        Self {
            buildable: true,
            blocks_dependents: false,
            reason: String::new(),
        }
    }
}

impl fmt::Display for BuildabilityVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.buildable {
            f.write_str("buildable")
        } else {
            f.write_str(&self.reason)
        }
    }
}

/// Computes per-package buildability from markers and failed ancestors.
///
/// Each package is probed at most once (modulo concurrent misses).
/// A blacklisted package is registered as a blacklist source against
/// itself and every transitive dependent, so later lookups for those
/// dependents do not have to walk the graph again.
pub struct PackageFlagTracker {
    deps: Arc<DependencyTracker>,
    markers: Arc<dyn MarkerStore>,
    flags: RwLock<HashMap<PackageName, PackageFlags>>,
    /// dependent -> blacklisted packages it (transitively) depends on.
    blacklist_sources: RwLock<HashMap<PackageName, BTreeSet<PackageName>>>,
}

impl fmt::Debug for PackageFlagTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackageFlagTracker").finish_non_exhaustive()
    }
}

impl PackageFlagTracker {
    pub fn new(deps: Arc<DependencyTracker>, markers: Arc<dyn MarkerStore>) -> Self {
        Self {
            deps,
            markers,
            flags: RwLock::default(),
            blacklist_sources: RwLock::default(),
        }
    }

    /// Marker flags for `pkg`, probing the store on first use.
    pub fn flags(&self, pkg: &str) -> PackageFlags {
        if let Some(hit) = self.read_flags().get(pkg) {
            return *hit;
        }

        let flags = self.probe(pkg);

        if flags.blacklisted {
            self.register_blacklisted(pkg);
        }

        *self
            .flags
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(pkg.to_string())
            .or_insert(flags)
    }

    pub fn state(&self, pkg: &str) -> PackageState {
        self.flags(pkg).into()
    }

    /// Blacklisted packages among `pkg` and its transitive dependencies.
    pub fn is_blacklisted(&self, pkg: &str) -> Vec<PackageName> {
        let mut sources: BTreeSet<PackageName> = BTreeSet::new();

        if self.flags(pkg).blacklisted {
            sources.insert(pkg.to_string());
        }
        for dep in self.deps.transitive_deps(pkg) {
            if self.flags(&dep).blacklisted {
                sources.insert(dep);
            }
        }
        if let Some(registered) = self.read_sources().get(pkg) {
            sources.extend(registered.iter().cloned());
        }

        sources.into_iter().collect()
    }

    pub fn has_nobuild(&self, pkg: &str) -> bool {
        self.flags(pkg).nobuild
    }

    pub fn has_descriptor(&self, pkg: &str) -> bool {
        self.flags(pkg).has_descriptor
    }

    /// Decide whether `pkg` should be handed to the build action.
    ///
    /// Every rule that fires contributes to `reason`. Dependents are
    /// blocked when a failed ancestor or a blacklist is involved; a
    /// no-build marker or a missing descriptor only skips `pkg` itself.
    pub fn can_build(
        &self,
        pkg: &str,
        use_blacklist: bool,
        failed_ancestors: &[PackageName],
        require_build_descriptor: bool,
    ) -> BuildabilityVerdict {
        let mut verdict = BuildabilityVerdict::buildable();
        let mut reasons: Vec<String> = Vec::new();

        if !failed_ancestors.is_empty() {
            let ancestors = self.deps.transitive_deps(pkg);
            let failed: Vec<&str> = ancestors
                .iter()
                .filter(|a| failed_ancestors.contains(*a))
                .map(String::as_str)
                .collect();
            if !failed.is_empty() {
                verdict.buildable = false;
                verdict.blocks_dependents = true;
                reasons.push(format!(
                    "dependencies failed: {}",
                    failed.join(", ")
                ));
            }
        }

        if use_blacklist {
            let sources = self.is_blacklisted(pkg);
            if !sources.is_empty() {
                verdict.buildable = false;
                verdict.blocks_dependents = true;
                reasons.push(format!("blacklisted by {}", sources.join(", ")));
            }
        }

        if self.has_nobuild(pkg) {
            verdict.buildable = false;
            reasons.push("no-build marker present (already installed)".to_string());
        }

        if require_build_descriptor && !self.has_descriptor(pkg) {
            verdict.buildable = false;
            reasons.push("no build descriptor".to_string());
        }

        verdict.reason = reasons.join("; ");
        verdict
    }

    /// Mark `pkg` as already installed. Idempotent.
    pub fn add_nobuild(&self, pkg: &str) -> Result<()> {
        if self.markers.has_marker(pkg, Marker::NoBuild)? {
            debug!(package = %pkg, "no-build marker already present");
        } else {
            self.markers
                .create_marker(pkg, Marker::NoBuild, NOBUILD_CONTENTS)?;
            info!(package = %pkg, "marked as installed");
        }
        self.update_flags(pkg, |f| f.nobuild = true);
        Ok(())
    }

    /// Remove the installed mark from `pkg`. Idempotent.
    pub fn remove_nobuild(&self, pkg: &str) -> Result<()> {
        if self.markers.has_marker(pkg, Marker::NoBuild)? {
            self.markers.remove_marker(pkg, Marker::NoBuild)?;
            info!(package = %pkg, "removed installed mark");
        } else {
            debug!(package = %pkg, "no-build marker already absent");
        }
        self.update_flags(pkg, |f| f.nobuild = false);
        Ok(())
    }

    fn probe(&self, pkg: &str) -> PackageFlags {
        let probe = |marker: Marker| -> Option<bool> {
            match self.markers.has_marker(pkg, marker) {
                Ok(present) => Some(present),
                Err(e) => {
                    warn!(package = %pkg, %marker, error = %e, "marker probe failed");
                    None
                }
            }
        };

        // An unreadable package counts as having nothing to build.
        let flags = PackageFlags {
            blacklisted: probe(Marker::Blacklist).unwrap_or(false),
            nobuild: probe(Marker::NoBuild).unwrap_or(false),
            has_descriptor: probe(Marker::Descriptor).unwrap_or(false),
        };
        debug!(package = %pkg, ?flags, "classified package");
        flags
    }

    fn register_blacklisted(&self, pkg: &str) {
        let dependents = self.deps.dependents(pkg);
        warn!(
            package = %pkg,
            dependents = dependents.len(),
            "blacklist marker found; blocking package and its dependents"
        );

        let mut sources = self
            .blacklist_sources
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for target in std::iter::once(pkg.to_string()).chain(dependents) {
            sources.entry(target).or_default().insert(pkg.to_string());
        }
    }

    fn update_flags(&self, pkg: &str, edit: impl FnOnce(&mut PackageFlags)) {
        let mut guard = self
            .flags
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(flags) = guard.get_mut(pkg) {
            edit(flags);
        }
    }

    fn read_flags(&self) -> std::sync::RwLockReadGuard<'_, HashMap<PackageName, PackageFlags>> {
        self.flags.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read_sources(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, HashMap<PackageName, BTreeSet<PackageName>>> {
        self.blacklist_sources
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
