// src/metadata/mod.rs

//! Package metadata collaborator.
//!
//! The scheduler never parses manifests itself; it asks a
//! [`PackageMetadataProvider`] for direct dependencies and package
//! locations. [`WorkspaceMetadata`] serves both from a validated workspace
//! file.

use std::collections::HashSet;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::PackageName;

pub mod workspace;

pub use workspace::WorkspaceMetadata;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetadataError {
    #[error("package not found: {0}")]
    NotFound(PackageName),
}

pub trait PackageMetadataProvider: Send + Sync {
    /// Names listed as direct dependencies of `pkg`, unfiltered.
    fn direct_dependencies(&self, pkg: &str) -> Result<Vec<PackageName>, MetadataError>;

    /// Directory holding `pkg`.
    fn path(&self, pkg: &str) -> Result<PathBuf, MetadataError>;

    /// Every package this provider knows about.
    fn list(&self) -> Vec<PackageName>;

    /// Direct and indirect dependencies of `pkg`, in first-visit order.
    ///
    /// Only `pkg` itself being unknown is an error. An unknown package
    /// reached during the walk is still listed but contributes no edges.
    fn transitive_dependencies(&self, pkg: &str) -> Result<Vec<PackageName>, MetadataError> {
        let mut order = Vec::new();
        let mut seen: HashSet<PackageName> = HashSet::new();
        let mut stack: Vec<PackageName> = self.direct_dependencies(pkg)?;
        stack.reverse();

        while let Some(name) = stack.pop() {
            if name == pkg || !seen.insert(name.clone()) {
                continue;
            }
            let next = self.direct_dependencies(&name).unwrap_or_default();
            order.push(name);
            stack.extend(next.into_iter().rev());
        }

        Ok(order)
    }
}
