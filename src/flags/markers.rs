// src/flags/markers.rs

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::MarkerSection;
use crate::errors::{PkgmakeError, Result};
use crate::fs::FileSystem;
use crate::metadata::PackageMetadataProvider;
use crate::types::Marker;

/// Presence test / create / remove for per-package markers.
pub trait MarkerStore: Send + Sync {
    fn has_marker(&self, pkg: &str, marker: Marker) -> Result<bool>;
    fn create_marker(&self, pkg: &str, marker: Marker, contents: &str) -> Result<()>;
    fn remove_marker(&self, pkg: &str, marker: Marker) -> Result<()>;
}

/// Markers as plain files inside each package directory.
pub struct FsMarkerStore {
    fs: Arc<dyn FileSystem>,
    provider: Arc<dyn PackageMetadataProvider>,
    names: MarkerSection,
}

impl FsMarkerStore {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        provider: Arc<dyn PackageMetadataProvider>,
        names: MarkerSection,
    ) -> Self {
        Self {
            fs,
            provider,
            names,
        }
    }

    fn marker_path(&self, pkg: &str, marker: Marker) -> Result<PathBuf> {
        let dir = self
            .provider
            .path(pkg)
            .map_err(|_| PkgmakeError::PackageNotFound(pkg.to_string()))?;
        let file = match marker {
            Marker::Blacklist => &self.names.blacklist,
            Marker::NoBuild => &self.names.nobuild,
            Marker::Descriptor => &self.names.descriptor,
        };
        Ok(dir.join(file))
    }
}

impl MarkerStore for FsMarkerStore {
    fn has_marker(&self, pkg: &str, marker: Marker) -> Result<bool> {
        let path = self.marker_path(pkg, marker)?;
        Ok(self.fs.is_file(&path))
    }

    fn create_marker(&self, pkg: &str, marker: Marker, contents: &str) -> Result<()> {
        let path = self.marker_path(pkg, marker)?;
        if self.fs.is_file(&path) {
            return Ok(());
        }
        self.fs
            .write(&path, contents.as_bytes())
            .map_err(|e| PkgmakeError::MarkerError {
                package: pkg.to_string(),
                reason: format!("creating {marker} marker: {e:#}"),
            })
    }

    fn remove_marker(&self, pkg: &str, marker: Marker) -> Result<()> {
        let path = self.marker_path(pkg, marker)?;
        if !self.fs.exists(&path) {
            return Ok(());
        }
        self.fs
            .remove_file(&path)
            .map_err(|e| PkgmakeError::MarkerError {
                package: pkg.to_string(),
                reason: format!("removing {marker} marker: {e:#}"),
            })
    }
}
