use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use pkgmake::fs::mock::MockFileSystem;
use pkgmake::metadata::{MetadataError, PackageMetadataProvider};
use pkgmake::types::PackageName;

/// Root under which every in-memory package lives.
pub const WORKSPACE_ROOT: &str = "/ws";

/// Metadata provider over a fixed in-memory graph. Package `p` lives at
/// `/ws/p`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMetadata {
    deps: BTreeMap<PackageName, Vec<PackageName>>,
}

impl InMemoryMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn package(mut self, name: &str, deps: &[&str]) -> Self {
        self.deps
            .insert(name.to_string(), deps.iter().map(|d| d.to_string()).collect());
        self
    }

    /// The graph used throughout the scheduler scenarios:
    /// `f, e` (no deps); `d -> [e, f]`; `c -> [d]`; `b -> [c]`; `a -> [b]`.
    pub fn chain_graph() -> Self {
        Self::new()
            .package("f", &[])
            .package("e", &[])
            .package("d", &["e", "f"])
            .package("c", &["d"])
            .package("b", &["c"])
            .package("a", &["b"])
    }

    pub fn dir_of(name: &str) -> PathBuf {
        Path::new(WORKSPACE_ROOT).join(name)
    }

    /// Mock filesystem where every package has a directory and a
    /// `Makefile` descriptor.
    pub fn mock_fs(&self) -> MockFileSystem {
        let fs = MockFileSystem::new();
        for name in self.deps.keys() {
            fs.add_file(Self::dir_of(name).join("Makefile"), "all:\n");
        }
        fs
    }
}

impl PackageMetadataProvider for InMemoryMetadata {
    fn direct_dependencies(&self, pkg: &str) -> Result<Vec<PackageName>, MetadataError> {
        self.deps
            .get(pkg)
            .cloned()
            .ok_or_else(|| MetadataError::NotFound(pkg.to_string()))
    }

    fn path(&self, pkg: &str) -> Result<PathBuf, MetadataError> {
        if self.deps.contains_key(pkg) {
            Ok(Self::dir_of(pkg))
        } else {
            Err(MetadataError::NotFound(pkg.to_string()))
        }
    }

    fn list(&self) -> Vec<PackageName> {
        self.deps.keys().cloned().collect()
    }
}
