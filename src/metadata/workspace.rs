// src/metadata/workspace.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::config::ConfigFile;
use crate::metadata::{MetadataError, PackageMetadataProvider};
use crate::types::PackageName;

#[derive(Debug, Clone)]
struct PackageEntry {
    dir: PathBuf,
    depends: Vec<PackageName>,
}

/// Metadata provider backed by the `[package.<name>]` tables of a
/// workspace file.
#[derive(Debug, Clone)]
pub struct WorkspaceMetadata {
    packages: BTreeMap<PackageName, PackageEntry>,
}

impl WorkspaceMetadata {
    pub fn from_config(cfg: &ConfigFile) -> Self {
        let packages = cfg
            .package
            .iter()
            .filter_map(|(name, pkg)| {
                let dir = cfg.package_dir(name)?;
                Some((
                    name.clone(),
                    PackageEntry {
                        dir,
                        depends: pkg.depends.clone(),
                    },
                ))
            })
            .collect();

        Self { packages }
    }
}

impl PackageMetadataProvider for WorkspaceMetadata {
    fn direct_dependencies(&self, pkg: &str) -> Result<Vec<PackageName>, MetadataError> {
        self.packages
            .get(pkg)
            .map(|e| e.depends.clone())
            .ok_or_else(|| MetadataError::NotFound(pkg.to_string()))
    }

    fn path(&self, pkg: &str) -> Result<PathBuf, MetadataError> {
        self.packages
            .get(pkg)
            .map(|e| e.dir.clone())
            .ok_or_else(|| MetadataError::NotFound(pkg.to_string()))
    }

    fn list(&self) -> Vec<PackageName> {
        self.packages.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RawConfigFile;

    fn workspace() -> WorkspaceMetadata {
        let raw: RawConfigFile = toml::from_str(
            r#"
[package.e]
path = "e"

[package.f]
path = "f"

[package.d]
path = "d"
depends = ["e", "f"]

[package.c]
path = "c"
depends = ["d", "ghost"]
"#,
        )
        .unwrap();
        let cfg = ConfigFile::try_from(raw).unwrap().with_root("/ws");
        WorkspaceMetadata::from_config(&cfg)
    }

    #[test]
    fn direct_dependencies_are_unfiltered() {
        let md = workspace();
        assert_eq!(md.direct_dependencies("c").unwrap(), vec!["d", "ghost"]);
        assert_eq!(
            md.direct_dependencies("nope"),
            Err(MetadataError::NotFound("nope".to_string()))
        );
    }

    #[test]
    fn transitive_walk_tolerates_unknown_nodes() {
        let md = workspace();
        let deps = md.transitive_dependencies("c").unwrap();
        assert_eq!(deps, vec!["d", "e", "f", "ghost"]);
    }

    #[test]
    fn path_is_anchored_at_root() {
        let md = workspace();
        assert_eq!(md.path("d").unwrap(), PathBuf::from("/ws/d"));
        assert!(md.path("ghost").is_err());
        assert_eq!(md.list(), vec!["c", "d", "e", "f"]);
    }
}
