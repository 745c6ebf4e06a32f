use std::collections::BTreeMap;

use pkgmake::config::{ConfigFile, ConfigSection, MarkerSection, PackageConfig, RawConfigFile};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ManifestBuilder {
    raw: RawConfigFile,
}

impl ManifestBuilder {
    pub fn new() -> Self {
        Self {
            raw: RawConfigFile {
                config: ConfigSection::default(),
                markers: MarkerSection::default(),
                package: BTreeMap::new(),
            },
        }
    }

    pub fn with_package(mut self, name: &str, pkg: PackageConfig) -> Self {
        self.raw.package.insert(name.to_string(), pkg);
        self
    }

    /// Shorthand: package `name` at path `name` with `deps`.
    pub fn package(self, name: &str, deps: &[&str]) -> Self {
        let pkg = PackageBuilder::new(name).depends_on(deps).build();
        self.with_package(name, pkg)
    }

    pub fn jobs(mut self, jobs: usize) -> Self {
        self.raw.config.jobs = jobs;
        self
    }

    pub fn robust(mut self, robust: bool) -> Self {
        self.raw.config.robust = robust;
        self
    }

    pub fn build_command(mut self, cmd: &str, args: &[&str]) -> Self {
        self.raw.config.build_command = cmd.to_string();
        self.raw.config.build_args = args.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn tick_ms(mut self, tick_ms: u64) -> Self {
        self.raw.config.tick_ms = tick_ms;
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.raw
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.raw).expect("Failed to build valid config from builder")
    }
}

impl Default for ManifestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `PackageConfig`.
pub struct PackageBuilder {
    pkg: PackageConfig,
}

impl PackageBuilder {
    pub fn new(path: &str) -> Self {
        Self {
            pkg: PackageConfig {
                path: path.to_string(),
                depends: Vec::new(),
            },
        }
    }

    pub fn depends_on(mut self, deps: &[&str]) -> Self {
        self.pkg.depends.extend(deps.iter().map(|d| d.to_string()));
        self
    }

    pub fn build(self) -> PackageConfig {
        self.pkg
    }
}
