// src/config/validate.rs

use regex::Regex;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{PkgmakeError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = PkgmakeError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.config, raw.markers, raw.package))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_packages(cfg)?;
    validate_global_config(cfg)?;
    validate_markers(cfg)?;
    validate_packages(cfg)?;
    Ok(())
}

fn ensure_has_packages(cfg: &RawConfigFile) -> Result<()> {
    if cfg.package.is_empty() {
        return Err(PkgmakeError::ConfigError(
            "workspace must contain at least one [package.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    if cfg.config.tick_ms == 0 {
        return Err(PkgmakeError::ConfigError(
            "[config].tick_ms must be >= 1 (got 0)".to_string(),
        ));
    }

    if cfg.config.starvation_limit == 0 {
        return Err(PkgmakeError::ConfigError(
            "[config].starvation_limit must be >= 1 (got 0)".to_string(),
        ));
    }

    if cfg.config.build_command.trim().is_empty() {
        return Err(PkgmakeError::ConfigError(
            "[config].build_command must not be empty".to_string(),
        ));
    }

    for (key, pattern) in [
        ("skip_pattern", &cfg.config.skip_pattern),
        ("interrupt_pattern", &cfg.config.interrupt_pattern),
    ] {
        if let Err(e) = Regex::new(pattern) {
            return Err(PkgmakeError::ConfigError(format!(
                "[config].{key} is not a valid regex: {e}"
            )));
        }
    }

    Ok(())
}

fn validate_markers(cfg: &RawConfigFile) -> Result<()> {
    let m = &cfg.markers;
    for (key, value) in [
        ("blacklist", &m.blacklist),
        ("nobuild", &m.nobuild),
        ("descriptor", &m.descriptor),
    ] {
        if value.trim().is_empty() || value.contains('/') {
            return Err(PkgmakeError::ConfigError(format!(
                "[markers].{key} must be a plain file name (got {value:?})"
            )));
        }
    }
    Ok(())
}

fn validate_packages(cfg: &RawConfigFile) -> Result<()> {
    for (name, pkg) in cfg.package.iter() {
        if name.trim().is_empty() {
            return Err(PkgmakeError::ConfigError(
                "package names must not be empty".to_string(),
            ));
        }
        if pkg.path.trim().is_empty() {
            return Err(PkgmakeError::ConfigError(format!(
                "package '{name}' has an empty `path`"
            )));
        }
        if pkg.depends.iter().any(|dep| dep == name) {
            return Err(PkgmakeError::ConfigError(format!(
                "package '{name}' cannot depend on itself in `depends`"
            )));
        }
    }
    Ok(())
}
