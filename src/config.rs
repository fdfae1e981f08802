use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::foundation::{
    core::LibraryId,
    error::{OverlayError, OverlayResult},
    hash::{Fingerprint, StableHasher},
};
use crate::model::profile::Profile;

/// Environment prefix for overrides; `__` separates nested keys.
pub const ENV_PREFIX: &str = "POSTER_OVERLAY_";

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Jpeg,
    Png,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    /// 1..=100, used for JPEG output only.
    pub jpeg_quality: u8,
    pub format: OutputFormat,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            jpeg_quality: 90,
            format: OutputFormat::Jpeg,
        }
    }
}

/// Immutable configuration snapshot used for every render.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    pub icons_folder: PathBuf,
    pub profiles: Vec<Profile>,
    /// Library id to profile name.
    pub library_profiles: BTreeMap<LibraryId, String>,
    pub output: OutputSettings,
    /// Global compositing permits per logical CPU.
    pub concurrency_multiplier: f64,
    pub attribute_cache_capacity: usize,
    pub icon_refresh_ttl_secs: u64,
    pub aggregate_max_age_secs: u64,
    pub maintenance_interval_secs: u64,
    /// Font used for the rating badge; system sans-serif when absent.
    pub rating_font: Option<PathBuf>,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            icons_folder: PathBuf::from("icons"),
            profiles: Vec::new(),
            library_profiles: BTreeMap::new(),
            output: OutputSettings::default(),
            concurrency_multiplier: 1.0,
            attribute_cache_capacity: 5000,
            icon_refresh_ttl_secs: 60,
            aggregate_max_age_secs: 3600,
            maintenance_interval_secs: 300,
            rating_font: None,
        }
    }
}

impl OverlayConfig {
    /// Layer defaults, then `path` (if given), then `POSTER_OVERLAY_*` environment variables.
    pub fn load(path: Option<&Path>) -> OverlayResult<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            if !path.is_file() {
                return Err(OverlayError::config(format!(
                    "config file '{}' does not exist",
                    path.display()
                )));
            }
            figment = figment.merge(Toml::file(path));
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let cfg: Self = figment
            .extract()
            .map_err(|e| OverlayError::config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse a TOML document on top of the defaults, without environment overrides.
    pub fn from_toml_str(s: &str) -> OverlayResult<Self> {
        let cfg: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::string(s))
            .extract()
            .map_err(|e| OverlayError::config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> OverlayResult<()> {
        let mut names = BTreeSet::new();
        for p in &self.profiles {
            p.validate()?;
            if !names.insert(p.name.as_str()) {
                return Err(OverlayError::validation(format!(
                    "duplicate profile name '{}'",
                    p.name
                )));
            }
        }
        for (lib, name) in &self.library_profiles {
            if !names.contains(name.as_str()) {
                return Err(OverlayError::validation(format!(
                    "library '{lib}' maps to unknown profile '{name}'"
                )));
            }
        }
        if !(1..=100).contains(&self.output.jpeg_quality) {
            return Err(OverlayError::validation(
                "output.jpeg_quality must be in 1..=100",
            ));
        }
        if !self.concurrency_multiplier.is_finite()
            || self.concurrency_multiplier <= 0.0
            || self.concurrency_multiplier > 64.0
        {
            return Err(OverlayError::validation(
                "concurrency_multiplier must be in (0, 64]",
            ));
        }
        if self.attribute_cache_capacity == 0 {
            return Err(OverlayError::validation(
                "attribute_cache_capacity must be > 0",
            ));
        }
        Ok(())
    }

    pub fn profile(&self, name: &str) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.name == name)
    }

    /// The profile mapped to `library`; unmapped libraries get none.
    pub fn profile_for_library(&self, library: &LibraryId) -> Option<&Profile> {
        self.library_profiles
            .get(library)
            .and_then(|name| self.profile(name))
    }

    pub fn icon_refresh_ttl(&self) -> Duration {
        Duration::from_secs(self.icon_refresh_ttl_secs)
    }

    pub fn aggregate_max_age(&self) -> Duration {
        Duration::from_secs(self.aggregate_max_age_secs)
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval_secs.max(1))
    }

    /// Digest of output settings and the rating font choice.
    pub(crate) fn output_hash(&self) -> Fingerprint {
        let mut h = StableHasher::new();
        h.write_u8(self.output.jpeg_quality);
        h.write_str(self.output.format.extension());
        h.write_opt_str(self.rating_font.as_deref().and_then(Path::to_str));
        h.finish()
    }
}

#[cfg(test)]
#[path = "../tests/unit/config.rs"]
mod tests;
