//! Build manifest
//!
//! Describes the tools, the plain plugins to package and the optional
//! apparatus generation jobs. Relative paths resolve against the directory
//! holding the manifest.

use chrono::NaiveDateTime;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::BuildError;

#[derive(Debug, Clone, Deserialize)]
pub struct BuildManifest {
    #[serde(default)]
    pub espa: EspaSettings,
    #[serde(default)]
    pub archiver: ArchiverSettings,
    #[serde(default)]
    pub automation: AutomationSettings,
    /// Scratch directory mirroring the archive layout.
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,
    /// Directory copied wholesale into the staging directory.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub plugins: Vec<PluginEntry>,
    /// Archive name without the `.7z` extension.
    pub archive: String,
    #[serde(default)]
    pub apparatus: Option<ApparatusSettings>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EspaSettings {
    #[serde(default = "default_espa")]
    pub program: String,
    /// Exact version string `espa -V` must print.
    #[serde(default = "default_espa_version")]
    pub version: String,
    /// Code page / language flag passed with `-p`.
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for EspaSettings {
    fn default() -> Self {
        Self {
            program: default_espa(),
            version: default_espa_version(),
            language: default_language(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArchiverSettings {
    #[serde(default = "default_archiver")]
    pub program: String,
}

impl Default for ArchiverSettings {
    fn default() -> Self {
        Self {
            program: default_archiver(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AutomationSettings {
    #[serde(default = "default_automation")]
    pub program: String,
}

impl Default for AutomationSettings {
    fn default() -> Self {
        Self {
            program: default_automation(),
        }
    }
}

/// A hand-written plugin compiled straight into the staging directory.
#[derive(Debug, Clone, Deserialize)]
pub struct PluginEntry {
    /// Source interchange document.
    pub source: PathBuf,
    /// Plugin path inside the staging directory, without `.yaml`.
    pub target: PathBuf,
    pub timestamp: NaiveDateTime,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApparatusSettings {
    /// Generator configuration (kinds, levels, potency, templates).
    pub generator: PathBuf,
    /// Header document of the generated plugin.
    pub header: PathBuf,
    /// Base ingredient sources, merged in order.
    #[serde(default)]
    pub ingredients: Vec<PathBuf>,
    /// Extra ingredient plugins: merged, and copied verbatim into the output.
    #[serde(default)]
    pub extras: Vec<PathBuf>,
    /// Named ingredient sets merged last.
    #[serde(default)]
    pub sets: BTreeMap<String, Vec<PathBuf>>,
    pub driver: DriverSettings,
    #[serde(default = "default_artifact_stem")]
    pub artifact_stem: String,
    #[serde(default)]
    pub jobs: Vec<ApparatusJob>,
}

/// Fragments of the automation script and the scripts always recompiled.
#[derive(Debug, Clone, Deserialize)]
pub struct DriverSettings {
    pub includes: PathBuf,
    pub header: PathBuf,
    pub script: PathBuf,
    pub close: PathBuf,
    #[serde(default)]
    pub static_scripts: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApparatusJob {
    pub set: String,
    /// Prefix of the intermediate plugin file name.
    #[serde(default)]
    pub output_prefix: String,
    /// Appended to the artifact stem.
    #[serde(default)]
    pub suffix: String,
    /// Appended to the header description.
    pub version: String,
    pub timestamp: NaiveDateTime,
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("ar")
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("Data Files")
}

fn default_espa() -> String {
    "espa".to_string()
}

fn default_espa_version() -> String {
    "0.7.2".to_string()
}

fn default_language() -> String {
    "ru".to_string()
}

fn default_archiver() -> String {
    "7za".to_string()
}

fn default_automation() -> String {
    "AutoIt3.exe".to_string()
}

fn default_artifact_stem() -> String {
    "A1_Alchemy_V7_Apparatus".to_string()
}

/// Parse a YAML file into `T`.
pub(crate) fn read_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, BuildError> {
    let text = fs::read_to_string(path).map_err(|source| BuildError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&text).map_err(|source| BuildError::Yaml {
        path: path.to_path_buf(),
        source,
    })
}

impl BuildManifest {
    /// Load a manifest; returns it with the directory relative paths resolve
    /// against.
    pub fn load(path: &Path) -> Result<(Self, PathBuf), BuildError> {
        let manifest: BuildManifest = read_yaml(path)?;
        let base = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok((manifest, base))
    }
}
