#![deny(warnings)]

//! Build orchestration: generate the apparatus plugin, compile the plain
//! plugins, stage the data tree and archive it.
//!
//! Every step runs in sequence and the first failure aborts the build. On
//! failure the staging directory is left behind for inspection.

pub mod driver;
pub mod manifest;
pub mod package;

use alchemy_core::{ConfigError, GeneratorConfig};
use apparatus::Expansion;
use ingredients::{IngredientSet, LoadError};
use plugin::{PluginBuilder, PluginDocument, PluginError};
use serde::Serialize;
use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use toolchain::{yaml_path, Archiver, AutomationDriver, CommandRunner, Espa, ToolError};
use tracing::{info, warn};

pub use driver::{render_driver_script, DriverFragments};
pub use manifest::{ApparatusJob, ApparatusSettings, BuildManifest};

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("io error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid yaml in {}: {source}", .path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid generator config: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Plugin(#[from] PluginError),
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error("manifest has no apparatus section")]
    NoApparatus,
    #[error("unknown ingredient set {0:?}")]
    UnknownSet(String),
    #[error("refusing staging dir {}: {reason}", .path.display())]
    UnsafeStaging { path: PathBuf, reason: &'static str },
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RunOptions {
    /// Leave the staging directory after archiving.
    pub keep_staging: bool,
    /// Pass `-k` to the compiler so intermediate documents survive.
    pub keep_intermediate: bool,
}

/// Generated apparatus document, before any tool has touched it.
#[derive(Clone, Debug)]
pub struct GeneratedPlugin {
    pub set: String,
    pub ingredients: usize,
    pub document: PluginDocument,
    pub expansion: Expansion,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct ApparatusReport {
    pub set: String,
    pub artifact: PathBuf,
    pub ingredients: usize,
    pub useful_kinds: Vec<String>,
    pub items: usize,
    pub add_scripts: usize,
    pub check_scripts: usize,
    pub del_scripts: usize,
    pub level_books: usize,
    pub records: u64,
}

impl ApparatusReport {
    fn new(generated: &GeneratedPlugin, artifact: PathBuf) -> Self {
        let e = &generated.expansion;
        Self {
            set: generated.set.clone(),
            artifact,
            ingredients: generated.ingredients,
            useful_kinds: e.useful_kinds.clone(),
            items: e.items.len(),
            add_scripts: e.add_scripts.len(),
            check_scripts: e.check_scripts.len(),
            del_scripts: e.del_scripts.len(),
            level_books: e.level_books.len(),
            records: generated.document.expected_count(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct BuildReport {
    pub apparatus: Vec<ApparatusReport>,
    pub plugins: Vec<PathBuf>,
    pub archive: Option<PathBuf>,
}

/// A build described by a manifest, driving tools through `runner`.
pub struct Pipeline<'r, R: CommandRunner + ?Sized> {
    manifest: BuildManifest,
    base: PathBuf,
    runner: &'r R,
    espa: Espa,
}

impl<'r, R: CommandRunner + ?Sized> Pipeline<'r, R> {
    /// `base` is the directory relative manifest paths resolve against.
    pub fn new(manifest: BuildManifest, base: PathBuf, runner: &'r R) -> Self {
        let espa = Espa::new(manifest.espa.program.as_str(), manifest.espa.language.as_str());
        Self {
            manifest,
            base,
            runner,
            espa,
        }
    }

    pub fn from_file(path: &Path, runner: &'r R) -> Result<Self, BuildError> {
        let (manifest, base) = BuildManifest::load(path)?;
        Ok(Self::new(manifest, base, runner))
    }

    pub fn manifest(&self) -> &BuildManifest {
        &self.manifest
    }

    fn resolve<P: AsRef<Path>>(&self, path: P) -> PathBuf {
        self.base.join(path)
    }

    /// The staging dir is wiped on every run, so it must be a plain
    /// relative path strictly below the manifest directory and must not
    /// hold any build input or the archive.
    fn staging_dir(&self) -> Result<PathBuf, BuildError> {
        let rel = &self.manifest.staging_dir;
        let unsafe_staging = |reason| BuildError::UnsafeStaging {
            path: rel.clone(),
            reason,
        };
        if rel.as_os_str().is_empty() {
            return Err(unsafe_staging("empty path"));
        }
        if !rel.components().all(|c| matches!(c, Component::Normal(_))) {
            return Err(unsafe_staging(
                "must be relative to the manifest without `.` or `..`",
            ));
        }
        let staging = self.resolve(rel);
        let archive = self.resolve(format!("{}.7z", self.manifest.archive));
        let mut inputs = vec![self.resolve(&self.manifest.data_dir), archive];
        inputs.extend(self.manifest.plugins.iter().map(|p| self.resolve(&p.source)));
        if inputs.iter().any(|p| p.starts_with(&staging)) {
            return Err(unsafe_staging("contains build inputs or the archive"));
        }
        Ok(staging)
    }

    fn apparatus(&self) -> Result<&ApparatusSettings, BuildError> {
        self.manifest.apparatus.as_ref().ok_or(BuildError::NoApparatus)
    }

    fn generator_config(&self, settings: &ApparatusSettings) -> Result<GeneratorConfig, BuildError> {
        let config: GeneratorConfig = manifest::read_yaml(&self.resolve(&settings.generator))?;
        Ok(config.normalized()?)
    }

    /// Build the apparatus document for `set` without running any tool.
    ///
    /// Ingredients merge in order base, extras, set files; later
    /// definitions replace earlier ones. Extra plugins are also copied
    /// verbatim after the header. `version`, when given, is appended to the
    /// header description.
    pub fn generate(&self, set: &str, version: Option<&str>) -> Result<GeneratedPlugin, BuildError> {
        let settings = self.apparatus()?;
        let set_files = settings
            .sets
            .get(set)
            .ok_or_else(|| BuildError::UnknownSet(set.to_string()))?;
        let config = self.generator_config(settings)?;

        let mut merged = IngredientSet::new();
        for file in &settings.ingredients {
            merged.merge_file(&self.resolve(file))?;
        }
        let mut passthrough = Vec::new();
        for file in &settings.extras {
            let path = self.resolve(file);
            merged.merge_file(&path)?;
            passthrough.extend(ingredients::load_records(&path)?);
        }
        for file in set_files {
            merged.merge_file(&self.resolve(file))?;
        }
        let count = merged.len();
        let sorted = merged.into_sorted();
        let expansion = apparatus::expand(&sorted, &config);
        if expansion.useful_kinds.is_empty() {
            warn!(set, "no ingredient reaches any level; only level books generated");
        }

        let header = ingredients::load_records(&self.resolve(&settings.header))?;
        let mut builder = PluginBuilder::new(header)?;
        if let Some(v) = version {
            builder = builder.append_description(v)?;
        }
        let document = builder
            .extend(passthrough)
            .extend_records(expansion.records())
            .finish()?;
        info!(
            set,
            ingredients = count,
            useful_kinds = expansion.useful_kinds.len(),
            records = document.expected_count(),
            "generated apparatus document"
        );
        Ok(GeneratedPlugin {
            set: set.to_string(),
            ingredients: count,
            document,
            expansion,
        })
    }

    /// Generate, compile, recompile scripts, rename and verify one job.
    pub fn build_apparatus(
        &self,
        job: &ApparatusJob,
        options: &RunOptions,
    ) -> Result<ApparatusReport, BuildError> {
        let settings = self.apparatus()?;
        let generated = self.generate(&job.set, Some(&job.version))?;

        let stem = self.resolve(format!("{}alchemy_{}.esp", job.output_prefix, job.set));
        generated.document.write(&yaml_path(&stem))?;
        self.espa
            .assemble(self.runner, &stem, options.keep_intermediate, job.timestamp)?;

        let fragments = DriverFragments::load(&settings.driver, &self.base)?;
        let script = render_driver_script(
            &fragments,
            &job.set,
            &settings.driver.static_scripts,
            generated.expansion.script_names(),
        );
        let script_path = self.resolve(format!("alchemy_{}.au3", job.set));
        fs::write(&script_path, script).map_err(|source| BuildError::Io {
            path: script_path.clone(),
            source,
        })?;
        AutomationDriver::new(self.manifest.automation.program.as_str())
            .run(self.runner, &script_path)?;
        fs::remove_file(&script_path).map_err(|source| BuildError::Io {
            path: script_path.clone(),
            source,
        })?;

        let artifact = self.resolve(format!("{}{}.esp", settings.artifact_stem, job.suffix));
        fs::rename(&stem, &artifact).map_err(|source| BuildError::Io {
            path: stem.clone(),
            source,
        })?;
        self.espa.disassemble(self.runner, &artifact)?;
        info!(set = %job.set, artifact = %artifact.display(), "apparatus plugin built");
        Ok(ApparatusReport::new(&generated, artifact))
    }

    /// The whole build: version gate, apparatus jobs, staging, archive.
    pub fn run(&self, options: &RunOptions) -> Result<BuildReport, BuildError> {
        let staging = self.staging_dir()?;
        self.espa.check_version(self.runner, &self.manifest.espa.version)?;
        let mut report = BuildReport::default();

        if let Some(settings) = &self.manifest.apparatus {
            for job in &settings.jobs {
                report.apparatus.push(self.build_apparatus(job, options)?);
            }
        }

        package::recreate_dir(&staging)?;
        package::copy_tree(
            &self.resolve(&self.manifest.data_dir),
            &staging.join(&self.manifest.data_dir),
        )?;

        for entry in &self.manifest.plugins {
            let target = staging.join(&entry.target);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|source| BuildError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
            let source = self.resolve(&entry.source);
            fs::copy(&source, yaml_path(&target)).map_err(|e| BuildError::Io {
                path: source.clone(),
                source: e,
            })?;
            self.espa
                .assemble(self.runner, &target, options.keep_intermediate, entry.timestamp)?;
            report.plugins.push(target);
        }

        let archive = self.resolve(format!("{}.7z", self.manifest.archive));
        Archiver::new(self.manifest.archiver.program.as_str()).archive(
            self.runner,
            &staging,
            &archive,
        )?;
        report.archive = Some(archive);

        if !options.keep_staging {
            fs::remove_dir_all(&staging).map_err(|source| BuildError::Io {
                path: staging.clone(),
                source,
            })?;
        }
        Ok(report)
    }

    /// Normalize a hand-written document by round-tripping it through the
    /// compiler.
    pub fn reformat(&self, stem: &Path) -> Result<(), BuildError> {
        Ok(self.espa.reformat(self.runner, &self.resolve(stem))?)
    }
}
