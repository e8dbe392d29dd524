#![deny(warnings)]

//! `alchemy-build`: generate the apparatus plugin and package the release.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pipeline::{BuildReport, Pipeline, RunOptions};
use std::path::{Path, PathBuf};
use toolchain::SystemRunner;
use tracing::info;
use tracing_subscriber::EnvFilter;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_SHA"),
    " ",
    env!("BUILD_DATE"),
    ")"
);

#[derive(Parser)]
#[command(name = "alchemy-build")]
#[command(about = "Build and package the alchemy apparatus plugins", long_about = None)]
#[command(version = VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the whole build: generate, compile, stage and archive
    Build {
        /// Build manifest
        #[arg(short, long, env = "ALCHEMY_MANIFEST", default_value = "build.yaml")]
        manifest: PathBuf,

        /// Keep the staging directory after archiving
        #[arg(long)]
        keep_staging: bool,

        /// Keep the intermediate YAML documents the compiler consumes
        #[arg(long)]
        keep_intermediate: bool,

        /// Print the build report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate the apparatus document for one ingredient set, no tools run
    Generate {
        /// Ingredient set name from the manifest
        #[arg(short, long)]
        set: String,

        /// Line appended to the header description
        #[arg(long)]
        version_line: Option<String>,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        out: Option<PathBuf>,

        #[arg(short, long, env = "ALCHEMY_MANIFEST", default_value = "build.yaml")]
        manifest: PathBuf,
    },

    /// Recompute the header record count of a document in place
    Recount {
        /// Plugin document (.esp.yaml)
        document: PathBuf,
    },

    /// Round-trip a hand-written document through the compiler
    Reformat {
        /// Plugin path without the .yaml extension
        stem: PathBuf,

        #[arg(short, long, env = "ALCHEMY_MANIFEST", default_value = "build.yaml")]
        manifest: PathBuf,
    },
}

fn print_report(report: &BuildReport) {
    for a in &report.apparatus {
        println!(
            "apparatus {} | kinds: {} | items: {} | scripts: {} | books: {} | records: {} | {}",
            a.set,
            a.useful_kinds.len(),
            a.items,
            a.add_scripts + a.check_scripts + a.del_scripts,
            a.level_books,
            a.records,
            a.artifact.display()
        );
    }
    for p in &report.plugins {
        println!("plugin {}", p.display());
    }
    if let Some(archive) = &report.archive {
        println!("archive {}", archive.display());
    }
}

fn open<'r>(manifest: &Path, runner: &'r SystemRunner) -> Result<Pipeline<'r, SystemRunner>> {
    Pipeline::from_file(manifest, runner)
        .with_context(|| format!("loading manifest {}", manifest.display()))
}

fn main() -> Result<()> {
    // Logs go to stderr so reports on stdout stay parseable.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let runner = SystemRunner;
    match cli.command {
        Commands::Build {
            manifest,
            keep_staging,
            keep_intermediate,
            json,
        } => {
            info!(manifest = %manifest.display(), version = VERSION, "starting build");
            let pipeline = open(&manifest, &runner)?;
            let options = RunOptions {
                keep_staging,
                keep_intermediate,
            };
            let report = pipeline.run(&options).context("build failed")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }
        Commands::Generate {
            set,
            version_line,
            out,
            manifest,
        } => {
            let pipeline = open(&manifest, &runner)?;
            let generated = pipeline.generate(&set, version_line.as_deref())?;
            match out {
                Some(path) => generated.document.write(&path)?,
                None => print!("{}", generated.document.to_yaml()?),
            }
        }
        Commands::Recount { document } => {
            let count = plugin::recount_file(&document)
                .with_context(|| format!("recounting {}", document.display()))?;
            println!("{}: {} records", document.display(), count);
        }
        Commands::Reformat { stem, manifest } => {
            let pipeline = open(&manifest, &runner)?;
            pipeline
                .reformat(&stem)
                .with_context(|| format!("reformatting {}", stem.display()))?;
            info!(stem = %stem.display(), "reformatted");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn build_defaults() {
        let cli = Cli::try_parse_from(["alchemy-build", "build", "--json"]).unwrap();
        match cli.command {
            Commands::Build {
                manifest,
                keep_staging,
                json,
                ..
            } => {
                assert!(json);
                assert!(!keep_staging);
                // The env var may override the default in CI.
                assert!(!manifest.as_os_str().is_empty());
            }
            _ => panic!("expected build"),
        }
    }

    #[test]
    fn generate_requires_set() {
        assert!(Cli::try_parse_from(["alchemy-build", "generate"]).is_err());
        let cli =
            Cli::try_parse_from(["alchemy-build", "generate", "--set", "eva", "-o", "x.yaml"])
                .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Generate { ref set, out: Some(_), .. } if set == "eva"
        ));
    }
}
