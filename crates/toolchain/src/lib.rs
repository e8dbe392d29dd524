#![deny(warnings)]

//! External tool invocation for the plugin build.
//!
//! The plugin compiler (`espa`), the archiver (`7za`) and the automation
//! driver are opaque programs. Every call goes through [`CommandRunner`] so
//! the rest of the build can be exercised without the real binaries.

pub mod mock;

use chrono::{NaiveDateTime, TimeZone, Utc};
use std::ffi::{OsStr, OsString};
use std::fs::{self, FileTimes};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` failed: {status}")]
    Failed { command: String, status: String },
    #[error("{program} version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        program: String,
        expected: String,
        found: String,
    },
    #[error("timestamp {0} cannot be used as a file time")]
    Timestamp(NaiveDateTime),
    #[error("io error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ToolError + '_ {
    move |source| ToolError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// A program, its arguments and an optional working directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<OsString>,
    pub cwd: Option<PathBuf>,
}

impl Invocation {
    pub fn new<S: Into<String>>(program: S) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg<S: AsRef<OsStr>>(mut self, arg: S) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn current_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Command line for logs and error messages.
    pub fn display(&self) -> String {
        let mut s = self.program.clone();
        for a in &self.args {
            s.push(' ');
            s.push_str(&a.to_string_lossy());
        }
        s
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        cmd
    }
}

/// Narrow interface to external programs. Both methods wait for the program
/// to exit and treat a non-zero status as [`ToolError::Failed`].
pub trait CommandRunner {
    /// Run with inherited stdout/stderr.
    fn status(&self, invocation: &Invocation) -> Result<(), ToolError>;

    /// Run and return captured stdout.
    fn output(&self, invocation: &Invocation) -> Result<String, ToolError>;
}

/// Runs programs with `std::process`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemRunner;

impl SystemRunner {
    fn spawn_error(invocation: &Invocation) -> impl FnOnce(std::io::Error) -> ToolError + '_ {
        move |source| ToolError::Spawn {
            program: invocation.program.clone(),
            source,
        }
    }
}

impl CommandRunner for SystemRunner {
    fn status(&self, invocation: &Invocation) -> Result<(), ToolError> {
        debug!(command = %invocation.display(), "running");
        let status = invocation
            .command()
            .stdin(Stdio::null())
            .status()
            .map_err(Self::spawn_error(invocation))?;
        if !status.success() {
            return Err(ToolError::Failed {
                command: invocation.display(),
                status: status.to_string(),
            });
        }
        Ok(())
    }

    fn output(&self, invocation: &Invocation) -> Result<String, ToolError> {
        debug!(command = %invocation.display(), "running (captured)");
        let output = invocation
            .command()
            .stdin(Stdio::null())
            .stderr(Stdio::inherit())
            .output()
            .map_err(Self::spawn_error(invocation))?;
        if !output.status.success() {
            return Err(ToolError::Failed {
                command: invocation.display(),
                status: output.status.to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// `<stem>.yaml`, the interchange document next to a plugin.
pub fn yaml_path(stem: &Path) -> PathBuf {
    let mut s = stem.as_os_str().to_os_string();
    s.push(".yaml");
    PathBuf::from(s)
}

/// Set access and modification time of `path` to `timestamp`, read as UTC.
pub fn set_file_time(path: &Path, timestamp: NaiveDateTime) -> Result<(), ToolError> {
    let secs = Utc.from_utc_datetime(&timestamp).timestamp();
    let secs = u64::try_from(secs).map_err(|_| ToolError::Timestamp(timestamp))?;
    let time = UNIX_EPOCH + Duration::from_secs(secs);
    let file = fs::File::options()
        .write(true)
        .open(path)
        .map_err(io_error(path))?;
    file.set_times(FileTimes::new().set_accessed(time).set_modified(time))
        .map_err(io_error(path))?;
    Ok(())
}

/// The plugin compiler.
#[derive(Clone, Debug)]
pub struct Espa {
    program: String,
    language: String,
}

impl Espa {
    pub fn new<P: Into<String>, L: Into<String>>(program: P, language: L) -> Self {
        Self {
            program: program.into(),
            language: language.into(),
        }
    }

    fn base(&self) -> Invocation {
        Invocation::new(self.program.as_str())
            .arg("-p")
            .arg(&self.language)
    }

    /// Refuse to continue unless `espa -V` prints `expected`.
    pub fn check_version<R: CommandRunner + ?Sized>(
        &self,
        runner: &R,
        expected: &str,
    ) -> Result<(), ToolError> {
        let out = runner.output(&Invocation::new(self.program.as_str()).arg("-V"))?;
        let found = out.trim_end_matches(&['\r', '\n'][..]);
        if found != expected {
            return Err(ToolError::VersionMismatch {
                program: self.program.clone(),
                expected: expected.to_string(),
                found: found.to_string(),
            });
        }
        info!(version = found, "plugin compiler version ok");
        Ok(())
    }

    /// Compile `<stem>.yaml` into `stem` and pin the result's file time.
    pub fn assemble<R: CommandRunner + ?Sized>(
        &self,
        runner: &R,
        stem: &Path,
        keep_intermediate: bool,
        timestamp: NaiveDateTime,
    ) -> Result<(), ToolError> {
        let mut inv = self.base().arg("-v");
        if keep_intermediate {
            inv = inv.arg("-k");
        }
        runner.status(&inv.arg(yaml_path(stem)))?;
        set_file_time(stem, timestamp)?;
        info!(plugin = %stem.display(), %timestamp, "assembled plugin");
        Ok(())
    }

    /// Decompile `plugin` back into `<plugin>.yaml`.
    pub fn disassemble<R: CommandRunner + ?Sized>(
        &self,
        runner: &R,
        plugin: &Path,
    ) -> Result<(), ToolError> {
        runner.status(&self.base().arg("-vd").arg(plugin))
    }

    /// Round-trip `<stem>.yaml` through the binary format to normalize it.
    pub fn reformat<R: CommandRunner + ?Sized>(
        &self,
        runner: &R,
        stem: &Path,
    ) -> Result<(), ToolError> {
        runner.status(&self.base().arg("-v").arg(yaml_path(stem)))?;
        self.disassemble(runner, stem)
    }
}

/// The archiver.
#[derive(Clone, Debug)]
pub struct Archiver {
    program: String,
}

impl Archiver {
    pub fn new<P: Into<String>>(program: P) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Pack the contents of `dir` into `archive`, replacing an existing one.
    pub fn archive<R: CommandRunner + ?Sized>(
        &self,
        runner: &R,
        dir: &Path,
        archive: &Path,
    ) -> Result<(), ToolError> {
        let target = if archive.is_absolute() {
            archive.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(io_error(archive))?
                .join(archive)
        };
        if target.exists() {
            fs::remove_file(&target).map_err(io_error(&target))?;
            debug!(archive = %target.display(), "removed previous archive");
        }
        runner.status(
            &Invocation::new(self.program.as_str())
                .arg("a")
                .arg(&target)
                .arg(".")
                .current_dir(dir),
        )?;
        info!(archive = %target.display(), "archive written");
        Ok(())
    }
}

/// The automation tool that recompiles generated scripts.
#[derive(Clone, Debug)]
pub struct AutomationDriver {
    program: String,
}

impl AutomationDriver {
    pub fn new<P: Into<String>>(program: P) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn run<R: CommandRunner + ?Sized>(&self, runner: &R, script: &Path) -> Result<(), ToolError> {
        runner.status(&Invocation::new(self.program.as_str()).arg(script))
    }
}
