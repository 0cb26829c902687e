// src/script/writer.rs

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{debug, info};

use crate::errors::Result;
use crate::settings::ResolvedSettings;

pub const WRAPPER_PLACEHOLDER: &str = "@WRAPPER_TO_BE_SUBSTITUTED@";
pub const HOST_PLACEHOLDER: &str = "@HOST_TO_BE_SUBSTITUTED@";

/// Rewrites a generated job script in place with header, environment and
/// trailer.
#[derive(Debug, Clone, Default)]
pub struct JobScriptWriter {
    env_file: Option<PathBuf>,
}

impl JobScriptWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// File whose contents are copied verbatim between the batch directives
    /// and the task specific settings.
    pub fn env_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.env_file = Some(path.into());
        self
    }

    /// Rewrite `settings.paths.job`.
    ///
    /// The original is moved to `<job>.tmp` first and removed once the new
    /// script is complete.
    pub fn write(&self, settings: &ResolvedSettings) -> Result<()> {
        let job = &settings.paths.job;
        let tmp = tmp_sibling(job);
        info!(job = ?job, "writing job script");

        fs::rename(job, &tmp)
            .with_context(|| format!("moving job script {job:?} to {tmp:?}"))?;
        let original = fs::read_to_string(&tmp)
            .with_context(|| format!("reading job script {tmp:?}"))?;

        let file = fs::File::create(job)
            .with_context(|| format!("creating job script {job:?}"))?;
        let mut out = BufWriter::new(file);
        self.write_header(&mut out, settings)?;
        out.write_all(substitute(&original, settings).as_bytes())?;
        for value in settings.trailer.values() {
            writeln!(out, "{value}")?;
        }
        out.flush()?;
        drop(out);

        make_owner_executable(job)?;
        fs::remove_file(&tmp).with_context(|| format!("removing {tmp:?}"))?;
        debug!(job = ?job, "job script written");
        Ok(())
    }

    fn write_header(&self, out: &mut impl Write, settings: &ResolvedSettings) -> Result<()> {
        writeln!(out, "{}", settings.interpreter)?;

        writeln!(out, "\n# Batch commands")?;
        for value in settings.header.values().filter(|v| v.contains('#')) {
            writeln!(out, "{value}")?;
        }

        if let Some(env_file) = &self.env_file {
            let env = fs::read_to_string(env_file)
                .with_context(|| format!("reading environment file {env_file:?}"))?;
            writeln!(out, "\n# Host specific environment settings:")?;
            out.write_all(env.as_bytes())?;
            if !env.is_empty() && !env.ends_with('\n') {
                writeln!(out)?;
            }
        }

        writeln!(out, "\n# Task specific settings:")?;
        for value in settings.header.values().filter(|v| !v.contains('#')) {
            writeln!(out, "{value}")?;
        }

        writeln!(out, "\n# Job script:")?;
        Ok(())
    }
}

fn substitute(content: &str, settings: &ResolvedSettings) -> String {
    content
        .replace(WRAPPER_PLACEHOLDER, settings.wrapper.as_deref().unwrap_or(""))
        .replace(HOST_PLACEHOLDER, settings.host.as_str())
}

fn tmp_sibling(job: &Path) -> PathBuf {
    let mut name = job.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

#[cfg(unix)]
fn make_owner_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(perms.mode() | 0o100);
    fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn make_owner_executable(_path: &Path) -> Result<()> {
    Ok(())
}
