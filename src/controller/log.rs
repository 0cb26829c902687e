// src/controller/log.rs

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};

use crate::errors::Result;

/// Append-only text log shared by all tasks of a workflow.
///
/// Each line looks like `[14:03:59 19.10.2026] text`, stamped in UTC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextLog {
    path: PathBuf,
}

impl TextLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, text: &str) -> Result<()> {
        self.append_at(Utc::now(), text)
    }

    fn append_at(&self, at: DateTime<Utc>, text: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("opening log {:?}", self.path))?;
        writeln!(file, "{}", format_line(at, text))?;
        Ok(())
    }
}

pub fn format_line(at: DateTime<Utc>, text: &str) -> String {
    format!("[{}] {text}", at.format("%H:%M:%S %d.%m.%Y"))
}
