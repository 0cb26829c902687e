// src/backend/job_id.rs

//! Extraction of the job handle from submit output.

use crate::errors::{JobsubError, Result};
use crate::types::JobHandle;

/// Turns the captured output of a submit command into a job handle.
pub trait JobIdParser: Send + Sync {
    fn parse_job_id(&self, output: &str) -> Result<JobHandle>;
}

/// Which token of the last line holds the job id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPick {
    First,
    Nth(usize),
    Last,
}

/// "Split the last non-empty line on single spaces, expect exactly
/// `expected` tokens, take `pick`."
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenRule {
    pub expected: usize,
    pub pick: TokenPick,
}

impl TokenRule {
    pub const fn new(expected: usize, pick: TokenPick) -> Self {
        Self { expected, pick }
    }
}

impl JobIdParser for TokenRule {
    fn parse_job_id(&self, output: &str) -> Result<JobHandle> {
        let line = last_non_empty_line(output).unwrap_or_default();
        let tokens: Vec<&str> = if line.is_empty() {
            Vec::new()
        } else {
            line.split(' ').collect()
        };

        if tokens.len() != self.expected {
            return Err(JobsubError::JobIdParse {
                expected: self.expected,
                actual: tokens.len(),
                line: line.to_string(),
            });
        }

        let token = match self.pick {
            TokenPick::First => tokens.first(),
            TokenPick::Nth(i) => tokens.get(i),
            TokenPick::Last => tokens.last(),
        };
        token
            .map(|t| JobHandle::new(*t))
            .ok_or_else(|| JobsubError::JobIdParse {
                expected: self.expected,
                actual: tokens.len(),
                line: line.to_string(),
            })
    }
}

/// Last line with non-whitespace content. Only the line ending is stripped,
/// surrounding blanks still count as token separators.
pub fn last_non_empty_line(output: &str) -> Option<&str> {
    output
        .lines()
        .map(|l| l.trim_end_matches('\r'))
        .filter(|l| !l.trim().is_empty())
        .last()
}
