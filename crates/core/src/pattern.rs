// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Filename pattern lists used to filter events per handler.
//!
//! A list holds exact, glob or regex patterns, each optionally negated.
//! A name matches the list when no negated pattern matches it and either
//! some positive pattern matches or the list has no positive patterns at
//! all. The empty list matches everything.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PatternError {
    #[error("invalid glob pattern: {0}")]
    Glob(#[from] glob::PatternError),
    #[error("invalid regular expression: {0}")]
    Regex(#[from] regex::Error),
}

#[derive(Debug, Clone)]
enum PatternKind {
    Exact(String),
    Glob(glob::Pattern),
    Regex(regex::Regex),
}

#[derive(Debug, Clone)]
struct Pattern {
    negated: bool,
    kind: PatternKind,
}

impl Pattern {
    fn matches(&self, name: &str) -> bool {
        match &self.kind {
            PatternKind::Exact(s) => s == name,
            PatternKind::Glob(p) => p.matches(name),
            PatternKind::Regex(r) => r.is_match(name),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PatternList {
    patterns: Vec<Pattern>,
}

impl PatternList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Add a literal name.
    pub fn add_exact(&mut self, name: &str) {
        self.patterns.push(Pattern {
            negated: false,
            kind: PatternKind::Exact(name.to_string()),
        });
    }

    /// Parse a configuration spec: a leading `!` negates, `/…/` wraps a
    /// regular expression, everything else is a glob.
    pub fn add_spec(&mut self, spec: &str) -> Result<(), PatternError> {
        let (negated, body) = match spec.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, spec),
        };
        let kind = match body
            .strip_prefix('/')
            .and_then(|s| s.strip_suffix('/'))
            .filter(|s| !s.is_empty())
        {
            Some(re) => PatternKind::Regex(regex::Regex::new(re)?),
            None => PatternKind::Glob(glob::Pattern::new(body)?),
        };
        self.patterns.push(Pattern { negated, kind });
        Ok(())
    }

    /// Whether the name matches the list.
    pub fn matches(&self, name: &str) -> bool {
        let mut matched = !self.patterns.iter().any(|p| !p.negated);
        for pattern in &self.patterns {
            if pattern.matches(name) {
                if pattern.negated {
                    return false;
                }
                matched = true;
            }
        }
        matched
    }
}

#[cfg(test)]
#[path = "pattern_tests.rs"]
mod tests;
