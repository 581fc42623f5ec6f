// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Environment operation programs: an ordered plan of clear/keep/set/unset
//! operations applied to a child's environment before exec.
//!
//! Insertion keeps the plan in execution order regardless of how it was
//! assembled: at most one `Clear` at the head, `Keep` entries contiguous
//! after it, `Set`/`Unset` appended behind. Execution then reads linearly
//! as "reset, keep A and B, then set X, unset Y".

use thiserror::Error;

use crate::environ::{wildmatch, Environ};
use crate::wordsplit::WordSplitError;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvopError {
    #[error("invalid environment variable name: {0}")]
    InvalidName(String),
    #[error("missing variable name")]
    MissingName,
}

/// Operation codes, in the order entries are kept in a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EnvOpCode {
    /// Clear the environment.
    Clear,
    /// Keep a variable when clearing.
    Keep,
    /// Set a variable.
    Set,
    /// Unset a variable.
    Unset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvOp {
    pub code: EnvOpCode,
    /// Variable name, or a glob pattern for `Keep`/`Unset`.
    pub name: Option<String>,
    pub value: Option<String>,
}

/// An ordered environment-operation program. Equality compares length,
/// code sequence and name/value pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvopProgram {
    ops: Vec<EnvOp>,
}

impl EnvopProgram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[EnvOp] {
        &self.ops
    }

    /// Add an operation, keeping the program ordered.
    pub fn add(
        &mut self,
        code: EnvOpCode,
        name: Option<&str>,
        value: Option<&str>,
    ) -> Result<(), EnvopError> {
        match code {
            EnvOpCode::Clear => {}
            EnvOpCode::Set => {
                let name = name.ok_or(EnvopError::MissingName)?;
                if name != ":" && !valid_envar_name(name) {
                    return Err(EnvopError::InvalidName(name.to_string()));
                }
            }
            EnvOpCode::Keep | EnvOpCode::Unset => {
                if name.is_none() {
                    return Err(EnvopError::MissingName);
                }
            }
        }

        let op = EnvOp {
            code,
            name: name.map(str::to_string),
            value: value.map(str::to_string),
        };
        match code {
            EnvOpCode::Clear => {
                if !matches!(self.ops.first(), Some(op) if op.code == EnvOpCode::Clear) {
                    self.ops.insert(0, op);
                }
            }
            EnvOpCode::Keep => {
                let pos = self
                    .ops
                    .iter()
                    .take_while(|op| op.code <= EnvOpCode::Keep)
                    .count();
                self.ops.insert(pos, op);
            }
            EnvOpCode::Set | EnvOpCode::Unset => self.ops.push(op),
        }
        Ok(())
    }

    /// Apply the program to an environment.
    pub fn exec(&self, env: &mut Environ) -> Result<(), WordSplitError> {
        let mut rest = self.ops.as_slice();
        if matches!(rest.first(), Some(op) if op.code == EnvOpCode::Clear) {
            rest = &rest[1..];
            let keeps: Vec<&EnvOp> = rest
                .iter()
                .take_while(|op| op.code == EnvOpCode::Keep)
                .collect();
            if keeps.is_empty() {
                env.clear();
            } else {
                env.retain(|name, value| keeps.iter().any(|k| keep_matches(k, name, value)));
            }
        }

        for op in rest {
            match op.code {
                EnvOpCode::Set => {
                    let name = op.name.as_deref().unwrap_or(":");
                    env.set(name, op.value.as_deref().unwrap_or(""))?;
                }
                EnvOpCode::Unset => {
                    if let Some(name) = op.name.as_deref() {
                        match op.value.as_deref() {
                            Some(value) => {
                                env.unset(name, Some(value));
                            }
                            None => env.unset_glob(name),
                        }
                    }
                }
                EnvOpCode::Keep | EnvOpCode::Clear => {}
            }
        }
        Ok(())
    }

    /// Build a program from the legacy string-list syntax:
    ///
    /// - `"-"` / `"--"`: clear, keeping the daemon's macro variables
    ///   (and, with `"-"`, the listed environment variables too);
    /// - `"NAME"`: keep;
    /// - `"NAME=VALUE"`: set;
    /// - `"NAME+=VALUE"` / `"NAME=+VALUE"`: append / prepend through a
    ///   reference to the current value;
    /// - `"-NAME"` / `"-NAME=VALUE"`: unset (conditionally on the value).
    pub fn parse_legacy(
        specs: &[String],
        macros: &[&str],
        envars: &[&str],
    ) -> Result<Self, EnvopError> {
        let mut prog = EnvopProgram::new();
        let mut rest = specs;
        if let Some(first) = specs.first() {
            if first == "-" || first == "--" {
                prog.add(EnvOpCode::Clear, None, None)?;
                for name in macros {
                    prog.add(EnvOpCode::Keep, Some(name), None)?;
                }
                if first == "-" {
                    for name in envars {
                        prog.add(EnvOpCode::Keep, Some(name), None)?;
                    }
                }
                rest = &specs[1..];
            }
        }

        for spec in rest {
            if let Some(stripped) = spec.strip_prefix('-') {
                match stripped.split_once('=') {
                    Some((name, value)) => {
                        prog.add(EnvOpCode::Unset, Some(name), Some(value))?;
                    }
                    None => prog.add(EnvOpCode::Unset, Some(stripped), None)?,
                }
            } else if let Some((name, value)) = spec.split_once('=') {
                if name.is_empty() {
                    // Skip erroneous entry
                    continue;
                }
                if let Some(base) = name.strip_suffix('+') {
                    prog.add(EnvOpCode::Set, Some(base), Some(&append_value(base, value)))?;
                } else if let Some(body) = value.strip_prefix('+') {
                    prog.add(EnvOpCode::Set, Some(name), Some(&prepend_value(name, body)))?;
                } else {
                    prog.add(EnvOpCode::Set, Some(name), Some(value))?;
                }
            } else {
                prog.add(EnvOpCode::Keep, Some(spec), None)?;
            }
        }
        Ok(prog)
    }
}

/// `NAME+=VALUE`: append to the current value. A leading punctuation
/// character in the value becomes a separator emitted only when the
/// variable already has a value.
fn append_value(name: &str, value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(sep) if sep.is_ascii_punctuation() => {
            let rest: String = chars.collect();
            format!("${{{name}:-}}${{{name}:+{sep}}}{rest}")
        }
        _ => format!("${{{name}:-}}{value}"),
    }
}

/// `NAME=+VALUE`: prepend to the current value, with a trailing
/// punctuation separator handled symmetrically.
fn prepend_value(name: &str, value: &str) -> String {
    match value.chars().last() {
        Some(sep) if sep.is_ascii_punctuation() => {
            let body = &value[..value.len() - sep.len_utf8()];
            format!("{body}${{{name}:+{sep}}}${{{name}:-}}")
        }
        _ => format!("{value}${{{name}:-}}"),
    }
}

fn keep_matches(op: &EnvOp, name: &str, value: &str) -> bool {
    match (&op.name, &op.value) {
        (Some(n), Some(v)) => n == name && v == value,
        (Some(n), None) => wildmatch(n, name),
        _ => false,
    }
}

fn valid_envar_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
#[path = "envop_tests.rs"]
mod tests;
