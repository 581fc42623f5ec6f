// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Word splitting and expansion for handler commands and environment
//! values.
//!
//! Supports single and double quotes, C-style escapes, `$NAME`,
//! `${NAME}`, `${NAME:-default}` and `${NAME:+alternate}` references
//! resolved against an [`Environ`], and tilde expansion at the start of a
//! word. `split` produces an argv; `expand_one` expands a whole string to
//! a single word without splitting.

use std::iter::Peekable;
use std::str::Chars;

use thiserror::Error;

use crate::environ::Environ;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WordSplitError {
    #[error("unbalanced quote")]
    UnbalancedQuote,
    #[error("bad substitution: ${{{0}}}")]
    BadSubstitution(String),
}

/// Expands and splits words against an environment.
#[derive(Debug)]
pub struct WordSplitter<'a> {
    env: &'a Environ,
    keep_undef: bool,
}

impl<'a> WordSplitter<'a> {
    pub fn new(env: &'a Environ) -> Self {
        Self {
            env,
            keep_undef: false,
        }
    }

    /// Keep undefined variable references literally instead of expanding
    /// them to nothing. Used for handler command lines.
    pub fn keep_undef(mut self, keep: bool) -> Self {
        self.keep_undef = keep;
        self
    }

    /// Split the input into expanded words.
    pub fn split(&self, input: &str) -> Result<Vec<String>, WordSplitError> {
        let mut words = Vec::new();
        let mut chars = input.chars().peekable();
        loop {
            while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
                chars.next();
            }
            if chars.peek().is_none() {
                break;
            }
            words.push(self.word(&mut chars, true)?);
        }
        Ok(words)
    }

    /// Expand the whole input as a single word.
    pub fn expand_one(&self, input: &str) -> Result<String, WordSplitError> {
        let mut chars = input.chars().peekable();
        self.word(&mut chars, false)
    }

    fn word(
        &self,
        chars: &mut Peekable<Chars<'_>>,
        stop_at_space: bool,
    ) -> Result<String, WordSplitError> {
        let mut out = String::new();
        let mut at_start = true;
        while let Some(&c) = chars.peek() {
            if stop_at_space && c.is_whitespace() {
                break;
            }
            chars.next();
            match c {
                '\'' => {
                    let mut closed = false;
                    for q in chars.by_ref() {
                        if q == '\'' {
                            closed = true;
                            break;
                        }
                        out.push(q);
                    }
                    if !closed {
                        return Err(WordSplitError::UnbalancedQuote);
                    }
                }
                '"' => {
                    let mut closed = false;
                    while let Some(q) = chars.next() {
                        match q {
                            '"' => {
                                closed = true;
                                break;
                            }
                            '\\' => push_escape(chars, &mut out),
                            '$' => out.push_str(&self.dollar(chars)?),
                            _ => out.push(q),
                        }
                    }
                    if !closed {
                        return Err(WordSplitError::UnbalancedQuote);
                    }
                }
                '\\' => push_escape(chars, &mut out),
                '$' => out.push_str(&self.dollar(chars)?),
                '~' if at_start => match chars.peek().copied() {
                    Some('/') | None => match dirs::home_dir() {
                        Some(home) => out.push_str(&home.to_string_lossy()),
                        None => out.push('~'),
                    },
                    Some(c) if stop_at_space && c.is_whitespace() => match dirs::home_dir() {
                        Some(home) => out.push_str(&home.to_string_lossy()),
                        None => out.push('~'),
                    },
                    _ => out.push('~'),
                },
                _ => out.push(c),
            }
            at_start = false;
        }
        Ok(out)
    }

    fn dollar(&self, chars: &mut Peekable<Chars<'_>>) -> Result<String, WordSplitError> {
        match chars.peek().copied() {
            Some('{') => {
                chars.next();
                let mut body = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    body.push(c);
                }
                if !closed {
                    return Err(WordSplitError::BadSubstitution(body));
                }
                self.reference(&body)
            }
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                let mut name = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        name.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                match self.env.get(&name) {
                    Some(v) => Ok(v.to_string()),
                    None if self.keep_undef => Ok(format!("${name}")),
                    None => Ok(String::new()),
                }
            }
            _ => Ok("$".to_string()),
        }
    }

    /// Expand a `${...}` body: a bare name, `name:-default` or
    /// `name:+alternate`. The default/alternate word is expanded in turn.
    fn reference(&self, body: &str) -> Result<String, WordSplitError> {
        if let Some((name, word)) = body.split_once(":-") {
            if !valid_name(name) {
                return Err(WordSplitError::BadSubstitution(body.to_string()));
            }
            return match self.env.get(name) {
                Some(v) if !v.is_empty() => Ok(v.to_string()),
                _ => self.expand_one(word),
            };
        }
        if let Some((name, word)) = body.split_once(":+") {
            if !valid_name(name) {
                return Err(WordSplitError::BadSubstitution(body.to_string()));
            }
            return match self.env.get(name) {
                Some(v) if !v.is_empty() => self.expand_one(word),
                _ => Ok(String::new()),
            };
        }
        if !valid_name(body) {
            return Err(WordSplitError::BadSubstitution(body.to_string()));
        }
        match self.env.get(body) {
            Some(v) => Ok(v.to_string()),
            None if self.keep_undef => Ok(format!("${{{body}}}")),
            None => Ok(String::new()),
        }
    }
}

fn valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn push_escape(chars: &mut Peekable<Chars<'_>>, out: &mut String) {
    match chars.next() {
        Some('a') => out.push('\x07'),
        Some('b') => out.push('\x08'),
        Some('f') => out.push('\x0c'),
        Some('n') => out.push('\n'),
        Some('r') => out.push('\r'),
        Some('t') => out.push('\t'),
        Some('v') => out.push('\x0b'),
        Some(c) => out.push(c),
        None => out.push('\\'),
    }
}

#[cfg(test)]
#[path = "wordsplit_tests.rs"]
mod tests;
