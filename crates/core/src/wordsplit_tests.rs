// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tests for word splitting and expansion

use super::*;
use yare::parameterized;

fn env() -> Environ {
    [
        ("FILE".to_string(), "report.log".to_string()),
        ("DIR".to_string(), "/var/spool".to_string()),
        ("EMPTY".to_string(), String::new()),
    ]
    .into_iter()
    .collect()
}

#[test]
fn splits_on_whitespace_runs() {
    let env = env();
    let words = WordSplitter::new(&env).split("a  b\tc").unwrap();
    assert_eq!(words, vec!["a", "b", "c"]);
}

#[test]
fn empty_input_yields_no_words() {
    let env = env();
    assert!(WordSplitter::new(&env).split("   ").unwrap().is_empty());
}

#[test]
fn single_quotes_are_literal() {
    let env = env();
    let words = WordSplitter::new(&env).split("echo '$FILE x'").unwrap();
    assert_eq!(words, vec!["echo", "$FILE x"]);
}

#[test]
fn double_quotes_expand_and_group() {
    let env = env();
    let words = WordSplitter::new(&env).split(r#"mv "$DIR/$FILE" done"#).unwrap();
    assert_eq!(words, vec!["mv", "/var/spool/report.log", "done"]);
}

#[test]
fn braced_references() {
    let env = env();
    let out = WordSplitter::new(&env).expand_one("${DIR}/x").unwrap();
    assert_eq!(out, "/var/spool/x");
}

#[parameterized(
    set_plain = { "${FILE:-fallback}", "report.log" },
    empty_takes_default = { "${EMPTY:-fallback}", "fallback" },
    unset_takes_default = { "${NOPE:-fallback}", "fallback" },
    set_takes_alternate = { "${FILE:+alt}", "alt" },
    empty_skips_alternate = { "${EMPTY:+alt}", "" },
    unset_skips_alternate = { "${NOPE:+alt}", "" },
)]
fn conditional_references(input: &str, expected: &str) {
    let env = env();
    assert_eq!(WordSplitter::new(&env).expand_one(input).unwrap(), expected);
}

#[test]
fn default_word_is_itself_expanded() {
    let env = env();
    let out = WordSplitter::new(&env).expand_one("${NOPE:-$FILE}").unwrap();
    assert_eq!(out, "report.log");
}

#[test]
fn undefined_expands_empty_by_default() {
    let env = env();
    assert_eq!(WordSplitter::new(&env).expand_one("x$NOPE/y").unwrap(), "x/y");
}

#[test]
fn keep_undef_preserves_reference_text() {
    let env = env();
    let ws = WordSplitter::new(&env).keep_undef(true);
    assert_eq!(ws.expand_one("$NOPE").unwrap(), "$NOPE");
    assert_eq!(ws.expand_one("${NOPE}").unwrap(), "${NOPE}");
}

#[test]
fn c_escapes() {
    let env = env();
    let words = WordSplitter::new(&env).split(r"a\tb c\nd").unwrap();
    assert_eq!(words, vec!["a\tb", "c\nd"]);
}

#[test]
fn escaped_space_does_not_split() {
    let env = env();
    let words = WordSplitter::new(&env).split(r"one\ word two").unwrap();
    assert_eq!(words, vec!["one word", "two"]);
}

#[test]
fn escaped_dollar_is_literal() {
    let env = env();
    assert_eq!(
        WordSplitter::new(&env).expand_one(r"\$FILE").unwrap(),
        "$FILE"
    );
}

#[test]
fn lone_dollar_is_literal() {
    let env = env();
    assert_eq!(WordSplitter::new(&env).expand_one("100$").unwrap(), "100$");
}

#[test]
fn unbalanced_quotes_error() {
    let env = env();
    assert_eq!(
        WordSplitter::new(&env).split("echo 'oops"),
        Err(WordSplitError::UnbalancedQuote)
    );
    assert_eq!(
        WordSplitter::new(&env).split("echo \"oops"),
        Err(WordSplitError::UnbalancedQuote)
    );
}

#[test]
fn unterminated_reference_errors() {
    let env = env();
    assert!(matches!(
        WordSplitter::new(&env).expand_one("${FILE"),
        Err(WordSplitError::BadSubstitution(_))
    ));
}

#[test]
fn bad_reference_name_errors() {
    let env = env();
    assert!(matches!(
        WordSplitter::new(&env).expand_one("${1BAD}"),
        Err(WordSplitError::BadSubstitution(_))
    ));
}

#[test]
fn tilde_expands_at_word_start() {
    let env = env();
    let Some(home) = dirs::home_dir() else {
        return;
    };
    let out = WordSplitter::new(&env).expand_one("~/x").unwrap();
    assert_eq!(out, format!("{}/x", home.to_string_lossy()));
}

#[test]
fn tilde_inside_word_is_literal() {
    let env = env();
    assert_eq!(WordSplitter::new(&env).expand_one("a~b").unwrap(), "a~b");
}
