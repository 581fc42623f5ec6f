// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tests for environment operation programs

use super::*;
use yare::parameterized;

fn base_env() -> Environ {
    [
        ("PATH".to_string(), "/usr/bin".to_string()),
        ("HOME".to_string(), "/home/u".to_string()),
        ("LANG".to_string(), "C".to_string()),
    ]
    .into_iter()
    .collect()
}

#[test]
fn clear_keep_set_retains_and_sets() {
    let mut prog = EnvopProgram::new();
    prog.add(EnvOpCode::Clear, None, None).unwrap();
    prog.add(EnvOpCode::Keep, Some("PATH"), None).unwrap();
    prog.add(EnvOpCode::Set, Some("X"), Some("1")).unwrap();

    let mut env = base_env();
    prog.exec(&mut env).unwrap();

    assert_eq!(env.len(), 2);
    assert_eq!(env.get("PATH"), Some("/usr/bin"));
    assert_eq!(env.get("X"), Some("1"));
    assert_eq!(env.get("HOME"), None);
}

#[test]
fn clear_without_keep_empties() {
    let mut prog = EnvopProgram::new();
    prog.add(EnvOpCode::Clear, None, None).unwrap();
    let mut env = base_env();
    prog.exec(&mut env).unwrap();
    assert!(env.is_empty());
}

#[test]
fn keep_glob_pattern_matches_names() {
    let mut prog = EnvopProgram::new();
    prog.add(EnvOpCode::Clear, None, None).unwrap();
    prog.add(EnvOpCode::Keep, Some("L*"), None).unwrap();
    let mut env = base_env();
    prog.exec(&mut env).unwrap();
    assert_eq!(env.len(), 1);
    assert_eq!(env.get("LANG"), Some("C"));
}

#[test]
fn keep_with_value_requires_exact_match() {
    let mut prog = EnvopProgram::new();
    prog.add(EnvOpCode::Clear, None, None).unwrap();
    prog.add(EnvOpCode::Keep, Some("LANG"), Some("de")).unwrap();
    let mut env = base_env();
    prog.exec(&mut env).unwrap();
    assert!(env.is_empty());
}

#[test]
fn unset_with_value_is_conditional() {
    let mut prog = EnvopProgram::new();
    prog.add(EnvOpCode::Unset, Some("LANG"), Some("de")).unwrap();
    prog.add(EnvOpCode::Unset, Some("HOME"), Some("/home/u"))
        .unwrap();
    let mut env = base_env();
    prog.exec(&mut env).unwrap();
    assert_eq!(env.get("LANG"), Some("C"));
    assert_eq!(env.get("HOME"), None);
}

#[test]
fn unset_without_value_is_glob() {
    let mut prog = EnvopProgram::new();
    prog.add(EnvOpCode::Unset, Some("L*"), None).unwrap();
    let mut env = base_env();
    prog.exec(&mut env).unwrap();
    assert_eq!(env.get("LANG"), None);
    assert_eq!(env.get("PATH"), Some("/usr/bin"));
}

#[test]
fn set_expands_against_current_environment() {
    let mut prog = EnvopProgram::new();
    prog.add(EnvOpCode::Set, Some("PATH"), Some("${PATH}:/sbin"))
        .unwrap();
    let mut env = base_env();
    prog.exec(&mut env).unwrap();
    assert_eq!(env.get("PATH"), Some("/usr/bin:/sbin"));
}

#[test]
fn insertion_order_is_normalized() {
    // Assemble out of order; execution order must still be
    // clear, keeps, then set/unset.
    let mut prog = EnvopProgram::new();
    prog.add(EnvOpCode::Set, Some("X"), Some("1")).unwrap();
    prog.add(EnvOpCode::Keep, Some("PATH"), None).unwrap();
    prog.add(EnvOpCode::Clear, None, None).unwrap();

    let codes: Vec<EnvOpCode> = prog.ops().iter().map(|op| op.code).collect();
    assert_eq!(codes, vec![EnvOpCode::Clear, EnvOpCode::Keep, EnvOpCode::Set]);

    let mut env = base_env();
    prog.exec(&mut env).unwrap();
    assert_eq!(env.len(), 2);
    assert_eq!(env.get("X"), Some("1"));
}

#[test]
fn duplicate_clear_is_dropped() {
    let mut prog = EnvopProgram::new();
    prog.add(EnvOpCode::Clear, None, None).unwrap();
    prog.add(EnvOpCode::Clear, None, None).unwrap();
    assert_eq!(prog.ops().len(), 1);
}

#[parameterized(
    plain = { "GOOD_NAME" },
    underscore = { "_x1" },
    colon = { ":" },
)]
fn set_accepts_valid_names(name: &str) {
    let mut prog = EnvopProgram::new();
    assert!(prog.add(EnvOpCode::Set, Some(name), Some("v")).is_ok());
}

#[parameterized(
    digit_start = { "1BAD" },
    dash = { "BAD-NAME" },
    empty = { "" },
)]
fn set_rejects_invalid_names(name: &str) {
    let mut prog = EnvopProgram::new();
    assert_eq!(
        prog.add(EnvOpCode::Set, Some(name), Some("v")),
        Err(EnvopError::InvalidName(name.to_string()))
    );
}

#[test]
fn programs_compare_structurally() {
    let mut a = EnvopProgram::new();
    a.add(EnvOpCode::Keep, Some("PATH"), None).unwrap();
    a.add(EnvOpCode::Set, Some("X"), Some("1")).unwrap();

    let mut b = EnvopProgram::new();
    b.add(EnvOpCode::Keep, Some("PATH"), None).unwrap();
    b.add(EnvOpCode::Set, Some("X"), Some("1")).unwrap();
    assert_eq!(a, b);

    let mut c = EnvopProgram::new();
    c.add(EnvOpCode::Keep, Some("PATH"), None).unwrap();
    c.add(EnvOpCode::Set, Some("X"), Some("2")).unwrap();
    assert_ne!(a, c);

    let mut d = EnvopProgram::new();
    d.add(EnvOpCode::Keep, Some("PATH"), None).unwrap();
    assert_ne!(a, d);
}

const MACROS: &[&str] = &["file", "genev_name"];
const ENVARS: &[&str] = &["DIREVENT_FILE", "DIREVENT_GENEV_NAME"];

#[test]
fn legacy_dash_clears_and_keeps_defaults() {
    let specs = vec!["-".to_string(), "PATH=/bin".to_string()];
    let prog = EnvopProgram::parse_legacy(&specs, MACROS, ENVARS).unwrap();

    let mut env = base_env();
    env.insert("DIREVENT_FILE", "f.log");
    env.insert("file", "f.log");
    prog.exec(&mut env).unwrap();

    assert_eq!(env.get("DIREVENT_FILE"), Some("f.log"));
    assert_eq!(env.get("file"), Some("f.log"));
    assert_eq!(env.get("PATH"), Some("/bin"));
    assert_eq!(env.get("HOME"), None);
}

#[test]
fn legacy_double_dash_keeps_only_macros() {
    let specs = vec!["--".to_string()];
    let prog = EnvopProgram::parse_legacy(&specs, MACROS, ENVARS).unwrap();

    let mut env = base_env();
    env.insert("DIREVENT_FILE", "f.log");
    env.insert("file", "f.log");
    prog.exec(&mut env).unwrap();

    assert_eq!(env.get("DIREVENT_FILE"), None);
    assert_eq!(env.get("file"), Some("f.log"));
}

#[test]
fn legacy_unset_and_keep() {
    let specs = vec!["-LANG".to_string()];
    let prog = EnvopProgram::parse_legacy(&specs, MACROS, ENVARS).unwrap();
    let mut env = base_env();
    prog.exec(&mut env).unwrap();
    assert_eq!(env.get("LANG"), None);
    assert_eq!(env.get("PATH"), Some("/usr/bin"));
}

#[test]
fn legacy_append_with_separator() {
    let specs = vec!["PATH+=:/sbin".to_string()];
    let prog = EnvopProgram::parse_legacy(&specs, MACROS, ENVARS).unwrap();

    let mut env = base_env();
    prog.exec(&mut env).unwrap();
    assert_eq!(env.get("PATH"), Some("/usr/bin:/sbin"));

    // With no current value the separator is suppressed.
    let mut empty = Environ::new();
    prog.exec(&mut empty).unwrap();
    assert_eq!(empty.get("PATH"), Some("/sbin"));
}

#[test]
fn legacy_prepend_with_separator() {
    let specs = vec!["PATH=+/opt/bin:".to_string()];
    let prog = EnvopProgram::parse_legacy(&specs, MACROS, ENVARS).unwrap();

    let mut env = base_env();
    prog.exec(&mut env).unwrap();
    assert_eq!(env.get("PATH"), Some("/opt/bin:/usr/bin"));

    let mut empty = Environ::new();
    prog.exec(&mut empty).unwrap();
    assert_eq!(empty.get("PATH"), Some("/opt/bin"));
}
