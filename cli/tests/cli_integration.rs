//! End-to-end tests that run the built `ckati` binary against a real
//! temporary directory, exercising argv parsing, the bootstrap makefile and
//! the default direct-execute path together.

use std::fs;
use std::process::Command;

use tempfile::tempdir;

fn ckati() -> Command {
    Command::new(env!("CARGO_BIN_EXE_ckati"))
}

#[test]
fn builds_simple_target_directly() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("Makefile"), "out: in\n\ttouch out\n").unwrap();
    fs::write(dir.path().join("in"), "").unwrap();

    let status = ckati().arg("-C").arg(dir.path()).status().unwrap();
    assert!(status.success());
    assert!(dir.path().join("out").exists());
}

#[test]
fn syntax_check_only_does_not_build() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("Makefile"), "out: in\n\ttouch out\n").unwrap();
    fs::write(dir.path().join("in"), "").unwrap();

    let status = ckati().arg("-C").arg(dir.path()).arg("-c").status().unwrap();
    assert!(status.success());
    assert!(!dir.path().join("out").exists());
}

#[test]
fn ninja_generate_writes_ninja_file_and_stamp() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("Makefile"), "out: in\n\ttouch out\n").unwrap();
    fs::write(dir.path().join("in"), "").unwrap();

    let status = ckati().arg("-C").arg(dir.path()).arg("--ninja").status().unwrap();
    assert!(status.success());
    assert!(dir.path().join("ninja.ninja").exists());
    assert!(dir.path().join("ninja.stamp").exists());
    assert!(dir.path().join("ninja.sh").exists());
}

#[test]
fn dump_kati_stamp_reports_missing_stamp_as_failure() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("Makefile"), "out:\n\ttouch out\n").unwrap();

    let status = ckati().arg("-C").arg(dir.path()).arg("--dump_kati_stamp").status().unwrap();
    assert!(!status.success());
}

#[test]
fn missing_prerequisite_fails_the_build() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("Makefile"), "out: missing.c\n\ttouch out\n").unwrap();

    let status = ckati().arg("-C").arg(dir.path()).status().unwrap();
    assert!(!status.success());
    assert!(!dir.path().join("out").exists());
}

#[test]
fn find_emulator_serves_a_find_shell_call() {
    let dir = tempdir().unwrap();
    fs::create_dir(dir.path().join("src")).unwrap();
    fs::write(dir.path().join("src/a.c"), "").unwrap();
    fs::write(dir.path().join("src/b.h"), "").unwrap();
    fs::write(
        dir.path().join("Makefile"),
        "SRCS := $(shell find src -name '*.c')\nout:\n\ttouch $(SRCS:src/%.c=found-%)\n",
    )
    .unwrap();

    let status = ckati().arg("-C").arg(dir.path()).arg("--use_find_emulator").status().unwrap();
    assert!(status.success());
    assert!(dir.path().join("found-a").exists());
}

#[test]
fn command_line_variable_assignment_is_honored() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("Makefile"), "out:\n\ttouch $(NAME)\n").unwrap();

    let status = ckati().arg("-C").arg(dir.path()).arg("NAME=custom").status().unwrap();
    assert!(status.success());
    assert!(dir.path().join("custom").exists());
}
