//! Tests for `compile_script` and the `unwindc` driver.
//!
//! The driver tests run the built binary on the scripts under
//! `tests/scripts` and validate its output against their CHECK directives.

use bumpalo::Bump;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use unwindgen::core::{CompilationSession, CompileError};
use unwindgen::ir::verify_module;
use unwindgen::script::{compile_script, CompileOptions, TestRunner, TestSpec};

fn script_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/scripts")
        .join(name)
}

fn run_unwindc(args: &[&str]) -> Output {
    let _ = env_logger::builder().is_test(true).try_init();
    Command::new(env!("CARGO_BIN_EXE_unwindc"))
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run unwindc: {}", e))
}

#[test]
fn test_compile_script_from_source() {
    let _ = env_logger::builder().is_test(true).try_init();
    let source = fs::read_to_string(script_path("simple_scope.scope")).unwrap();

    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let module = compile_script(&session, "simple_scope", &source, CompileOptions::default())
        .unwrap_or_else(|e| panic!("simple_scope.scope failed to compile: {}", e));

    verify_module(&module).unwrap();
    let func = module.function_named("simple").unwrap();
    assert_eq!(func.blocks_named("cleanup").len(), 1);
    assert_eq!(func.blocks_named("lp").len(), 1);

    let text = module.to_string();
    assert!(text.starts_with("; module simple_scope"));
    assert_eq!(session.stats().functions_compiled, 1);
    assert_eq!(session.current_function(), None);
}

#[test]
fn test_compile_script_reports_errors() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);

    let err = compile_script(&session, "m", "func f {\n  call g\n", CompileOptions::default())
        .unwrap_err();
    assert!(matches!(err, CompileError::Script { line: 2, .. }), "{:?}", err);

    let err = compile_script(
        &session,
        "m",
        "func f {\n  scope {\n    break\n  }\n}\n",
        CompileOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, CompileError::FrameStack { .. }));
}

#[test]
fn test_unwindc_prints_ir() {
    let path = script_path("simple_scope.scope");
    let output = run_unwindc(&[path.to_str().unwrap()]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("; module simple_scope"));

    let spec = TestSpec::parse(&fs::read_to_string(&path).unwrap());
    TestRunner::new(false)
        .validate_output(&stdout, &spec.check_directives)
        .unwrap_or_else(|e| panic!("unwindc output mismatch: {}", e));
}

#[test]
fn test_unwindc_check_mode() {
    let path = script_path("simple_scope.scope");
    let output = run_unwindc(&["--check", path.to_str().unwrap()]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "PASS");
}

#[test]
fn test_unwindc_stats() {
    let path = script_path("loop_stats.scope");
    let output = run_unwindc(&["--stats", path.to_str().unwrap()]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Cache invalidations: 1"));
    assert!(stdout.contains("Arena bytes:"));
    assert!(!stdout.contains("define @"));
}

#[test]
fn test_unwindc_compile_failure() {
    let path = script_path("error.scope");
    let output = run_unwindc(&[path.to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("break outside a loop"));
}
