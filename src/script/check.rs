//! FileCheck-style test validation for scope scripts.
//!
//! This module parses RUN and CHECK directives embedded in script comments
//! and validates compiler output against them, in the manner of LLVM's
//! FileCheck tool.

use super::{compile_script, CompileOptions};
use crate::core::CompilationSession;
use bumpalo::Bump;
use log::debug;

/// A CHECK directive extracted from a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckDirective {
    /// CHECK: pattern - Match pattern on some later line
    Check(String),
    /// CHECK-LABEL: pattern - Label for a section
    CheckLabel(String),
    /// CHECK-NEXT: pattern - Match on the next line
    CheckNext(String),
    /// CHECK-NOT: pattern - Pattern must not occur before the next match
    CheckNot(String),
    /// CHECK-EMPTY - Match empty line
    CheckEmpty,
    /// COM: comment - Comment, ignored
    Comment(String),
}

/// A RUN directive specifying how to execute the test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunDirective {
    pub command: String,
    pub args: Vec<String>,
}

impl RunDirective {
    fn has_flag(&self, flag: &str) -> bool {
        self.args.iter().any(|arg| arg == flag)
    }
}

/// Test specification extracted from a script.
#[derive(Debug)]
pub struct TestSpec {
    pub run_directives: Vec<RunDirective>,
    pub check_directives: Vec<CheckDirective>,
    /// The whole file; directives are comments in the script language.
    pub source: String,
}

const DIRECTIVES: [&str; 6] = [
    "; CHECK-LABEL:",
    "; CHECK-NEXT:",
    "; CHECK-NOT:",
    "; CHECK:",
    "; COM:",
    "; RUN:",
];

impl TestSpec {
    /// Extract the directives of a script.
    pub fn parse(content: &str) -> Self {
        let mut run_directives = Vec::new();
        let mut check_directives = Vec::new();

        for line in content.lines() {
            let trimmed = line.trim();
            if trimmed.starts_with("; CHECK-EMPTY") {
                check_directives.push(CheckDirective::CheckEmpty);
                continue;
            }

            let Some((prefix, rest)) = DIRECTIVES
                .iter()
                .find_map(|prefix| trimmed.strip_prefix(prefix).map(|rest| (*prefix, rest.trim())))
            else {
                continue;
            };

            let pattern = rest.to_string();
            match prefix {
                "; RUN:" => {
                    let mut parts = rest.split_whitespace();
                    if let Some(command) = parts.next() {
                        run_directives.push(RunDirective {
                            command: command.to_string(),
                            args: parts.map(str::to_string).collect(),
                        });
                    }
                }
                "; CHECK-LABEL:" => check_directives.push(CheckDirective::CheckLabel(pattern)),
                "; CHECK-NEXT:" => check_directives.push(CheckDirective::CheckNext(pattern)),
                "; CHECK-NOT:" => check_directives.push(CheckDirective::CheckNot(pattern)),
                "; CHECK:" => check_directives.push(CheckDirective::Check(pattern)),
                _ => check_directives.push(CheckDirective::Comment(pattern)),
            }
        }

        TestSpec {
            run_directives,
            check_directives,
            source: content.to_string(),
        }
    }
}

/// Test runner that executes script tests.
pub struct TestRunner {
    verbose: bool,
}

impl TestRunner {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Run every RUN line of a test and validate its output.
    pub fn run_test(&self, spec: &TestSpec) -> Result<(), String> {
        if spec.run_directives.is_empty() {
            return Err("no RUN directive".to_string());
        }
        for run_dir in &spec.run_directives {
            let output = self.execute_command(&spec.source, run_dir)?;
            self.validate_output(&output, &spec.check_directives)?;
        }
        Ok(())
    }

    /// Compile `source` as described by `run_dir` and return the output.
    ///
    /// Recognized flags: `--print-ir` (the default when no output flag is
    /// given), `--stats`, `--suppress-cleanups`, and `--expect-error`, which
    /// turns a compile failure into checked output instead of a test failure.
    pub fn execute_command(&self, source: &str, run_dir: &RunDirective) -> Result<String, String> {
        let options = CompileOptions {
            suppress_cleanups: run_dir.has_flag("--suppress-cleanups"),
        };
        let print_stats = run_dir.has_flag("--stats");
        let print_ir = run_dir.has_flag("--print-ir") || !print_stats;

        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let mut output = Vec::new();

        match compile_script(&session, "script", source, options) {
            Ok(module) => {
                if run_dir.has_flag("--expect-error") {
                    return Err("expected compilation to fail".to_string());
                }
                if print_ir {
                    output.push(module.to_string());
                }
            }
            Err(err) => {
                if !run_dir.has_flag("--expect-error") {
                    return Err(format!("compilation failed: {}", err));
                }
                output.push(format!("error: {}", err));
            }
        }

        if print_stats {
            output.push(session.stats().to_string());
        }

        let output = output.join("\n");
        if self.verbose {
            debug!("Output of {}:\n{}", run_dir.command, output);
        }
        Ok(output)
    }

    /// Validate output against CHECK directives.
    pub fn validate_output(&self, output: &str, directives: &[CheckDirective]) -> Result<(), String> {
        let output_lines: Vec<&str> = output.lines().collect();
        let mut line_idx = 0;
        let mut pending_not: Vec<&str> = Vec::new();

        for directive in directives {
            match directive {
                CheckDirective::Comment(_) => continue,

                CheckDirective::CheckNot(pattern) => pending_not.push(pattern.as_str()),

                CheckDirective::Check(pattern) | CheckDirective::CheckLabel(pattern) => {
                    let kind = match directive {
                        CheckDirective::CheckLabel(_) => "CHECK-LABEL",
                        _ => "CHECK",
                    };
                    let found = output_lines
                        .iter()
                        .skip(line_idx)
                        .position(|line| line.contains(pattern.as_str()));

                    match found {
                        Some(idx) => {
                            Self::check_absent(&output_lines[line_idx..line_idx + idx], &pending_not)?;
                            pending_not.clear();
                            line_idx += idx + 1;
                            if self.verbose {
                                debug!("{}: '{}' found at line {}", kind, pattern, line_idx - 1);
                            }
                        }
                        None => {
                            return Err(format!("{}: pattern '{}' not found in output", kind, pattern));
                        }
                    }
                }

                CheckDirective::CheckNext(pattern) => {
                    if line_idx >= output_lines.len() {
                        return Err(format!("CHECK-NEXT: no more lines, expected '{}'", pattern));
                    }

                    let line = output_lines[line_idx];
                    if !line.contains(pattern.as_str()) {
                        return Err(format!(
                            "CHECK-NEXT: expected '{}' but got '{}'",
                            pattern, line
                        ));
                    }

                    if self.verbose {
                        debug!("CHECK-NEXT: '{}' matches at line {}", pattern, line_idx);
                    }
                    line_idx += 1;
                }

                CheckDirective::CheckEmpty => {
                    if line_idx >= output_lines.len() {
                        continue; // End of output counts as empty
                    }

                    let line = output_lines[line_idx];
                    if !line.trim().is_empty() {
                        return Err(format!(
                            "CHECK-EMPTY: expected empty line but got '{}'",
                            line
                        ));
                    }
                    line_idx += 1;
                }
            }
        }

        let rest = output_lines.get(line_idx..).unwrap_or(&[]);
        Self::check_absent(rest, &pending_not)
    }

    fn check_absent(lines: &[&str], patterns: &[&str]) -> Result<(), String> {
        for pattern in patterns {
            if let Some(line) = lines.iter().find(|line| line.contains(pattern)) {
                return Err(format!("CHECK-NOT: pattern '{}' found in '{}'", pattern, line));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_directives() {
        let content = r#"; RUN: %unwindc --print-ir %s
; CHECK: define @f
; CHECK-LABEL: entry:
; CHECK-NEXT: ret
; CHECK-NOT: invoke
; COM: This is a comment
func f {
}"#;

        let spec = TestSpec::parse(content);
        assert_eq!(spec.run_directives.len(), 1);
        assert_eq!(spec.run_directives[0].command, "%unwindc");
        assert_eq!(spec.check_directives.len(), 5);
        assert_eq!(
            spec.check_directives[3],
            CheckDirective::CheckNot("invoke".to_string())
        );
        assert!(spec.source.contains("func f {"));
    }

    #[test]
    fn test_check_matching() {
        let runner = TestRunner::new(false);
        let output = "define @f {\nentry:\n  ret\n}\n";

        let directives = vec![
            CheckDirective::Check("define @f".to_string()),
            CheckDirective::CheckLabel("entry:".to_string()),
            CheckDirective::CheckNext("ret".to_string()),
        ];

        runner.validate_output(output, &directives).unwrap();
    }

    #[test]
    fn test_check_next_failure() {
        let runner = TestRunner::new(false);
        let output = "Line 1\nLine 2\nLine 3\n";

        let directives = vec![
            CheckDirective::Check("Line 1".to_string()),
            CheckDirective::CheckNext("Line 3".to_string()),
        ];

        let result = runner.validate_output(output, &directives);
        assert!(result.unwrap_err().contains("CHECK-NEXT"));
    }

    #[test]
    fn test_check_not_window() {
        let runner = TestRunner::new(false);
        let output = "a\nb\nc\n";

        // "b" lies between the two matches
        let directives = vec![
            CheckDirective::Check("a".to_string()),
            CheckDirective::CheckNot("b".to_string()),
            CheckDirective::Check("c".to_string()),
        ];
        assert!(runner
            .validate_output(output, &directives)
            .unwrap_err()
            .contains("CHECK-NOT"));

        // Only the lines after the last match are searched at the end
        let directives = vec![
            CheckDirective::Check("b".to_string()),
            CheckDirective::CheckNot("a".to_string()),
        ];
        runner.validate_output(output, &directives).unwrap();
    }

    #[test]
    fn test_expect_error() {
        let runner = TestRunner::new(false);
        let spec = TestSpec::parse(
            "; RUN: %unwindc --expect-error %s\n; CHECK: error: Script error at line 4\nfunc f {\n  bogus\n}\n",
        );
        runner.run_test(&spec).unwrap();
    }
}
