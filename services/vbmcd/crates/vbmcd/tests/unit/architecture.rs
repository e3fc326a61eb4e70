//! Structural tests for layer boundaries.
//!
//! These tests scan source files so an import across a forbidden boundary
//! fails the build's test run rather than a code review.

use std::path::{Path, PathBuf};

/// Collect all `.rs` files under a directory recursively.
fn collect_rs_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                files.extend(collect_rs_files(&path));
            } else if path.extension().and_then(|e| e.to_str()) == Some("rs") {
                files.push(path);
            }
        }
    }
    files
}

/// Track brace depth and report whether a line is inside a `#[cfg(test)]` block.
struct CfgTestTracker {
    in_test_block: bool,
    brace_depth: i32,
    test_block_start_depth: i32,
}

impl CfgTestTracker {
    fn new() -> Self {
        Self {
            in_test_block: false,
            brace_depth: 0,
            test_block_start_depth: 0,
        }
    }

    fn process_line(&mut self, line: &str) -> bool {
        if line.contains("#[cfg(test)]") || line.contains("#[cfg(all(test") {
            self.in_test_block = true;
            self.test_block_start_depth = self.brace_depth;
        }
        for ch in line.chars() {
            match ch {
                '{' => self.brace_depth += 1,
                '}' => {
                    self.brace_depth -= 1;
                    if self.in_test_block && self.brace_depth <= self.test_block_start_depth {
                        self.in_test_block = false;
                    }
                }
                _ => {}
            }
        }
        self.in_test_block
    }
}

/// Non-test, non-comment lines of every file under `src/<layer>`, with
/// their location.
fn production_lines(layer: &str) -> Vec<(String, String)> {
    let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("src").join(layer);
    let mut out = Vec::new();
    for file in collect_rs_files(&root) {
        let Ok(content) = std::fs::read_to_string(&file) else {
            continue;
        };
        let rel = file
            .strip_prefix(env!("CARGO_MANIFEST_DIR"))
            .unwrap_or(&file)
            .display()
            .to_string();
        let mut tracker = CfgTestTracker::new();
        for (i, line) in content.lines().enumerate() {
            let in_test = tracker.process_line(line);
            let trimmed = line.trim();
            if in_test || trimmed.starts_with("//") {
                continue;
            }
            out.push((format!("{rel}:{}", i + 1), line.to_string()));
        }
    }
    out
}

fn assert_no_match(layer: &str, forbidden: &[&str], rule: &str) {
    let violations: Vec<String> = production_lines(layer)
        .into_iter()
        .filter(|(_, line)| forbidden.iter().any(|f| line.contains(f)))
        .map(|(loc, line)| format!("{loc}: {line}"))
        .collect();
    assert!(
        violations.is_empty(),
        "{rule}:\n{}",
        violations.join("\n")
    );
}

#[test]
fn domain_is_pure() {
    assert_no_match(
        "domain",
        &[
            "crate::infra",
            "crate::application",
            "crate::server",
            "crate::worker",
            "tokio::",
            "std::fs",
            "std::process",
            "std::net",
        ],
        "domain/ must not perform I/O or depend on outer layers",
    );
}

#[test]
fn application_does_not_reach_into_adapters() {
    assert_no_match(
        "application",
        &["crate::infra", "crate::server", "crate::worker", "std::fs"],
        "application/ may only depend on domain/ and vbmc_common",
    );
}

#[test]
fn infra_does_not_depend_on_entry_points() {
    assert_no_match(
        "infra",
        &["crate::server", "crate::worker"],
        "infra/ must not import from server or worker",
    );
}

#[test]
fn no_print_macros_in_the_daemon() {
    for layer in ["domain", "application", "infra", "worker"] {
        assert_no_match(
            layer,
            &["println!", "eprintln!"],
            "daemon code logs through tracing, not print macros",
        );
    }
}

#[test]
fn supervisor_uses_port_traits_only() {
    assert_no_match(
        "application/services",
        &["IniConfigStore", "ProcessSpawner", "ChildHandle", "TokioCommandRunner"],
        "the supervisor must be generic over its ports",
    );
}
