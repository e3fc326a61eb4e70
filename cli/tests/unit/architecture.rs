//! Architecture rules for the CLI crate.
//!
//! - Terminal output goes through the `output` module (and `main` for
//!   fatal errors), so `--json` and `--quiet` stay honest.
//! - Only the client module opens sockets.

#![allow(clippy::expect_used)]

use std::fs;
use std::path::{Path, PathBuf};

fn sources(dir: &Path, out: &mut Vec<PathBuf>) {
    for entry in fs::read_dir(dir).expect("read source dir") {
        let path = entry.expect("dir entry").path();
        if path.is_dir() {
            sources(&path, out);
        } else if path.extension().is_some_and(|e| e == "rs") {
            out.push(path);
        }
    }
}

fn src_files() -> Vec<(PathBuf, String)> {
    let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("src");
    let mut files = Vec::new();
    sources(&root, &mut files);
    files
        .into_iter()
        .map(|p| {
            let text = fs::read_to_string(&p).expect("read source");
            (p, text)
        })
        .collect()
}

#[test]
fn printing_is_confined_to_output_and_main() {
    for (path, text) in src_files() {
        let allowed = path.components().any(|c| c.as_os_str() == "output") || path.ends_with("main.rs");
        if allowed {
            continue;
        }
        for needle in ["println!", "eprintln!", "print!("] {
            assert!(!text.contains(needle), "{} uses {needle}", path.display());
        }
    }
}

#[test]
fn sockets_are_opened_by_the_client_only() {
    for (path, text) in src_files() {
        if path.ends_with("client.rs") {
            continue;
        }
        assert!(
            !text.contains("TcpStream"),
            "{} opens a TCP stream outside the client",
            path.display()
        );
    }
}
