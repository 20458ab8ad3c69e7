// SPDX-License-Identifier: GPL-3.0-only

use std::process::Command;

fn main() {
    println!("cargo::rerun-if-changed=.git/HEAD");
    println!("cargo::rerun-if-changed=.git/refs/tags");
    println!("cargo::rerun-if-env-changed=UVC2GL_VERSION");

    // Packagers can pin the version without a git checkout
    let version = std::env::var("UVC2GL_VERSION")
        .ok()
        .or_else(git_describe)
        .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string());

    println!("cargo::rustc-env=GIT_VERSION={}", version);
}

/// `0.2.0`, `0.2.0-3-gabcdef1` or `0.2.0-dirty` from the nearest `v*` tag
fn git_describe() -> Option<String> {
    let output = Command::new("git")
        .args(["describe", "--tags", "--dirty", "--match", "v*"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let described = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let version = described.strip_prefix('v').unwrap_or(&described);
    (!version.is_empty()).then(|| version.to_string())
}
