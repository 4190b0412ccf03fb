//! Stamps the gateway binaries with their source revision and build profile
//!
//! - `GIT_HASH` - `git describe --always --dirty`, or `unknown` outside a checkout
//! - `BUILD_PROFILE` - cargo profile the gateway was built with

use std::env;
use std::process::Command;

/// Trimmed stdout of a successful git invocation
fn git_output(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8(output.stdout).ok()?;
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn main() {
    let revision = git_output(&["describe", "--always", "--dirty", "--abbrev=10"])
        .unwrap_or_else(|| "unknown".to_string());
    println!("cargo:rustc-env=GIT_HASH={revision}");

    let profile = env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());
    println!("cargo:rustc-env=BUILD_PROFILE={profile}");

    // Branch switches move HEAD, new commits move the refs
    if let Some(git_dir) = git_output(&["rev-parse", "--git-dir"]) {
        println!("cargo:rerun-if-changed={git_dir}/HEAD");
        println!("cargo:rerun-if-changed={git_dir}/refs");
    }
    println!("cargo:rerun-if-changed=build.rs");
}
