//! Stamps the binary with its commit and build time for the startup banner.

use std::process::Command;

/// Short commit of the checkout, or `unknown` outside a git tree
fn short_commit() -> String {
    Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|out| out.status.success())
        .and_then(|out| String::from_utf8(out.stdout).ok())
        .map(|commit| commit.trim().to_owned())
        .filter(|commit| !commit.is_empty())
        .unwrap_or_else(|| "unknown".to_owned())
}

fn main() {
    let built_at = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);

    for (key, value) in [("GIT_COMMIT_SHORT", short_commit()), ("BUILD_TIMESTAMP", built_at)] {
        println!("cargo:rustc-env={key}={value}");
    }
    println!("cargo:rerun-if-changed=.git/HEAD");
}
