//! Stamps the git revision into the binary for `webp-relay --version`.

use std::process::{Command, Output};

fn git(args: &[&str]) -> Option<Output> {
    Command::new("git")
        .args(args)
        .output()
        .ok()
        .filter(|o| o.status.success())
}

fn main() {
    // A checkout or commit moves HEAD or a ref.
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/");

    let revision = git(&["rev-parse", "--short", "HEAD"])
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_owned())
        .unwrap_or_default();
    let tagged_release = git(&["describe", "--exact-match", "--tags", "HEAD"]).is_some();

    // Outside a git checkout both stay empty/false and the binary reports dev@unknown.
    println!("cargo:rustc-env=GIT_HASH={revision}");
    println!("cargo:rustc-env=ON_RELEASE_TAG={tagged_release}");
}
