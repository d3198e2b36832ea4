use std::process::Command;

/// Embeds the short commit hash for `/api/v1/version`. Release images have no
/// `.git`, so `CHATHUB_GIT_SHA` can be passed in instead.
fn main() {
    let sha = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|out| out.status.success())
        .and_then(|out| String::from_utf8(out.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| std::env::var("CHATHUB_GIT_SHA").ok())
        .unwrap_or_else(|| "unknown".into());

    println!("cargo:rustc-env=GIT_SHA={sha}");
    println!("cargo:rerun-if-env-changed=CHATHUB_GIT_SHA");
    println!("cargo:rerun-if-changed=.git/HEAD");
}
