use std::process::Command;

fn main() {
    // Add build-time information
    println!("cargo:rustc-env=BUILD_TIME={}", chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC"));

    // Git metadata falls back to "unknown" outside a checkout
    let git_hash = git_output(&["rev-parse", "--short", "HEAD"]);
    println!("cargo:rustc-env=GIT_HASH={}", git_hash);

    let git_branch = git_output(&["rev-parse", "--abbrev-ref", "HEAD"]);
    println!("cargo:rustc-env=GIT_BRANCH={}", git_branch);

    println!("cargo:rerun-if-changed=build.rs");
}

fn git_output(args: &[&str]) -> String {
    match Command::new("git").args(args).output() {
        Ok(output) if output.status.success() => {
            String::from_utf8_lossy(&output.stdout).trim().to_string()
        }
        _ => "unknown".to_string(),
    }
}
