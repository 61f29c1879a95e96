//! Git subprocess helpers used for branch detection.
//!
//! Failure to invoke git (not a repo, git missing, timeout) is treated as
//! "on default branch" so that compaction-suppression fails safe toward
//! compacting rather than silently never compacting.

use std::path::Path;
use std::process::Command;
use std::time::Duration;

const DEFAULT_BRANCHES: &[&str] = &["main", "master"];

/// Returns the current branch name, or `None` if it could not be determined.
pub fn current_branch(repo_root: &Path) -> Option<String> {
    let output = run_git(repo_root, &["rev-parse", "--abbrev-ref", "HEAD"])?;
    let branch = output.trim().to_string();
    if branch.is_empty() || branch == "HEAD" {
        None
    } else {
        Some(branch)
    }
}

/// Whether the working tree is on its default branch. Errors (no git,
/// not a repo, detached HEAD) are fail-safe and report `true`.
pub fn is_on_default_branch(repo_root: &Path) -> bool {
    match current_branch(repo_root) {
        Some(branch) => DEFAULT_BRANCHES.contains(&branch.as_str()),
        None => true,
    }
}

fn run_git(cwd: &Path, args: &[&str]) -> Option<String> {
    let child = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::null())
        .spawn()
        .ok()?;

    let output = wait_with_timeout(child, Duration::from_secs(2))?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout).ok()
}

fn wait_with_timeout(mut child: std::process::Child, timeout: Duration) -> Option<std::process::Output> {
    let start = std::time::Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(_)) => return child.wait_with_output().ok(),
            Ok(None) => {
                if start.elapsed() > timeout {
                    let _ = child.kill();
                    return None;
                }
                std::thread::sleep(Duration::from_millis(20));
            }
            Err(_) => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_repo_directory_is_treated_as_default_branch() {
        let dir = tempfile::tempdir().unwrap();
        assert!(is_on_default_branch(dir.path()));
    }
}
