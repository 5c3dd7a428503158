//! Git Worktree Manager (§4.H): creates per-task isolated working trees,
//! detects and performs merges back into a target branch, and reclaims
//! orphaned worktrees during crash recovery.

use std::path::PathBuf;

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum WorktreeError {
    #[error("failed to create worktree: {0}")]
    CreateFailed(String),

    #[error("failed to remove worktree: {0}")]
    RemoveFailed(String),

    #[error("worktree not found: {0}")]
    NotFound(String),

    #[error("disk space error: {0}")]
    DiskSpace(String),

    #[error("git command failed: {0}")]
    GitError(String),

    #[error("git version check failed: {0}")]
    VersionCheck(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, WorktreeError>;

#[derive(Debug, Clone)]
pub struct WorktreeConfig {
    pub base_dir: PathBuf,
    pub repo_root: PathBuf,
    pub min_disk_space_gb: u64,
    pub branch_prefix: String,
    pub default_base_branch: String,
}

impl Default for WorktreeConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("worktrees"),
            repo_root: PathBuf::from("."),
            min_disk_space_gb: 5,
            branch_prefix: "substrate".to_string(),
            default_base_branch: "main".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorktreeInfo {
    pub task_id: String,
    pub path: PathBuf,
    pub branch: String,
}

#[derive(Debug, Clone)]
pub struct ConflictReport {
    pub has_conflicts: bool,
    pub conflicting_files: Vec<String>,
    pub task_id: String,
    pub target_branch: String,
}

#[derive(Debug, Clone)]
pub struct MergeResult {
    pub success: bool,
    pub merged_files: Vec<String>,
    pub conflicts: Option<ConflictReport>,
}

pub struct WorktreeManager {
    config: WorktreeConfig,
}

impl WorktreeManager {
    pub fn new(config: WorktreeConfig) -> Self {
        Self { config }
    }

    fn worktree_path(&self, task_id: &str) -> PathBuf {
        self.config.base_dir.join(task_id)
    }

    fn branch_name(&self, task_id: &str) -> String {
        format!("{}/task-{}", self.config.branch_prefix, task_id)
    }

    /// Creates a new branch forked from `base_branch` (or the configured
    /// default) and a worktree checked out onto it (§4.H).
    pub async fn create_worktree(&self, task_id: &str, base_branch: Option<&str>) -> Result<WorktreeInfo> {
        debug!(%task_id, "create_worktree: called");
        self.ensure_disk_space().await?;

        tokio::fs::create_dir_all(&self.config.base_dir).await?;

        let worktree_path = self.worktree_path(task_id);
        let branch = self.branch_name(task_id);
        let base = base_branch.unwrap_or(&self.config.default_base_branch);

        let output = Command::new("git")
            .args(["worktree", "add", worktree_path.to_str().unwrap(), "-b", &branch, base])
            .current_dir(&self.config.repo_root)
            .output()
            .await
            .map_err(|e| WorktreeError::GitError(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(WorktreeError::CreateFailed(stderr.to_string()));
        }

        info!(%task_id, ?worktree_path, %branch, "worktree created");
        Ok(WorktreeInfo { task_id: task_id.to_string(), path: worktree_path, branch })
    }

    /// Removes both the worktree and its branch. Safe if either was only
    /// partially created.
    pub async fn cleanup_worktree(&self, task_id: &str) -> Result<()> {
        debug!(%task_id, "cleanup_worktree: called");
        let worktree_path = self.worktree_path(task_id);

        if worktree_path.exists() {
            let output = Command::new("git")
                .args(["worktree", "remove", worktree_path.to_str().unwrap(), "--force"])
                .current_dir(&self.config.repo_root)
                .output()
                .await
                .map_err(|e| WorktreeError::GitError(e.to_string()))?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                if !stderr.contains("is not a working tree") {
                    return Err(WorktreeError::RemoveFailed(stderr.to_string()));
                }
            }
        } else {
            warn!(%task_id, "cleanup_worktree: worktree directory already gone");
        }

        let branch = self.branch_name(task_id);
        let _ = Command::new("git")
            .args(["branch", "-D", &branch])
            .current_dir(&self.config.repo_root)
            .output()
            .await;

        info!(%task_id, "worktree cleaned up");
        Ok(())
    }

    /// Scans the base directory and destroys every worktree it finds,
    /// returning the count removed. Used by crash recovery (§4.L).
    pub async fn cleanup_all_worktrees(&self) -> Result<usize> {
        debug!("cleanup_all_worktrees: called");
        let worktrees = self.list_worktrees().await?;
        let mut cleaned = 0;
        for wt in worktrees {
            if let Err(e) = self.cleanup_worktree(&wt.task_id).await {
                warn!(task_id = %wt.task_id, error = %e, "cleanup_all_worktrees: failed to remove one worktree");
            } else {
                cleaned += 1;
            }
        }
        debug!(cleaned, "cleanup_all_worktrees: done");
        Ok(cleaned)
    }

    /// Simulates a no-commit, no-fast-forward merge of `task_id`'s branch
    /// into `target_branch`, collecting the conflicting file list without
    /// leaving the simulation applied.
    pub async fn detect_conflicts(&self, task_id: &str, target_branch: Option<&str>) -> Result<ConflictReport> {
        let worktree_path = self.worktree_path(task_id);
        if !worktree_path.exists() {
            return Err(WorktreeError::NotFound(task_id.to_string()));
        }
        let branch = self.branch_name(task_id);
        let target = target_branch.unwrap_or(&self.config.default_base_branch).to_string();

        let output = Command::new("git")
            .args(["merge", "--no-commit", "--no-ff", &branch])
            .current_dir(&self.config.repo_root)
            .output()
            .await
            .map_err(|e| WorktreeError::GitError(e.to_string()))?;

        let has_conflicts = !output.status.success();
        let conflicting_files = if has_conflicts {
            self.list_unmerged_files().await?
        } else {
            Vec::new()
        };

        let _ = Command::new("git")
            .args(["merge", "--abort"])
            .current_dir(&self.config.repo_root)
            .output()
            .await;

        Ok(ConflictReport { has_conflicts, conflicting_files, task_id: task_id.to_string(), target_branch: target })
    }

    async fn list_unmerged_files(&self) -> Result<Vec<String>> {
        let output = Command::new("git")
            .args(["diff", "--name-only", "--diff-filter=U"])
            .current_dir(&self.config.repo_root)
            .output()
            .await
            .map_err(|e| WorktreeError::GitError(e.to_string()))?;
        Ok(String::from_utf8_lossy(&output.stdout).lines().map(str::to_string).collect())
    }

    /// Runs [`detect_conflicts`] first; on a clean result, performs a real
    /// no-fast-forward merge and returns the merged file list.
    pub async fn merge_worktree(&self, task_id: &str, target_branch: Option<&str>) -> Result<MergeResult> {
        let report = self.detect_conflicts(task_id, target_branch).await?;
        if report.has_conflicts {
            return Ok(MergeResult { success: false, merged_files: Vec::new(), conflicts: Some(report) });
        }

        let branch = self.branch_name(task_id);
        let message = format!("merge: task {task_id}");
        let output = Command::new("git")
            .args(["merge", "--no-ff", "-m", &message, &branch])
            .current_dir(&self.config.repo_root)
            .output()
            .await
            .map_err(|e| WorktreeError::GitError(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(WorktreeError::GitError(stderr.to_string()));
        }

        let diff = Command::new("git")
            .args(["diff", "--name-only", "HEAD@{1}", "HEAD"])
            .current_dir(&self.config.repo_root)
            .output()
            .await
            .map_err(|e| WorktreeError::GitError(e.to_string()))?;
        let merged_files = String::from_utf8_lossy(&diff.stdout).lines().map(str::to_string).collect();

        info!(%task_id, "worktree merged");
        Ok(MergeResult { success: true, merged_files, conflicts: None })
    }

    /// Asserts the `git` binary is present and reports a version string;
    /// does not attempt to parse/compare it beyond presence, since callers
    /// only act on the error case.
    pub async fn verify_git_version(&self) -> Result<String> {
        let output = Command::new("git")
            .args(["--version"])
            .output()
            .await
            .map_err(|e| WorktreeError::VersionCheck(e.to_string()))?;
        if !output.status.success() {
            return Err(WorktreeError::VersionCheck("git --version exited non-zero".to_string()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// The on-disk active set, database-free.
    pub async fn list_worktrees(&self) -> Result<Vec<WorktreeInfo>> {
        let mut worktrees = Vec::new();
        if !self.config.base_dir.exists() {
            return Ok(worktrees);
        }

        let mut entries = tokio::fs::read_dir(&self.config.base_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.is_dir() {
                let task_id = path.file_name().unwrap().to_str().unwrap().to_string();
                let branch = self.branch_name(&task_id);
                worktrees.push(WorktreeInfo { task_id, path, branch });
            }
        }
        Ok(worktrees)
    }

    async fn ensure_disk_space(&self) -> Result<()> {
        let available_gb = self.check_disk_space().await?;
        if available_gb < self.config.min_disk_space_gb {
            return Err(WorktreeError::DiskSpace(format!(
                "only {available_gb}GB available, need {}GB minimum",
                self.config.min_disk_space_gb
            )));
        }
        Ok(())
    }

    async fn check_disk_space(&self) -> Result<u64> {
        let output = Command::new("df")
            .args(["-BG", self.config.base_dir.to_str().unwrap_or("/tmp")])
            .output()
            .await
            .map_err(|e| WorktreeError::DiskSpace(e.to_string()))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        for line in stdout.lines().skip(1) {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() >= 4 {
                let available = parts[3].trim_end_matches('G');
                if let Ok(gb) = available.parse::<u64>() {
                    return Ok(gb);
                }
            }
        }
        Ok(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup_git_repo(dir: &std::path::Path) {
        for args in [
            vec!["init"],
            vec!["config", "user.email", "test@test.com"],
            vec!["config", "user.name", "Test"],
        ] {
            Command::new("git").args(&args).current_dir(dir).output().await.unwrap();
        }
        tokio::fs::write(dir.join("README.md"), "x").await.unwrap();
        Command::new("git").args(["add", "-A"]).current_dir(dir).output().await.unwrap();
        Command::new("git")
            .args(["commit", "-m", "initial"])
            .current_dir(dir)
            .output()
            .await
            .unwrap();
    }

    fn config_for(repo: &std::path::Path, worktrees: &std::path::Path) -> WorktreeConfig {
        WorktreeConfig {
            base_dir: worktrees.to_path_buf(),
            repo_root: repo.to_path_buf(),
            min_disk_space_gb: 1,
            branch_prefix: "test".to_string(),
            default_base_branch: "master".to_string(),
        }
    }

    #[tokio::test]
    async fn create_then_cleanup_round_trips() {
        let repo_dir = tempdir().unwrap();
        let worktree_dir = tempdir().unwrap();
        setup_git_repo(repo_dir.path()).await;

        let manager = WorktreeManager::new(config_for(repo_dir.path(), worktree_dir.path()));
        let info = manager.create_worktree("t1", None).await.unwrap();
        assert!(info.path.exists());
        assert_eq!(info.branch, "test/task-t1");

        manager.cleanup_worktree("t1").await.unwrap();
        assert!(!info.path.exists());
    }

    #[tokio::test]
    async fn cleanup_all_worktrees_removes_everything() {
        let repo_dir = tempdir().unwrap();
        let worktree_dir = tempdir().unwrap();
        setup_git_repo(repo_dir.path()).await;

        let manager = WorktreeManager::new(config_for(repo_dir.path(), worktree_dir.path()));
        manager.create_worktree("t1", None).await.unwrap();
        manager.create_worktree("t2", None).await.unwrap();

        let cleaned = manager.cleanup_all_worktrees().await.unwrap();
        assert_eq!(cleaned, 2);
        assert!(manager.list_worktrees().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn verify_git_version_succeeds_when_git_present() {
        let repo_dir = tempdir().unwrap();
        let worktree_dir = tempdir().unwrap();
        let manager = WorktreeManager::new(config_for(repo_dir.path(), worktree_dir.path()));
        assert!(manager.verify_git_version().await.is_ok());
    }
}
