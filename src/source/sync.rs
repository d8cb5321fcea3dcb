// ABOUTME: Clones or fast-forwards the local working tree to the requested branch.
// ABOUTME: Every network git call runs with a fresh credential store and prompts disabled.

use super::credentials::CredentialStore;
use super::error::{SourceError, SpawnSnafu, WorkspaceSnafu};
use crate::config::SourceReference;
use crate::interrupt::{Interrupt, local_command};
use snafu::ResultExt;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// What the synchronizer did (or would do) to the local tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    Cloned,
    Updated,
    /// Dry run: the git commands that would have been executed.
    Planned(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    pub path: PathBuf,
    pub action: SyncAction,
}

pub struct SourceSynchronizer<'a> {
    source: &'a SourceReference,
    interrupt: &'a Interrupt,
    dry_run: bool,
}

impl<'a> SourceSynchronizer<'a> {
    pub fn new(source: &'a SourceReference, interrupt: &'a Interrupt) -> Self {
        Self {
            source,
            interrupt,
            dry_run: false,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Bring `<workspace>/<repo>` to the tip of the configured branch.
    ///
    /// The credential store is destroyed before this returns, whether git
    /// succeeded or not.
    pub async fn synchronize(&self) -> Result<SyncOutcome, SourceError> {
        self.check_interrupt()?;
        let path = &self.source.local_path;

        let existing = path.join(".git").exists();
        if !existing && path.exists() && !is_empty_dir(path) {
            return Err(SourceError::NotARepository { path: path.clone() });
        }

        if self.dry_run {
            let plan = if existing {
                self.update_plan()
            } else {
                vec![self.clone_plan()]
            };
            for step in &plan {
                tracing::info!("would run: {}", step);
            }
            return Ok(SyncOutcome {
                path: path.clone(),
                action: SyncAction::Planned(plan),
            });
        }

        if !existing && let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context(WorkspaceSnafu { path: parent })?;
        }

        let store = CredentialStore::create(
            &self.source.url,
            &self.source.token_user,
            &self.source.token,
        )?;
        let result = if existing {
            self.update(path, &store).await.map(|_| SyncAction::Updated)
        } else {
            self.clone_fresh(path, &store).await.map(|_| SyncAction::Cloned)
        };
        store.destroy()?;

        let action = result?;
        tracing::info!(
            "Source {} at {} ({})",
            match action {
                SyncAction::Cloned => "cloned",
                _ => "updated",
            },
            path.display(),
            self.source.branch
        );
        Ok(SyncOutcome {
            path: path.clone(),
            action,
        })
    }

    async fn clone_fresh(&self, path: &Path, store: &CredentialStore) -> Result<(), SourceError> {
        let target = path.to_string_lossy();
        self.git(
            "clone",
            None,
            Some(store),
            &[
                "clone",
                "--branch",
                self.source.branch.as_str(),
                "--single-branch",
                "--",
                self.source.url.as_str(),
                &target,
            ],
        )
        .await
    }

    async fn update(&self, path: &Path, store: &CredentialStore) -> Result<(), SourceError> {
        let branch = self.source.branch.as_str();
        let remote_ref = format!("origin/{branch}");

        self.git(
            "remote set-url",
            Some(path),
            None,
            &["remote", "set-url", "origin", self.source.url.as_str()],
        )
        .await?;
        self.git(
            "fetch",
            Some(path),
            Some(store),
            &[
                "fetch",
                "--prune",
                "origin",
                "+refs/heads/*:refs/remotes/origin/*",
            ],
        )
        .await?;

        let local_ref = format!("refs/heads/{branch}");
        if self
            .git_succeeds(path, &["rev-parse", "--verify", "--quiet", &local_ref])
            .await?
        {
            self.git("checkout", Some(path), None, &["checkout", branch])
                .await?;
        } else {
            self.git(
                "checkout",
                Some(path),
                None,
                &["checkout", "-b", branch, "--track", &remote_ref],
            )
            .await?;
        }

        self.git(
            "fast-forward",
            Some(path),
            None,
            &["merge", "--ff-only", &remote_ref],
        )
        .await
    }

    fn clone_plan(&self) -> String {
        format!(
            "git clone --branch {} --single-branch -- {} {}",
            self.source.branch,
            self.source.url.as_str(),
            self.source.local_path.display()
        )
    }

    fn update_plan(&self) -> Vec<String> {
        let branch = &self.source.branch;
        vec![
            "git fetch --prune origin +refs/heads/*:refs/remotes/origin/*".to_string(),
            format!("git checkout {branch}"),
            format!("git merge --ff-only origin/{branch}"),
        ]
    }

    fn check_interrupt(&self) -> Result<(), SourceError> {
        if self.interrupt.is_triggered() {
            Err(SourceError::Interrupted)
        } else {
            Ok(())
        }
    }

    fn command(&self, cwd: Option<&Path>, store: Option<&CredentialStore>) -> Command {
        let mut cmd = local_command("git");
        if let Some(dir) = cwd {
            cmd.arg("-C").arg(dir);
        }
        if let Some(store) = store {
            // The empty helper clears any helpers inherited from user config.
            cmd.args(["-c", "credential.helper="]);
            cmd.arg("-c").arg(format!("credential.helper={}", store.helper()));
        }
        cmd.env("GIT_TERMINAL_PROMPT", "0")
            .env("GCM_INTERACTIVE", "never");
        cmd
    }

    async fn git(
        &self,
        action: &str,
        cwd: Option<&Path>,
        store: Option<&CredentialStore>,
        args: &[&str],
    ) -> Result<(), SourceError> {
        self.check_interrupt()?;
        tracing::debug!("git {}", args.join(" "));

        let output = self
            .command(cwd, store)
            .args(args)
            .output()
            .await
            .context(SpawnSnafu)?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(self.failure(action, stderr.trim()))
        }
    }

    /// A git failure that coincides with Ctrl-C is reported as the interrupt.
    fn failure(&self, action: &str, detail: &str) -> SourceError {
        if self.interrupt.is_triggered() {
            SourceError::Interrupted
        } else {
            SourceError::Git {
                action: action.to_string(),
                detail: detail.to_string(),
            }
        }
    }

    async fn git_succeeds(&self, cwd: &Path, args: &[&str]) -> Result<bool, SourceError> {
        self.check_interrupt()?;
        let status = self
            .command(Some(cwd), None)
            .args(args)
            .status()
            .await
            .context(SpawnSnafu)?;
        if !status.success() {
            self.check_interrupt()?;
        }
        Ok(status.success())
    }
}

fn is_empty_dir(path: &Path) -> bool {
    std::fs::read_dir(path)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BranchName, RepoUrl, Token};

    fn source(workspace: &Path) -> SourceReference {
        let url = RepoUrl::parse("https://example.com/org/app.git").unwrap();
        let repo = url.repo_name().unwrap();
        SourceReference {
            local_path: workspace.join(repo.as_str()),
            url,
            repo,
            branch: BranchName::new("release").unwrap(),
            token: Token::new("secret").unwrap(),
            token_user: "x-access-token".to_string(),
        }
    }

    #[tokio::test]
    async fn dry_run_plans_clone_for_missing_tree() {
        let dir = tempfile::tempdir().unwrap();
        let source = source(dir.path());
        let interrupt = Interrupt::new();

        let outcome = SourceSynchronizer::new(&source, &interrupt)
            .dry_run(true)
            .synchronize()
            .await
            .unwrap();

        assert_eq!(outcome.path, dir.path().join("app"));
        match outcome.action {
            SyncAction::Planned(plan) => {
                assert_eq!(plan.len(), 1);
                assert!(plan[0].starts_with("git clone --branch release --single-branch"));
                assert!(!plan[0].contains("secret"));
            }
            other => panic!("unexpected action {other:?}"),
        }
        assert!(!outcome.path.exists());
    }

    #[tokio::test]
    async fn dry_run_plans_fetch_for_existing_tree() {
        let dir = tempfile::tempdir().unwrap();
        let source = source(dir.path());
        std::fs::create_dir_all(source.local_path.join(".git")).unwrap();
        let interrupt = Interrupt::new();

        let outcome = SourceSynchronizer::new(&source, &interrupt)
            .dry_run(true)
            .synchronize()
            .await
            .unwrap();

        match outcome.action {
            SyncAction::Planned(plan) => {
                assert!(plan[0].starts_with("git fetch"));
                assert_eq!(plan[2], "git merge --ff-only origin/release");
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_repository_directory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let source = source(dir.path());
        std::fs::create_dir_all(&source.local_path).unwrap();
        std::fs::write(source.local_path.join("README"), "hi").unwrap();
        let interrupt = Interrupt::new();

        let err = SourceSynchronizer::new(&source, &interrupt)
            .synchronize()
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::NotARepository { .. }));
    }

    #[test]
    fn git_failure_during_interrupt_reports_the_interrupt() {
        let dir = tempfile::tempdir().unwrap();
        let source = source(dir.path());
        let interrupt = Interrupt::new();
        let sync = SourceSynchronizer::new(&source, &interrupt);

        assert!(matches!(
            sync.failure("fetch", "fatal: early EOF"),
            SourceError::Git { .. }
        ));
        interrupt.trigger();
        assert!(matches!(
            sync.failure("fetch", "fatal: early EOF"),
            SourceError::Interrupted
        ));
    }

    #[tokio::test]
    async fn interrupt_stops_before_git() {
        let dir = tempfile::tempdir().unwrap();
        let source = source(dir.path());
        let interrupt = Interrupt::new();
        interrupt.trigger();

        let err = SourceSynchronizer::new(&source, &interrupt)
            .synchronize()
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Interrupted));
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }
}
