// ABOUTME: Ephemeral git credential store holding the source-control token.
// ABOUTME: Created owner-only, overwritten with zeros before removal, even on failure paths.

use super::error::{SecretIoSnafu, SourceError};
use crate::remote::quote;
use crate::types::{RepoUrl, Token};
use snafu::ResultExt;
use std::fs::Permissions;
use std::io::{Seek, SeekFrom, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const OWNER_ONLY: u32 = 0o600;

/// A `git credential-store` file scoped to one synchronisation.
#[derive(Debug)]
pub struct CredentialStore {
    file: Option<NamedTempFile>,
    path: PathBuf,
}

impl CredentialStore {
    /// Create the store in the system temp directory.
    pub fn create(url: &RepoUrl, user: &str, token: &Token) -> Result<Self, SourceError> {
        Self::create_in(&std::env::temp_dir(), url, user, token)
    }

    pub fn create_in(
        dir: &Path,
        url: &RepoUrl,
        user: &str,
        token: &Token,
    ) -> Result<Self, SourceError> {
        let mut file = tempfile::Builder::new()
            .prefix(".dockhand-cred-")
            .permissions(Permissions::from_mode(OWNER_ONLY))
            .tempfile_in(dir)
            .context(SecretIoSnafu { action: "create" })?;

        let mode = file
            .as_file()
            .metadata()
            .context(SecretIoSnafu { action: "stat" })?
            .permissions()
            .mode()
            & 0o777;
        if mode != OWNER_ONLY {
            return Err(SourceError::SecretPermissions { mode });
        }

        let line = format!(
            "{}://{}:{}@{}\n",
            url.scheme(),
            urlencoding::encode(user),
            urlencoding::encode(token.expose()),
            url.host()
        );
        file.write_all(line.as_bytes())
            .and_then(|_| file.as_file().sync_all())
            .context(SecretIoSnafu { action: "write" })?;

        let path = file.path().to_path_buf();
        tracing::debug!("Created credential store at {}", path.display());
        Ok(Self {
            file: Some(file),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Value for `-c credential.helper=...`.
    pub fn helper(&self) -> String {
        format!("store --file={}", quote(&self.path.to_string_lossy()))
    }

    /// Overwrite, then delete. Verifies the file is gone.
    pub fn destroy(mut self) -> Result<(), SourceError> {
        if let Some(file) = self.file.take() {
            wipe(file).context(SecretIoSnafu { action: "erase" })?;
        }
        if self.path.exists() {
            return Err(SourceError::SecretIo {
                action: "erase",
                source: std::io::Error::other("file still present after removal"),
            });
        }
        tracing::debug!("Erased credential store {}", self.path.display());
        Ok(())
    }
}

impl Drop for CredentialStore {
    fn drop(&mut self) {
        if let Some(file) = self.file.take()
            && let Err(e) = wipe(file)
        {
            tracing::error!("Failed to erase credential store {}: {}", self.path.display(), e);
        }
    }
}

fn wipe(file: NamedTempFile) -> std::io::Result<()> {
    {
        let mut handle = file.as_file();
        let len = handle.metadata()?.len() as usize;
        handle.seek(SeekFrom::Start(0))?;
        handle.write_all(&vec![0u8; len])?;
        handle.sync_all()?;
    }
    file.close()
}
