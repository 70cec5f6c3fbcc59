//! Profile photo uploads.
//!
//! Photos live on disk under one directory as `<account id>.<png|jpg>`; the
//! account row keeps the file name. Served back under [`AVATAR_ROUTE`].

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tutor_core::{Account, AccountId, AvatarFormat, MAX_AVATAR_BYTES};
use tutor_store::AccountRepository;

use crate::ApiError;

/// Public path prefix of stored photos.
pub const AVATAR_ROUTE: &str = "/avatars/";

/// Distinguishes concurrent staging files.
static STAGE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Public URL of a stored photo.
#[must_use]
pub fn avatar_url(file_name: &str) -> String {
    format!("{AVATAR_ROUTE}{file_name}")
}

pub struct Avatars {
    accounts: Arc<dyn AccountRepository>,
    dir: PathBuf,
}

impl std::fmt::Debug for Avatars {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Avatars").field("dir", &self.dir).finish_non_exhaustive()
    }
}

impl Avatars {
    #[must_use]
    pub fn new(accounts: Arc<dyn AccountRepository>, dir: impl Into<PathBuf>) -> Self {
        Self { accounts, dir: dir.into() }
    }

    /// Same accounts, different directory.
    #[must_use]
    pub fn relocated(&self, dir: impl Into<PathBuf>) -> Self {
        Self::new(Arc::clone(&self.accounts), dir)
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Store `bytes` as `account`'s photo and return its URL. A photo in
    /// the other format is removed.
    ///
    /// # Errors
    /// [`ApiError::PayloadTooLarge`] above [`MAX_AVATAR_BYTES`],
    /// [`ApiError::BadRequest`] for a disallowed or mislabelled file and
    /// [`ApiError::Internal`] when the file cannot be written.
    pub async fn upload(&self, account: &Account, file_name: &str, bytes: &[u8]) -> Result<String, ApiError> {
        if bytes.len() > MAX_AVATAR_BYTES {
            return Err(ApiError::PayloadTooLarge);
        }
        let format = AvatarFormat::from_file_name(file_name)?;
        format.validate(bytes)?;

        let name = format.file_name_for(account.id);
        self.write(&name, bytes).await.map_err(|e| ApiError::Internal(format!("save avatar: {e}")))?;

        let previous = self.accounts.set_avatar(account.id, Some(&name)).await?;
        if let Some(old) = previous.filter(|old| *old != name) {
            self.remove(&old).await;
        }
        tracing::info!(account_id = %account.id, format = format.extension(), bytes = bytes.len(), "avatar updated");
        Ok(avatar_url(&name))
    }

    /// Read a stored photo by file name.
    ///
    /// # Errors
    /// [`ApiError::NotFound`] for a missing file or a name that is not a
    /// stored photo name.
    pub async fn fetch(&self, file_name: &str) -> Result<(AvatarFormat, Vec<u8>), ApiError> {
        let not_found = || ApiError::NotFound("not found".to_owned());
        let (_, format) = AvatarFormat::parse_file_name(file_name).ok_or_else(not_found)?;
        match tokio::fs::read(self.dir.join(file_name)).await {
            Ok(bytes) => Ok((format, bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(not_found()),
            Err(e) => Err(ApiError::Internal(format!("read avatar: {e}"))),
        }
    }

    /// Remove every photo stored for `account`. Failures are logged.
    pub async fn remove_all_for(&self, account: AccountId) {
        for format in [AvatarFormat::Png, AvatarFormat::Jpeg] {
            self.remove(&format.file_name_for(account)).await;
        }
    }

    async fn remove(&self, file_name: &str) {
        if AvatarFormat::parse_file_name(file_name).is_none() {
            return;
        }
        match tokio::fs::remove_file(self.dir.join(file_name)).await {
            Ok(()) => tracing::debug!(file_name, "avatar removed"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(file_name, error = %e, "failed to remove avatar"),
        }
    }

    /// Write through a staging file so readers never see a partial photo.
    async fn write(&self, name: &str, bytes: &[u8]) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let seq = STAGE_SEQ.fetch_add(1, Ordering::Relaxed);
        let staged = self.dir.join(format!(".{name}.{seq}.part"));
        tokio::fs::write(&staged, bytes).await?;
        if let Err(e) = tokio::fs::rename(&staged, self.dir.join(name)).await {
            let _ = tokio::fs::remove_file(&staged).await;
            return Err(e);
        }
        Ok(())
    }
}
