//! Profile photo rules: accepted formats, size ceiling and stored names.

use crate::{AccountId, CoreError};

/// Largest accepted upload, in bytes.
pub const MAX_AVATAR_BYTES: usize = 5 << 20;

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";
const JPEG_SIGNATURE: &[u8] = &[0xff, 0xd8, 0xff];

/// An accepted avatar image format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvatarFormat {
    Png,
    Jpeg,
}

impl AvatarFormat {
    /// Pick the format from an uploaded file name. Only `.png`, `.jpg` and
    /// `.jpeg` are accepted, case-insensitively.
    ///
    /// # Errors
    /// [`CoreError::InvalidAvatar`] for any other extension.
    pub fn from_file_name(name: &str) -> Result<Self, CoreError> {
        let ext = name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "png" => Ok(Self::Png),
            "jpg" | "jpeg" => Ok(Self::Jpeg),
            _ => Err(CoreError::InvalidAvatar("only JPG/PNG allowed")),
        }
    }

    /// Check the upload against the format's size ceiling and magic bytes.
    ///
    /// # Errors
    /// [`CoreError::InvalidAvatar`] for an empty, oversized or mislabelled
    /// file.
    pub fn validate(self, bytes: &[u8]) -> Result<(), CoreError> {
        if bytes.is_empty() {
            return Err(CoreError::InvalidAvatar("empty file"));
        }
        if bytes.len() > MAX_AVATAR_BYTES {
            return Err(CoreError::InvalidAvatar("file too large"));
        }
        let signature = match self {
            Self::Png => PNG_SIGNATURE,
            Self::Jpeg => JPEG_SIGNATURE,
        };
        if !bytes.starts_with(signature) {
            return Err(CoreError::InvalidAvatar("file content does not match its extension"));
        }
        Ok(())
    }

    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
        }
    }

    #[must_use]
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
        }
    }

    /// Stored file name for `account`'s photo in this format.
    #[must_use]
    pub fn file_name_for(self, account: AccountId) -> String {
        format!("{account}.{}", self.extension())
    }

    /// Parse a stored file name back into its owner and format. Anything
    /// that [`AvatarFormat::file_name_for`] could not have produced is
    /// rejected, path separators included.
    #[must_use]
    pub fn parse_file_name(name: &str) -> Option<(AccountId, Self)> {
        let (stem, ext) = name.split_once('.')?;
        let format = match ext {
            "png" => Self::Png,
            "jpg" => Self::Jpeg,
            _ => return None,
        };
        let account = stem.parse::<AccountId>().ok()?;
        Some((account, format))
    }
}
