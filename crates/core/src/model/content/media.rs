use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

//
// ─── ERRORS (domain validation) ────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MediaValidationError {
    #[error("Media URI cannot be empty.")]
    EmptyMediaUri,

    #[error("Media URL is not valid: {0}")]
    InvalidUrl(String),

    #[error("Media must name exactly one of `file` or `url`.")]
    AmbiguousSource,
}

//
// ─── MEDIA CORE TYPES ──────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Audio,
    Photo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaUri {
    FilePath(PathBuf),
    Url(Url),
}

impl MediaUri {
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, MediaValidationError> {
        let p = path.into();
        if p.as_os_str().is_empty() {
            return Err(MediaValidationError::EmptyMediaUri);
        }
        Ok(MediaUri::FilePath(p))
    }

    pub fn from_url(url: impl AsRef<str>) -> Result<Self, MediaValidationError> {
        let s = url.as_ref().trim();
        if s.is_empty() {
            return Err(MediaValidationError::EmptyMediaUri);
        }
        let u = Url::parse(s).map_err(|e| MediaValidationError::InvalidUrl(e.to_string()))?;
        Ok(MediaUri::Url(u))
    }

    pub fn as_path(&self) -> Option<&Path> {
        match self {
            MediaUri::FilePath(p) => Some(p.as_path()),
            MediaUri::Url(_) => None,
        }
    }

    pub fn as_url(&self) -> Option<&Url> {
        match self {
            MediaUri::Url(u) => Some(u),
            MediaUri::FilePath(_) => None,
        }
    }
}

/// Media attached to a knowledge block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRef {
    pub kind: MediaKind,
    pub uri: MediaUri,
    pub caption: Option<String>,
}

//
// ─── DRAFT ENTITY (unvalidated input) ──────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MediaDraft {
    pub kind: MediaKind,
    #[serde(default)]
    pub file: Option<PathBuf>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
}

impl MediaDraft {
    /// Validate the draft, resolving relative file paths against `base_dir`.
    ///
    /// # Errors
    ///
    /// Returns `MediaValidationError` when the source is missing, doubled, or unparsable.
    pub fn validate(self, base_dir: Option<&Path>) -> Result<MediaRef, MediaValidationError> {
        let uri = match (self.file, self.url) {
            (Some(file), None) => {
                let file = match base_dir {
                    Some(base) if file.is_relative() => base.join(file),
                    _ => file,
                };
                MediaUri::from_file(file)?
            }
            (None, Some(url)) => MediaUri::from_url(url)?,
            (None, None) => return Err(MediaValidationError::EmptyMediaUri),
            (Some(_), Some(_)) => return Err(MediaValidationError::AmbiguousSource),
        };

        let caption = self.caption.filter(|c| !c.trim().is_empty());

        Ok(MediaRef {
            kind: self.kind,
            uri,
            caption,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(file: Option<&str>, url: Option<&str>) -> MediaDraft {
        MediaDraft {
            kind: MediaKind::Audio,
            file: file.map(PathBuf::from),
            url: url.map(str::to_owned),
            caption: Some("  ".into()),
        }
    }

    #[test]
    fn relative_file_is_resolved_against_base() {
        let media = draft(Some("audio/creed.ogg"), None)
            .validate(Some(Path::new("/srv/course")))
            .unwrap();
        assert_eq!(
            media.uri.as_path(),
            Some(Path::new("/srv/course/audio/creed.ogg"))
        );
        assert_eq!(media.caption, None);
    }

    #[test]
    fn url_source_is_parsed() {
        let media = draft(None, Some("https://example.org/a.ogg"))
            .validate(None)
            .unwrap();
        assert!(media.uri.as_url().is_some());
    }

    #[test]
    fn missing_or_double_source_fails() {
        assert_eq!(
            draft(None, None).validate(None).unwrap_err(),
            MediaValidationError::EmptyMediaUri
        );
        assert_eq!(
            draft(Some("a.ogg"), Some("https://example.org/a.ogg"))
                .validate(None)
                .unwrap_err(),
            MediaValidationError::AmbiguousSource
        );
    }
}
