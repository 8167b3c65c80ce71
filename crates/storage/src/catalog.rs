//! Loads the course catalog from its JSON file.

use std::path::{Path, PathBuf};

use course_core::model::{Catalog, CatalogDraft, CatalogError};
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CatalogLoadError {
    #[error("cannot read catalog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("catalog is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Invalid(#[from] CatalogError),
}

/// Read and validate a catalog file. Relative media paths resolve against the
/// file's directory.
///
/// # Errors
///
/// Returns `CatalogLoadError` when the file is unreadable, malformed, or fails
/// validation.
pub fn load_catalog(path: &Path) -> Result<Catalog, CatalogLoadError> {
    let raw = std::fs::read_to_string(path).map_err(|source| CatalogLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let catalog = parse_catalog(&raw, path.parent())?;
    tracing::info!(
        path = %path.display(),
        blocks = catalog.blocks().len(),
        final_questions = catalog.final_test().len(),
        "catalog loaded"
    );
    Ok(catalog)
}

/// Parse and validate catalog JSON.
///
/// # Errors
///
/// Returns `CatalogLoadError::Parse` or `CatalogLoadError::Invalid`.
pub fn parse_catalog(raw: &str, base_dir: Option<&Path>) -> Result<Catalog, CatalogLoadError> {
    let draft: CatalogDraft = serde_json::from_str(raw)?;
    Ok(draft.validate(base_dir)?)
}
