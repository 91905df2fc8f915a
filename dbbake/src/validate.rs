//! Input artifact validation. Runs before anything else so no external call is ever made for a
//! request that cannot succeed.

use std::{
    fs,
    io::Read,
    path::{Path, PathBuf},
};

use crate::error::PipelineError;

/// Export artifact extensions accepted by default.
pub const ARTIFACT_EXTENSIONS: &[&str] = &["bacpac"];

/// Extension required of runtime scripts.
pub const SCRIPT_EXTENSION: &str = "sql";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedArtifact {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub extension: String,
}

/// Validates every artifact path or none: any failure aborts the whole set.
pub fn validate_artifacts(
    paths: &[PathBuf],
    allowed_extensions: &[&str],
) -> Result<Vec<ValidatedArtifact>, PipelineError> {
    if paths.is_empty() {
        return Err(PipelineError::NoArtifactsProvided);
    }

    paths
        .iter()
        .map(|path| validate_artifact(path, allowed_extensions))
        .collect()
}

fn validate_artifact(
    path: &Path,
    allowed_extensions: &[&str],
) -> Result<ValidatedArtifact, PipelineError> {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            return Err(PipelineError::MissingArtifact(path.to_owned()))
        }
        Err(error) => {
            return Err(PipelineError::UnreadableArtifact {
                path: path.to_owned(),
                error,
            })
        }
    };

    if !metadata.is_file() {
        return Err(PipelineError::MissingArtifact(path.to_owned()));
    }

    // Probe readability up front; a permission error discovered mid-assembly would otherwise
    // tear down a context we never needed to create.
    if let Err(error) = fs::File::open(path).and_then(|mut file| {
        let mut probe = [0u8; 1];
        file.read(&mut probe).map(|_| ())
    }) {
        return Err(PipelineError::UnreadableArtifact {
            path: path.to_owned(),
            error,
        });
    }

    if metadata.len() == 0 {
        return Err(PipelineError::EmptyArtifact(path.to_owned()));
    }

    let extension = path
        .extension()
        .map(|extension| extension.to_string_lossy().to_lowercase());
    let extension = match extension {
        Some(extension) if allowed_extensions.contains(&extension.as_str()) => extension,
        _ => {
            return Err(PipelineError::InvalidExtension {
                path: path.to_owned(),
                allowed: allowed_extensions.iter().map(|&s| s.to_owned()).collect(),
            })
        }
    };

    Ok(ValidatedArtifact {
        path: path.to_owned(),
        size_bytes: metadata.len(),
        extension,
    })
}
