use std::{fmt, io, path::PathBuf};

/// Every fatal condition the pipeline can end with. Validation variants abort before any external
/// call is made; the build, publish and fetch variants classify external failures.
#[derive(Debug)]
pub enum PipelineError {
    NoArtifactsProvided,
    MissingArtifact(PathBuf),
    UnreadableArtifact { path: PathBuf, error: io::Error },
    EmptyArtifact(PathBuf),
    InvalidExtension { path: PathBuf, allowed: Vec<String> },
    InvalidLogicalName(String),
    DuplicateLogicalName(String),
    TooManyNames { names: usize, artifacts: usize },
    ContextCopyMismatch { path: PathBuf, expected: u64, actual: u64 },
    /// The build engine exited non-zero. Carries the tail of the engine's captured output so the
    /// cause survives context teardown.
    BuildFailed { output: String },
    /// The build engine reported success but the image does not exist locally. Kept distinct from
    /// [`PipelineError::BuildFailed`] so operators can tell "the tool lied" apart from "the tool
    /// failed honestly".
    BuildVerificationFailed { image: String },
    PublishExhausted { image: String, attempts: u32 },
    FetchExhausted { reference: String },
    InsecureDefaultSecret,
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::NoArtifactsProvided => {
                f.write_str("no artifacts provided, at least one export artifact is required")
            }
            PipelineError::MissingArtifact(path) => {
                write!(f, "artifact does not exist: {}", path.display())
            }
            PipelineError::UnreadableArtifact { path, error } => {
                write!(f, "artifact is not readable: {}: {error}", path.display())
            }
            PipelineError::EmptyArtifact(path) => {
                write!(f, "artifact is empty: {}", path.display())
            }
            PipelineError::InvalidExtension { path, allowed } => write!(
                f,
                "artifact {} does not have one of the expected extensions ({})",
                path.display(),
                allowed.join(", ")
            ),
            PipelineError::InvalidLogicalName(name) => write!(
                f,
                "invalid logical name {name:?}, expected one or more characters from [A-Za-z0-9_]"
            ),
            PipelineError::DuplicateLogicalName(name) => {
                write!(f, "duplicate logical name {name:?}")
            }
            PipelineError::TooManyNames { names, artifacts } => write!(
                f,
                "{names} explicit names were supplied for {artifacts} artifacts"
            ),
            PipelineError::ContextCopyMismatch {
                path,
                expected,
                actual,
            } => write!(
                f,
                "copy into the build context wrote {actual} bytes instead of {expected} for {}",
                path.display()
            ),
            PipelineError::BuildFailed { output } => {
                write!(f, "the build engine failed:\n{output}")
            }
            PipelineError::BuildVerificationFailed { image } => write!(
                f,
                "the build engine reported success but image {image} does not exist locally"
            ),
            PipelineError::PublishExhausted { image, attempts } => {
                write!(f, "failed to push {image} after {attempts} attempts")
            }
            PipelineError::FetchExhausted { reference } => write!(
                f,
                "all authentication strategies failed to fetch {reference}"
            ),
            PipelineError::InsecureDefaultSecret => f.write_str(
                "refusing to fall back to the well-known default secret in a CI environment, \
                 pass --secret or set DBBAKE_SA_PASSWORD",
            ),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::UnreadableArtifact { error, .. } => Some(error),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verification_failure_names_the_image() {
        let error = PipelineError::BuildVerificationFailed {
            image: "app:v1".to_owned(),
        };
        let message = error.to_string();
        assert!(message.contains("app:v1"));
        assert!(message.contains("reported success"));
    }

    #[test]
    fn test_publish_exhausted_names_attempts() {
        let error = PipelineError::PublishExhausted {
            image: "registry.example.com/app:v1".to_owned(),
            attempts: 3,
        };
        assert_eq!(
            error.to_string(),
            "failed to push registry.example.com/app:v1 after 3 attempts"
        );
    }
}
