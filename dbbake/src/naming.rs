//! Logical name assignment. The logical name becomes both the imported database's name and the
//! artifact's file name inside the build context, so it is restricted to `[A-Za-z0-9_]+`.

use std::collections::HashSet;
use std::path::Path;

use crate::{
    error::PipelineError,
    plan::ArtifactReference,
    validate::ValidatedArtifact,
};

fn is_valid_logical_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Derives a logical name from a file's base name: every character outside `[A-Za-z0-9_]` becomes
/// an underscore.
pub fn derive_logical_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    stem.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Pairs each validated artifact with its logical name: the explicit name at the same index when
/// one was supplied, otherwise the sanitized file stem.
///
/// Collisions are fatal rather than auto-disambiguated; a suffix scheme would silently couple the
/// imported database names to input order.
pub fn assign_names(
    artifacts: &[ValidatedArtifact],
    explicit_names: &[String],
) -> Result<Vec<ArtifactReference>, PipelineError> {
    if explicit_names.len() > artifacts.len() {
        return Err(PipelineError::TooManyNames {
            names: explicit_names.len(),
            artifacts: artifacts.len(),
        });
    }

    let mut seen = HashSet::new();
    artifacts
        .iter()
        .enumerate()
        .map(|(index, artifact)| {
            let logical_name = match explicit_names.get(index) {
                Some(name) => {
                    if !is_valid_logical_name(name) {
                        return Err(PipelineError::InvalidLogicalName(name.clone()));
                    }
                    name.clone()
                }
                None => {
                    let derived = derive_logical_name(&artifact.path);
                    if !is_valid_logical_name(&derived) {
                        return Err(PipelineError::InvalidLogicalName(derived));
                    }
                    derived
                }
            };

            if !seen.insert(logical_name.clone()) {
                return Err(PipelineError::DuplicateLogicalName(logical_name));
            }

            Ok(ArtifactReference {
                source_path: artifact.path.clone(),
                logical_name,
                size_bytes: artifact.size_bytes,
                extension: artifact.extension.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn artifact(path: &str) -> ValidatedArtifact {
        ValidatedArtifact {
            path: PathBuf::from(path),
            size_bytes: 10,
            extension: "bacpac".to_owned(),
        }
    }

    #[test]
    fn test_derived_name_is_sanitized() {
        assert_eq!(
            derive_logical_name(Path::new("/exports/my-db.v2.bacpac")),
            "my_db_v2"
        );
        assert_eq!(derive_logical_name(Path::new("app.bacpac")), "app");
        assert_eq!(
            derive_logical_name(Path::new("Sales Export 2024.bacpac")),
            "Sales_Export_2024"
        );
    }

    #[test]
    fn test_explicit_names_are_used_verbatim() {
        let assigned = assign_names(
            &[artifact("/a.bacpac"), artifact("/b.bacpac")],
            &["X".to_owned(), "Y".to_owned()],
        )
        .unwrap();
        assert_eq!(assigned[0].logical_name, "X");
        assert_eq!(assigned[1].logical_name, "Y");
    }

    #[test]
    fn test_partial_explicit_names() {
        let assigned = assign_names(
            &[artifact("/a.bacpac"), artifact("/b.bacpac")],
            &["first".to_owned()],
        )
        .unwrap();
        assert_eq!(assigned[0].logical_name, "first");
        assert_eq!(assigned[1].logical_name, "b");
    }

    #[test]
    fn test_duplicate_derived_names_are_fatal() {
        let result = assign_names(
            &[artifact("/x/app.bacpac"), artifact("/y/app.bacpac")],
            &[],
        );
        assert!(matches!(
            result,
            Err(PipelineError::DuplicateLogicalName(name)) if name == "app"
        ));
    }

    #[test]
    fn test_duplicate_across_explicit_and_derived() {
        let result = assign_names(
            &[artifact("/a.bacpac"), artifact("/x/app.bacpac")],
            &["app".to_owned()],
        );
        assert!(matches!(
            result,
            Err(PipelineError::DuplicateLogicalName(_))
        ));
    }

    #[test]
    fn test_invalid_explicit_name_is_fatal() {
        let result = assign_names(&[artifact("/a.bacpac")], &["my db".to_owned()]);
        assert!(matches!(result, Err(PipelineError::InvalidLogicalName(_))));

        let result = assign_names(&[artifact("/a.bacpac")], &["".to_owned()]);
        assert!(matches!(result, Err(PipelineError::InvalidLogicalName(_))));
    }

    #[test]
    fn test_more_names_than_artifacts() {
        let result = assign_names(
            &[artifact("/a.bacpac")],
            &["a".to_owned(), "b".to_owned()],
        );
        assert!(matches!(result, Err(PipelineError::TooManyNames { .. })));
    }
}
