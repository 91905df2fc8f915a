//! Script path resolution: expands glob patterns, tolerates missing literal entries, and produces
//! the lexicographically sorted list that all later numbering depends on.

use std::path::PathBuf;

use log::warn;

use crate::plan::ScriptReference;

/// Resolves a heterogeneous list of literal paths and glob patterns into a sorted, de-duplicated
/// list of existing files carrying `extension`.
///
/// Resolution problems are per-entry diagnostics, not errors: optional script sets are expected to
/// be partially absent. The caller decides what an empty result means.
pub fn resolve_entries(entries: &[String], extension: &str) -> Vec<PathBuf> {
    let mut resolved = Vec::new();

    for entry in entries {
        if entry.contains('*') || entry.contains('?') {
            resolve_pattern(entry, extension, &mut resolved);
        } else {
            resolve_literal(entry, extension, &mut resolved);
        }
    }

    // Output ordering is the contract: execution order is assigned from this sort.
    resolved.sort();
    resolved.dedup();
    resolved
}

fn resolve_pattern(pattern: &str, extension: &str, resolved: &mut Vec<PathBuf>) {
    let paths = match glob::glob(pattern) {
        Ok(paths) => paths,
        Err(error) => {
            warn!("ignoring invalid glob pattern {pattern:?}: {error}");
            return;
        }
    };

    let mut matched = 0usize;
    for path in paths {
        let path = match path {
            Ok(path) => path,
            Err(error) => {
                warn!("skipping unreadable match for {pattern:?}: {error}");
                continue;
            }
        };
        if path.is_file() && has_extension(&path, extension) {
            match path.canonicalize() {
                Ok(path) => {
                    resolved.push(path);
                    matched += 1;
                }
                Err(error) => warn!("could not resolve match {}: {error}", path.display()),
            }
        }
    }

    if matched == 0 {
        warn!("glob pattern {pattern:?} matched no {extension} files");
    }
}

fn resolve_literal(entry: &str, extension: &str, resolved: &mut Vec<PathBuf>) {
    let path = PathBuf::from(entry);
    if !path.is_file() {
        warn!("script path {entry:?} does not exist, continuing without it");
        return;
    }
    if !has_extension(&path, extension) {
        warn!("script path {entry:?} does not have the .{extension} extension, continuing without it");
        return;
    }
    match path.canonicalize() {
        Ok(path) => resolved.push(path),
        Err(error) => warn!("could not resolve script path {entry:?}: {error}"),
    }
}

fn has_extension(path: &std::path::Path, extension: &str) -> bool {
    path.extension()
        .map(|found| found.to_string_lossy().eq_ignore_ascii_case(extension))
        .unwrap_or_default()
}

/// Assigns 1-based, strictly increasing execution orders following the resolved sort order.
pub fn number_scripts(paths: Vec<PathBuf>) -> Vec<ScriptReference> {
    paths
        .into_iter()
        .zip(1u32..)
        .map(|(source_path, execution_order)| ScriptReference {
            source_path,
            execution_order,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &std::path::Path) {
        fs::write(path, b"-- sql").unwrap();
    }

    #[test]
    fn test_glob_expansion_is_sorted() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("20_b.sql"));
        touch(&dir.path().join("10_a.sql"));
        touch(&dir.path().join("15_c.sql"));

        let pattern = dir.path().join("*.sql").to_string_lossy().into_owned();
        let resolved = resolve_entries(&[pattern], "sql");

        let names: Vec<_> = resolved
            .iter()
            .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["10_a.sql", "15_c.sql", "20_b.sql"]);
    }

    #[test]
    fn test_glob_filters_extension() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("init.sql"));
        touch(&dir.path().join("notes.txt"));

        let pattern = dir.path().join("*").to_string_lossy().into_owned();
        let resolved = resolve_entries(&[pattern], "sql");
        assert_eq!(resolved.len(), 1);
    }

    #[test]
    fn test_missing_literal_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let existing = dir.path().join("real.sql");
        touch(&existing);
        let missing = dir.path().join("imaginary.sql");

        let resolved = resolve_entries(
            &[
                missing.to_string_lossy().into_owned(),
                existing.to_string_lossy().into_owned(),
            ],
            "sql",
        );
        assert_eq!(resolved.len(), 1);
        assert!(resolved[0].ends_with("real.sql"));
    }

    #[test]
    fn test_duplicate_entries_are_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("once.sql");
        touch(&path);

        let entry = path.to_string_lossy().into_owned();
        let pattern = dir.path().join("*.sql").to_string_lossy().into_owned();
        let resolved = resolve_entries(&[entry, pattern], "sql");
        assert_eq!(resolved.len(), 1);
    }

    #[test]
    fn test_empty_input() {
        assert!(resolve_entries(&[], "sql").is_empty());
    }

    #[test]
    fn test_numbering_is_one_based_and_increasing() {
        let scripts = number_scripts(vec![PathBuf::from("/a.sql"), PathBuf::from("/b.sql")]);
        assert_eq!(
            scripts.iter().map(|s| s.execution_order).collect::<Vec<_>>(),
            [1, 2]
        );
    }
}
