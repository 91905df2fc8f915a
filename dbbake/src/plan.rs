//! The in-memory build plan: everything the synthesizer needs, already validated and ordered.

use std::path::{Path, PathBuf};

use image_ref::ImageRef;

/// A validated export artifact with its assigned logical name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactReference {
    pub source_path: PathBuf,
    /// Matches `[A-Za-z0-9_]+` and is unique within a plan. Doubles as the name of the imported
    /// database and as the stem of the artifact's file name inside the build context.
    pub logical_name: String,
    pub size_bytes: u64,
    pub extension: String,
}

impl ArtifactReference {
    /// File name the artifact receives inside the build context's `artifacts/` directory.
    pub fn context_file_name(&self) -> String {
        format!("{}.{}", self.logical_name, self.extension)
    }
}

/// A resolved runtime script with its 1-based execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptReference {
    pub source_path: PathBuf,
    pub execution_order: u32,
}

impl ScriptReference {
    /// File name the script receives inside the build context's `scripts/` directory. The
    /// zero-padded prefix preserves execution order under a plain lexicographic file name sort,
    /// which is all the generated runtime script relies on.
    pub fn context_file_name(&self) -> String {
        format!(
            "{:03}_{}",
            self.execution_order,
            file_name_lossy(&self.source_path)
        )
    }
}

pub fn file_name_lossy(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[derive(Debug)]
pub struct BuildPlan {
    pub image: ImageRef,
    pub artifacts: Vec<ArtifactReference>,
    pub scripts: Vec<ScriptReference>,
    /// Caller-supplied extra build-time variables, in the order they were supplied. The secret is
    /// not part of this list; it is always injected under its well-known name.
    pub build_time_variables: Vec<(String, String)>,
    pub mount_path: String,
}
