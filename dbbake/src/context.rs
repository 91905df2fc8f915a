//! Build context assembly. The context is a fresh temporary directory, exclusively owned by one
//! pipeline invocation and removed on every exit path through [`tempfile::TempDir`]'s drop.

use std::{fs, path::Path};

use log::debug;

use crate::{error::PipelineError, plan::BuildPlan, Result};

pub const ARTIFACTS_DIR: &str = "artifacts";
pub const SCRIPTS_DIR: &str = "scripts";

#[derive(Debug)]
pub struct BuildContext {
    dir: tempfile::TempDir,
}

impl BuildContext {
    /// Materializes the plan's artifacts and scripts into a new random-suffixed directory under
    /// the system temporary directory, or under `tmp_override` when provided. The directory is
    /// never reused across invocations.
    pub fn assemble(plan: &BuildPlan, tmp_override: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("dbbake-");
        let dir = match tmp_override {
            Some(parent) => builder.tempdir_in(parent)?,
            None => builder.tempdir()?,
        };
        debug!("assembling build context in {}", dir.path().display());

        let artifacts_dir = dir.path().join(ARTIFACTS_DIR);
        fs::create_dir(&artifacts_dir)?;
        for artifact in &plan.artifacts {
            copy_verified(
                &artifact.source_path,
                &artifacts_dir.join(artifact.context_file_name()),
                artifact.size_bytes,
            )?;
        }

        if !plan.scripts.is_empty() {
            let scripts_dir = dir.path().join(SCRIPTS_DIR);
            fs::create_dir(&scripts_dir)?;
            for script in &plan.scripts {
                let source_len = fs::metadata(&script.source_path)?.len();
                copy_verified(
                    &script.source_path,
                    &scripts_dir.join(script.context_file_name()),
                    source_len,
                )?;
            }
        }

        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// Copies `source` to `target` and verifies the number of bytes written against the length
/// recorded at validation time. A mismatch aborts assembly; a partially copied artifact must
/// never reach the build engine.
fn copy_verified(source: &Path, target: &Path, expected_len: u64) -> Result<()> {
    let written = fs::copy(source, target)?;
    if written != expected_len {
        return Err(PipelineError::ContextCopyMismatch {
            path: source.to_owned(),
            expected: expected_len,
            actual: written,
        }
        .into());
    }
    Ok(())
}
