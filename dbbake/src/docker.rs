//! Thin abstraction over the `docker` command line for building, inspecting, tagging and pushing
//! images.

use std::{path::Path, time::Duration};

use image_ref::ImageRef;
use log::{debug, error};

use crate::{error::PipelineError, process, synth, temp_path, Result};

/// How much of the engine's captured output a [`PipelineError::BuildFailed`] carries. The full
/// output is written to a scratch file whose path is logged.
const FAILURE_OUTPUT_TAIL: usize = 4096;

pub struct BuildRequest<'a> {
    pub context_dir: &'a Path,
    pub image: &'a ImageRef,
    pub secret: &'a str,
    pub build_time_variables: &'a [(String, String)],
    pub no_cache: bool,
    pub timeout: Duration,
}

/// Invokes `docker build` against the assembled context. The engine's output is captured rather
/// than streamed; on failure it is preserved for diagnosis.
pub fn build(request: BuildRequest) -> Result<()> {
    let mut command = process::command!(
        "docker",
        "build",
        "--file",
        request.context_dir.join(synth::DOCKERFILE_NAME),
        "--tag",
        request.image.to_string(),
        "--build-arg",
        format!(
            "{}={}",
            synth::SECRET_BUILD_ARG,
            request.secret
        ),
    );
    for (key, value) in request.build_time_variables {
        command = process::args!(command, "--build-arg", format!("{key}={value}"));
    }
    if request.no_cache {
        command = process::args!(command, "--no-cache");
    }
    command = process::args!(command, request.context_dir);

    let output = command.try_output_with_deadline(request.timeout)?;
    if output.status.success() {
        debug!(
            "build engine finished: {}",
            String::from_utf8_lossy(&output.stdout).trim_end()
        );
        return Ok(());
    }

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));

    // Keep the full output around; the error itself only carries the tail.
    let dump_path = temp_path::scratch_path("log");
    if std::fs::write(&dump_path, &combined).is_ok() {
        error!(
            "build failed, full engine output written to {}",
            dump_path.display()
        );
    }

    let tail_start = combined.len().saturating_sub(FAILURE_OUTPUT_TAIL);
    Err(PipelineError::BuildFailed {
        output: combined[tail_start..].to_owned(),
    }
    .into())
}

/// Queries the engine for the image's size in bytes. `Ok(None)` means the image does not exist
/// locally; the engine's own success signal is not trusted without this check.
pub fn image_size(image: &ImageRef) -> Result<Option<u64>> {
    let output = process::command!(
        "docker",
        "image",
        "inspect",
        "--format",
        "{{.Size}}",
        image.to_string(),
    )
    .try_output()?;

    if !output.status.success() {
        return Ok(None);
    }

    let size = std::str::from_utf8(&output.stdout)?.trim().parse::<u64>()?;
    Ok(Some(size))
}

pub fn tag(source: &ImageRef, target: &ImageRef) -> Result<()> {
    process::command!("docker", "tag", source.to_string(), target.to_string()).output()?;
    Ok(())
}

pub fn push(target: &ImageRef) -> Result<()> {
    process::command!("docker", "push", target.to_string()).output()?;
    Ok(())
}

/// Checks whether the pushed reference resolves against the remote registry.
pub fn remote_exists(target: &ImageRef) -> Result<bool> {
    let output =
        process::command!("docker", "manifest", "inspect", target.to_string()).try_output()?;
    Ok(output.status.success())
}
