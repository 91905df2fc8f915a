use std::{path::PathBuf, time::Duration};

use clap::Args;
use constcat::concat;
use image_ref::{ImageName, ImageRef, Tag};
use log::warn;

use crate::{
    error::PipelineError,
    pipeline::{self, PipelineConfig, PublishTarget},
    publish::PublishOptions,
    storage, synth, Result,
};

#[derive(Debug, Args)]
pub struct BuildArgs {
    /// Name for the built image, e.g. `team/app` or `registry.example.com/team/app`.
    #[arg(long = "image")]
    pub image: ImageName,

    /// Tag for the built image.
    #[arg(long = "tag")]
    pub tag: Tag,

    /// Export artifact to import. Repeatable; order determines import order. Accepts local paths
    /// and object-storage references (`az://account/container/blob` or a blob HTTPS URL), which
    /// are downloaded before the build starts.
    #[arg(long = "artifact", required = true)]
    pub artifacts: Vec<String>,

    /// Logical name for the artifact at the same index. When omitted the name is derived from the
    /// artifact's file name with every character outside [A-Za-z0-9_] replaced by an underscore.
    #[arg(long = "name")]
    pub names: Vec<String>,

    /// Runtime script path or glob pattern (`*`/`?`). Repeatable. Missing literal paths are
    /// skipped with a warning.
    #[arg(long = "script")]
    pub scripts: Vec<String>,

    #[arg(long = "secret", help = concat!(
        "SA password used during import and expected at container start. Falls back to the ",
        synth::SECRET_ENV,
        " environment variable, then to an insecure well-known default suitable only for disposable local testing."
    ))]
    pub secret: Option<String>,

    /// Extra build-time variable as KEY=VALUE. Repeatable.
    #[arg(long = "build-arg", value_parser = parse_key_value)]
    pub build_args: Vec<(String, String)>,

    /// Ask the build engine to ignore its layer cache.
    #[arg(long = "no-cache", default_value_t)]
    pub no_cache: bool,

    /// Parent directory for the temporary build context instead of the system default.
    #[arg(long = "tmp-dir")]
    pub tmp_dir: Option<PathBuf>,

    /// Container path where runtime scripts are mounted and executed from.
    #[arg(long = "mount-path", default_value = synth::DEFAULT_MOUNT_PATH)]
    pub mount_path: String,

    /// Maximum seconds the build engine may run before it is killed.
    #[arg(long = "build-timeout", default_value_t = 1800)]
    pub build_timeout_seconds: u64,

    /// Push the built image after verification.
    #[arg(long = "push", default_value_t)]
    pub push: bool,

    /// Remote repository to push to, e.g. `registry.example.com/team/app`. Required with --push.
    #[arg(long = "repository", required_if_eq("push", "true"))]
    pub repository: Option<ImageName>,

    /// Additional tag to push besides the primary one. Repeatable.
    #[arg(long = "alias")]
    pub aliases: Vec<Tag>,

    /// Maximum push attempts per tag.
    #[arg(long = "max-attempts", default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_attempts: u32,
}

fn parse_key_value(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((key, val)) if !key.is_empty() => Ok((key.to_owned(), val.to_owned())),
        _ => Err("expected KEY=VALUE".to_owned()),
    }
}

fn resolve_secret(flag: Option<String>) -> Result<String> {
    resolve_secret_from(
        flag,
        std::env::var(synth::SECRET_ENV).ok(),
        std::env::var_os("CI").is_some(),
    )
}

/// Precedence chain: the flag, then the environment variable, then the well-known default. The
/// default must be unreachable in non-interactive contexts.
fn resolve_secret_from(
    flag: Option<String>,
    env_secret: Option<String>,
    ci: bool,
) -> Result<String> {
    if let Some(secret) = flag {
        return Ok(secret);
    }
    if let Some(secret) = env_secret {
        return Ok(secret);
    }
    if ci {
        return Err(PipelineError::InsecureDefaultSecret.into());
    }
    warn!(
        "no secret supplied, using the well-known insecure default; \
         pass --secret or set {} for anything beyond disposable local testing",
        synth::SECRET_ENV
    );
    Ok(synth::DEFAULT_SECRET.to_owned())
}

pub fn build(args: BuildArgs) -> Result<()> {
    let BuildArgs {
        image,
        tag,
        artifacts,
        names,
        scripts,
        secret,
        build_args,
        no_cache,
        tmp_dir,
        mount_path,
        build_timeout_seconds,
        push,
        repository,
        aliases,
        max_attempts,
    } = args;

    let secret = resolve_secret(secret)?;

    // Remote references are materialized into a scratch directory that outlives the pipeline
    // run; the blob's base name is kept so logical-name derivation sees it.
    let needs_fetch = artifacts
        .iter()
        .any(|entry| storage::BlobReference::parse(entry).is_some());
    let downloads = if needs_fetch {
        Some(tempfile::Builder::new().prefix("dbbake-fetch-").tempdir()?)
    } else {
        None
    };

    let mut local_artifacts = Vec::with_capacity(artifacts.len());
    for entry in &artifacts {
        match (storage::BlobReference::parse(entry), &downloads) {
            (Some(reference), Some(scratch)) => {
                let destination = scratch.path().join(reference.file_name());
                storage::fetch(&reference, &destination)?;
                local_artifacts.push(destination);
            }
            _ => local_artifacts.push(PathBuf::from(entry)),
        }
    }

    let publish = push
        .then(|| -> Result<PublishTarget> {
            Ok(PublishTarget {
                repository: repository.ok_or("--push requires --repository")?,
                aliases,
                options: PublishOptions {
                    max_attempts,
                    ..PublishOptions::default()
                },
            })
        })
        .transpose()?;

    pipeline::run(&PipelineConfig {
        image: ImageRef::new(image, tag),
        artifacts: local_artifacts,
        explicit_names: names,
        script_entries: scripts,
        secret,
        build_time_variables: build_args,
        no_cache,
        tmp_dir,
        mount_path,
        build_timeout: Duration::from_secs(build_timeout_seconds),
        publish,
    })
}
