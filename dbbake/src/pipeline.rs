//! The sequential build pipeline: validate, resolve, name, assemble, synthesize, build, verify,
//! publish. All-or-nothing per invocation; the build context is torn down on every exit path.

use std::{path::PathBuf, time::Duration};

use image_ref::{ImageName, ImageRef, Tag};
use log::{debug, info};

use crate::{
    context::BuildContext,
    docker,
    error::PipelineError,
    logfmt,
    manifest::BuildManifest,
    naming, plan,
    publish::{self, DockerPushEngine, PublishOptions},
    resolve, synth, validate, Result,
};

pub struct PublishTarget {
    pub repository: ImageName,
    pub aliases: Vec<Tag>,
    pub options: PublishOptions,
}

pub struct PipelineConfig {
    pub image: ImageRef,
    /// Local artifact paths; remote references are fetched before the pipeline starts.
    pub artifacts: Vec<PathBuf>,
    pub explicit_names: Vec<String>,
    pub script_entries: Vec<String>,
    pub secret: String,
    pub build_time_variables: Vec<(String, String)>,
    pub no_cache: bool,
    pub tmp_dir: Option<PathBuf>,
    pub mount_path: String,
    pub build_timeout: Duration,
    pub publish: Option<PublishTarget>,
}

pub fn run(config: &PipelineConfig) -> Result<()> {
    // Validation happens in full before any external call.
    let validated = validate::validate_artifacts(&config.artifacts, validate::ARTIFACT_EXTENSIONS)?;

    let script_paths = resolve::resolve_entries(&config.script_entries, validate::SCRIPT_EXTENSION);
    if script_paths.is_empty() && !config.script_entries.is_empty() {
        info!("no runtime scripts resolved, continuing without scripts");
    }
    let scripts = resolve::number_scripts(script_paths);

    let artifacts = naming::assign_names(&validated, &config.explicit_names)?;

    let plan = plan::BuildPlan {
        image: config.image.clone(),
        artifacts,
        scripts,
        build_time_variables: config.build_time_variables.clone(),
        mount_path: config.mount_path.clone(),
    };

    // The context guards the temporary directory for the rest of the run; every early return
    // below tears it down.
    let context = BuildContext::assemble(&plan, config.tmp_dir.as_deref())?;
    synth::write_into(&plan, context.path())?;

    let manifest = BuildManifest::from_plan(&plan)?;
    manifest.write(context.path())?;
    debug!("wrote build manifest{}", logfmt::props(&manifest.to_json()?));

    info!(
        "building {image} from {count} artifact(s)",
        image = plan.image,
        count = plan.artifacts.len()
    );
    docker::build(docker::BuildRequest {
        context_dir: context.path(),
        image: &plan.image,
        secret: &config.secret,
        build_time_variables: &plan.build_time_variables,
        no_cache: config.no_cache,
        timeout: config.build_timeout,
    })?;

    let size = docker::image_size(&plan.image)?.ok_or_else(|| {
        PipelineError::BuildVerificationFailed {
            image: plan.image.to_string(),
        }
    })?;
    info!(
        "built {image}{}",
        logfmt::props(&serde_json::json!({ "sizeBytes": size })),
        image = plan.image
    );

    if let Some(target) = &config.publish {
        publish::publish(
            &DockerPushEngine,
            &plan.image,
            &target.repository,
            &target.aliases,
            &target.options,
        )?;
    }

    Ok(())
}
