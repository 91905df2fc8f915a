//! Build plan synthesis: renders the two-stage build description and the runtime initialization
//! script from a [`BuildPlan`].
//!
//! Rendering is pure templating over the plan. Identical plans produce byte-identical output,
//! which the build engine's layer cache and the tests both rely on.

use std::{fs, io, path::Path};

use crate::plan::BuildPlan;

pub const BASE_IMAGE: &str = "mcr.microsoft.com/mssql/server:2022-latest";

/// Build-time variable carrying the SA password. Named consistently so external tooling can
/// override it without parsing generated content.
pub const SECRET_BUILD_ARG: &str = "SA_PASSWORD";

/// Environment variable the runtime script reads the secret from at container start; the secret is
/// never baked into the image.
pub const RUNTIME_SECRET_ENV: &str = "MSSQL_SA_PASSWORD";

/// Environment variable consulted when `--secret` is not passed.
pub const SECRET_ENV: &str = "DBBAKE_SA_PASSWORD";

/// The well-known insecure default. Acceptable only for disposable local testing; the CLI refuses
/// to fall back to it when running under CI.
pub const DEFAULT_SECRET: &str = "YourStrong!Passw0rd";

pub const DEFAULT_MOUNT_PATH: &str = "/docker-entrypoint-initdb.d";

/// Directory the engine persists databases to; the only thing the runtime stage copies out of the
/// importer stage.
const DATA_DIR: &str = "/var/opt/mssql";

const ARTIFACT_STAGING_DIR: &str = "/tmp/artifacts";
const ENTRYPOINT_PATH: &str = "/usr/local/bin/entrypoint.sh";
const SQLPACKAGE_URL: &str = "https://aka.ms/sqlpackage-linux";

/// Seconds both stages wait after starting the engine before talking to it.
const ENGINE_GRACE_SECONDS: u32 = 30;

pub const DOCKERFILE_NAME: &str = "Dockerfile";
pub const ENTRYPOINT_NAME: &str = "entrypoint.sh";

/// Renders the multi-stage build description.
///
/// The importer stage installs `sqlpackage`, copies the artifact files and imports each one into a
/// database named after its logical name. The runtime stage copies only the persisted data
/// directory out of the importer stage; the artifact files never reach the shipped image.
pub fn render_dockerfile(plan: &BuildPlan) -> String {
    let mut out = String::new();

    out.push_str("# syntax=docker/dockerfile:1\n");
    out.push_str("# Generated by dbbake. Do not edit; regenerate instead.\n\n");

    // Importer stage.
    out.push_str(&format!("FROM {BASE_IMAGE} AS importer\n\n"));
    out.push_str(&format!("ARG {SECRET_BUILD_ARG}\n"));
    // Extra build-time variables must be declared or the engine silently drops them.
    for (key, _) in &plan.build_time_variables {
        out.push_str(&format!("ARG {key}\n"));
    }
    out.push_str("ENV ACCEPT_EULA=Y\n");
    out.push_str(&format!(
        "ENV {RUNTIME_SECRET_ENV}=${{{SECRET_BUILD_ARG}}}\n\n"
    ));
    out.push_str("USER root\n");
    out.push_str("RUN apt-get update \\\n");
    out.push_str(" && apt-get install -y --no-install-recommends curl unzip \\\n");
    out.push_str(" && rm -rf /var/lib/apt/lists/* \\\n");
    out.push_str(&format!(
        " && curl -fsSL -o /tmp/sqlpackage.zip {SQLPACKAGE_URL} \\\n"
    ));
    out.push_str(" && unzip -qq /tmp/sqlpackage.zip -d /opt/sqlpackage \\\n");
    out.push_str(" && chmod +x /opt/sqlpackage/sqlpackage \\\n");
    out.push_str(" && rm /tmp/sqlpackage.zip\n\n");
    out.push_str(&format!("COPY artifacts/ {ARTIFACT_STAGING_DIR}/\n\n"));

    out.push_str("RUN ( /opt/mssql/bin/sqlservr & ) \\\n");
    out.push_str(&format!(" && sleep {ENGINE_GRACE_SECONDS} \\\n"));
    for artifact in &plan.artifacts {
        out.push_str(" && /opt/sqlpackage/sqlpackage /Action:Import \\\n");
        out.push_str(&format!(
            "      /SourceFile:\"{ARTIFACT_STAGING_DIR}/{}\" \\\n",
            artifact.context_file_name()
        ));
        out.push_str("      /TargetServerName:localhost \\\n");
        out.push_str(&format!(
            "      /TargetDatabaseName:\"{}\" \\\n",
            artifact.logical_name
        ));
        out.push_str("      /TargetUser:sa \\\n");
        out.push_str(&format!(
            "      /TargetPassword:\"${{{RUNTIME_SECRET_ENV}}}\" \\\n"
        ));
        out.push_str("      /TargetTrustServerCertificate:True \\\n");
    }
    out.push_str(" && pkill sqlservr \\\n");
    out.push_str(" && sleep 5\n\n");

    // Runtime stage. Copies the persisted data directory only.
    out.push_str(&format!("FROM {BASE_IMAGE}\n\n"));
    out.push_str("ENV ACCEPT_EULA=Y\n\n");
    out.push_str("USER root\n");
    out.push_str(&format!(
        "COPY --from=importer {DATA_DIR} {DATA_DIR}\n"
    ));
    out.push_str(&format!("COPY {ENTRYPOINT_NAME} {ENTRYPOINT_PATH}\n"));
    if !plan.scripts.is_empty() {
        out.push_str(&format!("COPY scripts/ {}/\n", plan.mount_path));
    }
    out.push_str(&format!("RUN chmod +x {ENTRYPOINT_PATH} \\\n"));
    out.push_str(&format!(" && chown -R mssql {DATA_DIR}\n\n"));
    out.push_str(&format!("VOLUME [\"{}\"]\n\n", plan.mount_path));
    out.push_str("USER mssql\n");
    out.push_str("EXPOSE 1433\n");
    out.push_str(&format!("CMD [\"{ENTRYPOINT_PATH}\"]\n"));

    out
}

/// Renders the runtime initialization script.
///
/// The script starts the engine in the background, waits a fixed grace period, executes every
/// `.sql` file under the mount path in lexicographic file name order (failing the container on
/// the first script failure), then blocks on the engine so the container's lifetime matches it.
pub fn render_entrypoint(plan: &BuildPlan) -> String {
    let mount_path = &plan.mount_path;
    format!(
        r#"#!/bin/bash
# Generated by dbbake. Do not edit; regenerate instead.
set -u

/opt/mssql/bin/sqlservr &
engine_pid=$!

sleep {ENGINE_GRACE_SECONDS}

if [ -d "{mount_path}" ] && ls "{mount_path}"/*.sql >/dev/null 2>&1; then
    for script in "{mount_path}"/*.sql; do
        echo "executing ${{script}}"
        if ! /opt/mssql-tools18/bin/sqlcmd -S localhost -U sa -P "${{{RUNTIME_SECRET_ENV}}}" -C -b -i "${{script}}"; then
            echo "script ${{script}} failed" >&2
            exit 1
        fi
    done
fi

wait "${{engine_pid}}"
"#
    )
}

/// Writes both rendered files into the build context root. The entrypoint is marked executable so
/// the behavior does not depend on the `chmod` in the build description alone.
pub fn write_into(plan: &BuildPlan, context_dir: &Path) -> io::Result<()> {
    fs::write(context_dir.join(DOCKERFILE_NAME), render_dockerfile(plan))?;

    let entrypoint_path = context_dir.join(ENTRYPOINT_NAME);
    fs::write(&entrypoint_path, render_entrypoint(plan))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&entrypoint_path, fs::Permissions::from_mode(0o755))?;
    }

    Ok(())
}
