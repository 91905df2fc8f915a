//! The machine-readable manifest written alongside the build context. A pure side artifact for
//! audit and debugging; nothing downstream consumes it.

use std::path::{Path, PathBuf};

use time::format_description::well_known::Rfc3339;

use crate::{
    context::ARTIFACTS_DIR,
    plan::{file_name_lossy, BuildPlan},
    Result,
};

pub const MANIFEST_NAME: &str = "manifest.json";

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildManifest {
    image_reference: String,
    artifacts: Vec<ManifestArtifact>,
    script_count: usize,
    /// ISO-8601 UTC.
    build_timestamp: String,
    mount_path: String,
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct ManifestArtifact {
    source_file: String,
    target_file: String,
    logical_name: String,
    #[serde(rename = "sizeMB")]
    size_mb: f64,
}

fn to_mb(bytes: u64) -> f64 {
    (bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0
}

impl BuildManifest {
    pub fn from_plan(plan: &BuildPlan) -> Result<Self> {
        Ok(Self {
            image_reference: plan.image.to_string(),
            artifacts: plan
                .artifacts
                .iter()
                .map(|artifact| ManifestArtifact {
                    source_file: file_name_lossy(&artifact.source_path),
                    target_file: format!("{ARTIFACTS_DIR}/{}", artifact.context_file_name()),
                    logical_name: artifact.logical_name.clone(),
                    size_mb: to_mb(artifact.size_bytes),
                })
                .collect(),
            script_count: plan.scripts.len(),
            build_timestamp: time::OffsetDateTime::now_utc().format(&Rfc3339)?,
            mount_path: plan.mount_path.clone(),
        })
    }

    /// Writes the manifest into the context directory and returns its path.
    pub fn write(&self, context_dir: &Path) -> Result<PathBuf> {
        let path = context_dir.join(MANIFEST_NAME);
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(path)
    }

    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::ArtifactReference;
    use crate::synth::DEFAULT_MOUNT_PATH;

    fn plan() -> BuildPlan {
        BuildPlan {
            image: "app:v1".parse().unwrap(),
            artifacts: vec![ArtifactReference {
                source_path: PathBuf::from("/exports/app.bacpac"),
                logical_name: "app".to_owned(),
                size_bytes: 3 * 1024 * 1024,
                extension: "bacpac".to_owned(),
            }],
            scripts: Vec::new(),
            build_time_variables: Vec::new(),
            mount_path: DEFAULT_MOUNT_PATH.to_owned(),
        }
    }

    #[test]
    fn test_manifest_shape() {
        let manifest = BuildManifest::from_plan(&plan()).unwrap();
        let value = manifest.to_json().unwrap();

        assert_eq!(value["imageReference"], "app:v1");
        assert_eq!(value["scriptCount"], 0);
        assert_eq!(value["mountPath"], DEFAULT_MOUNT_PATH);
        assert_eq!(value["artifacts"].as_array().unwrap().len(), 1);

        let artifact = &value["artifacts"][0];
        assert_eq!(artifact["sourceFile"], "app.bacpac");
        assert_eq!(artifact["targetFile"], "artifacts/app.bacpac");
        assert_eq!(artifact["logicalName"], "app");
        assert_eq!(artifact["sizeMB"], 3.0);
    }

    #[test]
    fn test_timestamp_is_rfc3339_utc() {
        let manifest = BuildManifest::from_plan(&plan()).unwrap();
        let value = manifest.to_json().unwrap();
        let raw = value["buildTimestamp"].as_str().unwrap();
        let parsed = time::OffsetDateTime::parse(raw, &Rfc3339).unwrap();
        assert_eq!(parsed.offset(), time::UtcOffset::UTC);
    }

    #[test]
    fn test_write_creates_side_file() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = BuildManifest::from_plan(&plan()).unwrap();
        let path = manifest.write(dir.path()).unwrap();
        assert_eq!(path.file_name().unwrap(), MANIFEST_NAME);
        let raw = std::fs::read_to_string(path).unwrap();
        assert!(serde_json::from_str::<serde_json::Value>(&raw).is_ok());
    }

    #[test]
    fn test_size_rounding() {
        assert_eq!(to_mb(10), 0.0);
        assert_eq!(to_mb(1024 * 1024 + 512 * 1024), 1.5);
    }
}
