use super::properties::{json_to_properties, properties_to_json};
use crate::error::FormatError;
use crate::workflow::patched_artifact_name;
use std::path::{Path, PathBuf};

/// How an artifact reaches the validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactFormat {
    /// `key=value` files, validated as JSON.
    Properties,
    /// Anything the validator reads directly.
    Native,
}

impl ArtifactFormat {
    pub fn detect(artifact_name: &str) -> Self {
        match Path::new(artifact_name).extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("properties") => Self::Properties,
            _ => Self::Native,
        }
    }
}

/// The artifact as handed to the workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgedArtifact {
    pub format: ArtifactFormat,
    pub original_name: String,
    /// Scratch file the validator sees.
    pub validated_name: String,
    pub content: String,
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> FormatError + '_ {
    move |source| FormatError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn with_extension(artifact_name: &str, extension: &str) -> String {
    PathBuf::from(artifact_name)
        .with_extension(extension)
        .to_string_lossy()
        .into_owned()
}

/// Convert the scratch copy of `artifact_name` into a validator-readable
/// file when needed.
pub async fn bridge_in(scratch_dir: &Path, artifact_name: &str) -> Result<BridgedArtifact, FormatError> {
    let source = scratch_dir.join(artifact_name);
    let content = tokio::fs::read_to_string(&source)
        .await
        .map_err(io_error(&source))?;

    match ArtifactFormat::detect(artifact_name) {
        ArtifactFormat::Native => Ok(BridgedArtifact {
            format: ArtifactFormat::Native,
            original_name: artifact_name.to_string(),
            validated_name: artifact_name.to_string(),
            content,
        }),
        ArtifactFormat::Properties => {
            let json = properties_to_json(&content)?;
            let validated_name = with_extension(artifact_name, "json");
            let target = scratch_dir.join(&validated_name);
            tokio::fs::write(&target, &json)
                .await
                .map_err(io_error(&target))?;
            tracing::debug!(from = artifact_name, to = %validated_name, "converted properties to JSON");
            Ok(BridgedArtifact {
                format: ArtifactFormat::Properties,
                original_name: artifact_name.to_string(),
                validated_name,
                content: json,
            })
        }
    }
}

async fn remove_if_present(path: &Path) -> Result<bool, FormatError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(io_error(path)(source)),
    }
}

/// Delete patches a previous run left for `artifact_name`, in both the
/// original and the validator format.
pub async fn clear_patches(scratch_dir: &Path, artifact_name: &str) -> Result<(), FormatError> {
    let mut names = vec![patched_artifact_name(artifact_name)];
    if ArtifactFormat::detect(artifact_name) == ArtifactFormat::Properties {
        names.push(patched_artifact_name(&with_extension(artifact_name, "json")));
    }
    for name in names {
        let path = scratch_dir.join(&name);
        if remove_if_present(&path).await? {
            tracing::debug!(path = %path.display(), "removed stale patch");
        }
    }
    Ok(())
}

/// Convert the patched validator-format file back into the original format.
/// Returns the patched content in the original format, or `None` when no
/// patch was written.
pub async fn bridge_out(
    scratch_dir: &Path,
    artifact: &BridgedArtifact,
) -> Result<Option<String>, FormatError> {
    let patched_path = scratch_dir.join(patched_artifact_name(&artifact.validated_name));
    let patched = match tokio::fs::read_to_string(&patched_path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => return Err(io_error(&patched_path)(source)),
    };

    match artifact.format {
        ArtifactFormat::Native => Ok(Some(patched)),
        ArtifactFormat::Properties => {
            let properties = json_to_properties(&patched)?;
            let target = scratch_dir.join(patched_artifact_name(&artifact.original_name));
            tokio::fs::write(&target, &properties)
                .await
                .map_err(io_error(&target))?;
            Ok(Some(properties))
        }
    }
}
