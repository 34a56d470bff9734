//! Finds files the executed code left behind and copies one back to the host.
//!
//! Only the first match in directory listing order is extracted. Extraction is
//! best effort: any failure is logged and reported as "no artifacts".

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::{unpack_first, SandboxError, SandboxSession};

/// A file pulled out of the sandbox onto the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ArtifactRef {
    pub local_path: PathBuf,
}

/// Which file names count as artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ArtifactPolicy {
    extensions: Vec<String>,
}

impl ArtifactPolicy {
    /// Builds a policy from extensions such as `png` or `.svg`, matched case-insensitively.
    pub(crate) fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_lowercase())
                .filter(|ext| !ext.is_empty())
                .collect(),
        }
    }

    /// Returns true if `file_name` ends in one of the recognized extensions.
    pub(crate) fn matches(&self, file_name: &str) -> bool {
        let lower = file_name.to_lowercase();
        self.extensions.iter().any(|ext| {
            lower
                .strip_suffix(ext.as_str())
                .is_some_and(|stem| stem.len() > 1 && stem.ends_with('.'))
        })
    }
}

impl Default for ArtifactPolicy {
    fn default() -> Self {
        Self::new(["png"])
    }
}

/// Returns the first entry that is a plain file name matching `policy`.
pub(crate) fn select_artifact<'a>(entries: &'a [String], policy: &ArtifactPolicy) -> Option<&'a str> {
    entries
        .iter()
        .map(String::as_str)
        .filter(|name| !name.contains(['/', '\\']) && *name != "." && *name != "..")
        .find(|name| policy.matches(name))
}

/// Lists the session's working directory and extracts the first artifact into `dest_dir`.
///
/// Never fails: listing, download, or unpack errors yield an empty result.
pub(crate) async fn find_and_extract(
    session: &mut SandboxSession,
    policy: &ArtifactPolicy,
    dest_dir: &Path,
) -> Vec<ArtifactRef> {
    match try_extract(session, policy, dest_dir).await {
        Ok(artifacts) => artifacts,
        Err(e) => {
            warn!("Artifact extraction skipped: {}", e);
            Vec::new()
        }
    }
}

async fn try_extract(
    session: &mut SandboxSession,
    policy: &ArtifactPolicy,
    dest_dir: &Path,
) -> Result<Vec<ArtifactRef>, SandboxError> {
    let working_dir = session.working_dir().to_string();
    let entries = session.list_directory(&working_dir).await?;

    let Some(file_name) = select_artifact(&entries, policy) else {
        debug!("No artifacts among {} entries in {}", entries.len(), working_dir);
        return Ok(Vec::new());
    };

    let remote_path = format!("{}/{}", working_dir.trim_end_matches('/'), file_name);
    let archive = session.extract_file(&remote_path).await?;

    tokio::fs::create_dir_all(dest_dir).await.map_err(|e| {
        SandboxError::extraction(format!("cannot create {}: {e}", dest_dir.display()))
    })?;

    let dest = dest_dir.to_path_buf();
    let local_path = tokio::task::spawn_blocking(move || unpack_first(&archive, &dest))
        .await
        .map_err(|e| SandboxError::extraction(format!("unpack task failed: {e}")))??;

    session.mark_artifacts_extracted()?;
    info!("Extracted artifact {}", local_path.display());

    Ok(vec![ArtifactRef { local_path }])
}
