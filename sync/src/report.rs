//! Read-only queries, shaped for JSON output.

use crate::download::not_found;
use crate::error::Result;
use kiln_fetcher::MultiReleaseSource;
use kiln_kilnfile::{Kilnfile, KilnfileLock};
use kiln_release::{LocalInventory, ReleaseId, Requirement, RequirementSet, reconcile};
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseRef {
    pub name: String,
    pub version: String,
}

impl From<&ReleaseId> for ReleaseRef {
    fn from(id: &ReleaseId) -> Self {
        Self {
            name: id.name.clone(),
            version: id.version.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MissingReleasesReport {
    pub missing_releases: Vec<ReleaseRef>,
}

/// Locked releases nothing in `releases_dir` satisfies. No source is
/// contacted. A releases directory that doesn't exist yet is empty.
pub fn missing_releases(lock: &KilnfileLock, releases_dir: &Path) -> Result<MissingReleasesReport> {
    let inventory = if releases_dir.exists() {
        LocalInventory::new().scan(releases_dir)?
    } else {
        Default::default()
    };
    let reconciliation = reconcile(&RequirementSet::from_lock(lock), inventory.as_slice());
    Ok(MissingReleasesReport {
        missing_releases: reconciliation
            .missing
            .iter()
            .map(|required| ReleaseRef::from(&required.requirement.id()))
            .collect(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseVersionReport {
    pub version: String,
    pub remote_path: String,
}

/// Highest version of `name` any source offers within the Kilnfile's
/// constraint for it, built for the locked stemcell. A release the Kilnfile
/// doesn't declare is unconstrained.
pub async fn find_release_version(
    sources: &MultiReleaseSource,
    kilnfile: &Kilnfile,
    lock: &KilnfileLock,
    name: &str,
) -> Result<ReleaseVersionReport> {
    let constraint = match kilnfile.release_spec(name) {
        Some(spec) => spec.version.as_str(),
        None => {
            tracing::debug!(release = %name, "release not declared in Kilnfile; searching any version");
            ""
        }
    };
    let requirement = Requirement::new(name, constraint).with_stemcell(&lock.stemcell);
    let remote = sources
        .find_release_version(&requirement)
        .await?
        .ok_or_else(|| not_found(&requirement, sources))?;
    Ok(ReleaseVersionReport {
        version: remote.id.version,
        remote_path: remote.remote_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn missing_report_shape() {
        let report = MissingReleasesReport {
            missing_releases: vec![ReleaseRef {
                name: "uaa".to_string(),
                version: "74.2.0".to_string(),
            }],
        };
        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            json!({"missing_releases": [{"name": "uaa", "version": "74.2.0"}]})
        );
        assert_eq!(
            serde_json::to_string(&MissingReleasesReport::default()).unwrap(),
            r#"{"missing_releases":[]}"#
        );
    }
}
