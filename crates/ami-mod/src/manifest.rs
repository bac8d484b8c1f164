//! The `ami.manifest` build manifest.
//!
//! The build pipeline records the packages it resolved, the artifacts it
//! produced, and the toolchain that produced them. The manifest is an
//! independent record of package digests: [`Manifest::cross_check`] compares
//! it against `ami.sum`.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::MANIFEST_SCHEMA;
use crate::error::{IntegrityViolation, ModError, Result, Violation};
use crate::fsutil;
use crate::lockfile::LockFile;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    #[serde(default)]
    pub schema: String,
    #[serde(default)]
    pub project: Project,
    #[serde(default)]
    pub packages: Vec<PackageRecord>,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    #[serde(default)]
    pub toolchain: Toolchain,
    #[serde(default)]
    pub created_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
}

/// A resolved dependency as the build saw it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRecord {
    pub name: String,
    pub version: String,
    #[serde(rename = "digestSHA256")]
    pub digest: String,
    #[serde(default)]
    pub source: String,
}

/// A file produced by the build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub path: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub sha256: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Toolchain {
    #[serde(default)]
    pub ami_version: String,
    /// Any other toolchain facts, preserved verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Manifest {
    pub fn new(project_name: &str, project_version: &str) -> Self {
        Manifest {
            schema: MANIFEST_SCHEMA.to_string(),
            project: Project {
                name: project_name.to_string(),
                version: project_version.to_string(),
            },
            ..Default::default()
        }
    }

    /// Check required fields, defaulting the schema and the creation time.
    pub fn validate(&mut self) -> Result<()> {
        if self.schema.is_empty() {
            self.schema = MANIFEST_SCHEMA.to_string();
        }
        if self.schema != MANIFEST_SCHEMA {
            return Err(ModError::InvalidManifest {
                detail: format!(
                    "unsupported schema {:?}, expected {MANIFEST_SCHEMA:?}",
                    self.schema
                ),
            });
        }
        if self.project.name.is_empty() || self.project.version.is_empty() {
            return Err(ModError::InvalidManifest {
                detail: "project.name and project.version are required".to_string(),
            });
        }
        if self.created_at.is_empty() {
            self.created_at =
                chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        }
        Ok(())
    }

    /// Parse and validate the manifest at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ModError::io(format!("reading {}", path.display()), e))?;
        let mut manifest: Manifest =
            serde_json::from_str(&text).map_err(|e| ModError::InvalidManifest {
                detail: format!("{}: {e}", path.display()),
            })?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Validate, sort packages and artifacts, and write atomically.
    pub fn save(&mut self, path: &Path) -> Result<()> {
        self.validate()?;
        self.packages.sort_by(|a, b| {
            (&a.name, &a.version, &a.digest, &a.source)
                .cmp(&(&b.name, &b.version, &b.digest, &b.source))
        });
        self.artifacts.sort_by(|a, b| {
            (&a.path, &a.kind, a.size, &a.sha256).cmp(&(&b.path, &b.kind, b.size, &b.sha256))
        });

        let mut json = serde_json::to_string_pretty(self).map_err(|e| ModError::InvalidManifest {
            detail: e.to_string(),
        })?;
        json.push('\n');
        fsutil::atomic_write(path, json.as_bytes())?;
        debug!(path = %path.display(), packages = self.packages.len(), "saved manifest");
        Ok(())
    }

    pub fn add_package(&mut self, name: &str, version: &str, digest: &str, source: &str) {
        self.packages.push(PackageRecord {
            name: name.to_string(),
            version: version.to_string(),
            digest: digest.to_string(),
            source: source.to_string(),
        });
    }

    pub fn add_artifact(&mut self, path: &str, kind: &str, size: u64, sha256: &str) {
        self.artifacts.push(Artifact {
            path: path.to_string(),
            kind: kind.to_string(),
            size,
            sha256: sha256.to_string(),
        });
    }

    /// Every disagreement between the manifest's packages and `lock`.
    pub fn cross_check(&self, lock: &LockFile) -> Vec<Violation> {
        let mut violations = Vec::new();
        for pkg in &self.packages {
            if !lock.has_package(&pkg.name) {
                violations.push(Violation::SumMissingPackage {
                    name: pkg.name.clone(),
                });
                continue;
            }
            match lock.digest(&pkg.name, &pkg.version) {
                None => violations.push(Violation::SumMissingVersion {
                    name: pkg.name.clone(),
                    version: pkg.version.clone(),
                }),
                Some(sum) if sum != pkg.digest => {
                    violations.push(Violation::ManifestDigestMismatch {
                        name: pkg.name.clone(),
                        version: pkg.version.clone(),
                        manifest: pkg.digest.clone(),
                        sum: sum.to_string(),
                    })
                }
                Some(_) => {}
            }
        }
        violations
    }

    /// Load `ami.sum` from `sum_path` and fail on any disagreement.
    pub fn cross_check_with_sum_file(&self, sum_path: &Path) -> Result<()> {
        let lock = LockFile::load(sum_path)?;
        let violations = self.cross_check(&lock);
        if violations.is_empty() {
            Ok(())
        } else {
            Err(IntegrityViolation { violations }.into())
        }
    }
}
