//! CPI release tarballs.
//!
//! A release is a gzipped tarball holding `release.MF` and one directory per
//! job under `jobs/`:
//!
//! ```text
//! release.MF            name, version, jobs[] {name, templates[]}
//! jobs/cpi/bin/cpi      the provider executable
//! jobs/<job>/bin/run    optional support process
//! packages/...          optional packages (bundled ruby, ...)
//! ```

use crate::error::{Error, Result};
use flate2::read::GzDecoder;
use serde::Deserialize;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tar::Archive;

/// Job every CPI release must carry.
pub const CPI_JOB: &str = "cpi";

/// Template inside [`CPI_JOB`] that is the provider executable.
pub const CPI_TEMPLATE: &str = "bin/cpi";

const MANIFEST_FILE: &str = "release.MF";

/// Contents of `release.MF`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReleaseManifest {
    /// Release name.
    pub name: String,
    /// Release version. Numeric YAML versions are accepted.
    #[serde(deserialize_with = "version_string")]
    pub version: String,
    /// Jobs shipped by the release.
    #[serde(default)]
    pub jobs: Vec<ReleaseJob>,
}

/// A job declared in `release.MF`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReleaseJob {
    /// Job name, also its directory under `jobs/`.
    pub name: String,
    /// Files the job provides, relative to its directory.
    #[serde(default)]
    pub templates: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawVersion {
    Text(String),
    Int(i64),
    Float(f64),
}

fn version_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match RawVersion::deserialize(deserializer)? {
        RawVersion::Text(s) => s,
        RawVersion::Int(n) => n.to_string(),
        RawVersion::Float(f) => f.to_string(),
    })
}

/// An extracted release on disk.
#[derive(Debug, Clone)]
pub struct Release {
    /// Parsed `release.MF`.
    pub manifest: ReleaseManifest,
    dir: PathBuf,
}

impl Release {
    /// Read `release.MF` from an extracted release directory.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        let content = fs::read_to_string(&path).map_err(|e| Error::InvalidManifest {
            path: path.clone(),
            message: e.to_string(),
        })?;
        let manifest = serde_yaml::from_str(&content).map_err(|e| Error::InvalidManifest {
            path: path.clone(),
            message: e.to_string(),
        })?;

        Ok(Self {
            manifest,
            dir: dir.to_path_buf(),
        })
    }

    /// Directory the release was extracted into.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Look up a job by name.
    pub fn job(&self, name: &str) -> Option<&ReleaseJob> {
        self.manifest.jobs.iter().find(|j| j.name == name)
    }

    /// Directory holding a job's files.
    pub fn job_dir(&self, name: &str) -> PathBuf {
        self.dir.join("jobs").join(name)
    }

    /// Directory holding the release's packages.
    pub fn packages_dir(&self) -> PathBuf {
        self.dir.join("packages")
    }

    /// Path of the provider executable.
    pub fn cpi_executable(&self) -> PathBuf {
        self.job_dir(CPI_JOB).join(CPI_TEMPLATE)
    }
}

/// Unpacks release tarballs.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReleaseExtractor;

impl ReleaseExtractor {
    /// Unpack `tarball` into `dest` and load its manifest.
    pub fn extract(&self, tarball: &Path, dest: &Path) -> Result<Release> {
        if !tarball.is_file() {
            return Err(Error::ReleaseNotFound(tarball.to_path_buf()));
        }

        let file = File::open(tarball).map_err(|e| Error::io(tarball, e))?;
        fs::create_dir_all(dest).map_err(|e| Error::io(dest, e))?;

        let mut archive = Archive::new(GzDecoder::new(file));
        archive.unpack(dest).map_err(|source| Error::Extract {
            path: tarball.to_path_buf(),
            source,
        })?;

        log::debug!("Extracted {} into {}", tarball.display(), dest.display());
        Release::load(dest)
    }
}

/// Checks that a release can act as a CPI.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReleaseValidator {
    extractor: ReleaseExtractor,
}

impl ReleaseValidator {
    /// Check an extracted release, reporting every problem at once.
    pub fn validate(&self, release: &Release) -> Result<()> {
        let mut problems = Vec::new();
        let manifest = &release.manifest;

        if manifest.name.trim().is_empty() {
            problems.push("release name is empty".to_string());
        }
        if manifest.version.trim().is_empty() {
            problems.push("release version is empty".to_string());
        }

        match release.job(CPI_JOB) {
            None => problems.push(format!("release has no job named '{}'", CPI_JOB)),
            Some(job) if !job.templates.iter().any(|t| t == CPI_TEMPLATE) => {
                problems.push(format!(
                    "job '{}' does not declare template '{}'",
                    CPI_JOB, CPI_TEMPLATE
                ));
            }
            Some(_) if !release.cpi_executable().is_file() => {
                problems.push(format!("job '{}' is missing file '{}'", CPI_JOB, CPI_TEMPLATE));
            }
            Some(_) => {}
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidRelease { problems })
        }
    }

    /// Extract `tarball` into a scratch directory, validate it and clean up.
    pub fn validate_tarball(&self, tarball: &Path) -> Result<ReleaseManifest> {
        let scratch = tempfile::tempdir().map_err(|e| Error::io(std::env::temp_dir(), e))?;
        let release = self.extractor.extract(tarball, scratch.path())?;
        self.validate(&release)?;
        Ok(release.manifest)
    }
}

/// Build a gzipped tarball from `(path, contents)` pairs.
#[cfg(test)]
pub(crate) fn write_tarball(path: &Path, files: &[(&str, &str)]) {
    let file = File::create(path).unwrap();
    let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (name, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, name, contents.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap();
}
