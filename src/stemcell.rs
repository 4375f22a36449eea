//! Stemcell tarballs: `stemcell.MF` plus the `image` file uploaded to the CPI.

use flate2::read::GzDecoder;
use serde::Deserialize;
use serde_json::Value;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tar::Archive;
use tempfile::TempDir;

#[derive(Debug, thiserror::Error)]
pub enum StemcellError {
    #[error("stemcell tarball not found: {0}")]
    NotFound(PathBuf),

    #[error("extracting stemcell {path}: {source}")]
    Extract {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("reading stemcell.MF: {0}")]
    InvalidManifest(String),

    #[error("stemcell has no image file")]
    MissingImage,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StemcellManifest {
    pub name: String,
    #[serde(deserialize_with = "version_string")]
    pub version: String,
    #[serde(default)]
    pub cloud_properties: Value,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawVersion {
    Text(String),
    Int(i64),
    Float(f64),
}

fn version_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match RawVersion::deserialize(deserializer)? {
        RawVersion::Text(s) => s,
        RawVersion::Int(n) => n.to_string(),
        RawVersion::Float(f) => f.to_string(),
    })
}

/// A stemcell unpacked into a scratch directory that lives as long as this value.
#[derive(Debug)]
pub struct ExtractedStemcell {
    pub manifest: StemcellManifest,
    dir: TempDir,
}

impl ExtractedStemcell {
    pub fn image_path(&self) -> PathBuf {
        self.dir.path().join("image")
    }

    /// `name/version`
    pub fn label(&self) -> String {
        format!("{}/{}", self.manifest.name, self.manifest.version)
    }
}

/// Unpack and check a stemcell tarball.
pub fn extract(tarball: &Path) -> Result<ExtractedStemcell, StemcellError> {
    if !tarball.is_file() {
        return Err(StemcellError::NotFound(tarball.to_path_buf()));
    }
    let extract_err = |source: std::io::Error| StemcellError::Extract {
        path: tarball.to_path_buf(),
        source,
    };

    let dir = TempDir::new().map_err(extract_err)?;
    let file = File::open(tarball).map_err(extract_err)?;
    Archive::new(GzDecoder::new(file))
        .unpack(dir.path())
        .map_err(extract_err)?;

    let content = fs::read_to_string(dir.path().join("stemcell.MF"))
        .map_err(|e| StemcellError::InvalidManifest(e.to_string()))?;
    let manifest: StemcellManifest = serde_yaml::from_str(&content)
        .map_err(|e| StemcellError::InvalidManifest(e.to_string()))?;

    if manifest.name.trim().is_empty() || manifest.version.trim().is_empty() {
        return Err(StemcellError::InvalidManifest(
            "name and version must be provided".to_string(),
        ));
    }

    let stemcell = ExtractedStemcell { manifest, dir };
    if !stemcell.image_path().is_file() {
        return Err(StemcellError::MissingImage);
    }

    log::debug!("Extracted stemcell {}", stemcell.label());
    Ok(stemcell)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::write_tarball;

    #[test]
    fn test_extract_stemcell() {
        let tmp = TempDir::new().unwrap();
        let tarball = tmp.path().join("stemcell.tgz");
        write_tarball(
            &tarball,
            &[
                (
                    "stemcell.MF",
                    "name: ubuntu-jammy\nversion: 1.5\ncloud_properties:\n  ami: ami-123\n",
                ),
                ("image", "raw image bytes"),
            ],
        );

        let stemcell = extract(&tarball).unwrap();
        assert_eq!(stemcell.label(), "ubuntu-jammy/1.5");
        assert_eq!(stemcell.manifest.cloud_properties["ami"], "ami-123");
        assert_eq!(
            fs::read_to_string(stemcell.image_path()).unwrap(),
            "raw image bytes"
        );
    }

    #[test]
    fn test_missing_tarball() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            extract(&tmp.path().join("absent.tgz")).unwrap_err(),
            StemcellError::NotFound(_)
        ));
    }

    #[test]
    fn test_missing_image() {
        let tmp = TempDir::new().unwrap();
        let tarball = tmp.path().join("stemcell.tgz");
        write_tarball(&tarball, &[("stemcell.MF", "name: s\nversion: '1'\n")]);
        assert!(matches!(
            extract(&tarball).unwrap_err(),
            StemcellError::MissingImage
        ));
    }

    #[test]
    fn test_missing_manifest() {
        let tmp = TempDir::new().unwrap();
        let tarball = tmp.path().join("stemcell.tgz");
        write_tarball(&tarball, &[("image", "x")]);
        assert!(matches!(
            extract(&tarball).unwrap_err(),
            StemcellError::InvalidManifest(_)
        ));
    }
}
