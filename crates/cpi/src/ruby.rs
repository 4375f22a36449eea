//! Locating the ruby interpreter bundled with a CPI release.
//!
//! Ruby-based providers ship their interpreter as a package named
//! `ruby_<version>_cpi`. When one is present its `bin` directory goes first on
//! the provider's `PATH`; otherwise the system ruby is used.

use std::fs;
use std::path::{Path, PathBuf};

#[cfg(windows)]
const RUBY_EXECUTABLE: &str = "ruby.exe";
#[cfg(not(windows))]
const RUBY_EXECUTABLE: &str = "ruby";

/// Bundled ruby found under a release's packages directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundledRuby {
    /// Full path of the interpreter.
    pub executable: PathBuf,
}

impl BundledRuby {
    /// Directory holding the interpreter, with `/` separators.
    pub fn bin_dir(&self) -> PathBuf {
        let dir = self.executable.parent().unwrap_or_else(|| Path::new(""));
        PathBuf::from(dir.to_string_lossy().replace('\\', "/"))
    }
}

fn is_ruby_package(name: &str) -> bool {
    name.len() > "ruby__cpi".len() && name.starts_with("ruby_") && name.ends_with("_cpi")
}

/// Find `ruby_*_cpi/bin/ruby` under `packages_dir`.
///
/// Candidates are tried in name order so the choice is stable.
pub fn find_bundled_ruby(packages_dir: &Path) -> Option<BundledRuby> {
    let Ok(entries) = fs::read_dir(packages_dir) else {
        log::debug!(
            "No packages in {}, using system ruby",
            packages_dir.display()
        );
        return None;
    };

    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|name| is_ruby_package(name))
        .collect();
    names.sort();

    let found = names
        .iter()
        .map(|name| packages_dir.join(name).join("bin").join(RUBY_EXECUTABLE))
        .find(|candidate| candidate.is_file())
        .map(|executable| BundledRuby { executable });

    match &found {
        Some(ruby) => log::debug!("Using bundled ruby {}", ruby.executable.display()),
        None => log::debug!("No ruby bundled with the CPI release, using system ruby"),
    }
    found
}
