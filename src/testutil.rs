//! Fixture helpers shared by tests.

use std::fs::File;
use std::path::Path;

/// Build a gzipped tarball from `(path, contents)` pairs.
pub fn write_tarball(path: &Path, files: &[(&str, &str)]) {
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

/// A CPI release that passes validation.
pub fn write_cpi_release(path: &Path) {
    write_tarball(
        path,
        &[
            (
                "release.MF",
                "name: fake-cpi\nversion: '1'\njobs:\n- name: cpi\n  templates: [bin/cpi]\n",
            ),
            ("jobs/cpi/bin/cpi", "#!/bin/sh\n"),
        ],
    );
}

/// A stemcell tarball named `name/version`.
pub fn write_stemcell(path: &Path, name: &str, version: &str) {
    let manifest = format!("name: {}\nversion: '{}'\ncloud_properties: {{}}\n", name, version);
    write_tarball(
        path,
        &[("stemcell.MF", manifest.as_str()), ("image", "image bytes")],
    );
}
