// tests/common/mod.rs

//! Shared helpers for integration tests.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use tar::{Builder, Header};

/// Write a minimal but well-formed `.pkg.tar.zst` package file
pub fn write_package(
    dir: &Path,
    base: &str,
    name: &str,
    version: &str,
    installed: &[&str],
) -> PathBuf {
    let path = dir.join(format!("{name}-{version}-x86_64.pkg.tar.zst"));
    let file = File::create(&path).unwrap();
    let encoder = zstd::Encoder::new(file, 0).unwrap().auto_finish();
    let mut builder = Builder::new(encoder);

    let pkginfo = format!(
        "pkgname = {name}\npkgbase = {base}\npkgver = {version}\n\
         pkgdesc = Test package {name}\narch = x86_64\nsize = 4096\n\
         license = MIT\ndepend = glibc\n"
    );
    let mut buildinfo = format!("pkgname = {name}\n");
    for nvr in installed {
        buildinfo.push_str(&format!("installed = {nvr}\n"));
    }

    for (entry, content) in [(".PKGINFO", &pkginfo), (".BUILDINFO", &buildinfo)] {
        let mut header = Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        builder
            .append_data(&mut header, entry, content.as_bytes())
            .unwrap();
    }

    let payload = format!("binary payload of {name}\n");
    let mut header = Header::new_gnu();
    header.set_size(payload.len() as u64);
    header.set_mode(0o755);
    builder
        .append_data(&mut header, format!("usr/bin/{name}"), payload.as_bytes())
        .unwrap();

    builder.into_inner().unwrap().flush().unwrap();
    path
}

/// Names of all entries in `dir` ending in the given suffix
pub fn entries_with_suffix(dir: &Path, suffix: &str) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|entry| {
            let name = entry.unwrap().file_name().to_string_lossy().into_owned();
            name.ends_with(suffix).then_some(name)
        })
        .collect();
    names.sort();
    names
}
