//! Tar archive extraction that rejects path-traversal entries (`../`-style
//! escapes, absolute paths) before unpacking anything.

use crate::error::{PusherError, Result, io_context};
use std::fs;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use tar::Archive;

pub struct Extractor {
    archive_path: PathBuf,
}

impl Extractor {
    pub fn new(archive_path: impl Into<PathBuf>) -> Self {
        Self {
            archive_path: archive_path.into(),
        }
    }

    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }

    /// Unpacks the whole archive into `target_dir`, preserving symbolic
    /// links. Refuses any entry whose resolved path would escape
    /// `target_dir` (`../`-style traversal or an absolute path).
    pub fn extract_all(&self, target_dir: &Path) -> Result<()> {
        let file = fs::File::open(&self.archive_path).map_err(|e| io_context(e, &self.archive_path))?;
        let mut archive = Archive::new(file);
        archive.set_preserve_permissions(true);

        let entries = archive
            .entries()
            .map_err(|e| PusherError::archive(format!("failed to read tar entries: {e}")))?;

        for entry in entries {
            let mut entry =
                entry.map_err(|e| PusherError::archive(format!("corrupt tar entry: {e}")))?;
            let entry_path = entry
                .path()
                .map_err(|e| PusherError::archive(format!("invalid entry path: {e}")))?
                .into_owned();

            let dest = safe_join(target_dir, &entry_path)?;
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).map_err(|e| io_context(e, parent))?;
            }

            entry
                .unpack(&dest)
                .map_err(|e| PusherError::archive(format!("failed to unpack {}: {e}", dest.display())))?;
        }

        Ok(())
    }

    /// Returns the parsed JSON of a named archive member without extracting
    /// the rest of the archive. Used for the top-level `manifest.json`
    /// before full extraction is needed.
    pub fn read_json(&self, name: &str) -> Result<serde_json::Value> {
        let file = fs::File::open(&self.archive_path).map_err(|e| io_context(e, &self.archive_path))?;
        let mut archive = Archive::new(file);

        let entries = archive
            .entries()
            .map_err(|e| PusherError::archive(format!("failed to read tar entries: {e}")))?;

        for entry in entries {
            let mut entry =
                entry.map_err(|e| PusherError::archive(format!("corrupt tar entry: {e}")))?;
            let entry_path = entry
                .path()
                .map_err(|e| PusherError::archive(format!("invalid entry path: {e}")))?
                .into_owned();

            if entry_path == Path::new(name) {
                let mut buf = String::new();
                entry
                    .read_to_string(&mut buf)
                    .map_err(|e| PusherError::archive(format!("failed to read {name}: {e}")))?;
                return serde_json::from_str(&buf)
                    .map_err(|e| PusherError::archive(format!("failed to parse {name}: {e}")));
            }
        }

        Err(PusherError::archive(format!(
            "archive member not found: {name}"
        )))
    }
}

/// Joins `target_dir` with a tar entry's relative path, rejecting entries
/// that are absolute or that `..`-escape the target directory.
fn safe_join(target_dir: &Path, entry_path: &Path) -> Result<PathBuf> {
    let mut resolved = target_dir.to_path_buf();
    for component in entry_path.components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(PusherError::archive(format!(
                    "archive entry escapes target directory: {}",
                    entry_path.display()
                )));
            }
        }
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tar::{Builder, Header};

    fn build_archive(path: &Path, entries: &[(&str, &[u8])]) {
        let file = fs::File::create(path).unwrap();
        let mut builder = Builder::new(file);
        for (name, data) in entries {
            let mut header = Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.finish().unwrap();
    }

    #[test]
    fn extract_all_unpacks_regular_files() {
        let workdir = std::env::temp_dir().join(format!("extractor-test-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&workdir).unwrap();
        let archive_path = workdir.join("in.tar");
        build_archive(
            &archive_path,
            &[
                ("manifest.json", b"[]"),
                ("abc/layer.tar", b"hello layer"),
            ],
        );

        let target = workdir.join("out");
        fs::create_dir_all(&target).unwrap();
        let extractor = Extractor::new(&archive_path);
        extractor.extract_all(&target).unwrap();

        assert_eq!(
            fs::read_to_string(target.join("manifest.json")).unwrap(),
            "[]"
        );
        assert_eq!(
            fs::read(target.join("abc/layer.tar")).unwrap(),
            b"hello layer"
        );

        fs::remove_dir_all(&workdir).ok();
    }

    #[test]
    fn read_json_finds_member_without_full_extraction() {
        let workdir = std::env::temp_dir().join(format!("extractor-test-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&workdir).unwrap();
        let archive_path = workdir.join("in.tar");
        build_archive(
            &archive_path,
            &[("manifest.json", br#"[{"Config":"a.json"}]"#)],
        );

        let extractor = Extractor::new(&archive_path);
        let value = extractor.read_json("manifest.json").unwrap();
        assert_eq!(value[0]["Config"], "a.json");

        fs::remove_dir_all(&workdir).ok();
    }

    #[test]
    fn safe_join_rejects_parent_dir_traversal() {
        let target = Path::new("/tmp/target");
        let escaping = Path::new("../../etc/passwd");
        assert!(safe_join(target, escaping).is_err());
    }

    #[test]
    fn safe_join_rejects_absolute_paths() {
        let target = Path::new("/tmp/target");
        let absolute = Path::new("/etc/passwd");
        assert!(safe_join(target, absolute).is_err());
    }

    #[test]
    fn safe_join_accepts_nested_relative_paths() {
        let target = Path::new("/tmp/target");
        let nested = Path::new("abc/layer.tar");
        let resolved = safe_join(target, nested).unwrap();
        assert_eq!(resolved, Path::new("/tmp/target/abc/layer.tar"));
    }
}
