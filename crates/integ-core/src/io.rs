use crate::error::Result;
use serde::de::DeserializeOwned;
use std::path::Path;

/// Create a directory and all parents, idempotent.
pub fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)?;
    Ok(())
}

/// Read and deserialize a JSON document.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Read and deserialize a YAML document (JSON is valid YAML, so both work).
pub fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&raw)?)
}

/// Recursively copy `src` into `dst`, skipping any top-level entry named in `exclude`.
///
/// Symlinks are recreated as symlinks with the same target, never followed,
/// so a link cycle in the source cannot recurse. Returns the number of files
/// and links copied.
pub fn copy_dir_all(src: &Path, dst: &Path, exclude: &[&str]) -> Result<usize> {
    ensure_dir(dst)?;
    let mut copied = 0;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let name = entry.file_name();
        if exclude.iter().any(|e| name == *e) {
            continue;
        }
        let from = entry.path();
        let to = dst.join(&name);
        let file_type = entry.file_type()?;
        if file_type.is_symlink() {
            copy_symlink(&from, &to)?;
            copied += 1;
        } else if file_type.is_dir() {
            copied += copy_dir_all(&from, &to, &[])?;
        } else {
            std::fs::copy(&from, &to)?;
            copied += 1;
        }
    }
    Ok(copied)
}

#[cfg(unix)]
fn copy_symlink(from: &Path, to: &Path) -> Result<()> {
    std::os::unix::fs::symlink(std::fs::read_link(from)?, to)?;
    Ok(())
}

#[cfg(windows)]
fn copy_symlink(from: &Path, to: &Path) -> Result<()> {
    let target = std::fs::read_link(from)?;
    if from.is_dir() {
        std::os::windows::fs::symlink_dir(target, to)?;
    } else {
        std::os::windows::fs::symlink_file(target, to)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn ensure_dir_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a/b/c");
        ensure_dir(&path).unwrap();
        ensure_dir(&path).unwrap();
        assert!(path.is_dir());
    }

    #[test]
    fn copy_dir_all_skips_excluded_top_level_entries() {
        let src = TempDir::new().unwrap();
        std::fs::create_dir_all(src.path().join("lib/nested")).unwrap();
        std::fs::create_dir_all(src.path().join("cdk.out")).unwrap();
        std::fs::write(src.path().join("app.py"), "print()").unwrap();
        std::fs::write(src.path().join("lib/nested/index.js"), "1").unwrap();
        std::fs::write(src.path().join("cdk.out/stale.json"), "{}").unwrap();

        let dst = TempDir::new().unwrap();
        let target = dst.path().join("copy");
        let n = copy_dir_all(src.path(), &target, &["cdk.out"]).unwrap();

        assert_eq!(n, 2);
        assert!(target.join("app.py").exists());
        assert!(target.join("lib/nested/index.js").exists());
        assert!(!target.join("cdk.out").exists());
    }

    #[cfg(unix)]
    #[test]
    fn copy_dir_all_keeps_symlinks_without_following_them() {
        let src = TempDir::new().unwrap();
        std::fs::create_dir_all(src.path().join("node_modules/pkg")).unwrap();
        std::fs::write(src.path().join("node_modules/pkg/index.js"), "1").unwrap();
        // A link back to an ancestor would recurse forever if followed.
        std::os::unix::fs::symlink("..", src.path().join("node_modules/pkg/parent")).unwrap();
        std::os::unix::fs::symlink("node_modules/pkg", src.path().join("linked")).unwrap();

        let dst = TempDir::new().unwrap();
        let target = dst.path().join("copy");
        let n = copy_dir_all(src.path(), &target, &[]).unwrap();

        assert_eq!(n, 3);
        let parent = target.join("node_modules/pkg/parent");
        assert!(std::fs::symlink_metadata(&parent).unwrap().file_type().is_symlink());
        assert_eq!(std::fs::read_link(&parent).unwrap(), Path::new(".."));
        assert_eq!(std::fs::read_link(target.join("linked")).unwrap(), Path::new("node_modules/pkg"));
        assert!(target.join("linked/index.js").exists());
    }

    #[test]
    fn read_yaml_accepts_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.json");
        std::fs::write(&path, r#"{"a": [1, 2]}"#).unwrap();
        let v: serde_json::Value = read_yaml(&path).unwrap();
        assert_eq!(v["a"][1], 2);
    }
}
