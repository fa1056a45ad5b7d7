//! Filesystem helpers for the backup and dotfiles steps
//!
//! All blocking work runs on the blocking pool.

use lunaris_errors::PlatformError;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tokio::task;
use walkdir::WalkDir;

/// Result type for filesystem operations
pub type Result<T> = std::result::Result<T, PlatformError>;

fn fs_error(operation: &str, path: &Path, err: impl std::fmt::Display) -> PlatformError {
    PlatformError::FilesystemOperationFailed {
        operation: operation.to_string(),
        path: path.display().to_string(),
        message: err.to_string(),
    }
}

async fn blocking<T, F>(operation: &str, path: &Path, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    task::spawn_blocking(f)
        .await
        .map_err(|err| fs_error(operation, path, err))?
}

/// Recursively copy `src` into `dst`, merging with existing content.
///
/// Files are overwritten and permissions are preserved. Symlinks are
/// recreated rather than followed, and a symlink already at a destination
/// path is replaced, not written through. Returns the number of files copied.
///
/// # Errors
///
/// Returns `FilesystemOperationFailed` naming the first path that could not
/// be read or written.
pub async fn copy_dir_all(src: &Path, dst: &Path) -> Result<u64> {
    let src = src.to_path_buf();
    let dst = dst.to_path_buf();
    let label = src.clone();
    blocking("copy_dir", &label, move || copy_dir_blocking(&src, &dst)).await
}

fn copy_dir_blocking(src: &Path, dst: &Path) -> Result<u64> {
    let mut copied = 0;
    std::fs::create_dir_all(dst).map_err(|e| fs_error("create_dir", dst, e))?;

    for entry in WalkDir::new(src).follow_links(false).min_depth(1) {
        let entry = entry.map_err(|e| fs_error("walk", src, e))?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| fs_error("strip_prefix", entry.path(), e))?;
        let target = dst.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            if is_symlink(&target) {
                remove_any(&target)?;
            }
            std::fs::create_dir_all(&target).map_err(|e| fs_error("create_dir", &target, e))?;
            let mode = entry
                .metadata()
                .map_err(|e| fs_error("metadata", entry.path(), e))?
                .permissions();
            std::fs::set_permissions(&target, mode)
                .map_err(|e| fs_error("set_permissions", &target, e))?;
        } else if file_type.is_symlink() {
            let link = std::fs::read_link(entry.path())
                .map_err(|e| fs_error("read_link", entry.path(), e))?;
            if target.symlink_metadata().is_ok() {
                remove_any(&target)?;
            }
            std::os::unix::fs::symlink(&link, &target)
                .map_err(|e| fs_error("symlink", &target, e))?;
            copied += 1;
        } else {
            // never write through an existing link into whatever it points at
            if is_symlink(&target) || target.is_dir() {
                remove_any(&target)?;
            }
            std::fs::copy(entry.path(), &target).map_err(|e| fs_error("copy", &target, e))?;
            copied += 1;
        }
    }

    Ok(copied)
}

fn is_symlink(path: &Path) -> bool {
    path.symlink_metadata()
        .is_ok_and(|meta| meta.file_type().is_symlink())
}

fn remove_any(path: &Path) -> Result<()> {
    let meta = path
        .symlink_metadata()
        .map_err(|e| fs_error("metadata", path, e))?;
    if meta.is_dir() {
        std::fs::remove_dir_all(path).map_err(|e| fs_error("remove_dir", path, e))
    } else {
        std::fs::remove_file(path).map_err(|e| fs_error("remove_file", path, e))
    }
}

/// Add execute bits for user, group and others to every regular file
/// directly inside `dir`. Returns how many files were changed.
///
/// # Errors
///
/// Returns `FilesystemOperationFailed` if the directory cannot be listed or
/// a mode cannot be set.
pub async fn make_files_executable(dir: &Path) -> Result<usize> {
    let dir = dir.to_path_buf();
    let label = dir.clone();
    blocking("chmod", &label, move || {
        let mut changed = 0;
        let entries = std::fs::read_dir(&dir).map_err(|e| fs_error("read_dir", &dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| fs_error("read_dir", &dir, e))?;
            let path = entry.path();
            let meta = entry.metadata().map_err(|e| fs_error("metadata", &path, e))?;
            if !meta.is_file() {
                continue;
            }
            let mut permissions = meta.permissions();
            let mode = permissions.mode();
            if mode & 0o111 != 0o111 {
                permissions.set_mode(mode | 0o111);
                std::fs::set_permissions(&path, permissions)
                    .map_err(|e| fs_error("set_permissions", &path, e))?;
                changed += 1;
            }
        }
        Ok(changed)
    })
    .await
}

/// Whether `dir` exists and contains at least one entry besides `.git`.
pub async fn has_content(dir: &Path) -> bool {
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return false;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        if entry.file_name() != ".git" {
            return true;
        }
    }
    false
}

/// Remove `path` (file or directory tree) if it exists.
///
/// # Errors
///
/// Returns `FilesystemOperationFailed` if the path exists but cannot be removed.
pub async fn remove_if_exists(path: &Path) -> Result<()> {
    let path: PathBuf = path.to_path_buf();
    let label = path.clone();
    blocking("remove", &label, move || {
        if path.symlink_metadata().is_ok() {
            remove_any(&path)?;
        }
        Ok(())
    })
    .await
}

/// Create `dir` and its parents.
///
/// # Errors
///
/// Returns `FilesystemOperationFailed` if creation fails.
pub async fn ensure_dir(dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| fs_error("create_dir", dir, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn copy_merges_and_preserves_modes() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        std::fs::create_dir_all(src.join("hypr/scripts")).unwrap();
        std::fs::write(src.join("hypr/hyprland.conf"), "monitor=,preferred").unwrap();
        std::fs::write(src.join("hypr/scripts/run.sh"), "#!/bin/sh").unwrap();
        std::fs::set_permissions(
            src.join("hypr/scripts/run.sh"),
            std::fs::Permissions::from_mode(0o755),
        )
        .unwrap();
        std::os::unix::fs::symlink("hyprland.conf", src.join("hypr/link.conf")).unwrap();

        std::fs::create_dir_all(dst.join("hypr")).unwrap();
        std::fs::write(dst.join("hypr/hyprland.conf"), "old").unwrap();
        std::fs::write(dst.join("keep.txt"), "untouched").unwrap();

        let copied = copy_dir_all(&src, &dst).await.unwrap();
        assert_eq!(copied, 3);

        assert_eq!(
            std::fs::read_to_string(dst.join("hypr/hyprland.conf")).unwrap(),
            "monitor=,preferred"
        );
        assert_eq!(std::fs::read_to_string(dst.join("keep.txt")).unwrap(), "untouched");
        let mode = std::fs::metadata(dst.join("hypr/scripts/run.sh"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o755);
        assert_eq!(
            std::fs::read_link(dst.join("hypr/link.conf")).unwrap(),
            PathBuf::from("hyprland.conf")
        );
    }

    #[tokio::test]
    async fn existing_links_in_the_destination_are_replaced() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        let outside = tmp.path().join("outside");
        std::fs::create_dir_all(src.join("kitty")).unwrap();
        std::fs::write(src.join("kitty.conf"), "font_size 12").unwrap();
        std::fs::write(src.join("kitty/theme.conf"), "dark").unwrap();
        std::fs::create_dir_all(&outside).unwrap();
        std::fs::write(outside.join("secrets"), "do not touch").unwrap();

        std::fs::create_dir_all(&dst).unwrap();
        std::os::unix::fs::symlink(outside.join("secrets"), dst.join("kitty.conf")).unwrap();
        std::os::unix::fs::symlink(&outside, dst.join("kitty")).unwrap();

        copy_dir_all(&src, &dst).await.unwrap();

        assert_eq!(std::fs::read_to_string(outside.join("secrets")).unwrap(), "do not touch");
        assert!(!outside.join("theme.conf").exists());
        let conf = dst.join("kitty.conf");
        assert!(!conf.symlink_metadata().unwrap().file_type().is_symlink());
        assert_eq!(std::fs::read_to_string(conf).unwrap(), "font_size 12");
        assert!(!dst.join("kitty").symlink_metadata().unwrap().file_type().is_symlink());
        assert_eq!(std::fs::read_to_string(dst.join("kitty/theme.conf")).unwrap(), "dark");
    }

    #[tokio::test]
    async fn executable_bits_are_added() {
        let tmp = TempDir::new().unwrap();
        let script = tmp.path().join("wall.sh");
        std::fs::write(&script, "#!/bin/sh").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o644)).unwrap();
        std::fs::create_dir(tmp.path().join("nested")).unwrap();

        let changed = make_files_executable(tmp.path()).await.unwrap();
        assert_eq!(changed, 1);
        let mode = std::fs::metadata(&script).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[tokio::test]
    async fn git_metadata_alone_is_not_content() {
        let tmp = TempDir::new().unwrap();
        assert!(!has_content(tmp.path()).await);
        std::fs::create_dir(tmp.path().join(".git")).unwrap();
        assert!(!has_content(tmp.path()).await);
        std::fs::write(tmp.path().join("README.md"), "x").unwrap();
        assert!(has_content(tmp.path()).await);
        assert!(!has_content(&tmp.path().join("absent")).await);
    }
}
