//! Filesystem utilities for atomic document writes.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Atomically rename a file, with fallback for platforms where rename fails if target exists.
///
/// On some platforms (notably Windows), `rename` fails if the destination already exists.
/// This function handles that case by removing the destination first and retrying.
///
/// If the rename ultimately fails, the temp file is cleaned up.
pub async fn rename_with_fallback(temp_path: &Path, destination: &Path) -> io::Result<()> {
    if let Err(initial_err) = fs::rename(temp_path, destination).await {
        let _ = fs::remove_file(destination).await;
        if let Err(retry_err) = fs::rename(temp_path, destination).await {
            let _ = fs::remove_file(temp_path).await;
            return Err(io::Error::new(
                retry_err.kind(),
                format!(
                    "Atomic rename failed (initial: {}, retry: {})",
                    initial_err, retry_err
                ),
            ));
        }
    }
    Ok(())
}

/// Write `data` to `path` through a synced temp file and an atomic rename.
///
/// A failure at any step leaves the previous contents of `path` untouched.
/// Missing parent directories are created.
pub async fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let temp_path = temp_path_for(path)?;
    if let Some(parent) = temp_path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&temp_path)
        .await?;
    let written = async {
        file.write_all(data).await?;
        file.sync_all().await
    }
    .await;
    drop(file);
    if let Err(err) = written {
        let _ = fs::remove_file(&temp_path).await;
        return Err(err);
    }

    rename_with_fallback(&temp_path, path).await
}

/// Existence check that reports "unknown" as present.
///
/// Used for wipe verification, where treating an unreadable path as gone
/// would claim a deletion that never happened.
pub async fn exists_conservative(path: &Path) -> bool {
    fs::try_exists(path).await.unwrap_or(true)
}

fn temp_path_for(path: &Path) -> io::Result<PathBuf> {
    let parent = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "Invalid document path"))?;
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "Invalid document filename"))?;
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("System time error: {}", e)))?
        .as_nanos();
    Ok(parent.join(format!(".{}.{}.tmp", filename, nanos)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_rename_new_file() {
        let dir = tempdir().unwrap();
        let temp = dir.path().join("temp.txt");
        let dest = dir.path().join("dest.txt");

        fs::write(&temp, b"test").await.unwrap();

        rename_with_fallback(&temp, &dest).await.unwrap();

        assert!(!temp.exists());
        assert_eq!(fs::read_to_string(&dest).await.unwrap(), "test");
    }

    #[tokio::test]
    async fn test_write_atomic_overwrites_existing() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("customers.json");

        fs::write(&dest, b"old").await.unwrap();
        write_atomic(&dest, b"new").await.unwrap();

        assert_eq!(fs::read_to_string(&dest).await.unwrap(), "new");
        // No temp files left behind
        let mut entries = fs::read_dir(dir.path()).await.unwrap();
        let mut count = 0;
        while entries.next_entry().await.unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_write_atomic_creates_parent() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("nested").join("data.json");

        write_atomic(&dest, b"{}").await.unwrap();

        assert!(dest.exists());
    }

    #[tokio::test]
    async fn test_exists_conservative() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gone.json");
        assert!(!exists_conservative(&path).await);
        fs::write(&path, b"x").await.unwrap();
        assert!(exists_conservative(&path).await);
    }
}
