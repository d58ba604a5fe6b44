//! Filesystem image sink: stages each transfer in a scratch file, then
//! validates and renames it into the configured image root on finalize.
//!
//! Grounded in the two assembly strategies the distilled system observed
//! ("legacy" buffer-then-move, "streaming" append-as-received) — both share
//! this one sink implementation; only the Image Assembler's scheduling of
//! `append` calls upstream differs between modes.

use sensorlink_core::constants::{IMAGE_MAGIC_HEAD, IMAGE_MAGIC_TAIL, MIN_IMAGE_SIZE};
use sensorlink_core::{Error, ImageHandle, ImageSink, Result, Sid};
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, SeekFrom};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Where finalized images land, and whether to skip the finalize-time
/// validation (scratch-file size and magic-head check).
#[derive(Debug, Clone)]
pub struct FilesystemSinkConfig {
    pub image_root: PathBuf,
    pub test_mode: bool,
}

impl FilesystemSinkConfig {
    /// Read `IMAGE_ROOT` (default `./images`) and `IS_TEST_ENV` from the
    /// process environment.
    #[must_use]
    pub fn from_env() -> Self {
        let image_root = env::var("IMAGE_ROOT").unwrap_or_else(|_| "./images".to_string());
        let test_mode = env::var("IS_TEST_ENV").is_ok();
        Self { image_root: PathBuf::from(image_root), test_mode }
    }
}

struct ScratchEntry {
    file: fs::File,
    path: PathBuf,
    bytes_written: u64,
}

/// Owns every open scratch file, keyed by source.
///
/// The `ImageSink` trait methods take `&self` (the same handle is shared
/// across the assembler's calls), so the open-file table lives behind a
/// `tokio::sync::Mutex` rather than requiring `&mut self` plumbing through
/// the assembler.
pub struct FilesystemImageSink {
    image_root: PathBuf,
    scratch_dir: PathBuf,
    test_mode: bool,
    open: Mutex<HashMap<Sid, ScratchEntry>>,
}

impl FilesystemImageSink {
    /// Create the sink, creating `image_root` and its `.scratch` subdirectory
    /// once up front (directory creation is not repeated per-transfer).
    pub fn new(config: FilesystemSinkConfig) -> Result<Self> {
        let scratch_dir = config.image_root.join(".scratch");
        std::fs::create_dir_all(&config.image_root)?;
        std::fs::create_dir_all(&scratch_dir)?;
        Ok(Self { image_root: config.image_root, scratch_dir, test_mode: config.test_mode, open: Mutex::new(HashMap::new()) })
    }

    /// Build from the process environment (see [`FilesystemSinkConfig::from_env`]).
    pub fn from_env() -> Result<Self> {
        Self::new(FilesystemSinkConfig::from_env())
    }

    fn scratch_path(&self, sid: Sid) -> PathBuf {
        self.scratch_dir.join(format!("{}.part", sid.to_hex_compact()))
    }

    fn final_name(&self, sid: Sid) -> String {
        format!("{}_{}.jpg", sid.to_hex_compact(), local_timestamp_compact())
    }
}

impl ImageSink for FilesystemImageSink {
    async fn open(&self, source_id: Sid) -> Result<ImageHandle> {
        let path = self.scratch_path(source_id);
        let file = fs::OpenOptions::new().create(true).write(true).truncate(true).open(&path).await?;
        self.open.lock().await.insert(source_id, ScratchEntry { file, path, bytes_written: 0 });
        Ok(ImageHandle(source_id))
    }

    async fn append(&self, handle: ImageHandle, bytes: &[u8]) -> Result<()> {
        let mut open = self.open.lock().await;
        let entry = open.get_mut(&handle.0).ok_or_else(|| Error::ScratchMissing(handle.0.to_hex_colon()))?;
        entry.file.write_all(bytes).await?;
        entry.bytes_written += bytes.len() as u64;
        Ok(())
    }

    async fn close(&self, handle: ImageHandle) -> Result<String> {
        let sid = handle.0;
        let mut entry = self.open.lock().await.remove(&sid).ok_or_else(|| Error::ScratchMissing(sid.to_hex_colon()))?;
        entry.file.flush().await?;

        if !self.test_mode {
            if entry.bytes_written < MIN_IMAGE_SIZE {
                let _ = fs::remove_file(&entry.path).await;
                return Err(Error::ImageTooSmall { size: entry.bytes_written, min: MIN_IMAGE_SIZE });
            }

            let mut head = [0u8; IMAGE_MAGIC_HEAD.len()];
            entry.file.seek(SeekFrom::Start(0)).await?;
            entry.file.read_exact(&mut head).await.map_err(Error::from)?;
            if head != IMAGE_MAGIC_HEAD {
                let _ = fs::remove_file(&entry.path).await;
                return Err(Error::MissingMagicHead);
            }

            if entry.bytes_written >= IMAGE_MAGIC_TAIL.len() as u64 {
                let mut tail = [0u8; IMAGE_MAGIC_TAIL.len()];
                entry.file.seek(SeekFrom::End(-(IMAGE_MAGIC_TAIL.len() as i64))).await?;
                entry.file.read_exact(&mut tail).await.map_err(Error::from)?;
                if tail != IMAGE_MAGIC_TAIL {
                    warn!(sid = %sid, "finalized image is missing its magic tail marker");
                }
            }
        }

        let dest = self.image_root.join(self.final_name(sid));
        fs::rename(&entry.path, &dest).await?;
        Ok(dest.to_string_lossy().into_owned())
    }

    async fn discard(&self, handle: ImageHandle) {
        if let Some(entry) = self.open.lock().await.remove(&handle.0) {
            if let Err(err) = fs::remove_file(&entry.path).await {
                debug!(sid = %handle.0, %err, "scratch file already gone on discard");
            }
        }
    }
}

fn local_timestamp_compact() -> String {
    chrono::Local::now().format("%Y%m%dT%H%M%S%3f").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sid() -> Sid {
        Sid::new([0xab, 0xcd, 0xef, 0x01, 0x02, 0x03])
    }

    fn sink(root: &std::path::Path, test_mode: bool) -> FilesystemImageSink {
        FilesystemImageSink::new(FilesystemSinkConfig { image_root: root.to_path_buf(), test_mode }).unwrap()
    }

    #[tokio::test]
    async fn open_creates_scratch_file_under_dot_scratch() {
        let dir = tempdir().unwrap();
        let sink = sink(dir.path(), false);
        let handle = sink.open(sid()).await.unwrap();
        assert_eq!(handle.0, sid());
        assert!(dir.path().join(".scratch").join(format!("{}.part", sid().to_hex_compact())).exists());
    }

    #[tokio::test]
    async fn finalize_moves_scratch_into_image_root_with_generated_name() {
        let dir = tempdir().unwrap();
        let sink = sink(dir.path(), false);
        let handle = sink.open(sid()).await.unwrap();

        let mut body = vec![0xff, 0xd8];
        body.extend(std::iter::repeat(0xAAu8).take(1024));
        body.extend([0xff, 0xd9]);
        sink.append(handle, &body).await.unwrap();

        let location = sink.close(handle).await.unwrap();
        assert!(location.contains(&sid().to_hex_compact()));
        assert!(std::path::Path::new(&location).exists());
        assert!(!dir.path().join(".scratch").join(format!("{}.part", sid().to_hex_compact())).exists());
    }

    #[tokio::test]
    async fn finalize_rejects_undersized_blob() {
        let dir = tempdir().unwrap();
        let sink = sink(dir.path(), false);
        let handle = sink.open(sid()).await.unwrap();
        sink.append(handle, &[0xff, 0xd8, 1, 2, 3]).await.unwrap();

        let err = sink.close(handle).await.unwrap_err();
        assert!(matches!(err, Error::ImageTooSmall { .. }));
    }

    #[tokio::test]
    async fn finalize_rejects_missing_magic_head() {
        let dir = tempdir().unwrap();
        let sink = sink(dir.path(), false);
        let handle = sink.open(sid()).await.unwrap();
        sink.append(handle, &vec![0u8; 2000]).await.unwrap();

        let err = sink.close(handle).await.unwrap_err();
        assert!(matches!(err, Error::MissingMagicHead));
    }

    #[tokio::test]
    async fn test_mode_skips_validation() {
        let dir = tempdir().unwrap();
        let sink = sink(dir.path(), true);
        let handle = sink.open(sid()).await.unwrap();
        sink.append(handle, b"too small, no magic head").await.unwrap();

        let location = sink.close(handle).await.unwrap();
        assert!(std::path::Path::new(&location).exists());
    }

    #[tokio::test]
    async fn discard_removes_scratch_file_and_is_idempotent() {
        let dir = tempdir().unwrap();
        let sink = sink(dir.path(), false);
        let handle = sink.open(sid()).await.unwrap();
        sink.append(handle, b"partial").await.unwrap();

        sink.discard(handle).await;
        assert!(!dir.path().join(".scratch").join(format!("{}.part", sid().to_hex_compact())).exists());

        sink.discard(handle).await; // idempotent, must not panic
    }

    #[tokio::test]
    async fn close_without_open_is_an_error() {
        let dir = tempdir().unwrap();
        let sink = sink(dir.path(), false);
        assert!(sink.close(ImageHandle(sid())).await.is_err());
    }
}
