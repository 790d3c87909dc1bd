//! Durable frame storage with per-side "latest" pointers.
//!
//! Every accepted payload lands in its own time-ordered file. The latest
//! pointer per side is updated by writing a temp file in the same directory
//! and renaming it over the target, so a concurrent reader of `latest_*`
//! never observes a partial file. Out-of-order and duplicate frame ids
//! overwrite latest unconditionally; arrival order is not trusted.

use chrono::Utc;
use duolens_core::Side;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tracing::debug;

/// Where one accepted payload ended up.
#[derive(Debug, Clone)]
pub struct StoredFrame {
    /// The unique per-payload archive file.
    pub archive: PathBuf,
    /// The side's latest pointer, freshly updated.
    pub latest: PathBuf,
}

/// Owns the frames directory.
pub struct FrameStore {
    dir: PathBuf,
    tmp_seq: AtomicU64,
}

impl FrameStore {
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            tmp_seq: AtomicU64::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Latest pointer path for a side and extension.
    pub fn latest_path(&self, side: Side, ext: &str) -> PathBuf {
        self.dir.join(format!("latest_{}.{ext}", side.letter()))
    }

    /// Store a compressed payload for one side: archive the bytes and promote
    /// them to the side's latest pointer.
    pub async fn store_jpeg(
        &self,
        side: Side,
        frame_id: Option<&str>,
        bytes: &[u8],
    ) -> io::Result<StoredFrame> {
        let archive = self.dir.join(Self::archive_name(frame_id, Some(side), "jpg"));
        fs::write(&archive, bytes).await?;
        let latest = self.latest_path(side, "jpg");
        self.write_atomic(&latest, bytes).await?;
        debug!("stored {} ({} bytes)", archive.display(), bytes.len());
        Ok(StoredFrame { archive, latest })
    }

    /// Store a raw payload for one side: archive the verbatim `.bin`, write
    /// the decoded rendering next to it, and promote the rendering to the
    /// side's latest pointer.
    pub async fn store_raw(
        &self,
        side: Side,
        frame_id: Option<&str>,
        payload: &[u8],
        rendered_png: &[u8],
    ) -> io::Result<StoredFrame> {
        let archive = self.dir.join(Self::archive_name(frame_id, Some(side), "bin"));
        fs::write(&archive, payload).await?;
        fs::write(archive.with_extension("png"), rendered_png).await?;
        let latest = self.latest_path(side, "png");
        self.write_atomic(&latest, rendered_png).await?;
        debug!("stored {} ({} bytes)", archive.display(), payload.len());
        Ok(StoredFrame { archive, latest })
    }

    /// Archive a stitched payload that has no single side.
    pub async fn store_stitched(
        &self,
        frame_id: Option<&str>,
        ext: &str,
        bytes: &[u8],
    ) -> io::Result<PathBuf> {
        let archive = self.dir.join(Self::archive_name(frame_id, None, ext));
        fs::write(&archive, bytes).await?;
        Ok(archive)
    }

    /// Timestamped unique name: `{utc}_f{id}_{side}.{ext}`.
    fn archive_name(frame_id: Option<&str>, side: Option<Side>, ext: &str) -> String {
        let ts = Utc::now().format("%Y%m%d_%H%M%S_%f");
        let id = frame_id.map(|id| format!("_f{id}")).unwrap_or_default();
        let side = side.map(|s| format!("_{}", s.letter())).unwrap_or_default();
        format!("{ts}{id}{side}.{ext}")
    }

    /// Write-to-temp-then-rename in the same directory. The rename is the
    /// only point where the target changes, and it is all-or-nothing.
    ///
    /// The temp name carries a per-store sequence number so concurrent
    /// writers to the same target each rename their own fully-written file.
    async fn write_atomic(&self, target: &Path, bytes: &[u8]) -> io::Result<()> {
        let file_name = target
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("latest");
        let seq = self.tmp_seq.fetch_add(1, Ordering::Relaxed);
        let tmp = self.dir.join(format!(".{file_name}.{seq}.tmp"));
        fs::write(&tmp, bytes).await?;
        fs::rename(&tmp, target).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_archive_and_latest_written() {
        let dir = TempDir::new().unwrap();
        let store = FrameStore::new(dir.path()).unwrap();
        let stored = store
            .store_jpeg(Side::Left, Some("3L"), b"jpegbytes")
            .await
            .unwrap();
        assert!(stored.archive.file_name().unwrap().to_str().unwrap().contains("_f3L_L"));
        assert_eq!(std::fs::read(&stored.archive).unwrap(), b"jpegbytes");
        assert_eq!(std::fs::read(&stored.latest).unwrap(), b"jpegbytes");
    }

    #[tokio::test]
    async fn test_duplicate_upload_latest_is_second_payload_exactly() {
        let dir = TempDir::new().unwrap();
        let store = FrameStore::new(dir.path()).unwrap();
        store.store_jpeg(Side::Right, Some("5R"), b"first").await.unwrap();
        let stored = store.store_jpeg(Side::Right, Some("5R"), b"second").await.unwrap();
        assert_eq!(std::fs::read(&stored.latest).unwrap(), b"second");
        // No temp residue next to the pointer.
        let residue: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .file_name()
                    .to_str()
                    .unwrap()
                    .ends_with(".tmp")
            })
            .collect();
        assert!(residue.is_empty());
    }

    #[tokio::test]
    async fn test_out_of_order_ids_overwrite_latest_unconditionally() {
        let dir = TempDir::new().unwrap();
        let store = FrameStore::new(dir.path()).unwrap();
        store.store_jpeg(Side::Left, Some("9L"), b"newer").await.unwrap();
        // A retried older frame arrives late; it still wins latest.
        let stored = store.store_jpeg(Side::Left, Some("7L"), b"older").await.unwrap();
        assert_eq!(std::fs::read(&stored.latest).unwrap(), b"older");
    }

    #[tokio::test]
    async fn test_raw_store_writes_bin_png_and_latest() {
        let dir = TempDir::new().unwrap();
        let store = FrameStore::new(dir.path()).unwrap();
        let stored = store
            .store_raw(Side::Left, Some("2L"), b"rawpayload", b"pngbytes")
            .await
            .unwrap();
        assert!(stored.archive.to_str().unwrap().ends_with(".bin"));
        assert_eq!(std::fs::read(stored.archive.with_extension("png")).unwrap(), b"pngbytes");
        assert_eq!(std::fs::read(store.latest_path(Side::Left, "png")).unwrap(), b"pngbytes");
    }

    #[tokio::test]
    async fn test_concurrent_same_side_uploads_publish_one_whole_payload() {
        let dir = TempDir::new().unwrap();
        let store = std::sync::Arc::new(FrameStore::new(dir.path()).unwrap());
        let first = vec![0x11u8; 64 * 1024];
        let second = vec![0x22u8; 64 * 1024];
        let a = tokio::spawn({
            let store = store.clone();
            let bytes = first.clone();
            async move { store.store_jpeg(Side::Left, Some("8L"), &bytes).await.unwrap() }
        });
        let b = tokio::spawn({
            let store = store.clone();
            let bytes = second.clone();
            async move { store.store_jpeg(Side::Left, Some("9L"), &bytes).await.unwrap() }
        });
        a.await.unwrap();
        b.await.unwrap();
        // Whichever writer renamed last, latest is one payload intact, never
        // an interleaving of the two.
        let latest = std::fs::read(store.latest_path(Side::Left, "jpg")).unwrap();
        assert!(latest == first || latest == second);
    }

    #[tokio::test]
    async fn test_sides_have_independent_latest_pointers() {
        let dir = TempDir::new().unwrap();
        let store = FrameStore::new(dir.path()).unwrap();
        store.store_jpeg(Side::Left, None, b"left").await.unwrap();
        store.store_jpeg(Side::Right, None, b"right").await.unwrap();
        assert_eq!(std::fs::read(store.latest_path(Side::Left, "jpg")).unwrap(), b"left");
        assert_eq!(std::fs::read(store.latest_path(Side::Right, "jpg")).unwrap(), b"right");
    }
}
