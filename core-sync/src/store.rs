//! # Local Mirror Store
//!
//! On-disk layout of a mirror:
//!
//! ```text
//! <root>/photostream/{id}.{ext}            content
//! <root>/photostream/{id}.{ext}.metadata   sidecar
//! <root>/Albums/<title> - <id>/NNN_<name>  symlinks into photostream
//! <root>/Collections/<title> - <id>/...    symlinks into Albums, nested dirs
//! <root>/Not in any album/<name>           symlinks into photostream
//! ```
//!
//! Files only ever appear under their final name complete: content and
//! sidecars are staged as `<root>/.tmp-<uuid>` and renamed into place.

use bridge_traits::http::ByteStream;
use std::collections::BTreeSet;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Result, SyncError};

pub const PHOTOSTREAM_DIR: &str = "photostream";
pub const ALBUMS_DIR: &str = "Albums";
pub const COLLECTIONS_DIR: &str = "Collections";
pub const UNCATEGORIZED_DIR: &str = "Not in any album";
/// Sidecar file name inside album and collection directories.
pub const DIR_SIDECAR: &str = "metadata";

const TMP_PREFIX: &str = ".tmp-";
const CHUNK_SIZE: usize = 1 << 20;

/// What kind of entry a symlink points at; Windows needs to know.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkTarget {
    File,
    Dir,
}

#[derive(Debug, Clone)]
pub struct MirrorStore {
    root: PathBuf,
}

impl MirrorStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn photostream_dir(&self) -> PathBuf {
        self.root.join(PHOTOSTREAM_DIR)
    }

    pub fn albums_dir(&self) -> PathBuf {
        self.root.join(ALBUMS_DIR)
    }

    pub fn collections_dir(&self) -> PathBuf {
        self.root.join(COLLECTIONS_DIR)
    }

    pub fn uncategorized_dir(&self) -> PathBuf {
        self.root.join(UNCATEGORIZED_DIR)
    }

    /// Create the root and photostream directories and drop temp files an
    /// interrupted earlier run left behind.
    pub async fn prepare(&self) -> Result<usize> {
        self.ensure_dir(&self.root).await?;
        self.ensure_dir(&self.photostream_dir()).await?;

        let mut removed = 0;
        for name in self.list_entries(&self.root).await? {
            if name.starts_with(TMP_PREFIX) {
                let path = self.root.join(&name);
                debug!(path = %path.display(), "Removing stale temp file");
                self.remove_entry(&path).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub async fn ensure_dir(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)
            .await
            .map_err(|e| SyncError::io(path, e))
    }

    /// Remove a directory tree; a missing directory is fine.
    pub async fn remove_dir_if_exists(&self, path: &Path) -> Result<()> {
        match fs::remove_dir_all(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SyncError::io(path, e)),
        }
    }

    /// Replace a directory with an empty one.
    pub async fn recreate_dir(&self, path: &Path) -> Result<()> {
        self.remove_dir_if_exists(path).await?;
        self.ensure_dir(path).await
    }

    /// Whether anything (file, directory or symlink) sits at `path`.
    pub async fn exists(&self, path: &Path) -> Result<bool> {
        match fs::symlink_metadata(path).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SyncError::io(path, e)),
        }
    }

    pub async fn is_dir(&self, path: &Path) -> Result<bool> {
        match fs::symlink_metadata(path).await {
            Ok(meta) => Ok(meta.is_dir()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SyncError::io(path, e)),
        }
    }

    /// Fail unless `path` is absent or a regular file.
    pub async fn ensure_file_or_absent(&self, path: &Path) -> Result<()> {
        match fs::symlink_metadata(path).await {
            Ok(meta) if meta.is_file() => Ok(()),
            Ok(_) => Err(SyncError::UnexpectedEntryType {
                path: path.to_path_buf(),
                expected: "file",
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SyncError::io(path, e)),
        }
    }

    /// Names of the entries in `dir`, sorted.
    pub async fn list_entries(&self, dir: &Path) -> Result<BTreeSet<String>> {
        let mut entries = fs::read_dir(dir).await.map_err(|e| SyncError::io(dir, e))?;
        let mut names = BTreeSet::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| SyncError::io(dir, e))?
        {
            names.insert(entry.file_name().to_string_lossy().into_owned());
        }
        Ok(names)
    }

    /// First content file in `dir` that belongs to media `id`.
    pub async fn find_content(&self, dir: &Path, id: &str) -> Result<Option<String>> {
        if !self.is_dir(dir).await? {
            return Ok(None);
        }
        Ok(self
            .list_entries(dir)
            .await?
            .into_iter()
            .find(|name| crate::naming::is_content_of(name, id)))
    }

    /// Delete a file, symlink or directory tree.
    pub async fn remove_entry(&self, path: &Path) -> Result<()> {
        let meta = fs::symlink_metadata(path)
            .await
            .map_err(|e| SyncError::io(path, e))?;
        let removed = if meta.is_dir() {
            fs::remove_dir_all(path).await
        } else {
            fs::remove_file(path).await
        };
        removed.map_err(|e| SyncError::io(path, e))
    }

    fn temp_path(&self) -> PathBuf {
        self.root.join(format!("{}{}", TMP_PREFIX, Uuid::new_v4()))
    }

    async fn commit(&self, tmp: &Path, dest: &Path) -> Result<()> {
        if let Err(e) = fs::rename(tmp, dest).await {
            let _ = fs::remove_file(tmp).await;
            return Err(SyncError::io(dest, e));
        }
        Ok(())
    }

    /// Write `bytes` to `dest` via a temp file and rename.
    pub async fn write_atomic(&self, dest: &Path, bytes: &[u8]) -> Result<()> {
        let tmp = self.temp_path();
        let written = async {
            let mut file = fs::File::create(&tmp).await?;
            file.write_all(bytes).await?;
            file.sync_all().await
        }
        .await;

        if let Err(e) = written {
            let _ = fs::remove_file(&tmp).await;
            return Err(SyncError::io(&tmp, e));
        }
        self.commit(&tmp, dest).await
    }

    /// Stream `reader` into `dest` via a temp file and rename.
    ///
    /// Local write failures are returned as the outer error. A failure
    /// reading from `reader` is the transport's and comes back as the inner
    /// error, with `dest` left untouched.
    pub async fn stream_to_file(
        &self,
        dest: &Path,
        mut reader: ByteStream,
    ) -> Result<std::result::Result<u64, io::Error>> {
        let tmp = self.temp_path();
        let mut file = fs::File::create(&tmp)
            .await
            .map_err(|e| SyncError::io(&tmp, e))?;
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut total = 0u64;

        loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    drop(file);
                    let _ = fs::remove_file(&tmp).await;
                    return Ok(Err(e));
                }
            };
            if let Err(e) = file.write_all(&buf[..n]).await {
                drop(file);
                let _ = fs::remove_file(&tmp).await;
                return Err(SyncError::io(&tmp, e));
            }
            total += n as u64;
        }

        if let Err(e) = file.sync_all().await {
            drop(file);
            let _ = fs::remove_file(&tmp).await;
            return Err(SyncError::io(&tmp, e));
        }
        drop(file);

        self.commit(&tmp, dest).await?;
        Ok(Ok(total))
    }

    /// Create `link` pointing at `target` through a relative path, so the
    /// mirror stays valid when the root is moved.
    pub async fn symlink_relative(&self, target: &Path, link: &Path, kind: LinkTarget) -> Result<()> {
        let link_dir = link.parent().unwrap_or_else(|| Path::new(""));
        let relative = relative_path(link_dir, target);
        create_symlink(&relative, link, kind)
            .await
            .map_err(|e| SyncError::io(link, e))
    }

    /// Set access and modification times of `path` to `when` unless the
    /// modification time already matches. Returns whether it changed.
    ///
    /// A time the platform cannot represent is logged and skipped.
    pub async fn set_timestamp_if_different(&self, path: &Path, when: SystemTime) -> Result<bool> {
        let meta = fs::metadata(path).await.map_err(|e| SyncError::io(path, e))?;
        let current = meta.modified().map_err(|e| SyncError::io(path, e))?;
        if current == when {
            return Ok(false);
        }

        let file = fs::File::open(path)
            .await
            .map_err(|e| SyncError::io(path, e))?
            .into_std()
            .await;
        let times = std::fs::FileTimes::new()
            .set_accessed(when)
            .set_modified(when);
        match file.set_times(times) {
            Ok(()) => Ok(true),
            Err(e) => skip_unrepresentable_time(path, e),
        }
    }
}

/// A time outside what the platform can store is not worth failing the run
/// over; everything else is.
fn skip_unrepresentable_time(path: &Path, e: io::Error) -> Result<bool> {
    if e.kind() == io::ErrorKind::InvalidInput {
        warn!(path = %path.display(), error = %e, "Error updating timestamp");
        Ok(false)
    } else {
        Err(SyncError::io(path, e))
    }
}

/// Path from directory `from` to `to`, both given relative to the same base.
pub fn relative_path(from: &Path, to: &Path) -> PathBuf {
    let from: Vec<Component> = from.components().collect();
    let to: Vec<Component> = to.components().collect();
    let common = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut relative = PathBuf::new();
    for _ in common..from.len() {
        relative.push("..");
    }
    for component in &to[common..] {
        relative.push(component.as_os_str());
    }
    relative
}

#[cfg(unix)]
async fn create_symlink(target: &Path, link: &Path, _kind: LinkTarget) -> io::Result<()> {
    fs::symlink(target, link).await
}

#[cfg(windows)]
async fn create_symlink(target: &Path, link: &Path, kind: LinkTarget) -> io::Result<()> {
    match kind {
        LinkTarget::File => fs::symlink_file(target, link).await,
        LinkTarget::Dir => fs::symlink_dir(target, link).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn store() -> (TempDir, MirrorStore) {
        let dir = TempDir::new().unwrap();
        let store = MirrorStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn test_relative_path() {
        assert_eq!(
            relative_path(Path::new("/m/Albums/Rome - 1"), Path::new("/m/photostream/5.jpg")),
            PathBuf::from("../../photostream/5.jpg")
        );
        assert_eq!(
            relative_path(
                Path::new("/m/Collections/A - 1/B - 2"),
                Path::new("/m/Albums/Rome - 1")
            ),
            PathBuf::from("../../../Albums/Rome - 1")
        );
        assert_eq!(
            relative_path(Path::new("m/Not in any album"), Path::new("m/photostream/5.jpg")),
            PathBuf::from("../photostream/5.jpg")
        );
    }

    #[tokio::test]
    async fn test_prepare_removes_stale_temp_files() {
        let (dir, store) = store();
        std::fs::write(dir.path().join(".tmp-deadbeef"), b"partial").unwrap();
        std::fs::write(dir.path().join("keep.txt"), b"mine").unwrap();

        assert_eq!(store.prepare().await.unwrap(), 1);
        assert!(!dir.path().join(".tmp-deadbeef").exists());
        assert!(dir.path().join("keep.txt").exists());
        assert!(dir.path().join(PHOTOSTREAM_DIR).is_dir());
    }

    #[tokio::test]
    async fn test_write_atomic_leaves_no_temp() {
        let (dir, store) = store();
        let dest = dir.path().join("a.metadata");

        store.write_atomic(&dest, b"{\"id\":\"1\"}").await.unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"{\"id\":\"1\"}");
        let leftovers = store.list_entries(dir.path()).await.unwrap();
        assert!(leftovers.iter().all(|n| !n.starts_with(TMP_PREFIX)));
    }

    #[tokio::test]
    async fn test_failed_stream_keeps_previous_content() {
        let (dir, store) = store();
        let dest = dir.path().join("1.jpg");
        std::fs::write(&dest, b"old").unwrap();

        let failing: ByteStream = Box::new(FailingReader);
        let inner = store.stream_to_file(&dest, failing).await.unwrap();

        assert!(inner.is_err());
        assert_eq!(std::fs::read(&dest).unwrap(), b"old");
        let leftovers = store.list_entries(dir.path()).await.unwrap();
        assert!(leftovers.iter().all(|n| !n.starts_with(TMP_PREFIX)));
    }

    #[tokio::test]
    async fn test_stream_to_file() {
        let (dir, store) = store();
        let dest = dir.path().join("1.jpg");
        let reader: ByteStream = Box::new(std::io::Cursor::new(b"jpeg-bytes".to_vec()));

        let written = store.stream_to_file(&dest, reader).await.unwrap().unwrap();

        assert_eq!(written, 10);
        assert_eq!(std::fs::read(&dest).unwrap(), b"jpeg-bytes");
    }

    #[tokio::test]
    async fn test_ensure_file_or_absent() {
        let (dir, store) = store();
        let file = dir.path().join("f");
        let sub = dir.path().join("d");
        std::fs::write(&file, b"x").unwrap();
        std::fs::create_dir(&sub).unwrap();

        assert!(store.ensure_file_or_absent(&file).await.is_ok());
        assert!(store
            .ensure_file_or_absent(&dir.path().join("missing"))
            .await
            .is_ok());
        assert!(matches!(
            store.ensure_file_or_absent(&sub).await,
            Err(SyncError::UnexpectedEntryType { expected: "file", .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_is_an_unexpected_entry() {
        let (dir, store) = store();
        let target = dir.path().join("t");
        let link = dir.path().join("l");
        std::fs::write(&target, b"x").unwrap();
        std::os::unix::fs::symlink(&target, &link).unwrap();

        assert!(store.ensure_file_or_absent(&link).await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_relative_resolves() {
        let (dir, store) = store();
        let target = dir.path().join(PHOTOSTREAM_DIR).join("5.jpg");
        let album = dir.path().join(ALBUMS_DIR).join("Rome - 1");
        store.ensure_dir(target.parent().unwrap()).await.unwrap();
        store.ensure_dir(&album).await.unwrap();
        std::fs::write(&target, b"img").unwrap();

        let link = album.join("1_5.jpg");
        store
            .symlink_relative(&target, &link, LinkTarget::File)
            .await
            .unwrap();

        assert_eq!(
            std::fs::read_link(&link).unwrap(),
            PathBuf::from("../../photostream/5.jpg")
        );
        assert_eq!(std::fs::read(&link).unwrap(), b"img");
    }

    #[tokio::test]
    async fn test_set_timestamp_only_when_different() {
        let (dir, store) = store();
        let path = dir.path().join("1.jpg");
        std::fs::write(&path, b"x").unwrap();
        let when = SystemTime::UNIX_EPOCH + Duration::from_secs(1_420_113_600);

        assert!(store.set_timestamp_if_different(&path, when).await.unwrap());
        assert!(!store.set_timestamp_if_different(&path, when).await.unwrap());
        assert_eq!(std::fs::metadata(&path).unwrap().modified().unwrap(), when);
    }

    #[test]
    fn test_unrepresentable_time_is_skipped() {
        let path = Path::new("photostream/1.jpg");

        let skipped = skip_unrepresentable_time(
            path,
            io::Error::new(io::ErrorKind::InvalidInput, "timestamp out of range"),
        );
        assert!(matches!(skipped, Ok(false)));

        let denied = skip_unrepresentable_time(
            path,
            io::Error::new(io::ErrorKind::PermissionDenied, "read-only"),
        );
        assert!(matches!(denied, Err(SyncError::Io { .. })));
    }

    #[tokio::test]
    async fn test_find_content_skips_sidecars_and_longer_ids() {
        let (dir, store) = store();
        let stream = dir.path().join(PHOTOSTREAM_DIR);
        std::fs::create_dir(&stream).unwrap();
        std::fs::write(stream.join("77.mp4.metadata"), b"{}").unwrap();
        std::fs::write(stream.join("778.mov"), b"x").unwrap();

        assert_eq!(store.find_content(&stream, "77").await.unwrap(), None);

        std::fs::write(stream.join("77.mp4"), b"x").unwrap();
        assert_eq!(
            store.find_content(&stream, "77").await.unwrap().as_deref(),
            Some("77.mp4")
        );
    }

    struct FailingReader;

    impl tokio::io::AsyncRead for FailingReader {
        fn poll_read(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            _buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<io::Result<()>> {
            std::task::Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "connection reset",
            )))
        }
    }
}
