//! The filesystem facade: `stat`, `read_dir`, `read_file`.
//!
//! Flat key stores have no directory objects, so `stat` is two-phase: a
//! `head` for the object itself, then a `list` fallback that reports a
//! directory whenever the path has children. An optional one-shot metadata
//! snapshot (the warm cache) turns `stat` into an in-memory lookup after
//! startup; there is no invalidation, stale metadata is accepted for the
//! lifetime of the process.

use std::collections::HashMap;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncSeek, ReadBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use remotefs_object_store::{FileMeta, ObjectStore};

use crate::cache::ContentCache;
use crate::error::FsError;
use crate::jail::PathJail;

/// Runtime configuration for the facade.
#[derive(Debug, Clone, Default)]
pub struct FsConfig {
    /// Local path under which the remote view is exposed. Empty exposes the
    /// whole filesystem namespace (every absolute path maps to a key).
    pub local_root: String,
    /// Content cache directory; defaults to `$TMPDIR/remotefs-cache`.
    pub cache_dir: Option<PathBuf>,
    /// Content cache budget in bytes; 0 disables the quota.
    pub cache_size: u64,
}

/// Translates local-style paths into remote object storage calls.
pub struct RemoteFs {
    store: Arc<dyn ObjectStore>,
    jail: PathJail,
    cache: ContentCache,
    /// Warm metadata snapshot; `None` until `warm_metadata_cache` succeeds.
    meta: RwLock<Option<HashMap<String, FileMeta>>>,
}

impl RemoteFs {
    pub fn new(store: Arc<dyn ObjectStore>, cfg: FsConfig) -> Result<Self, FsError> {
        let cache_dir = cfg
            .cache_dir
            .unwrap_or_else(|| std::env::temp_dir().join("remotefs-cache"));
        let cache = ContentCache::new(cache_dir, cfg.cache_size)?;
        Ok(Self {
            store,
            jail: PathJail::new(&cfg.local_root),
            cache,
            meta: RwLock::new(None),
        })
    }

    /// The canonical local root presented to users (`"/"` when unset).
    pub fn local_root(&self) -> &str {
        self.jail.display_root()
    }

    /// Metadata for a local path, `os.stat` style.
    pub async fn stat(&self, local: &str) -> Result<FileMeta, FsError> {
        let rel = self.jail.sanitize(local)?;
        if rel.is_empty() {
            return Ok(FileMeta::dir(""));
        }
        if let Some(meta) = self.cached_meta(&rel) {
            return Ok(meta);
        }
        let abs = self.jail.join_local(&rel);
        match self.store.head(&rel).await {
            Ok(meta) => return Ok(meta),
            Err(e) if !e.is_not_found() => return Err(e.into()),
            Err(_) => {}
        }
        // No such object; a non-empty listing means the path is a directory.
        match self.store.list(&rel).await {
            Ok(entries) if !entries.is_empty() => Ok(FileMeta::dir(rel)),
            Ok(_) => Err(FsError::NotFound(abs)),
            Err(e) if e.is_not_found() => Err(FsError::NotFound(abs)),
            Err(e) => Err(e.into()),
        }
    }

    /// Direct children of a local directory path.
    ///
    /// The root reports its children even when empty; anywhere else an empty
    /// listing is indistinguishable from a missing path and reports NotFound.
    pub async fn read_dir(&self, local: &str) -> Result<Vec<FileMeta>, FsError> {
        let rel = self.jail.sanitize(local)?;
        match self.store.list(&rel).await {
            Ok(items) => {
                if !rel.is_empty() && items.is_empty() {
                    Err(FsError::NotFound(self.jail.join_local(&rel)))
                } else {
                    Ok(items)
                }
            }
            Err(e) if e.is_not_found() || !rel.is_empty() => {
                Err(FsError::NotFound(self.jail.join_local(&rel)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Open a local file path for reading, downloading it into the content
    /// cache if needed. The returned handle owns its descriptor and sees the
    /// fully populated file.
    pub async fn read_file(&self, local: &str) -> Result<ReadHandle, FsError> {
        let rel = self.jail.sanitize(local)?;
        if rel.is_empty() {
            return Err(FsError::IsADirectory(self.jail.join_local(&rel)));
        }
        let abs = self.jail.join_local(&rel);

        let store = Arc::clone(&self.store);
        let key = rel.clone();
        let result = self
            .cache
            .load_or_create(&rel, move |mut file| async move {
                let written = store.download(&key, &mut file).await?;
                file.sync_all().await?;
                Ok(written)
            })
            .await;
        let path = match result {
            Ok(path) => path,
            Err(e) if e.is_not_found() => return Err(FsError::NotFound(abs)),
            Err(e) => return Err(e),
        };

        let file = tokio::fs::File::open(&path).await?;
        self.cache.touch(&rel);
        Ok(ReadHandle { file })
    }

    /// Walk the entire remote namespace and install a metadata snapshot for
    /// fast `stat`. The snapshot is installed atomically: lookups observe
    /// either the pre-warm empty state or the complete tree. A store error
    /// aborts the walk and installs nothing.
    pub async fn warm_metadata_cache(&self, cancel: &CancellationToken) -> Result<(), FsError> {
        let mut entries: HashMap<String, FileMeta> = HashMap::new();
        entries.insert(String::new(), FileMeta::dir(""));

        let mut pending = vec![String::new()];
        while let Some(dir) = pending.pop() {
            if cancel.is_cancelled() {
                return Err(FsError::Cancelled);
            }
            let items = match self.store.list(&dir).await {
                Ok(items) => items,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e.into()),
            };
            for item in items {
                if item.is_dir {
                    pending.push(item.path.clone());
                }
                entries.insert(item.path.clone(), item);
            }
        }

        info!(entries = entries.len(), "metadata cache warmed");
        *self.meta.write().unwrap() = Some(entries);
        Ok(())
    }

    fn cached_meta(&self, rel: &str) -> Option<FileMeta> {
        let meta = self.meta.read().unwrap();
        let found = meta.as_ref()?.get(rel).cloned();
        if found.is_some() {
            debug!(rel, "stat served from warm cache");
        }
        found
    }
}

/// Seekable read handle over a cached file. Dropping it releases the
/// descriptor; the cache entry itself stays resident.
#[derive(Debug)]
pub struct ReadHandle {
    file: tokio::fs::File,
}

impl ReadHandle {
    pub fn into_inner(self) -> tokio::fs::File {
        self.file
    }
}

impl AsyncRead for ReadHandle {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.file).poll_read(cx, buf)
    }
}

impl AsyncSeek for ReadHandle {
    fn start_seek(mut self: Pin<&mut Self>, position: std::io::SeekFrom) -> std::io::Result<()> {
        Pin::new(&mut self.file).start_seek(position)
    }

    fn poll_complete(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<u64>> {
        Pin::new(&mut self.file).poll_complete(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};

    use remotefs_object_store::StoreError;

    /// Scriptable in-memory store mirroring the delimiter semantics the
    /// facade depends on.
    #[derive(Default)]
    struct FakeStore {
        head: HashMap<String, FileMeta>,
        listing: HashMap<String, Vec<FileMeta>>,
        files: HashMap<String, Vec<u8>>,
        /// Listing this key fails with an opaque backend error.
        poison: Option<String>,
        head_calls: AtomicUsize,
        download_calls: AtomicUsize,
    }

    impl FakeStore {
        fn with_file(mut self, key: &str, body: &[u8]) -> Self {
            self.head.insert(
                key.to_string(),
                FileMeta {
                    path: key.to_string(),
                    size: body.len() as u64,
                    etag: format!("\"{key}\""),
                    last_modified: None,
                    is_dir: false,
                },
            );
            self.files.insert(key.to_string(), body.to_vec());
            self
        }

        fn with_listing(mut self, key: &str, entries: Vec<FileMeta>) -> Self {
            self.listing.insert(key.to_string(), entries);
            self
        }
    }

    #[async_trait::async_trait]
    impl ObjectStore for FakeStore {
        async fn head(&self, key: &str) -> Result<FileMeta, StoreError> {
            self.head_calls.fetch_add(1, Ordering::SeqCst);
            self.head
                .get(key)
                .cloned()
                .ok_or_else(|| StoreError::NotFound(key.to_string()))
        }

        async fn list(&self, key: &str) -> Result<Vec<FileMeta>, StoreError> {
            if self.poison.as_deref() == Some(key) {
                return Err(StoreError::Backend("listing failed".into()));
            }
            Ok(self.listing.get(key).cloned().unwrap_or_default())
        }

        async fn download(
            &self,
            key: &str,
            dst: &mut (dyn AsyncWrite + Send + Unpin),
        ) -> Result<u64, StoreError> {
            self.download_calls.fetch_add(1, Ordering::SeqCst);
            let body = self
                .files
                .get(key)
                .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
            dst.write_all(body).await?;
            dst.flush().await?;
            Ok(body.len() as u64)
        }
    }

    fn file_meta(path: &str, size: u64) -> FileMeta {
        FileMeta {
            path: path.to_string(),
            size,
            etag: String::new(),
            last_modified: None,
            is_dir: false,
        }
    }

    fn remote_fs(store: FakeStore, dir: &tempfile::TempDir) -> (RemoteFs, Arc<FakeStore>) {
        let store = Arc::new(store);
        let fs = RemoteFs::new(
            store.clone(),
            FsConfig {
                local_root: "/data".to_string(),
                cache_dir: Some(dir.path().join("cache")),
                cache_size: 1 << 20,
            },
        )
        .unwrap();
        (fs, store)
    }

    #[tokio::test]
    async fn stat_root_is_synthetic_directory() {
        let dir = tempfile::tempdir().unwrap();
        let (fs, store) = remote_fs(FakeStore::default(), &dir);

        let meta = fs.stat("/data").await.unwrap();
        assert!(meta.is_dir);
        assert_eq!(meta.path, "");
        assert_eq!(meta.size, 0);
        assert_eq!(store.head_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stat_detects_directory_via_listing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FakeStore::default()
            .with_listing("docs", vec![file_meta("docs/report.txt", 11)]);
        let (fs, _) = remote_fs(store, &dir);

        let meta = fs.stat("/data/docs").await.unwrap();
        assert!(meta.is_dir);
        assert_eq!(meta.path, "docs");
        assert_eq!(meta.size, 0);
    }

    #[tokio::test]
    async fn stat_missing_path_renders_local_path() {
        let dir = tempfile::tempdir().unwrap();
        let (fs, _) = remote_fs(FakeStore::default(), &dir);

        let err = fs.stat("/data/missing.txt").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(
            err.to_string(),
            "/data/missing.txt: No such file or directory"
        );
    }

    #[tokio::test]
    async fn stat_outside_root_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (fs, store) = remote_fs(FakeStore::default(), &dir);

        assert!(matches!(
            fs.stat("/data-mirror/file").await,
            Err(FsError::OutsideRoot { .. })
        ));
        assert!(matches!(
            fs.stat("/data/../etc/passwd").await,
            Err(FsError::OutsideRoot { .. })
        ));
        assert_eq!(store.head_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn warm_cache_serves_stat_without_head() {
        let dir = tempfile::tempdir().unwrap();
        let store = FakeStore::default()
            .with_listing(
                "",
                vec![FileMeta::dir("docs"), file_meta("readme.txt", 10)],
            )
            .with_listing(
                "docs",
                vec![file_meta("docs/report.txt", 42), FileMeta::dir("docs/archive")],
            )
            .with_listing("docs/archive", vec![file_meta("docs/archive/old.txt", 5)]);
        let (fs, store) = remote_fs(store, &dir);

        fs.warm_metadata_cache(&CancellationToken::new())
            .await
            .unwrap();

        let meta = fs.stat("/data/docs/report.txt").await.unwrap();
        assert_eq!(meta.size, 42);
        let nested = fs.stat("/data/docs/archive/old.txt").await.unwrap();
        assert_eq!(nested.size, 5);
        assert_eq!(store.head_calls.load(Ordering::SeqCst), 0);

        // Stat twice returns equal metadata.
        let again = fs.stat("/data/docs/report.txt").await.unwrap();
        assert_eq!(meta, again);
    }

    #[tokio::test]
    async fn warm_cache_error_installs_no_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FakeStore::default()
            .with_listing("", vec![FileMeta::dir("docs")]);
        store.poison = Some("docs".to_string());
        let (fs, _) = remote_fs(store, &dir);

        assert!(fs
            .warm_metadata_cache(&CancellationToken::new())
            .await
            .is_err());
        assert!(fs.meta.read().unwrap().is_none());
    }

    #[tokio::test]
    async fn warm_cache_honors_cancellation() {
        let dir = tempfile::tempdir().unwrap();
        let (fs, _) = remote_fs(FakeStore::default(), &dir);

        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(
            fs.warm_metadata_cache(&cancel).await,
            Err(FsError::Cancelled)
        ));
        assert!(fs.meta.read().unwrap().is_none());
    }

    #[tokio::test]
    async fn read_dir_root_may_be_empty() {
        let dir = tempfile::tempdir().unwrap();
        let (fs, _) = remote_fs(FakeStore::default(), &dir);
        assert!(fs.read_dir("/data").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn read_dir_missing_directory_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let (fs, _) = remote_fs(FakeStore::default(), &dir);
        let err = fs.read_dir("/data/ghost").await.unwrap_err();
        assert_eq!(err.to_string(), "/data/ghost: No such file or directory");
    }

    #[tokio::test]
    async fn read_file_downloads_once_and_reuses_cache() {
        let dir = tempfile::tempdir().unwrap();
        let store = FakeStore::default().with_file("docs/report.txt", b"hello world");
        let (fs, store) = remote_fs(store, &dir);

        for _ in 0..2 {
            let mut handle = fs.read_file("/data/docs/report.txt").await.unwrap();
            let mut body = String::new();
            handle.read_to_string(&mut body).await.unwrap();
            assert_eq!(body, "hello world");
        }
        assert_eq!(store.download_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn read_file_rejects_root() {
        let dir = tempfile::tempdir().unwrap();
        let (fs, _) = remote_fs(FakeStore::default(), &dir);
        assert!(matches!(
            fs.read_file("/data").await,
            Err(FsError::IsADirectory(_))
        ));
    }

    #[tokio::test]
    async fn read_file_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let (fs, _) = remote_fs(FakeStore::default(), &dir);
        let err = fs.read_file("/data/ghost.txt").await.unwrap_err();
        assert_eq!(err.to_string(), "/data/ghost.txt: No such file or directory");
    }

    #[tokio::test]
    async fn read_handle_is_seekable() {
        use tokio::io::AsyncSeekExt;

        let dir = tempfile::tempdir().unwrap();
        let store = FakeStore::default().with_file("docs/report.txt", b"hello world");
        let (fs, _) = remote_fs(store, &dir);

        let mut handle = fs.read_file("/data/docs/report.txt").await.unwrap();
        handle.seek(std::io::SeekFrom::Start(6)).await.unwrap();
        let mut tail = String::new();
        handle.read_to_string(&mut tail).await.unwrap();
        assert_eq!(tail, "world");
    }
}
