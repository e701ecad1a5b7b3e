//! End-to-end tests for the IPC endpoints: an in-memory object store behind
//! the real router, driven over loopback HTTP.

use std::sync::Arc;

use bytes::Bytes;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore as _, PutPayload};
use tokio_util::sync::CancellationToken;

use remotefs::{FsConfig, RemoteFs};
use remotefs_daemon::http_server::posix::PosixEntry;
use remotefs_daemon::http_server::{router, IpcServer};
use remotefs_object_store::BucketStore;

struct Fixture {
    base_url: String,
    _cache_dir: tempfile::TempDir,
}

async fn spawn_server(objects: &[(&str, &str)], warm: bool) -> Fixture {
    let backend = Arc::new(InMemory::new());
    for (key, body) in objects {
        backend
            .put(
                &ObjectPath::from(*key),
                PutPayload::from(Bytes::copy_from_slice(body.as_bytes())),
            )
            .await
            .unwrap();
    }
    let store = BucketStore::with_backend(backend, "");

    let cache_dir = tempfile::tempdir().unwrap();
    let fs = Arc::new(
        RemoteFs::new(
            Arc::new(store),
            FsConfig {
                local_root: "/data".to_string(),
                cache_dir: Some(cache_dir.path().join("cache")),
                cache_size: 1 << 20,
            },
        )
        .unwrap(),
    );
    if warm {
        fs.warm_metadata_cache(&CancellationToken::new())
            .await
            .unwrap();
    }

    let app = router(Arc::new(IpcServer::new(fs)));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Fixture {
        base_url: format!("http://{addr}"),
        _cache_dir: cache_dir,
    }
}

#[tokio::test]
async fn stat_returns_posix_entry() {
    let fx = spawn_server(&[("docs/report.txt", "hello world")], false).await;

    let resp = reqwest::get(format!("{}/stat?path=/data/docs/report.txt", fx.base_url))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let entry: PosixEntry = resp.json().await.unwrap();
    assert_eq!(entry.path, "docs/report.txt");
    assert_eq!(entry.size, 11);
    assert!(!entry.is_dir);
    assert_eq!(entry.mode, 0o100440);
    assert_eq!(entry.uid, nix::unistd::Uid::effective().as_raw());
}

#[tokio::test]
async fn stat_of_flat_key_directory_uses_list_fallback() {
    let fx = spawn_server(&[("docs/report.txt", "hello world")], false).await;

    let resp = reqwest::get(format!("{}/stat?path=/data/docs", fx.base_url))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let entry: PosixEntry = resp.json().await.unwrap();
    assert_eq!(entry.path, "docs");
    assert!(entry.is_dir);
    assert_eq!(entry.size, 0);
    assert_eq!(entry.mode, 0o040550);
}

#[tokio::test]
async fn stat_missing_is_404_with_posix_message() {
    let fx = spawn_server(&[], false).await;

    let resp = reqwest::get(format!("{}/stat?path=/data/missing.txt", fx.base_url))
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(
        body["error"],
        "/data/missing.txt: No such file or directory"
    );
}

#[tokio::test]
async fn ls_lists_direct_children() {
    let fx = spawn_server(
        &[
            ("docs/report.txt", "hello world"),
            ("docs/archive/old.txt", "old"),
        ],
        true,
    )
    .await;

    let resp = reqwest::get(format!("{}/ls?path=/data/docs", fx.base_url))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let entries: Vec<PosixEntry> = resp.json().await.unwrap();
    let names: Vec<(&str, bool)> = entries
        .iter()
        .map(|e| (e.path.as_str(), e.is_dir))
        .collect();
    assert_eq!(
        names,
        vec![("docs/archive", true), ("docs/report.txt", false)]
    );
}

#[tokio::test]
async fn ls_empty_root_is_empty_array() {
    let fx = spawn_server(&[], false).await;

    let resp = reqwest::get(format!("{}/ls?path=/data", fx.base_url))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "[]");
}

#[tokio::test]
async fn cat_round_trip() {
    let fx = spawn_server(&[("docs/report.txt", "hello world")], false).await;

    for _ in 0..2 {
        let resp = reqwest::get(format!("{}/cat?path=/data/docs/report.txt", fx.base_url))
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(
            resp.headers()["content-type"],
            "application/octet-stream"
        );
        assert_eq!(resp.text().await.unwrap(), "hello world");
    }
}

#[tokio::test]
async fn cat_without_path_is_400() {
    let fx = spawn_server(&[], false).await;

    let resp = reqwest::get(format!("{}/cat", fx.base_url)).await.unwrap();
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "path query parameter is required");
}

#[tokio::test]
async fn cat_missing_is_404() {
    let fx = spawn_server(&[], false).await;

    let resp = reqwest::get(format!("{}/cat?path=/data/ghost.bin", fx.base_url))
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn stat_outside_jail_is_500_not_leaked() {
    let fx = spawn_server(&[("docs/report.txt", "x")], false).await;

    let resp = reqwest::get(format!("{}/stat?path=/etc/passwd", fx.base_url))
        .await
        .unwrap();
    assert_eq!(resp.status(), 500);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("outside of"));
}

#[tokio::test]
async fn unix_socket_bind_replaces_stale_socket_and_drains() {
    use remotefs_daemon::http_server::{serve, Transport};

    let backend = Arc::new(InMemory::new());
    let store = BucketStore::with_backend(backend, "");
    let cache_dir = tempfile::tempdir().unwrap();
    let fs = Arc::new(
        RemoteFs::new(
            Arc::new(store),
            FsConfig {
                local_root: "/data".to_string(),
                cache_dir: Some(cache_dir.path().join("cache")),
                cache_size: 1 << 20,
            },
        )
        .unwrap(),
    );

    let socket_dir = tempfile::tempdir().unwrap();
    let socket_path = socket_dir.path().join("ipc").join("remotefs.sock");
    // Simulate a stale socket left behind by a previous run.
    std::fs::create_dir_all(socket_path.parent().unwrap()).unwrap();
    std::fs::write(&socket_path, b"").unwrap();

    let cancel = CancellationToken::new();
    let task = tokio::spawn(serve(
        Arc::new(IpcServer::new(fs)),
        Transport::Unix(socket_path.clone()),
        cancel.clone(),
    ));

    // Wait for the listener to come up, then verify it accepts connections.
    for _ in 0..50 {
        if tokio::net::UnixStream::connect(&socket_path).await.is_ok() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    tokio::net::UnixStream::connect(&socket_path).await.unwrap();

    cancel.cancel();
    task.await.unwrap().unwrap();
}
