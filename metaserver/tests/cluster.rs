use chrono::Utc;
use chunkserver::{
    chunk_manager::{ChunkManager, StoreSettings},
    meta_link::MetaLink,
    service::ChunkService,
};
use metaserver::{chunk_link::ChunkLink, metadata_index::MetadataIndex, service::MetaService};
use protocol::{
    envelope::{Message, Response},
    frame::{read_frame, recv_json, send_json},
    types::FileEntrySnapshot,
};
use serde_json::Value;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{
    io::AsyncWriteExt,
    net::{TcpListener, TcpStream},
    sync::Mutex,
};
use utilities::result::{DfsError, Result};

struct Cluster {
    meta_addr: SocketAddr,
    chunk_addr: SocketAddr,
    index: Arc<Mutex<MetadataIndex>>,
}

/// Binds both servers on ephemeral ports, wires them to each other and leaves
/// them serving in the background.
async fn start_cluster(settings: StoreSettings) -> Cluster {
    let meta_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let chunk_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let meta_addr = meta_listener.local_addr().unwrap();
    let chunk_addr = chunk_listener.local_addr().unwrap();

    let nodes = settings.nodes;
    let manager = Arc::new(ChunkManager::new(settings).unwrap());
    let chunk_service = ChunkService::from_listener(
        chunk_listener,
        manager,
        MetaLink::new(meta_addr.to_string()),
        Duration::from_secs(5),
    );
    tokio::spawn(async move {
        let _ = chunk_service.start_and_accept().await;
    });

    let index = Arc::new(Mutex::new(MetadataIndex::new(nodes)));
    let meta_service = MetaService::from_listener(
        meta_listener,
        index.clone(),
        ChunkLink::new(chunk_addr.to_string()),
        Duration::from_secs(5),
    );
    meta_service.prime_capacity().await.unwrap();
    tokio::spawn(async move {
        let _ = meta_service.start_and_accept().await;
    });

    Cluster {
        meta_addr,
        chunk_addr,
        index,
    }
}

fn default_settings() -> StoreSettings {
    StoreSettings {
        nodes: 4,
        chunk_size: 64,
        nodes_per_rack: 2,
        node_capacity: 1024,
    }
}

async fn meta_call(cluster: &Cluster, command: &str, args: Vec<String>) -> Result<Value> {
    let mut stream = TcpStream::connect(cluster.meta_addr).await?;
    send_json(&mut stream, &Message::new(command, args)).await?;
    let response: Response = recv_json(&mut stream).await?;
    response.into_result()
}

async fn write_file(cluster: &Cluster, name: &str, data: &[u8]) -> Result<Value> {
    let value = meta_call(
        cluster,
        "write",
        vec![name.to_owned(), data.len().to_string()],
    )
    .await?;
    let snapshot: FileEntrySnapshot = serde_json::from_value(value)?;
    let mut stream = TcpStream::connect(cluster.chunk_addr).await?;
    let msg = Message::new("write", vec![name.to_owned(), data.len().to_string()]);
    send_json(&mut stream, &msg).await?;
    send_json(&mut stream, &snapshot).await?;
    stream.write_all(data).await?;
    stream.flush().await?;
    let response: Response = recv_json(&mut stream).await?;
    response.into_result()
}

async fn read_file(cluster: &Cluster, name: &str) -> Result<Vec<u8>> {
    let value = meta_call(cluster, "read", vec![name.to_owned()]).await?;
    let snapshot: FileEntrySnapshot = serde_json::from_value(value)?;
    let mut stream = TcpStream::connect(cluster.chunk_addr).await?;
    send_json(&mut stream, &Message::new("read", vec![name.to_owned()])).await?;
    send_json(&mut stream, &snapshot).await?;
    let response: Response = recv_json(&mut stream).await?;
    response.into_result()?;
    read_frame(&mut stream).await
}

#[tokio::test]
async fn write_then_read_round_trip() {
    let cluster = start_cluster(default_settings()).await;
    write_file(&cluster, "greet.txt", b"hello").await.unwrap();

    let value = meta_call(&cluster, "read", vec!["greet.txt".to_owned()])
        .await
        .unwrap();
    let snapshot: FileEntrySnapshot = serde_json::from_value(value).unwrap();
    assert_eq!(snapshot.chunks.len(), 1);
    let mut nodes: Vec<usize> = snapshot.chunks[0].copies.iter().map(|c| c.node).collect();
    assert!(nodes.iter().all(|&id| id < 4));
    nodes.sort();
    nodes.dedup();
    assert_eq!(nodes.len(), 3);

    let stat = meta_call(&cluster, "stat", vec!["greet.txt".to_owned()])
        .await
        .unwrap();
    assert_eq!(stat["size"], 5);

    assert_eq!(read_file(&cluster, "greet.txt").await.unwrap(), b"hello");

    // the capacity cache reflects the three replicas just written
    let capacity = meta_call(&cluster, "diskcapacity", vec![]).await.unwrap();
    assert_eq!(capacity, serde_json::json!(4 * 1024 - 3 * 5));
}

#[tokio::test]
async fn stopnode_leaves_the_file_readable() {
    let cluster = start_cluster(default_settings()).await;
    write_file(&cluster, "greet.txt", b"hello").await.unwrap();

    let stopped = meta_call(&cluster, "stopnode", vec![]).await.unwrap();
    let stopped = stopped.as_u64().unwrap();
    assert!(stopped < 4);

    assert_eq!(read_file(&cluster, "greet.txt").await.unwrap(), b"hello");
}

#[tokio::test]
async fn rename_then_read_under_the_new_name() {
    let cluster = start_cluster(default_settings()).await;
    write_file(&cluster, "a.txt", b"payload").await.unwrap();

    meta_call(
        &cluster,
        "rename",
        vec!["a.txt".to_owned(), "b.txt".to_owned()],
    )
    .await
    .unwrap();

    assert_eq!(read_file(&cluster, "b.txt").await.unwrap(), b"payload");
    assert!(matches!(
        read_file(&cluster, "a.txt").await,
        Err(DfsError::NotFound(_))
    ));
}

#[tokio::test]
async fn rewrite_fully_replaces_the_content() {
    let cluster = start_cluster(default_settings()).await;
    write_file(&cluster, "f.txt", b"x").await.unwrap();
    write_file(&cluster, "f.txt", b"y").await.unwrap();

    assert_eq!(read_file(&cluster, "f.txt").await.unwrap(), b"y");
    let size = meta_call(&cluster, "filesize", vec!["f.txt".to_owned()])
        .await
        .unwrap();
    assert_eq!(size, serde_json::json!(1));
}

#[tokio::test]
async fn oversize_write_is_rejected_and_state_unchanged() {
    let cluster = start_cluster(StoreSettings {
        nodes: 4,
        chunk_size: 16,
        nodes_per_rack: 2,
        node_capacity: 8,
    })
    .await;
    let before = meta_call(&cluster, "diskcapacity", vec![]).await.unwrap();

    let err = write_file(&cluster, "huge.bin", &[0u8; 4096]).await.unwrap_err();
    assert!(matches!(err, DfsError::NoCapacity(_)));

    let names = meta_call(&cluster, "ls", vec![]).await.unwrap();
    assert_eq!(names, serde_json::json!(Vec::<String>::new()));
    let after = meta_call(&cluster, "diskcapacity", vec![]).await.unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn missing_filesize_returns_the_sentinel() {
    let cluster = start_cluster(default_settings()).await;
    let size = meta_call(&cluster, "filesize", vec!["missing.txt".to_owned()])
        .await
        .unwrap();
    assert_eq!(size, serde_json::json!(-1));
}

#[tokio::test]
async fn recoverable_errors_keep_the_connection_open() {
    let cluster = start_cluster(default_settings()).await;
    let mut stream = TcpStream::connect(cluster.meta_addr).await.unwrap();

    send_json(&mut stream, &Message::new("bogus", vec![]))
        .await
        .unwrap();
    let response: Response = recv_json(&mut stream).await.unwrap();
    assert!(!response.is_ok());

    // same connection still serves the next command
    send_json(&mut stream, &Message::new("ls", vec![]))
        .await
        .unwrap();
    let response: Response = recv_json(&mut stream).await.unwrap();
    assert!(response.is_ok());
}

#[tokio::test]
async fn nodestat_reports_every_node() {
    let cluster = start_cluster(default_settings()).await;
    let value = meta_call(&cluster, "nodestat", vec![]).await.unwrap();
    let stat = value.as_str().unwrap();
    for id in 0..4 {
        assert!(stat.contains(&format!("node {id}:")), "missing node {id} in:\n{stat}");
    }
    let single = meta_call(&cluster, "nodestat", vec!["2".to_owned()])
        .await
        .unwrap();
    assert!(single.as_str().unwrap().starts_with("node 2:"));
}

#[tokio::test]
async fn write_needing_more_than_replicated_space_is_rejected() {
    let cluster = start_cluster(StoreSettings {
        nodes: 4,
        chunk_size: 16,
        nodes_per_rack: 2,
        node_capacity: 8,
    })
    .await;

    // 20 bytes fit the 32 free bytes raw but not three times over
    let err = write_file(&cluster, "doomed.bin", &[0u8; 20])
        .await
        .unwrap_err();
    assert!(matches!(err, DfsError::NoCapacity(_)));

    let names = meta_call(&cluster, "ls", vec![]).await.unwrap();
    assert_eq!(names, serde_json::json!(Vec::<String>::new()));
}

#[tokio::test]
async fn stalled_write_session_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let manager = Arc::new(ChunkManager::new(default_settings()).unwrap());
    let service = ChunkService::from_listener(
        listener,
        manager,
        MetaLink::new("127.0.0.1:9".to_owned()),
        Duration::from_millis(100),
    );
    tokio::spawn(async move {
        let _ = service.start_and_accept().await;
    });

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let msg = Message::new("write", vec!["stall.bin".to_owned(), "64".to_owned()]);
    send_json(&mut stream, &msg).await.unwrap();
    let snapshot = FileEntrySnapshot {
        name: "stall.bin".to_owned(),
        size: 0,
        created_date: Utc::now(),
        chunks: vec![],
    };
    send_json(&mut stream, &snapshot).await.unwrap();
    // announce 64 payload bytes, then send nothing
    let response: Response = recv_json(&mut stream).await.unwrap();
    assert!(matches!(
        response.into_result(),
        Err(DfsError::Internal(_))
    ));
}

#[tokio::test]
async fn unconfirmed_kill_leaves_copies_valid() {
    let cluster = start_cluster(default_settings()).await;
    write_file(&cluster, "keep.txt", b"hello").await.unwrap();

    // a metadata server whose chunk link points nowhere can never confirm
    // the kill, so the shared index must stay untouched
    let lone_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let lone_addr = lone_listener.local_addr().unwrap();
    let lone_meta = MetaService::from_listener(
        lone_listener,
        cluster.index.clone(),
        ChunkLink::new("127.0.0.1:9".to_owned()),
        Duration::from_secs(5),
    );
    tokio::spawn(async move {
        let _ = lone_meta.start_and_accept().await;
    });

    let mut stream = TcpStream::connect(lone_addr).await.unwrap();
    send_json(&mut stream, &Message::new("stopnode", vec![]))
        .await
        .unwrap();
    let response: Response = recv_json(&mut stream).await.unwrap();
    assert!(response.into_result().is_err());

    let value = meta_call(&cluster, "read", vec!["keep.txt".to_owned()])
        .await
        .unwrap();
    let snapshot: FileEntrySnapshot = serde_json::from_value(value).unwrap();
    assert!(snapshot.chunks[0].copies.iter().all(|c| c.valid));
}
