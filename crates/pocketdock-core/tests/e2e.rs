//! End-to-end scenarios against a live container engine.
//!
//! These need a reachable Podman or Docker socket and the
//! `pocketdock/minimal` image, so they are `#[ignore]`d by default:
//!
//! ```text
//! cargo test -p pocketdock-core --test e2e -- --ignored
//! ```

use pocketdock_core::{
    create_new_container, list_containers, Container, CreateOptions, RunOptions,
};
use std::time::Duration;

async fn sandbox() -> Container {
    create_new_container(CreateOptions::default())
        .await
        .expect("engine reachable and image present")
}

fn timeout_opts(secs: u64) -> RunOptions {
    RunOptions {
        timeout: Some(Duration::from_secs(secs)),
        ..Default::default()
    }
}

#[tokio::test]
#[ignore = "requires a running container engine"]
async fn e2e_blocking_run_and_shutdown() {
    let container = sandbox().await;
    let name = container.name().to_string();

    let result = container.run("echo hello", RunOptions::default()).await.unwrap();
    assert_eq!(result.stdout, "hello\n");
    assert_eq!(result.stderr, "");
    assert_eq!(result.exit_code, 0);
    assert!(result.ok());
    assert!(result.duration_ms > 0.0);

    container.shutdown().await.unwrap();

    let listed = list_containers(None, None).await.unwrap();
    assert!(listed.iter().all(|item| item.name != name));
}

#[tokio::test]
#[ignore = "requires a running container engine"]
async fn e2e_timeout_leaves_container_usable() {
    let container = sandbox().await;

    let started = std::time::Instant::now();
    let result = container.run("sleep 10", timeout_opts(1)).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(result.timed_out);
    assert_eq!(result.exit_code, -1);
    assert!(!result.ok());

    let follow_up = container.run("echo ok", RunOptions::default()).await.unwrap();
    assert_eq!(follow_up.stdout, "ok\n");

    container.shutdown().await.unwrap();
}

#[tokio::test]
#[ignore = "requires a running container engine"]
async fn e2e_detached_process_lifecycle() {
    let container = sandbox().await;

    let process = container
        .run_detached(
            "for i in 1 2 3; do echo $i; sleep 0.1; done",
            RunOptions::default(),
        )
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(process.peek().stdout.contains("1\n"));

    let result = process.wait(Some(Duration::from_secs(10))).await.unwrap();
    assert_eq!(result.exit_code, 0);
    assert!(!process.is_running());
    assert_eq!(process.read().stdout, "1\n2\n3\n");

    // read then peek on a quiescent process: both empty.
    assert!(process.read().stdout.is_empty());
    assert!(process.peek().stdout.is_empty());

    container.shutdown().await.unwrap();
}

#[tokio::test]
#[ignore = "requires a running container engine"]
async fn e2e_streaming_run() {
    let container = sandbox().await;

    let mut stream = container
        .run_stream("echo first; echo second", RunOptions::default())
        .await
        .unwrap();
    let mut chunks = String::new();
    while let Some(chunk) = stream.next_chunk().await.unwrap() {
        chunks.push_str(&chunk.data);
    }
    assert_eq!(chunks, "first\nsecond\n");
    let result = stream.result().unwrap();
    assert_eq!(result.exit_code, 0);

    container.shutdown().await.unwrap();
}

#[tokio::test]
#[ignore = "requires a running container engine"]
async fn e2e_session_shares_shell_state() {
    let container = sandbox().await;
    let session = container.session().await.unwrap();

    session.send("cd /tmp").await.unwrap();
    let result = session
        .send_and_wait("pwd", Some(Duration::from_secs(10)))
        .await
        .unwrap();
    assert_eq!(result.stdout.trim(), "/tmp");
    assert_eq!(result.exit_code, 0);

    // Output containing the sentinel prefix must not confuse matching.
    let echoed = session
        .send_and_wait("echo __PD_not_a_sentinel__", Some(Duration::from_secs(10)))
        .await
        .unwrap();
    assert!(echoed.stdout.contains("__PD_not_a_sentinel__"));
    assert_eq!(echoed.exit_code, 0);

    session.close().await.unwrap();
    assert!(session.send("anything").await.is_err());

    container.shutdown().await.unwrap();
}

#[tokio::test]
#[ignore = "requires a running container engine"]
async fn e2e_file_roundtrip_and_mem_limit() {
    let container = create_new_container(CreateOptions {
        mem_limit: Some("64m".to_string()),
        ..Default::default()
    })
    .await
    .unwrap();

    let payload: Vec<u8> = (0..=255).cycle().take(64 * 1024).collect();
    container.write_file("/t.bin", &payload).await.unwrap();
    assert_eq!(container.read_file("/t.bin").await.unwrap(), payload);

    let info = container.info().await.unwrap();
    assert_eq!(info.memory_limit_bytes, 64 * 1024 * 1024);

    container.shutdown().await.unwrap();
}

#[tokio::test]
#[ignore = "requires a running container engine"]
async fn e2e_sibling_containers_run_in_parallel() {
    let a = sandbox().await;
    let b = sandbox().await;

    let started = std::time::Instant::now();
    let (ra, rb) = tokio::join!(
        a.run("sleep 2 && echo a", timeout_opts(10)),
        b.run("sleep 2 && echo b", timeout_opts(10)),
    );
    assert!(started.elapsed() < Duration::from_secs(4));
    assert_eq!(ra.unwrap().stdout, "a\n");
    assert_eq!(rb.unwrap().stdout, "b\n");

    a.shutdown().await.unwrap();
    b.shutdown().await.unwrap();
}

#[tokio::test]
#[ignore = "requires a running container engine"]
async fn e2e_snapshot_preserves_written_files() {
    let container = sandbox().await;
    container.write_file("/kept.txt", "survives\n").await.unwrap();

    let image = format!("pocketdock-test-snap-{}", pocketdock_core::generate_name());
    container.snapshot(&image).await.unwrap();
    container.shutdown().await.unwrap();

    let restored = create_new_container(CreateOptions {
        image: Some(image),
        ..Default::default()
    })
    .await
    .unwrap();
    assert_eq!(
        restored.read_file("/kept.txt").await.unwrap(),
        b"survives\n"
    );
    restored.shutdown().await.unwrap();
}

#[tokio::test]
#[ignore = "requires a running container engine"]
async fn e2e_externally_removed_container_is_gone() {
    let container = sandbox().await;

    // Remove the container out from under the handle.
    pocketdock_core::destroy_container(container.name(), None)
        .await
        .unwrap();

    let err = container.run("echo hi", RunOptions::default()).await.unwrap_err();
    assert!(matches!(err, pocketdock_core::Error::ContainerGone(_)));
}
