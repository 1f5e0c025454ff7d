//! Runs the `drainq` binary and drives it with real termination signals.
#![cfg(unix)]

use std::net::TcpListener;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};

const WORK: Duration = Duration::from_millis(500);

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn spawn_server(port: u16) -> Child {
    Command::new(env!("CARGO_BIN_EXE_drainq"))
        .args(["serve", "--addr", &format!("127.0.0.1:{port}")])
        .args(["--work-ms", &WORK.as_millis().to_string()])
        .env_remove("OTEL_ENDPOINT")
        .env_remove("DRAINQ_UNITS")
        .env_remove("DRAINQ_JOBS_FILE")
        .env_remove("DRAINQ_DRAIN_TIMEOUT_SECS")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .expect("spawn drainq")
}

async fn send(child: &Child, sig: &str) {
    let pid = child.id().expect("child still running").to_string();
    let status = Command::new("kill")
        .args([sig, &pid])
        .status()
        .await
        .unwrap();
    assert!(status.success(), "kill {sig} failed");
}

/// Trigger `name`, retrying until the server is listening.
async fn trigger_when_ready(port: u16, name: &str) -> (Instant, String) {
    let client = reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .build()
        .unwrap();
    let url = format!("http://127.0.0.1:{port}/{name}");
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let sent = Instant::now();
        if let Ok(resp) = client.get(&url).send().await {
            assert_eq!(resp.status(), reqwest::StatusCode::OK);
            return (sent, resp.text().await.unwrap());
        }
        assert!(Instant::now() < deadline, "server never started listening");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn repeated_signals_wait_for_running_work_then_exit_cleanly() {
    let port = free_port();
    let mut child = spawn_server(port);

    let (triggered, body) = trigger_when_ready(port, "alpha").await;
    assert_eq!(body, "job alpha started");

    send(&child, "-TERM").await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    send(&child, "-INT").await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    if triggered.elapsed() < WORK {
        assert!(
            child.try_wait().unwrap().is_none(),
            "exited while work was still running"
        );
    }

    let status = tokio::time::timeout(Duration::from_secs(10), child.wait())
        .await
        .expect("server did not exit after draining")
        .unwrap();
    assert!(status.success(), "unexpected exit status: {status}");
    assert!(
        triggered.elapsed() >= WORK,
        "exited before the triggered work could finish"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn idle_server_exits_promptly_on_sigint() {
    let port = free_port();
    let mut child = spawn_server(port);
    trigger_when_ready(port, "warmup").await;

    // Let the warmup work finish so nothing is outstanding.
    tokio::time::sleep(WORK + Duration::from_millis(200)).await;

    send(&child, "-INT").await;
    let status = tokio::time::timeout(Duration::from_secs(5), child.wait())
        .await
        .expect("idle server did not exit")
        .unwrap();
    assert!(status.success());
}
