//! End-to-end: a real watchdog against real `sleep` processes.

#![cfg(unix)]

use std::os::unix::process::ExitStatusExt;
use std::process::Stdio;
use std::time::Duration;

use deadhand_core::{ChildOptions, Pid, Producer, Settings, Watchdog};
use nix::sys::signal::Signal;
use tokio::process::{Child, Command};
use tokio::time::timeout;

fn fast_settings() -> Settings {
    Settings {
        poll_interval_ms: 50,
        read_interval_ms: 10,
        grace_period_ms: 5_000,
        io_retry_interval_ms: 10,
        io_retry_window_ms: 50,
        flush_retry_delay_ms: 20,
        ..Settings::default()
    }
}

fn sleeper() -> Child {
    Command::new("sleep")
        .arg("30")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .expect("spawn sleep")
}

fn pid_of(child: &Child) -> u32 {
    child.id().expect("child has a pid")
}

#[tokio::test]
async fn test_child_killed_when_parent_dies() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("e2e.channel");
    let producer = Producer::create(&path, fast_settings()).await.unwrap();

    let mut parent = sleeper();
    let mut child = sleeper();
    producer.add_parent(pid_of(&parent), None).unwrap();
    producer.add_child(pid_of(&child)).unwrap();
    producer.flush().await.unwrap();

    let watchdog = Watchdog::start(Pid::current(), path.clone(), fast_settings())
        .await
        .unwrap();
    let handle = tokio::spawn(watchdog.run());

    // Let the watchdog pick up both registrations before the parent goes.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(child.try_wait().unwrap().is_none());

    parent.kill().await.unwrap();

    let status = timeout(Duration::from_secs(5), child.wait())
        .await
        .expect("child was not killed")
        .unwrap();
    assert_eq!(status.signal(), Some(Signal::SIGTERM as i32));

    let report = timeout(Duration::from_secs(5), handle)
        .await
        .expect("watchdog did not exit")
        .unwrap()
        .unwrap();
    assert!(report.abandoned.is_empty());
    assert!(report.channel_removed);
    assert!(!path.exists());
}

#[tokio::test]
async fn test_ttl_kills_child_while_parent_lives() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ttl.channel");
    let producer = Producer::create(&path, fast_settings()).await.unwrap();

    let mut short = sleeper();
    let mut long = sleeper();
    producer
        .add_child(ChildOptions::new(pid_of(&short)).ttl(Duration::from_millis(300)))
        .unwrap();
    producer.add_child(pid_of(&long)).unwrap();
    producer.flush().await.unwrap();

    let watchdog = Watchdog::start(Pid::current(), path.clone(), fast_settings())
        .await
        .unwrap();
    let handle = tokio::spawn(watchdog.run());

    timeout(Duration::from_secs(5), short.wait())
        .await
        .expect("ttl child was not killed")
        .unwrap();
    assert!(long.try_wait().unwrap().is_none());
    assert!(path.exists());

    handle.abort();
}

#[tokio::test]
async fn test_named_kill_spares_other_names() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("named.channel");
    let producer = Producer::create(&path, fast_settings()).await.unwrap();

    let mut whale = sleeper();
    let mut giraffe = sleeper();
    producer
        .add_child(ChildOptions::new(pid_of(&whale)).name("whale"))
        .unwrap();
    producer
        .add_child(ChildOptions::new(pid_of(&giraffe)).name("giraffe"))
        .unwrap();

    let watchdog = Watchdog::start(Pid::current(), path.clone(), fast_settings())
        .await
        .unwrap();
    let handle = tokio::spawn(watchdog.run());

    producer.kill(Some("whale")).unwrap();
    producer.flush().await.unwrap();

    timeout(Duration::from_secs(5), whale.wait())
        .await
        .expect("whale was not killed")
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(giraffe.try_wait().unwrap().is_none());

    handle.abort();
}
