//! Contract Tests for the Command Queue
//!
//! FIFO execution on one channel, output/status separation at the marker,
//! and what happens to queued commands when the channel goes away.

#[path = "../test_utils/mod.rs"]
mod test_utils;

use shellmux::{
    ChannelEvent, ChannelId, ClosePolicy, Error, ProcessKind, ProcessState, ShellConfig,
    CHANNEL_CLOSED_STATUS,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use test_utils::{collector, quiet_shell, Call, Reply};

#[tokio::test]
async fn test_enqueue_on_empty_queue_starts_immediately() {
    let mut shell = quiet_shell(ShellConfig::default());
    let handle = shell.execute("ls", |_, _| {}).await.unwrap();

    assert_eq!(handle.state(), ProcessState::Running);
    assert!(handle.is_running());
    assert!(shell.is_opening());
    assert_eq!(shell.attached_process().map(|h| h.id()), Some(handle.id()));
    assert_eq!(shell.transport().calls, vec![Call::OpenChannel]);
}

#[tokio::test]
async fn test_second_command_waits_in_queue() {
    let mut shell = quiet_shell(ShellConfig::default());
    let first = shell.execute("a", |_, _| {}).await.unwrap();
    let second = shell.execute("b", |_, _| {}).await.unwrap();

    assert_eq!(first.state(), ProcessState::Running);
    assert_eq!(second.state(), ProcessState::Pending);
    let queued: Vec<String> = shell
        .processes()
        .iter()
        .map(|h| h.command().to_string())
        .collect();
    assert_eq!(queued, ["a", "b"]);
}

#[tokio::test]
async fn test_commands_run_in_fifo_order() {
    let mut shell = quiet_shell(ShellConfig::default());
    shell
        .transport_mut()
        .script("a", Reply::output("from a\n", 0))
        .script("b", Reply::output("from b\n", 3))
        .script("c", Reply::output("from c\n", 0));

    let log = Arc::new(Mutex::new(Vec::new()));
    let mut handles = Vec::new();
    for name in ["a", "b", "c"] {
        let log = log.clone();
        let handle = shell
            .execute(name, move |_, text| {
                log.lock().unwrap().push(format!("{}:{}", name, text))
            })
            .await
            .unwrap();
        handles.push(handle);
    }

    shell.wait_all().await.unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        vec!["a:from a\n", "b:from b\n", "c:from c\n"]
    );
    assert_eq!(shell.transport().sent_commands(), vec!["a", "b", "c"]);
    let statuses: Vec<Option<i32>> = handles.iter().map(|h| h.exit_status()).collect();
    assert_eq!(statuses, vec![Some(0), Some(3), Some(0)]);
    assert!(shell.processes().is_empty());
    assert!(shell.attached_process().is_none());
}

#[tokio::test]
async fn test_output_and_marker_in_one_chunk() {
    let mut shell = quiet_shell(ShellConfig::default());
    shell
        .transport_mut()
        .script("x", Reply::raw(&["hello\nworld\n{marker} 0\n"]));

    let (seen, callback) = collector();
    let status = shell.execute_and_wait("x", callback).await.unwrap();

    assert_eq!(status, 0);
    assert_eq!(*seen.lock().unwrap(), vec!["hello\nworld\n".to_string()]);
}

#[tokio::test]
async fn test_marker_only_chunk_has_no_output() {
    let mut shell = quiet_shell(ShellConfig::default());
    shell
        .transport_mut()
        .script("x", Reply::raw(&["{marker} 7\n"]));

    let (seen, callback) = collector();
    let status = shell.execute_and_wait("x", callback).await.unwrap();

    assert_eq!(status, 7);
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_output_then_marker_in_later_chunk() {
    let mut shell = quiet_shell(ShellConfig::default());
    shell
        .transport_mut()
        .script("x", Reply::raw(&["partial out", "{marker} 1\n"]));

    let (seen, callback) = collector();
    let status = shell.execute_and_wait("x", callback).await.unwrap();

    assert_eq!(status, 1);
    assert_eq!(*seen.lock().unwrap(), vec!["partial out".to_string()]);
}

#[tokio::test]
async fn test_marker_split_across_chunks() {
    let mut shell = quiet_shell(ShellConfig::default());
    let marker = shell.marker().to_string();
    let tail = format!("{} 4\n", &marker[20..]);
    shell
        .transport_mut()
        .script("x", Reply::raw(&["out\n", &marker[..20], &tail]));

    let (seen, callback) = collector();
    let status = shell.execute_and_wait("x", callback).await.unwrap();

    assert_eq!(status, 4);
    assert_eq!(*seen.lock().unwrap(), vec!["out\n".to_string()]);
}

#[tokio::test]
async fn test_malformed_status_uses_sentinel() {
    let mut shell = quiet_shell(ShellConfig::default());
    shell
        .transport_mut()
        .script("x", Reply::raw(&["{marker} oops\n"]));

    let status = shell.execute_and_wait("x", |_, _| {}).await.unwrap();
    assert_eq!(status, CHANNEL_CLOSED_STATUS);
}

#[tokio::test]
async fn test_handle_wait_and_execution_time() {
    let mut shell = quiet_shell(ShellConfig::default());
    shell
        .transport_mut()
        .script("true", Reply::output("", 0));

    let handle = shell.execute("true", |_, _| {}).await.unwrap();
    assert_eq!(handle.wait(&mut shell).await.unwrap(), 0);
    assert!(!handle.is_running());
    assert_eq!(handle.state(), ProcessState::Finished);
    assert!(handle.execution_time().is_some());
    assert!(handle.status().started_at.is_some());
}

#[tokio::test]
async fn test_execute_default_prints_to_stdout() {
    let mut shell = quiet_shell(ShellConfig::default());
    shell
        .transport_mut()
        .script("echo hi", Reply::output("hi\n", 0));

    let handle = shell.execute_default("echo hi").await.unwrap();
    assert_eq!(handle.wait(&mut shell).await.unwrap(), 0);
}

#[tokio::test]
async fn test_subshell_runs_like_a_command() {
    let mut shell = quiet_shell(ShellConfig::default());
    shell
        .transport_mut()
        .script("bash -l", Reply::output("nested prompt noise\n", 0));

    let handle = shell.subshell("bash -l").await.unwrap();
    assert_eq!(handle.kind(), ProcessKind::Subshell);
    assert_eq!(handle.wait(&mut shell).await.unwrap(), 0);
}

#[tokio::test]
async fn test_close_during_run_promotes_next() {
    let mut shell = quiet_shell(ShellConfig::default());
    shell
        .transport_mut()
        .script("sleep 100", Reply::hang("zzz"))
        .script("b", Reply::output("b-out\n", 0));

    let (slept, on_sleep) = collector();
    let (b_out, on_b) = collector();
    let sleeper = shell.execute("sleep 100", on_sleep).await.unwrap();
    let next = shell.execute("b", on_b).await.unwrap();

    shell
        .drive_until(|s| {
            s.transport().sent_commands().len() == 1 && s.transport().pending_events() == 0
        })
        .await
        .unwrap();
    assert!(sleeper.is_running());
    shell.transport_mut().push_event(ChannelId(0), ChannelEvent::Close);

    shell.wait_all().await.unwrap();

    assert_eq!(sleeper.exit_status(), Some(CHANNEL_CLOSED_STATUS));
    assert_eq!(*slept.lock().unwrap(), vec!["zzz".to_string()]);
    assert_eq!(next.exit_status(), Some(0));
    assert_eq!(*b_out.lock().unwrap(), vec!["b-out\n".to_string()]);

    let transport = shell.transport();
    assert_eq!(transport.count(|c| matches!(c, Call::OpenChannel)), 2);
    assert!(transport
        .calls
        .contains(&Call::SendData(ChannelId(1), "b\n".to_string())));
}

#[tokio::test]
async fn test_fail_pending_policy_aborts_queue() {
    let mut config = ShellConfig::default();
    config.session.on_close = ClosePolicy::FailPending;
    let mut shell = quiet_shell(config);
    shell.transport_mut().script("a", Reply::hang(""));

    let a = shell.execute("a", |_, _| {}).await.unwrap();
    let b = shell.execute("b", |_, _| {}).await.unwrap();
    let c = shell.execute("c", |_, _| {}).await.unwrap();

    shell
        .drive_until(|s| s.transport().sent_commands().len() == 1)
        .await
        .unwrap();
    shell.transport_mut().push_event(ChannelId(0), ChannelEvent::Close);
    shell.wait_all().await.unwrap();

    assert_eq!(a.state(), ProcessState::Finished);
    assert_eq!(a.exit_status(), Some(CHANNEL_CLOSED_STATUS));
    for pending in [&b, &c] {
        assert_eq!(pending.state(), ProcessState::Aborted);
        assert_eq!(pending.exit_status(), Some(CHANNEL_CLOSED_STATUS));
    }
    assert_eq!(shell.transport().sent_commands(), vec!["a"]);
    assert!(shell.is_closed());
}

#[tokio::test]
async fn test_wait_all_timeout_leaves_queue_alone() {
    let mut shell = quiet_shell(ShellConfig::default());
    shell.transport_mut().stall_when_idle = true;
    shell.transport_mut().script("sleep 100", Reply::hang(""));

    let handle = shell.execute("sleep 100", |_, _| {}).await.unwrap();
    let err = shell
        .wait_all_timeout(Duration::from_millis(50))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Timeout { .. }));
    assert!(handle.is_running());
    assert_eq!(shell.processes().len(), 1);
}

#[tokio::test]
async fn test_transport_gone_finishes_everything() {
    let mut shell = quiet_shell(ShellConfig::default());
    shell.transport_mut().script("sleep 100", Reply::hang(""));

    let running = shell.execute("sleep 100", |_, _| {}).await.unwrap();
    let queued = shell.execute("ls", |_, _| {}).await.unwrap();

    let err = shell.wait_all().await.unwrap_err();
    assert!(matches!(err, Error::TransportClosed));
    assert_eq!(running.exit_status(), Some(CHANNEL_CLOSED_STATUS));
    assert_eq!(queued.state(), ProcessState::Aborted);
    assert!(shell.processes().is_empty());
}
