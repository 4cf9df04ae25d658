mod common;

use std::time::Duration;

use k8_rest_client::exec::StreamKind;
use k8_rest_client::metadata::core::Pod;
use k8_rest_client::{ClientError, ClusterConfig, K8Client};

use common::{CannedResponse, Capture, MockConnector, MockMultiplexer, MockTransport};

const PROTOCOL_HEADER: &str = "X-Stream-Protocol-Version";

fn exec_client(transport: &MockTransport, mux: &MockMultiplexer) -> K8Client {
    K8Client::new(
        ClusterConfig::new(common::BASE).expect("config"),
        transport.clone(),
    )
    .with_multiplexer(MockConnector(mux.clone()))
}

fn script_upgrade(transport: &MockTransport, protocol: &str) {
    transport.script(CannedResponse::new(101).header(PROTOCOL_HEADER, protocol));
    // the mock multiplexer never reads the upgraded connection
    let (io, _peer) = tokio::io::duplex(64);
    transport.set_upgrade_io(Box::new(io));
}

#[tokio::test]
async fn test_echo_success() {
    common::init_logs();
    let transport = MockTransport::default();
    let mux = MockMultiplexer::default();
    script_upgrade(&transport, "v4.channel.k8s.io");
    mux.script_stdout(b"hi\n");

    let stdout = Capture::default();
    let client = exec_client(&transport, &mux);
    let status = client
        .request::<Pod>()
        .namespace("ns")
        .name("p")
        .exec()
        .command(["echo", "hi"])
        .stdout(stdout.clone())
        .run()
        .await
        .expect("exec");

    assert!(status.is_success());
    assert_eq!(status.code, 0);
    assert_eq!(stdout.contents(), b"hi\n");

    let recorded = transport.requests();
    assert_eq!(recorded[0].method, "POST");
    assert!(recorded[0]
        .uri
        .starts_with("https://k.example/api/v1/namespaces/ns/pods/p/exec?"));
    assert!(recorded[0].uri.contains("command=echo&command=hi"));
    assert!(recorded[0].uri.contains("stdout=true"));
    assert_eq!(recorded[0].header("connection"), Some("Upgrade"));
    assert_eq!(recorded[0].header("upgrade"), Some("SPDY/3.1"));
    assert_eq!(
        recorded[0].header("x-stream-protocol-version"),
        Some("v4.channel.k8s.io")
    );
    assert_eq!(recorded[0].header("accept"), Some("*/*"));
    assert!(recorded[0].body.is_empty());

    // graceful teardown happened
    assert!(mux.goaway_sent());
    assert!(mux.shutdown_done());
}

#[tokio::test]
async fn test_exit_code_from_error_channel() {
    let transport = MockTransport::default();
    let mux = MockMultiplexer::default();
    script_upgrade(&transport, "v4.channel.k8s.io");
    mux.script_error(
        br#"{"status":"Failure","reason":"NonZeroExitCode","details":{"causes":[{"reason":"ExitCode","message":"2"}]}}"#,
    );

    let client = exec_client(&transport, &mux);
    let status = client
        .request::<Pod>()
        .namespace("ns")
        .name("p")
        .exec()
        .command(["false"])
        .run()
        .await
        .expect("exec");

    assert_eq!(status.code, 2);
    assert!(status.status.is_failure());
    assert_eq!(status.status.reason.as_deref(), Some("NonZeroExitCode"));
}

#[tokio::test]
async fn test_stream_creation_order_and_stdin_gating() {
    let transport = MockTransport::default();
    let mux = MockMultiplexer::default();
    script_upgrade(&transport, "v4.channel.k8s.io");
    let release = mux.hold_acknowledgement();

    let stdout = Capture::default();
    let client = exec_client(&transport, &mux);
    let session = client
        .request::<Pod>()
        .namespace("ns")
        .name("p")
        .exec()
        .command(["cat"])
        .stdin(b"hello".as_slice())
        .stdout(stdout.clone());

    let running = tokio::spawn(session.run());

    // streams exist but are not acknowledged yet; no stdin byte may have
    // been written
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        mux.opened(),
        vec![StreamKind::Error, StreamKind::Stdin, StreamKind::Stdout]
    );
    assert!(!mux.acknowledged());
    assert!(mux.stdin_received().is_empty());

    release.send(()).expect("release gate");
    let status = running.await.expect("join").expect("exec");

    assert!(status.is_success());
    assert!(mux.acknowledged());
    assert_eq!(mux.stdin_received(), b"hello");
}

#[tokio::test]
async fn test_stderr_only_session() {
    let transport = MockTransport::default();
    let mux = MockMultiplexer::default();
    script_upgrade(&transport, "v4.channel.k8s.io");
    mux.script_stderr(b"warning: noise\n");

    let stderr = Capture::default();
    let client = exec_client(&transport, &mux);
    client
        .request::<Pod>()
        .namespace("ns")
        .name("p")
        .exec()
        .command(["sh", "-c", "noise"])
        .stderr(stderr.clone())
        .run()
        .await
        .expect("exec");

    assert_eq!(mux.opened(), vec![StreamKind::Error, StreamKind::Stderr]);
    assert_eq!(stderr.contents(), b"warning: noise\n");

    let recorded = transport.requests();
    assert!(recorded[0].uri.contains("stderr=true"));
    assert!(!recorded[0].uri.contains("stdout=true"));
    assert!(!recorded[0].uri.contains("stdin=true"));
}

#[tokio::test]
async fn test_non_upgrade_response_is_error() {
    let transport = MockTransport::default();
    let mux = MockMultiplexer::default();
    transport.script(CannedResponse::json(
        403,
        r#"{"kind":"Status","status":"Failure","reason":"Forbidden","code":403}"#,
    ));

    let client = exec_client(&transport, &mux);
    let err = client
        .request::<Pod>()
        .namespace("ns")
        .name("p")
        .exec()
        .command(["id"])
        .run()
        .await
        .expect_err("upgrade must fail");

    match err {
        ClientError::Upgrade { status, .. } => {
            let status = status.expect("status");
            assert_eq!(status.reason.as_deref(), Some("Forbidden"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_v1_subprotocol_rejected() {
    let transport = MockTransport::default();
    let mux = MockMultiplexer::default();
    script_upgrade(&transport, "channel.k8s.io");

    let client = exec_client(&transport, &mux);
    let err = client
        .request::<Pod>()
        .namespace("ns")
        .name("p")
        .exec()
        .command(["id"])
        .run()
        .await
        .expect_err("v1 must be rejected");
    assert!(matches!(err, ClientError::Upgrade { .. }));
}

#[tokio::test]
async fn test_v2_protocol_wraps_raw_error_text() {
    let transport = MockTransport::default();
    let mux = MockMultiplexer::default();
    script_upgrade(&transport, "v2.channel.k8s.io");
    mux.script_error(b"command terminated with exit code 1");

    let client = exec_client(&transport, &mux);
    let status = client
        .request::<Pod>()
        .namespace("ns")
        .name("p")
        .exec()
        .command(["false"])
        .run()
        .await
        .expect("exec");

    assert_eq!(status.code, -1);
    assert_eq!(status.status.reason.as_deref(), Some("CommandFailed"));
    assert_eq!(
        status.status.message.as_deref(),
        Some("command terminated with exit code 1")
    );
}

#[tokio::test]
async fn test_throw_on_failure() {
    let transport = MockTransport::default();
    let mux = MockMultiplexer::default();
    script_upgrade(&transport, "v4.channel.k8s.io");
    mux.script_error(
        br#"{"status":"Failure","details":{"causes":[{"reason":"ExitCode","message":"7"}]}}"#,
    );

    let client = exec_client(&transport, &mux);
    let err = client
        .request::<Pod>()
        .namespace("ns")
        .name("p")
        .exec()
        .command(["false"])
        .throw_on_failure(true)
        .run()
        .await
        .expect_err("failure must raise");

    match err {
        ClientError::ExecFailed(status) => assert_eq!(status.code, 7),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_timeout_aborts_session() {
    let transport = MockTransport::default();
    let mux = MockMultiplexer::default();
    script_upgrade(&transport, "v4.channel.k8s.io");
    // hold acknowledgement forever so the session can only time out
    let _release = mux.hold_acknowledgement();

    let client = exec_client(&transport, &mux);
    let err = client
        .request::<Pod>()
        .namespace("ns")
        .name("p")
        .exec()
        .command(["sleep", "60"])
        .timeout(Duration::from_millis(100))
        .run()
        .await
        .expect_err("must time out");

    assert!(matches!(err, ClientError::TimedOut));
    // teardown still ran
    assert!(mux.shutdown_done());
}
