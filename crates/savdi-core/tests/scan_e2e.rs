//! End-to-end scans against the fake daemon from `savdi-test-utils`.

use std::io::Cursor;
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use savdi_core::protocol::step;
use savdi_core::{Client, ReaderSource, STREAM_FILENAME, ScanError};
use savdi_test_utils::{EICAR, EICAR_SIGNATURE, FakeDaemon, SampleFiles, TestConfigBuilder};

fn client_for(daemon: &FakeDaemon) -> Client {
    Client::new(daemon.network(), daemon.address()).unwrap()
}

// ── Path submission (unix transports) ─────────────────────────────

#[test_log::test(tokio::test)]
async fn test_unix_path_scan_clean_file() {
    let daemon = FakeDaemon::unix().await;
    let samples = SampleFiles::new();
    let client = client_for(&daemon);

    let resp = client.scan(&samples.clean).await.unwrap();
    assert_eq!(resp.filename, samples.clean.display().to_string());
    assert!(!resp.infected);
    assert!(resp.signature.is_empty());
    assert_eq!(resp.raw, "0");

    let requests = daemon.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].line, samples.clean.display().to_string());
    assert_eq!(requests[0].payload, None);
}

#[test_log::test(tokio::test)]
async fn test_unix_path_scan_eicar_file() {
    let daemon = FakeDaemon::unix().await;
    let samples = SampleFiles::new();

    let resp = client_for(&daemon).scan(&samples.eicar).await.unwrap();
    assert_eq!(resp.filename, samples.eicar.display().to_string());
    assert!(resp.infected);
    assert_eq!(resp.signature, EICAR_SIGNATURE);
}

#[test_log::test(tokio::test)]
async fn test_unix_path_scan_directory() {
    let daemon = FakeDaemon::unix().await;
    let samples = SampleFiles::new();

    let resp = client_for(&daemon).scan(samples.dir()).await.unwrap();
    assert!(resp.infected);
    assert_eq!(daemon.requests()[0].line, samples.dir().display().to_string());
}

#[test_log::test(tokio::test)]
async fn test_unixpacket_path_scan() {
    let daemon = FakeDaemon::unix_packet().await;
    let samples = SampleFiles::new();
    let client = client_for(&daemon);

    assert!(client.scan(&samples.eicar).await.unwrap().infected);
    assert!(!client.scan(&samples.clean).await.unwrap().infected);
}

#[test_log::test(tokio::test)]
async fn test_scan_missing_path_makes_no_request() {
    let daemon = FakeDaemon::unix().await;
    let err = client_for(&daemon)
        .scan("/nonexistent/savdi/input.eml")
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(daemon.requests().is_empty());
}

// ── Stream submission ─────────────────────────────────────────────

#[test_log::test(tokio::test)]
async fn test_stream_scan_announces_exact_length() {
    let daemon = FakeDaemon::tcp().await;
    let content = vec![b'x'; 1000];

    let resp = client_for(&daemon)
        .scan_reader(Cursor::new(content.clone()))
        .await
        .unwrap();
    assert_eq!(resp.filename, STREAM_FILENAME);
    assert!(!resp.infected);

    let requests = daemon.requests();
    assert_eq!(requests[0].line, "stream/1000");
    assert_eq!(requests[0].payload.as_deref(), Some(content.as_slice()));
}

#[test_log::test(tokio::test)]
async fn test_stream_scan_eicar_over_unix() {
    let daemon = FakeDaemon::unix().await;

    let resp = client_for(&daemon)
        .scan_reader(EICAR.as_bytes())
        .await
        .unwrap();
    assert_eq!(resp.filename, STREAM_FILENAME);
    assert!(resp.infected);
    assert_eq!(resp.signature, EICAR_SIGNATURE);
    assert_eq!(resp.raw, format!("1{EICAR_SIGNATURE}"));
    assert_eq!(daemon.requests()[0].line, format!("stream/{}", EICAR.len()));
}

#[test_log::test(tokio::test)]
async fn test_stream_scan_empty_source() {
    let daemon = FakeDaemon::tcp().await;
    let resp = client_for(&daemon).scan_reader(&b""[..]).await.unwrap();
    assert!(!resp.infected);
    assert_eq!(daemon.requests()[0].line, "stream/0");
}

#[test_log::test(tokio::test)]
async fn test_tcp_file_scan_streams_contents() {
    let daemon = FakeDaemon::tcp().await;
    let samples = SampleFiles::new();

    let resp = client_for(&daemon).scan(&samples.eicar).await.unwrap();
    assert!(resp.infected);
    // the daemon never sees the path over TCP
    assert_eq!(resp.filename, STREAM_FILENAME);

    let request = &daemon.requests()[0];
    assert_eq!(request.line, format!("stream/{}", EICAR.len()));
    assert_eq!(request.payload.as_deref(), Some(EICAR.as_bytes()));
}

#[test_log::test(tokio::test)]
async fn test_tcp_directory_scan_is_rejected() {
    let daemon = FakeDaemon::tcp().await;
    let samples = SampleFiles::new();

    let err = client_for(&daemon).scan(samples.dir()).await.unwrap_err();
    assert!(matches!(err, ScanError::DirectoryNotSupported(_)));
    assert!(daemon.requests().is_empty());
}

#[test_log::test(tokio::test)]
async fn test_unknown_length_source_is_rejected() {
    let daemon = FakeDaemon::tcp().await;
    let err = client_for(&daemon)
        .scan_reader(ReaderSource::unknown(tokio::io::empty()))
        .await
        .unwrap_err();
    assert!(matches!(err, ScanError::UnknownLength));
    assert!(daemon.requests().is_empty());
}

// ── Protocol violations ───────────────────────────────────────────

#[test_log::test(tokio::test)]
async fn test_unexpected_acknowledgement() {
    let daemon = FakeDaemon::builder().ack("BUSY").tcp().await;
    let err = client_for(&daemon)
        .scan_reader(&b"payload"[..])
        .await
        .unwrap_err();
    assert!(matches!(err, ScanError::UnexpectedResponse(ref l) if l == "BUSY"));
}

#[test_log::test(tokio::test)]
async fn test_unknown_status_from_daemon() {
    let daemon = FakeDaemon::builder().verdict("-1").unix().await;
    let samples = SampleFiles::new();
    let err = client_for(&daemon).scan(&samples.clean).await.unwrap_err();
    assert!(matches!(err, ScanError::UnknownStatus(_)));
}

#[test_log::test(tokio::test)]
async fn test_malformed_status_from_daemon() {
    let daemon = FakeDaemon::builder().verdict("FAIL engine").tcp().await;
    let err = client_for(&daemon)
        .scan_reader(&b"payload"[..])
        .await
        .unwrap_err();
    assert!(matches!(err, ScanError::UnexpectedResponse(ref l) if l == "FAIL engine"));
}

// ── Deadlines ─────────────────────────────────────────────────────

#[test_log::test(tokio::test)]
async fn test_silent_daemon_trips_verdict_deadline() {
    let daemon = FakeDaemon::builder().silent().unix().await;
    let samples = SampleFiles::new();
    let mut client = client_for(&daemon);
    client.set_command_timeout(Duration::from_millis(100));

    let err = client.scan(&samples.clean).await.unwrap_err();
    assert!(err.is_timeout());
    assert!(matches!(
        err,
        ScanError::CommandTimeout {
            step: step::READ_VERDICT
        }
    ));
}

#[test_log::test(tokio::test)]
async fn test_silent_daemon_trips_ack_deadline() {
    let daemon = FakeDaemon::builder().silent().tcp().await;
    let mut client = client_for(&daemon);
    client.set_command_timeout(Duration::from_millis(100));

    let err = client.scan_reader(&b"abc"[..]).await.unwrap_err();
    assert!(matches!(
        err,
        ScanError::CommandTimeout {
            step: step::READ_ACK
        }
    ));
    assert_eq!(daemon.requests()[0].line, "stream/3");
}

#[test_log::test(tokio::test)]
async fn test_each_step_gets_a_fresh_deadline() {
    // ack and verdict each arrive inside the deadline, together well past it
    let daemon = FakeDaemon::builder()
        .reply_delay(Duration::from_millis(300))
        .tcp()
        .await;
    let mut client = client_for(&daemon);
    client.set_command_timeout(Duration::from_millis(400));

    let started = Instant::now();
    let resp = client.scan_reader(EICAR.as_bytes()).await.unwrap();
    assert!(started.elapsed() > Duration::from_millis(400));
    assert!(resp.infected);
    assert_eq!(resp.signature, EICAR_SIGNATURE);
}

#[test_log::test(tokio::test)]
async fn test_unread_payload_trips_send_deadline() {
    let daemon = FakeDaemon::builder().stall_payload().tcp().await;
    let mut client = client_for(&daemon);
    client.set_command_timeout(Duration::from_millis(300));

    // far more than the socket buffers can absorb
    let payload = vec![0u8; 64 << 20];
    let err = client.scan_reader(Cursor::new(payload)).await.unwrap_err();
    assert!(matches!(
        err,
        ScanError::CommandTimeout {
            step: step::SEND_PAYLOAD
        }
    ));
    assert_eq!(daemon.requests()[0].line, format!("stream/{}", 64 << 20));
}

// ── Reuse and configuration ───────────────────────────────────────

#[test_log::test(tokio::test)]
async fn test_client_is_reusable_across_scans() {
    let daemon = FakeDaemon::unix().await;
    let samples = SampleFiles::new();
    let client = client_for(&daemon);

    assert!(!client.scan(&samples.clean).await.unwrap().infected);
    assert!(client.scan(&samples.eicar).await.unwrap().infected);
    assert!(client.scan_reader(EICAR.as_bytes()).await.unwrap().infected);
    assert_eq!(daemon.requests().len(), 3);
}

#[test_log::test(tokio::test)]
async fn test_client_from_config() {
    let daemon = FakeDaemon::tcp().await;
    let config = TestConfigBuilder::new()
        .endpoint(daemon.network(), daemon.address())
        .connect_timeout_secs(2)
        .connect_retries(-5)
        .command_timeout_secs(5)
        .build();

    let client = Client::from_config(&config.client).unwrap();
    assert_eq!(client.connect_retries(), 0);
    assert_eq!(client.command_timeout(), Duration::from_secs(5));
    assert!(client.scan_reader(EICAR.as_bytes()).await.unwrap().infected);
}
