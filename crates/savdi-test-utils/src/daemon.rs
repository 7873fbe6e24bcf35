//! Scripted stand-in for the scanning daemon.
//!
//! [`FakeDaemon`] speaks the server side of the line protocol over a unix,
//! unixpacket or TCP socket. By default it reads submitted paths itself and
//! flags any content containing the EICAR marker; the builder can force a
//! fixed verdict, a different acknowledgement, slow replies, or silence.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufStream};
use tokio::net::{TcpListener, UnixListener};
use tokio::task::JoinHandle;
use tracing::debug;

/// The EICAR anti-virus test string.
pub const EICAR: &str =
    r"X5O!P%@AP[4\PZX54(P^)7CC)7}$EICAR-STANDARD-ANTIVIRUS-TEST-FILE!$H+H*";

/// Signature the fake daemon reports for EICAR content.
pub const EICAR_SIGNATURE: &str = "EICAR-AV-Test";

const EICAR_MARKER: &[u8] = b"EICAR-STANDARD-ANTIVIRUS-TEST-FILE";

/// One request received by the fake daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedRequest {
    /// The request line without its terminator.
    pub line: String,
    /// Bytes received after the acknowledgement, for stream submissions.
    pub payload: Option<Vec<u8>>,
}

/// How the fake daemon answers.
#[derive(Debug, Clone)]
pub struct FakeDaemonBuilder {
    ack: String,
    verdict: Option<String>,
    silent: bool,
    stall_payload: bool,
    reply_delay: Duration,
}

impl FakeDaemonBuilder {
    /// Acknowledgement sent for `stream/<n>` requests (default `OK`).
    /// Anything else ends the exchange after sending it.
    pub fn ack(mut self, ack: &str) -> Self {
        self.ack = ack.to_string();
        self
    }

    /// Always answer with this status line instead of inspecting content.
    pub fn verdict(mut self, line: &str) -> Self {
        self.verdict = Some(line.to_string());
        self
    }

    /// Read the request line, then never answer.
    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    /// Acknowledge `stream/<n>` requests, then never read the payload.
    pub fn stall_payload(mut self) -> Self {
        self.stall_payload = true;
        self
    }

    /// Wait this long before each line the daemon sends.
    pub fn reply_delay(mut self, delay: Duration) -> Self {
        self.reply_delay = delay;
        self
    }

    pub async fn unix(self) -> FakeDaemon {
        let dir = TempDir::new().expect("failed to create temp dir");
        let path = dir.path().join("savdid.sock");
        let listener = UnixListener::bind(&path).expect("failed to bind unix socket");
        FakeDaemon::start(self, Listener::Unix(listener), "unix", socket_address(&path), Some(dir))
    }

    pub async fn unix_packet(self) -> FakeDaemon {
        let dir = TempDir::new().expect("failed to create temp dir");
        let path = dir.path().join("savdid.sock");
        let listener = bind_seqpacket(&path).expect("failed to bind seqpacket socket");
        FakeDaemon::start(
            self,
            Listener::Unix(listener),
            "unixpacket",
            socket_address(&path),
            Some(dir),
        )
    }

    pub async fn tcp(self) -> FakeDaemon {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind tcp listener");
        let addr = listener.local_addr().expect("no local addr");
        FakeDaemon::start(self, Listener::Tcp(listener), "tcp", addr.to_string(), None)
    }
}

impl Default for FakeDaemonBuilder {
    fn default() -> Self {
        Self {
            ack: "OK".to_string(),
            verdict: None,
            silent: false,
            stall_payload: false,
            reply_delay: Duration::ZERO,
        }
    }
}

enum Listener {
    Unix(UnixListener),
    Tcp(TcpListener),
}

/// A running fake daemon. Stops serving when dropped.
pub struct FakeDaemon {
    network: &'static str,
    address: String,
    requests: Arc<Mutex<Vec<ReceivedRequest>>>,
    task: JoinHandle<()>,
    _temp_dir: Option<TempDir>,
}

impl FakeDaemon {
    pub fn builder() -> FakeDaemonBuilder {
        FakeDaemonBuilder::default()
    }

    /// Content-inspecting daemon on a unix stream socket.
    pub async fn unix() -> Self {
        Self::builder().unix().await
    }

    /// Content-inspecting daemon on a unix seqpacket socket.
    pub async fn unix_packet() -> Self {
        Self::builder().unix_packet().await
    }

    /// Content-inspecting daemon on a loopback TCP port.
    pub async fn tcp() -> Self {
        Self::builder().tcp().await
    }

    fn start(
        behavior: FakeDaemonBuilder,
        listener: Listener,
        network: &'static str,
        address: String,
        temp_dir: Option<TempDir>,
    ) -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&requests);
        let task = tokio::spawn(async move {
            loop {
                let behavior = behavior.clone();
                let log = Arc::clone(&log);
                let accepted = match &listener {
                    Listener::Unix(l) => l.accept().await.map(|(s, _)| {
                        tokio::spawn(serve(s, behavior, log));
                    }),
                    Listener::Tcp(l) => l.accept().await.map(|(s, _)| {
                        tokio::spawn(serve(s, behavior, log));
                    }),
                };
                if let Err(e) = accepted {
                    debug!(error = %e, "fake daemon accept failed");
                    break;
                }
            }
        });

        Self {
            network,
            address,
            requests,
            task,
            _temp_dir: temp_dir,
        }
    }

    /// Network name to pass to the client.
    pub fn network(&self) -> &'static str {
        self.network
    }

    /// Socket path or `host:port` to pass to the client.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Requests received so far, in arrival order.
    pub fn requests(&self) -> Vec<ReceivedRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl Drop for FakeDaemon {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve<S>(stream: S, behavior: FakeDaemonBuilder, log: Arc<Mutex<Vec<ReceivedRequest>>>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if let Err(e) = exchange(stream, &behavior, &log).await {
        debug!(error = %e, "fake daemon exchange ended");
    }
}

async fn exchange<S>(
    stream: S,
    behavior: &FakeDaemonBuilder,
    log: &Mutex<Vec<ReceivedRequest>>,
) -> std::io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut conn = BufStream::new(stream);
    let mut line = String::new();
    if conn.read_line(&mut line).await? == 0 {
        return Ok(());
    }
    let line = line.trim_end_matches(['\r', '\n']).to_string();
    let record = |payload: Option<Vec<u8>>| {
        if let Ok(mut r) = log.lock() {
            r.push(ReceivedRequest {
                line: line.clone(),
                payload,
            });
        }
    };

    if behavior.silent {
        record(None);
        let mut sink = Vec::new();
        conn.read_to_end(&mut sink).await?;
        return Ok(());
    }

    let verdict = if let Some(len) = line.strip_prefix("stream/") {
        let len: usize = len
            .parse()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        tokio::time::sleep(behavior.reply_delay).await;
        conn.write_all(format!("{}\n", behavior.ack).as_bytes()).await?;
        conn.flush().await?;
        if behavior.ack != "OK" {
            record(None);
            return Ok(());
        }
        if behavior.stall_payload {
            record(None);
            std::future::pending::<()>().await;
        }

        let mut payload = vec![0u8; len];
        conn.read_exact(&mut payload).await?;
        let verdict = behavior
            .verdict
            .clone()
            .unwrap_or_else(|| classify(&payload));
        record(Some(payload));
        verdict
    } else {
        record(None);
        match &behavior.verdict {
            Some(v) => v.clone(),
            None => classify_path(Path::new(&line)).await,
        }
    };

    tokio::time::sleep(behavior.reply_delay).await;
    conn.write_all(format!("{verdict}\n").as_bytes()).await?;
    conn.flush().await
}

fn socket_address(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn classify(content: &[u8]) -> String {
    if content
        .windows(EICAR_MARKER.len())
        .any(|w| w == EICAR_MARKER)
    {
        format!("1{EICAR_SIGNATURE}")
    } else {
        "0".to_string()
    }
}

async fn classify_path(path: &Path) -> String {
    let Ok(metadata) = tokio::fs::metadata(path).await else {
        return "-1".to_string();
    };
    if !metadata.is_dir() {
        return match tokio::fs::read(path).await {
            Ok(content) => classify(&content),
            Err(_) => "-1".to_string(),
        };
    }

    let Ok(mut entries) = tokio::fs::read_dir(path).await else {
        return "-1".to_string();
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        if let Ok(content) = tokio::fs::read(entry.path()).await {
            let verdict = classify(&content);
            if verdict != "0" {
                return verdict;
            }
        }
    }
    "0".to_string()
}

fn bind_seqpacket(path: &Path) -> std::io::Result<UnixListener> {
    let socket = socket2::Socket::new(socket2::Domain::UNIX, socket2::Type::SEQPACKET, None)?;
    socket.bind(&socket2::SockAddr::unix(path)?)?;
    socket.listen(16)?;
    socket.set_nonblocking(true)?;
    UnixListener::from_std(std::os::unix::net::UnixListener::from(socket))
}
