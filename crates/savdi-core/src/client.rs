//! Scanning client. Each scan opens its own connection.
//!
//! Unix transports submit the path and let the daemon read the file. TCP
//! transports cannot assume a shared filesystem, so files are streamed.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use savdi_config::ClientConfig;

use crate::error::ScanError;
use crate::protocol::{self, ACK, DEFAULT_SOCKET_PATH, LineConn, STREAM_FILENAME, step};
use crate::response::Response;
use crate::source::SizedSource;
use crate::transport::{Dialer, Transport};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_CONNECT_RETRY_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// Client for a SAVDI scanning daemon.
///
/// Safe to reuse for any number of sequential scans. Overlapping scans on
/// one client are not coordinated; use one client per concurrent scan.
#[derive(Debug, Clone)]
pub struct Client {
    transport: Transport,
    address: String,
    connect_timeout: Duration,
    connect_retries: u32,
    connect_retry_delay: Duration,
    command_timeout: Duration,
}

impl Client {
    /// Create a client from a network name and address.
    ///
    /// Empty network and address select the unix socket at
    /// [`DEFAULT_SOCKET_PATH`].
    pub fn new(network: &str, address: &str) -> Result<Self, ScanError> {
        if network.is_empty() && address.is_empty() {
            return Self::with_transport(Transport::Unix, DEFAULT_SOCKET_PATH);
        }
        Self::with_transport(network.parse()?, address)
    }

    /// Create a client for an already-parsed transport.
    ///
    /// Unix transports require the socket file to exist now.
    pub fn with_transport(
        transport: Transport,
        address: impl Into<String>,
    ) -> Result<Self, ScanError> {
        let address = address.into();
        if transport.is_unix()
            && let Err(e) = std::fs::metadata(&address)
            && e.kind() == io::ErrorKind::NotFound
        {
            return Err(ScanError::SocketNotFound(PathBuf::from(address)));
        }

        Ok(Self {
            transport,
            address,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            connect_retries: 0,
            connect_retry_delay: DEFAULT_CONNECT_RETRY_DELAY,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        })
    }

    /// Build a client from loaded configuration.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ScanError> {
        let mut client = Self::new(&config.network, &config.address)?;
        client.set_connect_timeout(config.connect_timeout());
        client.set_connect_retries(config.connect_retries);
        client.set_connect_retry_delay(config.connect_retry_delay());
        client.set_command_timeout(config.command_timeout());
        Ok(client)
    }

    /// Per-attempt connect deadline. Zero dials without a deadline.
    pub fn set_connect_timeout(&mut self, timeout: Duration) {
        self.connect_timeout = timeout;
    }

    /// Deadline for each exchange step. Zero disables the deadline.
    pub fn set_command_timeout(&mut self, timeout: Duration) {
        self.command_timeout = timeout;
    }

    /// Extra connect attempts after a timed-out first attempt.
    /// Negative values are clamped to 0.
    pub fn set_connect_retries(&mut self, retries: i64) {
        self.connect_retries = u32::try_from(retries.max(0)).unwrap_or(u32::MAX);
    }

    /// Sleep between timed-out connect attempts.
    pub fn set_connect_retry_delay(&mut self, delay: Duration) {
        self.connect_retry_delay = delay;
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    pub fn connect_retries(&self) -> u32 {
        self.connect_retries
    }

    pub fn connect_retry_delay(&self) -> Duration {
        self.connect_retry_delay
    }

    /// Scan a file or directory.
    ///
    /// Over TCP the file is streamed and the response carries the
    /// `"stream"` filename; directories are rejected before dialing.
    pub async fn scan(&self, path: impl AsRef<Path>) -> Result<Response, ScanError> {
        let path = path.as_ref();
        let metadata = match tokio::fs::metadata(path).await {
            Ok(m) => m,
            Err(source) if source.kind() == io::ErrorKind::NotFound => {
                return Err(ScanError::NotFound {
                    path: path.to_path_buf(),
                    source,
                });
            }
            Err(e) => return Err(e.into()),
        };

        if self.transport.is_unix() {
            return self.scan_path(path).await;
        }
        if metadata.is_dir() {
            return Err(ScanError::DirectoryNotSupported(path.to_path_buf()));
        }

        let mut file = tokio::fs::File::open(path).await?;
        self.scan_reader(&mut file).await
    }

    /// Stream the contents of `source` to the daemon.
    pub async fn scan_reader<S: SizedSource>(&self, mut source: S) -> Result<Response, ScanError> {
        let len = source.content_length().await?;
        debug!(network = %self.transport, len, "scanning stream");

        let mut conn = self.connect().await?;
        conn.send_line(&protocol::stream_request(len), step::SEND_REQUEST)
            .await?;

        let ack = conn.read_line(step::READ_ACK).await?;
        if ack != ACK {
            return Err(ScanError::UnexpectedResponse(ack));
        }

        conn.send_payload(&mut source, len).await?;
        let line = conn.read_line(step::READ_VERDICT).await?;
        Response::from_status_line(STREAM_FILENAME, line)
    }

    async fn scan_path(&self, path: &Path) -> Result<Response, ScanError> {
        let request = protocol::path_request(path)?;
        debug!(network = %self.transport, path = %path.display(), "scanning path");

        let mut conn = self.connect().await?;
        conn.send_line(&request, step::SEND_REQUEST).await?;
        let line = conn.read_line(step::READ_VERDICT).await?;
        Response::from_status_line(path_label(path), line)
    }

    async fn connect(&self) -> Result<LineConn, ScanError> {
        let stream = self.dialer().dial().await?;
        Ok(LineConn::new(stream, self.command_timeout))
    }

    fn dialer(&self) -> Dialer<'_> {
        Dialer {
            transport: self.transport,
            address: &self.address,
            connect_timeout: self.connect_timeout,
            retries: self.connect_retries,
            retry_delay: self.connect_retry_delay,
        }
    }
}

/// Response filename for a submitted path. The request line carries the
/// raw path bytes; the label is their lossy UTF-8 rendering.
fn path_label(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const TCP_ADDRESS: &str = "127.1.1.1:4010";

    #[test]
    fn test_missing_unix_socket() {
        let err = Client::new("unix", "/tmp/.dumx.sock").unwrap_err();
        assert!(matches!(err, ScanError::SocketNotFound(ref p) if p == Path::new("/tmp/.dumx.sock")));

        let err = Client::new("unixpacket", "/tmp/.dumx.sock").unwrap_err();
        assert!(matches!(err, ScanError::SocketNotFound(_)));
    }

    #[test]
    fn test_defaults_resolve_to_default_socket() {
        match Client::new("", "") {
            Ok(client) => {
                assert_eq!(client.transport(), Transport::Unix);
                assert_eq!(client.address(), DEFAULT_SOCKET_PATH);
            }
            Err(err) => assert_eq!(
                err.to_string(),
                format!("unix socket {DEFAULT_SOCKET_PATH} does not exist")
            ),
        }
    }

    #[test]
    fn test_unsupported_networks() {
        for network in ["udp", "ip", "unixgram", "http"] {
            let err = Client::new(network, TCP_ADDRESS).unwrap_err();
            assert!(matches!(err, ScanError::UnsupportedTransport(ref n) if n == network));
        }
    }

    #[test]
    fn test_tcp_address_is_not_checked() {
        for network in ["tcp", "tcp4", "tcp6"] {
            let client = Client::new(network, TCP_ADDRESS).unwrap();
            assert_eq!(client.transport().as_str(), network);
            assert_eq!(client.address(), TCP_ADDRESS);
        }
    }

    #[test]
    fn test_existing_unix_socket() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("savdid.sock");
        let _listener = std::os::unix::net::UnixListener::bind(&path).unwrap();

        let client = Client::new("unix", path.to_str().unwrap()).unwrap();
        assert_eq!(client.transport(), Transport::Unix);
    }

    #[test]
    fn test_default_settings() {
        let client = Client::new("tcp", TCP_ADDRESS).unwrap();
        assert_eq!(client.connect_timeout(), Duration::from_secs(15));
        assert_eq!(client.connect_retry_delay(), Duration::from_secs(1));
        assert_eq!(client.command_timeout(), Duration::from_secs(60));
        assert_eq!(client.connect_retries(), 0);
    }

    #[test]
    fn test_setters() {
        let mut client = Client::new("tcp", TCP_ADDRESS).unwrap();
        let two = Duration::from_secs(2);
        client.set_connect_timeout(two);
        assert_eq!(client.connect_timeout(), two);
        client.set_command_timeout(two);
        assert_eq!(client.command_timeout(), two);
        client.set_connect_retry_delay(two);
        assert_eq!(client.connect_retry_delay(), two);

        client.set_connect_retries(2);
        assert_eq!(client.connect_retries(), 2);
        client.set_connect_retries(-2);
        assert_eq!(client.connect_retries(), 0);
        client.set_connect_retries(i64::MAX);
        assert_eq!(client.connect_retries(), u32::MAX);
    }

    #[test]
    fn test_from_config() {
        let config = ClientConfig {
            network: "tcp6".to_string(),
            address: "[::1]:4010".to_string(),
            connect_timeout_secs: 0,
            connect_retries: -1,
            connect_retry_delay_ms: 5,
            command_timeout_secs: 9,
        };
        let client = Client::from_config(&config).unwrap();
        assert_eq!(client.transport(), Transport::Tcp6);
        assert_eq!(client.connect_timeout(), Duration::ZERO);
        assert_eq!(client.connect_retries(), 0);
        assert_eq!(client.connect_retry_delay(), Duration::from_millis(5));
        assert_eq!(client.command_timeout(), Duration::from_secs(9));
    }

    #[test]
    fn test_path_label_is_lossy_utf8() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        assert_eq!(path_label(Path::new("/var/mail/in.eml")), "/var/mail/in.eml");

        let raw = OsStr::from_bytes(b"/var/mail/bad\xffname.eml");
        assert_eq!(path_label(Path::new(raw)), "/var/mail/bad\u{FFFD}name.eml");
        // the request keeps the original bytes
        assert_eq!(
            protocol::path_request(Path::new(raw)).unwrap(),
            b"/var/mail/bad\xffname.eml".to_vec()
        );
    }

    #[tokio::test]
    async fn test_scan_missing_file() {
        let client = Client::new("tcp", TCP_ADDRESS).unwrap();
        let err = client.scan("/nonexistent/savdi/file.eml").await.unwrap_err();
        assert!(err.is_not_found());
        match err {
            ScanError::NotFound { source, .. } => {
                assert_eq!(source.kind(), io::ErrorKind::NotFound)
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_scan_directory_over_tcp_is_rejected_before_dialing() {
        let tmp = TempDir::new().unwrap();
        // nothing listens here; dialing would surface a connect error instead
        let client = Client::new("tcp", "127.0.0.1:1").unwrap();
        let err = client.scan(tmp.path()).await.unwrap_err();
        assert!(matches!(err, ScanError::DirectoryNotSupported(ref p) if p == tmp.path()));
    }

    #[tokio::test]
    async fn test_scan_reader_unknown_length_fails_before_dialing() {
        let client = Client::new("tcp", "127.0.0.1:1").unwrap();
        let source = crate::source::ReaderSource::unknown(tokio::io::empty());
        let err = client.scan_reader(source).await.unwrap_err();
        assert!(matches!(err, ScanError::UnknownLength));
    }

    #[tokio::test]
    async fn test_scan_file_over_tcp_refused() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut tmp, b"hello").unwrap();

        let mut client = Client::new("tcp", &address).unwrap();
        client.set_connect_retries(3);
        let err = client.scan(tmp.path()).await.unwrap_err();
        assert!(matches!(err, ScanError::Connect { .. }), "got {err:?}");
    }
}
