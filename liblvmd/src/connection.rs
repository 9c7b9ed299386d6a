//! Connections to an lvmd daemon.
//!
//! [`connect`] dials the daemon and waits, bounded by a timeout, for the
//! channel to come up.  When the wait runs out the connection is still
//! returned: it dials lazily and the first real call reports the underlying
//! transport error instead of a generic timeout.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use hyper_util::rt::TokioIo;
use tokio::net::UnixStream;
use tokio::time::Instant;
use tonic::transport::{Channel, Endpoint, Uri};
use tower::Service;
use tracing::{debug, instrument, trace};

use crate::error::LvmdError;
use crate::proto::{CreateLvRequest, ListLvRequest, LogicalVolume, LvmClient, RemoveLvRequest};

/// How long [`GrpcConnector`] waits for a daemon channel by default.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(1);

/// Parameters of a `CreateLV` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LvmOptions {
    pub volume_group: String,
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    pub tags: Vec<String>,
}

/// Logical volume operations on one daemon.
///
/// Dropping the value releases the connection.
#[async_trait]
pub trait LvmConnection: Send + Sync {
    /// Create a logical volume and return the daemon's command output.
    async fn create_lv(&self, opts: &LvmOptions) -> Result<String, LvmdError>;

    /// Look up a logical volume. An empty listing is [`LvmdError::NotFound`].
    async fn get_lv(&self, volume_group: &str, name: &str) -> Result<LogicalVolume, LvmdError>;

    async fn remove_lv(&self, volume_group: &str, name: &str) -> Result<(), LvmdError>;
}

/// Opens [`LvmConnection`]s by address.
#[async_trait]
pub trait LvmConnector: Send + Sync {
    async fn connect(&self, address: &str) -> Result<Box<dyn LvmConnection>, LvmdError>;
}

/// [`LvmConnector`] that dials the daemon over gRPC.
#[derive(Debug, Clone)]
pub struct GrpcConnector {
    timeout: Duration,
}

impl GrpcConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for GrpcConnector {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

#[async_trait]
impl LvmConnector for GrpcConnector {
    async fn connect(&self, address: &str) -> Result<Box<dyn LvmConnection>, LvmdError> {
        let conn = connect(address, self.timeout).await?;
        Ok(Box::new(conn))
    }
}

/// A gRPC channel to one lvmd daemon.
#[derive(Debug, Clone)]
pub struct LvmdConnection {
    address: String,
    channel: Channel,
}

impl LvmdConnection {
    pub fn address(&self) -> &str {
        &self.address
    }

    fn client(&self) -> LvmClient {
        LvmClient::new(self.channel.clone())
    }
}

#[async_trait]
impl LvmConnection for LvmdConnection {
    #[instrument(skip(self), fields(address = %self.address))]
    async fn create_lv(&self, opts: &LvmOptions) -> Result<String, LvmdError> {
        let request = CreateLvRequest {
            volume_group: opts.volume_group.clone(),
            name: opts.name.clone(),
            size: opts.size,
            mirrored: false,
            tags: opts.tags.clone(),
        };
        let reply = self
            .client()
            .create_lv(request)
            .await
            .map_err(|status| LvmdError::rpc("CreateLV", status))?;
        Ok(reply.command_output)
    }

    #[instrument(skip(self), fields(address = %self.address))]
    async fn get_lv(&self, volume_group: &str, name: &str) -> Result<LogicalVolume, LvmdError> {
        let request = ListLvRequest {
            volume_group: format!("{volume_group}/{name}"),
        };
        let reply = self
            .client()
            .list_lv(request)
            .await
            .map_err(|status| LvmdError::rpc("ListLV", status))?;

        reply
            .volumes
            .into_iter()
            .next()
            .ok_or_else(|| LvmdError::NotFound {
                volume_group: volume_group.to_owned(),
                name: name.to_owned(),
            })
    }

    #[instrument(skip(self), fields(address = %self.address))]
    async fn remove_lv(&self, volume_group: &str, name: &str) -> Result<(), LvmdError> {
        let request = RemoveLvRequest {
            volume_group: volume_group.to_owned(),
            name: name.to_owned(),
        };
        let reply = self
            .client()
            .remove_lv(request)
            .await
            .map_err(|status| LvmdError::rpc("RemoveLV", status))?;
        trace!(output = %reply.command_output, "RemoveLV output");
        Ok(())
    }
}

/// Dial `address` and wait up to `timeout` for the channel to become ready.
///
/// `address` is either `host:port` or an absolute unix socket path.  Failed
/// dial attempts are retried with exponential backoff until the deadline.
/// Reaching the deadline is not an error: a lazily dialing connection is
/// returned and the first call surfaces the real cause.
pub async fn connect(address: &str, timeout: Duration) -> Result<LvmdConnection, LvmdError> {
    debug!(%address, "connecting to lvmd");
    let target = Target::parse(address)?;
    let deadline = Instant::now() + timeout;
    let mut backoff = INITIAL_BACKOFF;

    loop {
        match tokio::time::timeout_at(deadline, target.dial()).await {
            Ok(Ok(channel)) => {
                debug!(%address, "connected to lvmd");
                return Ok(LvmdConnection {
                    address: address.to_owned(),
                    channel,
                });
            }
            Ok(Err(e)) => trace!(%address, error = %e, "still trying to reach lvmd"),
            Err(_) => break,
        }

        tokio::time::sleep_until((Instant::now() + backoff).min(deadline)).await;
        if Instant::now() >= deadline {
            break;
        }
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }

    debug!(%address, "connection to lvmd timed out");
    Ok(LvmdConnection {
        address: address.to_owned(),
        channel: target.dial_lazy(),
    })
}

/// Whether an lvmd address names a unix socket rather than `host:port`.
pub fn is_unix_socket(address: &str) -> bool {
    address.starts_with('/')
}

enum Target {
    Tcp(Endpoint),
    Unix { endpoint: Endpoint, path: PathBuf },
}

impl Target {
    fn parse(address: &str) -> Result<Self, LvmdError> {
        if is_unix_socket(address) {
            // The URI is never resolved; the connector dials the socket path.
            return Ok(Self::Unix {
                endpoint: Endpoint::from_static("http://lvmd"),
                path: PathBuf::from(address),
            });
        }
        let endpoint = Endpoint::from_shared(format!("http://{address}")).map_err(|source| {
            LvmdError::InvalidAddress {
                address: address.to_owned(),
                source,
            }
        })?;
        Ok(Self::Tcp(endpoint))
    }

    async fn dial(&self) -> Result<Channel, tonic::transport::Error> {
        match self {
            Self::Tcp(endpoint) => endpoint.connect().await,
            Self::Unix { endpoint, path } => {
                endpoint
                    .connect_with_connector(UnixConnector::new(path))
                    .await
            }
        }
    }

    fn dial_lazy(&self) -> Channel {
        match self {
            Self::Tcp(endpoint) => endpoint.connect_lazy(),
            Self::Unix { endpoint, path } => {
                endpoint.connect_with_connector_lazy(UnixConnector::new(path))
            }
        }
    }
}

/// Connector that ignores the request URI and dials a unix socket.
#[derive(Clone)]
struct UnixConnector {
    path: Arc<Path>,
}

impl UnixConnector {
    fn new(path: &Path) -> Self {
        Self {
            path: Arc::from(path),
        }
    }
}

impl Service<Uri> for UnixConnector {
    type Response = TokioIo<UnixStream>;
    type Error = std::io::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _uri: Uri) -> Self::Future {
        let path = Arc::clone(&self.path);
        Box::pin(async move { Ok(TokioIo::new(UnixStream::connect(&*path).await?)) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// An address on loopback that refuses connections.
    fn closed_port() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        addr.to_string()
    }

    #[test]
    fn unix_socket_detection() {
        assert!(is_unix_socket("/run/lvmd/lvmd.sock"));
        assert!(!is_unix_socket("10.0.0.5:1736"));
        assert!(!is_unix_socket("[fd00::5]:1736"));
    }

    #[test]
    fn rejects_malformed_address() {
        let err = Target::parse("bad address:1736").err().unwrap();
        assert!(matches!(err, LvmdError::InvalidAddress { .. }));
    }

    #[tokio::test]
    async fn timeout_returns_connection_and_defers_failure() {
        let address = closed_port();
        let started = std::time::Instant::now();
        let conn = connect(&address, Duration::from_millis(300)).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(250));
        assert_eq!(conn.address(), address);

        let err = conn.get_lv("lvmvg", "vol-1").await.unwrap_err();
        assert!(matches!(err, LvmdError::Rpc { method: "ListLV", .. }));
    }

    #[tokio::test]
    async fn missing_unix_socket_defers_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let socket = tmp.path().join("lvmd.sock");
        let address = socket.to_str().unwrap().to_owned();

        let conn = connect(&address, Duration::from_millis(200)).await.unwrap();
        let err = conn.remove_lv("lvmvg", "vol-1").await.unwrap_err();
        assert!(matches!(err, LvmdError::Rpc { method: "RemoveLV", .. }));
    }

    #[tokio::test]
    async fn connector_boxes_connection() {
        let connector = GrpcConnector::new(Duration::from_millis(100));
        let conn = connector.connect(&closed_port()).await.unwrap();
        let opts = LvmOptions {
            volume_group: "lvmvg".into(),
            name: "vol-1".into(),
            size: 2 * 1024 * 1024,
            tags: vec![],
        };
        assert!(conn.create_lv(&opts).await.is_err());
    }
}
