//! HTTP client for the daemon's control endpoint

use std::io;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::client::conn::http1;
use hyper::header::{CONTENT_TYPE, HOST};
use hyper::{Method, Request, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use rv_core::control::{
    CloseRequest, ConnectionInfo, ControlEndpoint, ErrorBody, StatusBody, CLOSE_PATH,
    CONNECTIONS_PATH, SHUTDOWN_PATH,
};

/// Errors talking to the daemon
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Nothing is listening on the endpoint
    #[error("cannot reach revsocks at {endpoint}: {source}")]
    Unreachable {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    /// The daemon has no tunnel with this id
    #[error("connection {0} not found")]
    NotFound(String),

    #[error("control request failed: {0}")]
    Http(#[from] hyper::Error),

    #[error("failed to build request: {0}")]
    Request(String),

    /// Any other non-success answer
    #[error("daemon answered {status}: {message}")]
    Status { status: StatusCode, message: String },

    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Client for one control endpoint
///
/// Each call opens a fresh connection; the daemon is local and calls are
/// rare, so there is nothing to pool.
#[derive(Debug, Clone)]
pub struct ControlClient {
    endpoint: ControlEndpoint,
}

impl ControlClient {
    pub fn new(endpoint: ControlEndpoint) -> Self {
        Self { endpoint }
    }

    pub fn endpoint(&self) -> &ControlEndpoint {
        &self.endpoint
    }

    /// `GET /connections`
    pub async fn list_connections(&self) -> Result<Vec<ConnectionInfo>, ClientError> {
        let (status, body) = self.send(Method::GET, CONNECTIONS_PATH, None).await?;
        if !status.is_success() {
            return Err(status_error(status, &body));
        }
        Ok(serde_json::from_slice(&body)?)
    }

    /// `POST /close` for one tunnel id
    pub async fn close_connection(&self, id: &str) -> Result<(), ClientError> {
        let request = serde_json::to_vec(&CloseRequest { id: id.to_string() })?;
        let (status, body) = self.send(Method::POST, CLOSE_PATH, Some(request)).await?;
        match status {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(ClientError::NotFound(id.to_string())),
            s => Err(status_error(s, &body)),
        }
    }

    /// `POST /shutdown`; returns the daemon's status text
    pub async fn shutdown(&self) -> Result<String, ClientError> {
        let (status, body) = self.send(Method::POST, SHUTDOWN_PATH, None).await?;
        if !status.is_success() {
            return Err(status_error(status, &body));
        }
        let reply: StatusBody = serde_json::from_slice(&body)?;
        Ok(reply.status)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<(StatusCode, Bytes), ClientError> {
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header(HOST, "localhost");
        if body.is_some() {
            builder = builder.header(CONTENT_TYPE, "application/json");
        }
        let request = builder
            .body(Full::new(Bytes::from(body.unwrap_or_default())))
            .map_err(|e| ClientError::Request(e.to_string()))?;

        match &self.endpoint {
            ControlEndpoint::Tcp(addr) => {
                let stream = TcpStream::connect(addr)
                    .await
                    .map_err(|e| self.unreachable(e))?;
                exchange(stream, request).await
            }
            #[cfg(unix)]
            ControlEndpoint::Unix(path) => {
                let stream = tokio::net::UnixStream::connect(path)
                    .await
                    .map_err(|e| self.unreachable(e))?;
                exchange(stream, request).await
            }
            #[cfg(not(unix))]
            ControlEndpoint::Unix(_) => Err(self.unreachable(io::Error::new(
                io::ErrorKind::Unsupported,
                "unix sockets are not available on this platform",
            ))),
        }
    }

    fn unreachable(&self, source: io::Error) -> ClientError {
        ClientError::Unreachable {
            endpoint: self.endpoint.to_string(),
            source,
        }
    }
}

async fn exchange<S>(
    stream: S,
    request: Request<Full<Bytes>>,
) -> Result<(StatusCode, Bytes), ClientError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sender, conn) = http1::handshake(TokioIo::new(stream)).await?;
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            tracing::debug!(error = %e, "control connection closed");
        }
    });

    let response = sender.send_request(request).await?;
    let status = response.status();
    let body = response.into_body().collect().await?.to_bytes();
    Ok((status, body))
}

fn status_error(status: StatusCode, body: &[u8]) -> ClientError {
    let message = serde_json::from_slice::<ErrorBody>(body)
        .map(|e| e.error)
        .unwrap_or_else(|_| String::from_utf8_lossy(body).into_owned());
    ClientError::Status { status, message }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_tcp_endpoint() {
        // Bind then drop to get a port nobody listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = ControlClient::new(ControlEndpoint::Tcp(addr));
        let err = client.list_connections().await.unwrap_err();
        assert!(matches!(err, ClientError::Unreachable { .. }));
        assert!(err.to_string().contains(&addr.to_string()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_missing_socket_is_unreachable() {
        let dir = tempfile::TempDir::new().unwrap();
        let client = ControlClient::new(ControlEndpoint::Unix(dir.path().join("none.sock")));
        assert!(matches!(
            client.shutdown().await,
            Err(ClientError::Unreachable { .. })
        ));
    }

    #[test]
    fn test_status_error_prefers_error_body() {
        let err = status_error(StatusCode::BAD_REQUEST, br#"{"error":"bad id"}"#);
        assert_eq!(err.to_string(), "daemon answered 400 Bad Request: bad id");

        let err = status_error(StatusCode::BAD_GATEWAY, b"upstream");
        assert!(err.to_string().ends_with("upstream"));
    }
}
