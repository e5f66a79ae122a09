//! Magic-preamble gate
//!
//! The first four bytes an agent sends must match [`MAGIC_PREAMBLE`].
//! Anything else, including silence past the deadline, gets the socket
//! dropped without a single byte written back.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsAcceptor;

use rv_core::HandshakeError;

/// Bytes every agent sends first
pub const MAGIC_PREAMBLE: [u8; 4] = [0x1b, 0xc3, 0xbd, 0x0f];

/// Byte stream an agent session can run over
pub trait AgentIo: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> AgentIo for T {}

/// An accepted agent connection, plain or TLS
pub type AgentConnection = Box<dyn AgentIo>;

/// Read and check the preamble
pub async fn read_preamble<R>(io: &mut R) -> Result<(), HandshakeError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut preamble = [0u8; 4];
    io.read_exact(&mut preamble)
        .await
        .map_err(HandshakeError::Io)?;
    if preamble != MAGIC_PREAMBLE {
        return Err(HandshakeError::BadPreamble(preamble));
    }
    Ok(())
}

/// Upgrade `socket` (when `tls` is set) and validate the preamble
///
/// Both steps share the single `deadline`.
pub async fn accept_agent(
    socket: TcpStream,
    tls: Option<&TlsAcceptor>,
    deadline: Duration,
) -> Result<AgentConnection, HandshakeError> {
    let handshake = async {
        let mut io: AgentConnection = match tls {
            Some(acceptor) => Box::new(
                acceptor
                    .accept(socket)
                    .await
                    .map_err(HandshakeError::Tls)?,
            ),
            None => Box::new(socket),
        };
        read_preamble(&mut io).await?;
        Ok::<_, HandshakeError>(io)
    };

    tokio::time::timeout(deadline, handshake)
        .await
        .map_err(|_| HandshakeError::Timeout(deadline))?
}
