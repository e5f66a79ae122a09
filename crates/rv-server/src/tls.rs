//! TLS for agent connections
//!
//! When the TLS transport is selected a throwaway self-signed certificate
//! is generated at startup. Agents do not verify it; TLS only hides the
//! tunnel traffic on the wire.

use std::sync::{Arc, Once};

use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use time::OffsetDateTime;
use tokio_rustls::TlsAcceptor;

use rv_core::TunnelError;

static CRYPTO_PROVIDER_INIT: Once = Once::new();

/// Certificate validity
const VALIDITY_DAYS: i64 = 365;

/// A certificate and its private key
pub struct TlsIdentity {
    pub cert: CertificateDer<'static>,
    pub key: PrivateKeyDer<'static>,
}

/// Generate a self-signed identity for `revsocks`
pub fn generate_self_signed() -> Result<TlsIdentity, TunnelError> {
    let mut params = CertificateParams::new(vec!["localhost".to_string()])
        .map_err(|e| TunnelError::Tls(format!("invalid certificate params: {}", e)))?;

    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, "revsocks");
    params.distinguished_name = dn;

    let now = OffsetDateTime::now_utc();
    params.not_before = now;
    params.not_after = now + time::Duration::days(VALIDITY_DAYS);

    let key_pair = KeyPair::generate()
        .map_err(|e| TunnelError::Tls(format!("key generation failed: {}", e)))?;
    let cert = params
        .self_signed(&key_pair)
        .map_err(|e| TunnelError::Tls(format!("certificate generation failed: {}", e)))?;

    Ok(TlsIdentity {
        cert: cert.der().clone(),
        key: PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der())),
    })
}

/// Build a TLS acceptor serving `identity`
pub fn acceptor(identity: TlsIdentity) -> Result<TlsAcceptor, TunnelError> {
    ensure_crypto_provider();

    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(vec![identity.cert], identity.key)
        .map_err(|e| TunnelError::Tls(format!("invalid cert/key: {}", e)))?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Acceptor backed by a freshly generated self-signed certificate
pub fn self_signed_acceptor() -> Result<TlsAcceptor, TunnelError> {
    acceptor(generate_self_signed()?)
}

fn ensure_crypto_provider() {
    CRYPTO_PROVIDER_INIT.call_once(|| {
        if rustls::crypto::ring::default_provider()
            .install_default()
            .is_err()
        {
            tracing::debug!("Rustls crypto provider already installed");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustls::pki_types::ServerName;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio_rustls::TlsConnector;

    #[test]
    fn test_generate_self_signed() {
        let identity = generate_self_signed().unwrap();
        assert!(!identity.cert.is_empty());
        assert!(acceptor(identity).is_ok());
    }

    #[tokio::test]
    async fn test_tls_handshake_with_trusted_cert() {
        let identity = generate_self_signed().unwrap();
        let mut roots = rustls::RootCertStore::empty();
        roots.add(identity.cert.clone()).unwrap();
        let acceptor = acceptor(identity).unwrap();

        let client_config = rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        let connector = TlsConnector::from(Arc::new(client_config));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut tls = acceptor.accept(socket).await.unwrap();
            let mut buf = [0u8; 5];
            tls.read_exact(&mut buf).await.unwrap();
            buf
        });

        let socket = TcpStream::connect(addr).await.unwrap();
        let name = ServerName::try_from("localhost").unwrap();
        let mut tls = connector.connect(name, socket).await.unwrap();
        tls.write_all(b"hello").await.unwrap();
        tls.flush().await.unwrap();

        assert_eq!(&server.await.unwrap(), b"hello");
    }
}
