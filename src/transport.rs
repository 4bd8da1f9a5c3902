//! # Transport
//!
//! The network calls an attempt makes. [Transport::connect] opens the connection (TCP and TLS)
//! and the GET then runs over that same connection, so each phase can be timed on its own

use super::Error;
use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt};
use http_body_util::{BodyExt, Empty};
use hyper::ext::ReasonPhrase;
use hyper::{header, StatusCode};
use hyper_util::rt::TokioIo;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{self, ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tracing::debug;

/// Connect and request timeout used unless configured otherwise
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(3000);

pub const HTTPS_PORT: u16 = 443;

/// What came back from a GET
#[derive(Clone, Debug, Default)]
pub struct Response {
    pub status: u16,
    pub reason: String,
    pub body: Bytes,
}

/// Network access used by the [Driver](super::Driver)
pub trait Transport: Send + Sync {
    type Connection: Connection;

    /// Resolve and connect to `endpoint`, failing on bad hosts, refusals, handshake errors and
    /// timeouts
    fn connect<'a>(&'a self, endpoint: &'a str) -> BoxFuture<'a, Result<Self::Connection, Error>>;
}

/// An open connection, good for exactly one request
pub trait Connection: Send + 'static {
    /// Issue a GET for `path` over this connection
    fn get(self, path: &str) -> BoxFuture<'_, Result<Response, Error>>;
}

/// [Transport] over HTTPS: tokio TCP, rustls TLS and an HTTP/1.1 exchange through hyper
pub struct HttpsTransport {
    tls: TlsConnector,
    timeout: Duration,
    port: u16,
}

impl HttpsTransport {
    pub fn new(timeout: Duration) -> Result<Self, Error> {
        let roots = RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };
        let mut config = ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()?
            .with_root_certificates(roots)
            .with_no_client_auth();
        config.alpn_protocols = vec![b"http/1.1".to_vec()];

        Ok(Self {
            tls: TlsConnector::from(Arc::new(config)),
            timeout,
            port: HTTPS_PORT,
        })
    }

    /// Connect somewhere other than 443
    pub fn with_port(self, port: u16) -> Self {
        Self { port, ..self }
    }
}

impl Transport for HttpsTransport {
    type Connection = HttpsConnection;

    fn connect<'a>(&'a self, endpoint: &'a str) -> BoxFuture<'a, Result<HttpsConnection, Error>> {
        async move {
            let server_name = ServerName::try_from(endpoint.to_string())?;
            let handshake = async {
                let tcp = TcpStream::connect((endpoint, self.port)).await?;
                self.tls.connect(server_name, tcp).await
            };
            let stream = tokio::time::timeout(self.timeout, handshake)
                .await
                .map_err(|_| format!("timed out connecting to {endpoint}"))??;

            Ok::<_, Error>(HttpsConnection {
                host: endpoint.to_string(),
                stream,
                timeout: self.timeout,
            })
        }
        .boxed()
    }
}

/// TLS session opened by [HttpsTransport::connect](Transport::connect)
pub struct HttpsConnection {
    host: String,
    stream: TlsStream<TcpStream>,
    timeout: Duration,
}

impl Connection for HttpsConnection {
    fn get(self, path: &str) -> BoxFuture<'_, Result<Response, Error>> {
        async move {
            let HttpsConnection { host, stream, timeout } = self;
            tokio::time::timeout(timeout, exchange(stream, &host, path))
                .await
                .map_err(|_| format!("timed out waiting for {host}"))?
        }
        .boxed()
    }
}

/// Send one GET over `stream` and read the whole response
///
/// A server that answers with a 1xx status and then closes the connection is reported with
/// that status rather than as a failure
pub async fn exchange<S>(stream: S, host: &str, path: &str) -> Result<Response, Error>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sender, connection) = hyper::client::conn::http1::handshake::<_, Empty<Bytes>>(TokioIo::new(stream)).await?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            debug!("connection closed: {e}");
        }
    });

    let mut request = hyper::Request::get(path)
        .header(header::HOST, host)
        .body(Empty::<Bytes>::new())?;

    let informational = Arc::new(Mutex::new(None::<StatusCode>));
    let seen = informational.clone();
    hyper::ext::on_informational(&mut request, move |response| {
        if let Ok(mut seen) = seen.lock() {
            *seen = Some(response.status());
        }
    });

    sender.ready().await?;
    let response = match sender.send_request(request).await {
        Ok(response) => response,
        Err(e) => {
            let status = informational.lock().ok().and_then(|seen| *seen);
            return match status {
                Some(status) => Ok(Response {
                    status: status.as_u16(),
                    reason: status.canonical_reason().unwrap_or_default().to_string(),
                    body: Bytes::new(),
                }),
                None => Err(e.into()),
            };
        }
    };

    let status = response.status();
    let reason = match response.extensions().get::<ReasonPhrase>() {
        Some(reason) => String::from_utf8_lossy(reason.as_bytes()).into_owned(),
        None => status.canonical_reason().unwrap_or_default().to_string(),
    };
    let body = response.into_body().collect().await?.to_bytes();

    Ok(Response {
        status: status.as_u16(),
        reason,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
    use tokio::net::TcpListener;

    /// Read one request head from `server`, answer with `reply` and hang up
    async fn answer(mut server: DuplexStream, reply: &'static str) -> String {
        let mut head = Vec::new();
        let mut buf = [0u8; 1024];
        while !head.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = server.read(&mut buf).await.unwrap();
            assert!(n > 0, "client hung up before sending a request");
            head.extend_from_slice(&buf[..n]);
        }
        server.write_all(reply.as_bytes()).await.unwrap();
        server.shutdown().await.unwrap();
        String::from_utf8(head).unwrap()
    }

    #[tokio::test]
    async fn malformed_host_fails_to_connect() {
        let transport = HttpsTransport::new(DEFAULT_TIMEOUT).unwrap();
        let err = transport.connect("inv@lid").await.err().unwrap();
        assert!(!err.to_string().is_empty());
    }

    #[tokio::test]
    async fn get_runs_over_the_given_stream() {
        let (client, server) = tokio::io::duplex(4096);
        let server = tokio::spawn(answer(
            server,
            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 12\r\n\r\n{\"uuid\":\"a\"}",
        ));

        let response = exchange(client, "httpbin.org", "/uuid").await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.reason, "OK");
        assert_eq!(&response.body[..], br#"{"uuid":"a"}"#);

        let head = server.await.unwrap().to_lowercase();
        assert!(head.starts_with("get /uuid http/1.1\r\n"), "{head}");
        assert!(head.contains("host: httpbin.org\r\n"), "{head}");
    }

    #[tokio::test]
    async fn reason_phrase_comes_from_the_status_line() {
        let (client, server) = tokio::io::duplex(4096);
        tokio::spawn(answer(
            server,
            "HTTP/1.1 418 I'M A TEAPOT\r\ncontent-length: 14\r\n\r\n-=[ teapot ]=-",
        ));

        let response = exchange(client, "httpbin.org", "/status/418").await.unwrap();
        assert_eq!(response.status, 418);
        assert_eq!(response.reason, "I'M A TEAPOT");
        assert_eq!(&response.body[..], b"-=[ teapot ]=-");
    }

    #[tokio::test]
    async fn bare_informational_status_is_a_response() {
        let (client, server) = tokio::io::duplex(4096);
        tokio::spawn(answer(server, "HTTP/1.1 102 PROCESSING\r\n\r\n"));

        let response = exchange(client, "httpbin.org", "/status/102,203,303,418,505")
            .await
            .unwrap();
        assert_eq!(response.status, 102);
        assert_eq!(response.reason, "Processing");
        assert!(response.body.is_empty());
    }

    #[tokio::test]
    async fn dropped_connection_without_status_fails() {
        let (client, server) = tokio::io::duplex(4096);
        tokio::spawn(answer(server, ""));

        assert!(exchange(client, "httpbin.org", "/uuid").await.is_err());
    }

    #[tokio::test]
    async fn connect_opens_a_single_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accepted = Arc::new(AtomicUsize::new(0));

        let counter = accepted.clone();
        tokio::spawn(async move {
            // Not a TLS server: every handshake fails once the socket is dropped
            while let Ok((socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                drop(socket);
            }
        });

        let transport = HttpsTransport::new(DEFAULT_TIMEOUT).unwrap().with_port(port);
        assert!(transport.connect("127.0.0.1").await.is_err());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(accepted.load(Ordering::SeqCst), 1);
    }
}
