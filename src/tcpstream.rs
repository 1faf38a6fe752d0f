extern crate openssl;

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use log::{debug, info};
use openssl::ssl::{HandshakeError, SslConnector, SslMethod, SslStream, SslVerifyMode};

use crate::error::{Error, Result};

/// A byte stream a session can own.
pub trait Transport: Read + Write {
    /// Orderly shutdown of both directions. The session drops the transport
    /// right after, which closes it.
    fn shutdown(&mut self) -> io::Result<()>;
}

pub type TlsStream = SslStream<TcpStream>;

impl Transport for TlsStream {
    fn shutdown(&mut self) -> io::Result<()> {
        // Servers commonly hang up right after +OK to QUIT, so a failed
        // close_notify is expected.
        if let Err(err) = SslStream::shutdown(self) {
            debug!("TLS close_notify not delivered: {}", err);
        }
        match self.get_ref().shutdown(Shutdown::Both) {
            Err(ref err) if err.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}

/// Opens a TCP connection to `host:port` and performs the TLS handshake
/// immediately (POP3S, no STARTTLS).
///
/// `timeout` bounds the connect and every subsequent read/write. It only
/// protects against unresponsive peers; reply framing never depends on it.
pub fn connect_tls(
    host: &str,
    port: u16,
    timeout: Option<Duration>,
    accept_invalid_certs: bool,
) -> Result<TlsStream> {
    let context = format!("connect to {}:{}", host, port);
    let address = (host, port)
        .to_socket_addrs()
        .map_err(|e| Error::connection(context.as_str(), e))?
        .next()
        .ok_or_else(|| {
            Error::connection(
                context.as_str(),
                io::Error::new(io::ErrorKind::NotFound, "host not found"),
            )
        })?;

    info!("Connecting to {} at {}...", host, address);
    let tcp_stream = match timeout {
        Some(timeout) => TcpStream::connect_timeout(&address, timeout),
        None => TcpStream::connect(address),
    }
    .map_err(|e| Error::connection(context.as_str(), e))?;
    tcp_stream
        .set_read_timeout(timeout)
        .and_then(|_| tcp_stream.set_write_timeout(timeout))
        .map_err(|e| Error::connection(context.as_str(), e))?;

    debug!("Starting TLS handshake with {}", host);
    let context = format!("TLS handshake with {}", host);
    let mut connector = SslConnector::builder(SslMethod::tls())
        .map_err(|es| Error::connection(context.as_str(), tls_error(es)))?;
    if accept_invalid_certs {
        connector.set_verify(SslVerifyMode::NONE);
    }
    connector
        .build()
        .connect(host, tcp_stream)
        .map_err(|e| {
            let source = match e {
                HandshakeError::SetupFailure(es) => tls_error(es),
                HandshakeError::Failure(f) => f
                    .into_error()
                    .into_io_error()
                    .unwrap_or_else(tls_error),
                HandshakeError::WouldBlock(_) => {
                    io::Error::new(io::ErrorKind::WouldBlock, "handshake interrupted")
                }
            };
            Error::connection(context.as_str(), source)
        })
}

fn tls_error<E: std::fmt::Display>(err: E) -> io::Error {
    io::Error::new(io::ErrorKind::Other, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn connect_tls__to_closed_port__fails_with_connection_error() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        match connect_tls("127.0.0.1", port, Some(Duration::from_secs(5)), false) {
            Err(Error::Connection { .. }) => (),
            Err(other) => panic!("unexpected error {:?}", other),
            Ok(_) => panic!("connected to a closed port"),
        }
    }

    #[test]
    fn connect_tls__peer_hangs_up_during_handshake__fails_as_fatal() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            drop(stream);
        });

        let err = connect_tls("127.0.0.1", port, Some(Duration::from_secs(5)), true)
            .err()
            .expect("handshake against a silent peer succeeded");
        match err {
            Error::Connection { ref context, .. } => {
                assert_eq!("TLS handshake with 127.0.0.1", context)
            }
            ref other => panic!("unexpected error {:?}", other),
        }
        assert!(err.is_fatal());
        server.join().unwrap();
    }
}
