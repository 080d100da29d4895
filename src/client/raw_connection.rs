//! Blocking TCP/TLS connection to a single node
//!
//! One `RawConnection` is one socket to one cluster member. The TCP
//! variant splits into buffered reader/writer halves; TLS uses a single
//! stream since native-tls streams can't be cloned.

use std::io::{self, BufReader, BufWriter, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::client::resp::{RespDecoder, RespEncoder, RespValue};
use crate::config::{AuthConfig, ServerAddress, TlsOptions};
use crate::error::ConnectionError;

pub enum RawConnection {
    Tcp {
        writer: BufWriter<TcpStream>,
        reader: BufReader<TcpStream>,
    },
    #[cfg(feature = "native-tls-backend")]
    Tls {
        stream: BufReader<native_tls::TlsStream<TcpStream>>,
    },
}

impl RawConnection {
    /// Open a plain TCP connection
    pub fn connect_tcp(addr: &ServerAddress, timeouts: &Timeouts) -> Result<Self, ConnectionError> {
        let stream = open_socket(addr, timeouts)?;

        let writer = BufWriter::with_capacity(
            16 * 1024,
            stream.try_clone().map_err(|e| connect_failed(addr, e))?,
        );
        let reader = BufReader::with_capacity(16 * 1024, stream);

        Ok(RawConnection::Tcp { writer, reader })
    }

    /// Open a TLS connection
    #[cfg(feature = "native-tls-backend")]
    pub fn connect_tls(
        addr: &ServerAddress,
        timeouts: &Timeouts,
        tls: &TlsOptions,
    ) -> Result<Self, ConnectionError> {
        use native_tls::{Certificate, Identity, TlsConnector};

        let mut builder = TlsConnector::builder();

        if !tls.verify_peer {
            builder.danger_accept_invalid_certs(true);
        }
        if !tls.verify_peer_name {
            builder.danger_accept_invalid_hostnames(true);
        }

        if let Some(ref ca_path) = tls.ca_file {
            let ca_data = std::fs::read(ca_path)
                .map_err(|e| ConnectionError::TlsFailed(format!("Failed to read CA file: {}", e)))?;
            let cert = Certificate::from_pem(&ca_data)
                .map_err(|e| ConnectionError::TlsFailed(format!("Invalid CA file: {}", e)))?;
            builder.add_root_certificate(cert);
        }

        if let (Some(ref cert_path), Some(ref key_path)) = (&tls.local_cert, &tls.local_pk) {
            let cert_data = std::fs::read(cert_path).map_err(|e| {
                ConnectionError::TlsFailed(format!("Failed to read client cert: {}", e))
            })?;
            let key_data = std::fs::read(key_path).map_err(|e| {
                ConnectionError::TlsFailed(format!("Failed to read client key: {}", e))
            })?;
            let identity = Identity::from_pkcs8(&cert_data, &key_data).map_err(|e| {
                ConnectionError::TlsFailed(format!("Invalid client identity: {}", e))
            })?;
            builder.identity(identity);
        }

        let connector = builder
            .build()
            .map_err(|e| ConnectionError::TlsFailed(format!("Failed to build connector: {}", e)))?;

        let tcp_stream = open_socket(addr, timeouts)?;

        let sni_host = tls.peer_name.as_deref().unwrap_or(&addr.host);
        let tls_stream = connector
            .connect(sni_host, tcp_stream)
            .map_err(|e| ConnectionError::TlsFailed(format!("Handshake failed: {}", e)))?;

        Ok(RawConnection::Tls {
            stream: BufReader::with_capacity(16 * 1024, tls_stream),
        })
    }

    /// Send one encoded command and decode one reply
    pub fn execute_encoded(&mut self, encoder: &RespEncoder) -> io::Result<RespValue> {
        match self {
            RawConnection::Tcp { writer, reader } => {
                writer.write_all(encoder.as_bytes())?;
                writer.flush()?;
                RespDecoder::new(reader).decode()
            }
            #[cfg(feature = "native-tls-backend")]
            RawConnection::Tls { stream } => {
                stream.get_mut().write_all(encoder.as_bytes())?;
                stream.get_mut().flush()?;
                RespDecoder::new(stream).decode()
            }
        }
    }
}

/// Connect-time and per-operation IO timeouts
#[derive(Debug, Clone)]
pub struct Timeouts {
    pub connect: Duration,
    pub io: Duration,
}

fn open_socket(addr: &ServerAddress, timeouts: &Timeouts) -> Result<TcpStream, ConnectionError> {
    let socket_addr = (addr.host.as_str(), addr.port)
        .to_socket_addrs()
        .map_err(|e| connect_failed(addr, e))?
        .next()
        .ok_or_else(|| {
            connect_failed(
                addr,
                io::Error::new(io::ErrorKind::NotFound, "No addresses found"),
            )
        })?;

    let stream = TcpStream::connect_timeout(&socket_addr, timeouts.connect)
        .map_err(|e| connect_failed(addr, e))?;

    stream.set_nodelay(true).ok();
    stream.set_read_timeout(Some(timeouts.io)).ok();
    stream.set_write_timeout(Some(timeouts.io)).ok();

    Ok(stream)
}

fn connect_failed(addr: &ServerAddress, source: io::Error) -> ConnectionError {
    ConnectionError::ConnectFailed {
        host: addr.host.clone(),
        port: addr.port,
        source,
    }
}

/// Factory carrying the normalized connection parameters
///
/// Produces authenticated, database-selected connections to any node
/// address. One factory is shared by the whole cluster session.
#[derive(Clone)]
pub struct ConnectionFactory {
    pub timeouts: Timeouts,
    pub tls: Option<TlsOptions>,
    pub auth: Option<AuthConfig>,
    /// SELECTed after connect; `None` in cluster mode where the keyspace
    /// is always database 0
    pub database: Option<u32>,
}

impl ConnectionFactory {
    /// Open, authenticate, and prepare a connection to `addr`
    pub fn create(&self, addr: &ServerAddress) -> Result<RawConnection, ConnectionError> {
        use crate::client::commands::CommandsExt;

        let mut conn = match &self.tls {
            #[cfg(feature = "native-tls-backend")]
            Some(tls) => RawConnection::connect_tls(addr, &self.timeouts, tls)?,
            #[cfg(not(feature = "native-tls-backend"))]
            Some(_) => {
                return Err(ConnectionError::TlsFailed(
                    "TLS support not compiled in".to_string(),
                ));
            }
            None => RawConnection::connect_tcp(addr, &self.timeouts)?,
        };

        if let Some(ref auth) = self.auth {
            conn.auth(&auth.password, auth.username.as_deref())
                .map_err(|e| ConnectionError::AuthFailed(e.to_string()))?;
        }

        if let Some(db) = self.database {
            conn.select_db(db).map_err(|e| connect_failed(addr, e))?;
        }

        Ok(conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::commands::CommandsExt;

    // These tests require a running Valkey/Redis server and are ignored
    // by default.

    fn local_timeouts() -> Timeouts {
        Timeouts {
            connect: Duration::from_secs(5),
            io: Duration::from_secs(30),
        }
    }

    #[test]
    #[ignore]
    fn test_tcp_connection() {
        let addr = ServerAddress::new("127.0.0.1", 6379);
        let mut conn =
            RawConnection::connect_tcp(&addr, &local_timeouts()).expect("Failed to connect");
        assert!(conn.ping().expect("Ping failed"));
    }

    #[test]
    #[ignore]
    fn test_connection_factory() {
        let factory = ConnectionFactory {
            timeouts: local_timeouts(),
            tls: None,
            auth: None,
            database: Some(0),
        };
        let mut conn = factory
            .create(&ServerAddress::new("127.0.0.1", 6379))
            .expect("Failed to connect");
        assert!(conn.ping().expect("Ping failed"));
    }
}
