//! Built-in TCP backends
//!
//! `TcpBackend` holds one open stream to its endpoint for as long as it is
//! alive. Relational endpoints are probed with a plain TCP connect; cache
//! endpoints additionally have to answer a RESP `PING` with `+PONG`.
use crate::config::BackendSettings;
use crate::core::{Backend, BackendFactory};
use crate::error::BackendError;
use crate::routing::StoreKind;
use async_trait::async_trait;
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;

const PING_COMMAND: &[u8] = b"*1\r\n$4\r\nPING\r\n";

/// Live connection handed out for a TCP backend
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub name: String,
    pub addr: SocketAddr,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.addr)
    }
}

/// A backend reached over TCP
pub struct TcpBackend {
    endpoint: Endpoint,
    kind: StoreKind,
    timeout: Duration,
    stream: Mutex<Option<TcpStream>>,
}

impl TcpBackend {
    /// Resolve `settings` and open the backing stream
    pub async fn connect(kind: StoreKind, settings: &BackendSettings) -> Result<Self, BackendError> {
        let limit = settings.connect_timeout();
        let address = settings.endpoint.address.as_str();
        let addr = resolve(address, limit).await?;
        let stream = connect_stream(addr, limit).await?;

        Ok(Self {
            endpoint: Endpoint {
                name: settings.name().to_string(),
                addr,
            },
            kind,
            timeout: limit,
            stream: Mutex::new(Some(stream)),
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn kind(&self) -> StoreKind {
        self.kind
    }

    pub async fn is_open(&self) -> bool {
        self.stream.lock().await.is_some()
    }

    /// Send PING on a fresh connection and expect +PONG
    async fn ping(&self) -> Result<(), BackendError> {
        let stream = connect_stream(self.endpoint.addr, self.timeout).await?;
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        writer
            .write_all(PING_COMMAND)
            .await
            .map_err(|e| BackendError::probe(format!("failed to send PING: {}", e)))?;

        let mut response = String::new();
        match timeout(self.timeout, reader.read_line(&mut response)).await {
            Ok(Ok(_)) if response.trim() == "+PONG" => Ok(()),
            Ok(Ok(_)) => Err(BackendError::probe(format!(
                "unexpected PING response: {}",
                response.trim()
            ))),
            Ok(Err(e)) => Err(BackendError::probe(format!(
                "failed to read PING response: {}",
                e
            ))),
            Err(_) => Err(timeout_error(self.timeout)),
        }
    }
}

#[async_trait]
impl Backend for TcpBackend {
    type Connection = Endpoint;

    fn connection(&self) -> Endpoint {
        self.endpoint.clone()
    }

    async fn probe(&self) -> Result<(), BackendError> {
        if !self.is_open().await {
            return Err(BackendError::probe("backend is closed"));
        }

        match self.kind {
            StoreKind::Relational => {
                connect_stream(self.endpoint.addr, self.timeout).await?;
                Ok(())
            }
            StoreKind::Cache => self.ping().await,
        }
    }

    async fn close(&self) -> Result<(), BackendError> {
        let Some(mut stream) = self.stream.lock().await.take() else {
            return Ok(());
        };

        stream
            .shutdown()
            .await
            .map_err(|e| BackendError::operation("shutdown".to_string(), e.to_string()))
    }
}

/// Opens `TcpBackend`s for one store kind
#[derive(Debug, Clone, Copy)]
pub struct TcpBackendFactory {
    kind: StoreKind,
}

impl TcpBackendFactory {
    pub fn new(kind: StoreKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> StoreKind {
        self.kind
    }
}

#[async_trait]
impl BackendFactory for TcpBackendFactory {
    type Backend = TcpBackend;

    async fn open(&self, settings: &BackendSettings) -> Result<TcpBackend, BackendError> {
        tracing::debug!(
            backend = settings.name(),
            address = %settings.endpoint.address,
            kind = %self.kind,
            "opening backend"
        );
        TcpBackend::connect(self.kind, settings).await
    }
}

async fn resolve(address: &str, limit: Duration) -> Result<SocketAddr, BackendError> {
    let connect_error = |message: String| BackendError::Connect {
        address: address.to_string(),
        message,
    };

    let mut addrs = timeout(limit, tokio::net::lookup_host(address))
        .await
        .map_err(|_| timeout_error(limit))?
        .map_err(|e| connect_error(e.to_string()))?;

    addrs
        .next()
        .ok_or_else(|| connect_error("address did not resolve".to_string()))
}

async fn connect_stream(addr: SocketAddr, limit: Duration) -> Result<TcpStream, BackendError> {
    match timeout(limit, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(BackendError::Connect {
            address: addr.to_string(),
            message: e.to_string(),
        }),
        Err(_) => Err(timeout_error(limit)),
    }
}

fn timeout_error(limit: Duration) -> BackendError {
    BackendError::Timeout {
        timeout_ms: limit.as_millis() as u64,
    }
}
