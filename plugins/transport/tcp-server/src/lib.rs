use std::io::ErrorKind as IoKind;
use std::net::{SocketAddr, TcpListener};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use sink_api::{SinkError, Transport, TransportStream};

/// Однократный TCP listener: принимает ровно одно соединение.
///
/// Listener неблокирующий, accept опрашивается с интервалом `poll_interval`,
/// чтобы отмена через `CancellationToken` срабатывала без ожидания клиента.
/// Принятый сокет снова блокирующий, но с read timeout того же интервала:
/// reader проверяет токен на каждом таймауте.
pub struct TcpServerTransport {
    addr: String,
    poll_interval: Duration,
    token: CancellationToken,
    listener: Option<TcpListener>,
}

impl TcpServerTransport {
    pub fn new(cfg: &TcpServerConfig, token: CancellationToken) -> Self {
        // IPv6 литерал требует скобок
        let addr = if cfg.host.contains(':') && !cfg.host.starts_with('[') {
            format!("[{}]:{}", cfg.host, cfg.port)
        } else {
            format!("{}:{}", cfg.host, cfg.port)
        };
        Self {
            addr,
            poll_interval: Duration::from_millis(cfg.poll_interval_ms.max(1)),
            token,
            listener: None,
        }
    }
}

impl Transport for TcpServerTransport {
    fn start(&mut self) -> Result<(), SinkError> {
        let listener = TcpListener::bind(&self.addr)
            .map_err(|e| SinkError::io(format!("bind {}: {e}", self.addr)))?;
        listener
            .set_nonblocking(true)
            .map_err(|e| SinkError::io(format!("set_nonblocking {}: {e}", self.addr)))?;
        let local = listener
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| self.addr.clone());
        tracing::info!(addr = %local, "tcp-server listening");
        self.listener = Some(listener);
        Ok(())
    }

    fn next_connection(&mut self) -> Result<Option<Box<dyn TransportStream>>, SinkError> {
        let listener = self.listener.as_ref().ok_or(SinkError::io("transport not started"))?;
        loop {
            if self.token.is_cancelled() {
                return Ok(None);
            }
            match listener.accept() {
                Ok((stream, addr)) => {
                    stream.set_nonblocking(false)?;
                    stream.set_read_timeout(Some(self.poll_interval))?;
                    tracing::info!(peer = %addr, "tcp-server client connected");
                    return Ok(Some(Box::new(stream)));
                }
                Err(e) if e.kind() == IoKind::WouldBlock || e.kind() == IoKind::Interrupted => {
                    std::thread::sleep(self.poll_interval);
                }
                Err(e) => return Err(SinkError::io(format!("accept error: {e}"))),
            }
        }
    }

    fn stop(&mut self) -> Result<(), SinkError> {
        if self.listener.take().is_some() {
            tracing::debug!(addr = %self.addr, "tcp-server listener closed");
        }
        Ok(())
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }
}

// ---- Config ----

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct TcpServerConfig {
    pub host: String,
    pub port: u16,
    /// Интервал проверки отмены для accept и read, мс.
    pub poll_interval_ms: u64,
}

impl Default for TcpServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 24224,
            poll_interval_ms: 100,
        }
    }
}

impl TcpServerConfig {
    pub fn validate(&self) -> Result<(), SinkError> {
        if self.host.is_empty() {
            return Err(SinkError::config("host must not be empty"));
        }
        if self.poll_interval_ms == 0 {
            return Err(SinkError::config("poll_interval_ms must be > 0"));
        }
        Ok(())
    }
}
