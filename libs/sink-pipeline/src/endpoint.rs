use std::net::SocketAddr;
use std::sync::Arc;

use sink_api::{Codec, Framing, Transport};

use crate::PipelineError;

/// Endpoint: transport + framing + codec.
pub struct Endpoint {
    pub name: String,
    pub transport: Box<dyn Transport>,
    pub framing: Arc<dyn Framing>,
    pub codec: Arc<dyn Codec>,
}

impl Endpoint {
    pub fn new(
        name: &str,
        transport: Box<dyn Transport>,
        framing: Arc<dyn Framing>,
        codec: Arc<dyn Codec>,
    ) -> Self {
        Self {
            name: name.to_string(),
            transport,
            framing,
            codec,
        }
    }

    /// Bind/listen. Ошибка здесь фатальна для процесса.
    pub fn start(&mut self) -> Result<(), PipelineError> {
        self.transport.start().map_err(|e| PipelineError::Transport {
            endpoint: self.name.clone(),
            source: e,
        })?;
        tracing::info!(endpoint = %self.name, "transport started");
        Ok(())
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.transport.local_addr()
    }
}
