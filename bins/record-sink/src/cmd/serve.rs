use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use sink_pipeline::{Endpoint, PipelineError, SinkOutcome, spawn_record_sink};
use transport_tcp_server::TcpServerTransport;

use crate::config::Effective;
use crate::error::ServerError;

pub async fn run(eff: Effective) -> Result<SinkOutcome, ServerError> {
    tracing::info!("record-sink starting");

    // --- CancellationToken для остановки по Ctrl+C ---
    let token = CancellationToken::new();

    let transport = TcpServerTransport::new(&eff.listen, token.clone());
    let mut endpoint = Endpoint::new(
        "forward",
        Box::new(transport),
        Arc::new(eff.codec.framing()),
        Arc::new(eff.codec.codec()),
    );
    endpoint.start()?;

    let mut handle = spawn_record_sink(endpoint, std::io::stdout(), token.clone());

    let outcome = tokio::select! {
        res = &mut handle => res.map_err(PipelineError::from)??,
        sig = tokio::signal::ctrl_c() => {
            sig?;
            tracing::info!("interrupted, shutting down");
            token.cancel();
            // токен проверяется только между read; если worker висит в write
            // в переполненный stdout pipe, join ждёт, пока читатель его разберёт
            handle.await.map_err(PipelineError::from)??
        }
    };

    tracing::info!(messages = outcome.messages(), "shutdown complete");
    Ok(outcome)
}
