use sink_api::SinkError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("transport ({endpoint}): {source}")]
    Transport { endpoint: String, source: SinkError },

    #[error("read from {peer}: {source}")]
    Read { peer: String, source: SinkError },

    #[error("decode message #{index} from {peer}: {source}")]
    Decode { peer: String, index: u64, source: SinkError },

    #[error("output: {0}")]
    Output(#[from] std::io::Error),

    #[error("sink worker: {0}")]
    Join(#[from] tokio::task::JoinError),
}
