use std::io::{ErrorKind as IoKind, Read, Write};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use sink_api::{Codec, ErrorKind, FrameScan, Framing, Message, SinkError, TransportStream};

use crate::{Endpoint, PipelineError, Printer};

// ═══════════════════════════════════════════════════════════════
//  MessageStream: transport stream → framing → codec
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    Open,
    Closed,
    Interrupted,
    Failed,
}

/// Ленивая последовательность сообщений из одного соединения.
///
/// `None` = peer закрыл соединение или запрошена остановка.
/// После первой ошибки (I/O или битые данные) итератор исчерпан.
pub struct MessageStream {
    stream: Box<dyn TransportStream>,
    framing: Arc<dyn Framing>,
    codec: Arc<dyn Codec>,
    token: CancellationToken,
    buf: Vec<u8>,
    tmp: Vec<u8>,
    scan: FrameScan,
    /// Смещение начала `buf` от начала соединения.
    consumed: u64,
    decoded: u64,
    bytes_read: u64,
    state: StreamState,
}

impl MessageStream {
    pub fn new(
        stream: Box<dyn TransportStream>,
        framing: Arc<dyn Framing>,
        codec: Arc<dyn Codec>,
        token: CancellationToken,
    ) -> Self {
        Self {
            stream,
            framing,
            codec,
            token,
            buf: Vec::with_capacity(8192),
            tmp: vec![0u8; 4096],
            scan: FrameScan::default(),
            consumed: 0,
            decoded: 0,
            bytes_read: 0,
            state: StreamState::Open,
        }
    }

    /// Сколько сообщений успешно декодировано.
    pub fn decoded(&self) -> u64 {
        self.decoded
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    pub fn is_interrupted(&self) -> bool {
        self.state == StreamState::Interrupted
    }

    fn fail(&mut self, e: SinkError) -> Option<Result<Message, SinkError>> {
        self.state = StreamState::Failed;
        Some(Err(e))
    }

    fn fail_frame(&mut self, e: SinkError) -> Option<Result<Message, SinkError>> {
        let at = self.consumed;
        self.fail(e.with_context(format!("frame at byte {at}")))
    }
}

impl Iterator for MessageStream {
    type Item = Result<Message, SinkError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state != StreamState::Open {
            return None;
        }

        loop {
            match self.framing.decode(&self.buf, &mut self.scan) {
                Ok(Some((frame, consumed))) => {
                    return match self.codec.decode(&frame) {
                        Ok(msg) => {
                            self.buf.drain(..consumed);
                            self.consumed += consumed as u64;
                            self.decoded += 1;
                            Some(Ok(msg))
                        }
                        Err(e) => self.fail_frame(e),
                    };
                }
                Ok(None) => {}
                Err(e) => return self.fail_frame(e),
            }

            if self.token.is_cancelled() {
                self.state = StreamState::Interrupted;
                return None;
            }

            match self.stream.read(&mut self.tmp) {
                Ok(0) => {
                    if !self.buf.is_empty() {
                        tracing::warn!(
                            bytes = self.buf.len(),
                            "connection closed mid-message, discarding partial data"
                        );
                    }
                    self.state = StreamState::Closed;
                    return None;
                }
                Ok(n) => {
                    self.buf.extend_from_slice(&self.tmp[..n]);
                    self.bytes_read += n as u64;
                }
                // read timeout = точка проверки отмены
                Err(e) if matches!(e.kind(), IoKind::WouldBlock | IoKind::TimedOut | IoKind::Interrupted) => {}
                Err(e) => return self.fail(e.into()),
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Record sink: accept one connection, print every message
// ═══════════════════════════════════════════════════════════════

/// Чем закончилась сессия.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkOutcome {
    /// Peer закрыл соединение.
    Closed { messages: u64 },
    /// Остановка по сигналу / токену.
    Interrupted { messages: u64 },
}

impl SinkOutcome {
    pub fn messages(&self) -> u64 {
        match self {
            SinkOutcome::Closed { messages } | SinkOutcome::Interrupted { messages } => *messages,
        }
    }
}

/// Блокирующий цикл: accept одного клиента → decode → print.
///
/// Endpoint должен быть уже запущен (`Endpoint::start`). После первого
/// accept транспорт останавливается, повторные подключения не принимаются.
pub fn run_record_sink<W: Write>(
    mut endpoint: Endpoint,
    printer: &mut Printer<W>,
    token: &CancellationToken,
) -> Result<SinkOutcome, PipelineError> {
    let name = endpoint.name.clone();

    let accepted = endpoint.transport.next_connection().map_err(|e| PipelineError::Transport {
        endpoint: name.clone(),
        source: e,
    })?;
    if let Err(e) = endpoint.transport.stop() {
        tracing::warn!(endpoint = %name, error = ?e, "transport stop error");
    }

    let Some(stream) = accepted else {
        tracing::info!(endpoint = %name, "stopped before any client connected");
        return Ok(SinkOutcome::Interrupted { messages: 0 });
    };

    let peer = stream.peer_info();
    tracing::info!(endpoint = %name, %peer, "new connection");

    let mut messages = MessageStream::new(
        stream,
        endpoint.framing.clone(),
        endpoint.codec.clone(),
        token.clone(),
    );

    // ошибка всегда последний элемент, её номер = число успешных + 1
    for (i, item) in messages.by_ref().enumerate() {
        match item {
            Ok(msg) => {
                if !msg.extra().is_empty() {
                    tracing::debug!(%peer, extra = msg.extra().len(), "extra fields not printed");
                }
                printer.print(&msg)?;
            }
            Err(e) => {
                tracing::error!(endpoint = %name, %peer, error = ?e, "session failed");
                return Err(match e.kind() {
                    ErrorKind::Format => PipelineError::Decode {
                        peer,
                        index: i as u64 + 1,
                        source: e,
                    },
                    _ => PipelineError::Read { peer, source: e },
                });
            }
        }
    }

    let count = messages.decoded();
    tracing::info!(
        endpoint = %name,
        %peer,
        messages = count,
        printed = printer.lines(),
        bytes = messages.bytes_read(),
        "connection closed"
    );

    if messages.is_interrupted() {
        Ok(SinkOutcome::Interrupted { messages: count })
    } else {
        Ok(SinkOutcome::Closed { messages: count })
    }
}

/// Запустить record sink в blocking-потоке.
pub fn spawn_record_sink<W>(
    endpoint: Endpoint,
    out: W,
    token: CancellationToken,
) -> JoinHandle<Result<SinkOutcome, PipelineError>>
where
    W: Write + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut printer = Printer::new(out);
        run_record_sink(endpoint, &mut printer, &token)
    })
}
