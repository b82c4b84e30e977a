//! Общие типы record-sink: сообщение, рендеринг значений, ошибки и
//! трейты transport / framing / codec, из которых собирается pipeline.

pub mod error;
pub mod message;
pub mod render;

pub use error::{ErrorKind, SinkError};
pub use message::Message;
pub use render::{Inspect, Plain};
pub use rmpv::Value;

// ════════════════════════════════════════════════════════════════
//  Source Traits
// ════════════════════════════════════════════════════════════════

/// Входящее соединение, из которого читаются байты.
pub trait TransportStream: std::io::Read + Send {
    /// Описание удалённой стороны (для логирования).
    fn peer_info(&self) -> String {
        "unknown".into()
    }
}

impl TransportStream for std::net::TcpStream {
    fn peer_info(&self) -> String {
        self.peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "?".into())
    }
}

/// Transport: источник входящих соединений.
///
/// Все методы **блокирующие**, хост вызывает их из отдельного потока.
pub trait Transport: Send {
    /// Инициализировать транспорт (bind, listen).
    fn start(&mut self) -> Result<(), SinkError>;

    /// Получить следующее соединение. Блокирует до готовности.
    /// None = graceful shutdown.
    fn next_connection(&mut self) -> Result<Option<Box<dyn TransportStream>>, SinkError>;

    /// Остановить транспорт, новые соединения больше не принимаются.
    fn stop(&mut self) -> Result<(), SinkError>;

    /// Фактический адрес после `start()` (полезно при bind на порт 0).
    fn local_addr(&self) -> Option<std::net::SocketAddr> {
        None
    }
}

/// Докуда дошёл разбор незавершённого фрейма.
///
/// Хранится вызывающим рядом с буфером. Пока фрейм неполный, framing
/// продолжает с `offset`, а не с начала буфера, так что каждый байт
/// разбирается один раз. После выдачи фрейма framing сбрасывает состояние.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameScan {
    /// Сколько байт от начала буфера уже разобрано.
    pub offset: usize,
    /// Сколько значений осталось прочитать до конца фрейма.
    pub pending: u64,
}

impl Default for FrameScan {
    fn default() -> Self {
        Self { offset: 0, pending: 1 }
    }
}

/// Framing: определение границ сообщений в потоке байтов.
///
/// Реализации stateless: буфер и `FrameScan` хранит вызывающий.
/// Между вызовами уже разобранный префикс буфера не меняется.
pub trait Framing: Send + Sync {
    /// Извлечь один фрейм из начала буфера.
    /// Возвращает (frame_data, bytes_consumed) или None если фрейм неполный.
    fn decode(&self, buf: &[u8], scan: &mut FrameScan) -> Result<Option<(Vec<u8>, usize)>, SinkError>;
}

/// Codec: один полный фрейм → `Message`.
pub trait Codec: Send + Sync {
    fn decode(&self, frame: &[u8]) -> Result<Message, SinkError>;
}
