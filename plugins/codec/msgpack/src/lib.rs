//! MessagePack framing + codec.
//!
//! MessagePack сам себя разграничивает: framing находит конец первого
//! полного значения в буфере, codec превращает этот фрейм в `Message`.

mod codec;
mod framing;

pub use codec::MsgpackCodec;
pub use framing::MsgpackFraming;

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(default)]
pub struct MsgpackConfig {
    /// Максимальный размер одного сообщения в байтах (0 = без ограничения).
    pub max_message_bytes: usize,
}

impl MsgpackConfig {
    pub fn framing(&self) -> MsgpackFraming {
        MsgpackFraming::new(self.max_message_bytes)
    }

    pub fn codec(&self) -> MsgpackCodec {
        MsgpackCodec
    }
}
