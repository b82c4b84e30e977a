use sink_api::{Codec, Message, SinkError};

pub struct MsgpackCodec;

impl Codec for MsgpackCodec {
    fn decode(&self, frame: &[u8]) -> Result<Message, SinkError> {
        let mut rd = frame;
        let value = rmpv::decode::read_value(&mut rd)?;
        if !rd.is_empty() {
            return Err(SinkError::format_err(format!(
                "{} trailing bytes after message",
                rd.len()
            )));
        }
        Message::try_from(value)
    }
}
