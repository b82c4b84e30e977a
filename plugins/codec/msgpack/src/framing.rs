use rmp::Marker;
use sink_api::{FrameScan, Framing, SinkError};

pub struct MsgpackFraming {
    max_message_bytes: usize,
}

impl MsgpackFraming {
    pub fn new(max_message_bytes: usize) -> Self {
        Self { max_message_bytes }
    }
}

impl Framing for MsgpackFraming {
    fn decode(&self, buf: &[u8], scan: &mut FrameScan) -> Result<Option<(Vec<u8>, usize)>, SinkError> {
        match scan_frame(buf, self.max_message_bytes, scan)? {
            Some(len) => Ok(Some((buf[..len].to_vec(), len))),
            None => Ok(None),
        }
    }
}

/// Длина первого полного MessagePack-значения в `buf`.
///
/// Проходит по маркерам без аллокаций, считая сколько значений ещё
/// осталось прочитать. Разбор продолжается с `scan` и сохраняется в него,
/// если данных пока не хватает (`Ok(None)`). Маркер с неполным заголовком
/// длины разбирается заново, когда придут остальные байты.
/// `max_len` > 0 ограничивает размер значения, чтобы битый заголовок
/// с огромной длиной не копил буфер бесконечно.
fn scan_frame(buf: &[u8], max_len: usize, scan: &mut FrameScan) -> Result<Option<usize>, SinkError> {
    let FrameScan { offset: mut pos, mut pending } = *scan;

    loop {
        if max_len > 0 && pos > max_len {
            return Err(too_large(max_len));
        }
        // payload строки/bin ещё не дочитан
        if pos > buf.len() {
            break;
        }
        if pending == 0 {
            *scan = FrameScan::default();
            return Ok(Some(pos));
        }
        let Some(&byte) = buf.get(pos) else {
            break;
        };
        let mut next = pos + 1;

        // (байт после заголовка, новые вложенные значения)
        let (skip, nested) = match Marker::from_u8(byte) {
            Marker::FixPos(_) | Marker::FixNeg(_) | Marker::Null | Marker::True | Marker::False => (0, 0),
            Marker::U8 | Marker::I8 => (1, 0),
            Marker::U16 | Marker::I16 => (2, 0),
            Marker::U32 | Marker::I32 | Marker::F32 => (4, 0),
            Marker::U64 | Marker::I64 | Marker::F64 => (8, 0),
            Marker::FixStr(n) => (n as usize, 0),
            Marker::Str8 | Marker::Bin8 => match read_len(buf, &mut next, 1) {
                Some(n) => (n, 0),
                None => break,
            },
            Marker::Str16 | Marker::Bin16 => match read_len(buf, &mut next, 2) {
                Some(n) => (n, 0),
                None => break,
            },
            Marker::Str32 | Marker::Bin32 => match read_len(buf, &mut next, 4) {
                Some(n) => (n, 0),
                None => break,
            },
            Marker::FixArray(n) => (0, u64::from(n)),
            Marker::Array16 | Marker::Array32 => {
                let width = if byte == 0xdc { 2 } else { 4 };
                match read_len(buf, &mut next, width) {
                    Some(n) => (0, n as u64),
                    None => break,
                }
            }
            Marker::FixMap(n) => (0, 2 * u64::from(n)),
            Marker::Map16 | Marker::Map32 => {
                let width = if byte == 0xde { 2 } else { 4 };
                match read_len(buf, &mut next, width) {
                    Some(n) => (0, 2 * n as u64),
                    None => break,
                }
            }
            // type byte + fixed payload
            Marker::FixExt1 => (2, 0),
            Marker::FixExt2 => (3, 0),
            Marker::FixExt4 => (5, 0),
            Marker::FixExt8 => (9, 0),
            Marker::FixExt16 => (17, 0),
            Marker::Ext8 | Marker::Ext16 | Marker::Ext32 => {
                let width = match byte {
                    0xc7 => 1,
                    0xc8 => 2,
                    _ => 4,
                };
                match read_len(buf, &mut next, width) {
                    Some(n) => (n + 1, 0),
                    None => break,
                }
            }
            Marker::Reserved => {
                return Err(SinkError::format_err(format!(
                    "reserved marker 0x{byte:02x} at offset {pos}"
                )));
            }
        };

        pending = pending - 1 + nested;
        pos = next.saturating_add(skip);
    }

    *scan = FrameScan { offset: pos, pending };
    Ok(None)
}

/// Big-endian длина шириной `width` байт сразу после маркера.
fn read_len(buf: &[u8], pos: &mut usize, width: usize) -> Option<usize> {
    let bytes = buf.get(*pos..*pos + width)?;
    *pos += width;
    Some(bytes.iter().fold(0usize, |acc, &b| (acc << 8) | b as usize))
}

fn too_large(max_len: usize) -> SinkError {
    SinkError::format_err(format!("message too large (max {max_len} bytes)"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rmpv::Value;
    use sink_api::ErrorKind;

    fn frame_len(buf: &[u8], max_len: usize) -> Result<Option<usize>, SinkError> {
        scan_frame(buf, max_len, &mut FrameScan::default())
    }

    fn encode(v: &Value) -> Vec<u8> {
        let mut buf = Vec::new();
        rmpv::encode::write_value(&mut buf, v).unwrap();
        buf
    }

    fn sample() -> Value {
        Value::Array(vec![
            Value::from("tag.b"),
            Value::from(1002u64 << 40),
            Value::Map(vec![
                (Value::from("list"), Value::Array(vec![Value::from(1), Value::F64(2.5), Value::Nil])),
                (Value::from("bin"), Value::Binary(vec![0u8; 300])),
                (Value::from("text"), Value::from("x".repeat(70_000).as_str())),
                (Value::from("neg"), Value::from(-70_000)),
                (Value::from("ext"), Value::Ext(0, vec![0u8; 8])),
                (Value::from("ext3"), Value::Ext(5, vec![1, 2, 3])),
            ]),
        ])
    }

    #[test]
    fn finds_exact_boundary() {
        let bytes = encode(&sample());
        assert_eq!(frame_len(&bytes, 0).unwrap(), Some(bytes.len()));
    }

    #[test]
    fn every_prefix_is_incomplete() {
        let bytes = encode(&sample());
        for cut in [0, 1, 5, 17, 300, bytes.len() / 2, bytes.len() - 1] {
            assert_eq!(frame_len(&bytes[..cut], 0).unwrap(), None, "cut at {cut}");
        }
    }

    #[test]
    fn stops_at_first_value() {
        let mut bytes = encode(&Value::Array(vec![Value::from("a"), Value::from(1), Value::from(2)]));
        let first = bytes.len();
        bytes.extend(encode(&Value::from("next")));
        let (frame, consumed) = MsgpackFraming::new(0)
            .decode(&bytes, &mut FrameScan::default())
            .unwrap()
            .unwrap();
        assert_eq!(consumed, first);
        assert_eq!(frame, bytes[..first]);
    }

    #[test]
    fn reserved_marker_is_rejected() {
        let err = frame_len(&[0x93, 0xa1, b'a', 0xc1], 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
        assert_eq!(err.message(), "reserved marker 0xc1 at offset 3");
    }

    #[test]
    fn oversized_message_is_rejected_before_complete() {
        // str32 заявляет 1 МБ, данных пока 16 байт
        let mut bytes = vec![0xdb, 0x00, 0x10, 0x00, 0x00];
        bytes.extend_from_slice(&[b'x'; 16]);
        assert_eq!(frame_len(&bytes, 0).unwrap(), None);
        let err = frame_len(&bytes, 1024).unwrap_err();
        assert!(err.message().contains("max 1024"));
    }

    #[test]
    fn limit_allows_messages_that_fit() {
        let bytes = encode(&Value::Array(vec![Value::from("t"), Value::from(1), Value::from("ok")]));
        assert_eq!(frame_len(&bytes, bytes.len()).unwrap(), Some(bytes.len()));
        assert!(frame_len(&bytes, bytes.len() - 1).is_err());
    }

    #[test]
    fn resumes_where_previous_call_stopped() {
        let bytes = encode(&sample());
        let mut scan = FrameScan::default();
        let mut last_offset = 0;
        let mut end = 0;
        while end < bytes.len() {
            end = (end + 3).min(bytes.len());
            match scan_frame(&bytes[..end], 0, &mut scan).unwrap() {
                Some(len) => {
                    assert_eq!(end, bytes.len());
                    assert_eq!(len, bytes.len());
                    assert_eq!(scan, FrameScan::default());
                }
                None => {
                    assert!(scan.offset >= last_offset, "scan went back at {end}");
                    last_offset = scan.offset;
                }
            }
        }
    }

    #[test]
    fn split_length_header_is_reread() {
        // array16 из трёх элементов, заголовок длины приходит по байту
        let bytes = [0xdc, 0x00, 0x03, 0x01, 0x02, 0x03];
        let mut scan = FrameScan::default();
        assert_eq!(scan_frame(&bytes[..2], 0, &mut scan).unwrap(), None);
        assert_eq!(scan.offset, 0);
        assert_eq!(scan_frame(&bytes[..4], 0, &mut scan).unwrap(), None);
        assert_eq!(scan, FrameScan { offset: 4, pending: 2 });
        assert_eq!(scan_frame(&bytes, 0, &mut scan).unwrap(), Some(6));
    }
}
