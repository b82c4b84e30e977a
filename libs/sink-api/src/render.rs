//! Человекочитаемое представление `rmpv::Value`.
//!
//! `Plain` используется для колонок выводимой строки: строки печатаются как
//! есть, nil пустой строкой. Внутри массивов и map значения выводятся через
//! `Inspect`: строки в кавычках, nil как `nil`, map как `{k=>v}`.

use std::fmt::{self, Write};

use rmpv::Value;

/// Forward-протокол: ext type 0 = EventTime (u32 seconds, u32 nanoseconds, BE).
const EVENT_TIME_EXT: i8 = 0;

pub struct Plain<'a>(pub &'a Value);

pub struct Inspect<'a>(pub &'a Value);

impl fmt::Display for Plain<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Value::Nil => Ok(()),
            Value::String(s) => f.write_str(&String::from_utf8_lossy(s.as_bytes())),
            Value::Binary(b) => f.write_str(&String::from_utf8_lossy(b)),
            other => fmt::Display::fmt(&Inspect(other), f),
        }
    }
}

impl fmt::Display for Inspect<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Value::Nil => f.write_str("nil"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Integer(i) => match (i.as_u64(), i.as_i64()) {
                (Some(u), _) => write!(f, "{u}"),
                (None, Some(n)) => write!(f, "{n}"),
                (None, None) => f.write_str("?"),
            },
            Value::F32(x) => write_float(f, f64::from(*x)),
            Value::F64(x) => write_float(f, *x),
            Value::String(s) => match s.as_str() {
                Some(text) => write_quoted_str(f, text),
                None => write_quoted_bytes(f, s.as_bytes()),
            },
            Value::Binary(b) => write_quoted_bytes(f, b),
            Value::Array(items) => {
                f.write_char('[')?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    fmt::Display::fmt(&Inspect(item), f)?;
                }
                f.write_char(']')
            }
            Value::Map(entries) => {
                f.write_char('{')?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}=>{}", Inspect(k), Inspect(v))?;
                }
                f.write_char('}')
            }
            Value::Ext(ty, data) => write_ext(f, *ty, data),
        }
    }
}

fn write_float(f: &mut fmt::Formatter<'_>, x: f64) -> fmt::Result {
    if x.is_nan() {
        f.write_str("NaN")
    } else if x.is_infinite() {
        f.write_str(if x > 0.0 { "Infinity" } else { "-Infinity" })
    } else {
        write!(f, "{x:?}")
    }
}

fn write_quoted_str(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_char('"')?;
    for c in s.chars() {
        match c {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\r' => f.write_str("\\r")?,
            '\t' => f.write_str("\\t")?,
            c if c.is_control() => write!(f, "\\u{:04X}", c as u32)?,
            c => f.write_char(c)?,
        }
    }
    f.write_char('"')
}

fn write_quoted_bytes(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    f.write_char('"')?;
    for &b in bytes {
        match b {
            b'"' => f.write_str("\\\"")?,
            b'\\' => f.write_str("\\\\")?,
            0x20..=0x7e => f.write_char(b as char)?,
            _ => write!(f, "\\x{b:02X}")?,
        }
    }
    f.write_char('"')
}

fn write_ext(f: &mut fmt::Formatter<'_>, ty: i8, data: &[u8]) -> fmt::Result {
    if ty == EVENT_TIME_EXT && data.len() == 8 {
        let secs = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        let nanos = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        return write!(f, "{secs}.{nanos:09}");
    }
    write!(f, "#<ext type={ty} payload=")?;
    write_quoted_bytes(f, data)?;
    f.write_char('>')
}

/// Имя типа для сообщений об ошибках.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Nil => "nil",
        Value::Boolean(_) => "bool",
        Value::Integer(_) => "integer",
        Value::F32(_) | Value::F64(_) => "float",
        Value::String(_) => "string",
        Value::Binary(_) => "binary",
        Value::Array(_) => "array",
        Value::Map(_) => "map",
        Value::Ext(..) => "ext",
    }
}
