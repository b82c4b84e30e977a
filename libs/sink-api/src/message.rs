use std::fmt;

use rmpv::Value;

use crate::error::SinkError;
use crate::render::Plain;

/// Одно декодированное сообщение: упорядоченный набор полей.
///
/// Поле 0: tag, поле 1: время/sequence, поле 2: payload.
/// Остальные поля (например option map forward-протокола) сохраняются,
/// но не печатаются.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    fields: Vec<Value>,
}

impl Message {
    pub const MIN_FIELDS: usize = 3;

    pub fn from_fields(fields: Vec<Value>) -> Result<Self, SinkError> {
        if fields.len() < Self::MIN_FIELDS {
            return Err(SinkError::format_err(format!(
                "message has {} fields, expected at least {}",
                fields.len(),
                Self::MIN_FIELDS
            )));
        }
        Ok(Self { fields })
    }

    pub fn tag(&self) -> &Value {
        &self.fields[0]
    }

    pub fn time(&self) -> &Value {
        &self.fields[1]
    }

    pub fn record(&self) -> &Value {
        &self.fields[2]
    }

    pub fn extra(&self) -> &[Value] {
        &self.fields[Self::MIN_FIELDS..]
    }
}

impl TryFrom<Value> for Message {
    type Error = SinkError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Array(fields) => Self::from_fields(fields),
            other => Err(SinkError::format_err(format!(
                "message must be an array, got {}",
                crate::render::type_name(&other)
            ))),
        }
    }
}

/// `<tag> <time> <record>`, без перевода строки.
impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", Plain(self.tag()), Plain(self.time()), Plain(self.record()))
    }
}
