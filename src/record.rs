//! Schema-driven decoding of packed location records.
//!
//! A schema is a `/`-separated list of `code:name` fields, for example
//! `M:region_seek/T:country_id/N5:lat/N5:lon/b:name_en`. Each code names a
//! fixed or NUL-terminated layout; fields are decoded back to back.

use byteorder::{ByteOrder, LittleEndian};
use std::fmt;

use crate::{GeoError, Result};

/// Layout of one record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    I8,
    U8,
    I16,
    U16,
    I24,
    U24,
    I32,
    U32,
    F32,
    F64,
    /// Signed 16-bit integer divided by `10^scale`.
    Fixed16 { scale: u8 },
    /// Signed 32-bit integer divided by `10^scale`.
    Fixed32 { scale: u8 },
    /// Fixed-width string, right-padded with spaces.
    Chars(usize),
    /// NUL-terminated string.
    CStr,
}

/// Codes that need no suffix.
const PLAIN_CODES: [(char, FieldKind); 10] = [
    ('t', FieldKind::I8),
    ('T', FieldKind::U8),
    ('s', FieldKind::I16),
    ('S', FieldKind::U16),
    ('m', FieldKind::I24),
    ('M', FieldKind::U24),
    ('i', FieldKind::I32),
    ('I', FieldKind::U32),
    ('f', FieldKind::F32),
    ('d', FieldKind::F64),
];

impl FieldKind {
    /// Parse a type code such as `T`, `N5` or `c2`.
    pub fn parse(code: &str) -> Result<Self> {
        let mut chars = code.chars();
        let lead = chars
            .next()
            .ok_or_else(|| GeoError::MalformedSchema("empty type code".into()))?;
        let suffix = chars.as_str();

        if let Some((_, kind)) = PLAIN_CODES.iter().find(|(c, _)| *c == lead) {
            return Ok(*kind);
        }
        match lead {
            'n' => Ok(FieldKind::Fixed16 {
                scale: scale_digit(code, suffix)?,
            }),
            'N' => Ok(FieldKind::Fixed32 {
                scale: scale_digit(code, suffix)?,
            }),
            'c' => match suffix.parse::<u16>() {
                Ok(width) if width > 0 => Ok(FieldKind::Chars(width as usize)),
                _ => Err(GeoError::MalformedSchema(format!(
                    "bad string width in {code:?}"
                ))),
            },
            'b' => Ok(FieldKind::CStr),
            other => Err(GeoError::InvalidFieldType(other)),
        }
    }

    /// Width of every kind except [`FieldKind::CStr`], whose width depends on the data.
    fn fixed_width(&self) -> Option<usize> {
        match self {
            FieldKind::I8 | FieldKind::U8 => Some(1),
            FieldKind::I16 | FieldKind::U16 | FieldKind::Fixed16 { .. } => Some(2),
            FieldKind::I24 | FieldKind::U24 => Some(3),
            FieldKind::I32 | FieldKind::U32 | FieldKind::F32 | FieldKind::Fixed32 { .. } => Some(4),
            FieldKind::F64 => Some(8),
            FieldKind::Chars(len) => Some(*len),
            FieldKind::CStr => None,
        }
    }

    /// Bytes this field occupies when it starts at `cursor` in `raw`.
    ///
    /// For [`FieldKind::CStr`] this includes the terminator.
    pub fn width(&self, raw: &[u8], cursor: usize) -> Result<usize> {
        if let Some(width) = self.fixed_width() {
            return Ok(width);
        }
        let rest = raw.get(cursor..).ok_or(GeoError::TruncatedData)?;
        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(GeoError::TruncatedData)?;
        Ok(nul + 1)
    }

    /// Decode exactly the bytes of one field, as sized by [`FieldKind::width`].
    ///
    /// Fails with [`GeoError::TruncatedData`] when `bytes` is shorter than the
    /// field, or when a NUL-terminated string is missing its terminator.
    pub fn decode(&self, bytes: &[u8]) -> Result<Value> {
        let complete = match self.fixed_width() {
            Some(width) => bytes.len() >= width,
            None => bytes.last() == Some(&0),
        };
        if !complete {
            return Err(GeoError::TruncatedData);
        }
        let value = match self {
            FieldKind::I8 => Value::Int(bytes[0] as i8 as i64),
            FieldKind::U8 => Value::Int(bytes[0] as i64),
            FieldKind::I16 => Value::Int(LittleEndian::read_i16(bytes) as i64),
            FieldKind::U16 => Value::Int(LittleEndian::read_u16(bytes) as i64),
            FieldKind::I24 => Value::Int(LittleEndian::read_i24(bytes) as i64),
            FieldKind::U24 => Value::Int(LittleEndian::read_u24(bytes) as i64),
            FieldKind::I32 => Value::Int(LittleEndian::read_i32(bytes) as i64),
            FieldKind::U32 => Value::Int(LittleEndian::read_u32(bytes) as i64),
            FieldKind::F32 => Value::Float(LittleEndian::read_f32(bytes) as f64),
            FieldKind::F64 => Value::Float(LittleEndian::read_f64(bytes)),
            FieldKind::Fixed16 { scale } => {
                Value::Float(LittleEndian::read_i16(bytes) as f64 / 10f64.powi(*scale as i32))
            }
            FieldKind::Fixed32 { scale } => {
                Value::Float(LittleEndian::read_i32(bytes) as f64 / 10f64.powi(*scale as i32))
            }
            FieldKind::Chars(len) => {
                let bytes = &bytes[..*len];
                let end = bytes.iter().rposition(|&b| b != b' ').map_or(0, |p| p + 1);
                Value::Str(String::from_utf8_lossy(&bytes[..end]).into_owned())
            }
            FieldKind::CStr => {
                Value::Str(String::from_utf8_lossy(&bytes[..bytes.len() - 1]).into_owned())
            }
        };
        Ok(value)
    }

    /// Value used when a record is synthesized rather than read.
    pub fn default_value(&self) -> Value {
        match self {
            FieldKind::Chars(_) | FieldKind::CStr => Value::Str(String::new()),
            FieldKind::F32
            | FieldKind::F64
            | FieldKind::Fixed16 { .. }
            | FieldKind::Fixed32 { .. } => Value::Float(0.0),
            _ => Value::Int(0),
        }
    }
}

fn scale_digit(code: &str, suffix: &str) -> Result<u8> {
    suffix
        .chars()
        .next()
        .and_then(|c| c.to_digit(10))
        .map(|d| d as u8)
        .ok_or_else(|| GeoError::MalformedSchema(format!("missing precision in {code:?}")))
}

/// A decoded field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
}

impl Value {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric value as a float; integers are widened.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Str(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(s) => f.write_str(s),
        }
    }
}

/// Field values keyed by name, in schema order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    /// Value of the field `name`.
    ///
    /// 按名称取字段值。
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Replace the value of `name`, appending the field if it is absent.
    ///
    /// 设置字段值，字段不存在时追加到末尾。
    pub fn set(&mut self, name: &str, value: Value) {
        match self.fields.iter_mut().find(|(n, _)| n == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name.to_string(), value)),
        }
    }

    /// Remove the field `name` and return its value.
    ///
    /// 删除字段并返回其值。
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let pos = self.fields.iter().position(|(n, _)| n == name)?;
        Some(self.fields.remove(pos).1)
    }

    /// Integer value of `name`, if the field is an integer.
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    /// Numeric value of `name` as a float.
    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_f64)
    }

    /// String value of `name`, if the field is a string.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// Fields in schema order.
    ///
    /// 按格式顺序遍历字段。
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Field names in schema order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// One named field of a [`Schema`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub kind: FieldKind,
    pub name: String,
}

/// Parsed record layout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    /// Parse a `code:name/code:name/...` format string. An empty string has no fields.
    pub fn parse(text: &str) -> Result<Self> {
        if text.is_empty() {
            return Ok(Self::default());
        }
        let fields = text
            .split('/')
            .map(|part| {
                let (code, name) = part.split_once(':').ok_or_else(|| {
                    GeoError::MalformedSchema(format!("field {part:?} has no name"))
                })?;
                Ok(Field {
                    kind: FieldKind::parse(code)?,
                    name: name.to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { fields })
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Every field with its default value; consumes no input.
    pub fn defaults(&self) -> Record {
        Record {
            fields: self
                .fields
                .iter()
                .map(|field| (field.name.clone(), field.kind.default_value()))
                .collect(),
        }
    }

    /// Decode `raw` field by field. Empty input yields [`Schema::defaults`].
    ///
    /// Trailing bytes past the last field are ignored; reads are sized by the
    /// per-kind maximum record length, not the exact record length.
    pub fn decode(&self, raw: &[u8]) -> Result<Record> {
        if raw.is_empty() {
            return Ok(self.defaults());
        }
        let mut cursor = 0usize;
        let mut fields = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            let width = field.kind.width(raw, cursor)?;
            let end = cursor.checked_add(width).ok_or(GeoError::TruncatedData)?;
            let bytes = raw.get(cursor..end).ok_or(GeoError::TruncatedData)?;
            fields.push((field.name.clone(), field.kind.decode(bytes)?));
            cursor = end;
        }
        Ok(Record { fields })
    }
}
