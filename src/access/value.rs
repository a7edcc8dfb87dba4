use crate::storage::error::{StorageError, StorageResult};
use byteorder::{BigEndian, ByteOrder, ReadBytesExt};
use std::fmt;
use std::io::Cursor;

/// Fixed number of content bytes reserved for every string field.
pub const STRING_LEN: usize = 128;

/// Field types supported by the heap page format. Every type has a fixed
/// on-disk width so that a page can be divided into equal slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    Int,
    String,
}

impl Type {
    /// Number of bytes a field of this type occupies on disk.
    pub fn size(&self) -> usize {
        match self {
            Type::Int => 4,
            // length prefix + padded content
            Type::String => 4 + STRING_LEN,
        }
    }

    /// Decodes one field of this type from the front of `data`.
    pub fn parse(&self, data: &[u8]) -> StorageResult<Field> {
        if data.len() < self.size() {
            return Err(StorageError::Corrupted(format!(
                "{:?} field needs {} bytes, got {}",
                self,
                self.size(),
                data.len()
            )));
        }

        let mut cursor = Cursor::new(data);
        match self {
            Type::Int => Ok(Field::Int(cursor.read_i32::<BigEndian>()?)),
            Type::String => {
                let len = cursor.read_u32::<BigEndian>()? as usize;
                if len > STRING_LEN {
                    return Err(StorageError::Corrupted(format!(
                        "string length {} exceeds {}",
                        len, STRING_LEN
                    )));
                }
                let bytes = &data[4..4 + len];
                let s = String::from_utf8(bytes.to_vec())
                    .map_err(|e| StorageError::Corrupted(e.to_string()))?;
                Ok(Field::String(s))
            }
        }
    }
}

/// A single typed value stored in a tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Field {
    Int(i32),
    String(String),
}

impl Field {
    pub fn field_type(&self) -> Type {
        match self {
            Field::Int(_) => Type::Int,
            Field::String(_) => Type::String,
        }
    }

    /// Appends exactly `self.field_type().size()` bytes to `out`.
    ///
    /// Strings longer than [`STRING_LEN`] bytes are truncated at the nearest
    /// character boundary.
    pub fn serialize(&self, out: &mut Vec<u8>) {
        let start = out.len();
        out.resize(start + self.field_type().size(), 0);
        let buf = &mut out[start..];
        match self {
            Field::Int(v) => BigEndian::write_i32(buf, *v),
            Field::String(s) => {
                let mut end = s.len().min(STRING_LEN);
                while !s.is_char_boundary(end) {
                    end -= 1;
                }
                BigEndian::write_u32(&mut buf[..4], end as u32);
                buf[4..4 + end].copy_from_slice(&s.as_bytes()[..end]);
            }
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Int(v) => write!(f, "{}", v),
            Field::String(s) => write!(f, "{}", s),
        }
    }
}
