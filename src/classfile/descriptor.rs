//! Field and method descriptor parsing

use crate::error::{Result, TransformError};

/// A parsed field type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
    /// Internal class name, e.g. `java/lang/String`
    Object(String),
    /// Full array descriptor, e.g. `[I` or `[Ljava/lang/String;`
    Array(String),
}

impl FieldType {
    /// Number of local-variable / operand-stack slots occupied
    pub fn slots(&self) -> u16 {
        match self {
            FieldType::Long | FieldType::Double => 2,
            _ => 1,
        }
    }
}

/// A parsed method descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub params: Vec<FieldType>,
    /// `None` for `V`
    pub ret: Option<FieldType>,
}

impl MethodDescriptor {
    pub fn parse(desc: &str) -> Result<Self> {
        let bytes = desc.as_bytes();
        if bytes.first() != Some(&b'(') {
            return Err(bad(desc));
        }
        let mut pos = 1;
        let mut params = Vec::new();
        while bytes.get(pos) != Some(&b')') {
            if pos >= bytes.len() {
                return Err(bad(desc));
            }
            let (ty, next) = parse_at(desc, pos)?;
            params.push(ty);
            pos = next;
        }
        pos += 1;
        let ret = if &desc[pos..] == "V" {
            None
        } else {
            let (ty, next) = parse_at(desc, pos)?;
            if next != desc.len() {
                return Err(bad(desc));
            }
            Some(ty)
        };
        Ok(Self { params, ret })
    }

    pub fn param_slots(&self) -> u16 {
        self.params.iter().map(FieldType::slots).sum()
    }

    pub fn return_slots(&self) -> u16 {
        self.ret.as_ref().map_or(0, FieldType::slots)
    }
}

pub fn parse_field_type(desc: &str) -> Result<FieldType> {
    let (ty, next) = parse_at(desc, 0)?;
    if next != desc.len() {
        return Err(bad(desc));
    }
    Ok(ty)
}

fn parse_at(desc: &str, start: usize) -> Result<(FieldType, usize)> {
    let bytes = desc.as_bytes();
    let ty = match bytes.get(start) {
        Some(b'B') => FieldType::Byte,
        Some(b'C') => FieldType::Char,
        Some(b'D') => FieldType::Double,
        Some(b'F') => FieldType::Float,
        Some(b'I') => FieldType::Int,
        Some(b'J') => FieldType::Long,
        Some(b'S') => FieldType::Short,
        Some(b'Z') => FieldType::Boolean,
        Some(b'L') => {
            let end = desc[start..]
                .find(';')
                .map(|i| start + i)
                .ok_or_else(|| bad(desc))?;
            if end == start + 1 {
                return Err(bad(desc));
            }
            return Ok((FieldType::Object(desc[start + 1..end].to_string()), end + 1));
        }
        Some(b'[') => {
            let mut elem = start;
            while bytes.get(elem) == Some(&b'[') {
                elem += 1;
            }
            if elem - start > 255 {
                return Err(bad(desc));
            }
            let (_, next) = parse_at(desc, elem)?;
            return Ok((FieldType::Array(desc[start..next].to_string()), next));
        }
        _ => return Err(bad(desc)),
    };
    Ok((ty, start + 1))
}

fn bad(desc: &str) -> TransformError {
    TransformError::malformed(format!("invalid descriptor '{}'", desc))
}
