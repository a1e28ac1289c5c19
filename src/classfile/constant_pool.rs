//! Constant pool: decoding, cross-reference validation, and deduplicating
//! builders used when probes need new symbolic references.

use super::bytes::{push_u16, push_u32, push_u64, push_u8, Reader};
use crate::error::{Result, TransformError};

pub const TAG_UTF8: u8 = 1;
pub const TAG_INTEGER: u8 = 3;
pub const TAG_FLOAT: u8 = 4;
pub const TAG_LONG: u8 = 5;
pub const TAG_DOUBLE: u8 = 6;
pub const TAG_CLASS: u8 = 7;
pub const TAG_STRING: u8 = 8;
pub const TAG_FIELDREF: u8 = 9;
pub const TAG_METHODREF: u8 = 10;
pub const TAG_INTERFACE_METHODREF: u8 = 11;
pub const TAG_NAME_AND_TYPE: u8 = 12;
pub const TAG_METHOD_HANDLE: u8 = 15;
pub const TAG_METHOD_TYPE: u8 = 16;
pub const TAG_DYNAMIC: u8 = 17;
pub const TAG_INVOKE_DYNAMIC: u8 = 18;
pub const TAG_MODULE: u8 = 19;
pub const TAG_PACKAGE: u8 = 20;

/// A single constant pool entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constant {
    /// Raw modified UTF-8 bytes, kept verbatim for byte-exact encoding
    Utf8(Vec<u8>),
    Integer(i32),
    /// IEEE 754 bit pattern
    Float(u32),
    Long(i64),
    /// IEEE 754 bit pattern
    Double(u64),
    Class {
        name_index: u16,
    },
    String {
        string_index: u16,
    },
    Fieldref {
        class_index: u16,
        name_and_type_index: u16,
    },
    Methodref {
        class_index: u16,
        name_and_type_index: u16,
    },
    InterfaceMethodref {
        class_index: u16,
        name_and_type_index: u16,
    },
    NameAndType {
        name_index: u16,
        descriptor_index: u16,
    },
    MethodHandle {
        reference_kind: u8,
        reference_index: u16,
    },
    MethodType {
        descriptor_index: u16,
    },
    Dynamic {
        bootstrap_method_attr_index: u16,
        name_and_type_index: u16,
    },
    InvokeDynamic {
        bootstrap_method_attr_index: u16,
        name_and_type_index: u16,
    },
    Module {
        name_index: u16,
    },
    Package {
        name_index: u16,
    },
    /// Slot zero and the shadow slot following a Long or Double
    Unusable,
}

impl Constant {
    pub fn tag(&self) -> u8 {
        match self {
            Constant::Utf8(_) => TAG_UTF8,
            Constant::Integer(_) => TAG_INTEGER,
            Constant::Float(_) => TAG_FLOAT,
            Constant::Long(_) => TAG_LONG,
            Constant::Double(_) => TAG_DOUBLE,
            Constant::Class { .. } => TAG_CLASS,
            Constant::String { .. } => TAG_STRING,
            Constant::Fieldref { .. } => TAG_FIELDREF,
            Constant::Methodref { .. } => TAG_METHODREF,
            Constant::InterfaceMethodref { .. } => TAG_INTERFACE_METHODREF,
            Constant::NameAndType { .. } => TAG_NAME_AND_TYPE,
            Constant::MethodHandle { .. } => TAG_METHOD_HANDLE,
            Constant::MethodType { .. } => TAG_METHOD_TYPE,
            Constant::Dynamic { .. } => TAG_DYNAMIC,
            Constant::InvokeDynamic { .. } => TAG_INVOKE_DYNAMIC,
            Constant::Module { .. } => TAG_MODULE,
            Constant::Package { .. } => TAG_PACKAGE,
            Constant::Unusable => 0,
        }
    }

    fn is_wide(&self) -> bool {
        matches!(self, Constant::Long(_) | Constant::Double(_))
    }
}

/// Symbolic reference to a field or method, resolved to strings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRef {
    pub tag: u8,
    pub class_name: String,
    pub name: String,
    pub descriptor: String,
}

/// The constant pool of one class
///
/// Index 0 is never valid; Long and Double entries are followed by an
/// [`Constant::Unusable`] shadow slot so indices match the binary format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantPool {
    entries: Vec<Constant>,
}

impl Default for ConstantPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstantPool {
    pub fn new() -> Self {
        Self {
            entries: vec![Constant::Unusable],
        }
    }

    /// The `constant_pool_count` value (number of slots plus one)
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, index: u16) -> Option<&Constant> {
        match self.entries.get(index as usize) {
            Some(Constant::Unusable) | None => None,
            Some(c) => Some(c),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (u16, &Constant)> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, c)| !matches!(c, Constant::Unusable))
            .map(|(i, c)| (i as u16, c))
    }

    pub(crate) fn decode(r: &mut Reader<'_>) -> Result<Self> {
        let count = r.read_u16()?;
        if count == 0 {
            return Err(TransformError::malformed("constant_pool_count is zero"));
        }
        let mut entries = Vec::with_capacity(count as usize);
        entries.push(Constant::Unusable);

        while entries.len() < count as usize {
            let index = entries.len();
            let tag = r.read_u8()?;
            let constant = match tag {
                TAG_UTF8 => {
                    let len = r.read_u16()? as usize;
                    let bytes = r.read_bytes(len)?;
                    decode_modified_utf8(bytes).map_err(|e| {
                        TransformError::malformed(format!("constant #{}: {}", index, e.reason()))
                    })?;
                    Constant::Utf8(bytes.to_vec())
                }
                TAG_INTEGER => Constant::Integer(r.read_i32()?),
                TAG_FLOAT => Constant::Float(r.read_u32()?),
                TAG_LONG => Constant::Long(r.read_u64()? as i64),
                TAG_DOUBLE => Constant::Double(r.read_u64()?),
                TAG_CLASS => Constant::Class {
                    name_index: r.read_u16()?,
                },
                TAG_STRING => Constant::String {
                    string_index: r.read_u16()?,
                },
                TAG_FIELDREF => Constant::Fieldref {
                    class_index: r.read_u16()?,
                    name_and_type_index: r.read_u16()?,
                },
                TAG_METHODREF => Constant::Methodref {
                    class_index: r.read_u16()?,
                    name_and_type_index: r.read_u16()?,
                },
                TAG_INTERFACE_METHODREF => Constant::InterfaceMethodref {
                    class_index: r.read_u16()?,
                    name_and_type_index: r.read_u16()?,
                },
                TAG_NAME_AND_TYPE => Constant::NameAndType {
                    name_index: r.read_u16()?,
                    descriptor_index: r.read_u16()?,
                },
                TAG_METHOD_HANDLE => Constant::MethodHandle {
                    reference_kind: r.read_u8()?,
                    reference_index: r.read_u16()?,
                },
                TAG_METHOD_TYPE => Constant::MethodType {
                    descriptor_index: r.read_u16()?,
                },
                TAG_DYNAMIC => Constant::Dynamic {
                    bootstrap_method_attr_index: r.read_u16()?,
                    name_and_type_index: r.read_u16()?,
                },
                TAG_INVOKE_DYNAMIC => Constant::InvokeDynamic {
                    bootstrap_method_attr_index: r.read_u16()?,
                    name_and_type_index: r.read_u16()?,
                },
                TAG_MODULE => Constant::Module {
                    name_index: r.read_u16()?,
                },
                TAG_PACKAGE => Constant::Package {
                    name_index: r.read_u16()?,
                },
                other => {
                    return Err(TransformError::malformed(format!(
                        "constant #{} has unknown tag {}",
                        index, other
                    )))
                }
            };
            let wide = constant.is_wide();
            entries.push(constant);
            if wide {
                if entries.len() >= count as usize {
                    return Err(TransformError::malformed(format!(
                        "constant #{} is 8 bytes wide but occupies the last slot",
                        index
                    )));
                }
                entries.push(Constant::Unusable);
            }
        }

        let pool = Self { entries };
        pool.validate()?;
        Ok(pool)
    }

    pub(crate) fn encode(&self, out: &mut Vec<u8>) -> Result<()> {
        let count = u16::try_from(self.entries.len()).map_err(|_| {
            TransformError::unencodable(format!(
                "constant pool has {} slots",
                self.entries.len()
            ))
        })?;
        push_u16(out, count);
        for constant in &self.entries {
            match constant {
                Constant::Unusable => {}
                Constant::Utf8(bytes) => {
                    push_u8(out, TAG_UTF8);
                    let len = u16::try_from(bytes.len()).map_err(|_| {
                        TransformError::unencodable("utf8 constant longer than 65535 bytes")
                    })?;
                    push_u16(out, len);
                    out.extend_from_slice(bytes);
                }
                Constant::Integer(v) => {
                    push_u8(out, TAG_INTEGER);
                    push_u32(out, *v as u32);
                }
                Constant::Float(bits) => {
                    push_u8(out, TAG_FLOAT);
                    push_u32(out, *bits);
                }
                Constant::Long(v) => {
                    push_u8(out, TAG_LONG);
                    push_u64(out, *v as u64);
                }
                Constant::Double(bits) => {
                    push_u8(out, TAG_DOUBLE);
                    push_u64(out, *bits);
                }
                Constant::Class { name_index }
                | Constant::String {
                    string_index: name_index,
                }
                | Constant::MethodType {
                    descriptor_index: name_index,
                }
                | Constant::Module { name_index }
                | Constant::Package { name_index } => {
                    push_u8(out, constant.tag());
                    push_u16(out, *name_index);
                }
                Constant::Fieldref {
                    class_index: a,
                    name_and_type_index: b,
                }
                | Constant::Methodref {
                    class_index: a,
                    name_and_type_index: b,
                }
                | Constant::InterfaceMethodref {
                    class_index: a,
                    name_and_type_index: b,
                }
                | Constant::NameAndType {
                    name_index: a,
                    descriptor_index: b,
                }
                | Constant::Dynamic {
                    bootstrap_method_attr_index: a,
                    name_and_type_index: b,
                }
                | Constant::InvokeDynamic {
                    bootstrap_method_attr_index: a,
                    name_and_type_index: b,
                } => {
                    push_u8(out, constant.tag());
                    push_u16(out, *a);
                    push_u16(out, *b);
                }
                Constant::MethodHandle {
                    reference_kind,
                    reference_index,
                } => {
                    push_u8(out, TAG_METHOD_HANDLE);
                    push_u8(out, *reference_kind);
                    push_u16(out, *reference_index);
                }
            }
        }
        Ok(())
    }

    /// Check every intra-pool reference points at an entry of the right kind
    fn validate(&self) -> Result<()> {
        for (index, constant) in self.iter() {
            let check = |target: u16, allowed: &[u8]| -> Result<()> {
                self.expect_tag(target, allowed).map_err(|e| {
                    TransformError::malformed(format!("constant #{}: {}", index, e.reason()))
                })
            };
            match constant {
                Constant::Class { name_index }
                | Constant::Module { name_index }
                | Constant::Package { name_index } => check(*name_index, &[TAG_UTF8])?,
                Constant::String { string_index } => check(*string_index, &[TAG_UTF8])?,
                Constant::MethodType { descriptor_index } => {
                    check(*descriptor_index, &[TAG_UTF8])?
                }
                Constant::Fieldref {
                    class_index,
                    name_and_type_index,
                }
                | Constant::Methodref {
                    class_index,
                    name_and_type_index,
                }
                | Constant::InterfaceMethodref {
                    class_index,
                    name_and_type_index,
                } => {
                    check(*class_index, &[TAG_CLASS])?;
                    check(*name_and_type_index, &[TAG_NAME_AND_TYPE])?;
                }
                Constant::NameAndType {
                    name_index,
                    descriptor_index,
                } => {
                    check(*name_index, &[TAG_UTF8])?;
                    check(*descriptor_index, &[TAG_UTF8])?;
                }
                Constant::Dynamic {
                    name_and_type_index,
                    ..
                }
                | Constant::InvokeDynamic {
                    name_and_type_index,
                    ..
                } => check(*name_and_type_index, &[TAG_NAME_AND_TYPE])?,
                Constant::MethodHandle {
                    reference_kind,
                    reference_index,
                } => match reference_kind {
                    1..=4 => check(*reference_index, &[TAG_FIELDREF])?,
                    5..=9 => check(
                        *reference_index,
                        &[TAG_METHODREF, TAG_INTERFACE_METHODREF],
                    )?,
                    other => {
                        return Err(TransformError::malformed(format!(
                            "constant #{}: invalid method handle kind {}",
                            index, other
                        )))
                    }
                },
                Constant::Utf8(_)
                | Constant::Integer(_)
                | Constant::Float(_)
                | Constant::Long(_)
                | Constant::Double(_)
                | Constant::Unusable => {}
            }
        }
        Ok(())
    }

    /// Verify `index` names an entry whose tag is in `allowed`
    pub fn expect_tag(&self, index: u16, allowed: &[u8]) -> Result<()> {
        match self.get(index) {
            Some(c) if allowed.contains(&c.tag()) => Ok(()),
            Some(c) => Err(TransformError::malformed(format!(
                "index {} has tag {}, expected one of {:?}",
                index,
                c.tag(),
                allowed
            ))),
            None => Err(TransformError::malformed(format!(
                "index {} is not a valid constant",
                index
            ))),
        }
    }

    pub fn utf8(&self, index: u16) -> Result<String> {
        match self.get(index) {
            Some(Constant::Utf8(bytes)) => decode_modified_utf8(bytes),
            _ => Err(TransformError::malformed(format!(
                "index {} is not a utf8 constant",
                index
            ))),
        }
    }

    pub fn class_name(&self, index: u16) -> Result<String> {
        match self.get(index) {
            Some(Constant::Class { name_index }) => self.utf8(*name_index),
            _ => Err(TransformError::malformed(format!(
                "index {} is not a class constant",
                index
            ))),
        }
    }

    pub fn name_and_type(&self, index: u16) -> Result<(String, String)> {
        match self.get(index) {
            Some(Constant::NameAndType {
                name_index,
                descriptor_index,
            }) => Ok((self.utf8(*name_index)?, self.utf8(*descriptor_index)?)),
            _ => Err(TransformError::malformed(format!(
                "index {} is not a name-and-type constant",
                index
            ))),
        }
    }

    /// Resolve a Fieldref, Methodref or InterfaceMethodref
    pub fn member_ref(&self, index: u16) -> Result<MemberRef> {
        match self.get(index) {
            Some(
                c @ (Constant::Fieldref {
                    class_index,
                    name_and_type_index,
                }
                | Constant::Methodref {
                    class_index,
                    name_and_type_index,
                }
                | Constant::InterfaceMethodref {
                    class_index,
                    name_and_type_index,
                }),
            ) => {
                let (name, descriptor) = self.name_and_type(*name_and_type_index)?;
                Ok(MemberRef {
                    tag: c.tag(),
                    class_name: self.class_name(*class_index)?,
                    name,
                    descriptor,
                })
            }
            _ => Err(TransformError::malformed(format!(
                "index {} is not a member reference",
                index
            ))),
        }
    }

    /// Descriptor of an InvokeDynamic or Dynamic call site
    pub fn dynamic_descriptor(&self, index: u16) -> Result<String> {
        match self.get(index) {
            Some(
                Constant::InvokeDynamic {
                    name_and_type_index,
                    ..
                }
                | Constant::Dynamic {
                    name_and_type_index,
                    ..
                },
            ) => Ok(self.name_and_type(*name_and_type_index)?.1),
            _ => Err(TransformError::malformed(format!(
                "index {} is not a dynamic constant",
                index
            ))),
        }
    }

    fn find(&self, wanted: &Constant) -> Option<u16> {
        self.entries
            .iter()
            .position(|c| c == wanted)
            .filter(|&i| i != 0)
            .map(|i| i as u16)
    }

    fn push(&mut self, constant: Constant) -> Result<u16> {
        let slots = if constant.is_wide() { 2 } else { 1 };
        if self.entries.len() + slots > u16::MAX as usize {
            return Err(TransformError::unsupported("constant pool exhausted"));
        }
        let index = self.entries.len() as u16;
        self.entries.push(constant);
        if slots == 2 {
            self.entries.push(Constant::Unusable);
        }
        Ok(index)
    }

    fn intern(&mut self, constant: Constant) -> Result<u16> {
        match self.find(&constant) {
            Some(index) => Ok(index),
            None => self.push(constant),
        }
    }

    pub fn add_utf8(&mut self, value: &str) -> Result<u16> {
        let bytes = encode_modified_utf8(value);
        if bytes.len() > u16::MAX as usize {
            return Err(TransformError::unsupported("string constant too long"));
        }
        self.intern(Constant::Utf8(bytes))
    }

    pub fn add_class(&mut self, internal_name: &str) -> Result<u16> {
        let name_index = self.add_utf8(internal_name)?;
        self.intern(Constant::Class { name_index })
    }

    pub fn add_string(&mut self, value: &str) -> Result<u16> {
        let string_index = self.add_utf8(value)?;
        self.intern(Constant::String { string_index })
    }

    pub fn add_name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16> {
        let name_index = self.add_utf8(name)?;
        let descriptor_index = self.add_utf8(descriptor)?;
        self.intern(Constant::NameAndType {
            name_index,
            descriptor_index,
        })
    }

    pub fn add_fieldref(&mut self, class: &str, name: &str, descriptor: &str) -> Result<u16> {
        let class_index = self.add_class(class)?;
        let name_and_type_index = self.add_name_and_type(name, descriptor)?;
        self.intern(Constant::Fieldref {
            class_index,
            name_and_type_index,
        })
    }

    pub fn add_methodref(&mut self, class: &str, name: &str, descriptor: &str) -> Result<u16> {
        let class_index = self.add_class(class)?;
        let name_and_type_index = self.add_name_and_type(name, descriptor)?;
        self.intern(Constant::Methodref {
            class_index,
            name_and_type_index,
        })
    }
}

/// Decode the JVM's modified UTF-8 (NUL as `C0 80`, supplementary
/// characters as surrogate pairs)
pub fn decode_modified_utf8(bytes: &[u8]) -> Result<String> {
    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    let continuation = |b: Option<&u8>| -> Result<u16> {
        match b {
            Some(&b) if b & 0xC0 == 0x80 => Ok((b & 0x3F) as u16),
            _ => Err(TransformError::malformed("invalid modified utf-8 sequence")),
        }
    };
    while i < bytes.len() {
        let b = bytes[i];
        match b {
            0x01..=0x7F => {
                units.push(b as u16);
                i += 1;
            }
            0xC0..=0xDF => {
                let lo = continuation(bytes.get(i + 1))?;
                units.push(((b & 0x1F) as u16) << 6 | lo);
                i += 2;
            }
            0xE0..=0xEF => {
                let mid = continuation(bytes.get(i + 1))?;
                let lo = continuation(bytes.get(i + 2))?;
                units.push(((b & 0x0F) as u16) << 12 | mid << 6 | lo);
                i += 3;
            }
            _ => {
                return Err(TransformError::malformed(format!(
                    "invalid modified utf-8 byte 0x{:02x}",
                    b
                )))
            }
        }
    }
    Ok(String::from_utf16_lossy(&units))
}

pub fn encode_modified_utf8(value: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len());
    for unit in value.encode_utf16() {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | (unit >> 6) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                out.push(0xE0 | (unit >> 12) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_pool(bytes: &[u8]) -> Result<ConstantPool> {
        ConstantPool::decode(&mut Reader::new(bytes))
    }

    #[test]
    fn test_modified_utf8_ascii_and_nul() {
        assert_eq!(encode_modified_utf8("abc"), b"abc".to_vec());
        assert_eq!(encode_modified_utf8("a\0b"), vec![b'a', 0xC0, 0x80, b'b']);
        assert_eq!(decode_modified_utf8(&[b'a', 0xC0, 0x80]).unwrap(), "a\0");
    }

    #[test]
    fn test_modified_utf8_supplementary_uses_surrogates() {
        let s = "x\u{1F600}";
        let encoded = encode_modified_utf8(s);
        // 'x' + two 3-byte surrogate halves
        assert_eq!(encoded.len(), 7);
        assert_eq!(decode_modified_utf8(&encoded).unwrap(), s);
    }

    #[test]
    fn test_modified_utf8_rejects_raw_nul_and_bad_continuation() {
        assert!(decode_modified_utf8(&[0x00]).is_err());
        assert!(decode_modified_utf8(&[0xC3]).is_err());
        assert!(decode_modified_utf8(&[0xF0, 0x9F, 0x98, 0x80]).is_err());
    }

    #[test]
    fn test_decode_long_takes_two_slots() {
        // count=4: #1 Long, #2 shadow, #3 Utf8 "a"
        let bytes = [0, 4, TAG_LONG, 0, 0, 0, 0, 0, 0, 0, 7, TAG_UTF8, 0, 1, b'a'];
        let pool = decode_pool(&bytes).unwrap();
        assert_eq!(pool.get(1), Some(&Constant::Long(7)));
        assert_eq!(pool.get(2), None);
        assert_eq!(pool.utf8(3).unwrap(), "a");
        assert_eq!(pool.count(), 4);
    }

    #[test]
    fn test_decode_rejects_dangling_class_reference() {
        // #1 Class -> #5 (out of range)
        let bytes = [0, 2, TAG_CLASS, 0, 5];
        let err = decode_pool(&bytes).unwrap_err();
        assert!(matches!(err, TransformError::MalformedInput(_)));
    }

    #[test]
    fn test_decode_rejects_wrong_tag_reference() {
        // #1 Integer, #2 Class -> #1 (not utf8)
        let bytes = [0, 3, TAG_INTEGER, 0, 0, 0, 1, TAG_CLASS, 0, 1];
        assert!(decode_pool(&bytes).is_err());
    }

    #[test]
    fn test_decode_rejects_unknown_tag() {
        let bytes = [0, 2, 2, 0, 0];
        let err = decode_pool(&bytes).unwrap_err();
        assert!(err.to_string().contains("unknown tag"));
    }

    #[test]
    fn test_encode_roundtrip_is_byte_exact() {
        let bytes = [
            0, 6, TAG_UTF8, 0, 3, b'F', b'o', b'o', TAG_CLASS, 0, 1, TAG_DOUBLE, 0x40, 0x09,
            0x21, 0xFB, 0x54, 0x44, 0x2D, 0x18, TAG_FLOAT, 0x7F, 0xC0, 0, 1,
        ];
        let pool = decode_pool(&bytes).unwrap();
        let mut out = Vec::new();
        pool.encode(&mut out).unwrap();
        assert_eq!(out, bytes.to_vec());
    }

    #[test]
    fn test_builders_deduplicate() {
        let mut pool = ConstantPool::new();
        let a = pool.add_methodref("java/lang/System", "nanoTime", "()J").unwrap();
        let count = pool.count();
        let b = pool.add_methodref("java/lang/System", "nanoTime", "()J").unwrap();
        assert_eq!(a, b);
        assert_eq!(pool.count(), count);

        let member = pool.member_ref(a).unwrap();
        assert_eq!(member.class_name, "java/lang/System");
        assert_eq!(member.name, "nanoTime");
        assert_eq!(member.descriptor, "()J");
        assert_eq!(member.tag, TAG_METHODREF);
    }

    #[test]
    fn test_builders_reuse_existing_class_entry() {
        let mut pool = ConstantPool::new();
        let utf8 = pool.add_utf8("java/lang/Object").unwrap();
        let class = pool.add_class("java/lang/Object").unwrap();
        assert_eq!(pool.get(class), Some(&Constant::Class { name_index: utf8 }));
        assert_eq!(pool.class_name(class).unwrap(), "java/lang/Object");
    }

    #[test]
    fn test_expect_tag() {
        let mut pool = ConstantPool::new();
        let s = pool.add_string("hi").unwrap();
        assert!(pool.expect_tag(s, &[TAG_STRING]).is_ok());
        assert!(pool.expect_tag(s, &[TAG_CLASS]).is_err());
        assert!(pool.expect_tag(0, &[TAG_STRING]).is_err());
    }
}
