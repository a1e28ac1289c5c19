//! Class decoder: raw bytes to [`ClassDescriptor`]
//!
//! Decoding is a pure function of its input. Anything that does not conform
//! to the class-file layout is reported as [`TransformError::MalformedInput`].

use crate::classfile::bytes::Reader;
use crate::classfile::constant_pool::{ConstantPool, TAG_CLASS, TAG_UTF8};
use crate::classfile::instruction::{decode_instructions, CodeLayout, Label};
use crate::classfile::stackmap::decode_stack_map;
use crate::classfile::{
    MethodDescriptor, ATTR_CODE, ATTR_LINE_NUMBER_TABLE, ATTR_LOCAL_VARIABLE_TABLE,
    ATTR_LOCAL_VARIABLE_TYPE_TABLE, ATTR_STACK_MAP_TABLE, MAGIC, SUPPORTED_MAJOR_VERSIONS,
};
use crate::error::{Result, TransformError};
use crate::model::{
    BehaviorDescriptor, BehaviorKind, ClassDescriptor, CodeAttribute, CodeBody,
    ExceptionHandler, FieldInfo, LineNumber, LocalVariable, MethodAttribute, RawAttribute,
};

/// Parse a class file
pub fn decode(bytes: &[u8]) -> Result<ClassDescriptor> {
    if bytes.is_empty() {
        return Err(TransformError::malformed("empty input"));
    }
    let mut r = Reader::new(bytes);
    let magic = r.read_u32()?;
    if magic != MAGIC {
        return Err(TransformError::malformed(format!(
            "bad magic 0x{:08x}",
            magic
        )));
    }
    let minor_version = r.read_u16()?;
    let major_version = r.read_u16()?;
    if !SUPPORTED_MAJOR_VERSIONS.contains(&major_version) {
        return Err(TransformError::malformed(format!(
            "unknown format version {}.{}",
            major_version, minor_version
        )));
    }

    let pool = ConstantPool::decode(&mut r)?;
    let access_flags = r.read_u16()?;
    let this_class = r.read_u16()?;
    let name = pool.class_name(this_class)?;
    let super_class = r.read_u16()?;
    if super_class != 0 {
        pool.expect_tag(super_class, &[TAG_CLASS])?;
    }

    let interface_count = r.read_u16()?;
    let interfaces = (0..interface_count)
        .map(|_| {
            let index = r.read_u16()?;
            pool.expect_tag(index, &[TAG_CLASS])?;
            Ok(index)
        })
        .collect::<Result<Vec<_>>>()?;

    let field_count = r.read_u16()?;
    let mut fields = Vec::with_capacity(field_count as usize);
    for _ in 0..field_count {
        let access_flags = r.read_u16()?;
        let name_index = r.read_u16()?;
        let descriptor_index = r.read_u16()?;
        pool.expect_tag(name_index, &[TAG_UTF8])?;
        pool.expect_tag(descriptor_index, &[TAG_UTF8])?;
        fields.push(FieldInfo {
            access_flags,
            name_index,
            descriptor_index,
            attributes: read_raw_attributes(&mut r, &pool)?,
        });
    }

    let method_count = r.read_u16()?;
    let mut behaviors = Vec::with_capacity(method_count as usize);
    for _ in 0..method_count {
        behaviors.push(decode_behavior(&mut r, &pool)?);
    }

    let attributes = read_raw_attributes(&mut r, &pool)?;
    r.expect_end("class file")?;

    tracing::trace!(
        class = %name,
        major_version,
        behaviors = behaviors.len(),
        "decoded class"
    );

    Ok(ClassDescriptor {
        minor_version,
        major_version,
        pool,
        access_flags,
        this_class,
        super_class,
        interfaces,
        fields,
        behaviors,
        attributes,
        name,
    })
}

fn read_attribute<'a>(r: &mut Reader<'a>, pool: &ConstantPool) -> Result<(u16, String, &'a [u8])> {
    let name_index = r.read_u16()?;
    let name = pool.utf8(name_index)?;
    let len = r.read_u32()? as usize;
    let data = r.read_bytes(len).map_err(|e| {
        TransformError::malformed(format!("attribute {}: {}", name, e.reason()))
    })?;
    Ok((name_index, name, data))
}

fn read_raw_attributes(r: &mut Reader<'_>, pool: &ConstantPool) -> Result<Vec<RawAttribute>> {
    let count = r.read_u16()?;
    (0..count)
        .map(|_| {
            let (name_index, name, data) = read_attribute(r, pool)?;
            Ok(RawAttribute {
                name_index,
                name,
                data: data.to_vec(),
            })
        })
        .collect()
}

fn decode_behavior(r: &mut Reader<'_>, pool: &ConstantPool) -> Result<BehaviorDescriptor> {
    let access_flags = r.read_u16()?;
    let name_index = r.read_u16()?;
    let descriptor_index = r.read_u16()?;
    let name = pool.utf8(name_index)?;
    let descriptor = pool.utf8(descriptor_index)?;
    MethodDescriptor::parse(&descriptor)?;

    let count = r.read_u16()?;
    let mut attributes = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let (attr_index, attr_name, data) = read_attribute(r, pool)?;
        if attr_name == ATTR_CODE {
            if attributes
                .iter()
                .any(|a| matches!(a, MethodAttribute::Code { .. }))
            {
                return Err(TransformError::malformed(format!(
                    "{}{} has more than one Code attribute",
                    name, descriptor
                )));
            }
            let body = decode_code(data, pool).map_err(|e| match e {
                TransformError::MalformedInput(reason) => TransformError::malformed(format!(
                    "{}{}: {}",
                    name, descriptor, reason
                )),
                other => other,
            })?;
            attributes.push(MethodAttribute::Code {
                name_index: attr_index,
                body: Box::new(body),
            });
        } else {
            attributes.push(MethodAttribute::Raw(RawAttribute {
                name_index: attr_index,
                name: attr_name,
                data: data.to_vec(),
            }));
        }
    }

    let kind = BehaviorKind::from_name(&name);
    let mut behavior = BehaviorDescriptor {
        access_flags,
        name_index,
        descriptor_index,
        name,
        descriptor,
        kind,
        attributes,
        exits: Vec::new(),
    };
    behavior.exits = behavior
        .body()
        .map(CodeBody::enumerate_exits)
        .unwrap_or_default();
    Ok(behavior)
}

fn decode_code(data: &[u8], pool: &ConstantPool) -> Result<CodeBody> {
    let mut r = Reader::new(data);
    let max_stack = r.read_u16()?;
    let max_locals = r.read_u16()?;
    let code_length = r.read_u32()? as usize;
    let code = r.read_bytes(code_length)?;
    let (instructions, layout) = decode_instructions(code)?;

    let handler_count = r.read_u16()?;
    let mut exception_table = Vec::with_capacity(handler_count as usize);
    for _ in 0..handler_count {
        let start_pc = r.read_u16()? as u32;
        let end_pc = r.read_u16()? as u32;
        let handler_pc = r.read_u16()? as u32;
        let catch_type = r.read_u16()?;
        let start = instruction_label(&layout, start_pc, "exception range start")?;
        let end = boundary_label(&layout, end_pc, "exception range end")?;
        let handler = instruction_label(&layout, handler_pc, "exception handler")?;
        if start >= end {
            return Err(TransformError::malformed(format!(
                "empty exception range {}..{}",
                start_pc, end_pc
            )));
        }
        if catch_type != 0 {
            pool.expect_tag(catch_type, &[TAG_CLASS])?;
        }
        exception_table.push(ExceptionHandler {
            start,
            end,
            handler,
            catch_type,
        });
    }

    let attr_count = r.read_u16()?;
    let mut attributes = Vec::with_capacity(attr_count as usize);
    for _ in 0..attr_count {
        let (name_index, name, data) = read_attribute(&mut r, pool)?;
        let attribute = match name.as_str() {
            ATTR_LINE_NUMBER_TABLE => CodeAttribute::LineNumbers {
                name_index,
                entries: decode_line_numbers(data, &layout)?,
            },
            ATTR_LOCAL_VARIABLE_TABLE | ATTR_LOCAL_VARIABLE_TYPE_TABLE => {
                CodeAttribute::LocalVariables {
                    name_index,
                    types: name == ATTR_LOCAL_VARIABLE_TYPE_TABLE,
                    entries: decode_local_variables(data, &layout, pool)?,
                }
            }
            ATTR_STACK_MAP_TABLE => CodeAttribute::StackMap {
                name_index,
                frames: decode_stack_map(data, &layout, pool)?,
            },
            _ => CodeAttribute::Raw(RawAttribute {
                name_index,
                name,
                data: data.to_vec(),
            }),
        };
        attributes.push(attribute);
    }
    r.expect_end("Code attribute")?;

    Ok(CodeBody {
        max_stack,
        max_locals,
        instructions,
        exception_table,
        attributes,
        probe: None,
    })
}

fn decode_line_numbers(data: &[u8], layout: &CodeLayout) -> Result<Vec<LineNumber>> {
    let mut r = Reader::new(data);
    let count = r.read_u16()?;
    let entries = (0..count)
        .map(|_| {
            let start = instruction_label(layout, r.read_u16()? as u32, "line number")?;
            Ok(LineNumber {
                start,
                line: r.read_u16()?,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    r.expect_end(ATTR_LINE_NUMBER_TABLE)?;
    Ok(entries)
}

fn decode_local_variables(
    data: &[u8],
    layout: &CodeLayout,
    pool: &ConstantPool,
) -> Result<Vec<LocalVariable>> {
    let mut r = Reader::new(data);
    let count = r.read_u16()?;
    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let start_pc = r.read_u16()? as u32;
        let length = r.read_u16()? as u32;
        let name_index = r.read_u16()?;
        let descriptor_index = r.read_u16()?;
        let index = r.read_u16()?;
        pool.expect_tag(name_index, &[TAG_UTF8])?;
        pool.expect_tag(descriptor_index, &[TAG_UTF8])?;
        entries.push(LocalVariable {
            start: boundary_label(layout, start_pc, "local variable start")?,
            end: boundary_label(layout, start_pc + length, "local variable end")?,
            name_index,
            descriptor_index,
            index,
        });
    }
    r.expect_end("local variable table")?;
    Ok(entries)
}

/// Label of an instruction start
fn instruction_label(layout: &CodeLayout, offset: u32, what: &str) -> Result<Label> {
    layout
        .label_at(offset)
        .filter(|l| l.index() < layout.len())
        .ok_or_else(|| {
            TransformError::malformed(format!(
                "{} at offset {} is not an instruction boundary",
                what, offset
            ))
        })
}

/// Label of an instruction start or the end of code
fn boundary_label(layout: &CodeLayout, offset: u32, what: &str) -> Result<Label> {
    layout.label_at(offset).ok_or_else(|| {
        TransformError::malformed(format!(
            "{} at offset {} is not an instruction boundary",
            what, offset
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_is_malformed() {
        let err = decode(&[]).unwrap_err();
        assert!(matches!(err, TransformError::MalformedInput(_)));
    }

    #[test]
    fn test_bad_magic() {
        let err = decode(&[0xCA, 0xFE, 0xD0, 0x0D, 0, 0, 0, 52]).unwrap_err();
        assert!(err.to_string().contains("bad magic"));
    }

    #[test]
    fn test_unknown_version() {
        let err = decode(&[0xCA, 0xFE, 0xBA, 0xBE, 0, 0, 0, 99, 0, 1]).unwrap_err();
        assert!(err.to_string().contains("unknown format version"));
    }

    #[test]
    fn test_truncated_after_header() {
        let err = decode(&[0xCA, 0xFE, 0xBA, 0xBE, 0, 0, 0, 52]).unwrap_err();
        assert!(err.to_string().contains("truncated"));
    }
}
