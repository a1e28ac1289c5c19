//! Class encoder: [`ClassDescriptor`] to raw bytes
//!
//! Encoding is deterministic. Before writing a body the encoder checks the
//! model is internally consistent and reports violations as
//! [`TransformError::Unencodable`].

use crate::classfile::bytes::{count_u16, len_u32, push_u16, push_u32};
use crate::classfile::instruction::{CodeLayout, Label};
use crate::classfile::opcodes;
use crate::classfile::stackmap::encode_stack_map;
use crate::classfile::MAGIC;
use crate::error::{Result, TransformError};
use crate::model::{
    BehaviorDescriptor, ClassDescriptor, CodeAttribute, CodeBody, ExitKind, ExitPoint,
    MethodAttribute, RawAttribute,
};

/// Serialize a class
pub fn encode(class: &ClassDescriptor) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(1024);
    push_u32(&mut out, MAGIC);
    push_u16(&mut out, class.minor_version);
    push_u16(&mut out, class.major_version);
    class.pool.encode(&mut out)?;
    push_u16(&mut out, class.access_flags);
    push_u16(&mut out, class.this_class);
    push_u16(&mut out, class.super_class);

    push_u16(&mut out, count_u16(class.interfaces.len(), "interfaces")?);
    for index in &class.interfaces {
        push_u16(&mut out, *index);
    }

    push_u16(&mut out, count_u16(class.fields.len(), "fields")?);
    for field in &class.fields {
        push_u16(&mut out, field.access_flags);
        push_u16(&mut out, field.name_index);
        push_u16(&mut out, field.descriptor_index);
        write_raw_attributes(&mut out, &field.attributes)?;
    }

    push_u16(&mut out, count_u16(class.behaviors.len(), "methods")?);
    for behavior in &class.behaviors {
        encode_behavior(&mut out, behavior).map_err(|e| match e {
            TransformError::Unencodable(reason) => TransformError::unencodable(format!(
                "{}{}: {}",
                behavior.name, behavior.descriptor, reason
            )),
            other => other,
        })?;
    }

    write_raw_attributes(&mut out, &class.attributes)?;
    Ok(out)
}

fn write_attribute(out: &mut Vec<u8>, name_index: u16, data: &[u8]) -> Result<()> {
    push_u16(out, name_index);
    push_u32(out, len_u32(data.len(), "attribute")?);
    out.extend_from_slice(data);
    Ok(())
}

fn write_raw_attributes(out: &mut Vec<u8>, attributes: &[RawAttribute]) -> Result<()> {
    push_u16(out, count_u16(attributes.len(), "attributes")?);
    for attr in attributes {
        write_attribute(out, attr.name_index, &attr.data)?;
    }
    Ok(())
}

fn encode_behavior(out: &mut Vec<u8>, behavior: &BehaviorDescriptor) -> Result<()> {
    push_u16(out, behavior.access_flags);
    push_u16(out, behavior.name_index);
    push_u16(out, behavior.descriptor_index);
    push_u16(out, count_u16(behavior.attributes.len(), "method attributes")?);
    for attr in &behavior.attributes {
        match attr {
            MethodAttribute::Code { name_index, body } => {
                let data = encode_code(body, &behavior.exits)?;
                write_attribute(out, *name_index, &data)?;
            }
            MethodAttribute::Raw(raw) => write_attribute(out, raw.name_index, &raw.data)?,
        }
    }
    if !behavior.has_body() && !behavior.exits.is_empty() {
        return Err(TransformError::unencodable("exit points on a behavior without a body"));
    }
    Ok(())
}

fn encode_code(body: &CodeBody, exits: &[ExitPoint]) -> Result<Vec<u8>> {
    let layout = CodeLayout::compute(&body.instructions)?;
    check_exits(body, exits)?;

    let mut code = Vec::with_capacity(layout.code_length() as usize);
    for (i, insn) in body.instructions.iter().enumerate() {
        let offset = offset(&layout, Label(i as u32), "instruction")?;
        insn.encode(&mut code, offset, &layout)?;
    }

    let mut out = Vec::with_capacity(code.len() + 64);
    push_u16(&mut out, body.max_stack);
    push_u16(&mut out, body.max_locals);
    push_u32(&mut out, code.len() as u32);
    out.extend_from_slice(&code);

    push_u16(&mut out, count_u16(body.exception_table.len(), "exception handlers")?);
    for entry in &body.exception_table {
        if entry.start >= entry.end {
            return Err(TransformError::unencodable(format!(
                "exception range {}..{} is empty",
                entry.start.0, entry.end.0
            )));
        }
        push_u16(&mut out, offset(&layout, entry.start, "exception range start")? as u16);
        push_u16(&mut out, offset(&layout, entry.end, "exception range end")? as u16);
        push_u16(&mut out, instruction_offset(&layout, entry.handler, "exception handler")?);
        push_u16(&mut out, entry.catch_type);
    }

    push_u16(&mut out, count_u16(body.attributes.len(), "code attributes")?);
    for attr in &body.attributes {
        match attr {
            CodeAttribute::LineNumbers {
                name_index,
                entries,
            } => {
                let mut data = Vec::with_capacity(2 + entries.len() * 4);
                push_u16(&mut data, count_u16(entries.len(), "line numbers")?);
                for entry in entries {
                    push_u16(&mut data, instruction_offset(&layout, entry.start, "line number")?);
                    push_u16(&mut data, entry.line);
                }
                write_attribute(&mut out, *name_index, &data)?;
            }
            CodeAttribute::LocalVariables {
                name_index,
                entries,
                ..
            } => {
                let mut data = Vec::with_capacity(2 + entries.len() * 10);
                push_u16(&mut data, count_u16(entries.len(), "local variables")?);
                for entry in entries {
                    let start = offset(&layout, entry.start, "local variable start")?;
                    let end = offset(&layout, entry.end, "local variable end")?;
                    if end < start {
                        return Err(TransformError::unencodable(format!(
                            "local variable range {}..{} is reversed",
                            entry.start.0, entry.end.0
                        )));
                    }
                    push_u16(&mut data, start as u16);
                    push_u16(&mut data, (end - start) as u16);
                    push_u16(&mut data, entry.name_index);
                    push_u16(&mut data, entry.descriptor_index);
                    push_u16(&mut data, entry.index);
                }
                write_attribute(&mut out, *name_index, &data)?;
            }
            CodeAttribute::StackMap { name_index, frames } => {
                write_attribute(&mut out, *name_index, &encode_stack_map(frames, &layout)?)?;
            }
            CodeAttribute::Raw(raw) => write_attribute(&mut out, raw.name_index, &raw.data)?,
        }
    }
    Ok(out)
}

/// Exit points must still sit on code that leaves the body
fn check_exits(body: &CodeBody, exits: &[ExitPoint]) -> Result<()> {
    let mut unwinds = 0;
    for exit in exits {
        let opcode = body.instruction(exit.at).map(|insn| insn.opcode);
        let valid = match exit.kind {
            ExitKind::Return => opcode.is_some_and(opcodes::is_return),
            ExitKind::Unwind => {
                unwinds += 1;
                exit.at == body.end() || opcode == Some(opcodes::ATHROW)
            }
        };
        if !valid {
            return Err(TransformError::unencodable(format!(
                "{:?} exit at label {} is not a valid code location",
                exit.kind, exit.at.0
            )));
        }
    }
    if unwinds > 1 {
        return Err(TransformError::unencodable(format!(
            "{} unwind exits in one body",
            unwinds
        )));
    }
    Ok(())
}

fn offset(layout: &CodeLayout, label: Label, what: &str) -> Result<u32> {
    layout.offset_of(label).ok_or_else(|| {
        TransformError::unencodable(format!("{} refers to dangling label {}", what, label.0))
    })
}

fn instruction_offset(layout: &CodeLayout, label: Label, what: &str) -> Result<u16> {
    if label.index() >= layout.len() {
        return Err(TransformError::unencodable(format!(
            "{} refers to label {} past the last instruction",
            what, label.0
        )));
    }
    Ok(offset(layout, label, what)? as u16)
}
