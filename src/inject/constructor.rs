//! Locating the delegating `super(...)`/`this(...)` call in a constructor
//!
//! Until that call returns, `this` is uninitialized and the verifier will not
//! accept a handler that covers the code. The prefix is walked linearly while
//! tracking which operand-stack slots hold the uninitialized `this`; stack-map
//! frames supply the stack wherever control merges.

use std::collections::HashMap;

use super::frames::ExpandedFrame;
use crate::classfile::instruction::{Operand, StackEffect};
use crate::classfile::opcodes::{self, *};
use crate::classfile::stackmap::VerificationType;
use crate::classfile::{ConstantPool, MethodDescriptor};
use crate::error::{Result, TransformError};
use crate::model::CodeBody;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    This,
    Value,
}

/// Index of the first instruction after the delegating constructor call
pub(crate) fn delegation_end(
    body: &CodeBody,
    pool: &ConstantPool,
    frames: &[ExpandedFrame],
) -> Result<usize> {
    let by_label: HashMap<usize, &ExpandedFrame> =
        frames.iter().map(|f| (f.at.index(), f)).collect();
    let mut stack: Option<Vec<Slot>> = Some(Vec::new());
    let mut this_in_local0 = true;

    for (i, insn) in body.instructions.iter().enumerate() {
        if let Some(frame) = by_label.get(&i) {
            stack = Some(stack_slots(&frame.stack));
        }
        let st = stack.as_mut().ok_or_else(|| {
            TransformError::unsupported(format!(
                "constructor prefix reaches instruction {} without a stack map frame",
                i
            ))
        })?;

        match (insn.opcode, &insn.operand) {
            (ALOAD_0, _) | (ALOAD, Operand::Local { index: 0, .. }) => {
                st.push(if this_in_local0 { Slot::This } else { Slot::Value });
            }
            (ASTORE_0, _) | (ASTORE, Operand::Local { index: 0, .. }) => {
                this_in_local0 = pop(st, 1, i)?.first() == Some(&Slot::This);
            }
            (INVOKESPECIAL, Operand::Constant(index)) => {
                let method = pool.member_ref(*index)?;
                let args = MethodDescriptor::parse(&method.descriptor)?.param_slots() as usize;
                let popped = pop(st, args + 1, i)?;
                if method.name == "<init>" {
                    if popped[0] == Slot::This {
                        check_no_uninitialized_this_after(frames, i)?;
                        return Ok(i + 1);
                    }
                } else if let StackEffect::Slots { pushes, .. } = insn.stack_effect(pool)? {
                    st.extend(std::iter::repeat(Slot::Value).take(pushes as usize));
                }
            }
            _ => match insn.stack_effect(pool)? {
                StackEffect::Slots { pops, pushes } => {
                    pop(st, pops as usize, i)?;
                    st.extend(std::iter::repeat(Slot::Value).take(pushes as usize));
                }
                StackEffect::Shuffle => shuffle(st, insn.opcode, i)?,
            },
        }

        if opcodes::ends_block(insn.opcode) {
            stack = None;
        }
    }
    Err(TransformError::unsupported(
        "constructor never delegates to another constructor",
    ))
}

fn stack_slots(types: &[VerificationType]) -> Vec<Slot> {
    let mut slots = Vec::with_capacity(types.len());
    for t in types {
        match t {
            VerificationType::UninitializedThis => slots.push(Slot::This),
            VerificationType::Long | VerificationType::Double => {
                slots.extend([Slot::Value, Slot::Value])
            }
            _ => slots.push(Slot::Value),
        }
    }
    slots
}

fn pop(stack: &mut Vec<Slot>, n: usize, at: usize) -> Result<Vec<Slot>> {
    if stack.len() < n {
        return Err(TransformError::malformed(format!(
            "operand stack underflow at instruction {}",
            at
        )));
    }
    Ok(stack.split_off(stack.len() - n))
}

/// `pop`/`dup`/`swap` family applied slot by slot
fn shuffle(stack: &mut Vec<Slot>, opcode: u8, at: usize) -> Result<()> {
    let (count, depth) = match opcode {
        POP => {
            pop(stack, 1, at)?;
            return Ok(());
        }
        POP2 => {
            pop(stack, 2, at)?;
            return Ok(());
        }
        SWAP => {
            let top = pop(stack, 2, at)?;
            stack.extend([top[1], top[0]]);
            return Ok(());
        }
        DUP => (1, 0),
        DUP_X1 => (1, 1),
        DUP_X2 => (1, 2),
        DUP2 => (2, 0),
        DUP2_X1 => (2, 1),
        DUP2_X2 => (2, 2),
        other => {
            return Err(TransformError::malformed(format!(
                "opcode 0x{:02x} is not a stack shuffle",
                other
            )))
        }
    };
    if stack.len() < count + depth {
        return Err(TransformError::malformed(format!(
            "operand stack underflow at instruction {}",
            at
        )));
    }
    let top = stack[stack.len() - count..].to_vec();
    let insert_at = stack.len() - count - depth;
    stack.splice(insert_at..insert_at, top);
    Ok(())
}

fn check_no_uninitialized_this_after(frames: &[ExpandedFrame], call: usize) -> Result<()> {
    match frames
        .iter()
        .find(|f| f.at.index() > call && f.mentions_uninitialized_this())
    {
        Some(frame) => Err(TransformError::unsupported(format!(
            "uninitialized this is still live at instruction {} after the constructor call",
            frame.at.0
        ))),
        None => Ok(()),
    }
}
