//! Tagged instruction model with label-based branch targets
//!
//! Branch targets, and every other code position the model refers to, are
//! [`Label`]s: indices into the instruction list, with `len` denoting the end
//! of the code. Byte offsets only exist while decoding and encoding.

use super::bytes::{push_u16, push_u32, push_u8, Reader};
use super::constant_pool::ConstantPool;
use super::descriptor::{parse_field_type, MethodDescriptor};
use super::opcodes::{self, Format};
use crate::error::{Result, TransformError};

/// Position in a code body, as an instruction index
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Label(pub u32);

impl Label {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    None,
    /// `bipush`
    Byte(i8),
    /// `sipush`
    Short(i16),
    /// `newarray` element type code
    ArrayType(u8),
    /// Loads, stores and `ret`
    Local { index: u16, wide: bool },
    Iinc { index: u16, delta: i16, wide: bool },
    /// `ldc` (one-byte index) and every two-byte constant pool operand
    Constant(u16),
    InvokeInterface { index: u16, count: u8 },
    InvokeDynamic(u16),
    MultiANewArray { index: u16, dimensions: u8 },
    /// Two-byte branches, or four-byte for `goto_w`/`jsr_w`
    Branch(Label),
    TableSwitch {
        default: Label,
        low: i32,
        high: i32,
        targets: Vec<Label>,
    },
    LookupSwitch {
        default: Label,
        pairs: Vec<(i32, Label)>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: u8,
    pub operand: Operand,
}

/// Operand-stack effect in slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackEffect {
    Slots { pops: u16, pushes: u16 },
    /// `pop`/`dup`/`swap` family, which rearranges slots in place
    Shuffle,
}

impl Instruction {
    pub fn simple(opcode: u8) -> Self {
        Self {
            opcode,
            operand: Operand::None,
        }
    }

    pub fn constant(opcode: u8, index: u16) -> Self {
        Self {
            opcode,
            operand: Operand::Constant(index),
        }
    }

    /// A load or store of `index`, using the `wide` prefix when needed
    pub fn local(opcode: u8, index: u16) -> Self {
        Self {
            opcode,
            operand: Operand::Local {
                index,
                wide: index > u8::MAX as u16,
            },
        }
    }

    pub fn branch(opcode: u8, target: Label) -> Self {
        Self {
            opcode,
            operand: Operand::Branch(target),
        }
    }

    pub fn mnemonic(&self) -> &'static str {
        opcodes::mnemonic(self.opcode)
    }

    pub fn is_return(&self) -> bool {
        opcodes::is_return(self.opcode)
    }

    /// All labels this instruction refers to
    pub fn labels(&self) -> Vec<Label> {
        match &self.operand {
            Operand::Branch(l) => vec![*l],
            Operand::TableSwitch {
                default, targets, ..
            } => std::iter::once(*default).chain(targets.iter().copied()).collect(),
            Operand::LookupSwitch { default, pairs } => std::iter::once(*default)
                .chain(pairs.iter().map(|(_, l)| *l))
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn labels_mut(&mut self) -> Vec<&mut Label> {
        match &mut self.operand {
            Operand::Branch(l) => vec![l],
            Operand::TableSwitch {
                default, targets, ..
            } => std::iter::once(default).chain(targets.iter_mut()).collect(),
            Operand::LookupSwitch { default, pairs } => std::iter::once(default)
                .chain(pairs.iter_mut().map(|(_, l)| l))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Encoded size when placed at byte `offset` (switch padding depends on it)
    pub fn size_at(&self, offset: u32) -> u32 {
        match &self.operand {
            Operand::None => 1,
            Operand::Byte(_) | Operand::ArrayType(_) => 2,
            Operand::Short(_) => 3,
            Operand::Local { wide, .. } => {
                if *wide {
                    4
                } else {
                    2
                }
            }
            Operand::Iinc { wide, .. } => {
                if *wide {
                    6
                } else {
                    3
                }
            }
            Operand::Constant(_) => {
                if self.opcode == opcodes::LDC {
                    2
                } else {
                    3
                }
            }
            Operand::InvokeInterface { .. } | Operand::InvokeDynamic(_) => 5,
            Operand::MultiANewArray { .. } => 4,
            Operand::Branch(_) => {
                if matches!(self.opcode, opcodes::GOTO_W | opcodes::JSR_W) {
                    5
                } else {
                    3
                }
            }
            Operand::TableSwitch { targets, .. } => {
                1 + switch_padding(offset) + 12 + 4 * targets.len() as u32
            }
            Operand::LookupSwitch { pairs, .. } => {
                1 + switch_padding(offset) + 8 + 8 * pairs.len() as u32
            }
        }
    }

    pub(crate) fn encode(&self, out: &mut Vec<u8>, offset: u32, layout: &CodeLayout) -> Result<()> {
        let expected = opcodes::format(self.opcode).ok_or_else(|| {
            TransformError::unencodable(format!("invalid opcode 0x{:02x}", self.opcode))
        })?;
        let mismatch = || {
            TransformError::unencodable(format!(
                "operand {:?} does not fit {}",
                self.operand,
                self.mnemonic()
            ))
        };
        let target = |label: Label| -> Result<i64> {
            let to = layout.offset_of(label).filter(|_| label.index() < layout.len()).ok_or_else(|| {
                TransformError::unencodable(format!(
                    "{} at offset {} targets dangling label {}",
                    self.mnemonic(),
                    offset,
                    label.0
                ))
            })?;
            Ok(to as i64 - offset as i64)
        };

        match (&self.operand, expected) {
            (Operand::Local { index, wide: true }, Format::Local)
            | (Operand::Iinc { index, wide: true, .. }, Format::Iinc) => {
                push_u8(out, opcodes::WIDE);
                push_u8(out, self.opcode);
                push_u16(out, *index);
                if let Operand::Iinc { delta, .. } = self.operand {
                    push_u16(out, delta as u16);
                }
                return Ok(());
            }
            _ => push_u8(out, self.opcode),
        }

        match (&self.operand, expected) {
            (Operand::None, Format::None) => {}
            (Operand::Byte(v), Format::Byte) => push_u8(out, *v as u8),
            (Operand::Short(v), Format::Short) => push_u16(out, *v as u16),
            (Operand::ArrayType(t), Format::ArrayType) => push_u8(out, *t),
            (Operand::Local { index, wide: false }, Format::Local) => {
                push_u8(out, u8::try_from(*index).map_err(|_| mismatch())?)
            }
            (Operand::Iinc { index, delta, wide: false }, Format::Iinc) => {
                push_u8(out, u8::try_from(*index).map_err(|_| mismatch())?);
                push_u8(out, i8::try_from(*delta).map_err(|_| mismatch())? as u8);
            }
            (Operand::Constant(index), Format::ConstU8) => {
                push_u8(out, u8::try_from(*index).map_err(|_| mismatch())?)
            }
            (Operand::Constant(index), Format::ConstU16) => push_u16(out, *index),
            (Operand::InvokeInterface { index, count }, Format::InvokeInterface) => {
                push_u16(out, *index);
                push_u8(out, *count);
                push_u8(out, 0);
            }
            (Operand::InvokeDynamic(index), Format::InvokeDynamic) => {
                push_u16(out, *index);
                push_u16(out, 0);
            }
            (Operand::MultiANewArray { index, dimensions }, Format::MultiANewArray) => {
                push_u16(out, *index);
                push_u8(out, *dimensions);
            }
            (Operand::Branch(label), Format::Branch16) => {
                let delta = target(*label)?;
                let delta = i16::try_from(delta).map_err(|_| {
                    TransformError::unencodable(format!(
                        "{} at offset {} cannot reach delta {}",
                        self.mnemonic(),
                        offset,
                        delta
                    ))
                })?;
                push_u16(out, delta as u16);
            }
            (Operand::Branch(label), Format::Branch32) => {
                push_u32(out, target(*label)? as i32 as u32);
            }
            (
                Operand::TableSwitch {
                    default,
                    low,
                    high,
                    targets,
                },
                Format::TableSwitch,
            ) => {
                if (*high as i64 - *low as i64 + 1) != targets.len() as i64 {
                    return Err(mismatch());
                }
                out.extend(std::iter::repeat(0u8).take(switch_padding(offset) as usize));
                push_u32(out, target(*default)? as i32 as u32);
                push_u32(out, *low as u32);
                push_u32(out, *high as u32);
                for label in targets {
                    push_u32(out, target(*label)? as i32 as u32);
                }
            }
            (Operand::LookupSwitch { default, pairs }, Format::LookupSwitch) => {
                out.extend(std::iter::repeat(0u8).take(switch_padding(offset) as usize));
                push_u32(out, target(*default)? as i32 as u32);
                push_u32(out, pairs.len() as u32);
                for (key, label) in pairs {
                    push_u32(out, *key as u32);
                    push_u32(out, target(*label)? as i32 as u32);
                }
            }
            _ => return Err(mismatch()),
        }
        Ok(())
    }

    /// Operand-stack effect, resolving member descriptors through `pool`
    pub fn stack_effect(&self, pool: &ConstantPool) -> Result<StackEffect> {
        use opcodes::*;

        let slots = |pops: u16, pushes: u16| Ok(StackEffect::Slots { pops, pushes });
        let op = self.opcode;
        let index = match self.operand {
            Operand::Constant(i)
            | Operand::InvokeInterface { index: i, .. }
            | Operand::InvokeDynamic(i)
            | Operand::MultiANewArray { index: i, .. } => i,
            _ => 0,
        };
        let field_slots = || -> Result<u16> {
            Ok(parse_field_type(&pool.member_ref(index)?.descriptor)?.slots())
        };
        let method = || -> Result<MethodDescriptor> {
            MethodDescriptor::parse(&pool.member_ref(index)?.descriptor)
        };
        // category-2 variants sit on odd opcodes in the arithmetic blocks
        let odd = op % 2 == 1;

        match op {
            NOP | IINC | GOTO | GOTO_W | RET | RETURN => slots(0, 0),
            0x01..=0x08 | 0x0b..=0x0d | BIPUSH | SIPUSH | LDC | LDC_W => slots(0, 1),
            0x09 | 0x0a | 0x0e | 0x0f | LDC2_W => slots(0, 2),
            ILOAD | 0x17 | ALOAD | 0x1a..=0x1d | 0x22..=0x25 | 0x2a..=0x2d => slots(0, 1),
            LLOAD | 0x18 | 0x1e..=0x21 | 0x26..=0x29 => slots(0, 2),
            0x2e | 0x30 | 0x32..=0x35 => slots(2, 1),
            0x2f | 0x31 => slots(2, 2),
            0x36 | 0x38 | ASTORE | 0x3b..=0x3e | 0x43..=0x46 | 0x4b..=0x4e => slots(1, 0),
            LSTORE | 0x39 | 0x3f..=0x42 | 0x47..=0x4a => slots(2, 0),
            0x4f | 0x51 | 0x53..=0x56 => slots(3, 0),
            0x50 | 0x52 => slots(4, 0),
            POP..=SWAP => Ok(StackEffect::Shuffle),
            0x60..=0x73 | 0x7e..=0x83 => {
                if odd {
                    slots(4, 2)
                } else {
                    slots(2, 1)
                }
            }
            0x74..=0x77 => {
                if odd {
                    slots(2, 2)
                } else {
                    slots(1, 1)
                }
            }
            0x78..=0x7d => {
                if odd {
                    slots(3, 2)
                } else {
                    slots(2, 1)
                }
            }
            0x85 | 0x87 | 0x8c | 0x8d => slots(1, 2),
            0x86 | 0x8b | 0x91..=0x93 => slots(1, 1),
            0x88 | 0x89 | 0x8e | 0x90 => slots(2, 1),
            0x8a | 0x8f => slots(2, 2),
            0x94 | 0x97 | 0x98 => slots(4, 1),
            0x95 | 0x96 => slots(2, 1),
            0x99..=0x9e | IFNULL | IFNONNULL => slots(1, 0),
            0x9f..=0xa6 => slots(2, 0),
            JSR | JSR_W => slots(0, 1),
            TABLESWITCH | LOOKUPSWITCH | IRETURN | FRETURN | ARETURN | ATHROW => slots(1, 0),
            LRETURN | DRETURN => slots(2, 0),
            GETSTATIC => slots(0, field_slots()?),
            PUTSTATIC => slots(field_slots()?, 0),
            GETFIELD => slots(1, field_slots()?),
            PUTFIELD => slots(1 + field_slots()?, 0),
            INVOKEVIRTUAL | INVOKESPECIAL | INVOKEINTERFACE => {
                let md = method()?;
                slots(md.param_slots() + 1, md.return_slots())
            }
            INVOKESTATIC => {
                let md = method()?;
                slots(md.param_slots(), md.return_slots())
            }
            INVOKEDYNAMIC => {
                let md = MethodDescriptor::parse(&pool.dynamic_descriptor(index)?)?;
                slots(md.param_slots(), md.return_slots())
            }
            NEW => slots(0, 1),
            NEWARRAY | ANEWARRAY | 0xbe | CHECKCAST | INSTANCEOF => slots(1, 1),
            0xc2 | 0xc3 => slots(1, 0),
            MULTIANEWARRAY => match self.operand {
                Operand::MultiANewArray { dimensions, .. } => slots(dimensions as u16, 1),
                _ => Err(TransformError::malformed("multianewarray without dimensions")),
            },
            other => Err(TransformError::malformed(format!(
                "no stack effect for opcode 0x{:02x}",
                other
            ))),
        }
    }
}

fn switch_padding(offset: u32) -> u32 {
    (4 - (offset + 1) % 4) % 4
}

/// Byte offset of every instruction in a body, plus the end offset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeLayout {
    offsets: Vec<u32>,
    end: u32,
}

impl CodeLayout {
    /// Lay out `instructions` in a single forward pass
    pub fn compute(instructions: &[Instruction]) -> Result<Self> {
        let mut offsets = Vec::with_capacity(instructions.len());
        let mut pos: u64 = 0;
        for insn in instructions {
            if pos > u16::MAX as u64 {
                break;
            }
            offsets.push(pos as u32);
            pos += insn.size_at(pos as u32) as u64;
        }
        if pos == 0 || pos > u16::MAX as u64 {
            return Err(TransformError::unencodable(format!(
                "code length {} outside 1..=65535",
                pos
            )));
        }
        Ok(Self {
            offsets,
            end: pos as u32,
        })
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn code_length(&self) -> u32 {
        self.end
    }

    /// Byte offset of `label`; the end label maps to the code length
    pub fn offset_of(&self, label: Label) -> Option<u32> {
        match label.index().cmp(&self.offsets.len()) {
            std::cmp::Ordering::Less => Some(self.offsets[label.index()]),
            std::cmp::Ordering::Equal => Some(self.end),
            std::cmp::Ordering::Greater => None,
        }
    }

    /// Label of the instruction starting at `offset`, or the end label
    pub fn label_at(&self, offset: u32) -> Option<Label> {
        if offset == self.end {
            return Some(Label(self.offsets.len() as u32));
        }
        self.offsets
            .binary_search(&offset)
            .ok()
            .map(|i| Label(i as u32))
    }
}

/// Decode a `code` array; returned labels are already instruction indices
pub(crate) fn decode_instructions(code: &[u8]) -> Result<(Vec<Instruction>, CodeLayout)> {
    if code.is_empty() || code.len() > u16::MAX as usize {
        return Err(TransformError::malformed(format!(
            "code length {} outside 1..=65535",
            code.len()
        )));
    }
    let mut r = Reader::new(code);
    let mut instructions = Vec::new();
    let mut offsets = Vec::new();
    while r.remaining() > 0 {
        let offset = r.position() as u32;
        offsets.push(offset);
        instructions.push(decode_one(&mut r, offset)?);
    }
    let layout = CodeLayout {
        offsets,
        end: code.len() as u32,
    };

    // labels currently hold absolute byte offsets
    for (i, insn) in instructions.iter_mut().enumerate() {
        let at = layout.offsets[i];
        for label in insn.labels_mut() {
            let resolved = layout
                .label_at(label.0)
                .filter(|l| l.index() < layout.len())
                .ok_or_else(|| {
                    TransformError::malformed(format!(
                        "branch at offset {} targets {}, not an instruction boundary",
                        at, label.0
                    ))
                })?;
            *label = resolved;
        }
    }
    Ok((instructions, layout))
}

fn decode_one(r: &mut Reader<'_>, offset: u32) -> Result<Instruction> {
    let opcode = r.read_u8()?;
    let format = opcodes::format(opcode).ok_or_else(|| {
        TransformError::malformed(format!("unknown opcode 0x{:02x} at offset {}", opcode, offset))
    })?;
    let absolute = |delta: i64| -> Result<Label> {
        let target = offset as i64 + delta;
        if !(0..=u16::MAX as i64).contains(&target) {
            return Err(TransformError::malformed(format!(
                "branch at offset {} leaves the code array",
                offset
            )));
        }
        Ok(Label(target as u32))
    };

    let operand = match format {
        Format::None => Operand::None,
        Format::Byte => Operand::Byte(r.read_i8()?),
        Format::Short => Operand::Short(r.read_i16()?),
        Format::ArrayType => {
            let atype = r.read_u8()?;
            if !(4..=11).contains(&atype) {
                return Err(TransformError::malformed(format!(
                    "newarray type {} at offset {}",
                    atype, offset
                )));
            }
            Operand::ArrayType(atype)
        }
        Format::Local => Operand::Local {
            index: r.read_u8()? as u16,
            wide: false,
        },
        Format::Iinc => Operand::Iinc {
            index: r.read_u8()? as u16,
            delta: r.read_i8()? as i16,
            wide: false,
        },
        Format::ConstU8 => Operand::Constant(r.read_u8()? as u16),
        Format::ConstU16 => Operand::Constant(r.read_u16()?),
        Format::InvokeInterface => {
            let index = r.read_u16()?;
            let count = r.read_u8()?;
            if count == 0 || r.read_u8()? != 0 {
                return Err(TransformError::malformed(format!(
                    "invokeinterface operands at offset {}",
                    offset
                )));
            }
            Operand::InvokeInterface { index, count }
        }
        Format::InvokeDynamic => {
            let index = r.read_u16()?;
            if r.read_u16()? != 0 {
                return Err(TransformError::malformed(format!(
                    "invokedynamic reserved bytes at offset {}",
                    offset
                )));
            }
            Operand::InvokeDynamic(index)
        }
        Format::MultiANewArray => {
            let index = r.read_u16()?;
            let dimensions = r.read_u8()?;
            if dimensions == 0 {
                return Err(TransformError::malformed(format!(
                    "multianewarray with zero dimensions at offset {}",
                    offset
                )));
            }
            Operand::MultiANewArray { index, dimensions }
        }
        Format::Branch16 => Operand::Branch(absolute(r.read_i16()? as i64)?),
        Format::Branch32 => Operand::Branch(absolute(r.read_i32()? as i64)?),
        Format::TableSwitch => {
            skip_padding(r, offset)?;
            let default = absolute(r.read_i32()? as i64)?;
            let low = r.read_i32()?;
            let high = r.read_i32()?;
            if high < low {
                return Err(TransformError::malformed(format!(
                    "tableswitch at offset {} has high < low",
                    offset
                )));
            }
            let count = high as i64 - low as i64 + 1;
            if count > (r.remaining() / 4) as i64 {
                return Err(TransformError::malformed(format!(
                    "tableswitch at offset {} is truncated",
                    offset
                )));
            }
            let mut targets = Vec::with_capacity(count as usize);
            for _ in 0..count {
                targets.push(absolute(r.read_i32()? as i64)?);
            }
            Operand::TableSwitch {
                default,
                low,
                high,
                targets,
            }
        }
        Format::LookupSwitch => {
            skip_padding(r, offset)?;
            let default = absolute(r.read_i32()? as i64)?;
            let npairs = r.read_i32()?;
            if npairs < 0 || npairs as i64 > (r.remaining() / 8) as i64 {
                return Err(TransformError::malformed(format!(
                    "lookupswitch at offset {} has bad pair count {}",
                    offset, npairs
                )));
            }
            let mut pairs = Vec::with_capacity(npairs as usize);
            for _ in 0..npairs {
                let key = r.read_i32()?;
                pairs.push((key, absolute(r.read_i32()? as i64)?));
            }
            Operand::LookupSwitch { default, pairs }
        }
        Format::Wide => {
            let inner = r.read_u8()?;
            return match inner {
                0x15..=0x19 | 0x36..=0x3a | opcodes::RET => Ok(Instruction {
                    opcode: inner,
                    operand: Operand::Local {
                        index: r.read_u16()?,
                        wide: true,
                    },
                }),
                opcodes::IINC => Ok(Instruction {
                    opcode: inner,
                    operand: Operand::Iinc {
                        index: r.read_u16()?,
                        delta: r.read_i16()?,
                        wide: true,
                    },
                }),
                other => Err(TransformError::malformed(format!(
                    "wide prefix on opcode 0x{:02x} at offset {}",
                    other, offset
                ))),
            };
        }
    };
    Ok(Instruction { opcode, operand })
}

fn skip_padding(r: &mut Reader<'_>, offset: u32) -> Result<()> {
    let padding = r.read_bytes(switch_padding(offset) as usize)?;
    if padding.iter().any(|&b| b != 0) {
        return Err(TransformError::unsupported(format!(
            "non-zero switch padding at offset {}",
            offset
        )));
    }
    Ok(())
}
