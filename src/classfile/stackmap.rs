//! `StackMapTable` frames held against labels instead of offset deltas

use super::bytes::{push_u16, push_u8, Reader};
use super::constant_pool::{ConstantPool, TAG_CLASS};
use super::instruction::{CodeLayout, Label};
use crate::error::{Result, TransformError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationType {
    Top,
    Integer,
    Float,
    Double,
    Long,
    Null,
    UninitializedThis,
    /// Class constant index
    Object(u16),
    /// The `new` instruction that created the value
    Uninitialized(Label),
}

impl VerificationType {
    /// Local-variable slots covered by one entry
    pub fn slots(&self) -> u16 {
        match self {
            VerificationType::Long | VerificationType::Double => 2,
            _ => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameBody {
    Same,
    SameLocals1StackItem(VerificationType),
    /// Drop the last `k` locals (1..=3)
    Chop(u8),
    /// Add 1..=3 locals
    Append(Vec<VerificationType>),
    Full {
        locals: Vec<VerificationType>,
        stack: Vec<VerificationType>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackMapFrame {
    pub at: Label,
    pub body: FrameBody,
    /// `same_frame_extended` / `same_locals_1_stack_item_frame_extended`
    pub extended: bool,
}

impl StackMapFrame {
    pub fn full(at: Label, locals: Vec<VerificationType>, stack: Vec<VerificationType>) -> Self {
        Self {
            at,
            body: FrameBody::Full { locals, stack },
            extended: false,
        }
    }

    pub fn labels_mut(&mut self) -> Vec<&mut Label> {
        let mut labels = vec![&mut self.at];
        let types: Box<dyn Iterator<Item = &mut VerificationType>> = match &mut self.body {
            FrameBody::Same | FrameBody::Chop(_) => Box::new(std::iter::empty()),
            FrameBody::SameLocals1StackItem(t) => Box::new(std::iter::once(t)),
            FrameBody::Append(locals) => Box::new(locals.iter_mut()),
            FrameBody::Full { locals, stack } => Box::new(locals.iter_mut().chain(stack.iter_mut())),
        };
        labels.extend(types.filter_map(|t| match t {
            VerificationType::Uninitialized(l) => Some(l),
            _ => None,
        }));
        labels
    }
}

pub(crate) fn decode_stack_map(
    data: &[u8],
    layout: &CodeLayout,
    pool: &ConstantPool,
) -> Result<Vec<StackMapFrame>> {
    let mut r = Reader::new(data);
    let count = r.read_u16()?;
    let mut frames = Vec::with_capacity(count as usize);
    let mut previous: Option<u32> = None;

    for _ in 0..count {
        let tag = r.read_u8()?;
        let (delta, body, extended) = match tag {
            0..=63 => (tag as u16, FrameBody::Same, false),
            64..=127 => (
                (tag - 64) as u16,
                FrameBody::SameLocals1StackItem(read_type(&mut r, layout, pool)?),
                false,
            ),
            247 => {
                let delta = r.read_u16()?;
                let t = read_type(&mut r, layout, pool)?;
                (delta, FrameBody::SameLocals1StackItem(t), true)
            }
            248..=250 => (r.read_u16()?, FrameBody::Chop(251 - tag), false),
            251 => (r.read_u16()?, FrameBody::Same, true),
            252..=254 => {
                let delta = r.read_u16()?;
                let locals = (0..tag - 251)
                    .map(|_| read_type(&mut r, layout, pool))
                    .collect::<Result<Vec<_>>>()?;
                (delta, FrameBody::Append(locals), false)
            }
            255 => {
                let delta = r.read_u16()?;
                let nlocals = r.read_u16()?;
                let locals = (0..nlocals)
                    .map(|_| read_type(&mut r, layout, pool))
                    .collect::<Result<Vec<_>>>()?;
                let nstack = r.read_u16()?;
                let stack = (0..nstack)
                    .map(|_| read_type(&mut r, layout, pool))
                    .collect::<Result<Vec<_>>>()?;
                (delta, FrameBody::Full { locals, stack }, false)
            }
            other => {
                return Err(TransformError::malformed(format!(
                    "reserved stack map frame type {}",
                    other
                )))
            }
        };
        let offset = match previous {
            None => delta as u32,
            Some(prev) => prev + delta as u32 + 1,
        };
        let at = layout
            .label_at(offset)
            .filter(|l| l.index() < layout.len())
            .ok_or_else(|| {
                TransformError::malformed(format!(
                    "stack map frame at offset {} is not an instruction boundary",
                    offset
                ))
            })?;
        previous = Some(offset);
        frames.push(StackMapFrame {
            at,
            body,
            extended,
        });
    }
    r.expect_end("StackMapTable")?;
    Ok(frames)
}

fn read_type(
    r: &mut Reader<'_>,
    layout: &CodeLayout,
    pool: &ConstantPool,
) -> Result<VerificationType> {
    let t = match r.read_u8()? {
        0 => VerificationType::Top,
        1 => VerificationType::Integer,
        2 => VerificationType::Float,
        3 => VerificationType::Double,
        4 => VerificationType::Long,
        5 => VerificationType::Null,
        6 => VerificationType::UninitializedThis,
        7 => {
            let index = r.read_u16()?;
            pool.expect_tag(index, &[TAG_CLASS])?;
            VerificationType::Object(index)
        }
        8 => {
            let offset = r.read_u16()? as u32;
            let label = layout
                .label_at(offset)
                .filter(|l| l.index() < layout.len())
                .ok_or_else(|| {
                    TransformError::malformed(format!(
                        "uninitialized type refers to offset {} off an instruction",
                        offset
                    ))
                })?;
            VerificationType::Uninitialized(label)
        }
        other => {
            return Err(TransformError::malformed(format!(
                "unknown verification type tag {}",
                other
            )))
        }
    };
    Ok(t)
}

pub(crate) fn encode_stack_map(frames: &[StackMapFrame], layout: &CodeLayout) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let count = u16::try_from(frames.len())
        .map_err(|_| TransformError::unencodable("too many stack map frames"))?;
    push_u16(&mut out, count);

    let mut previous: Option<u32> = None;
    for frame in frames {
        let offset = frame_offset(frame.at, layout)?;
        let delta = match previous {
            None => offset,
            Some(prev) if offset > prev => offset - prev - 1,
            Some(prev) => {
                return Err(TransformError::unencodable(format!(
                    "stack map frame at offset {} does not follow frame at {}",
                    offset, prev
                )))
            }
        };
        previous = Some(offset);
        // code is at most 65535 bytes, so the delta always fits
        let delta = delta as u16;

        match &frame.body {
            FrameBody::Same if !frame.extended && delta <= 63 => push_u8(&mut out, delta as u8),
            FrameBody::Same => {
                push_u8(&mut out, 251);
                push_u16(&mut out, delta);
            }
            FrameBody::SameLocals1StackItem(t) if !frame.extended && delta <= 63 => {
                push_u8(&mut out, 64 + delta as u8);
                write_type(&mut out, t, layout)?;
            }
            FrameBody::SameLocals1StackItem(t) => {
                push_u8(&mut out, 247);
                push_u16(&mut out, delta);
                write_type(&mut out, t, layout)?;
            }
            FrameBody::Chop(k) => {
                if !(1..=3).contains(k) {
                    return Err(TransformError::unencodable(format!("chop frame of {} locals", k)));
                }
                push_u8(&mut out, 251 - k);
                push_u16(&mut out, delta);
            }
            FrameBody::Append(locals) => {
                if locals.is_empty() || locals.len() > 3 {
                    return Err(TransformError::unencodable(format!(
                        "append frame of {} locals",
                        locals.len()
                    )));
                }
                push_u8(&mut out, 251 + locals.len() as u8);
                push_u16(&mut out, delta);
                for t in locals {
                    write_type(&mut out, t, layout)?;
                }
            }
            FrameBody::Full { locals, stack } => {
                push_u8(&mut out, 255);
                push_u16(&mut out, delta);
                for list in [locals, stack] {
                    let n = u16::try_from(list.len())
                        .map_err(|_| TransformError::unencodable("oversized full frame"))?;
                    push_u16(&mut out, n);
                    for t in list {
                        write_type(&mut out, t, layout)?;
                    }
                }
            }
        }
    }
    Ok(out)
}

fn frame_offset(label: Label, layout: &CodeLayout) -> Result<u32> {
    layout
        .offset_of(label)
        .filter(|_| label.index() < layout.len())
        .ok_or_else(|| {
            TransformError::unencodable(format!(
                "stack map entry refers to dangling label {}",
                label.0
            ))
        })
}

fn write_type(out: &mut Vec<u8>, t: &VerificationType, layout: &CodeLayout) -> Result<()> {
    match t {
        VerificationType::Top => push_u8(out, 0),
        VerificationType::Integer => push_u8(out, 1),
        VerificationType::Float => push_u8(out, 2),
        VerificationType::Double => push_u8(out, 3),
        VerificationType::Long => push_u8(out, 4),
        VerificationType::Null => push_u8(out, 5),
        VerificationType::UninitializedThis => push_u8(out, 6),
        VerificationType::Object(index) => {
            push_u8(out, 7);
            push_u16(out, *index);
        }
        VerificationType::Uninitialized(label) => {
            push_u8(out, 8);
            push_u16(out, frame_offset(*label, layout)? as u16);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::instruction::{decode_instructions, Instruction};
    use crate::classfile::opcodes::*;

    fn layout_of(code: &[u8]) -> CodeLayout {
        decode_instructions(code).unwrap().1
    }

    #[test]
    fn test_decode_all_compact_shapes() {
        // nop x 70, then return: frames at offsets 2, 3 (same_locals_1), 70 (chop 1)
        let mut code = vec![NOP; 70];
        code.push(RETURN);
        let layout = layout_of(&code);
        let pool = ConstantPool::new();
        let data = [0, 3, 2, 64, 1, 250, 0, 66];
        let frames = decode_stack_map(&data, &layout, &pool).unwrap();
        assert_eq!(frames[0].at, Label(2));
        assert_eq!(frames[0].body, FrameBody::Same);
        assert_eq!(
            frames[1].body,
            FrameBody::SameLocals1StackItem(VerificationType::Integer)
        );
        assert_eq!(frames[1].at, Label(3));
        assert_eq!(frames[2].body, FrameBody::Chop(1));
        assert_eq!(frames[2].at, Label(70));

        assert_eq!(encode_stack_map(&frames, &layout).unwrap(), data.to_vec());
    }

    #[test]
    fn test_same_frame_promoted_when_delta_grows() {
        let mut insns = vec![Instruction::simple(NOP); 100];
        insns.push(Instruction::simple(RETURN));
        let layout = CodeLayout::compute(&insns).unwrap();
        let frames = vec![StackMapFrame {
            at: Label(100),
            body: FrameBody::Same,
            extended: false,
        }];
        assert_eq!(
            encode_stack_map(&frames, &layout).unwrap(),
            vec![0, 1, 251, 0, 100]
        );
    }

    #[test]
    fn test_uninitialized_and_object_types() {
        let mut pool = ConstantPool::new();
        let class = pool.add_class("java/lang/Object").unwrap();
        // 0: new #class; 3: dup; 4: return
        let code = [NEW, 0, class as u8, DUP, RETURN];
        let layout = layout_of(&code);
        let frames = vec![StackMapFrame::full(
            Label(1),
            vec![VerificationType::Object(class)],
            vec![VerificationType::Uninitialized(Label(0))],
        )];
        let bytes = encode_stack_map(&frames, &layout).unwrap();
        assert_eq!(
            bytes,
            vec![0, 1, 255, 0, 3, 0, 1, 7, 0, class as u8, 0, 1, 8, 0, 0]
        );
        assert_eq!(decode_stack_map(&bytes, &layout, &pool).unwrap(), frames);
    }

    #[test]
    fn test_decode_rejects_frame_inside_instruction() {
        let code = [BIPUSH, 5, POP, RETURN];
        let layout = layout_of(&code);
        let err = decode_stack_map(&[0, 1, 1], &layout, &ConstantPool::new()).unwrap_err();
        assert!(matches!(err, TransformError::MalformedInput(_)));
    }

    #[test]
    fn test_encode_rejects_unordered_frames() {
        let code = [NOP, NOP, RETURN];
        let layout = layout_of(&code);
        let frames = vec![
            StackMapFrame::full(Label(2), vec![], vec![]),
            StackMapFrame::full(Label(1), vec![], vec![]),
        ];
        assert!(matches!(
            encode_stack_map(&frames, &layout),
            Err(TransformError::Unencodable(_))
        ));
    }

    #[test]
    fn test_labels_mut_includes_uninitialized() {
        let mut frame = StackMapFrame::full(
            Label(4),
            vec![VerificationType::Integer],
            vec![VerificationType::Uninitialized(Label(1))],
        );
        let labels: Vec<Label> = frame.labels_mut().into_iter().map(|l| *l).collect();
        assert_eq!(labels, vec![Label(4), Label(1)]);
    }
}
