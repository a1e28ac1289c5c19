//! Stack-map frame expansion and probe-slot rewriting

use crate::classfile::descriptor::{FieldType, MethodDescriptor};
use crate::classfile::instruction::Label;
use crate::classfile::stackmap::{FrameBody, StackMapFrame, VerificationType};
use crate::classfile::ConstantPool;
use crate::error::{Result, TransformError};
use crate::model::{BehaviorDescriptor, BehaviorKind};

/// A frame with its locals and stack spelled out
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ExpandedFrame {
    pub at: Label,
    pub locals: Vec<VerificationType>,
    pub stack: Vec<VerificationType>,
}

impl ExpandedFrame {
    pub fn mentions_uninitialized_this(&self) -> bool {
        self.locals
            .iter()
            .chain(self.stack.iter())
            .any(|t| *t == VerificationType::UninitializedThis)
    }
}

/// Locals of the implicit frame at method entry
pub(crate) fn initial_locals(
    pool: &mut ConstantPool,
    this_class: u16,
    is_root_class: bool,
    behavior: &BehaviorDescriptor,
) -> Result<Vec<VerificationType>> {
    let descriptor = MethodDescriptor::parse(&behavior.descriptor)?;
    let mut locals = Vec::with_capacity(descriptor.params.len() + 1);
    if !behavior.is_static() {
        if behavior.kind == BehaviorKind::Constructor && !is_root_class {
            locals.push(VerificationType::UninitializedThis);
        } else {
            locals.push(VerificationType::Object(this_class));
        }
    }
    for param in &descriptor.params {
        let t = match param {
            FieldType::Byte
            | FieldType::Char
            | FieldType::Short
            | FieldType::Boolean
            | FieldType::Int => VerificationType::Integer,
            FieldType::Float => VerificationType::Float,
            FieldType::Long => VerificationType::Long,
            FieldType::Double => VerificationType::Double,
            FieldType::Object(name) | FieldType::Array(name) => {
                VerificationType::Object(pool.add_class(name)?)
            }
        };
        locals.push(t);
    }
    Ok(locals)
}

/// Resolve every compressed frame against its predecessor
pub(crate) fn expand(
    frames: &[StackMapFrame],
    initial: &[VerificationType],
) -> Result<Vec<ExpandedFrame>> {
    let mut locals = initial.to_vec();
    let mut expanded = Vec::with_capacity(frames.len());
    for frame in frames {
        let stack = match &frame.body {
            FrameBody::Same => Vec::new(),
            FrameBody::SameLocals1StackItem(t) => vec![t.clone()],
            FrameBody::Chop(k) => {
                let k = *k as usize;
                if k > locals.len() {
                    return Err(TransformError::malformed(format!(
                        "chop frame at label {} removes {} of {} locals",
                        frame.at.0,
                        k,
                        locals.len()
                    )));
                }
                locals.truncate(locals.len() - k);
                Vec::new()
            }
            FrameBody::Append(extra) => {
                locals.extend(extra.iter().cloned());
                Vec::new()
            }
            FrameBody::Full {
                locals: full,
                stack,
            } => {
                locals = full.clone();
                stack.clone()
            }
        };
        expanded.push(ExpandedFrame {
            at: frame.at,
            locals: locals.clone(),
            stack,
        });
    }
    Ok(expanded)
}

/// Pad `locals` with `Top` up to `slot` and place the timestamp there
pub(crate) fn with_probe_slot(
    locals: &[VerificationType],
    slot: u16,
) -> Result<Vec<VerificationType>> {
    let used: u32 = locals.iter().map(|t| t.slots() as u32).sum();
    if used > slot as u32 {
        return Err(TransformError::malformed(format!(
            "frame covers {} local slots but max_locals is {}",
            used, slot
        )));
    }
    let mut out = locals.to_vec();
    out.extend(std::iter::repeat(VerificationType::Top).take((slot as u32 - used) as usize));
    out.push(VerificationType::Long);
    Ok(out)
}

/// Frame at the catch-all handler: only the timestamp is live
pub(crate) fn handler_frame(at: Label, slot: u16, throwable: u16) -> StackMapFrame {
    let mut locals = vec![VerificationType::Top; slot as usize];
    locals.push(VerificationType::Long);
    StackMapFrame::full(at, locals, vec![VerificationType::Object(throwable)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BehaviorKind;

    fn behavior(name: &str, descriptor: &str, access_flags: u16) -> BehaviorDescriptor {
        BehaviorDescriptor {
            access_flags,
            name_index: 0,
            descriptor_index: 0,
            name: name.into(),
            descriptor: descriptor.into(),
            kind: BehaviorKind::from_name(name),
            attributes: vec![],
            exits: vec![],
        }
    }

    #[test]
    fn test_initial_locals_for_instance_method() {
        let mut pool = ConstantPool::new();
        let this = pool.add_class("demo/Foo").unwrap();
        let b = behavior("m", "(IJLjava/lang/String;[B)V", 0);
        let locals = initial_locals(&mut pool, this, false, &b).unwrap();
        let string = pool.add_class("java/lang/String").unwrap();
        let bytes = pool.add_class("[B").unwrap();
        assert_eq!(
            locals,
            vec![
                VerificationType::Object(this),
                VerificationType::Integer,
                VerificationType::Long,
                VerificationType::Object(string),
                VerificationType::Object(bytes),
            ]
        );
    }

    #[test]
    fn test_initial_locals_for_constructor_and_static() {
        let mut pool = ConstantPool::new();
        let this = pool.add_class("demo/Foo").unwrap();
        let ctor = behavior("<init>", "()V", 0);
        assert_eq!(
            initial_locals(&mut pool, this, false, &ctor).unwrap(),
            vec![VerificationType::UninitializedThis]
        );
        assert_eq!(
            initial_locals(&mut pool, this, true, &ctor).unwrap(),
            vec![VerificationType::Object(this)]
        );
        let stat = behavior("main", "(D)V", crate::classfile::ACC_STATIC);
        assert_eq!(
            initial_locals(&mut pool, this, false, &stat).unwrap(),
            vec![VerificationType::Double]
        );
    }

    #[test]
    fn test_expand_tracks_locals_through_compressed_frames() {
        let initial = vec![VerificationType::Object(1)];
        let frames = vec![
            StackMapFrame {
                at: Label(3),
                body: FrameBody::Append(vec![VerificationType::Integer, VerificationType::Long]),
                extended: false,
            },
            StackMapFrame {
                at: Label(5),
                body: FrameBody::SameLocals1StackItem(VerificationType::Null),
                extended: false,
            },
            StackMapFrame {
                at: Label(8),
                body: FrameBody::Chop(2),
                extended: false,
            },
        ];
        let expanded = expand(&frames, &initial).unwrap();
        assert_eq!(expanded[0].locals.len(), 3);
        assert_eq!(expanded[1].locals, expanded[0].locals);
        assert_eq!(expanded[1].stack, vec![VerificationType::Null]);
        assert_eq!(expanded[2].locals, initial);
        assert!(expanded[2].stack.is_empty());
    }

    #[test]
    fn test_expand_rejects_overlong_chop() {
        let frames = vec![StackMapFrame {
            at: Label(1),
            body: FrameBody::Chop(2),
            extended: false,
        }];
        assert!(expand(&frames, &[VerificationType::Integer]).is_err());
    }

    #[test]
    fn test_with_probe_slot_pads_and_counts_wide_entries() {
        // Integer + Double use slots 0..3, probe at 5
        let locals = vec![VerificationType::Integer, VerificationType::Double];
        let out = with_probe_slot(&locals, 5).unwrap();
        assert_eq!(
            out,
            vec![
                VerificationType::Integer,
                VerificationType::Double,
                VerificationType::Top,
                VerificationType::Top,
                VerificationType::Long,
            ]
        );
        assert!(with_probe_slot(&locals, 2).is_err());
    }

    #[test]
    fn test_handler_frame_shape() {
        let frame = handler_frame(Label(9), 2, 7);
        assert_eq!(
            frame.body,
            FrameBody::Full {
                locals: vec![
                    VerificationType::Top,
                    VerificationType::Top,
                    VerificationType::Long
                ],
                stack: vec![VerificationType::Object(7)],
            }
        );
    }
}
