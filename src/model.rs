//! Structural class model
//!
//! A [`ClassDescriptor`] is produced by [`crate::decoder::decode`], mutated by
//! [`crate::inject::inject`] and consumed by [`crate::encoder::encode`]. It is
//! owned by a single transform invocation and never shared.

use crate::classfile::instruction::{Instruction, Label};
use crate::classfile::stackmap::StackMapFrame;
use crate::classfile::{ConstantPool, ACC_ABSTRACT, ACC_INTERFACE, ACC_NATIVE, ACC_STATIC};

/// Attribute carried through verbatim
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAttribute {
    pub name_index: u16,
    pub name: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    pub access_flags: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<RawAttribute>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BehaviorKind {
    Constructor,
    Method,
    /// `<clinit>`; carried through but never instrumented
    ClassInitializer,
}

impl BehaviorKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            "<init>" => BehaviorKind::Constructor,
            "<clinit>" => BehaviorKind::ClassInitializer,
            _ => BehaviorKind::Method,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BehaviorKind::Constructor => "constructor",
            BehaviorKind::Method => "method",
            BehaviorKind::ClassInitializer => "class initializer",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitKind {
    /// A return-family instruction
    Return,
    /// Exception propagation out of the body
    Unwind,
}

/// One way control leaves a behavior's body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExitPoint {
    pub kind: ExitKind,
    pub at: Label,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionHandler {
    pub start: Label,
    pub end: Label,
    pub handler: Label,
    /// Class constant of the caught type, 0 for catch-all
    pub catch_type: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineNumber {
    pub start: Label,
    pub line: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariable {
    pub start: Label,
    pub end: Label,
    pub name_index: u16,
    /// Descriptor, or signature in a `LocalVariableTypeTable`
    pub descriptor_index: u16,
    pub index: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeAttribute {
    LineNumbers {
        name_index: u16,
        entries: Vec<LineNumber>,
    },
    LocalVariables {
        name_index: u16,
        /// `LocalVariableTypeTable` rather than `LocalVariableTable`
        types: bool,
        entries: Vec<LocalVariable>,
    },
    StackMap {
        name_index: u16,
        frames: Vec<StackMapFrame>,
    },
    Raw(RawAttribute),
}

/// Decoded `Code` attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBody {
    pub max_stack: u16,
    pub max_locals: u16,
    pub instructions: Vec<Instruction>,
    pub exception_table: Vec<ExceptionHandler>,
    pub attributes: Vec<CodeAttribute>,
    /// Local slot holding the start timestamp once probes are injected
    pub probe: Option<u16>,
}

impl CodeBody {
    /// Label one past the last instruction
    pub fn end(&self) -> Label {
        Label(self.instructions.len() as u32)
    }

    pub fn instruction(&self, label: Label) -> Option<&Instruction> {
        self.instructions.get(label.index())
    }

    pub fn stack_map(&self) -> Option<&[StackMapFrame]> {
        self.attributes.iter().find_map(|a| match a {
            CodeAttribute::StackMap { frames, .. } => Some(frames.as_slice()),
            _ => None,
        })
    }

    pub fn stack_map_mut(&mut self) -> Option<&mut Vec<StackMapFrame>> {
        self.attributes.iter_mut().find_map(|a| match a {
            CodeAttribute::StackMap { frames, .. } => Some(frames),
            _ => None,
        })
    }

    /// Exit points of the body as decoded: one per return instruction and a
    /// single unwind exit at the end label
    pub fn enumerate_exits(&self) -> Vec<ExitPoint> {
        let unwind = ExitPoint {
            kind: ExitKind::Unwind,
            at: self.end(),
        };
        self.instructions
            .iter()
            .enumerate()
            .filter(|(_, insn)| insn.is_return())
            .map(|(i, _)| ExitPoint {
                kind: ExitKind::Return,
                at: Label(i as u32),
            })
            .chain(std::iter::once(unwind))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodAttribute {
    Code { name_index: u16, body: Box<CodeBody> },
    Raw(RawAttribute),
}

/// A constructor, method or class initializer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BehaviorDescriptor {
    pub access_flags: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub name: String,
    pub descriptor: String,
    pub kind: BehaviorKind,
    pub attributes: Vec<MethodAttribute>,
    /// Empty when the behavior has no body
    pub exits: Vec<ExitPoint>,
}

impl BehaviorDescriptor {
    pub fn has_body(&self) -> bool {
        self.body().is_some()
    }

    pub fn is_static(&self) -> bool {
        self.access_flags & ACC_STATIC != 0
    }

    pub fn is_abstract_or_native(&self) -> bool {
        self.access_flags & (ACC_ABSTRACT | ACC_NATIVE) != 0
    }

    pub fn body(&self) -> Option<&CodeBody> {
        self.attributes.iter().find_map(|a| match a {
            MethodAttribute::Code { body, .. } => Some(body.as_ref()),
            MethodAttribute::Raw(_) => None,
        })
    }

    pub fn body_mut(&mut self) -> Option<&mut CodeBody> {
        self.attributes.iter_mut().find_map(|a| match a {
            MethodAttribute::Code { body, .. } => Some(body.as_mut()),
            MethodAttribute::Raw(_) => None,
        })
    }

    pub fn is_instrumented(&self) -> bool {
        self.body().is_some_and(|b| b.probe.is_some())
    }

    /// Name printed by the probes: constructors report the simple class name
    pub fn display_name(&self, class_name: &str) -> String {
        match self.kind {
            BehaviorKind::Constructor => class_name
                .rsplit(['/', '$'])
                .next()
                .unwrap_or(class_name)
                .to_string(),
            _ => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDescriptor {
    pub minor_version: u16,
    pub major_version: u16,
    pub pool: ConstantPool,
    pub access_flags: u16,
    pub this_class: u16,
    /// 0 only for `java/lang/Object`
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    pub fields: Vec<FieldInfo>,
    pub behaviors: Vec<BehaviorDescriptor>,
    pub attributes: Vec<RawAttribute>,
    /// Internal name, e.g. `com/example/Foo`
    pub name: String,
}

impl ClassDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Dotted binary name, e.g. `com.example.Foo`
    pub fn qualified_name(&self) -> String {
        self.name.replace('/', ".")
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags & ACC_INTERFACE != 0
    }

    /// Behaviors eligible for probes: those with a body, excluding the
    /// class initializer
    pub fn instrumentable(&self) -> impl Iterator<Item = &BehaviorDescriptor> {
        self.behaviors
            .iter()
            .filter(|b| b.has_body() && b.kind != BehaviorKind::ClassInitializer)
    }
}
