//! Low-level pieces of the class-file format
//!
//! Everything here is independent of instrumentation: the constant pool,
//! descriptors, the instruction codec and stack-map frames. The
//! [`crate::decoder`] and [`crate::encoder`] modules stitch them together.

pub(crate) mod bytes;
pub mod constant_pool;
pub mod descriptor;
pub mod instruction;
pub mod opcodes;
pub mod stackmap;

pub use constant_pool::{Constant, ConstantPool, MemberRef};
pub use descriptor::{FieldType, MethodDescriptor};
pub use instruction::{CodeLayout, Instruction, Label, Operand, StackEffect};
pub use stackmap::{FrameBody, StackMapFrame, VerificationType};

pub const MAGIC: u32 = 0xCAFE_BABE;

/// Class-file major versions this crate reads and writes (JDK 1.1 through 25)
pub const SUPPORTED_MAJOR_VERSIONS: std::ops::RangeInclusive<u16> = 45..=69;

/// First major version whose verifier requires `StackMapTable` frames
pub const STACK_MAP_MAJOR_VERSION: u16 = 50;

pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_NATIVE: u16 = 0x0100;
pub const ACC_INTERFACE: u16 = 0x0200;
pub const ACC_ABSTRACT: u16 = 0x0400;

pub const ATTR_CODE: &str = "Code";
pub const ATTR_STACK_MAP_TABLE: &str = "StackMapTable";
pub const ATTR_LINE_NUMBER_TABLE: &str = "LineNumberTable";
pub const ATTR_LOCAL_VARIABLE_TABLE: &str = "LocalVariableTable";
pub const ATTR_LOCAL_VARIABLE_TYPE_TABLE: &str = "LocalVariableTypeTable";
pub const ATTR_VISIBLE_TYPE_ANNOTATIONS: &str = "RuntimeVisibleTypeAnnotations";
pub const ATTR_INVISIBLE_TYPE_ANNOTATIONS: &str = "RuntimeInvisibleTypeAnnotations";
