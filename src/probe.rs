//! Timing probe templates
//!
//! A [`ProbeTemplate`] describes the prologue and epilogue fragments. It is
//! stateless and shared read-only by every transform; resolving it against a
//! class's constant pool yields a [`ResolvedProbe`] that emits instructions.

use serde::{Deserialize, Serialize};

use crate::classfile::instruction::Instruction;
use crate::classfile::opcodes::*;
use crate::classfile::ConstantPool;
use crate::error::Result;

/// Extra operand-stack slots the epilogue needs on top of whatever is live
pub const EPILOGUE_STACK: u16 = 6;

/// Local-variable slots taken by the start timestamp
pub const PROBE_LOCALS: u16 = 2;

/// Stream the epilogue prints to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStream {
    /// `System.out`
    #[default]
    Out,
    /// `System.err`
    Err,
}

impl ProbeStream {
    fn field_name(self) -> &'static str {
        match self {
            ProbeStream::Out => "out",
            ProbeStream::Err => "err",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTemplate {
    pub stream: ProbeStream,
    /// Printed before the behavior name
    pub prefix: &'static str,
    /// Printed between the behavior name and the elapsed nanoseconds
    pub suffix: &'static str,
}

static STANDARD: ProbeTemplate = ProbeTemplate::new(ProbeStream::Out);
static STANDARD_ERR: ProbeTemplate = ProbeTemplate::new(ProbeStream::Err);

impl ProbeTemplate {
    pub const fn new(stream: ProbeStream) -> Self {
        Self {
            stream,
            prefix: "leave ",
            suffix: " and time:",
        }
    }

    /// Shared template printing `leave <name> and time:<nanos>`
    pub fn standard() -> &'static ProbeTemplate {
        &STANDARD
    }

    pub fn for_stream(stream: ProbeStream) -> &'static ProbeTemplate {
        match stream {
            ProbeStream::Out => &STANDARD,
            ProbeStream::Err => &STANDARD_ERR,
        }
    }

    pub fn message(&self, behavior: &str) -> String {
        format!("{}{}{}", self.prefix, behavior, self.suffix)
    }

    /// Add the constants the probe for `behavior` needs to `pool`
    pub fn resolve(&self, pool: &mut ConstantPool, behavior: &str) -> Result<ResolvedProbe> {
        Ok(ResolvedProbe {
            nano_time: pool.add_methodref("java/lang/System", "nanoTime", "()J")?,
            stream: pool.add_fieldref(
                "java/lang/System",
                self.stream.field_name(),
                "Ljava/io/PrintStream;",
            )?,
            builder: pool.add_class("java/lang/StringBuilder")?,
            builder_init: pool.add_methodref(
                "java/lang/StringBuilder",
                "<init>",
                "(Ljava/lang/String;)V",
            )?,
            message: pool.add_string(&self.message(behavior))?,
            append_long: pool.add_methodref(
                "java/lang/StringBuilder",
                "append",
                "(J)Ljava/lang/StringBuilder;",
            )?,
            to_string: pool.add_methodref(
                "java/lang/StringBuilder",
                "toString",
                "()Ljava/lang/String;",
            )?,
            println: pool.add_methodref("java/io/PrintStream", "println", "(Ljava/lang/String;)V")?,
        })
    }
}

/// Constant pool indices for one behavior's probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedProbe {
    pub nano_time: u16,
    pub stream: u16,
    pub builder: u16,
    pub builder_init: u16,
    pub message: u16,
    pub append_long: u16,
    pub to_string: u16,
    pub println: u16,
}

impl ResolvedProbe {
    /// `start = System.nanoTime()` into local `slot`
    pub fn prologue(&self, slot: u16) -> Vec<Instruction> {
        vec![
            Instruction::constant(INVOKESTATIC, self.nano_time),
            Instruction::local(LSTORE, slot),
        ]
    }

    /// Print the message followed by `System.nanoTime() - start`
    pub fn epilogue(&self, slot: u16) -> Vec<Instruction> {
        let ldc = if self.message > u8::MAX as u16 { LDC_W } else { LDC };
        vec![
            Instruction::constant(GETSTATIC, self.stream),
            Instruction::constant(NEW, self.builder),
            Instruction::simple(DUP),
            Instruction::constant(ldc, self.message),
            Instruction::constant(INVOKESPECIAL, self.builder_init),
            Instruction::constant(INVOKESTATIC, self.nano_time),
            Instruction::local(LLOAD, slot),
            Instruction::simple(LSUB),
            Instruction::constant(INVOKEVIRTUAL, self.append_long),
            Instruction::constant(INVOKEVIRTUAL, self.to_string),
            Instruction::constant(INVOKEVIRTUAL, self.println),
        ]
    }
}
