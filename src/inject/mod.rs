//! Probe injection engine
//!
//! For every behavior with a body, a prologue stores `System.nanoTime()` in a
//! fresh local, an epilogue is placed before every return instruction, and a
//! catch-all handler (epilogue followed by `athrow`) covers exceptional exits.
//! The whole rewrite of one body happens in a single pass so the normal and
//! exceptional exits are always instrumented together.

mod constructor;
mod frames;

use std::ops::Range;

use crate::classfile::instruction::{Instruction, Label};
use crate::classfile::opcodes;
use crate::classfile::{
    ConstantPool, StackMapFrame, ATTR_INVISIBLE_TYPE_ANNOTATIONS, ATTR_STACK_MAP_TABLE,
    ATTR_VISIBLE_TYPE_ANNOTATIONS, STACK_MAP_MAJOR_VERSION,
};
use crate::error::{Result, TransformError};
use crate::model::{
    BehaviorDescriptor, BehaviorKind, ClassDescriptor, CodeAttribute, CodeBody,
    ExceptionHandler, ExitKind, ExitPoint,
};
use crate::probe::{ProbeTemplate, EPILOGUE_STACK, PROBE_LOCALS};

/// A behavior that received probes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentedBehavior {
    /// Name printed by the probes
    pub name: String,
    pub descriptor: String,
    pub kind: BehaviorKind,
    /// Epilogues inserted: one per return plus the unwind handler
    pub epilogues: usize,
}

/// Result of [`inject`]
#[derive(Debug, Clone)]
pub struct Injection {
    pub class: ClassDescriptor,
    pub instrumented: Vec<InstrumentedBehavior>,
}

/// Class facts every behavior rewrite needs
struct ClassContext<'a> {
    name: &'a str,
    this_class: u16,
    is_root_class: bool,
    stack_maps: bool,
}

/// Inject timing probes into every instrumentable behavior of `class`
///
/// Interfaces come back untouched. Behaviors without a body, the class
/// initializer and bodies that already carry probes are skipped.
pub fn inject(mut class: ClassDescriptor, template: &ProbeTemplate) -> Result<Injection> {
    if class.is_interface() {
        return Ok(Injection {
            class,
            instrumented: Vec::new(),
        });
    }

    let ctx = ClassContext {
        name: &class.name,
        this_class: class.this_class,
        is_root_class: class.super_class == 0,
        stack_maps: class.major_version >= STACK_MAP_MAJOR_VERSION,
    };
    let pool = &mut class.pool;
    let mut instrumented = Vec::new();
    for behavior in class.behaviors.iter_mut() {
        if behavior.kind == BehaviorKind::ClassInitializer || behavior.is_instrumented() {
            continue;
        }
        if !behavior.has_body() {
            continue;
        }
        let epilogues = inject_behavior(&ctx, pool, behavior, template).map_err(|e| {
            let reason = format!("{}{}: {}", behavior.name, behavior.descriptor, e.reason());
            match e {
                TransformError::MalformedInput(_) => TransformError::malformed(reason),
                TransformError::UnsupportedConstruct(_) => TransformError::unsupported(reason),
                TransformError::Unencodable(_) => TransformError::unencodable(reason),
            }
        })?;
        tracing::trace!(
            class = ctx.name,
            behavior = %behavior.name,
            epilogues,
            "injected probes"
        );
        instrumented.push(InstrumentedBehavior {
            name: behavior.display_name(ctx.name),
            descriptor: behavior.descriptor.clone(),
            kind: behavior.kind,
            epilogues,
        });
    }
    Ok(Injection {
        class,
        instrumented,
    })
}

fn check_supported(body: &CodeBody) -> Result<()> {
    if let Some(insn) = body
        .instructions
        .iter()
        .find(|insn| opcodes::is_subroutine(insn.opcode))
    {
        return Err(TransformError::unsupported(format!(
            "{} subroutines",
            insn.mnemonic()
        )));
    }
    for attr in &body.attributes {
        if let CodeAttribute::Raw(raw) = attr {
            if raw.name == ATTR_VISIBLE_TYPE_ANNOTATIONS
                || raw.name == ATTR_INVISIBLE_TYPE_ANNOTATIONS
            {
                return Err(TransformError::unsupported(format!(
                    "{} on code",
                    raw.name
                )));
            }
        }
    }
    Ok(())
}

/// Rewrite one body; returns the number of epilogues inserted
fn inject_behavior(
    ctx: &ClassContext<'_>,
    pool: &mut ConstantPool,
    behavior: &mut BehaviorDescriptor,
    template: &ProbeTemplate,
) -> Result<usize> {
    let display = behavior.display_name(ctx.name);
    let initial = frames::initial_locals(pool, ctx.this_class, ctx.is_root_class, behavior)?;
    let kind = behavior.kind;
    let old_exits = std::mem::take(&mut behavior.exits);

    let body = behavior
        .body_mut()
        .ok_or_else(|| TransformError::unsupported("behavior has no body"))?;
    check_supported(body)?;

    let slot = body.max_locals;
    if slot as u32 + PROBE_LOCALS as u32 > u16::MAX as u32 {
        return Err(TransformError::unsupported("no local slots left for the probe"));
    }

    let expanded = match body.stack_map() {
        Some(frames) => frames::expand(frames, &initial)?,
        None => Vec::new(),
    };
    let coverage_start = if kind == BehaviorKind::Constructor && !ctx.is_root_class {
        constructor::delegation_end(body, pool, &expanded)?
    } else {
        0
    };

    let probe = template.resolve(pool, &display)?;
    let epilogue = probe.epilogue(slot);
    let old = std::mem::take(&mut body.instructions);
    let n = old.len();

    // entry[i]: where control transferred to old instruction i now lands
    // (the epilogue start for returns); at[i]: the instruction itself
    let mut instructions = probe.prologue(slot);
    let mut entry = Vec::with_capacity(n + 1);
    let mut at = Vec::with_capacity(n + 1);
    for insn in old {
        entry.push(instructions.len() as u32);
        if insn.is_return() {
            instructions.extend(epilogue.iter().cloned());
        }
        at.push(instructions.len() as u32);
        instructions.push(insn);
    }
    let handler_start = instructions.len() as u32;
    entry.push(handler_start);
    at.push(handler_start);
    instructions.extend(epilogue.iter().cloned());
    instructions.push(Instruction::simple(opcodes::ATHROW));
    let athrow = Label(instructions.len() as u32 - 1);

    let remap = |label: Label| -> Result<Label> {
        entry
            .get(label.index())
            .map(|&i| Label(i))
            .ok_or_else(|| {
                TransformError::unencodable(format!("label {} is past the end of code", label.0))
            })
    };

    for &i in &at[..n] {
        for label in instructions[i as usize].labels_mut() {
            *label = remap(*label)?;
        }
    }
    body.instructions = instructions;

    // original handlers keep precedence and never cover inserted epilogues
    let mut table = Vec::with_capacity(body.exception_table.len() + 2);
    for handler in &body.exception_table {
        let handler_label = remap(handler.handler)?;
        if handler.start >= handler.end || handler.end.index() > n {
            return Err(TransformError::unencodable(format!(
                "exception range {}..{} does not fit the code",
                handler.start.0, handler.end.0
            )));
        }
        for (start, end) in covered_runs(&at, handler.start.index()..handler.end.index()) {
            table.push(ExceptionHandler {
                start,
                end,
                handler: handler_label,
                catch_type: handler.catch_type,
            });
        }
    }
    for (start, end) in covered_runs(&at, coverage_start..n) {
        table.push(ExceptionHandler {
            start,
            end,
            handler: Label(handler_start),
            catch_type: 0,
        });
    }
    body.exception_table = table;

    for attr in body.attributes.iter_mut() {
        match attr {
            CodeAttribute::LineNumbers { entries, .. } => {
                for line in entries.iter_mut() {
                    line.start = remap(line.start)?;
                }
            }
            CodeAttribute::LocalVariables { entries, .. } => {
                for var in entries.iter_mut() {
                    var.start = remap(var.start)?;
                    var.end = remap(var.end)?;
                }
            }
            CodeAttribute::StackMap { .. } | CodeAttribute::Raw(_) => {}
        }
    }

    if ctx.stack_maps || body.stack_map().is_some() {
        let throwable = pool.add_class("java/lang/Throwable")?;
        let mut rewritten = Vec::with_capacity(expanded.len() + 1);
        for frame in expanded {
            let mut full = StackMapFrame::full(
                frame.at,
                frames::with_probe_slot(&frame.locals, slot)?,
                frame.stack,
            );
            for label in full.labels_mut() {
                *label = remap(*label)?;
            }
            rewritten.push(full);
        }
        rewritten.push(frames::handler_frame(Label(handler_start), slot, throwable));

        match body.stack_map_mut() {
            Some(existing) => *existing = rewritten,
            None => {
                let name_index = pool.add_utf8(ATTR_STACK_MAP_TABLE)?;
                body.attributes.push(CodeAttribute::StackMap {
                    name_index,
                    frames: rewritten,
                });
            }
        }
    }

    body.max_stack = body
        .max_stack
        .saturating_add(EPILOGUE_STACK)
        .max(EPILOGUE_STACK + 1);
    body.max_locals = slot + PROBE_LOCALS;
    body.probe = Some(slot);

    let mut exits = Vec::with_capacity(old_exits.len());
    for exit in old_exits {
        let moved = match exit.kind {
            ExitKind::Return => at
                .get(exit.at.index())
                .map(|&i| Label(i))
                .ok_or_else(|| {
                    TransformError::unencodable(format!(
                        "return exit at label {} is past the end of code",
                        exit.at.0
                    ))
                })?,
            ExitKind::Unwind => athrow,
        };
        exits.push(ExitPoint {
            kind: exit.kind,
            at: moved,
        });
    }
    let epilogues = exits.len();
    behavior.exits = exits;
    Ok(epilogues)
}

/// Split old instructions `range` into maximal runs of consecutive new
/// positions; inserted epilogues break the runs
fn covered_runs(at: &[u32], range: Range<usize>) -> Vec<(Label, Label)> {
    let mut runs: Vec<(Label, Label)> = Vec::new();
    for &pos in &at[range] {
        match runs.last_mut() {
            Some((_, end)) if end.0 == pos => end.0 = pos + 1,
            _ => runs.push((Label(pos), Label(pos + 1))),
        }
    }
    runs
}
