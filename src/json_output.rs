//! Text and JSON renderings of class structure and run results
//!
//! `--inspect` prints the structural model of each class; a normal run prints
//! one entry per class and a summary.

use std::fmt::Write as _;

use serde::Serialize;

use crate::classfile::instruction::CodeLayout;
use crate::coordinator::TransformResult;
use crate::diagnostics::DiagnosticEvent;
use crate::error::Result;
use crate::model::{BehaviorDescriptor, ClassDescriptor, ExitKind};
use crate::profiling::StatsSnapshot;

/// One exit point of a behavior body
#[derive(Debug, Clone, Serialize)]
pub struct JsonExit {
    /// "return" or "unwind"
    pub kind: &'static str,
    /// Instruction index (the code length for the end label)
    pub at: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonCode {
    pub max_stack: u16,
    pub max_locals: u16,
    pub instructions: usize,
    /// Bytes of bytecode
    pub code_length: u32,
    pub exception_handlers: usize,
    pub stack_map_frames: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probe_slot: Option<u16>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonBehavior {
    pub name: String,
    pub descriptor: String,
    pub kind: &'static str,
    pub access_flags: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<JsonCode>,
    pub exits: Vec<JsonExit>,
}

/// Structural view of a decoded class
#[derive(Debug, Clone, Serialize)]
pub struct JsonClass {
    pub name: String,
    /// `major.minor`
    pub version: String,
    pub access_flags: u16,
    pub interface: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub super_class: Option<String>,
    pub interfaces: Vec<String>,
    pub constant_pool_count: usize,
    pub fields: usize,
    pub behaviors: Vec<JsonBehavior>,
}

impl JsonClass {
    pub fn from_class(class: &ClassDescriptor) -> Result<Self> {
        let super_class = match class.super_class {
            0 => None,
            index => Some(class.pool.class_name(index)?),
        };
        let interfaces = class
            .interfaces
            .iter()
            .map(|&i| class.pool.class_name(i))
            .collect::<Result<Vec<_>>>()?;
        let behaviors = class
            .behaviors
            .iter()
            .map(behavior_view)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            name: class.name.clone(),
            version: format!("{}.{}", class.major_version, class.minor_version),
            access_flags: class.access_flags,
            interface: class.is_interface(),
            super_class,
            interfaces,
            constant_pool_count: class.pool.count(),
            fields: class.fields.len(),
            behaviors,
        })
    }

    /// Human-readable rendering
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "class {} (version {})", self.name, self.version);
        if let Some(sup) = &self.super_class {
            let _ = writeln!(out, "  extends {}", sup);
        }
        for iface in &self.interfaces {
            let _ = writeln!(out, "  implements {}", iface);
        }
        let _ = writeln!(
            out,
            "  constant pool: {} slots, fields: {}",
            self.constant_pool_count, self.fields
        );
        for behavior in &self.behaviors {
            let _ = write!(
                out,
                "  {} {}{}",
                behavior.kind, behavior.name, behavior.descriptor
            );
            match &behavior.code {
                Some(code) => {
                    let _ = writeln!(
                        out,
                        " [{} insns, {} bytes, stack {}, locals {}, {} handlers, {} exits]",
                        code.instructions,
                        code.code_length,
                        code.max_stack,
                        code.max_locals,
                        code.exception_handlers,
                        behavior.exits.len()
                    );
                }
                None => {
                    let _ = writeln!(out, " [no body]");
                }
            }
        }
        out
    }
}

fn behavior_view(behavior: &BehaviorDescriptor) -> Result<JsonBehavior> {
    let code = match behavior.body() {
        Some(body) => Some(JsonCode {
            max_stack: body.max_stack,
            max_locals: body.max_locals,
            instructions: body.instructions.len(),
            code_length: CodeLayout::compute(&body.instructions)?.code_length(),
            exception_handlers: body.exception_table.len(),
            stack_map_frames: body.stack_map().map_or(0, <[_]>::len),
            probe_slot: body.probe,
        }),
        None => None,
    };
    Ok(JsonBehavior {
        name: behavior.name.clone(),
        descriptor: behavior.descriptor.clone(),
        kind: behavior.kind.as_str(),
        access_flags: behavior.access_flags,
        code,
        exits: behavior
            .exits
            .iter()
            .map(|exit| JsonExit {
                kind: match exit.kind {
                    ExitKind::Return => "return",
                    ExitKind::Unwind => "unwind",
                },
                at: exit.at.0,
            })
            .collect(),
    })
}

/// Behavior reported as instrumented
#[derive(Debug, Clone, Serialize)]
pub struct JsonInstrumented {
    pub name: String,
    pub descriptor: String,
    pub exits: usize,
}

/// Outcome for one class of a run
#[derive(Debug, Clone, Serialize)]
pub struct JsonClassResult {
    pub class: String,
    /// "transformed", "unchanged" or "failed"
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub behaviors: Vec<JsonInstrumented>,
}

impl JsonClassResult {
    /// Combine a result with the diagnostics emitted while producing it
    pub fn new(class: &str, result: &TransformResult, events: &[DiagnosticEvent]) -> Self {
        let (outcome, reason) = match result {
            TransformResult::Transformed(_) => ("transformed", None),
            TransformResult::Unchanged(skip) => ("unchanged", Some(skip.as_str().to_string())),
            TransformResult::Failed(err) => ("failed", Some(err.to_string())),
        };
        let behaviors = events
            .iter()
            .filter_map(|event| match event {
                DiagnosticEvent::BehaviorInstrumented {
                    class: c,
                    behavior,
                    descriptor,
                    exits,
                    ..
                } if c == class => Some(JsonInstrumented {
                    name: behavior.clone(),
                    descriptor: descriptor.clone(),
                    exits: *exits,
                }),
                _ => None,
            })
            .collect();
        Self {
            class: class.to_string(),
            outcome,
            reason,
            behaviors,
        }
    }

    pub fn to_text(&self) -> String {
        let mut out = format!("{}: {}", self.class, self.outcome);
        if let Some(reason) = &self.reason {
            let _ = write!(out, " ({})", reason);
        }
        for behavior in &self.behaviors {
            let _ = write!(
                out,
                "\n  {}{} ({} exits)",
                behavior.name, behavior.descriptor, behavior.exits
            );
        }
        out
    }
}

/// Complete JSON document for a run
#[derive(Debug, Clone, Serialize)]
pub struct JsonOutput {
    pub version: String,
    pub format: String,
    pub classes: Vec<JsonClassResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<StatsSnapshot>,
}

impl Default for JsonOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonOutput {
    pub fn new() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            format: "perfmon-json-v1".to_string(),
            classes: Vec::new(),
            summary: None,
        }
    }

    pub fn add_class(&mut self, result: JsonClassResult) {
        self.classes.push(result);
    }

    pub fn set_summary(&mut self, summary: StatsSnapshot) {
        self.summary = Some(summary);
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
