//! Diagnostic events emitted by the transform coordinator
//!
//! Sinks are shared by every class-loading thread, so implementations must
//! accept concurrent `emit` calls without interleaving records.

use std::fmt;

use crossbeam::queue::SegQueue;
use serde::Serialize;

use crate::model::BehaviorKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DiagnosticEvent {
    /// A class passed the filter and is about to be transformed
    ClassProcessed { class: String },
    /// Probes were injected into one behavior of a class that was transformed
    BehaviorInstrumented {
        class: String,
        behavior: String,
        descriptor: String,
        constructor: bool,
        exits: usize,
    },
    /// The class was left unchanged because of an error
    TransformFailed {
        class: String,
        kind: String,
        reason: String,
    },
}

impl DiagnosticEvent {
    pub fn behavior_instrumented(
        class: &str,
        behavior: &str,
        descriptor: &str,
        kind: BehaviorKind,
        exits: usize,
    ) -> Self {
        DiagnosticEvent::BehaviorInstrumented {
            class: class.to_string(),
            behavior: behavior.to_string(),
            descriptor: descriptor.to_string(),
            constructor: kind == BehaviorKind::Constructor,
            exits,
        }
    }

    pub fn class(&self) -> &str {
        match self {
            DiagnosticEvent::ClassProcessed { class }
            | DiagnosticEvent::BehaviorInstrumented { class, .. }
            | DiagnosticEvent::TransformFailed { class, .. } => class,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, DiagnosticEvent::TransformFailed { .. })
    }
}

impl fmt::Display for DiagnosticEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticEvent::ClassProcessed { class } => write!(f, "Transforming {}", class),
            DiagnosticEvent::BehaviorInstrumented {
                class,
                behavior,
                descriptor,
                exits,
                ..
            } => write!(
                f,
                "Instrumented {}.{}{} ({} exits)",
                class, behavior, descriptor, exits
            ),
            DiagnosticEvent::TransformFailed { class, reason, .. } => {
                write!(f, "Could not instrument {}: {}", class, reason)
            }
        }
    }
}

/// Destination for diagnostic events
pub trait DiagnosticSink: Send + Sync {
    fn emit(&self, event: DiagnosticEvent);
}

/// Forwards each event to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn emit(&self, event: DiagnosticEvent) {
        match &event {
            DiagnosticEvent::ClassProcessed { class } => {
                tracing::info!(class = %class, "transforming class");
            }
            DiagnosticEvent::BehaviorInstrumented {
                class,
                behavior,
                descriptor,
                exits,
                ..
            } => {
                tracing::debug!(
                    class = %class,
                    behavior = %behavior,
                    descriptor = %descriptor,
                    exits,
                    "instrumented behavior"
                );
            }
            DiagnosticEvent::TransformFailed {
                class,
                kind,
                reason,
            } => {
                tracing::warn!(class = %class, kind = %kind, reason = %reason, "could not instrument class");
            }
        }
    }
}

/// Collects events in a lock-free queue
#[derive(Debug, Default)]
pub struct MemorySink {
    events: SegQueue<DiagnosticEvent>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Remove and return every queued event in arrival order
    pub fn drain(&self) -> Vec<DiagnosticEvent> {
        std::iter::from_fn(|| self.events.pop()).collect()
    }
}

impl DiagnosticSink for MemorySink {
    fn emit(&self, event: DiagnosticEvent) {
        self.events.push(event);
    }
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn emit(&self, _event: DiagnosticEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_display_lines() {
        let event = DiagnosticEvent::ClassProcessed {
            class: "demo/Foo".into(),
        };
        assert_eq!(event.to_string(), "Transforming demo/Foo");

        let event = DiagnosticEvent::behavior_instrumented(
            "demo/Foo",
            "run",
            "()V",
            BehaviorKind::Method,
            3,
        );
        assert_eq!(event.to_string(), "Instrumented demo/Foo.run()V (3 exits)");

        let event = DiagnosticEvent::TransformFailed {
            class: "demo/Bad".into(),
            kind: "malformed_input".into(),
            reason: "truncated".into(),
        };
        assert_eq!(event.to_string(), "Could not instrument demo/Bad: truncated");
        assert!(event.is_failure());
        assert_eq!(event.class(), "demo/Bad");
    }

    #[test]
    fn test_json_shape() {
        let event = DiagnosticEvent::TransformFailed {
            class: "demo/Bad".into(),
            kind: "unencodable".into(),
            reason: "x".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "transform_failed");
        assert_eq!(json["class"], "demo/Bad");
    }

    #[test]
    fn test_memory_sink_concurrent_emit() {
        let sink = Arc::new(MemorySink::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let sink = Arc::clone(&sink);
                thread::spawn(move || {
                    for i in 0..100 {
                        sink.emit(DiagnosticEvent::ClassProcessed {
                            class: format!("c{}_{}", t, i),
                        });
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(sink.len(), 800);
        let events = sink.drain();
        assert_eq!(events.len(), 800);
        assert!(sink.is_empty());
    }
}
