//! Transform coordinator
//!
//! Entry point invoked once per class being loaded. Runs the decode, inject
//! and encode pipeline and guarantees that no failure escapes: on any error
//! (or panic) the class comes back unchanged with exactly one
//! `TransformFailed` diagnostic. Invocations share nothing mutable except the
//! sink and the statistics, both of which are thread-safe.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::decoder::decode;
use crate::diagnostics::{DiagnosticEvent, DiagnosticSink, TracingSink};
use crate::encoder::encode;
use crate::error::TransformError;
use crate::filter::ClassFilter;
use crate::inject::{inject, InstrumentedBehavior};
use crate::probe::ProbeTemplate;
use crate::profiling::{ProfilingCategory, TransformStats};

/// Why a class was returned unchanged without an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The class filter rejected the name
    Filtered,
    Interface,
    /// Nothing in the class is eligible for probes
    NoBodies,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Filtered => "filtered",
            SkipReason::Interface => "interface",
            SkipReason::NoBodies => "no bodies",
        }
    }
}

#[derive(Debug)]
pub enum TransformResult {
    Transformed(Vec<u8>),
    Unchanged(SkipReason),
    Failed(TransformError),
}

impl TransformResult {
    /// New class bytes, or `None` when the original should be used
    pub fn into_bytes(self) -> Option<Vec<u8>> {
        match self {
            TransformResult::Transformed(bytes) => Some(bytes),
            TransformResult::Unchanged(_) | TransformResult::Failed(_) => None,
        }
    }

    pub fn is_transformed(&self) -> bool {
        matches!(self, TransformResult::Transformed(_))
    }
}

enum Outcome {
    Transformed(Vec<u8>, Vec<InstrumentedBehavior>),
    Skipped(SkipReason),
}

/// Transform one class. `name` is the internal name the host supplied.
pub fn transform_class(
    name: &str,
    bytes: &[u8],
    filter: &ClassFilter,
    template: &ProbeTemplate,
    sink: &dyn DiagnosticSink,
) -> TransformResult {
    run(name, bytes, filter, template, sink, &TransformStats::new())
}

fn run(
    name: &str,
    bytes: &[u8],
    filter: &ClassFilter,
    template: &ProbeTemplate,
    sink: &dyn DiagnosticSink,
    stats: &TransformStats,
) -> TransformResult {
    if !filter.should_instrument(name) {
        tracing::trace!(class = name, "filtered");
        stats.record_unchanged();
        return TransformResult::Unchanged(SkipReason::Filtered);
    }
    stats.record_processed();
    sink.emit(DiagnosticEvent::ClassProcessed {
        class: name.to_string(),
    });

    let outcome = catch_unwind(AssertUnwindSafe(|| pipeline(bytes, template, stats)))
        .unwrap_or_else(|_| Err(TransformError::unsupported("internal fault")));

    match outcome {
        Ok(Outcome::Transformed(out, behaviors)) => {
            stats.record_transformed(behaviors.len());
            for behavior in &behaviors {
                sink.emit(DiagnosticEvent::behavior_instrumented(
                    name,
                    &behavior.name,
                    &behavior.descriptor,
                    behavior.kind,
                    behavior.epilogues,
                ));
            }
            TransformResult::Transformed(out)
        }
        Ok(Outcome::Skipped(reason)) => {
            tracing::debug!(class = name, reason = reason.as_str(), "left unchanged");
            stats.record_unchanged();
            TransformResult::Unchanged(reason)
        }
        Err(err) => {
            stats.record_failed();
            sink.emit(DiagnosticEvent::TransformFailed {
                class: name.to_string(),
                kind: err.kind().to_string(),
                reason: err.reason().to_string(),
            });
            TransformResult::Failed(err)
        }
    }
}

fn pipeline(
    bytes: &[u8],
    template: &ProbeTemplate,
    stats: &TransformStats,
) -> crate::error::Result<Outcome> {
    let class = stats.measure(ProfilingCategory::Decode, || decode(bytes))?;
    if class.is_interface() {
        return Ok(Outcome::Skipped(SkipReason::Interface));
    }
    let injection = stats.measure(ProfilingCategory::Inject, || inject(class, template))?;
    if injection.instrumented.is_empty() {
        return Ok(Outcome::Skipped(SkipReason::NoBodies));
    }
    let out = stats.measure(ProfilingCategory::Encode, || encode(&injection.class))?;
    Ok(Outcome::Transformed(out, injection.instrumented))
}

/// Long-lived transformer registered with a host
///
/// Cheap to share across threads: the filter and template are read-only and
/// the sink and statistics synchronize internally.
pub struct Transformer {
    filter: ClassFilter,
    template: ProbeTemplate,
    sink: Arc<dyn DiagnosticSink>,
    stats: Arc<TransformStats>,
}

impl Default for Transformer {
    fn default() -> Self {
        Self::new(
            ClassFilter::default(),
            ProbeTemplate::standard().clone(),
            Arc::new(TracingSink),
        )
    }
}

impl Transformer {
    pub fn new(filter: ClassFilter, template: ProbeTemplate, sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            filter,
            template,
            sink,
            stats: Arc::new(TransformStats::new()),
        }
    }

    pub fn filter(&self) -> &ClassFilter {
        &self.filter
    }

    pub fn stats(&self) -> &Arc<TransformStats> {
        &self.stats
    }

    /// Transform with the full outcome
    pub fn transform_class(&self, name: &str, bytes: &[u8]) -> TransformResult {
        run(
            name,
            bytes,
            &self.filter,
            &self.template,
            self.sink.as_ref(),
            &self.stats,
        )
    }

    /// Host contract: replacement bytes, or `None` to keep the original
    pub fn transform(&self, name: &str, bytes: &[u8]) -> Option<Vec<u8>> {
        self.transform_class(name, bytes).into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::MemorySink;

    #[test]
    fn test_filtered_class_emits_nothing() {
        let sink = MemorySink::new();
        let result = transform_class(
            "java/lang/String",
            b"not a class",
            &ClassFilter::default(),
            ProbeTemplate::standard(),
            &sink,
        );
        assert!(matches!(result, TransformResult::Unchanged(SkipReason::Filtered)));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_malformed_input_reports_one_failure() {
        let sink = MemorySink::new();
        let result = transform_class(
            "demo/Broken",
            &[0xCA, 0xFE, 0xBA],
            &ClassFilter::all(),
            ProbeTemplate::standard(),
            &sink,
        );
        assert!(matches!(
            result,
            TransformResult::Failed(TransformError::MalformedInput(_))
        ));
        let events = sink.drain();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            DiagnosticEvent::ClassProcessed {
                class: "demo/Broken".into()
            }
        );
        assert!(events[1].is_failure());
        assert_eq!(events[1].class(), "demo/Broken");
    }

    #[test]
    fn test_transformer_counts_outcomes() {
        let transformer = Transformer::new(
            ClassFilter::default(),
            ProbeTemplate::standard().clone(),
            Arc::new(MemorySink::new()),
        );
        assert!(transformer.transform("demo/Empty", &[]).is_none());
        assert!(transformer.transform("java/util/List", &[]).is_none());
        let snap = transformer.stats().snapshot();
        assert_eq!(snap.processed, 1);
        assert_eq!(snap.failed, 1);
        assert_eq!(snap.unchanged, 1);
    }

    #[test]
    fn test_into_bytes() {
        assert_eq!(
            TransformResult::Transformed(vec![1, 2]).into_bytes(),
            Some(vec![1, 2])
        );
        assert!(TransformResult::Unchanged(SkipReason::Interface)
            .into_bytes()
            .is_none());
    }
}
