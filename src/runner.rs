//! Offline driver: feeds class files through the transformer
//!
//! A single `.class` file is transformed in place of the host's class
//! loading; a directory tree is processed on a worker pool, one transform
//! invocation per class, the way concurrent class loading would call the
//! transformer. Output trees mirror the input's relative layout.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use crossbeam::channel;

use crate::cli::OutputFormat;
use crate::coordinator::{TransformResult, Transformer};
use crate::decoder::decode;
use crate::diagnostics::{DiagnosticEvent, DiagnosticSink, MemorySink, TracingSink};
use crate::filter::ClassFilter;
use crate::json_output::{JsonClass, JsonClassResult, JsonOutput};
use crate::probe::ProbeTemplate;
use crate::profiling::StatsSnapshot;

/// Options for one run of the driver
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub filter: ClassFilter,
    pub template: ProbeTemplate,
    pub jobs: usize,
    pub format: OutputFormat,
    pub summary: bool,
    pub inspect: bool,
    pub profile_self: bool,
}

/// A class file found in the input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassJob {
    /// Internal name derived from the relative path, e.g. `com/example/Foo`
    pub name: String,
    pub path: PathBuf,
    /// Path relative to the input root
    pub relative: PathBuf,
}

/// Outcome of a run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub classes: Vec<JsonClassResult>,
    pub stats: StatsSnapshot,
}

/// Run the driver and print its report to stdout
pub fn run(config: &RunConfig) -> Result<()> {
    if config.inspect {
        return inspect(config);
    }
    let (report, transformer) = transform_all(config)?;

    match config.format {
        OutputFormat::Text => {
            for class in &report.classes {
                println!("{}", class.to_text());
            }
            if config.summary {
                print_text_summary(&report.stats);
            }
        }
        OutputFormat::Json => {
            let mut output = JsonOutput::new();
            for class in report.classes {
                output.add_class(class);
            }
            if config.summary {
                output.set_summary(report.stats);
            }
            println!("{}", output.to_json()?);
        }
    }
    if config.profile_self {
        transformer.stats().print_summary();
    }
    Ok(())
}

fn print_text_summary(stats: &StatsSnapshot) {
    println!();
    println!(
        "{} classes: {} transformed, {} unchanged, {} failed",
        stats.transformed + stats.unchanged + stats.failed,
        stats.transformed,
        stats.unchanged,
        stats.failed
    );
    println!("{} behaviors instrumented", stats.behaviors_instrumented);
}

/// Transform every class of the input, writing outputs when requested
pub fn transform_all(config: &RunConfig) -> Result<(RunReport, Transformer)> {
    let sink = Arc::new(MemorySink::new());
    let transformer = Transformer::new(
        config.filter.clone(),
        config.template.clone(),
        Arc::clone(&sink) as Arc<dyn DiagnosticSink>,
    );

    let metadata = fs::metadata(&config.input)
        .with_context(|| format!("Failed to read input: {}", config.input.display()))?;
    let results = if metadata.is_dir() {
        let jobs = collect_classes(&config.input)?;
        tracing::info!(classes = jobs.len(), workers = config.jobs, "processing directory");
        let results = process_pool(&transformer, &jobs, config.jobs)?;
        if let Some(out_dir) = &config.output {
            for (job, bytes, result) in &results {
                let target = out_dir.join(&job.relative);
                write_class(&target, result_bytes(result, bytes))?;
            }
        }
        results
            .into_iter()
            .map(|(job, _, result)| (job.name, result))
            .collect::<Vec<_>>()
    } else {
        let bytes = fs::read(&config.input)
            .with_context(|| format!("Failed to read class file: {}", config.input.display()))?;
        let name = single_file_name(&config.input, &bytes);
        let result = transformer.transform_class(&name, &bytes);
        if let Some(out) = &config.output {
            write_class(out, result_bytes(&result, &bytes))?;
        }
        vec![(name, result)]
    };

    let events = sink.drain();
    for event in &events {
        TracingSink.emit(event.clone());
    }
    let classes = results
        .iter()
        .map(|(name, result)| JsonClassResult::new(name, result, &events_for(&events, name)))
        .collect();
    let stats = transformer.stats().snapshot();
    Ok((RunReport { classes, stats }, transformer))
}

fn events_for(events: &[DiagnosticEvent], class: &str) -> Vec<DiagnosticEvent> {
    events
        .iter()
        .filter(|e| e.class() == class)
        .cloned()
        .collect()
}

fn result_bytes<'a>(result: &'a TransformResult, original: &'a [u8]) -> &'a [u8] {
    match result {
        TransformResult::Transformed(out) => out,
        TransformResult::Unchanged(_) | TransformResult::Failed(_) => original,
    }
}

fn write_class(target: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = target.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
    }
    fs::write(target, bytes)
        .with_context(|| format!("Failed to write class file: {}", target.display()))
}

/// Name for a lone class file: its own `this_class` if it decodes, otherwise
/// the file stem
fn single_file_name(path: &Path, bytes: &[u8]) -> String {
    match decode(bytes) {
        Ok(class) => class.name,
        Err(_) => path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default(),
    }
}

/// Find every `.class` file under `root`, sorted by internal name
pub fn collect_classes(root: &Path) -> Result<Vec<ClassJob>> {
    let mut jobs = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries = fs::read_dir(&dir)
            .with_context(|| format!("Failed to read directory: {}", dir.display()))?;
        for entry in entries {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().is_some_and(|e| e == "class") {
                let relative = path
                    .strip_prefix(root)
                    .with_context(|| format!("{} is outside {}", path.display(), root.display()))?
                    .to_path_buf();
                jobs.push(ClassJob {
                    name: class_name_from_relative(&relative),
                    path,
                    relative,
                });
            }
        }
    }
    jobs.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(jobs)
}

/// `com/example/Foo.class` -> `com/example/Foo`
pub fn class_name_from_relative(relative: &Path) -> String {
    relative
        .with_extension("")
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Transform `jobs` on `workers` threads; results come back in job order
fn process_pool(
    transformer: &Transformer,
    jobs: &[ClassJob],
    workers: usize,
) -> Result<Vec<(ClassJob, Vec<u8>, TransformResult)>> {
    let (job_tx, job_rx) = channel::unbounded::<usize>();
    let (result_tx, result_rx) = channel::unbounded();
    for index in 0..jobs.len() {
        job_tx.send(index).context("worker queue closed")?;
    }
    drop(job_tx);

    thread::scope(|scope| {
        for _ in 0..workers.max(1) {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            scope.spawn(move || {
                for index in job_rx {
                    let job = &jobs[index];
                    let outcome = fs::read(&job.path)
                        .with_context(|| format!("Failed to read class file: {}", job.path.display()))
                        .map(|bytes| {
                            let result = transformer.transform_class(&job.name, &bytes);
                            (bytes, result)
                        });
                    if result_tx.send((index, outcome)).is_err() {
                        break;
                    }
                }
            });
        }
    });
    drop(result_tx);

    let mut slots: Vec<Option<(Vec<u8>, TransformResult)>> = Vec::with_capacity(jobs.len());
    slots.resize_with(jobs.len(), || None);
    for (index, outcome) in result_rx {
        slots[index] = Some(outcome?);
    }
    jobs.iter()
        .zip(slots)
        .map(|(job, slot)| {
            let (bytes, result) =
                slot.with_context(|| format!("No result for class {}", job.name))?;
            Ok((job.clone(), bytes, result))
        })
        .collect()
}

fn inspect(config: &RunConfig) -> Result<()> {
    let metadata = fs::metadata(&config.input)
        .with_context(|| format!("Failed to read input: {}", config.input.display()))?;
    let paths: Vec<PathBuf> = if metadata.is_dir() {
        collect_classes(&config.input)?
            .into_iter()
            .map(|job| job.path)
            .collect()
    } else {
        vec![config.input.clone()]
    };

    let mut views = Vec::with_capacity(paths.len());
    for path in &paths {
        let bytes = fs::read(path)
            .with_context(|| format!("Failed to read class file: {}", path.display()))?;
        let class =
            decode(&bytes).with_context(|| format!("Failed to decode {}", path.display()))?;
        views.push(JsonClass::from_class(&class)?);
    }

    match config.format {
        OutputFormat::Text => {
            for view in &views {
                print!("{}", view.to_text());
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&views)?),
    }
    Ok(())
}
