//! Perfmon - load-time class-file instrumentation with method timing probes
//!
//! This library decodes JVM class files into a structural model, injects a
//! `System.nanoTime()` prologue and a printing epilogue on every exit of every
//! method and constructor body, and encodes the result back to bytes. The
//! coordinator contains every failure so a class that cannot be transformed
//! is simply loaded unchanged.

pub mod classfile;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod decoder;
pub mod diagnostics;
pub mod encoder;
pub mod error;
pub mod filter;
pub mod inject;
pub mod json_output;
pub mod model;
pub mod probe;
pub mod profiling;
pub mod runner;
