//! Benchmark driver for the generational collector
//!
//! This crate runs synthetic allocation workloads against a [`gengc::Heap`]
//! and reports what the collector did. It includes:
//!
//! - `linked-list`: a long list built between bursts of short-lived garbage
//! - `binary-trees`: the classic allocation benchmark of short-lived trees
//!   next to one long-lived tree
//! - `churn`: an old-generation table whose slots are overwritten with young
//!   objects, exercising the write barrier and the remembered set
//!
//! Each workload runs under one of three modes: stop-the-world only,
//! incremental marking, or concurrent marking.
//!
//! # Examples
//!
//! ```rust,no_run
//! use gc_bench::{run, BenchConfig, Mode, Workload};
//!
//! let config = BenchConfig::new(Workload::BinaryTrees, Mode::Concurrent);
//! let report = run(&config).unwrap();
//! println!("{}", gc_bench::format_report(&report));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod runner;
pub mod workloads;

pub use runner::{format_report, format_report_json, run, BenchConfig, BenchReport, Mode};
pub use workloads::Workload;
