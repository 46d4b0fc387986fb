//! gengc Benchmark CLI
//!
//! Command-line interface for running collector workloads.

use std::process;

use clap::Parser;
use gc_bench::{format_report, format_report_json, run, BenchConfig, Mode, Workload};

/// Runs synthetic allocation workloads against the generational collector
#[derive(Parser, Debug)]
#[command(name = "gengc-bench")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Workload to run
    #[arg(long, value_enum, default_value_t = Workload::LinkedList)]
    workload: Workload,

    /// Collection mode; runs every mode when omitted
    #[arg(long, value_enum)]
    mode: Option<Mode>,

    /// Iterations of the workload on the same heap
    #[arg(long, default_value_t = 5)]
    iterations: usize,

    /// Workload size (list length, tree depth, or churn rounds)
    #[arg(long)]
    size: Option<usize>,

    /// Semi-space size in bytes
    #[arg(long, default_value_t = 1024 * 1024)]
    young_size: usize,

    /// Old-generation limit in bytes
    #[arg(long, default_value_t = 64 * 1024 * 1024)]
    old_size: usize,

    /// Output results as JSON
    #[arg(long)]
    json: bool,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let modes = match cli.mode {
        Some(mode) => vec![mode],
        None => vec![Mode::Stw, Mode::Incremental, Mode::Concurrent],
    };

    let mut reports = Vec::new();
    for mode in modes {
        let config = BenchConfig {
            iterations: cli.iterations,
            size: cli.size.unwrap_or_else(|| cli.workload.default_size()),
            young_space_size: cli.young_size,
            old_space_size: cli.old_size,
            ..BenchConfig::new(cli.workload, mode)
        };
        if !cli.json {
            println!("Running {} in {:?} mode...", cli.workload.name(), mode);
        }
        match run(&config) {
            Ok(report) => reports.push(report),
            Err(e) => {
                eprintln!("Error: {}", e);
                process::exit(1);
            }
        }
    }

    if cli.json {
        match format_report_json(&reports) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error formatting JSON: {}", e);
                process::exit(1);
            }
        }
    } else {
        for report in &reports {
            println!("{}", format_report(report));
        }
    }

    if reports.iter().any(|report| !report.checksum_ok) {
        eprintln!("Error: a workload produced a wrong checksum");
        process::exit(2);
    }
}
