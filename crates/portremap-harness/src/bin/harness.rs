//! CLI entrypoint for the portremap verification harness.

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use portremap_harness::structured_log::{self, ArtifactIndex, LogEmitter, LogLevel};
use portremap_harness::{BindFixtureSet, TestRunner, VerificationSummary, probe};

/// Verification tooling for the portremap bind interposer.
#[derive(Debug, Parser)]
#[command(name = "portremap-harness")]
#[command(about = "End-to-end verification harness for the portremap bind interposer")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Bind a TCP listener and print the requested and bound port as JSON.
    ProbeBind {
        /// Port to request from bind(2).
        #[arg(long)]
        port: u16,
        /// Address to bind.
        #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
        host: IpAddr,
    },
    /// Run bind fixtures under LD_PRELOAD and compare with expectations.
    Verify {
        /// Path to libportremap_abi.so.
        #[arg(long)]
        preload: PathBuf,
        /// Fixture JSON file (the built-in suite when omitted).
        #[arg(long)]
        fixture: Option<PathBuf>,
        /// Structured JSONL log output path.
        #[arg(long)]
        log: Option<PathBuf>,
        /// Verification summary output path (JSON).
        #[arg(long)]
        report: Option<PathBuf>,
        /// Address the probes bind.
        #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
        host: IpAddr,
        /// Run identifier used in trace ids.
        #[arg(long)]
        run_id: Option<String>,
    },
    /// Validate a structured JSONL log against the log schema.
    ValidateLog {
        #[arg(long)]
        log: PathBuf,
    },
    /// Write an artifact index referencing a log with its SHA-256.
    ArtifactIndex {
        #[arg(long)]
        log: PathBuf,
        /// Output JSON path.
        #[arg(long)]
        output: PathBuf,
        #[arg(long, default_value = "local")]
        run_id: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::ProbeBind { port, host } => {
            let report = probe::probe_bind(host, port);
            println!("{}", serde_json::to_string(&report)?);
            if !report.succeeded() {
                std::process::exit(1);
            }
        }
        Command::Verify {
            preload,
            fixture,
            log,
            report,
            host,
            run_id,
        } => {
            let set = match &fixture {
                Some(path) => BindFixtureSet::from_file(path)?,
                None => BindFixtureSet::builtin(),
            };
            let run_id = run_id.unwrap_or_else(|| format!("pid{}", std::process::id()));
            let mut emitter = match &log {
                Some(path) => LogEmitter::to_file(path, &set.family, &run_id)?,
                None => LogEmitter::to_sink(&set.family, &run_id),
            };

            let probe_exe = std::env::current_exe()?;
            let runner = TestRunner::new(preload, probe_exe, host);
            emitter.emit(LogLevel::Info, "suite_start")?;
            let results = runner.run(&set, &mut emitter)?;
            let summary = VerificationSummary::from_results(results);
            emitter.emit(
                if summary.all_passed() {
                    LogLevel::Info
                } else {
                    LogLevel::Error
                },
                "suite_end",
            )?;
            emitter.flush()?;

            for result in &summary.results {
                let status = if result.passed { "PASS" } else { "FAIL" };
                eprintln!("[{status}] {}: {}", result.case_name, result.actual);
                if let Some(diff) = &result.diff {
                    eprintln!("       {diff}");
                }
            }
            eprintln!(
                "Verification complete: total={}, passed={}, failed={}",
                summary.total, summary.passed, summary.failed
            );

            if let Some(report_path) = report {
                std::fs::write(&report_path, summary.to_json()?)?;
                eprintln!("Wrote report to {}", report_path.display());
            }
            if !summary.all_passed() {
                return Err("bind verification failed".into());
            }
        }
        Command::ValidateLog { log } => {
            let (lines, errors) = structured_log::validate_log_file(&log)?;
            for error in &errors {
                eprintln!("{error}");
            }
            eprintln!("{}: {lines} lines, {} errors", log.display(), errors.len());
            if !errors.is_empty() {
                return Err(format!("{} failed schema validation", log.display()).into());
            }
        }
        Command::ArtifactIndex {
            log,
            output,
            run_id,
        } => {
            let mut index = ArtifactIndex::new(run_id);
            index.add_file(&log, "log")?;
            std::fs::write(&output, index.to_json()?)?;
            eprintln!("Wrote artifact index to {}", output.display());
        }
    }

    Ok(())
}
