//! Test execution engine.
//!
//! Every case runs as a fresh `harness probe-bind` child with the interposer
//! preloaded, so each case sees a clean process environment and a cold
//! symbol cache.

use std::io::ErrorKind;
use std::net::IpAddr;
use std::path::PathBuf;
use std::process::Command;
use std::time::Instant;

use portremap_core::redirect::{API_PORT_VAR, DATABASE_PORT_VAR};

use crate::diagnostics::{self, RedirectLine};
use crate::error::HarnessError;
use crate::fixtures::{BindCase, BindFixtureSet, ResolvedCase};
use crate::probe::{self, ProbeReport};
use crate::structured_log::{LogEmitter, LogEntry, LogLevel, Outcome, StreamKind};
use crate::verify::VerificationResult;

/// Runs bind fixture sets under `LD_PRELOAD`.
pub struct TestRunner {
    /// The interposer shared object.
    pub preload: PathBuf,
    /// Executable providing the `probe-bind` subcommand.
    pub probe: PathBuf,
    /// Address the probes bind.
    pub host: IpAddr,
}

/// What one probe child left behind.
#[derive(Debug, Clone)]
pub struct CaseObservation {
    pub report: ProbeReport,
    pub redirects: Vec<RedirectLine>,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
}

impl TestRunner {
    #[must_use]
    pub fn new(preload: impl Into<PathBuf>, probe: impl Into<PathBuf>, host: IpAddr) -> Self {
        Self {
            preload: preload.into(),
            probe: probe.into(),
            host,
        }
    }

    /// Run all cases in a set, logging one `case_result` entry per case.
    pub fn run(
        &self,
        set: &BindFixtureSet,
        log: &mut LogEmitter,
    ) -> Result<Vec<VerificationResult>, HarnessError> {
        if !self.preload.is_file() {
            return Err(HarnessError::MissingPreload(self.preload.clone()));
        }
        let mut results = Vec::with_capacity(set.cases.len());
        for case in &set.cases {
            let resolved = self.resolve(case)?;
            let observation = self.observe(&resolved)?;
            let result = evaluate(&resolved, &observation);
            log.emit_entry(case_entry(&set.family, &resolved, &observation, &result))?;
            results.push(result);
        }
        log.flush()?;
        Ok(results)
    }

    fn resolve(&self, case: &BindCase) -> Result<ResolvedCase, HarnessError> {
        let free = if case.needs_free_port() {
            Some(probe::free_port(self.host)?)
        } else {
            None
        };
        case.resolve(free)
    }

    /// Spawns the probe for one resolved case and collects what it saw.
    pub fn observe(&self, case: &ResolvedCase) -> Result<CaseObservation, HarnessError> {
        let started = Instant::now();
        let output = Command::new(&self.probe)
            .arg("probe-bind")
            .arg("--port")
            .arg(case.requested_port.to_string())
            .arg("--host")
            .arg(self.host.to_string())
            .env_remove(DATABASE_PORT_VAR)
            .env_remove(API_PORT_VAR)
            .envs(case.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .env("LD_PRELOAD", &self.preload)
            .output()
            .map_err(|source| HarnessError::Spawn {
                program: self.probe.clone(),
                source,
            })?;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let report = stdout
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .and_then(|line| serde_json::from_str::<ProbeReport>(line).ok())
            .ok_or_else(|| HarnessError::Probe {
                case: case.name.clone(),
                exit_code: output.status.code(),
                stderr: stderr.trim().to_string(),
            })?;

        Ok(CaseObservation {
            report,
            redirects: diagnostics::redirect_lines(&stderr),
            exit_code: output.status.code(),
            duration_ms,
        })
    }
}

fn render(bound: &str, redirects: &[RedirectLine]) -> String {
    let redirects: Vec<String> = redirects
        .iter()
        .map(|r| format!("{}->{}", r.from, r.to))
        .collect();
    format!("bound={bound} redirects=[{}]", redirects.join(","))
}

fn render_expected(case: &ResolvedCase) -> String {
    let bound = case
        .expected_port
        .map_or_else(|| "any".to_string(), |p| p.to_string());
    render(&bound, &case.expected_redirects)
}

fn render_actual(observation: &CaseObservation) -> String {
    match observation.report.bound {
        Some(port) => render(&port.to_string(), &observation.redirects),
        None => format!(
            "{} error={}",
            render("none", &observation.redirects),
            observation.report.error.as_deref().unwrap_or("unknown")
        ),
    }
}

fn addr_in_use(report: &ProbeReport) -> bool {
    report
        .errno
        .is_some_and(|e| std::io::Error::from_raw_os_error(e).kind() == ErrorKind::AddrInUse)
}

/// Compares one observation with its case.
///
/// A pass-through case whose requested port is already taken on the host
/// still passes when the failure is `EADDRINUSE` and no redirect was
/// announced: the interposer demonstrably handed the original port to the
/// kernel.
#[must_use]
pub fn evaluate(case: &ResolvedCase, observation: &CaseObservation) -> VerificationResult {
    let expected = render_expected(case);
    let actual = render_actual(observation);
    let report = &observation.report;

    let mut problems = Vec::new();
    let mut note = None;

    if observation.redirects != case.expected_redirects {
        problems.push(format!(
            "redirect lines differ: expected {:?}, got {:?}",
            case.expected_redirects, observation.redirects
        ));
    }

    match (case.expected_port, report.bound) {
        (Some(want), Some(got)) if want == got => {}
        (Some(want), Some(got)) => problems.push(format!("bound {got}, expected {want}")),
        (Some(want), None)
            if want == case.requested_port
                && case.expected_redirects.is_empty()
                && addr_in_use(report) =>
        {
            note = Some(format!(
                "port {want} is busy on this host; EADDRINUSE shows it was passed through"
            ));
        }
        (_, None) => problems.push(format!(
            "bind failed: {}",
            report.error.as_deref().unwrap_or("unknown error")
        )),
        (None, Some(_)) => {}
    }

    let passed = problems.is_empty();
    VerificationResult {
        case_name: case.name.clone(),
        passed,
        expected,
        actual,
        diff: if passed { note } else { Some(problems.join("; ")) },
    }
}

fn case_entry(
    family: &str,
    case: &ResolvedCase,
    observation: &CaseObservation,
    result: &VerificationResult,
) -> LogEntry {
    let (level, outcome) = if result.passed {
        (LogLevel::Info, Outcome::Pass)
    } else {
        (LogLevel::Error, Outcome::Fail)
    };
    let redirects: Vec<[u16; 2]> = observation.redirects.iter().map(|r| [r.from, r.to]).collect();
    let mut entry = LogEntry::new(String::new(), level, "case_result")
        .with_stream(StreamKind::E2e)
        .with_symbol(family)
        .with_case(&case.name)
        .with_ports(case.requested_port, observation.report.bound)
        .with_outcome(outcome)
        .with_duration_ms(observation.duration_ms)
        .with_details(serde_json::json!({
            "env": case.env,
            "redirects": redirects,
            "expected": result.expected,
            "actual": result.actual,
            "diff": result.diff,
        }));
    if let Some(code) = observation.exit_code {
        entry = entry.with_exit_code(code);
    }
    if let Some(errno) = observation.report.errno {
        entry = entry.with_errno(errno);
    }
    entry
}
