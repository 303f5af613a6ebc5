//! Output formatting utilities for CLI commands

use colored::Colorize;
use sensorbench_harness::orchestrator::{InsertionReport, ProvisionReport, QueryReport};

/// Print success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print warning message
pub fn warning(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

pub fn provision_report(report: &ProvisionReport) {
    for name in &report.provisioned {
        success(&format!("{} provisioned", name));
    }
    for failure in &report.failed {
        error(&format!("{} not provisioned: {}", failure.backend, failure.cause));
    }
}

pub fn insertion_report(report: &InsertionReport) {
    for (name, pass) in &report.passes {
        let line = format!("{}: {} weeks, {} rows", name, pass.buckets, pass.rows);
        if pass.failed_weeks.is_empty() {
            success(&line);
        } else {
            let weeks: Vec<String> = pass.failed_weeks.iter().map(ToString::to_string).collect();
            warning(&format!("{}, failed weeks: {}", line, weeks.join(" ")));
        }
        if pass.skipped_points > 0 {
            warning(&format!("{}: {} malformed points skipped", name, pass.skipped_points));
        }
        if pass.records_dropped > 0 {
            warning(&format!("{}: {} records not written", name, pass.records_dropped));
        }
    }
    for failure in &report.failed {
        error(&format!("{} not loaded: {}", failure.backend, failure.cause));
    }
    if report.dataset_rows_skipped > 0 {
        warning(&format!(
            "{} dataset rows could not be parsed",
            report.dataset_rows_skipped
        ));
    }
}

pub fn query_report(report: &QueryReport) {
    let line = format!("{} rounds, {} queries recorded", report.rounds, report.records);
    if report.aborted.is_empty() {
        success(&line);
        return;
    }
    warning(&line);
    for aborted in &report.aborted {
        match aborted.query {
            Some(query) => error(&format!(
                "{} round {} aborted at {}",
                aborted.backend, aborted.round, query
            )),
            None => error(&format!(
                "{} round {} skipped: no connection",
                aborted.backend, aborted.round
            )),
        }
    }
}
