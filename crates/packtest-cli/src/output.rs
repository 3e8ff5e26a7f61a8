//! Formatted output helpers for CLI commands.

use std::fmt::Write as _;
use std::time::Duration;

use packtest_acceptance::runner::CaseReport;
use packtest_acceptance::suite::SuiteReport;

pub const BOLD: &str = "\x1b[1m";
pub const DIM: &str = "\x1b[2m";
pub const GREEN: &str = "\x1b[32m";
pub const RED: &str = "\x1b[31m";
pub const YELLOW: &str = "\x1b[33m";
pub const RESET: &str = "\x1b[0m";

/// Formats a duration for humans (e.g. "850ms", "12.4s", "2m05s").
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1_000 {
        format!("{millis}ms")
    } else if millis < 60_000 {
        format!("{}.{}s", millis / 1_000, (millis % 1_000) / 100)
    } else {
        let secs = duration.as_secs();
        format!("{}m{:02}s", secs / 60, secs % 60)
    }
}

/// Renders one case as a status line followed by indented details.
#[must_use]
pub fn format_case(case: &CaseReport) -> String {
    let mut out = if case.passed() {
        format!("  {GREEN}✓{RESET} {}", case.name)
    } else {
        format!("  {RED}✗{RESET} {}", case.name)
    };
    let _ = write!(out, " {DIM}({}){RESET}", format_duration(case.elapsed));
    for failure in &case.failures {
        let _ = write!(out, "\n      {failure}");
    }
    if let Some(error) = &case.error {
        for line in error.lines() {
            let _ = write!(out, "\n      {DIM}{line}{RESET}");
        }
    }
    out
}

/// Prints every case and a summary line to stderr.
pub fn print_report(report: &SuiteReport) {
    eprintln!();
    for case in &report.cases {
        eprintln!("{}", format_case(case));
    }
    let failed = report.failed().count();
    let passed = report.cases.len() - failed;
    let colour = if failed == 0 { GREEN } else { RED };
    eprintln!(
        "\n{BOLD}{colour}{passed} passed{RESET}, {failed} failed, {} skipped",
        report.skipped.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(name: &str) -> CaseReport {
        CaseReport {
            name: name.to_string(),
            failures: Vec::new(),
            error: None,
            elapsed: Duration::from_millis(1_500),
        }
    }

    #[test]
    fn passing_case_is_a_single_line() {
        let line = format_case(&report("yarn_lock"));
        assert!(line.contains("yarn_lock"));
        assert!(line.contains("1.5s"));
        assert!(!line.contains('\n'));
    }

    #[test]
    fn errored_case_indents_every_error_line() {
        let mut case = report("package_lock");
        case.error = Some("build failed\nnpm ERR! code E404".to_string());
        let text = format_case(&case);
        assert_eq!(text.lines().count(), 3);
        assert!(text.lines().nth(2).unwrap().contains("npm ERR! code E404"));
    }

    #[test]
    fn format_duration_displays_millis() {
        assert_eq!(format_duration(Duration::from_millis(850)), "850ms");
    }

    #[test]
    fn format_duration_displays_seconds() {
        assert_eq!(format_duration(Duration::from_millis(12_480)), "12.4s");
    }

    #[test]
    fn format_duration_displays_minutes() {
        assert_eq!(format_duration(Duration::from_secs(125)), "2m05s");
    }
}
