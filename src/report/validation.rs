use regex::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::sync::LazyLock;

static ANSI_ESCAPE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*m").ok());
static SUMMARY_LINE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\btests?,.*\bpassed\b").ok());
static NUMBER: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\d+").ok());

pub fn strip_ansi(text: &str) -> Cow<'_, str> {
    match ANSI_ESCAPE.as_ref() {
        Some(re) => re.replace_all(text, ""),
        None => Cow::Borrowed(text),
    }
}

/// Counts from the validator's summary line, e.g.
/// `4 tests, 3 passed, 0 warnings, 1 failure, 0 exceptions`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub total_tests: u64,
    pub passed: u64,
    pub warnings: u64,
    pub failures: u64,
    pub exceptions: u64,
}

impl ValidationSummary {
    /// Parse the first summary line; all zeros when none is found.
    pub fn parse(output: &str) -> Self {
        let clean = strip_ansi(output);
        let (Some(summary), Some(number)) = (SUMMARY_LINE.as_ref(), NUMBER.as_ref()) else {
            return Self::default();
        };
        let Some(line) = clean.lines().find(|line| summary.is_match(line)) else {
            return Self::default();
        };

        let numbers: Vec<u64> = number
            .find_iter(line)
            .filter_map(|m| m.as_str().parse().ok())
            .collect();
        match numbers.as_slice() {
            [total_tests, passed, warnings, failures, exceptions, ..] => Self {
                total_tests: *total_tests,
                passed: *passed,
                warnings: *warnings,
                failures: *failures,
                exceptions: *exceptions,
            },
            _ => Self::default(),
        }
    }
}

fn failure_lines(output: &str) -> Vec<String> {
    strip_ansi(output)
        .lines()
        .map(str::trim_start)
        .filter(|line| line.starts_with("FAIL"))
        .map(str::to_string)
        .collect()
}

/// Number of `FAIL` lines in raw validator output.
pub fn count_failures(output: &str) -> usize {
    failure_lines(output).len()
}

/// Rule messages from `FAIL - <file> - <namespace> - <message>` lines.
pub fn violated_rules(output: &str) -> Vec<String> {
    failure_lines(output)
        .into_iter()
        .filter_map(|line| {
            line.rsplit(" - ")
                .next()
                .map(str::trim)
                .filter(|rule| !rule.is_empty() && !rule.starts_with("FAIL"))
                .map(str::to_string)
        })
        .collect()
}
