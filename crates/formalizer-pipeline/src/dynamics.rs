//! Built-in extraction of derived-value functions (`DAYS_BETWEEN`, `BMI`, ...).

use std::sync::LazyLock;

use regex::Regex;

use crate::collaborators::DynamicsExtractor;
use crate::state::FunctionReference;

/// Functions recognised in rule text.
pub const KNOWN_FUNCTIONS: &[&str] = &[
    "DAYS_BETWEEN",
    "MONTHS_BETWEEN",
    "YEARS_BETWEEN",
    "CHANGE_FROM_BASELINE",
    "PERCENT_CHANGE_FROM_BASELINE",
    "CHANGE_FROM_PREVIOUS",
    "RATE_OF_CHANGE",
    "SLOPE",
    "BMI",
    "BSA",
    "EGFR",
    "MEAN",
    "MEDIAN",
    "STD_DEV",
    "MIN",
    "MAX",
    "IS_INCREASING",
    "IS_DECREASING",
    "HAS_DOUBLED",
    "HAS_HALVED",
];

static RE_CALL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"([A-Z_]+)\(([^)]*)\)").ok());

/// Recognises `NAME(arg, …)` calls for the functions in [`KNOWN_FUNCTIONS`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RegexDynamicsExtractor;

impl DynamicsExtractor for RegexDynamicsExtractor {
    fn extract(&self, condition: &str) -> Vec<FunctionReference> {
        let Some(re) = RE_CALL.as_ref() else {
            return Vec::new();
        };
        re.captures_iter(condition)
            .filter_map(|caps| {
                let name = caps.get(1)?.as_str();
                if !KNOWN_FUNCTIONS.contains(&name) {
                    return None;
                }
                let arguments = caps
                    .get(2)
                    .map(|a| a.as_str())
                    .unwrap_or("")
                    .split(',')
                    .map(str::trim)
                    .filter(|a| !a.is_empty())
                    .map(String::from)
                    .collect();
                Some(FunctionReference {
                    name: name.to_string(),
                    arguments,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_known_calls_with_arguments() {
        let found = RegexDynamicsExtractor
            .extract("DAYS_BETWEEN(Visit.date, Baseline.date) <= 30 AND BMI(weight, height) < 40");
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].name, "DAYS_BETWEEN");
        assert_eq!(found[0].arguments, vec!["Visit.date", "Baseline.date"]);
        assert_eq!(found[1].name, "BMI");
    }

    #[test]
    fn unknown_functions_and_plain_text_are_ignored() {
        assert!(RegexDynamicsExtractor.extract("UPPER(name) = 'X'").is_empty());
        assert!(RegexDynamicsExtractor.extract("age >= 18").is_empty());
    }

    #[test]
    fn empty_argument_list() {
        let found = RegexDynamicsExtractor.extract("IS_INCREASING() = TRUE");
        assert_eq!(found.len(), 1);
        assert!(found[0].arguments.is_empty());
    }
}
