//! Schema validation: lint rules checking a rule against the study specification.
//!
//! Call [`validate_rule`] for all diagnostics or [`validate_rule_or_raise`] to
//! turn the first `Error`-severity finding into a `SchemaError`.

use std::sync::LazyLock;

use regex::Regex;

use formalizer_types::{FieldSpec, FieldType, FormalizerError, Result, Rule, StudySpecification};

use crate::extraction::{qualified_references, strip_literals};

/// `[Form.]field <op> 'literal'`
static RE_LITERAL_COMPARISON: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r#"(?:\b([A-Za-z_][A-Za-z0-9_]*)\.)?\b([A-Za-z_][A-Za-z0-9_]*)\s*(==|!=|<>|<=|>=|=|<|>)\s*(?:'([^']*)'|"([^"]*)")"#,
    )
    .ok()
});

static RE_WORD_OPERATOR: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)\b(equals?)\b").ok());

// ---------------------------------------------------------------------------
// Diagnostic types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub lint: String,
    pub severity: Severity,
    pub message: String,
    pub rule_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

// ---------------------------------------------------------------------------
// LintRule trait
// ---------------------------------------------------------------------------

pub trait LintRule: Send + Sync {
    fn name(&self) -> &str;
    fn apply(&self, rule: &Rule, spec: &StudySpecification) -> Vec<Diagnostic>;

    fn diagnostic(&self, rule: &Rule, severity: Severity, message: String) -> Diagnostic {
        Diagnostic {
            lint: self.name().to_string(),
            severity,
            message,
            rule_id: rule.id.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

struct NonEmptyConditionRule;
impl LintRule for NonEmptyConditionRule {
    fn name(&self) -> &str {
        "non_empty_condition"
    }
    fn apply(&self, rule: &Rule, _spec: &StudySpecification) -> Vec<Diagnostic> {
        if rule.condition.trim().is_empty() {
            vec![self.diagnostic(rule, Severity::Error, "condition is empty".into())]
        } else {
            vec![]
        }
    }
}

struct KnownFormRule;
impl LintRule for KnownFormRule {
    fn name(&self) -> &str {
        "known_form"
    }
    fn apply(&self, rule: &Rule, spec: &StudySpecification) -> Vec<Diagnostic> {
        rule.forms
            .iter()
            .filter(|form| !spec.has_form(form))
            .map(|form| self.diagnostic(rule, Severity::Error, format!("unknown form '{form}'")))
            .collect()
    }
}

/// Each field must exist in one of the rule's forms, or in any form when the rule lists none.
struct KnownFieldRule;
impl LintRule for KnownFieldRule {
    fn name(&self) -> &str {
        "known_field"
    }
    fn apply(&self, rule: &Rule, spec: &StudySpecification) -> Vec<Diagnostic> {
        rule.fields
            .iter()
            .filter(|field| {
                if rule.forms.is_empty() {
                    !spec.has_field_anywhere(field)
                } else {
                    !rule.forms.iter().any(|form| spec.field(form, field).is_some())
                }
            })
            .map(|field| {
                self.diagnostic(rule, Severity::Error, format!("unknown field '{field}'"))
            })
            .collect()
    }
}

/// Qualified `Form.field` references in the condition text must exist in the specification.
struct ConditionReferencesRule;
impl LintRule for ConditionReferencesRule {
    fn name(&self) -> &str {
        "condition_references"
    }
    fn apply(&self, rule: &Rule, spec: &StudySpecification) -> Vec<Diagnostic> {
        qualified_references(&rule.condition)
            .into_iter()
            .filter_map(|(form, field)| {
                if !spec.has_form(&form) {
                    Some(format!("condition references unknown form '{form}'"))
                } else if spec.field(&form, &field).is_none() {
                    Some(format!("condition references unknown field '{form}.{field}'"))
                } else {
                    None
                }
            })
            .map(|message| self.diagnostic(rule, Severity::Error, message))
            .collect()
    }
}

struct BalancedParenthesesRule;
impl LintRule for BalancedParenthesesRule {
    fn name(&self) -> &str {
        "balanced_parentheses"
    }
    fn apply(&self, rule: &Rule, _spec: &StudySpecification) -> Vec<Diagnostic> {
        let unquoted = strip_literals(&rule.condition);
        let mut depth: i64 = 0;
        for c in unquoted.chars() {
            match c {
                '(' => depth += 1,
                ')' => depth -= 1,
                _ => {}
            }
            if depth < 0 {
                break;
            }
        }
        if depth == 0 {
            vec![]
        } else {
            vec![self.diagnostic(rule, Severity::Error, "unbalanced parentheses".into())]
        }
    }
}

struct WordOperatorRule;
impl LintRule for WordOperatorRule {
    fn name(&self) -> &str {
        "word_operator"
    }
    fn apply(&self, rule: &Rule, _spec: &StudySpecification) -> Vec<Diagnostic> {
        let Some(re) = RE_WORD_OPERATOR.as_ref() else {
            return vec![];
        };
        let unquoted = strip_literals(&rule.condition);
        re.find_iter(&unquoted)
            .map(|m| {
                self.diagnostic(
                    rule,
                    Severity::Warning,
                    format!("operator '{}' should be written as '='", m.as_str()),
                )
            })
            .collect()
    }
}

/// A field compared against a quoted literal somewhere in the condition.
struct LiteralComparison<'a> {
    name: String,
    field: &'a FieldSpec,
    operator: String,
    literal: String,
}

/// Comparisons whose left side resolves to a specified field: qualified references
/// directly, bare names only when the rule declares them.
fn literal_comparisons<'a>(
    rule: &Rule,
    spec: &'a StudySpecification,
) -> Vec<LiteralComparison<'a>> {
    let Some(re) = RE_LITERAL_COMPARISON.as_ref() else {
        return vec![];
    };
    re.captures_iter(&rule.condition)
        .filter_map(|caps| {
            let field_name = caps.get(2)?.as_str();
            let (name, field) = match caps.get(1) {
                Some(form) => {
                    let form = form.as_str();
                    (format!("{form}.{field_name}"), spec.field(form, field_name)?)
                }
                None if rule.fields.contains(field_name) => {
                    let field = if rule.forms.is_empty() {
                        spec.field_anywhere(field_name)
                    } else {
                        rule.forms.iter().find_map(|form| spec.field(form, field_name))
                    };
                    (field_name.to_string(), field?)
                }
                None => return None,
            };
            let literal = caps.get(4).or_else(|| caps.get(5))?.as_str().to_string();
            Some(LiteralComparison {
                name,
                field,
                operator: caps.get(3)?.as_str().to_string(),
                literal,
            })
        })
        .collect()
}

struct CategoricalValueRule;
impl LintRule for CategoricalValueRule {
    fn name(&self) -> &str {
        "categorical_value"
    }
    fn apply(&self, rule: &Rule, spec: &StudySpecification) -> Vec<Diagnostic> {
        literal_comparisons(rule, spec)
            .into_iter()
            .filter(|c| {
                c.field.field_type == FieldType::Categorical
                    && !c.field.valid_values.is_empty()
                    && matches!(c.operator.as_str(), "=" | "==" | "!=" | "<>")
                    && !c.field.valid_values.iter().any(|v| v.trim() == c.literal.trim())
            })
            .map(|c| {
                self.diagnostic(
                    rule,
                    Severity::Error,
                    format!(
                        "value '{}' is not valid for '{}' (expected one of: {})",
                        c.literal,
                        c.name,
                        c.field.valid_values.join(", ")
                    ),
                )
            })
            .collect()
    }
}

struct LiteralTypeRule;
impl LintRule for LiteralTypeRule {
    fn name(&self) -> &str {
        "literal_type"
    }
    fn apply(&self, rule: &Rule, spec: &StudySpecification) -> Vec<Diagnostic> {
        literal_comparisons(rule, spec)
            .into_iter()
            .filter(|c| {
                matches!(
                    c.field.field_type,
                    FieldType::Number | FieldType::Date | FieldType::Datetime | FieldType::Time
                )
            })
            .map(|c| {
                self.diagnostic(
                    rule,
                    Severity::Warning,
                    format!(
                        "{:?} field '{}' is compared with the string '{}'",
                        c.field.field_type, c.name, c.literal
                    ),
                )
            })
            .collect()
    }
}

struct DeclaresFieldsRule;
impl LintRule for DeclaresFieldsRule {
    fn name(&self) -> &str {
        "declares_fields"
    }
    fn apply(&self, rule: &Rule, _spec: &StudySpecification) -> Vec<Diagnostic> {
        if rule.fields.is_empty() {
            vec![self.diagnostic(
                rule,
                Severity::Warning,
                "rule declares no fields; only qualified Form.field references are analysed".into(),
            )]
        } else {
            vec![]
        }
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

pub fn validate_rule(rule: &Rule, spec: &StudySpecification) -> Vec<Diagnostic> {
    let lints: Vec<Box<dyn LintRule>> = vec![
        Box::new(NonEmptyConditionRule),
        Box::new(KnownFormRule),
        Box::new(KnownFieldRule),
        Box::new(ConditionReferencesRule),
        Box::new(BalancedParenthesesRule),
        Box::new(WordOperatorRule),
        Box::new(CategoricalValueRule),
        Box::new(LiteralTypeRule),
        Box::new(DeclaresFieldsRule),
    ];

    let mut diagnostics = Vec::new();
    for lint in &lints {
        diagnostics.extend(lint.apply(rule, spec));
    }
    diagnostics
}

/// Run all lint rules; return `Err` if any `Error`-severity diagnostic is found.
pub fn validate_rule_or_raise(rule: &Rule, spec: &StudySpecification) -> Result<Vec<Diagnostic>> {
    let diagnostics = validate_rule(rule, spec);
    let errors: Vec<_> = diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .map(|d| d.message.clone())
        .collect();
    if !errors.is_empty() {
        return Err(FormalizerError::SchemaError {
            rule_id: rule.id.clone(),
            message: errors.join("; "),
        });
    }
    Ok(diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use formalizer_types::SpecRow;

    fn spec() -> StudySpecification {
        let row = |form: &str, field: &str, ty: &str| SpecRow {
            form_name: form.into(),
            field_name: field.into(),
            field_type: ty.into(),
            required: false,
            valid_values: vec![],
        };
        StudySpecification::from_rows(vec![
            row("Demographics", "age", "integer"),
            row("Labs", "glucose", "float"),
            row("MedHistory", "diabetes", "yes/no"),
            SpecRow {
                valid_values: vec!["M".into(), "F".into()],
                ..row("Demographics", "sex", "codelist")
            },
            row("Visit", "visit_date", "date"),
        ])
    }

    fn lints(diags: &[Diagnostic]) -> Vec<&str> {
        diags.iter().map(|d| d.lint.as_str()).collect()
    }

    #[test]
    fn valid_rule_has_no_errors() {
        let rule = Rule::new("R001", "Demographics.age >= 18")
            .with_forms(["Demographics"])
            .with_fields(["age"]);
        assert!(validate_rule(&rule, &spec()).is_empty());
        assert!(validate_rule_or_raise(&rule, &spec()).is_ok());
    }

    #[test]
    fn empty_condition_is_an_error() {
        let rule = Rule::new("R002", "   ").with_fields(["age"]);
        let diags = validate_rule(&rule, &spec());
        assert!(diags.iter().any(|d| d.lint == "non_empty_condition"));
    }

    #[test]
    fn unknown_form_and_field_are_reported() {
        let rule = Rule::new("R003", "Vitals.pulse > 40")
            .with_forms(["Vitals"])
            .with_fields(["pulse"]);
        let diags = validate_rule(&rule, &spec());
        assert!(diags.iter().any(|d| d.message == "unknown form 'Vitals'"));
        assert!(diags.iter().any(|d| d.message == "unknown field 'pulse'"));

        let err = validate_rule_or_raise(&rule, &spec()).unwrap_err();
        assert!(matches!(err, FormalizerError::SchemaError { rule_id, .. } if rule_id == "R003"));
    }

    #[test]
    fn field_must_live_in_a_listed_form() {
        let rule = Rule::new("R004", "age > glucose")
            .with_forms(["Demographics"])
            .with_fields(["age", "glucose"]);
        let diags = validate_rule(&rule, &spec());
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].message, "unknown field 'glucose'");
    }

    #[test]
    fn formless_rule_checks_every_form() {
        let rule = Rule::new("R005", "IF diabetes THEN glucose > 126")
            .with_fields(["diabetes", "glucose"]);
        assert!(validate_rule(&rule, &spec()).is_empty());
    }

    #[test]
    fn missing_fields_only_warns() {
        let rule = Rule::new("R006", "Labs.glucose > 0").with_forms(["Labs"]);
        let diags = validate_rule_or_raise(&rule, &spec()).unwrap();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].severity, Severity::Warning);
    }

    #[test]
    fn condition_references_are_checked_against_the_specification() {
        let typo = Rule::new("R007", "Demographics.agee >= 18")
            .with_forms(["Demographics"])
            .with_fields(["age"]);
        let diags = validate_rule(&typo, &spec());
        assert_eq!(lints(&diags), vec!["condition_references"]);
        assert_eq!(
            diags[0].message,
            "condition references unknown field 'Demographics.agee'"
        );

        let unknown_form = Rule::new("R008", "IF Vitals.bogus > 1 THEN Labs.glucose > 2");
        let err = validate_rule_or_raise(&unknown_form, &spec()).unwrap_err();
        assert!(err.to_string().contains("unknown form 'Vitals'"));
    }

    #[test]
    fn references_inside_literals_are_ignored() {
        let rule = Rule::new("R009", "Demographics.sex = 'Vitals.pulse'")
            .with_fields(["sex"]);
        let diags = validate_rule(&rule, &spec());
        assert!(!lints(&diags).contains(&"condition_references"));
    }

    #[test]
    fn unbalanced_parentheses_are_an_error() {
        let open = Rule::new("R010", "(Demographics.age > 18 AND Labs.glucose < 200")
            .with_fields(["age", "glucose"]);
        assert_eq!(lints(&validate_rule(&open, &spec())), vec!["balanced_parentheses"]);

        let reversed = Rule::new("R011", ")Demographics.age > 18(").with_fields(["age"]);
        assert!(validate_rule_or_raise(&reversed, &spec()).is_err());

        let quoted = Rule::new("R012", "Demographics.sex = ':('").with_fields(["sex"]);
        assert!(!lints(&validate_rule(&quoted, &spec())).contains(&"balanced_parentheses"));
    }

    #[test]
    fn word_operators_warn() {
        let rule = Rule::new("R013", "Demographics.age EQUALS 18").with_fields(["age"]);
        let diags = validate_rule_or_raise(&rule, &spec()).unwrap();
        assert_eq!(lints(&diags), vec!["word_operator"]);
        assert_eq!(diags[0].severity, Severity::Warning);
        assert!(diags[0].message.contains("'EQUALS'"));
    }

    #[test]
    fn categorical_literal_must_be_a_valid_value() {
        let bad = Rule::new("R014", "Demographics.sex = 'X'").with_fields(["sex"]);
        let diags = validate_rule(&bad, &spec());
        assert_eq!(lints(&diags), vec!["categorical_value"]);
        assert_eq!(diags[0].severity, Severity::Error);
        assert!(diags[0].message.contains("M, F"));

        let good = Rule::new("R015", "IF sex = \"F\" THEN Demographics.age >= 12")
            .with_forms(["Demographics"])
            .with_fields(["sex", "age"]);
        assert!(validate_rule(&good, &spec()).is_empty());
    }

    #[test]
    fn numeric_and_date_fields_compared_with_strings_warn() {
        let rule = Rule::new(
            "R016",
            "Labs.glucose > '126' AND Visit.visit_date >= '2024-01-01'",
        )
        .with_fields(["glucose", "visit_date"]);
        let diags = validate_rule_or_raise(&rule, &spec()).unwrap();
        assert_eq!(lints(&diags), vec!["literal_type", "literal_type"]);
        assert!(diags.iter().all(|d| d.severity == Severity::Warning));
        assert!(diags[0].message.contains("'Labs.glucose'"));

        // undeclared bare names are not resolved
        let bare = Rule::new("R017", "glucose = '126'").with_fields(["age"]);
        assert!(!lints(&validate_rule(&bare, &spec())).contains(&"literal_type"));
    }
}
