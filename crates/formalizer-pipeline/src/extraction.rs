//! Candidate causal edges from `IF … THEN …` rule text.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use formalizer_types::Rule;

static RE_IF_THEN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?is)^\s*if\s+(.+?)\s+then\s+(.+)$").ok());

static RE_QUOTED: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"'[^']*'|"[^"]*""#).ok());

/// `Form.field` or bare `field`.
static RE_REFERENCE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"\b([A-Za-z_][A-Za-z0-9_]*)(?:\.([A-Za-z_][A-Za-z0-9_]*))?\b").ok()
});

/// Variables referenced on each side of a rule's implication.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateEdges {
    pub causes: BTreeSet<String>,
    pub effects: BTreeSet<String>,
}

impl CandidateEdges {
    /// Every cause → effect pair, self edges excluded.
    pub fn pairs(&self) -> Vec<(String, String)> {
        self.causes
            .iter()
            .flat_map(|c| {
                self.effects
                    .iter()
                    .filter(move |e| *e != c)
                    .map(move |e| (c.clone(), e.clone()))
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.causes.is_empty() || self.effects.is_empty()
    }
}

/// Split `condition` into its IF and THEN clauses. `None` when it is not an implication.
pub fn split_implication(condition: &str) -> Option<(&str, &str)> {
    let re = RE_IF_THEN.as_ref()?;
    let caps = re.captures(condition)?;
    Some((caps.get(1)?.as_str(), caps.get(2)?.as_str()))
}

/// Field references in `clause` that belong to `declared`. With no declared
/// fields, only qualified `Form.field` references count.
pub fn referenced_fields(clause: &str, declared: &BTreeSet<String>) -> BTreeSet<String> {
    let (Some(quoted), Some(reference)) = (RE_QUOTED.as_ref(), RE_REFERENCE.as_ref()) else {
        return BTreeSet::new();
    };
    let unquoted = quoted.replace_all(clause, " ");

    reference
        .captures_iter(&unquoted)
        .filter_map(|caps| match (caps.get(1), caps.get(2)) {
            (Some(_form), Some(field)) => {
                let field = field.as_str();
                (declared.is_empty() || declared.contains(field)).then(|| field.to_string())
            }
            (Some(bare), None) => {
                let bare = bare.as_str();
                declared.contains(bare).then(|| bare.to_string())
            }
            _ => None,
        })
        .collect()
}

/// `condition` with its quoted literals blanked out.
pub fn strip_literals(condition: &str) -> String {
    match RE_QUOTED.as_ref() {
        Some(quoted) => quoted.replace_all(condition, " ").into_owned(),
        None => condition.to_string(),
    }
}

/// Every `Form.field` reference outside quoted literals, in order of first appearance.
pub fn qualified_references(condition: &str) -> Vec<(String, String)> {
    let Some(reference) = RE_REFERENCE.as_ref() else {
        return Vec::new();
    };
    let unquoted = strip_literals(condition);

    let mut refs: Vec<(String, String)> = Vec::new();
    for caps in reference.captures_iter(&unquoted) {
        if let (Some(form), Some(field)) = (caps.get(1), caps.get(2)) {
            let pair = (form.as_str().to_string(), field.as_str().to_string());
            if !refs.contains(&pair) {
                refs.push(pair);
            }
        }
    }
    refs
}

pub fn extract_candidate_edges(rule: &Rule) -> CandidateEdges {
    match split_implication(&rule.condition) {
        Some((antecedent, consequent)) => CandidateEdges {
            causes: referenced_fields(antecedent, &rule.fields),
            effects: referenced_fields(consequent, &rule.fields),
        },
        None => CandidateEdges::default(),
    }
}

/// The variables a rule touches: declared fields plus every cause and effect.
pub fn rule_variables(rule: &Rule, candidates: &CandidateEdges) -> BTreeSet<String> {
    rule.fields
        .iter()
        .chain(&candidates.causes)
        .chain(&candidates.effects)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn non_implication_has_no_edges() {
        let rule = Rule::new("R001", "Demographics.age >= 18").with_fields(["age"]);
        let candidates = extract_candidate_edges(&rule);
        assert!(candidates.is_empty());
        assert!(candidates.pairs().is_empty());
        assert_eq!(rule_variables(&rule, &candidates), set(&["age"]));
    }

    #[test]
    fn if_then_splits_causes_and_effects() {
        let rule = Rule::new("R002", "IF diabetes = 'Y' THEN glucose > 126")
            .with_fields(["diabetes", "glucose"]);
        let candidates = extract_candidate_edges(&rule);
        assert_eq!(candidates.causes, set(&["diabetes"]));
        assert_eq!(candidates.effects, set(&["glucose"]));
        assert_eq!(
            candidates.pairs(),
            vec![("diabetes".to_string(), "glucose".to_string())]
        );
    }

    #[test]
    fn keywords_are_case_insensitive_and_qualified_refs_resolve() {
        let rule = Rule::new(
            "R003",
            "if ConMeds.medication = \"insulin\" and Labs.fasting = 'Y' then Labs.glucose < 200",
        );
        let candidates = extract_candidate_edges(&rule);
        assert_eq!(candidates.causes, set(&["fasting", "medication"]));
        assert_eq!(candidates.effects, set(&["glucose"]));
        assert_eq!(candidates.pairs().len(), 2);
    }

    #[test]
    fn quoted_literals_are_not_references() {
        let declared = set(&["visit", "status"]);
        let fields = referenced_fields("status = 'visit'", &declared);
        assert_eq!(fields, set(&["status"]));
    }

    #[test]
    fn self_edges_are_dropped() {
        let rule = Rule::new("R004", "IF weight > 0 THEN weight < 500").with_fields(["weight"]);
        let candidates = extract_candidate_edges(&rule);
        assert_eq!(candidates.causes, set(&["weight"]));
        assert!(candidates.pairs().is_empty());
    }

    #[test]
    fn qualified_references_skip_literals_and_repeats() {
        let refs = qualified_references(
            "Labs.glucose > 126 AND Labs.glucose < 400 AND ConMeds.route = 'Oral.tablet'",
        );
        assert_eq!(
            refs,
            vec![
                ("Labs".to_string(), "glucose".to_string()),
                ("ConMeds".to_string(), "route".to_string()),
            ]
        );
        assert!(qualified_references("age >= 18").is_empty());
    }

    #[test]
    fn undeclared_bare_words_are_ignored() {
        let rule = Rule::new("R005", "IF sex = F AND pregnant THEN hcg IS NOT NULL")
            .with_fields(["sex", "hcg"]);
        let candidates = extract_candidate_edges(&rule);
        assert_eq!(candidates.causes, set(&["sex"]));
        assert_eq!(candidates.effects, set(&["hcg"]));
    }
}
