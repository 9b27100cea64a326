//! Human-readable `dump` table (§4.6): two `+---`-framed sections,
//! criteria then domains, matching the original's column layout.

use std::fmt::Write as _;

use crate::model::{Criteria, CriterionKind, Domain};

const RULE: &str = "+-------------------------------------------------------------\n";

pub fn dump(criteria: &Criteria, domains: &[Domain]) -> String {
    let mut out = String::new();

    out.push_str(RULE);
    let _ = writeln!(out, "| {:<32} | {:<8} | {}", "CRITERIA", "STATE", "VALUE");
    out.push_str(RULE);
    for (_, criterion) in criteria.iter() {
        let value = if criterion.kind == CriterionKind::Numerical {
            String::new()
        } else {
            criterion.itoa(criterion.state).map(|s| s.to_string()).unwrap_or_default()
        };
        let _ = writeln!(
            out,
            "| {:<32} | {:<8} | {value}",
            criterion.canonical_name(),
            criterion.state
        );
    }

    out.push_str(RULE);
    let _ = writeln!(out, "| {:<32} | {}", "DOMAIN", "CONFIG");
    out.push_str(RULE);
    for domain in domains {
        let current = domain
            .current
            .and_then(|idx| domain.configs[idx].current.as_deref())
            .unwrap_or("");
        let _ = writeln!(out, "| {:<32} | {current}", domain.name);
    }
    out.push_str(RULE);

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Config, Criterion};
    use smol_str::SmolStr;

    #[test]
    fn dump_has_both_framed_sections() {
        let mut criteria = Criteria::default();
        criteria.push(Criterion {
            names: vec![SmolStr::new("Mode")],
            kind: CriterionKind::Exclusive,
            literals: vec![SmolStr::new("Normal"), SmolStr::new("Loud")],
            intervals: Vec::new(),
            init: 0,
            state: 1,
            listeners: Vec::new(),
        });

        let domains = vec![Domain {
            name: SmolStr::new("Audio"),
            configs: vec![Config {
                name_template: Vec::new(),
                rule: None,
                acts: Vec::new(),
                current: Some(SmolStr::new("route-Loud")),
                signature: None,
            }],
            current: Some(0),
        }];

        let text = dump(&criteria, &domains);
        assert!(text.contains("CRITERIA"));
        assert!(text.contains("Mode"));
        assert!(text.contains("Loud"));
        assert!(text.contains("DOMAIN"));
        assert!(text.contains("Audio"));
        assert!(text.contains("route-Loud"));
        assert_eq!(text.matches('+').count(), 5);
    }

    #[test]
    fn domain_with_no_selection_shows_empty_config() {
        let criteria = Criteria::default();
        let domains = vec![Domain { name: SmolStr::new("Audio"), configs: Vec::new(), current: None }];
        let text = dump(&criteria, &domains);
        assert!(text.contains("| Audio"));
    }
}
