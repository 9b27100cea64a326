//! The semantic linker (§4.3): resolves every name in the unresolved
//! [`crate::ast`] tree against the criteria and plugin tables, type-checks
//! rule predicates against criterion kinds, and rejects duplicate names.
//! Runs the five checks in the order §4.3 specifies; failure aborts
//! construction (no partial `System` is ever returned to the caller).

use rustc_hash::FxHashSet;
use smol_str::SmolStr;

use crate::ast::{
    CriterionKind, ParsedAct, ParsedCriterion, ParsedDomain, ParsedRange, ParsedRule, Predicate,
    RuleOperand,
};
use crate::error::{PfwError, Result};
use crate::model::{Act, Amend, Config, Criteria, Criterion, Domain, Interval, Operand, Plugins, Rule};
use crate::system::LoadHook;

/// Checks 1–3: initializes each criterion's state (running the load hook,
/// if any), and rejects duplicate range literals or aliases.
pub fn sanitize_criteria(
    parsed: Vec<ParsedCriterion>,
    on_load: &mut Option<LoadHook>,
) -> Result<Criteria> {
    let mut criteria = Criteria::default();
    let mut seen_aliases: FxHashSet<SmolStr> = FxHashSet::default();

    for p in parsed {
        let (literals, intervals) = split_ranges(&p)?;

        if p.kind != CriterionKind::Numerical && has_duplicates(&literals) {
            let err = PfwError::bad_argument(format!(
                "criterion '{}' declares duplicate range literals",
                p.names[0]
            ));
            tracing::error!(%err, "rejecting criterion");
            return Err(err);
        }

        for name in &p.names {
            if !seen_aliases.insert(name.clone()) {
                let err = PfwError::bad_argument(format!("duplicate criterion alias '{name}'"));
                tracing::error!(%err, "rejecting criterion");
                return Err(err);
            }
        }

        let mut criterion = Criterion {
            names: p.names,
            kind: p.kind,
            literals,
            intervals,
            init: 0,
            state: 0,
            listeners: Vec::new(),
        };

        if let Some(default_text) = &p.default {
            criterion.init = criterion.atoi(default_text)?;
        }
        criterion.state = criterion.init;

        if let Some(hook) = on_load.as_mut() {
            hook(criterion.canonical_name(), &mut criterion.state);
        }

        tracing::debug!(
            name = criterion.canonical_name(),
            state = criterion.state,
            "initialized criterion"
        );
        criteria.push(criterion);
    }

    Ok(criteria)
}

fn split_ranges(p: &ParsedCriterion) -> Result<(Vec<SmolStr>, Vec<Interval>)> {
    match p.kind {
        CriterionKind::Numerical => {
            let mut intervals = Vec::with_capacity(p.ranges.len());
            for r in &p.ranges {
                let ParsedRange::Interval(iv) = r else {
                    return Err(PfwError::bad_argument(
                        "numerical criterion has a non-interval range",
                    ));
                };
                intervals.push(Interval::new(
                    iv.left.unwrap_or(i32::MIN),
                    iv.right.unwrap_or(i32::MAX),
                ));
            }
            Ok((Vec::new(), intervals))
        }
        CriterionKind::Exclusive | CriterionKind::Inclusive => {
            let mut literals = Vec::with_capacity(p.ranges.len());
            for r in &p.ranges {
                let ParsedRange::Literal(lit) = r else {
                    return Err(PfwError::bad_argument("criterion has a non-literal range"));
                };
                literals.push(lit.clone());
            }
            Ok((literals, Vec::new()))
        }
    }
}

fn has_duplicates(items: &[SmolStr]) -> bool {
    let mut seen = FxHashSet::default();
    items.iter().any(|i| !seen.insert(i.clone()))
}

/// Checks 4–5: domain names are unique, and every rule leaf / act /
/// amend resolves against `criteria` and `plugins`.
pub fn sanitize_settings(
    parsed: Vec<ParsedDomain>,
    criteria: &Criteria,
    plugins: &Plugins,
) -> Result<Vec<Domain>> {
    let mut seen_domain_names: FxHashSet<SmolStr> = FxHashSet::default();
    let mut domains = Vec::with_capacity(parsed.len());

    for pd in parsed {
        if !seen_domain_names.insert(pd.name.clone()) {
            return Err(PfwError::bad_argument(format!("duplicate domain name '{}'", pd.name)));
        }

        let mut configs = Vec::with_capacity(pd.configs.len());
        for pc in pd.configs {
            let name_template = sanitize_amends(pc.name_template, criteria);
            let rule = pc.rule.map(|r| sanitize_rule(r, criteria)).transpose()?;
            let acts = pc
                .acts
                .into_iter()
                .map(|a| sanitize_act(a, criteria, plugins))
                .collect::<Result<Vec<_>>>()?;
            configs.push(Config { name_template, rule, acts, current: None, signature: None });
        }

        tracing::debug!(domain = %pd.name, configs = configs.len(), "sanitized domain");
        domains.push(Domain { name: pd.name, configs, current: None });
    }

    Ok(domains)
}

fn sanitize_amends(tokens: Vec<SmolStr>, criteria: &Criteria) -> Vec<Amend> {
    tokens
        .into_iter()
        .map(|t| match criteria.resolve(&t) {
            Some(id) => Amend::Criterion(id),
            None => Amend::Raw(t),
        })
        .collect()
}

fn sanitize_rule(rule: ParsedRule, criteria: &Criteria) -> Result<Rule> {
    match rule {
        ParsedRule::Branch { combinator, children } => {
            let children = children
                .into_iter()
                .map(|c| sanitize_rule(c, criteria))
                .collect::<Result<Vec<_>>>()?;
            Ok(Rule::Branch { combinator, children })
        }
        ParsedRule::Leaf { criterion, predicate, operand } => {
            let id = criteria
                .resolve(&criterion)
                .ok_or_else(|| PfwError::bad_argument(format!("unknown criterion '{criterion}' in rule")))?;
            let kind = criteria.get(id).kind;
            check_predicate_kind(predicate, kind)?;

            let operand = match (operand, predicate) {
                (RuleOperand::Literal(lit), Predicate::Is | Predicate::IsNot) => {
                    Operand::Index(criteria.get(id).atoi(&lit)?)
                }
                (RuleOperand::Literal(lit), Predicate::Includes | Predicate::Excludes) => {
                    Operand::Mask(criteria.get(id).atoi(&lit)? as u32)
                }
                (RuleOperand::Interval(iv), Predicate::In | Predicate::NotIn) => Operand::Interval(
                    Interval::new(iv.left.unwrap_or(i32::MIN), iv.right.unwrap_or(i32::MAX)),
                ),
                _ => unreachable!("check_predicate_kind already rejected incompatible pairs"),
            };

            Ok(Rule::Leaf { criterion: id, predicate, operand })
        }
    }
}

/// The strict predicate/kind compatibility table from §3. Unlike the
/// original's switch-fallthrough in `pfw_sanitize_rules` (which
/// accidentally accepts e.g. `Includes` on an Exclusive criterion), this
/// never falls through.
fn check_predicate_kind(predicate: Predicate, kind: CriterionKind) -> Result<()> {
    let ok = matches!(
        (predicate, kind),
        (Predicate::Is | Predicate::IsNot, CriterionKind::Exclusive)
            | (Predicate::Includes | Predicate::Excludes, CriterionKind::Inclusive)
            | (Predicate::In | Predicate::NotIn, CriterionKind::Numerical)
    );
    if ok {
        Ok(())
    } else {
        let err = PfwError::wrong_kind(format!(
            "predicate {predicate:?} is not valid for a {kind:?} criterion"
        ));
        tracing::error!(%err, "rejecting rule leaf");
        Err(err)
    }
}

fn sanitize_act(act: ParsedAct, criteria: &Criteria, plugins: &Plugins) -> Result<Act> {
    let plugin = plugins.resolve(&act.plugin).ok_or_else(|| {
        let err = PfwError::bad_argument(format!("unknown plugin '{}'", act.plugin));
        tracing::error!(%err, "rejecting act");
        err
    })?;
    let template = sanitize_amends(act.template, criteria);
    Ok(Act { plugin, template })
}
