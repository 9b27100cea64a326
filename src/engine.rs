//! The evaluation engine (§4.5): rule matching, amend interpolation,
//! the `apply` algorithm, and the criterion-mutation side effects
//! (listener fan-out, save hook).

use smol_str::SmolStr;

use crate::ast::{Combinator, Predicate};
use crate::error::Result;
use crate::model::{Amend, Criteria, Criterion, CriterionKind, Domain, Operand, Plugins, Rule};
use crate::system::SaveHook;

/// §4.5: amend interpolation writes into a fixed-size buffer, truncating
/// silently on overflow, with no separator inserted between amends.
pub const INTERPOLATION_CAP: usize = 512;

/// Post-order rule evaluation (§3, §4.5). Empty `ALL` and empty `ANY`
/// both evaluate to true — `Iterator::all` already does this for `ALL`;
/// `ANY` needs the explicit `is_empty` check since `Iterator::any` on an
/// empty iterator is `false`.
pub fn rule_match(rule: &Rule, criteria: &Criteria) -> bool {
    match rule {
        Rule::Branch { combinator: Combinator::All, children } => {
            children.iter().all(|c| rule_match(c, criteria))
        }
        Rule::Branch { combinator: Combinator::Any, children } => {
            if children.is_empty() {
                tracing::warn!("empty ANY branch matched vacuously");
                true
            } else {
                children.iter().any(|c| rule_match(c, criteria))
            }
        }
        Rule::Leaf { criterion, predicate, operand } => {
            let state = criteria.get(*criterion).state;
            match (predicate, operand) {
                (Predicate::Is, Operand::Index(i)) => state == *i,
                (Predicate::IsNot, Operand::Index(i)) => state != *i,
                (Predicate::Includes, Operand::Mask(mask)) => (state as u32 & mask) != 0,
                (Predicate::Excludes, Operand::Mask(mask)) => (state as u32 & mask) == 0,
                (Predicate::In, Operand::Interval(iv)) => iv.contains(state),
                (Predicate::NotIn, Operand::Interval(iv)) => !iv.contains(state),
                _ => unreachable!("sanitizer guarantees predicate/operand pairing"),
            }
        }
    }
}

/// Concatenates an amend list's interpolated text, capped at
/// [`INTERPOLATION_CAP`] bytes. This is the framework's only string
/// composition primitive — separators must appear as raw tokens in the
/// template itself.
pub fn interpolate(amends: &[Amend], criteria: &Criteria) -> Result<SmolStr> {
    let mut buf = String::new();

    for amend in amends {
        let piece = match amend {
            Amend::Raw(raw) => raw.to_string(),
            Amend::Criterion(id) => {
                let c = criteria.get(*id);
                if c.kind == CriterionKind::Numerical {
                    c.state.to_string()
                } else {
                    c.itoa(c.state)?.to_string()
                }
            }
        };

        let remaining = INTERPOLATION_CAP.saturating_sub(buf.len());
        if remaining == 0 {
            tracing::warn!(cap = INTERPOLATION_CAP, "amend interpolation truncated");
            break;
        }
        if piece.len() <= remaining {
            buf.push_str(&piece);
        } else {
            let mut cut = remaining;
            while cut > 0 && !piece.is_char_boundary(cut) {
                cut -= 1;
            }
            buf.push_str(&piece[..cut]);
            tracing::warn!(cap = INTERPOLATION_CAP, "amend interpolation truncated");
            break;
        }
    }

    Ok(SmolStr::new(buf))
}

/// `pfw_apply`: for each domain, selects the first matching config and —
/// only if the domain's selection changed, or the config's *full*
/// interpolation (its name plus every act's parameters) changed — fires
/// its acts (§4.5, §8 property 5 and scenario d).
///
/// §4.5's prose ties re-fire to the interpolated name alone, but scenario
/// d requires a re-fire when only an act parameter changes (e.g. `Vol`)
/// while the name template doesn't reference that criterion at all.
/// Comparing the full signature — name plus act params — satisfies both:
/// it still re-fires whenever the name changes, and it additionally
/// re-fires when an act's own parameters do. `\0` is used as the joiner
/// since it cannot appear in parsed source text.
pub fn apply(domains: &mut [Domain], criteria: &Criteria, plugins: &mut Plugins) -> Result<()> {
    for domain in domains.iter_mut() {
        for (idx, config) in domain.configs.iter_mut().enumerate() {
            let matched = config.rule.as_ref().is_none_or(|r| rule_match(r, criteria));
            if !matched {
                continue;
            }

            let mut need = false;
            if domain.current != Some(idx) {
                domain.current = Some(idx);
                need = true;
            }

            let name = interpolate(&config.name_template, criteria)?;
            let params = config
                .acts
                .iter()
                .map(|act| interpolate(&act.template, criteria))
                .collect::<Result<Vec<_>>>()?;

            let mut signature = String::from(name.as_str());
            for p in &params {
                signature.push('\0');
                signature.push_str(p);
            }

            if need || config.signature.as_deref() != Some(signature.as_str()) {
                config.current = Some(name.clone());
                config.signature = Some(SmolStr::new(signature));
                tracing::debug!(domain = %domain.name, config = %name, "config selected");
                for (act, params) in config.acts.iter().zip(params) {
                    let plugin = plugins.get_mut(act.plugin);
                    (plugin.callback)(&params);
                    plugin.last_params = Some(params);
                }
            }

            break;
        }
    }
    Ok(())
}

/// §4.5 criterion mutation: assigns the new state, fans it out to every
/// listener (newest-first, per §5), then invokes the save hook. A no-op
/// if `new_state` equals the current state — listeners and the save hook
/// only fire on an actual value change. Does *not* call `apply` —
/// propagation to domains is always explicit.
pub fn set_criterion_state(
    criterion: &mut Criterion,
    new_state: i32,
    on_save: &mut Option<SaveHook>,
) {
    if new_state == criterion.state {
        return;
    }
    criterion.state = new_state;

    let literal = if criterion.kind == CriterionKind::Numerical {
        None
    } else {
        criterion.itoa(new_state).ok()
    };

    for listener in criterion.listeners.iter_mut() {
        (listener.callback)(new_state, literal.as_deref());
    }

    if let Some(hook) = on_save.as_mut() {
        hook(criterion.canonical_name(), new_state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Config, Interval, Plugin};

    fn mode_criterion(state: i32) -> Criterion {
        Criterion {
            names: vec![SmolStr::new("Mode")],
            kind: CriterionKind::Exclusive,
            literals: vec![SmolStr::new("Normal"), SmolStr::new("Loud")],
            intervals: Vec::new(),
            init: 0,
            state,
            listeners: Vec::new(),
        }
    }

    #[test]
    fn empty_all_and_any_are_true() {
        let mut criteria = Criteria::default();
        criteria.push(mode_criterion(0));

        let all = Rule::Branch { combinator: Combinator::All, children: Vec::new() };
        let any = Rule::Branch { combinator: Combinator::Any, children: Vec::new() };
        assert!(rule_match(&all, &criteria));
        assert!(rule_match(&any, &criteria));
    }

    #[test]
    fn leaf_is_predicate() {
        let mut criteria = Criteria::default();
        let id = criteria.push(mode_criterion(1));
        let rule = Rule::Leaf { criterion: id, predicate: Predicate::Is, operand: Operand::Index(1) };
        assert!(rule_match(&rule, &criteria));
        let rule = Rule::Leaf { criterion: id, predicate: Predicate::IsNot, operand: Operand::Index(1) };
        assert!(!rule_match(&rule, &criteria));
    }

    #[test]
    fn interval_predicate() {
        let mut criteria = Criteria::default();
        let vol = Criterion {
            names: vec![SmolStr::new("Vol")],
            kind: CriterionKind::Numerical,
            literals: Vec::new(),
            intervals: vec![Interval::new(0, 10)],
            init: 0,
            state: 7,
            listeners: Vec::new(),
        };
        let id = criteria.push(vol);
        let rule = Rule::Leaf {
            criterion: id,
            predicate: Predicate::In,
            operand: Operand::Interval(Interval::new(0, 10)),
        };
        assert!(rule_match(&rule, &criteria));
    }

    #[test]
    fn interpolation_concatenates_with_no_separator() {
        let mut criteria = Criteria::default();
        let id = criteria.push(mode_criterion(1));
        let amends = vec![Amend::Raw(SmolStr::new("route-")), Amend::Criterion(id)];
        assert_eq!(interpolate(&amends, &criteria).unwrap(), "route-Loud");
    }

    #[test]
    fn interpolation_truncates_silently_past_cap() {
        let mut criteria = Criteria::default();
        criteria.push(mode_criterion(0));
        let amends = vec![Amend::Raw(SmolStr::new(&"x".repeat(600)))];
        let out = interpolate(&amends, &criteria).unwrap();
        assert_eq!(out.len(), INTERPOLATION_CAP);
    }

    #[test]
    fn apply_fires_act_once_then_noop_on_repeat() {
        let mut criteria = Criteria::default();
        let mode_id = criteria.push(mode_criterion(1));

        let mut plugins = Plugins::default();
        let calls = std::sync::Arc::new(std::sync::Mutex::new(Vec::<String>::new()));
        let calls_clone = calls.clone();
        let plugin_id = plugins.push(Plugin {
            name: SmolStr::new("SetParam"),
            callback: Box::new(move |params| calls_clone.lock().unwrap().push(params.to_string())),
            last_params: None,
        });

        let config = Config {
            name_template: vec![Amend::Raw(SmolStr::new("route-")), Amend::Criterion(mode_id)],
            rule: Some(Rule::Leaf {
                criterion: mode_id,
                predicate: Predicate::Is,
                operand: Operand::Index(1),
            }),
            acts: vec![crate::model::Act {
                plugin: plugin_id,
                template: vec![Amend::Raw(SmolStr::new("gain=1"))],
            }],
            current: None,
            signature: None,
        };
        let mut domains = vec![Domain { name: SmolStr::new("Audio"), configs: vec![config], current: None }];

        apply(&mut domains, &criteria, &mut plugins).unwrap();
        apply(&mut domains, &criteria, &mut plugins).unwrap();

        assert_eq!(calls.lock().unwrap().len(), 1);
        assert_eq!(domains[0].configs[0].current.as_deref(), Some("route-Loud"));
    }

    #[test]
    fn apply_refires_when_only_an_act_parameter_changes() {
        let mut criteria = Criteria::default();
        let mode_id = criteria.push(mode_criterion(1));
        let vol_id = criteria.push(Criterion {
            names: vec![SmolStr::new("Vol")],
            kind: CriterionKind::Numerical,
            literals: Vec::new(),
            intervals: vec![Interval::new(0, 10)],
            init: 0,
            state: 7,
            listeners: Vec::new(),
        });

        let mut plugins = Plugins::default();
        let calls = std::sync::Arc::new(std::sync::Mutex::new(Vec::<String>::new()));
        let calls_clone = calls.clone();
        let plugin_id = plugins.push(Plugin {
            name: SmolStr::new("SetParam"),
            callback: Box::new(move |params| calls_clone.lock().unwrap().push(params.to_string())),
            last_params: None,
        });

        let config = Config {
            name_template: vec![Amend::Raw(SmolStr::new("route-")), Amend::Criterion(mode_id)],
            rule: Some(Rule::Leaf {
                criterion: mode_id,
                predicate: Predicate::Is,
                operand: Operand::Index(1),
            }),
            acts: vec![crate::model::Act {
                plugin: plugin_id,
                template: vec![Amend::Raw(SmolStr::new("gain=")), Amend::Criterion(vol_id)],
            }],
            current: None,
            signature: None,
        };
        let mut domains = vec![Domain { name: SmolStr::new("Audio"), configs: vec![config], current: None }];

        apply(&mut domains, &criteria, &mut plugins).unwrap();
        criteria.get_mut(vol_id).state = 8;
        apply(&mut domains, &criteria, &mut plugins).unwrap();
        apply(&mut domains, &criteria, &mut plugins).unwrap();

        assert_eq!(*calls.lock().unwrap(), vec!["gain=7", "gain=8"]);
        assert_eq!(domains[0].configs[0].current.as_deref(), Some("route-Loud"));
    }

    #[test]
    fn set_criterion_state_fans_out_to_listeners_and_save_hook() {
        let mut criterion = mode_criterion(0);
        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::<(i32, Option<String>)>::new()));
        let seen_clone = seen.clone();
        criterion.listeners.push(crate::model::Listener {
            token: crate::model::ListenerToken(1),
            callback: Box::new(move |state, literal| {
                seen_clone.lock().unwrap().push((state, literal.map(str::to_string)))
            }),
        });

        let saved = std::sync::Arc::new(std::sync::Mutex::new(None));
        let saved_clone = saved.clone();
        let mut on_save: Option<SaveHook> =
            Some(Box::new(move |name: &str, state| *saved_clone.lock().unwrap() = Some((name.to_string(), state))));

        set_criterion_state(&mut criterion, 1, &mut on_save);

        assert_eq!(criterion.state, 1);
        assert_eq!(seen.lock().unwrap()[0], (1, Some("Loud".to_string())));
        assert_eq!(saved.lock().unwrap().as_ref().unwrap(), &("Mode".to_string(), 1));
    }

    #[test]
    fn set_criterion_state_is_a_noop_when_state_is_unchanged() {
        let mut criterion = mode_criterion(1);
        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::<i32>::new()));
        let seen_clone = seen.clone();
        criterion.listeners.push(crate::model::Listener {
            token: crate::model::ListenerToken(1),
            callback: Box::new(move |state, _literal| seen_clone.lock().unwrap().push(state)),
        });

        let saved = std::sync::Arc::new(std::sync::Mutex::new(false));
        let saved_clone = saved.clone();
        let mut on_save: Option<SaveHook> =
            Some(Box::new(move |_name: &str, _state| *saved_clone.lock().unwrap() = true));

        set_criterion_state(&mut criterion, 1, &mut on_save);

        assert!(seen.lock().unwrap().is_empty());
        assert!(!*saved.lock().unwrap());
    }
}
