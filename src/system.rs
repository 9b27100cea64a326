//! The public surface (§4.6): construction/teardown and every mutation
//! and query entry point, all serialized behind one mutex (§5).

use std::fs;
use std::path::Path;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use crate::engine;
use crate::error::{PfwError, Result};
use crate::lexer::LexicalContext;
use crate::model::{
    Criteria, CriterionId, CriterionKind, Domain, Listener, ListenerToken, Plugin, Plugins,
};
use crate::parser;
use crate::sanitizer;

/// Invoked once per criterion during construction, letting the host
/// override the state read from the criteria/settings files (e.g. from
/// persisted storage). Mutates the proposed initial state in place.
pub type LoadHook = Box<dyn FnMut(&str, &mut i32) + Send>;

/// Invoked after every successful state change, so the host can persist
/// the new value under the criterion's canonical name.
pub type SaveHook = Box<dyn FnMut(&str, i32) + Send>;

/// Invoked once, synchronously, at the end of [`System::destroy`].
pub type ReleaseHook = Box<dyn FnOnce() + Send>;

/// One plugin registration: a unique name plus the callback `apply` fires
/// with interpolated parameters (§4.6, §11 — names must be unique at
/// registration, before any settings file is parsed).
pub struct PluginDef {
    pub name: SmolStr,
    pub callback: Box<dyn FnMut(&str) + Send>,
}

impl PluginDef {
    pub fn new(name: impl Into<SmolStr>, callback: impl FnMut(&str) + Send + 'static) -> Self {
        Self { name: name.into(), callback: Box::new(callback) }
    }
}

struct SystemState {
    criteria: Criteria,
    domains: Vec<Domain>,
    plugins: Plugins,
    on_save: Option<SaveHook>,
    next_listener_token: u64,
    listener_owners: FxHashMap<ListenerToken, CriterionId>,
}

fn unknown_criterion(name: &str) -> PfwError {
    PfwError::bad_argument(format!("unknown criterion '{name}'"))
}

/// The top-level handle (§3 System). Every method locks `inner` for its
/// whole duration, including any plugin/listener/save-hook callbacks it
/// triggers — callbacks must not call back into the same `System` (§5).
pub struct System {
    inner: Mutex<SystemState>,
}

impl System {
    /// Reads and parses both input files, registers `plugin_defs`, and
    /// sanitizes the result into a ready-to-use system. Construction is
    /// all-or-nothing: any failure leaves nothing behind (§4.3).
    pub fn create(
        criteria_path: impl AsRef<Path>,
        settings_path: impl AsRef<Path>,
        plugin_defs: Vec<PluginDef>,
        mut on_load: Option<LoadHook>,
        on_save: Option<SaveHook>,
    ) -> Result<Self> {
        let mut plugins = Plugins::default();
        for def in plugin_defs {
            if plugins.contains_name(&def.name) {
                let err =
                    PfwError::bad_argument(format!("duplicate plugin name '{}'", def.name));
                tracing::error!(%err, "aborting system construction");
                return Err(err);
            }
            plugins.push(Plugin { name: def.name, callback: def.callback, last_params: None });
        }

        let criteria_text = fs::read_to_string(criteria_path.as_ref()).map_err(|e| {
            let err = PfwError::bad_argument(format!(
                "cannot read criteria file '{}': {e}",
                criteria_path.as_ref().display()
            ));
            tracing::error!(%err, "aborting system construction");
            err
        })?;
        let settings_text = fs::read_to_string(settings_path.as_ref()).map_err(|e| {
            let err = PfwError::bad_argument(format!(
                "cannot read settings file '{}': {e}",
                settings_path.as_ref().display()
            ));
            tracing::error!(%err, "aborting system construction");
            err
        })?;

        let log_abort = |e: &PfwError| tracing::error!(%e, "aborting system construction");

        let mut criteria_ctx = LexicalContext::new(&criteria_text).inspect_err(log_abort)?;
        let parsed_criteria = parser::parse_criteria(&mut criteria_ctx).inspect_err(log_abort)?;

        let mut settings_ctx = LexicalContext::new(&settings_text).inspect_err(log_abort)?;
        let parsed_domains = parser::parse_settings(&mut settings_ctx).inspect_err(log_abort)?;

        let criteria = sanitizer::sanitize_criteria(parsed_criteria, &mut on_load)?;
        let domains = sanitizer::sanitize_settings(parsed_domains, &criteria, &plugins)?;

        tracing::debug!(
            criteria = criteria.len(),
            domains = domains.len(),
            "system constructed"
        );

        Ok(Self {
            inner: Mutex::new(SystemState {
                criteria,
                domains,
                plugins,
                on_save,
                next_listener_token: 0,
                listener_owners: FxHashMap::default(),
            }),
        })
    }

    /// Consumes the handle, running `on_release` once the lock (implicitly
    /// held by no one else, since `self` is owned) has been dropped.
    /// Idempotence-on-null-handle from §4.6 has no runtime analogue here:
    /// there is no way to call `destroy` twice on a value that's moved.
    pub fn destroy(self, on_release: Option<ReleaseHook>) {
        drop(self.inner);
        if let Some(release) = on_release {
            release();
        }
    }

    /// §4.5 `apply`: re-evaluates every domain's rules and fires any acts
    /// whose config selection or interpolated name actually changed.
    pub fn apply(&self) -> Result<()> {
        let mut state = self.inner.lock();
        let SystemState { domains, criteria, plugins, .. } = &mut *state;
        engine::apply(domains, criteria, plugins)
    }

    /// Sets a criterion's state directly, rejecting unknown names and
    /// integers outside the criterion's legal range. Does not call `apply`.
    pub fn setint(&self, name: &str, value: i32) -> Result<()> {
        let mut guard = self.inner.lock();
        let id = guard.criteria.resolve(name).ok_or_else(|| unknown_criterion(name))?;
        if !guard.criteria.get(id).is_valid(value) {
            return Err(PfwError::bad_argument(format!(
                "{value} is not a legal state for '{name}'"
            )));
        }
        let SystemState { criteria, on_save, .. } = &mut *guard;
        engine::set_criterion_state(criteria.get_mut(id), value, on_save);
        Ok(())
    }

    /// Converts `value` with the criterion's `atoi` then sets it directly,
    /// same as [`System::setint`] but from text.
    pub fn setstring(&self, name: &str, value: &str) -> Result<()> {
        let mut guard = self.inner.lock();
        let id = guard.criteria.resolve(name).ok_or_else(|| unknown_criterion(name))?;
        let state = guard.criteria.get(id).atoi(value)?;
        let SystemState { criteria, on_save, .. } = &mut *guard;
        engine::set_criterion_state(criteria.get_mut(id), state, on_save);
        Ok(())
    }

    /// Sets the bits named in `value` (an Inclusive criterion only),
    /// leaving the rest of the mask untouched.
    pub fn include(&self, name: &str, value: &str) -> Result<()> {
        self.adjust_inclusive(name, value, |state, mask| state | mask)
    }

    /// Clears the bits named in `value` (an Inclusive criterion only).
    pub fn exclude(&self, name: &str, value: &str) -> Result<()> {
        self.adjust_inclusive(name, value, |state, mask| state & !mask)
    }

    fn adjust_inclusive(
        &self,
        name: &str,
        value: &str,
        f: impl FnOnce(u32, u32) -> u32,
    ) -> Result<()> {
        let mut guard = self.inner.lock();
        let id = guard.criteria.resolve(name).ok_or_else(|| unknown_criterion(name))?;
        let criterion = guard.criteria.get(id);
        if criterion.kind != CriterionKind::Inclusive {
            return Err(PfwError::wrong_kind(format!("'{name}' is not an Inclusive criterion")));
        }
        let mask = criterion.atoi(value)? as u32;
        let new_state = f(criterion.state as u32, mask) as i32;
        let SystemState { criteria, on_save, .. } = &mut *guard;
        engine::set_criterion_state(criteria.get_mut(id), new_state, on_save);
        Ok(())
    }

    /// Increments a Numerical criterion's state by one, rejecting the step
    /// if it would leave every declared interval.
    pub fn increase(&self, name: &str) -> Result<()> {
        self.step(name, 1)
    }

    /// Decrements a Numerical criterion's state by one, same constraints
    /// as [`System::increase`].
    pub fn decrease(&self, name: &str) -> Result<()> {
        self.step(name, -1)
    }

    fn step(&self, name: &str, delta: i32) -> Result<()> {
        let mut guard = self.inner.lock();
        let id = guard.criteria.resolve(name).ok_or_else(|| unknown_criterion(name))?;
        let criterion = guard.criteria.get(id);
        if criterion.kind != CriterionKind::Numerical {
            return Err(PfwError::wrong_kind(format!("'{name}' is not a Numerical criterion")));
        }
        let new_state = criterion
            .state
            .checked_add(delta)
            .ok_or_else(|| PfwError::bad_argument("integer overflow"))?;
        if !criterion.is_valid(new_state) {
            return Err(PfwError::bad_argument(format!(
                "{new_state} is outside '{name}' legal intervals"
            )));
        }
        let SystemState { criteria, on_save, .. } = &mut *guard;
        engine::set_criterion_state(criteria.get_mut(id), new_state, on_save);
        Ok(())
    }

    /// Restores a criterion to the initial state computed at construction.
    pub fn reset(&self, name: &str) -> Result<()> {
        let mut guard = self.inner.lock();
        let id = guard.criteria.resolve(name).ok_or_else(|| unknown_criterion(name))?;
        let init = guard.criteria.get(id).init;
        let SystemState { criteria, on_save, .. } = &mut *guard;
        engine::set_criterion_state(criteria.get_mut(id), init, on_save);
        Ok(())
    }

    /// Reads a criterion's current integer state.
    pub fn getint(&self, name: &str) -> Result<i32> {
        let guard = self.inner.lock();
        let id = guard.criteria.resolve(name).ok_or_else(|| unknown_criterion(name))?;
        Ok(guard.criteria.get(id).state)
    }

    /// Reads a criterion's current state as text (`itoa`). Rejected for
    /// Numerical criteria, which have no literal form.
    pub fn getstring(&self, name: &str) -> Result<SmolStr> {
        let guard = self.inner.lock();
        let id = guard.criteria.resolve(name).ok_or_else(|| unknown_criterion(name))?;
        let criterion = guard.criteria.get(id);
        if criterion.kind == CriterionKind::Numerical {
            return Err(PfwError::wrong_kind(format!("'{name}' is Numerical; use getint instead")));
        }
        criterion.itoa(criterion.state)
    }

    /// Returns a Numerical criterion's single declared interval. Fails
    /// with `NotImplemented` if it has zero or more than one.
    pub fn getrange(&self, name: &str) -> Result<(i32, i32)> {
        let guard = self.inner.lock();
        let id = guard.criteria.resolve(name).ok_or_else(|| unknown_criterion(name))?;
        let criterion = guard.criteria.get(id);
        if criterion.kind != CriterionKind::Numerical {
            return Err(PfwError::wrong_kind(format!("'{name}' is not a Numerical criterion")));
        }
        match criterion.intervals.as_slice() {
            [iv] => Ok((iv.left, iv.right)),
            other => Err(PfwError::not_implemented(format!(
                "'{name}' has {} intervals; getrange requires exactly one",
                other.len()
            ))),
        }
    }

    /// Tests whether an Inclusive criterion's current state includes every
    /// bit named in `value`.
    pub fn contain(&self, name: &str, value: &str) -> Result<bool> {
        let guard = self.inner.lock();
        let id = guard.criteria.resolve(name).ok_or_else(|| unknown_criterion(name))?;
        let criterion = guard.criteria.get(id);
        if criterion.kind != CriterionKind::Inclusive {
            return Err(PfwError::wrong_kind(format!("'{name}' is not an Inclusive criterion")));
        }
        let mask = criterion.atoi(value)? as u32;
        Ok(criterion.state as u32 & mask != 0)
    }

    /// Registers a listener on a criterion's state changes, returning a
    /// token for later [`System::unsubscribe`]. New listeners fire first
    /// (§5).
    pub fn subscribe(
        &self,
        name: &str,
        callback: impl FnMut(i32, Option<&str>) + Send + 'static,
    ) -> Result<ListenerToken> {
        let mut guard = self.inner.lock();
        let id = guard.criteria.resolve(name).ok_or_else(|| unknown_criterion(name))?;
        guard.next_listener_token += 1;
        let token = ListenerToken(guard.next_listener_token);
        guard.listener_owners.insert(token, id);
        guard.criteria.get_mut(id).listeners.insert(0, Listener { token, callback: Box::new(callback) });
        Ok(token)
    }

    /// Removes a listener. Silently does nothing for an unknown or
    /// already-removed token.
    pub fn unsubscribe(&self, token: ListenerToken) {
        let mut guard = self.inner.lock();
        let Some(id) = guard.listener_owners.remove(&token) else {
            return;
        };
        guard.criteria.get_mut(id).listeners.retain(|l| l.token != token);
    }

    /// Renders the human-readable criteria/domains table (§4.6 `dump`).
    pub fn dump(&self) -> String {
        let guard = self.inner.lock();
        crate::dump::dump(&guard.criteria, &guard.domains)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    const CRITERIA: &str = "ExclusiveCriterion Mode Normal Loud : Normal Loud = Normal\n";
    const SETTINGS: &str =
        "domain: Audio\n\tconf: route-%Mode%\n\t\tMode Is Loud\n\t\tSetParam = vol=11\n\tconf: route-default\n";

    fn build() -> System {
        let criteria_file = write_temp(CRITERIA);
        let settings_file = write_temp(SETTINGS);
        let calls: std::sync::Arc<std::sync::Mutex<Vec<String>>> = Default::default();
        let calls_clone = calls.clone();
        let plugins = vec![PluginDef::new("SetParam", move |params: &str| {
            calls_clone.lock().unwrap().push(params.to_string());
        })];
        System::create(criteria_file.path(), settings_file.path(), plugins, None, None).unwrap()
    }

    #[test]
    fn create_setint_getint_roundtrip() {
        let sys = build();
        assert_eq!(sys.getint("Mode").unwrap(), 0);
        sys.setint("Mode", 1).unwrap();
        assert_eq!(sys.getint("Mode").unwrap(), 1);
        assert_eq!(sys.getstring("Mode").unwrap(), "Loud");
    }

    #[test]
    fn setint_rejects_out_of_range_state() {
        let sys = build();
        assert!(sys.setint("Mode", 99).is_err());
    }

    #[test]
    fn apply_fires_act_once() {
        let sys = build();
        sys.setint("Mode", 1).unwrap();
        sys.apply().unwrap();
        sys.apply().unwrap();
        let text = sys.dump();
        assert!(text.contains("route-Loud"));
    }

    #[test]
    fn unknown_criterion_is_bad_argument() {
        let sys = build();
        let err = sys.getint("Nope").unwrap_err();
        assert!(matches!(err, PfwError::BadArgument(_)));
    }

    #[test]
    fn subscribe_then_unsubscribe_stops_delivery() {
        let sys = build();
        let seen: std::sync::Arc<std::sync::Mutex<Vec<i32>>> = Default::default();
        let seen_clone = seen.clone();
        let token = sys.subscribe("Mode", move |state, _| seen_clone.lock().unwrap().push(state)).unwrap();
        sys.setint("Mode", 1).unwrap();
        sys.unsubscribe(token);
        sys.setint("Mode", 0).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![1]);
    }

    #[test]
    fn destroy_runs_release_hook() {
        let sys = build();
        let released = std::sync::Arc::new(std::sync::Mutex::new(false));
        let released_clone = released.clone();
        sys.destroy(Some(Box::new(move || *released_clone.lock().unwrap() = true)));
        assert!(*released.lock().unwrap());
    }

    #[test]
    fn duplicate_plugin_names_are_rejected_at_create() {
        let criteria_file = write_temp(CRITERIA);
        let settings_file = write_temp(SETTINGS);
        let plugins = vec![
            PluginDef::new("SetParam", |_: &str| {}),
            PluginDef::new("SetParam", |_: &str| {}),
        ];
        let err = System::create(criteria_file.path(), settings_file.path(), plugins, None, None)
            .unwrap_err();
        assert!(matches!(err, PfwError::BadArgument(_)));
    }
}
