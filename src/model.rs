//! Resolved, sanitized model (§3, §4.3): the tree [`crate::sanitizer`]
//! produces from the unresolved [`crate::ast`] tree, and
//! [`crate::engine`]/[`crate::system`] operate on.
//!
//! Criteria and plugins live in flat arenas with stable `Copy` indices
//! (`CriterionId`, `PluginId`); rules and acts hold indices rather than
//! references, so the whole tree is free of lifetimes and cheap to move
//! around behind the system-wide mutex (§5, §9).

use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use crate::error::{PfwError, Result};

pub use crate::ast::{Combinator, CriterionKind, Predicate};

/// Parses a signed 32-bit integer the way the original C `strtol(word, NULL,
/// 0)` does: optional sign, `0x`/`0X` hex, a leading `0` for octal,
/// otherwise decimal (§4.4 Numerical `atoi`).
pub(crate) fn parse_auto_base(s: &str) -> Option<i32> {
    let s = s.trim();
    let (neg, s) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let (radix, digits) = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        (16, hex)
    } else if s.len() > 1 && s.starts_with('0') {
        (8, &s[1..])
    } else {
        (10, s)
    };
    if digits.is_empty() {
        return None;
    }
    let magnitude = i64::from_str_radix(digits, radix).ok()?;
    let signed = if neg { -magnitude } else { magnitude };
    i32::try_from(signed).ok()
}

/// Stable index of a criterion within a [`System`](crate::system::System).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CriterionId(pub(crate) u32);

/// Stable index of a registered plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PluginId(pub(crate) u32);

/// Opaque token returned by `subscribe`, required by `unsubscribe` (§9:
/// "avoid intrusive linked-list patterns — model as a collection keyed by
/// stable opaque token").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerToken(pub(crate) u64);

/// A closed integer interval, bounds already resolved to `i32::MIN`/`MAX`
/// for the unbounded forms (§3 Interval).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub left: i32,
    pub right: i32,
}

impl Interval {
    pub fn new(left: i32, right: i32) -> Self {
        Self { left, right }
    }

    pub fn contains(&self, v: i32) -> bool {
        v >= self.left && v <= self.right
    }
}

/// A resolved rule-leaf operand: an `Exclusive` index, an `Inclusive`
/// bitmask, or a `Numerical` interval, matching the predicate table in §3.
#[derive(Debug, Clone, Copy)]
pub enum Operand {
    Index(i32),
    Mask(u32),
    Interval(Interval),
}

/// A node of the resolved rule tree; leaves reference criteria by id.
#[derive(Debug, Clone)]
pub enum Rule {
    Branch {
        combinator: Combinator,
        children: Vec<Rule>,
    },
    Leaf {
        criterion: CriterionId,
        predicate: Predicate,
        operand: Operand,
    },
}

/// A resolved amend token: a raw string copied verbatim, or a criterion
/// whose current state is interpolated in (§4.5).
#[derive(Debug, Clone)]
pub enum Amend {
    Raw(SmolStr),
    Criterion(CriterionId),
}

/// A resolved act: plugin id plus parameter template.
#[derive(Debug, Clone)]
pub struct Act {
    pub plugin: PluginId,
    pub template: Vec<Amend>,
}

/// A resolved `conf:` entry. `current` caches the last interpolated name
/// (what `dump` shows); `signature` caches a fingerprint of the name plus
/// every act's interpolated parameters, so repeated `apply` calls can
/// detect "nothing relevant changed" even when the name itself didn't
/// change but an act parameter did (§8 property 5, scenario d).
#[derive(Debug, Clone)]
pub struct Config {
    pub name_template: Vec<Amend>,
    pub rule: Option<Rule>,
    pub acts: Vec<Act>,
    pub current: Option<SmolStr>,
    pub(crate) signature: Option<SmolStr>,
}

/// A resolved domain: an ordered list of configs and the index of the
/// config selected at the last `apply` (§3 Domain invariant).
#[derive(Debug, Clone)]
pub struct Domain {
    pub name: SmolStr,
    pub configs: Vec<Config>,
    pub current: Option<usize>,
}

/// A subscription to one criterion's state changes. Listener lists are
/// newest-first because `subscribe` prepends (§5 ordering guarantees).
pub struct Listener {
    pub token: ListenerToken,
    pub callback: Box<dyn FnMut(i32, Option<&str>) + Send>,
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener").field("token", &self.token).finish_non_exhaustive()
    }
}

/// A resolved criterion: aliases, kind-dependent ranges, current/initial
/// state, and its listener list.
#[derive(Debug)]
pub struct Criterion {
    pub names: Vec<SmolStr>,
    pub kind: CriterionKind,
    /// Range literals, for Exclusive/Inclusive. Index *is* the Exclusive
    /// state value / the Inclusive bit position.
    pub literals: Vec<SmolStr>,
    /// Range intervals, for Numerical.
    pub intervals: Vec<Interval>,
    pub init: i32,
    pub state: i32,
    pub listeners: Vec<Listener>,
}

impl Criterion {
    pub fn canonical_name(&self) -> &str {
        &self.names[0]
    }

    /// §4.4 `atoi`: converts a textual value to this criterion's integer
    /// state, per its kind.
    pub fn atoi(&self, text: &str) -> Result<i32> {
        match self.kind {
            CriterionKind::Numerical => parse_auto_base(text).ok_or_else(|| {
                PfwError::bad_argument(format!("'{text}' is not a valid integer"))
            }),
            CriterionKind::Exclusive => self
                .literals
                .iter()
                .position(|l| l == text)
                .map(|i| i as i32)
                .ok_or_else(|| {
                    PfwError::bad_argument(format!("'{text}' is not a literal of this criterion"))
                }),
            CriterionKind::Inclusive => {
                if text == "<none>" {
                    return Ok(0);
                }
                let mut mask = 0u32;
                for token in text.split('|') {
                    let i = self.literals.iter().position(|l| l == token).ok_or_else(|| {
                        PfwError::bad_argument(format!(
                            "'{token}' is not a literal of this criterion"
                        ))
                    })?;
                    mask |= 1 << i;
                }
                Ok(mask as i32)
            }
        }
    }

    /// §4.4 `itoa`: converts an integer state back to text, per kind.
    pub fn itoa(&self, state: i32) -> Result<SmolStr> {
        match self.kind {
            CriterionKind::Numerical => Ok(SmolStr::new(state.to_string())),
            CriterionKind::Exclusive => usize::try_from(state)
                .ok()
                .filter(|&i| i < self.literals.len())
                .map(|i| self.literals[i].clone())
                .ok_or_else(|| PfwError::bad_argument(format!("state {state} is out of range"))),
            CriterionKind::Inclusive => {
                let mask = state as u32;
                if mask == 0 {
                    return Ok(SmolStr::new("<none>"));
                }
                let mut parts = Vec::new();
                for i in 0..=30u32 {
                    if mask & (1 << i) != 0 {
                        let lit = self.literals.get(i as usize).ok_or_else(|| {
                            PfwError::bad_argument(format!("bit {i} has no literal"))
                        })?;
                        parts.push(lit.as_str());
                    }
                }
                Ok(SmolStr::from(parts.join("|")))
            }
        }
    }

    /// §4.4 validity check: `state` must be representable by `itoa` for
    /// Exclusive/Inclusive, and must fall in one of `intervals` for
    /// Numerical.
    pub fn is_valid(&self, state: i32) -> bool {
        match self.kind {
            CriterionKind::Numerical => self.intervals.iter().any(|iv| iv.contains(state)),
            CriterionKind::Exclusive | CriterionKind::Inclusive => self.itoa(state).is_ok(),
        }
    }
}

/// Arena of criteria plus the global alias → id index built during
/// sanitization (§4.3 check 3).
#[derive(Debug, Default)]
pub struct Criteria {
    entries: Vec<Criterion>,
    by_alias: FxHashMap<SmolStr, CriterionId>,
}

impl Criteria {
    pub fn push(&mut self, criterion: Criterion) -> CriterionId {
        let id = CriterionId(self.entries.len() as u32);
        for name in &criterion.names {
            self.by_alias.insert(name.clone(), id);
        }
        self.entries.push(criterion);
        id
    }

    pub fn resolve(&self, alias: &str) -> Option<CriterionId> {
        self.by_alias.get(alias).copied()
    }

    pub fn get(&self, id: CriterionId) -> &Criterion {
        &self.entries[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: CriterionId) -> &mut Criterion {
        &mut self.entries[id.0 as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = (CriterionId, &Criterion)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, c)| (CriterionId(i as u32), c))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A registered plugin: its name, the host callback, and the last
/// parameter string it was invoked with.
pub struct Plugin {
    pub name: SmolStr,
    pub callback: Box<dyn FnMut(&str) + Send>,
    pub last_params: Option<SmolStr>,
}

impl std::fmt::Debug for Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plugin")
            .field("name", &self.name)
            .field("last_params", &self.last_params)
            .finish_non_exhaustive()
    }
}

/// Arena of registered plugins plus the name → id index (§11: plugin
/// names are unique at registration, before any settings file is read).
#[derive(Debug, Default)]
pub struct Plugins {
    entries: Vec<Plugin>,
    by_name: FxHashMap<SmolStr, PluginId>,
}

impl Plugins {
    pub fn push(&mut self, plugin: Plugin) -> PluginId {
        let id = PluginId(self.entries.len() as u32);
        self.by_name.insert(plugin.name.clone(), id);
        self.entries.push(plugin);
        id
    }

    pub fn resolve(&self, name: &str) -> Option<PluginId> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, id: PluginId) -> &Plugin {
        &self.entries[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: PluginId) -> &mut Plugin {
        &mut self.entries[id.0 as usize]
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }
}
