//! Unresolved syntax tree produced by [`crate::parser`] (§4.2).
//!
//! Everything here is purely syntactic: criterion and plugin references
//! are still bare names. [`crate::sanitizer`] resolves them into the
//! arena-indexed tree in [`crate::model`].

use smol_str::SmolStr;

/// The three criterion kinds (§3), keyed off the criteria-file keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CriterionKind {
    Exclusive,
    Inclusive,
    Numerical,
}

impl CriterionKind {
    pub fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "ExclusiveCriterion" => Some(Self::Exclusive),
            "InclusiveCriterion" => Some(Self::Inclusive),
            "NumericalCriterion" => Some(Self::Numerical),
            _ => None,
        }
    }
}

/// One parsed `[a,b]` / `[a,]` / `[,b]` / bare-int range, left unresolved
/// (bounds are still `Option`; §4.4 fills in `i32::MIN`/`MAX`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedInterval {
    pub left: Option<i32>,
    pub right: Option<i32>,
}

/// A single `<rangeN>` token: a bare literal for Exclusive/Inclusive, an
/// interval spec for Numerical.
#[derive(Debug, Clone)]
pub enum ParsedRange {
    Literal(SmolStr),
    Interval(ParsedInterval),
}

/// A criterion as written in the criteria file, before sanitization.
///
/// `default` is the raw token following `=`, still unconverted — for
/// Inclusive this may be a `|`-joined list or the `<none>` sentinel, for
/// everything else a single literal or decimal integer. §11 notes this
/// is always exactly one whitespace-delimited word.
#[derive(Debug, Clone)]
pub struct ParsedCriterion {
    pub kind: CriterionKind,
    pub names: Vec<SmolStr>,
    pub ranges: Vec<ParsedRange>,
    pub default: Option<SmolStr>,
}

/// A rule-leaf predicate (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Predicate {
    Is,
    IsNot,
    Includes,
    Excludes,
    In,
    NotIn,
}

impl Predicate {
    pub fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "Is" => Some(Self::Is),
            "IsNot" => Some(Self::IsNot),
            "Includes" => Some(Self::Includes),
            "Excludes" => Some(Self::Excludes),
            "In" => Some(Self::In),
            "NotIn" => Some(Self::NotIn),
            _ => None,
        }
    }
}

/// A rule branch's combinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    All,
    Any,
}

impl Combinator {
    pub fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "ALL" => Some(Self::All),
            "ANY" => Some(Self::Any),
            _ => None,
        }
    }
}

/// A leaf's right-hand operand, still as written (a literal name for
/// Is/IsNot/Includes/Excludes, an interval for In/NotIn).
#[derive(Debug, Clone)]
pub enum RuleOperand {
    Literal(SmolStr),
    Interval(ParsedInterval),
}

/// A node of the rule tree (§3, §6 grammar), with criteria still named by
/// string.
#[derive(Debug, Clone)]
pub enum ParsedRule {
    Branch {
        combinator: Combinator,
        children: Vec<ParsedRule>,
    },
    Leaf {
        criterion: SmolStr,
        predicate: Predicate,
        operand: RuleOperand,
    },
}

/// An act line: `<PluginName> = <amend-template>`, template still as raw
/// `%`-split tokens (classified into raw/criterion amends by the
/// sanitizer).
#[derive(Debug, Clone)]
pub struct ParsedAct {
    pub plugin: SmolStr,
    pub template: Vec<SmolStr>,
}

/// A `conf:` block: its name template, optional rule (absent means
/// "always matches"), and its acts in declaration order.
#[derive(Debug, Clone)]
pub struct ParsedConfig {
    pub name_template: Vec<SmolStr>,
    pub rule: Option<ParsedRule>,
    pub acts: Vec<ParsedAct>,
}

/// A `domain:` block.
#[derive(Debug, Clone)]
pub struct ParsedDomain {
    pub name: SmolStr,
    pub configs: Vec<ParsedConfig>,
}
