//! Parses the criteria file (§4.2, §6 `criterion` grammar) into
//! [`ParsedCriterion`] descriptors. Purely syntactic — names are not yet
//! resolved, and `default` is still the raw token following `=`.

use smol_str::SmolStr;

use crate::ast::{CriterionKind, ParsedCriterion, ParsedInterval, ParsedRange};
use crate::error::{Location, PfwError, Result};
use crate::lexer::{Depth, LexicalContext};

/// §3: Inclusive criteria carry at most 31 literals.
const MAX_INCLUSIVE_LITERALS: usize = 31;

pub fn parse_criteria(ctx: &mut LexicalContext) -> Result<Vec<ParsedCriterion>> {
    let mut out = Vec::new();
    loop {
        match ctx.depth() {
            Depth::Eof => break,
            Depth::Level(0) => out.push(parse_one(ctx)?),
            Depth::Level(_) => {
                return Err(PfwError::parse(
                    Location::new(ctx.line_number()),
                    "criteria must all be declared at depth 0",
                ));
            }
        }
    }
    tracing::debug!(count = out.len(), "parsed criteria file");
    Ok(out)
}

fn parse_one(ctx: &mut LexicalContext) -> Result<ParsedCriterion> {
    let line = ctx.line_number();

    let kind_word = ctx.take_word().ok_or_else(|| {
        PfwError::parse(Location::new(line), "criterion starts with nothing")
    })?;
    let kind = CriterionKind::from_keyword(kind_word).ok_or_else(|| {
        PfwError::parse(Location::new(line), format!("unknown criterion kind '{kind_word}'"))
    })?;

    let mut names = Vec::new();
    loop {
        let word = ctx.take_word().ok_or_else(|| {
            PfwError::parse(Location::new(line), "criterion has no ranges after its names")
        })?;
        if word == ":" {
            break;
        }
        names.push(SmolStr::new(word));
    }
    if names.is_empty() {
        return Err(PfwError::parse(Location::new(line), "criterion declares no names"));
    }

    let mut ranges = Vec::new();
    let mut default = None;
    loop {
        let Some(word) = ctx.take_word() else { break };

        if word == "=" {
            let value = ctx
                .take_word()
                .ok_or_else(|| PfwError::parse(Location::new(line), "'=' has no default value"))?;
            default = Some(SmolStr::new(value));
            break;
        }

        if kind == CriterionKind::Inclusive && ranges.len() >= MAX_INCLUSIVE_LITERALS {
            return Err(PfwError::parse(
                Location::new(line),
                format!("InclusiveCriterion declares more than {MAX_INCLUSIVE_LITERALS} literals"),
            ));
        }

        ranges.push(if kind == CriterionKind::Numerical {
            ParsedRange::Interval(parse_interval(word, line)?)
        } else {
            ParsedRange::Literal(SmolStr::new(word))
        });
    }
    if ranges.is_empty() {
        return Err(PfwError::parse(Location::new(line), "criterion declares no ranges"));
    }

    ctx.take_line()?;

    Ok(ParsedCriterion { kind, names, ranges, default })
}

/// §11: trial order `[a,b]`, then `[a,]`, then `[,b]`, then a bare
/// integer — tried in that exact order so e.g. `[5,]` is never misread.
fn parse_interval(word: &str, line: u32) -> Result<ParsedInterval> {
    if let Some(inner) = word.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
        if let Some((l, r)) = inner.split_once(',') {
            let left = match l {
                "" => None,
                _ => Some(parse_decimal(l, line)?),
            };
            let right = match r {
                "" => None,
                _ => Some(parse_decimal(r, line)?),
            };
            return Ok(ParsedInterval { left, right });
        }
        return Err(PfwError::parse(Location::new(line), format!("malformed interval '{word}'")));
    }

    let v = parse_decimal(word, line)?;
    Ok(ParsedInterval { left: Some(v), right: Some(v) })
}

fn parse_decimal(s: &str, line: u32) -> Result<i32> {
    s.parse::<i32>()
        .map_err(|_| PfwError::parse(Location::new(line), format!("'{s}' is not an integer")))
}
