//! Parses the settings file (§4.2, §6 `domain` grammar) into
//! [`ParsedDomain`] trees: domain → config → (rule tree, acts).

use smol_str::SmolStr;

use crate::ast::{
    Combinator, ParsedAct, ParsedConfig, ParsedDomain, ParsedInterval, ParsedRule, Predicate,
    RuleOperand,
};
use crate::error::{Location, PfwError, Result};
use crate::lexer::{Depth, LexicalContext};

pub fn parse_settings(ctx: &mut LexicalContext) -> Result<Vec<ParsedDomain>> {
    let mut out = Vec::new();
    loop {
        match ctx.depth() {
            Depth::Eof => break,
            Depth::Level(0) => out.push(parse_domain(ctx)?),
            Depth::Level(_) => {
                return Err(PfwError::parse(
                    Location::new(ctx.line_number()),
                    "a domain must start at depth 0",
                ));
            }
        }
    }
    tracing::debug!(count = out.len(), "parsed settings file");
    Ok(out)
}

fn parse_domain(ctx: &mut LexicalContext) -> Result<ParsedDomain> {
    let line = ctx.line_number();

    let keyword = ctx
        .take_word()
        .ok_or_else(|| PfwError::parse(Location::new(line), "domain starts with nothing"))?;
    if keyword != "domain:" {
        return Err(PfwError::parse(
            Location::new(line),
            format!("domain should start with 'domain:', found '{keyword}'"),
        ));
    }

    let name = ctx
        .take_word()
        .ok_or_else(|| PfwError::parse(Location::new(line), "domain has no name"))?;
    let name = SmolStr::new(name);
    ctx.take_line()?;

    let mut configs = Vec::new();
    while matches!(ctx.depth(), Depth::Level(1)) {
        configs.push(parse_config(ctx)?);
    }

    Ok(ParsedDomain { name, configs })
}

fn parse_config(ctx: &mut LexicalContext) -> Result<ParsedConfig> {
    let line = ctx.line_number();

    let keyword = ctx
        .take_word()
        .ok_or_else(|| PfwError::parse(Location::new(line), "config starts with nothing"))?;
    if keyword != "conf:" {
        return Err(PfwError::parse(
            Location::new(line),
            format!("config should start with 'conf:', found '{keyword}'"),
        ));
    }

    let name_template = parse_amend_template(ctx)?;
    let rule = parse_rule(ctx, 2)?;

    let mut acts = Vec::new();
    while matches!(ctx.depth(), Depth::Level(2)) {
        acts.push(parse_act(ctx)?);
    }

    Ok(ParsedConfig { name_template, rule, acts })
}

fn parse_act(ctx: &mut LexicalContext) -> Result<ParsedAct> {
    let line = ctx.line_number();

    let plugin = ctx
        .take_word()
        .ok_or_else(|| PfwError::parse(Location::new(line), "act has no plugin name"))?;
    let plugin = SmolStr::new(plugin);

    let eq = ctx
        .take_word()
        .ok_or_else(|| PfwError::parse(Location::new(line), "act is missing '='"))?;
    if eq != "=" {
        return Err(PfwError::parse(
            Location::new(line),
            format!("act should use '=', found '{eq}'"),
        ));
    }

    let template = parse_amend_template(ctx)?;
    Ok(ParsedAct { plugin, template })
}

/// A rule subtree line: `ALL`/`ANY` (branch, children at `depth + 1`), or
/// a leaf `<CriterionName> <Predicate> <State>`. Returns `None` if the
/// current line isn't at the expected depth, or doesn't look like a rule
/// node at all — the latter happens when a rule-less `conf:` is
/// immediately followed by its acts, which share the same depth and are
/// otherwise indistinguishable without looking past the first word.
/// The caller reads `None` as "no (more) rule nodes here".
fn parse_rule(ctx: &mut LexicalContext, depth: u32) -> Result<Option<ParsedRule>> {
    if !ctx.depth().is(depth) {
        return Ok(None);
    }

    let line = ctx.line_number();
    let mut lookahead = ctx.remaining().split_whitespace();
    let Some(first) = lookahead.next() else { return Ok(None) };

    if let Some(combinator) = Combinator::from_keyword(first) {
        ctx.take_word();
        ctx.take_line()?;
        let mut children = Vec::new();
        while let Some(child) = parse_rule(ctx, depth + 1)? {
            children.push(child);
        }
        return Ok(Some(ParsedRule::Branch { combinator, children }));
    }

    // A leaf needs a valid predicate as its second word; an act line's
    // second word is '=', which is never a predicate keyword.
    let Some(second) = lookahead.next() else { return Ok(None) };
    let Some(predicate) = Predicate::from_keyword(second) else { return Ok(None) };

    let criterion = SmolStr::new(ctx.take_word().expect("lookahead confirmed a word"));
    ctx.take_word().expect("lookahead confirmed a predicate word");

    let state_word = ctx
        .take_word()
        .ok_or_else(|| PfwError::parse(Location::new(line), "rule leaf has no state"))?;

    let operand = if matches!(predicate, Predicate::In | Predicate::NotIn) {
        RuleOperand::Interval(parse_interval(state_word, line)?)
    } else {
        RuleOperand::Literal(SmolStr::new(state_word))
    };

    ctx.take_line()?;

    Ok(Some(ParsedRule::Leaf { criterion, predicate, operand }))
}

/// Grabs the rest of the current line and splits it on `%` into
/// alternating raw/amend tokens, preserving empty tokens from leading,
/// trailing, or adjacent `%` (§4.3: "leading/trailing `%` produce empty
/// raw tokens, which interpolate to empty").
fn parse_amend_template(ctx: &mut LexicalContext) -> Result<Vec<SmolStr>> {
    let line = ctx.take_line()?.unwrap_or_default();
    Ok(line.split('%').map(SmolStr::new).collect())
}

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
