//! Indentation-aware lexical context shared by the criteria and settings
//! parsers (§4.1).
//!
//! A file is split into non-blank logical lines. Each line has a `depth`
//! derived from its leading indentation, which is either all tabs or a
//! multiple of four spaces — and whichever style is seen first on an
//! indented line is locked in for the rest of the file. `take_word` peels
//! whitespace-delimited tokens off the current line; `take_line` advances
//! to the next one.

use crate::error::{Location, PfwError, Result};

/// The depth of the current line, or the end-of-file sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    Level(u32),
    Eof,
}

impl Depth {
    pub fn is_eof(self) -> bool {
        matches!(self, Depth::Eof)
    }

    /// Compare against a specific nesting level; `false` at EOF.
    pub fn is(self, level: u32) -> bool {
        matches!(self, Depth::Level(l) if l == level)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IndentStyle {
    Tabs,
    Spaces,
}

pub struct LexicalContext<'a> {
    /// (1-based line number, raw line text) for every non-blank line.
    lines: Vec<(u32, &'a str)>,
    idx: usize,
    remaining: &'a str,
    depth: Depth,
    indent_style: Option<IndentStyle>,
}

impl<'a> LexicalContext<'a> {
    pub fn new(source: &'a str) -> Result<Self> {
        let lines = source
            .lines()
            .enumerate()
            .filter(|(_, raw)| !raw.trim().is_empty())
            .map(|(i, raw)| (i as u32 + 1, raw))
            .collect::<Vec<_>>();

        let mut ctx = Self {
            lines,
            idx: 0,
            remaining: "",
            depth: Depth::Eof,
            indent_style: None,
        };

        if !ctx.lines.is_empty() {
            ctx.load_current()?;
        }

        Ok(ctx)
    }

    /// Current nesting depth, or [`Depth::Eof`] once the file is exhausted.
    pub fn depth(&self) -> Depth {
        self.depth
    }

    /// Next whitespace-delimited token on the current line, or `None` if
    /// the line is exhausted or the context is at EOF.
    pub fn take_word(&mut self) -> Option<&'a str> {
        if self.depth.is_eof() {
            return None;
        }

        let trimmed = self.remaining.trim_start_matches([' ', '\t']);
        if trimmed.is_empty() {
            self.remaining = trimmed;
            return None;
        }

        let end = trimmed.find([' ', '\t']).unwrap_or(trimmed.len());
        let (word, rest) = trimmed.split_at(end);
        self.remaining = rest;
        Some(word)
    }

    /// Advance to the next non-empty line (recomputing depth), returning
    /// the previous line's remaining (unconsumed) text.
    pub fn take_line(&mut self) -> Result<Option<&'a str>> {
        if self.depth.is_eof() {
            return Ok(None);
        }

        let prev = self.remaining;
        self.advance()?;
        Ok(Some(prev))
    }

    fn advance(&mut self) -> Result<()> {
        self.idx += 1;
        if self.idx >= self.lines.len() {
            self.depth = Depth::Eof;
            self.remaining = "";
            return Ok(());
        }

        self.load_current()
    }

    fn load_current(&mut self) -> Result<()> {
        let (line_no, raw) = self.lines[self.idx];
        let (depth, rest) = self.split_indent(raw, line_no)?;
        self.depth = Depth::Level(depth);
        self.remaining = rest;
        Ok(())
    }

    fn split_indent(&mut self, raw: &'a str, line_no: u32) -> Result<(u32, &'a str)> {
        let mut tabs = 0u32;
        let mut spaces = 0u32;
        let mut consumed = 0usize;

        for c in raw.chars() {
            match c {
                '\t' => {
                    tabs += 1;
                    consumed += 1;
                }
                ' ' => {
                    spaces += 1;
                    consumed += 1;
                }
                _ => break,
            }
        }

        let rest = &raw[consumed..];

        if tabs > 0 && spaces > 0 {
            return Err(PfwError::indent(Location::new(line_no)));
        }

        if tabs > 0 {
            if self.indent_style == Some(IndentStyle::Spaces) {
                return Err(PfwError::indent(Location::new(line_no)));
            }
            self.indent_style = Some(IndentStyle::Tabs);
            return Ok((tabs, rest));
        }

        if spaces > 0 {
            if spaces % 4 != 0 {
                return Err(PfwError::indent(Location::new(line_no)));
            }
            if self.indent_style == Some(IndentStyle::Tabs) {
                return Err(PfwError::indent(Location::new(line_no)));
            }
            self.indent_style = Some(IndentStyle::Spaces);
            return Ok((spaces / 4, rest));
        }

        Ok((0, rest))
    }

    /// Unconsumed text of the current line, without advancing. Lets a
    /// parser look ahead before deciding how many words to actually take.
    pub fn remaining(&self) -> &'a str {
        self.remaining
    }

    /// 1-based line number of the current line, for error reporting.
    pub fn line_number(&self) -> u32 {
        self.lines
            .get(self.idx)
            .map(|(n, _)| *n)
            .unwrap_or_else(|| self.lines.last().map(|(n, _)| *n).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_eof() {
        let ctx = LexicalContext::new("").unwrap();
        assert!(ctx.depth().is_eof());
    }

    #[test]
    fn blank_lines_are_skipped() {
        let mut ctx = LexicalContext::new("\n\n  \nfoo bar\n\t\nbaz\n").unwrap();
        assert_eq!(ctx.take_word(), Some("foo"));
        assert_eq!(ctx.take_word(), Some("bar"));
        ctx.take_line().unwrap();
        assert_eq!(ctx.take_word(), Some("baz"));
    }

    #[test]
    fn tab_depth() {
        let mut ctx = LexicalContext::new("a\n\tb\n\t\tc\n").unwrap();
        assert!(ctx.depth().is(0));
        assert_eq!(ctx.take_word(), Some("a"));
        ctx.take_line().unwrap();
        assert!(ctx.depth().is(1));
        assert_eq!(ctx.take_word(), Some("b"));
        ctx.take_line().unwrap();
        assert!(ctx.depth().is(2));
        assert_eq!(ctx.take_word(), Some("c"));
    }

    #[test]
    fn space_depth_must_be_multiple_of_four() {
        let mut ctx = LexicalContext::new("a\n    b\n        c\n").unwrap();
        ctx.take_line().unwrap();
        assert!(ctx.depth().is(1));
        ctx.take_line().unwrap();
        assert!(ctx.depth().is(2));

        let mut bad = LexicalContext::new("a\n   b\n").unwrap();
        let err = bad.take_line().unwrap_err();
        assert!(matches!(err, PfwError::Parse { .. }));
    }

    #[test]
    fn mixed_tabs_and_spaces_on_one_line_is_fatal() {
        let mut ctx = LexicalContext::new("a\n\t    b\n").unwrap();
        let err = ctx.take_line().unwrap_err();
        assert!(matches!(err, PfwError::Parse { .. }));
    }

    #[test]
    fn switching_style_mid_file_is_fatal() {
        let mut ctx = LexicalContext::new("a\n\tb\n    c\n").unwrap();
        ctx.take_line().unwrap();
        assert!(ctx.depth().is(1));
        let err = ctx.take_line().unwrap_err();
        assert!(matches!(err, PfwError::Parse { .. }));
    }

    #[test]
    fn take_line_returns_previous_remaining_text() {
        let mut ctx = LexicalContext::new("hello world\nnext line\n").unwrap();
        assert_eq!(ctx.take_word(), Some("hello"));
        let prev = ctx.take_line().unwrap();
        assert_eq!(prev, Some("world"));
        assert_eq!(ctx.take_word(), Some("next"));
    }

    #[test]
    fn take_word_exhausts_to_none_without_advancing() {
        let mut ctx = LexicalContext::new("only\n").unwrap();
        assert_eq!(ctx.take_word(), Some("only"));
        assert_eq!(ctx.take_word(), None);
        assert!(!ctx.depth().is_eof());
    }

    #[test]
    fn eof_after_last_line_taken() {
        let mut ctx = LexicalContext::new("a\n").unwrap();
        ctx.take_line().unwrap();
        assert!(ctx.depth().is_eof());
        assert_eq!(ctx.take_line().unwrap(), None);
        assert_eq!(ctx.take_word(), None);
    }
}
