//! Bash-style brace-range templates, e.g. `img-{0001..1000}.jpg`.
//!
//! A template may contain any number of `{start..end[..step]}` ranges;
//! zero-padded bounds keep their width. Iteration is single-pass and
//! restartable: every call to [`ParsedTemplate::iter`] returns an
//! independent cursor over the full expansion.

use std::fmt;

use crate::error::DlError;

/// One `{start..end[..step]}` range.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TemplateRange {
    start: u64,
    end: u64,
    step: u64,
    /// Zero-pad width, 0 for none.
    width: usize,
}

impl TemplateRange {
    fn count(&self) -> u64 {
        (self.end - self.start) / self.step + 1
    }

    fn render(&self, value: u64, out: &mut String) {
        if self.width > 0 {
            out.push_str(&format!("{:0width$}", value, width = self.width));
        } else {
            out.push_str(&format!("{}", value));
        }
    }
}

/// A parsed template: static segments interleaved with numeric ranges.
/// `segments.len() == ranges.len() + 1` always holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTemplate {
    segments: Vec<String>,
    ranges: Vec<TemplateRange>,
}

impl ParsedTemplate {
    /// Parse a brace template. Fails when the string contains no range or a
    /// range is malformed (reversed bounds, zero step, junk inside braces).
    pub fn parse(template: &str) -> Result<Self, DlError> {
        let mut segments = Vec::new();
        let mut ranges = Vec::new();
        let mut rest = template;

        while let Some(open) = rest.find('{') {
            let close = rest[open..]
                .find('}')
                .map(|i| open + i)
                .ok_or_else(|| invalid(template, "unclosed '{'"))?;
            segments.push(rest[..open].to_string());
            ranges.push(parse_range(template, &rest[open + 1..close])?);
            rest = &rest[close + 1..];
        }
        segments.push(rest.to_string());

        if ranges.is_empty() {
            return Err(invalid(template, "no brace ranges"));
        }
        Ok(Self { segments, ranges })
    }

    /// Total number of strings the template expands to.
    pub fn count(&self) -> u64 {
        self.ranges.iter().map(TemplateRange::count).product()
    }

    /// Independent single-pass cursor over the expansion, in order.
    pub fn iter(&self) -> TemplateIter {
        TemplateIter {
            tpl: self.clone(),
            values: self.ranges.iter().map(|r| r.start).collect(),
            done: false,
        }
    }
}

impl fmt::Display for ParsedTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.segments.iter().enumerate() {
            write!(f, "{}", seg)?;
            if let Some(r) = self.ranges.get(i) {
                write!(f, "{{{}..{}..{}}}", r.start, r.end, r.step)?;
            }
        }
        Ok(())
    }
}

/// Odometer-style cursor over a template expansion. Owns its snapshot of the
/// template so multiple cursors never share state.
#[derive(Debug, Clone)]
pub struct TemplateIter {
    tpl: ParsedTemplate,
    values: Vec<u64>,
    done: bool,
}

impl Iterator for TemplateIter {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.done {
            return None;
        }
        let mut out = String::new();
        for (i, seg) in self.tpl.segments.iter().enumerate() {
            out.push_str(seg);
            if let Some(r) = self.tpl.ranges.get(i) {
                r.render(self.values[i], &mut out);
            }
        }
        // Advance rightmost-first, carrying leftward; all wrapped means done.
        for (i, r) in self.tpl.ranges.iter().enumerate().rev() {
            if self.values[i] + r.step <= r.end {
                self.values[i] += r.step;
                return Some(out);
            }
            self.values[i] = r.start;
        }
        self.done = true;
        Some(out)
    }
}

fn invalid(template: &str, what: &str) -> DlError {
    DlError::Validation(format!("template {:?}: {}", template, what))
}

fn parse_range(template: &str, spec: &str) -> Result<TemplateRange, DlError> {
    let parts: Vec<&str> = spec.split("..").collect();
    if parts.len() != 2 && parts.len() != 3 {
        return Err(invalid(template, "range must be {start..end[..step]}"));
    }
    let start: u64 = parts[0]
        .parse()
        .map_err(|_| invalid(template, "range start is not a number"))?;
    let end: u64 = parts[1]
        .parse()
        .map_err(|_| invalid(template, "range end is not a number"))?;
    let step: u64 = match parts.get(2) {
        Some(s) => s
            .parse()
            .map_err(|_| invalid(template, "range step is not a number"))?,
        None => 1,
    };
    if start > end {
        return Err(invalid(template, "range start exceeds end"));
    }
    if step == 0 {
        return Err(invalid(template, "range step must be positive"));
    }
    let width = if parts[0].len() > 1 && parts[0].starts_with('0') {
        parts[0].len()
    } else {
        0
    };
    Ok(TemplateRange {
        start,
        end,
        step,
        width,
    })
}
