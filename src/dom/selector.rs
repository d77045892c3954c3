//! Compound selectors.
//!
//! Supports the subset drivers key on: a tag (or `*`) followed by any number
//! of `.class`, `#id`, `[attr]` and `[attr=value]` parts, with `,` for
//! alternatives. Descendant combinators are not supported.

use super::{DomError, Element};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Class(String),
    Id(String),
    Has(String),
    Equals(String, String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    parts: Vec<Part>,
}

impl Compound {
    fn matches(&self, el: &Element) -> bool {
        if let Some(tag) = &self.tag
            && tag != el.tag()
        {
            return false;
        }
        self.parts.iter().all(|part| match part {
            Part::Class(class) => el.has_class(class),
            Part::Id(id) => el.id().as_deref() == Some(id.as_str()),
            Part::Has(name) => el.has_attr(name),
            Part::Equals(name, value) => el.attr(name).as_deref() == Some(value.as_str()),
        })
    }
}

/// A parsed selector: one or more compound alternatives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selector {
    alternatives: Vec<Compound>,
}

impl Selector {
    /// Selector matching elements with `tag`.
    pub fn tag(tag: &str) -> Self {
        Self {
            alternatives: vec![Compound {
                tag: Some(tag.to_ascii_lowercase()),
                parts: Vec::new(),
            }],
        }
    }

    /// Selector matching any element.
    pub fn any() -> Self {
        Self {
            alternatives: vec![Compound::default()],
        }
    }

    /// Narrow the last alternative with `[name=value]`.
    pub fn attr_eq(self, name: &str, value: &str) -> Self {
        self.push_part(Part::Equals(name.to_ascii_lowercase(), value.to_string()))
    }

    /// Narrow the last alternative with `[name]`.
    pub fn has_attr(self, name: &str) -> Self {
        self.push_part(Part::Has(name.to_ascii_lowercase()))
    }

    /// Narrow the last alternative with `.class`.
    pub fn class(self, class: &str) -> Self {
        self.push_part(Part::Class(class.to_string()))
    }

    /// Add `other`'s alternatives (selector list `a, b`).
    pub fn or(mut self, other: Selector) -> Self {
        self.alternatives.extend(other.alternatives);
        self
    }

    fn push_part(mut self, part: Part) -> Self {
        if self.alternatives.is_empty() {
            self.alternatives.push(Compound::default());
        }
        if let Some(last) = self.alternatives.last_mut() {
            last.parts.push(part);
        }
        self
    }

    pub fn matches(&self, el: &Element) -> bool {
        self.alternatives.iter().any(|c| c.matches(el))
    }

    /// Parse a selector string such as `input[type=checkbox], textarea`.
    pub fn parse(css: &str) -> Result<Self, DomError> {
        let mut alternatives = Vec::new();
        for raw in css.split(',') {
            let raw = raw.trim();
            if raw.is_empty() {
                return Err(invalid(css, "empty selector"));
            }
            alternatives.push(parse_compound(css, raw)?);
        }
        Ok(Self { alternatives })
    }
}

fn invalid(css: &str, reason: &str) -> DomError {
    DomError::Selector {
        selector: css.to_string(),
        reason: reason.to_string(),
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

fn take_ident(chars: &[char], pos: &mut usize) -> String {
    let start = *pos;
    while *pos < chars.len() && is_ident_char(chars[*pos]) {
        *pos += 1;
    }
    chars[start..*pos].iter().collect()
}

fn parse_compound(css: &str, raw: &str) -> Result<Compound, DomError> {
    let chars: Vec<char> = raw.chars().collect();
    let mut pos = 0;
    let mut compound = Compound::default();

    if chars.first() == Some(&'*') {
        pos = 1;
    } else {
        let tag = take_ident(&chars, &mut pos);
        if !tag.is_empty() {
            compound.tag = Some(tag.to_ascii_lowercase());
        }
    }

    while pos < chars.len() {
        let c = chars[pos];
        pos += 1;
        match c {
            '.' | '#' => {
                let name = take_ident(&chars, &mut pos);
                if name.is_empty() {
                    return Err(invalid(css, "expected a name after `.` or `#`"));
                }
                compound.parts.push(if c == '.' {
                    Part::Class(name)
                } else {
                    Part::Id(name)
                });
            }
            '[' => {
                let name = take_ident(&chars, &mut pos).to_ascii_lowercase();
                if name.is_empty() {
                    return Err(invalid(css, "expected an attribute name"));
                }
                match chars.get(pos) {
                    Some(']') => {
                        pos += 1;
                        compound.parts.push(Part::Has(name));
                    }
                    Some('=') => {
                        pos += 1;
                        let value = take_attr_value(&chars, &mut pos)
                            .ok_or_else(|| invalid(css, "unterminated attribute value"))?;
                        if chars.get(pos) != Some(&']') {
                            return Err(invalid(css, "expected `]`"));
                        }
                        pos += 1;
                        compound.parts.push(Part::Equals(name, value));
                    }
                    _ => return Err(invalid(css, "expected `]` or `=`")),
                }
            }
            other => return Err(invalid(css, &format!("unexpected character `{other}`"))),
        }
    }

    Ok(compound)
}

fn take_attr_value(chars: &[char], pos: &mut usize) -> Option<String> {
    let quote = match chars.get(*pos) {
        Some(&q @ ('"' | '\'')) => {
            *pos += 1;
            Some(q)
        }
        _ => None,
    };

    let start = *pos;
    while *pos < chars.len() {
        let c = chars[*pos];
        let done = match quote {
            Some(q) => c == q,
            None => c == ']',
        };
        if done {
            let value: String = chars[start..*pos].iter().collect();
            if quote.is_some() {
                *pos += 1;
            }
            return Some(value);
        }
        *pos += 1;
    }
    None
}
