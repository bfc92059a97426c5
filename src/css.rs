//! Stylesheet and selector parsing for the preview sandbox.
//!
//! The sandbox DOM matches selectors and runs the cascade itself; this
//! module only turns text into structured rules. Parsing follows CSS error
//! recovery: a rule with an invalid selector list is dropped, a malformed
//! declaration is skipped, and nothing else is affected.

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorError {
    #[error("empty selector")]
    Empty,
    #[error("unexpected '{found}' at offset {offset}")]
    Unexpected { found: char, offset: usize },
    #[error("expected an identifier at offset {offset}")]
    ExpectedIdentifier { offset: usize },
    #[error("unterminated {what}")]
    Unterminated { what: &'static str },
}

/// (ids, classes/attributes/pseudo-classes, types)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Specificity(pub u32, pub u32, pub u32);

impl Specificity {
    fn add(self, other: Specificity) -> Specificity {
        Specificity(self.0 + other.0, self.1 + other.1, self.2 + other.2)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Combinator {
    Descendant,
    Child,
    NextSibling,
    SubsequentSibling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttributeOp {
    Exists,
    Equals,
    Includes,
    DashMatch,
    Prefix,
    Suffix,
    Substring,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeSelector {
    pub name: String,
    pub op: AttributeOp,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum PseudoClass {
    FirstChild,
    LastChild,
    OnlyChild,
    Root,
    Empty,
    Not { selectors: Vec<ComplexSelector> },
    /// Interaction state (`:hover`), pseudo-elements and anything else the
    /// sandbox cannot evaluate. Valid syntax, never matches.
    Never { name: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Compound {
    /// Lowercased type selector; `None` for `*` or when omitted
    pub tag: Option<String>,
    pub ids: Vec<String>,
    pub classes: Vec<String>,
    pub attributes: Vec<AttributeSelector>,
    pub pseudo: Vec<PseudoClass>,
}

impl Compound {
    fn is_empty(&self) -> bool {
        self.tag.is_none()
            && self.ids.is_empty()
            && self.classes.is_empty()
            && self.attributes.is_empty()
            && self.pseudo.is_empty()
    }

    fn specificity(&self) -> Specificity {
        let mut spec = Specificity(
            self.ids.len() as u32,
            (self.classes.len() + self.attributes.len()) as u32,
            u32::from(self.tag.is_some()),
        );
        for pseudo in &self.pseudo {
            spec = match pseudo {
                PseudoClass::Not { selectors } => spec.add(
                    selectors
                        .iter()
                        .map(|s| s.specificity)
                        .max()
                        .unwrap_or_default(),
                ),
                _ => spec.add(Specificity(0, 1, 0)),
            };
        }
        spec
    }
}

/// One step of a complex selector. `combinator` relates this compound to
/// the previous part and is `None` for the first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectorPart {
    pub combinator: Option<Combinator>,
    pub compound: Compound,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComplexSelector {
    pub parts: Vec<SelectorPart>,
    pub specificity: Specificity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Declaration {
    pub property: String,
    pub value: String,
    pub important: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StyleRule {
    pub selectors: Vec<ComplexSelector>,
    pub declarations: Vec<Declaration>,
}

// ============================================================================
// Stylesheets
// ============================================================================

/// Parse a stylesheet into style rules, in source order.
///
/// At-rules (`@media`, `@keyframes`, ...) are skipped with their blocks:
/// the headless preview has no viewport or animation timeline to evaluate
/// them against.
pub fn parse_stylesheet(input: &str) -> Vec<StyleRule> {
    let text = strip_comments(input);
    let mut rules = Vec::new();
    let mut rest = text.as_str();

    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            break;
        }
        if rest.starts_with('}') {
            rest = &rest[1..];
            continue;
        }
        if rest.starts_with('@') {
            rest = skip_at_rule(rest);
            continue;
        }

        let Some(open) = find_top_level(rest, '{') else {
            break;
        };
        let prelude = rest[..open].trim();
        let body_start = open + 1;
        let close = matching_brace(rest, open).unwrap_or(rest.len());
        let body = &rest[body_start..close.max(body_start)];
        rest = if close < rest.len() { &rest[close + 1..] } else { "" };

        match parse_selector_list(prelude) {
            Ok(selectors) => rules.push(StyleRule {
                selectors,
                declarations: parse_declarations(body),
            }),
            Err(e) => tracing::debug!(selector = prelude, error = %e, "dropping style rule"),
        }
    }

    rules
}

/// Parse a declaration block body (also the content of a `style` attribute).
pub fn parse_declarations(input: &str) -> Vec<Declaration> {
    split_top_level(input, ';')
        .into_iter()
        .filter_map(|item| {
            let colon = item.find(':')?;
            let raw_property = item[..colon].trim();
            if raw_property.is_empty() {
                return None;
            }
            let property = if raw_property.starts_with("--") {
                raw_property.to_string()
            } else {
                raw_property.to_ascii_lowercase()
            };

            let mut value = item[colon + 1..].trim();
            let mut important = false;
            if let Some(bang) = value.rfind('!') {
                if value[bang + 1..].trim().eq_ignore_ascii_case("important") {
                    important = true;
                    value = value[..bang].trim_end();
                }
            }
            if value.is_empty() {
                return None;
            }
            Some(Declaration {
                property,
                value: value.to_string(),
                important,
            })
        })
        .collect()
}

fn strip_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("/*") {
        out.push_str(&rest[..start]);
        match rest[start + 2..].find("*/") {
            Some(end) => rest = &rest[start + 2 + end + 2..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

fn skip_at_rule(input: &str) -> &str {
    let semicolon = find_top_level(input, ';');
    let brace = find_top_level(input, '{');
    match (semicolon, brace) {
        (Some(s), Some(b)) if s < b => &input[s + 1..],
        (_, Some(b)) => match matching_brace(input, b) {
            Some(close) => &input[close + 1..],
            None => "",
        },
        (Some(s), None) => &input[s + 1..],
        (None, None) => "",
    }
}

/// Byte offset of `target` outside strings, parentheses and brackets.
fn find_top_level(input: &str, target: char) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in input.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match (quote, c) {
            (_, '\\') => escaped = true,
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, c) if c == target && depth == 0 => return Some(i),
            (None, '"' | '\'') => quote = Some(c),
            (None, '(' | '[') => depth += 1,
            (None, ')' | ']') => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    None
}

/// Offset of the `}` closing the `{` at `open`, honouring nesting and strings.
fn matching_brace(input: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in input[open..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match (quote, c) {
            (_, '\\') => escaped = true,
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '{') => depth += 1,
            (None, '}') => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + i);
                }
            }
            _ => {}
        }
    }
    None
}

fn split_top_level(input: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut rest = input;
    while let Some(at) = find_top_level(rest, separator) {
        parts.push(&rest[..at]);
        rest = &rest[at + separator.len_utf8()..];
    }
    parts.push(rest);
    parts
}

// ============================================================================
// Selectors
// ============================================================================

/// Parse a comma-separated selector list.
pub fn parse_selector_list(input: &str) -> Result<Vec<ComplexSelector>, SelectorError> {
    split_top_level(input, ',')
        .into_iter()
        .map(|item| SelectorParser::new(item).parse_complex())
        .collect()
}

struct SelectorParser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> SelectorParser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_whitespace(&mut self) -> bool {
        let start = self.pos;
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
        self.pos > start
    }

    fn parse_complex(&mut self) -> Result<ComplexSelector, SelectorError> {
        let mut parts: Vec<SelectorPart> = Vec::new();
        self.skip_whitespace();

        loop {
            let had_space = self.skip_whitespace();
            let Some(c) = self.peek() else { break };

            let combinator = match c {
                '>' | '+' | '~' => {
                    if parts.is_empty() {
                        return Err(SelectorError::Unexpected {
                            found: c,
                            offset: self.pos,
                        });
                    }
                    self.bump();
                    self.skip_whitespace();
                    Some(match c {
                        '>' => Combinator::Child,
                        '+' => Combinator::NextSibling,
                        _ => Combinator::SubsequentSibling,
                    })
                }
                _ if parts.is_empty() => None,
                _ if had_space => Some(Combinator::Descendant),
                _ => {
                    return Err(SelectorError::Unexpected {
                        found: c,
                        offset: self.pos,
                    })
                }
            };

            let Some(compound) = self.parse_compound()? else {
                return Err(match self.peek() {
                    Some(found) => SelectorError::Unexpected {
                        found,
                        offset: self.pos,
                    },
                    None => SelectorError::Empty,
                });
            };
            parts.push(SelectorPart {
                combinator,
                compound,
            });
        }

        if parts.is_empty() {
            return Err(SelectorError::Empty);
        }
        let specificity = parts
            .iter()
            .fold(Specificity::default(), |acc, p| acc.add(p.compound.specificity()));
        Ok(ComplexSelector { parts, specificity })
    }

    fn parse_compound(&mut self) -> Result<Option<Compound>, SelectorError> {
        let mut compound = Compound::default();
        let mut universal = false;

        match self.peek() {
            Some('*') => {
                self.bump();
                universal = true;
            }
            Some(c) if is_ident_start(c) => {
                compound.tag = Some(self.parse_ident()?.to_ascii_lowercase());
            }
            _ => {}
        }

        loop {
            match self.peek() {
                Some('#') => {
                    self.bump();
                    compound.ids.push(self.parse_ident()?);
                }
                Some('.') => {
                    self.bump();
                    compound.classes.push(self.parse_ident()?);
                }
                Some('[') => {
                    self.bump();
                    compound.attributes.push(self.parse_attribute()?);
                }
                Some(':') => {
                    self.bump();
                    compound.pseudo.push(self.parse_pseudo()?);
                }
                _ => break,
            }
        }

        // A lone `*` is a valid compound that matches anything.
        if compound.is_empty() && !universal {
            return Ok(None);
        }
        Ok(Some(compound))
    }

    fn parse_ident(&mut self) -> Result<String, SelectorError> {
        let mut ident = String::new();
        while let Some(c) = self.peek() {
            if c == '\\' {
                self.bump();
                match self.bump() {
                    Some(escaped) => ident.push(escaped),
                    None => break,
                }
            } else if is_ident_char(c) {
                ident.push(c);
                self.bump();
            } else {
                break;
            }
        }
        if ident.is_empty() {
            return Err(SelectorError::ExpectedIdentifier { offset: self.pos });
        }
        Ok(ident)
    }

    fn parse_attribute(&mut self) -> Result<AttributeSelector, SelectorError> {
        self.skip_whitespace();
        let name = self.parse_ident()?.to_ascii_lowercase();
        self.skip_whitespace();

        let op = match self.bump() {
            Some(']') => {
                return Ok(AttributeSelector {
                    name,
                    op: AttributeOp::Exists,
                    value: String::new(),
                })
            }
            Some('=') => AttributeOp::Equals,
            Some(c @ ('~' | '|' | '^' | '$' | '*')) => {
                if self.bump() != Some('=') {
                    return Err(SelectorError::Unexpected {
                        found: c,
                        offset: self.pos,
                    });
                }
                match c {
                    '~' => AttributeOp::Includes,
                    '|' => AttributeOp::DashMatch,
                    '^' => AttributeOp::Prefix,
                    '$' => AttributeOp::Suffix,
                    _ => AttributeOp::Substring,
                }
            }
            Some(found) => {
                return Err(SelectorError::Unexpected {
                    found,
                    offset: self.pos,
                })
            }
            None => return Err(SelectorError::Unterminated { what: "attribute selector" }),
        };

        self.skip_whitespace();
        let value = match self.peek() {
            Some(q @ ('"' | '\'')) => {
                self.bump();
                let start = self.pos;
                let end = self.input[start..]
                    .find(q)
                    .map(|p| start + p)
                    .ok_or(SelectorError::Unterminated { what: "string" })?;
                self.pos = end + 1;
                self.input[start..end].to_string()
            }
            _ => self.parse_ident()?,
        };
        self.skip_whitespace();
        // Case-sensitivity flags are accepted and ignored.
        if matches!(self.peek(), Some('i' | 's' | 'I' | 'S')) {
            self.bump();
            self.skip_whitespace();
        }
        match self.bump() {
            Some(']') => Ok(AttributeSelector { name, op, value }),
            Some(found) => Err(SelectorError::Unexpected {
                found,
                offset: self.pos,
            }),
            None => Err(SelectorError::Unterminated { what: "attribute selector" }),
        }
    }

    fn parse_pseudo(&mut self) -> Result<PseudoClass, SelectorError> {
        let element = self.peek() == Some(':');
        if element {
            self.bump();
        }
        let name = self.parse_ident()?.to_ascii_lowercase();

        let argument = if self.peek() == Some('(') {
            let open = self.pos;
            let close = find_top_level(&self.input[open + 1..], ')')
                .map(|p| open + 1 + p)
                .ok_or(SelectorError::Unterminated { what: "pseudo-class arguments" })?;
            self.pos = close + 1;
            Some(&self.input[open + 1..close])
        } else {
            None
        };

        if element {
            return Ok(PseudoClass::Never { name });
        }
        Ok(match (name.as_str(), argument) {
            ("first-child", None) => PseudoClass::FirstChild,
            ("last-child", None) => PseudoClass::LastChild,
            ("only-child", None) => PseudoClass::OnlyChild,
            ("root", None) => PseudoClass::Root,
            ("empty", None) => PseudoClass::Empty,
            ("not", Some(inner)) => PseudoClass::Not {
                selectors: parse_selector_list(inner)?,
            },
            _ => PseudoClass::Never { name },
        })
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '-' || c == '\\' || !c.is_ascii()
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-' || !c.is_ascii()
}
