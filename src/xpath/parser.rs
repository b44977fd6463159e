//! Compilation of the XPath subset used for selector expressions.
//!
//! The grammar covers absolute and relative step paths with `/` and `//`,
//! tag name steps with a `*` wildcard, attribute steps `@name`, attribute
//! value predicates `[@a="v"]` (conjoined with `,`), the content selector
//! suffix `()` and the structural exit selector suffix `~`.

use crate::errors::{Error, Result};

/// Relation of a step to the node selected by the previous step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    /// Direct child (`/`)
    Child,
    /// Any descendant (`//`)
    Descendant,
}

/// An attribute value predicate `[@name="value"]` attached to a tag step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttrCond {
    /// Attribute name to test
    pub name: String,
    /// Required attribute value
    pub value: String,
}

/// One tag step of a compiled expression.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Step {
    /// How this step relates to its predecessor
    pub axis: Axis,
    /// Tag name to match; `None` is the `*` wildcard
    pub name: Option<String>,
    /// Attribute predicates, all of which must hold
    pub conds: Vec<AttrCond>,
}

/// What a fully matched expression selects.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Selection {
    /// The tag structure itself, fired on the open event
    Tag,
    /// The tag structure, fired on the close event (`~` suffix)
    TagExit,
    /// The value of the named attribute (`@name` suffix)
    Attribute(String),
    /// The text content of the selected tag (`()` suffix)
    Content,
}

/// A compiled selector expression.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Expression {
    /// The tag path
    pub steps: Vec<Step>,
    /// What the full match selects
    pub selection: Selection,
}

/// Coarse classification of an expression by its trailing token. Sub
/// sections can only be defined on tag selections.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExpressionClass {
    /// Expression ends in `()`
    Content,
    /// Expression selects a tag structure
    Tag,
    /// Expression ends in an attribute step
    Attribute,
}

impl Expression {
    /// Classifies the compiled expression.
    pub fn class(&self) -> ExpressionClass {
        match self.selection {
            Selection::Content => ExpressionClass::Content,
            Selection::Attribute(_) => ExpressionClass::Attribute,
            Selection::Tag | Selection::TagExit => ExpressionClass::Tag,
        }
    }
}

fn is_tag_name_byte(b: u8) -> bool {
    !matches!(
        b,
        b':' | b'@' | b'/' | b'[' | b']' | b'(' | b')' | b'~' | b'*' | b'"' | b'\'' | b','
    ) && b > 32
}

struct Cursor<'a> {
    bytes: &'a [u8],
    at: usize,
}

impl<'a> Cursor<'a> {
    fn new(src: &'a str) -> Cursor<'a> {
        Cursor {
            bytes: src.as_bytes(),
            at: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.at).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.at += 1;
        Some(b)
    }

    fn skip_spaces(&mut self) {
        while matches!(self.peek(), Some(b) if b <= 32) {
            self.at += 1;
        }
    }

    fn eat(&mut self, b: u8) -> bool {
        if self.peek() == Some(b) {
            self.at += 1;
            true
        } else {
            false
        }
    }

    /// One-based position for error reports.
    fn error(&self, msg: &str) -> Error {
        Error::BadExpression(self.at + 1, msg.to_string())
    }

    fn name(&mut self) -> String {
        let start = self.at;
        while matches!(self.peek(), Some(b) if is_tag_name_byte(b)) {
            self.at += 1;
        }
        String::from_utf8_lossy(&self.bytes[start..self.at]).into_owned()
    }
}

/// Compiles a selector expression. Fails with [`Error::BadExpression`]
/// carrying the one-based byte position of the offending token.
pub fn parse(expression: &str) -> Result<Expression> {
    let mut cur = Cursor::new(expression);
    let mut steps: Vec<Step> = Vec::new();
    let mut selection = Selection::Tag;
    // Axis for the next tag step. A relative expression selects anywhere
    // in the document, like a leading `//`.
    let mut axis = Axis::Descendant;
    let mut after_step = false;

    loop {
        cur.skip_spaces();
        let byte = match cur.peek() {
            Some(b) => b,
            None => break,
        };
        match byte {
            b'/' => {
                cur.bump();
                axis = if cur.eat(b'/') {
                    Axis::Descendant
                } else {
                    Axis::Child
                };
                after_step = false;
            }
            b'*' => {
                cur.bump();
                steps.push(Step {
                    axis,
                    name: None,
                    conds: Vec::new(),
                });
                axis = Axis::Child;
                after_step = true;
            }
            b'[' => {
                cur.bump();
                let conds = parse_conds(&mut cur)?;
                match steps.last_mut() {
                    Some(step) if after_step => step.conds.extend(conds),
                    _ => return Err(cur.error("attribute condition without a preceding tag step")),
                }
            }
            b'@' => {
                cur.bump();
                cur.skip_spaces();
                let name = cur.name();
                if name.is_empty() {
                    return Err(cur.error("attribute name expected after '@'"));
                }
                if !after_step {
                    // `//@id` is `//*@id`: the attribute belongs to any tag
                    // reachable on the pending axis.
                    steps.push(Step {
                        axis,
                        name: None,
                        conds: Vec::new(),
                    });
                }
                cur.skip_spaces();
                if cur.peek().is_some() {
                    return Err(cur.error("attribute step is only allowed at the end"));
                }
                selection = Selection::Attribute(name);
                break;
            }
            b'(' => {
                cur.bump();
                cur.skip_spaces();
                if !cur.eat(b')') {
                    return Err(cur.error("')' expected"));
                }
                cur.skip_spaces();
                if cur.peek().is_some() {
                    return Err(cur.error("content selector is only allowed at the end"));
                }
                selection = Selection::Content;
                break;
            }
            b'~' => {
                cur.bump();
                cur.skip_spaces();
                if cur.peek().is_some() {
                    return Err(cur.error("structure exit selector is only allowed at the end"));
                }
                selection = Selection::TagExit;
                break;
            }
            b if is_tag_name_byte(b) => {
                let name = cur.name();
                steps.push(Step {
                    axis,
                    name: Some(name),
                    conds: Vec::new(),
                });
                axis = Axis::Child;
                after_step = true;
            }
            _ => return Err(cur.error("unexpected token in path expression")),
        }
    }
    Ok(Expression { steps, selection })
}

/// Parses the body of a `[...]` group: one or more `@name="value"`
/// predicates separated by `,`.
fn parse_conds(cur: &mut Cursor) -> Result<Vec<AttrCond>> {
    let mut conds = Vec::new();
    loop {
        cur.skip_spaces();
        if !cur.eat(b'@') {
            return Err(cur.error("'@' expected in attribute condition"));
        }
        cur.skip_spaces();
        let name = cur.name();
        if name.is_empty() {
            return Err(cur.error("attribute name expected in condition"));
        }
        cur.skip_spaces();
        if !cur.eat(b'=') {
            return Err(cur.error("'=' expected in attribute condition"));
        }
        cur.skip_spaces();
        let quote = match cur.bump() {
            Some(q @ (b'"' | b'\'')) => q,
            _ => return Err(cur.error("quoted value expected in attribute condition")),
        };
        let start = cur.at;
        while matches!(cur.peek(), Some(b) if b != quote) {
            cur.at += 1;
        }
        if cur.peek().is_none() {
            return Err(cur.error("unterminated value in attribute condition"));
        }
        let value = String::from_utf8_lossy(&cur.bytes[start..cur.at]).into_owned();
        cur.bump();
        conds.push(AttrCond { name, value });
        cur.skip_spaces();
        if cur.eat(b']') {
            return Ok(conds);
        }
        if !cur.eat(b',') {
            return Err(cur.error("',' or ']' expected after attribute condition"));
        }
    }
}

/// Joins two path expressions, collapsing redundant separators.
pub fn join_path(parent: &str, follow: &str) -> String {
    if follow.is_empty() {
        return parent.to_string();
    }
    if parent.is_empty() {
        return follow.to_string();
    }
    if follow.starts_with('/') {
        let trimmed = parent.trim_end_matches('/');
        if parent.len() - trimmed.len() > 1 {
            // parent ends with '//': strip the leading slashes of follow
            return format!("{}{}", parent, follow.trim_start_matches('/'));
        }
        return format!("{}{}", trimmed, follow);
    }
    if parent.ends_with('/') {
        return format!("{}{}", parent, follow);
    }
    format!("{}/{}", parent, follow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn step(axis: Axis, name: &str) -> Step {
        Step {
            axis,
            name: Some(name.to_string()),
            conds: Vec::new(),
        }
    }

    #[test]
    fn absolute_content_path() {
        let expr = parse("/doc/title()").unwrap();
        assert_eq!(
            expr.steps,
            vec![step(Axis::Child, "doc"), step(Axis::Child, "title")]
        );
        assert_eq!(expr.selection, Selection::Content);
        assert_eq!(expr.class(), ExpressionClass::Content);
    }

    #[test]
    fn descendant_and_relative() {
        let expr = parse("//a()").unwrap();
        assert_eq!(expr.steps, vec![step(Axis::Descendant, "a")]);

        let rel = parse("a()").unwrap();
        assert_eq!(rel.steps, vec![step(Axis::Descendant, "a")]);
    }

    #[test]
    fn attribute_selection() {
        let expr = parse("/doc/link@href").unwrap();
        assert_eq!(expr.selection, Selection::Attribute("href".to_string()));
        assert_eq!(expr.class(), ExpressionClass::Attribute);

        let any = parse("//@id").unwrap();
        assert_eq!(any.steps.len(), 1);
        assert_eq!(any.steps[0].name, None);
        assert_eq!(any.selection, Selection::Attribute("id".to_string()));
    }

    #[test]
    fn conditions() {
        let expr = parse("/doc/e[@lang=\"en\",@rel='x']()").unwrap();
        assert_eq!(
            expr.steps[1].conds,
            vec![
                AttrCond {
                    name: "lang".to_string(),
                    value: "en".to_string()
                },
                AttrCond {
                    name: "rel".to_string(),
                    value: "x".to_string()
                },
            ]
        );
    }

    #[test]
    fn exit_suffix() {
        let expr = parse("/doc~").unwrap();
        assert_eq!(expr.selection, Selection::TagExit);
        assert_eq!(expr.class(), ExpressionClass::Tag);
    }

    #[test]
    fn wildcard_step() {
        let expr = parse("/doc/*()").unwrap();
        assert_eq!(expr.steps[1].name, None);
    }

    #[test]
    fn error_positions_are_one_based() {
        match parse("/doc/(") {
            Err(Error::BadExpression(pos, _)) => assert_eq!(pos, 7),
            other => panic!("expected BadExpression, got {:?}", other),
        }
        match parse("/doc[@a=1]()") {
            Err(Error::BadExpression(pos, _)) => assert_eq!(pos, 10),
            other => panic!("expected BadExpression, got {:?}", other),
        }
    }

    #[test]
    fn join_paths() {
        assert_eq!(join_path("/doc", "title()"), "/doc/title()");
        assert_eq!(join_path("/doc/", "/title()"), "/doc/title()");
        assert_eq!(join_path("//sec//", "/p()"), "//sec//p()");
        assert_eq!(join_path("", "/x"), "/x");
        assert_eq!(join_path("/x", ""), "/x");
    }
}
