//! A deterministic streaming matcher for the XPath subset of selector
//! expressions.
//!
//! An [`XPathAutomaton`] is built once at configuration time from a set of
//! expressions, each bound to a caller-chosen id. A per-document
//! [`XPathContext`] is then fed the structural events of a segmenter in
//! document order and yields the ids of the expressions matched by each
//! event. Matching never backtracks and never looks ahead: the runtime
//! state is a stack of active partial matches aligned with the open tag
//! stack of the document.

pub mod parser;

use crate::errors::{Error, Result};
use crate::segmenter::ElementType;

use self::parser::{Expression, ExpressionClass, Selection, Step};

/// One compiled expression with its emission id.
#[derive(Clone, Debug)]
struct CompiledExpr {
    id: u32,
    steps: Vec<Step>,
    selection: Selection,
}

/// A set of selector expressions compiled into a streaming matcher.
///
/// The automaton is immutable after configuration and can be shared by any
/// number of concurrently running contexts.
#[derive(Clone, Debug, Default)]
pub struct XPathAutomaton {
    exprs: Vec<CompiledExpr>,
}

impl XPathAutomaton {
    /// Creates an empty automaton.
    pub fn new() -> XPathAutomaton {
        XPathAutomaton::default()
    }

    /// Compiles `expression` and binds its matches to `id`. Multiple
    /// expressions may share one id.
    pub fn define_selector_expression(&mut self, id: u32, expression: &str) -> Result<()> {
        let expr = parser::parse(expression)?;
        self.push_expr(id, expr);
        Ok(())
    }

    /// Registers a sub-section: `start_id` fires on the open event of the
    /// selected tag, `end_id` on its close event. The expression must be a
    /// tag selection.
    pub fn define_subsection(&mut self, start_id: u32, end_id: u32, expression: &str) -> Result<()> {
        let expr = parser::parse(expression)?;
        if expr.class() != ExpressionClass::Tag {
            return Err(Error::InvalidArgument(format!(
                "tag selection expected for defining a sub section: '{}'",
                expression
            )));
        }
        let exit = Expression {
            steps: expr.steps.clone(),
            selection: Selection::TagExit,
        };
        self.push_expr(start_id, expr);
        self.push_expr(end_id, exit);
        Ok(())
    }

    fn push_expr(&mut self, id: u32, expr: Expression) {
        self.exprs.push(CompiledExpr {
            id,
            steps: expr.steps,
            selection: expr.selection,
        });
    }

    /// True if no expression has been defined.
    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty()
    }

    /// Creates a fresh matching context for one document.
    pub fn create_context(&self) -> XPathContext<'_> {
        let mut root = Scope::default();
        for (ord, expr) in self.exprs.iter().enumerate() {
            if expr.steps.is_empty() {
                root.full.push(ord);
            } else {
                root.states.push(State { ord, next: 0 });
            }
        }
        XPathContext {
            automaton: self,
            scopes: vec![root],
            matches: Vec::new(),
            match_at: 0,
            cur_attr: None,
        }
    }
}

/// A confirmed partial match: the first `next` steps of expression `ord`
/// match the current tag path.
#[derive(Clone, Copy, Debug)]
struct State {
    ord: usize,
    next: usize,
}

/// A partial match whose latest step still has unsatisfied attribute
/// predicates. It is confirmed (or silently dropped) by the attribute
/// events that follow the open tag.
#[derive(Clone, Debug)]
struct CondState {
    ord: usize,
    next: usize,
    unmet: Vec<bool>,
}

/// Matcher state for one open tag depth.
#[derive(Clone, Debug, Default)]
struct Scope {
    /// Confirmed partial matches valid below this tag
    states: Vec<State>,
    /// Matches into this tag awaiting attribute predicates
    awaiting: Vec<CondState>,
    /// Expressions fully matched at this tag, by compile order
    full: Vec<usize>,
    /// Attribute selections armed by the last attribute name event
    armed: Vec<usize>,
}

/// Streaming matching context of an [`XPathAutomaton`], bound to one
/// document event stream.
#[derive(Debug)]
pub struct XPathContext<'a> {
    automaton: &'a XPathAutomaton,
    scopes: Vec<Scope>,
    matches: Vec<u32>,
    match_at: usize,
    cur_attr: Option<Vec<u8>>,
}

fn step_matches(step: &Step, name: &[u8]) -> bool {
    match &step.name {
        Some(expected) => expected.as_bytes() == name,
        None => true,
    }
}

impl<'a> XPathContext<'a> {
    /// Pushes the next structural event of the document. Any matches the
    /// event produced must be drained with [`next_match`] before the next
    /// push.
    ///
    /// [`next_match`]: Self::next_match
    pub fn put_element(&mut self, kind: ElementType, value: &[u8]) {
        self.matches.clear();
        self.match_at = 0;
        let mut emitted: Vec<usize> = Vec::new();
        match kind {
            ElementType::OpenTag => self.open_tag(value, &mut emitted),
            ElementType::CloseTag => self.close_tag(&mut emitted),
            ElementType::TagAttribName => self.attrib_name(value),
            ElementType::TagAttribValue => self.attrib_value(value, &mut emitted),
            ElementType::Content => {
                if let Some(scope) = self.scopes.last() {
                    for &ord in &scope.full {
                        if self.automaton.exprs[ord].selection == Selection::Content {
                            emitted.push(ord);
                        }
                    }
                }
            }
            ElementType::Exit => {}
        }
        emitted.sort_unstable();
        self.matches
            .extend(emitted.into_iter().map(|ord| self.automaton.exprs[ord].id));
    }

    /// Returns the next matched expression id of the last pushed event.
    pub fn next_match(&mut self) -> Option<u32> {
        let id = self.matches.get(self.match_at).copied();
        self.match_at += 1;
        id
    }

    fn open_tag(&mut self, name: &[u8], emitted: &mut Vec<usize>) {
        let exprs = &self.automaton.exprs;
        let mut scope = Scope::default();
        if let Some(parent) = self.scopes.last() {
            for &State { ord, next } in &parent.states {
                let step = &exprs[ord].steps[next];
                if step.axis == parser::Axis::Descendant {
                    // a descendant step stays alive for deeper tags
                    Self::push_state(&mut scope, State { ord, next });
                }
                if step_matches(step, name) {
                    if step.conds.is_empty() {
                        Self::advance(exprs, &mut scope, ord, next + 1, emitted);
                    } else {
                        scope.awaiting.push(CondState {
                            ord,
                            next: next + 1,
                            unmet: vec![true; step.conds.len()],
                        });
                    }
                }
            }
        }
        self.scopes.push(scope);
    }

    fn close_tag(&mut self, emitted: &mut Vec<usize>) {
        // the root scope holds the seed states and is never popped
        if self.scopes.len() > 1 {
            let scope = self.scopes.pop().expect("scope stack underflow");
            for ord in scope.full {
                if self.automaton.exprs[ord].selection == Selection::TagExit {
                    emitted.push(ord);
                }
            }
        }
        self.cur_attr = None;
    }

    fn attrib_name(&mut self, name: &[u8]) {
        self.cur_attr = Some(name.to_vec());
        if let Some(scope) = self.scopes.last_mut() {
            scope.armed.clear();
            for &ord in &scope.full {
                if let Selection::Attribute(sel) = &self.automaton.exprs[ord].selection {
                    if sel.as_bytes() == name {
                        scope.armed.push(ord);
                    }
                }
            }
        }
    }

    fn attrib_value(&mut self, value: &[u8], emitted: &mut Vec<usize>) {
        let attr = self.cur_attr.take();
        let exprs = &self.automaton.exprs;
        let scope = match self.scopes.last_mut() {
            Some(scope) => scope,
            None => return,
        };
        // resolve pending attribute predicates of the enclosing tag
        if let Some(attr) = &attr {
            let mut confirmed = Vec::new();
            let mut at = 0;
            while at < scope.awaiting.len() {
                let cond_state = &mut scope.awaiting[at];
                let step = &exprs[cond_state.ord].steps[cond_state.next - 1];
                for (idx, cond) in step.conds.iter().enumerate() {
                    if cond_state.unmet[idx]
                        && cond.name.as_bytes() == attr.as_slice()
                        && cond.value.as_bytes() == value
                    {
                        cond_state.unmet[idx] = false;
                    }
                }
                if cond_state.unmet.iter().all(|unmet| !unmet) {
                    confirmed.push(scope.awaiting.remove(at));
                } else {
                    at += 1;
                }
            }
            for cond_state in confirmed {
                Self::advance(exprs, scope, cond_state.ord, cond_state.next, emitted);
            }
        }
        // attribute value selections armed by the preceding name event
        emitted.extend(scope.armed.drain(..));
    }

    /// Records that `ord` has matched its first `next` steps in `scope`,
    /// emitting tag selections that became complete. Overlapping descendant
    /// steps can derive the same state twice; duplicates are collapsed so
    /// that one event never emits an id twice for one expression.
    fn advance(
        exprs: &[CompiledExpr],
        scope: &mut Scope,
        ord: usize,
        next: usize,
        emitted: &mut Vec<usize>,
    ) {
        if next == exprs[ord].steps.len() {
            if !scope.full.contains(&ord) {
                scope.full.push(ord);
                if exprs[ord].selection == Selection::Tag {
                    emitted.push(ord);
                }
            }
        } else {
            Self::push_state(scope, State { ord, next });
        }
    }

    fn push_state(scope: &mut Scope, state: State) {
        if !scope
            .states
            .iter()
            .any(|s| s.ord == state.ord && s.next == state.next)
        {
            scope.states.push(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn drive(automaton: &XPathAutomaton, events: &[(ElementType, &str)]) -> Vec<(usize, u32)> {
        let mut ctx = automaton.create_context();
        let mut out = Vec::new();
        for (evidx, (kind, value)) in events.iter().enumerate() {
            ctx.put_element(*kind, value.as_bytes());
            while let Some(id) = ctx.next_match() {
                out.push((evidx, id));
            }
        }
        out
    }

    #[test]
    fn content_selection_on_absolute_path() {
        let mut automaton = XPathAutomaton::new();
        automaton.define_selector_expression(1, "/doc/title()").unwrap();
        let matches = drive(
            &automaton,
            &[
                (ElementType::OpenTag, "doc"),
                (ElementType::OpenTag, "title"),
                (ElementType::Content, "Hello"),
                (ElementType::CloseTag, ""),
                (ElementType::CloseTag, ""),
            ],
        );
        assert_eq!(matches, vec![(2, 1)]);
    }

    #[test]
    fn descendant_matches_every_depth() {
        let mut automaton = XPathAutomaton::new();
        automaton.define_selector_expression(7, "//a()").unwrap();
        let matches = drive(
            &automaton,
            &[
                (ElementType::OpenTag, "doc"),
                (ElementType::OpenTag, "a"),
                (ElementType::Content, "x"),
                (ElementType::CloseTag, ""),
                (ElementType::OpenTag, "b"),
                (ElementType::OpenTag, "a"),
                (ElementType::Content, "y"),
                (ElementType::CloseTag, ""),
                (ElementType::CloseTag, ""),
                (ElementType::CloseTag, ""),
            ],
        );
        assert_eq!(matches, vec![(2, 7), (6, 7)]);
    }

    #[test]
    fn content_does_not_leak_to_child_tags() {
        let mut automaton = XPathAutomaton::new();
        automaton.define_selector_expression(1, "/doc()").unwrap();
        let matches = drive(
            &automaton,
            &[
                (ElementType::OpenTag, "doc"),
                (ElementType::OpenTag, "child"),
                (ElementType::Content, "inner"),
                (ElementType::CloseTag, ""),
                (ElementType::Content, "outer"),
                (ElementType::CloseTag, ""),
            ],
        );
        assert_eq!(matches, vec![(4, 1)]);
    }

    #[test]
    fn attribute_selection_fires_on_value() {
        let mut automaton = XPathAutomaton::new();
        automaton.define_selector_expression(3, "/doc/link@href").unwrap();
        let matches = drive(
            &automaton,
            &[
                (ElementType::OpenTag, "doc"),
                (ElementType::OpenTag, "link"),
                (ElementType::TagAttribName, "rel"),
                (ElementType::TagAttribValue, "prev"),
                (ElementType::TagAttribName, "href"),
                (ElementType::TagAttribValue, "/index"),
                (ElementType::CloseTag, ""),
                (ElementType::CloseTag, ""),
            ],
        );
        assert_eq!(matches, vec![(5, 3)]);
    }

    #[test]
    fn attribute_condition_gates_content() {
        let mut automaton = XPathAutomaton::new();
        automaton
            .define_selector_expression(1, "/doc/p[@lang=\"en\"]()")
            .unwrap();
        let matches = drive(
            &automaton,
            &[
                (ElementType::OpenTag, "doc"),
                (ElementType::OpenTag, "p"),
                (ElementType::TagAttribName, "lang"),
                (ElementType::TagAttribValue, "de"),
                (ElementType::Content, "nein"),
                (ElementType::CloseTag, ""),
                (ElementType::OpenTag, "p"),
                (ElementType::TagAttribName, "lang"),
                (ElementType::TagAttribValue, "en"),
                (ElementType::Content, "yes"),
                (ElementType::CloseTag, ""),
                (ElementType::CloseTag, ""),
            ],
        );
        assert_eq!(matches, vec![(9, 1)]);
    }

    #[test]
    fn subsection_fires_enter_and_exit() {
        let mut automaton = XPathAutomaton::new();
        automaton.define_subsection(100, 200, "/list/item").unwrap();
        let matches = drive(
            &automaton,
            &[
                (ElementType::OpenTag, "list"),
                (ElementType::OpenTag, "item"),
                (ElementType::Content, "x"),
                (ElementType::CloseTag, ""),
                (ElementType::OpenTag, "item"),
                (ElementType::CloseTag, ""),
                (ElementType::CloseTag, ""),
            ],
        );
        assert_eq!(matches, vec![(1, 100), (3, 200), (4, 100), (5, 200)]);
    }

    #[test]
    fn subsection_requires_tag_selection() {
        let mut automaton = XPathAutomaton::new();
        assert!(matches!(
            automaton.define_subsection(1, 2, "/list/item()"),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn compile_order_breaks_ties() {
        let mut automaton = XPathAutomaton::new();
        automaton.define_selector_expression(9, "//a()").unwrap();
        automaton.define_selector_expression(4, "/doc/a()").unwrap();
        let matches = drive(
            &automaton,
            &[
                (ElementType::OpenTag, "doc"),
                (ElementType::OpenTag, "a"),
                (ElementType::Content, "x"),
                (ElementType::CloseTag, ""),
                (ElementType::CloseTag, ""),
            ],
        );
        // both match the same event; id 9 was compiled first
        assert_eq!(matches, vec![(2, 9), (2, 4)]);
    }

    #[test]
    fn wildcard_matches_any_tag() {
        let mut automaton = XPathAutomaton::new();
        automaton.define_selector_expression(5, "/doc/*()").unwrap();
        let matches = drive(
            &automaton,
            &[
                (ElementType::OpenTag, "doc"),
                (ElementType::OpenTag, "anything"),
                (ElementType::Content, "v"),
                (ElementType::CloseTag, ""),
                (ElementType::CloseTag, ""),
            ],
        );
        assert_eq!(matches, vec![(2, 5)]);
    }
}
