//! Positioned intermediate terms and the two passes that turn byte
//! positions into ordinal positions: priority coverage reduction and
//! position binding.

use crate::analyzer::features::{FeatureClass, PositionBind};

/// An intermediate term: typed, normalized, located by segment position
/// and offset, prior to ordinal position assignment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BindTerm {
    /// Position of the segment the term originates from
    pub seg_pos: u64,
    /// Byte offset of the token inside the segment
    pub ofs: u32,
    /// Byte length of the token inside the segment
    pub len: u32,
    /// Feature priority, decides coverage reduction
    pub priority: i32,
    /// Position binding policy
    pub pos_bind: PositionBind,
    /// Feature class the term belongs to
    pub class: FeatureClass,
    /// Term type name
    pub kind: String,
    /// Normalized term value
    pub value: String,
}

impl BindTerm {
    /// Stable sort key: byte position order.
    fn sort_key(&self) -> (u64, u32, u32, i64) {
        // longer and higher-priority terms first at equal start, so that a
        // covering term precedes the terms it covers
        (
            self.seg_pos,
            self.ofs,
            u32::MAX - self.len,
            -(self.priority as i64),
        )
    }
}

/// Sorts terms by byte position. Equal positions keep their relative
/// emission order except that longer and higher-priority terms come
/// first, which the coverage scan below relies on.
pub fn sort_by_position(terms: &mut [BindTerm]) {
    terms.sort_by_key(BindTerm::sort_key);
}

/// Drops every term that is strictly contained in a term of higher
/// priority within the same segment region. Terms of equal priority never
/// eliminate each other. The input must be sorted with
/// [`sort_by_position`].
pub fn eliminate_covered_elements(terms: &mut Vec<BindTerm>) {
    if terms.iter().skip(1).all(|t| t.priority == terms[0].priority) {
        return;
    }
    let kept: Vec<BindTerm> = terms
        .iter()
        .enumerate()
        .filter(|(idx, term)| {
            let end = term.ofs as u64 + term.len as u64;
            !terms[..*idx].iter().rev().any(|prev| {
                prev.seg_pos == term.seg_pos
                    && prev.priority > term.priority
                    && prev.ofs <= term.ofs
                    && prev.ofs as u64 + prev.len as u64 >= end
            })
        })
        .map(|(_, term)| term.clone())
        .collect();
    *terms = kept;
}

/// Assigns ordinal positions to a byte-position-sorted term list.
///
/// The counter starts at zero; every content-bound term at a new byte
/// position advances it. Content terms sharing one byte position share
/// the resulting ordinal position, which keeps the search and forward
/// index aligned when several features select the same token. Successor
/// terms inherit the position of the next content term and are dropped
/// when none follows; predecessor terms inherit the position of the last
/// content term and are dropped when none preceded. A maximal run of
/// unique-bound terms advances the counter once and shares the resulting
/// position.
///
/// Returns `(term_index, ordinal_position)` pairs in input order for the
/// surviving terms.
pub fn assign_positions(terms: &[BindTerm]) -> Vec<(usize, u32)> {
    let mut assigned: Vec<(usize, u32)> = Vec::with_capacity(terms.len());
    let mut counter = 0u32;
    let mut pending_successors: Vec<usize> = Vec::new();
    let mut last_content: Option<u32> = None;
    let mut last_content_at: Option<(u64, u32)> = None;
    let mut in_unique_run = false;

    for (idx, term) in terms.iter().enumerate() {
        match term.pos_bind {
            PositionBind::Content => {
                if last_content_at != Some((term.seg_pos, term.ofs)) {
                    counter += 1;
                    last_content_at = Some((term.seg_pos, term.ofs));
                }
                in_unique_run = false;
                for succ in pending_successors.drain(..) {
                    assigned.push((succ, counter));
                }
                assigned.push((idx, counter));
                last_content = Some(counter);
            }
            PositionBind::Unique => {
                if !in_unique_run {
                    counter += 1;
                    in_unique_run = true;
                }
                assigned.push((idx, counter));
            }
            PositionBind::Successor => {
                pending_successors.push(idx);
            }
            PositionBind::Predecessor => {
                if let Some(pos) = last_content {
                    assigned.push((idx, pos));
                }
            }
        }
    }
    // successors with no following content term are dropped
    assigned.sort_unstable();
    assigned
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn term(seg_pos: u64, ofs: u32, len: u32, priority: i32, value: &str) -> BindTerm {
        BindTerm {
            seg_pos,
            ofs,
            len,
            priority,
            pos_bind: PositionBind::Content,
            class: FeatureClass::SearchIndexTerm,
            kind: "word".to_string(),
            value: value.to_string(),
        }
    }

    fn bound(value: &str, bind: PositionBind, ofs: u32) -> BindTerm {
        BindTerm {
            pos_bind: bind,
            ..term(0, ofs, 1, 0, value)
        }
    }

    #[test]
    fn higher_priority_covers_contained_terms() {
        let mut terms = vec![
            term(5, 0, 5, 1, "hello"),
            term(5, 6, 5, 1, "world"),
            term(5, 0, 11, 2, "hello world"),
        ];
        sort_by_position(&mut terms);
        eliminate_covered_elements(&mut terms);
        assert_eq!(terms.len(), 1);
        assert_eq!(terms[0].value, "hello world");
    }

    #[test]
    fn equal_priority_never_eliminates() {
        let mut terms = vec![term(0, 0, 5, 1, "hello"), term(0, 0, 11, 1, "hello world")];
        sort_by_position(&mut terms);
        eliminate_covered_elements(&mut terms);
        assert_eq!(terms.len(), 2);
    }

    #[test]
    fn coverage_is_limited_to_the_segment() {
        let mut terms = vec![term(0, 0, 20, 2, "wide"), term(9, 2, 3, 1, "kept")];
        sort_by_position(&mut terms);
        eliminate_covered_elements(&mut terms);
        assert_eq!(terms.len(), 2);
    }

    #[test]
    fn content_positions_are_contiguous() {
        let terms = vec![
            bound("a", PositionBind::Content, 0),
            bound("b", PositionBind::Content, 2),
            bound("c", PositionBind::Content, 4),
        ];
        assert_eq!(assign_positions(&terms), vec![(0, 1), (1, 2), (2, 3)]);
    }

    #[test]
    fn successor_inherits_next_content_position() {
        let terms = vec![
            bound("a", PositionBind::Content, 0),
            bound(".", PositionBind::Successor, 1),
            bound("b", PositionBind::Content, 2),
        ];
        assert_eq!(assign_positions(&terms), vec![(0, 1), (1, 2), (2, 2)]);
    }

    #[test]
    fn successor_without_content_is_dropped() {
        let terms = vec![
            bound("a", PositionBind::Content, 0),
            bound(".", PositionBind::Successor, 1),
        ];
        assert_eq!(assign_positions(&terms), vec![(0, 1)]);
    }

    #[test]
    fn predecessor_without_content_is_dropped() {
        let terms = vec![
            bound(".", PositionBind::Predecessor, 0),
            bound("a", PositionBind::Content, 1),
            bound(",", PositionBind::Predecessor, 2),
        ];
        assert_eq!(assign_positions(&terms), vec![(1, 1), (2, 1)]);
    }

    #[test]
    fn stacked_terms_share_one_position() {
        let terms = vec![
            bound("ab", PositionBind::Content, 0),
            bound("AB", PositionBind::Content, 0),
            bound("cd", PositionBind::Content, 3),
        ];
        assert_eq!(assign_positions(&terms), vec![(0, 1), (1, 1), (2, 2)]);
    }

    #[test]
    fn unique_run_collapses_to_one_position() {
        let terms = vec![
            bound("a", PositionBind::Content, 0),
            bound("u1", PositionBind::Unique, 1),
            bound("u2", PositionBind::Unique, 2),
            bound("b", PositionBind::Content, 3),
        ];
        assert_eq!(
            assign_positions(&terms),
            vec![(0, 1), (1, 2), (2, 2), (3, 3)]
        );
    }
}
