//! The query analyzer: field-driven analysis and grouping of the
//! resulting terms into a query expression tree.
//!
//! Input fields are labeled with a field type; every analyzer element
//! whose field type matches produces terms for the field. Grouping
//! directives then build a forest bottom-up over the analyzed elements,
//! and the forest is emitted in post-order as a flat instruction stream.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::analyzer::features::{FeatureClass, FeatureConfigMap, FeatureOptions};
use crate::analyzer::segment_processor::SegmentProcessor;
use crate::errors::{Error, Result};
use crate::textproc::{Normalizer, Tokenizer};

/// An analyzed query term, keyed by the number of the input field it was
/// produced from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryElement {
    /// Term type name
    pub kind: String,
    /// Normalized term value
    pub value: String,
    /// Number of the input field
    pub field_no: u32,
    /// Ordinal position within the field
    pub pos: u32,
    /// Byte offset of the source token in the field content
    pub ofs: u32,
    /// Byte length of the source token
    pub len: u32,
    /// Feature priority
    pub priority: i32,
}

impl QueryElement {
    fn end(&self) -> u32 {
        self.ofs + self.len
    }
}

/// How selected nodes are grouped by one directive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GroupBy {
    /// Partition the nodes by position, one group per partition
    ByPosition,
    /// Require the selection to reduce to exactly one node
    Unique,
    /// All selected nodes into one group
    All,
    /// Each selected node into its own group
    Every,
}

/// One instruction of the flat query expression stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Instruction {
    /// Push the term with the given element index
    Term(usize),
    /// Apply the group operator to the top `nof_operands` entries
    Operator {
        /// Id of the grouping directive that created the node
        group_id: u32,
        /// Number of operands popped by the operator
        nof_operands: usize,
    },
}

/// The analyzed query: elements plus a post-order instruction stream.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryTermExpression {
    elements: Vec<QueryElement>,
    instructions: Vec<Instruction>,
}

impl QueryTermExpression {
    /// The analyzed query elements.
    pub fn elements(&self) -> &[QueryElement] {
        &self.elements
    }

    /// The instruction stream in post-order.
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Resolves the element of a [`Instruction::Term`].
    pub fn term(&self, idx: usize) -> &QueryElement {
        &self.elements[idx]
    }

    fn push_term(&mut self, idx: usize) {
        self.instructions.push(Instruction::Term(idx));
    }

    fn push_operator(&mut self, group_id: u32, nof_operands: usize) {
        self.instructions.push(Instruction::Operator {
            group_id,
            nof_operands,
        });
    }
}

/// The query analyzer configuration: elements keyed by field type.
#[derive(Default)]
pub struct QueryAnalyzer {
    config_map: FeatureConfigMap,
    field_map: HashMap<String, Vec<u32>>,
}

impl QueryAnalyzer {
    /// Creates an analyzer with no elements defined.
    pub fn new() -> QueryAnalyzer {
        QueryAnalyzer::default()
    }

    /// Defines an element: fields of `field_type` produce terms of
    /// `term_type` with the given tokenizer, normalizer chain and
    /// priority. Multiple elements may share one field type.
    pub fn add_element(
        &mut self,
        term_type: &str,
        field_type: &str,
        tokenizer: Arc<dyn Tokenizer>,
        normalizers: Vec<Arc<dyn Normalizer>>,
        priority: i32,
    ) -> Result<()> {
        if field_type.trim().is_empty() {
            return Err(Error::InvalidArgument(
                "field type name must not be empty".to_string(),
            ));
        }
        let featidx = self.config_map.define_feature(
            FeatureClass::SearchIndexTerm,
            term_type,
            "",
            tokenizer,
            normalizers,
            priority,
            FeatureOptions::default(),
        )?;
        self.field_map
            .entry(field_type.to_lowercase())
            .or_default()
            .push(featidx);
        Ok(())
    }

    /// The defined term type names.
    pub fn query_term_types(&self) -> Vec<String> {
        self.config_map
            .iter()
            .map(|(_, config)| config.name().to_string())
            .collect()
    }

    /// The defined field type names.
    pub fn query_field_types(&self) -> Vec<String> {
        self.field_map.keys().cloned().collect()
    }

    /// Creates an analysis context for one query.
    pub fn create_context(&self) -> QueryAnalyzerContext<'_> {
        QueryAnalyzerContext {
            analyzer: self,
            fields: Vec::new(),
            groups: Vec::new(),
        }
    }
}

struct Field {
    field_no: u32,
    field_type: String,
    content: String,
}

struct Group {
    group_id: u32,
    field_nos: Vec<u32>,
    group_by: GroupBy,
    group_single: bool,
}

/// Analysis context of one query: input fields and grouping directives.
pub struct QueryAnalyzerContext<'a> {
    analyzer: &'a QueryAnalyzer,
    fields: Vec<Field>,
    groups: Vec<Group>,
}

impl QueryAnalyzerContext<'_> {
    /// Adds an input field. Field numbers are caller-chosen positive
    /// integers; several fields may share one number.
    pub fn put_field(
        &mut self,
        field_no: u32,
        field_type: &str,
        content: &str,
    ) -> Result<()> {
        if field_no == 0 {
            return Err(Error::InvalidArgument(
                "field number must be a positive integer".to_string(),
            ));
        }
        self.fields.push(Field {
            field_no,
            field_type: field_type.to_lowercase(),
            content: content.to_string(),
        });
        Ok(())
    }

    /// Adds a grouping directive over the elements of the given fields.
    /// Directives are applied in the order they were added.
    pub fn group_elements(
        &mut self,
        group_id: u32,
        field_nos: &[u32],
        group_by: GroupBy,
        group_single: bool,
    ) -> Result<()> {
        if group_id == 0 {
            return Err(Error::InvalidArgument(
                "group identifier must be a positive integer".to_string(),
            ));
        }
        self.groups.push(Group {
            group_id,
            field_nos: field_nos.to_vec(),
            group_by,
            group_single,
        });
        Ok(())
    }

    fn analyze_query_fields(&self) -> Result<Vec<QueryElement>> {
        let mut processor = SegmentProcessor::new(&self.analyzer.config_map);
        for field in &self.fields {
            let featidxs = self
                .analyzer
                .field_map
                .get(&field.field_type)
                .ok_or_else(|| {
                    Error::UnknownIdentifier(format!(
                        "analyzer query field '{}' is undefined",
                        field.field_type
                    ))
                })?;
            for &featidx in featidxs {
                processor.process_document_segment(
                    featidx,
                    field.field_no as u64,
                    field.content.as_bytes(),
                )?;
            }
        }
        Ok(processor.fetch_query())
    }

    /// Runs the analysis: tokenize and normalize all fields, reduce
    /// covered elements, apply the grouping directives and emit the
    /// instruction stream in post-order.
    pub fn analyze(&self) -> Result<QueryTermExpression> {
        let mut elements = self.analyze_query_fields()?;
        eliminate_covered_elements(&mut elements);

        let mut expression = QueryTermExpression {
            elements,
            instructions: Vec::new(),
        };
        if self.groups.is_empty() {
            for idx in 0..expression.elements.len() {
                expression.push_term(idx);
            }
            return Ok(expression);
        }
        let tree = build_query_tree(&self.groups, &expression.elements)?;
        for &root in &tree.roots {
            emit_node(&mut expression, &tree, root);
        }
        Ok(expression)
    }
}

/// Drops query elements strictly contained in an element of higher
/// priority within the same field.
fn eliminate_covered_elements(elements: &mut Vec<QueryElement>) {
    if elements
        .iter()
        .skip(1)
        .all(|e| e.priority == elements[0].priority)
    {
        return;
    }
    elements.sort_by_key(|e| (e.field_no, e.ofs, u32::MAX - e.len, -(e.priority as i64)));
    let kept: Vec<QueryElement> = elements
        .iter()
        .enumerate()
        .filter(|(idx, element)| {
            !elements[..*idx].iter().rev().any(|prev| {
                prev.field_no == element.field_no
                    && prev.priority > element.priority
                    && prev.ofs <= element.ofs
                    && prev.end() >= element.end()
            })
        })
        .map(|(_, element)| element.clone())
        .collect();
    *elements = kept;
}

struct TreeNode {
    group_id: u32,
    element: Option<usize>,
    position: u32,
    children: Vec<usize>,
}

struct QueryTree {
    nodes: Vec<TreeNode>,
    roots: Vec<usize>,
}

/// Removes duplicates from a node argument list, keeping first
/// occurrences in order.
fn reduce_unified_nodes(args: &[usize]) -> Vec<usize> {
    let mut seen = std::collections::HashSet::new();
    args.iter()
        .copied()
        .filter(|arg| seen.insert(*arg))
        .collect()
}

fn build_query_tree(groups: &[Group], elements: &[QueryElement]) -> Result<QueryTree> {
    let mut nodes: Vec<TreeNode> = Vec::with_capacity(elements.len());
    // current root node of each leaf element
    let mut element_root: Vec<usize> = Vec::with_capacity(elements.len());
    let mut field_elements: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
    for (idx, element) in elements.iter().enumerate() {
        field_elements.entry(element.field_no).or_default().push(idx);
        element_root.push(nodes.len());
        nodes.push(TreeNode {
            group_id: 0,
            element: Some(idx),
            position: element.pos,
            children: Vec::new(),
        });
    }

    for group in groups {
        // root nodes of the elements of the selected fields
        let mut args: Vec<usize> = Vec::new();
        for field_no in &group.field_nos {
            if *field_no == 0 {
                return Err(Error::InvalidArgument(
                    "field number in group must be a positive integer".to_string(),
                ));
            }
            for &elemidx in field_elements.get(field_no).map(Vec::as_slice).unwrap_or(&[]) {
                let root = element_root[elemidx];
                if args.last() != Some(&root) {
                    args.push(root);
                }
            }
        }
        match group.group_by {
            GroupBy::ByPosition => {
                let mut partitions: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
                for &arg in &args {
                    partitions.entry(nodes[arg].position).or_default().push(arg);
                }
                for (position, partition) in partitions {
                    let uargs = reduce_unified_nodes(&partition);
                    if uargs.len() > 1 || (group.group_single && !uargs.is_empty()) {
                        link_group(&mut nodes, &mut element_root, group.group_id, position, uargs);
                    }
                }
            }
            GroupBy::Unique => {
                if !group.group_single {
                    return Err(Error::InvalidArgument(
                        "group unique contradicts suppressing single child groups".to_string(),
                    ));
                }
                let uargs = reduce_unified_nodes(&args);
                if uargs.len() != 1 {
                    return Err(Error::InvalidArgument(
                        "analyzed query fields did not create the unique element required"
                            .to_string(),
                    ));
                }
                let position = nodes[uargs[0]].position;
                link_group(&mut nodes, &mut element_root, group.group_id, position, uargs);
            }
            GroupBy::All => {
                let uargs = reduce_unified_nodes(&args);
                if uargs.len() > 1 || (group.group_single && !uargs.is_empty()) {
                    let position = nodes[uargs[0]].position;
                    link_group(&mut nodes, &mut element_root, group.group_id, position, uargs);
                }
            }
            GroupBy::Every => {
                if !group.group_single {
                    return Err(Error::InvalidArgument(
                        "group every contradicts suppressing single child groups".to_string(),
                    ));
                }
                for arg in reduce_unified_nodes(&args) {
                    let position = nodes[arg].position;
                    link_group(
                        &mut nodes,
                        &mut element_root,
                        group.group_id,
                        position,
                        vec![arg],
                    );
                }
            }
        }
    }

    // distinct roots in node creation order
    let mut roots: Vec<usize> = element_root.clone();
    roots.sort_unstable();
    roots.dedup();
    Ok(QueryTree { nodes, roots })
}

/// Creates a group node over `children` and re-roots their elements.
fn link_group(
    nodes: &mut Vec<TreeNode>,
    element_root: &mut [usize],
    group_id: u32,
    position: u32,
    children: Vec<usize>,
) {
    let new_root = nodes.len();
    for root in element_root.iter_mut() {
        if children.contains(root) {
            *root = new_root;
        }
    }
    nodes.push(TreeNode {
        group_id,
        element: None,
        position,
        children,
    });
}

fn emit_node(expression: &mut QueryTermExpression, tree: &QueryTree, nodeidx: usize) {
    let node = &tree.nodes[nodeidx];
    if node.children.is_empty() {
        if let Some(element) = node.element {
            expression.push_term(element);
        }
    } else {
        for &child in &node.children {
            emit_node(expression, tree, child);
        }
        expression.push_operator(node.group_id, node.children.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::textproc::TextProcessor;
    use pretty_assertions::assert_eq;

    fn analyzer() -> QueryAnalyzer {
        let proc = TextProcessor::standard();
        let mut analyzer = QueryAnalyzer::new();
        analyzer
            .add_element(
                "word",
                "text",
                proc.tokenizer("word", &[]).unwrap(),
                vec![proc.normalizer("lc", &[]).unwrap()],
                0,
            )
            .unwrap();
        analyzer
    }

    #[test]
    fn flat_terms_without_groups() {
        let analyzer = analyzer();
        let mut ctx = analyzer.create_context();
        ctx.put_field(1, "text", "Hello World").unwrap();
        let expression = ctx.analyze().unwrap();
        let values: Vec<&str> = expression
            .instructions()
            .iter()
            .map(|inst| match inst {
                Instruction::Term(idx) => expression.term(*idx).value.as_str(),
                other => panic!("unexpected instruction {:?}", other),
            })
            .collect();
        assert_eq!(values, vec!["hello", "world"]);
        assert_eq!(expression.elements()[0].pos, 1);
        assert_eq!(expression.elements()[1].pos, 2);
    }

    #[test]
    fn unknown_field_type_fails() {
        let analyzer = analyzer();
        let mut ctx = analyzer.create_context();
        ctx.put_field(1, "nosuch", "x").unwrap();
        assert!(matches!(
            ctx.analyze(),
            Err(Error::UnknownIdentifier(_))
        ));
    }

    #[test]
    fn group_all_wraps_field_elements() {
        let analyzer = analyzer();
        let mut ctx = analyzer.create_context();
        ctx.put_field(1, "text", "a b").unwrap();
        ctx.group_elements(7, &[1], GroupBy::All, true).unwrap();
        let expression = ctx.analyze().unwrap();
        assert_eq!(
            expression.instructions(),
            &[
                Instruction::Term(0),
                Instruction::Term(1),
                Instruction::Operator {
                    group_id: 7,
                    nof_operands: 2
                },
            ]
        );
    }

    #[test]
    fn group_single_false_suppresses_wrapping() {
        let analyzer = analyzer();
        let mut ctx = analyzer.create_context();
        ctx.put_field(1, "text", "solo").unwrap();
        ctx.group_elements(7, &[1], GroupBy::All, false).unwrap();
        let expression = ctx.analyze().unwrap();
        assert_eq!(expression.instructions(), &[Instruction::Term(0)]);
    }

    #[test]
    fn group_by_position_partitions() {
        let proc = TextProcessor::standard();
        let mut analyzer = QueryAnalyzer::new();
        // two elements on the same field type produce stacked terms
        analyzer
            .add_element(
                "word",
                "text",
                proc.tokenizer("word", &[]).unwrap(),
                vec![proc.normalizer("lc", &[]).unwrap()],
                0,
            )
            .unwrap();
        analyzer
            .add_element(
                "stem",
                "text",
                proc.tokenizer("word", &[]).unwrap(),
                vec![proc.normalizer("uc", &[]).unwrap()],
                0,
            )
            .unwrap();
        let mut ctx = analyzer.create_context();
        ctx.put_field(1, "text", "ab cd").unwrap();
        ctx.group_elements(3, &[1], GroupBy::ByPosition, true).unwrap();
        let expression = ctx.analyze().unwrap();
        // one group per position, each with the word and stem variant
        let operators: Vec<&Instruction> = expression
            .instructions()
            .iter()
            .filter(|inst| matches!(inst, Instruction::Operator { .. }))
            .collect();
        assert_eq!(
            operators,
            vec![
                &Instruction::Operator {
                    group_id: 3,
                    nof_operands: 2
                };
                2
            ]
        );
    }

    #[test]
    fn group_unique_requires_one_node() {
        let analyzer = analyzer();
        let mut ctx = analyzer.create_context();
        ctx.put_field(1, "text", "a b").unwrap();
        ctx.group_elements(2, &[1], GroupBy::Unique, true).unwrap();
        assert!(ctx.analyze().is_err());

        let mut ctx = analyzer.create_context();
        ctx.put_field(1, "text", "a b").unwrap();
        ctx.group_elements(2, &[1], GroupBy::All, true).unwrap();
        ctx.group_elements(3, &[1], GroupBy::Unique, true).unwrap();
        let expression = ctx.analyze().unwrap();
        assert_eq!(
            expression.instructions().last(),
            Some(&Instruction::Operator {
                group_id: 3,
                nof_operands: 1
            })
        );
    }

    #[test]
    fn higher_priority_element_covers() {
        let proc = TextProcessor::standard();
        let mut analyzer = QueryAnalyzer::new();
        analyzer
            .add_element(
                "word",
                "text",
                proc.tokenizer("word", &[]).unwrap(),
                vec![proc.normalizer("lc", &[]).unwrap()],
                1,
            )
            .unwrap();
        analyzer
            .add_element(
                "phrase",
                "text",
                proc.tokenizer("content", &[]).unwrap(),
                vec![proc.normalizer("lc", &[]).unwrap()],
                2,
            )
            .unwrap();
        let mut ctx = analyzer.create_context();
        ctx.put_field(1, "text", "ab").unwrap();
        let expression = ctx.analyze().unwrap();
        assert_eq!(expression.elements().len(), 1);
        assert_eq!(expression.elements()[0].kind, "phrase");
    }
}
