//! Turns matched segments into positioned terms: tokenization,
//! normalization, concatenation buffers and the final document assembly.

use std::collections::BTreeMap;

use crate::analyzer::bindterm::{
    assign_positions, eliminate_covered_elements, sort_by_position, BindTerm,
};
use crate::analyzer::features::{FeatureClass, FeatureConfig, FeatureConfigMap};
use crate::analyzer::query::QueryElement;
use crate::document::{Document, NumericValue, Term};
use crate::errors::Result;

/// Maps a byte range of a concatenation buffer back to the segment it came
/// from.
#[derive(Clone, Copy, Debug)]
struct SegPosDef {
    start: usize,
    end: usize,
    seg_pos: u64,
}

/// Concatenation buffer of one feature with concat-before-tokenize
/// tokenizers.
#[derive(Clone, Debug, Default)]
struct Chunk {
    content: String,
    map: Vec<SegPosDef>,
}

/// Per-document segment sink. Collects the bind terms of all feature
/// classes and assembles the document when the input is exhausted.
pub(crate) struct SegmentProcessor<'a> {
    config_map: &'a FeatureConfigMap,
    concatenated: BTreeMap<u32, Chunk>,
    search_terms: Vec<BindTerm>,
    forward_terms: Vec<BindTerm>,
    metadata_terms: Vec<BindTerm>,
    attribute_terms: Vec<BindTerm>,
    pattern_lexem_terms: Vec<BindTerm>,
    warnings: Vec<String>,
}

impl<'a> SegmentProcessor<'a> {
    pub(crate) fn new(config_map: &'a FeatureConfigMap) -> SegmentProcessor<'a> {
        SegmentProcessor {
            config_map,
            concatenated: BTreeMap::new(),
            search_terms: Vec::new(),
            forward_terms: Vec::new(),
            metadata_terms: Vec::new(),
            attribute_terms: Vec::new(),
            pattern_lexem_terms: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Drops all collected state, making the processor ready for the next
    /// sub-document.
    pub(crate) fn clear(&mut self) {
        self.concatenated.clear();
        self.search_terms.clear();
        self.forward_terms.clear();
        self.metadata_terms.clear();
        self.attribute_terms.clear();
        self.pattern_lexem_terms.clear();
    }

    /// Warnings of recovered per-token failures.
    pub(crate) fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Tokenizes and normalizes one matched segment.
    pub(crate) fn process_document_segment(
        &mut self,
        featidx: u32,
        seg_pos: u64,
        bytes: &[u8],
    ) -> Result<()> {
        let config = self.config_map.get(featidx)?;
        let src = String::from_utf8_lossy(bytes);
        let map = [SegPosDef {
            start: 0,
            end: src.len(),
            seg_pos,
        }];
        Self::process_tokens(
            config,
            &src,
            &map,
            &mut self.warnings,
            class_sink(
                config.class(),
                &mut self.search_terms,
                &mut self.forward_terms,
                &mut self.metadata_terms,
                &mut self.attribute_terms,
                &mut self.pattern_lexem_terms,
            ),
        );
        Ok(())
    }

    /// Appends a segment to the concatenation buffer of its feature,
    /// recording the offset so tokens can be mapped back.
    pub(crate) fn concat_document_segment(
        &mut self,
        featidx: u32,
        seg_pos: u64,
        bytes: &[u8],
    ) -> Result<()> {
        self.config_map.get(featidx)?;
        let chunk = self.concatenated.entry(featidx).or_default();
        if !chunk.content.is_empty() {
            chunk.content.push(' ');
        }
        let start = chunk.content.len();
        chunk.content.push_str(&String::from_utf8_lossy(bytes));
        chunk.map.push(SegPosDef {
            start,
            end: chunk.content.len(),
            seg_pos,
        });
        Ok(())
    }

    /// Tokenizes all concatenation buffers. Called once per (sub-)document
    /// after segmentation has finished.
    pub(crate) fn process_concatenated(&mut self) -> Result<()> {
        let concatenated = std::mem::take(&mut self.concatenated);
        for (featidx, chunk) in concatenated {
            let config = self.config_map.get(featidx)?;
            Self::process_tokens(
                config,
                &chunk.content,
                &chunk.map,
                &mut self.warnings,
                class_sink(
                    config.class(),
                    &mut self.search_terms,
                    &mut self.forward_terms,
                    &mut self.metadata_terms,
                    &mut self.attribute_terms,
                    &mut self.pattern_lexem_terms,
                ),
            );
        }
        Ok(())
    }

    /// Injects externally produced terms (the pattern matching seam).
    pub(crate) fn process_pattern_match_result(&mut self, terms: Vec<BindTerm>) {
        for term in terms {
            match term.class {
                FeatureClass::SearchIndexTerm => self.search_terms.push(term),
                FeatureClass::ForwardIndexTerm => self.forward_terms.push(term),
                FeatureClass::MetaData => self.metadata_terms.push(term),
                FeatureClass::Attribute => self.attribute_terms.push(term),
                FeatureClass::PatternLexem => self.pattern_lexem_terms.push(term),
            }
        }
    }

    fn process_tokens(
        config: &FeatureConfig,
        src: &str,
        map: &[SegPosDef],
        warnings: &mut Vec<String>,
        sink: &mut Vec<BindTerm>,
    ) {
        let tokens = match config.tokenize(src) {
            Ok(tokens) => tokens,
            Err(err) => {
                warnings.push(format!(
                    "tokenizer of feature '{}' failed: {}",
                    config.name(),
                    err
                ));
                return;
            }
        };
        for token in tokens {
            let value = &src[token.ofs..token.ofs + token.len];
            let normalized = match config.normalize(value) {
                Ok(normalized) => normalized,
                Err(err) => {
                    warnings.push(format!(
                        "normalizer of feature '{}' dropped token '{}': {}",
                        config.name(),
                        value,
                        err
                    ));
                    continue;
                }
            };
            // map the token offset back to the originating segment
            let def = map
                .iter()
                .rev()
                .find(|def| def.start <= token.ofs)
                .copied()
                .unwrap_or(SegPosDef {
                    start: 0,
                    end: src.len(),
                    seg_pos: 0,
                });
            let rel_ofs = (token.ofs - def.start) as u32;
            let values = match normalized.strip_prefix('\0') {
                Some(multi) => multi.split('\0').map(str::to_string).collect(),
                None => vec![normalized],
            };
            for value in values {
                sink.push(BindTerm {
                    seg_pos: def.seg_pos,
                    ofs: rel_ofs,
                    len: token.len as u32,
                    priority: config.priority(),
                    pos_bind: config.options().position_bind,
                    class: config.class(),
                    kind: config.name().to_string(),
                    value,
                });
            }
        }
    }

    /// Pattern lexem terms collected so far.
    pub(crate) fn pattern_lexem_terms(&self) -> &[BindTerm] {
        &self.pattern_lexem_terms
    }

    /// Assembles the document from the collected terms: coverage
    /// reduction per index class, pooled ordinal position assignment, and
    /// the meta data / attribute maps.
    pub(crate) fn fetch_document(&mut self) -> Result<Document> {
        let mut doc = Document::new();

        let mut search = std::mem::take(&mut self.search_terms);
        sort_by_position(&mut search);
        eliminate_covered_elements(&mut search);
        let mut forward = std::mem::take(&mut self.forward_terms);
        sort_by_position(&mut forward);
        eliminate_covered_elements(&mut forward);

        // the two index classes share one position space
        let mut pooled = search;
        pooled.append(&mut forward);
        sort_by_position(&mut pooled);
        for (idx, pos) in assign_positions(&pooled) {
            let term = &pooled[idx];
            let out = Term::new(term.kind.clone(), term.value.clone(), pos);
            match term.class {
                FeatureClass::ForwardIndexTerm => doc.add_forward_term(out),
                _ => doc.add_search_term(out),
            }
        }

        for term in std::mem::take(&mut self.metadata_terms) {
            match NumericValue::parse(&term.value) {
                Ok(value) => doc.set_metadata(term.kind, value),
                Err(err) => self.warnings.push(format!(
                    "metadata '{}' dropped: {}",
                    term.kind, err
                )),
            }
        }
        for term in std::mem::take(&mut self.attribute_terms) {
            doc.set_attribute(term.kind, term.value);
        }
        self.pattern_lexem_terms.clear();
        Ok(doc)
    }

    /// Assembles the query elements from the collected terms, the field
    /// number standing in for the segment position.
    pub(crate) fn fetch_query(&mut self) -> Vec<QueryElement> {
        let mut terms = std::mem::take(&mut self.search_terms);
        terms.extend(std::mem::take(&mut self.forward_terms));
        terms.extend(std::mem::take(&mut self.pattern_lexem_terms));
        sort_by_position(&mut terms);
        let mut elements = Vec::with_capacity(terms.len());
        for (idx, pos) in assign_positions(&terms) {
            let term = &terms[idx];
            elements.push(QueryElement {
                kind: term.kind.clone(),
                value: term.value.clone(),
                field_no: term.seg_pos as u32,
                pos,
                ofs: term.ofs,
                len: term.len,
                priority: term.priority,
            });
        }
        elements
    }
}

/// Selects the term sink of a feature class.
fn class_sink<'v>(
    class: FeatureClass,
    search: &'v mut Vec<BindTerm>,
    forward: &'v mut Vec<BindTerm>,
    metadata: &'v mut Vec<BindTerm>,
    attributes: &'v mut Vec<BindTerm>,
    pattern_lexems: &'v mut Vec<BindTerm>,
) -> &'v mut Vec<BindTerm> {
    match class {
        FeatureClass::SearchIndexTerm => search,
        FeatureClass::ForwardIndexTerm => forward,
        FeatureClass::MetaData => metadata,
        FeatureClass::Attribute => attributes,
        FeatureClass::PatternLexem => pattern_lexems,
    }
}
