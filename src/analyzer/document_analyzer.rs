//! The document analyzer: configuration of features, sub-documents and
//! sub-contents, and the per-document analysis context.

use std::sync::Arc;

use crate::analyzer::bindterm::BindTerm;
use crate::analyzer::features::{
    FeatureClass, FeatureConfigMap, FeatureOptions, PatternFeatureConfig, PatternFeatureConfigMap,
    MAX_SUB_CONTENTS, MAX_SUB_DOCUMENTS, OFS_PATTERN_MATCH, OFS_SUB_CONTENT, OFS_SUB_DOCUMENT,
    SUB_DOCUMENT_END,
};
use crate::analyzer::segment_processor::SegmentProcessor;
use crate::docclass::{DocumentClass, MIME_XML};
use crate::document::Document;
use crate::errors::{Error, Result};
use crate::markup::MarkupContext;
use crate::segmenter::{create_segmenter, Fetch, SegmenterContext, SegmenterInstance};
use crate::textproc::{Aggregator, Normalizer, Tokenizer};

struct SubSegmenterDef {
    class: DocumentClass,
    instance: Box<dyn SegmenterInstance>,
    prefix: String,
}

struct StatisticsConfig {
    name: String,
    function: Arc<dyn Aggregator>,
}

/// A configured document analyzer.
///
/// The analyzer owns the segmenter of its main document format, the
/// nested segmenters of declared sub-contents, the feature configurations
/// and the aggregators. It is immutable after configuration; any number
/// of contexts may run against it concurrently.
pub struct DocumentAnalyzer {
    segmenter: Box<dyn SegmenterInstance>,
    sub_segmenters: Vec<SubSegmenterDef>,
    features: FeatureConfigMap,
    pattern_features: PatternFeatureConfigMap,
    sub_doc_types: Vec<String>,
    statistics: Vec<StatisticsConfig>,
}

impl DocumentAnalyzer {
    /// Creates an analyzer for documents of the given mime type.
    pub fn new(mime_type: &str) -> Result<DocumentAnalyzer> {
        Ok(DocumentAnalyzer {
            segmenter: create_segmenter(mime_type)?,
            sub_segmenters: Vec::new(),
            features: FeatureConfigMap::new(),
            pattern_features: PatternFeatureConfigMap::new(),
            sub_doc_types: Vec::new(),
            statistics: Vec::new(),
        })
    }

    /// Creates an analyzer for XML documents.
    pub fn xml() -> DocumentAnalyzer {
        DocumentAnalyzer::new(MIME_XML).expect("XML segmenter is built in")
    }

    /// Routes a selector expression to the main segmenter or, when the
    /// expression starts with the selector prefix of a declared
    /// sub-content, to that sub-content's segmenter with the prefix
    /// stripped. The longest matching prefix wins.
    fn define_selector_expression(&mut self, id: u32, expression: &str) -> Result<()> {
        match self.sub_segmenter_index(expression) {
            Some(idx) => {
                let prefix_len = self.sub_segmenters[idx].prefix.len();
                self.sub_segmenters[idx]
                    .instance
                    .define_selector_expression(id, &expression[prefix_len..])
            }
            None => self.segmenter.define_selector_expression(id, expression),
        }
    }

    fn define_subsection(&mut self, start_id: u32, end_id: u32, expression: &str) -> Result<()> {
        match self.sub_segmenter_index(expression) {
            Some(idx) => {
                let prefix_len = self.sub_segmenters[idx].prefix.len();
                self.sub_segmenters[idx].instance.define_subsection(
                    start_id,
                    end_id,
                    &expression[prefix_len..],
                )
            }
            None => self.segmenter.define_subsection(start_id, end_id, expression),
        }
    }

    fn sub_segmenter_index(&self, expression: &str) -> Option<usize> {
        self.sub_segmenters
            .iter()
            .enumerate()
            .filter(|(_, def)| expression.starts_with(def.prefix.as_str()))
            .max_by_key(|(_, def)| def.prefix.len())
            .map(|(idx, _)| idx)
    }

    fn add_feature(
        &mut self,
        class: FeatureClass,
        kind: &str,
        select_expression: &str,
        tokenizer: Arc<dyn Tokenizer>,
        normalizers: Vec<Arc<dyn Normalizer>>,
        priority: i32,
        options: FeatureOptions,
    ) -> Result<()> {
        let featidx = self.features.define_feature(
            class,
            kind,
            select_expression,
            tokenizer,
            normalizers,
            priority,
            options,
        )?;
        self.define_selector_expression(featidx, select_expression)
    }

    /// Adds a search index term feature.
    pub fn add_search_index_feature(
        &mut self,
        kind: &str,
        select_expression: &str,
        tokenizer: Arc<dyn Tokenizer>,
        normalizers: Vec<Arc<dyn Normalizer>>,
        priority: i32,
        options: FeatureOptions,
    ) -> Result<()> {
        self.add_feature(
            FeatureClass::SearchIndexTerm,
            kind,
            select_expression,
            tokenizer,
            normalizers,
            priority,
            options,
        )
    }

    /// Adds a forward index term feature.
    pub fn add_forward_index_feature(
        &mut self,
        kind: &str,
        select_expression: &str,
        tokenizer: Arc<dyn Tokenizer>,
        normalizers: Vec<Arc<dyn Normalizer>>,
        priority: i32,
        options: FeatureOptions,
    ) -> Result<()> {
        self.add_feature(
            FeatureClass::ForwardIndexTerm,
            kind,
            select_expression,
            tokenizer,
            normalizers,
            priority,
            options,
        )
    }

    /// Defines a numeric meta data field.
    pub fn define_metadata(
        &mut self,
        name: &str,
        select_expression: &str,
        tokenizer: Arc<dyn Tokenizer>,
        normalizers: Vec<Arc<dyn Normalizer>>,
    ) -> Result<()> {
        self.add_feature(
            FeatureClass::MetaData,
            name,
            select_expression,
            tokenizer,
            normalizers,
            0,
            FeatureOptions::default(),
        )
    }

    /// Defines a verbatim document attribute.
    pub fn define_attribute(
        &mut self,
        name: &str,
        select_expression: &str,
        tokenizer: Arc<dyn Tokenizer>,
        normalizers: Vec<Arc<dyn Normalizer>>,
    ) -> Result<()> {
        self.add_feature(
            FeatureClass::Attribute,
            name,
            select_expression,
            tokenizer,
            normalizers,
            0,
            FeatureOptions::default(),
        )
    }

    /// Adds a pattern lexem feature: terms that only feed pattern
    /// matching and are not stored themselves.
    pub fn add_pattern_lexem(
        &mut self,
        kind: &str,
        select_expression: &str,
        tokenizer: Arc<dyn Tokenizer>,
        normalizers: Vec<Arc<dyn Normalizer>>,
        priority: i32,
    ) -> Result<()> {
        self.add_feature(
            FeatureClass::PatternLexem,
            kind,
            select_expression,
            tokenizer,
            normalizers,
            priority,
            FeatureOptions::default(),
        )
    }

    /// Adds a search index term feature produced from the outputs of the
    /// named pattern matcher type.
    pub fn add_search_index_feature_from_pattern_match(
        &mut self,
        kind: &str,
        pattern_type: &str,
        normalizers: Vec<Arc<dyn Normalizer>>,
        priority: i32,
        options: FeatureOptions,
    ) -> Result<()> {
        self.pattern_features.define_feature(
            FeatureClass::SearchIndexTerm,
            kind,
            pattern_type,
            normalizers,
            priority,
            options,
        )
    }

    /// Adds a forward index term feature produced from the outputs of the
    /// named pattern matcher type.
    pub fn add_forward_index_feature_from_pattern_match(
        &mut self,
        kind: &str,
        pattern_type: &str,
        normalizers: Vec<Arc<dyn Normalizer>>,
        priority: i32,
        options: FeatureOptions,
    ) -> Result<()> {
        self.pattern_features.define_feature(
            FeatureClass::ForwardIndexTerm,
            kind,
            pattern_type,
            normalizers,
            priority,
            options,
        )
    }

    /// Defines a meta data field produced from pattern matcher outputs.
    pub fn define_metadata_from_pattern_match(
        &mut self,
        name: &str,
        pattern_type: &str,
        normalizers: Vec<Arc<dyn Normalizer>>,
    ) -> Result<()> {
        self.pattern_features.define_feature(
            FeatureClass::MetaData,
            name,
            pattern_type,
            normalizers,
            0,
            FeatureOptions::default(),
        )
    }

    /// Defines a document attribute produced from pattern matcher outputs.
    pub fn define_attribute_from_pattern_match(
        &mut self,
        name: &str,
        pattern_type: &str,
        normalizers: Vec<Arc<dyn Normalizer>>,
    ) -> Result<()> {
        self.pattern_features.define_feature(
            FeatureClass::Attribute,
            name,
            pattern_type,
            normalizers,
            0,
            FeatureOptions::default(),
        )
    }

    /// The features defined for the outputs of a pattern type, used by an
    /// external pattern matcher to shape its results into bind terms.
    pub fn pattern_feature_configs(
        &self,
        pattern_type: &str,
    ) -> impl Iterator<Item = &PatternFeatureConfig> {
        self.pattern_features.configs_for(pattern_type)
    }

    /// Defines a meta data field computed by an aggregator over the
    /// assembled document.
    pub fn define_aggregated_metadata(&mut self, name: &str, function: Arc<dyn Aggregator>) {
        self.statistics.push(StatisticsConfig {
            name: name.to_lowercase(),
            function,
        });
    }

    /// Declares a sub-document: every match of the expression starts a
    /// document of its own with the given type name.
    pub fn define_sub_document(&mut self, type_name: &str, select_expression: &str) -> Result<()> {
        let subdoc_idx = self.sub_doc_types.len() as u32;
        if subdoc_idx >= MAX_SUB_DOCUMENTS {
            return Err(Error::LimitExceeded(
                "too many sub documents defined".to_string(),
            ));
        }
        self.sub_doc_types.push(type_name.to_string());
        self.define_subsection(OFS_SUB_DOCUMENT + subdoc_idx, SUB_DOCUMENT_END, select_expression)
    }

    /// Declares a sub-content: regions matched by the expression are
    /// parsed by a nested segmenter of the declared document class.
    pub fn define_sub_content(
        &mut self,
        select_expression: &str,
        class: DocumentClass,
    ) -> Result<()> {
        let subcontent_idx = self.sub_segmenters.len() as u32;
        if subcontent_idx >= MAX_SUB_CONTENTS {
            return Err(Error::LimitExceeded(
                "too many sub contents defined".to_string(),
            ));
        }
        // register the trigger before the prefix becomes active, so the
        // trigger expression itself is not delegated
        self.define_selector_expression(OFS_SUB_CONTENT + subcontent_idx, select_expression)?;
        let instance = create_segmenter(&class.mime_type)?;
        self.sub_segmenters.push(SubSegmenterDef {
            class,
            instance,
            prefix: select_expression.to_string(),
        });
        Ok(())
    }

    /// Analyzes a complete document in one call.
    pub fn analyze(&self, content: &[u8], class: &DocumentClass) -> Result<Document> {
        let mut context = self.create_context(class)?;
        context.put_input(content, true)?;
        match context.analyze_next()? {
            Some(doc) => Ok(doc),
            None => Err(Error::BadDocument(
                0,
                "analyzed content incomplete or empty".to_string(),
            )),
        }
    }

    /// Creates a streaming analysis context for one document of the given
    /// class.
    pub fn create_context(&self, class: &DocumentClass) -> Result<DocumentAnalyzerContext<'_>> {
        if !class.mime_type.is_empty() && !mime_matches(&class.mime_type, self.segmenter.mime_type())
        {
            return Err(Error::InvalidArgument(format!(
                "document class '{}' does not match the analyzer's segmenter '{}'",
                class.mime_type,
                self.segmenter.mime_type()
            )));
        }
        Ok(DocumentAnalyzerContext {
            analyzer: self,
            processor: SegmentProcessor::new(&self.features),
            segmenter: self.segmenter.create_context(class)?,
            stack: Vec::new(),
            eof: false,
            position_ofs: 0,
            start_position: 0,
            nof_segments: 0,
            sub_doc_type: None,
            failed: false,
        })
    }

    /// Creates a markup context for mutation mode on the main segmenter.
    pub fn create_markup_context(
        &self,
        class: &DocumentClass,
        content: &[u8],
    ) -> Result<MarkupContext> {
        self.segmenter.create_markup_context(class, content)
    }

    /// The declared sub-document type names.
    pub fn sub_document_types(&self) -> &[String] {
        &self.sub_doc_types
    }
}

fn mime_matches(declared: &str, segmenter: &str) -> bool {
    declared == segmenter || (declared == "text/xml" && segmenter == MIME_XML)
}

/// Streaming analysis context of one document. The driver pumps bytes
/// with [`put_input`] and fetches finished (sub-)documents with
/// [`analyze_next`].
///
/// [`put_input`]: Self::put_input
/// [`analyze_next`]: Self::analyze_next
pub struct DocumentAnalyzerContext<'a> {
    analyzer: &'a DocumentAnalyzer,
    processor: SegmentProcessor<'a>,
    segmenter: Box<dyn SegmenterContext + 'a>,
    /// Suspended outer segmenters while a sub-content segmenter runs
    stack: Vec<(u64, Box<dyn SegmenterContext + 'a>)>,
    eof: bool,
    position_ofs: u64,
    start_position: u64,
    nof_segments: u64,
    sub_doc_type: Option<String>,
    failed: bool,
}

impl DocumentAnalyzerContext<'_> {
    /// Appends the next chunk of the document.
    pub fn put_input(&mut self, chunk: &[u8], eof: bool) -> Result<()> {
        if self.eof {
            return Err(Error::OperationOrder(
                "input fed after declared end of input".to_string(),
            ));
        }
        // bytes from outside always belong to the outermost segmenter
        let outer = match self.stack.first_mut() {
            Some((_, outer)) => outer,
            None => &mut self.segmenter,
        };
        outer.put_input(chunk, eof)?;
        self.eof = eof;
        Ok(())
    }

    /// Fetches the next finished document. Returns `Ok(None)` when more
    /// input is needed or the stream is exhausted. A failure invalidates
    /// the context: later calls return `Ok(None)`.
    pub fn analyze_next(&mut self) -> Result<Option<Document>> {
        if self.failed {
            return Ok(None);
        }
        match self.analyze_next_impl() {
            Ok(result) => Ok(result),
            Err(err) => {
                self.failed = true;
                Err(err)
            }
        }
    }

    /// Warnings of recovered per-token failures, for the debug trace.
    pub fn warnings(&self) -> &[String] {
        self.processor.warnings()
    }

    /// Injects terms produced by an external pattern matcher.
    pub fn process_pattern_match_result(&mut self, terms: Vec<BindTerm>) {
        self.processor.process_pattern_match_result(terms);
    }

    /// Pattern lexem terms collected for the current document, the feed
    /// of an external pattern matcher.
    pub fn pattern_lexem_terms(&self) -> &[BindTerm] {
        self.processor.pattern_lexem_terms()
    }

    fn analyze_next_impl(&mut self) -> Result<Option<Document>> {
        loop {
            loop {
                match self.segmenter.get_next()? {
                    Fetch::NeedMore => {
                        if self.stack.is_empty() {
                            return Ok(None);
                        }
                        // a nested segmenter was fed with eof and cannot
                        // legitimately ask for more
                        return Err(Error::BadDocument(
                            self.position_ofs,
                            "sub content truncated".to_string(),
                        ));
                    }
                    Fetch::EndOfStream => break,
                    Fetch::Event(event) => {
                        let id = event.id;
                        let position = event.position + self.position_ofs;
                        if id >= SUB_DOCUMENT_END {
                            if (OFS_SUB_CONTENT..OFS_PATTERN_MATCH).contains(&id) {
                                let bytes = event.bytes.to_vec();
                                self.enter_sub_content(id - OFS_SUB_CONTENT, position, bytes)?;
                            } else if id == SUB_DOCUMENT_END {
                                if self.nof_segments == 0 {
                                    return Ok(None);
                                }
                                self.nof_segments = 0;
                                return Ok(Some(self.complete_document()?));
                            } else if (OFS_SUB_DOCUMENT..OFS_SUB_CONTENT).contains(&id) {
                                if self.nof_segments > 0 {
                                    return Err(Error::BadDocument(
                                        position,
                                        "segments outside of a sub document or overlapping sub documents"
                                            .to_string(),
                                    ));
                                }
                                let subdoc_idx = (id - OFS_SUB_DOCUMENT) as usize;
                                self.sub_doc_type =
                                    self.analyzer.sub_doc_types.get(subdoc_idx).cloned();
                                self.start_position = position;
                            }
                            // ids in the pattern-match and structure ranges
                            // belong to external collaborators
                        } else {
                            self.nof_segments += 1;
                            let rel_position = position - self.start_position;
                            let config = self.analyzer.features.get(id)?;
                            if config.concat_before_tokenize() {
                                self.processor.concat_document_segment(
                                    id,
                                    rel_position,
                                    event.bytes,
                                )?;
                            } else {
                                self.processor.process_document_segment(
                                    id,
                                    rel_position,
                                    event.bytes,
                                )?;
                            }
                        }
                    }
                }
            }
            match self.stack.pop() {
                Some((position_ofs, outer)) => {
                    self.segmenter = outer;
                    self.position_ofs = position_ofs;
                }
                None => break,
            }
        }
        if self.eof && self.nof_segments > 0 {
            if let Some(name) = &self.sub_doc_type {
                return Err(Error::BadDocument(
                    self.start_position,
                    format!("sub document '{}' not terminated", name),
                ));
            }
            self.nof_segments = 0;
            return Ok(Some(self.complete_document()?));
        }
        Ok(None)
    }

    /// Switches segmentation to a nested segmenter over the matched
    /// sub-content bytes.
    fn enter_sub_content(&mut self, subcontent_idx: u32, position: u64, bytes: Vec<u8>) -> Result<()> {
        let def = match self.analyzer.sub_segmenters.get(subcontent_idx as usize) {
            Some(def) => def,
            None => return Ok(()),
        };
        let mut inner = def.instance.create_context(&def.class)?;
        inner.put_input(&bytes, true)?;
        let outer = std::mem::replace(&mut self.segmenter, inner);
        self.stack.push((self.position_ofs, outer));
        self.position_ofs = position;
        Ok(())
    }

    /// Finishes the current (sub-)document: concatenation buffers,
    /// document assembly and the aggregator pass.
    fn complete_document(&mut self) -> Result<Document> {
        self.processor.process_concatenated()?;
        let mut doc = self.processor.fetch_document()?;
        doc.sub_document_type = self.sub_doc_type.take().unwrap_or_default();
        for statistics in &self.analyzer.statistics {
            let value = statistics.function.evaluate(&doc)?;
            doc.set_metadata(statistics.name.clone(), value);
        }
        self.processor.clear();
        Ok(doc)
    }
}
