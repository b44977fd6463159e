//! Streaming document analysis for an information retrieval engine.
//!
//! ## Description
//!
//! The crate ingests structured documents (XML, JSON, TSV, plain text) in
//! arbitrary character encodings, drives them through an XPath-subset
//! selection automaton and emits a typed stream of index terms,
//! attributes, meta data and aggregated values suitable for a storage
//! back-end:
//!
//! - [`DocumentAnalyzer`]: configure features against selector
//!   expressions, then [`analyze`](DocumentAnalyzer::analyze) whole
//!   documents or pump chunks through a streaming
//!   [`DocumentAnalyzerContext`]
//! - [`QueryAnalyzer`]: the analogous front end for labeled query fields,
//!   grouping the resulting terms into a query expression tree
//!
//! ## Example
//!
//! ```rust
//! use termstream::{DocumentAnalyzer, DocumentClass, FeatureOptions, TextProcessor};
//!
//! let textproc = TextProcessor::standard();
//! let mut analyzer = DocumentAnalyzer::new("application/xml")?;
//! analyzer.add_search_index_feature(
//!     "title",
//!     "/doc/title()",
//!     textproc.tokenizer("word", &[])?,
//!     vec![textproc.normalizer("orig", &[])?],
//!     0,
//!     FeatureOptions::default(),
//! )?;
//!
//! let doc = analyzer.analyze(b"<doc><title>Hello</title></doc>", &DocumentClass::xml())?;
//! assert_eq!(doc.search_terms[0].kind, "title");
//! assert_eq!(doc.search_terms[0].value, "Hello");
//! assert_eq!(doc.search_terms[0].pos, 1);
//! # Ok::<(), termstream::Error>(())
//! ```
//!
//! Lower layers are public for callers that need them: the
//! [`segmenter`]s with their uniform event contract, the
//! [`xpath`] automaton, character set [`encoding`] and document class
//! [detection](DocumentClass::detect).
#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod analyzer;
pub mod docclass;
pub mod doctree;
pub mod document;
pub mod encoding;
mod errors;
pub mod escape;
pub mod markup;
pub mod segmenter;
pub mod textproc;
pub mod xpath;

// reexports
pub use analyzer::{
    BindTerm, DocumentAnalyzer, DocumentAnalyzerContext, FeatureClass, FeatureOptions, GroupBy,
    Instruction, PositionBind, QueryAnalyzer, QueryAnalyzerContext, QueryElement,
    QueryTermExpression,
};
pub use docclass::DocumentClass;
pub use doctree::DocTree;
pub use document::{Document, DocumentAttribute, DocumentMetaData, NumericValue, Term};
pub use encoding::TextEncoder;
pub use errors::{Error, Result};
pub use markup::MarkupContext;
pub use segmenter::{Fetch, SegmentEvent, SegmenterContext, SegmenterInstance};
pub use textproc::TextProcessor;
pub use xpath::XPathAutomaton;
