//! Document and query analysis: feature configuration, segment
//! processing, position binding and the two analyzer front ends.

pub mod bindterm;
pub mod document_analyzer;
pub mod features;
pub mod query;
mod segment_processor;

pub use bindterm::BindTerm;
pub use document_analyzer::{DocumentAnalyzer, DocumentAnalyzerContext};
pub use features::{
    FeatureClass, FeatureConfig, FeatureConfigMap, FeatureOptions, PatternFeatureConfig,
    PatternFeatureConfigMap, PositionBind, MAX_FEATURES, MAX_SUB_CONTENTS, MAX_SUB_DOCUMENTS,
    OFS_PATTERN_MATCH, OFS_SUB_CONTENT, OFS_SUB_DOCUMENT, SUB_DOCUMENT_END,
};
pub use query::{
    GroupBy, Instruction, QueryAnalyzer, QueryAnalyzerContext, QueryElement, QueryTermExpression,
};
