//! Feature configurations and the id space of segment events.

use std::sync::Arc;

use crate::errors::{Error, Result};
use crate::textproc::{Normalizer, Token, Tokenizer};

/// Highest id a regular feature can get; feature ids are `1..=MAX_FEATURES`.
pub const MAX_FEATURES: u32 = (1 << 24) - 1;
/// The single shared id of all sub-document end events.
pub const SUB_DOCUMENT_END: u32 = 1 << 24;
/// First id of the sub-document start block.
pub const OFS_SUB_DOCUMENT: u32 = (1 << 24) + 1;
/// Number of ids in the sub-document start block.
pub const MAX_SUB_DOCUMENTS: u32 = 1 << 7;
/// First id of the sub-content trigger block.
pub const OFS_SUB_CONTENT: u32 = OFS_SUB_DOCUMENT + MAX_SUB_DOCUMENTS;
/// Number of ids in the sub-content trigger block.
pub const MAX_SUB_CONTENTS: u32 = 1 << 7;
/// First id of the pattern-match segment trigger block.
pub const OFS_PATTERN_MATCH: u32 = OFS_SUB_CONTENT + MAX_SUB_CONTENTS;
/// Number of ids in the pattern-match segment trigger block.
pub const MAX_PATTERN_MATCHERS: u32 = 1 << 7;
/// First id of the block reserved for structure field events.
pub const OFS_STRUCTURE_ELEMENT: u32 = OFS_PATTERN_MATCH + MAX_PATTERN_MATCHERS;

/// The class of a feature decides where its terms end up in the document.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeatureClass {
    /// Numeric document meta data
    MetaData,
    /// Verbatim document attribute
    Attribute,
    /// Search index term
    SearchIndexTerm,
    /// Forward index term
    ForwardIndexTerm,
    /// Lexem fed into pattern matching, not stored itself
    PatternLexem,
}

impl FeatureClass {
    /// Name of the feature class for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            FeatureClass::MetaData => "metadata",
            FeatureClass::Attribute => "attribute",
            FeatureClass::SearchIndexTerm => "search-index",
            FeatureClass::ForwardIndexTerm => "forward-index",
            FeatureClass::PatternLexem => "pattern-lexem",
        }
    }
}

/// How the byte position of a term maps to its ordinal position.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PositionBind {
    /// The term occupies an ordinal position of its own
    #[default]
    Content,
    /// The term inherits the position of the next content term
    Successor,
    /// The term inherits the position of the previous content term
    Predecessor,
    /// A run of unique terms collapses to one shared ordinal position
    Unique,
}

/// Feature options recognized by the analyzer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FeatureOptions {
    /// Position binding policy of the feature's terms
    pub position_bind: PositionBind,
}

impl FeatureOptions {
    /// Options with content position binding.
    pub fn content() -> FeatureOptions {
        FeatureOptions::default()
    }

    /// Options with the given position binding.
    pub fn position_bind(bind: PositionBind) -> FeatureOptions {
        FeatureOptions {
            position_bind: bind,
        }
    }
}

/// One configured feature: selection expression, tokenizer, normalizer
/// chain, priority and options.
#[derive(Clone)]
pub struct FeatureConfig {
    name: String,
    select_expression: String,
    tokenizer: Arc<dyn Tokenizer>,
    normalizers: Vec<Arc<dyn Normalizer>>,
    priority: i32,
    class: FeatureClass,
    options: FeatureOptions,
}

impl FeatureConfig {
    pub(crate) fn new(
        name: &str,
        select_expression: &str,
        tokenizer: Arc<dyn Tokenizer>,
        normalizers: Vec<Arc<dyn Normalizer>>,
        priority: i32,
        class: FeatureClass,
        options: FeatureOptions,
    ) -> FeatureConfig {
        FeatureConfig {
            name: name.to_lowercase(),
            select_expression: select_expression.to_string(),
            tokenizer,
            normalizers,
            priority,
            class,
            options,
        }
    }

    /// The feature type name (lowercased).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The selection expression the feature was defined with.
    pub fn select_expression(&self) -> &str {
        &self.select_expression
    }

    /// The feature's priority in coverage reduction.
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// The feature class.
    pub fn class(&self) -> FeatureClass {
        self.class
    }

    /// The feature options.
    pub fn options(&self) -> FeatureOptions {
        self.options
    }

    /// True if segments of this feature are concatenated before
    /// tokenization.
    pub fn concat_before_tokenize(&self) -> bool {
        self.tokenizer.concat_before_tokenize()
    }

    /// Tokenizes a segment with the feature's tokenizer.
    pub fn tokenize(&self, src: &str) -> Result<Vec<Token>> {
        self.tokenizer.tokenize(src)
    }

    /// Applies the normalizer chain to one token value, left to right.
    ///
    /// When a normalizer returns a NUL-led multi-value result, the rest of
    /// the chain is applied to each value independently and the results
    /// are re-joined in the same convention.
    pub fn normalize(&self, token: &str) -> Result<String> {
        normalize_chain(&self.normalizers, token)
    }
}

/// Applies a normalizer chain left to right, honoring the NUL-led
/// multi-value convention.
fn normalize_chain(normalizers: &[Arc<dyn Normalizer>], token: &str) -> Result<String> {
    let mut values = vec![token.to_string()];
    for normalizer in normalizers {
        let mut next = Vec::with_capacity(values.len());
        for value in &values {
            let out = normalizer.normalize(value)?;
            match out.strip_prefix('\0') {
                Some(multi) => next.extend(multi.split('\0').map(str::to_string)),
                None => next.push(out),
            }
        }
        values = next;
    }
    if values.len() == 1 {
        Ok(values.pop().expect("one value"))
    } else {
        let mut joined = String::with_capacity(values.iter().map(|v| v.len() + 1).sum());
        for value in &values {
            joined.push('\0');
            joined.push_str(value);
        }
        Ok(joined)
    }
}

impl std::fmt::Debug for FeatureConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("FeatureConfig")
            .field("name", &self.name)
            .field("select_expression", &self.select_expression)
            .field("priority", &self.priority)
            .field("class", &self.class)
            .field("options", &self.options)
            .finish()
    }
}

/// Densely packed set of configured features, addressed by 1-based id.
#[derive(Clone, Debug, Default)]
pub struct FeatureConfigMap {
    configs: Vec<FeatureConfig>,
}

impl FeatureConfigMap {
    /// Creates an empty map.
    pub fn new() -> FeatureConfigMap {
        FeatureConfigMap::default()
    }

    /// Adds a feature and returns its id.
    #[allow(clippy::too_many_arguments)]
    pub fn define_feature(
        &mut self,
        class: FeatureClass,
        name: &str,
        select_expression: &str,
        tokenizer: Arc<dyn Tokenizer>,
        normalizers: Vec<Arc<dyn Normalizer>>,
        priority: i32,
        options: FeatureOptions,
    ) -> Result<u32> {
        if name.trim().is_empty() {
            return Err(Error::InvalidArgument(
                "feature type name must not be empty".to_string(),
            ));
        }
        if self.configs.len() as u32 + 1 >= MAX_FEATURES {
            return Err(Error::LimitExceeded(
                "number of features defined exceeds maximum limit".to_string(),
            ));
        }
        self.configs.push(FeatureConfig::new(
            name,
            select_expression,
            tokenizer,
            normalizers,
            priority,
            class,
            options,
        ));
        Ok(self.configs.len() as u32)
    }

    /// Looks up a feature by id.
    pub fn get(&self, id: u32) -> Result<&FeatureConfig> {
        if id == 0 || id as usize > self.configs.len() {
            return Err(Error::UnknownIdentifier(format!(
                "unknown index {} of feature",
                id
            )));
        }
        Ok(&self.configs[id as usize - 1])
    }

    /// Iterates all configured features with their ids.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &FeatureConfig)> {
        self.configs
            .iter()
            .enumerate()
            .map(|(idx, config)| (idx as u32 + 1, config))
    }

    /// Number of configured features.
    pub fn len(&self) -> usize {
        self.configs.len()
    }

    /// True if no feature is configured.
    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }
}

/// A feature produced from pattern matching results rather than from a
/// selector expression: no tokenizer, terms are normalized pattern output
/// values keyed by the pattern type name.
#[derive(Clone)]
pub struct PatternFeatureConfig {
    name: String,
    normalizers: Vec<Arc<dyn Normalizer>>,
    priority: i32,
    class: FeatureClass,
    options: FeatureOptions,
}

impl PatternFeatureConfig {
    /// The feature type name (lowercased).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The feature's priority in coverage reduction.
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// The feature class.
    pub fn class(&self) -> FeatureClass {
        self.class
    }

    /// The feature options.
    pub fn options(&self) -> FeatureOptions {
        self.options
    }

    /// Applies the normalizer chain to one pattern output value.
    pub fn normalize(&self, value: &str) -> Result<String> {
        normalize_chain(&self.normalizers, value)
    }
}

impl std::fmt::Debug for PatternFeatureConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("PatternFeatureConfig")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("class", &self.class)
            .finish()
    }
}

/// Pattern feature configurations keyed by pattern type name.
#[derive(Clone, Debug, Default)]
pub struct PatternFeatureConfigMap {
    configs: Vec<PatternFeatureConfig>,
    by_pattern: std::collections::HashMap<String, Vec<usize>>,
}

impl PatternFeatureConfigMap {
    /// Creates an empty map.
    pub fn new() -> PatternFeatureConfigMap {
        PatternFeatureConfigMap::default()
    }

    /// Adds a feature for the outputs of the pattern type `pattern`.
    pub fn define_feature(
        &mut self,
        class: FeatureClass,
        name: &str,
        pattern: &str,
        normalizers: Vec<Arc<dyn Normalizer>>,
        priority: i32,
        options: FeatureOptions,
    ) -> Result<()> {
        if name.trim().is_empty() || pattern.trim().is_empty() {
            return Err(Error::InvalidArgument(
                "feature type and pattern type name must not be empty".to_string(),
            ));
        }
        self.configs.push(PatternFeatureConfig {
            name: name.to_lowercase(),
            normalizers,
            priority,
            class,
            options,
        });
        self.by_pattern
            .entry(pattern.to_lowercase())
            .or_default()
            .push(self.configs.len() - 1);
        Ok(())
    }

    /// The features defined for a pattern type name.
    pub fn configs_for(&self, pattern: &str) -> impl Iterator<Item = &PatternFeatureConfig> {
        self.by_pattern
            .get(&pattern.to_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
            .iter()
            .map(move |&idx| &self.configs[idx])
    }
}
