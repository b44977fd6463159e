//! The text processor: a name-keyed registry of tokenizer, normalizer and
//! aggregator functions.
//!
//! Functions are factories: instantiating one with its argument list
//! yields a shared, immutable instance that analyzers reference through
//! `Arc` handles. [`TextProcessor::standard`] registers the built-in
//! function families; user functions can be added with the `define_*`
//! methods before analyzer configuration starts.

pub mod aggregators;
pub mod normalizers;
pub mod tokenizers;

use std::collections::HashMap;
use std::sync::Arc;

use crate::document::{Document, NumericValue};
use crate::errors::{Error, Result};

/// A token produced by a tokenizer: a byte range of the source segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Token {
    /// Byte offset of the token in the segment
    pub ofs: usize,
    /// Byte length of the token
    pub len: usize,
}

impl Token {
    /// Creates a token covering `[ofs, ofs + len)`.
    pub fn new(ofs: usize, len: usize) -> Token {
        Token { ofs, len }
    }
}

/// A configured tokenizer instance, shared immutable between analyzers.
pub trait Tokenizer: Send + Sync {
    /// Splits a segment into tokens.
    fn tokenize(&self, src: &str) -> Result<Vec<Token>>;

    /// True if all segments of one feature must be concatenated before
    /// tokenization, for tokenizers that work on document granularity.
    fn concat_before_tokenize(&self) -> bool {
        false
    }
}

/// A configured normalizer instance, shared immutable between analyzers.
///
/// A normalizer may return more than one value for one token by returning
/// a string that starts with a NUL byte and separates the values with NUL
/// bytes. The rest of a normalizer chain is applied to each value
/// independently.
pub trait Normalizer: Send + Sync {
    /// Normalizes one token value.
    fn normalize(&self, input: &str) -> Result<String>;
}

/// A configured aggregator instance: computes one numeric meta data value
/// over a fully assembled document.
pub trait Aggregator: Send + Sync {
    /// Evaluates the aggregated value for `document`.
    fn evaluate(&self, document: &Document) -> Result<NumericValue>;
}

/// Factory for [`Tokenizer`] instances, registered by name.
pub trait TokenizerFunction: Send + Sync {
    /// Creates an instance for the given argument list.
    fn instantiate(&self, args: &[String]) -> Result<Arc<dyn Tokenizer>>;

    /// One-line description for introspection.
    fn description(&self) -> &str;
}

/// Factory for [`Normalizer`] instances, registered by name.
pub trait NormalizerFunction: Send + Sync {
    /// Creates an instance for the given argument list.
    fn instantiate(&self, args: &[String]) -> Result<Arc<dyn Normalizer>>;

    /// One-line description for introspection.
    fn description(&self) -> &str;
}

/// Factory for [`Aggregator`] instances, registered by name.
pub trait AggregatorFunction: Send + Sync {
    /// Creates an instance for the given argument list.
    fn instantiate(&self, args: &[String]) -> Result<Arc<dyn Aggregator>>;

    /// One-line description for introspection.
    fn description(&self) -> &str;
}

/// The function registry. One per process is enough; analyzers only
/// borrow it during configuration.
#[derive(Default)]
pub struct TextProcessor {
    tokenizers: HashMap<String, Box<dyn TokenizerFunction>>,
    normalizers: HashMap<String, Box<dyn NormalizerFunction>>,
    aggregators: HashMap<String, Box<dyn AggregatorFunction>>,
}

impl TextProcessor {
    /// Creates an empty registry.
    pub fn new() -> TextProcessor {
        TextProcessor::default()
    }

    /// Creates a registry with all built-in functions registered.
    pub fn standard() -> TextProcessor {
        let mut proc = TextProcessor::new();
        tokenizers::register(&mut proc);
        normalizers::register(&mut proc);
        aggregators::register(&mut proc);
        proc
    }

    /// Registers a tokenizer function under `name`.
    pub fn define_tokenizer(&mut self, name: impl Into<String>, function: Box<dyn TokenizerFunction>) {
        self.tokenizers.insert(name.into().to_lowercase(), function);
    }

    /// Registers a normalizer function under `name`.
    pub fn define_normalizer(&mut self, name: impl Into<String>, function: Box<dyn NormalizerFunction>) {
        self.normalizers.insert(name.into().to_lowercase(), function);
    }

    /// Registers an aggregator function under `name`.
    pub fn define_aggregator(&mut self, name: impl Into<String>, function: Box<dyn AggregatorFunction>) {
        self.aggregators.insert(name.into().to_lowercase(), function);
    }

    /// Instantiates the tokenizer `name` with `args`.
    pub fn tokenizer(&self, name: &str, args: &[String]) -> Result<Arc<dyn Tokenizer>> {
        match self.tokenizers.get(&name.to_lowercase()) {
            Some(function) => function.instantiate(args),
            None => Err(Error::UnknownIdentifier(format!(
                "tokenizer '{}' is not defined",
                name
            ))),
        }
    }

    /// Instantiates the normalizer `name` with `args`.
    pub fn normalizer(&self, name: &str, args: &[String]) -> Result<Arc<dyn Normalizer>> {
        match self.normalizers.get(&name.to_lowercase()) {
            Some(function) => function.instantiate(args),
            None => Err(Error::UnknownIdentifier(format!(
                "normalizer '{}' is not defined",
                name
            ))),
        }
    }

    /// Instantiates the aggregator `name` with `args`.
    pub fn aggregator(&self, name: &str, args: &[String]) -> Result<Arc<dyn Aggregator>> {
        match self.aggregators.get(&name.to_lowercase()) {
            Some(function) => function.instantiate(args),
            None => Err(Error::UnknownIdentifier(format!(
                "aggregator '{}' is not defined",
                name
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_registry_has_builtins() {
        let proc = TextProcessor::standard();
        assert!(proc.tokenizer("word", &[]).is_ok());
        assert!(proc.tokenizer("Word", &[]).is_ok());
        assert!(proc.normalizer("lc", &[]).is_ok());
        assert!(proc.aggregator("count", &["word".to_string()]).is_ok());
        assert!(matches!(
            proc.tokenizer("nonsense", &[]),
            Err(Error::UnknownIdentifier(_))
        ));
    }
}
