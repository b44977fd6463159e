//! Built-in normalizer functions: `orig`, `lc`, `uc` and `trim`.

use std::sync::Arc;

use crate::errors::{Error, Result};
use crate::textproc::{Normalizer, NormalizerFunction, TextProcessor};

/// The token value unchanged.
struct OrigNormalizer;

impl Normalizer for OrigNormalizer {
    fn normalize(&self, input: &str) -> Result<String> {
        Ok(input.to_string())
    }
}

struct LowercaseNormalizer;

impl Normalizer for LowercaseNormalizer {
    fn normalize(&self, input: &str) -> Result<String> {
        Ok(input.to_lowercase())
    }
}

struct UppercaseNormalizer;

impl Normalizer for UppercaseNormalizer {
    fn normalize(&self, input: &str) -> Result<String> {
        Ok(input.to_uppercase())
    }
}

struct TrimNormalizer;

impl Normalizer for TrimNormalizer {
    fn normalize(&self, input: &str) -> Result<String> {
        Ok(input.trim().to_string())
    }
}

struct SimpleNormalizerFunction {
    instance: Arc<dyn Normalizer>,
    description: &'static str,
}

impl NormalizerFunction for SimpleNormalizerFunction {
    fn instantiate(&self, args: &[String]) -> Result<Arc<dyn Normalizer>> {
        if !args.is_empty() {
            return Err(Error::InvalidArgument(
                "normalizer expects no arguments".to_string(),
            ));
        }
        Ok(self.instance.clone())
    }

    fn description(&self) -> &str {
        self.description
    }
}

/// Registers the built-in normalizers.
pub fn register(proc: &mut TextProcessor) {
    proc.define_normalizer(
        "orig",
        Box::new(SimpleNormalizerFunction {
            instance: Arc::new(OrigNormalizer),
            description: "the token value unchanged",
        }),
    );
    proc.define_normalizer(
        "lc",
        Box::new(SimpleNormalizerFunction {
            instance: Arc::new(LowercaseNormalizer),
            description: "lowercase conversion",
        }),
    );
    proc.define_normalizer(
        "uc",
        Box::new(SimpleNormalizerFunction {
            instance: Arc::new(UppercaseNormalizer),
            description: "uppercase conversion",
        }),
    );
    proc.define_normalizer(
        "trim",
        Box::new(SimpleNormalizerFunction {
            instance: Arc::new(TrimNormalizer),
            description: "strip surrounding whitespace",
        }),
    );
}
