//! Built-in aggregator functions, evaluated over the assembled document:
//! `count`, `exist`, `typeset`, `valueset` and `sumsquaretf`.

use std::collections::HashMap;
use std::sync::Arc;

use crate::document::{Document, NumericValue};
use crate::errors::{Error, Result};
use crate::textproc::{Aggregator, AggregatorFunction, TextProcessor};

/// Number of search index terms of one type.
struct CountAggregator {
    kind: String,
}

impl Aggregator for CountAggregator {
    fn evaluate(&self, document: &Document) -> Result<NumericValue> {
        let count = document
            .search_terms
            .iter()
            .filter(|term| term.kind == self.kind)
            .count();
        Ok(NumericValue::Int(count as i64))
    }
}

/// 1 if at least one search index term of the type exists, 0 otherwise.
struct ExistAggregator {
    kind: String,
}

impl Aggregator for ExistAggregator {
    fn evaluate(&self, document: &Document) -> Result<NumericValue> {
        let exists = document.search_terms.iter().any(|term| term.kind == self.kind);
        Ok(NumericValue::Int(exists as i64))
    }
}

/// A set of term types or term values represented as a bit field. With an
/// empty `kind` the item list names term types; otherwise it names values
/// of terms of that type.
struct SetAggregator {
    kind: String,
    itemmap: HashMap<String, u32>,
}

impl SetAggregator {
    fn new(kind: String, items: &[String]) -> Result<SetAggregator> {
        if items.len() >= 32 {
            return Err(Error::LimitExceeded(
                "too many elements to build a set represented as bit field".to_string(),
            ));
        }
        let itemmap = items
            .iter()
            .enumerate()
            .map(|(idx, item)| (item.to_lowercase(), 1u32 << idx))
            .collect();
        Ok(SetAggregator { kind, itemmap })
    }
}

impl Aggregator for SetAggregator {
    fn evaluate(&self, document: &Document) -> Result<NumericValue> {
        let mut set = 0u32;
        for term in &document.search_terms {
            let key = if self.kind.is_empty() {
                &term.kind
            } else if term.kind == self.kind {
                &term.value
            } else {
                continue;
            };
            if let Some(bit) = self.itemmap.get(key.as_str()) {
                set |= bit;
            }
        }
        Ok(NumericValue::Int(set as i64))
    }
}

/// Square root of the sum of squared term frequencies of one term type,
/// the normalization factor of a vector space model.
struct SumSquareTfAggregator {
    kind: String,
}

impl Aggregator for SumSquareTfAggregator {
    fn evaluate(&self, document: &Document) -> Result<NumericValue> {
        let mut frequency: HashMap<&str, u64> = HashMap::new();
        for term in &document.search_terms {
            if self.kind.is_empty() || term.kind == self.kind {
                *frequency.entry(term.value.as_str()).or_insert(0) += 1;
            }
        }
        let sum: f64 = frequency.values().map(|&tf| (tf * tf) as f64).sum();
        Ok(NumericValue::Float(sum.sqrt()))
    }
}

fn single_type_arg(name: &str, args: &[String]) -> Result<String> {
    match args {
        [kind] => Ok(kind.to_lowercase()),
        _ => Err(Error::InvalidArgument(format!(
            "exactly one feature type name expected as argument of the '{}' aggregator",
            name
        ))),
    }
}

struct CountAggregatorFunction;

impl AggregatorFunction for CountAggregatorFunction {
    fn instantiate(&self, args: &[String]) -> Result<Arc<dyn Aggregator>> {
        Ok(Arc::new(CountAggregator {
            kind: single_type_arg("count", args)?,
        }))
    }

    fn description(&self) -> &str {
        "number of search index terms of a type"
    }
}

struct ExistAggregatorFunction;

impl AggregatorFunction for ExistAggregatorFunction {
    fn instantiate(&self, args: &[String]) -> Result<Arc<dyn Aggregator>> {
        Ok(Arc::new(ExistAggregator {
            kind: single_type_arg("exist", args)?,
        }))
    }

    fn description(&self) -> &str {
        "1 if a search index term of a type exists, 0 otherwise"
    }
}

struct TypeSetAggregatorFunction;

impl AggregatorFunction for TypeSetAggregatorFunction {
    fn instantiate(&self, args: &[String]) -> Result<Arc<dyn Aggregator>> {
        if args.is_empty() {
            return Err(Error::InvalidArgument(
                "at least one feature type name expected as argument of the 'typeset' aggregator"
                    .to_string(),
            ));
        }
        Ok(Arc::new(SetAggregator::new(String::new(), args)?))
    }

    fn description(&self) -> &str {
        "set of feature types that exist in the document, as bit field"
    }
}

struct ValueSetAggregatorFunction;

impl AggregatorFunction for ValueSetAggregatorFunction {
    fn instantiate(&self, args: &[String]) -> Result<Arc<dyn Aggregator>> {
        if args.len() < 2 {
            return Err(Error::InvalidArgument(
                "a feature type name and at least one value expected as arguments of the 'valueset' aggregator"
                    .to_string(),
            ));
        }
        Ok(Arc::new(SetAggregator::new(
            args[0].to_lowercase(),
            &args[1..],
        )?))
    }

    fn description(&self) -> &str {
        "set of feature values that exist in the document, as bit field"
    }
}

struct SumSquareTfAggregatorFunction;

impl AggregatorFunction for SumSquareTfAggregatorFunction {
    fn instantiate(&self, args: &[String]) -> Result<Arc<dyn Aggregator>> {
        let kind = match args {
            [] => String::new(),
            [kind] => kind.to_lowercase(),
            _ => {
                return Err(Error::InvalidArgument(
                    "too many arguments passed to the 'sumsquaretf' aggregator".to_string(),
                ))
            }
        };
        Ok(Arc::new(SumSquareTfAggregator { kind }))
    }

    fn description(&self) -> &str {
        "square root of the sum of squared term frequencies of a type"
    }
}

/// Registers the built-in aggregators.
pub fn register(proc: &mut TextProcessor) {
    proc.define_aggregator("count", Box::new(CountAggregatorFunction));
    proc.define_aggregator("exist", Box::new(ExistAggregatorFunction));
    proc.define_aggregator("typeset", Box::new(TypeSetAggregatorFunction));
    proc.define_aggregator("valueset", Box::new(ValueSetAggregatorFunction));
    proc.define_aggregator("sumsquaretf", Box::new(SumSquareTfAggregatorFunction));
}
