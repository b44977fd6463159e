//! Built-in tokenizer functions: `content`, `word`, `split` and
//! `punctuation`.

use std::sync::Arc;

use crate::errors::{Error, Result};
use crate::textproc::{TextProcessor, Token, Tokenizer, TokenizerFunction};

/// The whole segment as one token.
struct ContentTokenizer;

impl Tokenizer for ContentTokenizer {
    fn tokenize(&self, src: &str) -> Result<Vec<Token>> {
        if src.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![Token::new(0, src.len())])
    }
}

/// Maximal runs of alphanumeric characters.
struct WordTokenizer;

impl Tokenizer for WordTokenizer {
    fn tokenize(&self, src: &str) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        let mut start: Option<usize> = None;
        for (idx, ch) in src.char_indices() {
            if ch.is_alphanumeric() {
                start.get_or_insert(idx);
            } else if let Some(from) = start.take() {
                tokens.push(Token::new(from, idx - from));
            }
        }
        if let Some(from) = start {
            tokens.push(Token::new(from, src.len() - from));
        }
        Ok(tokens)
    }
}

/// Maximal runs of non-whitespace characters.
struct SplitTokenizer;

impl Tokenizer for SplitTokenizer {
    fn tokenize(&self, src: &str) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        let mut start: Option<usize> = None;
        for (idx, ch) in src.char_indices() {
            if !ch.is_whitespace() {
                start.get_or_insert(idx);
            } else if let Some(from) = start.take() {
                tokens.push(Token::new(from, idx - from));
            }
        }
        if let Some(from) = start {
            tokens.push(Token::new(from, src.len() - from));
        }
        Ok(tokens)
    }
}

/// Each punctuation character as its own token.
struct PunctuationTokenizer;

impl Tokenizer for PunctuationTokenizer {
    fn tokenize(&self, src: &str) -> Result<Vec<Token>> {
        Ok(src
            .char_indices()
            .filter(|(_, ch)| ch.is_ascii_punctuation())
            .map(|(idx, ch)| Token::new(idx, ch.len_utf8()))
            .collect())
    }
}

struct SimpleTokenizerFunction {
    instance: Arc<dyn Tokenizer>,
    description: &'static str,
}

impl TokenizerFunction for SimpleTokenizerFunction {
    fn instantiate(&self, args: &[String]) -> Result<Arc<dyn Tokenizer>> {
        if !args.is_empty() {
            return Err(Error::InvalidArgument(
                "tokenizer expects no arguments".to_string(),
            ));
        }
        Ok(self.instance.clone())
    }

    fn description(&self) -> &str {
        self.description
    }
}

/// Registers the built-in tokenizers.
pub fn register(proc: &mut TextProcessor) {
    proc.define_tokenizer(
        "content",
        Box::new(SimpleTokenizerFunction {
            instance: Arc::new(ContentTokenizer),
            description: "the whole segment as one token",
        }),
    );
    proc.define_tokenizer(
        "word",
        Box::new(SimpleTokenizerFunction {
            instance: Arc::new(WordTokenizer),
            description: "maximal sequences of alphanumeric characters",
        }),
    );
    proc.define_tokenizer(
        "split",
        Box::new(SimpleTokenizerFunction {
            instance: Arc::new(SplitTokenizer),
            description: "maximal sequences of non-whitespace characters",
        }),
    );
    proc.define_tokenizer(
        "punctuation",
        Box::new(SimpleTokenizerFunction {
            instance: Arc::new(PunctuationTokenizer),
            description: "each punctuation character as one token",
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn values(tokenizer: &dyn Tokenizer, src: &str) -> Vec<String> {
        tokenizer
            .tokenize(src)
            .unwrap()
            .into_iter()
            .map(|t| src[t.ofs..t.ofs + t.len].to_string())
            .collect()
    }

    #[test]
    fn word_tokens() {
        assert_eq!(
            values(&WordTokenizer, "Hello, wide world!"),
            vec!["Hello", "wide", "world"]
        );
        assert_eq!(values(&WordTokenizer, "  "), Vec::<String>::new());
    }

    #[test]
    fn word_tokens_multibyte() {
        assert_eq!(values(&WordTokenizer, "über alles"), vec!["über", "alles"]);
    }

    #[test]
    fn split_keeps_punctuation() {
        assert_eq!(values(&SplitTokenizer, "a b.c  d"), vec!["a", "b.c", "d"]);
    }

    #[test]
    fn punctuation_tokens() {
        assert_eq!(values(&PunctuationTokenizer, "end. next!"), vec![".", "!"]);
    }

    #[test]
    fn content_token_covers_all() {
        assert_eq!(values(&ContentTokenizer, " raw "), vec![" raw "]);
        assert_eq!(values(&ContentTokenizer, ""), Vec::<String>::new());
    }
}
