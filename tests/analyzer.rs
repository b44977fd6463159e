use std::sync::Arc;

use pretty_assertions::assert_eq;
use termstream::textproc::{Token, Tokenizer};
use termstream::{
    DocumentAnalyzer, DocumentClass, FeatureOptions, PositionBind, Result, Term, TextProcessor,
};

fn word_feature(analyzer: &mut DocumentAnalyzer, proc: &TextProcessor, kind: &str, expr: &str) {
    analyzer
        .add_search_index_feature(
            kind,
            expr,
            proc.tokenizer("word", &[]).unwrap(),
            vec![proc.normalizer("orig", &[]).unwrap()],
            0,
            FeatureOptions::default(),
        )
        .unwrap();
}

#[test]
fn title_feature_on_absolute_path() {
    let proc = TextProcessor::standard();
    let mut analyzer = DocumentAnalyzer::xml();
    word_feature(&mut analyzer, &proc, "title", "/doc/title()");

    let doc = analyzer
        .analyze(b"<doc><title>Hello</title></doc>", &DocumentClass::xml())
        .unwrap();
    assert_eq!(doc.search_terms, vec![Term::new("title", "Hello", 1)]);
    assert_eq!(doc.sub_document_type, "");
}

#[test]
fn descendant_selection_counts_positions() {
    let proc = TextProcessor::standard();
    let mut analyzer = DocumentAnalyzer::xml();
    word_feature(&mut analyzer, &proc, "word", "//a()");

    let doc = analyzer
        .analyze(b"<doc><a>x</a><a>y</a></doc>", &DocumentClass::xml())
        .unwrap();
    assert_eq!(
        doc.search_terms,
        vec![Term::new("word", "x", 1), Term::new("word", "y", 2)]
    );
}

#[test]
fn successor_bound_punctuation() {
    let proc = TextProcessor::standard();
    let mut analyzer = DocumentAnalyzer::xml();
    word_feature(&mut analyzer, &proc, "word", "/doc()");
    analyzer
        .add_search_index_feature(
            "punct",
            "/doc()",
            proc.tokenizer("punctuation", &[]).unwrap(),
            vec![proc.normalizer("orig", &[]).unwrap()],
            0,
            FeatureOptions::position_bind(PositionBind::Successor),
        )
        .unwrap();

    // the period inherits the position of the following word
    let doc = analyzer
        .analyze(b"<doc>one. two</doc>", &DocumentClass::xml())
        .unwrap();
    assert_eq!(
        doc.search_terms,
        vec![
            Term::new("word", "one", 1),
            Term::new("punct", ".", 2),
            Term::new("word", "two", 2),
        ]
    );

    // with no following word the successor term is dropped
    let doc = analyzer
        .analyze(b"<doc>Hello world.</doc>", &DocumentClass::xml())
        .unwrap();
    assert_eq!(
        doc.search_terms,
        vec![Term::new("word", "Hello", 1), Term::new("word", "world", 2)]
    );
}

#[test]
fn priority_coverage_drops_contained_terms() {
    let proc = TextProcessor::standard();
    let mut analyzer = DocumentAnalyzer::xml();
    analyzer
        .add_search_index_feature(
            "word",
            "//a()",
            proc.tokenizer("word", &[]).unwrap(),
            vec![proc.normalizer("orig", &[]).unwrap()],
            1,
            FeatureOptions::default(),
        )
        .unwrap();
    analyzer
        .add_search_index_feature(
            "phrase",
            "//a()",
            proc.tokenizer("content", &[]).unwrap(),
            vec![proc.normalizer("orig", &[]).unwrap()],
            2,
            FeatureOptions::default(),
        )
        .unwrap();

    let doc = analyzer
        .analyze(b"<a>hello world</a>", &DocumentClass::xml())
        .unwrap();
    assert_eq!(doc.search_terms, vec![Term::new("phrase", "hello world", 1)]);
}

#[test]
fn forward_index_shares_positions_with_search_index() {
    let proc = TextProcessor::standard();
    let mut analyzer = DocumentAnalyzer::xml();
    word_feature(&mut analyzer, &proc, "stem", "//a()");
    analyzer
        .add_forward_index_feature(
            "orig",
            "//a()",
            proc.tokenizer("word", &[]).unwrap(),
            vec![proc.normalizer("uc", &[]).unwrap()],
            0,
            FeatureOptions::default(),
        )
        .unwrap();

    let doc = analyzer
        .analyze(b"<doc><a>aa bb</a></doc>", &DocumentClass::xml())
        .unwrap();
    assert_eq!(
        doc.search_terms,
        vec![Term::new("stem", "aa", 1), Term::new("stem", "bb", 2)]
    );
    assert_eq!(
        doc.forward_terms,
        vec![Term::new("orig", "AA", 1), Term::new("orig", "BB", 2)]
    );
}

#[test]
fn metadata_attributes_and_aggregators() {
    let proc = TextProcessor::standard();
    let mut analyzer = DocumentAnalyzer::xml();
    word_feature(&mut analyzer, &proc, "word", "/doc/text()");
    analyzer
        .define_metadata(
            "year",
            "/doc/year()",
            proc.tokenizer("content", &[]).unwrap(),
            vec![proc.normalizer("trim", &[]).unwrap()],
        )
        .unwrap();
    analyzer
        .define_attribute(
            "title",
            "/doc@name",
            proc.tokenizer("content", &[]).unwrap(),
            vec![proc.normalizer("orig", &[]).unwrap()],
        )
        .unwrap();
    analyzer.define_aggregated_metadata(
        "doclen",
        proc.aggregator("count", &["word".to_string()]).unwrap(),
    );

    let doc = analyzer
        .analyze(
            b"<doc name=\"test doc\"><year> 2023 </year><text>a b c</text></doc>",
            &DocumentClass::xml(),
        )
        .unwrap();
    assert_eq!(doc.metadata_value("year"), Some(2023i64.into()));
    assert_eq!(doc.metadata_value("doclen"), Some(3i64.into()));
    assert_eq!(doc.attributes.len(), 1);
    assert_eq!(doc.attributes[0].name, "title");
    assert_eq!(doc.attributes[0].value, "test doc");
}

#[test]
fn sub_documents_are_emitted_separately() -> Result<()> {
    let proc = TextProcessor::standard();
    let mut analyzer = DocumentAnalyzer::xml();
    analyzer.define_sub_document("item", "/list/item")?;
    word_feature(&mut analyzer, &proc, "t", "/list/item/t()");

    let mut ctx = analyzer.create_context(&DocumentClass::xml())?;
    ctx.put_input(
        b"<list><item><t>a</t></item><item><t>b</t></item></list>",
        true,
    )?;
    let first = ctx.analyze_next()?.expect("first sub document");
    assert_eq!(first.sub_document_type, "item");
    assert_eq!(first.search_terms, vec![Term::new("t", "a", 1)]);
    let second = ctx.analyze_next()?.expect("second sub document");
    assert_eq!(second.search_terms, vec![Term::new("t", "b", 1)]);
    assert_eq!(ctx.analyze_next()?, None);
    Ok(())
}

#[test]
fn unterminated_sub_document_is_an_error() {
    let proc = TextProcessor::standard();
    let mut analyzer = DocumentAnalyzer::xml();
    analyzer.define_sub_document("item", "//item").unwrap();
    word_feature(&mut analyzer, &proc, "t", "//item/t()");

    let mut ctx = analyzer.create_context(&DocumentClass::xml()).unwrap();
    // input ends while the item is still open
    ctx.put_input(b"<list><item><t>a</t>", true).unwrap();
    assert!(ctx.analyze_next().is_err());
    // a failed context stays unusable but silent
    assert_eq!(ctx.analyze_next().unwrap(), None);
}

#[test]
fn sub_content_runs_a_nested_segmenter() {
    let proc = TextProcessor::standard();
    let mut analyzer = DocumentAnalyzer::xml();
    analyzer
        .define_sub_content("/doc/meta()", DocumentClass::json())
        .unwrap();
    word_feature(&mut analyzer, &proc, "k", "/doc/meta()/k()");
    word_feature(&mut analyzer, &proc, "body", "/doc/body()");

    let doc = analyzer
        .analyze(
            br#"<doc><meta>{"k":"json value"}</meta><body>after</body></doc>"#,
            &DocumentClass::xml(),
        )
        .unwrap();
    assert_eq!(
        doc.search_terms,
        vec![
            Term::new("k", "json", 1),
            Term::new("k", "value", 2),
            Term::new("body", "after", 3),
        ]
    );
}

/// Word tokenizer working on document granularity: all segments of the
/// feature are concatenated before tokenization.
struct ConcatWords;

impl Tokenizer for ConcatWords {
    fn tokenize(&self, src: &str) -> std::result::Result<Vec<Token>, termstream::Error> {
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

    fn concat_before_tokenize(&self) -> bool {
        true
    }
}

#[test]
fn concatenated_segments_keep_their_origin_positions() {
    let proc = TextProcessor::standard();
    let mut analyzer = DocumentAnalyzer::xml();
    analyzer
        .add_search_index_feature(
            "word",
            "//a()",
            Arc::new(ConcatWords),
            vec![proc.normalizer("orig", &[]).unwrap()],
            0,
            FeatureOptions::default(),
        )
        .unwrap();

    let doc = analyzer
        .analyze(b"<doc><a>x</a><a>y</a></doc>", &DocumentClass::xml())
        .unwrap();
    assert_eq!(
        doc.search_terms,
        vec![Term::new("word", "x", 1), Term::new("word", "y", 2)]
    );
}

#[test]
fn pattern_match_results_are_injected() {
    let proc = TextProcessor::standard();
    let mut analyzer = DocumentAnalyzer::xml();
    analyzer
        .add_pattern_lexem(
            "lexem",
            "//a()",
            proc.tokenizer("word", &[]).unwrap(),
            vec![proc.normalizer("orig", &[]).unwrap()],
            0,
        )
        .unwrap();
    analyzer
        .add_search_index_feature_from_pattern_match(
            "matched",
            "mypattern",
            vec![proc.normalizer("lc", &[]).unwrap()],
            0,
            FeatureOptions::default(),
        )
        .unwrap();

    let mut ctx = analyzer.create_context(&DocumentClass::xml()).unwrap();
    ctx.put_input(b"<doc><a>Alpha Beta</a></doc>", false).unwrap();
    assert!(ctx.analyze_next().unwrap().is_none());

    // the external matcher consumes the collected lexems and reports one
    // pattern instance covering both
    let lexems = ctx.pattern_lexem_terms().to_vec();
    assert_eq!(lexems.len(), 2);
    assert_eq!(lexems[0].kind, "lexem");
    let config = analyzer
        .pattern_feature_configs("mypattern")
        .next()
        .expect("pattern feature configured");
    let result = termstream::BindTerm {
        seg_pos: lexems[0].seg_pos,
        ofs: lexems[0].ofs,
        len: lexems[1].ofs + lexems[1].len - lexems[0].ofs,
        priority: config.priority(),
        pos_bind: config.options().position_bind,
        class: config.class(),
        kind: config.name().to_string(),
        value: config.normalize("Alpha Beta").unwrap(),
    };
    ctx.process_pattern_match_result(vec![result]);

    ctx.put_input(b"", true).unwrap();
    let doc = ctx.analyze_next().unwrap().expect("document");
    assert_eq!(
        doc.search_terms,
        vec![Term::new("matched", "alpha beta", 1)]
    );
}

#[test]
fn analysis_is_idempotent() {
    let proc = TextProcessor::standard();
    let mut analyzer = DocumentAnalyzer::xml();
    word_feature(&mut analyzer, &proc, "word", "//p()");
    analyzer.define_aggregated_metadata(
        "nofwords",
        proc.aggregator("count", &["word".to_string()]).unwrap(),
    );

    let content = b"<doc><p>one two</p><p>three</p></doc>";
    let first = analyzer.analyze(content, &DocumentClass::xml()).unwrap();
    let second = analyzer.analyze(content, &DocumentClass::xml()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn mime_type_mismatch_is_rejected() {
    let analyzer = DocumentAnalyzer::xml();
    assert!(analyzer.create_context(&DocumentClass::json()).is_err());
    assert!(analyzer
        .create_context(&DocumentClass::new("text/xml"))
        .is_ok());
}

#[test]
fn tsv_analyzer_selects_columns() {
    let proc = TextProcessor::standard();
    let mut analyzer = DocumentAnalyzer::new("text/tab-separated-values").unwrap();
    analyzer
        .add_search_index_feature(
            "name",
            "name",
            proc.tokenizer("content", &[]).unwrap(),
            vec![proc.normalizer("orig", &[]).unwrap()],
            0,
            FeatureOptions::default(),
        )
        .unwrap();
    analyzer
        .define_metadata(
            "lineno",
            "lineno",
            proc.tokenizer("content", &[]).unwrap(),
            vec![proc.normalizer("orig", &[]).unwrap()],
        )
        .unwrap();

    let mut ctx = analyzer.create_context(&DocumentClass::tsv()).unwrap();
    ctx.put_input(b"id\tname\n1\talice\n2\tbob", true).unwrap();
    let doc = ctx.analyze_next().unwrap().expect("document");
    assert_eq!(
        doc.search_terms,
        vec![Term::new("name", "alice", 1), Term::new("name", "bob", 2)]
    );
    // the last metadata match wins: line number of the last row
    assert_eq!(doc.metadata_value("lineno"), Some(2i64.into()));
}

#[test]
fn plain_text_analyzer_uses_empty_selectors() {
    let proc = TextProcessor::standard();
    let mut analyzer = DocumentAnalyzer::new("text/plain").unwrap();
    word_feature(&mut analyzer, &proc, "word", "");

    let doc = analyzer
        .analyze(b"plain text here", &DocumentClass::plain())
        .unwrap();
    assert_eq!(
        doc.search_terms,
        vec![
            Term::new("word", "plain", 1),
            Term::new("word", "text", 2),
            Term::new("word", "here", 3),
        ]
    );
}

#[test]
fn json_analyzer_end_to_end() {
    let proc = TextProcessor::standard();
    let mut analyzer = DocumentAnalyzer::new("application/json").unwrap();
    word_feature(&mut analyzer, &proc, "k", "/k()");

    let doc = analyzer
        .analyze(br#"{"k":"v"}"#, &DocumentClass::json())
        .unwrap();
    assert_eq!(doc.search_terms, vec![Term::new("k", "v", 1)]);
}
