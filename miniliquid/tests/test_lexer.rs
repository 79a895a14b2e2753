#![cfg(feature = "unstable_machinery")]
use miniliquid::machinery::{tokenize, Token, Tokenizer};
use miniliquid::ErrorKind;
use similar_asserts::assert_eq;

use std::fmt::Write;

fn dump(source: &str) -> String {
    let mut rv = String::new();
    for item in tokenize(source, "<string>") {
        let (token, span) = item.unwrap();
        writeln!(rv, "{token:?}{span:?}").unwrap();
    }
    rv
}

fn tokens(source: &str) -> Vec<Token<'_>> {
    tokenize(source, "<string>")
        .map(|x| x.map(|(tok, _)| tok))
        .collect::<Result<_, _>>()
        .unwrap()
}

#[test]
fn test_token_spans() {
    insta::assert_snapshot!(dump("a\n{{ b }}\n{% c d %}x"), @r###"
    TemplateData("a\n") @ 1:0-2:0
    Output { content: "b", trim_left: false, trim_right: false } @ 2:0-2:7
    TemplateData("\n") @ 2:7-3:0
    Tag { name: "c", markup: "d", trim_left: false, trim_right: false } @ 3:0-3:9
    TemplateData("x") @ 3:9-3:10
    "###);
}

#[test]
fn test_whitespace_control() {
    assert_eq!(
        tokens("a  {{- b -}}  c"),
        vec![
            Token::TemplateData("a"),
            Token::Output {
                content: "b",
                trim_left: true,
                trim_right: true,
            },
            Token::TemplateData("c"),
        ]
    );

    // a single line break in front of the marker goes, the one after stays
    assert_eq!(
        tokens("a\n{%- x -%}\nb"),
        vec![
            Token::TemplateData("a"),
            Token::Tag {
                name: "x",
                markup: "",
                trim_left: true,
                trim_right: true,
            },
            Token::TemplateData("\nb"),
        ]
    );

    // only the run of spaces is removed
    assert_eq!(
        tokens("a\n  {%- x %}"),
        vec![
            Token::TemplateData("a\n"),
            Token::Tag {
                name: "x",
                markup: "",
                trim_left: true,
                trim_right: false,
            },
        ]
    );
}

#[test]
fn test_tag_name_and_markup() {
    assert_eq!(
        tokens("{%assign x = 'a b'  %}"),
        vec![Token::Tag {
            name: "assign",
            markup: "x = 'a b'",
            trim_left: false,
            trim_right: false,
        }]
    );
    assert_eq!(
        tokens("{% echo '%}' %}"),
        vec![Token::Tag {
            name: "echo",
            markup: "'%}'",
            trim_left: false,
            trim_right: false,
        }]
    );
}

#[test]
fn test_raw_blocks() {
    assert_eq!(
        tokens("{% raw %}{{ a }}{% endif %}{% endraw %}{% literal %}{% raw %}{% endliteral %}"),
        vec![Token::Raw("{{ a }}{% endif %}"), Token::Raw("{% raw %}")]
    );
    assert_eq!(
        tokens("{%- raw -%}  x  {%- endraw %}"),
        vec![Token::Raw("x")]
    );
    assert_eq!(tokens("{{{ {{ a }} }}}"), vec![Token::Raw("{{ a }}")]);
}

#[test]
fn test_comments_and_stray_braces() {
    assert_eq!(
        tokens("a{# {{ x }} #}b"),
        vec![Token::TemplateData("a"), Token::TemplateData("b")]
    );
    assert_eq!(tokens("a{# x"), vec![Token::TemplateData("a{# x")]);
    assert_eq!(tokens("{ x }"), vec![Token::TemplateData("{ x }")]);
}

#[test]
fn test_lexer_errors() {
    let err = tokenize("a\n{% if x", "page.liquid")
        .collect::<Result<Vec<_>, _>>()
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SyntaxError);
    insta::assert_snapshot!(err.to_string(), @"syntax error: unterminated tag marker `{%` (in page.liquid:2)");

    let err = tokenize("{% %}", "<string>")
        .collect::<Result<Vec<_>, _>>()
        .unwrap_err();
    insta::assert_snapshot!(err.to_string(), @"syntax error: tag '{%%}' was not properly terminated or has no name (in <string>:1)");

    let err = tokenize("x\n\n{% raw %}abc", "<string>")
        .collect::<Result<Vec<_>, _>>()
        .unwrap_err();
    insta::assert_snapshot!(err.to_string(), @"syntax error: 'raw' tag was never closed, expected 'endraw' (in <string>:3)");
}

#[test]
fn test_tokenizer_iterator() {
    let mut tokenizer = Tokenizer::new("{{ a }}b", "x.liquid");
    assert_eq!(tokenizer.filename(), "x.liquid");
    assert!(matches!(
        tokenizer.next(),
        Some(Ok((Token::Output { content: "a", .. }, _)))
    ));
    assert!(matches!(tokenizer.next(), Some(Ok((Token::TemplateData("b"), _)))));
    assert!(tokenizer.next().is_none());
}
