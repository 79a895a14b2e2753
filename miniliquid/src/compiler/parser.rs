use std::borrow::Cow;

use crate::compiler::ast::{
    Block, ForLoop, ForOffset, Include, IncludeBinding, Node, Spanned, TableRow, Tag, TagKind,
};
use crate::compiler::lexer::Tokenizer;
use crate::compiler::markup::{self, Condition, Expr, MarkupParser, Tok};
use crate::compiler::tokens::{Span, Token};
use crate::environment::Environment;
use crate::error::{Error, ErrorKind};

const MAX_NESTING: usize = 200;

fn syntax_error(msg: Cow<'static, str>) -> Error {
    Error::new(ErrorKind::SyntaxError, msg)
}

macro_rules! syntax_error {
    ($msg:expr) => {{
        return Err(syntax_error(Cow::Borrowed($msg)));
    }};
    ($msg:expr, $($tt:tt)*) => {{
        return Err(syntax_error(Cow::Owned(format!($msg, $($tt)*))));
    }};
}

/// Tags that only make sense inside a specific block tag.
const INTERMEDIATE_TAGS: [&str; 3] = ["else", "elsif", "when"];

/// The tag that ended a body.
struct EndTag<'a> {
    name: &'a str,
    markup: &'a str,
}

struct TokenStream<'a> {
    tokenizer: Tokenizer<'a>,
    last_span: Span,
}

impl<'a> TokenStream<'a> {
    fn new(source: &'a str, filename: &'a str) -> TokenStream<'a> {
        TokenStream {
            tokenizer: Tokenizer::new(source, filename),
            last_span: Span::default(),
        }
    }

    fn next(&mut self) -> Result<Option<(Token<'a>, Span)>, Error> {
        let rv = ok!(self.tokenizer.next_token());
        if let Some((_, span)) = rv {
            self.last_span = span;
        }
        Ok(rv)
    }
}

/// The block parser.
///
/// Opening tags recurse into their bodies until the matching end tag shows
/// up.  Since every body is parsed by its own call, nested tags of the same
/// name close innermost first.
pub struct Parser<'a> {
    stream: TokenStream<'a>,
    env: &'a Environment,
    depth: usize,
}

impl<'a> Parser<'a> {
    /// Creates a new parser.
    pub fn new(source: &'a str, filename: &'a str, env: &'a Environment) -> Parser<'a> {
        Parser {
            stream: TokenStream::new(source, filename),
            env,
            depth: 0,
        }
    }

    /// Parses a template.
    pub fn parse(&mut self) -> Result<Block, Error> {
        self.parse_document()
            .map_err(|err| self.attach_location_to_error(err))
    }

    fn parse_document(&mut self) -> Result<Block, Error> {
        let (block, end) = ok!(self.subparse(&[]));
        match end {
            None => Ok(block),
            Some(end) => Err(self.unexpected_tag(end.name)),
        }
    }

    /// Returns the current filename.
    pub fn filename(&self) -> &str {
        self.stream.tokenizer.filename()
    }

    fn unexpected_tag(&self, name: &str) -> Error {
        if let Some(opening) = name.strip_prefix("end") {
            syntax_error(Cow::Owned(format!(
                "unexpected '{name}', there is no open '{opening}' tag"
            )))
        } else {
            syntax_error(Cow::Owned(format!(
                "unexpected '{name}' outside of its enclosing block tag"
            )))
        }
    }

    /// Parses nodes until one of the given tags shows up.
    ///
    /// Returns `None` as end tag if the input ran out.
    fn subparse(&mut self, end_tags: &[&str]) -> Result<(Block, Option<EndTag<'a>>), Error> {
        let mut nodes = Vec::new();
        while let Some((token, span)) = ok!(self.stream.next()) {
            match token {
                Token::TemplateData(text) | Token::Raw(text) => {
                    nodes.push(Node::Literal(text.to_string()))
                }
                Token::Output { content, .. } => {
                    let mut markup = ok!(markup::parse_markup(content));
                    if let Some(factory) = self.env.variable_factory() {
                        markup = ok!(factory(markup));
                    }
                    nodes.push(Node::Variable(Spanned::new(markup, span)));
                }
                Token::Tag { name, markup, .. } => {
                    if end_tags.contains(&name) {
                        return Ok((Block { nodes }, Some(EndTag { name, markup })));
                    }
                    let kind = ok!(self.parse_tag(name, markup));
                    nodes.push(Node::Tag(Spanned::new(
                        Tag {
                            name: name.to_string(),
                            markup: markup.to_string(),
                            kind,
                        },
                        span,
                    )));
                }
            }
        }
        Ok((Block { nodes }, None))
    }

    /// Parses a body that has to end with one of the given tags.
    fn parse_body(
        &mut self,
        opening: &str,
        end_tags: &[&str],
    ) -> Result<(Block, EndTag<'a>), Error> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            syntax_error!("template exceeds maximum nesting depth");
        }
        let rv = self.subparse(end_tags);
        self.depth -= 1;
        match ok!(rv) {
            (block, Some(end)) => Ok((block, end)),
            (_, None) => syntax_error!(
                "'{}' tag was never closed, expected '{}'",
                opening,
                end_tags.last().copied().unwrap_or("end")
            ),
        }
    }

    fn parse_tag(&mut self, name: &'a str, markup: &'a str) -> Result<TagKind, Error> {
        if let Some(registration) = self.env.get_custom_tag(name) {
            let tag = ok!((registration.factory)(name, markup));
            let body = match registration.end_tag {
                Some(ref end_tag) => Some(ok!(self.parse_body(name, &[end_tag.as_str()])).0),
                None => None,
            };
            return Ok(TagKind::Custom { tag, body });
        }
        match name {
            "assign" => self.parse_assign(markup),
            "capture" => self.parse_capture(markup),
            "case" => self.parse_case(markup),
            "comment" => self.parse_comment(),
            "cycle" => self.parse_cycle(markup),
            "increment" => Ok(TagKind::Increment(ok!(parse_variable_name(markup)))),
            "decrement" => Ok(TagKind::Decrement(ok!(parse_variable_name(markup)))),
            "for" => self.parse_for(markup).map(TagKind::For),
            "break" => Ok(TagKind::Break),
            "continue" => Ok(TagKind::Continue),
            "if" => self.parse_if("if", markup),
            "unless" => self.parse_if("unless", markup),
            "ifchanged" => Ok(TagKind::IfChanged(
                ok!(self.parse_body(name, &["endifchanged"])).0,
            )),
            "include" => parse_include(markup).map(TagKind::Include),
            "tablerow" => self.parse_tablerow(markup).map(TagKind::TableRow),
            _ if name.starts_with("end") || INTERMEDIATE_TAGS.contains(&name) => {
                Err(self.unexpected_tag(name))
            }
            _ => syntax_error!("unknown tag '{}'", name),
        }
    }

    fn parse_assign(&mut self, markup: &str) -> Result<TagKind, Error> {
        let (target, value) = match markup.split_once('=') {
            Some(rv) => rv,
            None => syntax_error!("syntax error in 'assign', expected 'name = value'"),
        };
        Ok(TagKind::Assign {
            target: ok!(parse_variable_name(target)),
            value: ok!(markup::parse_markup(value)),
        })
    }

    fn parse_capture(&mut self, markup: &str) -> Result<TagKind, Error> {
        let mut parser = ok!(MarkupParser::new(markup));
        let target = match parser.next() {
            Some(Tok::Ident(name) | Tok::Str(name)) => name.to_string(),
            _ => syntax_error!("syntax error in 'capture', expected a variable name"),
        };
        ok!(parser.expect_end());
        let (body, _) = ok!(self.parse_body("capture", &["endcapture"]));
        Ok(TagKind::Capture { target, body })
    }

    fn parse_case(&mut self, markup: &str) -> Result<TagKind, Error> {
        let mut parser = ok!(MarkupParser::new(markup));
        let subject = ok!(parser.parse_expr());
        ok!(parser.expect_end());

        // anything between `case` and the first `when` is dropped
        let (_, mut end) = ok!(self.parse_body("case", &["when", "else", "endcase"]));
        let mut whens = Vec::new();
        let mut else_body = None;
        loop {
            match end.name {
                "when" => {
                    let values = ok!(parse_when_values(end.markup));
                    let (body, next) =
                        ok!(self.parse_body("case", &["when", "else", "endcase"]));
                    whens.push((values, body));
                    end = next;
                }
                "else" => {
                    let (body, next) = ok!(self.parse_body("case", &["endcase"]));
                    else_body = Some(body);
                    end = next;
                }
                _ => break,
            }
        }
        Ok(TagKind::Case {
            subject,
            whens,
            else_body,
        })
    }

    /// Skips the body of a comment.  Nested comments are counted.
    fn parse_comment(&mut self) -> Result<TagKind, Error> {
        let mut depth = 1;
        while let Some((token, _)) = ok!(self.stream.next()) {
            match token {
                Token::Tag {
                    name: "comment", ..
                } => depth += 1,
                Token::Tag {
                    name: "endcomment",
                    ..
                } => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(TagKind::Comment);
                    }
                }
                _ => {}
            }
        }
        syntax_error!("'comment' tag was never closed, expected 'endcomment'")
    }

    fn parse_cycle(&mut self, markup: &str) -> Result<TagKind, Error> {
        let mut parser = ok!(MarkupParser::new(markup));
        let first = ok!(parser.parse_expr());
        let mut group = None;
        let mut values = Vec::new();
        if parser.skip(Tok::Colon) {
            group = Some(first);
            values.push(ok!(parser.parse_expr()));
        } else {
            values.push(first);
        }
        while parser.skip(Tok::Comma) {
            values.push(ok!(parser.parse_expr()));
        }
        ok!(parser.expect_end());
        Ok(TagKind::Cycle { group, values })
    }

    fn parse_loop_header(
        &self,
        tag: &str,
        parser: &mut MarkupParser<'a>,
    ) -> Result<(String, Expr, String), Error> {
        let var = match parser.next() {
            Some(Tok::Ident(var)) => var,
            _ => syntax_error!("syntax error in '{}', expected 'item in collection'", tag),
        };
        if !parser.skip_keyword("in") {
            syntax_error!("syntax error in '{}', expected 'item in collection'", tag);
        }
        let (iter, raw) = ok!(parser.parse_expr_raw());
        Ok((var.to_string(), iter, format!("{var}-{raw}")))
    }

    fn parse_for(&mut self, markup: &'a str) -> Result<ForLoop, Error> {
        let mut parser = ok!(MarkupParser::new(markup));
        let (var, iter, name) = ok!(self.parse_loop_header("for", &mut parser));
        let mut reversed = false;
        let mut limit = None;
        let mut offset = None;
        while !parser.at_end() {
            if parser.skip(Tok::Comma) {
                continue;
            }
            match ok!(parser.expect_ident()) {
                "reversed" => reversed = true,
                "limit" => {
                    ok!(parser.expect(Tok::Colon));
                    limit = Some(ok!(parser.parse_expr()));
                }
                "offset" => {
                    ok!(parser.expect(Tok::Colon));
                    offset = Some(if parser.skip_keyword("continue") {
                        ForOffset::Continue
                    } else {
                        ForOffset::Expr(ok!(parser.parse_expr()))
                    });
                }
                other => syntax_error!("unknown argument '{}' in 'for'", other),
            }
        }
        let (body, end) = ok!(self.parse_body("for", &["else", "endfor"]));
        let else_body = if end.name == "else" {
            Some(ok!(self.parse_body("for", &["endfor"])).0)
        } else {
            None
        };
        Ok(ForLoop {
            var,
            iter,
            name,
            reversed,
            limit,
            offset,
            body,
            else_body,
        })
    }

    fn parse_tablerow(&mut self, markup: &'a str) -> Result<TableRow, Error> {
        let mut parser = ok!(MarkupParser::new(markup));
        let (var, iter, name) = ok!(self.parse_loop_header("tablerow", &mut parser));
        let mut cols = None;
        let mut limit = None;
        let mut offset = None;
        while !parser.at_end() {
            if parser.skip(Tok::Comma) {
                continue;
            }
            let slot = match ok!(parser.expect_ident()) {
                "cols" => &mut cols,
                "limit" => &mut limit,
                "offset" => &mut offset,
                other => syntax_error!("unknown argument '{}' in 'tablerow'", other),
            };
            ok!(parser.expect(Tok::Colon));
            *slot = Some(ok!(parser.parse_expr()));
        }
        let (body, _) = ok!(self.parse_body("tablerow", &["endtablerow"]));
        Ok(TableRow {
            var,
            iter,
            name,
            cols,
            limit,
            offset,
            body,
        })
    }

    fn parse_condition(&self, tag: &str, markup: &str) -> Result<Condition, Error> {
        let limit = self.env.max_condition_terms();
        markup::parse_condition(markup, tag, limit).map(|(condition, _)| condition)
    }

    fn parse_if(&mut self, tag: &'static str, markup: &str) -> Result<TagKind, Error> {
        let end_tag = if tag == "if" { "endif" } else { "endunless" };
        let mut branches = Vec::new();
        let mut else_body = None;
        let mut condition = ok!(self.parse_condition(tag, markup));
        loop {
            let (body, end) = ok!(self.parse_body(tag, &["elsif", "else", end_tag]));
            branches.push((condition, body));
            match end.name {
                "elsif" => condition = ok!(self.parse_condition("elsif", end.markup)),
                "else" => {
                    else_body = Some(ok!(self.parse_body(tag, &[end_tag])).0);
                    break;
                }
                _ => break,
            }
        }
        Ok(TagKind::If {
            negated: tag == "unless",
            branches,
            else_body,
        })
    }

    fn attach_location_to_error(&mut self, mut err: Error) -> Error {
        if err.line().is_none() {
            let line = self.stream.last_span.start_line as usize;
            err.set_location(self.filename(), line);
        }
        err
    }
}

fn parse_variable_name(markup: &str) -> Result<String, Error> {
    let mut parser = ok!(MarkupParser::new(markup));
    let name = ok!(parser.expect_ident());
    ok!(parser.expect_end());
    Ok(name.to_string())
}

/// `when` accepts values separated by commas or `or`.
fn parse_when_values(markup: &str) -> Result<Vec<Expr>, Error> {
    let mut parser = ok!(MarkupParser::new(markup));
    let mut rv = vec![ok!(parser.parse_expr())];
    while parser.skip(Tok::Comma) || parser.skip_keyword("or") {
        rv.push(ok!(parser.parse_expr()));
    }
    ok!(parser.expect_end());
    Ok(rv)
}

fn parse_include(markup: &str) -> Result<Include, Error> {
    let mut parser = ok!(MarkupParser::new(markup));
    let template = ok!(parser.parse_expr());
    let binding = if parser.skip_keyword("with") {
        Some(IncludeBinding::With(ok!(parser.parse_expr())))
    } else if parser.skip_keyword("for") {
        Some(IncludeBinding::For(ok!(parser.parse_expr())))
    } else {
        None
    };
    let mut attributes = Vec::new();
    while !parser.at_end() {
        if parser.skip(Tok::Comma) {
            continue;
        }
        let key = ok!(parser.expect_ident()).to_string();
        ok!(parser.expect(Tok::Colon));
        attributes.push((key, ok!(parser.parse_expr())));
    }
    Ok(Include {
        template,
        binding,
        attributes,
    })
}

/// Parses a template into its root block.
pub fn parse(source: &str, filename: &str, env: &Environment) -> Result<Block, Error> {
    Parser::new(source, filename, env).parse()
}
