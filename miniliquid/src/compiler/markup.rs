//! Parses the markup inside output markers and tags.
//!
//! The grammar is small:
//!
//! ```text
//! markup     := expression ('|' filter)*
//! filter     := identifier (':' argument (',' argument)*)?
//! expression := string | number | keyword | path | '(' expr '..' expr ')'
//!             | '(' markup ')'
//! path       := (identifier | '[' expression ']') ('.' identifier | '[' expression ']')*
//! ```
use std::fmt;

use crate::error::{Error, ErrorKind};
use crate::value::Value;

/// One segment of a variable path.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// `.name` or the leading name.
    Member(String),
    /// `[expr]`.
    Index(Expr),
}

/// A parsed expression.
///
/// Expressions are evaluated lazily at render time.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A string, number or keyword literal.
    Literal(Value),
    /// A variable path such as `product.variants[0].title`.
    Path(Vec<Segment>),
    /// An inclusive integer range `(a..b)`.
    Range(Box<Expr>, Box<Expr>),
    /// A parenthesized expression with its own filter pipeline.
    Filtered(Box<ParsedMarkup>),
}

/// A filter invocation within a pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterRequest {
    /// The filter name as written in the template.
    pub name: String,
    /// The raw argument strings as written in the template.
    pub arguments: Vec<String>,
    /// The parsed arguments.
    pub args: Vec<Expr>,
}

/// The result of parsing an output expression or a tag argument.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedMarkup {
    /// The raw text of the primary operand.
    pub name: String,
    /// The primary operand.
    pub expr: Expr,
    /// The filter pipeline in application order.
    pub filters: Vec<FilterRequest>,
}

impl ParsedMarkup {
    /// Checks if the primary is a plain variable path without filters.
    pub fn is_plain_path(&self) -> bool {
        self.filters.is_empty() && matches!(self.expr, Expr::Path(_))
    }
}

/// A condition as used by `if`, `elsif` and `unless`.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// A single operand tested for truthiness.
    Truthy(Expr),
    /// `left op right`.  The operator is looked up at render time.
    Compare {
        left: Expr,
        op: String,
        right: Expr,
    },
    /// Both sides need to hold.  The right side is only evaluated if needed.
    And(Box<Condition>, Box<Condition>),
    /// Either side needs to hold.  The right side is only evaluated if needed.
    Or(Box<Condition>, Box<Condition>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tok<'a> {
    Ident(&'a str),
    Str(&'a str),
    Int(i64),
    Float(f64),
    Dot,
    DotDot,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Pipe,
    Colon,
    Comma,
    Op(&'a str),
}

impl<'a> fmt::Display for Tok<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tok::Ident(x) | Tok::Op(x) => f.write_str(x),
            Tok::Str(x) => write!(f, "{x:?}"),
            Tok::Int(x) => write!(f, "{x}"),
            Tok::Float(x) => write!(f, "{x}"),
            Tok::Dot => f.write_str("."),
            Tok::DotDot => f.write_str(".."),
            Tok::LBracket => f.write_str("["),
            Tok::RBracket => f.write_str("]"),
            Tok::LParen => f.write_str("("),
            Tok::RParen => f.write_str(")"),
            Tok::Pipe => f.write_str("|"),
            Tok::Colon => f.write_str(":"),
            Tok::Comma => f.write_str(","),
        }
    }
}

fn syntax_error(msg: String) -> Error {
    Error::new(ErrorKind::SyntaxError, msg)
}

fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

fn is_ident_continue(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_' || c == b'-'
}

fn lex_number(s: &str) -> Option<(Tok<'_>, usize)> {
    let bytes = s.as_bytes();
    let mut idx = usize::from(bytes.first() == Some(&b'-'));
    let digits_start = idx;
    while idx < bytes.len() && bytes[idx].is_ascii_digit() {
        idx += 1;
    }
    if idx == digits_start {
        return None;
    }
    let mut is_float = false;
    if bytes.get(idx) == Some(&b'.') && bytes.get(idx + 1).map_or(false, |c| c.is_ascii_digit())
    {
        is_float = true;
        idx += 1;
        while idx < bytes.len() && bytes[idx].is_ascii_digit() {
            idx += 1;
        }
    }
    let text = &s[..idx];
    if is_float {
        text.parse().ok().map(|x| (Tok::Float(x), idx))
    } else {
        match text.parse() {
            Ok(x) => Some((Tok::Int(x), idx)),
            Err(_) => text.parse().ok().map(|x| (Tok::Float(x), idx)),
        }
    }
}

/// Splits markup into tokens with their byte ranges.
pub fn tokenize_markup(source: &str) -> Result<Vec<(Tok<'_>, (usize, usize))>, Error> {
    let bytes = source.as_bytes();
    let mut rv = Vec::new();
    let mut idx = 0;
    while idx < bytes.len() {
        let c = bytes[idx];
        if c.is_ascii_whitespace() {
            idx += 1;
            continue;
        }
        let start = idx;
        let rest = &source[idx..];
        let (tok, len) = match c {
            b'\'' | b'"' => match rest[1..].find(c as char) {
                Some(end) => (Tok::Str(&rest[1..end + 1]), end + 2),
                None => {
                    return Err(syntax_error(format!(
                        "unterminated string in {source:?}"
                    )))
                }
            },
            b'.' if rest.starts_with("..") => (Tok::DotDot, 2),
            b'.' => (Tok::Dot, 1),
            b'[' => (Tok::LBracket, 1),
            b']' => (Tok::RBracket, 1),
            b'(' => (Tok::LParen, 1),
            b')' => (Tok::RParen, 1),
            b'|' => (Tok::Pipe, 1),
            b':' => (Tok::Colon, 1),
            b',' => (Tok::Comma, 1),
            b'=' | b'!' | b'<' | b'>' => {
                let len = rest
                    .bytes()
                    .take_while(|c| matches!(c, b'=' | b'!' | b'<' | b'>'))
                    .count();
                (Tok::Op(&rest[..len]), len)
            }
            b'-' | b'0'..=b'9' => match lex_number(rest) {
                Some(rv) => rv,
                None => {
                    return Err(syntax_error(format!(
                        "unexpected character '-' in {source:?}"
                    )))
                }
            },
            c if is_ident_start(c) => {
                let mut len = rest.bytes().take_while(|&c| is_ident_continue(c)).count();
                if rest.as_bytes().get(len) == Some(&b'?') {
                    len += 1;
                }
                (Tok::Ident(&rest[..len]), len)
            }
            _ => {
                let c = rest.chars().next().unwrap_or_default();
                return Err(syntax_error(format!(
                    "unexpected character {c:?} in {source:?}"
                )));
            }
        };
        idx += len;
        rv.push((tok, (start, idx)));
    }
    Ok(rv)
}

/// Removes a single unbalanced parenthesis.
fn strip_unmatched_paren(tokens: &mut Vec<(Tok<'_>, (usize, usize))>) {
    let opens = tokens.iter().filter(|x| x.0 == Tok::LParen).count();
    let closes = tokens.iter().filter(|x| x.0 == Tok::RParen).count();
    if opens == closes + 1 {
        if let Some(pos) = tokens.iter().position(|x| x.0 == Tok::LParen) {
            tokens.remove(pos);
        }
    } else if closes == opens + 1 {
        if let Some(pos) = tokens.iter().rposition(|x| x.0 == Tok::RParen) {
            tokens.remove(pos);
        }
    }
}

/// A cursor over markup tokens.
///
/// Tags use this to parse their own argument syntax.
pub struct MarkupParser<'a> {
    source: &'a str,
    tokens: Vec<(Tok<'a>, (usize, usize))>,
    pos: usize,
}

impl<'a> MarkupParser<'a> {
    /// Creates a parser over the given markup.
    pub fn new(source: &'a str) -> Result<MarkupParser<'a>, Error> {
        Ok(MarkupParser {
            source,
            tokens: ok!(tokenize_markup(source)),
            pos: 0,
        })
    }

    fn lenient(source: &'a str) -> Result<MarkupParser<'a>, Error> {
        let mut rv = ok!(MarkupParser::new(source));
        strip_unmatched_paren(&mut rv.tokens);
        Ok(rv)
    }

    /// Returns the next token without consuming it.
    pub fn peek(&self) -> Option<Tok<'a>> {
        self.tokens.get(self.pos).map(|x| x.0)
    }

    fn peek_at(&self, offset: usize) -> Option<Tok<'a>> {
        self.tokens.get(self.pos + offset).map(|x| x.0)
    }

    /// Consumes the next token.
    pub fn next(&mut self) -> Option<Tok<'a>> {
        let rv = self.peek();
        if rv.is_some() {
            self.pos += 1;
        }
        rv
    }

    /// Checks if all tokens were consumed.
    pub fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map_or(self.source.len(), |x| x.1 .0)
    }

    fn prev_end(&self) -> usize {
        self.pos
            .checked_sub(1)
            .and_then(|idx| self.tokens.get(idx))
            .map_or(0, |x| x.1 .1)
    }

    fn unexpected(&self) -> Error {
        match self.peek() {
            Some(tok) => syntax_error(format!(
                "unexpected '{}' in {:?}",
                tok,
                self.source.trim()
            )),
            None => syntax_error(format!(
                "unexpected end of markup in {:?}",
                self.source.trim()
            )),
        }
    }

    /// Consumes a token if it matches.
    pub fn skip(&mut self, tok: Tok<'_>) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Consumes an identifier if it matches the given keyword.
    pub fn skip_keyword(&mut self, keyword: &str) -> bool {
        self.skip(Tok::Ident(keyword))
    }

    /// Expects a specific token.
    pub fn expect(&mut self, tok: Tok<'_>) -> Result<(), Error> {
        if self.skip(tok) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    /// Expects an identifier and returns it.
    pub fn expect_ident(&mut self) -> Result<&'a str, Error> {
        match self.peek() {
            Some(Tok::Ident(name)) => {
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.unexpected()),
        }
    }

    /// Fails unless all tokens were consumed.
    pub fn expect_end(&self) -> Result<(), Error> {
        if self.at_end() {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    /// Parses a single expression without filters.
    pub fn parse_expr(&mut self) -> Result<Expr, Error> {
        match self.next() {
            Some(Tok::Str(s)) => Ok(Expr::Literal(Value::from(s))),
            Some(Tok::Int(x)) => Ok(Expr::Literal(Value::from(x))),
            Some(Tok::Float(x)) => Ok(Expr::Literal(Value::from(x))),
            Some(Tok::Ident(name)) => {
                if !matches!(self.peek(), Some(Tok::Dot | Tok::LBracket)) {
                    match name {
                        "nil" | "null" => return Ok(Expr::Literal(Value::NIL)),
                        "true" => return Ok(Expr::Literal(Value::from(true))),
                        "false" => return Ok(Expr::Literal(Value::from(false))),
                        "empty" => return Ok(Expr::Literal(Value::EMPTY)),
                        "blank" => return Ok(Expr::Literal(Value::BLANK)),
                        _ => {}
                    }
                }
                self.parse_path(vec![Segment::Member(name.to_string())])
            }
            Some(Tok::LBracket) => {
                let idx = ok!(self.parse_expr());
                ok!(self.expect(Tok::RBracket));
                self.parse_path(vec![Segment::Index(idx)])
            }
            Some(Tok::LParen) => {
                let start = self.offset();
                let first = ok!(self.parse_expr());
                if self.skip(Tok::DotDot) {
                    let end = ok!(self.parse_expr());
                    ok!(self.expect(Tok::RParen));
                    return Ok(Expr::Range(Box::new(first), Box::new(end)));
                }
                let name = self.source[start..self.prev_end()].trim().to_string();
                let filters = ok!(self.parse_filters());
                ok!(self.expect(Tok::RParen));
                if filters.is_empty() {
                    Ok(first)
                } else {
                    Ok(Expr::Filtered(Box::new(ParsedMarkup {
                        name,
                        expr: first,
                        filters,
                    })))
                }
            }
            _ => {
                self.pos = self.pos.saturating_sub(1);
                Err(self.unexpected())
            }
        }
    }

    /// Parses an expression and also returns the text it was parsed from.
    pub fn parse_expr_raw(&mut self) -> Result<(Expr, &'a str), Error> {
        let start = self.offset();
        let expr = ok!(self.parse_expr());
        Ok((expr, &self.source[start..self.prev_end()]))
    }

    fn parse_path(&mut self, mut segments: Vec<Segment>) -> Result<Expr, Error> {
        loop {
            if self.skip(Tok::Dot) {
                match self.next() {
                    Some(Tok::Ident(name)) => segments.push(Segment::Member(name.to_string())),
                    Some(Tok::Int(idx)) => {
                        segments.push(Segment::Index(Expr::Literal(Value::from(idx))))
                    }
                    _ => {
                        self.pos = self.pos.saturating_sub(1);
                        return Err(self.unexpected());
                    }
                }
            } else if self.skip(Tok::LBracket) {
                let idx = ok!(self.parse_expr());
                ok!(self.expect(Tok::RBracket));
                segments.push(Segment::Index(idx));
            } else {
                return Ok(Expr::Path(segments));
            }
        }
    }

    /// Parses a filter pipeline.  Empty segments are skipped.
    pub fn parse_filters(&mut self) -> Result<Vec<FilterRequest>, Error> {
        let mut rv = Vec::new();
        while self.skip(Tok::Pipe) {
            if matches!(self.peek(), None | Some(Tok::Pipe | Tok::RParen)) {
                continue;
            }
            let name = ok!(self.expect_ident()).to_string();
            let mut arguments = Vec::new();
            let mut args = Vec::new();
            if self.skip(Tok::Colon) {
                loop {
                    if matches!(self.peek_at(1), Some(Tok::Colon)) {
                        return Err(syntax_error(format!(
                            "keyword arguments are not supported in {:?}",
                            self.source.trim()
                        )));
                    }
                    let start = self.offset();
                    args.push(ok!(self.parse_expr()));
                    arguments.push(self.source[start..self.prev_end()].to_string());
                    if !self.skip(Tok::Comma) {
                        break;
                    }
                }
            }
            rv.push(FilterRequest {
                name,
                arguments,
                args,
            });
        }
        Ok(rv)
    }

    /// Parses an expression followed by a filter pipeline.
    pub fn parse_markup(&mut self) -> Result<ParsedMarkup, Error> {
        while self.skip(Tok::Pipe) {}
        if self.at_end() {
            return Ok(ParsedMarkup {
                name: String::new(),
                expr: Expr::Literal(Value::NIL),
                filters: Vec::new(),
            });
        }
        let start = self.offset();
        let expr = ok!(self.parse_expr());
        let name = self.source[start..self.prev_end()].to_string();
        let filters = ok!(self.parse_filters());
        Ok(ParsedMarkup {
            name,
            expr,
            filters,
        })
    }

    /// Parses a condition made of `and`/`or` chained comparisons.
    ///
    /// Chains associate to the right.  Returns the condition and the number
    /// of atomic terms.  Parsing stops with an error naming `tag` as soon as
    /// a chain grows past `max_terms`.
    pub fn parse_condition(
        &mut self,
        tag: &str,
        max_terms: usize,
    ) -> Result<(Condition, usize), Error> {
        let mut terms = Vec::new();
        let mut joiners = Vec::new();
        loop {
            let left = ok!(self.parse_expr());
            let op = match self.peek() {
                Some(Tok::Op(op)) => Some(op),
                Some(Tok::Ident(op)) if op != "and" && op != "or" => Some(op),
                _ => None,
            };
            let term = match op {
                Some(op) => {
                    self.pos += 1;
                    let right = ok!(self.parse_expr());
                    Condition::Compare {
                        left,
                        op: op.to_string(),
                        right,
                    }
                }
                None => Condition::Truthy(left),
            };
            terms.push(term);
            if self.skip_keyword("and") {
                joiners.push(true);
            } else if self.skip_keyword("or") {
                joiners.push(false);
            } else {
                break;
            }
            if terms.len() >= max_terms {
                return Err(syntax_error(format!(
                    "condition of '{tag}' tag has more than {max_terms} terms"
                )));
            }
        }
        ok!(self.expect_end());
        let count = terms.len();
        let mut rv = some_term(terms.pop());
        while let Some(term) = terms.pop() {
            rv = match joiners.pop() {
                Some(true) => Condition::And(Box::new(term), Box::new(rv)),
                _ => Condition::Or(Box::new(term), Box::new(rv)),
            };
        }
        Ok((rv, count))
    }
}

fn some_term(term: Option<Condition>) -> Condition {
    term.unwrap_or(Condition::Truthy(Expr::Literal(Value::NIL)))
}

/// Parses the markup of an output marker or an assignment.
///
/// This is lenient in the same way the language traditionally is: empty
/// filter segments are ignored and a single unbalanced parenthesis is
/// dropped.
pub fn parse_markup(source: &str) -> Result<ParsedMarkup, Error> {
    let mut parser = ok!(MarkupParser::lenient(source));
    let rv = ok!(parser.parse_markup());
    ok!(parser.expect_end());
    Ok(rv)
}

/// Parses a condition.  See [`MarkupParser::parse_condition`].
pub fn parse_condition(
    source: &str,
    tag: &str,
    max_terms: usize,
) -> Result<(Condition, usize), Error> {
    let mut parser = ok!(MarkupParser::new(source));
    if parser.at_end() {
        return Err(syntax_error("missing condition".into()));
    }
    parser.parse_condition(tag, max_terms)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(names: &[&str]) -> Expr {
        Expr::Path(
            names
                .iter()
                .map(|x| Segment::Member(x.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_filters_and_args() {
        let markup = parse_markup("product.title | truncate: 20, '...' | upcase").unwrap();
        assert_eq!(markup.name, "product.title");
        assert_eq!(markup.expr, path(&["product", "title"]));
        assert_eq!(markup.filters.len(), 2);
        assert_eq!(markup.filters[0].name, "truncate");
        assert_eq!(markup.filters[0].arguments, vec!["20", "'...'"]);
        assert_eq!(markup.filters[1].name, "upcase");
        assert!(markup.filters[1].arguments.is_empty());
    }

    #[test]
    fn test_leniency() {
        let markup = parse_markup("x | | upcase |").unwrap();
        assert_eq!(markup.filters.len(), 1);
        let markup = parse_markup("(x | upcase").unwrap();
        assert_eq!(markup.expr, path(&["x"]));
        assert_eq!(markup.filters.len(), 1);
        let markup = parse_markup("x)").unwrap();
        assert_eq!(markup.expr, path(&["x"]));
    }

    #[test]
    fn test_ranges_and_indexes() {
        let markup = parse_markup("(1..n)").unwrap();
        assert_eq!(
            markup.expr,
            Expr::Range(
                Box::new(Expr::Literal(Value::from(1))),
                Box::new(path(&["n"]))
            )
        );
        let markup = parse_markup("items[-1]['name']").unwrap();
        assert_eq!(
            markup.expr,
            Expr::Path(vec![
                Segment::Member("items".into()),
                Segment::Index(Expr::Literal(Value::from(-1))),
                Segment::Index(Expr::Literal(Value::from("name"))),
            ])
        );
    }

    #[test]
    fn test_nested_filter_argument() {
        let markup = parse_markup("a | append: (b | upcase)").unwrap();
        match &markup.filters[0].args[0] {
            Expr::Filtered(inner) => assert_eq!(inner.filters[0].name, "upcase"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_condition_right_associative() {
        let (cond, terms) = parse_condition("a and b or c", "if", usize::MAX).unwrap();
        assert_eq!(terms, 3);
        match cond {
            Condition::And(left, right) => {
                assert_eq!(*left, Condition::Truthy(path(&["a"])));
                assert!(matches!(*right, Condition::Or(..)));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_condition_operators() {
        let (cond, _) = parse_condition("x contains 'y'", "if", usize::MAX).unwrap();
        assert_eq!(
            cond,
            Condition::Compare {
                left: path(&["x"]),
                op: "contains".into(),
                right: Expr::Literal(Value::from("y")),
            }
        );
        let (cond, _) = parse_condition("a<>b", "if", usize::MAX).unwrap();
        assert!(matches!(cond, Condition::Compare { ref op, .. } if op == "<>"));
    }

    #[test]
    fn test_errors() {
        assert!(parse_markup("'open").is_err());
        assert!(parse_markup("a | truncate: size: 2").is_err());
        assert!(parse_condition("", "if", usize::MAX).is_err());
    }
}
