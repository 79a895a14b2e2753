use crate::compiler::tokens::{Span, Token};
use crate::error::{Error, ErrorKind};
use crate::utils::memchr;

/// Utility enum that defines a marker.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum StartMarker {
    Variable,
    Block,
    Comment,
    Literal,
}

/// Tokenizes liquid templates.
///
/// The tokenizer is a single pass over the source.  It never looks further
/// ahead than the end delimiter of the marker it is currently looking at.
pub struct Tokenizer<'s> {
    rest: &'s str,
    filename: &'s str,
    current_line: u32,
    current_col: u32,
    current_offset: u32,
    trim_leading_whitespace: bool,
}

fn is_inline_ws(c: char) -> bool {
    c == ' ' || c == '\t'
}

/// Removes whitespace in front of a `{%-` or `{{-` marker.
///
/// A run of spaces and tabs directly before the marker is removed.  If there
/// is none, a single line break directly before the marker is removed.
fn trim_before_marker(s: &str) -> &str {
    let trimmed = s.trim_end_matches(is_inline_ws);
    if trimmed.len() != s.len() {
        trimmed
    } else if let Some(rest) = s.strip_suffix("\r\n") {
        rest
    } else if let Some(rest) = s.strip_suffix('\n') {
        rest
    } else {
        s
    }
}

/// Removes whitespace after a `-%}` or `-}}` marker.
fn trim_after_marker(s: &str) -> &str {
    s.trim_start_matches(is_inline_ws)
}

/// Finds a closing delimiter, skipping over quoted strings.
///
/// If quotes are unbalanced the first occurrence of the delimiter wins.
fn find_closing(s: &str, delim: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut quote = None;
    let mut idx = 0;
    while idx < bytes.len() {
        let c = bytes[idx];
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == b'\'' || c == b'"' => quote = Some(c),
            None if bytes[idx..].starts_with(delim.as_bytes()) => return Some(idx),
            None => {}
        }
        idx += 1;
    }
    s.find(delim)
}

fn find_start_marker(s: &str) -> Option<(usize, StartMarker, bool)> {
    let bytes = s.as_bytes();
    let mut offset = 0;
    loop {
        let idx = offset + some!(memchr(&bytes[offset..], b'{'));
        let marker = match bytes.get(idx + 1).copied() {
            Some(b'{') if bytes.get(idx + 2) == Some(&b'{') && s[idx..].contains("}}}") => {
                Some(StartMarker::Literal)
            }
            Some(b'{') => Some(StartMarker::Variable),
            Some(b'%') => Some(StartMarker::Block),
            Some(b'#') if s[idx + 2..].contains("#}") => Some(StartMarker::Comment),
            _ => None,
        };
        if let Some(marker) = marker {
            let trim = matches!(marker, StartMarker::Variable | StartMarker::Block)
                && bytes.get(idx + 2) == Some(&b'-');
            return Some((idx, marker, trim));
        }
        offset = idx + 1;
    }
}

fn lex_identifier(s: &str) -> usize {
    s.as_bytes()
        .iter()
        .enumerate()
        .take_while(|&(idx, &c)| {
            if c == b'_' {
                true
            } else if idx == 0 {
                c.is_ascii_alphabetic()
            } else {
                c.is_ascii_alphanumeric()
            }
        })
        .count()
}

/// Checks if `block_str` starts with `{% <name> %}` and returns the length
/// of the tag plus whether the tag was closed with `-%}`.
fn skip_basic_tag(block_str: &str, name: &str) -> Option<(usize, bool, bool)> {
    let mut ptr = some!(block_str.strip_prefix("{%"));
    let trim_left = if let Some(rest) = ptr.strip_prefix('-') {
        ptr = rest;
        true
    } else {
        false
    };
    ptr = ptr.trim_start();
    ptr = some!(ptr.strip_prefix(name));
    ptr = ptr.trim_start();
    let trim_right = if let Some(rest) = ptr.strip_prefix('-') {
        ptr = rest;
        true
    } else {
        false
    };
    ptr.strip_prefix("%}")
        .map(|ptr| (block_str.len() - ptr.len(), trim_left, trim_right))
}

impl<'s> Tokenizer<'s> {
    /// Creates a new tokenizer.
    pub fn new(input: &'s str, filename: &'s str) -> Tokenizer<'s> {
        Tokenizer {
            rest: input,
            filename,
            current_line: 1,
            current_col: 0,
            current_offset: 0,
            trim_leading_whitespace: false,
        }
    }

    /// Returns the current filename.
    pub fn filename(&self) -> &str {
        self.filename
    }

    /// Produces the next token from the tokenizer.
    pub fn next_token(&mut self) -> Result<Option<(Token<'s>, Span)>, Error> {
        loop {
            if self.rest.is_empty() {
                return Ok(None);
            }
            match find_start_marker(self.rest) {
                Some((0, marker, _)) => {
                    if let Some(rv) = ok!(self.tokenize_marker(marker)) {
                        return Ok(Some(rv));
                    }
                }
                found => {
                    let old_loc = self.loc();
                    let (len, trim_left) = match found {
                        Some((idx, _, trim)) => (idx, trim),
                        None => (self.rest.len(), false),
                    };
                    let mut data = self.advance(len);
                    if std::mem::take(&mut self.trim_leading_whitespace) {
                        data = trim_after_marker(data);
                    }
                    if trim_left {
                        data = trim_before_marker(data);
                    }
                    if !data.is_empty() {
                        return Ok(Some((Token::TemplateData(data), self.span(old_loc))));
                    }
                }
            }
        }
    }

    fn advance(&mut self, bytes: usize) -> &'s str {
        let (skipped, new_rest) = self.rest.split_at(bytes);
        for c in skipped.chars() {
            match c {
                '\n' => {
                    self.current_line += 1;
                    self.current_col = 0;
                }
                _ => self.current_col += 1,
            }
        }
        self.current_offset += bytes as u32;
        self.rest = new_rest;
        skipped
    }

    #[inline]
    fn loc(&self) -> (u32, u32, u32) {
        (self.current_line, self.current_col, self.current_offset)
    }

    #[inline]
    fn span(&self, (start_line, start_col, start_offset): (u32, u32, u32)) -> Span {
        Span {
            start_line,
            start_col,
            start_offset,
            end_line: self.current_line,
            end_col: self.current_col,
            end_offset: self.current_offset,
        }
    }

    fn syntax_error(&self, msg: String, line: u32) -> Error {
        let mut err = Error::new(ErrorKind::SyntaxError, msg);
        err.set_location(self.filename, line as usize);
        err
    }

    /// Lexes a marker at the start of `rest`.  Comments yield `None`.
    fn tokenize_marker(
        &mut self,
        marker: StartMarker,
    ) -> Result<Option<(Token<'s>, Span)>, Error> {
        let old_loc = self.loc();
        self.trim_leading_whitespace = false;
        match marker {
            StartMarker::Comment => {
                let end = ok!(self.rest.find("#}").ok_or_else(|| {
                    self.syntax_error("unterminated comment".into(), old_loc.0)
                }));
                self.advance(end + 2);
                Ok(None)
            }
            StartMarker::Literal => {
                let end = ok!(self.rest.find("}}}").ok_or_else(|| {
                    self.syntax_error("unterminated literal `{{{`".into(), old_loc.0)
                }));
                let inner = &self.rest[3..end];
                let inner = inner.strip_prefix(' ').unwrap_or(inner).trim_end();
                self.advance(end + 3);
                Ok(Some((Token::Raw(inner), self.span(old_loc))))
            }
            StartMarker::Variable | StartMarker::Block => {
                let (delim, what) = if marker == StartMarker::Variable {
                    ("}}", "output marker `{{`")
                } else {
                    ("%}", "tag marker `{%`")
                };
                let body = &self.rest[2..];
                let end = ok!(find_closing(body, delim).ok_or_else(|| {
                    self.syntax_error(format!("unterminated {what}"), old_loc.0)
                }));
                let mut inner = &body[..end];
                let trim_left = if let Some(rest) = inner.strip_prefix('-') {
                    inner = rest;
                    true
                } else {
                    false
                };
                let trim_right = if let Some(rest) = inner.strip_suffix('-') {
                    inner = rest;
                    true
                } else {
                    false
                };
                self.advance(2 + end + delim.len());
                self.trim_leading_whitespace = trim_right;
                let inner = inner.trim();
                if marker == StartMarker::Variable {
                    return Ok(Some((
                        Token::Output {
                            content: inner,
                            trim_left,
                            trim_right,
                        },
                        self.span(old_loc),
                    )));
                }
                let name_len = lex_identifier(inner);
                if name_len == 0 {
                    return Err(self.syntax_error(
                        format!("tag '{{%{inner}%}}' was not properly terminated or has no name"),
                        old_loc.0,
                    ));
                }
                let (name, markup) = inner.split_at(name_len);
                if name == "raw" || name == "literal" {
                    return self.tokenize_raw(name, old_loc, trim_right).map(Some);
                }
                Ok(Some((
                    Token::Tag {
                        name,
                        markup: markup.trim(),
                        trim_left,
                        trim_right,
                    },
                    self.span(old_loc),
                )))
            }
        }
    }

    /// Consumes everything up to the matching end tag of a raw block.
    fn tokenize_raw(
        &mut self,
        name: &str,
        old_loc: (u32, u32, u32),
        trim_start: bool,
    ) -> Result<(Token<'s>, Span), Error> {
        let end_name = format!("end{name}");
        let mut offset = 0;
        while let Some(idx) = self.rest[offset..].find("{%") {
            let start = offset + idx;
            if let Some((tag_len, trim_left, trim_right)) =
                skip_basic_tag(&self.rest[start..], &end_name)
            {
                let mut content = self.advance(start);
                if trim_start {
                    content = trim_after_marker(content);
                }
                if trim_left {
                    content = trim_before_marker(content);
                }
                self.advance(tag_len);
                self.trim_leading_whitespace = trim_right;
                return Ok((Token::Raw(content), self.span(old_loc)));
            }
            offset = start + 2;
        }
        Err(self.syntax_error(
            format!("'{name}' tag was never closed, expected '{end_name}'"),
            old_loc.0,
        ))
    }
}

impl<'s> Iterator for Tokenizer<'s> {
    type Item = Result<(Token<'s>, Span), Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token().transpose()
    }
}

/// Utility function to quickly tokenize into an iterator.
pub fn tokenize<'s>(
    input: &'s str,
    filename: &'s str,
) -> impl Iterator<Item = Result<(Token<'s>, Span), Error>> {
    Tokenizer::new(input, filename)
}
