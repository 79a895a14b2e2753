use std::fmt;

/// Represents a fragment of the template source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    /// Raw template data that is emitted as is (after trimming).
    TemplateData(&'a str),
    /// Verbatim content from a `raw`/`literal` block or `{{{ }}}`.
    Raw(&'a str),
    /// The contents of an output marker (`{{ ... }}`).
    Output {
        /// The text between the delimiters, trim modifiers removed.
        content: &'a str,
        /// Set if the opening delimiter carried a `-`.
        trim_left: bool,
        /// Set if the closing delimiter carried a `-`.
        trim_right: bool,
    },
    /// The contents of a tag marker (`{% ... %}`).
    Tag {
        /// The name of the tag.
        name: &'a str,
        /// Everything after the tag name.
        markup: &'a str,
        /// Set if the opening delimiter carried a `-`.
        trim_left: bool,
        /// Set if the closing delimiter carried a `-`.
        trim_right: bool,
    },
}

impl<'a> fmt::Display for Token<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::TemplateData(_) => f.write_str("template-data"),
            Token::Raw(_) => f.write_str("raw data"),
            Token::Output { .. } => f.write_str("output"),
            Token::Tag { name, .. } => write!(f, "tag `{name}`"),
        }
    }
}

/// Token span information
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct Span {
    pub start_line: u32,
    pub start_col: u32,
    pub start_offset: u32,
    pub end_line: u32,
    pub end_col: u32,
    pub end_offset: u32,
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            " @ {}:{}-{}:{}",
            self.start_line, self.start_col, self.end_line, self.end_col
        )
    }
}
