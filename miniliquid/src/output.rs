use std::fmt;

/// The buffer a render writes into.
///
/// Output maintains a stack of capture buffers.  Tags such as `capture`
/// redirect everything rendered by their body into a fresh buffer and take
/// it back afterwards.  Custom tags receive the output and can write to it
/// like to any [`fmt::Write`](std::fmt::Write) value.
#[derive(Debug)]
pub struct Output {
    capture_stack: Vec<String>,
}

impl Default for Output {
    fn default() -> Self {
        Output::new()
    }
}

impl Output {
    /// Creates an empty output.
    pub fn new() -> Output {
        Output {
            capture_stack: vec![String::new()],
        }
    }

    /// Begins capturing into a new buffer.
    pub fn begin_capture(&mut self) {
        self.capture_stack.push(String::new());
    }

    /// Ends the innermost capture and returns what was written.
    ///
    /// The root buffer is never handed out by this method.
    pub fn end_capture(&mut self) -> String {
        if self.capture_stack.len() > 1 {
            self.capture_stack.pop().unwrap_or_default()
        } else {
            String::new()
        }
    }

    /// Returns the number of active captures.
    pub fn capture_depth(&self) -> usize {
        self.capture_stack.len() - 1
    }

    fn target(&mut self) -> &mut String {
        if self.capture_stack.is_empty() {
            self.capture_stack.push(String::new());
        }
        let idx = self.capture_stack.len() - 1;
        &mut self.capture_stack[idx]
    }

    /// Appends a string.
    #[inline]
    pub fn push_str(&mut self, s: &str) {
        self.target().push_str(s);
    }

    /// Returns what was written to the current buffer so far.
    pub fn as_str(&self) -> &str {
        self.capture_stack.last().map_or("", |x| x.as_str())
    }

    /// Consumes the output and returns the rendered text.
    ///
    /// Unfinished captures are folded into the result.
    pub fn into_string(self) -> String {
        self.capture_stack.concat()
    }
}

impl fmt::Write for Output {
    #[inline]
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.push_str(s);
        Ok(())
    }

    #[inline]
    fn write_char(&mut self, c: char) -> fmt::Result {
        self.target().push(c);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fmt::Write;

    #[test]
    fn test_capture_stack() {
        let mut out = Output::new();
        out.push_str("a");
        out.begin_capture();
        write!(out, "{}", 42).unwrap();
        assert_eq!(out.capture_depth(), 1);
        assert_eq!(out.end_capture(), "42");
        assert_eq!(out.end_capture(), "");
        out.push_str("b");
        assert_eq!(out.into_string(), "ab");
    }
}
