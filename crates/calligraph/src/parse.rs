use std::{borrow::Cow, fmt};

use ruff_python_ast::ModModule;
use ruff_python_parser::parse_module;
use ruff_text_size::{Ranged, TextSize};

/// A 0-indexed line/column position in a source file.
///
/// Columns are byte offsets within the line, which is adequate for the
/// diagnostics and annotations this crate produces.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Hash, serde::Serialize)]
pub struct CodeLoc {
    pub line: u32,
    pub col: u32,
}

impl CodeLoc {
    #[must_use]
    pub const fn new(line: u32, col: u32) -> Self {
        Self { line, col }
    }

    /// The 1-indexed line number, as editors and `filename:lineno`
    /// annotations display it.
    #[must_use]
    pub const fn display_line(self) -> u32 {
        self.line + 1
    }
}

impl fmt::Display for CodeLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line + 1, self.col + 1)
    }
}

/// Converts byte offsets from the ruff parser into line/column positions.
///
/// Built once per file from the positions of newline bytes in the source.
#[derive(Debug)]
pub struct SourceMap {
    line_ends: Vec<usize>,
}

impl SourceMap {
    pub(crate) fn new(code: &str) -> Self {
        let mut line_ends = vec![];
        for (i, b) in code.bytes().enumerate() {
            if b == b'\n' {
                line_ends.push(i);
            }
        }
        Self { line_ends }
    }

    /// Returns the location of a byte offset.
    pub(crate) fn loc(&self, offset: TextSize) -> CodeLoc {
        let index = usize::from(offset);
        let mut line_start = 0;
        for (line_no, line_end) in self.line_ends.iter().enumerate() {
            if index <= *line_end {
                return CodeLoc::new(as_u32(line_no), as_u32(index - line_start));
            }
            line_start = *line_end + 1;
        }
        // Content after the last newline (file without trailing newline).
        CodeLoc::new(as_u32(self.line_ends.len()), as_u32(index - line_start))
    }
}

fn as_u32(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

/// A parsed source file: the ruff syntax tree plus the offset-to-location
/// table used for every position recorded from it.
#[derive(Debug)]
pub struct ParsedFile {
    pub module: ModModule,
    pub source_map: SourceMap,
}

/// Parses one Python source file into its syntax tree.
///
/// Syntax errors carry the filename and the position of the first error so
/// the caller can report the file and continue with the rest of the input
/// set.
pub(crate) fn parse_file(code: &str, filename: &str) -> Result<ParsedFile, ParseError> {
    let source_map = SourceMap::new(code);
    let module = parse_module(code)
        .map_err(|e| ParseError::syntax(e.to_string(), filename, source_map.loc(e.range().start())))?
        .into_syntax();
    Ok(ParsedFile { module, source_map })
}

/// Errors produced while parsing a Python source file.
#[derive(Debug, Clone)]
pub enum ParseError {
    /// The file is not syntactically valid Python.
    Syntax {
        msg: Cow<'static, str>,
        filename: String,
        loc: CodeLoc,
    },
}

impl ParseError {
    pub(crate) fn syntax(msg: impl Into<Cow<'static, str>>, filename: &str, loc: CodeLoc) -> Self {
        Self::Syntax {
            msg: msg.into(),
            filename: filename.to_owned(),
            loc,
        }
    }

    /// The file the error was found in.
    #[must_use]
    pub fn filename(&self) -> &str {
        match self {
            Self::Syntax { filename, .. } => filename,
        }
    }

    /// The position of the first error.
    #[must_use]
    pub fn loc(&self) -> CodeLoc {
        match self {
            Self::Syntax { loc, .. } => *loc,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax { msg, filename, loc } => {
                write!(f, "{filename}:{loc}: syntax error: {msg}")
            }
        }
    }
}

impl std::error::Error for ParseError {}
