use core::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum ParseErrorKind {
    UnexpectedToken { found: String, expected: &'static str },
    UnexpectedCharacter(char),
    UnterminatedString,
    InconsistentDedent,
    InvalidNumber(String),
    InvalidFormatString(String),
    InvalidAssignmentTarget,
}

/// A script failed to parse. Line and column are 1-based and relative to
/// the file being parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    pub kind: ParseErrorKind,
}

impl ParseError {
    pub fn new(line: usize, column: usize, kind: ParseErrorKind) -> Self {
        Self { line, column, kind }
    }
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ParseErrorKind::UnexpectedToken { found, expected } => {
                write!(f, "Unexpected token {found}, expected {expected}")
            }
            ParseErrorKind::UnexpectedCharacter(ch) => write!(f, "Unexpected character {ch:?}"),
            ParseErrorKind::UnterminatedString => write!(f, "Unterminated string literal"),
            ParseErrorKind::InconsistentDedent => {
                write!(f, "Unindent does not match any outer indentation level")
            }
            ParseErrorKind::InvalidNumber(num) => write!(f, "Invalid number literal '{num}'"),
            ParseErrorKind::InvalidFormatString(msg) => write!(f, "Invalid f-string: {msg}"),
            ParseErrorKind::InvalidAssignmentTarget => write!(f, "Cannot assign to expression"),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "line {}, column {}: {}", self.line, self.column, self.kind)
    }
}

impl core::error::Error for ParseError {}
