use core::iter::Peekable;
use core::str::Chars;

use super::error::{ParseError, ParseErrorKind};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    // Literals
    String(String),
    FormatString(String),
    Integer(i64),
    Float(f64),

    // Identifiers and Keywords
    Identifier(String),
    True,
    False,
    None,
    If,
    Elif,
    Else,
    For,
    While,
    In,
    Not,
    And,
    Or,
    Is,
    Def,
    Lambda,
    Return,
    Pass,
    Break,
    Continue,
    Import,
    From,
    As,
    Try,
    Except,
    Finally,
    Raise,
    Assert,
    Global,
    Nonlocal,
    Del,
    With,
    Class,
    Yield,

    // Operators
    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    DoubleSlash,
    Percent,
    Pipe,
    Ampersand,
    Caret,
    Tilde,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    OrAssign,
    AndAssign,
    Arrow,
    At,
    Colon,
    Semicolon,

    // Delimiters
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    LeftBrace,
    RightBrace,
    Comma,
    Dot,

    // Layout
    Newline,
    Indent,
    Dedent,
    Eof,
}

impl TokenKind {
    pub(crate) fn describe(&self) -> String {
        match self {
            TokenKind::String(s) | TokenKind::FormatString(s) => format!("string {s:?}"),
            TokenKind::Integer(i) => format!("integer {i}"),
            TokenKind::Float(x) => format!("number {x}"),
            TokenKind::Identifier(name) => format!("identifier '{name}'"),
            TokenKind::Newline => "end of line".into(),
            TokenKind::Indent => "indent".into(),
            TokenKind::Dedent => "dedent".into(),
            TokenKind::Eof => "end of file".into(),
            other => format!("{other:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
}

pub(crate) struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    line: usize,
    column: usize,
    indent_stack: Vec<usize>,
    paren_depth: usize,
    at_line_start: bool,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    pub(crate) fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
            line: 1,
            column: 1,
            indent_stack: vec![0],
            paren_depth: 0,
            at_line_start: true,
            tokens: Vec::new(),
        }
    }

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn peek_ahead(&mut self, n: usize) -> Option<char> {
        self.chars.clone().nth(n)
    }

    fn next_char(&mut self) -> Option<char> {
        let ch = self.chars.next()?;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn error(&self, kind: ParseErrorKind) -> ParseError {
        ParseError::new(self.line, self.column, kind)
    }

    fn push(&mut self, kind: TokenKind, line: usize, column: usize) {
        self.tokens.push(Token { kind, line, column });
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek_char() {
            if ch == ' ' || ch == '\t' || ch == '\r' || ch == '\x0c' {
                self.next_char();
            } else {
                break;
            }
        }
    }

    fn skip_comment(&mut self) {
        while let Some(ch) = self.peek_char() {
            if ch == '\n' {
                break;
            }
            self.next_char();
        }
    }

    /// Measures the indentation of a new logical line and emits
    /// INDENT/DEDENT tokens. Returns false for blank or comment-only lines.
    fn indentation(&mut self) -> Result<bool, ParseError> {
        let mut width = 0;
        while let Some(ch) = self.peek_char() {
            match ch {
                ' ' => width += 1,
                '\t' => width = (width / 8 + 1) * 8,
                '\x0c' => width = 0,
                '\r' => {}
                _ => break,
            }
            self.next_char();
        }

        match self.peek_char() {
            None => return Ok(false),
            Some('\n') => {
                self.next_char();
                return Ok(false);
            }
            Some('#') => {
                self.skip_comment();
                return Ok(false);
            }
            _ => {}
        }

        self.at_line_start = false;
        let (line, column) = (self.line, self.column);
        let current = self.indent_stack.last().copied().unwrap_or(0);
        if width > current {
            self.indent_stack.push(width);
            self.push(TokenKind::Indent, line, column);
        } else {
            while width < self.indent_stack.last().copied().unwrap_or(0) {
                self.indent_stack.pop();
                self.push(TokenKind::Dedent, line, column);
            }
            if width != self.indent_stack.last().copied().unwrap_or(0) {
                return Err(self.error(ParseErrorKind::InconsistentDedent));
            }
        }
        Ok(true)
    }

    fn read_escape(&mut self, string: &mut String) -> Result<(), ParseError> {
        let Some(ch) = self.next_char() else {
            return Err(self.error(ParseErrorKind::UnterminatedString));
        };
        let escaped = match ch {
            '\n' => return Ok(()),
            'n' => '\n',
            'r' => '\r',
            't' => '\t',
            '\\' => '\\',
            '\'' => '\'',
            '"' => '"',
            'a' => '\x07',
            'b' => '\x08',
            'f' => '\x0C',
            'v' => '\x0B',
            'x' | 'u' | 'U' => {
                let digits = match ch {
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };
                let hex = self.read_digits(digits, 16);
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(c) => c,
                    None => {
                        string.push('\\');
                        string.push(ch);
                        string.push_str(&hex);
                        return Ok(());
                    }
                }
            }
            '0'..='7' => {
                let mut octal = String::from(ch);
                octal.push_str(&self.read_digits(2, 8));
                match u32::from_str_radix(&octal, 8).ok().and_then(char::from_u32) {
                    Some(c) => c,
                    None => ch,
                }
            }
            _ => {
                // Unknown escapes are kept verbatim
                string.push('\\');
                ch
            }
        };
        string.push(escaped);
        Ok(())
    }

    fn read_digits(&mut self, max: usize, radix: u32) -> String {
        let mut digits = String::new();
        for _ in 0..max {
            match self.peek_char() {
                Some(c) if c.is_digit(radix) => {
                    digits.push(c);
                    self.next_char();
                }
                _ => break,
            }
        }
        digits
    }

    fn read_string(&mut self, quote: char, raw: bool) -> Result<String, ParseError> {
        let (line, column) = (self.line, self.column);
        let unterminated = || ParseError::new(line, column, ParseErrorKind::UnterminatedString);

        let triple = self.peek_char() == Some(quote) && self.peek_ahead(1) == Some(quote);
        if triple {
            self.next_char();
            self.next_char();
        }

        let mut string = String::new();
        loop {
            let Some(ch) = self.next_char() else {
                return Err(unterminated());
            };
            if ch == quote {
                if !triple {
                    break;
                }
                if self.peek_char() == Some(quote) && self.peek_ahead(1) == Some(quote) {
                    self.next_char();
                    self.next_char();
                    break;
                }
                string.push(ch);
            } else if ch == '\n' && !triple {
                return Err(unterminated());
            } else if ch == '\\' {
                if raw {
                    string.push('\\');
                    if let Some(next) = self.next_char() {
                        string.push(next);
                    }
                } else {
                    self.read_escape(&mut string)?;
                }
            } else {
                string.push(ch);
            }
        }

        Ok(string)
    }

    fn read_identifier(&mut self) -> String {
        let mut ident = String::new();
        while let Some(ch) = self.peek_char() {
            if ch.is_alphanumeric() || ch == '_' {
                ident.push(ch);
                self.next_char();
            } else {
                break;
            }
        }
        ident
    }

    fn read_number(&mut self) -> Result<TokenKind, ParseError> {
        let mut text = String::new();

        if self.peek_char() == Some('0') {
            let radix = match self.peek_ahead(1) {
                Some('x') | Some('X') => Some(16),
                Some('o') | Some('O') => Some(8),
                Some('b') | Some('B') => Some(2),
                _ => None,
            };
            if let Some(radix) = radix {
                self.next_char();
                self.next_char();
                while let Some(ch) = self.peek_char() {
                    if ch.is_digit(radix) || ch == '_' {
                        if ch != '_' {
                            text.push(ch);
                        }
                        self.next_char();
                    } else {
                        break;
                    }
                }
                return i64::from_str_radix(&text, radix)
                    .map(TokenKind::Integer)
                    .map_err(|_| self.error(ParseErrorKind::InvalidNumber(text)));
            }
        }

        let mut is_float = false;
        self.read_decimal(&mut text);
        if self.peek_char() == Some('.') && self.peek_ahead(1) != Some('.') {
            is_float = true;
            text.push('.');
            self.next_char();
            self.read_decimal(&mut text);
        }
        if matches!(self.peek_char(), Some('e') | Some('E')) {
            let sign = self.peek_ahead(1);
            let exponent_follows = match sign {
                Some('+') | Some('-') => self.peek_ahead(2).is_some_and(|c| c.is_ascii_digit()),
                Some(c) => c.is_ascii_digit(),
                None => false,
            };
            if exponent_follows {
                is_float = true;
                text.push('e');
                self.next_char();
                if let Some(s @ ('+' | '-')) = self.peek_char() {
                    text.push(s);
                    self.next_char();
                }
                self.read_decimal(&mut text);
            }
        }

        if is_float {
            text.parse::<f64>()
                .map(TokenKind::Float)
                .map_err(|_| self.error(ParseErrorKind::InvalidNumber(text)))
        } else {
            text.parse::<i64>()
                .map(TokenKind::Integer)
                .map_err(|_| self.error(ParseErrorKind::InvalidNumber(text)))
        }
    }

    fn read_decimal(&mut self, text: &mut String) {
        while let Some(ch) = self.peek_char() {
            if ch.is_ascii_digit() || ch == '_' {
                if ch != '_' {
                    text.push(ch);
                }
                self.next_char();
            } else {
                break;
            }
        }
    }

    fn operator(&mut self, ch: char) -> Result<TokenKind, ParseError> {
        self.next_char();
        let followed_by = |lexer: &mut Self, c: char| {
            if lexer.peek_char() == Some(c) {
                lexer.next_char();
                true
            } else {
                false
            }
        };

        let kind = match ch {
            '+' if followed_by(self, '=') => TokenKind::AddAssign,
            '+' => TokenKind::Plus,
            '-' if followed_by(self, '=') => TokenKind::SubAssign,
            '-' if followed_by(self, '>') => TokenKind::Arrow,
            '-' => TokenKind::Minus,
            '*' if followed_by(self, '*') => TokenKind::DoubleStar,
            '*' if followed_by(self, '=') => TokenKind::MulAssign,
            '*' => TokenKind::Star,
            '/' if followed_by(self, '/') => TokenKind::DoubleSlash,
            '/' if followed_by(self, '=') => TokenKind::DivAssign,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '|' if followed_by(self, '=') => TokenKind::OrAssign,
            '|' => TokenKind::Pipe,
            '&' if followed_by(self, '=') => TokenKind::AndAssign,
            '&' => TokenKind::Ampersand,
            '^' => TokenKind::Caret,
            '~' => TokenKind::Tilde,
            '=' if followed_by(self, '=') => TokenKind::Eq,
            '=' => TokenKind::Assign,
            '!' if followed_by(self, '=') => TokenKind::Ne,
            '<' if followed_by(self, '=') => TokenKind::Le,
            '<' => TokenKind::Lt,
            '>' if followed_by(self, '=') => TokenKind::Ge,
            '>' => TokenKind::Gt,
            '@' => TokenKind::At,
            ':' => TokenKind::Colon,
            ';' => TokenKind::Semicolon,
            ',' => TokenKind::Comma,
            '.' => TokenKind::Dot,
            '(' | '[' | '{' => {
                self.paren_depth += 1;
                match ch {
                    '(' => TokenKind::LeftParen,
                    '[' => TokenKind::LeftBracket,
                    _ => TokenKind::LeftBrace,
                }
            }
            ')' | ']' | '}' => {
                self.paren_depth = self.paren_depth.saturating_sub(1);
                match ch {
                    ')' => TokenKind::RightParen,
                    ']' => TokenKind::RightBracket,
                    _ => TokenKind::RightBrace,
                }
            }
            other => return Err(self.error(ParseErrorKind::UnexpectedCharacter(other))),
        };
        Ok(kind)
    }

    pub(crate) fn tokenize(mut self) -> Result<Vec<Token>, ParseError> {
        loop {
            if self.at_line_start && self.paren_depth == 0 {
                if !self.indentation()? {
                    if self.peek_char().is_none() {
                        break;
                    }
                    continue;
                }
            }

            self.skip_whitespace();
            let (line, column) = (self.line, self.column);

            let Some(ch) = self.peek_char() else {
                break;
            };

            match ch {
                '\n' => {
                    self.next_char();
                    if self.paren_depth == 0 {
                        self.push(TokenKind::Newline, line, column);
                        self.at_line_start = true;
                    }
                }
                '#' => self.skip_comment(),
                '\\' => {
                    self.next_char();
                    if self.peek_char() == Some('\r') {
                        self.next_char();
                    }
                    if self.peek_char() != Some('\n') {
                        return Err(self.error(ParseErrorKind::UnexpectedCharacter('\\')));
                    }
                    // Explicit line joining
                    self.next_char();
                }
                '\'' | '"' => {
                    self.next_char();
                    let string = self.read_string(ch, false)?;
                    self.push(TokenKind::String(string), line, column);
                }
                '0'..='9' => {
                    let number = self.read_number()?;
                    self.push(number, line, column);
                }
                '.' if self.peek_ahead(1).is_some_and(|c| c.is_ascii_digit()) => {
                    let number = self.read_number()?;
                    self.push(number, line, column);
                }
                c if c.is_alphabetic() || c == '_' => {
                    let ident = self.read_identifier();
                    let quote = self.peek_char().filter(|q| *q == '\'' || *q == '"');
                    let prefix = ident.to_ascii_lowercase();
                    if let Some(quote) =
                        quote.filter(|_| prefix.len() <= 2 && prefix.chars().all(|p| "rbuf".contains(p)))
                    {
                        self.next_char();
                        let string = self.read_string(quote, prefix.contains('r'))?;
                        let kind = if prefix.contains('f') {
                            TokenKind::FormatString(string)
                        } else {
                            TokenKind::String(string)
                        };
                        self.push(kind, line, column);
                    } else {
                        self.push(keyword(ident), line, column);
                    }
                }
                _ => {
                    let kind = self.operator(ch)?;
                    self.push(kind, line, column);
                }
            }
        }

        let (line, column) = (self.line, self.column);
        if !matches!(
            self.tokens.last().map(|t| &t.kind),
            None | Some(TokenKind::Newline)
        ) {
            self.push(TokenKind::Newline, line, column);
        }
        while self.indent_stack.len() > 1 {
            self.indent_stack.pop();
            self.push(TokenKind::Dedent, line, column);
        }
        self.push(TokenKind::Eof, line, column);
        Ok(self.tokens)
    }
}

fn keyword(ident: String) -> TokenKind {
    match ident.as_str() {
        "True" => TokenKind::True,
        "False" => TokenKind::False,
        "None" => TokenKind::None,
        "if" => TokenKind::If,
        "elif" => TokenKind::Elif,
        "else" => TokenKind::Else,
        "for" => TokenKind::For,
        "while" => TokenKind::While,
        "in" => TokenKind::In,
        "not" => TokenKind::Not,
        "and" => TokenKind::And,
        "or" => TokenKind::Or,
        "is" => TokenKind::Is,
        "def" => TokenKind::Def,
        "lambda" => TokenKind::Lambda,
        "return" => TokenKind::Return,
        "pass" => TokenKind::Pass,
        "break" => TokenKind::Break,
        "continue" => TokenKind::Continue,
        "import" => TokenKind::Import,
        "from" => TokenKind::From,
        "as" => TokenKind::As,
        "try" => TokenKind::Try,
        "except" => TokenKind::Except,
        "finally" => TokenKind::Finally,
        "raise" => TokenKind::Raise,
        "assert" => TokenKind::Assert,
        "global" => TokenKind::Global,
        "nonlocal" => TokenKind::Nonlocal,
        "del" => TokenKind::Del,
        "with" => TokenKind::With,
        "class" => TokenKind::Class,
        "yield" => TokenKind::Yield,
        _ => TokenKind::Identifier(ident),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        Lexer::new(input)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_indent_dedent() {
        let tokens = kinds("if x:\n    y = 1\n\n    # note\nz = 2\n");
        assert_eq!(
            tokens,
            vec![
                TokenKind::If,
                TokenKind::Identifier("x".into()),
                TokenKind::Colon,
                TokenKind::Newline,
                TokenKind::Indent,
                TokenKind::Identifier("y".into()),
                TokenKind::Assign,
                TokenKind::Integer(1),
                TokenKind::Newline,
                TokenKind::Dedent,
                TokenKind::Identifier("z".into()),
                TokenKind::Assign,
                TokenKind::Integer(2),
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_implicit_line_joining() {
        let tokens = kinds("x = [\n  'a',\n  'b',\n]\n");
        assert!(!tokens[..tokens.len() - 2].contains(&TokenKind::Newline));
        let tokens = kinds("x = 1 + \\\n    2\n");
        assert_eq!(tokens.iter().filter(|t| **t == TokenKind::Newline).count(), 1);
        assert!(!tokens.contains(&TokenKind::Indent));
    }

    #[test]
    fn test_string_prefixes() {
        let tokens = kinds(r#"a = r'\d' + f"{x}" + '''multi
line''' + "\x41\n""#);
        assert!(tokens.contains(&TokenKind::String("\\d".into())));
        assert!(tokens.contains(&TokenKind::FormatString("{x}".into())));
        assert!(tokens.contains(&TokenKind::String("multi\nline".into())));
        assert!(tokens.contains(&TokenKind::String("A\n".into())));
    }

    #[test]
    fn test_numbers() {
        assert_eq!(kinds("0x1F")[0], TokenKind::Integer(31));
        assert_eq!(kinds("1_000")[0], TokenKind::Integer(1000));
        assert_eq!(kinds("2.5")[0], TokenKind::Float(2.5));
        assert_eq!(kinds(".5")[0], TokenKind::Float(0.5));
        assert_eq!(kinds("1e3")[0], TokenKind::Float(1000.0));
    }

    #[test]
    fn test_bad_dedent() {
        let err = Lexer::new("if x:\n    a\n  b\n").tokenize().unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::InconsistentDedent);
        assert_eq!(err.line, 3);
    }

    #[test]
    fn test_unterminated_string() {
        let err = Lexer::new("x = 'abc\n").tokenize().unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnterminatedString);
        assert_eq!(err.line, 1);
    }
}
