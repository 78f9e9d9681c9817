use std::rc::Rc;

mod error;
mod lexer;

pub use error::{ParseError, ParseErrorKind};
use lexer::{Lexer, Token, TokenKind};

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    None,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    FormatString(Vec<FormatPart>),
    Identifier(String),
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    ListComp(Box<Expr>, Vec<Comprehension>),
    DictComp(Box<Expr>, Box<Expr>, Vec<Comprehension>),
    Attribute(Box<Expr>, String),
    Subscript(Box<Expr>, Box<Expr>),
    Slice(Option<Box<Expr>>, Option<Box<Expr>>, Option<Box<Expr>>),
    Call(Box<Expr>, Vec<Argument>),
    BinaryOp(Box<Expr>, BinaryOperator, Box<Expr>),
    UnaryOp(UnaryOperator, Box<Expr>),
    Compare(Box<Expr>, Vec<(CompareOperator, Expr)>),
    TernaryOp(Box<Expr>, Box<Expr>, Box<Expr>), // condition, true_val, false_val
    Lambda(Rc<FunctionDef>),
    Starred(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FormatPart {
    Literal(String),
    Expr(Box<Expr>, Option<String>), // expression, format spec
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comprehension {
    pub target: Expr,
    pub iter: Expr,
    pub conditions: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    Positional(Expr),
    Keyword(String, Expr),
    Star(Expr),
    DoubleStar(Expr),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    BitOr,
    BitAnd,
    BitXor,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CompareOperator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Is,
    IsNot,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOperator {
    Not,
    Minus,
    Plus,
    Invert,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<Parameter>,
    pub varargs: Option<String>,
    pub kwargs: Option<String>,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExceptHandler {
    pub binding: Option<String>,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportName {
    pub name: String,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind {
    Expression(Expr),
    Assignment(Vec<Expr>, Expr), // targets (chained), value
    AugAssignment(Expr, BinaryOperator, Expr),
    If(
        Expr,
        Vec<Statement>,
        Vec<(Expr, Vec<Statement>)>,
        Option<Vec<Statement>>,
    ), // condition, then, elif_branches, else
    For(Expr, Expr, Vec<Statement>, Option<Vec<Statement>>), // target, iterable, body, else
    While(Expr, Vec<Statement>),
    FunctionDef(Rc<FunctionDef>),
    Return(Option<Expr>),
    Import(Vec<ImportName>),
    FromImport(String, Vec<ImportName>), // empty names means `*`
    Try(
        Vec<Statement>,
        Vec<ExceptHandler>,
        Option<Vec<Statement>>,
        Option<Vec<Statement>>,
    ), // body, handlers, else, finally
    With(Expr, Option<Expr>, Vec<Statement>),
    Raise(Option<Expr>),
    Assert(Expr, Option<Expr>),
    Global(Vec<String>),
    Del(Vec<Expr>),
    Pass,
    Break,
    Continue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub line: usize,
    pub kind: StatementKind,
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

type ParseResult<T> = Result<T, ParseError>;

impl Parser {
    pub fn new(input: &str) -> ParseResult<Self> {
        let tokens = Lexer::new(input).tokenize()?;
        Ok(Parser { tokens, pos: 0 })
    }

    pub fn parse(&mut self) -> ParseResult<Vec<Statement>> {
        let mut statements = Vec::new();

        loop {
            while self.match_token(&TokenKind::Newline) {}
            if self.is_at_end() {
                break;
            }
            statements.extend(self.statement()?);
        }

        Ok(statements)
    }

    fn statement(&mut self) -> ParseResult<Vec<Statement>> {
        let line = self.current().line;
        let kind = match self.peek() {
            TokenKind::If => self.if_statement()?,
            TokenKind::For => self.for_statement()?,
            TokenKind::While => self.while_statement()?,
            TokenKind::Def => self.function_def()?,
            TokenKind::Try => self.try_statement()?,
            TokenKind::With => self.with_statement()?,
            TokenKind::At => {
                // Decorators carry no build semantics
                self.advance();
                self.expression()?;
                self.expect_newline()?;
                return self.statement();
            }
            _ => return self.simple_statements(),
        };
        Ok(vec![Statement { line, kind }])
    }

    /// One or more `;`-separated simple statements terminated by a newline.
    fn simple_statements(&mut self) -> ParseResult<Vec<Statement>> {
        let mut statements = Vec::new();
        loop {
            let line = self.current().line;
            let kind = self.simple_statement()?;
            statements.push(Statement { line, kind });
            if !self.match_token(&TokenKind::Semicolon) {
                break;
            }
            if matches!(self.peek(), TokenKind::Newline | TokenKind::Eof) {
                break;
            }
        }
        self.expect_newline()?;
        Ok(statements)
    }

    fn simple_statement(&mut self) -> ParseResult<StatementKind> {
        match self.peek() {
            TokenKind::Pass => {
                self.advance();
                Ok(StatementKind::Pass)
            }
            TokenKind::Break => {
                self.advance();
                Ok(StatementKind::Break)
            }
            TokenKind::Continue => {
                self.advance();
                Ok(StatementKind::Continue)
            }
            TokenKind::Return => {
                self.advance();
                if self.at_statement_end() {
                    Ok(StatementKind::Return(None))
                } else {
                    Ok(StatementKind::Return(Some(self.expression_list()?)))
                }
            }
            TokenKind::Raise => {
                self.advance();
                if self.at_statement_end() {
                    return Ok(StatementKind::Raise(None));
                }
                let exc = self.expression()?;
                if self.match_token(&TokenKind::From) {
                    self.expression()?;
                }
                Ok(StatementKind::Raise(Some(exc)))
            }
            TokenKind::Assert => {
                self.advance();
                let cond = self.expression()?;
                let msg = if self.match_token(&TokenKind::Comma) {
                    Some(self.expression()?)
                } else {
                    None
                };
                Ok(StatementKind::Assert(cond, msg))
            }
            TokenKind::Global | TokenKind::Nonlocal => {
                self.advance();
                let mut names = vec![self.identifier()?];
                while self.match_token(&TokenKind::Comma) {
                    names.push(self.identifier()?);
                }
                Ok(StatementKind::Global(names))
            }
            TokenKind::Del => {
                self.advance();
                let mut targets = vec![self.postfix()?];
                while self.match_token(&TokenKind::Comma) {
                    targets.push(self.postfix()?);
                }
                Ok(StatementKind::Del(targets))
            }
            TokenKind::Import => self.import_statement(),
            TokenKind::From => self.from_import_statement(),
            _ => self.expression_statement(),
        }
    }

    fn expression_statement(&mut self) -> ParseResult<StatementKind> {
        let expr = self.expression_list()?;

        let aug_op = match self.peek() {
            TokenKind::AddAssign => Some(BinaryOperator::Add),
            TokenKind::SubAssign => Some(BinaryOperator::Sub),
            TokenKind::MulAssign => Some(BinaryOperator::Mul),
            TokenKind::DivAssign => Some(BinaryOperator::Div),
            TokenKind::OrAssign => Some(BinaryOperator::BitOr),
            TokenKind::AndAssign => Some(BinaryOperator::BitAnd),
            _ => None,
        };
        if let Some(op) = aug_op {
            self.advance();
            check_target(&expr).map_err(|kind| self.error_here(kind))?;
            let value = self.expression_list()?;
            return Ok(StatementKind::AugAssignment(expr, op, value));
        }

        // Annotated assignment: `name: type = value`
        if matches!(expr, Expr::Identifier(_)) && self.match_token(&TokenKind::Colon) {
            self.expression()?;
            if !self.match_token(&TokenKind::Assign) {
                return Ok(StatementKind::Pass);
            }
            let value = self.expression_list()?;
            return Ok(StatementKind::Assignment(vec![expr], value));
        }

        if !self.match_token(&TokenKind::Assign) {
            return Ok(StatementKind::Expression(expr));
        }

        let mut targets = vec![expr];
        let mut value = self.expression_list()?;
        while self.match_token(&TokenKind::Assign) {
            targets.push(value);
            value = self.expression_list()?;
        }
        for target in &targets {
            check_target(target).map_err(|kind| self.error_here(kind))?;
        }
        Ok(StatementKind::Assignment(targets, value))
    }

    fn import_statement(&mut self) -> ParseResult<StatementKind> {
        self.expect(&TokenKind::Import, "'import'")?;
        let mut names = Vec::new();
        loop {
            let name = self.dotted_name()?;
            let alias = if self.match_token(&TokenKind::As) {
                Some(self.identifier()?)
            } else {
                None
            };
            names.push(ImportName { name, alias });
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }
        Ok(StatementKind::Import(names))
    }

    fn from_import_statement(&mut self) -> ParseResult<StatementKind> {
        self.expect(&TokenKind::From, "'from'")?;
        let mut module = String::new();
        while self.match_token(&TokenKind::Dot) {
            module.push('.');
        }
        if !matches!(self.peek(), TokenKind::Import) {
            module.push_str(&self.dotted_name()?);
        }
        self.expect(&TokenKind::Import, "'import'")?;

        let mut names = Vec::new();
        if self.match_token(&TokenKind::Star) {
            return Ok(StatementKind::FromImport(module, names));
        }
        let parenthesized = self.match_token(&TokenKind::LeftParen);
        loop {
            let name = self.identifier()?;
            let alias = if self.match_token(&TokenKind::As) {
                Some(self.identifier()?)
            } else {
                None
            };
            names.push(ImportName { name, alias });
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
            if parenthesized && matches!(self.peek(), TokenKind::RightParen) {
                break;
            }
        }
        if parenthesized {
            self.expect(&TokenKind::RightParen, "')'")?;
        }
        Ok(StatementKind::FromImport(module, names))
    }

    fn dotted_name(&mut self) -> ParseResult<String> {
        let mut name = self.identifier()?;
        while self.match_token(&TokenKind::Dot) {
            name.push('.');
            name.push_str(&self.identifier()?);
        }
        Ok(name)
    }

    /// The body of a compound statement: an indented block, or simple
    /// statements on the same line.
    fn block(&mut self) -> ParseResult<Vec<Statement>> {
        self.expect(&TokenKind::Colon, "':'")?;
        if !self.match_token(&TokenKind::Newline) {
            return self.simple_statements();
        }
        while self.match_token(&TokenKind::Newline) {}
        self.expect(&TokenKind::Indent, "an indented block")?;

        let mut body = Vec::new();
        while !matches!(self.peek(), TokenKind::Dedent | TokenKind::Eof) {
            if self.match_token(&TokenKind::Newline) {
                continue;
            }
            body.extend(self.statement()?);
        }
        self.match_token(&TokenKind::Dedent);
        Ok(body)
    }

    fn if_statement(&mut self) -> ParseResult<StatementKind> {
        self.expect(&TokenKind::If, "'if'")?;
        let condition = self.expression()?;
        let then_branch = self.block()?;

        let mut elif_branches = Vec::new();
        while self.match_token(&TokenKind::Elif) {
            let elif_condition = self.expression()?;
            let elif_body = self.block()?;
            elif_branches.push((elif_condition, elif_body));
        }

        let else_branch = if self.match_token(&TokenKind::Else) {
            Some(self.block()?)
        } else {
            None
        };

        Ok(StatementKind::If(
            condition,
            then_branch,
            elif_branches,
            else_branch,
        ))
    }

    fn for_statement(&mut self) -> ParseResult<StatementKind> {
        self.expect(&TokenKind::For, "'for'")?;
        let target = self.target_list()?;
        self.expect(&TokenKind::In, "'in'")?;
        let iterable = self.expression_list()?;
        let body = self.block()?;
        let else_branch = if self.match_token(&TokenKind::Else) {
            Some(self.block()?)
        } else {
            None
        };
        Ok(StatementKind::For(target, iterable, body, else_branch))
    }

    fn while_statement(&mut self) -> ParseResult<StatementKind> {
        self.expect(&TokenKind::While, "'while'")?;
        let condition = self.expression()?;
        let body = self.block()?;
        if self.match_token(&TokenKind::Else) {
            self.block()?;
        }
        Ok(StatementKind::While(condition, body))
    }

    fn function_def(&mut self) -> ParseResult<StatementKind> {
        self.expect(&TokenKind::Def, "'def'")?;
        let name = self.identifier()?;
        self.expect(&TokenKind::LeftParen, "'('")?;
        let mut def = self.parameters(&TokenKind::RightParen, true)?;
        self.expect(&TokenKind::RightParen, "')'")?;
        if self.match_token(&TokenKind::Arrow) {
            self.expression()?;
        }
        def.name = name;
        def.body = self.block()?;
        Ok(StatementKind::FunctionDef(Rc::new(def)))
    }

    fn parameters(&mut self, end: &TokenKind, annotated: bool) -> ParseResult<FunctionDef> {
        let mut def = FunctionDef {
            name: String::new(),
            params: Vec::new(),
            varargs: None,
            kwargs: None,
            body: Vec::new(),
        };

        while !self.check(end) {
            if self.match_token(&TokenKind::DoubleStar) {
                def.kwargs = Some(self.identifier()?);
            } else if self.match_token(&TokenKind::Star) {
                // A bare `*` only separates keyword-only parameters
                if let TokenKind::Identifier(_) = self.peek() {
                    def.varargs = Some(self.identifier()?);
                }
            } else if self.match_token(&TokenKind::Slash) {
            } else {
                let name = self.identifier()?;
                if annotated && self.match_token(&TokenKind::Colon) {
                    self.expression()?;
                }
                let default = if self.match_token(&TokenKind::Assign) {
                    Some(self.expression()?)
                } else {
                    None
                };
                def.params.push(Parameter { name, default });
            }
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }
        Ok(def)
    }

    fn try_statement(&mut self) -> ParseResult<StatementKind> {
        self.expect(&TokenKind::Try, "'try'")?;
        let body = self.block()?;

        let mut handlers = Vec::new();
        while self.match_token(&TokenKind::Except) {
            let mut binding = None;
            if !self.check(&TokenKind::Colon) {
                self.expression()?;
                if self.match_token(&TokenKind::As) {
                    binding = Some(self.identifier()?);
                }
            }
            let body = self.block()?;
            handlers.push(ExceptHandler { binding, body });
        }

        let else_branch = if self.match_token(&TokenKind::Else) {
            Some(self.block()?)
        } else {
            None
        };
        let finally = if self.match_token(&TokenKind::Finally) {
            Some(self.block()?)
        } else {
            None
        };

        if handlers.is_empty() && finally.is_none() {
            return Err(self.unexpected("'except' or 'finally'"));
        }
        Ok(StatementKind::Try(body, handlers, else_branch, finally))
    }

    fn with_statement(&mut self) -> ParseResult<StatementKind> {
        self.expect(&TokenKind::With, "'with'")?;
        let context = self.expression()?;
        let target = if self.match_token(&TokenKind::As) {
            Some(self.target_list()?)
        } else {
            None
        };
        let body = self.block()?;
        Ok(StatementKind::With(context, target, body))
    }

    /// Comma-separated expressions; more than one (or a trailing comma)
    /// yields a tuple.
    fn expression_list(&mut self) -> ParseResult<Expr> {
        let first = self.star_or_expression()?;
        if !self.check(&TokenKind::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.match_token(&TokenKind::Comma) {
            if self.at_expression_list_end() {
                break;
            }
            items.push(self.star_or_expression()?);
        }
        Ok(Expr::Tuple(items))
    }

    fn star_or_expression(&mut self) -> ParseResult<Expr> {
        if self.match_token(&TokenKind::Star) {
            return Ok(Expr::Starred(Box::new(self.bit_or()?)));
        }
        self.expression()
    }

    /// Assignment targets of `for` and `with`, which must stop before `in`.
    fn target_list(&mut self) -> ParseResult<Expr> {
        let first = self.postfix()?;
        if !self.check(&TokenKind::Comma) {
            check_target(&first).map_err(|kind| self.error_here(kind))?;
            return Ok(first);
        }
        let mut items = vec![first];
        while self.match_token(&TokenKind::Comma) {
            if self.check(&TokenKind::In) {
                break;
            }
            items.push(self.postfix()?);
        }
        let target = Expr::Tuple(items);
        check_target(&target).map_err(|kind| self.error_here(kind))?;
        Ok(target)
    }

    pub(crate) fn expression(&mut self) -> ParseResult<Expr> {
        if self.check(&TokenKind::Lambda) {
            return self.lambda();
        }
        self.ternary()
    }

    fn lambda(&mut self) -> ParseResult<Expr> {
        self.expect(&TokenKind::Lambda, "'lambda'")?;
        let mut def = self.parameters(&TokenKind::Colon, false)?;
        self.expect(&TokenKind::Colon, "':'")?;
        let line = self.current().line;
        let body = self.expression()?;
        def.name = "<lambda>".into();
        def.body = vec![Statement {
            line,
            kind: StatementKind::Return(Some(body)),
        }];
        Ok(Expr::Lambda(Rc::new(def)))
    }

    fn ternary(&mut self) -> ParseResult<Expr> {
        let expr = self.logical_or()?;

        if self.match_token(&TokenKind::If) {
            let condition = self.logical_or()?;
            self.expect(&TokenKind::Else, "'else'")?;
            let false_val = self.expression()?;
            return Ok(Expr::TernaryOp(
                Box::new(condition),
                Box::new(expr),
                Box::new(false_val),
            ));
        }

        Ok(expr)
    }

    fn logical_or(&mut self) -> ParseResult<Expr> {
        let mut left = self.logical_and()?;

        while self.match_token(&TokenKind::Or) {
            let right = self.logical_and()?;
            left = Expr::BinaryOp(Box::new(left), BinaryOperator::Or, Box::new(right));
        }

        Ok(left)
    }

    fn logical_and(&mut self) -> ParseResult<Expr> {
        let mut left = self.logical_not()?;

        while self.match_token(&TokenKind::And) {
            let right = self.logical_not()?;
            left = Expr::BinaryOp(Box::new(left), BinaryOperator::And, Box::new(right));
        }

        Ok(left)
    }

    fn logical_not(&mut self) -> ParseResult<Expr> {
        if self.match_token(&TokenKind::Not) {
            let expr = self.logical_not()?;
            return Ok(Expr::UnaryOp(UnaryOperator::Not, Box::new(expr)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> ParseResult<Expr> {
        let left = self.bit_or()?;
        let mut chain = Vec::new();

        loop {
            let op = match self.peek() {
                TokenKind::Eq => CompareOperator::Eq,
                TokenKind::Ne => CompareOperator::Ne,
                TokenKind::Lt => CompareOperator::Lt,
                TokenKind::Le => CompareOperator::Le,
                TokenKind::Gt => CompareOperator::Gt,
                TokenKind::Ge => CompareOperator::Ge,
                TokenKind::In => CompareOperator::In,
                TokenKind::Not if self.peek_nth(1) == TokenKind::In => {
                    self.advance();
                    CompareOperator::NotIn
                }
                TokenKind::Is if self.peek_nth(1) == TokenKind::Not => {
                    self.advance();
                    CompareOperator::IsNot
                }
                TokenKind::Is => CompareOperator::Is,
                _ => break,
            };
            self.advance();
            chain.push((op, self.bit_or()?));
        }

        if chain.is_empty() {
            Ok(left)
        } else {
            Ok(Expr::Compare(Box::new(left), chain))
        }
    }

    fn bit_or(&mut self) -> ParseResult<Expr> {
        let mut left = self.bit_xor()?;
        while self.match_token(&TokenKind::Pipe) {
            let right = self.bit_xor()?;
            left = Expr::BinaryOp(Box::new(left), BinaryOperator::BitOr, Box::new(right));
        }
        Ok(left)
    }

    fn bit_xor(&mut self) -> ParseResult<Expr> {
        let mut left = self.bit_and()?;
        while self.match_token(&TokenKind::Caret) {
            let right = self.bit_and()?;
            left = Expr::BinaryOp(Box::new(left), BinaryOperator::BitXor, Box::new(right));
        }
        Ok(left)
    }

    fn bit_and(&mut self) -> ParseResult<Expr> {
        let mut left = self.addition()?;
        while self.match_token(&TokenKind::Ampersand) {
            let right = self.addition()?;
            left = Expr::BinaryOp(Box::new(left), BinaryOperator::BitAnd, Box::new(right));
        }
        Ok(left)
    }

    fn addition(&mut self) -> ParseResult<Expr> {
        let mut left = self.multiplication()?;

        while let Some(op) = self.match_tokens(&[TokenKind::Plus, TokenKind::Minus]) {
            let right = self.multiplication()?;
            let op = match op {
                TokenKind::Plus => BinaryOperator::Add,
                _ => BinaryOperator::Sub,
            };
            left = Expr::BinaryOp(Box::new(left), op, Box::new(right));
        }

        Ok(left)
    }

    fn multiplication(&mut self) -> ParseResult<Expr> {
        let mut left = self.unary()?;

        while let Some(op) = self.match_tokens(&[
            TokenKind::Star,
            TokenKind::Slash,
            TokenKind::DoubleSlash,
            TokenKind::Percent,
        ]) {
            let right = self.unary()?;
            let op = match op {
                TokenKind::Star => BinaryOperator::Mul,
                TokenKind::Slash => BinaryOperator::Div,
                TokenKind::DoubleSlash => BinaryOperator::FloorDiv,
                _ => BinaryOperator::Mod,
            };
            left = Expr::BinaryOp(Box::new(left), op, Box::new(right));
        }

        Ok(left)
    }

    fn unary(&mut self) -> ParseResult<Expr> {
        let op = match self.peek() {
            TokenKind::Minus => UnaryOperator::Minus,
            TokenKind::Plus => UnaryOperator::Plus,
            TokenKind::Tilde => UnaryOperator::Invert,
            _ => return self.power(),
        };
        self.advance();
        let expr = self.unary()?;
        Ok(Expr::UnaryOp(op, Box::new(expr)))
    }

    fn power(&mut self) -> ParseResult<Expr> {
        let base = self.postfix()?;
        if self.match_token(&TokenKind::DoubleStar) {
            let exponent = self.unary()?;
            return Ok(Expr::BinaryOp(
                Box::new(base),
                BinaryOperator::Pow,
                Box::new(exponent),
            ));
        }
        Ok(base)
    }

    fn postfix(&mut self) -> ParseResult<Expr> {
        let mut expr = self.primary()?;

        loop {
            match self.peek() {
                TokenKind::LeftParen => {
                    self.advance();
                    let args = self.arguments()?;
                    self.expect(&TokenKind::RightParen, "')'")?;
                    expr = Expr::Call(Box::new(expr), args);
                }
                TokenKind::LeftBracket => {
                    self.advance();
                    let index = self.subscript_index()?;
                    self.expect(&TokenKind::RightBracket, "']'")?;
                    expr = Expr::Subscript(Box::new(expr), Box::new(index));
                }
                TokenKind::Dot => {
                    self.advance();
                    let attr = self.identifier()?;
                    expr = Expr::Attribute(Box::new(expr), attr);
                }
                _ => break,
            }
        }

        Ok(expr)
    }

    fn subscript_index(&mut self) -> ParseResult<Expr> {
        let start = if self.check(&TokenKind::Colon) {
            None
        } else {
            let index = self.expression_list()?;
            if !self.check(&TokenKind::Colon) {
                return Ok(index);
            }
            Some(Box::new(index))
        };

        self.expect(&TokenKind::Colon, "':'")?;
        let bound = |parser: &mut Self| -> ParseResult<Option<Box<Expr>>> {
            if matches!(parser.peek(), TokenKind::Colon | TokenKind::RightBracket) {
                Ok(None)
            } else {
                Ok(Some(Box::new(parser.expression()?)))
            }
        };
        let stop = bound(self)?;
        let step = if self.match_token(&TokenKind::Colon) {
            bound(self)?
        } else {
            None
        };
        Ok(Expr::Slice(start, stop, step))
    }

    fn arguments(&mut self) -> ParseResult<Vec<Argument>> {
        let mut args = Vec::new();

        while !self.check(&TokenKind::RightParen) {
            if self.match_token(&TokenKind::DoubleStar) {
                args.push(Argument::DoubleStar(self.expression()?));
            } else if self.match_token(&TokenKind::Star) {
                args.push(Argument::Star(self.expression()?));
            } else if matches!(self.peek(), TokenKind::Identifier(_))
                && self.peek_nth(1) == TokenKind::Assign
            {
                let name = self.identifier()?;
                self.advance();
                args.push(Argument::Keyword(name, self.expression()?));
            } else {
                let value = self.expression()?;
                if self.check(&TokenKind::For) {
                    // A bare generator expression as the sole argument
                    let clauses = self.comprehension_clauses()?;
                    args.push(Argument::Positional(Expr::ListComp(Box::new(value), clauses)));
                } else {
                    args.push(Argument::Positional(value));
                }
            }

            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }

        Ok(args)
    }

    fn comprehension_clauses(&mut self) -> ParseResult<Vec<Comprehension>> {
        let mut clauses = Vec::new();
        while self.match_token(&TokenKind::For) {
            let target = self.target_list()?;
            self.expect(&TokenKind::In, "'in'")?;
            let iter = self.logical_or()?;
            let mut conditions = Vec::new();
            while self.match_token(&TokenKind::If) {
                conditions.push(self.logical_or()?);
            }
            clauses.push(Comprehension {
                target,
                iter,
                conditions,
            });
        }
        Ok(clauses)
    }

    fn primary(&mut self) -> ParseResult<Expr> {
        let token = self.current().clone();
        match token.kind {
            TokenKind::String(_) | TokenKind::FormatString(_) => self.string_literal(),
            TokenKind::Integer(i) => {
                self.advance();
                Ok(Expr::Integer(i))
            }
            TokenKind::Float(x) => {
                self.advance();
                Ok(Expr::Float(x))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::Boolean(true))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::Boolean(false))
            }
            TokenKind::None => {
                self.advance();
                Ok(Expr::None)
            }
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(Expr::Identifier(name))
            }
            TokenKind::LeftParen => {
                self.advance();
                if self.match_token(&TokenKind::RightParen) {
                    return Ok(Expr::Tuple(Vec::new()));
                }
                let first = self.star_or_expression()?;
                if self.check(&TokenKind::For) {
                    let clauses = self.comprehension_clauses()?;
                    self.expect(&TokenKind::RightParen, "')'")?;
                    return Ok(Expr::ListComp(Box::new(first), clauses));
                }
                if self.match_token(&TokenKind::RightParen) {
                    return Ok(first);
                }
                let mut items = vec![first];
                while self.match_token(&TokenKind::Comma) {
                    if self.check(&TokenKind::RightParen) {
                        break;
                    }
                    items.push(self.star_or_expression()?);
                }
                self.expect(&TokenKind::RightParen, "')'")?;
                Ok(Expr::Tuple(items))
            }
            TokenKind::LeftBracket => {
                self.advance();
                if self.match_token(&TokenKind::RightBracket) {
                    return Ok(Expr::List(Vec::new()));
                }
                let first = self.star_or_expression()?;
                if self.check(&TokenKind::For) {
                    let clauses = self.comprehension_clauses()?;
                    self.expect(&TokenKind::RightBracket, "']'")?;
                    return Ok(Expr::ListComp(Box::new(first), clauses));
                }
                let mut elements = vec![first];
                while self.match_token(&TokenKind::Comma) {
                    if self.check(&TokenKind::RightBracket) {
                        break;
                    }
                    elements.push(self.star_or_expression()?);
                }
                self.expect(&TokenKind::RightBracket, "']'")?;
                Ok(Expr::List(elements))
            }
            TokenKind::LeftBrace => {
                self.advance();
                let expr = self.brace_elements()?;
                self.expect(&TokenKind::RightBrace, "'}'")?;
                Ok(expr)
            }
            _ => Err(self.unexpected("an expression")),
        }
    }

    /// Dict literal, dict comprehension, or set literal (sets are lists).
    fn brace_elements(&mut self) -> ParseResult<Expr> {
        if self.check(&TokenKind::RightBrace) {
            return Ok(Expr::Dict(Vec::new()));
        }

        let mut entries = Vec::new();
        if self.match_token(&TokenKind::DoubleStar) {
            entries.push((Expr::None, self.bit_or()?));
        } else {
            let first = self.expression()?;
            if !self.match_token(&TokenKind::Colon) {
                // Set literal
                let mut items = vec![first];
                while self.match_token(&TokenKind::Comma) {
                    if self.check(&TokenKind::RightBrace) {
                        break;
                    }
                    items.push(self.expression()?);
                }
                return Ok(Expr::List(items));
            }
            let value = self.expression()?;
            if self.check(&TokenKind::For) {
                let clauses = self.comprehension_clauses()?;
                return Ok(Expr::DictComp(Box::new(first), Box::new(value), clauses));
            }
            entries.push((first, value));
        }

        while self.match_token(&TokenKind::Comma) {
            if self.check(&TokenKind::RightBrace) {
                break;
            }
            if self.match_token(&TokenKind::DoubleStar) {
                // `**other` merges are encoded with a None key
                entries.push((Expr::None, self.bit_or()?));
                continue;
            }
            let key = self.expression()?;
            self.expect(&TokenKind::Colon, "':'")?;
            let value = self.expression()?;
            entries.push((key, value));
        }

        Ok(Expr::Dict(entries))
    }

    /// Adjacent literals concatenate; any f-string makes the result an f-string.
    fn string_literal(&mut self) -> ParseResult<Expr> {
        let mut parts: Vec<FormatPart> = Vec::new();
        let mut formatted = false;

        loop {
            let token = self.current().clone();
            match token.kind {
                TokenKind::String(s) => {
                    self.advance();
                    push_literal(&mut parts, &s);
                }
                TokenKind::FormatString(s) => {
                    self.advance();
                    formatted = true;
                    for part in parse_format_string(&s, token.line, token.column)? {
                        match part {
                            FormatPart::Literal(lit) => push_literal(&mut parts, &lit),
                            expr => parts.push(expr),
                        }
                    }
                }
                _ => break,
            }
        }

        if !formatted {
            let text = match parts.pop() {
                Some(FormatPart::Literal(text)) => text,
                _ => String::new(),
            };
            return Ok(Expr::String(text));
        }
        Ok(Expr::FormatString(parts))
    }

    // Helper methods
    fn current(&self) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.pos.min(last)]
    }

    fn peek(&self) -> TokenKind {
        self.current().kind.clone()
    }

    fn peek_nth(&self, n: usize) -> TokenKind {
        self.tokens
            .get(self.pos + n)
            .map(|t| t.kind.clone())
            .unwrap_or(TokenKind::Eof)
    }

    fn advance(&mut self) -> TokenKind {
        let token = self.peek();
        if !self.is_at_end() {
            self.pos += 1;
        }
        token
    }

    fn check(&self, token: &TokenKind) -> bool {
        core::mem::discriminant(&self.current().kind) == core::mem::discriminant(token)
    }

    fn match_token(&mut self, token: &TokenKind) -> bool {
        if self.check(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn match_tokens(&mut self, tokens: &[TokenKind]) -> Option<TokenKind> {
        for token in tokens {
            if self.check(token) {
                return Some(self.advance());
            }
        }
        None
    }

    fn expect(&mut self, token: &TokenKind, expected: &'static str) -> ParseResult<()> {
        if self.match_token(token) {
            Ok(())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn expect_newline(&mut self) -> ParseResult<()> {
        match self.peek() {
            TokenKind::Newline => {
                self.advance();
                Ok(())
            }
            TokenKind::Eof | TokenKind::Dedent => Ok(()),
            _ => Err(self.unexpected("end of line")),
        }
    }

    fn identifier(&mut self) -> ParseResult<String> {
        match self.peek() {
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected("an identifier")),
        }
    }

    fn at_statement_end(&self) -> bool {
        matches!(
            self.peek(),
            TokenKind::Newline | TokenKind::Semicolon | TokenKind::Eof
        )
    }

    fn at_expression_list_end(&self) -> bool {
        matches!(
            self.peek(),
            TokenKind::Newline
                | TokenKind::Semicolon
                | TokenKind::Eof
                | TokenKind::Assign
                | TokenKind::Colon
                | TokenKind::RightParen
                | TokenKind::RightBracket
        ) || self.augmented_assignment_ahead()
    }

    fn augmented_assignment_ahead(&self) -> bool {
        matches!(
            self.peek(),
            TokenKind::AddAssign
                | TokenKind::SubAssign
                | TokenKind::MulAssign
                | TokenKind::DivAssign
                | TokenKind::OrAssign
                | TokenKind::AndAssign
        )
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek(), TokenKind::Eof)
    }

    fn unexpected(&self, expected: &'static str) -> ParseError {
        let token = self.current();
        ParseError::new(
            token.line,
            token.column,
            ParseErrorKind::UnexpectedToken {
                found: token.kind.describe(),
                expected,
            },
        )
    }

    fn error_here(&self, kind: ParseErrorKind) -> ParseError {
        let token = self.current();
        ParseError::new(token.line, token.column, kind)
    }
}

fn push_literal(parts: &mut Vec<FormatPart>, text: &str) {
    if let Some(FormatPart::Literal(last)) = parts.last_mut() {
        last.push_str(text);
    } else {
        parts.push(FormatPart::Literal(text.to_string()));
    }
}

fn check_target(expr: &Expr) -> Result<(), ParseErrorKind> {
    match expr {
        Expr::Identifier(_) | Expr::Attribute(..) | Expr::Subscript(..) => Ok(()),
        Expr::Starred(inner) => check_target(inner),
        Expr::Tuple(items) | Expr::List(items) => items.iter().try_for_each(check_target),
        _ => Err(ParseErrorKind::InvalidAssignmentTarget),
    }
}

/// Splits f-string text into literal runs and embedded expressions.
fn parse_format_string(text: &str, line: usize, column: usize) -> ParseResult<Vec<FormatPart>> {
    let invalid = |msg: &str| {
        ParseError::new(
            line,
            column,
            ParseErrorKind::InvalidFormatString(msg.to_string()),
        )
    };

    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                literal.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                literal.push('}');
            }
            '}' => return Err(invalid("single '}' is not allowed")),
            '{' => {
                let mut depth = 0usize;
                let mut expr_text = String::new();
                let mut spec = None;
                let mut quote: Option<char> = None;
                loop {
                    let Some(c) = chars.next() else {
                        return Err(invalid("expecting '}'"));
                    };
                    match (quote, c) {
                        (Some(q), c) if c == q => {
                            quote = None;
                            expr_text.push(c);
                        }
                        (Some(_), c) => expr_text.push(c),
                        (None, '\'' | '"') => {
                            quote = Some(c);
                            expr_text.push(c);
                        }
                        (None, '(' | '[' | '{') => {
                            depth += 1;
                            expr_text.push(c);
                        }
                        (None, ')' | ']') => {
                            depth = depth.saturating_sub(1);
                            expr_text.push(c);
                        }
                        (None, '}') if depth > 0 => {
                            depth -= 1;
                            expr_text.push(c);
                        }
                        (None, '}') => break,
                        (None, '!') if depth == 0 && chars.peek() != Some(&'=') => {
                            // Conversion flags (!r, !s) do not change build values
                            chars.next();
                        }
                        (None, ':') if depth == 0 => {
                            let mut s = String::new();
                            for c in chars.by_ref() {
                                if c == '}' {
                                    break;
                                }
                                s.push(c);
                            }
                            spec = Some(s);
                            break;
                        }
                        (None, c) => expr_text.push(c),
                    }
                }

                if !literal.is_empty() {
                    parts.push(FormatPart::Literal(core::mem::take(&mut literal)));
                }
                let mut parser = Parser::new(expr_text.trim()).map_err(|e| invalid(&e.to_string()))?;
                let expr = parser.expression().map_err(|e| invalid(&e.to_string()))?;
                parts.push(FormatPart::Expr(Box::new(expr), spec));
            }
            c => literal.push(c),
        }
    }

    if !literal.is_empty() {
        parts.push(FormatPart::Literal(literal));
    }
    Ok(parts)
}

pub fn parse_script(content: &str) -> Result<Vec<Statement>, ParseError> {
    let mut parser = Parser::new(content)?;
    parser.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<StatementKind> {
        parse_script(input)
            .unwrap()
            .into_iter()
            .map(|s| s.kind)
            .collect()
    }

    #[test]
    fn test_dict_with_comments() {
        let input = r#"
cpu_family_aliases = {
    # aarch64
    'arm64' : 'aarch64',
    # cris
    'crisv32' : 'cris',
}
"#;
        let result = parse_script(input);
        assert!(result.is_ok());
    }

    #[test]
    fn test_if_elif_else_blocks() {
        let input = r#"
if env["platform"] == "windows":
    env.Append(CPPDEFINES=["WINDOWS_ENABLED"])
elif env["platform"] in ("linuxbsd", "macos"):
    env.Append(CPPDEFINES=["UNIX_ENABLED"])
else:
    pass
print("done")
"#;
        let statements = parse_script(input).unwrap();
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0].line, 2);
        assert_eq!(statements[1].line, 8);
        let StatementKind::If(_, then_branch, elifs, else_branch) = &statements[0].kind else {
            panic!("expected if statement");
        };
        assert_eq!(then_branch.len(), 1);
        assert_eq!(elifs.len(), 1);
        assert_eq!(else_branch.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn test_function_def_and_call_arguments() {
        let input = r#"
def add_sources(env, sources, *patterns, prefix="", **kw):
    for p in patterns:
        sources += env.Glob(p)
    return sources

add_sources(env, srcs, "*.cpp", *extra, prefix="a", **opts)
"#;
        let statements = parse_script(input).unwrap();
        let StatementKind::FunctionDef(def) = &statements[0].kind else {
            panic!("expected def");
        };
        assert_eq!(def.name, "add_sources");
        assert_eq!(def.params.len(), 3);
        assert_eq!(def.varargs.as_deref(), Some("patterns"));
        assert_eq!(def.kwargs.as_deref(), Some("kw"));
        assert_eq!(def.body.len(), 2);

        let StatementKind::Expression(Expr::Call(_, args)) = &statements[1].kind else {
            panic!("expected call");
        };
        assert!(matches!(args[2], Argument::Positional(Expr::String(_))));
        assert!(matches!(args[3], Argument::Star(_)));
        assert!(matches!(args[4], Argument::Keyword(ref k, _) if k == "prefix"));
        assert!(matches!(args[5], Argument::DoubleStar(_)));
    }

    #[test]
    fn test_tuple_and_chained_assignment() {
        let kinds = kinds("a, b = 1, 2\nx = y = []\n");
        assert!(matches!(
            &kinds[0],
            StatementKind::Assignment(targets, Expr::Tuple(values))
                if matches!(&targets[0], Expr::Tuple(t) if t.len() == 2) && values.len() == 2
        ));
        assert!(matches!(&kinds[1], StatementKind::Assignment(targets, _) if targets.len() == 2));
    }

    #[test]
    fn test_comparison_chain_and_membership() {
        let kinds = kinds("ok = 1 < x <= 3 and y not in z and w is not None\n");
        let StatementKind::Assignment(_, Expr::BinaryOp(left, BinaryOperator::And, right)) =
            &kinds[0]
        else {
            panic!("expected and");
        };
        assert!(matches!(
            &**right,
            Expr::Compare(_, chain) if chain[0].0 == CompareOperator::IsNot
        ));
        let Expr::BinaryOp(chain, BinaryOperator::And, not_in) = &**left else {
            panic!("expected nested and");
        };
        assert!(matches!(&**chain, Expr::Compare(_, ops) if ops.len() == 2));
        assert!(matches!(
            &**not_in,
            Expr::Compare(_, ops) if ops[0].0 == CompareOperator::NotIn
        ));
    }

    #[test]
    fn test_format_string() {
        let kinds = kinds("name = f\"lib{base}_{arch!r:>4}.a\"\n");
        let StatementKind::Assignment(_, Expr::FormatString(parts)) = &kinds[0] else {
            panic!("expected f-string");
        };
        assert_eq!(parts.len(), 5);
        assert_eq!(parts[0], FormatPart::Literal("lib".into()));
        assert!(matches!(&parts[3], FormatPart::Expr(_, Some(spec)) if spec == ">4"));
        assert_eq!(parts[4], FormatPart::Literal(".a".into()));
    }

    #[test]
    fn test_comprehensions_and_lambda() {
        let kinds = kinds(
            "srcs = [f for f in files if f.endswith('.cpp')]\nkey = lambda s: s.lower()\nd = {k: v for k, v in items}\n",
        );
        assert!(matches!(&kinds[0], StatementKind::Assignment(_, Expr::ListComp(_, c)) if c[0].conditions.len() == 1));
        assert!(matches!(&kinds[1], StatementKind::Assignment(_, Expr::Lambda(def)) if def.params.len() == 1));
        assert!(matches!(&kinds[2], StatementKind::Assignment(_, Expr::DictComp(..))));
    }

    #[test]
    fn test_try_import_and_slices() {
        let input = r#"
try:
    import os.path as osp
    from methods import print_warning, Ansi
except ImportError as e:
    pass
finally:
    x = argv[1:]
"#;
        let statements = parse_script(input).unwrap();
        let StatementKind::Try(body, handlers, None, Some(finally)) = &statements[0].kind else {
            panic!("expected try");
        };
        assert!(matches!(&body[0].kind, StatementKind::Import(names) if names[0].alias.as_deref() == Some("osp")));
        assert!(matches!(&body[1].kind, StatementKind::FromImport(m, names) if m == "methods" && names.len() == 2));
        assert_eq!(handlers[0].binding.as_deref(), Some("e"));
        assert!(matches!(
            &finally[0].kind,
            StatementKind::Assignment(_, Expr::Subscript(_, index)) if matches!(**index, Expr::Slice(Some(_), None, None))
        ));
    }

    #[test]
    fn test_single_line_blocks_and_semicolons() {
        let kinds = kinds("if x: a = 1; b = 2\nfor i in range(3): pass\n");
        assert!(matches!(&kinds[0], StatementKind::If(_, body, _, None) if body.len() == 2));
        assert!(matches!(&kinds[1], StatementKind::For(..)));
    }

    #[test]
    fn test_adjacent_string_concatenation() {
        let kinds = kinds("msg = ('a'\n       'b')\n");
        assert_eq!(
            kinds[0],
            StatementKind::Assignment(vec![Expr::Identifier("msg".into())], Expr::String("ab".into()))
        );
    }

    #[test]
    fn test_syntax_error_position() {
        let err = parse_script("x = 1\ny = (2 +\n").unwrap_err();
        assert_eq!(err.line, 3);
        let err = parse_script("def f(:\n    pass\n").unwrap_err();
        assert_eq!(err.line, 1);
        assert!(matches!(err.kind, ParseErrorKind::UnexpectedToken { .. }));
        let err = parse_script("1 = x\n").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::InvalidAssignmentTarget);
    }
}
