use std::collections::VecDeque;

use crate::ast::BinOp;
use crate::error::SourceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kw {
    False,
    None,
    True,
    And,
    As,
    Assert,
    Async,
    Await,
    Break,
    Class,
    Continue,
    Def,
    Del,
    Elif,
    Else,
    Except,
    Finally,
    For,
    From,
    Global,
    If,
    Import,
    In,
    Is,
    Lambda,
    Nonlocal,
    Not,
    Or,
    Pass,
    Raise,
    Return,
    Try,
    While,
    With,
    Yield,
}

pub fn keyword(s: &str) -> Option<Kw> {
    let kw = match s {
        "False" => Kw::False,
        "None" => Kw::None,
        "True" => Kw::True,
        "and" => Kw::And,
        "as" => Kw::As,
        "assert" => Kw::Assert,
        "async" => Kw::Async,
        "await" => Kw::Await,
        "break" => Kw::Break,
        "class" => Kw::Class,
        "continue" => Kw::Continue,
        "def" => Kw::Def,
        "del" => Kw::Del,
        "elif" => Kw::Elif,
        "else" => Kw::Else,
        "except" => Kw::Except,
        "finally" => Kw::Finally,
        "for" => Kw::For,
        "from" => Kw::From,
        "global" => Kw::Global,
        "if" => Kw::If,
        "import" => Kw::Import,
        "in" => Kw::In,
        "is" => Kw::Is,
        "lambda" => Kw::Lambda,
        "nonlocal" => Kw::Nonlocal,
        "not" => Kw::Not,
        "or" => Kw::Or,
        "pass" => Kw::Pass,
        "raise" => Kw::Raise,
        "return" => Kw::Return,
        "try" => Kw::Try,
        "while" => Kw::While,
        "with" => Kw::With,
        "yield" => Kw::Yield,
        _ => return None,
    };
    Some(kw)
}

pub fn is_keyword(s: &str) -> bool {
    keyword(s).is_some()
}

/// Valid (non-keyword) identifier.
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_alphanumeric()) && !is_keyword(s)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Name(String),
    Kw(Kw),
    Number(String),
    /// Plain string literal, escapes already decoded.
    Str(String),
    /// Prefixed string literal (r, b, f...) exactly as written.
    VerbatimStr(String),

    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Colon,
    ColonEq,
    Comma,
    Semicolon,
    Dot,
    Ellipsis,
    Arrow,
    At,
    Assign,
    AugAssign(BinOp),

    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    DoubleSlash,
    Percent,
    Tilde,
    Amper,
    Pipe,
    Caret,
    LShift,
    RShift,

    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,

    Newline,
    Indent,
    Dedent,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub line: u32,
    pub column: u32,
}

pub struct Lexer {
    input: Vec<char>,
    pos: usize,
    line: u32,
    column: u32,
    indents: Vec<usize>,
    paren_depth: usize,
    at_line_start: bool,
    line_has_tokens: bool,
    finished: bool,
    pending: VecDeque<SpannedToken>,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            indents: vec![0],
            paren_depth: 0,
            at_line_start: true,
            line_has_tokens: false,
            finished: false,
            pending: VecDeque::new(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.input.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn error(&self, message: impl Into<String>) -> SourceError {
        SourceError::parse(self.line, self.column, message)
    }

    /// Whole input as a token vector ending with `Eof`.
    pub fn tokenize(mut self) -> Result<Vec<SpannedToken>, SourceError> {
        let mut out = Vec::new();
        loop {
            let tok = self.next_token()?;
            let done = tok.token == Token::Eof;
            out.push(tok);
            if done {
                return Ok(out);
            }
        }
    }

    pub fn next_token(&mut self) -> Result<SpannedToken, SourceError> {
        loop {
            if let Some(tok) = self.pending.pop_front() {
                return Ok(tok);
            }
            if self.finished {
                return Ok(spanned(Token::Eof, self.line, self.column));
            }

            if self.at_line_start && self.paren_depth == 0 {
                self.at_line_start = false;
                let width = self.measure_indent();
                match self.peek() {
                    None => {}
                    Some('\n') => {
                        self.advance();
                        self.at_line_start = true;
                        continue;
                    }
                    Some('#') => {
                        self.skip_comment();
                        continue;
                    }
                    Some(_) => {
                        self.apply_indent(width)?;
                        continue;
                    }
                }
            }

            self.skip_inline_whitespace()?;

            let Some(ch) = self.peek() else {
                self.finish();
                continue;
            };

            if ch == '\n' {
                let (line, column) = (self.line, self.column);
                self.advance();
                if self.paren_depth > 0 {
                    continue;
                }
                self.at_line_start = true;
                if self.line_has_tokens {
                    self.line_has_tokens = false;
                    return Ok(spanned(Token::Newline, line, column));
                }
                continue;
            }

            let (line, column) = (self.line, self.column);
            let token = self.scan_token(ch)?;
            self.line_has_tokens = true;
            return Ok(spanned(token, line, column));
        }
    }

    fn measure_indent(&mut self) -> usize {
        let mut width = 0;
        while let Some(ch) = self.peek() {
            match ch {
                ' ' => width += 1,
                '\t' => width = (width / 8 + 1) * 8,
                '\x0c' | '\r' => {}
                _ => break,
            }
            self.advance();
        }
        width
    }

    fn apply_indent(&mut self, width: usize) -> Result<(), SourceError> {
        let top = self.indents.last().copied().unwrap_or(0);
        if width > top {
            self.indents.push(width);
            let indent = spanned(Token::Indent, self.line, self.column);
            self.pending.push_back(indent);
        } else if width < top {
            while self.indents.last().is_some_and(|&level| width < level) {
                self.indents.pop();
                let dedent = spanned(Token::Dedent, self.line, self.column);
                self.pending.push_back(dedent);
            }
            if self.indents.last().copied() != Some(width) {
                return Err(self.error("unindent does not match any outer indentation level"));
            }
        }
        Ok(())
    }

    fn finish(&mut self) {
        self.finished = true;
        let (line, column) = (self.line, self.column);
        if self.line_has_tokens {
            self.line_has_tokens = false;
            self.pending.push_back(spanned(Token::Newline, line, column));
        }
        while self.indents.len() > 1 {
            self.indents.pop();
            self.pending.push_back(spanned(Token::Dedent, line, column));
        }
        self.pending.push_back(spanned(Token::Eof, line, column));
    }

    fn skip_comment(&mut self) {
        while let Some(ch) = self.peek() {
            if ch == '\n' {
                break;
            }
            self.advance();
        }
    }

    fn skip_inline_whitespace(&mut self) -> Result<(), SourceError> {
        while let Some(ch) = self.peek() {
            match ch {
                ' ' | '\t' | '\r' | '\x0c' => {
                    self.advance();
                }
                '#' => self.skip_comment(),
                '\\' => {
                    let next = match self.peek_at(1) {
                        Some('\r') => self.peek_at(2),
                        other => other,
                    };
                    if next != Some('\n') {
                        return Err(self.error("unexpected character after line continuation"));
                    }
                    while self.peek() != Some('\n') {
                        self.advance();
                    }
                    self.advance();
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn scan_token(&mut self, ch: char) -> Result<Token, SourceError> {
        if ch.is_ascii_digit() || (ch == '.' && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()))
        {
            return Ok(self.read_number());
        }
        if ch == '_' || ch.is_alphabetic() {
            return self.read_ident();
        }
        if ch == '"' || ch == '\'' {
            return self.read_string(String::new());
        }

        self.advance();
        let token = match ch {
            '(' | '[' | '{' => {
                self.paren_depth += 1;
                match ch {
                    '(' => Token::LParen,
                    '[' => Token::LBracket,
                    _ => Token::LBrace,
                }
            }
            ')' | ']' | '}' => {
                self.paren_depth = self.paren_depth.saturating_sub(1);
                match ch {
                    ')' => Token::RParen,
                    ']' => Token::RBracket,
                    _ => Token::RBrace,
                }
            }
            ':' => {
                if self.peek() == Some('=') {
                    self.advance();
                    Token::ColonEq
                } else {
                    Token::Colon
                }
            }
            ',' => Token::Comma,
            ';' => Token::Semicolon,
            '~' => Token::Tilde,
            '.' => {
                if self.peek() == Some('.') && self.peek_at(1) == Some('.') {
                    self.advance();
                    self.advance();
                    Token::Ellipsis
                } else {
                    Token::Dot
                }
            }
            '-' if self.peek() == Some('>') => {
                self.advance();
                Token::Arrow
            }
            '=' => self.with_eq(Token::Eq, Token::Assign),
            '!' => {
                if self.peek() == Some('=') {
                    self.advance();
                    Token::Ne
                } else {
                    return Err(self.error("unexpected character `!`"));
                }
            }
            '<' => {
                if self.peek() == Some('<') {
                    self.advance();
                    self.op_or_aug(BinOp::LShift, Token::LShift)
                } else {
                    self.with_eq(Token::Le, Token::Lt)
                }
            }
            '>' => {
                if self.peek() == Some('>') {
                    self.advance();
                    self.op_or_aug(BinOp::RShift, Token::RShift)
                } else {
                    self.with_eq(Token::Ge, Token::Gt)
                }
            }
            '*' => {
                if self.peek() == Some('*') {
                    self.advance();
                    self.op_or_aug(BinOp::Pow, Token::DoubleStar)
                } else {
                    self.op_or_aug(BinOp::Mult, Token::Star)
                }
            }
            '/' => {
                if self.peek() == Some('/') {
                    self.advance();
                    self.op_or_aug(BinOp::FloorDiv, Token::DoubleSlash)
                } else {
                    self.op_or_aug(BinOp::Div, Token::Slash)
                }
            }
            '+' => self.op_or_aug(BinOp::Add, Token::Plus),
            '-' => self.op_or_aug(BinOp::Sub, Token::Minus),
            '%' => self.op_or_aug(BinOp::Mod, Token::Percent),
            '&' => self.op_or_aug(BinOp::BitAnd, Token::Amper),
            '|' => self.op_or_aug(BinOp::BitOr, Token::Pipe),
            '^' => self.op_or_aug(BinOp::BitXor, Token::Caret),
            '@' => self.op_or_aug(BinOp::MatMult, Token::At),
            other => return Err(self.error(format!("unexpected character `{other}`"))),
        };
        Ok(token)
    }

    fn with_eq(&mut self, with: Token, without: Token) -> Token {
        if self.peek() == Some('=') {
            self.advance();
            with
        } else {
            without
        }
    }

    fn op_or_aug(&mut self, op: BinOp, plain: Token) -> Token {
        self.with_eq(Token::AugAssign(op), plain)
    }

    fn read_number(&mut self) -> Token {
        let start = self.pos;
        let radix_prefix = self.peek() == Some('0')
            && matches!(self.peek_at(1), Some('x' | 'X' | 'o' | 'O' | 'b' | 'B'));
        if radix_prefix {
            self.advance();
            self.advance();
            while self
                .peek()
                .is_some_and(|c| c.is_ascii_hexdigit() || c == '_')
            {
                self.advance();
            }
        } else {
            while let Some(ch) = self.peek() {
                let exponent_sign = matches!(ch, '+' | '-')
                    && matches!(self.input.get(self.pos.wrapping_sub(1)), Some('e' | 'E'));
                if ch.is_ascii_digit() || matches!(ch, '.' | '_' | 'e' | 'E') || exponent_sign {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        if matches!(self.peek(), Some('j' | 'J' | 'l' | 'L')) {
            self.advance();
        }
        Token::Number(self.input[start..self.pos].iter().collect())
    }

    fn read_ident(&mut self) -> Result<Token, SourceError> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c == '_' || c.is_alphanumeric()) {
            self.advance();
        }
        let s: String = self.input[start..self.pos].iter().collect();

        let is_prefix = s.len() <= 2 && s.chars().all(|c| "rRbBuUfF".contains(c));
        if is_prefix && matches!(self.peek(), Some('"' | '\'')) {
            return self.read_string(s);
        }

        Ok(match keyword(&s) {
            Some(kw) => Token::Kw(kw),
            None => Token::Name(s),
        })
    }

    fn read_string(&mut self, prefix: String) -> Result<Token, SourceError> {
        let (line, column) = (self.line, self.column);
        let quote = self.advance().unwrap_or('\'');
        let triple = self.peek() == Some(quote) && self.peek_at(1) == Some(quote);
        if triple {
            self.advance();
            self.advance();
        }

        let mut body = String::new();
        loop {
            let Some(ch) = self.advance() else {
                return Err(SourceError::parse(line, column, "unterminated string literal"));
            };
            match ch {
                '\\' => {
                    body.push('\\');
                    if let Some(next) = self.advance() {
                        body.push(next);
                    }
                }
                '\n' if !triple => {
                    return Err(SourceError::parse(line, column, "unterminated string literal"));
                }
                c if c == quote => {
                    if !triple {
                        break;
                    }
                    if self.peek() == Some(quote) && self.peek_at(1) == Some(quote) {
                        self.advance();
                        self.advance();
                        break;
                    }
                    body.push(c);
                }
                c => body.push(c),
            }
        }

        let lowered = prefix.to_ascii_lowercase();
        if lowered.is_empty() || lowered == "u" {
            return Ok(Token::Str(decode_escapes(&body)));
        }
        let fence: String = if triple {
            std::iter::repeat_n(quote, 3).collect()
        } else {
            quote.to_string()
        };
        Ok(Token::VerbatimStr(format!("{prefix}{fence}{body}{fence}")))
    }
}

fn spanned(token: Token, line: u32, column: u32) -> SpannedToken {
    SpannedToken {
        token,
        line,
        column,
    }
}

fn decode_escapes(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        let Some(next) = chars.next() else {
            out.push('\\');
            break;
        };
        match next {
            '\n' => {}
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            'a' => out.push('\x07'),
            'b' => out.push('\x08'),
            'f' => out.push('\x0c'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'v' => out.push('\x0b'),
            'x' | 'u' | 'U' => {
                let len = match next {
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };
                let digits: String = (0..len).filter_map(|_| chars.next()).collect();
                match u32::from_str_radix(&digits, 16).ok().and_then(char::from_u32) {
                    Some(c) if digits.len() == len => out.push(c),
                    _ => {
                        out.push('\\');
                        out.push(next);
                        out.push_str(&digits);
                    }
                }
            }
            '0'..='7' => {
                let mut digits = next.to_string();
                while digits.len() < 3 && chars.peek().is_some_and(|c| ('0'..='7').contains(c)) {
                    if let Some(c) = chars.next() {
                        digits.push(c);
                    }
                }
                match u32::from_str_radix(&digits, 8).ok().and_then(char::from_u32) {
                    Some(c) => out.push(c),
                    None => {
                        out.push('\\');
                        out.push_str(&digits);
                    }
                }
            }
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    out
}
