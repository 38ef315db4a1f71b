use crate::diagnostics::{Position, Span};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    LParen,
    RParen,
    LSBracket,
    RSBracket,
    LBracket,
    RBracket,
    SetBracket,
    MetaBracket,
    Hash,
    HashDash,
    Dot,
    DotBracket,
    Comma,
    Colon,
    Semicolon,
    Equals,
    Backslash,
    Arrow,
    Underline,
    Pipe,

    Module,
    Import,
    Type,
    Typealias,
    As,
    If,
    Then,
    Else,
    Let,
    LetBang,
    BangBang,
    Case,
    Of,
    In,
    Do,
    DoDot,
    DoBang,
    Foreign,
    Public,
    PublicPlus,
    Instance,
    While,
    Nil,
    Return,
    Yield,
    For,

    Bool,
    Char,
    Str,
    MultilineStr,
    PatternStr,
    Int,
    Float,
    Complex,

    Ident,
    UpperIdent,
    Op,

    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenValue {
    Int(i64),
    Float(f64),
    Complex(f64, f64),
    Char(char),
    Bool(bool),
    Str(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub text: String,
    pub span: Span,
    pub is_block: bool,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    pub text: Option<String>,
    pub value: Option<TokenValue>,
    pub comment: Option<Comment>,
}

impl Token {
    fn bare(kind: TokenKind) -> Token {
        Token {
            kind,
            span: Span::empty(),
            text: None,
            value: None,
            comment: None,
        }
    }

    fn text(kind: TokenKind, text: String) -> Token {
        Token {
            kind,
            span: Span::empty(),
            text: Some(text.clone()),
            value: Some(TokenValue::Str(text)),
            comment: None,
        }
    }

    pub fn offside(&self) -> usize {
        self.span.start.column
    }

    pub fn is_eof(&self) -> bool {
        self.kind == TokenKind::Eof
    }

    pub fn is_dot_start(&self) -> bool {
        self.kind == TokenKind::Op
            && self
                .text
                .as_deref()
                .map(|t| t.starts_with('.'))
                .unwrap_or(false)
    }

    pub fn is_double_colon(&self) -> bool {
        self.kind == TokenKind::Op && self.text.as_deref() == Some("::")
    }

    pub fn op_text(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone)]
pub struct LexError {
    pub msg: String,
    pub span: Span,
}

pub struct Lexer {
    pub name: String,
    chars: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
}

const OPERATOR_CHARS: &str = "$=<>|&+-:*/%^.?!";
const NUMBER_CHARS: &str = "0123456789abcdefABCDEFoOxXbBeEpPi-+.";

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    is_ident_start(c) || c.is_numeric()
}

fn is_operator_char(c: char) -> bool {
    OPERATOR_CHARS.contains(c)
}

pub fn starts_upper(s: &str) -> bool {
    s.chars().next().map(|c| c.is_uppercase()).unwrap_or(false)
}

pub fn starts_lower(s: &str) -> bool {
    s.chars().next().map(|c| c.is_lowercase()).unwrap_or(false)
}

impl Lexer {
    pub fn new(name: impl Into<String>, source: &str) -> Lexer {
        Lexer {
            name: name.into(),
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    pub fn has_more(&self) -> bool {
        self.pos < self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn next_char(&mut self) -> Result<char, LexError> {
        let Some(c) = self.peek() else {
            return Err(self.error(format!("Unexpected end of file in {}", self.name)));
        };
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Ok(c)
    }

    fn accept(&mut self, set: &str) -> Option<char> {
        match self.peek() {
            Some(c) if set.contains(c) => {
                let _ = self.next_char();
                Some(c)
            }
            _ => None,
        }
    }

    fn accept_many(&mut self, wanted: char) -> String {
        let mut acc = String::new();
        while self.peek() == Some(wanted) {
            let _ = self.next_char();
            acc.push(wanted);
        }
        acc
    }

    fn accept_many_of(&mut self, set: &str) -> String {
        let mut acc = String::new();
        while let Some(c) = self.peek() {
            if !set.contains(c) {
                break;
            }
            let _ = self.next_char();
            acc.push(c);
        }
        acc
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                let _ = self.next_char();
            } else {
                break;
            }
        }
    }

    fn error<T: Into<String>>(&self, msg: T) -> LexError {
        let span = Span::at(self.line, self.col, self.line, self.col);
        LexError { msg: msg.into(), span }
    }

    /// Produces the next token, attaching a preceding comment when the
    /// comment and the token sit on adjacent lines.
    pub fn scan(&mut self) -> Result<Token, LexError> {
        self.skip_whitespace();

        let start = Position { line: self.line, column: self.col };

        if !self.has_more() {
            let mut token = Token::bare(TokenKind::Eof);
            token.span = Span { start, end: start };
            return Ok(token);
        }

        if self.peek() == Some('/') {
            let after = self.chars.get(self.pos + 1).copied();
            if after == Some('/') {
                let _ = self.next_char();
                let _ = self.next_char();
                let text = self.line_comment();
                let span = Span {
                    start,
                    end: Position { line: self.line, column: self.col },
                };
                let mut next = self.scan()?;
                // adjacent line comments are concatenated into one
                if let Some(comm) = next.comment.take() {
                    if !comm.is_block && span.adjacent(&comm.span) {
                        next.comment = Some(Comment {
                            text: format!("{}\n{}", text, comm.text),
                            span: Span::new(span, comm.span),
                            is_block: false,
                        });
                        return Ok(next);
                    }
                    next.comment = Some(comm);
                    return Ok(next);
                }
                // a blank line between comment and token discards the comment
                if !span.adjacent(&next.span) {
                    return Ok(next);
                }
                next.comment = Some(Comment { text, span, is_block: false });
                return Ok(next);
            }
            if after == Some('*') {
                let _ = self.next_char();
                let _ = self.next_char();
                let text = self.block_comment()?;
                let span = Span {
                    start,
                    end: Position { line: self.line, column: self.col },
                };
                let next = self.scan()?;
                if next.comment.is_some() || !span.adjacent(&next.span) {
                    return Ok(next);
                }
                let mut next = next;
                next.comment = Some(Comment { text, span, is_block: true });
                return Ok(next);
            }
        }

        let c = self.next_char()?;
        let mut token = match c {
            '(' => Token::bare(TokenKind::LParen),
            ')' => Token::bare(TokenKind::RParen),
            '[' => Token::bare(TokenKind::LSBracket),
            ']' => Token::bare(TokenKind::RSBracket),
            '{' => Token::bare(TokenKind::LBracket),
            '}' => Token::bare(TokenKind::RBracket),
            ',' => Token::bare(TokenKind::Comma),
            ';' => Token::bare(TokenKind::Semicolon),
            '\\' => Token::bare(TokenKind::Backslash),
            '#' => match self.peek() {
                Some('{') => {
                    let _ = self.next_char();
                    Token::bare(TokenKind::SetBracket)
                }
                Some('[') => {
                    let _ = self.next_char();
                    Token::bare(TokenKind::MetaBracket)
                }
                Some('-') => {
                    let _ = self.next_char();
                    Token::bare(TokenKind::HashDash)
                }
                Some('"') => {
                    let _ = self.next_char();
                    self.pattern_string()?
                }
                _ => Token::bare(TokenKind::Hash),
            },
            '\'' => self.char_literal()?,
            '"' => self.string_literal()?,
            '-' => match self.peek() {
                Some(d) if d.is_ascii_digit() => {
                    let _ = self.next_char();
                    self.number(d, true)?
                }
                _ => self.operator(c)?,
            },
            '`' => {
                let text = self.backtick_operator()?;
                Token::text(TokenKind::Op, text)
            }
            '_' => match self.peek() {
                Some(p) if is_ident_char(p) => self.ident(Some(c))?,
                _ => Token::bare(TokenKind::Underline),
            },
            _ => {
                if c.is_numeric() {
                    self.number(c, false)?
                } else if is_operator_char(c) {
                    self.operator(c)?
                } else if is_ident_start(c) {
                    self.ident(Some(c))?
                } else {
                    return Err(self.error(format!("Unexpected Identifier:: {c}")));
                }
            }
        };

        token.span = Span {
            start,
            end: Position { line: self.line, column: self.col },
        };
        Ok(token)
    }

    fn ident(&mut self, init: Option<char>) -> Result<Token, LexError> {
        let mut acc = String::new();
        if let Some(c) = init {
            acc.push(c);
        }
        let mut has_op_end = false;

        while let Some(c) = self.peek() {
            if is_ident_char(c) {
                let _ = self.next_char();
                acc.push(c);
            } else {
                break;
            }
        }

        if matches!(self.peek(), Some('?') | Some('!')) {
            acc.push(self.next_char()?);
            has_op_end = true;
        }

        let token = match acc.as_str() {
            "" => return Err(self.error("Identifiers cannot be empty")),
            "true" => {
                let mut t = Token::bare(TokenKind::Bool);
                t.value = Some(TokenValue::Bool(true));
                t.text = Some(acc);
                t
            }
            "false" => {
                let mut t = Token::bare(TokenKind::Bool);
                t.value = Some(TokenValue::Bool(false));
                t.text = Some(acc);
                t
            }
            "if" => Token::bare(TokenKind::If),
            "then" => Token::bare(TokenKind::Then),
            "else" => Token::bare(TokenKind::Else),
            "_" => Token::bare(TokenKind::Underline),
            "module" => Token::bare(TokenKind::Module),
            "import" => Token::bare(TokenKind::Import),
            "case" => Token::bare(TokenKind::Case),
            "of" => Token::bare(TokenKind::Of),
            "type" => Token::bare(TokenKind::Type),
            "typealias" => Token::bare(TokenKind::Typealias),
            "as" => Token::bare(TokenKind::As),
            "in" => Token::bare(TokenKind::In),
            "foreign" => Token::bare(TokenKind::Foreign),
            "instance" => Token::bare(TokenKind::Instance),
            "while" => Token::bare(TokenKind::While),
            "nil" => Token::bare(TokenKind::Nil),
            "return" => Token::bare(TokenKind::Return),
            "yield" => Token::bare(TokenKind::Yield),
            "for" => Token::bare(TokenKind::For),
            "do" => {
                if self.peek() == Some('.') {
                    let _ = self.next_char();
                    Token::bare(TokenKind::DoDot)
                } else {
                    Token::bare(TokenKind::Do)
                }
            }
            "do!" => Token::bare(TokenKind::DoBang),
            "let" => Token::bare(TokenKind::Let),
            "let!" => Token::bare(TokenKind::LetBang),
            "pub" => {
                if self.peek() == Some('+') {
                    let _ = self.next_char();
                    Token::bare(TokenKind::PublicPlus)
                } else {
                    Token::bare(TokenKind::Public)
                }
            }
            _ => {
                if acc.starts_with("__") {
                    return Err(self.error("Identifiers cannot start with a double underscore (__)."));
                }
                if starts_upper(&acc) {
                    if has_op_end {
                        return Err(self.error("Upper case identifiers cannot end with `?` or `!`."));
                    }
                    Token::text(TokenKind::UpperIdent, acc)
                } else {
                    Token::text(TokenKind::Ident, acc)
                }
            }
        };
        Ok(token)
    }

    fn operator(&mut self, init: char) -> Result<Token, LexError> {
        let mut acc = String::new();
        acc.push(init);
        while let Some(c) = self.peek() {
            if !is_operator_char(c) {
                break;
            }
            let _ = self.next_char();
            acc.push(c);
            // `e!!.field` lexes as BangBang followed by a field selection
            if acc == "!!" && self.peek() == Some('.') {
                return Ok(Token::bare(TokenKind::BangBang));
            }
        }

        let token = match acc.as_str() {
            "=" => Token::bare(TokenKind::Equals),
            "->" => Token::bare(TokenKind::Arrow),
            "|" => Token::bare(TokenKind::Pipe),
            ":" => Token::bare(TokenKind::Colon),
            "!!" => Token::bare(TokenKind::BangBang),
            "." => {
                if self.peek() == Some('[') {
                    let _ = self.next_char();
                    Token::bare(TokenKind::DotBracket)
                } else {
                    Token::bare(TokenKind::Dot)
                }
            }
            _ => Token::text(TokenKind::Op, acc),
        };
        Ok(token)
    }

    fn backtick_operator(&mut self) -> Result<String, LexError> {
        let mut acc = String::new();
        let mut c = self.next_char()?;
        while c != '`' {
            if matches!(c, '\t' | '\n' | '\r' | '\x0c' | '\x08') {
                return Err(self.error("Invalid character in backtick operator."));
            }
            acc.push(c);
            c = self.next_char()?;
        }
        Ok(acc)
    }

    fn number(&mut self, init: char, negative: bool) -> Result<Token, LexError> {
        let mut acc = String::new();
        if negative {
            acc.push('-');
        }
        acc.push(init);
        acc.push_str(&self.accept_many_of(NUMBER_CHARS));

        let digits = acc.strip_prefix('-').unwrap_or(&acc);
        let radix_literal = digits.len() > 1
            && digits.starts_with('0')
            && matches!(digits.as_bytes()[1], b'x' | b'X' | b'o' | b'O' | b'b' | b'B');

        let mut token = if !radix_literal && acc.contains('i') {
            match parse_complex(&acc) {
                Some((re, im)) => {
                    let mut t = Token::bare(TokenKind::Complex);
                    t.value = Some(TokenValue::Complex(re, im));
                    t
                }
                None => return Err(self.error(format!("Invalid number {acc}"))),
            }
        } else if !radix_literal && acc.contains(['.', 'e', 'E']) {
            match acc.parse::<f64>() {
                Ok(v) => {
                    let mut t = Token::bare(TokenKind::Float);
                    t.value = Some(TokenValue::Float(v));
                    t
                }
                Err(_) => return Err(self.error(format!("Invalid number {acc}"))),
            }
        } else {
            match parse_int(&acc) {
                Some(v) => {
                    let mut t = Token::bare(TokenKind::Int);
                    t.value = Some(TokenValue::Int(v));
                    t
                }
                None => return Err(self.error(format!("Invalid number {acc}"))),
            }
        };
        token.text = Some(acc);
        Ok(token)
    }

    fn string_literal(&mut self) -> Result<Token, LexError> {
        let mut value = String::new();
        let mut raw = String::new();
        let mut c = self.next_char()?;
        if c == '"' {
            if self.peek() != Some('"') {
                let mut t = Token::bare(TokenKind::Str);
                t.value = Some(TokenValue::Str(String::new()));
                t.text = Some(String::new());
                return Ok(t);
            }
            let _ = self.next_char();
            return self.multiline_string();
        }

        while c != '"' {
            if c == '\n' {
                return Err(self.error("Newline is not allowed inside strings."));
            }
            if c == '\\' {
                let (esc, text) = self.read_escape()?;
                value.push(esc);
                raw.push_str(&text);
            } else {
                value.push(c);
                raw.push(c);
            }
            c = self.next_char()?;
        }
        let mut t = Token::bare(TokenKind::Str);
        t.value = Some(TokenValue::Str(value));
        t.text = Some(raw);
        Ok(t)
    }

    fn multiline_string(&mut self) -> Result<Token, LexError> {
        let mut acc = String::new();
        let mut last1 = ' ';
        let mut last0 = ' ';
        let mut c = self.next_char()?;
        while c != '"' || last1 != '"' || last0 != '"' {
            acc.push(c);
            last1 = last0;
            last0 = c;
            c = self.next_char()?;
        }
        acc.truncate(acc.len() - 2);
        let mut t = Token::bare(TokenKind::MultilineStr);
        t.value = Some(TokenValue::Str(acc.clone()));
        t.text = Some(acc);
        Ok(t)
    }

    fn pattern_string(&mut self) -> Result<Token, LexError> {
        let mut acc = String::new();
        let mut c = self.next_char()?;
        while c != '"' {
            if c == '\n' {
                return Err(self.error("Newline is not allowed inside strings."));
            }
            if c == '\\' && self.peek() == Some('"') {
                acc.push(c);
                c = self.next_char()?;
            }
            acc.push(c);
            c = self.next_char()?;
        }
        let mut t = Token::bare(TokenKind::PatternStr);
        t.value = Some(TokenValue::Str(acc.clone()));
        t.text = Some(acc);
        Ok(t)
    }

    fn char_literal(&mut self) -> Result<Token, LexError> {
        let c = self.next_char()?;
        let mut token = Token::bare(TokenKind::Char);
        if c == '\\' {
            let (esc, text) = self.read_escape()?;
            token.value = Some(TokenValue::Char(esc));
            token.text = Some(text);
        } else {
            token.value = Some(TokenValue::Char(c));
            token.text = Some(c.to_string());
        }
        if self.next_char()? != '\'' {
            return Err(self.error("Expected ' after char literal"));
        }
        Ok(token)
    }

    fn read_escape(&mut self) -> Result<(char, String), LexError> {
        let c = self.next_char()?;
        match c {
            'n' => Ok(('\n', "\\n".to_string())),
            't' => Ok(('\t', "\\t".to_string())),
            '\\' => Ok(('\\', "\\\\".to_string())),
            'r' => Ok(('\r', "\\r".to_string())),
            'f' => Ok(('\x0c', "\\f".to_string())),
            'b' => Ok(('\x08', "\\b".to_string())),
            'u' => {
                let mut digits = String::new();
                for _ in 0..4 {
                    match self.accept("0123456789abcdefABCDEF") {
                        Some(d) => digits.push(d),
                        None => return Err(self.error("Unexpected UTF-8 escape character ")),
                    }
                }
                let code = u32::from_str_radix(&digits, 16).expect("hex digits");
                let esc = char::from_u32(code)
                    .ok_or_else(|| self.error("Unexpected UTF-8 escape character "))?;
                Ok((esc, format!("\\u{digits}")))
            }
            _ => Err(self.error("Unexpected UTF-8 escape character")),
        }
    }

    fn line_comment(&mut self) -> String {
        let mut acc = String::new();
        self.accept_many('/');
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            let _ = self.next_char();
            acc.push(c);
        }
        acc
    }

    fn block_comment(&mut self) -> Result<String, LexError> {
        let stars = self.accept_many('*');
        if stars.len() > 1 && self.peek() == Some('/') {
            let _ = self.next_char();
            return Ok(String::new());
        }

        let mut acc = String::new();
        let mut last = ' ';
        loop {
            let c = self.next_char()?;
            if last == '*' && c == '/' {
                break;
            }
            acc.push(c);
            last = c;
        }
        acc.truncate(acc.len() - 1);
        Ok(acc)
    }
}

fn parse_int(text: &str) -> Option<i64> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let value = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()?
    } else if let Some(oct) = digits.strip_prefix("0o").or_else(|| digits.strip_prefix("0O")) {
        i64::from_str_radix(oct, 8).ok()?
    } else if let Some(bin) = digits.strip_prefix("0b").or_else(|| digits.strip_prefix("0B")) {
        i64::from_str_radix(bin, 2).ok()?
    } else {
        digits.parse::<i64>().ok()?
    };
    Some(if negative { -value } else { value })
}

/// Parses `34.0i`, `1i`, `-2i` and full forms like `3+4i` or `1.5e2-2i`.
fn parse_complex(text: &str) -> Option<(f64, f64)> {
    let body = text.strip_suffix('i')?;
    let bytes = body.as_bytes();
    let mut split = None;
    for idx in (1..bytes.len()).rev() {
        let b = bytes[idx];
        if (b == b'+' || b == b'-') && !matches!(bytes[idx - 1], b'e' | b'E') {
            split = Some(idx);
            break;
        }
    }
    match split {
        Some(idx) => {
            let re = body[..idx].parse::<f64>().ok()?;
            let im = match &body[idx..] {
                "+" => 1.0,
                "-" => -1.0,
                imag => imag.parse::<f64>().ok()?,
            };
            Some((re, im))
        }
        None => {
            let im = match body {
                "" => 1.0,
                "-" => -1.0,
                _ => body.parse::<f64>().ok()?,
            };
            Some((0.0, im))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan_all(source: &str) -> Vec<Token> {
        let mut lexer = Lexer::new("test.myn", source);
        let mut tokens = Vec::new();
        loop {
            let token = lexer.scan().expect("lex error");
            let done = token.is_eof();
            tokens.push(token);
            if done {
                break;
            }
        }
        tokens
    }

    #[test]
    fn spans_cover_the_lexeme() {
        let tokens = scan_all("x = 34");
        assert_eq!(tokens[0].kind, TokenKind::Ident);
        assert_eq!(tokens[0].span, Span::at(1, 1, 1, 2));
        assert_eq!(tokens[1].kind, TokenKind::Equals);
        assert_eq!(tokens[2].kind, TokenKind::Int);
        assert_eq!(tokens[2].span.start.column, 5);
        assert_eq!(tokens[2].text.as_deref(), Some("34"));
    }

    #[test]
    fn adjacent_line_comments_merge_into_one() {
        let src = "// first\n// second\nx = 1";
        let tokens = scan_all(src);
        let comment = tokens[0].comment.as_ref().expect("comment");
        assert_eq!(comment.text, " first\n second");
        assert!(!comment.is_block);
    }

    #[test]
    fn blank_line_discards_comment() {
        let src = "// lost\n\nx = 1";
        let tokens = scan_all(src);
        assert!(tokens[0].comment.is_none());
    }

    #[test]
    fn block_comment_attaches_to_next_token() {
        let src = "/* doc */\nx = 1";
        let tokens = scan_all(src);
        let comment = tokens[0].comment.as_ref().expect("comment");
        assert!(comment.is_block);
        assert_eq!(comment.text, " doc ");
    }

    #[test]
    fn identifiers_allow_trailing_question_and_bang() {
        let tokens = scan_all("empty? set!");
        assert_eq!(tokens[0].text.as_deref(), Some("empty?"));
        assert_eq!(tokens[1].text.as_deref(), Some("set!"));
    }

    #[test]
    fn double_underscore_identifiers_are_rejected() {
        let mut lexer = Lexer::new("test.myn", "__internal");
        let err = lexer.scan().unwrap_err();
        assert!(err.msg.contains("double underscore"));
    }

    #[test]
    fn keywords_are_promoted() {
        let tokens = scan_all("module let let! do do. do! pub pub+");
        let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Module,
                TokenKind::Let,
                TokenKind::LetBang,
                TokenKind::Do,
                TokenKind::DoDot,
                TokenKind::DoBang,
                TokenKind::Public,
                TokenKind::PublicPlus,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn numbers_cover_all_radixes() {
        let tokens = scan_all("34 0xff 0o17 0b101 -7 3.25 6.02e23 34.0i 3+4i");
        let values: Vec<TokenValue> = tokens
            .iter()
            .filter_map(|t| t.value.clone())
            .collect();
        assert_eq!(
            values,
            vec![
                TokenValue::Int(34),
                TokenValue::Int(255),
                TokenValue::Int(15),
                TokenValue::Int(5),
                TokenValue::Int(-7),
                TokenValue::Float(3.25),
                TokenValue::Float(6.02e23),
                TokenValue::Complex(0.0, 34.0),
                TokenValue::Complex(3.0, 4.0),
            ]
        );
    }

    #[test]
    fn strings_decode_escapes_and_keep_raw_text() {
        let tokens = scan_all(r#""a\tb\u0041""#);
        assert_eq!(tokens[0].value, Some(TokenValue::Str("a\tb\u{41}".to_string())));
        assert_eq!(tokens[0].text.as_deref(), Some(r"a\tb\u0041"));
    }

    #[test]
    fn multiline_strings_use_triple_quotes() {
        let tokens = scan_all("\"\"\"line one\nline two\"\"\"");
        assert_eq!(tokens[0].kind, TokenKind::MultilineStr);
        assert_eq!(
            tokens[0].value,
            Some(TokenValue::Str("line one\nline two".to_string()))
        );
    }

    #[test]
    fn raw_newline_in_string_is_an_error() {
        let mut lexer = Lexer::new("test.myn", "\"broken\nstring\"");
        assert!(lexer.scan().is_err());
    }

    #[test]
    fn pattern_string_and_set_literal_prefixes() {
        let tokens = scan_all("#\"\\d+\" #{ #[ #-");
        assert_eq!(tokens[0].kind, TokenKind::PatternStr);
        assert_eq!(tokens[0].value, Some(TokenValue::Str("\\d+".to_string())));
        assert_eq!(tokens[1].kind, TokenKind::SetBracket);
        assert_eq!(tokens[2].kind, TokenKind::MetaBracket);
        assert_eq!(tokens[3].kind, TokenKind::HashDash);
    }

    #[test]
    fn reserved_operator_runs() {
        let tokens = scan_all("= -> | : . .[ <> >>=");
        let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Equals,
                TokenKind::Arrow,
                TokenKind::Pipe,
                TokenKind::Colon,
                TokenKind::Dot,
                TokenKind::DotBracket,
                TokenKind::Op,
                TokenKind::Op,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn bangbang_before_selection() {
        let tokens = scan_all("x!!.name");
        let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Ident,
                TokenKind::BangBang,
                TokenKind::Dot,
                TokenKind::Ident,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn backtick_operator_reads_until_backtick() {
        let tokens = scan_all("a `plus` b");
        assert_eq!(tokens[1].kind, TokenKind::Op);
        assert_eq!(tokens[1].text.as_deref(), Some("plus"));
    }

    #[test]
    fn char_literals_with_escapes() {
        let tokens = scan_all(r"'a' '\n' '\u0042'");
        let values: Vec<TokenValue> = tokens.iter().filter_map(|t| t.value.clone()).collect();
        assert_eq!(
            values,
            vec![
                TokenValue::Char('a'),
                TokenValue::Char('\n'),
                TokenValue::Char('B'),
            ]
        );
    }
}
