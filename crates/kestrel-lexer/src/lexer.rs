//! Source text → token stream.
//!
//! Structurally grounded on `pro-grammer-SD-axiom`'s char-vector scanning
//! style (`axm::lexer::Lexer`), rewritten against the real ECMAScript
//! token contract in spec.md §4.1: full escape processing, template
//! literals with brace-depth tracking, regex/divide disambiguation from
//! the preceding token, Unicode whitespace, and HTML-comment forms.

use crate::error::LexError;
use crate::span::Span;
use crate::token::{keyword_from_str, Token, TokenKind};

#[derive(Debug, Clone, Copy)]
pub struct LexerConfig {
    pub strict: bool,
    pub allow_legacy_octal: bool,
}

impl Default for LexerConfig {
    fn default() -> Self {
        Self { strict: false, allow_legacy_octal: true }
    }
}

pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    column: u32,
    pub config: LexerConfig,
    errors: Vec<LexError>,
    prev_significant: Option<TokenKind>,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        let source = source.strip_prefix('\u{FEFF}').unwrap_or(source);
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            config: LexerConfig::default(),
            errors: Vec::new(),
            prev_significant: None,
        }
    }

    pub fn with_config(source: &str, config: LexerConfig) -> Self {
        let mut lex = Self::new(source);
        lex.config = config;
        lex
    }

    pub fn errors(&self) -> &[LexError] {
        &self.errors
    }

    pub fn set_strict(&mut self, strict: bool) {
        self.config.strict = strict;
    }

    /// Tokenize the entire source, for callers that don't need the
    /// regex/divide lookahead interleaved with parsing.
    pub fn tokenize_all(mut self) -> (Vec<Token>, Vec<LexError>) {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token();
            let done = matches!(tok.kind, TokenKind::Eof);
            tokens.push(tok);
            if done {
                break;
            }
        }
        (tokens, self.errors)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' || c == '\u{2028}' || c == '\u{2029}' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn span_from(&self, start: usize, start_line: u32, start_col: u32) -> Span {
        Span::new(start, self.pos, start_line, start_col)
    }

    fn is_line_terminator(c: char) -> bool {
        matches!(c, '\n' | '\r' | '\u{2028}' | '\u{2029}')
    }

    fn is_whitespace(c: char) -> bool {
        c.is_whitespace() || matches!(c, '\u{FEFF}' | '\u{00A0}' | '\u{3000}')
    }

    /// Skip whitespace and comments, reporting whether a line terminator
    /// was crossed (needed by ASI in the parser).
    fn skip_trivia(&mut self) -> bool {
        let mut saw_newline = false;
        loop {
            match self.peek() {
                Some(c) if Self::is_line_terminator(c) => {
                    saw_newline = true;
                    self.bump();
                }
                Some(c) if Self::is_whitespace(c) => {
                    self.bump();
                }
                Some('/') if self.peek_at(1) == Some('/') => {
                    while let Some(c) = self.peek() {
                        if Self::is_line_terminator(c) {
                            break;
                        }
                        self.bump();
                    }
                }
                Some('/') if self.peek_at(1) == Some('*') => {
                    self.bump();
                    self.bump();
                    while let Some(c) = self.peek() {
                        if c == '*' && self.peek_at(1) == Some('/') {
                            self.bump();
                            self.bump();
                            break;
                        }
                        if Self::is_line_terminator(c) {
                            saw_newline = true;
                        }
                        self.bump();
                    }
                }
                // HTML-comment-to-end-of-line: `<!--`
                Some('<') if self.peek_at(1) == Some('!') && self.peek_at(2) == Some('-') && self.peek_at(3) == Some('-') => {
                    for _ in 0..4 {
                        self.bump();
                    }
                    while let Some(c) = self.peek() {
                        if Self::is_line_terminator(c) {
                            break;
                        }
                        self.bump();
                    }
                }
                // Line-leading `-->` comment.
                Some('-') if self.column == 1 && self.peek_at(1) == Some('-') && self.peek_at(2) == Some('>') => {
                    for _ in 0..3 {
                        self.bump();
                    }
                    while let Some(c) = self.peek() {
                        if Self::is_line_terminator(c) {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => break,
            }
        }
        saw_newline
    }

    pub fn next_token(&mut self) -> Token {
        let preceded_by_newline = self.skip_trivia();
        let start = self.pos;
        let (start_line, start_col) = (self.line, self.column);

        let Some(c) = self.peek() else {
            return self.finish(TokenKind::Eof, start, start_line, start_col, preceded_by_newline);
        };

        let kind = if c.is_ascii_digit() || (c == '.' && self.peek_at(1).is_some_and(|d| d.is_ascii_digit())) {
            self.lex_number(start)
        } else if c == '"' || c == '\'' {
            self.lex_string(c, start, start_line, start_col)
        } else if c == '`' {
            self.lex_template(start, start_line, start_col)
        } else if is_ident_start(c) || c == '\\' {
            self.lex_ident_or_keyword(start)
        } else if c == '/' && !self.prev_allows_divide() {
            self.lex_regex(start, start_line, start_col)
        } else {
            self.lex_punctuator(start, start_line, start_col)
        };

        let tok = self.finish(kind, start, start_line, start_col, preceded_by_newline);
        self.prev_significant = Some(tok.kind.clone());
        tok
    }

    fn finish(&self, kind: TokenKind, start: usize, line: u32, col: u32, preceded_by_newline: bool) -> Token {
        Token { span: self.span_from(start, line, col), kind, preceded_by_newline }
    }

    fn prev_allows_divide(&self) -> bool {
        match &self.prev_significant {
            None => false,
            Some(k) => {
                let dummy = Token { kind: k.clone(), span: Span::default(), preceded_by_newline: false };
                dummy.allows_divide_after()
            }
        }
    }

    fn lex_ident_or_keyword(&mut self, start: usize) -> TokenKind {
        let mut s = String::new();
        loop {
            match self.peek() {
                Some('\\') if self.peek_at(1) == Some('u') => {
                    self.bump();
                    self.bump();
                    if let Some(ch) = self.read_unicode_escape() {
                        s.push(ch);
                    }
                }
                Some(c) if is_ident_continue(c) => {
                    s.push(c);
                    self.bump();
                }
                _ => break,
            }
        }
        if s.is_empty() {
            let ch = self.bump().unwrap_or('\u{0}');
            self.errors.push(LexError::UnexpectedCharacter { ch, span: self.span_from(start, self.line, self.column) });
            return TokenKind::Invalid(ch);
        }
        if self.config.strict && crate::token::is_strict_reserved(&s) {
            // Still tokenize as an identifier; the parser/evaluator reports
            // the strict-mode violation with source context.
        }
        keyword_from_str(&s).unwrap_or(TokenKind::Ident(s))
    }

    fn read_unicode_escape(&mut self) -> Option<char> {
        if self.peek() == Some('{') {
            self.bump();
            let mut digits = String::new();
            while let Some(c) = self.peek() {
                if c == '}' {
                    break;
                }
                digits.push(c);
                self.bump();
            }
            self.bump();
            let code = u32::from_str_radix(&digits, 16).ok()?;
            if code > 0x10FFFF {
                return None;
            }
            char::from_u32(code)
        } else {
            let mut digits = String::new();
            for _ in 0..4 {
                if let Some(c) = self.peek() {
                    digits.push(c);
                    self.bump();
                }
            }
            let code = u32::from_str_radix(&digits, 16).ok()?;
            // Surrogate-pair decode: a high surrogate immediately followed
            // by `\uDCxx` combines into one codepoint (spec.md §4.1).
            if (0xD800..=0xDBFF).contains(&code) && self.peek() == Some('\\') && self.peek_at(1) == Some('u') {
                let save = self.pos;
                self.bump();
                self.bump();
                let mut low_digits = String::new();
                for _ in 0..4 {
                    if let Some(c) = self.peek() {
                        low_digits.push(c);
                        self.bump();
                    }
                }
                if let Ok(low) = u32::from_str_radix(&low_digits, 16) {
                    if (0xDC00..=0xDFFF).contains(&low) {
                        let combined = 0x10000 + (code - 0xD800) * 0x400 + (low - 0xDC00);
                        return char::from_u32(combined);
                    }
                }
                self.pos = save;
            }
            char::from_u32(code)
        }
    }

    fn lex_number(&mut self, start: usize) -> TokenKind {
        let mut text = String::new();
        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x') | Some('X')) {
            text.push(self.bump().unwrap());
            text.push(self.bump().unwrap());
            self.consume_digits(&mut text, |c| c.is_ascii_hexdigit());
            return self.finish_numeric(text, start, 16);
        }
        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('o') | Some('O')) {
            text.push(self.bump().unwrap());
            text.push(self.bump().unwrap());
            self.consume_digits(&mut text, |c| ('0'..='7').contains(&c));
            return self.finish_numeric(text, start, 8);
        }
        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('b') | Some('B')) {
            text.push(self.bump().unwrap());
            text.push(self.bump().unwrap());
            self.consume_digits(&mut text, |c| c == '0' || c == '1');
            return self.finish_numeric(text, start, 2);
        }
        // Legacy octal: `0` followed immediately by another digit, no `.`/`e`.
        if self.peek() == Some('0') && self.peek_at(1).is_some_and(|d| d.is_ascii_digit()) {
            let save = self.pos;
            let mut octal = String::new();
            self.consume_digits(&mut octal, |c| c.is_ascii_digit());
            if octal.chars().all(|c| ('0'..='7').contains(&c)) && self.peek() != Some('.') && !matches!(self.peek(), Some('e') | Some('E')) {
                if self.config.strict {
                    self.errors.push(LexError::StrictOctal { span: self.span_from(start, self.line, self.column) });
                }
                if let Ok(n) = i64::from_str_radix(&octal, 8) {
                    return TokenKind::Number(n as f64);
                }
            }
            self.pos = save;
        }
        self.consume_digits(&mut text, |c| c.is_ascii_digit());
        if self.peek() == Some('.') {
            text.push(self.bump().unwrap());
            self.consume_digits(&mut text, |c| c.is_ascii_digit());
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            text.push(self.bump().unwrap());
            if matches!(self.peek(), Some('+') | Some('-')) {
                text.push(self.bump().unwrap());
            }
            self.consume_digits(&mut text, |c| c.is_ascii_digit());
        }
        if self.peek() == Some('n') {
            self.bump();
            return TokenKind::BigIntLiteral(text);
        }
        match text.parse::<f64>() {
            Ok(n) => TokenKind::Number(n),
            Err(_) => {
                self.errors.push(LexError::InvalidNumber { text: text.clone(), span: self.span_from(start, self.line, self.column) });
                TokenKind::Number(f64::NAN)
            }
        }
    }

    fn consume_digits(&mut self, out: &mut String, pred: impl Fn(char) -> bool) {
        loop {
            match self.peek() {
                Some(c) if pred(c) => {
                    out.push(c);
                    self.bump();
                }
                Some('_') if self.peek_at(1).is_some_and(&pred) => {
                    self.bump();
                }
                _ => break,
            }
        }
    }

    fn finish_numeric(&mut self, text: String, start: usize, radix: u32) -> TokenKind {
        if self.peek() == Some('n') {
            self.bump();
            return TokenKind::BigIntLiteral(text);
        }
        let digits = &text[2..];
        match i64::from_str_radix(digits, radix) {
            Ok(n) => TokenKind::Number(n as f64),
            Err(_) => match u64::from_str_radix(digits, radix) {
                Ok(n) => TokenKind::Number(n as f64),
                Err(_) => {
                    self.errors.push(LexError::InvalidNumber { text, span: self.span_from(start, self.line, self.column) });
                    TokenKind::Number(f64::NAN)
                }
            },
        }
    }

    fn lex_string(&mut self, quote: char, start: usize, line: u32, col: u32) -> TokenKind {
        self.bump();
        let mut s = String::new();
        loop {
            match self.peek() {
                None => {
                    self.errors.push(LexError::UnterminatedString { span: self.span_from(start, line, col) });
                    break;
                }
                Some(c) if c == quote => {
                    self.bump();
                    break;
                }
                Some(c) if Self::is_line_terminator(c) => {
                    self.errors.push(LexError::UnterminatedString { span: self.span_from(start, line, col) });
                    break;
                }
                Some('\\') => {
                    self.bump();
                    if let Some(decoded) = self.read_escape_sequence(start) {
                        s.push_str(&decoded);
                    }
                }
                Some(c) => {
                    s.push(c);
                    self.bump();
                }
            }
        }
        TokenKind::String(s)
    }

    /// Decode one backslash escape (the `\` has already been consumed).
    /// Returns the decoded text, or `None` for a line-continuation
    /// (`\` followed directly by a line terminator, which contributes no
    /// characters).
    fn read_escape_sequence(&mut self, str_start: usize) -> Option<String> {
        let Some(c) = self.peek() else { return None };
        match c {
            'n' => { self.bump(); Some("\n".into()) }
            't' => { self.bump(); Some("\t".into()) }
            'r' => { self.bump(); Some("\r".into()) }
            'b' => { self.bump(); Some("\u{8}".into()) }
            'f' => { self.bump(); Some("\u{c}".into()) }
            'v' => { self.bump(); Some("\u{b}".into()) }
            '\\' => { self.bump(); Some("\\".into()) }
            '\'' => { self.bump(); Some("'".into()) }
            '"' => { self.bump(); Some("\"".into()) }
            '`' => { self.bump(); Some("`".into()) }
            'x' => {
                self.bump();
                let mut digits = String::new();
                for _ in 0..2 {
                    if let Some(d) = self.peek() {
                        digits.push(d);
                        self.bump();
                    }
                }
                u32::from_str_radix(&digits, 16).ok().and_then(char::from_u32).map(String::from)
            }
            'u' => {
                self.bump();
                self.read_unicode_escape().map(String::from)
            }
            '\n' | '\u{2028}' | '\u{2029}' => { self.bump(); Some(String::new()) }
            '\r' => {
                self.bump();
                if self.peek() == Some('\n') {
                    self.bump();
                }
                Some(String::new())
            }
            '0'..='7' => {
                let start = self.pos;
                let mut digits = String::new();
                while digits.len() < 3 {
                    match self.peek() {
                        Some(d) if ('0'..='7').contains(&d) => {
                            digits.push(d);
                            self.bump();
                        }
                        _ => break,
                    }
                }
                let is_bare_zero = digits == "0" && !self.peek().is_some_and(|d| d.is_ascii_digit());
                if self.config.strict && !is_bare_zero {
                    self.errors.push(LexError::StrictOctal { span: self.span_from(start, self.line, self.column) });
                }
                let _ = str_start;
                u32::from_str_radix(&digits, 8).ok().and_then(char::from_u32).map(String::from)
            }
            _ => {
                self.bump();
                Some(c.to_string())
            }
        }
    }

    /// Scan a whole template literal in one pass, tracking `${ }` brace
    /// nesting so a brace that belongs to a nested object literal inside a
    /// placeholder doesn't get mistaken for the placeholder's closing
    /// brace (spec.md §4.1). `\r` and `\r\n` are normalised to `\n` in the
    /// cooked text but preserved in the raw substring.
    fn lex_template(&mut self, start: usize, line: u32, col: u32) -> TokenKind {
        self.bump();
        let mut quasis = vec![String::new()];
        let mut raw_quasis = vec![String::new()];
        let mut expr_sources = Vec::new();
        loop {
            match self.peek() {
                None => {
                    self.errors.push(LexError::UnterminatedTemplate { span: self.span_from(start, line, col) });
                    break;
                }
                Some('`') => {
                    self.bump();
                    break;
                }
                Some('$') if self.peek_at(1) == Some('{') => {
                    self.bump();
                    self.bump();
                    let expr_start = self.pos;
                    let mut depth: u32 = 1;
                    while let Some(c) = self.peek() {
                        match c {
                            '{' => depth += 1,
                            '}' => {
                                depth -= 1;
                                if depth == 0 {
                                    break;
                                }
                            }
                            '`' => {
                                // A nested template literal inside the
                                // placeholder: skip it wholesale so its
                                // braces don't confuse our depth count.
                                self.bump();
                                while let Some(n) = self.peek() {
                                    if n == '`' {
                                        break;
                                    }
                                    self.bump();
                                }
                            }
                            '"' | '\'' => {
                                let quote = c;
                                self.bump();
                                while let Some(n) = self.peek() {
                                    if n == quote {
                                        break;
                                    }
                                    if n == '\\' {
                                        self.bump();
                                    }
                                    self.bump();
                                }
                            }
                            _ => {}
                        }
                        self.bump();
                    }
                    let expr_source: String = self.chars[expr_start..self.pos].iter().collect();
                    expr_sources.push(expr_source);
                    self.bump(); // closing '}'
                    quasis.push(String::new());
                    raw_quasis.push(String::new());
                }
                Some('\\') => {
                    let raw_start = self.pos;
                    self.bump();
                    if let Some(decoded) = self.read_escape_sequence(start) {
                        quasis.last_mut().unwrap().push_str(&decoded);
                    }
                    raw_quasis.last_mut().unwrap().extend(&self.chars[raw_start..self.pos]);
                }
                Some('\r') => {
                    self.bump();
                    if self.peek() == Some('\n') {
                        self.bump();
                    }
                    quasis.last_mut().unwrap().push('\n');
                    raw_quasis.last_mut().unwrap().push('\n');
                }
                Some(c) => {
                    quasis.last_mut().unwrap().push(c);
                    raw_quasis.last_mut().unwrap().push(c);
                    self.bump();
                }
            }
        }
        TokenKind::TemplateLiteral { quasis, raw_quasis, expr_sources }
    }

    fn lex_regex(&mut self, start: usize, line: u32, col: u32) -> TokenKind {
        self.bump();
        let mut body = String::new();
        let mut in_class = false;
        loop {
            match self.peek() {
                None => {
                    self.errors.push(LexError::UnterminatedRegex { span: self.span_from(start, line, col) });
                    return TokenKind::Regex { body, flags: String::new() };
                }
                Some('\\') => {
                    body.push(self.bump().unwrap());
                    if let Some(c) = self.bump() {
                        body.push(c);
                    }
                }
                Some('[') => {
                    in_class = true;
                    body.push(self.bump().unwrap());
                }
                Some(']') => {
                    in_class = false;
                    body.push(self.bump().unwrap());
                }
                Some('/') if !in_class => {
                    self.bump();
                    break;
                }
                Some(c) if Self::is_line_terminator(c) => {
                    self.errors.push(LexError::UnterminatedRegex { span: self.span_from(start, line, col) });
                    return TokenKind::Regex { body, flags: String::new() };
                }
                Some(c) => {
                    body.push(c);
                    self.bump();
                }
            }
        }
        let mut flags = String::new();
        while let Some(c) = self.peek() {
            if "gimsuy".contains(c) {
                flags.push(c);
                self.bump();
            } else {
                break;
            }
        }
        TokenKind::Regex { body, flags }
    }

    fn lex_punctuator(&mut self, start: usize, line: u32, col: u32) -> TokenKind {
        use TokenKind::*;
        macro_rules! two {
            ($a:expr, $b:expr) => {
                self.peek_at(1) == Some($b) && { self.bump(); self.bump(); true }
            };
        }
        let c = self.bump().unwrap();
        match c {
            '{' => LBrace,
            '}' => RBrace,
            '(' => LParen,
            ')' => RParen,
            '[' => LBracket,
            ']' => RBracket,
            ',' => Comma,
            ':' => Colon,
            ';' => Semicolon,
            '~' => Tilde,
            '.' => {
                if self.peek() == Some('.') && self.peek_at(1) == Some('.') {
                    self.bump();
                    self.bump();
                    DotDotDot
                } else {
                    Dot
                }
            }
            '+' => {
                if self.peek() == Some('+') {
                    self.bump();
                    PlusPlus
                } else if self.peek() == Some('=') {
                    self.bump();
                    PlusAssign
                } else {
                    Plus
                }
            }
            '-' => {
                if self.peek() == Some('-') {
                    self.bump();
                    MinusMinus
                } else if self.peek() == Some('=') {
                    self.bump();
                    MinusAssign
                } else {
                    Minus
                }
            }
            '*' => {
                if self.peek() == Some('*') {
                    self.bump();
                    if self.peek() == Some('=') {
                        self.bump();
                        StarStarAssign
                    } else {
                        StarStar
                    }
                } else if self.peek() == Some('=') {
                    self.bump();
                    StarAssign
                } else {
                    Star
                }
            }
            '/' => {
                if self.peek() == Some('=') {
                    self.bump();
                    SlashAssign
                } else {
                    Slash
                }
            }
            '%' => {
                if self.peek() == Some('=') {
                    self.bump();
                    PercentAssign
                } else {
                    Percent
                }
            }
            '=' => {
                if self.peek() == Some('=') && self.peek_at(1) == Some('=') {
                    self.bump();
                    self.bump();
                    EqEqEq
                } else if self.peek() == Some('=') {
                    self.bump();
                    EqEq
                } else if self.peek() == Some('>') {
                    self.bump();
                    Arrow
                } else {
                    Assign
                }
            }
            '!' => {
                if self.peek() == Some('=') && self.peek_at(1) == Some('=') {
                    self.bump();
                    self.bump();
                    NotEqEq
                } else if self.peek() == Some('=') {
                    self.bump();
                    NotEq
                } else {
                    Not
                }
            }
            '<' => {
                if self.peek() == Some('<') {
                    self.bump();
                    if self.peek() == Some('=') {
                        self.bump();
                        ShlAssign
                    } else {
                        Shl
                    }
                } else if self.peek() == Some('=') {
                    self.bump();
                    LtEq
                } else {
                    Lt
                }
            }
            '>' => {
                if self.peek() == Some('>') && self.peek_at(1) == Some('>') {
                    self.bump();
                    self.bump();
                    if self.peek() == Some('=') {
                        self.bump();
                        UShrAssign
                    } else {
                        UShr
                    }
                } else if self.peek() == Some('>') {
                    self.bump();
                    if self.peek() == Some('=') {
                        self.bump();
                        ShrAssign
                    } else {
                        Shr
                    }
                } else if self.peek() == Some('=') {
                    self.bump();
                    GtEq
                } else {
                    Gt
                }
            }
            '&' => {
                if self.peek() == Some('&') {
                    self.bump();
                    if self.peek() == Some('=') {
                        self.bump();
                        AndAssign
                    } else {
                        AndAnd
                    }
                } else if self.peek() == Some('=') {
                    self.bump();
                    AmpAssign
                } else {
                    Amp
                }
            }
            '|' => {
                if self.peek() == Some('|') {
                    self.bump();
                    if self.peek() == Some('=') {
                        self.bump();
                        OrAssign
                    } else {
                        OrOr
                    }
                } else if self.peek() == Some('=') {
                    self.bump();
                    PipeAssign
                } else {
                    Pipe
                }
            }
            '^' => {
                if self.peek() == Some('=') {
                    self.bump();
                    CaretAssign
                } else {
                    Caret
                }
            }
            '?' => {
                if self.peek() == Some('?') {
                    self.bump();
                    if self.peek() == Some('=') {
                        self.bump();
                        NullishAssign
                    } else {
                        Nullish
                    }
                } else if self.peek() == Some('.') && !self.peek_at(1).is_some_and(|d| d.is_ascii_digit()) {
                    self.bump();
                    QuestionDot
                } else {
                    Question
                }
            }
            other => {
                self.errors.push(LexError::UnexpectedCharacter { ch: other, span: self.span_from(start, line, col) });
                Invalid(other)
            }
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c == '$' || c == '_' || c.is_alphabetic()
}

fn is_ident_continue(c: char) -> bool {
    c == '$' || c == '_' || c.is_alphanumeric()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        let (tokens, _errs) = Lexer::new(src).tokenize_all();
        tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn numbers_cover_all_radixes_and_separators() {
        assert_eq!(kinds("0xFF")[0], TokenKind::Number(255.0));
        assert_eq!(kinds("0o17")[0], TokenKind::Number(15.0));
        assert_eq!(kinds("0b101")[0], TokenKind::Number(5.0));
        assert_eq!(kinds("1_000")[0], TokenKind::Number(1000.0));
        assert_eq!(kinds("1e3")[0], TokenKind::Number(1000.0));
    }

    #[test]
    fn bigint_suffix_is_a_distinct_token() {
        assert_eq!(kinds("20n")[0], TokenKind::BigIntLiteral("20".to_string()));
    }

    #[test]
    fn divide_after_identifier_is_division() {
        let toks = kinds("a / b");
        assert_eq!(toks[1], TokenKind::Slash);
    }

    #[test]
    fn regex_after_return_is_a_regex_literal() {
        let toks = kinds("return /ab+c/gi");
        assert!(matches!(toks[1], TokenKind::Regex { .. }));
    }

    #[test]
    fn string_escapes_decode() {
        let toks = kinds(r#""a\nbA\u{1F600}""#);
        match &toks[0] {
            TokenKind::String(s) => {
                assert!(s.starts_with("a\nbA"));
                assert!(s.contains('\u{1F600}'));
            }
            other => panic!("unexpected token {other:?}"),
        }
    }

    #[test]
    fn arrow_and_optional_chaining_tokens() {
        let toks = kinds("(x) => x?.y ?? z");
        assert!(toks.contains(&TokenKind::Arrow));
        assert!(toks.contains(&TokenKind::QuestionDot));
        assert!(toks.contains(&TokenKind::Nullish));
    }

    #[test]
    fn template_literal_scans_in_one_pass() {
        let toks = kinds("`a${1}b`");
        match &toks[0] {
            TokenKind::TemplateLiteral { quasis, expr_sources, .. } => {
                assert_eq!(quasis, &["a".to_string(), "b".to_string()]);
                assert_eq!(expr_sources, &["1".to_string()]);
            }
            other => panic!("unexpected token {other:?}"),
        }
    }
}
