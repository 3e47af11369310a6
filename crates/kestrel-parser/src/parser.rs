//! Recursive-descent parser with Pratt-style precedence climbing for
//! expressions (spec.md §4.2).
//!
//! Grounded structurally on `pro-grammer-SD-axiom::parser` (single token
//! buffer, `peek`/`advance`/`expect` primitives, statement-boundary
//! resync on error) but built against the real ECMAScript grammar rather
//! than Axiom's custom surface syntax.

use crate::ast::*;
use crate::error::ParseError;
use kestrel_lexer::{Lexer, LexerConfig, Span, Token, TokenKind};
use std::rc::Rc;

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    pub errors: Vec<ParseError>,
    source_id: u32,
    in_function: bool,
    in_loop: bool,
}

type PResult<T> = Result<T, ParseError>;

impl Parser {
    pub fn new(source: &str, source_id: u32) -> Self {
        let lexer = Lexer::new(source);
        let (tokens, lex_errors) = lexer.tokenize_all();
        let mut errors: Vec<ParseError> = lex_errors
            .into_iter()
            .map(|e| ParseError::new(e.to_string(), e.span()))
            .collect();
        let mut p = Self { tokens, pos: 0, errors: Vec::new(), source_id, in_function: false, in_loop: false };
        p.errors.append(&mut errors);
        p
    }

    /// Re-lex and re-parse `source` with strict mode forced on — used once
    /// a `"use strict"` directive prologue is detected, since legacy-octal
    /// rejection depends on the lexer's strict flag (spec.md §4.1/§4.2).
    fn with_strict(source: &str, source_id: u32) -> Self {
        let lexer = Lexer::with_config(source, LexerConfig { strict: true, allow_legacy_octal: false });
        let (tokens, lex_errors) = lexer.tokenize_all();
        let errors: Vec<ParseError> = lex_errors.into_iter().map(|e| ParseError::new(e.to_string(), e.span())).collect();
        Self { tokens, pos: 0, errors, source_id, in_function: false, in_loop: false }
    }

    pub fn parse_program(source: &str, source_id: u32) -> (Program, Vec<ParseError>) {
        if is_strict_prologue(source) {
            let mut p = Parser::with_strict(source, source_id);
            let body = p.parse_statements_until_eof();
            return (Program { body, strict: true, source_id }, p.errors);
        }
        let mut p = Parser::new(source, source_id);
        let body = p.parse_statements_until_eof();
        (Program { body, strict: false, source_id }, p.errors)
    }

    pub fn parse_expression_standalone(source: &str) -> PResult<Expr> {
        let mut p = Parser::new(source, 0);
        p.parse_expression()
    }

    fn parse_statements_until_eof(&mut self) -> Vec<Statement> {
        let mut body = Vec::new();
        while !self.at_eof() {
            match self.parse_statement() {
                Ok(stmt) => body.push(stmt),
                Err(e) => {
                    self.errors.push(e);
                    self.resync();
                }
            }
        }
        body
    }

    /// Skip tokens until the next statement boundary after a parse error,
    /// so one bad statement doesn't abort the whole parse (spec.md §4.2).
    fn resync(&mut self) {
        while !self.at_eof() {
            if self.check(&TokenKind::Semicolon) {
                self.advance();
                return;
            }
            if self.check(&TokenKind::RBrace) {
                return;
            }
            self.advance();
        }
    }

    // --- token plumbing ---

    fn at_eof(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, n: usize) -> &Token {
        let idx = (self.pos + n).min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.peek().kind) == std::mem::discriminant(kind)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> PResult<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error(format!("expected {what}")))
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(message.into(), self.peek().span)
    }

    fn ident_name(&mut self) -> PResult<String> {
        match &self.peek().kind {
            TokenKind::Ident(s) => {
                let s = s.clone();
                self.advance();
                Ok(s)
            }
            // Contextual keywords are valid identifier names in many
            // positions (`of`, `from`, `get`, `set`, `async`, `static`).
            TokenKind::Of => { self.advance(); Ok("of".into()) }
            TokenKind::From => { self.advance(); Ok("from".into()) }
            TokenKind::Get => { self.advance(); Ok("get".into()) }
            TokenKind::Set => { self.advance(); Ok("set".into()) }
            TokenKind::Async => { self.advance(); Ok("async".into()) }
            TokenKind::Static => { self.advance(); Ok("static".into()) }
            TokenKind::Await => { self.advance(); Ok("await".into()) }
            TokenKind::Yield => { self.advance(); Ok("yield".into()) }
            _ => Err(self.error("expected identifier")),
        }
    }

    /// Automatic semicolon insertion (spec.md §4.2): a `;` is synthesised
    /// before `}`, at EOF, or after a line terminator when the next token
    /// cannot continue the current production.
    fn consume_semicolon(&mut self) -> PResult<()> {
        if self.eat(&TokenKind::Semicolon) {
            return Ok(());
        }
        if self.check(&TokenKind::RBrace) || self.at_eof() || self.peek().preceded_by_newline {
            return Ok(());
        }
        Err(self.error("expected ';'"))
    }

    // --- statements ---

    fn parse_statement(&mut self) -> PResult<Statement> {
        match &self.peek().kind {
            TokenKind::LBrace => Ok(Statement::Block(self.parse_block()?)),
            TokenKind::Var | TokenKind::Let | TokenKind::Const => self.parse_var_statement(),
            TokenKind::Function => Ok(Statement::FunctionDecl(Rc::new(self.parse_function(false, false)?))),
            TokenKind::Async if matches!(self.peek_at(1).kind, TokenKind::Function) => {
                self.advance();
                Ok(Statement::FunctionDecl(Rc::new(self.parse_function(true, false)?)))
            }
            TokenKind::Class => Ok(Statement::ClassDecl(Rc::new(self.parse_class()?))),
            TokenKind::Return => {
                self.advance();
                let arg = if self.check(&TokenKind::Semicolon)
                    || self.check(&TokenKind::RBrace)
                    || self.at_eof()
                    || self.peek().preceded_by_newline
                {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                self.consume_semicolon()?;
                Ok(Statement::Return(arg))
            }
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::Do => self.parse_do_while(),
            TokenKind::For => self.parse_for(),
            TokenKind::Break => {
                self.advance();
                let label = self.optional_label()?;
                self.consume_semicolon()?;
                Ok(Statement::Break(label))
            }
            TokenKind::Continue => {
                self.advance();
                let label = self.optional_label()?;
                self.consume_semicolon()?;
                Ok(Statement::Continue(label))
            }
            TokenKind::Switch => self.parse_switch(),
            TokenKind::Try => self.parse_try(),
            TokenKind::Throw => {
                self.advance();
                if self.peek().preceded_by_newline {
                    return Err(self.error("illegal newline after 'throw'"));
                }
                let arg = self.parse_expression()?;
                self.consume_semicolon()?;
                Ok(Statement::Throw(arg))
            }
            TokenKind::Semicolon => {
                self.advance();
                Ok(Statement::Empty)
            }
            TokenKind::Ident(name) if matches!(self.peek_at(1).kind, TokenKind::Colon) => {
                let label = name.clone();
                self.advance();
                self.advance();
                let body = Box::new(self.parse_statement()?);
                Ok(Statement::Labeled { label, body })
            }
            _ => {
                let expr = self.parse_expression()?;
                self.consume_semicolon()?;
                Ok(Statement::Expression(expr))
            }
        }
    }

    fn optional_label(&mut self) -> PResult<Option<String>> {
        if !self.peek().preceded_by_newline {
            if let TokenKind::Ident(name) = &self.peek().kind {
                let name = name.clone();
                self.advance();
                return Ok(Some(name));
            }
        }
        Ok(None)
    }

    fn parse_block(&mut self) -> PResult<Vec<Statement>> {
        self.expect(&TokenKind::LBrace, "'{'")?;
        let mut stmts = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_eof() {
            match self.parse_statement() {
                Ok(s) => stmts.push(s),
                Err(e) => {
                    self.errors.push(e);
                    self.resync();
                }
            }
        }
        self.expect(&TokenKind::RBrace, "'}'")?;
        Ok(stmts)
    }

    fn parse_var_statement(&mut self) -> PResult<Statement> {
        let kind = self.decl_kind()?;
        let declarations = self.parse_declarator_list()?;
        self.consume_semicolon()?;
        Ok(Statement::VarDecl { kind, declarations })
    }

    fn decl_kind(&mut self) -> PResult<DeclKind> {
        match self.peek().kind {
            TokenKind::Var => { self.advance(); Ok(DeclKind::Var) }
            TokenKind::Let => { self.advance(); Ok(DeclKind::Let) }
            TokenKind::Const => { self.advance(); Ok(DeclKind::Const) }
            _ => Err(self.error("expected 'var', 'let', or 'const'")),
        }
    }

    fn parse_declarator_list(&mut self) -> PResult<Vec<(Pattern, Option<Expr>)>> {
        let mut out = Vec::new();
        loop {
            let pattern = self.parse_binding_pattern()?;
            let init = if self.eat(&TokenKind::Assign) { Some(self.parse_assignment_expr()?) } else { None };
            out.push((pattern, init));
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Ok(out)
    }

    fn parse_binding_pattern(&mut self) -> PResult<Pattern> {
        match &self.peek().kind {
            TokenKind::LBrace => self.parse_object_pattern(),
            TokenKind::LBracket => self.parse_array_pattern(),
            _ => Ok(Pattern::Ident(self.ident_name()?)),
        }
    }

    fn parse_object_pattern(&mut self) -> PResult<Pattern> {
        self.expect(&TokenKind::LBrace, "'{'")?;
        let mut props = Vec::new();
        let mut rest = None;
        while !self.check(&TokenKind::RBrace) {
            if self.eat(&TokenKind::DotDotDot) {
                rest = Some(Box::new(self.parse_binding_pattern()?));
                break;
            }
            let (key, computed) = self.parse_property_key()?;
            let value = if self.eat(&TokenKind::Colon) {
                self.parse_binding_pattern()?
            } else if let PropertyKeyNode::Ident(name) = &key {
                Pattern::Ident(name.clone())
            } else {
                return Err(self.error("expected ':' in object pattern"));
            };
            let value = if self.eat(&TokenKind::Assign) {
                Pattern::Default(Box::new(value), Box::new(self.parse_assignment_expr()?))
            } else {
                value
            };
            props.push(ObjectPatternProp { key, value, computed });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RBrace, "'}'")?;
        Ok(Pattern::Object(props, rest))
    }

    fn parse_array_pattern(&mut self) -> PResult<Pattern> {
        self.expect(&TokenKind::LBracket, "'['")?;
        let mut elems = Vec::new();
        let mut rest = None;
        while !self.check(&TokenKind::RBracket) {
            if self.eat(&TokenKind::Comma) {
                elems.push(None);
                continue;
            }
            if self.eat(&TokenKind::DotDotDot) {
                rest = Some(Box::new(self.parse_binding_pattern()?));
                break;
            }
            let mut pat = self.parse_binding_pattern()?;
            if self.eat(&TokenKind::Assign) {
                pat = Pattern::Default(Box::new(pat), Box::new(self.parse_assignment_expr()?));
            }
            elems.push(Some(pat));
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RBracket, "']'")?;
        Ok(Pattern::Array(elems, rest))
    }

    fn parse_property_key(&mut self) -> PResult<(PropertyKeyNode, bool)> {
        match &self.peek().kind {
            TokenKind::LBracket => {
                self.advance();
                let e = self.parse_assignment_expr()?;
                self.expect(&TokenKind::RBracket, "']'")?;
                Ok((PropertyKeyNode::Computed(Box::new(e)), true))
            }
            TokenKind::String(s) => {
                let s = s.clone();
                self.advance();
                Ok((PropertyKeyNode::StringLit(s), false))
            }
            TokenKind::Number(n) => {
                let n = *n;
                self.advance();
                Ok((PropertyKeyNode::NumberLit(n), false))
            }
            _ => Ok((PropertyKeyNode::Ident(self.ident_name()?), false)),
        }
    }

    fn parse_if(&mut self) -> PResult<Statement> {
        self.advance();
        self.expect(&TokenKind::LParen, "'('")?;
        let test = self.parse_expression()?;
        self.expect(&TokenKind::RParen, "')'")?;
        let consequent = Box::new(self.parse_statement()?);
        let alternate = if self.eat(&TokenKind::Else) { Some(Box::new(self.parse_statement()?)) } else { None };
        Ok(Statement::If { test, consequent, alternate })
    }

    fn parse_while(&mut self) -> PResult<Statement> {
        self.advance();
        self.expect(&TokenKind::LParen, "'('")?;
        let test = self.parse_expression()?;
        self.expect(&TokenKind::RParen, "')'")?;
        let was_loop = std::mem::replace(&mut self.in_loop, true);
        let body = Box::new(self.parse_statement()?);
        self.in_loop = was_loop;
        Ok(Statement::While { test, body })
    }

    fn parse_do_while(&mut self) -> PResult<Statement> {
        self.advance();
        let was_loop = std::mem::replace(&mut self.in_loop, true);
        let body = Box::new(self.parse_statement()?);
        self.in_loop = was_loop;
        self.expect(&TokenKind::While, "'while'")?;
        self.expect(&TokenKind::LParen, "'('")?;
        let test = self.parse_expression()?;
        self.expect(&TokenKind::RParen, "')'")?;
        self.consume_semicolon()?;
        Ok(Statement::DoWhile { body, test })
    }

    fn parse_for(&mut self) -> PResult<Statement> {
        self.advance();
        self.expect(&TokenKind::LParen, "'('")?;

        if matches!(self.peek().kind, TokenKind::Var | TokenKind::Let | TokenKind::Const) {
            let kind = self.decl_kind()?;
            let pattern = self.parse_binding_pattern()?;
            if self.eat(&TokenKind::In) {
                let object = self.parse_expression()?;
                self.expect(&TokenKind::RParen, "')'")?;
                return self.finish_for_in_of(ForBinding { kind: Some(kind), pattern }, object, false);
            }
            if matches!(self.peek().kind, TokenKind::Of) {
                self.advance();
                let object = self.parse_assignment_expr()?;
                self.expect(&TokenKind::RParen, "')'")?;
                return self.finish_for_in_of(ForBinding { kind: Some(kind), pattern }, object, true);
            }
            let init = if self.eat(&TokenKind::Assign) { Some(self.parse_assignment_expr()?) } else { None };
            let mut declarations = vec![(pattern, init)];
            while self.eat(&TokenKind::Comma) {
                let pattern = self.parse_binding_pattern()?;
                let init = if self.eat(&TokenKind::Assign) { Some(self.parse_assignment_expr()?) } else { None };
                declarations.push((pattern, init));
            }
            self.expect(&TokenKind::Semicolon, "';'")?;
            return self.finish_classic_for(Some(Box::new(ForInit::VarDecl { kind, declarations })));
        }

        if self.check(&TokenKind::Semicolon) {
            self.advance();
            return self.finish_classic_for(None);
        }

        let expr = self.parse_expression()?;
        if self.eat(&TokenKind::In) {
            let pattern = expr_to_pattern(&expr).ok_or_else(|| self.error("invalid for-in target"))?;
            let object = self.parse_expression()?;
            self.expect(&TokenKind::RParen, "')'")?;
            return self.finish_for_in_of(ForBinding { kind: None, pattern }, object, false);
        }
        if matches!(self.peek().kind, TokenKind::Of) {
            self.advance();
            let pattern = expr_to_pattern(&expr).ok_or_else(|| self.error("invalid for-of target"))?;
            let object = self.parse_assignment_expr()?;
            self.expect(&TokenKind::RParen, "')'")?;
            return self.finish_for_in_of(ForBinding { kind: None, pattern }, object, true);
        }
        self.expect(&TokenKind::Semicolon, "';'")?;
        self.finish_classic_for(Some(Box::new(ForInit::Expression(expr))))
    }

    fn finish_for_in_of(&mut self, decl: ForBinding, object: Expr, is_of: bool) -> PResult<Statement> {
        let was_loop = std::mem::replace(&mut self.in_loop, true);
        let body = Box::new(self.parse_statement()?);
        self.in_loop = was_loop;
        if is_of {
            Ok(Statement::ForOf { decl, object, body, is_await: false })
        } else {
            Ok(Statement::ForIn { decl, object, body })
        }
    }

    fn finish_classic_for(&mut self, init: Option<Box<ForInit>>) -> PResult<Statement> {
        let test = if self.check(&TokenKind::Semicolon) { None } else { Some(self.parse_expression()?) };
        self.expect(&TokenKind::Semicolon, "';'")?;
        let update = if self.check(&TokenKind::RParen) { None } else { Some(self.parse_expression()?) };
        self.expect(&TokenKind::RParen, "')'")?;
        let was_loop = std::mem::replace(&mut self.in_loop, true);
        let body = Box::new(self.parse_statement()?);
        self.in_loop = was_loop;
        Ok(Statement::For { init, test, update, body })
    }

    fn parse_switch(&mut self) -> PResult<Statement> {
        self.advance();
        self.expect(&TokenKind::LParen, "'('")?;
        let discriminant = self.parse_expression()?;
        self.expect(&TokenKind::RParen, "')'")?;
        self.expect(&TokenKind::LBrace, "'{'")?;
        let mut cases = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_eof() {
            let test = if self.eat(&TokenKind::Case) {
                let e = self.parse_expression()?;
                self.expect(&TokenKind::Colon, "':'")?;
                Some(e)
            } else {
                self.expect(&TokenKind::Default, "'case' or 'default'")?;
                self.expect(&TokenKind::Colon, "':'")?;
                None
            };
            let mut consequent = Vec::new();
            while !matches!(self.peek().kind, TokenKind::Case | TokenKind::Default | TokenKind::RBrace) {
                consequent.push(self.parse_statement()?);
            }
            cases.push(SwitchCase { test, consequent });
        }
        self.expect(&TokenKind::RBrace, "'}'")?;
        Ok(Statement::Switch { discriminant, cases })
    }

    fn parse_try(&mut self) -> PResult<Statement> {
        self.advance();
        let block = self.parse_block()?;
        let handler = if self.eat(&TokenKind::Catch) {
            let param = if self.eat(&TokenKind::LParen) {
                let p = self.parse_binding_pattern()?;
                self.expect(&TokenKind::RParen, "')'")?;
                Some(p)
            } else {
                None
            };
            Some(CatchClause { param, body: self.parse_block()? })
        } else {
            None
        };
        let finalizer = if self.eat(&TokenKind::Finally) { Some(self.parse_block()?) } else { None };
        if handler.is_none() && finalizer.is_none() {
            return Err(self.error("missing catch or finally after try"));
        }
        Ok(Statement::Try { block, handler, finalizer })
    }

    fn parse_function(&mut self, is_async: bool, is_expr_allow_anonymous: bool) -> PResult<Function> {
        let start = self.peek().span;
        self.expect(&TokenKind::Function, "'function'")?;
        let is_generator = self.eat(&TokenKind::Star);
        let name = match &self.peek().kind {
            TokenKind::Ident(_) => Some(self.ident_name()?),
            _ if is_expr_allow_anonymous => None,
            _ => Some(self.ident_name()?),
        };
        let params = self.parse_param_list()?;
        let was_fn = std::mem::replace(&mut self.in_function, true);
        let body = FunctionBody::Block(self.parse_block()?);
        self.in_function = was_fn;
        Ok(Function { name, params, body, is_arrow: false, is_async, is_generator, strict: false, span: start })
    }

    fn parse_param_list(&mut self) -> PResult<Vec<Pattern>> {
        self.expect(&TokenKind::LParen, "'('")?;
        let mut params = Vec::new();
        while !self.check(&TokenKind::RParen) {
            if self.eat(&TokenKind::DotDotDot) {
                params.push(Pattern::Rest(Box::new(self.parse_binding_pattern()?)));
                break;
            }
            let mut pat = self.parse_binding_pattern()?;
            if self.eat(&TokenKind::Assign) {
                pat = Pattern::Default(Box::new(pat), Box::new(self.parse_assignment_expr()?));
            }
            params.push(pat);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen, "')'")?;
        Ok(params)
    }

    fn parse_class(&mut self) -> PResult<Class> {
        self.expect(&TokenKind::Class, "'class'")?;
        let name = if let TokenKind::Ident(_) = &self.peek().kind { Some(self.ident_name()?) } else { None };
        let superclass = if self.eat(&TokenKind::Extends) { Some(Box::new(self.parse_lhs_expr()?)) } else { None };
        self.expect(&TokenKind::LBrace, "'{'")?;
        let mut members = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_eof() {
            if self.eat(&TokenKind::Semicolon) {
                continue;
            }
            members.push(self.parse_class_member()?);
        }
        self.expect(&TokenKind::RBrace, "'}'")?;
        Ok(Class { name, superclass, members })
    }

    fn parse_class_member(&mut self) -> PResult<ClassMember> {
        let is_static = matches!(self.peek().kind, TokenKind::Static) && !matches!(self.peek_at(1).kind, TokenKind::LParen | TokenKind::Assign);
        if is_static {
            self.advance();
        }
        let is_getter = matches!(self.peek().kind, TokenKind::Get) && !matches!(self.peek_at(1).kind, TokenKind::LParen | TokenKind::Assign);
        let is_setter = matches!(self.peek().kind, TokenKind::Set) && !matches!(self.peek_at(1).kind, TokenKind::LParen | TokenKind::Assign);
        if is_getter || is_setter {
            self.advance();
        }
        let (key, _computed) = self.parse_property_key()?;
        if self.check(&TokenKind::LParen) {
            let start = self.peek().span;
            let params = self.parse_param_list()?;
            let body = FunctionBody::Block(self.parse_block()?);
            let func = Rc::new(Function {
                name: None,
                params,
                body,
                is_arrow: false,
                is_async: false,
                is_generator: false,
                strict: true,
                span: start,
            });
            let kind = if is_getter {
                ClassMemberKind::Getter(func)
            } else if is_setter {
                ClassMemberKind::Setter(func)
            } else {
                ClassMemberKind::Method(func)
            };
            return Ok(ClassMember { key, kind, is_static });
        }
        let init = if self.eat(&TokenKind::Assign) { Some(self.parse_assignment_expr()?) } else { None };
        self.consume_semicolon()?;
        Ok(ClassMember { key, kind: ClassMemberKind::Field(init), is_static })
    }

    // --- expressions ---

    fn parse_expression(&mut self) -> PResult<Expr> {
        let first = self.parse_assignment_expr()?;
        if self.check(&TokenKind::Comma) {
            let mut exprs = vec![first];
            while self.eat(&TokenKind::Comma) {
                exprs.push(self.parse_assignment_expr()?);
            }
            return Ok(Expr::Sequence(exprs));
        }
        Ok(first)
    }

    fn parse_assignment_expr(&mut self) -> PResult<Expr> {
        if let Some(arrow) = self.try_parse_arrow()? {
            return Ok(arrow);
        }
        let left = self.parse_conditional()?;
        if let Some(op) = assign_op_from(&self.peek().kind) {
            self.advance();
            let value = Box::new(self.parse_assignment_expr()?);
            return Ok(Expr::Assign { op, target: Box::new(left), value });
        }
        Ok(left)
    }

    /// Restricted arrow-function lookahead (spec.md §4.2): either a bare
    /// identifier directly followed by `=>`, or a parenthesised list that,
    /// after a balanced scan, is directly followed by `=>`.
    fn try_parse_arrow(&mut self) -> PResult<Option<Expr>> {
        let is_async = matches!(self.peek().kind, TokenKind::Async) && !self.peek_at(1).preceded_by_newline
            && matches!(self.peek_at(1).kind, TokenKind::LParen | TokenKind::Ident(_));
        let start_offset = if is_async { 1 } else { 0 };

        if let TokenKind::Ident(name) = &self.peek_at(start_offset).kind {
            if matches!(self.peek_at(start_offset + 1).kind, TokenKind::Arrow) {
                let name = name.clone();
                if is_async {
                    self.advance();
                }
                let span = self.peek().span;
                self.advance(); // ident
                self.advance(); // =>
                let body = self.parse_arrow_body()?;
                return Ok(Some(Expr::Function(Rc::new(Function {
                    name: None,
                    params: vec![Pattern::Ident(name)],
                    body,
                    is_arrow: true,
                    is_async,
                    is_generator: false,
                    strict: false,
                    span,
                }))));
            }
        }

        if matches!(self.peek_at(start_offset).kind, TokenKind::LParen) {
            if let Some(end) = self.scan_matching_paren(self.pos + start_offset) {
                if matches!(self.tokens.get(end + 1).map(|t| &t.kind), Some(TokenKind::Arrow)) {
                    if is_async {
                        self.advance();
                    }
                    let span = self.peek().span;
                    let params = self.parse_param_list()?;
                    self.expect(&TokenKind::Arrow, "'=>'")?;
                    let body = self.parse_arrow_body()?;
                    return Ok(Some(Expr::Function(Rc::new(Function {
                        name: None,
                        params,
                        body,
                        is_arrow: true,
                        is_async,
                        is_generator: false,
                        strict: false,
                        span,
                    }))));
                }
            }
        }
        Ok(None)
    }

    fn parse_arrow_body(&mut self) -> PResult<FunctionBody> {
        if self.check(&TokenKind::LBrace) {
            Ok(FunctionBody::Block(self.parse_block()?))
        } else {
            Ok(FunctionBody::Expression(Box::new(self.parse_assignment_expr()?)))
        }
    }

    /// Find the index of the `)` matching the `(` at `open_idx`, without
    /// consuming tokens. Used only for the arrow-vs-parenthesised-
    /// expression lookahead.
    fn scan_matching_paren(&self, open_idx: usize) -> Option<usize> {
        let mut depth = 0i32;
        let mut i = open_idx;
        loop {
            match self.tokens.get(i)?.kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                TokenKind::Eof => return None,
                _ => {}
            }
            i += 1;
        }
    }

    fn parse_conditional(&mut self) -> PResult<Expr> {
        let test = self.parse_nullish()?;
        if self.eat(&TokenKind::Question) {
            let consequent = Box::new(self.parse_assignment_expr()?);
            self.expect(&TokenKind::Colon, "':'")?;
            let alternate = Box::new(self.parse_assignment_expr()?);
            return Ok(Expr::Conditional { test: Box::new(test), consequent, alternate });
        }
        Ok(test)
    }

    /// `??` may not mix with `||`/`&&` at the same precedence level
    /// without parentheses (spec.md §4.2) — enforced by giving `??` its
    /// own level between conditional and logical-or, and rejecting a
    /// logical-or/and operand that itself starts a bare `??` chain mixed
    /// with `||`/`&&` (parenthesised subexpressions are unaffected since
    /// they parse through `parse_primary`).
    fn parse_nullish(&mut self) -> PResult<Expr> {
        let left = self.parse_logical_or()?;
        if self.check(&TokenKind::Nullish) {
            if matches!(left, Expr::Logical { op: LogicalOp::And, .. } | Expr::Logical { op: LogicalOp::Or, .. }) {
                return Err(self.error("cannot mix '??' with '||' or '&&' without parentheses"));
            }
            let mut left = left;
            while self.eat(&TokenKind::Nullish) {
                let right = self.parse_logical_or()?;
                if matches!(right, Expr::Logical { op: LogicalOp::And, .. } | Expr::Logical { op: LogicalOp::Or, .. }) {
                    return Err(self.error("cannot mix '??' with '||' or '&&' without parentheses"));
                }
                left = Expr::Logical { op: LogicalOp::Nullish, left: Box::new(left), right: Box::new(right) };
            }
            return Ok(left);
        }
        Ok(left)
    }

    fn parse_logical_or(&mut self) -> PResult<Expr> {
        let mut left = self.parse_logical_and()?;
        while self.eat(&TokenKind::OrOr) {
            let right = self.parse_logical_and()?;
            left = Expr::Logical { op: LogicalOp::Or, left: Box::new(left), right: Box::new(right) };
        }
        Ok(left)
    }

    fn parse_logical_and(&mut self) -> PResult<Expr> {
        let mut left = self.parse_bitor()?;
        while self.eat(&TokenKind::AndAnd) {
            let right = self.parse_bitor()?;
            left = Expr::Logical { op: LogicalOp::And, left: Box::new(left), right: Box::new(right) };
        }
        Ok(left)
    }

    fn parse_bitor(&mut self) -> PResult<Expr> {
        let mut left = self.parse_bitxor()?;
        while self.eat(&TokenKind::Pipe) {
            let right = self.parse_bitxor()?;
            left = Expr::Binary { op: BinaryOp::BitOr, left: Box::new(left), right: Box::new(right) };
        }
        Ok(left)
    }

    fn parse_bitxor(&mut self) -> PResult<Expr> {
        let mut left = self.parse_bitand()?;
        while self.eat(&TokenKind::Caret) {
            let right = self.parse_bitand()?;
            left = Expr::Binary { op: BinaryOp::BitXor, left: Box::new(left), right: Box::new(right) };
        }
        Ok(left)
    }

    fn parse_bitand(&mut self) -> PResult<Expr> {
        let mut left = self.parse_equality()?;
        while self.eat(&TokenKind::Amp) {
            let right = self.parse_equality()?;
            left = Expr::Binary { op: BinaryOp::BitAnd, left: Box::new(left), right: Box::new(right) };
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> PResult<Expr> {
        let mut left = self.parse_relational()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::EqEq => BinaryOp::Eq,
                TokenKind::NotEq => BinaryOp::NotEq,
                TokenKind::EqEqEq => BinaryOp::StrictEq,
                TokenKind::NotEqEq => BinaryOp::StrictNotEq,
                _ => break,
            };
            self.advance();
            let right = self.parse_relational()?;
            left = Expr::Binary { op, left: Box::new(left), right: Box::new(right) };
        }
        Ok(left)
    }

    fn parse_relational(&mut self) -> PResult<Expr> {
        let mut left = self.parse_shift()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::LtEq => BinaryOp::LtEq,
                TokenKind::GtEq => BinaryOp::GtEq,
                TokenKind::In => BinaryOp::In,
                TokenKind::InstanceOf => BinaryOp::InstanceOf,
                _ => break,
            };
            self.advance();
            let right = self.parse_shift()?;
            left = Expr::Binary { op, left: Box::new(left), right: Box::new(right) };
        }
        Ok(left)
    }

    fn parse_shift(&mut self) -> PResult<Expr> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Shl => BinaryOp::Shl,
                TokenKind::Shr => BinaryOp::Shr,
                TokenKind::UShr => BinaryOp::UShr,
                _ => break,
            };
            self.advance();
            let right = self.parse_additive()?;
            left = Expr::Binary { op, left: Box::new(left), right: Box::new(right) };
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> PResult<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::Binary { op, left: Box::new(left), right: Box::new(right) };
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> PResult<Expr> {
        let mut left = self.parse_exponent()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_exponent()?;
            left = Expr::Binary { op, left: Box::new(left), right: Box::new(right) };
        }
        Ok(left)
    }

    /// `**` is right-associative (spec.md §4.2).
    fn parse_exponent(&mut self) -> PResult<Expr> {
        let left = self.parse_unary()?;
        if self.eat(&TokenKind::StarStar) {
            let right = self.parse_exponent()?;
            return Ok(Expr::Binary { op: BinaryOp::Pow, left: Box::new(left), right: Box::new(right) });
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        let op = match self.peek().kind {
            TokenKind::Minus => Some(UnaryOp::Minus),
            TokenKind::Plus => Some(UnaryOp::Plus),
            TokenKind::Not => Some(UnaryOp::Not),
            TokenKind::Tilde => Some(UnaryOp::BitNot),
            TokenKind::Typeof => Some(UnaryOp::Typeof),
            TokenKind::Void => Some(UnaryOp::Void),
            TokenKind::Delete => Some(UnaryOp::Delete),
            TokenKind::PlusPlus => Some(UnaryOp::Increment),
            TokenKind::MinusMinus => Some(UnaryOp::Decrement),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let argument = Box::new(self.parse_unary()?);
            return Ok(Expr::Unary { op, argument, prefix: true });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> PResult<Expr> {
        let expr = self.parse_lhs_expr()?;
        if !self.peek().preceded_by_newline {
            let op = match self.peek().kind {
                TokenKind::PlusPlus => Some(UnaryOp::Increment),
                TokenKind::MinusMinus => Some(UnaryOp::Decrement),
                _ => None,
            };
            if let Some(op) = op {
                self.advance();
                return Ok(Expr::Unary { op, argument: Box::new(expr), prefix: false });
            }
        }
        Ok(expr)
    }

    fn parse_lhs_expr(&mut self) -> PResult<Expr> {
        let mut expr = if self.check(&TokenKind::New) {
            self.parse_new_expr()?
        } else {
            self.parse_primary()?
        };
        loop {
            expr = match &self.peek().kind {
                TokenKind::Dot => {
                    self.advance();
                    let name = self.ident_name()?;
                    Expr::Member { object: Box::new(expr), property: MemberProperty::Ident(name), optional: false }
                }
                TokenKind::QuestionDot => {
                    self.advance();
                    if self.check(&TokenKind::LParen) {
                        let args = self.parse_arguments()?;
                        Expr::Call { callee: Box::new(expr), args, optional: true }
                    } else if self.eat(&TokenKind::LBracket) {
                        let prop = self.parse_expression()?;
                        self.expect(&TokenKind::RBracket, "']'")?;
                        Expr::Member { object: Box::new(expr), property: MemberProperty::Computed(Box::new(prop)), optional: true }
                    } else {
                        let name = self.ident_name()?;
                        Expr::Member { object: Box::new(expr), property: MemberProperty::Ident(name), optional: true }
                    }
                }
                TokenKind::LBracket => {
                    self.advance();
                    let prop = self.parse_expression()?;
                    self.expect(&TokenKind::RBracket, "']'")?;
                    Expr::Member { object: Box::new(expr), property: MemberProperty::Computed(Box::new(prop)), optional: false }
                }
                TokenKind::LParen => {
                    let args = self.parse_arguments()?;
                    Expr::Call { callee: Box::new(expr), args, optional: false }
                }
                _ => break,
            };
        }
        Ok(expr)
    }

    fn parse_new_expr(&mut self) -> PResult<Expr> {
        self.advance();
        let callee = self.parse_member_only()?;
        let args = if self.check(&TokenKind::LParen) { self.parse_arguments()? } else { Vec::new() };
        Ok(Expr::New { callee: Box::new(callee), args })
    }

    /// `new`'s callee: member expressions only (no call expressions), so
    /// `new a.b.c(x)` parses `a.b.c` as the constructor.
    fn parse_member_only(&mut self) -> PResult<Expr> {
        let mut expr = if self.check(&TokenKind::New) { self.parse_new_expr()? } else { self.parse_primary()? };
        loop {
            expr = match &self.peek().kind {
                TokenKind::Dot => {
                    self.advance();
                    let name = self.ident_name()?;
                    Expr::Member { object: Box::new(expr), property: MemberProperty::Ident(name), optional: false }
                }
                TokenKind::LBracket => {
                    self.advance();
                    let prop = self.parse_expression()?;
                    self.expect(&TokenKind::RBracket, "']'")?;
                    Expr::Member { object: Box::new(expr), property: MemberProperty::Computed(Box::new(prop)), optional: false }
                }
                _ => break,
            };
        }
        Ok(expr)
    }

    fn parse_arguments(&mut self) -> PResult<Vec<Argument>> {
        self.expect(&TokenKind::LParen, "'('")?;
        let mut args = Vec::new();
        while !self.check(&TokenKind::RParen) {
            if self.eat(&TokenKind::DotDotDot) {
                args.push(Argument::Spread(self.parse_assignment_expr()?));
            } else {
                args.push(Argument::Normal(self.parse_assignment_expr()?));
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen, "')'")?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::Number(n) => { self.advance(); Ok(Expr::Number(n)) }
            TokenKind::BigIntLiteral(s) => { self.advance(); Ok(Expr::BigInt(s)) }
            TokenKind::String(s) => { self.advance(); Ok(Expr::String(s)) }
            TokenKind::True => { self.advance(); Ok(Expr::Bool(true)) }
            TokenKind::False => { self.advance(); Ok(Expr::Bool(false)) }
            TokenKind::Null => { self.advance(); Ok(Expr::Null) }
            TokenKind::Undefined => { self.advance(); Ok(Expr::Undefined) }
            TokenKind::This => { self.advance(); Ok(Expr::This) }
            TokenKind::Super => { self.advance(); Ok(Expr::Super) }
            TokenKind::Regex { body, flags } => { self.advance(); Ok(Expr::Regex { body, flags }) }
            TokenKind::TemplateLiteral { quasis, raw_quasis, expr_sources } => {
                self.advance();
                let mut exprs = Vec::new();
                for src in &expr_sources {
                    exprs.push(Parser::parse_expression_standalone(src).map_err(|e| self.error(e.message))?);
                }
                if matches!(self.peek().kind, TokenKind::LParen) {
                    // Handled by caller via call-position check; plain
                    // templates never reach here with a tag.
                }
                let _ = raw_quasis;
                Ok(Expr::Template { quasis, exprs })
            }
            TokenKind::Ident(name) => { self.advance(); Ok(Expr::Ident(name)) }
            TokenKind::Of => { self.advance(); Ok(Expr::Ident("of".into())) }
            TokenKind::From => { self.advance(); Ok(Expr::Ident("from".into())) }
            TokenKind::Get => { self.advance(); Ok(Expr::Ident("get".into())) }
            TokenKind::Set => { self.advance(); Ok(Expr::Ident("set".into())) }
            TokenKind::Static => { self.advance(); Ok(Expr::Ident("static".into())) }
            TokenKind::Yield => {
                self.advance();
                let arg = if self.check(&TokenKind::Semicolon) || self.check(&TokenKind::RParen) || self.peek().preceded_by_newline {
                    None
                } else {
                    Some(Box::new(self.parse_assignment_expr()?))
                };
                Ok(Expr::Unary { op: UnaryOp::Void, argument: arg.unwrap_or_else(|| Box::new(Expr::Undefined)), prefix: true })
            }
            TokenKind::Await => {
                self.advance();
                let arg = Box::new(self.parse_unary()?);
                Ok(Expr::Unary { op: UnaryOp::Void, argument: arg, prefix: true })
            }
            TokenKind::Function => Ok(Expr::Function(Rc::new(self.parse_function(false, true)?))),
            TokenKind::Async if matches!(self.peek_at(1).kind, TokenKind::Function) => {
                self.advance();
                Ok(Expr::Function(Rc::new(self.parse_function(true, true)?)))
            }
            TokenKind::Class => Ok(Expr::Class(Rc::new(self.parse_class()?))),
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(&TokenKind::RParen, "')'")?;
                Ok(expr)
            }
            TokenKind::LBracket => self.parse_array_literal(),
            TokenKind::LBrace => self.parse_object_literal(),
            _ => Err(self.error(format!("unexpected token {:?}", tok.kind))),
        }
    }

    fn parse_array_literal(&mut self) -> PResult<Expr> {
        self.expect(&TokenKind::LBracket, "'['")?;
        let mut elems = Vec::new();
        while !self.check(&TokenKind::RBracket) {
            if self.check(&TokenKind::Comma) {
                self.advance();
                elems.push(None);
                continue;
            }
            if self.eat(&TokenKind::DotDotDot) {
                elems.push(Some(ArrayElement::Spread(self.parse_assignment_expr()?)));
            } else {
                elems.push(Some(ArrayElement::Item(self.parse_assignment_expr()?)));
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RBracket, "']'")?;
        Ok(Expr::Array(elems))
    }

    fn parse_object_literal(&mut self) -> PResult<Expr> {
        self.expect(&TokenKind::LBrace, "'{'")?;
        let mut props = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            if self.eat(&TokenKind::DotDotDot) {
                props.push(ObjectProp::Spread(self.parse_assignment_expr()?));
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
                continue;
            }
            let is_getter = matches!(self.peek().kind, TokenKind::Get) && !matches!(self.peek_at(1).kind, TokenKind::Colon | TokenKind::Comma | TokenKind::RBrace | TokenKind::LParen);
            let is_setter = matches!(self.peek().kind, TokenKind::Set) && !matches!(self.peek_at(1).kind, TokenKind::Colon | TokenKind::Comma | TokenKind::RBrace | TokenKind::LParen);
            if is_getter || is_setter {
                self.advance();
                let (key, _) = self.parse_property_key()?;
                let params = self.parse_param_list()?;
                let span = self.peek().span;
                let body = FunctionBody::Block(self.parse_block()?);
                let func = Rc::new(Function { name: None, params, body, is_arrow: false, is_async: false, is_generator: false, strict: false, span });
                props.push(if is_getter { ObjectProp::Getter { key, function: func } } else { ObjectProp::Setter { key, function: func } });
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
                continue;
            }
            let (key, _computed) = self.parse_property_key()?;
            if self.check(&TokenKind::LParen) {
                let span = self.peek().span;
                let params = self.parse_param_list()?;
                let body = FunctionBody::Block(self.parse_block()?);
                let func = Rc::new(Function { name: None, params, body, is_arrow: false, is_async: false, is_generator: false, strict: false, span });
                props.push(ObjectProp::Method { key, function: func });
            } else if self.eat(&TokenKind::Colon) {
                let value = self.parse_assignment_expr()?;
                props.push(ObjectProp::KeyValue { key, value, shorthand: false });
            } else if let PropertyKeyNode::Ident(name) = &key {
                props.push(ObjectProp::KeyValue { key: key.clone(), value: Expr::Ident(name.clone()), shorthand: true });
            } else {
                return Err(self.error("expected ':' in object literal"));
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RBrace, "'}'")?;
        Ok(Expr::Object(props))
    }
}

fn assign_op_from(kind: &TokenKind) -> Option<AssignOp> {
    use TokenKind as T;
    Some(match kind {
        T::Assign => AssignOp::Assign,
        T::PlusAssign => AssignOp::Add,
        T::MinusAssign => AssignOp::Sub,
        T::StarAssign => AssignOp::Mul,
        T::SlashAssign => AssignOp::Div,
        T::PercentAssign => AssignOp::Mod,
        T::StarStarAssign => AssignOp::Pow,
        T::ShlAssign => AssignOp::Shl,
        T::ShrAssign => AssignOp::Shr,
        T::UShrAssign => AssignOp::UShr,
        T::AmpAssign => AssignOp::BitAnd,
        T::PipeAssign => AssignOp::BitOr,
        T::CaretAssign => AssignOp::BitXor,
        T::AndAssign => AssignOp::And,
        T::OrAssign => AssignOp::Or,
        T::NullishAssign => AssignOp::Nullish,
        _ => return None,
    })
}

/// Convert an already-parsed expression into a binding pattern, used by
/// `for (x in obj)`/`for (x of iter)` when the loop variable wasn't
/// introduced with `var`/`let`/`const` (it must already be a valid
/// assignment target: an identifier or member expression).
fn expr_to_pattern(expr: &Expr) -> Option<Pattern> {
    match expr {
        Expr::Ident(name) => Some(Pattern::Ident(name.clone())),
        _ => None,
    }
}

/// Detects a `"use strict"` (or `'use strict'`) directive as the very
/// first statement of the program (spec.md §4.1).
fn is_strict_prologue(source: &str) -> bool {
    let trimmed = source.trim_start();
    trimmed.starts_with("\"use strict\"") || trimmed.starts_with("'use strict'")
}
