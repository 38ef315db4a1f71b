//! Recursive-descent parser over the offside-tracking token cursor.
//!
//! Errors inside a declaration are recorded and the parser fast-forwards to
//! the next column-1 token; errors in the module header abort the file.

pub mod cursor;
pub mod operators;

use crate::diagnostics::{Diagnostic, Severity, Span};
use crate::lexer::{starts_lower, Lexer, Token, TokenKind, TokenValue};
use crate::messages;
use crate::label_map::LabelMap;
use crate::surface::{
    DeclarationRef, Import, RefTag, SBinder, SCase, SDataCtor, SDecl, SExpr, SLetDef,
    SModule, SPattern, SSignature, SType, STypeDecl, STypealias, SValDecl, Spanned, Visibility,
};

use self::cursor::{mismatched_indentation, ParseErr, ParseResult, TokenCursor};
use self::operators::parse_application;

pub struct Parser {
    cursor: TokenCursor,
    source_name: String,
    module_name: Option<String>,
    errors: Vec<Diagnostic>,
}

pub fn parse_source(name: &str, source: &str) -> (Option<SModule>, Vec<Diagnostic>) {
    let mut parser = Parser::new(Lexer::new(name, source));
    parser.parse_full_module()
}

fn statement_ending(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::RParen
            | TokenKind::RSBracket
            | TokenKind::RBracket
            | TokenKind::Else
            | TokenKind::In
            | TokenKind::Eof
            | TokenKind::Comma
    )
}

impl Parser {
    pub fn new(lexer: Lexer) -> Parser {
        let source_name = lexer.name.clone();
        Parser {
            cursor: TokenCursor::new(lexer),
            source_name,
            module_name: None,
            errors: Vec::new(),
        }
    }

    /// Parses one whole source file. Header failures are fatal for the file;
    /// declaration failures are collected and parsing resumes at the next
    /// declaration.
    pub fn parse_full_module(mut self) -> (Option<SModule>, Vec<Diagnostic>) {
        match self.parse_module_header() {
            Ok(mut module) => {
                self.parse_declarations(&mut module.decls);
                (Some(module), self.errors)
            }
            Err(err) => {
                let diag = self.diag(err, Severity::Fatal);
                self.errors.push(diag);
                (None, self.errors)
            }
        }
    }

    fn parse_module_header(&mut self) -> ParseResult<SModule> {
        let module_tok = self.expect(TokenKind::Module, messages::MODULE_DEFINITION)?;
        let name = self.parse_module_name()?;
        self.module_name = Some(name.val.clone());

        let mut imports = Vec::new();
        while self.peek_kind()? == TokenKind::Import {
            imports.push(self.parse_import()?);
        }

        Ok(SModule {
            span: Span::new(module_tok.span, name.span),
            name,
            source_name: self.source_name.clone(),
            imports,
            decls: Vec::new(),
            comment: module_tok.comment,
            resolved_imports: Default::default(),
            resolved_aliases: Vec::new(),
        })
    }

    fn parse_module_name(&mut self) -> ParseResult<Spanned<String>> {
        let segments = self.between(TokenKind::Dot, |p| {
            p.expect(TokenKind::Ident, messages::MODULE_NAME)
        })?;
        for segment in &segments {
            let text = segment.text.as_deref().unwrap_or("");
            if text.ends_with('?') || text.ends_with('!') || !starts_lower(text) {
                return Err(ParseErr {
                    msg: messages::MODULE_NAME.to_string(),
                    span: segment.span,
                });
            }
        }
        let span = Span::new(segments[0].span, segments[segments.len() - 1].span);
        let name = segments
            .iter()
            .map(|t| t.text.clone().unwrap_or_default())
            .collect::<Vec<_>>()
            .join(".");
        Ok(Spanned::new(name, span))
    }

    fn parse_import(&mut self) -> ParseResult<Import> {
        let import_tok = self.expect(TokenKind::Import, "unreachable")?;
        let module = self.parse_module_name()?;
        let mut defs = Vec::new();
        let mut alias = None;

        if self.peek_kind()? == TokenKind::LParen {
            defs = self.parse_declaration_refs()?;
        }
        if self.peek_kind()? == TokenKind::As {
            self.cursor.next()?;
            let alias_tok = self.expect(TokenKind::UpperIdent, messages::IMPORT_ALIAS)?;
            alias = alias_tok.text;
        }

        Ok(Import {
            module,
            span: Span::new(import_tok.span, self.cursor.current_span()),
            alias,
            comment: import_tok.comment,
            defs,
        })
    }

    fn parse_declaration_refs(&mut self) -> ParseResult<Vec<DeclarationRef>> {
        self.expect(TokenKind::LParen, &messages::lparens_expected("import"))?;
        if self.peek_kind()? == TokenKind::RParen {
            let span = self.cursor.peek()?.span;
            return Err(ParseErr {
                msg: messages::empty_import("Import"),
                span,
            });
        }

        let refs = self.between(TokenKind::Comma, |p| p.parse_declaration_ref())?;
        self.expect(TokenKind::RParen, &messages::rparens_expected("import"))?;
        Ok(refs)
    }

    fn parse_declaration_ref(&mut self) -> ParseResult<DeclarationRef> {
        let tok = self.cursor.next()?;
        match tok.kind {
            TokenKind::Ident | TokenKind::Op => Ok(DeclarationRef {
                tag: RefTag::Var,
                name: Spanned::new(tok.text.clone().unwrap_or_default(), tok.span),
                span: tok.span,
                ctors: Vec::new(),
                all: false,
            }),
            TokenKind::UpperIdent => {
                let binder = Spanned::new(tok.text.clone().unwrap_or_default(), tok.span);
                if self.peek_kind()? != TokenKind::LParen {
                    return Ok(DeclarationRef {
                        tag: RefTag::Type,
                        span: binder.span,
                        name: binder,
                        ctors: Vec::new(),
                        all: false,
                    });
                }
                self.cursor.next()?;
                let mut ctors = Vec::new();
                let mut all = false;
                if self.peek_kind()? == TokenKind::Op {
                    let op = self.expect(TokenKind::Op, messages::DECLARATION_REF_ALL)?;
                    if op.text.as_deref() != Some("..") {
                        return Err(ParseErr {
                            msg: messages::DECLARATION_REF_ALL.to_string(),
                            span: op.span,
                        });
                    }
                    all = true;
                } else {
                    ctors = self
                        .between(TokenKind::Comma, |p| {
                            p.expect(TokenKind::UpperIdent, messages::CTOR_NAME)
                        })?
                        .into_iter()
                        .map(|t| Spanned::new(t.text.unwrap_or_default(), t.span))
                        .collect();
                }
                let end = self.expect(TokenKind::RParen, messages::DECLARATION_REF_ALL)?;
                Ok(DeclarationRef {
                    tag: RefTag::Type,
                    name: binder,
                    span: Span::new(tok.span, end.span),
                    ctors,
                    all,
                })
            }
            _ => Err(ParseErr {
                msg: messages::IMPORT_REFER.to_string(),
                span: tok.span,
            }),
        }
    }

    ///////////////////////////////////////////////
    // declarations
    ///////////////////////////////////////////////

    fn parse_declarations(&mut self, decls: &mut Vec<SDecl>) {
        loop {
            match self.parse_decl() {
                Ok(Some(decl)) => decls.push(decl),
                Ok(None) => break,
                Err(err) => {
                    let diag = self.diag(err, Severity::Error);
                    self.errors.push(diag);
                    if self.fast_forward().is_err() {
                        break;
                    }
                }
            }
        }
    }

    fn parse_decl(&mut self) -> ParseResult<Option<SDecl>> {
        if self.peek_kind()? == TokenKind::Eof {
            return Ok(None);
        }
        self.skip_metadata()?;

        let first = self.cursor.peek()?.clone();
        let mut visibility = None;
        let mut vis_plus = false;
        match first.kind {
            TokenKind::Public => {
                self.cursor.next()?;
                visibility = Some(Visibility::Public);
            }
            TokenKind::PublicPlus => {
                self.cursor.next()?;
                visibility = Some(Visibility::Public);
                vis_plus = true;
            }
            _ => {}
        }

        let mut is_instance = false;
        if self.peek_kind()? == TokenKind::Instance {
            self.cursor.next()?;
            is_instance = true;
        }

        let comment = first.comment.clone();
        let tok = self.cursor.peek()?.clone();
        match tok.kind {
            TokenKind::Type => {
                if is_instance {
                    return Err(ParseErr {
                        msg: messages::INSTANCE_ERROR.to_string(),
                        span: tok.span,
                    });
                }
                let decl = self.parse_type_decl(visibility, vis_plus, comment)?;
                Ok(Some(SDecl::Type(decl)))
            }
            TokenKind::Typealias => {
                if is_instance {
                    return Err(ParseErr {
                        msg: messages::INSTANCE_ERROR.to_string(),
                        span: tok.span,
                    });
                }
                if vis_plus {
                    let diag =
                        self.make_diag(messages::PUB_PLUS.to_string(), first.span, Severity::Error);
                    self.errors.push(diag);
                }
                let decl = self.parse_typealias(visibility, comment)?;
                Ok(Some(SDecl::Typealias(decl)))
            }
            TokenKind::Ident | TokenKind::LParen => {
                if vis_plus {
                    let diag =
                        self.make_diag(messages::PUB_PLUS.to_string(), first.span, Severity::Error);
                    self.errors.push(diag);
                }
                let decl = self.parse_val_decl(visibility, is_instance, comment)?;
                Ok(Some(SDecl::Val(decl)))
            }
            TokenKind::Op => Err(ParseErr {
                msg: messages::INVALID_OPERATOR_DECL.to_string(),
                span: tok.span,
            }),
            TokenKind::Eof => Ok(None),
            _ => Err(ParseErr {
                msg: messages::TOPLEVEL_IDENT.to_string(),
                span: tok.span,
            }),
        }
    }

    fn skip_metadata(&mut self) -> ParseResult<()> {
        while self.peek_kind()? == TokenKind::MetaBracket {
            self.cursor.next()?;
            let mut depth = 1usize;
            while depth > 0 {
                let tok = self.with_ignore_offside(true, |p| p.cursor.next())?;
                match tok.kind {
                    TokenKind::MetaBracket | TokenKind::LSBracket => depth += 1,
                    TokenKind::RSBracket => depth -= 1,
                    TokenKind::Eof => {
                        return Err(ParseErr {
                            msg: messages::rsbracket_expected("metadata"),
                            span: tok.span,
                        })
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    fn parse_type_decl(
        &mut self,
        visibility: Option<Visibility>,
        vis_plus: bool,
        comment: Option<crate::lexer::Comment>,
    ) -> ParseResult<STypeDecl> {
        let type_tok = self.expect(TokenKind::Type, "unreachable")?;
        let vis = visibility.unwrap_or(Visibility::Private);
        let ctor_vis = if vis_plus { Visibility::Public } else { Visibility::Private };

        let name = self.expect(TokenKind::UpperIdent, messages::DATA_NAME)?;
        self.with_offside(2, |p| {
            let mut ty_vars = Vec::new();
            while p.peek_kind()? == TokenKind::Ident {
                ty_vars.push(p.parse_type_var()?);
            }
            p.expect(TokenKind::Equals, messages::DATA_EQUALS)?;

            let ctors = p.between(TokenKind::Pipe, |p| p.parse_data_ctor(ctor_vis))?;
            Ok(STypeDecl {
                binder: Spanned::new(name.text.clone().unwrap_or_default(), name.span),
                visibility: vis,
                ty_vars,
                data_ctors: ctors,
                span: Span::new(type_tok.span, p.cursor.current_span()),
                comment,
            })
        })
    }

    fn parse_data_ctor(&mut self, visibility: Visibility) -> ParseResult<SDataCtor> {
        let name = self.expect(TokenKind::UpperIdent, messages::CTOR_NAME)?;
        let args = self.try_parse_list_of(true, |p| p.try_parse_type_atom(true))?;
        Ok(SDataCtor {
            name: Spanned::new(name.text.clone().unwrap_or_default(), name.span),
            span: Span::new(name.span, self.cursor.current_span()),
            args,
            visibility,
        })
    }

    fn parse_typealias(
        &mut self,
        visibility: Option<Visibility>,
        comment: Option<crate::lexer::Comment>,
    ) -> ParseResult<STypealias> {
        let alias_tok = self.expect(TokenKind::Typealias, "unreachable")?;
        let name = self.expect(TokenKind::UpperIdent, messages::TYPEALIAS_NAME)?;
        self.with_offside(2, |p| {
            let mut ty_vars = Vec::new();
            while p.peek_kind()? == TokenKind::Ident {
                ty_vars.push(p.parse_type_var()?);
            }
            p.expect(TokenKind::Equals, messages::TYPEALIAS_EQUALS)?;
            let ty = p.parse_type(false)?;
            Ok(STypealias {
                name: name.text.clone().unwrap_or_default(),
                ty_vars,
                span: Span::new(alias_tok.span, ty.span()),
                ty,
                visibility: visibility.unwrap_or(Visibility::Private),
                comment,
                expanded: None,
                free_vars: Vec::new(),
            })
        })
    }

    fn parse_decl_name(&mut self) -> ParseResult<(Spanned<String>, bool)> {
        if self.peek_kind()? == TokenKind::LParen {
            let start = self.cursor.next()?;
            let op = self.expect(TokenKind::Op, messages::OPERATOR)?;
            let end = self.expect(
                TokenKind::RParen,
                &messages::rparens_expected("operator declaration"),
            )?;
            let span = Span::new(start.span, end.span);
            return Ok((Spanned::new(op.text.unwrap_or_default(), span), true));
        }
        let name = self.expect(TokenKind::Ident, messages::VARIABLE)?;
        Ok((
            Spanned::new(name.text.unwrap_or_default(), name.span),
            false,
        ))
    }

    fn parse_val_decl(
        &mut self,
        visibility: Option<Visibility>,
        is_instance: bool,
        comment: Option<crate::lexer::Comment>,
    ) -> ParseResult<SValDecl> {
        let (name, is_operator) = self.parse_decl_name()?;

        let signature = if self.peek_kind()? == TokenKind::Colon {
            let sig = self.with_offside(2, |p| p.parse_type_signature())?;
            let sig = SSignature {
                span: sig.span(),
                ty: sig,
            };
            // the definition itself has to follow the type declaration
            let (again, _) = match self.peek_kind()? {
                TokenKind::Ident | TokenKind::LParen => self.parse_decl_name()?,
                _ => {
                    return Err(ParseErr {
                        msg: messages::expected_definition(&name.val),
                        span: self.cursor.peek()?.span,
                    })
                }
            };
            if again.val != name.val {
                return Err(ParseErr {
                    msg: messages::expected_definition(&name.val),
                    span: again.span,
                });
            }
            Some(sig)
        } else {
            None
        };

        self.with_offside(2, |p| {
            let pats = p.try_parse_list_of(false, |p| p.try_parse_pattern(true))?;
            let equals = p.expect(TokenKind::Equals, &messages::equals_expected("declaration"))?;

            let exp = if equals.span.same_line(&p.cursor.peek()?.span) {
                p.parse_expression(false)?
            } else {
                p.parse_do()?
            };

            Ok(SValDecl {
                span: Span::new(name.span, exp.span()),
                binder: name,
                pats,
                exp,
                signature,
                visibility: visibility.unwrap_or(Visibility::Private),
                is_instance,
                is_operator,
                comment,
            })
        })
    }

    ///////////////////////////////////////////////
    // expressions
    ///////////////////////////////////////////////

    fn parse_expression(&mut self, in_do: bool) -> ParseResult<SExpr> {
        let start = self.cursor.peek()?.span;
        // atoms on following lines must sit deeper than the statement column,
        // so a token at the block offside starts the next statement instead
        let exps = self.try_parse_list_of(true, |p| p.try_parse_atom(in_do))?;
        if exps.is_empty() {
            return Err(ParseErr {
                msg: messages::MALFORMED_EXPR.to_string(),
                span: start,
            });
        }

        if exps.len() > 1 && exps.iter().any(|e| matches!(e, SExpr::DoLet { .. })) {
            return Err(ParseErr {
                msg: messages::APPLIED_DO_LET.to_string(),
                span: start,
            });
        }

        let exp = match parse_application(exps) {
            Some(exp) => exp,
            None => {
                return Err(ParseErr {
                    msg: messages::MALFORMED_EXPR.to_string(),
                    span: Span::new(start, self.cursor.current_span()),
                })
            }
        };

        // type annotations and casts bind loosest
        match self.peek_kind()? {
            TokenKind::Colon => {
                self.cursor.next()?;
                let ty = self.parse_type(false)?;
                Ok(SExpr::Ann {
                    span: Span::new(exp.span(), ty.span()),
                    exp: Box::new(exp),
                    ty,
                })
            }
            TokenKind::As => {
                self.cursor.next()?;
                let ty = self.parse_type(false)?;
                Ok(SExpr::TypeCast {
                    span: Span::new(exp.span(), ty.span()),
                    exp: Box::new(exp),
                    cast: ty,
                })
            }
            _ => Ok(exp),
        }
    }

    fn try_parse_atom(&mut self, in_do: bool) -> ParseResult<Option<SExpr>> {
        let tok = self.cursor.peek()?.clone();
        let exp = match tok.kind {
            TokenKind::Int => {
                let t = self.cursor.next()?;
                let v = match t.value {
                    Some(TokenValue::Int(v)) => v,
                    _ => unreachable!("int token without value"),
                };
                SExpr::Int {
                    v,
                    text: t.text.unwrap_or_default(),
                    span: t.span,
                }
            }
            TokenKind::Float => {
                let t = self.cursor.next()?;
                let v = match t.value {
                    Some(TokenValue::Float(v)) => v,
                    _ => unreachable!("float token without value"),
                };
                SExpr::Float {
                    v,
                    text: t.text.unwrap_or_default(),
                    span: t.span,
                }
            }
            TokenKind::Complex => {
                let t = self.cursor.next()?;
                let (re, im) = match t.value {
                    Some(TokenValue::Complex(re, im)) => (re, im),
                    _ => unreachable!("complex token without value"),
                };
                SExpr::Complex {
                    re,
                    im,
                    text: t.text.unwrap_or_default(),
                    span: t.span,
                }
            }
            TokenKind::Str => {
                let t = self.cursor.next()?;
                let v = match t.value {
                    Some(TokenValue::Str(v)) => v,
                    _ => unreachable!("string token without value"),
                };
                SExpr::Str {
                    v,
                    raw: t.text.unwrap_or_default(),
                    multi: false,
                    span: t.span,
                }
            }
            TokenKind::MultilineStr => {
                let t = self.cursor.next()?;
                let v = match t.value {
                    Some(TokenValue::Str(v)) => v,
                    _ => unreachable!("string token without value"),
                };
                SExpr::Str {
                    raw: v.clone(),
                    v,
                    multi: true,
                    span: t.span,
                }
            }
            TokenKind::PatternStr => {
                let t = self.cursor.next()?;
                let v = match t.value {
                    Some(TokenValue::Str(v)) => v,
                    _ => unreachable!("pattern token without value"),
                };
                SExpr::PatternLiteral {
                    raw: v.clone(),
                    regex: v,
                    span: t.span,
                }
            }
            TokenKind::Char => {
                let t = self.cursor.next()?;
                let v = match t.value {
                    Some(TokenValue::Char(v)) => v,
                    _ => unreachable!("char token without value"),
                };
                SExpr::Char {
                    v,
                    raw: t.text.unwrap_or_default(),
                    span: t.span,
                }
            }
            TokenKind::Bool => {
                let t = self.cursor.next()?;
                let v = match t.value {
                    Some(TokenValue::Bool(v)) => v,
                    _ => unreachable!("bool token without value"),
                };
                SExpr::Bool { v, span: t.span }
            }
            TokenKind::Ident => {
                let t = self.cursor.next()?;
                SExpr::Var {
                    name: t.text.unwrap_or_default(),
                    alias: None,
                    span: t.span,
                }
            }
            TokenKind::Op => {
                let t = self.cursor.next()?;
                SExpr::Operator {
                    name: t.text.unwrap_or_default(),
                    alias: None,
                    span: t.span,
                }
            }
            TokenKind::Nil => {
                let t = self.cursor.next()?;
                SExpr::Nil { span: t.span }
            }
            TokenKind::Semicolon => {
                let t = self.cursor.next()?;
                SExpr::Operator {
                    name: ";".to_string(),
                    alias: None,
                    span: t.span,
                }
            }
            TokenKind::Underline => {
                let t = self.cursor.next()?;
                if self.peek_kind()? == TokenKind::BangBang {
                    let bb = self.cursor.next()?;
                    let span = Span::new(t.span, bb.span);
                    let unwrap = SExpr::Var {
                        name: "unwrapOption".to_string(),
                        alias: None,
                        span: bb.span,
                    };
                    let v = SExpr::Var {
                        name: "__unw".to_string(),
                        alias: None,
                        span: t.span,
                    };
                    let body = SExpr::App {
                        func: Box::new(unwrap),
                        arg: Box::new(v),
                        span,
                    };
                    SExpr::Lambda {
                        pats: vec![SPattern::Var {
                            name: "__unw".to_string(),
                            span: t.span,
                        }],
                        body: Box::new(body),
                        span,
                    }
                } else {
                    SExpr::Underscore { span: t.span }
                }
            }
            TokenKind::LParen => self.with_ignore_offside(true, |p| {
                let open = p.cursor.next()?;
                if p.peek_kind()? == TokenKind::RParen {
                    let end = p.cursor.next()?;
                    return Ok(SExpr::Unit {
                        span: Span::new(open.span, end.span),
                    });
                }
                let exp = p.parse_expression(false)?;
                let end = p.expect(TokenKind::RParen, &messages::rparens_expected("expression"))?;
                Ok(SExpr::Parens {
                    exp: Box::new(exp),
                    span: Span::new(open.span, end.span),
                })
            })?,
            TokenKind::UpperIdent => {
                let upper = self.cursor.next()?;
                let peeked = self.cursor.peek()?.clone();
                if peeked.kind == TokenKind::Dot {
                    self.parse_aliased_var(&upper)?
                } else if peeked.is_dot_start() {
                    // a module-aliased operator like `MyModule.==`
                    let op = self.expect(TokenKind::Op, "unreachable")?;
                    let name = op.text.clone().unwrap_or_default();
                    SExpr::Operator {
                        name: name[1..].to_string(),
                        alias: upper.text.clone(),
                        span: Span::new(upper.span, op.span),
                    }
                } else if peeked.kind == TokenKind::Hash || peeked.kind == TokenKind::HashDash {
                    return Err(ParseErr {
                        msg: messages::FOREIGN_UNSUPPORTED.to_string(),
                        span: peeked.span,
                    });
                } else {
                    SExpr::Ctor {
                        name: upper.text.clone().unwrap_or_default(),
                        alias: None,
                        span: upper.span,
                    }
                }
            }
            TokenKind::Backslash => self.parse_lambda()?,
            TokenKind::If => self.parse_if()?,
            TokenKind::Let => self.parse_let(in_do, false)?,
            TokenKind::LetBang => self.parse_let(in_do, true)?,
            TokenKind::Case => self.parse_match()?,
            TokenKind::While => self.parse_while()?,
            TokenKind::DoDot => self.parse_computation()?,
            TokenKind::DoBang => {
                let t = self.cursor.next()?;
                let exp = self.parse_expression(false)?;
                SExpr::DoBang {
                    span: Span::new(t.span, exp.span()),
                    exp: Box::new(exp),
                }
            }
            TokenKind::Return => {
                let t = self.cursor.next()?;
                let exp = self.parse_expression(false)?;
                SExpr::Return {
                    span: Span::new(t.span, exp.span()),
                    exp: Box::new(exp),
                }
            }
            TokenKind::Yield => {
                let t = self.cursor.next()?;
                let exp = self.parse_expression(false)?;
                SExpr::Yield {
                    span: Span::new(t.span, exp.span()),
                    exp: Box::new(exp),
                }
            }
            TokenKind::For => self.parse_for()?,
            TokenKind::LBracket => self.parse_record()?,
            TokenKind::LSBracket => self.with_ignore_offside(true, |p| {
                let open = p.cursor.next()?;
                if p.peek_kind()? == TokenKind::RSBracket {
                    let end = p.cursor.next()?;
                    return Ok(SExpr::ListLiteral {
                        exps: Vec::new(),
                        span: Span::new(open.span, end.span),
                    });
                }
                let exps = p.between(TokenKind::Comma, |p| p.parse_expression(false))?;
                let end = p.expect(
                    TokenKind::RSBracket,
                    &messages::rsbracket_expected("list literal"),
                )?;
                Ok(SExpr::ListLiteral {
                    exps,
                    span: Span::new(open.span, end.span),
                })
            })?,
            TokenKind::SetBracket => self.with_ignore_offside(true, |p| {
                let open = p.cursor.next()?;
                if p.peek_kind()? == TokenKind::RBracket {
                    let end = p.cursor.next()?;
                    return Ok(SExpr::SetLiteral {
                        exps: Vec::new(),
                        span: Span::new(open.span, end.span),
                    });
                }
                let exps = p.between(TokenKind::Comma, |p| p.parse_expression(false))?;
                let end = p.expect(
                    TokenKind::RBracket,
                    &messages::rbracket_expected("set literal"),
                )?;
                Ok(SExpr::SetLiteral {
                    exps,
                    span: Span::new(open.span, end.span),
                })
            })?,
            TokenKind::Hash | TokenKind::HashDash => {
                return Err(ParseErr {
                    msg: messages::FOREIGN_UNSUPPORTED.to_string(),
                    span: tok.span,
                })
            }
            _ => return Ok(None),
        };
        Ok(Some(self.parse_selection(exp)?))
    }

    /// Chains postfix selections after an atom: `.label`, `.[index]` and `!!`.
    fn parse_selection(&mut self, exp: SExpr) -> ParseResult<SExpr> {
        if exp.is_operator() {
            return Ok(exp);
        }
        let mut exp = exp;
        loop {
            match self.peek_kind()? {
                TokenKind::Dot => {
                    let mut labels = Vec::new();
                    while self.peek_kind()? == TokenKind::Dot {
                        self.cursor.next()?;
                        labels.push(self.parse_label()?);
                    }
                    let span = Span::new(exp.span(), labels[labels.len() - 1].span);
                    exp = SExpr::RecordSelect {
                        exp: Box::new(exp),
                        labels,
                        span,
                    };
                }
                TokenKind::DotBracket => {
                    self.cursor.next()?;
                    let index = self.with_ignore_offside(true, |p| {
                        let index = p.parse_expression(false)?;
                        p.expect(TokenKind::RSBracket, &messages::rsbracket_expected("index"))?;
                        Ok(index)
                    })?;
                    let span = Span::new(exp.span(), self.cursor.current_span());
                    exp = SExpr::Index {
                        exp: Box::new(exp),
                        index: Box::new(index),
                        span,
                    };
                }
                TokenKind::BangBang => {
                    let bb = self.cursor.next()?;
                    let span = Span::new(exp.span(), bb.span);
                    exp = SExpr::App {
                        func: Box::new(SExpr::Var {
                            name: "unwrapOption".to_string(),
                            alias: None,
                            span: bb.span,
                        }),
                        arg: Box::new(exp),
                        span,
                    };
                }
                TokenKind::Hash | TokenKind::HashDash => {
                    let tok = self.cursor.peek()?.span;
                    return Err(ParseErr {
                        msg: messages::FOREIGN_UNSUPPORTED.to_string(),
                        span: tok,
                    });
                }
                _ => break,
            }
        }
        Ok(exp)
    }

    fn parse_aliased_var(&mut self, alias: &Token) -> ParseResult<SExpr> {
        self.expect(TokenKind::Dot, "unreachable")?;
        if self.peek_kind()? == TokenKind::Ident {
            let ident = self.expect(TokenKind::Ident, messages::IMPORTED_DOT)?;
            return Ok(SExpr::Var {
                name: ident.text.unwrap_or_default(),
                alias: alias.text.clone(),
                span: Span::new(alias.span, ident.span),
            });
        }
        let ident = self.expect(TokenKind::UpperIdent, messages::IMPORTED_DOT)?;
        Ok(SExpr::Ctor {
            name: ident.text.unwrap_or_default(),
            alias: alias.text.clone(),
            span: Span::new(alias.span, ident.span),
        })
    }

    fn parse_lambda(&mut self) -> ParseResult<SExpr> {
        let begin = self.expect(TokenKind::Backslash, messages::LAMBDA_BACKSLASH)?;

        let pats = self.try_parse_list_of(false, |p| p.try_parse_pattern(true))?;
        if pats.is_empty() {
            return Err(ParseErr {
                msg: messages::LAMBDA_VAR.to_string(),
                span: self.cursor.current_span(),
            });
        }

        let arrow = self.expect(TokenKind::Arrow, messages::LAMBDA_ARROW)?;
        let body = if arrow.span.same_line(&self.cursor.peek()?.span) {
            self.parse_expression(false)?
        } else {
            self.with_offside_def(|p| p.parse_do())?
        };
        Ok(SExpr::Lambda {
            span: Span::new(begin.span, body.span()),
            pats,
            body: Box::new(body),
        })
    }

    fn parse_if(&mut self) -> ParseResult<SExpr> {
        let if_tok = self.expect(TokenKind::If, "unreachable")?;
        let offside = self.cursor.offside + 1;

        let (cond, then, else_tok) = self.with_ignore_offside(true, |p| {
            let cond = p.parse_expression(false)?;
            let then_tok = p.expect(TokenKind::Then, messages::THEN)?;

            let then = p.with_ignore_offside(false, |p| {
                p.with_offside(offside, |p| {
                    if then_tok.span.same_line(&p.cursor.peek()?.span) {
                        p.parse_expression(false)
                    } else {
                        p.parse_do()
                    }
                })
            })?;

            let else_tok = if p.peek_kind()? == TokenKind::Else {
                Some(p.expect(TokenKind::Else, messages::ELSE)?)
            } else {
                None
            };
            Ok((cond, then, else_tok))
        })?;

        let els = match else_tok {
            Some(else_tok) => Some(if else_tok.span.same_line(&self.cursor.peek()?.span) {
                self.parse_expression(false)?
            } else {
                self.parse_do()?
            }),
            None => None,
        };

        let end = els.as_ref().map(|e| e.span()).unwrap_or_else(|| then.span());
        Ok(SExpr::If {
            cond: Box::new(cond),
            then: Box::new(then),
            els: els.map(Box::new),
            span: Span::new(if_tok.span, end),
        })
    }

    /// Parses a sequence of expressions under a fresh offside anchored on the
    /// first one. A single expression stays bare, more become a `Do`.
    fn parse_do(&mut self) -> ParseResult<SExpr> {
        let first = self.cursor.peek()?.clone();
        if first.kind == TokenKind::DoDot {
            return self.parse_expression(false);
        }

        if self.cursor.peek_is_offside()? {
            return Err(mismatched_indentation(&first));
        }
        let align = first.offside();
        self.with_ignore_offside(false, |p| {
            p.with_offside(align, |p| {
                let mut exps = Vec::new();
                loop {
                    exps.push(p.parse_expression(true)?);
                    if p.cursor.peek_is_offside()? || statement_ending(p.peek_kind()?) {
                        break;
                    }
                }

                if exps.len() == 1 {
                    Ok(exps.pop().expect("one expression"))
                } else {
                    Ok(SExpr::Do {
                        span: Span::new(first.span, p.cursor.current_span()),
                        exps,
                    })
                }
            })
        })
    }

    fn parse_while(&mut self) -> ParseResult<SExpr> {
        let while_tok = self.expect(TokenKind::While, "unreachable")?;
        let cond = self.with_ignore_offside(true, |p| {
            let cond = p.parse_expression(false)?;
            p.expect(TokenKind::Do, messages::DO_WHILE)?;
            Ok(cond)
        })?;
        if !cond.is_simple() {
            return Err(ParseErr {
                msg: messages::EXP_SIMPLE.to_string(),
                span: cond.span(),
            });
        }

        let first = self.cursor.peek()?.clone();
        if self.cursor.peek_is_offside()? {
            return Err(mismatched_indentation(&first));
        }
        let align = first.offside();
        self.with_ignore_offside(false, |p| {
            p.with_offside(align, |p| {
                let mut exps = Vec::new();
                loop {
                    exps.push(p.parse_expression(true)?);
                    if p.cursor.peek_is_offside()? || statement_ending(p.peek_kind()?) {
                        break;
                    }
                }
                Ok(SExpr::While {
                    cond: Box::new(cond),
                    exps,
                    span: Span::new(while_tok.span, p.cursor.current_span()),
                })
            })
        })
    }

    fn parse_computation(&mut self) -> ParseResult<SExpr> {
        let do_tok = self.expect(TokenKind::DoDot, "unreachable")?;
        let builder_tok = self.expect(TokenKind::Ident, messages::VARIABLE)?;
        let builder = Spanned::new(builder_tok.text.unwrap_or_default(), builder_tok.span);

        let first = self.cursor.peek()?.clone();
        if self.cursor.peek_is_offside()? {
            return Err(mismatched_indentation(&first));
        }
        let align = first.offside();
        self.with_ignore_offside(false, |p| {
            p.with_offside(align, |p| {
                let mut exps = Vec::new();
                loop {
                    exps.push(p.parse_expression(true)?);
                    if p.cursor.peek_is_offside()? || statement_ending(p.peek_kind()?) {
                        break;
                    }
                }
                Ok(SExpr::Computation {
                    builder,
                    exps,
                    span: Span::new(do_tok.span, p.cursor.current_span()),
                })
            })
        })
    }

    fn parse_for(&mut self) -> ParseResult<SExpr> {
        let for_tok = self.expect(TokenKind::For, "unreachable")?;
        let pat = self.parse_pattern(true)?;
        self.expect(TokenKind::In, messages::FOR_IN)?;
        let source = self.with_ignore_offside(true, |p| {
            let source = p.parse_expression(false)?;
            p.expect(TokenKind::Do, messages::FOR_DO)?;
            Ok(source)
        })?;
        let body = self.parse_do()?;
        Ok(SExpr::For {
            span: Span::new(for_tok.span, body.span()),
            def: Box::new(SLetDef::Pat { expr: source, pat }),
            body: Box::new(body),
        })
    }

    fn parse_let(&mut self, in_do: bool, is_bang: bool) -> ParseResult<SExpr> {
        let let_tok = self.cursor.next()?;
        let def = self.parse_let_def()?;

        if self.peek_kind()? == TokenKind::In {
            self.cursor.next()?;
            let body = self.parse_expression(false)?;
            let span = Span::new(let_tok.span, body.span());
            return Ok(if is_bang {
                SExpr::LetBang {
                    def: Box::new(def),
                    body: Some(Box::new(body)),
                    span,
                }
            } else {
                SExpr::Let {
                    def: Box::new(def),
                    body: Box::new(body),
                    span,
                }
            });
        }

        let span = Span::new(let_tok.span, self.cursor.current_span());
        if is_bang {
            return Ok(SExpr::LetBang {
                def: Box::new(def),
                body: None,
                span,
            });
        }
        if !in_do {
            return Err(ParseErr {
                msg: messages::LET_IN.to_string(),
                span,
            });
        }
        Ok(SExpr::DoLet {
            def: Box::new(def),
            span,
        })
    }

    fn parse_let_def(&mut self) -> ParseResult<SLetDef> {
        let tok = self.cursor.peek()?.clone();
        match tok.kind {
            TokenKind::Ident => {
                let name_tok = self.cursor.next()?;
                let name = name_tok.text.clone().unwrap_or_default();

                let ty = if self.peek_kind()? == TokenKind::Colon {
                    let ty = self.parse_type_signature()?;
                    // the definition must repeat the name on the next line
                    let again = self.expect(TokenKind::Ident, &messages::expected_let_definition(&name))?;
                    if again.text.as_deref() != Some(name.as_str()) {
                        return Err(ParseErr {
                            msg: messages::expected_let_definition(&name),
                            span: again.span,
                        });
                    }
                    Some(ty)
                } else {
                    None
                };

                let pats = self.try_parse_list_of(false, |p| p.try_parse_pattern(true))?;
                self.expect(TokenKind::Equals, messages::LET_EQUALS)?;
                let expr = if self.cursor.current_span().same_line(&self.cursor.peek()?.span) {
                    self.parse_expression(false)?
                } else {
                    self.with_offside_def(|p| p.parse_do())?
                };
                Ok(SLetDef::Bind {
                    expr,
                    name: SBinder {
                        name,
                        span: name_tok.span,
                        is_implicit: false,
                    },
                    pats,
                    is_instance: false,
                    ty,
                })
            }
            TokenKind::LBracket => {
                // an instance binder: let {{x}} = ...
                let open = self.cursor.next()?;
                if self.peek_kind()? != TokenKind::LBracket {
                    // actually a record destructuring pattern
                    let pat = self.finish_record_pattern(open.span)?;
                    self.expect(TokenKind::Equals, messages::LET_EQUALS)?;
                    let expr = self.parse_expression(false)?;
                    return Ok(SLetDef::Pat { expr, pat });
                }
                self.cursor.next()?;
                let name_tok = self.expect(TokenKind::Ident, messages::INSTANCE_VAR)?;
                self.expect(TokenKind::RBracket, messages::INSTANCE_VAR)?;
                self.expect(TokenKind::RBracket, messages::INSTANCE_VAR)?;
                let pats = self.try_parse_list_of(false, |p| p.try_parse_pattern(true))?;
                self.expect(TokenKind::Equals, messages::LET_EQUALS)?;
                let expr = self.parse_expression(false)?;
                Ok(SLetDef::Bind {
                    expr,
                    name: SBinder {
                        name: name_tok.text.unwrap_or_default(),
                        span: name_tok.span,
                        is_implicit: true,
                    },
                    pats,
                    is_instance: true,
                    ty: None,
                })
            }
            _ => {
                let pat = self.parse_pattern(true)?;
                self.expect(TokenKind::Equals, messages::LET_EQUALS)?;
                let expr = self.parse_expression(false)?;
                Ok(SLetDef::Pat { expr, pat })
            }
        }
    }

    fn parse_match(&mut self) -> ParseResult<SExpr> {
        let case_tok = self.expect(TokenKind::Case, "unreachable")?;
        let exprs = self.with_ignore_offside(true, |p| {
            let exprs = p.between(TokenKind::Comma, |p| p.parse_expression(false))?;
            p.expect(TokenKind::Of, messages::CASE_OF)?;
            Ok(exprs)
        })?;

        let first = self.cursor.peek()?.clone();
        if self.cursor.peek_is_offside()? {
            return Err(mismatched_indentation(&first));
        }
        let align = first.offside();
        self.with_ignore_offside(false, |p| {
            p.with_offside(align, |p| {
                let mut cases = Vec::new();
                loop {
                    cases.push(p.parse_case()?);
                    if p.cursor.peek_is_offside()? || statement_ending(p.peek_kind()?) {
                        break;
                    }
                }
                Ok(SExpr::Match {
                    exprs,
                    cases,
                    span: Span::new(case_tok.span, p.cursor.current_span()),
                })
            })
        })
    }

    fn parse_case(&mut self) -> ParseResult<SCase> {
        let pats = self.between(TokenKind::Comma, |p| p.parse_pattern(false))?;
        let guard = if self.peek_kind()? == TokenKind::If {
            self.cursor.next()?;
            Some(self.with_ignore_offside(true, |p| p.parse_expression(false))?)
        } else {
            None
        };
        let arrow = self.expect(TokenKind::Arrow, messages::CASE_ARROW)?;
        let exp = if arrow.span.same_line(&self.cursor.peek()?.span) {
            self.parse_expression(false)?
        } else {
            self.with_offside_def(|p| p.parse_do())?
        };
        Ok(SCase { pats, exp, guard })
    }

    ///////////////////////////////////////////////
    // records
    ///////////////////////////////////////////////

    fn parse_record(&mut self) -> ParseResult<SExpr> {
        self.with_ignore_offside(true, |p| {
            let open = p.cursor.next()?;
            let peeked = p.cursor.peek()?.clone();
            let op_text = if peeked.kind == TokenKind::Op {
                peeked.op_text().to_string()
            } else {
                String::new()
            };
            match peeked.kind {
                TokenKind::RBracket => {
                    let end = p.cursor.next()?;
                    Ok(SExpr::RecordEmpty {
                        span: Span::new(open.span, end.span),
                    })
                }
                TokenKind::LBracket => {
                    // {{var}} is an instance argument
                    p.cursor.next()?;
                    let (name, alias) = if p.peek_kind()? == TokenKind::UpperIdent {
                        let upper = p.cursor.next()?;
                        p.expect(TokenKind::Dot, messages::ALIAS_DOT)?;
                        let ident = p.expect(TokenKind::Ident, messages::IMPORTED_DOT)?;
                        (ident.text.unwrap_or_default(), upper.text)
                    } else {
                        let ident = p.expect(TokenKind::Ident, messages::INSTANCE_VAR)?;
                        (ident.text.unwrap_or_default(), None)
                    };
                    p.expect(TokenKind::RBracket, messages::INSTANCE_VAR)?;
                    let end = p.expect(TokenKind::RBracket, messages::INSTANCE_VAR)?;
                    Ok(SExpr::ImplicitVar {
                        name,
                        alias,
                        span: Span::new(open.span, end.span),
                    })
                }
                TokenKind::Dot => {
                    // { .path.to.label = value | record } or -> for updates
                    let mut labels = Vec::new();
                    while p.peek_kind()? == TokenKind::Dot {
                        p.cursor.next()?;
                        labels.push(p.parse_label()?);
                    }
                    let is_set = match p.peek_kind()? {
                        TokenKind::Equals => {
                            p.cursor.next()?;
                            true
                        }
                        TokenKind::Arrow => {
                            p.cursor.next()?;
                            false
                        }
                        _ => {
                            return Err(ParseErr {
                                msg: messages::RECORD_EQUALS.to_string(),
                                span: p.cursor.peek()?.span,
                            })
                        }
                    };
                    let val = p.parse_expression(false)?;
                    p.expect(TokenKind::Pipe, &messages::pipe_expected("record update"))?;
                    let exp = p.parse_expression(false)?;
                    let end = p.expect(
                        TokenKind::RBracket,
                        &messages::rbracket_expected("record update"),
                    )?;
                    Ok(SExpr::RecordUpdate {
                        exp: Box::new(exp),
                        labels,
                        val: Box::new(val),
                        is_set,
                        span: Span::new(open.span, end.span),
                    })
                }
                TokenKind::Op if op_text == "-" => {
                    p.cursor.next()?;
                    let labels = p
                        .between(TokenKind::Comma, |p| p.parse_label())?
                        .into_iter()
                        .map(|l| l.val)
                        .collect();
                    p.expect(TokenKind::Pipe, &messages::pipe_expected("record restriction"))?;
                    let exp = p.parse_expression(false)?;
                    let end = p.expect(
                        TokenKind::RBracket,
                        &messages::rbracket_expected("record restriction"),
                    )?;
                    Ok(SExpr::RecordRestrict {
                        exp: Box::new(exp),
                        labels,
                        span: Span::new(open.span, end.span),
                    })
                }
                TokenKind::Op if op_text == "+" => {
                    p.cursor.next()?;
                    let exp1 = p.parse_expression(false)?;
                    p.expect(TokenKind::Comma, &messages::comma_expected("record merge"))?;
                    let exp2 = p.parse_expression(false)?;
                    let end = p.expect(
                        TokenKind::RBracket,
                        &messages::rbracket_expected("record merge"),
                    )?;
                    Ok(SExpr::RecordMerge {
                        exp1: Box::new(exp1),
                        exp2: Box::new(exp2),
                        span: Span::new(open.span, end.span),
                    })
                }
                _ => {
                    let mut labels = LabelMap::new();
                    loop {
                        let label = p.parse_label()?;
                        if p.peek_kind()? == TokenKind::Colon {
                            p.cursor.next()?;
                            let value = p.parse_expression(false)?;
                            labels.push(label.val, value);
                        } else {
                            // pun: { x } means { x: x }
                            labels.push(
                                label.val.clone(),
                                SExpr::Var {
                                    name: label.val,
                                    alias: None,
                                    span: label.span,
                                },
                            );
                        }
                        if p.peek_kind()? == TokenKind::Comma {
                            p.cursor.next()?;
                            continue;
                        }
                        break;
                    }
                    let exp = if p.peek_kind()? == TokenKind::Pipe {
                        p.cursor.next()?;
                        p.parse_expression(false)?
                    } else {
                        SExpr::RecordEmpty { span: open.span }
                    };
                    let end = p.expect(TokenKind::RBracket, &messages::rbracket_expected("record"))?;
                    Ok(SExpr::RecordExtend {
                        labels,
                        exp: Box::new(exp),
                        span: Span::new(open.span, end.span),
                    })
                }
            }
        })
    }

    fn parse_label(&mut self) -> ParseResult<Spanned<String>> {
        let tok = self.cursor.peek()?.clone();
        let tok = match tok.kind {
            TokenKind::Ident => self.cursor.next()?,
            TokenKind::Str => self.cursor.next()?,
            _ => {
                return Err(ParseErr {
                    msg: messages::RECORD_LABEL.to_string(),
                    span: tok.span,
                })
            }
        };
        let name = match tok.value {
            Some(TokenValue::Str(v)) => v,
            _ => tok.text.unwrap_or_default(),
        };
        Ok(Spanned::new(name, tok.span))
    }

    ///////////////////////////////////////////////
    // patterns
    ///////////////////////////////////////////////

    fn parse_pattern(&mut self, is_destructuring: bool) -> ParseResult<SPattern> {
        match self.try_parse_pattern(is_destructuring)? {
            Some(pat) => Ok(pat),
            None => Err(ParseErr {
                msg: messages::PATTERN.to_string(),
                span: self.cursor.peek()?.span,
            }),
        }
    }

    fn try_parse_pattern(&mut self, is_destructuring: bool) -> ParseResult<Option<SPattern>> {
        let tok = self.cursor.peek()?.clone();
        let pat = match tok.kind {
            TokenKind::Underline => {
                self.cursor.next()?;
                SPattern::Wildcard { span: tok.span }
            }
            TokenKind::Ident => {
                let t = self.cursor.next()?;
                SPattern::Var {
                    name: t.text.unwrap_or_default(),
                    span: t.span,
                }
            }
            TokenKind::Bool => {
                let t = self.cursor.next()?;
                let v = match t.value {
                    Some(TokenValue::Bool(v)) => v,
                    _ => unreachable!(),
                };
                SPattern::Literal {
                    lit: Box::new(SExpr::Bool { v, span: t.span }),
                    span: t.span,
                }
            }
            TokenKind::Int => {
                let t = self.cursor.next()?;
                let v = match t.value {
                    Some(TokenValue::Int(v)) => v,
                    _ => unreachable!(),
                };
                SPattern::Literal {
                    lit: Box::new(SExpr::Int {
                        v,
                        text: t.text.unwrap_or_default(),
                        span: t.span,
                    }),
                    span: t.span,
                }
            }
            TokenKind::Float => {
                let t = self.cursor.next()?;
                let v = match t.value {
                    Some(TokenValue::Float(v)) => v,
                    _ => unreachable!(),
                };
                SPattern::Literal {
                    lit: Box::new(SExpr::Float {
                        v,
                        text: t.text.unwrap_or_default(),
                        span: t.span,
                    }),
                    span: t.span,
                }
            }
            TokenKind::Complex => {
                let t = self.cursor.next()?;
                let (re, im) = match t.value {
                    Some(TokenValue::Complex(re, im)) => (re, im),
                    _ => unreachable!(),
                };
                SPattern::Literal {
                    lit: Box::new(SExpr::Complex {
                        re,
                        im,
                        text: t.text.unwrap_or_default(),
                        span: t.span,
                    }),
                    span: t.span,
                }
            }
            TokenKind::Char => {
                let t = self.cursor.next()?;
                let v = match t.value {
                    Some(TokenValue::Char(v)) => v,
                    _ => unreachable!(),
                };
                SPattern::Literal {
                    lit: Box::new(SExpr::Char {
                        v,
                        raw: t.text.unwrap_or_default(),
                        span: t.span,
                    }),
                    span: t.span,
                }
            }
            TokenKind::Str => {
                let t = self.cursor.next()?;
                let v = match t.value {
                    Some(TokenValue::Str(v)) => v,
                    _ => unreachable!(),
                };
                SPattern::Literal {
                    lit: Box::new(SExpr::Str {
                        v,
                        raw: t.text.unwrap_or_default(),
                        multi: false,
                        span: t.span,
                    }),
                    span: t.span,
                }
            }
            TokenKind::LParen => {
                let open = self.cursor.next()?;
                if self.peek_kind()? == TokenKind::RParen {
                    let end = self.cursor.next()?;
                    SPattern::Unit {
                        span: Span::new(open.span, end.span),
                    }
                } else {
                    let inner = self.parse_pattern(false)?;
                    let end = self.expect(
                        TokenKind::RParen,
                        &messages::rparens_expected("pattern declaration"),
                    )?;
                    SPattern::Parens {
                        pat: Box::new(inner),
                        span: Span::new(open.span, end.span),
                    }
                }
            }
            TokenKind::UpperIdent => {
                let (name, alias, ctor_span) = self.parse_ctor_name()?;
                if is_destructuring {
                    SPattern::Ctor {
                        name,
                        alias,
                        fields: Vec::new(),
                        span: Span::new(tok.span, ctor_span),
                    }
                } else {
                    let fields = self.try_parse_list_of(false, |p| p.try_parse_pattern(true))?;
                    let end = fields
                        .last()
                        .map(|f| f.span())
                        .unwrap_or(ctor_span);
                    SPattern::Ctor {
                        name,
                        alias,
                        fields,
                        span: Span::new(tok.span, end),
                    }
                }
            }
            TokenKind::LBracket => {
                let open = self.cursor.next()?;
                if self.peek_kind()? == TokenKind::LBracket {
                    self.cursor.next()?;
                    let inner = self.parse_pattern(false)?;
                    self.expect(TokenKind::RBracket, messages::INSTANCE_VAR)?;
                    let end = self.expect(TokenKind::RBracket, messages::INSTANCE_VAR)?;
                    SPattern::Implicit {
                        pat: Box::new(inner),
                        span: Span::new(open.span, end.span),
                    }
                } else {
                    self.finish_record_pattern(open.span)?
                }
            }
            TokenKind::LSBracket => {
                let open = self.cursor.next()?;
                if self.peek_kind()? == TokenKind::RSBracket {
                    let end = self.cursor.next()?;
                    SPattern::List {
                        elems: Vec::new(),
                        tail: None,
                        span: Span::new(open.span, end.span),
                    }
                } else {
                    let elems = self.between(TokenKind::Comma, |p| p.parse_pattern(false))?;
                    let tail = if self.cursor.peek()?.is_double_colon() {
                        self.cursor.next()?;
                        Some(Box::new(self.parse_pattern(false)?))
                    } else {
                        None
                    };
                    let end = self.expect(
                        TokenKind::RSBracket,
                        &messages::rsbracket_expected("list pattern"),
                    )?;
                    SPattern::List {
                        elems,
                        tail,
                        span: Span::new(open.span, end.span),
                    }
                }
            }
            TokenKind::PatternStr => {
                let t = self.cursor.next()?;
                let v = match t.value {
                    Some(TokenValue::Str(v)) => v,
                    _ => unreachable!(),
                };
                SPattern::Regex {
                    raw: v.clone(),
                    regex: v,
                    span: t.span,
                }
            }
            TokenKind::Op if tok.op_text() == ":?" => {
                self.cursor.next()?;
                let first = self.expect(TokenKind::UpperIdent, messages::TYPE_TEST_TYPE)?;
                let (ty_name, ty_alias) = if self.peek_kind()? == TokenKind::Dot {
                    self.cursor.next()?;
                    let second = self.expect(TokenKind::UpperIdent, messages::TYPEALIAS_DOT)?;
                    (second.text.unwrap_or_default(), first.text.clone())
                } else {
                    (first.text.clone().unwrap_or_default(), None)
                };
                let ty = SType::Const {
                    name: ty_name,
                    alias: ty_alias,
                    span: Span::new(first.span, self.cursor.current_span()),
                };

                let (alias, end) = if self.peek_kind()? == TokenKind::As {
                    self.cursor.next()?;
                    let ident = self.expect(TokenKind::Ident, messages::VARIABLE)?;
                    (ident.text.clone(), ident.span)
                } else {
                    (None, ty.span())
                };
                SPattern::TypeTest {
                    ty,
                    alias,
                    span: Span::new(tok.span, end),
                }
            }
            _ => return Ok(None),
        };

        // named, annotated and tuple patterns chain after any pattern
        match self.peek_kind()? {
            TokenKind::As => {
                self.cursor.next()?;
                let name = self.expect(TokenKind::Ident, messages::VARIABLE)?;
                let span = Span::new(pat.span(), name.span);
                Ok(Some(SPattern::Named {
                    pat: Box::new(pat),
                    name: Spanned::new(name.text.unwrap_or_default(), name.span),
                    span,
                }))
            }
            TokenKind::Colon => {
                if let SPattern::Var { name, span } = &pat {
                    self.cursor.next()?;
                    let ty = self.parse_type(false)?;
                    let full = Span::new(*span, ty.span());
                    Ok(Some(SPattern::TypeAnnotation {
                        binder: Spanned::new(name.clone(), *span),
                        ty,
                        span: full,
                    }))
                } else {
                    Ok(Some(pat))
                }
            }
            TokenKind::Semicolon => {
                self.cursor.next()?;
                let second = self.parse_pattern(is_destructuring)?;
                let span = Span::new(pat.span(), second.span());
                Ok(Some(SPattern::Tuple {
                    p1: Box::new(pat),
                    p2: Box::new(second),
                    span,
                }))
            }
            _ => Ok(Some(pat)),
        }
    }

    fn parse_ctor_name(&mut self) -> ParseResult<(String, Option<String>, Span)> {
        let first = self.expect(TokenKind::UpperIdent, messages::CTOR_NAME)?;
        if self.peek_kind()? == TokenKind::Dot {
            self.cursor.next()?;
            let second = self.expect(TokenKind::UpperIdent, messages::IMPORTED_DOT)?;
            Ok((
                second.text.unwrap_or_default(),
                first.text,
                Span::new(first.span, second.span),
            ))
        } else {
            Ok((first.text.clone().unwrap_or_default(), None, first.span))
        }
    }

    fn finish_record_pattern(&mut self, open: Span) -> ParseResult<SPattern> {
        let mut labels = LabelMap::new();
        loop {
            let label = self.parse_label()?;
            if self.peek_kind()? == TokenKind::Colon {
                self.cursor.next()?;
                let pat = self.parse_pattern(false)?;
                labels.push(label.val, pat);
            } else {
                labels.push(
                    label.val.clone(),
                    SPattern::Var {
                        name: label.val,
                        span: label.span,
                    },
                );
            }
            if self.peek_kind()? == TokenKind::Comma {
                self.cursor.next()?;
                continue;
            }
            break;
        }
        let end = self.expect(
            TokenKind::RBracket,
            &messages::rbracket_expected("record pattern"),
        )?;
        Ok(SPattern::Record {
            labels,
            span: Span::new(open, end.span),
        })
    }

    ///////////////////////////////////////////////
    // types
    ///////////////////////////////////////////////

    fn parse_type_signature(&mut self) -> ParseResult<SType> {
        self.expect(TokenKind::Colon, messages::TYPE_COLON)?;
        self.parse_type(false)
    }

    fn parse_type(&mut self, in_ctor: bool) -> ParseResult<SType> {
        match self.try_parse_type_atom(in_ctor)? {
            Some(ty) => Ok(ty),
            None => Err(ParseErr {
                msg: messages::TYPE_DEF.to_string(),
                span: self.cursor.peek()?.span,
            }),
        }
    }

    fn try_parse_type_atom(&mut self, in_ctor: bool) -> ParseResult<Option<SType>> {
        if self.cursor.peek_is_offside()? {
            return Ok(None);
        }

        let tok = self.cursor.peek()?.clone();
        let ty = match tok.kind {
            TokenKind::LParen => self.with_ignore_offside(true, |p| {
                let open = p.cursor.next()?;
                let inner = p.parse_type(false)?;
                let end = p.expect(
                    TokenKind::RParen,
                    &messages::rparens_expected("type definition"),
                )?;
                Ok(SType::Parens {
                    ty: Box::new(inner),
                    span: Span::new(open.span, end.span),
                })
            })?,
            TokenKind::Ident => {
                let name = self.parse_type_var()?;
                SType::Const {
                    name,
                    alias: None,
                    span: Span::new(tok.span, self.cursor.current_span()),
                }
            }
            TokenKind::UpperIdent => {
                let first = self.cursor.next()?;
                let (name, alias) = if self.peek_kind()? == TokenKind::Dot {
                    self.cursor.next()?;
                    let second = self.expect(TokenKind::UpperIdent, messages::TYPEALIAS_DOT)?;
                    (second.text.unwrap_or_default(), first.text.clone())
                } else {
                    (first.text.clone().unwrap_or_default(), None)
                };
                let tconst = SType::Const {
                    name,
                    alias,
                    span: Span::new(tok.span, self.cursor.current_span()),
                };
                if in_ctor {
                    tconst
                } else {
                    let args = self.try_parse_list_of(true, |p| p.try_parse_type_atom(true))?;
                    if args.is_empty() {
                        tconst
                    } else {
                        SType::App {
                            ty: Box::new(tconst),
                            types: args,
                            span: Span::new(tok.span, self.cursor.current_span()),
                        }
                    }
                }
            }
            TokenKind::LSBracket => self.with_ignore_offside(true, |p| {
                let open = p.cursor.next()?;
                if p.peek_kind()? == TokenKind::RSBracket {
                    let end = p.cursor.next()?;
                    return Ok(SType::RowEmpty {
                        span: Span::new(open.span, end.span),
                    });
                }
                let extend = p.parse_row_extend(open.span)?;
                p.expect(
                    TokenKind::RSBracket,
                    &messages::rsbracket_expected("row type"),
                )?;
                Ok(extend)
            })?,
            TokenKind::LBracket => self.with_ignore_offside(true, |p| {
                let open = p.cursor.next()?;
                match p.peek_kind()? {
                    TokenKind::LBracket => {
                        p.cursor.next()?;
                        let inner = p.parse_type(false)?;
                        p.expect(TokenKind::RBracket, messages::INSTANCE_TYPE)?;
                        let end = p.expect(TokenKind::RBracket, messages::INSTANCE_TYPE)?;
                        Ok(SType::Implicit {
                            ty: Box::new(inner),
                            span: Span::new(open.span, end.span),
                        })
                    }
                    TokenKind::RBracket => {
                        let end = p.cursor.next()?;
                        let span = Span::new(open.span, end.span);
                        Ok(SType::Record {
                            row: Box::new(SType::RowEmpty { span }),
                            span,
                        })
                    }
                    TokenKind::Pipe => {
                        p.cursor.next()?;
                        let row = p.parse_type(false)?;
                        let end = p.expect(
                            TokenKind::RBracket,
                            &messages::rbracket_expected("record type"),
                        )?;
                        let span = Span::new(open.span, end.span);
                        Ok(SType::Record {
                            row: Box::new(SType::RowExtend {
                                labels: LabelMap::new(),
                                row: Box::new(row),
                                span,
                            }),
                            span,
                        })
                    }
                    _ => {
                        let extend = p.parse_row_extend(open.span)?;
                        let end = p.expect(
                            TokenKind::RBracket,
                            &messages::rbracket_expected("record type"),
                        )?;
                        Ok(SType::Record {
                            row: Box::new(extend),
                            span: Span::new(open.span, end.span),
                        })
                    }
                }
            })?,
            _ => return Ok(None),
        };

        if in_ctor {
            return Ok(Some(ty));
        }

        if self.peek_kind()? == TokenKind::Arrow {
            self.cursor.next()?;
            let ret = self.parse_type(false)?;
            let span = Span::new(ty.span(), ret.span());
            return Ok(Some(SType::Fun {
                arg: Box::new(ty),
                ret: Box::new(ret),
                span,
            }));
        }
        Ok(Some(ty))
    }

    fn parse_row_extend(&mut self, start: Span) -> ParseResult<SType> {
        let rows = self.between(TokenKind::Comma, |p| {
            let label = p.parse_label()?;
            p.expect(TokenKind::Colon, messages::RECORD_COLON)?;
            let ty = p.parse_type(false)?;
            Ok((label.val, ty))
        })?;
        let row = if self.peek_kind()? == TokenKind::Pipe {
            self.cursor.next()?;
            self.parse_type(false)?
        } else {
            SType::RowEmpty {
                span: Span::new(start, self.cursor.current_span()),
            }
        };
        Ok(SType::RowExtend {
            labels: LabelMap::from_entries(rows),
            row: Box::new(row),
            span: Span::new(start, self.cursor.current_span()),
        })
    }

    fn parse_type_var(&mut self) -> ParseResult<String> {
        let tok = self.expect(TokenKind::Ident, messages::TYPE_VAR)?;
        Ok(tok.text.unwrap_or_default())
    }

    ///////////////////////////////////////////////
    // helpers
    ///////////////////////////////////////////////

    fn peek_kind(&mut self) -> ParseResult<TokenKind> {
        Ok(self.cursor.peek()?.kind)
    }

    fn expect(&mut self, kind: TokenKind, msg: &str) -> ParseResult<Token> {
        let tok = self.cursor.next()?;
        if tok.kind == kind {
            Ok(tok)
        } else {
            Err(ParseErr {
                msg: msg.to_string(),
                span: tok.span,
            })
        }
    }

    fn with_offside<T>(
        &mut self,
        offside: usize,
        f: impl FnOnce(&mut Self) -> ParseResult<T>,
    ) -> ParseResult<T> {
        let prev = self.cursor.offside;
        self.cursor.offside = offside;
        let res = f(self);
        self.cursor.offside = prev;
        res
    }

    fn with_offside_def<T>(&mut self, f: impl FnOnce(&mut Self) -> ParseResult<T>) -> ParseResult<T> {
        let offside = self.cursor.offside + 1;
        self.with_offside(offside, f)
    }

    fn with_ignore_offside<T>(
        &mut self,
        ignore: bool,
        f: impl FnOnce(&mut Self) -> ParseResult<T>,
    ) -> ParseResult<T> {
        let prev = self.cursor.ignore_offside;
        self.cursor.ignore_offside = ignore;
        let res = f(self);
        self.cursor.ignore_offside = prev;
        res
    }

    fn between<T>(
        &mut self,
        separator: TokenKind,
        mut f: impl FnMut(&mut Self) -> ParseResult<T>,
    ) -> ParseResult<Vec<T>> {
        let mut res = vec![f(self)?];
        while self.peek_kind()? == separator {
            self.cursor.next()?;
            res.push(f(self)?);
        }
        Ok(res)
    }

    fn try_parse_list_of<T>(
        &mut self,
        inc_offside: bool,
        mut f: impl FnMut(&mut Self) -> ParseResult<Option<T>>,
    ) -> ParseResult<Vec<T>> {
        let mut acc = Vec::new();
        if self.cursor.peek_is_offside()? {
            return Ok(acc);
        }
        // the first element anchors the list; later ones live to its right
        let first = f(self)?;
        let prev = self.cursor.offside;
        if inc_offside {
            self.cursor.offside = prev + 1;
        }
        let mut result = Ok(());
        let mut elem = first;
        loop {
            match elem {
                Some(e) => acc.push(e),
                None => break,
            }
            match self.cursor.peek_is_offside() {
                Ok(true) => break,
                Ok(false) => {}
                Err(err) => {
                    result = Err(err);
                    break;
                }
            }
            let peeked = match self.peek_kind() {
                Ok(kind) => kind,
                Err(err) => {
                    result = Err(err);
                    break;
                }
            };
            if statement_ending(peeked) {
                break;
            }
            match f(self) {
                Ok(next) => elem = next,
                Err(err) => {
                    result = Err(err);
                    break;
                }
            }
        }
        self.cursor.offside = prev;
        result.map(|_| acc)
    }

    /// Skips to the next token at column 1 so parsing can resume at the next
    /// declaration.
    fn fast_forward(&mut self) -> ParseResult<()> {
        self.with_ignore_offside(true, |p| {
            if p.cursor.peek()?.kind == TokenKind::Eof {
                return Ok(());
            }
            loop {
                p.cursor.next()?;
                let peeked = p.cursor.peek()?;
                if peeked.kind == TokenKind::Eof || peeked.offside() == 1 {
                    return Ok(());
                }
            }
        })
    }

    fn diag(&self, err: ParseErr, severity: Severity) -> Diagnostic {
        self.make_diag(err.msg, err.span, severity)
    }

    fn make_diag(&self, msg: String, span: Span, severity: Severity) -> Diagnostic {
        Diagnostic {
            message: msg,
            span,
            path: self.source_name.clone(),
            module: self.module_name.clone(),
            severity,
            typing_context: None,
        }
    }
}
