//! Recursive-descent compiler from KScr source to class declarations
//!
//! Expressions compile to flat component sequences: each component reads
//! the previous one's result as its left operand, so `a.b(c) + d` becomes
//! `[a .b(c), +d]` with the call chained as a post component. Operands
//! that span several components are wrapped in a `Parentheses` node.
//!
//! Source without any class declaration is compiled as the body of
//! `public static void main()` in a class named `Main`.

use crate::bytecode::{
    BytecodeKind, ClassDecl, ComponentRole, ExecutableCode, MemberDecl, MethodDecl, Operator,
    PropertyDecl, Statement, StatementComponent,
};
use crate::error::{CompileError, Result};
use crate::interp::Numeric;
use crate::lexer::{Token, tokenize};
use crate::model::member::{CONSTRUCTOR_NAME, STATIC_INITIALIZER_NAME};
use crate::model::{ClassKind, MethodParameter, Modifier, TypeParameter};
use crate::span::{SourcePosition, Span};
use tracing::debug;

/// Name of the class wrapping top-level statements.
pub const SCRIPT_CLASS: &str = "Main";

/// Compile one source file.
pub fn compile(path: &str, source: &str) -> Result<Vec<ClassDecl>> {
    let tokens = tokenize(source)?;
    let mut compiler = Compiler::new(path, source, tokens);
    let classes = compiler.compile_unit()?;
    debug!(path, classes = classes.len(), "compiled");
    Ok(classes)
}

type ExprFn<'src> = fn(&mut Compiler<'src>) -> Result<Vec<StatementComponent>>;

pub struct Compiler<'src> {
    path: &'src str,
    source: &'src str,
    tokens: Vec<(Token, Span)>,
    pos: usize,
}

impl<'src> Compiler<'src> {
    pub fn new(path: &'src str, source: &'src str, tokens: Vec<(Token, Span)>) -> Self {
        Self {
            path,
            source,
            tokens,
            pos: 0,
        }
    }

    // ================================================================
    // Token helpers
    // ================================================================

    fn peek(&self) -> Option<&Token> {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset).map(|(t, _)| t)
    }

    fn token_at(&self, index: usize) -> Option<&Token> {
        self.tokens.get(index).map(|(t, _)| t)
    }

    fn span(&self) -> Span {
        match self.tokens.get(self.pos) {
            Some((_, span)) => *span,
            None => Span::new(self.source.len(), self.source.len()),
        }
    }

    fn position(&self) -> SourcePosition {
        SourcePosition::locate(self.path, self.source, self.span().start)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn check(&self, token: &Token) -> bool {
        self.peek() == Some(token)
    }

    fn consume(&mut self, token: &Token) -> bool {
        if self.check(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token) -> Result<()> {
        if self.consume(token) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{token}'")))
        }
    }

    fn expect_ident(&mut self) -> Result<String> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    fn check_word(&self, word: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(w)) if w == word)
    }

    fn error(&self, message: impl Into<String>) -> CompileError {
        CompileError::parser(message, self.span())
    }

    fn unexpected(&self, expected: &str) -> CompileError {
        match self.peek() {
            Some(found) => self.error(format!("expected {expected}, found '{found}'")),
            None => self.error(format!("expected {expected}, found end of input")),
        }
    }

    // ================================================================
    // Compilation unit
    // ================================================================

    fn compile_unit(&mut self) -> Result<Vec<ClassDecl>> {
        let mut package = String::new();
        if self.consume(&Token::Package) {
            package = self.qualified_name()?;
            self.expect(&Token::Semi)?;
        }
        while self.consume(&Token::Import) {
            self.expect_ident()?;
            while self.consume(&Token::Dot) {
                if !self.consume(&Token::Star) {
                    self.expect_ident()?;
                }
            }
            self.expect(&Token::Semi)?;
        }

        if !self.at_end() && !self.starts_class() {
            return Ok(vec![self.script(&package)?]);
        }
        let mut classes = Vec::new();
        while !self.at_end() {
            classes.push(self.class_decl(&package)?);
        }
        Ok(classes)
    }

    fn starts_class(&self) -> bool {
        let mut i = self.pos;
        while self.token_at(i).and_then(modifier_of).is_some() {
            i += 1;
        }
        matches!(
            self.token_at(i),
            Some(Token::Class | Token::Interface | Token::Enum)
        )
    }

    fn script(&mut self, package: &str) -> Result<ClassDecl> {
        let position = self.position();
        let mut body = Vec::new();
        while !self.at_end() {
            self.statement(&mut body)?;
        }
        let mut class = ClassDecl::new(package, SCRIPT_CLASS, Modifier::PUBLIC, ClassKind::Class);
        class.position = position.clone();
        class.members.push(MemberDecl::Method(MethodDecl {
            name: "main".into(),
            modifier: Modifier::PUBLIC | Modifier::STATIC,
            return_type: "void".into(),
            parameters: Vec::new(),
            body: Some(ExecutableCode::new(body)),
            position,
        }));
        Ok(class)
    }

    fn modifiers(&mut self) -> Modifier {
        let mut modifier = Modifier::NONE;
        while let Some(m) = self.peek().and_then(modifier_of) {
            modifier |= m;
            self.pos += 1;
        }
        modifier
    }

    fn class_decl(&mut self, package: &str) -> Result<ClassDecl> {
        let modifier = self.modifiers();
        let position = self.position();
        let kind = match self.peek() {
            Some(Token::Class) => ClassKind::Class,
            Some(Token::Interface) => ClassKind::Interface,
            Some(Token::Enum) => ClassKind::Enum,
            _ => return Err(self.unexpected("class declaration")),
        };
        self.advance();
        let name = self.expect_ident()?;
        let mut class = ClassDecl::new(package, name, modifier, kind);
        class.position = position;

        if self.consume(&Token::Lt) {
            loop {
                let param = self.expect_ident()?;
                let mut param = TypeParameter::new(param);
                if self.consume(&Token::Colon) {
                    param = param.with_target(self.parse_type()?);
                }
                class.type_params.push(param);
                if !self.consume(&Token::Comma) {
                    break;
                }
            }
            self.close_angle()?;
        }
        if self.consume(&Token::Extends) {
            class.superclasses = self.type_list()?;
        }
        if self.consume(&Token::Implements) {
            class.interfaces = self.type_list()?;
        }

        self.expect(&Token::LBrace)?;
        while !self.consume(&Token::RBrace) {
            if self.at_end() {
                return Err(self.unexpected("'}'"));
            }
            let member = self.member_decl(&class)?;
            if class.member(member.name()).is_some() {
                return Err(self.error(format!(
                    "duplicate member '{}' in class {}",
                    member.name(),
                    class.name
                )));
            }
            class.members.push(member);
        }
        Ok(class)
    }

    fn type_list(&mut self) -> Result<Vec<String>> {
        let mut types = vec![self.parse_type()?];
        while self.consume(&Token::Comma) {
            types.push(self.parse_type()?);
        }
        Ok(types)
    }

    fn member_decl(&mut self, class: &ClassDecl) -> Result<MemberDecl> {
        let position = self.position();
        if self.check(&Token::Static) && self.peek_at(1) == Some(&Token::LBrace) {
            self.advance();
            let body = self.block()?;
            return Ok(MemberDecl::Method(MethodDecl {
                name: STATIC_INITIALIZER_NAME.into(),
                modifier: Modifier::STATIC,
                return_type: "void".into(),
                parameters: Vec::new(),
                body: Some(body),
                position,
            }));
        }

        let mut modifier = self.modifiers();
        let ctor = self.check_word(&class.name) || self.check_word(CONSTRUCTOR_NAME);
        if ctor && self.peek_at(1) == Some(&Token::LParen) {
            self.advance();
            let parameters = self.parameter_list()?;
            let body = self.block()?;
            return Ok(MemberDecl::Method(MethodDecl {
                name: CONSTRUCTOR_NAME.into(),
                modifier,
                return_type: "void".into(),
                parameters,
                body: Some(body),
                position,
            }));
        }

        let ty = self.parse_type()?;
        let name = self.expect_ident()?;

        if self.check(&Token::LParen) {
            let parameters = self.parameter_list()?;
            let body = if self.consume(&Token::Semi) {
                if !modifier.is_native() {
                    modifier |= Modifier::ABSTRACT;
                }
                None
            } else {
                Some(self.block()?)
            };
            return Ok(MemberDecl::Method(MethodDecl {
                name,
                modifier,
                return_type: ty,
                parameters,
                body,
                position,
            }));
        }

        let mut property = PropertyDecl::field(name, modifier, ty);
        property.position = position;
        if self.consume(&Token::LBrace) {
            self.accessors(&mut property)?;
        }
        if self.consume(&Token::Eq) {
            let init = self.expression()?;
            property.initializer = Some(Statement::expression(init));
        }
        if property.initializer.is_none() && property.getter.is_some() {
            self.consume(&Token::Semi);
        } else {
            self.expect(&Token::Semi)?;
        }
        Ok(MemberDecl::Property(property))
    }

    /// `{ get; set { ... } init; }` after the property name.
    fn accessors(&mut self, property: &mut PropertyDecl) -> Result<()> {
        property.gettable = false;
        property.settable = false;
        property.inittable = false;
        while !self.consume(&Token::RBrace) {
            let word = self.expect_ident()?;
            let code = if self.consume(&Token::Semi) {
                None
            } else {
                Some(self.block()?)
            };
            match word.as_str() {
                "get" => {
                    property.gettable = true;
                    property.getter = code;
                }
                "set" => {
                    property.settable = true;
                    property.inittable = true;
                    property.setter = code;
                }
                "init" => property.inittable = true,
                other => return Err(self.error(format!("unknown property accessor '{other}'"))),
            }
        }
        Ok(())
    }

    fn parameter_list(&mut self) -> Result<Vec<MethodParameter>> {
        self.expect(&Token::LParen)?;
        let mut params = Vec::new();
        if !self.consume(&Token::RParen) {
            loop {
                let ty = self.parse_type()?;
                let name = self.expect_ident()?;
                params.push(MethodParameter::new(ty, name));
                if !self.consume(&Token::Comma) {
                    break;
                }
            }
            self.expect(&Token::RParen)?;
        }
        Ok(params)
    }

    // ================================================================
    // Types
    // ================================================================

    fn qualified_name(&mut self) -> Result<String> {
        let mut name = self.expect_ident()?;
        while self.check(&Token::Dot) && matches!(self.peek_at(1), Some(Token::Ident(_))) {
            self.advance();
            name.push('.');
            name.push_str(&self.expect_ident()?);
        }
        Ok(name)
    }

    /// `name`, `a.b.Name`, `Name<args>`, each optionally followed by `[]`s.
    fn parse_type(&mut self) -> Result<String> {
        let mut name = self.parse_type_base()?;
        while self.check(&Token::LBracket) && self.peek_at(1) == Some(&Token::RBracket) {
            self.pos += 2;
            name.push_str("[]");
        }
        Ok(name)
    }

    fn parse_type_base(&mut self) -> Result<String> {
        let name = self.qualified_name()?;
        if !self.consume(&Token::Lt) {
            return Ok(name);
        }
        let mut args = Vec::new();
        loop {
            match self.peek() {
                Some(Token::NumLit(width)) => {
                    args.push(width.clone());
                    self.pos += 1;
                }
                _ => args.push(self.parse_type()?),
            }
            if !self.consume(&Token::Comma) {
                break;
            }
        }
        self.close_angle()?;
        Ok(format!("{name}<{}>", args.join(", ")))
    }

    /// Consume one `>`, splitting a `>>` token in place.
    fn close_angle(&mut self) -> Result<()> {
        if self.consume(&Token::Gt) {
            return Ok(());
        }
        if self.check(&Token::GtGt) {
            let span = self.span();
            self.tokens[self.pos] = (Token::Gt, Span::new(span.start + 1, span.end));
            return Ok(());
        }
        Err(self.unexpected("'>'"))
    }

    /// Index just past a type starting at token `at`, without consuming.
    fn scan_type(&self, at: usize) -> Option<usize> {
        let mut i = at;
        if !matches!(self.token_at(i), Some(Token::Ident(_))) {
            return None;
        }
        i += 1;
        while self.token_at(i) == Some(&Token::Dot) && matches!(self.token_at(i + 1), Some(Token::Ident(_))) {
            i += 2;
        }
        if self.token_at(i) == Some(&Token::Lt) {
            let mut depth = 0i32;
            loop {
                match self.token_at(i)? {
                    Token::Lt => depth += 1,
                    Token::Gt => depth -= 1,
                    Token::GtGt => depth -= 2,
                    Token::Ident(_) | Token::NumLit(_) | Token::Comma | Token::Dot => {}
                    Token::LBracket | Token::RBracket => {}
                    _ => return None,
                }
                i += 1;
                if depth <= 0 {
                    break;
                }
            }
            if depth < 0 {
                return None;
            }
        }
        while self.token_at(i) == Some(&Token::LBracket) && self.token_at(i + 1) == Some(&Token::RBracket) {
            i += 2;
        }
        Some(i)
    }

    /// Whether the upcoming tokens read `Type name`.
    fn at_declaration(&self) -> bool {
        match self.scan_type(self.pos) {
            Some(end) => matches!(self.token_at(end), Some(Token::Ident(_))),
            None => false,
        }
    }

    // ================================================================
    // Statements
    // ================================================================

    fn block(&mut self) -> Result<ExecutableCode> {
        self.expect(&Token::LBrace)?;
        let mut main = Vec::new();
        while !self.consume(&Token::RBrace) {
            if self.at_end() {
                return Err(self.unexpected("'}'"));
            }
            self.statement(&mut main)?;
        }
        Ok(ExecutableCode::new(main))
    }

    /// A block, or a single statement standing in for one.
    fn body(&mut self) -> Result<ExecutableCode> {
        if self.check(&Token::LBrace) {
            return self.block();
        }
        let mut main = Vec::new();
        self.statement(&mut main)?;
        Ok(ExecutableCode::new(main))
    }

    /// Compile one statement into `out`; nested blocks are flattened.
    fn statement(&mut self, out: &mut Vec<Statement>) -> Result<()> {
        let position = self.position();
        let stmt = match self.peek() {
            Some(Token::Semi) => {
                self.advance();
                return Ok(());
            }
            Some(Token::LBrace) => {
                let code = self.block()?;
                out.extend(code.main);
                return Ok(());
            }
            Some(Token::If) => self.if_statement()?,
            Some(Token::For) => self.for_statement()?,
            Some(Token::Foreach) => self.foreach_statement()?,
            Some(Token::While) => {
                self.advance();
                let cond = self.condition()?;
                let body = self.body()?;
                control(BytecodeKind::StmtWhile)
                    .with_sub_statement(cond)
                    .with_inner_code(body)
            }
            Some(Token::Do) => {
                self.advance();
                let body = self.body()?;
                if !self.consume(&Token::While) {
                    return Err(self.unexpected("'while'"));
                }
                let cond = self.condition()?;
                self.expect(&Token::Semi)?;
                control(BytecodeKind::StmtDo)
                    .with_sub_statement(cond)
                    .with_inner_code(body)
            }
            Some(Token::Try) => {
                let stmt = self.try_statement(position)?;
                out.push(stmt);
                return Ok(());
            }
            Some(Token::Return | Token::Throw) => {
                let kind = if self.advance() == Some(Token::Return) {
                    BytecodeKind::Return
                } else {
                    BytecodeKind::Throw
                };
                let mut comp = StatementComponent::new(ComponentRole::Expression, kind);
                if !self.check(&Token::Semi) {
                    comp = comp.with_sub_statement(Statement::expression(self.expression()?));
                } else if kind == BytecodeKind::Throw {
                    return Err(self.unexpected("expression"));
                }
                self.expect(&Token::Semi)?;
                comp
            }
            _ if self.at_declaration() => {
                let decl = self.declaration()?;
                self.expect(&Token::Semi)?;
                let ty = decl.args.first().cloned().unwrap_or_default();
                let mut stmt = Statement::new(ComponentRole::Declaration, BytecodeKind::Declaration)
                    .with_component(decl.with_position(position));
                stmt.target_type = ty;
                out.push(stmt);
                return Ok(());
            }
            _ => {
                let mut main = self.expression()?;
                self.expect(&Token::Semi)?;
                if let Some(first) = main.first_mut() {
                    if first.position == SourcePosition::default() {
                        first.position = position;
                    }
                }
                out.push(Statement::expression(main));
                return Ok(());
            }
        };
        out.push(
            Statement::new(ComponentRole::Code, BytecodeKind::Statement).with_component(stmt.with_position(position)),
        );
        Ok(())
    }

    /// `Type name [= expr]`
    fn declaration(&mut self) -> Result<StatementComponent> {
        let position = self.position();
        let ty = self.parse_type()?;
        let name = self.expect_ident()?;
        let init = if self.consume(&Token::Eq) {
            Some(single(self.expression()?))
        } else {
            None
        };
        Ok(StatementComponent::declaration(ty, name, init).with_position(position))
    }

    /// `( expr )` as a statement.
    fn condition(&mut self) -> Result<Statement> {
        self.expect(&Token::LParen)?;
        let cond = self.expression()?;
        self.expect(&Token::RParen)?;
        Ok(Statement::expression(cond))
    }

    fn if_statement(&mut self) -> Result<StatementComponent> {
        self.expect(&Token::If)?;
        let cond = self.condition()?;
        let then = self.body()?;
        let mut comp = control(BytecodeKind::StmtIf)
            .with_sub_statement(cond)
            .with_inner_code(then);
        if self.consume(&Token::Else) {
            let otherwise = self.body()?;
            comp = comp.with_sub_component(control(BytecodeKind::StmtElse).with_inner_code(otherwise));
        }
        Ok(comp)
    }

    /// `for (init; cond; step) body`, every clause optional.
    fn for_statement(&mut self) -> Result<StatementComponent> {
        self.expect(&Token::For)?;
        self.expect(&Token::LParen)?;
        let mut comp = control(BytecodeKind::StmtFor);
        if !self.check(&Token::Semi) {
            let init = if self.at_declaration() {
                let decl = self.declaration()?;
                Statement::new(ComponentRole::Declaration, BytecodeKind::Declaration).with_component(decl)
            } else {
                Statement::expression(self.expression()?)
            };
            comp = comp.with_sub_statement(init);
        }
        self.expect(&Token::Semi)?;
        if !self.check(&Token::Semi) {
            let cond = Statement::expression(self.expression()?);
            comp = comp.with_sub_component(StatementComponent::parentheses(cond));
        }
        self.expect(&Token::Semi)?;
        if !self.check(&Token::RParen) {
            comp = comp.with_alt_statement(Statement::expression(self.expression()?));
        }
        self.expect(&Token::RParen)?;
        Ok(comp.with_inner_code(self.body()?))
    }

    /// `foreach ([Type] name : source) body`
    fn foreach_statement(&mut self) -> Result<StatementComponent> {
        self.expect(&Token::Foreach)?;
        self.expect(&Token::LParen)?;
        let mut comp = control(BytecodeKind::StmtForEach);
        if self.at_declaration() {
            let ty = self.parse_type()?;
            comp = comp.with_args([ty]);
        }
        comp = comp.with_arg(self.expect_ident()?);
        self.expect(&Token::Colon)?;
        let source = Statement::expression(self.expression()?);
        self.expect(&Token::RParen)?;
        Ok(comp.with_sub_statement(source).with_inner_code(self.body()?))
    }

    /// `try [(resources)] body` followed by any catch clauses and an
    /// optional finally clause.
    fn try_statement(&mut self, position: SourcePosition) -> Result<Statement> {
        self.expect(&Token::Try)?;
        let mut comp = control(BytecodeKind::StmtTry).with_position(position);
        if self.consume(&Token::LParen) {
            let mut resources = Statement::new(ComponentRole::Declaration, BytecodeKind::Declaration);
            while !self.consume(&Token::RParen) {
                resources.main.push(self.declaration()?);
                if !self.consume(&Token::Semi) && !self.check(&Token::RParen) {
                    return Err(self.unexpected("';' or ')'"));
                }
            }
            comp = comp.with_sub_statement(resources);
        }
        comp = comp.with_inner_code(self.block()?);

        let mut clauses = Vec::new();
        while self.check(&Token::Catch) {
            let position = self.position();
            self.advance();
            let mut clause = control(BytecodeKind::StmtCatch).with_position(position);
            if self.consume(&Token::LParen) {
                let (types, name) = self.catch_header()?;
                clause = clause.with_args(types).with_arg(name);
                self.expect(&Token::RParen)?;
            }
            clauses.push(clause.with_inner_code(self.block()?));
        }
        if self.check(&Token::Finally) {
            let position = self.position();
            self.advance();
            clauses.push(
                control(BytecodeKind::StmtFinally)
                    .with_position(position)
                    .with_inner_code(self.block()?),
            );
        }

        let stmt = Statement::new(ComponentRole::Code, BytecodeKind::Statement).with_component(comp);
        let mut handler: Option<StatementComponent> = None;
        for mut clause in clauses.into_iter().rev() {
            clause.alt_component = handler.map(Box::new);
            handler = Some(clause);
        }
        Ok(match handler {
            Some(first) => stmt.with_catch_finally(first),
            None => stmt,
        })
    }

    /// `Type | Type name`, `Type name` or a lone `name` catching anything.
    fn catch_header(&mut self) -> Result<(Vec<String>, String)> {
        if matches!(self.peek(), Some(Token::Ident(_))) && self.peek_at(1) == Some(&Token::RParen) {
            return Ok((Vec::new(), self.expect_ident()?));
        }
        let mut types = vec![self.parse_type()?];
        while self.consume(&Token::Pipe) {
            types.push(self.parse_type()?);
        }
        let name = match self.peek() {
            Some(Token::Ident(_)) => self.expect_ident()?,
            _ => String::new(),
        };
        Ok((types, name))
    }

    // ================================================================
    // Expressions
    // ================================================================

    pub fn expression(&mut self) -> Result<Vec<StatementComponent>> {
        self.assignment()
    }

    fn assignment(&mut self) -> Result<Vec<StatementComponent>> {
        let mut left = self.pipe()?;
        let position = self.position();
        if self.consume(&Token::Eq) {
            let value = single(self.assignment()?);
            left.push(
                StatementComponent::new(ComponentRole::Setter, BytecodeKind::Assignment)
                    .with_sub_component(value)
                    .with_position(position),
            );
            return Ok(left);
        }
        let compound = match self.peek() {
            Some(Token::PlusEq) => Operator::PLUS,
            Some(Token::MinusEq) => Operator::MINUS,
            Some(Token::StarEq) => Operator::MULTIPLY,
            Some(Token::SlashEq) => Operator::DIVIDE,
            Some(Token::PercentEq) => Operator::MODULUS,
            Some(Token::AmpEq) => Operator::BIT_AND,
            Some(Token::PipeEq) => Operator::BIT_OR,
            _ => return Ok(left),
        };
        self.advance();
        let value = single(self.assignment()?);
        left.push(
            StatementComponent::new(ComponentRole::Operator, BytecodeKind::Operator)
                .with_operator(compound | Operator::COMPOUND)
                .with_sub_component(value)
                .with_position(position),
        );
        Ok(left)
    }

    /// `target << value` and `source >> Type name` / `source >> x -> expr`
    fn pipe(&mut self) -> Result<Vec<StatementComponent>> {
        let mut comps = self.null_fallback()?;
        loop {
            let position = self.position();
            if self.consume(&Token::LtLt) {
                let value = single(self.null_fallback()?);
                comps.push(
                    StatementComponent::new(ComponentRole::Emitter, BytecodeKind::Expression)
                        .with_sub_component(value)
                        .with_position(position),
                );
            } else if self.consume(&Token::GtGt) {
                comps.push(self.pipe_target()?.with_position(position));
            } else {
                return Ok(comps);
            }
        }
    }

    fn pipe_target(&mut self) -> Result<StatementComponent> {
        if self.at_declaration() {
            let ty = self.parse_type()?;
            let name = self.expect_ident()?;
            return Ok(StatementComponent::new(ComponentRole::Consumer, BytecodeKind::Declaration).with_args([ty, name]));
        }
        if matches!(self.peek(), Some(Token::Ident(_))) && self.peek_at(1) == Some(&Token::Arrow) {
            let param = self.expect_ident()?;
            self.expect(&Token::Arrow)?;
            let body = Statement::expression(self.null_fallback()?);
            return Ok(StatementComponent::new(ComponentRole::Pipe, BytecodeKind::Lambda)
                .with_arg(param)
                .with_sub_statement(body));
        }
        Err(self.unexpected("consumer declaration or lambda"))
    }

    fn binary_level(&mut self, next: ExprFn<'src>, ops: &[(Token, Operator)]) -> Result<Vec<StatementComponent>> {
        let mut comps = next(self)?;
        loop {
            let Some(op) = ops.iter().find(|(t, _)| self.check(t)).map(|(_, op)| *op) else {
                return Ok(comps);
            };
            let position = self.position();
            self.advance();
            let right = single(next(self)?);
            comps.push(StatementComponent::binary(op, right).with_position(position));
        }
    }

    fn null_fallback(&mut self) -> Result<Vec<StatementComponent>> {
        self.binary_level(Self::logic_or, &[(Token::QuestionQuestion, Operator::NULL_FALLBACK)])
    }

    fn logic_or(&mut self) -> Result<Vec<StatementComponent>> {
        self.binary_level(Self::logic_and, &[(Token::PipePipe, Operator::LOGIC_OR)])
    }

    fn logic_and(&mut self) -> Result<Vec<StatementComponent>> {
        self.binary_level(Self::bit_or, &[(Token::AmpAmp, Operator::LOGIC_AND)])
    }

    fn bit_or(&mut self) -> Result<Vec<StatementComponent>> {
        self.binary_level(Self::bit_and, &[(Token::Pipe, Operator::BIT_OR)])
    }

    fn bit_and(&mut self) -> Result<Vec<StatementComponent>> {
        self.binary_level(Self::equality, &[(Token::Amp, Operator::BIT_AND)])
    }

    fn equality(&mut self) -> Result<Vec<StatementComponent>> {
        self.binary_level(
            Self::relational,
            &[(Token::EqEq, Operator::EQUALS), (Token::NotEq, Operator::NOT_EQUALS)],
        )
    }

    fn relational(&mut self) -> Result<Vec<StatementComponent>> {
        let ops = [
            (Token::Lt, Operator::LESSER),
            (Token::LtEq, Operator::LESSER_EQ),
            (Token::Gt, Operator::GREATER),
            (Token::GtEq, Operator::GREATER_EQ),
        ];
        let mut comps = self.range()?;
        loop {
            let position = self.position();
            if self.consume(&Token::Instanceof) {
                let ty = self.parse_type()?;
                comps.push(
                    StatementComponent::new(ComponentRole::Expression, BytecodeKind::Instanceof)
                        .with_arg(ty)
                        .with_position(position),
                );
                continue;
            }
            let Some(op) = ops.iter().find(|(t, _)| self.check(t)).map(|(_, op)| *op) else {
                return Ok(comps);
            };
            self.advance();
            let right = single(self.range()?);
            comps.push(StatementComponent::binary(op, right).with_position(position));
        }
    }

    /// `start ~ end`
    fn range(&mut self) -> Result<Vec<StatementComponent>> {
        let start = self.additive()?;
        let position = self.position();
        if !self.consume(&Token::Tilde) {
            return Ok(start);
        }
        let end = self.additive()?;
        Ok(vec![
            StatementComponent::new(ComponentRole::Expression, BytecodeKind::LiteralRange)
                .with_sub_statement(Statement::expression(start))
                .with_alt_statement(Statement::expression(end))
                .with_position(position),
        ])
    }

    fn additive(&mut self) -> Result<Vec<StatementComponent>> {
        self.binary_level(
            Self::multiplicative,
            &[(Token::Plus, Operator::PLUS), (Token::Minus, Operator::MINUS)],
        )
    }

    fn multiplicative(&mut self) -> Result<Vec<StatementComponent>> {
        self.binary_level(
            Self::power,
            &[
                (Token::Star, Operator::MULTIPLY),
                (Token::Slash, Operator::DIVIDE),
                (Token::Percent, Operator::MODULUS),
            ],
        )
    }

    /// `a ^ b` or `a pow b`; `pow` is only a keyword in infix position.
    fn power(&mut self) -> Result<Vec<StatementComponent>> {
        let mut comps = self.prefix()?;
        loop {
            match self.peek() {
                Some(Token::Caret) => {}
                Some(Token::Ident(word)) if word == "pow" => {}
                _ => return Ok(comps),
            }
            let position = self.position();
            self.advance();
            let right = single(self.prefix()?);
            comps.push(StatementComponent::binary(Operator::POW, right).with_position(position));
        }
    }

    fn prefix(&mut self) -> Result<Vec<StatementComponent>> {
        let position = self.position();
        let op = match self.peek() {
            Some(Token::Bang) => Operator::LOGIC_NOT,
            Some(Token::Minus) => Operator::ARITHMETIC_NOT,
            Some(Token::PlusPlus) => Operator::INCREMENT_READ,
            Some(Token::MinusMinus) => Operator::DECREMENT_READ,
            _ => return Ok(vec![self.postfix()?]),
        };
        self.advance();
        let mut comps = self.prefix()?;
        comps.push(
            StatementComponent::new(ComponentRole::Operator, BytecodeKind::Operator)
                .with_operator(op | Operator::UNARY_PREFIX)
                .with_position(position),
        );
        Ok(comps)
    }

    /// Member access, indexing and postfix increments chained onto a primary.
    fn postfix(&mut self) -> Result<StatementComponent> {
        let mut comp = self.primary()?;
        loop {
            let position = self.position();
            match self.peek() {
                Some(Token::Dot) => {
                    self.advance();
                    let name = self.expect_ident()?;
                    let args = self.call_args()?;
                    comp.chain(StatementComponent::call(name, args).with_position(position));
                }
                Some(Token::LBracket) => {
                    self.advance();
                    let index = single(self.expression()?);
                    self.expect(&Token::RBracket)?;
                    comp.chain(
                        StatementComponent::new(ComponentRole::Expression, BytecodeKind::Indexer)
                            .with_sub_component(index)
                            .with_position(position),
                    );
                }
                Some(Token::PlusPlus | Token::MinusMinus) => {
                    let op = if self.advance() == Some(Token::PlusPlus) {
                        Operator::READ_INCREMENT
                    } else {
                        Operator::READ_DECREMENT
                    };
                    comp.chain(
                        StatementComponent::new(ComponentRole::Operator, BytecodeKind::Operator)
                            .with_operator(op | Operator::UNARY_POSTFIX)
                            .with_position(position),
                    );
                }
                _ => return Ok(comp),
            }
        }
    }

    /// `(a, b)` after a member name, if present.
    fn call_args(&mut self) -> Result<Option<StatementComponent>> {
        if !self.consume(&Token::LParen) {
            return Ok(None);
        }
        let mut args = Vec::new();
        if !self.consume(&Token::RParen) {
            loop {
                args.push(Statement::expression(self.expression()?));
                if !self.consume(&Token::Comma) {
                    break;
                }
            }
            self.expect(&Token::RParen)?;
        }
        Ok(Some(StatementComponent::parameters(args)))
    }

    fn primary(&mut self) -> Result<StatementComponent> {
        let position = self.position();
        let span = self.span();
        let Some(token) = self.advance() else {
            return Err(self.unexpected("expression"));
        };
        let comp = match token {
            Token::NumLit(text) => {
                Numeric::compile(&text).map_err(|e| CompileError::parser(e.message, span))?;
                StatementComponent::numeric(text)
            }
            Token::StringLit(text) => StatementComponent::string(text),
            Token::True => StatementComponent::boolean(true),
            Token::False => StatementComponent::boolean(false),
            Token::Null => StatementComponent::null(),
            Token::This => StatementComponent::this(),
            Token::Stdio => StatementComponent::new(ComponentRole::Expression, BytecodeKind::StdioExpression),
            Token::LParen => {
                let inner = self.expression()?;
                self.expect(&Token::RParen)?;
                StatementComponent::parentheses(Statement::expression(inner))
            }
            Token::New => self.new_expression()?,
            Token::Ident(name) => match self.call_args()? {
                Some(args) => StatementComponent::call(name, Some(args)),
                None => StatementComponent::variable(name),
            },
            other => {
                self.pos -= 1;
                return Err(self.error(format!("expected expression, found '{other}'")));
            }
        };
        Ok(comp.with_position(position))
    }

    /// `new T(args)`, `new T[n]` or `new T[] { a, b }`
    fn new_expression(&mut self) -> Result<StatementComponent> {
        let ty = self.parse_type_base()?;
        if !self.consume(&Token::LBracket) {
            let args = self.call_args()?.unwrap_or_else(|| StatementComponent::parameters(Vec::new()));
            return Ok(StatementComponent::new(ComponentRole::Expression, BytecodeKind::ConstructorCall)
                .with_arg(ty)
                .with_sub_component(args));
        }
        let array = StatementComponent::new(ComponentRole::Expression, BytecodeKind::ArrayConstructor).with_arg(ty);
        if !self.consume(&Token::RBracket) {
            let len = single(self.expression()?);
            self.expect(&Token::RBracket)?;
            return Ok(array.with_sub_component(len));
        }
        self.expect(&Token::LBrace)?;
        let mut items = Vec::new();
        while !self.consume(&Token::RBrace) {
            items.push(Statement::expression(self.expression()?));
            if !self.consume(&Token::Comma) && !self.check(&Token::RBrace) {
                return Err(self.unexpected("',' or '}'"));
            }
        }
        Ok(array.with_inner_code(ExecutableCode::new(items)))
    }
}

fn modifier_of(token: &Token) -> Option<Modifier> {
    Some(match token {
        Token::Public => Modifier::PUBLIC,
        Token::Internal => Modifier::INTERNAL,
        Token::Protected => Modifier::PROTECTED,
        Token::Private => Modifier::PRIVATE,
        Token::Static => Modifier::STATIC,
        Token::Abstract => Modifier::ABSTRACT,
        Token::Final => Modifier::FINAL,
        Token::Native => Modifier::NATIVE,
        Token::Synchronized => Modifier::SYNCHRONIZED,
        _ => return None,
    })
}

fn control(kind: BytecodeKind) -> StatementComponent {
    StatementComponent::new(ComponentRole::Code, kind)
}

/// Collapse an operand into one component.
fn single(mut comps: Vec<StatementComponent>) -> StatementComponent {
    if comps.len() == 1 {
        if let Some(comp) = comps.pop() {
            return comp;
        }
    }
    StatementComponent::parentheses(Statement::expression(comps))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script_body(source: &str) -> ExecutableCode {
        let classes = compile("test.kscr", source).unwrap();
        assert_eq!(classes.len(), 1);
        match classes[0].member("main") {
            Some(MemberDecl::Method(m)) => m.body.clone().unwrap(),
            other => panic!("expected main method, got {other:?}"),
        }
    }

    fn render_component(comp: &StatementComponent, depth: usize, label: &str, lines: &mut Vec<String>) {
        lines.push(format!("{}{}{}", "  ".repeat(depth), label, comp));
        for stmt in [&comp.sub_statement, &comp.alt_statement].into_iter().flatten() {
            for c in &stmt.main {
                render_component(c, depth + 1, "", lines);
            }
        }
        if let Some(sub) = &comp.sub_component {
            render_component(sub, depth + 1, "sub: ", lines);
        }
        if let Some(post) = &comp.post_component {
            render_component(post, depth, "post: ", lines);
        }
    }

    fn render(stmt: &Statement) -> String {
        let mut lines = Vec::new();
        for c in &stmt.main {
            render_component(c, 0, "", &mut lines);
        }
        lines.join("\n")
    }

    #[test]
    fn test_script_wraps_statements_in_main() {
        let classes = compile("test.kscr", "return 1;").unwrap();
        assert_eq!(classes[0].name, SCRIPT_CLASS);
        let Some(MemberDecl::Method(main)) = classes[0].member("main") else {
            panic!("missing main");
        };
        assert!(main.modifier.is_static());
        assert_eq!(main.body.as_ref().unwrap().main.len(), 1);
    }

    #[test]
    fn test_precedence_snapshot() {
        let body = script_body("2 + 3 * 4;");
        insta::assert_snapshot!(render(&body.main[0]), @r###"
        Expression:LiteralNumeric(2)
        Operator:Operator<Plus|binary>
          sub: Expression:Parentheses
            Expression:LiteralNumeric(3)
            Operator:Operator<Multiply|binary>
              sub: Expression:LiteralNumeric(4)
        "###);
    }

    #[test]
    fn test_left_associative_subtraction() {
        let body = script_body("10 - 4 - 3;");
        let main = &body.main[0].main;
        assert_eq!(main.len(), 3);
        assert_eq!(main[1].operator(), Operator::MINUS | Operator::BINARY);
        assert_eq!(main[2].sub_component.as_ref().unwrap().arg, "3");
    }

    #[test]
    fn test_pow_word_and_caret_are_the_same_operator() {
        for source in ["return 2 pow 3;", "return 2 ^ 3;"] {
            let body = script_body(source);
            let value = body.main[0].main[0].sub_statement.as_ref().unwrap();
            assert_eq!(value.main.len(), 2, "{source}");
            assert_eq!(value.main[1].operator(), Operator::POW | Operator::BINARY, "{source}");
        }
    }

    #[test]
    fn test_declaration_statement() {
        let body = script_body("int x = 5;");
        let stmt = &body.main[0];
        assert_eq!(stmt.target_type, "int");
        let decl = &stmt.main[0];
        assert_eq!(decl.kind, BytecodeKind::Assignment);
        assert_eq!(decl.args, vec!["int".to_string(), "x".to_string()]);
        assert_eq!(decl.sub_component.as_ref().unwrap().arg, "5");
    }

    #[test]
    fn test_generic_declaration_splits_shift_token() {
        let body = script_body("Sequence<Sequence<int>> s = null;");
        assert_eq!(body.main[0].main[0].args[0], "Sequence<Sequence<int>>");
    }

    #[test]
    fn test_less_than_is_not_a_declaration() {
        let body = script_body("i < 5;");
        let main = &body.main[0].main;
        assert_eq!(main[0].kind, BytecodeKind::ExpressionVariable);
        assert_eq!(main[1].operator(), Operator::LESSER | Operator::BINARY);
    }

    #[test]
    fn test_member_calls_chain_as_post_components() {
        let body = script_body("stdio << x.toString().length();");
        insta::assert_snapshot!(render(&body.main[0]), @r###"
        Expression:StdioExpression
        Emitter:Expression
          sub: Provider:ExpressionVariable(x)
          post: Expression:Call(toString)
            sub: Code:ParameterExpression
          post: Expression:Call(length)
            sub: Code:ParameterExpression
        "###);
    }

    #[test]
    fn test_postfix_and_prefix_increment() {
        let body = script_body("i++; --i;");
        let post = body.main[0].main[0].post_component.as_ref().unwrap();
        assert_eq!(post.operator(), Operator::READ_INCREMENT | Operator::UNARY_POSTFIX);
        let pre = &body.main[1].main[1];
        assert_eq!(pre.operator(), Operator::DECREMENT_READ | Operator::UNARY_PREFIX);
    }

    #[test]
    fn test_compound_assignment() {
        let body = script_body("x += 2;");
        let op = &body.main[0].main[1];
        assert!(op.operator().is_compound());
        assert_eq!(op.operator().base(), Operator::PLUS);
    }

    #[test]
    fn test_if_else_chain() {
        let body = script_body("if (a) return 1; else if (b) return 2; else { return 3; }");
        let comp = &body.main[0].main[0];
        assert_eq!(comp.kind, BytecodeKind::StmtIf);
        let otherwise = comp.sub_component.as_ref().unwrap();
        assert_eq!(otherwise.kind, BytecodeKind::StmtElse);
        let nested = &otherwise.inner_code.as_ref().unwrap().main[0].main[0];
        assert_eq!(nested.kind, BytecodeKind::StmtIf);
        assert!(nested.sub_component.is_some());
    }

    #[test]
    fn test_for_loop_clauses() {
        let body = script_body("for (int i = 0; i < 5; i++) { x++; }");
        let comp = &body.main[0].main[0];
        assert_eq!(comp.kind, BytecodeKind::StmtFor);
        assert!(comp.sub_statement.is_some());
        assert_eq!(comp.sub_component.as_ref().unwrap().kind, BytecodeKind::Parentheses);
        assert!(comp.alt_statement.is_some());
        assert_eq!(comp.inner_code.as_ref().unwrap().main.len(), 1);
    }

    #[test]
    fn test_foreach_with_and_without_type() {
        let body = script_body("foreach (int i : 0~3) {} foreach (j : xs) {}");
        let typed = &body.main[0].main[0];
        assert_eq!(typed.arg, "i");
        assert_eq!(typed.args, vec!["int".to_string()]);
        let source = &typed.sub_statement.as_ref().unwrap().main[0];
        assert_eq!(source.kind, BytecodeKind::LiteralRange);
        let untyped = &body.main[1].main[0];
        assert_eq!(untyped.arg, "j");
        assert!(untyped.args.is_empty());
    }

    #[test]
    fn test_try_catch_finally_chain() {
        let body = script_body("try { throw 1; } catch (Exception | Error e) { } catch (x) { } finally { }");
        let stmt = &body.main[0];
        assert_eq!(stmt.main[0].kind, BytecodeKind::StmtTry);
        let first = stmt.catch_finally.as_ref().unwrap();
        assert_eq!(first.kind, BytecodeKind::StmtCatch);
        assert_eq!(first.args, vec!["Exception".to_string(), "Error".to_string()]);
        assert_eq!(first.arg, "e");
        let second = first.alt_component.as_ref().unwrap();
        assert!(second.args.is_empty());
        assert_eq!(second.arg, "x");
        let last = second.alt_component.as_ref().unwrap();
        assert_eq!(last.kind, BytecodeKind::StmtFinally);
        assert!(last.alt_component.is_none());
    }

    #[test]
    fn test_try_with_resources() {
        let body = script_body("try (Res a = new Res(); Res b = new Res()) { }");
        let resources = body.main[0].main[0].sub_statement.as_ref().unwrap();
        assert_eq!(resources.main.len(), 2);
        assert_eq!(resources.main[1].args[1], "b");
    }

    #[test]
    fn test_pipe_consumer_and_listener() {
        let body = script_body("stdio >> str line; xs >> x -> x * 2;");
        let consumer = &body.main[0].main[1];
        assert_eq!(consumer.role, ComponentRole::Consumer);
        assert_eq!(consumer.args, vec!["str".to_string(), "line".to_string()]);
        let listener = &body.main[1].main[1];
        assert_eq!((listener.role, listener.kind), (ComponentRole::Pipe, BytecodeKind::Lambda));
        assert_eq!(listener.arg, "x");
        assert_eq!(listener.sub_statement.as_ref().unwrap().main.len(), 2);
    }

    #[test]
    fn test_array_constructors() {
        let body = script_body("new int[3]; new str[] { \"a\", \"b\" };");
        let sized = &body.main[0].main[0];
        assert_eq!(sized.kind, BytecodeKind::ArrayConstructor);
        assert_eq!(sized.arg, "int");
        assert!(sized.sub_component.is_some());
        let listed = &body.main[1].main[0];
        assert_eq!(listed.inner_code.as_ref().unwrap().main.len(), 2);
    }

    #[test]
    fn test_class_members() {
        let source = r#"
            package demo;
            import demo.other.*;

            public class Counter<T> extends Base implements Closable {
                private int count = 0;
                public int Twice { get { return count * 2; } }
                public static int created;

                static { created = 0; }

                public Counter(int start) { count = start; }

                public int next() { return count++; }
                public abstract void close();
            }
        "#;
        let classes = compile("Counter.kscr", source).unwrap();
        let class = &classes[0];
        assert_eq!(class.full_name(), "demo.Counter");
        assert_eq!(class.type_params[0].name, "T");
        assert_eq!(class.superclasses, vec!["Base".to_string()]);
        assert_eq!(class.interfaces, vec!["Closable".to_string()]);
        assert!(class.member(CONSTRUCTOR_NAME).is_some());
        assert!(class.member(STATIC_INITIALIZER_NAME).is_some());

        let Some(MemberDecl::Property(twice)) = class.member("Twice") else {
            panic!("missing property");
        };
        assert!(twice.gettable && !twice.settable);
        assert!(twice.getter.is_some());

        let Some(MemberDecl::Property(count)) = class.member("count") else {
            panic!("missing field");
        };
        assert!(count.initializer.is_some());
        assert!(count.settable);

        let Some(MemberDecl::Method(close)) = class.member("close") else {
            panic!("missing method");
        };
        assert!(close.body.is_none());
        assert!(close.modifier.is_abstract());
    }

    #[test]
    fn test_duplicate_member_rejected() {
        let err = compile("a.kscr", "class A { int x; int x; }").unwrap_err();
        assert!(err.message().contains("duplicate member"));
    }

    #[test]
    fn test_invalid_numeric_literal() {
        let err = compile("a.kscr", "return 300b;").unwrap_err();
        assert!(matches!(err, CompileError::Parser { .. }));
    }

    #[test]
    fn test_missing_semicolon_reports_position() {
        let err = compile("a.kscr", "int x = 1\nreturn x;").unwrap_err();
        assert_eq!(err.span(), Some(Span::new(10, 16)));
        assert!(err.message().contains("';'"));
    }

    #[test]
    fn test_positions_are_recorded() {
        let body = script_body("\n  throw 3;");
        let pos = &body.main[0].main[0].position;
        assert_eq!((pos.line, pos.column), (2, 3));
    }
}
