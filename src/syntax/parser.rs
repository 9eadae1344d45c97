//! Clause parser
//!
//! Parses a token vector clause by clause, handing instructions to a
//! [`CodeBuilder`] in source order and sections (main code, routines,
//! classes, methods) to a [`PackageBuilder`]. Expressions are parsed
//! by precedence climbing directly into heap expression nodes.

use codespan::Span;

use crate::{
    common::sourcemap::{SourceMap, Smid},
    eval::{
        code::{
            builder::CodeBuilder,
            instruction::{FormOption, InstructionKind, NumericOption},
            package::PackageBuilder,
        },
        expr::expression::{BinaryOp, Special},
        machine::builtins,
        memory::{
            heap::Heap,
            mutator::MutatorHeapView,
            object::ObjRef,
        },
    },
    syntax::{
        error::{ParseError, SyntaxError},
        keywords::{self, Directive, Keyword, SubKeyword},
        lexer::{is_variable_start, tokenize},
        span::HasSpan,
        token::{Token, TokenClass, TokenSubclass},
    },
};

/// The unit that clauses are currently added to
enum Section {
    Main,
    Routine { name: String, public: bool },
    Method { class: ObjRef, name: String },
    /// A directive which takes no code
    Declaration(&'static str),
}

/// Open DO and SELECT groups, used to pick the form of WHEN
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Group {
    Do,
    Select { case: bool },
}

pub struct Parser<'heap, 'map> {
    heap: &'heap Heap,
    source_map: &'map mut SourceMap,
    file_id: usize,
    tokens: Vec<Token>,
    position: usize,
    package: PackageBuilder<'heap>,
    code: CodeBuilder<'heap>,
    section: Section,
    groups: Vec<Group>,
    class: Option<ObjRef>,
    /// Words ending the expression being parsed (THEN in IF and WHEN)
    terminators: &'static [&'static str],
}

const THEN: &[&str] = &["THEN"];

impl<'heap, 'map> Parser<'heap, 'map> {
    pub fn new(
        heap: &'heap Heap,
        source_map: &'map mut SourceMap,
        file_id: usize,
        tokens: Vec<Token>,
        name: &str,
    ) -> Self {
        Parser {
            heap,
            source_map,
            file_id,
            tokens,
            position: 0,
            package: PackageBuilder::new(heap, name),
            code: CodeBuilder::new(heap),
            section: Section::Main,
            groups: vec![],
            class: None,
            terminators: &[],
        }
    }

    fn view(&self) -> MutatorHeapView<'heap> {
        self.code.view()
    }

    fn peek(&self) -> &Token {
        self.peek_nth(0)
    }

    /// Token `n` ahead, never beyond the end-of-file token
    fn peek_nth(&self, n: usize) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[(self.position + n).min(last)]
    }

    fn next(&mut self) -> Token {
        let token = self.peek().clone();
        if !token.is(TokenSubclass::EndOfFile) {
            self.position += 1;
        }
        token
    }

    fn try_accept(&mut self, subclass: TokenSubclass) -> bool {
        if self.peek().is(subclass) {
            self.next();
            true
        } else {
            false
        }
    }

    fn try_accept_word(&mut self, word: &str) -> bool {
        if self.peek().is_word(word) {
            self.next();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, subclass: TokenSubclass, what: &'static str) -> Result<Token, ParseError> {
        if self.peek().is(subclass) {
            Ok(self.next())
        } else {
            Err(SyntaxError::ExpectedToken(self.file_id, self.peek().span, what).into())
        }
    }

    fn smid(&mut self, span: Span) -> Smid {
        self.source_map.add(self.file_id, span)
    }

    /// Smid covering the tokens consumed since `start`
    fn smid_from(&mut self, start: usize) -> Smid {
        let end = self.position.max(start + 1).min(self.tokens.len());
        let span = self.tokens[start..end].span();
        self.smid(span)
    }

    fn at_clause_end(&self) -> bool {
        self.peek().is_clause_end()
    }

    fn expect_clause_end(&mut self) -> Result<(), ParseError> {
        if self.at_clause_end() {
            self.next();
            Ok(())
        } else {
            let token = self.peek();
            Err(SyntaxError::UnexpectedToken(self.file_id, token.span, describe(token)).into())
        }
    }

    fn at_terminator(&self) -> bool {
        let token = self.peek();
        token.class == TokenClass::Symbol
            && token.subclass == TokenSubclass::Variable
            && self.terminators.iter().any(|w| token.is_word(w))
    }

    /// Parse with the given terminator words in force
    fn with_terminators<T>(
        &mut self,
        terminators: &'static [&'static str],
        f: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        let saved = std::mem::replace(&mut self.terminators, terminators);
        let result = f(self);
        self.terminators = saved;
        result
    }

    /// Parse the whole token stream into a package
    pub fn parse(mut self) -> Result<ObjRef, ParseError> {
        loop {
            while self.at_clause_end() && !self.peek().is(TokenSubclass::EndOfFile) {
                self.next();
            }
            if self.peek().is(TokenSubclass::EndOfFile) {
                break;
            }
            if self.peek().is(TokenSubclass::DoubleColon) {
                self.directive()?;
            } else {
                self.clause()?;
            }
        }
        self.close_section()?;
        Ok(self.package.finish()?)
    }

    /// Finish the code of the current section and hand it to the
    /// package
    fn close_section(&mut self) -> Result<(), ParseError> {
        let code = std::mem::replace(&mut self.code, CodeBuilder::new(self.heap));
        let block = code.finish()?;
        self.groups.clear();
        match std::mem::replace(&mut self.section, Section::Main) {
            Section::Main => self.package.main(block),
            Section::Routine { name, public } => {
                self.package.routine(&name, public, block)?;
            }
            Section::Method { class, name } => {
                self.package.method(class, &name, block)?;
            }
            Section::Declaration(_) => {}
        }
        Ok(())
    }

    /// A directive or routine name: a symbol or a string
    fn name(&mut self, what: &'static str) -> Result<String, ParseError> {
        let token = self.peek();
        match token.class {
            TokenClass::Symbol if token.subclass == TokenSubclass::Variable => {
                Ok(self.next().name())
            }
            TokenClass::Literal => Ok(self.next().text),
            _ => Err(SyntaxError::ExpectedToken(self.file_id, token.span, what).into()),
        }
    }

    fn directive(&mut self) -> Result<(), ParseError> {
        let start = self.position;
        self.next();
        let word = self.next();
        let directive = match keywords::directive(&word.name()) {
            Some(d) if word.class == TokenClass::Symbol => d,
            _ => {
                return Err(
                    SyntaxError::UnknownDirective(self.file_id, word.span, word.text).into(),
                )
            }
        };

        self.close_section()?;
        self.section = match directive {
            Directive::Routine => {
                let name = self.name("routine name")?;
                let public = self.try_accept_word("PUBLIC");
                Section::Routine { name, public }
            }
            Directive::Class => {
                let name = self.name("class name")?;
                let superclass = if self.try_accept_word("SUBCLASS") {
                    Some(self.name("superclass name")?)
                } else {
                    None
                };
                let smid = self.smid_from(start);
                self.class = Some(self.package.class(smid, &name, superclass.as_deref())?);
                Section::Declaration("CLASS")
            }
            Directive::Method => {
                let class = self.directive_class(start, "METHOD")?;
                let name = self.name("method name")?;
                Section::Method { class, name }
            }
            Directive::Attribute => {
                let class = self.directive_class(start, "ATTRIBUTE")?;
                let name = self.name("attribute name")?;
                self.package.attribute(class, &name)?;
                Section::Declaration("ATTRIBUTE")
            }
        };
        self.expect_clause_end()
    }

    fn directive_class(&mut self, start: usize, what: &'static str) -> Result<ObjRef, ParseError> {
        self.class.ok_or_else(|| {
            let span = self.tokens[start..self.position].span();
            SyntaxError::MethodOutsideClass(self.file_id, span, what).into()
        })
    }

    /// Parse one clause. Labels and the THEN, ELSE and OTHERWISE
    /// keywords are clauses in their own right and need no clause end
    /// before the clause they introduce.
    fn clause(&mut self) -> Result<(), ParseError> {
        if let Section::Declaration(what) = self.section {
            return Err(SyntaxError::CodeAfterDirective(self.file_id, self.peek().span, what).into());
        }

        let first = self.peek().clone();
        let second = self.peek_nth(1).clone();

        if first.class == TokenClass::Symbol && second.is(TokenSubclass::Colon) {
            let start = self.position;
            self.next();
            self.next();
            let smid = self.smid_from(start);
            self.code.label(smid, &first.name())?;
            return Ok(());
        }

        if first.class == TokenClass::Symbol && second.is_operator("=") {
            return self.assignment();
        }

        if first.is(TokenSubclass::Variable) {
            if let Some(keyword) = keywords::keyword(&first.name()) {
                return self.instruction(keyword);
            }
        }

        self.message_clause()
    }

    fn assignment(&mut self) -> Result<(), ParseError> {
        let start = self.position;
        let target = self.next();
        if !target.is(TokenSubclass::Variable) {
            return Err(SyntaxError::InvalidVariable(
                self.file_id,
                target.span,
                describe(&target),
            )
            .into());
        }
        self.next();
        let value = self.expression()?;
        let smid = self.smid_from(start);
        self.code.instruction(
            smid,
            InstructionKind::Assignment {
                name: target.name(),
                value,
            },
        )?;
        self.expect_clause_end()
    }

    /// A clause which is a message send, or a message assignment
    /// `target~name = value`
    fn message_clause(&mut self) -> Result<(), ParseError> {
        let start = self.position;
        let term = self.unary()?;

        if self.peek().is_operator("=") && self.is_message(term)? {
            self.next();
            let value = self.expression()?;
            let smid = self.smid_from(start);
            let send = self.setter(smid, term)?;
            self.code
                .instruction(smid, InstructionKind::MessageAssignment { send, value })?;
            return self.expect_clause_end();
        }

        let expr = self.climb(term, 0)?;
        if !self.is_message(expr)? {
            let span = self.tokens[start..self.position.max(start + 1)].span();
            return Err(SyntaxError::UnsupportedClause(self.file_id, span).into());
        }
        let smid = self.smid_from(start);
        self.code
            .instruction(smid, InstructionKind::Message { send: expr })?;
        self.expect_clause_end()
    }

    fn is_message(&self, expr: ObjRef) -> Result<bool, ParseError> {
        Ok(self
            .heap
            .get(expr)?
            .expression()?
            .as_message_send()
            .is_some())
    }

    /// Rebuild a send `target~name` as the setter send `target~name=`
    fn setter(&mut self, smid: Smid, send: ObjRef) -> Result<ObjRef, ParseError> {
        let cell = self.heap.get(send)?;
        let expr = cell.expression()?;
        match expr.as_message_send() {
            Some(send) => Ok(self.view().message_send(
                smid,
                send.target(),
                &format!("{}=", send.verb()),
                send.scope(),
                send.args().to_vec(),
                false,
            )?),
            None => Err(SyntaxError::UnsupportedClause(self.file_id, self.peek().span).into()),
        }
    }

    fn optional_expression(&mut self) -> Result<Option<ObjRef>, ParseError> {
        if self.at_clause_end() {
            Ok(None)
        } else {
            self.expression().map(Some)
        }
    }

    fn instruction(&mut self, keyword: Keyword) -> Result<(), ParseError> {
        let start = self.position;
        let token = self.next();

        match keyword {
            Keyword::Nop => {
                let smid = self.smid_from(start);
                self.code.instruction(smid, InstructionKind::Nop)?;
            }
            Keyword::Say => {
                let value = self.optional_expression()?;
                let smid = self.smid_from(start);
                self.code.instruction(smid, InstructionKind::Say { value })?;
            }
            Keyword::Return => {
                let value = self.optional_expression()?;
                let smid = self.smid_from(start);
                self.code.instruction(smid, InstructionKind::Return { value })?;
            }
            Keyword::Exit => {
                let value = self.optional_expression()?;
                let smid = self.smid_from(start);
                self.code.instruction(smid, InstructionKind::Exit { value })?;
            }
            Keyword::Call => {
                let target = self.peek().clone();
                let name = self.name("routine name")?;
                let target_smid = self.smid(target.span);
                let args = self.arguments(None)?;
                let call = self.function_call(
                    target_smid,
                    &name,
                    target.class == TokenClass::Literal,
                    args,
                )?;
                let smid = self.smid_from(start);
                self.code.instruction(smid, InstructionKind::Call { call })?;
            }
            Keyword::Use => {
                let arg = self.next();
                if !arg.is_word("ARG") {
                    return Err(
                        SyntaxError::ExpectedToken(self.file_id, arg.span, "ARG").into(),
                    );
                }
                let mut names = vec![];
                if !self.at_clause_end() {
                    loop {
                        names.push(self.variable_name()?);
                        if !self.try_accept(TokenSubclass::Comma) {
                            break;
                        }
                    }
                }
                let smid = self.smid_from(start);
                self.code
                    .instruction(smid, InstructionKind::UseArg { names })?;
            }
            Keyword::Expose => {
                let mut names = vec![];
                while !self.at_clause_end() {
                    names.push(self.variable_name()?);
                }
                let smid = self.smid_from(start);
                self.code.instruction(smid, InstructionKind::Expose { names })?;
            }
            Keyword::Numeric => {
                let option = self.numeric_option()?;
                let smid = self.smid_from(start);
                self.code
                    .instruction(smid, InstructionKind::Numeric(option))?;
            }
            Keyword::If => {
                let condition = self.with_terminators(THEN, |p| p.expression())?;
                let smid = self.smid_from(start);
                self.code.if_(smid, condition)?;
                return Ok(());
            }
            Keyword::Then => {
                let smid = self.smid(token.span);
                self.code.then_(smid)?;
                return Ok(());
            }
            Keyword::Else => {
                let smid = self.smid(token.span);
                self.code.else_(smid)?;
                return Ok(());
            }
            Keyword::Otherwise => {
                let smid = self.smid(token.span);
                self.code.otherwise(smid)?;
                return Ok(());
            }
            Keyword::Select => {
                let case = if self.try_accept_word("CASE") {
                    Some(self.expression()?)
                } else {
                    None
                };
                let smid = self.smid_from(start);
                self.code.select(smid, case)?;
                self.groups.push(Group::Select {
                    case: case.is_some(),
                });
            }
            Keyword::When => {
                let in_case = matches!(self.groups.last(), Some(Group::Select { case: true }));
                if in_case {
                    let candidates = self.with_terminators(THEN, |p| {
                        let mut candidates = vec![p.expression()?];
                        while p.try_accept(TokenSubclass::Comma) {
                            candidates.push(p.expression()?);
                        }
                        Ok(candidates)
                    })?;
                    let smid = self.smid_from(start);
                    self.code.case_when(smid, candidates)?;
                } else {
                    let condition = self.with_terminators(THEN, |p| p.expression())?;
                    let smid = self.smid_from(start);
                    self.code.when(smid, condition)?;
                }
                return Ok(());
            }
            Keyword::Do => {
                let smid = self.smid_from(start);
                self.code.do_(smid)?;
                self.groups.push(Group::Do);
            }
            Keyword::End => {
                if self.peek().is(TokenSubclass::Variable) {
                    self.next();
                }
                let smid = self.smid_from(start);
                self.code.end_(smid)?;
                self.groups.pop();
            }
        }

        self.expect_clause_end()
    }

    fn variable_name(&mut self) -> Result<String, ParseError> {
        let token = self.next();
        if token.is(TokenSubclass::Variable) && token.text.starts_with(is_variable_start) {
            Ok(token.name())
        } else {
            Err(SyntaxError::InvalidVariable(self.file_id, token.span, describe(&token)).into())
        }
    }

    fn numeric_option(&mut self) -> Result<NumericOption, ParseError> {
        let token = self.next();
        match keywords::sub_keyword(&token.name()) {
            Some(SubKeyword::Digits) => Ok(NumericOption::Digits(self.optional_expression()?)),
            Some(SubKeyword::Fuzz) => Ok(NumericOption::Fuzz(self.optional_expression()?)),
            Some(SubKeyword::Form) if token.class == TokenClass::Symbol => {
                let form = if self.at_clause_end() {
                    FormOption::Default
                } else {
                    let word = self.peek().clone();
                    match keywords::sub_keyword(&word.name()) {
                        Some(SubKeyword::Scientific) => {
                            self.next();
                            FormOption::Scientific
                        }
                        Some(SubKeyword::Engineering) => {
                            self.next();
                            FormOption::Engineering
                        }
                        Some(SubKeyword::Value) => {
                            self.next();
                            FormOption::Value(self.expression()?)
                        }
                        _ => FormOption::Value(self.expression()?),
                    }
                };
                Ok(NumericOption::Form(form))
            }
            _ => Err(SyntaxError::ExpectedToken(self.file_id, token.span, "DIGITS, FUZZ or FORM")
                .into()),
        }
    }

    /// Parse a complete expression
    pub fn expression(&mut self) -> Result<ObjRef, ParseError> {
        let left = self.unary()?;
        self.climb(left, 0)
    }

    /// The binary operator that continues an expression at the current
    /// token, and whether it is an explicit operator token
    fn peek_binary(&self) -> Option<(BinaryOp, bool)> {
        let token = self.peek();
        match token.class {
            TokenClass::Operator => keywords::operator(&token.text)
                .and_then(|o| o.binary)
                .map(|op| (op, true)),
            _ if token.starts_term() && !self.at_terminator() => {
                if token.blank_before {
                    Some((BinaryOp::BlankConcat, false))
                } else {
                    Some((BinaryOp::Abut, false))
                }
            }
            _ => None,
        }
    }

    /// Precedence climbing over binary operators binding tighter than
    /// `min`; all operators associate to the left
    fn climb(&mut self, mut left: ObjRef, min: u8) -> Result<ObjRef, ParseError> {
        while let Some((op, explicit)) = self.peek_binary() {
            let precedence = keywords::precedence(op);
            if precedence <= min {
                break;
            }
            let span = self.peek().span;
            if explicit {
                self.next();
            }
            let operand = self.unary()?;
            let right = self.climb(operand, precedence)?;
            let smid = self.smid(span);
            left = self.view().binary(smid, op, left, right)?;
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<ObjRef, ParseError> {
        let token = self.peek();
        if token.class == TokenClass::Operator {
            if let Some(op) = keywords::operator(&token.text).and_then(|o| o.prefix) {
                let token = self.next();
                let operand = self.unary()?;
                let smid = self.smid(token.span);
                return Ok(self.view().prefix(smid, op, operand)?);
            }
        }
        self.postfix()
    }

    /// A primary term followed by any message sends
    fn postfix(&mut self) -> Result<ObjRef, ParseError> {
        let mut target = self.primary()?;
        loop {
            let cascade = if self.peek().is(TokenSubclass::Tilde) {
                false
            } else if self.peek().is(TokenSubclass::DoubleTilde) {
                true
            } else {
                break;
            };
            let start = self.position;
            self.next();
            let verb = self.name("message name")?;
            let scope = if self.try_accept(TokenSubclass::Colon) {
                Some(self.primary()?)
            } else {
                None
            };
            let args = if self.at_call_paren() {
                self.next();
                self.arguments(Some(TokenSubclass::CloseParen))?
            } else {
                vec![]
            };
            let smid = self.smid_from(start);
            target = self
                .view()
                .message_send(smid, target, &verb, scope, args, cascade)?;
        }
        Ok(target)
    }

    /// `(` abutting the previous token opens an argument list
    fn at_call_paren(&self) -> bool {
        let token = self.peek();
        token.is(TokenSubclass::OpenParen) && !token.blank_before
    }

    /// Comma separated arguments, any of which may be omitted, up to
    /// the closing token or (without one) the clause end
    fn arguments(
        &mut self,
        close: Option<TokenSubclass>,
    ) -> Result<Vec<Option<ObjRef>>, ParseError> {
        self.with_terminators(&[], |p| {
            let at_close = |p: &Self| match close {
                Some(subclass) => p.peek().is(subclass),
                None => p.at_clause_end(),
            };

            let mut args = vec![];
            if !at_close(p) {
                loop {
                    if p.peek().is(TokenSubclass::Comma) || at_close(p) {
                        args.push(None);
                    } else {
                        args.push(Some(p.expression()?));
                    }
                    if !p.try_accept(TokenSubclass::Comma) {
                        break;
                    }
                }
            }
            if let Some(subclass) = close {
                p.expect(subclass, "closing parenthesis")?;
            }
            Ok(args)
        })
    }

    fn function_call(
        &mut self,
        smid: Smid,
        name: &str,
        quoted: bool,
        args: Vec<Option<ObjRef>>,
    ) -> Result<ObjRef, ParseError> {
        let builtin = builtins::lookup(name);
        let call = self
            .view()
            .function_call(smid, name, quoted, builtin, args)?;
        self.code.call_site(call);
        Ok(call)
    }

    fn primary(&mut self) -> Result<ObjRef, ParseError> {
        let token = self.peek().clone();
        match (token.class, token.subclass) {
            (TokenClass::Literal, _) => {
                self.next();
                let smid = self.smid(token.span);
                if self.at_call_paren() {
                    self.next();
                    let args = self.arguments(Some(TokenSubclass::CloseParen))?;
                    self.function_call(smid, &token.text, true, args)
                } else {
                    Ok(self.view().literal_at(smid, &token.text)?)
                }
            }
            (TokenClass::Symbol, TokenSubclass::Variable) => {
                self.next();
                let smid = self.smid(token.span);
                let name = token.name();
                if self.at_call_paren() {
                    self.next();
                    let args = self.arguments(Some(TokenSubclass::CloseParen))?;
                    return self.function_call(smid, &name, false, args);
                }
                let view = self.view();
                Ok(match name.as_str() {
                    "SELF" => view.special(smid, Special::SelfRef)?,
                    "SUPER" => view.special(smid, Special::Super)?,
                    _ => view.variable(smid, &name)?,
                })
            }
            (TokenClass::Symbol, TokenSubclass::Number) => {
                self.next();
                let smid = self.smid(token.span);
                Ok(self.view().literal_at(smid, &token.name())?)
            }
            (TokenClass::Symbol, TokenSubclass::Environment) => {
                self.next();
                let smid = self.smid(token.span);
                Ok(self.view().environment(smid, &token.text)?)
            }
            (TokenClass::Special, TokenSubclass::OpenParen) => {
                self.next();
                let inner = self.with_terminators(&[], |p| p.expression())?;
                self.expect(TokenSubclass::CloseParen, "closing parenthesis")?;
                Ok(inner)
            }
            _ => Err(SyntaxError::ExpectedExpression(self.file_id, token.span).into()),
        }
    }
}

fn describe(token: &Token) -> String {
    match token.subclass {
        TokenSubclass::LineEnd => "end of line".to_string(),
        TokenSubclass::EndOfFile => "end of input".to_string(),
        _ => format!("'{}'", token.text),
    }
}

/// Parse source text into a package on the heap
pub fn parse_package(
    heap: &Heap,
    source_map: &mut SourceMap,
    file_id: usize,
    text: &str,
    name: &str,
) -> Result<ObjRef, ParseError> {
    let tokens = tokenize(file_id, text)?;
    Parser::new(heap, source_map, file_id, tokens, name).parse()
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::eval::{
        code::builder::BuildError,
        emit::{lines, CapturingEmitter},
        error::ExecutionError,
        machine::vm::{Machine, MachineSettings},
    };

    fn machine() -> Machine<'static> {
        Machine::new(Box::new(CapturingEmitter::default()), MachineSettings::default()).unwrap()
    }

    fn parse(m: &Machine, text: &str) -> Result<ObjRef, ParseError> {
        let mut map = SourceMap::new();
        parse_package(m.heap(), &mut map, 0, text, "test")
    }

    fn run(text: &str) -> Result<Vec<String>, ExecutionError> {
        let mut m = machine();
        let package = parse(&m, text).unwrap();
        m.run_package(package, &[])?;
        Ok(lines(m.captures()))
    }

    fn output(text: &str) -> Vec<String> {
        run(text).unwrap()
    }

    #[test]
    pub fn test_say_and_assignment() {
        assert_eq!(
            output("x = 3\nsay 'x is' x\nsay x||x (x + 1) * 2"),
            vec!["x is 3", "33 8"]
        );
    }

    #[test]
    pub fn test_precedence() {
        assert_eq!(output("say 1 + 2 * 3 ** 2"), vec!["19"]);
        assert_eq!(output("say -2 ** 2"), vec!["4"]);
        assert_eq!(output("say 2 + 3 = 5 & 1"), vec!["1"]);
        assert_eq!(output("say 7 // 2 7 % 2"), vec!["1 3"]);
    }

    #[test]
    pub fn test_if_then_else() {
        assert_eq!(output("IF 1=2 THEN SAY 'A'; ELSE SAY 'B'"), vec!["B"]);
        assert_eq!(
            output("if 1 then\n  say 'yes'\nelse\n  say 'no'\nsay 'done'"),
            vec!["yes", "done"]
        );
    }

    #[test]
    pub fn test_select_forms() {
        let plain = "x = 2\nselect\n when x = 1 then say 'one'\n when x = 2 then say 'two'\n otherwise say 'many'\nend";
        assert_eq!(output(plain), vec!["two"]);

        let case = "select case 'b'\n when 'a', 'b' then do\n say 'ab'\n say 'still'\n end\n otherwise say 'other'\nend";
        assert_eq!(output(case), vec!["ab", "still"]);

        let otherwise = "select case 9; when 1 then nop; otherwise say 'x'; say 'y'; end";
        assert_eq!(output(otherwise), vec!["x", "y"]);
    }

    #[test]
    pub fn test_labels_and_internal_calls() {
        let text = "call twice 'ab'\nsay result\nsay twice('x')\nexit\ntwice: use arg s\nreturn s || s";
        assert_eq!(output(text), vec!["abab", "xx"]);
    }

    #[test]
    pub fn test_routines_and_classes() {
        let text = "\
say greet('world')
c = .counter~new
c~value = 4
say c~value
say c~~bump~value
::routine greet public
  use arg who
  return 'hello' who
::class counter
::attribute value
::method bump
  self~value = self~value + 1
";
        assert_eq!(output(text), vec!["hello world", "4", "5"]);
    }

    #[test]
    pub fn test_numeric_and_builtins() {
        assert_eq!(
            output("numeric digits 4\nsay 2/3\nsay length('abc') substr('hello', 2, 3)"),
            vec!["0.6667", "3 ell"]
        );
    }

    #[test]
    pub fn test_numeric_conflict() {
        match run("numeric fuzz 5\nnumeric digits 5") {
            Err(e) => assert_eq!(e.code().to_string(), "33.1"),
            Ok(lines) => panic!("expected error, got {:?}", lines),
        }
    }

    #[test]
    pub fn test_syntax_errors() {
        let m = machine();
        assert!(matches!(
            parse(&m, "say (1 + 2"),
            Err(ParseError::Syntax(SyntaxError::ExpectedToken(..)))
        ));
        assert!(matches!(
            parse(&m, "1 + 2"),
            Err(ParseError::Syntax(SyntaxError::UnsupportedClause(..)))
        ));
        assert!(matches!(
            parse(&m, "3 = 4"),
            Err(ParseError::Syntax(SyntaxError::InvalidVariable(..)))
        ));
        assert!(matches!(
            parse(&m, "::method lonely"),
            Err(ParseError::Syntax(SyntaxError::MethodOutsideClass(..)))
        ));
        assert!(matches!(
            parse(&m, "::frobnicate"),
            Err(ParseError::Syntax(SyntaxError::UnknownDirective(..)))
        ));
        assert!(matches!(
            parse(&m, "::class a\n::attribute b\nsay 1"),
            Err(ParseError::Syntax(SyntaxError::CodeAfterDirective(..)))
        ));
    }

    #[test]
    pub fn test_block_errors() {
        let m = machine();
        assert!(matches!(
            parse(&m, "else say 1"),
            Err(ParseError::Build(BuildError::UnexpectedElse(_)))
        ));
        assert!(matches!(
            parse(&m, "do\nsay 1"),
            Err(ParseError::Build(BuildError::Unclosed(_, "DO")))
        ));
        assert!(matches!(
            parse(&m, "if 1\nsay 2"),
            Err(ParseError::Build(BuildError::ThenExpected(_)))
        ));
    }

    #[test]
    pub fn test_diagnostic_locates_clause() {
        let mut m = machine();
        let mut map = SourceMap::new();
        let package = parse_package(m.heap(), &mut map, 0, "say 'a'\nsay 1/0", "test").unwrap();
        let error = m.run_package(package, &[]).unwrap_err();
        let diagnostic = error.to_diagnostic(&map);
        assert_eq!(diagnostic.labels.len(), 1);
        let range = diagnostic.labels[0].range.clone();
        assert!(range.start >= 8 && range.end <= 15);
    }
}
