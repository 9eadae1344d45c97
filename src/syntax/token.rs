//! Tokens of the clause language
use codespan::Span;

use super::span::HasSpan;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenClass {
    Symbol,
    /// Quoted string
    Literal,
    Operator,
    /// Punctuation with syntactic meaning
    Special,
    ClauseEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSubclass {
    None,
    /// Symbol starting with a letter
    Variable,
    /// Symbol starting with a digit
    Number,
    /// `.name`
    Environment,
    Comma,
    OpenParen,
    CloseParen,
    Tilde,
    DoubleTilde,
    Colon,
    DoubleColon,
    Semicolon,
    LineEnd,
    EndOfFile,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub class: TokenClass,
    pub subclass: TokenSubclass,
    /// Source text; string literals hold their content, environment
    /// symbols their name without the period
    pub text: String,
    pub span: Span,
    /// Whether whitespace separates this token from the previous one
    pub blank_before: bool,
}

impl Token {
    pub fn new(
        class: TokenClass,
        subclass: TokenSubclass,
        text: String,
        span: Span,
        blank_before: bool,
    ) -> Self {
        Token {
            class,
            subclass,
            text,
            span,
            blank_before,
        }
    }

    pub fn is(&self, subclass: TokenSubclass) -> bool {
        self.subclass == subclass
    }

    pub fn is_clause_end(&self) -> bool {
        self.class == TokenClass::ClauseEnd
    }

    /// A simple symbol whose uppercased text is `word`
    pub fn is_word(&self, word: &str) -> bool {
        self.class == TokenClass::Symbol
            && self.subclass == TokenSubclass::Variable
            && self.text.eq_ignore_ascii_case(word)
    }

    pub fn is_operator(&self, text: &str) -> bool {
        self.class == TokenClass::Operator && self.text == text
    }

    /// Tokens which can begin a term (and so imply concatenation
    /// after an operand)
    pub fn starts_term(&self) -> bool {
        match self.class {
            TokenClass::Symbol | TokenClass::Literal => true,
            TokenClass::Special => self.subclass == TokenSubclass::OpenParen,
            _ => false,
        }
    }

    /// Uppercased text of a symbol
    pub fn name(&self) -> String {
        self.text.to_uppercase()
    }
}

impl HasSpan for Token {
    fn span(&self) -> Span {
        self.span
    }
}
