//! Lexer for the clause language
//!
//! Produces a flat vector of tokens in which clause boundaries
//! (semicolons, line ends and the end of input) are explicit tokens.
use crate::syntax::{
    error::SyntaxError,
    keywords::{self, MAX_OPERATOR_LEN},
    token::{Token, TokenClass, TokenSubclass},
};
use codespan::{ByteIndex, Span};
use std::{iter::Peekable, str::CharIndices};

pub struct Lexer<'text> {
    file_id: usize,
    text: &'text str,
    chars: Peekable<CharIndices<'text>>,
    /// whitespace seen since the last token
    blank: bool,
    tokens: Vec<Token>,
}

/// is c a character which can appear in a symbol?
pub fn is_symbol_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '!' | '?' | '_')
}

/// is c a character which can start a variable symbol?
pub fn is_variable_start(c: char) -> bool {
    c.is_ascii_alphabetic() || matches!(c, '!' | '?' | '_')
}

fn is_operator_char(c: char) -> bool {
    matches!(
        c,
        '%' | '&' | '*' | '+' | '-' | '/' | '<' | '=' | '>' | '\\' | '|'
    )
}

fn index(i: usize) -> ByteIndex {
    ByteIndex(i as u32)
}

impl<'text> Lexer<'text> {
    pub fn new(file_id: usize, text: &'text str) -> Self {
        Lexer {
            file_id,
            text,
            chars: text.char_indices().peekable(),
            blank: false,
            tokens: vec![],
        }
    }

    /// Access file_id for error reporting etc.
    pub fn file_id(&self) -> usize {
        self.file_id
    }

    /// move one character forward, returning index of the read char
    /// and the char
    fn bump(&mut self) -> Option<(usize, char)> {
        self.chars.next()
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    /// byte offset of the next unread character
    fn location(&mut self) -> usize {
        match self.chars.peek() {
            Some(&(i, _)) => i,
            None => self.text.len(),
        }
    }

    /// the character after next
    fn peek_second(&self) -> Option<char> {
        let mut ahead = self.chars.clone();
        ahead.next();
        ahead.next().map(|(_, c)| c)
    }

    /// consume characters matching predicate and return the next index
    fn consume<P>(&mut self, predicate: P) -> usize
    where
        P: Fn(char) -> bool,
    {
        while let Some(c) = self.peek() {
            if !predicate(c) {
                break;
            }
            self.bump();
        }
        self.location()
    }

    fn push(&mut self, class: TokenClass, subclass: TokenSubclass, text: String, s: usize, e: usize) {
        let blank_before = std::mem::take(&mut self.blank);
        self.tokens.push(Token::new(
            class,
            subclass,
            text,
            Span::new(index(s), index(e)),
            blank_before,
        ));
    }

    fn special(&mut self, subclass: TokenSubclass, s: usize, e: usize) {
        let text = self.text[s..e].to_string();
        self.push(TokenClass::Special, subclass, text, s, e);
    }

    /// A line end terminates a clause unless the line ends in a comma
    fn line_end(&mut self, i: usize) {
        match self.tokens.last() {
            Some(t) if t.is(TokenSubclass::Comma) => {
                self.tokens.pop();
                self.blank = true;
            }
            _ => {
                self.push(
                    TokenClass::ClauseEnd,
                    TokenSubclass::LineEnd,
                    String::new(),
                    i,
                    i + 1,
                );
            }
        }
    }

    /// consume a (possibly nested) block comment, the opening `/*`
    /// already read
    fn block_comment(&mut self, start: usize) -> Result<(), SyntaxError> {
        self.bump();
        let mut depth = 1;
        while depth > 0 {
            match self.bump() {
                Some((_, '*')) if self.peek() == Some('/') => {
                    self.bump();
                    depth -= 1;
                }
                Some((_, '/')) if self.peek() == Some('*') => {
                    self.bump();
                    depth += 1;
                }
                Some(_) => {}
                None => {
                    return Err(SyntaxError::UnterminatedComment(
                        self.file_id,
                        Span::new(index(start), index(start + 2)),
                    ))
                }
            }
        }
        Ok(())
    }

    /// consume a string literal with doubled quotes as escapes
    fn string(&mut self, start: usize, quote: char) -> Result<(), SyntaxError> {
        let mut content = String::new();
        loop {
            match self.bump() {
                Some((_, c)) if c == quote => {
                    if self.peek() == Some(quote) {
                        self.bump();
                        content.push(quote);
                    } else {
                        break;
                    }
                }
                Some((_, '\n')) | None => {
                    return Err(SyntaxError::UnterminatedString(
                        self.file_id,
                        Span::new(index(start), index(start + 1)),
                    ))
                }
                Some((_, c)) => content.push(c),
            }
        }
        let e = self.location();
        self.push(TokenClass::Literal, TokenSubclass::None, content, start, e);
        Ok(())
    }

    /// consume a symbol, allowing a signed exponent in numbers
    fn symbol(&mut self, start: usize, first: char) {
        let mut e = self.consume(is_symbol_char);
        let numeric = first.is_ascii_digit() || first == '.';
        if numeric
            && self.text[start..e].ends_with(['e', 'E'])
            && self.text[start..e.saturating_sub(1)]
                .chars()
                .all(|c| c.is_ascii_digit() || c == '.')
            && matches!(self.peek(), Some('+') | Some('-'))
            && self.peek_second().map_or(false, |c| c.is_ascii_digit())
        {
            self.bump();
            e = self.consume(|c| c.is_ascii_digit());
        }

        let source = self.text;
        let text = &source[start..e];
        if first == '.' && text.len() > 1 && !text[1..2].starts_with(|c: char| c.is_ascii_digit())
        {
            let name = text[1..].to_string();
            self.push(TokenClass::Symbol, TokenSubclass::Environment, name, start, e);
        } else if numeric {
            let text = text.to_string();
            self.push(TokenClass::Symbol, TokenSubclass::Number, text, start, e);
        } else {
            let text = text.to_string();
            self.push(TokenClass::Symbol, TokenSubclass::Variable, text, start, e);
        }
    }

    /// longest operator matching the input, the first character
    /// already read
    fn operator(&mut self, start: usize) -> Result<(), SyntaxError> {
        let mut ahead = self.chars.clone();
        let mut end = start + 1;
        let mut best = None;
        if keywords::operator(&self.text[start..end]).is_some() {
            best = Some(end);
        }
        for _ in 1..MAX_OPERATOR_LEN {
            match ahead.next() {
                Some((i, c)) if is_operator_char(c) => {
                    end = i + c.len_utf8();
                    if keywords::operator(&self.text[start..end]).is_some() {
                        best = Some(end);
                    }
                }
                _ => break,
            }
        }

        match best {
            Some(e) => {
                while self.location() < e {
                    self.bump();
                }
                let text = self.text[start..e].to_string();
                self.push(TokenClass::Operator, TokenSubclass::None, text, start, e);
                Ok(())
            }
            None => {
                let c = self.text[start..].chars().next().unwrap_or_default();
                Err(SyntaxError::UnexpectedCharacter(self.file_id, c, index(start)))
            }
        }
    }

    /// Tokenise the whole input, ending with an end-of-file token
    pub fn tokenize(mut self) -> Result<Vec<Token>, SyntaxError> {
        while let Some((i, c)) = self.bump() {
            match c {
                '\n' => self.line_end(i),
                c if c.is_whitespace() => self.blank = true,
                '/' if self.peek() == Some('*') => self.block_comment(i)?,
                '-' if self.peek() == Some('-') => {
                    self.consume(|c| c != '\n');
                }
                ';' => self.push(
                    TokenClass::ClauseEnd,
                    TokenSubclass::Semicolon,
                    ";".to_string(),
                    i,
                    i + 1,
                ),
                '\'' | '"' => self.string(i, c)?,
                '(' => self.special(TokenSubclass::OpenParen, i, i + 1),
                ')' => self.special(TokenSubclass::CloseParen, i, i + 1),
                ',' => self.special(TokenSubclass::Comma, i, i + 1),
                '~' if self.peek() == Some('~') => {
                    self.bump();
                    self.special(TokenSubclass::DoubleTilde, i, i + 2);
                }
                '~' => self.special(TokenSubclass::Tilde, i, i + 1),
                ':' if self.peek() == Some(':') => {
                    self.bump();
                    self.special(TokenSubclass::DoubleColon, i, i + 2);
                }
                ':' => self.special(TokenSubclass::Colon, i, i + 1),
                c if is_symbol_char(c) => self.symbol(i, c),
                c if is_operator_char(c) => self.operator(i)?,
                c => return Err(SyntaxError::UnexpectedCharacter(self.file_id, c, index(i))),
            }
        }
        let e = self.text.len();
        self.push(
            TokenClass::ClauseEnd,
            TokenSubclass::EndOfFile,
            String::new(),
            e,
            e,
        );
        Ok(self.tokens)
    }
}

/// Tokenise a source text
pub fn tokenize(file_id: usize, text: &str) -> Result<Vec<Token>, SyntaxError> {
    Lexer::new(file_id, text).tokenize()
}

#[cfg(test)]
pub mod tests {
    use super::*;

    fn subclasses(text: &str) -> Vec<TokenSubclass> {
        tokenize(0, text)
            .unwrap()
            .into_iter()
            .map(|t| t.subclass)
            .collect()
    }

    fn texts(text: &str) -> Vec<String> {
        tokenize(0, text)
            .unwrap()
            .into_iter()
            .filter(|t| !t.is_clause_end())
            .map(|t| t.text)
            .collect()
    }

    #[test]
    pub fn test_simple_clause() {
        use TokenSubclass::*;
        assert_eq!(
            subclasses("say 'hello' name;"),
            vec![Variable, None, Variable, Semicolon, EndOfFile]
        );
    }

    #[test]
    pub fn test_blank_before() {
        let tokens = tokenize(0, "a b||c").unwrap();
        let blanks: Vec<_> = tokens.iter().map(|t| t.blank_before).collect();
        assert_eq!(blanks, vec![false, true, false, false, false]);
    }

    #[test]
    pub fn test_string_escapes() {
        assert_eq!(texts("'it''s' \"a\"\"b\""), vec!["it's", "a\"b"]);
    }

    #[test]
    pub fn test_unterminated_string() {
        assert!(matches!(
            tokenize(0, "say 'oops"),
            Err(SyntaxError::UnterminatedString(0, _))
        ));
    }

    #[test]
    pub fn test_nested_comments() {
        assert_eq!(texts("a /* x /* y */ z */ b -- tail"), vec!["a", "b"]);
        assert!(matches!(
            tokenize(0, "/* /* */"),
            Err(SyntaxError::UnterminatedComment(0, _))
        ));
    }

    #[test]
    pub fn test_operators_longest_match() {
        assert_eq!(texts("a\\==b"), vec!["a", "\\==", "b"]);
        assert_eq!(texts("a**b//c||d"), vec!["a", "**", "b", "//", "c", "||", "d"]);
        assert_eq!(texts("a>=b<>c"), vec!["a", ">=", "b", "<>", "c"]);
    }

    #[test]
    pub fn test_numbers_and_environment() {
        use TokenSubclass::*;
        assert_eq!(texts("1.5e+3 .nil 2"), vec!["1.5e+3", "nil", "2"]);
        assert_eq!(subclasses(".nil .5"), vec![Environment, Number, EndOfFile]);
        assert_eq!(texts("1e+x"), vec!["1e", "+", "x"]);
    }

    #[test]
    pub fn test_line_ends_and_continuation() {
        use TokenSubclass::*;
        assert_eq!(
            subclasses("a\nb ,\n c"),
            vec![Variable, LineEnd, Variable, Variable, EndOfFile]
        );
    }

    #[test]
    pub fn test_message_punctuation() {
        use TokenSubclass::*;
        assert_eq!(
            subclasses("x~~y:z ::class"),
            vec![Variable, DoubleTilde, Variable, Colon, Variable, DoubleColon, Variable, EndOfFile]
        );
    }

    #[test]
    pub fn test_unexpected_character() {
        assert_eq!(
            tokenize(3, "a # b"),
            Err(SyntaxError::UnexpectedCharacter(3, '#', ByteIndex(2)))
        );
    }
}
