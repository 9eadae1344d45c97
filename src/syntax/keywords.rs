//! Static keyword and operator tables
//!
//! Every table is sorted by length then content and searched by
//! binary search, in the same order as the builtin function table.

use crate::eval::{
    expr::expression::{BinaryOp, PrefixOp},
    machine::builtins::table_order,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Call,
    Do,
    Else,
    End,
    Exit,
    Expose,
    If,
    Nop,
    Numeric,
    Otherwise,
    Return,
    Say,
    Select,
    Then,
    Use,
    When,
}

pub static KEYWORDS: [(&str, Keyword); 16] = [
    ("DO", Keyword::Do),
    ("IF", Keyword::If),
    ("END", Keyword::End),
    ("NOP", Keyword::Nop),
    ("SAY", Keyword::Say),
    ("USE", Keyword::Use),
    ("CALL", Keyword::Call),
    ("ELSE", Keyword::Else),
    ("EXIT", Keyword::Exit),
    ("THEN", Keyword::Then),
    ("WHEN", Keyword::When),
    ("EXPOSE", Keyword::Expose),
    ("RETURN", Keyword::Return),
    ("SELECT", Keyword::Select),
    ("NUMERIC", Keyword::Numeric),
    ("OTHERWISE", Keyword::Otherwise),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Attribute,
    Class,
    Method,
    Routine,
}

pub static DIRECTIVES: [(&str, Directive); 4] = [
    ("CLASS", Directive::Class),
    ("METHOD", Directive::Method),
    ("ROUTINE", Directive::Routine),
    ("ATTRIBUTE", Directive::Attribute),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubKeyword {
    Arg,
    Case,
    Digits,
    Engineering,
    Form,
    Fuzz,
    Public,
    Scientific,
    Subclass,
    Value,
}

pub static SUB_KEYWORDS: [(&str, SubKeyword); 10] = [
    ("ARG", SubKeyword::Arg),
    ("CASE", SubKeyword::Case),
    ("FORM", SubKeyword::Form),
    ("FUZZ", SubKeyword::Fuzz),
    ("VALUE", SubKeyword::Value),
    ("DIGITS", SubKeyword::Digits),
    ("PUBLIC", SubKeyword::Public),
    ("SUBCLASS", SubKeyword::Subclass),
    ("SCIENTIFIC", SubKeyword::Scientific),
    ("ENGINEERING", SubKeyword::Engineering),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operator {
    pub binary: Option<BinaryOp>,
    pub prefix: Option<PrefixOp>,
}

const fn binary(op: BinaryOp) -> Operator {
    Operator {
        binary: Some(op),
        prefix: None,
    }
}

pub static OPERATORS: [(&str, Operator); 24] = [
    ("%", binary(BinaryOp::IntegerDivide)),
    ("&", binary(BinaryOp::And)),
    ("*", binary(BinaryOp::Multiply)),
    (
        "+",
        Operator {
            binary: Some(BinaryOp::Add),
            prefix: Some(PrefixOp::Plus),
        },
    ),
    (
        "-",
        Operator {
            binary: Some(BinaryOp::Subtract),
            prefix: Some(PrefixOp::Minus),
        },
    ),
    ("/", binary(BinaryOp::Divide)),
    ("<", binary(BinaryOp::Less)),
    ("=", binary(BinaryOp::Equal)),
    (">", binary(BinaryOp::Greater)),
    (
        "\\",
        Operator {
            binary: None,
            prefix: Some(PrefixOp::Not),
        },
    ),
    ("|", binary(BinaryOp::Or)),
    ("&&", binary(BinaryOp::Xor)),
    ("**", binary(BinaryOp::Power)),
    ("//", binary(BinaryOp::Remainder)),
    ("<<", binary(BinaryOp::StrictLess)),
    ("<=", binary(BinaryOp::LessEqual)),
    ("<>", binary(BinaryOp::NotEqual)),
    ("==", binary(BinaryOp::StrictEqual)),
    ("><", binary(BinaryOp::NotEqual)),
    (">=", binary(BinaryOp::GreaterEqual)),
    (">>", binary(BinaryOp::StrictGreater)),
    ("\\=", binary(BinaryOp::NotEqual)),
    ("||", binary(BinaryOp::Concat)),
    ("\\==", binary(BinaryOp::StrictNotEqual)),
];

/// The longest operator is three characters
pub const MAX_OPERATOR_LEN: usize = 3;

fn search<T: Copy>(table: &[(&'static str, T)], name: &str) -> Option<T> {
    table
        .binary_search_by(|(entry, _)| table_order(entry, name))
        .ok()
        .map(|i| table[i].1)
}

/// Instruction keyword for an (uppercased) symbol
pub fn keyword(name: &str) -> Option<Keyword> {
    search(&KEYWORDS, name)
}

pub fn directive(name: &str) -> Option<Directive> {
    search(&DIRECTIVES, name)
}

pub fn sub_keyword(name: &str) -> Option<SubKeyword> {
    search(&SUB_KEYWORDS, name)
}

pub fn operator(text: &str) -> Option<Operator> {
    search(&OPERATORS, text)
}

/// Binding strength of a binary operator (higher binds tighter)
pub fn precedence(op: BinaryOp) -> u8 {
    match op {
        BinaryOp::Or | BinaryOp::Xor => 1,
        BinaryOp::And => 2,
        BinaryOp::Equal
        | BinaryOp::NotEqual
        | BinaryOp::Greater
        | BinaryOp::Less
        | BinaryOp::GreaterEqual
        | BinaryOp::LessEqual
        | BinaryOp::StrictEqual
        | BinaryOp::StrictNotEqual
        | BinaryOp::StrictGreater
        | BinaryOp::StrictLess => 3,
        BinaryOp::Concat | BinaryOp::BlankConcat | BinaryOp::Abut => 4,
        BinaryOp::Add | BinaryOp::Subtract => 5,
        BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::IntegerDivide | BinaryOp::Remainder => 6,
        BinaryOp::Power => 7,
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::cmp::Ordering;

    fn sorted<T>(table: &[(&str, T)]) -> bool {
        table
            .windows(2)
            .all(|pair| table_order(pair[0].0, pair[1].0) == Ordering::Less)
    }

    #[test]
    pub fn test_tables_are_sorted() {
        assert!(sorted(&KEYWORDS));
        assert!(sorted(&DIRECTIVES));
        assert!(sorted(&SUB_KEYWORDS));
        assert!(sorted(&OPERATORS));
    }

    #[test]
    pub fn test_lookups() {
        assert_eq!(keyword("OTHERWISE"), Some(Keyword::Otherwise));
        assert_eq!(keyword("say"), None);
        assert_eq!(directive("ROUTINE"), Some(Directive::Routine));
        assert_eq!(sub_keyword("ENGINEERING"), Some(SubKeyword::Engineering));
        assert_eq!(operator("\\==").and_then(|o| o.binary), Some(BinaryOp::StrictNotEqual));
        assert_eq!(operator("\\").and_then(|o| o.prefix), Some(PrefixOp::Not));
        assert_eq!(operator("=>"), None);
    }

    #[test]
    pub fn test_operator_lengths() {
        assert!(OPERATORS.iter().all(|(s, _)| s.len() <= MAX_OPERATOR_LEN));
    }
}
