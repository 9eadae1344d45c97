//! Builtin functions
//!
//! The table is sorted by name length then content so that the
//! parser can find a builtin's index by binary search.

use std::cmp::Ordering;

use crate::{
    common::sourcemap::Smid,
    eval::{
        error::ExecutionError,
        expr::arith::{format_number, parse_number, parse_whole},
        memory::object::ObjRef,
    },
};

use super::vm::Machine;

pub type BuiltinFn =
    fn(&mut Machine, Smid, &[Option<ObjRef>]) -> Result<ObjRef, ExecutionError>;

pub struct Builtin {
    pub name: &'static str,
    pub function: BuiltinFn,
}

pub static BUILTINS: [Builtin; 10] = [
    Builtin {
        name: "ABS",
        function: abs,
    },
    Builtin {
        name: "ARG",
        function: arg,
    },
    Builtin {
        name: "MAX",
        function: max,
    },
    Builtin {
        name: "MIN",
        function: min,
    },
    Builtin {
        name: "WORD",
        function: word,
    },
    Builtin {
        name: "COPIES",
        function: copies,
    },
    Builtin {
        name: "DIGITS",
        function: digits,
    },
    Builtin {
        name: "LENGTH",
        function: length,
    },
    Builtin {
        name: "SUBSTR",
        function: substr,
    },
    Builtin {
        name: "REVERSE",
        function: reverse,
    },
];

/// Order by length, then by content
pub fn table_order(a: &str, b: &str) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Find the index of a builtin by (uppercase) name
pub fn lookup(name: &str) -> Option<usize> {
    BUILTINS
        .binary_search_by(|b| table_order(b.name, name))
        .ok()
}

pub fn names() -> Vec<String> {
    BUILTINS.iter().map(|b| b.name.to_string()).collect()
}

fn incorrect(smid: Smid, name: &str, message: String) -> ExecutionError {
    ExecutionError::IncorrectCall(smid, name.to_string(), message)
}

fn arity(
    smid: Smid,
    name: &str,
    args: &[Option<ObjRef>],
    min: usize,
    max: usize,
) -> Result<(), ExecutionError> {
    if args.len() > max {
        return Err(incorrect(
            smid,
            name,
            format!("too many arguments (maximum {})", max),
        ));
    }
    for i in 0..min {
        if args.get(i).copied().flatten().is_none() {
            return Err(incorrect(smid, name, format!("missing argument {}", i + 1)));
        }
    }
    Ok(())
}

fn text(
    machine: &Machine,
    args: &[Option<ObjRef>],
    i: usize,
) -> Result<Option<String>, ExecutionError> {
    match args.get(i).copied().flatten() {
        Some(r) => Ok(Some(machine.text(r)?)),
        None => Ok(None),
    }
}

fn required_text(
    machine: &Machine,
    smid: Smid,
    name: &str,
    args: &[Option<ObjRef>],
    i: usize,
) -> Result<String, ExecutionError> {
    text(machine, args, i)?
        .ok_or_else(|| incorrect(smid, name, format!("missing argument {}", i + 1)))
}

fn whole(
    machine: &Machine,
    smid: Smid,
    name: &str,
    args: &[Option<ObjRef>],
    i: usize,
    minimum: i64,
) -> Result<Option<usize>, ExecutionError> {
    match text(machine, args, i)? {
        None => Ok(None),
        Some(t) => match parse_whole(&t) {
            Some(n) if n >= minimum => Ok(Some(n as usize)),
            _ => Err(incorrect(
                smid,
                name,
                format!(
                    "argument {} must be a whole number not less than {}; found \"{}\"",
                    i + 1,
                    minimum,
                    t
                ),
            )),
        },
    }
}

fn number(
    machine: &Machine,
    smid: Smid,
    name: &str,
    args: &[Option<ObjRef>],
    i: usize,
) -> Result<f64, ExecutionError> {
    let t = required_text(machine, smid, name, args, i)?;
    parse_number(&t).ok_or_else(|| {
        incorrect(
            smid,
            name,
            format!("argument {} must be a number; found \"{}\"", i + 1, t),
        )
    })
}

fn numeric_result(machine: &mut Machine, value: f64) -> Result<ObjRef, ExecutionError> {
    let formatted = format_number(value, &machine.settings());
    machine.new_string(formatted)
}

fn abs(machine: &mut Machine, smid: Smid, args: &[Option<ObjRef>]) -> Result<ObjRef, ExecutionError> {
    arity(smid, "ABS", args, 1, 1)?;
    let n = number(machine, smid, "ABS", args, 0)?;
    numeric_result(machine, n.abs())
}

/// `ARG()`, `ARG(n)` or `ARG(n, 'E'|'O')`
fn arg(machine: &mut Machine, smid: Smid, args: &[Option<ObjRef>]) -> Result<ObjRef, ExecutionError> {
    arity(smid, "ARG", args, 0, 2)?;
    let caller_args = machine.current_args()?;
    let index = whole(machine, smid, "ARG", args, 0, 1)?;
    let option = text(machine, args, 1)?;

    match (index, option) {
        (None, None) => machine.new_string(caller_args.len().to_string()),
        (None, Some(_)) => Err(incorrect(smid, "ARG", "missing argument 1".to_string())),
        (Some(n), None) => match caller_args.get(n - 1).copied().flatten() {
            Some(value) => Ok(value),
            None => machine.new_string(""),
        },
        (Some(n), Some(option)) => {
            let exists = caller_args.get(n - 1).copied().flatten().is_some();
            match option.trim().chars().next().map(|c| c.to_ascii_uppercase()) {
                Some('E') => Ok(machine.known().boolean(exists)),
                Some('O') => Ok(machine.known().boolean(!exists)),
                _ => Err(incorrect(
                    smid,
                    "ARG",
                    format!("option must be E or O; found \"{}\"", option),
                )),
            }
        }
    }
}

fn extreme(
    machine: &mut Machine,
    smid: Smid,
    name: &str,
    args: &[Option<ObjRef>],
    pick: fn(f64, f64) -> f64,
) -> Result<ObjRef, ExecutionError> {
    if args.is_empty() {
        return Err(incorrect(smid, name, "missing argument 1".to_string()));
    }
    let mut best = number(machine, smid, name, args, 0)?;
    for i in 1..args.len() {
        best = pick(best, number(machine, smid, name, args, i)?);
    }
    numeric_result(machine, best)
}

fn max(machine: &mut Machine, smid: Smid, args: &[Option<ObjRef>]) -> Result<ObjRef, ExecutionError> {
    extreme(machine, smid, "MAX", args, f64::max)
}

fn min(machine: &mut Machine, smid: Smid, args: &[Option<ObjRef>]) -> Result<ObjRef, ExecutionError> {
    extreme(machine, smid, "MIN", args, f64::min)
}

/// The nth blank-delimited word, or the null string
pub fn nth_word(text: &str, n: usize) -> &str {
    text.split_whitespace().nth(n.saturating_sub(1)).unwrap_or("")
}

fn word(machine: &mut Machine, smid: Smid, args: &[Option<ObjRef>]) -> Result<ObjRef, ExecutionError> {
    arity(smid, "WORD", args, 2, 2)?;
    let text = required_text(machine, smid, "WORD", args, 0)?;
    let n = whole(machine, smid, "WORD", args, 1, 1)?.unwrap_or(1);
    let w = nth_word(&text, n).to_string();
    machine.new_string(w)
}

fn copies(machine: &mut Machine, smid: Smid, args: &[Option<ObjRef>]) -> Result<ObjRef, ExecutionError> {
    arity(smid, "COPIES", args, 2, 2)?;
    let text = required_text(machine, smid, "COPIES", args, 0)?;
    let n = whole(machine, smid, "COPIES", args, 1, 0)?.unwrap_or(0);
    machine.new_string(text.repeat(n))
}

fn digits(machine: &mut Machine, smid: Smid, args: &[Option<ObjRef>]) -> Result<ObjRef, ExecutionError> {
    arity(smid, "DIGITS", args, 0, 0)?;
    let digits = machine.settings().digits;
    machine.new_string(digits.to_string())
}

fn length(machine: &mut Machine, smid: Smid, args: &[Option<ObjRef>]) -> Result<ObjRef, ExecutionError> {
    arity(smid, "LENGTH", args, 1, 1)?;
    let text = required_text(machine, smid, "LENGTH", args, 0)?;
    machine.new_string(text.chars().count().to_string())
}

/// Characters of `text` from 1-based `start`, padded with `pad` past
/// the end
pub fn substring(text: &str, start: usize, length: Option<usize>, pad: char) -> String {
    let chars: Vec<char> = text.chars().collect();
    let from = start.saturating_sub(1);
    let length = length.unwrap_or_else(|| chars.len().saturating_sub(from));
    (from..from + length)
        .map(|i| chars.get(i).copied().unwrap_or(pad))
        .collect()
}

/// Shared by the builtin and the `SUBSTR` string method
pub fn substr_args(
    machine: &Machine,
    smid: Smid,
    text: &str,
    args: &[Option<ObjRef>],
) -> Result<String, ExecutionError> {
    arity(smid, "SUBSTR", args, 1, 3)?;
    let start = whole(machine, smid, "SUBSTR", args, 0, 1)?.unwrap_or(1);
    let length = whole(machine, smid, "SUBSTR", args, 1, 0)?;
    let pad = match text_pad(machine, smid, args, 2)? {
        Some(c) => c,
        None => ' ',
    };
    Ok(substring(text, start, length, pad))
}

fn text_pad(
    machine: &Machine,
    smid: Smid,
    args: &[Option<ObjRef>],
    i: usize,
) -> Result<Option<char>, ExecutionError> {
    match text(machine, args, i)? {
        None => Ok(None),
        Some(p) => {
            let mut chars = p.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(Some(c)),
                _ => Err(incorrect(
                    smid,
                    "SUBSTR",
                    format!("pad must be a single character; found \"{}\"", p),
                )),
            }
        }
    }
}

fn substr(machine: &mut Machine, smid: Smid, args: &[Option<ObjRef>]) -> Result<ObjRef, ExecutionError> {
    let text = required_text(machine, smid, "SUBSTR", args, 0)?;
    let result = substr_args(machine, smid, &text, args.get(1..).unwrap_or(&[]))?;
    machine.new_string(result)
}

fn reverse(machine: &mut Machine, smid: Smid, args: &[Option<ObjRef>]) -> Result<ObjRef, ExecutionError> {
    arity(smid, "REVERSE", args, 1, 1)?;
    let text = required_text(machine, smid, "REVERSE", args, 0)?;
    machine.new_string(text.chars().rev().collect::<String>())
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    pub fn test_table_is_sorted() {
        for pair in BUILTINS.windows(2) {
            assert_eq!(table_order(pair[0].name, pair[1].name), Ordering::Less);
        }
    }

    #[test]
    pub fn test_lookup() {
        assert_eq!(lookup("ABS"), Some(0));
        assert_eq!(lookup("REVERSE"), Some(9));
        assert_eq!(lookup("LENGTH"), Some(7));
        assert_eq!(lookup("LENGTHS"), None);
        assert_eq!(lookup("abs"), None);
    }

    #[test]
    pub fn test_substring() {
        assert_eq!(substring("abcdef", 2, Some(3), ' '), "bcd");
        assert_eq!(substring("abc", 2, None, ' '), "bc");
        assert_eq!(substring("abc", 3, Some(4), '.'), "c...");
        assert_eq!(substring("abc", 5, None, ' '), "");
    }

    #[test]
    pub fn test_nth_word() {
        assert_eq!(nth_word("  the quick  brown ", 2), "quick");
        assert_eq!(nth_word("one", 2), "");
    }
}
