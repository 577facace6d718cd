use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ExprError;

#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    Number(f64),
    Str(String),
    Name(String),
    Sym(&'static str),
}

const SYMBOLS: &[&str] = &[
    "==", "!=", "<=", ">=", "&&", "||", "+", "-", "*", "/", "%", "<", ">", "!", "(", ")", "[",
    "]", ".", ",",
];

static TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r#"^(?:(?P<ws>\s+)"#,
        r#"|(?P<num>\d+(?:\.\d+)?(?:[eE][+-]?\d+)?)"#,
        r#"|(?P<str>"(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)*')"#,
        r#"|(?P<name>\$?[A-Za-z_][A-Za-z0-9_]*)"#,
        r#"|(?P<sym>==|!=|<=|>=|&&|\|\||[-+*/%<>!()\[\].,]))"#,
    ))
    .expect("token pattern is valid")
});

/// Tokens paired with their byte offset in `src`.
pub fn tokenize(src: &str) -> Result<Vec<(usize, Token)>, ExprError> {
    let mut out = Vec::new();
    let mut at = 0;
    while at < src.len() {
        let rest = &src[at..];
        let Some(caps) = TOKEN.captures(rest) else {
            let found = rest.chars().next().unwrap_or(' ');
            return Err(ExprError::Parse {
                expression: src.to_string(),
                at,
                message: format!("unexpected character `{found}`"),
            });
        };
        let whole = caps.get(0).map_or(0, |m| m.end());
        if let Some(m) = caps.name("num") {
            let n = m.as_str().parse::<f64>().map_err(|e| ExprError::Parse {
                expression: src.to_string(),
                at,
                message: e.to_string(),
            })?;
            out.push((at, Token::Number(n)));
        } else if let Some(m) = caps.name("str") {
            out.push((at, Token::Str(unquote(m.as_str()))));
        } else if let Some(m) = caps.name("name") {
            out.push((at, Token::Name(m.as_str().to_string())));
        } else if let Some(m) = caps.name("sym") {
            let sym = SYMBOLS.iter().find(|s| **s == m.as_str()).copied().unwrap_or("?");
            out.push((at, Token::Sym(sym)));
        }
        at += whole;
    }
    Ok(out)
}

fn unquote(lit: &str) -> String {
    let inner = &lit[1..lit.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}
