//! Expression evaluation.
//!
//! The engine substitutes variables and command results into the
//! expression text first, so this module sees plain text and evaluates
//! it over a small typed domain: integers, doubles, and strings.
//! Integer arithmetic stays integral until a double enters; comparison
//! operators compare numerically when both sides parse as numbers and
//! lexically otherwise; `eq`/`ne` always compare as strings.
//!
//! Logical `&&`/`||` short-circuit: the right operand is not evaluated
//! when the left already decides the result.

use std::fmt;

use crate::interpreter::result::{ErrorInfo, ErrorKind};

/// A computed expression value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Double(f64),
    Str(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{i}"),
            Value::Double(d) => {
                if d.fract() == 0.0 && d.is_finite() && d.abs() < 1e17 {
                    write!(f, "{d:.1}")
                } else {
                    write!(f, "{d}")
                }
            }
            Value::Str(s) => f.write_str(s),
        }
    }
}

impl Value {
    fn from_bool(b: bool) -> Value {
        Value::Int(i64::from(b))
    }

    /// Numeric reading of the value, if it has one.
    fn as_number(&self) -> Option<Value> {
        match self {
            Value::Int(_) | Value::Double(_) => Some(self.clone()),
            Value::Str(s) => parse_number(s),
        }
    }

    /// Interpret as a condition.
    pub fn truthy(&self) -> Result<bool, ErrorInfo> {
        match self.as_number() {
            Some(Value::Int(i)) => Ok(i != 0),
            Some(Value::Double(d)) => Ok(d != 0.0),
            _ => {
                let text = self.to_string();
                match text.to_ascii_lowercase().as_str() {
                    "true" | "yes" | "on" => Ok(true),
                    "false" | "no" | "off" => Ok(false),
                    _ => Err(ErrorInfo::with_kind(
                        format!("expected boolean value but got \"{text}\""),
                        ErrorKind::Parse,
                    )),
                }
            }
        }
    }
}

fn parse_number(s: &str) -> Option<Value> {
    let t = s.trim();
    if t.is_empty() {
        return None;
    }
    if let Some(hex) = t
        .strip_prefix("0x")
        .or_else(|| t.strip_prefix("0X"))
        .or_else(|| t.strip_prefix("-0x").map(|_| &t[3..]))
    {
        let value = i64::from_str_radix(hex, 16).ok()?;
        return Some(Value::Int(if t.starts_with('-') { -value } else { value }));
    }
    if let Ok(i) = t.parse::<i64>() {
        return Some(Value::Int(i));
    }
    if let Ok(d) = t.parse::<f64>() {
        return Some(Value::Double(d));
    }
    None
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(Value),
    Str(String),
    Word(String), // function name, eq/ne, or bare string
    Op(&'static str),
    LParen,
    RParen,
    Comma,
}

fn err_parse(message: impl Into<String>) -> ErrorInfo {
    ErrorInfo::with_kind(message, ErrorKind::Parse)
}

fn tokenize(text: &str) -> Result<Vec<Token>, ErrorInfo> {
    let chars: Vec<char> = text.chars().collect();
    let mut out = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\r' | '\n' => i += 1,
            '(' => {
                out.push(Token::LParen);
                i += 1;
            }
            ')' => {
                out.push(Token::RParen);
                i += 1;
            }
            ',' => {
                out.push(Token::Comma);
                i += 1;
            }
            '"' | '{' => {
                let close = if c == '"' { '"' } else { '}' };
                let mut s = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        Some(&ch) if ch == close => {
                            i += 1;
                            break;
                        }
                        Some(&ch) => {
                            s.push(ch);
                            i += 1;
                        }
                        None => {
                            return Err(err_parse(format!(
                                "unterminated string in expression \"{text}\""
                            )))
                        }
                    }
                }
                out.push(Token::Str(s));
            }
            '0'..='9' => {
                let start = i;
                if c == '0' && matches!(chars.get(i + 1), Some('x' | 'X')) {
                    i += 2;
                    while chars.get(i).is_some_and(|c| c.is_ascii_hexdigit()) {
                        i += 1;
                    }
                } else {
                    while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
                        i += 1;
                    }
                    if chars.get(i) == Some(&'.') {
                        i += 1;
                        while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
                            i += 1;
                        }
                    }
                    if matches!(chars.get(i), Some('e' | 'E')) {
                        i += 1;
                        if matches!(chars.get(i), Some('+' | '-')) {
                            i += 1;
                        }
                        while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
                            i += 1;
                        }
                    }
                }
                let lexeme: String = chars[start..i].iter().collect();
                let value = parse_number(&lexeme).ok_or_else(|| {
                    err_parse(format!("invalid number \"{lexeme}\""))
                })?;
                out.push(Token::Number(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while chars
                    .get(i)
                    .is_some_and(|c| c.is_ascii_alphanumeric() || *c == '_')
                {
                    i += 1;
                }
                out.push(Token::Word(chars[start..i].iter().collect()));
            }
            _ => {
                let two: String = chars[i..(i + 2).min(chars.len())].iter().collect();
                let op2 = match two.as_str() {
                    "==" | "!=" | "<=" | ">=" | "&&" | "||" | "<<" | ">>" | "**" => {
                        Some(match two.as_str() {
                            "==" => "==",
                            "!=" => "!=",
                            "<=" => "<=",
                            ">=" => ">=",
                            "&&" => "&&",
                            "||" => "||",
                            "<<" => "<<",
                            ">>" => ">>",
                            _ => "**",
                        })
                    }
                    _ => None,
                };
                if let Some(op) = op2 {
                    out.push(Token::Op(op));
                    i += 2;
                    continue;
                }
                let op1 = match c {
                    '+' => "+",
                    '-' => "-",
                    '*' => "*",
                    '/' => "/",
                    '%' => "%",
                    '<' => "<",
                    '>' => ">",
                    '&' => "&",
                    '|' => "|",
                    '^' => "^",
                    '!' => "!",
                    '~' => "~",
                    _ => {
                        return Err(err_parse(format!(
                            "invalid character \"{c}\" in expression"
                        )))
                    }
                };
                out.push(Token::Op(op1));
                i += 1;
            }
        }
    }
    Ok(out)
}

/// Binding power for binary operators; higher binds tighter.
fn precedence(op: &str) -> Option<u8> {
    Some(match op {
        "**" => 11,
        "*" | "/" | "%" => 10,
        "+" | "-" => 9,
        "<<" | ">>" => 8,
        "<" | ">" | "<=" | ">=" => 7,
        "==" | "!=" | "eq" | "ne" => 6,
        "&" => 5,
        "^" => 4,
        "|" => 3,
        "&&" => 2,
        "||" => 1,
        _ => return None,
    })
}

struct ExprParser {
    tokens: Vec<Token>,
    pos: usize,
}

impl ExprParser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn parse_expr(&mut self, min_prec: u8) -> Result<Value, ErrorInfo> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Op(op)) => *op,
                Some(Token::Word(w)) if w == "eq" || w == "ne" => {
                    if w == "eq" {
                        "eq"
                    } else {
                        "ne"
                    }
                }
                _ => break,
            };
            let Some(prec) = precedence(op) else { break };
            if prec < min_prec {
                break;
            }
            self.next();

            // Short-circuit without evaluating the right side's effects;
            // text is already substituted, so "evaluation" here is only
            // about error surfacing, but the skip keeps div-by-zero on a
            // dead branch from failing the whole expression.
            if op == "&&" || op == "||" {
                let left = lhs.truthy()?;
                let live = (op == "&&") == left;
                let rhs = self.parse_lazy(prec + 1, live)?;
                lhs = if live {
                    Value::from_bool(rhs.truthy()?)
                } else {
                    // Already decided by the left side.
                    Value::from_bool(left)
                };
                continue;
            }

            // Exponentiation groups right-to-left; everything else left.
            let next_min = if op == "**" { prec } else { prec + 1 };
            let rhs = self.parse_expr(next_min)?;
            lhs = apply_binary(op, lhs, rhs)?;
        }
        Ok(lhs)
    }

    /// Parse the right side of a logical operator. When `live` is false
    /// the operand is only parsed: evaluation errors (division by zero
    /// and the like) on a dead branch are ignored, syntax errors are not.
    fn parse_lazy(&mut self, min_prec: u8, live: bool) -> Result<Value, ErrorInfo> {
        match self.parse_expr(min_prec) {
            Ok(v) => Ok(v),
            Err(e) if live || e.kind == ErrorKind::Parse => Err(e),
            Err(_) => Ok(Value::Int(0)),
        }
    }

    fn parse_unary(&mut self) -> Result<Value, ErrorInfo> {
        match self.next() {
            Some(Token::Number(v)) => Ok(v),
            Some(Token::Str(s)) => Ok(Value::Str(s)),
            Some(Token::LParen) => {
                let v = self.parse_expr(0)?;
                match self.next() {
                    Some(Token::RParen) => Ok(v),
                    _ => Err(err_parse("missing ) in expression")),
                }
            }
            Some(Token::Op("-")) => {
                let v = self.parse_unary()?;
                match v.as_number() {
                    Some(Value::Int(i)) => Ok(Value::Int(-i)),
                    Some(Value::Double(d)) => Ok(Value::Double(-d)),
                    _ => Err(err_parse(format!("can't negate \"{v}\""))),
                }
            }
            Some(Token::Op("+")) => self.parse_unary(),
            Some(Token::Op("!")) => {
                let v = self.parse_unary()?;
                Ok(Value::from_bool(!v.truthy()?))
            }
            Some(Token::Op("~")) => {
                let v = self.parse_unary()?;
                match v.as_number() {
                    Some(Value::Int(i)) => Ok(Value::Int(!i)),
                    _ => Err(err_parse(format!(
                        "can't use non-integer \"{v}\" with \"~\""
                    ))),
                }
            }
            Some(Token::Word(w)) => {
                if self.peek() == Some(&Token::LParen) {
                    self.next();
                    let mut args = Vec::new();
                    if self.peek() != Some(&Token::RParen) {
                        loop {
                            args.push(self.parse_expr(0)?);
                            match self.next() {
                                Some(Token::Comma) => continue,
                                Some(Token::RParen) => break,
                                _ => return Err(err_parse("missing ) in expression")),
                            }
                        }
                    } else {
                        self.next();
                    }
                    apply_function(&w, args)
                } else {
                    // Bare word: boolean literal or plain string operand.
                    Ok(Value::Str(w))
                }
            }
            Some(other) => Err(err_parse(format!(
                "unexpected token {other:?} in expression"
            ))),
            None => Err(err_parse("missing operand in expression")),
        }
    }
}

fn numeric_pair(a: &Value, b: &Value) -> Option<(Value, Value)> {
    Some((a.as_number()?, b.as_number()?))
}

fn as_doubles(a: &Value, b: &Value) -> Option<(f64, f64)> {
    let to_f = |v: &Value| match v {
        Value::Int(i) => Some(*i as f64),
        Value::Double(d) => Some(*d),
        Value::Str(_) => None,
    };
    Some((to_f(a)?, to_f(b)?))
}

fn apply_binary(op: &str, lhs: Value, rhs: Value) -> Result<Value, ErrorInfo> {
    // String-only comparisons first.
    if op == "eq" || op == "ne" {
        let equal = lhs.to_string() == rhs.to_string();
        return Ok(Value::from_bool(if op == "eq" { equal } else { !equal }));
    }

    let pair = numeric_pair(&lhs, &rhs);

    match op {
        "+" | "-" | "*" | "/" | "%" => {
            let Some((a, b)) = pair else {
                return Err(err_parse(format!(
                    "can't use non-numeric string as operand of \"{op}\""
                )));
            };
            if let (Value::Int(x), Value::Int(y)) = (&a, &b) {
                let (x, y) = (*x, *y);
                return match op {
                    "+" => Ok(Value::Int(x.wrapping_add(y))),
                    "-" => Ok(Value::Int(x.wrapping_sub(y))),
                    "*" => Ok(Value::Int(x.wrapping_mul(y))),
                    "/" => {
                        if y == 0 {
                            Err(ErrorInfo::new("divide by zero"))
                        } else {
                            Ok(Value::Int(x.div_euclid(y)))
                        }
                    }
                    _ => {
                        if y == 0 {
                            Err(ErrorInfo::new("divide by zero"))
                        } else {
                            Ok(Value::Int(x.rem_euclid(y)))
                        }
                    }
                };
            }
            let (x, y) = as_doubles(&a, &b)
                .ok_or_else(|| err_parse("expected number in expression"))?;
            match op {
                "+" => Ok(Value::Double(x + y)),
                "-" => Ok(Value::Double(x - y)),
                "*" => Ok(Value::Double(x * y)),
                "/" => {
                    if y == 0.0 {
                        Err(ErrorInfo::new("divide by zero"))
                    } else {
                        Ok(Value::Double(x / y))
                    }
                }
                _ => Err(err_parse("can't use floating-point value with \"%\"")),
            }
        }
        "<" | ">" | "<=" | ">=" | "==" | "!=" => {
            let ordering = match pair {
                Some((a, b)) => {
                    let (x, y) = as_doubles(&a, &b)
                        .ok_or_else(|| err_parse("expected number in expression"))?;
                    x.partial_cmp(&y)
                }
                None => Some(lhs.to_string().cmp(&rhs.to_string())),
            };
            let Some(ordering) = ordering else {
                // NaN comparisons are all false except !=.
                return Ok(Value::from_bool(op == "!="));
            };
            let result = match op {
                "<" => ordering.is_lt(),
                ">" => ordering.is_gt(),
                "<=" => ordering.is_le(),
                ">=" => ordering.is_ge(),
                "==" => ordering.is_eq(),
                _ => ordering.is_ne(),
            };
            Ok(Value::from_bool(result))
        }
        "**" => {
            let Some((a, b)) = pair else {
                return Err(err_parse(
                    "can't use non-numeric string as operand of \"**\"".to_string(),
                ));
            };
            if let (Value::Int(x), Value::Int(y)) = (&a, &b) {
                let (x, y) = (*x, *y);
                if y >= 0 {
                    let exp = u32::try_from(y).unwrap_or(u32::MAX);
                    return Ok(Value::Int(x.wrapping_pow(exp)));
                }
                if x == 0 {
                    return Err(ErrorInfo::new("exponent of zero is undefined"));
                }
                // Negative integer exponent truncates toward zero.
                return Ok(Value::Int(match x {
                    1 => 1,
                    -1 => {
                        if y % 2 == 0 {
                            1
                        } else {
                            -1
                        }
                    }
                    _ => 0,
                }));
            }
            let (x, y) = as_doubles(&a, &b)
                .ok_or_else(|| err_parse("expected number in expression"))?;
            Ok(Value::Double(x.powf(y)))
        }
        "&" | "|" | "^" | "<<" | ">>" => {
            let ints = match pair {
                Some((Value::Int(x), Value::Int(y))) => Some((x, y)),
                _ => None,
            };
            let Some((x, y)) = ints else {
                return Err(err_parse(format!(
                    "can't use non-integer operand with \"{op}\""
                )));
            };
            Ok(Value::Int(match op {
                "&" => x & y,
                "|" => x | y,
                "^" => x ^ y,
                "<<" => x.wrapping_shl(y.clamp(0, 63) as u32),
                _ => x.wrapping_shr(y.clamp(0, 63) as u32),
            }))
        }
        _ => Err(err_parse(format!("unknown operator \"{op}\""))),
    }
}

fn apply_function(name: &str, args: Vec<Value>) -> Result<Value, ErrorInfo> {
    let arity = |want: usize| -> Result<(), ErrorInfo> {
        if args.len() == want {
            Ok(())
        } else {
            Err(err_parse(format!(
                "wrong # args for math function \"{name}\""
            )))
        }
    };
    let number = |v: &Value| -> Result<Value, ErrorInfo> {
        v.as_number()
            .ok_or_else(|| err_parse(format!("expected number, got \"{v}\"")))
    };
    match name {
        "abs" => {
            arity(1)?;
            match number(&args[0])? {
                Value::Int(i) => Ok(Value::Int(i.wrapping_abs())),
                Value::Double(d) => Ok(Value::Double(d.abs())),
                v => Ok(v),
            }
        }
        "int" => {
            arity(1)?;
            match number(&args[0])? {
                Value::Int(i) => Ok(Value::Int(i)),
                Value::Double(d) => Ok(Value::Int(d.trunc() as i64)),
                v => Ok(v),
            }
        }
        "double" => {
            arity(1)?;
            match number(&args[0])? {
                Value::Int(i) => Ok(Value::Double(i as f64)),
                v => Ok(v),
            }
        }
        "min" | "max" => {
            if args.is_empty() {
                return Err(err_parse(format!(
                    "wrong # args for math function \"{name}\""
                )));
            }
            let mut best = number(&args[0])?;
            for arg in &args[1..] {
                let v = number(arg)?;
                let (a, b) = as_doubles(&best, &v)
                    .ok_or_else(|| err_parse("expected number in expression"))?;
                let take = if name == "min" { b < a } else { b > a };
                if take {
                    best = v;
                }
            }
            Ok(best)
        }
        _ => Err(err_parse(format!(
            "unknown math function \"{name}\""
        ))),
    }
}

/// Evaluate pre-substituted expression text to its printed form.
pub fn eval_text(text: &str) -> Result<String, ErrorInfo> {
    Ok(eval_value(text)?.to_string())
}

/// Evaluate pre-substituted expression text to a [`Value`].
pub fn eval_value(text: &str) -> Result<Value, ErrorInfo> {
    let tokens = tokenize(text)?;
    if tokens.is_empty() {
        return Err(err_parse("empty expression"));
    }
    let mut parser = ExprParser { tokens, pos: 0 };
    let value = parser.parse_expr(0)?;
    if parser.peek().is_some() {
        return Err(err_parse(format!(
            "extra tokens at end of expression \"{text}\""
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(text: &str) -> String {
        eval_text(text).unwrap()
    }

    #[test]
    fn integer_arithmetic() {
        assert_eq!(eval("1 + 2 * 3"), "7");
        assert_eq!(eval("(1 + 2) * 3"), "9");
        assert_eq!(eval("7 / 2"), "3");
        assert_eq!(eval("7 % 3"), "1");
        assert_eq!(eval("-5 + 2"), "-3");
    }

    #[test]
    fn double_contagion() {
        assert_eq!(eval("1 + 2.5"), "3.5");
        assert_eq!(eval("7.0 / 2"), "3.5");
        assert_eq!(eval("4 * 1.0"), "4.0");
    }

    #[test]
    fn divide_by_zero() {
        let err = eval_text("1 / 0").unwrap_err();
        assert_eq!(err.to_string(), "divide by zero");
        assert!(eval_text("1 % 0").is_err());
    }

    #[test]
    fn comparisons() {
        assert_eq!(eval("1 < 2"), "1");
        assert_eq!(eval("2 <= 1"), "0");
        assert_eq!(eval("3 == 3.0"), "1");
        assert_eq!(eval("3 != 3"), "0");
        // Non-numeric operands fall back to string ordering.
        assert_eq!(eval("{abc} < {abd}"), "1");
    }

    #[test]
    fn string_equality_operators() {
        assert_eq!(eval("{5} eq {5.0}"), "0");
        assert_eq!(eval("5 == 5.0"), "1");
        assert_eq!(eval("{a} ne {b}"), "1");
    }

    #[test]
    fn logical_short_circuit() {
        assert_eq!(eval("0 && (1 / 0)"), "0");
        assert_eq!(eval("1 || (1 / 0)"), "1");
        assert_eq!(eval("1 && 2"), "1");
        assert_eq!(eval("0 || 0"), "0");
    }

    #[test]
    fn unary_operators() {
        assert_eq!(eval("!0"), "1");
        assert_eq!(eval("!3"), "0");
        assert_eq!(eval("~0"), "-1");
        assert_eq!(eval("--5"), "5");
    }

    #[test]
    fn bitwise() {
        assert_eq!(eval("6 & 3"), "2");
        assert_eq!(eval("6 | 3"), "7");
        assert_eq!(eval("6 ^ 3"), "5");
        assert_eq!(eval("1 << 4"), "16");
        assert_eq!(eval("16 >> 2"), "4");
    }

    #[test]
    fn exponentiation() {
        assert_eq!(eval("2 ** 10"), "1024");
        // Right-associative: 2 ** (3 ** 2).
        assert_eq!(eval("2 ** 3 ** 2"), "512");
        assert_eq!(eval("2 ** -1"), "0");
        assert_eq!(eval("2.0 ** 0.5 > 1.41"), "1");
        assert!(eval_text("0 ** -1").is_err());
    }

    #[test]
    fn hex_literals() {
        assert_eq!(eval("0xff"), "255");
        assert_eq!(eval("0x10 + 1"), "17");
    }

    #[test]
    fn functions() {
        assert_eq!(eval("abs(-4)"), "4");
        assert_eq!(eval("abs(-4.5)"), "4.5");
        assert_eq!(eval("int(3.9)"), "3");
        assert_eq!(eval("double(2)"), "2.0");
        assert_eq!(eval("min(3, 1, 2)"), "1");
        assert_eq!(eval("max(3, 1, 2)"), "3");
    }

    #[test]
    fn unknown_function() {
        let err = eval_text("nope(1)").unwrap_err();
        assert_eq!(err.to_string(), "unknown math function \"nope\"");
    }

    #[test]
    fn truthiness_words() {
        assert!(Value::Str("true".into()).truthy().unwrap());
        assert!(Value::Str("ON".into()).truthy().unwrap());
        assert!(!Value::Str("no".into()).truthy().unwrap());
        assert!(Value::Str("maybe".into()).truthy().is_err());
    }

    #[test]
    fn parse_errors() {
        assert!(eval_text("").is_err());
        assert!(eval_text("1 +").is_err());
        assert!(eval_text("(1").is_err());
        assert!(eval_text("1 2").is_err());
    }
}
