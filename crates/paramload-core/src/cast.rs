//! Safe evaluation of arithmetic expressions
//!
//! Supports int and float literals, named variables, parentheses, unary `+`
//! and `-`, and the binary operators `+ - * / // % **`. Operators follow
//! Python semantics: `/` always yields a float, `//` and `%` round toward
//! negative infinity, and `**` binds tighter than a unary minus on its left.
//! Nothing else is accepted, so untrusted input is safe to evaluate.

use crate::context::ApplyContext;
use crate::{Error, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Result of an arithmetic expression
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Numeric {
    Int(i64),
    Float(f64),
}

impl Numeric {
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Int(i) => i as f64,
            Self::Float(f) => f,
        }
    }

    /// Truncate toward zero
    pub fn as_i64(self) -> Result<i64> {
        match self {
            Self::Int(i) => Ok(i),
            Self::Float(f) if f.is_finite() && f.abs() < i64::MAX as f64 => Ok(f.trunc() as i64),
            Self::Float(f) => Err(Error::invalid_value(format!("{} does not fit in an integer", f))),
        }
    }

    fn to_value(self) -> Result<Value> {
        match self {
            Self::Int(i) => Ok(Value::from(i)),
            Self::Float(f) => serde_json::Number::from_f64(f)
                .map(Value::Number)
                .ok_or_else(|| Error::invalid_value(format!("{} is not a finite number", f))),
        }
    }
}

impl fmt::Display for Numeric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{:?}", x),
        }
    }
}

/// Variables an expression may refer to
pub type Vars = BTreeMap<String, Numeric>;

/// Evaluate `expr`
pub fn arithmetic_eval(expr: &str, vars: &Vars) -> Result<Numeric> {
    let tokens = tokenize(expr).map_err(|reason| eval_error(expr, reason))?;
    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        depth: 0,
        vars,
    };
    let value = parser.expr().map_err(|reason| eval_error(expr, reason))?;
    if parser.pos != tokens.len() {
        return Err(eval_error(expr, "unexpected trailing input".to_string()));
    }
    Ok(value)
}

/// Evaluate `expr` and truncate the result to an integer
pub fn int_eval(expr: &str, vars: &Vars) -> Result<i64> {
    arithmetic_eval(expr, vars)?.as_i64()
}

/// Evaluate `expr` as a float
pub fn float_eval(expr: &str, vars: &Vars) -> Result<f64> {
    Ok(arithmetic_eval(expr, vars)?.as_f64())
}

/// Apply step evaluating string values; numbers pass through
pub fn arithmetic(vars: Vars) -> impl Fn(Value, &ApplyContext<'_>) -> Result<Value> + Send + Sync + 'static {
    move |value, _| eval_value(&value, &vars)?.to_value()
}

/// Like [`arithmetic`], truncating the result to an integer
pub fn int(vars: Vars) -> impl Fn(Value, &ApplyContext<'_>) -> Result<Value> + Send + Sync + 'static {
    move |value, _| Ok(Value::from(eval_value(&value, &vars)?.as_i64()?))
}

/// Like [`arithmetic`], converting the result to a float
pub fn float(vars: Vars) -> impl Fn(Value, &ApplyContext<'_>) -> Result<Value> + Send + Sync + 'static {
    move |value, _| Numeric::Float(eval_value(&value, &vars)?.as_f64()).to_value()
}

fn eval_value(value: &Value, vars: &Vars) -> Result<Numeric> {
    match value {
        Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(Numeric::Int(i)),
            None => Ok(Numeric::Float(n.as_f64().unwrap_or(f64::NAN))),
        },
        Value::String(expr) => arithmetic_eval(expr, vars),
        other => Err(Error::invalid_value(format!(
            "expected a number or an expression, not {}",
            other
        ))),
    }
}

fn eval_error(expr: &str, reason: String) -> Error {
    Error::invalid_value(format!(
        "unable to evaluate arithmetic expression '{}': {}",
        expr, reason
    ))
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(Numeric),
    Name(String),
    Plus,
    Minus,
    Star,
    Slash,
    DoubleSlash,
    Percent,
    DoubleStar,
    LParen,
    RParen,
}

fn tokenize(expr: &str) -> std::result::Result<Vec<Token>, String> {
    let chars: Vec<char> = expr.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            ' ' | '\t' => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' if next == Some('*') => {
                tokens.push(Token::DoubleStar);
                i += 2;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' if next == Some('/') => {
                tokens.push(Token::DoubleSlash);
                i += 2;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '%' => {
                tokens.push(Token::Percent);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                let mut is_float = false;
                while i < chars.len() {
                    match chars[i] {
                        '0'..='9' | '_' => i += 1,
                        '.' => {
                            is_float = true;
                            i += 1;
                        }
                        'e' | 'E' => {
                            is_float = true;
                            i += 1;
                            if matches!(chars.get(i), Some('+') | Some('-')) {
                                i += 1;
                            }
                        }
                        _ => break,
                    }
                }
                let literal: String = chars[start..i].iter().filter(|c| **c != '_').collect();
                let number = if is_float {
                    literal.parse::<f64>().map(Numeric::Float).ok()
                } else {
                    literal.parse::<i64>().map(Numeric::Int).ok()
                };
                tokens.push(Token::Num(
                    number.ok_or_else(|| format!("invalid number '{}'", literal))?,
                ));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Name(chars[start..i].iter().collect()));
            }
            other => return Err(format!("unexpected character '{}'", other)),
        }
    }

    Ok(tokens)
}

type Eval = std::result::Result<Numeric, String>;

/// Deepest nesting of parentheses and unary signs an expression may use
const MAX_DEPTH: usize = 64;

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    depth: usize,
    vars: &'a Vars,
}

impl Parser<'_> {
    fn nested(&mut self, parse: fn(&mut Self) -> Eval) -> Eval {
        if self.depth >= MAX_DEPTH {
            return Err(format!("expression nested deeper than {} levels", MAX_DEPTH));
        }
        self.depth += 1;
        let value = parse(self);
        self.depth -= 1;
        value
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.pos);
        self.pos += 1;
        token
    }

    // expr := term (('+' | '-') term)*
    fn expr(&mut self) -> Eval {
        let mut left = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => Op::Add,
                Some(Token::Minus) => Op::Sub,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.term()?;
            left = binary(op, left, right)?;
        }
    }

    // term := unary (('*' | '/' | '//' | '%') unary)*
    fn term(&mut self) -> Eval {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => Op::Mul,
                Some(Token::Slash) => Op::Div,
                Some(Token::DoubleSlash) => Op::FloorDiv,
                Some(Token::Percent) => Op::Mod,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.unary()?;
            left = binary(op, left, right)?;
        }
    }

    // unary := ('+' | '-') unary | power
    fn unary(&mut self) -> Eval {
        match self.peek() {
            Some(Token::Plus) => {
                self.pos += 1;
                self.nested(Self::unary)
            }
            Some(Token::Minus) => {
                self.pos += 1;
                match self.nested(Self::unary)? {
                    Numeric::Int(i) => i
                        .checked_neg()
                        .map(Numeric::Int)
                        .ok_or_else(|| "integer overflow".to_string()),
                    Numeric::Float(f) => Ok(Numeric::Float(-f)),
                }
            }
            _ => self.power(),
        }
    }

    // power := atom ('**' unary)?
    fn power(&mut self) -> Eval {
        let base = self.atom()?;
        if self.peek() == Some(&Token::DoubleStar) {
            self.pos += 1;
            let exponent = self.nested(Self::unary)?;
            return binary(Op::Pow, base, exponent);
        }
        Ok(base)
    }

    fn atom(&mut self) -> Eval {
        match self.bump().cloned() {
            Some(Token::Num(n)) => Ok(n),
            Some(Token::Name(name)) => self
                .vars
                .get(&name)
                .copied()
                .ok_or_else(|| format!("name '{}' is not defined", name)),
            Some(Token::LParen) => {
                let value = self.nested(Self::expr)?;
                match self.bump() {
                    Some(Token::RParen) => Ok(value),
                    _ => Err("expected ')'".to_string()),
                }
            }
            Some(token) => Err(format!("unexpected token {:?}", token)),
            None => Err("unexpected end of expression".to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

fn binary(op: Op, left: Numeric, right: Numeric) -> Eval {
    use Numeric::{Float, Int};

    let overflow = || "integer overflow".to_string();
    let zero = || "division by zero".to_string();

    match (op, left, right) {
        (Op::Div, _, _) => {
            let divisor = right.as_f64();
            if divisor == 0.0 {
                return Err(zero());
            }
            Ok(Float(left.as_f64() / divisor))
        }
        (Op::Pow, Int(base), Int(exp)) if exp >= 0 => {
            let exp = u32::try_from(exp).map_err(|_| overflow())?;
            base.checked_pow(exp).map(Int).ok_or_else(overflow)
        }
        (Op::Pow, _, _) => {
            if left.as_f64() == 0.0 && right.as_f64() < 0.0 {
                return Err("zero cannot be raised to a negative power".to_string());
            }
            Ok(Float(left.as_f64().powf(right.as_f64())))
        }
        (_, Int(a), Int(b)) => match op {
            Op::Add => a.checked_add(b).map(Int).ok_or_else(overflow),
            Op::Sub => a.checked_sub(b).map(Int).ok_or_else(overflow),
            Op::Mul => a.checked_mul(b).map(Int).ok_or_else(overflow),
            Op::FloorDiv | Op::Mod if b == 0 => Err(zero()),
            Op::FloorDiv => {
                let q = a.checked_div(b).ok_or_else(overflow)?;
                let adjust = a % b != 0 && ((a < 0) != (b < 0));
                Ok(Int(if adjust { q - 1 } else { q }))
            }
            Op::Mod => {
                let r = a.checked_rem(b).ok_or_else(overflow)?;
                let adjust = r != 0 && ((r < 0) != (b < 0));
                Ok(Int(if adjust { r + b } else { r }))
            }
            Op::Div | Op::Pow => unreachable!("handled above"),
        },
        _ => {
            let (a, b) = (left.as_f64(), right.as_f64());
            match op {
                Op::Add => Ok(Float(a + b)),
                Op::Sub => Ok(Float(a - b)),
                Op::Mul => Ok(Float(a * b)),
                Op::FloorDiv | Op::Mod if b == 0.0 => Err(zero()),
                Op::FloorDiv => Ok(Float((a / b).floor())),
                Op::Mod => {
                    let r = a % b;
                    let adjust = r != 0.0 && ((r < 0.0) != (b < 0.0));
                    Ok(Float(if adjust { r + b } else { r }))
                }
                Op::Div | Op::Pow => unreachable!("handled above"),
            }
        }
    }
}
