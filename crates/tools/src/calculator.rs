//! Calculate tool: exact arithmetic for the model.
//!
//! Input is first checked against a character whitelist (digits, `+-*/.()`
//! and spaces) and then evaluated by a small recursive-descent parser; no
//! general-purpose evaluator is ever involved. Integer literals stay
//! integers until true division (`/`) produces a float, so `2 + 3 * 4`
//! reads back as `14` and `7 / 2` as `3.5`. `**` (power) and `//` (floor
//! division) are also understood.

use async_trait::async_trait;
use llmcraft_core::error::ToolError;
use llmcraft_core::tool::{Tool, ToolResult};
use std::fmt;

const ALLOWED: &str = "0123456789+-*/.() ";

pub struct CalculateTool;

#[async_trait]
impl Tool for CalculateTool {
    fn name(&self) -> &str {
        "calculate"
    }

    fn description(&self) -> &str {
        "Evaluate a math expression. Use this whenever the user needs a calculation. \
         The expression argument is arithmetic such as '2 + 3 * 4'."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "expression": {
                    "type": "string",
                    "description": "The arithmetic expression, e.g. '(2 + 3) * 4'"
                }
            },
            "required": ["expression"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let expr = arguments["expression"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'expression' argument".into()))?;
        Ok(calculate(expr))
    }
}

/// Run the whitelist check and evaluate, producing the text the model sees.
pub fn calculate(expr: &str) -> ToolResult {
    if !expr.chars().all(|c| ALLOWED.contains(c)) {
        return ToolResult::failed("calculate", "[error]: expression contains invalid characters.");
    }
    match evaluate(expr) {
        Ok(value) => ToolResult::ok("calculate", format!("{expr} = {value}")),
        Err(reason) => ToolResult::failed("calculate", format!("[error]: computed error: {reason}")),
    }
}

/// A computed number: integer until something forces a float.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(i) => write!(f, "{i}"),
            // Debug keeps the trailing ".0" and prints the shortest round-trip form.
            Number::Float(x) => write!(f, "{x:?}"),
        }
    }
}

/// Evaluate an arithmetic expression.
pub fn evaluate(expr: &str) -> Result<Number, String> {
    let tokens = tokenize(expr)?;
    let mut parser = Parser { tokens: &tokens, pos: 0 };
    let result = parser.parse_expr()?;
    if let Some(tok) = parser.tokens.get(parser.pos) {
        return Err(format!("unexpected token {tok:?} at position {}", parser.pos));
    }
    Ok(result)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(Number),
    Plus,
    Minus,
    Star,
    Pow,
    Slash,
    FloorDiv,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' => {
                chars.next();
            }
            '+' | '-' | '(' | ')' => {
                chars.next();
                tokens.push(match c {
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '(' => Token::LParen,
                    _ => Token::RParen,
                });
            }
            '*' => {
                chars.next();
                if chars.next_if_eq(&'*').is_some() {
                    tokens.push(Token::Pow);
                } else {
                    tokens.push(Token::Star);
                }
            }
            '/' => {
                chars.next();
                if chars.next_if_eq(&'/').is_some() {
                    tokens.push(Token::FloorDiv);
                } else {
                    tokens.push(Token::Slash);
                }
            }
            c if c.is_ascii_digit() || c == '.' => {
                let mut literal = String::new();
                while let Some(d) = chars.next_if(|d| d.is_ascii_digit() || *d == '.') {
                    literal.push(d);
                }
                let number = if literal.contains('.') {
                    literal.parse().map(Number::Float)
                        .map_err(|_| format!("invalid number: {literal}"))?
                } else {
                    literal.parse().map(Number::Int)
                        .map_err(|_| format!("integer too large: {literal}"))?
                };
                tokens.push(Token::Num(number));
            }
            other => return Err(format!("unexpected character '{other}'")),
        }
    }

    Ok(tokens)
}

#[derive(Clone, Copy)]
enum Op {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Pow,
}

fn apply(op: Op, a: Number, b: Number) -> Result<Number, String> {
    use Number::{Float, Int};

    let overflow = || "integer overflow".to_string();
    match (op, a, b) {
        (Op::Add, Int(x), Int(y)) => x.checked_add(y).map(Int).ok_or_else(overflow),
        (Op::Sub, Int(x), Int(y)) => x.checked_sub(y).map(Int).ok_or_else(overflow),
        (Op::Mul, Int(x), Int(y)) => x.checked_mul(y).map(Int).ok_or_else(overflow),
        (Op::Pow, Int(x), Int(y)) if y >= 0 => {
            let exp = u32::try_from(y).map_err(|_| overflow())?;
            x.checked_pow(exp).map(Int).ok_or_else(overflow)
        }
        (Op::Div | Op::FloorDiv, _, _) if b.as_f64() == 0.0 => Err("division by zero".into()),
        (Op::FloorDiv, Int(x), Int(y)) => {
            // Floor, not Euclid: differs when the divisor is negative.
            let q = x.checked_div_euclid(y).ok_or_else(overflow)?;
            Ok(Int(if y < 0 && x.rem_euclid(y) != 0 { q - 1 } else { q }))
        }
        (Op::Div, _, _) => Ok(Float(a.as_f64() / b.as_f64())),
        (Op::FloorDiv, _, _) => Ok(Float((a.as_f64() / b.as_f64()).floor())),
        (Op::Add, _, _) => Ok(Float(a.as_f64() + b.as_f64())),
        (Op::Sub, _, _) => Ok(Float(a.as_f64() - b.as_f64())),
        (Op::Mul, _, _) => Ok(Float(a.as_f64() * b.as_f64())),
        (Op::Pow, _, _) => {
            if a.as_f64() == 0.0 && b.as_f64() < 0.0 {
                return Err("zero cannot be raised to a negative power".into());
            }
            let v = a.as_f64().powf(b.as_f64());
            if v.is_nan() {
                Err("math domain error".into())
            } else {
                Ok(Float(v))
            }
        }
    }
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&Token> {
        let tok = self.tokens.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    // expr = term (('+' | '-') term)*
    fn parse_expr(&mut self) -> Result<Number, String> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => Op::Add,
                Some(Token::Minus) => Op::Sub,
                _ => return Ok(left),
            };
            self.pos += 1;
            left = apply(op, left, self.parse_term()?)?;
        }
    }

    // term = unary (('*' | '/' | '//') unary)*
    fn parse_term(&mut self) -> Result<Number, String> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => Op::Mul,
                Some(Token::Slash) => Op::Div,
                Some(Token::FloorDiv) => Op::FloorDiv,
                _ => return Ok(left),
            };
            self.pos += 1;
            left = apply(op, left, self.parse_unary()?)?;
        }
    }

    // unary = ('-' | '+') unary | power
    fn parse_unary(&mut self) -> Result<Number, String> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(match self.parse_unary()? {
                    Number::Int(i) => Number::Int(i.checked_neg().ok_or("integer overflow")?),
                    Number::Float(f) => Number::Float(-f),
                })
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.parse_unary()
            }
            _ => self.parse_power(),
        }
    }

    // power = primary ('**' unary)?   (right-associative, binds tighter than unary minus on its left)
    fn parse_power(&mut self) -> Result<Number, String> {
        let base = self.parse_primary()?;
        if let Some(Token::Pow) = self.peek() {
            self.pos += 1;
            let exp = self.parse_unary()?;
            return apply(Op::Pow, base, exp);
        }
        Ok(base)
    }

    // primary = NUMBER | '(' expr ')'
    fn parse_primary(&mut self) -> Result<Number, String> {
        match self.next() {
            Some(Token::Num(n)) => Ok(*n),
            Some(Token::LParen) => {
                let val = self.parse_expr()?;
                match self.next() {
                    Some(Token::RParen) => Ok(val),
                    _ => Err("expected closing parenthesis".into()),
                }
            }
            Some(tok) => Err(format!("unexpected token {tok:?}")),
            None => Err("unexpected end of expression".into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(expr: &str) -> String {
        evaluate(expr).unwrap().to_string()
    }

    #[test]
    fn operator_precedence() {
        assert_eq!(eval("2 + 3 * 4"), "14");
    }

    #[test]
    fn parentheses() {
        assert_eq!(eval("((1 + 2) * (3 + 4))"), "21");
    }

    #[test]
    fn true_division_yields_float() {
        assert_eq!(eval("10 / 4"), "2.5");
        assert_eq!(eval("10 / 2"), "5.0");
    }

    #[test]
    fn floor_division_and_power() {
        assert_eq!(eval("7 // 2"), "3");
        assert_eq!(eval("-7 // 2"), "-4");
        assert_eq!(eval("2 ** 10"), "1024");
        assert_eq!(eval("2 ** 3 ** 2"), "512");
        assert_eq!(eval("-2 ** 2"), "-4");
    }

    #[test]
    fn decimals() {
        assert_eq!(eval("0.5 * 4"), "2.0");
        assert_eq!(eval("(10 + 5) / 3 - 2 * (1 + 1)"), "1.0");
    }

    #[test]
    fn division_by_zero() {
        assert_eq!(evaluate("1 / 0").unwrap_err(), "division by zero");
        assert!(evaluate("1 // 0").is_err());
    }

    #[test]
    fn malformed_input() {
        assert!(evaluate("2 +").is_err());
        assert!(evaluate("").is_err());
        assert!(evaluate("(1 + 2").is_err());
        assert!(evaluate("1.2.3").is_err());
        assert!(evaluate("2 3").is_err());
    }

    #[test]
    fn overflow_is_an_error() {
        assert!(evaluate("9223372036854775807 + 1").is_err());
        assert!(evaluate("10 ** 100").is_err());
    }

    #[test]
    fn result_text_contains_expression_and_value() {
        let result = calculate("2 + 3 * 4");
        assert!(result.success);
        assert_eq!(result.output, "2 + 3 * 4 = 14");
    }

    #[test]
    fn injection_is_rejected_before_evaluation() {
        let result = calculate("__import__('os')");
        assert!(!result.success);
        assert_eq!(result.output, "[error]: expression contains invalid characters.");
    }

    #[test]
    fn evaluation_errors_are_text() {
        let result = calculate("1 / 0");
        assert!(!result.success);
        assert_eq!(result.output, "[error]: computed error: division by zero");
    }

    #[tokio::test]
    async fn tool_execute() {
        let result = CalculateTool
            .execute(serde_json::json!({"expression": "(2 + 3) * 4"}))
            .await
            .unwrap();
        assert_eq!(result.output, "(2 + 3) * 4 = 20");
        assert_eq!(result.name, "calculate");
    }

    #[tokio::test]
    async fn tool_missing_expression() {
        let err = CalculateTool.execute(serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
