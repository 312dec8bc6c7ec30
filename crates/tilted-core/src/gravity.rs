//! Specific-gravity expression compiler and evaluator
//!
//! The gateway derives gravity from the sensor's tilt and temperature with a
//! user-supplied formula such as `1.0 + 0.001*tilt - 0.00002*tilt*tilt`.
//! The formula is parsed into a small tree with the two variables left as
//! named slots, then evaluated with explicit bindings.
//!
//! Grammar:
//!
//! ```text
//! expr    = term (('+' | '-') term)*
//! term    = unary (('*' | '/') unary)*
//! unary   = ('-' | '+') unary | power
//! power   = primary ('^' unary)?
//! primary = number | 'tilt' | 'temp' | '(' expr ')'
//! ```

use alloc::boxed::Box;

use log::warn;
use thiserror_no_std::Error;

use crate::rounding::round3;

/// Longest formula accepted, matching the 128-byte settings field.
pub const MAX_EXPRESSION_LEN: usize = 128;

/// Deepest nesting of parentheses and unary signs the parser will follow.
pub const MAX_NESTING: usize = 32;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpressionError {
    #[error("Expression is empty")]
    Empty,
    #[error("Unexpected character '{found}' at {position}")]
    UnexpectedChar { position: usize, found: char },
    #[error("Expression ended early at {position}")]
    UnexpectedEnd { position: usize },
    #[error("Unknown variable at {position}")]
    UnknownVariable { position: usize },
    #[error("Malformed number at {position}")]
    InvalidNumber { position: usize },
    #[error("Missing ')' for '(' at {position}")]
    UnbalancedParenthesis { position: usize },
    #[error("Unexpected trailing input at {position}")]
    TrailingInput { position: usize },
    #[error("Expression is {length} bytes, limit is 128")]
    TooLong { length: usize },
    #[error("Expression nests too deeply at {position}")]
    TooDeep { position: usize },
    #[error("Result is not a finite number")]
    NonFinite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Number(f64),
    Tilt,
    Temp,
    Neg(Box<Node>),
    Binary(BinaryOp, Box<Node>, Box<Node>),
}

impl Node {
    fn eval(&self, tilt: f64, temp: f64) -> f64 {
        match self {
            Node::Number(n) => *n,
            Node::Tilt => tilt,
            Node::Temp => temp,
            Node::Neg(inner) => -inner.eval(tilt, temp),
            Node::Binary(op, lhs, rhs) => {
                let (a, b) = (lhs.eval(tilt, temp), rhs.eval(tilt, temp));
                match op {
                    BinaryOp::Add => a + b,
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    BinaryOp::Div => a / b,
                    BinaryOp::Pow => libm::pow(a, b),
                }
            }
        }
    }
}

/// A compiled gravity formula over `tilt` and `temp`.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    root: Node,
}

impl Expression {
    pub fn compile(source: &str) -> Result<Self, ExpressionError> {
        if source.len() > MAX_EXPRESSION_LEN {
            return Err(ExpressionError::TooLong {
                length: source.len(),
            });
        }

        let mut parser = Parser {
            src: source.as_bytes(),
            pos: 0,
            depth: 0,
        };

        parser.skip_whitespace();
        if parser.at_end() {
            return Err(ExpressionError::Empty);
        }

        let root = parser.expr()?;
        parser.skip_whitespace();
        if !parser.at_end() {
            return Err(ExpressionError::TrailingInput {
                position: parser.pos,
            });
        }

        Ok(Self { root })
    }

    /// Evaluate with the given bindings. Division by zero and results outside
    /// the `f32` range produce [`ExpressionError::NonFinite`].
    pub fn eval(&self, tilt: f32, temp: f32) -> Result<f32, ExpressionError> {
        let value = self.root.eval(tilt as f64, temp as f64) as f32;
        if value.is_finite() {
            Ok(value)
        } else {
            Err(ExpressionError::NonFinite)
        }
    }
}

struct Parser<'a> {
    src: &'a [u8],
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn skip_whitespace(&mut self) {
        while self.src.get(self.pos).is_some_and(u8::is_ascii_whitespace) {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_whitespace();
        self.src.get(self.pos).copied()
    }

    fn descend(&mut self) -> Result<(), ExpressionError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(ExpressionError::TooDeep { position: self.pos });
        }
        Ok(())
    }

    fn expr(&mut self) -> Result<Node, ExpressionError> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(b'+') => BinaryOp::Add,
                Some(b'-') => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Node::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn term(&mut self) -> Result<Node, ExpressionError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(b'*') => BinaryOp::Mul,
                Some(b'/') => BinaryOp::Div,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Node::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn unary(&mut self) -> Result<Node, ExpressionError> {
        match self.peek() {
            Some(b'-') => {
                self.pos += 1;
                self.descend()?;
                let inner = self.unary()?;
                self.depth -= 1;
                Ok(Node::Neg(Box::new(inner)))
            }
            Some(b'+') => {
                self.pos += 1;
                self.descend()?;
                let inner = self.unary();
                self.depth -= 1;
                inner
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<Node, ExpressionError> {
        let base = self.primary()?;
        if self.peek() == Some(b'^') {
            self.pos += 1;
            self.descend()?;
            let exponent = self.unary()?;
            self.depth -= 1;
            return Ok(Node::Binary(BinaryOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Node, ExpressionError> {
        match self.peek() {
            None => Err(ExpressionError::UnexpectedEnd { position: self.pos }),
            Some(b'(') => {
                let open = self.pos;
                self.pos += 1;
                self.descend()?;
                let inner = self.expr()?;
                self.depth -= 1;
                if self.peek() != Some(b')') {
                    return Err(ExpressionError::UnbalancedParenthesis { position: open });
                }
                self.pos += 1;
                Ok(inner)
            }
            Some(c) if c.is_ascii_digit() || c == b'.' => self.number(),
            Some(c) if c.is_ascii_alphabetic() => self.variable(),
            Some(_) => {
                let found = core::str::from_utf8(&self.src[self.pos..])
                    .ok()
                    .and_then(|s| s.chars().next())
                    .unwrap_or('?');
                Err(ExpressionError::UnexpectedChar {
                    position: self.pos,
                    found,
                })
            }
        }
    }

    fn number(&mut self) -> Result<Node, ExpressionError> {
        let start = self.pos;
        let mut end = self.pos;

        while self
            .src
            .get(end)
            .is_some_and(|c| c.is_ascii_digit() || *c == b'.')
        {
            end += 1;
        }
        // Exponent part, e.g. 2.5e-3
        if matches!(self.src.get(end), Some(b'e' | b'E')) {
            let mut exp_end = end + 1;
            if matches!(self.src.get(exp_end), Some(b'+' | b'-')) {
                exp_end += 1;
            }
            if self.src.get(exp_end).is_some_and(u8::is_ascii_digit) {
                while self.src.get(exp_end).is_some_and(u8::is_ascii_digit) {
                    exp_end += 1;
                }
                end = exp_end;
            }
        }

        let value = core::str::from_utf8(&self.src[start..end])
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
            .ok_or(ExpressionError::InvalidNumber { position: start })?;
        self.pos = end;
        Ok(Node::Number(value))
    }

    fn variable(&mut self) -> Result<Node, ExpressionError> {
        let start = self.pos;
        let mut end = self.pos;
        while self
            .src
            .get(end)
            .is_some_and(|c| c.is_ascii_alphanumeric() || *c == b'_')
        {
            end += 1;
        }

        let node = match &self.src[start..end] {
            b"tilt" => Node::Tilt,
            b"temp" => Node::Temp,
            _ => return Err(ExpressionError::UnknownVariable { position: start }),
        };
        self.pos = end;
        Ok(node)
    }
}

/// Derived gravity for one reading.
///
/// `error` is set when the formula could not be compiled or evaluated, in
/// which case `gravity` is the neutral value `0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GravityReading {
    pub gravity: f32,
    pub error: Option<ExpressionError>,
}

impl GravityReading {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Compile `expression`, bind `tilt` and `temp`, and round to 3 decimals.
pub fn evaluate(expression: &str, tilt: f32, temperature: f32) -> GravityReading {
    match Expression::compile(expression).and_then(|e| e.eval(tilt, temperature)) {
        Ok(value) => GravityReading {
            gravity: round3(value),
            error: None,
        },
        Err(e) => {
            warn!("Could not calculate gravity from '{}': {}", expression, e);
            GravityReading {
                gravity: 0.0,
                error: Some(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLY: &str = "1.0 + 0.001*tilt - 0.00002*tilt*tilt";

    #[test]
    fn test_polynomial_at_thirty_degrees() {
        // 1.0 + 0.03 - 0.018
        let reading = evaluate(POLY, 30.0, 20.0);

        assert_eq!(reading.gravity, 1.012);
        assert!(!reading.is_error());
    }

    #[test]
    fn test_unbalanced_parenthesis() {
        let reading = evaluate("(1.0 + tilt", 30.0, 20.0);

        assert_eq!(reading.gravity, 0.0);
        assert_eq!(
            reading.error,
            Some(ExpressionError::UnbalancedParenthesis { position: 0 })
        );
    }

    #[test]
    fn test_both_variables_are_bound() {
        let expr = Expression::compile("tilt - temp").unwrap();
        assert_eq!(expr.eval(30.0, 12.5), Ok(17.5));
    }

    #[test]
    fn test_precedence_and_unary_minus() {
        let eval = |src: &str| Expression::compile(src).unwrap().eval(0.0, 0.0).unwrap();

        assert_eq!(eval("1 + 2 * 3"), 7.0);
        assert_eq!(eval("(1 + 2) * 3"), 9.0);
        assert_eq!(eval("-2^2"), -4.0);
        assert_eq!(eval("2^-1"), 0.5);
        assert_eq!(eval("10 - 4 - 3"), 3.0);
        assert_eq!(eval("1.5e1"), 15.0);
    }

    #[test]
    fn test_variable_names_are_not_substituted_textually() {
        // A textual replace of "temp" would also mangle "temperature"
        assert_eq!(
            Expression::compile("temperature"),
            Err(ExpressionError::UnknownVariable { position: 0 })
        );
    }

    #[test]
    fn test_errors() {
        assert_eq!(Expression::compile("   "), Err(ExpressionError::Empty));
        assert_eq!(
            Expression::compile("1 +"),
            Err(ExpressionError::UnexpectedEnd { position: 3 })
        );
        assert_eq!(
            Expression::compile("1 2"),
            Err(ExpressionError::TrailingInput { position: 2 })
        );
        assert_eq!(
            Expression::compile("1 $ 2"),
            Err(ExpressionError::TrailingInput { position: 2 })
        );
        assert_eq!(
            Expression::compile("* 2"),
            Err(ExpressionError::UnexpectedChar {
                position: 0,
                found: '*'
            })
        );
        assert_eq!(
            Expression::compile("1..2"),
            Err(ExpressionError::InvalidNumber { position: 0 })
        );
    }

    #[test]
    fn test_result_beyond_f32_range_is_an_error() {
        // Finite as f64, infinite once narrowed
        let reading = evaluate("tilt * 1e300", 30.0, 20.0);

        assert_eq!(reading.gravity, 0.0);
        assert_eq!(reading.error, Some(ExpressionError::NonFinite));
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let mut src = String::new();
        for _ in 0..(MAX_NESTING + 1) {
            src.push('(');
        }
        src.push('1');
        for _ in 0..(MAX_NESTING + 1) {
            src.push(')');
        }

        assert!(matches!(
            Expression::compile(&src),
            Err(ExpressionError::TooDeep { .. })
        ));
        assert!(matches!(
            Expression::compile("----------------------------------1"),
            Err(ExpressionError::TooDeep { .. })
        ));
        assert_eq!(Expression::compile("((((1))))").unwrap().eval(0.0, 0.0), Ok(1.0));
    }

    #[test]
    fn test_overlong_expression_is_rejected() {
        let src = "1+".repeat(MAX_EXPRESSION_LEN) + "1";
        let reading = evaluate(&src, 30.0, 20.0);

        assert_eq!(reading.gravity, 0.0);
        assert_eq!(
            reading.error,
            Some(ExpressionError::TooLong { length: src.len() })
        );
    }

    #[test]
    fn test_division_by_zero_is_an_error() {
        let reading = evaluate("1 / (tilt - 30)", 30.0, 20.0);

        assert_eq!(reading.gravity, 0.0);
        assert_eq!(reading.error, Some(ExpressionError::NonFinite));
    }
}
