//! Rule condition expression parsing and evaluation.
//!
//! Conditions are small boolean expressions over record fields, for example
//! `op == "AES-128-CBC" and extra.pkey_size >= 16`. This module tokenizes
//! and parses them into an AST once at rule-load time; evaluation then runs
//! per record against a [`FieldSource`].

use crate::error::{Result, TracebomError};

/// A runtime value produced by field lookup or a literal.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
}

impl Value {
    /// Truthiness used by `and`, `or` and `not`: absent and empty values
    /// are false, everything else follows its content.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Str(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }
}

/// Supplies field values during evaluation. Unknown fields resolve to
/// [`Value::Null`] rather than failing, so rules can probe optional keys.
pub trait FieldSource {
    fn field(&self, name: &str) -> Value;
}

/// Tokens in a rule condition expression.
#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    True,
    False,
    Null,
    And,
    Or,
    Not,
    In,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    LeftParen,
    RightParen,
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// AST for rule condition expressions.
#[derive(Debug, Clone)]
pub enum Expr {
    Literal(Value),
    Field(String),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(CmpOpExpr),
    In(InExpr),
}

#[derive(Debug, Clone)]
pub struct CmpOpExpr {
    op: CmpOp,
    lhs: Box<Expr>,
    rhs: Box<Expr>,
}

#[derive(Debug, Clone)]
pub struct InExpr {
    needle: Box<Expr>,
    haystack: Box<Expr>,
    negated: bool,
}

impl Expr {
    /// Parse a condition expression. All tokens must be consumed; trailing
    /// input is a configuration error.
    pub fn parse(input: &str) -> Result<Expr> {
        let tokens = tokenize(input)?;
        if tokens.is_empty() {
            return Err(TracebomError::RuleConfig(
                "Empty rule condition expression".to_string(),
            ));
        }
        let mut parser = ExprParser::new(&tokens);
        let expr = parser.parse_or_expression()?;
        if let Some(token) = parser.current_token() {
            return Err(TracebomError::RuleConfig(format!(
                "Unexpected trailing token {:?} in rule expression",
                token
            )));
        }
        Ok(expr)
    }

    /// Evaluate against a record and reduce to a boolean.
    pub fn matches(&self, source: &dyn FieldSource) -> bool {
        self.evaluate(source).truthy()
    }

    fn evaluate(&self, source: &dyn FieldSource) -> Value {
        match self {
            Expr::Literal(value) => value.clone(),
            Expr::Field(name) => source.field(name),
            Expr::Not(inner) => Value::Bool(!inner.evaluate(source).truthy()),
            Expr::And(lhs, rhs) => {
                if !lhs.evaluate(source).truthy() {
                    return Value::Bool(false);
                }
                Value::Bool(rhs.evaluate(source).truthy())
            }
            Expr::Or(lhs, rhs) => {
                if lhs.evaluate(source).truthy() {
                    return Value::Bool(true);
                }
                Value::Bool(rhs.evaluate(source).truthy())
            }
            Expr::Compare(cmp) => {
                let lhs = cmp.lhs.evaluate(source);
                let rhs = cmp.rhs.evaluate(source);
                Value::Bool(compare_values(cmp.op, &lhs, &rhs))
            }
            Expr::In(inexpr) => {
                let needle = inexpr.needle.evaluate(source);
                let haystack = inexpr.haystack.evaluate(source);
                let contained = value_contains(&haystack, &needle);
                Value::Bool(contained != inexpr.negated)
            }
        }
    }
}

/// Equality with numeric coercion: a numeric string compares equal to the
/// number it denotes, and absent values only equal each other.
fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::List(a), Value::List(b)) => {
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| values_equal(x, y))
        }
        _ => match (lhs.as_number(), rhs.as_number()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
    }
}

fn compare_values(op: CmpOp, lhs: &Value, rhs: &Value) -> bool {
    match op {
        CmpOp::Eq => values_equal(lhs, rhs),
        CmpOp::Ne => !values_equal(lhs, rhs),
        CmpOp::Lt => order_values(lhs, rhs).is_some_and(|ord| ord.is_lt()),
        CmpOp::Le => order_values(lhs, rhs).is_some_and(|ord| ord.is_le()),
        CmpOp::Gt => order_values(lhs, rhs).is_some_and(|ord| ord.is_gt()),
        CmpOp::Ge => order_values(lhs, rhs).is_some_and(|ord| ord.is_ge()),
    }
}

/// Ordering with the same coercion as equality. Incomparable operands yield
/// `None`, which never satisfies an ordering test.
fn order_values(lhs: &Value, rhs: &Value) -> Option<std::cmp::Ordering> {
    match (lhs, rhs) {
        (Value::Str(a), Value::Str(b))
            if lhs.as_number().is_none() || rhs.as_number().is_none() =>
        {
            Some(a.cmp(b))
        }
        _ => match (lhs.as_number(), rhs.as_number()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        },
    }
}

/// Membership: a list contains an equal element, a string contains a
/// substring. Any other haystack contains nothing.
fn value_contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::List(items) => items.iter().any(|item| values_equal(item, needle)),
        Value::Str(text) => match needle {
            Value::Str(sub) => text.contains(sub.as_str()),
            _ => false,
        },
        _ => false,
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&ch) = chars.peek() {
        match ch {
            ' ' | '\t' | '\n' | '\r' => {
                chars.next();
            }
            '(' => {
                tokens.push(Token::LeftParen);
                chars.next();
            }
            ')' => {
                tokens.push(Token::RightParen);
                chars.next();
            }
            '=' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Eq);
                } else {
                    return Err(TracebomError::RuleConfig(
                        "Single '=' in rule expression, use '==' for equality".to_string(),
                    ));
                }
            }
            '!' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Ne);
                } else {
                    return Err(TracebomError::RuleConfig(
                        "Expected '!=' in rule expression".to_string(),
                    ));
                }
            }
            '<' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Le);
                } else {
                    tokens.push(Token::Lt);
                }
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Ge);
                } else {
                    tokens.push(Token::Gt);
                }
            }
            '\'' | '"' => {
                let quote = ch;
                chars.next();
                let mut literal = String::new();
                let mut closed = false;
                while let Some(c) = chars.next() {
                    match c {
                        '\\' => match chars.next() {
                            Some(escaped) => literal.push(escaped),
                            None => break,
                        },
                        c if c == quote => {
                            closed = true;
                            break;
                        }
                        c => literal.push(c),
                    }
                }
                if !closed {
                    return Err(TracebomError::RuleConfig(
                        "Unterminated string literal in rule expression".to_string(),
                    ));
                }
                tokens.push(Token::Str(literal));
            }
            '0'..='9' => {
                let mut number = String::new();
                let mut is_float = false;
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_digit() {
                        number.push(c);
                        chars.next();
                    } else if c == '.' && !is_float {
                        is_float = true;
                        number.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if is_float {
                    let value = number.parse::<f64>().map_err(|_| {
                        TracebomError::RuleConfig(format!("Invalid number literal: {number}"))
                    })?;
                    tokens.push(Token::Float(value));
                } else {
                    let value = number.parse::<i64>().map_err(|_| {
                        TracebomError::RuleConfig(format!("Invalid number literal: {number}"))
                    })?;
                    tokens.push(Token::Int(value));
                }
            }
            'a'..='z' | 'A'..='Z' | '_' => {
                let mut identifier = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' || c == '.' {
                        identifier.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                match identifier.as_str() {
                    "and" => tokens.push(Token::And),
                    "or" => tokens.push(Token::Or),
                    "not" => tokens.push(Token::Not),
                    "in" => tokens.push(Token::In),
                    "true" => tokens.push(Token::True),
                    "false" => tokens.push(Token::False),
                    "null" => tokens.push(Token::Null),
                    _ => tokens.push(Token::Ident(identifier)),
                }
            }
            other => {
                return Err(TracebomError::RuleConfig(format!(
                    "Unexpected character '{other}' in rule expression"
                )));
            }
        }
    }

    Ok(tokens)
}

/// Recursive descent parser for rule conditions.
///
/// Precedence, loosest first: `or`, `and`, `not`, comparison/membership.
struct ExprParser<'a> {
    tokens: &'a [Token],
    position: usize,
}

impl<'a> ExprParser<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self {
            tokens,
            position: 0,
        }
    }

    fn current_token(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn peek_next(&self) -> Option<&Token> {
        self.tokens.get(self.position + 1)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.current_token().cloned();
        self.position += 1;
        token
    }

    fn parse_or_expression(&mut self) -> Result<Expr> {
        let mut left = self.parse_and_expression()?;

        while let Some(Token::Or) = self.current_token() {
            self.advance();
            let right = self.parse_and_expression()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }

        Ok(left)
    }

    fn parse_and_expression(&mut self) -> Result<Expr> {
        let mut left = self.parse_not_expression()?;

        while let Some(Token::And) = self.current_token() {
            self.advance();
            let right = self.parse_not_expression()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }

        Ok(left)
    }

    fn parse_not_expression(&mut self) -> Result<Expr> {
        // Prefix `not` binds looser than comparison, so `not a == b`
        // negates the whole comparison.
        if let Some(Token::Not) = self.current_token() {
            self.advance();
            let operand = self.parse_not_expression()?;
            Ok(Expr::Not(Box::new(operand)))
        } else {
            self.parse_comparison()
        }
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let lhs = self.parse_primary()?;

        let op = match self.current_token() {
            Some(Token::Eq) => Some(CmpOp::Eq),
            Some(Token::Ne) => Some(CmpOp::Ne),
            Some(Token::Lt) => Some(CmpOp::Lt),
            Some(Token::Le) => Some(CmpOp::Le),
            Some(Token::Gt) => Some(CmpOp::Gt),
            Some(Token::Ge) => Some(CmpOp::Ge),
            Some(Token::In) => {
                self.advance();
                let haystack = self.parse_primary()?;
                return Ok(Expr::In(InExpr {
                    needle: Box::new(lhs),
                    haystack: Box::new(haystack),
                    negated: false,
                }));
            }
            Some(Token::Not) if self.peek_next() == Some(&Token::In) => {
                self.advance();
                self.advance();
                let haystack = self.parse_primary()?;
                return Ok(Expr::In(InExpr {
                    needle: Box::new(lhs),
                    haystack: Box::new(haystack),
                    negated: true,
                }));
            }
            _ => None,
        };

        match op {
            Some(op) => {
                self.advance();
                let rhs = self.parse_primary()?;
                Ok(Expr::Compare(CmpOpExpr {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                }))
            }
            None => Ok(lhs),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.advance() {
            Some(Token::LeftParen) => {
                let expr = self.parse_or_expression()?;
                match self.advance() {
                    Some(Token::RightParen) => Ok(expr),
                    _ => Err(TracebomError::RuleConfig(
                        "Expected closing parenthesis in rule expression".to_string(),
                    )),
                }
            }
            Some(Token::Ident(name)) => Ok(Expr::Field(name)),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::Str(s))),
            Some(Token::Int(i)) => Ok(Expr::Literal(Value::Int(i))),
            Some(Token::Float(f)) => Ok(Expr::Literal(Value::Float(f))),
            Some(Token::True) => Ok(Expr::Literal(Value::Bool(true))),
            Some(Token::False) => Ok(Expr::Literal(Value::Bool(false))),
            Some(Token::Null) => Ok(Expr::Literal(Value::Null)),
            Some(token) => Err(TracebomError::RuleConfig(format!(
                "Unexpected token {:?} in rule expression",
                token
            ))),
            None => Err(TracebomError::RuleConfig(
                "Unexpected end of rule expression".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct TestSource(HashMap<String, Value>);

    impl TestSource {
        fn new(fields: &[(&str, Value)]) -> Self {
            Self(
                fields
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect(),
            )
        }
    }

    impl FieldSource for TestSource {
        fn field(&self, name: &str) -> Value {
            self.0.get(name).cloned().unwrap_or(Value::Null)
        }
    }

    fn eval(expr: &str, fields: &[(&str, Value)]) -> bool {
        Expr::parse(expr).unwrap().matches(&TestSource::new(fields))
    }

    #[test]
    fn test_equality_on_string_field() {
        let fields = [("op", Value::Str("AES-128-CBC".to_string()))];
        assert!(eval("op == \"AES-128-CBC\"", &fields));
        assert!(!eval("op == \"RSA\"", &fields));
        assert!(eval("op != \"RSA\"", &fields));
    }

    #[test]
    fn test_numeric_comparison_with_string_coercion() {
        let fields = [("extra.pkey_size", Value::Str("256".to_string()))];
        assert!(eval("extra.pkey_size >= 128", &fields));
        assert!(eval("extra.pkey_size == 256", &fields));
        assert!(!eval("extra.pkey_size < 256", &fields));
    }

    #[test]
    fn test_precedence_or_binds_looser_than_and() {
        let fields = [("a", Value::Bool(true)), ("b", Value::Bool(false))];
        // a or (b and b), not (a or b) and b
        assert!(eval("a or b and b", &fields));
        assert!(!eval("(a or b) and b", &fields));
    }

    #[test]
    fn test_not_negates_whole_comparison() {
        let fields = [("op", Value::Str("RSA".to_string()))];
        assert!(eval("not op == \"AES\"", &fields));
        assert!(!eval("not op == \"RSA\"", &fields));
    }

    #[test]
    fn test_membership_in_list() {
        let fields = [(
            "func",
            Value::List(vec![
                Value::Str("encrypt".to_string()),
                Value::Str("decrypt".to_string()),
            ]),
        )];
        assert!(eval("\"encrypt\" in func", &fields));
        assert!(!eval("\"sign\" in func", &fields));
        assert!(eval("\"sign\" not in func", &fields));
    }

    #[test]
    fn test_membership_in_string_is_substring() {
        let fields = [("op", Value::Str("AES-128-CBC".to_string()))];
        assert!(eval("\"AES\" in op", &fields));
        assert!(eval("\"CBC\" in op", &fields));
        assert!(!eval("\"GCM\" in op", &fields));
    }

    #[test]
    fn test_null_semantics() {
        let fields = [("op", Value::Null)];
        assert!(eval("op == null", &fields));
        assert!(eval("missing == null", &fields));
        assert!(!eval("op == \"AES\"", &fields));
        // Ordering against an absent value never holds.
        assert!(!eval("op > 0", &fields));
    }

    #[test]
    fn test_bare_field_truthiness() {
        assert!(eval(
            "extra.pkey_size",
            &[("extra.pkey_size", Value::Str("256".to_string()))]
        ));
        assert!(!eval("extra.pkey_size", &[]));
        assert!(!eval("count", &[("count", Value::Int(0))]));
    }

    #[test]
    fn test_int_float_cross_comparison() {
        let fields = [("threshold", Value::Float(0.5))];
        assert!(eval("threshold < 1", &fields));
        assert!(eval("threshold == 0.5", &fields));
    }

    #[test]
    fn test_string_ordering_is_lexicographic() {
        let fields = [("op", Value::Str("AES".to_string()))];
        assert!(eval("op < \"RSA\"", &fields));
        assert!(!eval("op > \"RSA\"", &fields));
    }

    #[test]
    fn test_single_quoted_strings() {
        let fields = [("op", Value::Str("SHA256".to_string()))];
        assert!(eval("op == 'SHA256'", &fields));
    }

    #[test]
    fn test_parse_error_on_single_equals() {
        assert!(Expr::parse("op = \"AES\"").is_err());
    }

    #[test]
    fn test_parse_error_on_trailing_tokens() {
        assert!(Expr::parse("op == \"AES\" op").is_err());
    }

    #[test]
    fn test_parse_error_on_unterminated_string() {
        assert!(Expr::parse("op == \"AES").is_err());
    }

    #[test]
    fn test_parse_error_on_empty_expression() {
        assert!(Expr::parse("").is_err());
        assert!(Expr::parse("   ").is_err());
    }

    #[test]
    fn test_unmatched_parenthesis() {
        assert!(Expr::parse("(op == \"AES\"").is_err());
    }
}
