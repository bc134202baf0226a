//! The weak-form expression language.
//!
//! Expressions are ASCII strings over numbers, named constants, the reserved symbols `N`
//! (shape matrix), `B` (shape derivative matrix) and `xi`, `eta`, `zeta` (reference
//! coordinates), combined with `+ - * / ^`, parentheses and the postfix transpose `'`.
//! For example the stiffness of linear elasticity reads `B'*D*B`.
//!
//! Parsing produces a small expression tree in which every constant has already been replaced
//! by its value, so evaluating an expression at a quadrature point never looks up names.
use crate::assembly::Kernel;
use crate::element::Element;
use crate::error::{FemError, Result};
use nalgebra::DMatrix;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::ops::Neg;

/// Names that cannot be used for constants.
pub const RESERVED_NAMES: [&str; 5] = ["N", "B", "xi", "eta", "zeta"];

pub fn is_reserved(name: &str) -> bool {
    RESERVED_NAMES.contains(&name)
}

/// A scalar or a dense matrix.
///
/// `1 x 1` matrices behave like scalars in every operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(f64),
    Matrix(DMatrix<f64>),
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Scalar(value)
    }
}

impl From<DMatrix<f64>> for Value {
    fn from(value: DMatrix<f64>) -> Self {
        Self::Matrix(value)
    }
}

impl Neg for Value {
    type Output = Value;

    fn neg(self) -> Self::Output {
        match self {
            Self::Scalar(s) => Self::Scalar(-s),
            Self::Matrix(m) => Self::Matrix(-m),
        }
    }
}

impl Value {
    pub fn shape(&self) -> (usize, usize) {
        match self {
            Self::Scalar(_) => (1, 1),
            Self::Matrix(m) => m.shape(),
        }
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Self::Scalar(s) => Some(*s),
            Self::Matrix(m) if m.shape() == (1, 1) => Some(m[(0, 0)]),
            Self::Matrix(_) => None,
        }
    }

    /// The value as a matrix. Scalars become `1 x 1` matrices.
    pub fn into_matrix(self) -> DMatrix<f64> {
        match self {
            Self::Scalar(s) => DMatrix::from_element(1, 1, s),
            Self::Matrix(m) => m,
        }
    }

    fn elementwise(
        self,
        rhs: Self,
        operation: &'static str,
        op: impl Fn(f64, f64) -> f64,
    ) -> Result<Self> {
        match (self.as_scalar(), rhs.as_scalar()) {
            (Some(a), Some(b)) => Ok(Self::Scalar(op(a, b))),
            (Some(a), None) => Ok(Self::Matrix(rhs.into_matrix().map(|b| op(a, b)))),
            (None, Some(b)) => Ok(Self::Matrix(self.into_matrix().map(|a| op(a, b)))),
            (None, None) => {
                let (a, b) = (self.into_matrix(), rhs.into_matrix());
                if a.shape() != b.shape() {
                    return Err(FemError::IncompatibleShapes {
                        operation,
                        left: a.shape(),
                        right: b.shape(),
                    });
                }
                Ok(Self::Matrix(a.zip_map(&b, op)))
            }
        }
    }

    pub fn checked_add(self, rhs: Self) -> Result<Self> {
        self.elementwise(rhs, "add", |a, b| a + b)
    }

    pub fn checked_sub(self, rhs: Self) -> Result<Self> {
        self.elementwise(rhs, "subtract", |a, b| a - b)
    }

    /// Matrix product, or scaling if either operand is a scalar.
    pub fn checked_mul(self, rhs: Self) -> Result<Self> {
        if self.as_scalar().is_some() || rhs.as_scalar().is_some() {
            return self.elementwise(rhs, "multiply", |a, b| a * b);
        }
        let (a, b) = (self.into_matrix(), rhs.into_matrix());
        if a.ncols() != b.nrows() {
            return Err(FemError::IncompatibleShapes {
                operation: "multiply",
                left: a.shape(),
                right: b.shape(),
            });
        }
        Ok(Self::Matrix(a * b))
    }

    /// Division by a scalar.
    pub fn checked_div(self, rhs: Self) -> Result<Self> {
        if rhs.as_scalar().is_none() {
            return Err(FemError::IncompatibleShapes {
                operation: "divide",
                left: self.shape(),
                right: rhs.shape(),
            });
        }
        self.elementwise(rhs, "divide", |a, b| a / b)
    }

    /// Scalar powers, and non-negative integer powers of square matrices.
    pub fn checked_pow(self, rhs: Self) -> Result<Self> {
        let exponent = rhs.as_scalar().ok_or(FemError::IncompatibleShapes {
            operation: "raise",
            left: self.shape(),
            right: rhs.shape(),
        })?;
        if let Some(base) = self.as_scalar() {
            return Ok(Self::Scalar(base.powf(exponent)));
        }

        let base = self.into_matrix();
        if !base.is_square() {
            return Err(FemError::IncompatibleShapes {
                operation: "raise",
                left: base.shape(),
                right: (1, 1),
            });
        }
        if !(0.0..=f64::from(u32::MAX)).contains(&exponent) || exponent.fract() != 0.0 {
            return Err(FemError::InvalidParameter(format!(
                "matrices can only be raised to integer powers in [0, {}], got {exponent}",
                u32::MAX
            )));
        }
        Ok(Self::Matrix(base.pow(exponent as u32)))
    }

    pub fn transpose(self) -> Self {
        match self {
            Self::Scalar(s) => Self::Scalar(s),
            Self::Matrix(m) => Self::Matrix(m.transpose()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    Quote,
    LeftParen,
    RightParen,
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(x) => write!(f, "{x}"),
            Token::Ident(name) => write!(f, "{name}"),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Caret => write!(f, "^"),
            Token::Quote => write!(f, "'"),
            Token::LeftParen => write!(f, "("),
            Token::RightParen => write!(f, ")"),
        }
    }
}

fn tokenize(source: &str) -> std::result::Result<Vec<Token>, String> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let single = match c {
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '*' => Some(Token::Star),
            '/' => Some(Token::Slash),
            '^' => Some(Token::Caret),
            '\'' => Some(Token::Quote),
            '(' => Some(Token::LeftParen),
            ')' => Some(Token::RightParen),
            _ => None,
        };
        if let Some(token) = single {
            tokens.push(token);
            i += 1;
        } else if c.is_ascii_digit() || c == '.' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            // Exponent, only if followed by digits so that `2*e` style names are not swallowed
            if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                let mut j = i + 1;
                if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                    j += 1;
                }
                if j < chars.len() && chars[j].is_ascii_digit() {
                    i = j;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
            }
            let literal: String = chars[start..i].iter().collect();
            let number = literal
                .parse()
                .map_err(|_| format!("invalid number '{literal}'"))?;
            tokens.push(Token::Number(number));
        } else if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
        } else {
            return Err(format!("unexpected character '{c}'"));
        }
    }
    Ok(tokens)
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Value(Value),
    Shape,
    ShapeDerivative,
    Coordinate(usize),
    Neg(Box<Node>),
    Transpose(Box<Node>),
    Binary(BinaryOp, Box<Node>, Box<Node>),
}

/// Errors the parser reports before they are attached to the source text.
enum ParseError {
    Syntax(String),
    Fem(FemError),
}

impl From<FemError> for ParseError {
    fn from(error: FemError) -> Self {
        Self::Fem(error)
    }
}

struct Parser<'a> {
    tokens: Vec<Token>,
    position: usize,
    constants: &'a [(String, Value)],
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn next_if(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn expression(&mut self) -> std::result::Result<Node, ParseError> {
        let mut lhs = self.term()?;
        loop {
            let op = if self.next_if(&Token::Plus) {
                BinaryOp::Add
            } else if self.next_if(&Token::Minus) {
                BinaryOp::Sub
            } else {
                return Ok(lhs);
            };
            let rhs = self.term()?;
            lhs = Node::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn term(&mut self) -> std::result::Result<Node, ParseError> {
        let mut lhs = self.unary()?;
        loop {
            let op = if self.next_if(&Token::Star) {
                BinaryOp::Mul
            } else if self.next_if(&Token::Slash) {
                BinaryOp::Div
            } else {
                return Ok(lhs);
            };
            let rhs = self.unary()?;
            lhs = Node::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn unary(&mut self) -> std::result::Result<Node, ParseError> {
        if self.next_if(&Token::Minus) {
            Ok(Node::Neg(Box::new(self.unary()?)))
        } else if self.next_if(&Token::Plus) {
            self.unary()
        } else {
            self.power()
        }
    }

    fn power(&mut self) -> std::result::Result<Node, ParseError> {
        let base = self.postfix()?;
        if self.next_if(&Token::Caret) {
            // Right associative, and binds tighter than a leading minus of the base
            let exponent = self.unary()?;
            Ok(Node::Binary(BinaryOp::Pow, Box::new(base), Box::new(exponent)))
        } else {
            Ok(base)
        }
    }

    fn postfix(&mut self) -> std::result::Result<Node, ParseError> {
        let mut node = self.primary()?;
        while self.next_if(&Token::Quote) {
            node = Node::Transpose(Box::new(node));
        }
        Ok(node)
    }

    fn primary(&mut self) -> std::result::Result<Node, ParseError> {
        let token = self
            .tokens
            .get(self.position)
            .cloned()
            .ok_or_else(|| ParseError::Syntax("unexpected end of expression".to_string()))?;
        self.position += 1;
        match token {
            Token::Number(x) => Ok(Node::Value(Value::Scalar(x))),
            Token::Ident(name) => self.identifier(&name),
            Token::LeftParen => {
                let inner = self.expression()?;
                if self.next_if(&Token::RightParen) {
                    Ok(inner)
                } else {
                    Err(ParseError::Syntax("missing ')'".to_string()))
                }
            }
            other => Err(ParseError::Syntax(format!("unexpected '{other}'"))),
        }
    }

    fn identifier(&self, name: &str) -> std::result::Result<Node, ParseError> {
        match name {
            "N" => Ok(Node::Shape),
            "B" => Ok(Node::ShapeDerivative),
            "xi" => Ok(Node::Coordinate(0)),
            "eta" => Ok(Node::Coordinate(1)),
            "zeta" => Ok(Node::Coordinate(2)),
            _ => self
                .constants
                .iter()
                .find(|(constant, _)| constant == name)
                .map(|(_, value)| Node::Value(value.clone()))
                .ok_or_else(|| FemError::UnknownConstant(name.to_string()).into()),
        }
    }
}

/// Values of the reserved symbols at one quadrature point.
struct Symbols<'a> {
    shape: Option<DMatrix<f64>>,
    shape_derivative: Option<DMatrix<f64>>,
    xi: &'a [f64],
}

impl Node {
    fn visit(&self, f: &mut impl FnMut(&Node)) {
        f(self);
        match self {
            Node::Neg(inner) | Node::Transpose(inner) => inner.visit(f),
            Node::Binary(_, lhs, rhs) => {
                lhs.visit(f);
                rhs.visit(f);
            }
            _ => {}
        }
    }

    fn evaluate(&self, symbols: &Symbols) -> Result<Value> {
        match self {
            Node::Value(value) => Ok(value.clone()),
            Node::Shape => symbols
                .shape
                .clone()
                .map(Value::Matrix)
                .ok_or_else(|| FemError::InvalidParameter("N is not available here".to_string())),
            Node::ShapeDerivative => symbols
                .shape_derivative
                .clone()
                .map(Value::Matrix)
                .ok_or_else(|| FemError::InvalidParameter("B is not available here".to_string())),
            Node::Coordinate(k) => {
                symbols
                    .xi
                    .get(*k)
                    .copied()
                    .map(Value::Scalar)
                    .ok_or(FemError::DimensionMismatch {
                        expected: k + 1,
                        actual: symbols.xi.len(),
                    })
            }
            Node::Neg(inner) => Ok(-inner.evaluate(symbols)?),
            Node::Transpose(inner) => Ok(inner.evaluate(symbols)?.transpose()),
            Node::Binary(op, lhs, rhs) => {
                let (lhs, rhs) = (lhs.evaluate(symbols)?, rhs.evaluate(symbols)?);
                match op {
                    BinaryOp::Add => lhs.checked_add(rhs),
                    BinaryOp::Sub => lhs.checked_sub(rhs),
                    BinaryOp::Mul => lhs.checked_mul(rhs),
                    BinaryOp::Div => lhs.checked_div(rhs),
                    BinaryOp::Pow => lhs.checked_pow(rhs),
                }
            }
        }
    }
}

/// A parsed weak-form expression with all constants substituted.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    root: Node,
    uses_shape: bool,
    uses_shape_derivative: bool,
    uses_coordinates: bool,
}

impl Expression {
    /// Parses `source`, substituting the given constants.
    ///
    /// Constants are matched as whole identifiers, so a constant `k` is never substituted
    /// into an identifier such as `k2`.
    pub fn parse(source: &str, constants: &[(String, Value)]) -> Result<Self> {
        let parse_error = |message: String| FemError::Parse {
            expression: source.to_string(),
            message,
        };

        let tokens = tokenize(source).map_err(parse_error)?;
        let mut parser = Parser {
            tokens,
            position: 0,
            constants,
        };
        let root = parser
            .expression()
            .and_then(|root| match parser.peek() {
                None => Ok(root),
                Some(token) => Err(ParseError::Syntax(format!("unexpected '{token}'"))),
            })
            .map_err(|error| match error {
                ParseError::Syntax(message) => parse_error(message),
                ParseError::Fem(error) => error,
            })?;

        let (mut uses_shape, mut uses_shape_derivative, mut uses_coordinates) = (false, false, false);
        root.visit(&mut |node| match node {
            Node::Shape => uses_shape = true,
            Node::ShapeDerivative => uses_shape_derivative = true,
            Node::Coordinate(_) => uses_coordinates = true,
            _ => {}
        });

        Ok(Self {
            source: source.to_string(),
            root,
            uses_shape,
            uses_shape_derivative,
            uses_coordinates,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether the expression depends on the element or the quadrature point.
    pub fn is_constant(&self) -> bool {
        !(self.uses_shape || self.uses_shape_derivative || self.uses_coordinates)
    }

    /// Evaluates an expression that does not reference `N`, `B` or reference coordinates.
    pub fn evaluate_constant(&self) -> Result<Value> {
        if !self.is_constant() {
            return Err(FemError::InvalidParameter(format!(
                "'{}' depends on the element and cannot define a constant",
                self.source
            )));
        }
        let symbols = Symbols {
            shape: None,
            shape_derivative: None,
            xi: &[],
        };
        self.root.evaluate(&symbols)
    }

    /// Evaluates the expression on an element at the given reference coordinates.
    pub fn evaluate(&self, element: &Element, xi: &[f64]) -> Result<Value> {
        let symbols = Symbols {
            shape: self.uses_shape.then(|| element.shape(xi)),
            shape_derivative: self
                .uses_shape_derivative
                .then(|| element.shape_derivative(xi))
                .transpose()?,
            xi,
        };
        self.root.evaluate(&symbols)
    }
}

impl Display for Expression {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

impl Kernel for Expression {
    fn evaluate(&self, element: &Element, xi: &[f64]) -> Result<DMatrix<f64>> {
        Expression::evaluate(self, element, xi).map(Value::into_matrix)
    }
}
