//! Abstract syntax for matcher expressions.

/// A runtime value produced while evaluating an expression.
///
/// Policy and request fields enter the evaluator as strings; numbers are
/// parsed on demand when an operator requires them.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Num(f64),
    Bool(bool),
}

impl Value {
    /// Numeric view of the value. Strings parse on demand; booleans have
    /// no numeric form.
    pub fn as_num(&self) -> Option<f64> {
        match self {
            Value::Num(n) => Some(*n),
            Value::Str(s) => s.trim().parse::<f64>().ok(),
            Value::Bool(_) => None,
        }
    }

    /// Boolean view. Only genuine booleans qualify; strings never coerce.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Canonical text form, used for string comparison and for passing
    /// arguments to predicate functions.
    pub fn to_text(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            Value::Num(n) => {
                if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{n}")
                }
            }
            Value::Bool(b) => b.to_string(),
        }
    }

    /// Equality with the coercion rules of the matcher language: numeric
    /// when both operands have a numeric form, textual otherwise.
    pub fn loosely_eq(&self, other: &Value) -> bool {
        if let (Some(a), Some(b)) = (self.as_num(), other.as_num()) {
            return a == b;
        }
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a == b,
            _ => self.to_text() == other.to_text(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    In,
}

/// A parsed matcher expression tree.
///
/// Compiled once per model load (or once per distinct `eval` sub-rule
/// through the expression cache) and evaluated once per (request, row).
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    /// A bare identifier. Only meaningful as a function name or keyword
    /// during parsing; reaching the evaluator unresolved is an error.
    Ident(String),
    /// A field reference such as `r.sub` or `p.obj`.
    Attr { base: String, field: String },
    List(Vec<Expr>),
    Unary { op: UnaryOp, expr: Box<Expr> },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call { name: String, args: Vec<Expr> },
}

impl Expr {
    pub(crate) fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }
}
