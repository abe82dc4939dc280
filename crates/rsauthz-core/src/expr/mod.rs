//! The matcher expression language: parsing, caching, evaluation, and
//! the built-in predicate library.

mod ast;
mod cache;
mod eval;
mod functions;
mod parser;

pub use ast::{BinaryOp, Expr, UnaryOp, Value};
pub use cache::ExpressionCache;
pub use eval::{evaluate, evaluate_bool, Bindings, EvalContext};
pub use functions::{FunctionMap, MatchFn};
pub use parser::parse;
