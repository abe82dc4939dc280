//! Expression evaluation against request and policy bindings.
//!
//! Evaluation is a pure function of the expression, the bindings, and
//! the role-graph snapshot; the only side effects are role-manager
//! reads. `&&` and `||` short-circuit. `eval(p.field)` compiles the
//! row's own text through the expression cache and evaluates it against
//! the same bindings, guarded against cyclic references.

use std::collections::HashMap;

use crate::error::{EngineError, EngineResult};
use crate::rbac::SharedRoleManager;

use super::ast::{BinaryOp, Expr, UnaryOp, Value};
use super::cache::ExpressionCache;
use super::functions::FunctionMap;

/// Everything an evaluation needs besides the expression itself.
pub struct EvalContext<'a> {
    pub functions: &'a FunctionMap,
    /// Role managers keyed by their section name (`g`, `g2`, ...); calls
    /// to those names resolve to `has_link`.
    pub role_managers: &'a HashMap<String, SharedRoleManager>,
    pub cache: &'a ExpressionCache,
}

/// Positional field bindings for one (request, policy-row) pair.
///
/// Each scope binds a key (`r`, `p`, `r2`, ...) to parallel slices of
/// field names and values.
#[derive(Default)]
pub struct Bindings<'a> {
    scopes: Vec<(&'a str, &'a [String], &'a [String])>,
}

impl<'a> Bindings<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: &'a str, tokens: &'a [String], values: &'a [String]) {
        self.scopes.push((key, tokens, values));
    }

    /// Raw field value for `base.field`, if bound.
    pub fn resolve(&self, base: &str, field: &str) -> Option<&'a str> {
        let (_, tokens, values) = self.scopes.iter().find(|(key, _, _)| *key == base)?;
        let index = tokens.iter().position(|token| token == field)?;
        values.get(index).map(String::as_str)
    }
}

/// Evaluates an expression to a value.
pub fn evaluate(expr: &Expr, ctx: &EvalContext<'_>, bindings: &Bindings<'_>) -> EngineResult<Value> {
    let mut eval_stack = Vec::new();
    eval_node(expr, ctx, bindings, &mut eval_stack)
}

/// Evaluates an expression that must produce a boolean (the matcher
/// contract). Any other result type is an evaluation error, never a
/// silent false.
pub fn evaluate_bool(
    expr: &Expr,
    ctx: &EvalContext<'_>,
    bindings: &Bindings<'_>,
) -> EngineResult<bool> {
    let value = evaluate(expr, ctx, bindings)?;
    value.as_bool().ok_or_else(|| EngineError::ExpressionEvaluation {
        message: format!("matcher produced {value:?}, expected a boolean"),
    })
}

fn eval_node(
    expr: &Expr,
    ctx: &EvalContext<'_>,
    bindings: &Bindings<'_>,
    eval_stack: &mut Vec<(String, String)>,
) -> EngineResult<Value> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Ident(name) => Err(EngineError::ExpressionEvaluation {
            message: format!("unknown identifier `{name}`"),
        }),
        Expr::Attr { base, field } => match bindings.resolve(base, field) {
            Some(raw) => Ok(Value::Str(raw.to_string())),
            None => Err(EngineError::ExpressionEvaluation {
                message: format!("unresolvable field reference `{base}.{field}`"),
            }),
        },
        Expr::List(items) => {
            // Lists only appear on the right of `in`; evaluating one in
            // value position is meaningless.
            Err(EngineError::ExpressionEvaluation {
                message: format!("list of {} elements used outside `in`", items.len()),
            })
        }
        Expr::Unary { op, expr } => {
            let value = eval_node(expr, ctx, bindings, eval_stack)?;
            match op {
                UnaryOp::Not => {
                    let b = value.as_bool().ok_or_else(non_bool_operand("!", &value))?;
                    Ok(Value::Bool(!b))
                }
                UnaryOp::Neg => {
                    let n = value.as_num().ok_or_else(non_numeric_operand("-", &value))?;
                    Ok(Value::Num(-n))
                }
            }
        }
        Expr::Binary { op, lhs, rhs } => eval_binary(*op, lhs, rhs, ctx, bindings, eval_stack),
        Expr::Call { name, args } => eval_call(name, args, ctx, bindings, eval_stack),
    }
}

fn eval_binary(
    op: BinaryOp,
    lhs: &Expr,
    rhs: &Expr,
    ctx: &EvalContext<'_>,
    bindings: &Bindings<'_>,
    eval_stack: &mut Vec<(String, String)>,
) -> EngineResult<Value> {
    // Short-circuit forms never evaluate the right operand eagerly.
    match op {
        BinaryOp::And => {
            let left = eval_node(lhs, ctx, bindings, eval_stack)?;
            let left = left.as_bool().ok_or_else(non_bool_operand("&&", &left))?;
            if !left {
                return Ok(Value::Bool(false));
            }
            let right = eval_node(rhs, ctx, bindings, eval_stack)?;
            let right = right.as_bool().ok_or_else(non_bool_operand("&&", &right))?;
            return Ok(Value::Bool(right));
        }
        BinaryOp::Or => {
            let left = eval_node(lhs, ctx, bindings, eval_stack)?;
            let left = left.as_bool().ok_or_else(non_bool_operand("||", &left))?;
            if left {
                return Ok(Value::Bool(true));
            }
            let right = eval_node(rhs, ctx, bindings, eval_stack)?;
            let right = right.as_bool().ok_or_else(non_bool_operand("||", &right))?;
            return Ok(Value::Bool(right));
        }
        BinaryOp::In => {
            let needle = eval_node(lhs, ctx, bindings, eval_stack)?;
            let Expr::List(items) = rhs else {
                return Err(EngineError::ExpressionEvaluation {
                    message: "`in` requires a list literal on its right".to_string(),
                });
            };
            for item in items {
                let candidate = eval_node(item, ctx, bindings, eval_stack)?;
                if needle.loosely_eq(&candidate) {
                    return Ok(Value::Bool(true));
                }
            }
            return Ok(Value::Bool(false));
        }
        _ => {}
    }

    let left = eval_node(lhs, ctx, bindings, eval_stack)?;
    let right = eval_node(rhs, ctx, bindings, eval_stack)?;

    match op {
        BinaryOp::Eq => Ok(Value::Bool(left.loosely_eq(&right))),
        BinaryOp::Ne => Ok(Value::Bool(!left.loosely_eq(&right))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let symbol = match op {
                BinaryOp::Lt => "<",
                BinaryOp::Le => "<=",
                BinaryOp::Gt => ">",
                _ => ">=",
            };
            let a = left.as_num().ok_or_else(non_numeric_operand(symbol, &left))?;
            let b = right.as_num().ok_or_else(non_numeric_operand(symbol, &right))?;
            Ok(Value::Bool(match op {
                BinaryOp::Lt => a < b,
                BinaryOp::Le => a <= b,
                BinaryOp::Gt => a > b,
                _ => a >= b,
            }))
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            let symbol = match op {
                BinaryOp::Add => "+",
                BinaryOp::Sub => "-",
                BinaryOp::Mul => "*",
                BinaryOp::Div => "/",
                _ => "%",
            };
            let a = left.as_num().ok_or_else(non_numeric_operand(symbol, &left))?;
            let b = right.as_num().ok_or_else(non_numeric_operand(symbol, &right))?;
            Ok(Value::Num(match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
                _ => a % b,
            }))
        }
        BinaryOp::And | BinaryOp::Or | BinaryOp::In => unreachable!("handled above"),
    }
}

fn eval_call(
    name: &str,
    args: &[Expr],
    ctx: &EvalContext<'_>,
    bindings: &Bindings<'_>,
    eval_stack: &mut Vec<(String, String)>,
) -> EngineResult<Value> {
    // eval(p.field): the row field itself holds the rule text.
    if name == "eval" {
        let [Expr::Attr { base, field }] = args else {
            return Err(EngineError::ExpressionEvaluation {
                message: "eval() takes exactly one field reference argument".to_string(),
            });
        };
        let source = bindings.resolve(base, field).ok_or_else(|| {
            EngineError::ExpressionEvaluation {
                message: format!("eval(): unresolvable field reference `{base}.{field}`"),
            }
        })?;
        let frame = (base.clone(), field.clone());
        if eval_stack.contains(&frame) {
            return Err(EngineError::ExpressionEvaluation {
                message: format!("eval(): cyclic reference through `{base}.{field}`"),
            });
        }
        let compiled = ctx.cache.get_or_compile(source)?;
        eval_stack.push(frame);
        let result = eval_node(&compiled, ctx, bindings, eval_stack);
        eval_stack.pop();
        return result;
    }

    // Role-relation reachability: g(child, parent[, domain]).
    if let Some(rm) = ctx.role_managers.get(name) {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(eval_node(arg, ctx, bindings, eval_stack)?.to_text());
        }
        let linked = match values.as_slice() {
            [child, parent] => rm.read().has_link(child, parent, None),
            [child, parent, domain] => rm.read().has_link(child, parent, Some(domain)),
            _ => {
                return Err(EngineError::ExpressionEvaluation {
                    message: format!("{name}() expects 2 or 3 arguments, got {}", args.len()),
                })
            }
        };
        return Ok(Value::Bool(linked));
    }

    let Some(function) = ctx.functions.get(name) else {
        return Err(EngineError::ExpressionEvaluation {
            message: format!("unknown function `{name}`"),
        });
    };
    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        values.push(eval_node(arg, ctx, bindings, eval_stack)?);
    }
    function(&values)
}

fn non_numeric_operand<'v>(
    op: &'v str,
    value: &'v Value,
) -> impl FnOnce() -> EngineError + 'v {
    move || EngineError::ExpressionEvaluation {
        message: format!("non-numeric operand {value:?} for `{op}`"),
    }
}

fn non_bool_operand<'v>(op: &'v str, value: &'v Value) -> impl FnOnce() -> EngineError + 'v {
    move || EngineError::ExpressionEvaluation {
        message: format!("non-boolean operand {value:?} for `{op}`"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::RwLock;

    use crate::rbac::{DefaultRoleManager, RoleConfig, RoleManager};

    use super::super::parse;
    use super::*;

    struct Fixture {
        functions: FunctionMap,
        role_managers: HashMap<String, SharedRoleManager>,
        cache: ExpressionCache,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                functions: FunctionMap::default(),
                role_managers: HashMap::new(),
                cache: ExpressionCache::new(),
            }
        }

        fn with_role_manager(mut self, key: &str, rm: DefaultRoleManager) -> Self {
            self.role_managers
                .insert(key.to_string(), Arc::new(RwLock::new(rm)) as SharedRoleManager);
            self
        }

        fn ctx(&self) -> EvalContext<'_> {
            EvalContext {
                functions: &self.functions,
                role_managers: &self.role_managers,
                cache: &self.cache,
            }
        }
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn resolves_request_and_policy_fields() {
        let fixture = Fixture::new();
        let tokens = strings(&["sub", "obj", "act"]);
        let rvals = strings(&["alice", "data1", "read"]);
        let pvals = strings(&["alice", "data1", "read"]);
        let mut bindings = Bindings::new();
        bindings.push("r", &tokens, &rvals);
        bindings.push("p", &tokens, &pvals);

        let expr = parse("r.sub == p.sub && r.obj == p.obj && r.act == p.act").unwrap();
        assert!(evaluate_bool(&expr, &fixture.ctx(), &bindings).unwrap());
    }

    #[test]
    fn unresolvable_references_error_out() {
        let fixture = Fixture::new();
        let bindings = Bindings::new();
        let expr = parse("r.sub == \"alice\"").unwrap();
        let err = evaluate_bool(&expr, &fixture.ctx(), &bindings).unwrap_err();
        assert!(matches!(err, EngineError::ExpressionEvaluation { .. }));
    }

    #[test]
    fn numeric_comparison_parses_strings_on_demand() {
        let fixture = Fixture::new();
        let tokens = strings(&["age"]);
        let rvals = strings(&["56"]);
        let mut bindings = Bindings::new();
        bindings.push("r", &tokens, &rvals);

        let expr = parse("r.age > 50").unwrap();
        assert!(evaluate_bool(&expr, &fixture.ctx(), &bindings).unwrap());
    }

    #[test]
    fn non_numeric_values_in_numeric_context_error_out() {
        let fixture = Fixture::new();
        let tokens = strings(&["age"]);
        let rvals = strings(&["old"]);
        let mut bindings = Bindings::new();
        bindings.push("r", &tokens, &rvals);

        let expr = parse("r.age > 50").unwrap();
        let err = evaluate_bool(&expr, &fixture.ctx(), &bindings).unwrap_err();
        assert!(matches!(err, EngineError::ExpressionEvaluation { .. }));
    }

    #[test]
    fn short_circuit_skips_the_right_operand() {
        let fixture = Fixture::new();
        let tokens = strings(&["sub"]);
        let rvals = strings(&["alice"]);
        let mut bindings = Bindings::new();
        bindings.push("r", &tokens, &rvals);

        // The right side would error (unknown field), but never runs.
        let expr = parse("r.sub == \"bob\" && r.missing == \"x\"").unwrap();
        assert!(!evaluate_bool(&expr, &fixture.ctx(), &bindings).unwrap());

        let expr = parse("r.sub == \"alice\" || r.missing == \"x\"").unwrap();
        assert!(evaluate_bool(&expr, &fixture.ctx(), &bindings).unwrap());
    }

    #[test]
    fn role_calls_delegate_to_has_link() {
        let mut rm = DefaultRoleManager::new(RoleConfig::default());
        rm.add_link("alice", "admin", None);
        let fixture = Fixture::new().with_role_manager("g", rm);

        let r_tokens = strings(&["sub"]);
        let p_tokens = strings(&["sub"]);
        let rvals = strings(&["alice"]);
        let pvals = strings(&["admin"]);
        let mut bindings = Bindings::new();
        bindings.push("r", &r_tokens, &rvals);
        bindings.push("p", &p_tokens, &pvals);

        let expr = parse("g(r.sub, p.sub)").unwrap();
        assert!(evaluate_bool(&expr, &fixture.ctx(), &bindings).unwrap());
    }

    #[test]
    fn domain_scoped_role_calls_pass_the_domain() {
        let mut rm = DefaultRoleManager::new(RoleConfig::default());
        rm.add_link("alice", "admin", Some("domain1"));
        let fixture = Fixture::new().with_role_manager("g", rm);

        let r_tokens = strings(&["sub", "dom"]);
        let p_tokens = strings(&["sub"]);
        let rvals = strings(&["alice", "domain2"]);
        let pvals = strings(&["admin"]);
        let mut bindings = Bindings::new();
        bindings.push("r", &r_tokens, &rvals);
        bindings.push("p", &p_tokens, &pvals);

        let expr = parse("g(r.sub, p.sub, r.dom)").unwrap();
        assert!(!evaluate_bool(&expr, &fixture.ctx(), &bindings).unwrap());
    }

    #[test]
    fn eval_runs_the_rule_text_carried_by_the_row() {
        let fixture = Fixture::new();
        let r_tokens = strings(&["sub", "obj", "act"]);
        let p_tokens = strings(&["sub_rule", "act"]);
        let rvals = strings(&["56", "98", "read"]);
        let pvals = strings(&["r.sub > 50", "read"]);
        let mut bindings = Bindings::new();
        bindings.push("r", &r_tokens, &rvals);
        bindings.push("p", &p_tokens, &pvals);

        let expr = parse("eval(p.sub_rule) && r.act == p.act").unwrap();
        assert!(evaluate_bool(&expr, &fixture.ctx(), &bindings).unwrap());
    }

    #[test]
    fn eval_self_reference_is_an_error_not_a_loop() {
        let fixture = Fixture::new();
        let p_tokens = strings(&["sub_rule"]);
        let pvals = strings(&["eval(p.sub_rule)"]);
        let mut bindings = Bindings::new();
        bindings.push("p", &p_tokens, &pvals);

        let expr = parse("eval(p.sub_rule)").unwrap();
        let err = evaluate_bool(&expr, &fixture.ctx(), &bindings).unwrap_err();
        assert!(matches!(err, EngineError::ExpressionEvaluation { .. }));
    }

    #[test]
    fn eval_chains_across_distinct_fields_terminate() {
        let fixture = Fixture::new();
        let p_tokens = strings(&["first", "second"]);
        let pvals = strings(&["eval(p.second)", "true"]);
        let mut bindings = Bindings::new();
        bindings.push("p", &p_tokens, &pvals);

        let expr = parse("eval(p.first)").unwrap();
        assert!(evaluate_bool(&expr, &fixture.ctx(), &bindings).unwrap());
    }

    #[test]
    fn in_checks_membership_with_loose_equality() {
        let fixture = Fixture::new();
        let tokens = strings(&["act"]);
        let rvals = strings(&["write"]);
        let mut bindings = Bindings::new();
        bindings.push("r", &tokens, &rvals);

        let expr = parse("r.act in [\"read\", \"write\"]").unwrap();
        assert!(evaluate_bool(&expr, &fixture.ctx(), &bindings).unwrap());
    }

    #[test]
    fn non_boolean_matcher_results_are_rejected() {
        let fixture = Fixture::new();
        let bindings = Bindings::new();
        let expr = parse("1 + 2").unwrap();
        let err = evaluate_bool(&expr, &fixture.ctx(), &bindings).unwrap_err();
        assert!(matches!(err, EngineError::ExpressionEvaluation { .. }));
    }
}
