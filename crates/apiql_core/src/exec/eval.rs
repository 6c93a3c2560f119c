//! Expression evaluation over json rows.

use std::cmp::Ordering;

use apiql_parser::ast::{
    BinaryOperator, Expr, Function, FunctionArg, Ident, Literal, UnaryOperator,
};
use serde_json::{Number, Value};

use super::query::ColumnRef;
use crate::errors::ExecutionError;

type Result<T> = std::result::Result<T, ExecutionError>;

pub fn literal_value(lit: &Literal) -> Value {
    match lit {
        Literal::Number(n) => parse_number(n),
        Literal::SingleQuotedString(s) => Value::String(s.clone()),
        Literal::Boolean(b) => Value::Bool(*b),
        Literal::Null => Value::Null,
    }
}

fn parse_number(n: &str) -> Value {
    if let Ok(i) = n.parse::<i64>() {
        return Value::Number(i.into());
    }
    n.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(n.to_string()))
}

/// Evaluate an expression that does not reference any columns.
pub fn constant_value(expr: &Expr) -> Result<Value> {
    eval_expr(expr, &[], &[])
}

/// Evaluate an expression against a single row.
pub fn eval_expr(expr: &Expr, columns: &[ColumnRef], row: &[Value]) -> Result<Value> {
    match expr {
        Expr::Ident(ident) => lookup_column(None, ident, columns, row),
        Expr::CompoundIdent(idents) => match idents.as_slice() {
            [] => Err(ExecutionError::Evaluation("empty identifier".to_string())),
            [ident] => lookup_column(None, ident, columns, row),
            [.., qualifier, ident] => lookup_column(Some(qualifier), ident, columns, row),
        },
        Expr::Literal(lit) => Ok(literal_value(lit)),
        Expr::BinaryExpr { left, op, right } => {
            let left = eval_expr(left, columns, row)?;
            let right = eval_expr(right, columns, row)?;
            apply_binary(*op, &left, &right)
        }
        Expr::UnaryExpr { op, expr } => {
            let val = eval_expr(expr, columns, row)?;
            apply_unary(*op, &val)
        }
        Expr::IsNull { expr, negated } => {
            let val = eval_expr(expr, columns, row)?;
            Ok(Value::Bool(val.is_null() != *negated))
        }
        Expr::IsBool { expr, val, negated } => {
            let actual = eval_expr(expr, columns, row)?;
            let is = matches!(actual, Value::Bool(b) if b == *val);
            Ok(Value::Bool(is != *negated))
        }
        Expr::InList {
            expr,
            list,
            negated,
        } => {
            let needle = eval_expr(expr, columns, row)?;
            if needle.is_null() {
                return Ok(Value::Null);
            }
            let mut saw_null = false;
            for item in list {
                let item = eval_expr(item, columns, row)?;
                match compare(&needle, &item) {
                    Some(Ordering::Equal) => return Ok(Value::Bool(!*negated)),
                    None if item.is_null() => saw_null = true,
                    _ => (),
                }
            }
            if saw_null {
                Ok(Value::Null)
            } else {
                Ok(Value::Bool(*negated))
            }
        }
        Expr::Between {
            expr,
            negated,
            low,
            high,
        } => {
            let val = eval_expr(expr, columns, row)?;
            let low = eval_expr(low, columns, row)?;
            let high = eval_expr(high, columns, row)?;
            match (compare(&val, &low), compare(&val, &high)) {
                (Some(lo), Some(hi)) => {
                    let between = lo != Ordering::Less && hi != Ordering::Greater;
                    Ok(Value::Bool(between != *negated))
                }
                _ => Ok(Value::Null),
            }
        }
        Expr::Like {
            expr,
            negated,
            pattern,
        } => {
            let val = eval_expr(expr, columns, row)?;
            let pattern = eval_expr(pattern, columns, row)?;
            match (val, pattern) {
                (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
                (val, Value::String(pattern)) => {
                    let text = value_to_string(&val);
                    Ok(Value::Bool(like_match(&text, &pattern) != *negated))
                }
                (_, other) => Err(ExecutionError::Evaluation(format!(
                    "LIKE pattern must be a string, got {other}"
                ))),
            }
        }
        Expr::Function(func) => eval_scalar_function(func, columns, row),
        Expr::Nested(expr) => eval_expr(expr, columns, row),
        Expr::Tuple(exprs) => {
            let vals = exprs
                .iter()
                .map(|e| eval_expr(e, columns, row))
                .collect::<Result<Vec<_>>>()?;
            Ok(Value::Array(vals))
        }
        Expr::Subquery(_) | Expr::InSubquery { .. } | Expr::Exists { .. } => Err(
            ExecutionError::Unsupported("subqueries in expressions".to_string()),
        ),
    }
}

fn lookup_column(
    qualifier: Option<&Ident>,
    ident: &Ident,
    columns: &[ColumnRef],
    row: &[Value],
) -> Result<Value> {
    let mut found = None;
    for (idx, col) in columns.iter().enumerate() {
        if !col.matches(qualifier.map(|q| q.as_str()), ident.as_str()) {
            continue;
        }
        if found.is_some() {
            return Err(ExecutionError::Evaluation(format!(
                "ambiguous column reference '{ident}'"
            )));
        }
        found = Some(idx);
    }

    match found {
        Some(idx) => Ok(row.get(idx).cloned().unwrap_or(Value::Null)),
        None => {
            let name = match qualifier {
                Some(q) => format!("{q}.{ident}"),
                None => ident.to_string(),
            };
            Err(ExecutionError::Evaluation(format!("unknown column '{name}'")))
        }
    }
}

/// Evaluate a predicate. NULL is treated as false.
pub fn eval_predicate(expr: &Expr, columns: &[ColumnRef], row: &[Value]) -> Result<bool> {
    match eval_expr(expr, columns, row)? {
        Value::Bool(b) => Ok(b),
        Value::Null => Ok(false),
        other => Err(ExecutionError::Evaluation(format!(
            "expected a boolean predicate, got {other}"
        ))),
    }
}

pub fn apply_unary(op: UnaryOperator, val: &Value) -> Result<Value> {
    match (op, val) {
        (_, Value::Null) => Ok(Value::Null),
        (UnaryOperator::Plus, Value::Number(_)) => Ok(val.clone()),
        (UnaryOperator::Minus, Value::Number(n)) => {
            Ok(match n.as_i64().and_then(i64::checked_neg) {
                Some(i) => Value::Number(i.into()),
                None => float_value(-n.as_f64().unwrap_or_default()),
            })
        }
        (UnaryOperator::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (op, val) => Err(ExecutionError::Evaluation(format!(
            "invalid operand for {op:?}: {val}"
        ))),
    }
}

pub fn apply_binary(op: BinaryOperator, left: &Value, right: &Value) -> Result<Value> {
    match op {
        BinaryOperator::And => Ok(match (as_bool(left)?, as_bool(right)?) {
            (Some(false), _) | (_, Some(false)) => Value::Bool(false),
            (Some(true), Some(true)) => Value::Bool(true),
            _ => Value::Null,
        }),
        BinaryOperator::Or => Ok(match (as_bool(left)?, as_bool(right)?) {
            (Some(true), _) | (_, Some(true)) => Value::Bool(true),
            (Some(false), Some(false)) => Value::Bool(false),
            _ => Value::Null,
        }),
        BinaryOperator::Xor => Ok(match (as_bool(left)?, as_bool(right)?) {
            (Some(a), Some(b)) => Value::Bool(a != b),
            _ => Value::Null,
        }),
        BinaryOperator::Eq
        | BinaryOperator::NotEq
        | BinaryOperator::Lt
        | BinaryOperator::LtEq
        | BinaryOperator::Gt
        | BinaryOperator::GtEq => {
            let ord = match compare(left, right) {
                Some(ord) => ord,
                None => return Ok(Value::Null),
            };
            let b = match op {
                BinaryOperator::Eq => ord == Ordering::Equal,
                BinaryOperator::NotEq => ord != Ordering::Equal,
                BinaryOperator::Lt => ord == Ordering::Less,
                BinaryOperator::LtEq => ord != Ordering::Greater,
                BinaryOperator::Gt => ord == Ordering::Greater,
                _ => ord != Ordering::Less,
            };
            Ok(Value::Bool(b))
        }
        BinaryOperator::StringConcat => match (left, right) {
            (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
            (l, r) => Ok(Value::String(format!(
                "{}{}",
                value_to_string(l),
                value_to_string(r)
            ))),
        },
        BinaryOperator::Plus
        | BinaryOperator::Minus
        | BinaryOperator::Multiply
        | BinaryOperator::Divide
        | BinaryOperator::Modulo => arithmetic(op, left, right),
    }
}

fn arithmetic(op: BinaryOperator, left: &Value, right: &Value) -> Result<Value> {
    let (l, r) = match (left, right) {
        (Value::Null, _) | (_, Value::Null) => return Ok(Value::Null),
        (Value::Number(l), Value::Number(r)) => (l, r),
        (l, r) => {
            return Err(ExecutionError::Evaluation(format!(
                "cannot apply '{op}' to {l} and {r}"
            )));
        }
    };

    if let (Some(l), Some(r)) = (l.as_i64(), r.as_i64()) {
        let result = match op {
            BinaryOperator::Plus => l.checked_add(r),
            BinaryOperator::Minus => l.checked_sub(r),
            BinaryOperator::Multiply => l.checked_mul(r),
            BinaryOperator::Divide if r == 0 || l.checked_rem(r) != Some(0) => None,
            BinaryOperator::Divide => l.checked_div(r),
            _ => l.checked_rem(r),
        };
        if let Some(v) = result {
            return Ok(Value::Number(v.into()));
        }
    }

    let l = l.as_f64().unwrap_or_default();
    let r = r.as_f64().unwrap_or_default();
    if r == 0.0 && matches!(op, BinaryOperator::Divide | BinaryOperator::Modulo) {
        return Err(ExecutionError::Evaluation("division by zero".to_string()));
    }
    Ok(float_value(match op {
        BinaryOperator::Plus => l + r,
        BinaryOperator::Minus => l - r,
        BinaryOperator::Multiply => l * r,
        BinaryOperator::Divide => l / r,
        _ => l % r,
    }))
}

fn float_value(f: f64) -> Value {
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

fn as_bool(val: &Value) -> Result<Option<bool>> {
    match val {
        Value::Bool(b) => Ok(Some(*b)),
        Value::Null => Ok(None),
        other => Err(ExecutionError::Evaluation(format!(
            "expected a boolean, got {other}"
        ))),
    }
}

/// SQL comparison. Returns `None` if either side is null or the values are
/// not comparable.
pub fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::Number(l), Value::Number(r)) => match (l.as_i64(), r.as_i64()) {
            (Some(l), Some(r)) => Some(l.cmp(&r)),
            _ => l.as_f64()?.partial_cmp(&r.as_f64()?),
        },
        (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        (Value::Bool(l), Value::Bool(r)) => Some(l.cmp(r)),
        // Path parameters and ids often arrive as strings on one side.
        (Value::String(s), Value::Number(n)) => compare_str_number(s, n),
        (Value::Number(n), Value::String(s)) => compare_str_number(s, n).map(Ordering::reverse),
        (l, r) if l == r => Some(Ordering::Equal),
        _ => None,
    }
}

fn compare_str_number(s: &str, n: &Number) -> Option<Ordering> {
    let parsed: f64 = s.parse().ok()?;
    parsed.partial_cmp(&n.as_f64()?)
}

/// Total order used for sorting. Nulls sort last.
pub fn sort_cmp(left: &Value, right: &Value) -> Ordering {
    match (left, right) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Greater,
        (_, Value::Null) => Ordering::Less,
        (l, r) => compare(l, r).unwrap_or_else(|| l.to_string().cmp(&r.to_string())),
    }
}

/// Render a value as plain text, without quotes for strings.
pub fn value_to_string(val: &Value) -> String {
    match val {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// SQL LIKE matching with `%` and `_` wildcards.
pub fn like_match(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();

    let (mut t, mut p) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('%') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some('_') => {
                t += 1;
                p += 1;
            }
            Some(c) if *c == text[t] => {
                t += 1;
                p += 1;
            }
            _ => match backtrack {
                Some((bp, bt)) => {
                    p = bp + 1;
                    t = bt + 1;
                    backtrack = Some((bp, bt + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|c| *c == '%')
}

const AGGREGATES: &[&str] = &["count", "sum", "min", "max", "avg"];

pub fn is_aggregate(func: &Function) -> bool {
    func.reference
        .base()
        .map(|name| {
            AGGREGATES
                .iter()
                .any(|agg| name.as_str().eq_ignore_ascii_case(agg))
        })
        .unwrap_or(false)
}

pub fn contains_aggregate(expr: &Expr) -> bool {
    match expr {
        Expr::Function(func) => is_aggregate(func),
        Expr::BinaryExpr { left, right, .. } => {
            contains_aggregate(left) || contains_aggregate(right)
        }
        Expr::UnaryExpr { expr, .. }
        | Expr::Nested(expr)
        | Expr::IsNull { expr, .. }
        | Expr::IsBool { expr, .. } => contains_aggregate(expr),
        _ => false,
    }
}

fn function_name(func: &Function) -> Result<String> {
    func.reference
        .base()
        .map(|ident| ident.as_str().to_ascii_lowercase())
        .map_err(|e| ExecutionError::Evaluation(e.to_string()))
}

fn unnamed_args(func: &Function) -> Result<Vec<&Expr>> {
    func.args
        .iter()
        .map(|arg| match arg {
            FunctionArg::Unnamed { arg } | FunctionArg::Named { arg, .. } => Ok(arg),
            FunctionArg::Wildcard => Err(ExecutionError::Evaluation(format!(
                "'*' is not a valid argument to {}",
                func.reference
            ))),
        })
        .collect()
}

fn eval_scalar_function(func: &Function, columns: &[ColumnRef], row: &[Value]) -> Result<Value> {
    let name = function_name(func)?;
    if AGGREGATES.contains(&name.as_str()) {
        // Aggregates over a single row.
        return eval_aggregate(func, columns, std::slice::from_ref(&row.to_vec()));
    }

    let args = unnamed_args(func)?
        .into_iter()
        .map(|arg| eval_expr(arg, columns, row))
        .collect::<Result<Vec<_>>>()?;


    match name.as_str() {
        "lower" => Ok(map_string(single_arg(&name, &args)?, |s| s.to_lowercase())),
        "upper" => Ok(map_string(single_arg(&name, &args)?, |s| s.to_uppercase())),
        "length" => Ok(match single_arg(&name, &args)? {
            Value::Null => Value::Null,
            val => Value::Number((value_to_string(val).chars().count() as i64).into()),
        }),
        "abs" => match single_arg(&name, &args)? {
            Value::Number(n) => Ok(match n.as_i64() {
                Some(i) => Value::Number(i.abs().into()),
                None => float_value(n.as_f64().unwrap_or_default().abs()),
            }),
            Value::Null => Ok(Value::Null),
            other => Err(ExecutionError::Evaluation(format!(
                "abs expects a number, got {other}"
            ))),
        },
        "coalesce" => Ok(args.into_iter().find(|v| !v.is_null()).unwrap_or(Value::Null)),
        "concat" => Ok(Value::String(args.iter().map(value_to_string).collect())),
        other => Err(ExecutionError::Unsupported(format!("function '{other}'"))),
    }
}

fn single_arg<'a>(name: &str, args: &'a [Value]) -> Result<&'a Value> {
    match args {
        [arg] => Ok(arg),
        _ => Err(ExecutionError::Evaluation(format!(
            "{name} expects exactly one argument"
        ))),
    }
}

fn map_string(val: &Value, f: impl Fn(&str) -> String) -> Value {
    match val {
        Value::Null => Value::Null,
        Value::String(s) => Value::String(f(s)),
        other => Value::String(f(&other.to_string())),
    }
}

/// Evaluate an expression over a group of rows. Aggregate calls consume the
/// whole group; anything else is evaluated against the first row.
pub fn eval_grouped(expr: &Expr, columns: &[ColumnRef], rows: &[Vec<Value>]) -> Result<Value> {
    match expr {
        Expr::Function(func) if is_aggregate(func) => eval_aggregate(func, columns, rows),
        Expr::BinaryExpr { left, op, right } => {
            let left = eval_grouped(left, columns, rows)?;
            let right = eval_grouped(right, columns, rows)?;
            apply_binary(*op, &left, &right)
        }
        Expr::UnaryExpr { op, expr } => apply_unary(*op, &eval_grouped(expr, columns, rows)?),
        Expr::Nested(expr) => eval_grouped(expr, columns, rows),
        Expr::IsNull { expr, negated } => {
            let val = eval_grouped(expr, columns, rows)?;
            Ok(Value::Bool(val.is_null() != *negated))
        }
        other => match rows.first() {
            Some(row) => eval_expr(other, columns, row),
            None => eval_expr(other, columns, &vec![Value::Null; columns.len()]),
        },
    }
}

fn eval_aggregate(func: &Function, columns: &[ColumnRef], rows: &[Vec<Value>]) -> Result<Value> {
    let name = function_name(func)?;

    if name == "count" && matches!(func.args.as_slice(), [FunctionArg::Wildcard]) {
        return Ok(Value::Number((rows.len() as i64).into()));
    }

    let arg = match unnamed_args(func)?.as_slice() {
        [arg] => *arg,
        _ => {
            return Err(ExecutionError::Evaluation(format!(
                "{name} expects exactly one argument"
            )));
        }
    };

    let mut vals = Vec::with_capacity(rows.len());
    for row in rows {
        let val = eval_expr(arg, columns, row)?;
        if val.is_null() {
            continue;
        }
        if func.distinct && vals.contains(&val) {
            continue;
        }
        vals.push(val);
    }

    match name.as_str() {
        "count" => Ok(Value::Number((vals.len() as i64).into())),
        "min" => Ok(vals.into_iter().min_by(sort_cmp).unwrap_or(Value::Null)),
        "max" => Ok(vals.into_iter().max_by(sort_cmp).unwrap_or(Value::Null)),
        "sum" | "avg" => {
            if vals.is_empty() {
                return Ok(Value::Null);
            }
            let count = vals.len();
            let mut sum = Value::Number(0.into());
            for val in vals {
                sum = arithmetic(BinaryOperator::Plus, &sum, &val)?;
            }
            if name == "sum" {
                Ok(sum)
            } else {
                let total = sum.as_f64().unwrap_or_default();
                Ok(float_value(total / count as f64))
            }
        }
        other => Err(ExecutionError::Unsupported(format!("aggregate '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use apiql_parser::ast::AstParseable;
    use apiql_parser::parser::Parser;
    use serde_json::json;

    use super::*;

    fn expr(s: &str) -> Expr {
        let mut parser = Parser::with_sql_string(s).unwrap();
        Expr::parse(&mut parser).unwrap()
    }

    fn columns() -> Vec<ColumnRef> {
        vec![
            ColumnRef::new(Some("t"), "a"),
            ColumnRef::new(Some("t"), "b"),
            ColumnRef::new(Some("u"), "a"),
        ]
    }

    #[test]
    fn constants() {
        assert_eq!(json!(3), constant_value(&expr("1 + 2")).unwrap());
        assert_eq!(json!(2.5), constant_value(&expr("5 / 2")).unwrap());
        assert_eq!(json!(2), constant_value(&expr("4 / 2")).unwrap());
        assert_eq!(json!("ab"), constant_value(&expr("'a' || 'b'")).unwrap());
        assert_eq!(json!(true), constant_value(&expr("NOT false")).unwrap());
        assert_eq!(Value::Null, constant_value(&expr("NULL = 1")).unwrap());
        assert_eq!(json!(false), constant_value(&expr("NULL AND false")).unwrap());
        assert_eq!(json!(-4), constant_value(&expr("-4")).unwrap());
    }

    #[test]
    fn integer_overflow_falls_back_to_float() {
        let min = "(-9223372036854775807 - 1)";
        let expected = json!(9223372036854775808.0);
        assert_eq!(expected, constant_value(&expr(&format!("{min} / -1"))).unwrap());
        assert_eq!(expected, constant_value(&expr(&format!("-{min}"))).unwrap());
        assert!(constant_value(&expr(&format!("{min} % -1"))).is_ok());
        assert_eq!(json!(i64::MIN), constant_value(&expr(min)).unwrap());
    }

    #[test]
    fn columns_resolve_with_qualifier() {
        let row = vec![json!(1), json!("x"), json!(2)];
        assert_eq!(json!(1), eval_expr(&expr("t.a"), &columns(), &row).unwrap());
        assert_eq!(json!(2), eval_expr(&expr("u.a"), &columns(), &row).unwrap());
        assert_eq!(json!("x"), eval_expr(&expr("b"), &columns(), &row).unwrap());

        let err = eval_expr(&expr("a"), &columns(), &row).unwrap_err();
        assert!(err.to_string().contains("ambiguous"), "{err}");
        let err = eval_expr(&expr("c"), &columns(), &row).unwrap_err();
        assert!(err.to_string().contains("unknown column"), "{err}");
    }

    #[test]
    fn predicates() {
        let row = vec![json!(5), json!("hello"), Value::Null];
        let cols = columns();
        let check = |s: &str| eval_predicate(&expr(s), &cols, &row).unwrap();

        assert!(check("t.a BETWEEN 1 AND 5"));
        assert!(check("t.a IN (1, 5)"));
        assert!(!check("t.a NOT IN (1, 5)"));
        assert!(check("b LIKE 'h%o'"));
        assert!(check("b LIKE '_ello'"));
        assert!(!check("b LIKE 'h%x'"));
        assert!(check("u.a IS NULL"));
        assert!(!check("u.a = 1"));
        assert!(check("t.a = '5'"));
    }

    #[test]
    fn like_patterns() {
        assert!(like_match("", "%"));
        assert!(like_match("abc", "a%c"));
        assert!(like_match("abcbc", "a%bc"));
        assert!(!like_match("abc", "a_"));
        assert!(like_match("issues", "iss%"));
    }

    #[test]
    fn scalar_functions() {
        assert_eq!(json!("ABC"), constant_value(&expr("upper('abc')")).unwrap());
        assert_eq!(json!(3), constant_value(&expr("length('abc')")).unwrap());
        assert_eq!(json!(2), constant_value(&expr("coalesce(NULL, 2, 3)")).unwrap());
        assert_eq!(json!(4), constant_value(&expr("abs(-4)")).unwrap());
        let err = constant_value(&expr("nope(1)")).unwrap_err();
        assert!(matches!(err, ExecutionError::Unsupported(_)));
    }

    #[test]
    fn aggregates_over_group() {
        let cols = vec![ColumnRef::new(None, "n")];
        let rows = vec![vec![json!(1)], vec![json!(3)], vec![Value::Null]];
        let agg = |s: &str| eval_grouped(&expr(s), &cols, &rows).unwrap();

        assert_eq!(json!(3), agg("count(*)"));
        assert_eq!(json!(2), agg("count(n)"));
        assert_eq!(json!(4), agg("sum(n)"));
        assert_eq!(json!(2.0), agg("avg(n)"));
        assert_eq!(json!(1), agg("min(n)"));
        assert_eq!(json!(3), agg("max(n)"));
        assert_eq!(json!(5), agg("max(n) + 2"));
    }
}
