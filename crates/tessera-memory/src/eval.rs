//! Expression evaluation with SQL three-valued logic.
//!
//! Booleans are carried as `Value::Bool`; an unknown truth value is
//! `Value::Null`. Only `Bool(true)` passes a filter.

use std::cmp::Ordering;
use std::collections::HashSet;

use tessera_core::{AggregateFunc, ArrayOp, BinaryOp, Error, Expr, Result, Row, Value};

use crate::select::run_select;
use crate::store::Store;

/// Tables bound to one candidate row: `(alias, row)`. A `None` row is the
/// NULL side of a LEFT JOIN.
pub(crate) type Binding<'a> = Vec<(&'a str, Option<&'a Row>)>;

/// Name resolution scope. Columns are looked up in the current binding
/// first, then in the enclosing query's scope.
#[derive(Clone, Copy)]
pub(crate) struct Scope<'a> {
    binding: &'a [(&'a str, Option<&'a Row>)],
    parent: Option<&'a Scope<'a>>,
}

impl<'a> Scope<'a> {
    pub(crate) fn new(
        binding: &'a [(&'a str, Option<&'a Row>)],
        parent: Option<&'a Scope<'a>>,
    ) -> Self {
        Self { binding, parent }
    }

    fn lookup(&self, table: Option<&str>, name: &str) -> Result<Value> {
        let mut scope = Some(self);
        while let Some(current) = scope {
            for &(alias, row) in current.binding {
                match table {
                    Some(table) if table == alias => {
                        return Ok(row.map_or(Value::Null, |r| r.get_or_null(name)));
                    }
                    None => {
                        if let Some(value) = row.and_then(|r| r.get(name)) {
                            return Ok(value.clone());
                        }
                    }
                    Some(_) => {}
                }
            }
            scope = current.parent;
        }
        Err(Error::query(match table {
            Some(table) => format!("unknown column {table}.{name}"),
            None => format!("unknown column {name}"),
        }))
    }
}

/// Whether `value` is SQL TRUE.
pub(crate) fn is_true(value: &Value) -> bool {
    truth(value) == Some(true)
}

fn truth(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::BigInt(i) => Some(*i != 0),
        _ => None,
    }
}

fn from_truth(truth: Option<bool>) -> Value {
    truth.map_or(Value::Null, Value::Bool)
}

/// Evaluate `expr` for one binding.
pub(crate) fn eval(store: &Store, expr: &Expr, scope: &Scope<'_>) -> Result<Value> {
    Ok(match expr {
        Expr::Column { table, name } => scope.lookup(table.as_deref(), name)?,
        Expr::Field(name) => {
            return Err(Error::query(format!("unresolved field reference '{name}'")));
        }
        Expr::Literal(value) => value.clone(),
        Expr::Binary { left, op, right } => {
            let l = eval(store, left, scope)?;
            match op {
                BinaryOp::And => {
                    if truth(&l) == Some(false) {
                        return Ok(Value::Bool(false));
                    }
                    let r = truth(&eval(store, right, scope)?);
                    match (truth(&l), r) {
                        (_, Some(false)) => Value::Bool(false),
                        (Some(true), Some(true)) => Value::Bool(true),
                        _ => Value::Null,
                    }
                }
                BinaryOp::Or => {
                    if truth(&l) == Some(true) {
                        return Ok(Value::Bool(true));
                    }
                    let r = truth(&eval(store, right, scope)?);
                    match (truth(&l), r) {
                        (_, Some(true)) => Value::Bool(true),
                        (Some(false), Some(false)) => Value::Bool(false),
                        _ => Value::Null,
                    }
                }
                op if op.is_comparison() => compare(*op, &l, &eval(store, right, scope)?),
                op => arithmetic(*op, &l, &eval(store, right, scope)?),
            }
        }
        Expr::Not(inner) => from_truth(truth(&eval(store, inner, scope)?).map(|b| !b)),
        Expr::IsNull { expr, negated } => Value::Bool(eval(store, expr, scope)?.is_null() != *negated),
        Expr::InList {
            expr,
            list,
            negated,
        } => {
            let needle = eval(store, expr, scope)?;
            let mut candidates = Vec::with_capacity(list.len());
            for item in list {
                candidates.push(eval(store, item, scope)?);
            }
            membership(&needle, &candidates, *negated)
        }
        Expr::InSubquery {
            expr,
            subquery,
            negated,
        } => {
            let needle = eval(store, expr, scope)?;
            let column = first_output_column(subquery)?;
            let candidates: Vec<Value> = run_select(store, subquery, Some(scope))?
                .into_iter()
                .map(|row| row.get_or_null(column))
                .collect();
            membership(&needle, &candidates, *negated)
        }
        Expr::Exists { subquery, negated } => {
            let found = !run_select(store, subquery, Some(scope))?.is_empty();
            Value::Bool(found != *negated)
        }
        Expr::Like {
            expr,
            pattern,
            case_insensitive,
            negated,
        } => {
            let text = eval(store, expr, scope)?;
            let pattern = eval(store, pattern, scope)?;
            match (text.as_str(), pattern.as_str()) {
                (Some(text), Some(pattern)) => {
                    let matched = if *case_insensitive {
                        like_matches(&text.to_lowercase(), &pattern.to_lowercase())
                    } else {
                        like_matches(text, pattern)
                    };
                    Value::Bool(matched != *negated)
                }
                _ => Value::Null,
            }
        }
        Expr::Array { left, op, right } => {
            let l = eval(store, left, scope)?;
            let r = eval(store, right, scope)?;
            match (l.as_array(), r.as_array()) {
                (Some(l), Some(r)) => Value::Bool(array_op(*op, &l, &r)),
                _ => Value::Null,
            }
        }
        Expr::Coalesce(items) => {
            for item in items {
                let value = eval(store, item, scope)?;
                if !value.is_null() {
                    return Ok(value);
                }
            }
            Value::Null
        }
        Expr::Concat(items) => {
            let mut out = String::new();
            for item in items {
                match eval(store, item, scope)? {
                    Value::Null => return Ok(Value::Null),
                    Value::Text(s) => out.push_str(&s),
                    other => out.push_str(&other.to_json().to_string()),
                }
            }
            Value::Text(out)
        }
        Expr::Aggregate { .. } => {
            return Err(Error::query("aggregate used outside a grouped select"));
        }
        Expr::Raw { sql, .. } => {
            return Err(Error::query(format!(
                "raw SQL cannot be evaluated in memory: {sql}"
            )));
        }
    })
}

fn first_output_column(select: &tessera_core::Select) -> Result<&str> {
    match select.items.first() {
        Some(tessera_core::SelectItem::Expr { alias, .. }) => Ok(alias),
        _ => Err(Error::query("IN subquery must project a single named column")),
    }
}

fn compare(op: BinaryOp, l: &Value, r: &Value) -> Value {
    if l.is_null() || r.is_null() {
        return Value::Null;
    }
    let ord = l.compare(r);
    let result = match (op, ord) {
        (BinaryOp::Eq, ord) => ord == Some(Ordering::Equal),
        (BinaryOp::Ne, ord) => ord != Some(Ordering::Equal),
        (_, None) => return Value::Null,
        (BinaryOp::Gt, Some(o)) => o == Ordering::Greater,
        (BinaryOp::Gte, Some(o)) => o != Ordering::Less,
        (BinaryOp::Lt, Some(o)) => o == Ordering::Less,
        (BinaryOp::Lte, Some(o)) => o != Ordering::Greater,
        _ => return Value::Null,
    };
    Value::Bool(result)
}

fn arithmetic(op: BinaryOp, l: &Value, r: &Value) -> Value {
    if let (Value::BigInt(a), Value::BigInt(b)) = (l, r) {
        let result = match op {
            BinaryOp::Add => a.checked_add(*b),
            BinaryOp::Sub => a.checked_sub(*b),
            BinaryOp::Mul => a.checked_mul(*b),
            BinaryOp::Div => a.checked_div(*b),
            _ => None,
        };
        return result.map_or(Value::Null, Value::BigInt);
    }
    match (l.as_f64(), r.as_f64()) {
        (Some(a), Some(b)) => match op {
            BinaryOp::Add => Value::Double(a + b),
            BinaryOp::Sub => Value::Double(a - b),
            BinaryOp::Mul => Value::Double(a * b),
            BinaryOp::Div if b != 0.0 => Value::Double(a / b),
            _ => Value::Null,
        },
        _ => Value::Null,
    }
}

fn membership(needle: &Value, candidates: &[Value], negated: bool) -> Value {
    if candidates.is_empty() {
        return Value::Bool(negated);
    }
    if needle.is_null() {
        return Value::Null;
    }
    let mut saw_null = false;
    for candidate in candidates {
        match compare(BinaryOp::Eq, needle, candidate) {
            Value::Bool(true) => return Value::Bool(!negated),
            Value::Null => saw_null = true,
            _ => {}
        }
    }
    if saw_null {
        Value::Null
    } else {
        Value::Bool(negated)
    }
}

fn array_op(op: ArrayOp, left: &[Value], right: &[Value]) -> bool {
    let keys = |values: &[Value]| values.iter().map(Value::group_key).collect::<HashSet<_>>();
    match op {
        ArrayOp::Overlaps => {
            let right = keys(right);
            left.iter().any(|v| right.contains(&v.group_key()))
        }
        ArrayOp::ContainedBy => {
            let right = keys(right);
            left.iter().all(|v| right.contains(&v.group_key()))
        }
        ArrayOp::Contains => {
            let left = keys(left);
            right.iter().all(|v| left.contains(&v.group_key()))
        }
    }
}

enum LikeToken {
    Many,
    One,
    Char(char),
}

/// SQL `LIKE` with `%`, `_` and `\` escapes.
pub(crate) fn like_matches(text: &str, pattern: &str) -> bool {
    let mut tokens = Vec::new();
    let mut chars = pattern.chars();
    while let Some(ch) = chars.next() {
        tokens.push(match ch {
            '%' => LikeToken::Many,
            '_' => LikeToken::One,
            '\\' => LikeToken::Char(chars.next().unwrap_or('\\')),
            other => LikeToken::Char(other),
        });
    }

    let text: Vec<char> = text.chars().collect();
    let (mut t, mut p) = (0, 0);
    // (token after the last '%', text position it is currently anchored at)
    let mut backtrack: Option<(usize, usize)> = None;
    while t < text.len() {
        match tokens.get(p) {
            Some(LikeToken::Many) => {
                backtrack = Some((p + 1, t));
                p += 1;
                continue;
            }
            Some(LikeToken::One) => {
                t += 1;
                p += 1;
                continue;
            }
            Some(LikeToken::Char(c)) if *c == text[t] => {
                t += 1;
                p += 1;
                continue;
            }
            _ => {}
        }
        match backtrack {
            Some((after, anchor)) => {
                p = after;
                t = anchor + 1;
                backtrack = Some((after, anchor + 1));
            }
            None => return false,
        }
    }
    tokens[p..].iter().all(|t| matches!(t, LikeToken::Many))
}

/// Compute an aggregate over a group of bindings.
pub(crate) fn aggregate(
    store: &Store,
    func: AggregateFunc,
    arg: Option<&Expr>,
    distinct: bool,
    group: &[Binding<'_>],
    outer: Option<&Scope<'_>>,
) -> Result<Value> {
    let Some(arg) = arg else {
        return Ok(Value::BigInt(group.len() as i64));
    };
    let mut values = Vec::with_capacity(group.len());
    for binding in group {
        let value = eval(store, arg, &Scope::new(binding, outer))?;
        if !value.is_null() {
            values.push(value);
        }
    }
    if distinct {
        let mut seen = HashSet::new();
        values.retain(|v| seen.insert(v.group_key()));
    }

    Ok(match func {
        AggregateFunc::Count => Value::BigInt(values.len() as i64),
        AggregateFunc::Sum | AggregateFunc::Avg => {
            if values.is_empty() {
                return Ok(Value::Null);
            }
            if values.iter().any(|v| !v.is_numeric()) {
                return Err(Error::query(format!(
                    "{} over a non-numeric value",
                    func.as_str()
                )));
            }
            let total: f64 = values.iter().filter_map(Value::as_f64).sum();
            if func == AggregateFunc::Avg {
                Value::Double(total / values.len() as f64)
            } else if values.iter().all(|v| matches!(v, Value::BigInt(_))) {
                values
                    .iter()
                    .filter_map(Value::as_i64)
                    .try_fold(0i64, i64::checked_add)
                    .map_or(Value::Double(total), Value::BigInt)
            } else {
                Value::Double(total)
            }
        }
        AggregateFunc::Min => values.into_iter().min_by(Value::sort_cmp).unwrap_or(Value::Null),
        AggregateFunc::Max => values.into_iter().max_by(Value::sort_cmp).unwrap_or(Value::Null),
    })
}

/// Replace every aggregate in `expr` by its value over `group`.
pub(crate) fn fold_aggregates(
    store: &Store,
    expr: &Expr,
    group: &[Binding<'_>],
    outer: Option<&Scope<'_>>,
) -> Result<Expr> {
    let fold = |e: &Expr| fold_aggregates(store, e, group, outer);
    let fold_all = |items: &[Expr]| items.iter().map(fold).collect::<Result<Vec<_>>>();
    Ok(match expr {
        Expr::Aggregate {
            func,
            arg,
            distinct,
        } => Expr::Literal(aggregate(store, *func, arg.as_deref(), *distinct, group, outer)?),
        Expr::Binary { left, op, right } => Expr::Binary {
            left: Box::new(fold(left)?),
            op: *op,
            right: Box::new(fold(right)?),
        },
        Expr::Not(inner) => Expr::Not(Box::new(fold(inner)?)),
        Expr::IsNull { expr, negated } => Expr::IsNull {
            expr: Box::new(fold(expr)?),
            negated: *negated,
        },
        Expr::Coalesce(items) => Expr::Coalesce(fold_all(items)?),
        Expr::Concat(items) => Expr::Concat(fold_all(items)?),
        other => other.clone(),
    })
}
