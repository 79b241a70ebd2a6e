//! Filter evaluation.
//!
//! Evaluation is eager: every expression appends its outputs to a caller
//! supplied vector. Outputs produced before an error stay in the vector, which
//! gives `try` and `?` the same partial-output behavior as a streaming
//! evaluator. Every node visited and every value produced costs one step;
//! running out of steps cannot be caught by `try`, `?` or `//`.

use std::cmp::Ordering;

use serde_json::{Map, Value};

use super::builtins;
use super::parser::{BinOp, Expr, ObjKey, TemplatePart};

/// Why evaluation stopped.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Fault {
    /// A runtime error, catchable by `try`.
    Raise(Value),
    /// The step budget ran out.
    Budget,
}

impl Fault {
    pub(crate) fn msg(message: impl Into<String>) -> Self {
        Fault::Raise(Value::String(message.into()))
    }

    /// Message for reporting an uncaught error.
    pub(crate) fn message(&self) -> String {
        match self {
            Fault::Raise(Value::String(s)) => s.clone(),
            Fault::Raise(other) => format!("{} (not a string)", other),
            Fault::Budget => "evaluation step budget exhausted".to_string(),
        }
    }
}

pub(crate) type EvalResult = Result<(), Fault>;

/// Variable bindings, innermost first.
pub(crate) enum Env<'a> {
    Empty,
    Bind {
        name: &'a str,
        value: Value,
        parent: &'a Env<'a>,
    },
}

impl Env<'_> {
    fn lookup(&self, wanted: &str) -> Option<&Value> {
        let mut env = self;
        loop {
            match env {
                Env::Empty => return None,
                Env::Bind {
                    name,
                    value,
                    parent,
                } => {
                    if *name == wanted {
                        return Some(value);
                    }
                    env = parent;
                }
            }
        }
    }
}

/// Interpreter state for one run.
pub(crate) struct Evaluator {
    steps: u64,
    max_steps: u64,
}

impl Evaluator {
    pub(crate) fn new(max_steps: u64) -> Self {
        Self {
            steps: 0,
            max_steps,
        }
    }

    pub(crate) fn steps(&self) -> u64 {
        self.steps
    }

    /// Charge `cost` steps.
    pub(crate) fn charge(&mut self, cost: u64) -> EvalResult {
        self.steps = self.steps.saturating_add(cost);
        if self.steps > self.max_steps {
            Err(Fault::Budget)
        } else {
            Ok(())
        }
    }

    /// Evaluate into a fresh vector.
    pub(crate) fn collect(&mut self, expr: &Expr, input: &Value, env: &Env<'_>) -> Result<Vec<Value>, Fault> {
        let mut out = Vec::new();
        self.eval(expr, input, env, &mut out)?;
        Ok(out)
    }

    pub(crate) fn eval(&mut self, expr: &Expr, input: &Value, env: &Env<'_>, out: &mut Vec<Value>) -> EvalResult {
        self.charge(1)?;
        let before = out.len();
        self.eval_node(expr, input, env, out)?;
        self.charge((out.len() - before) as u64)
    }

    fn eval_node(&mut self, expr: &Expr, input: &Value, env: &Env<'_>, out: &mut Vec<Value>) -> EvalResult {
        match expr {
            Expr::Identity => {
                out.push(input.clone());
                Ok(())
            }
            Expr::RecurseAll => builtins::recurse_values(self, input, out),
            Expr::Literal(value) => {
                out.push(value.clone());
                Ok(())
            }
            Expr::Template(parts) => self.template(parts, input, env, out),
            Expr::Var(name) => match env.lookup(name) {
                Some(value) => {
                    out.push(value.clone());
                    Ok(())
                }
                None => Err(Fault::msg(format!("${} is not defined", name))),
            },
            Expr::Index(target, key) => {
                let targets = self.collect(target, input, env)?;
                for t in &targets {
                    for k in self.collect(key, input, env)? {
                        out.push(index(t, &k)?);
                    }
                }
                Ok(())
            }
            Expr::Slice(target, from, to) => {
                let targets = self.collect(target, input, env)?;
                let froms = self.optional_collect(from.as_deref(), input, env)?;
                let tos = self.optional_collect(to.as_deref(), input, env)?;
                for t in &targets {
                    for to in &tos {
                        for from in &froms {
                            out.push(slice(t, from, to)?);
                        }
                    }
                }
                Ok(())
            }
            Expr::Iterate(target) => {
                for t in self.collect(target, input, env)? {
                    iterate(t, out)?;
                }
                Ok(())
            }
            Expr::Try(body, handler) => match self.eval(body, input, env, out) {
                Ok(()) => Ok(()),
                Err(Fault::Budget) => Err(Fault::Budget),
                Err(Fault::Raise(error)) => match handler {
                    Some(handler) => self.eval(handler, &error, env, out),
                    None => Ok(()),
                },
            },
            Expr::Array(inner) => {
                let mut items = Vec::new();
                if let Some(inner) = inner {
                    self.eval(inner, input, env, &mut items)?;
                }
                out.push(Value::Array(items));
                Ok(())
            }
            Expr::Object(entries) => self.object(entries, input, env, out),
            Expr::Neg(inner) => {
                for v in self.collect(inner, input, env)? {
                    match v.as_f64() {
                        Some(n) => out.push(builtins::number(-n)),
                        None => {
                            return Err(Fault::msg(format!(
                                "{} cannot be negated",
                                describe(&v)
                            )));
                        }
                    }
                }
                Ok(())
            }
            Expr::Pipe(lhs, rhs) => {
                for v in self.collect(lhs, input, env)? {
                    self.eval(rhs, &v, env, out)?;
                }
                Ok(())
            }
            Expr::Comma(lhs, rhs) => {
                self.eval(lhs, input, env, out)?;
                self.eval(rhs, input, env, out)
            }
            Expr::Alt(lhs, rhs) => {
                let mut left = Vec::new();
                match self.eval(lhs, input, env, &mut left) {
                    Err(Fault::Budget) => return Err(Fault::Budget),
                    Ok(()) | Err(Fault::Raise(_)) => {}
                }
                let before = out.len();
                out.extend(left.into_iter().filter(truthy));
                if out.len() == before {
                    self.eval(rhs, input, env, out)?;
                }
                Ok(())
            }
            Expr::And(lhs, rhs) => {
                for l in self.collect(lhs, input, env)? {
                    if !truthy(&l) {
                        out.push(Value::Bool(false));
                        continue;
                    }
                    for r in self.collect(rhs, input, env)? {
                        out.push(Value::Bool(truthy(&r)));
                    }
                }
                Ok(())
            }
            Expr::Or(lhs, rhs) => {
                for l in self.collect(lhs, input, env)? {
                    if truthy(&l) {
                        out.push(Value::Bool(true));
                        continue;
                    }
                    for r in self.collect(rhs, input, env)? {
                        out.push(Value::Bool(truthy(&r)));
                    }
                }
                Ok(())
            }
            Expr::Binary(op, lhs, rhs) => {
                let rights = self.collect(rhs, input, env)?;
                let lefts = self.collect(lhs, input, env)?;
                for r in &rights {
                    for l in &lefts {
                        out.push(self.binary(*op, l, r)?);
                    }
                }
                Ok(())
            }
            Expr::If(branches, otherwise) => self.conditional(branches, otherwise.as_deref(), input, env, out),
            Expr::Bind(source, name, body) => {
                for value in self.collect(source, input, env)? {
                    let scope = Env::Bind {
                        name,
                        value,
                        parent: env,
                    };
                    self.eval(body, input, &scope, out)?;
                }
                Ok(())
            }
            Expr::Reduce(source, name, init, update) => {
                let items = self.collect(source, input, env)?;
                for mut acc in self.collect(init, input, env)? {
                    for item in &items {
                        let scope = Env::Bind {
                            name,
                            value: item.clone(),
                            parent: env,
                        };
                        acc = self.collect(update, &acc, &scope)?.pop().unwrap_or(Value::Null);
                    }
                    out.push(acc);
                }
                Ok(())
            }
            Expr::Call(name, args) => builtins::call(self, name, args, input, env, out),
        }
    }

    fn optional_collect(&mut self, expr: Option<&Expr>, input: &Value, env: &Env<'_>) -> Result<Vec<Value>, Fault> {
        match expr {
            Some(expr) => self.collect(expr, input, env),
            None => Ok(vec![Value::Null]),
        }
    }

    fn template(&mut self, parts: &[TemplatePart], input: &Value, env: &Env<'_>, out: &mut Vec<Value>) -> EvalResult {
        let mut partials = vec![String::new()];
        for part in parts {
            match part {
                TemplatePart::Lit(text) => {
                    for p in &mut partials {
                        p.push_str(text);
                    }
                }
                TemplatePart::Expr(expr) => {
                    let values = self.collect(expr, input, env)?;
                    let mut next = Vec::with_capacity(partials.len() * values.len());
                    for v in &values {
                        let rendered = match v {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        };
                        for p in &partials {
                            self.charge(1)?;
                            next.push(format!("{}{}", p, rendered));
                        }
                    }
                    partials = next;
                }
            }
        }
        out.extend(partials.into_iter().map(Value::String));
        Ok(())
    }

    fn object(&mut self, entries: &[(ObjKey, Expr)], input: &Value, env: &Env<'_>, out: &mut Vec<Value>) -> EvalResult {
        let mut partials = vec![Map::new()];
        for (key, value) in entries {
            let keys = match key {
                ObjKey::Name(name) => vec![Value::String(name.clone())],
                ObjKey::Computed(expr) => self.collect(expr, input, env)?,
            };
            let values = self.collect(value, input, env)?;
            let mut next = Vec::with_capacity(partials.len() * keys.len() * values.len());
            for k in &keys {
                let Value::String(k) = k else {
                    return Err(Fault::msg(format!(
                        "Object keys must be strings, not {}",
                        type_name(k)
                    )));
                };
                for v in &values {
                    for partial in &partials {
                        self.charge(1 + partial.len() as u64 / 16)?;
                        let mut obj = partial.clone();
                        obj.insert(k.clone(), v.clone());
                        next.push(obj);
                    }
                }
            }
            partials = next;
        }
        out.extend(partials.into_iter().map(Value::Object));
        Ok(())
    }

    fn conditional(
        &mut self,
        branches: &[(Expr, Expr)],
        otherwise: Option<&Expr>,
        input: &Value,
        env: &Env<'_>,
        out: &mut Vec<Value>,
    ) -> EvalResult {
        let Some(((cond, then), rest)) = branches.split_first() else {
            return match otherwise {
                Some(expr) => self.eval(expr, input, env, out),
                None => {
                    out.push(input.clone());
                    Ok(())
                }
            };
        };
        for c in self.collect(cond, input, env)? {
            if truthy(&c) {
                self.eval(then, input, env, out)?;
            } else {
                self.conditional(rest, otherwise, input, env, out)?;
            }
        }
        Ok(())
    }

    /// Apply a binary operator, charging for the size of concatenations.
    pub(crate) fn binary(&mut self, op: BinOp, l: &Value, r: &Value) -> Result<Value, Fault> {
        match op {
            BinOp::Add => {
                self.charge(concat_cost(l, r))?;
                add(l, r)
            }
            BinOp::Sub => subtract(l, r),
            BinOp::Mul => {
                let repeat = match (l, r) {
                    (Value::String(s), Value::Number(n)) | (Value::Number(n), Value::String(s)) => {
                        Some((s, n.as_f64().unwrap_or(0.0)))
                    }
                    _ => None,
                };
                let Some((s, n)) = repeat else {
                    return multiply(l, r);
                };
                if n <= 0.0 {
                    return Ok(Value::Null);
                }
                let times = n.ceil() as u64;
                self.charge(times.saturating_mul(s.len() as u64 / 64 + 1))?;
                Ok(Value::String(s.repeat(times as usize)))
            }
            BinOp::Div => divide(l, r),
            BinOp::Mod => modulo(l, r),
            BinOp::Eq => Ok(Value::Bool(compare(l, r) == Ordering::Equal)),
            BinOp::Ne => Ok(Value::Bool(compare(l, r) != Ordering::Equal)),
            BinOp::Lt => Ok(Value::Bool(compare(l, r) == Ordering::Less)),
            BinOp::Le => Ok(Value::Bool(compare(l, r) != Ordering::Greater)),
            BinOp::Gt => Ok(Value::Bool(compare(l, r) == Ordering::Greater)),
            BinOp::Ge => Ok(Value::Bool(compare(l, r) != Ordering::Less)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Value helpers
// ─────────────────────────────────────────────────────────────────────────────

/// `false` and `null` are falsy; everything else is truthy.
pub(crate) fn truthy(value: &Value) -> bool {
    !matches!(value, Value::Null | Value::Bool(false))
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// `type (value)` for error messages, with long values shortened.
pub(crate) fn describe(value: &Value) -> String {
    let mut text = value.to_string();
    if text.len() > 40 {
        let cut = (0..=37).rev().find(|i| text.is_char_boundary(*i)).unwrap_or(0);
        text.truncate(cut);
        text.push_str("...");
    }
    format!("{} ({})", type_name(value), text)
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(false) => 1,
        Value::Bool(true) => 2,
        Value::Number(_) => 3,
        Value::String(_) => 4,
        Value::Array(_) => 5,
        Value::Object(_) => 6,
    }
}

/// Total order: null < false < true < numbers < strings < arrays < objects.
///
/// Objects compare by their sorted key lists first, then value by value.
pub(crate) fn compare(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (l, r) in x.iter().zip(y) {
                let ord = compare(l, r);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => {
            let mut xk: Vec<&String> = x.keys().collect();
            let mut yk: Vec<&String> = y.keys().collect();
            xk.sort();
            yk.sort();
            let ord = xk.cmp(&yk);
            if ord != Ordering::Equal {
                return ord;
            }
            for key in xk {
                let ord = compare(&x[key], &y[key]);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        }
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn concat_cost(l: &Value, r: &Value) -> u64 {
    match (l, r) {
        (Value::Array(a), Value::Array(b)) => (a.len() + b.len()) as u64 / 16 + 1,
        (Value::String(a), Value::String(b)) => (a.len() + b.len()) as u64 / 256 + 1,
        (Value::Object(a), Value::Object(b)) => (a.len() + b.len()) as u64 / 16 + 1,
        _ => 1,
    }
}

pub(crate) fn add(l: &Value, r: &Value) -> Result<Value, Fault> {
    match (l, r) {
        (Value::Null, other) | (other, Value::Null) => Ok(other.clone()),
        (Value::Number(a), Value::Number(b)) => Ok(builtins::number(
            a.as_f64().unwrap_or(0.0) + b.as_f64().unwrap_or(0.0),
        )),
        (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{}{}", a, b))),
        (Value::Array(a), Value::Array(b)) => {
            let mut joined = a.clone();
            joined.extend(b.iter().cloned());
            Ok(Value::Array(joined))
        }
        (Value::Object(a), Value::Object(b)) => {
            let mut merged = a.clone();
            for (k, v) in b {
                merged.insert(k.clone(), v.clone());
            }
            Ok(Value::Object(merged))
        }
        _ => Err(Fault::msg(format!(
            "{} and {} cannot be added",
            describe(l),
            describe(r)
        ))),
    }
}

fn subtract(l: &Value, r: &Value) -> Result<Value, Fault> {
    match (l, r) {
        (Value::Number(a), Value::Number(b)) => Ok(builtins::number(
            a.as_f64().unwrap_or(0.0) - b.as_f64().unwrap_or(0.0),
        )),
        (Value::Array(a), Value::Array(b)) => Ok(Value::Array(
            a.iter()
                .filter(|x| !b.iter().any(|y| compare(x, y) == Ordering::Equal))
                .cloned()
                .collect(),
        )),
        _ => Err(Fault::msg(format!(
            "{} and {} cannot be subtracted",
            describe(l),
            describe(r)
        ))),
    }
}

fn multiply(l: &Value, r: &Value) -> Result<Value, Fault> {
    match (l, r) {
        (Value::Number(a), Value::Number(b)) => Ok(builtins::number(
            a.as_f64().unwrap_or(0.0) * b.as_f64().unwrap_or(0.0),
        )),
        (Value::Object(a), Value::Object(b)) => Ok(Value::Object(deep_merge(a, b))),
        _ => Err(Fault::msg(format!(
            "{} and {} cannot be multiplied",
            describe(l),
            describe(r)
        ))),
    }
}

fn deep_merge(a: &Map<String, Value>, b: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = a.clone();
    for (k, v) in b {
        let value = match (merged.get(k), v) {
            (Some(Value::Object(x)), Value::Object(y)) => Value::Object(deep_merge(x, y)),
            _ => v.clone(),
        };
        merged.insert(k.clone(), value);
    }
    merged
}

fn divide(l: &Value, r: &Value) -> Result<Value, Fault> {
    match (l, r) {
        (Value::Number(a), Value::Number(b)) => {
            let divisor = b.as_f64().unwrap_or(0.0);
            if divisor == 0.0 {
                return Err(Fault::msg(format!(
                    "{} and {} cannot be divided because the divisor is zero",
                    describe(l),
                    describe(r)
                )));
            }
            Ok(builtins::number(a.as_f64().unwrap_or(0.0) / divisor))
        }
        (Value::String(a), Value::String(b)) => Ok(builtins::split_string(a, b)),
        _ => Err(Fault::msg(format!(
            "{} and {} cannot be divided",
            describe(l),
            describe(r)
        ))),
    }
}

fn modulo(l: &Value, r: &Value) -> Result<Value, Fault> {
    match (l.as_f64(), r.as_f64()) {
        (Some(a), Some(b)) => {
            let a = a as i64;
            let b = b as i64;
            match a.checked_rem(b) {
                Some(rem) => Ok(Value::from(rem)),
                None => Err(Fault::msg(format!(
                    "{} and {} cannot be divided because the divisor is zero",
                    describe(l),
                    describe(r)
                ))),
            }
        }
        _ => Err(Fault::msg(format!(
            "{} and {} cannot be divided",
            describe(l),
            describe(r)
        ))),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Paths
// ─────────────────────────────────────────────────────────────────────────────

/// `target[key]` with null propagation.
pub(crate) fn index(target: &Value, key: &Value) -> Result<Value, Fault> {
    match (target, key) {
        (Value::Null, Value::String(_) | Value::Number(_) | Value::Null) => Ok(Value::Null),
        (Value::Object(map), Value::String(k)) => Ok(map.get(k).cloned().unwrap_or(Value::Null)),
        (Value::Array(items), Value::Number(n)) => {
            let n = n.as_f64().unwrap_or(0.0).floor();
            let len = items.len() as f64;
            let i = if n < 0.0 { len + n } else { n };
            if i < 0.0 || i >= len {
                Ok(Value::Null)
            } else {
                Ok(items[i as usize].clone())
            }
        }
        (Value::Object(_), _) => Err(Fault::msg(format!(
            "Cannot index object with {}",
            type_name(key)
        ))),
        (Value::Array(_), Value::String(k)) => {
            Err(Fault::msg(format!("Cannot index array with \"{}\"", k)))
        }
        (_, Value::String(k)) => Err(Fault::msg(format!(
            "Cannot index {} with \"{}\"",
            type_name(target),
            k
        ))),
        _ => Err(Fault::msg(format!(
            "Cannot index {} with {}",
            type_name(target),
            type_name(key)
        ))),
    }
}

fn slice_bounds(len: usize, from: &Value, to: &Value) -> Result<(usize, usize), Fault> {
    let len_f = len as f64;
    let resolve = |v: &Value, default: f64, round: fn(f64) -> f64| -> Result<f64, Fault> {
        match v {
            Value::Null => Ok(default),
            Value::Number(n) => {
                let n = round(n.as_f64().unwrap_or(0.0));
                let n = if n < 0.0 { len_f + n } else { n };
                Ok(n.clamp(0.0, len_f))
            }
            other => Err(Fault::msg(format!(
                "Start and end indices of an array slice must be numbers, not {}",
                type_name(other)
            ))),
        }
    };
    let start = resolve(from, 0.0, f64::floor)? as usize;
    let end = resolve(to, len_f, f64::ceil)? as usize;
    Ok((start, end.max(start)))
}

fn slice(target: &Value, from: &Value, to: &Value) -> Result<Value, Fault> {
    match target {
        Value::Null => Ok(Value::Null),
        Value::Array(items) => {
            let (start, end) = slice_bounds(items.len(), from, to)?;
            Ok(Value::Array(items[start..end].to_vec()))
        }
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            let (start, end) = slice_bounds(chars.len(), from, to)?;
            Ok(Value::String(chars[start..end].iter().collect()))
        }
        other => Err(Fault::msg(format!("Cannot index {} with object", type_name(other)))),
    }
}

/// Push the elements of an array or the values of an object.
pub(crate) fn iterate(target: Value, out: &mut Vec<Value>) -> EvalResult {
    match target {
        Value::Array(items) => {
            out.extend(items);
            Ok(())
        }
        Value::Object(map) => {
            out.extend(map.into_iter().map(|(_, v)| v));
            Ok(())
        }
        other => Err(Fault::msg(format!("Cannot iterate over {}", describe_iter(&other)))),
    }
}

fn describe_iter(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        other => describe(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ordering_across_types() {
        let mut values = vec![
            json!({"a": 1}),
            json!([1]),
            json!("b"),
            json!(3),
            json!(true),
            json!(false),
            json!(null),
        ];
        values.sort_by(compare);
        assert_eq!(
            values,
            vec![
                json!(null),
                json!(false),
                json!(true),
                json!(3),
                json!("b"),
                json!([1]),
                json!({"a": 1})
            ]
        );
        assert_eq!(compare(&json!(1), &json!(1.0)), Ordering::Equal);
        assert_eq!(compare(&json!({"a": 2}), &json!({"b": 1})), Ordering::Less);
    }

    #[test]
    fn test_add_rules() {
        assert_eq!(add(&json!(null), &json!(2)).unwrap(), json!(2));
        assert_eq!(add(&json!([1]), &json!([2])).unwrap(), json!([1, 2]));
        assert_eq!(add(&json!({"a": 1}), &json!({"a": 2, "b": 3})).unwrap(), json!({"a": 2, "b": 3}));
        assert!(add(&json!(1), &json!("a")).is_err());
    }

    #[test]
    fn test_index_rules() {
        assert_eq!(index(&json!(null), &json!("a")).unwrap(), json!(null));
        assert_eq!(index(&json!([1, 2, 3]), &json!(-1)).unwrap(), json!(3));
        assert_eq!(index(&json!([1, 2, 3]), &json!(7)).unwrap(), json!(null));
        let err = index(&json!([1]), &json!("Width")).unwrap_err();
        assert_eq!(err.message(), "Cannot index array with \"Width\"");
    }

    #[test]
    fn test_slices() {
        assert_eq!(slice(&json!([0, 1, 2, 3]), &json!(1), &json!(3)).unwrap(), json!([1, 2]));
        assert_eq!(slice(&json!([0, 1, 2, 3]), &json!(-2), &json!(null)).unwrap(), json!([2, 3]));
        assert_eq!(slice(&json!("abcdef"), &json!(null), &json!(2)).unwrap(), json!("ab"));
        assert_eq!(slice(&json!([0, 1]), &json!(5), &json!(1)).unwrap(), json!([]));
    }

    #[test]
    fn test_budget_is_enforced() {
        let mut ev = Evaluator::new(3);
        assert!(ev.charge(3).is_ok());
        assert_eq!(ev.charge(1), Err(Fault::Budget));
    }

    #[test]
    fn test_fault_messages() {
        assert_eq!(Fault::msg("boom").message(), "boom");
        assert_eq!(Fault::Raise(json!({"a": 1})).message(), r#"{"a":1} (not a string)"#);
    }
}
