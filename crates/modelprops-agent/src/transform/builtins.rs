//! Builtin functions.
//!
//! Functions taking filter arguments (`map`, `select`, `sort_by`, ...) receive
//! the unevaluated expressions; the rest evaluate their arguments up front and
//! run once per combination of argument values.

use std::cmp::Ordering;

use regex::RegexBuilder;
use serde_json::{Map, Value};

use super::eval::{EvalResult, Evaluator, Env, Fault, compare, describe, index, truthy, type_name};
use super::parser::{BinOp, Expr};

/// Largest integer a JSON number keeps exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

const REGEX_SIZE_LIMIT: usize = 1 << 20;

/// Every builtin as `(name, arity)`.
const FUNCTIONS: &[(&str, usize)] = &[
    ("empty", 0),
    ("not", 0),
    ("length", 0),
    ("keys", 0),
    ("keys_unsorted", 0),
    ("values", 0),
    ("add", 0),
    ("any", 0),
    ("all", 0),
    ("unique", 0),
    ("sort", 0),
    ("min", 0),
    ("max", 0),
    ("first", 0),
    ("last", 0),
    ("reverse", 0),
    ("flatten", 0),
    ("to_entries", 0),
    ("from_entries", 0),
    ("type", 0),
    ("tostring", 0),
    ("tonumber", 0),
    ("ascii_downcase", 0),
    ("ascii_upcase", 0),
    ("floor", 0),
    ("ceil", 0),
    ("round", 0),
    ("abs", 0),
    ("sqrt", 0),
    ("error", 0),
    ("paths", 0),
    ("leaf_paths", 0),
    ("recurse", 0),
    ("tojson", 0),
    ("fromjson", 0),
    ("arrays", 0),
    ("objects", 0),
    ("iterables", 0),
    ("booleans", 0),
    ("numbers", 0),
    ("strings", 0),
    ("nulls", 0),
    ("scalars", 0),
    ("map", 1),
    ("select", 1),
    ("unique_by", 1),
    ("sort_by", 1),
    ("group_by", 1),
    ("min_by", 1),
    ("max_by", 1),
    ("flatten", 1),
    ("has", 1),
    ("contains", 1),
    ("split", 1),
    ("join", 1),
    ("test", 1),
    ("startswith", 1),
    ("endswith", 1),
    ("ltrimstr", 1),
    ("rtrimstr", 1),
    ("range", 1),
    ("error", 1),
    ("paths", 1),
    ("recurse", 1),
    ("map_values", 1),
    ("with_entries", 1),
    ("any", 1),
    ("all", 1),
    ("first", 1),
    ("last", 1),
    ("nth", 1),
    ("getpath", 1),
    ("range", 2),
    ("limit", 2),
    ("test", 2),
    ("range", 3),
];

/// Whether `name/arity` is a builtin.
pub(crate) fn exists(name: &str, arity: usize) -> bool {
    FUNCTIONS.iter().any(|(n, a)| *n == name && *a == arity)
}

/// A JSON number from `n`; integral values become integers, non-finite values null.
pub(crate) fn number(n: f64) -> Value {
    if !n.is_finite() {
        return Value::Null;
    }
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        return Value::from(n as i64);
    }
    serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number)
}

/// `a / b` on strings.
pub(crate) fn split_string(a: &str, sep: &str) -> Value {
    if a.is_empty() {
        return Value::Array(Vec::new());
    }
    let parts: Vec<Value> = if sep.is_empty() {
        a.chars().map(|c| Value::String(c.to_string())).collect()
    } else {
        a.split(sep).map(|s| Value::String(s.to_string())).collect()
    };
    Value::Array(parts)
}

/// Steps charged for touching a value once.
fn weight(value: &Value) -> u64 {
    match value {
        Value::Array(items) => items.len() as u64 / 16 + 1,
        Value::Object(map) => map.len() as u64 / 16 + 1,
        Value::String(s) => s.len() as u64 / 256 + 1,
        _ => 1,
    }
}

fn emit(out: &mut Vec<Value>, value: Value) -> EvalResult {
    out.push(value);
    Ok(())
}

/// Every value reachable from `input`, in pre-order.
pub(crate) fn recurse_values(ev: &mut Evaluator, input: &Value, out: &mut Vec<Value>) -> EvalResult {
    let mut stack = vec![input.clone()];
    while let Some(value) = stack.pop() {
        ev.charge(1)?;
        match &value {
            Value::Array(items) => stack.extend(items.iter().rev().cloned()),
            Value::Object(map) => stack.extend(map.values().rev().cloned()),
            _ => {}
        }
        out.push(value);
    }
    Ok(())
}

/// Dispatch a builtin call.
pub(crate) fn call(
    ev: &mut Evaluator,
    name: &str,
    args: &[Expr],
    input: &Value,
    env: &Env<'_>,
    out: &mut Vec<Value>,
) -> EvalResult {
    match (name, args) {
        (_, []) => call0(ev, name, input, out),
        ("map", [f]) => {
            let items = elements(input, "map")?;
            let mut mapped = Vec::new();
            for item in &items {
                ev.eval(f, item, env, &mut mapped)?;
            }
            emit(out, Value::Array(mapped))
        }
        ("select", [f]) => {
            for c in ev.collect(f, input, env)? {
                if truthy(&c) {
                    out.push(input.clone());
                }
            }
            Ok(())
        }
        ("sort_by", [f]) => {
            let keyed = keyed(ev, f, input, env, "sorted")?;
            emit(out, Value::Array(keyed.into_iter().map(|(_, v)| v).collect()))
        }
        ("group_by", [f]) => {
            let keyed = keyed(ev, f, input, env, "grouped")?;
            let mut groups: Vec<Value> = Vec::new();
            let mut current: Option<(Value, Vec<Value>)> = None;
            for (key, value) in keyed {
                match &mut current {
                    Some((k, members)) if compare(k, &key) == Ordering::Equal => members.push(value),
                    _ => {
                        if let Some((_, members)) = current.take() {
                            groups.push(Value::Array(members));
                        }
                        current = Some((key, vec![value]));
                    }
                }
            }
            if let Some((_, members)) = current {
                groups.push(Value::Array(members));
            }
            emit(out, Value::Array(groups))
        }
        ("unique_by", [f]) => {
            let mut keyed = keyed(ev, f, input, env, "sorted")?;
            keyed.dedup_by(|b, a| compare(&a.0, &b.0) == Ordering::Equal);
            emit(out, Value::Array(keyed.into_iter().map(|(_, v)| v).collect()))
        }
        ("min_by", [f]) => {
            let keyed = keyed(ev, f, input, env, "sorted")?;
            emit(out, keyed.into_iter().next().map_or(Value::Null, |(_, v)| v))
        }
        ("max_by", [f]) => {
            let keyed = keyed(ev, f, input, env, "sorted")?;
            emit(out, keyed.into_iter().next_back().map_or(Value::Null, |(_, v)| v))
        }
        ("recurse", [f]) => {
            let mut stack = vec![input.clone()];
            while let Some(value) = stack.pop() {
                ev.charge(1)?;
                let children = ev.collect(f, &value, env)?;
                stack.extend(children.into_iter().rev());
                out.push(value);
            }
            Ok(())
        }
        ("paths", [f]) => {
            for (path, value) in all_paths(ev, input)? {
                for c in ev.collect(f, &value, env)? {
                    if truthy(&c) {
                        out.push(path.clone());
                    }
                }
            }
            Ok(())
        }
        ("map_values", [f]) => match input {
            Value::Object(map) => {
                let mut mapped = Map::new();
                for (k, v) in map {
                    if let Some(first) = ev.collect(f, v, env)?.into_iter().next() {
                        mapped.insert(k.clone(), first);
                    }
                }
                emit(out, Value::Object(mapped))
            }
            Value::Array(items) => {
                let mut mapped = Vec::with_capacity(items.len());
                for v in items {
                    if let Some(first) = ev.collect(f, v, env)?.into_iter().next() {
                        mapped.push(first);
                    }
                }
                emit(out, Value::Array(mapped))
            }
            other => Err(Fault::msg(format!("Cannot iterate over {}", describe(other)))),
        },
        ("with_entries", [f]) => {
            let entries = to_entries(input)?;
            let mut mapped = Vec::new();
            for entry in &entries {
                ev.eval(f, entry, env, &mut mapped)?;
            }
            emit(out, from_entries(&Value::Array(mapped))?)
        }
        ("any", [f]) => {
            let mut found = false;
            for item in elements(input, "any")? {
                if ev.collect(f, &item, env)?.iter().any(truthy) {
                    found = true;
                    break;
                }
            }
            emit(out, Value::Bool(found))
        }
        ("all", [f]) => {
            let mut every = true;
            for item in elements(input, "all")? {
                if !ev.collect(f, &item, env)?.iter().all(truthy) {
                    every = false;
                    break;
                }
            }
            emit(out, Value::Bool(every))
        }
        ("first", [f]) => {
            if let Some(v) = ev.collect(f, input, env)?.into_iter().next() {
                out.push(v);
            }
            Ok(())
        }
        ("last", [f]) => {
            if let Some(v) = ev.collect(f, input, env)?.pop() {
                out.push(v);
            }
            Ok(())
        }
        ("limit", [n, f]) => {
            for n in ev.collect(n, input, env)? {
                let n = as_number(&n, "limit")?;
                let produced = ev.collect(f, input, env)?;
                if n > 0.0 {
                    out.extend(produced.into_iter().take(n as usize));
                }
            }
            Ok(())
        }
        _ => {
            let combos = argument_values(ev, args, input, env)?;
            for values in combos {
                call_values(ev, name, &values, input, out)?;
            }
            Ok(())
        }
    }
}

/// Every combination of argument outputs, first argument varying slowest.
fn argument_values(ev: &mut Evaluator, args: &[Expr], input: &Value, env: &Env<'_>) -> Result<Vec<Vec<Value>>, Fault> {
    let mut combos: Vec<Vec<Value>> = vec![Vec::new()];
    for arg in args {
        let values = ev.collect(arg, input, env)?;
        let mut next = Vec::with_capacity(combos.len() * values.len());
        for combo in &combos {
            for v in &values {
                ev.charge(1)?;
                let mut extended = combo.clone();
                extended.push(v.clone());
                next.push(extended);
            }
        }
        combos = next;
    }
    Ok(combos)
}

fn call0(ev: &mut Evaluator, name: &str, input: &Value, out: &mut Vec<Value>) -> EvalResult {
    match name {
        "empty" => Ok(()),
        "not" => emit(out, Value::Bool(!truthy(input))),
        "length" => emit(out, length(input)?),
        "keys" | "keys_unsorted" => emit(out, keys(input)?),
        "values" => {
            if !input.is_null() {
                out.push(input.clone());
            }
            Ok(())
        }
        "add" => {
            let items = elements(input, "added")?;
            let mut acc = Value::Null;
            for item in &items {
                acc = ev.binary(BinOp::Add, &acc, item)?;
            }
            emit(out, acc)
        }
        "any" => emit(out, Value::Bool(elements(input, "any")?.iter().any(truthy))),
        "all" => emit(out, Value::Bool(elements(input, "all")?.iter().all(truthy))),
        "sort" => emit(out, Value::Array(sorted(ev, input)?)),
        "unique" => {
            let mut items = sorted(ev, input)?;
            items.dedup_by(|b, a| compare(a, b) == Ordering::Equal);
            emit(out, Value::Array(items))
        }
        "min" => emit(out, sorted(ev, input)?.into_iter().next().unwrap_or(Value::Null)),
        "max" => emit(out, sorted(ev, input)?.pop().unwrap_or(Value::Null)),
        "first" => emit(out, index(input, &Value::from(0))?),
        "last" => emit(out, index(input, &Value::from(-1))?),
        "reverse" => match input {
            Value::Array(items) => {
                ev.charge(weight(input))?;
                emit(out, Value::Array(items.iter().rev().cloned().collect()))
            }
            Value::String(s) => emit(out, Value::String(s.chars().rev().collect())),
            Value::Null => emit(out, Value::Array(Vec::new())),
            other => Err(Fault::msg(format!("Cannot reverse {}", describe(other)))),
        },
        "flatten" => flatten_value(ev, input, f64::INFINITY, out),
        "to_entries" => emit(out, Value::Array(to_entries(input)?)),
        "from_entries" => emit(out, from_entries(input)?),
        "type" => emit(out, Value::String(type_name(input).to_string())),
        "tostring" => emit(out, Value::String(to_text(input))),
        "tonumber" => match input {
            Value::Number(_) => emit(out, input.clone()),
            Value::String(s) => match s.trim().parse::<f64>() {
                Ok(n) if n.is_finite() => emit(out, number(n)),
                _ => Err(Fault::msg(format!("Cannot parse '{}' as a number", s))),
            },
            other => Err(Fault::msg(format!("{} cannot be parsed as a number", describe(other)))),
        },
        "ascii_downcase" => emit(out, Value::String(as_str(input, "ascii_downcase")?.to_ascii_lowercase())),
        "ascii_upcase" => emit(out, Value::String(as_str(input, "ascii_upcase")?.to_ascii_uppercase())),
        "floor" => emit(out, number(as_number(input, "floor")?.floor())),
        "ceil" => emit(out, number(as_number(input, "ceil")?.ceil())),
        "round" => emit(out, number(as_number(input, "round")?.round())),
        "abs" => emit(out, number(as_number(input, "abs")?.abs())),
        "sqrt" => emit(out, number(as_number(input, "sqrt")?.sqrt())),
        "error" => Err(Fault::Raise(input.clone())),
        "paths" => {
            out.extend(all_paths(ev, input)?.into_iter().map(|(path, _)| path));
            Ok(())
        }
        "leaf_paths" => {
            out.extend(
                all_paths(ev, input)?
                    .into_iter()
                    .filter(|(_, v)| !v.is_array() && !v.is_object())
                    .map(|(path, _)| path),
            );
            Ok(())
        }
        "recurse" => recurse_values(ev, input, out),
        "tojson" => emit(out, Value::String(input.to_string())),
        "fromjson" => {
            let text = as_str(input, "fromjson")?;
            serde_json::from_str::<Value>(text)
                .map_err(|e| Fault::msg(format!("{} (while parsing '{}')", e, text)))
                .and_then(|v| emit(out, v))
        }
        "arrays" | "objects" | "iterables" | "booleans" | "numbers" | "strings" | "nulls" | "scalars" => {
            let keep = match name {
                "arrays" => input.is_array(),
                "objects" => input.is_object(),
                "iterables" => input.is_array() || input.is_object(),
                "booleans" => input.is_boolean(),
                "numbers" => input.is_number(),
                "strings" => input.is_string(),
                "nulls" => input.is_null(),
                _ => !input.is_array() && !input.is_object(),
            };
            if keep {
                out.push(input.clone());
            }
            Ok(())
        }
        other => Err(Fault::msg(format!("{}/0 is not defined", other))),
    }
}

fn call_values(ev: &mut Evaluator, name: &str, args: &[Value], input: &Value, out: &mut Vec<Value>) -> EvalResult {
    match (name, args) {
        ("flatten", [depth]) => {
            let depth = as_number(depth, "flatten")?;
            if depth < 0.0 {
                return Err(Fault::msg("flatten depth must not be negative"));
            }
            flatten_value(ev, input, depth, out)
        }
        ("has", [key]) => match (input, key) {
            (Value::Object(map), Value::String(k)) => emit(out, Value::Bool(map.contains_key(k))),
            (Value::Array(items), Value::Number(n)) => {
                let i = n.as_f64().unwrap_or(-1.0);
                emit(out, Value::Bool(i >= 0.0 && i < items.len() as f64))
            }
            _ => Err(Fault::msg(format!(
                "Cannot check whether {} has a {} key",
                type_name(input),
                type_name(key)
            ))),
        },
        ("contains", [needle]) => {
            ev.charge(weight(input))?;
            emit(out, Value::Bool(contains(input, needle)?))
        }
        ("split", [sep]) => {
            let text = as_str(input, "split")?;
            let sep = as_str(sep, "split")?;
            ev.charge(weight(input))?;
            emit(out, split_string(text, sep))
        }
        ("join", [sep]) => {
            let sep = as_str(sep, "join")?;
            let items = elements(input, "joined")?;
            let mut joined = String::new();
            for (i, item) in items.iter().enumerate() {
                ev.charge(1)?;
                if i > 0 {
                    joined.push_str(sep);
                }
                match item {
                    Value::Null => {}
                    Value::String(s) => joined.push_str(s),
                    Value::Number(_) | Value::Bool(_) => joined.push_str(&item.to_string()),
                    other => return Err(Fault::msg(format!("Cannot join with {}", type_name(other)))),
                }
            }
            emit(out, Value::String(joined))
        }
        ("test", [pattern]) => emit(out, Value::Bool(regex_test(input, pattern, &Value::Null)?)),
        ("test", [pattern, flags]) => emit(out, Value::Bool(regex_test(input, pattern, flags)?)),
        ("startswith", [prefix]) => match (input, prefix) {
            (Value::String(s), Value::String(p)) => emit(out, Value::Bool(s.starts_with(p.as_str()))),
            _ => Err(Fault::msg("startswith() requires string inputs")),
        },
        ("endswith", [suffix]) => match (input, suffix) {
            (Value::String(s), Value::String(p)) => emit(out, Value::Bool(s.ends_with(p.as_str()))),
            _ => Err(Fault::msg("endswith() requires string inputs")),
        },
        ("ltrimstr", [prefix]) => {
            let trimmed = match (input, prefix) {
                (Value::String(s), Value::String(p)) => s.strip_prefix(p.as_str()).map(str::to_string),
                _ => None,
            };
            emit(out, trimmed.map_or_else(|| input.clone(), Value::String))
        }
        ("rtrimstr", [suffix]) => {
            let trimmed = match (input, suffix) {
                (Value::String(s), Value::String(p)) => s.strip_suffix(p.as_str()).map(str::to_string),
                _ => None,
            };
            emit(out, trimmed.map_or_else(|| input.clone(), Value::String))
        }
        ("range", [upto]) => range(ev, 0.0, as_number(upto, "range")?, 1.0, out),
        ("range", [from, upto]) => range(ev, as_number(from, "range")?, as_number(upto, "range")?, 1.0, out),
        ("range", [from, upto, step]) => range(
            ev,
            as_number(from, "range")?,
            as_number(upto, "range")?,
            as_number(step, "range")?,
            out,
        ),
        ("error", [message]) => Err(Fault::Raise(message.clone())),
        ("nth", [n]) => emit(out, index(input, n)?),
        ("getpath", [path]) => {
            let Value::Array(keys) = path else {
                return Err(Fault::msg("Path must be specified as an array"));
            };
            let mut current = input.clone();
            for key in keys {
                ev.charge(1)?;
                current = index(&current, key)?;
            }
            emit(out, current)
        }
        _ => Err(Fault::msg(format!("{}/{} is not defined", name, args.len()))),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn as_number(value: &Value, context: &str) -> Result<f64, Fault> {
    value
        .as_f64()
        .ok_or_else(|| Fault::msg(format!("{} number required, got {}", context, describe(value))))
}

fn as_str<'a>(value: &'a Value, context: &str) -> Result<&'a str, Fault> {
    value
        .as_str()
        .ok_or_else(|| Fault::msg(format!("{} cannot be used with {}, as it is not a string", describe(value), context)))
}

fn to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Array elements, or object values; `verb` names the failing operation.
fn elements(input: &Value, verb: &str) -> Result<Vec<Value>, Fault> {
    match input {
        Value::Array(items) => Ok(items.clone()),
        Value::Object(map) => Ok(map.values().cloned().collect()),
        other => Err(Fault::msg(format!("{} cannot be {}", describe(other), verb_phrase(verb)))),
    }
}

fn verb_phrase(verb: &str) -> String {
    match verb {
        "map" | "any" | "all" => "iterated over".to_string(),
        other => other.to_string(),
    }
}

fn length(input: &Value) -> Result<Value, Fault> {
    match input {
        Value::Null => Ok(Value::from(0)),
        Value::Bool(_) => Err(Fault::msg(format!("{} has no length", describe(input)))),
        Value::Number(n) => Ok(number(n.as_f64().unwrap_or(0.0).abs())),
        Value::String(s) => Ok(Value::from(s.chars().count())),
        Value::Array(items) => Ok(Value::from(items.len())),
        Value::Object(map) => Ok(Value::from(map.len())),
    }
}

fn keys(input: &Value) -> Result<Value, Fault> {
    match input {
        Value::Object(map) => {
            let mut names: Vec<&String> = map.keys().collect();
            names.sort();
            Ok(Value::Array(names.into_iter().map(|k| Value::String(k.clone())).collect()))
        }
        Value::Array(items) => Ok(Value::Array((0..items.len()).map(Value::from).collect())),
        other => Err(Fault::msg(format!("{} has no keys", describe(other)))),
    }
}

fn sorted(ev: &mut Evaluator, input: &Value) -> Result<Vec<Value>, Fault> {
    let Value::Array(items) = input else {
        return Err(Fault::msg(format!("{} cannot be sorted, as it is not an array", describe(input))));
    };
    ev.charge(sort_cost(items.len()))?;
    let mut items = items.clone();
    items.sort_by(compare);
    Ok(items)
}

fn sort_cost(len: usize) -> u64 {
    let len = len as u64;
    let log = 64 - len.leading_zeros() as u64;
    len.saturating_mul(log) / 16 + 1
}

/// Elements paired with `[f]` and stably sorted by that key.
fn keyed(
    ev: &mut Evaluator,
    f: &Expr,
    input: &Value,
    env: &Env<'_>,
    verb: &str,
) -> Result<Vec<(Value, Value)>, Fault> {
    let Value::Array(items) = input else {
        return Err(Fault::msg(format!("{} cannot be {}, as it is not an array", describe(input), verb)));
    };
    let mut keyed = Vec::with_capacity(items.len());
    for item in items {
        let key = Value::Array(ev.collect(f, item, env)?);
        keyed.push((key, item.clone()));
    }
    ev.charge(sort_cost(keyed.len()))?;
    keyed.sort_by(|a, b| compare(&a.0, &b.0));
    Ok(keyed)
}

fn flatten_value(ev: &mut Evaluator, input: &Value, depth: f64, out: &mut Vec<Value>) -> EvalResult {
    let Value::Array(items) = input else {
        return Err(Fault::msg(format!("Cannot flatten {}", describe(input))));
    };
    let mut flat = Vec::new();
    let mut stack: Vec<(&Value, f64)> = items.iter().rev().map(|v| (v, depth)).collect();
    while let Some((value, remaining)) = stack.pop() {
        ev.charge(1)?;
        match value {
            Value::Array(inner) if remaining > 0.0 => {
                stack.extend(inner.iter().rev().map(|v| (v, remaining - 1.0)));
            }
            other => flat.push(other.clone()),
        }
    }
    emit(out, Value::Array(flat))
}

fn to_entries(input: &Value) -> Result<Vec<Value>, Fault> {
    match input {
        Value::Object(map) => Ok(map
            .iter()
            .map(|(k, v)| {
                let mut entry = Map::new();
                entry.insert("key".to_string(), Value::String(k.clone()));
                entry.insert("value".to_string(), v.clone());
                Value::Object(entry)
            })
            .collect()),
        other => Err(Fault::msg(format!("{} has no keys", describe(other)))),
    }
}

fn from_entries(input: &Value) -> Result<Value, Fault> {
    let Value::Array(entries) = input else {
        return Err(Fault::msg(format!("Cannot iterate over {}", describe(input))));
    };
    let mut map = Map::new();
    for entry in entries {
        let Value::Object(fields) = entry else {
            return Err(Fault::msg(format!("Cannot index {} with \"key\"", type_name(entry))));
        };
        let key = ["key", "k", "name", "Name", "K", "Key"]
            .iter()
            .find_map(|k| fields.get(*k).filter(|v| truthy(v)))
            .cloned()
            .unwrap_or(Value::Null);
        let key = match key {
            Value::String(s) => s,
            Value::Null => return Err(Fault::msg("Cannot use null (null) as object key")),
            other => to_text(&other),
        };
        let value = ["value", "v", "Value"]
            .iter()
            .find_map(|k| fields.get(*k))
            .cloned()
            .unwrap_or(Value::Null);
        map.insert(key, value);
    }
    Ok(Value::Object(map))
}

fn contains(a: &Value, b: &Value) -> Result<bool, Fault> {
    match (a, b) {
        (Value::Object(x), Value::Object(y)) => {
            for (k, bv) in y {
                match x.get(k) {
                    Some(av) => {
                        if !contains(av, bv)? {
                            return Ok(false);
                        }
                    }
                    None => return Ok(false),
                }
            }
            Ok(true)
        }
        (Value::Array(x), Value::Array(y)) => {
            for bv in y {
                let mut found = false;
                for av in x {
                    if contains(av, bv)? {
                        found = true;
                        break;
                    }
                }
                if !found {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        (Value::String(x), Value::String(y)) => Ok(x.contains(y.as_str())),
        _ if type_name(a) == type_name(b) => Ok(compare(a, b) == Ordering::Equal),
        _ => Err(Fault::msg(format!(
            "{} and {} cannot have their containment checked",
            describe(a),
            describe(b)
        ))),
    }
}

fn regex_test(input: &Value, pattern: &Value, flags: &Value) -> Result<bool, Fault> {
    let text = as_str(input, "test")?;
    let pattern = as_str(pattern, "test")?;
    let mut builder = RegexBuilder::new(pattern);
    builder.size_limit(REGEX_SIZE_LIMIT);
    match flags {
        Value::Null => {}
        Value::String(flags) => {
            for flag in flags.chars() {
                match flag {
                    'i' => builder.case_insensitive(true),
                    'x' => builder.ignore_whitespace(true),
                    's' => builder.dot_matches_new_line(true),
                    other => return Err(Fault::msg(format!("{} is not a valid modifier string", other))),
                };
            }
        }
        other => return Err(Fault::msg(format!("{} is not a string", describe(other)))),
    }
    let regex = builder
        .build()
        .map_err(|e| Fault::msg(format!("{} (at offset 0) is not a valid regex: {}", pattern, e)))?;
    Ok(regex.is_match(text))
}

fn range(ev: &mut Evaluator, from: f64, upto: f64, step: f64, out: &mut Vec<Value>) -> EvalResult {
    let mut current = from;
    if step > 0.0 {
        while current < upto {
            ev.charge(1)?;
            out.push(number(current));
            current += step;
        }
    } else if step < 0.0 {
        while current > upto {
            ev.charge(1)?;
            out.push(number(current));
            current += step;
        }
    } else if from < upto {
        loop {
            ev.charge(1)?;
            out.push(number(current));
        }
    }
    Ok(())
}

/// Every `(path, value)` below `input`, excluding the empty path, in pre-order.
fn all_paths(ev: &mut Evaluator, input: &Value) -> Result<Vec<(Value, Value)>, Fault> {
    let mut found = Vec::new();
    let mut stack: Vec<(Vec<Value>, &Value)> = Vec::new();
    push_children(&mut stack, &[], input);
    while let Some((path, value)) = stack.pop() {
        ev.charge(1)?;
        push_children(&mut stack, &path, value);
        found.push((Value::Array(path), value.clone()));
    }
    Ok(found)
}

fn push_children<'a>(stack: &mut Vec<(Vec<Value>, &'a Value)>, prefix: &[Value], value: &'a Value) {
    let child = |key: Value| {
        let mut path = prefix.to_vec();
        path.push(key);
        path
    };
    match value {
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate().rev() {
                stack.push((child(Value::from(i)), item));
            }
        }
        Value::Object(map) => {
            for (k, item) in map.iter().rev() {
                stack.push((child(Value::String(k.clone())), item));
            }
        }
        _ => {}
    }
}
