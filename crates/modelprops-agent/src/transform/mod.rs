//! Sandboxed JSON transformation.
//!
//! A small jq dialect for reshaping query results: paths, iteration, pipes,
//! comparison and arithmetic, `select`/`map` and friends, `reduce`, `if`,
//! `try`, string interpolation and variable binding. Filters cannot read
//! files, the environment or further input, and every evaluation runs under
//! a step budget so a hostile filter fails instead of spinning.

mod builtins;
mod eval;
mod lexer;
mod parser;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::props::PropsError;

use eval::{Env, Evaluator, Fault};
use parser::Expr;

/// Errors from compiling or running a filter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    /// The filter text is not a valid program.
    #[error("{0}")]
    Syntax(String),

    /// The filter failed while running, or ran out of budget.
    #[error("{0}")]
    Evaluation(String),

    /// The input is not a sequence of JSON values.
    #[error("invalid JSON input: {0}")]
    Input(String),
}

impl From<TransformError> for PropsError {
    fn from(err: TransformError) -> Self {
        match err {
            TransformError::Syntax(msg) => PropsError::FilterSyntax(msg),
            other => PropsError::FilterEvaluation(other.to_string()),
        }
    }
}

/// Resource limits for one transformation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformLimits {
    /// Evaluation steps allowed across all inputs.
    pub max_steps: u64,
    /// Output values allowed across all inputs.
    pub max_outputs: usize,
}

impl Default for TransformLimits {
    fn default() -> Self {
        Self {
            max_steps: 100_000,
            max_outputs: 10_000,
        }
    }
}

impl TransformLimits {
    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_max_outputs(mut self, max_outputs: usize) -> Self {
        self.max_outputs = max_outputs;
        self
    }
}

/// A compiled filter.
#[derive(Debug, Clone)]
pub struct Filter {
    expr: Expr,
}

impl Filter {
    /// Compile `source`. An empty filter is the identity.
    pub fn compile(source: &str) -> Result<Self, TransformError> {
        let tokens = lexer::tokenize(source)?;
        let expr = parser::parse(tokens)?;
        Ok(Self { expr })
    }

    /// Run against a single input value.
    pub fn run(&self, input: &Value, limits: &TransformLimits) -> Result<Vec<Value>, TransformError> {
        let mut ev = Evaluator::new(limits.max_steps);
        let mut out = Vec::new();
        self.run_with(&mut ev, input, limits, &mut out)?;
        Ok(out)
    }

    fn run_with(
        &self,
        ev: &mut Evaluator,
        input: &Value,
        limits: &TransformLimits,
        out: &mut Vec<Value>,
    ) -> Result<(), TransformError> {
        match ev.eval(&self.expr, input, &Env::Empty, out) {
            Ok(()) => {}
            Err(fault @ Fault::Budget) => {
                tracing::debug!(steps = ev.steps(), "Filter budget exhausted");
                return Err(TransformError::Evaluation(fault.message()));
            }
            Err(fault) => return Err(TransformError::Evaluation(fault.message())),
        }
        if out.len() > limits.max_outputs {
            return Err(TransformError::Evaluation(format!(
                "filter produced more than {} outputs",
                limits.max_outputs
            )));
        }
        Ok(())
    }
}

/// Apply `filter` to every JSON value in `input`, in order.
///
/// The filter is compiled before the input is read, so a syntax error is
/// reported even when the input is also malformed. Whitespace-only input
/// yields no outputs.
pub fn transform(filter: &str, input: &str, limits: &TransformLimits) -> Result<Vec<Value>, TransformError> {
    let filter = Filter::compile(filter)?;
    let mut ev = Evaluator::new(limits.max_steps);
    let mut out = Vec::new();

    for value in serde_json::Deserializer::from_str(input).into_iter::<Value>() {
        let value = value.map_err(|e| TransformError::Input(e.to_string()))?;
        filter.run_with(&mut ev, &value, limits, &mut out)?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(filter: &str, input: &str) -> Result<Vec<Value>, TransformError> {
        transform(filter, input, &TransformLimits::default())
    }

    fn one(filter: &str, input: Value) -> Value {
        let out = Filter::compile(filter)
            .unwrap()
            .run(&input, &TransformLimits::default())
            .unwrap();
        assert_eq!(out.len(), 1, "expected one output from {filter}, got {out:?}");
        out.into_iter().next().unwrap()
    }

    #[test]
    fn test_identity_keeps_order() {
        let out = run(".", "[3, 1, 2]").unwrap();
        assert_eq!(out, vec![json!([3, 1, 2])]);
    }

    #[test]
    fn test_iterate_and_project() {
        let rows = r#"[{"Width": 120, "Name": "A"}, {"Width": 80, "Name": "B"}]"#;
        assert_eq!(run(".[] | .Width", rows).unwrap(), vec![json!(120), json!(80)]);
        assert_eq!(
            run("[.[] | select(.Width > 100) | .Name]", rows).unwrap(),
            vec![json!(["A"])]
        );
    }

    #[test]
    fn test_multiple_inputs_and_empty_input() {
        assert_eq!(run(".a", r#"{"a":1} {"a":2}"#).unwrap(), vec![json!(1), json!(2)]);
        assert!(run(".", "  \n").unwrap().is_empty());
    }

    #[test]
    fn test_aggregations() {
        let rows = json!([
            {"cat": "Walls", "area": 10},
            {"cat": "Doors", "area": 2},
            {"cat": "Walls", "area": 5}
        ]);
        assert_eq!(one("map(.area) | add", rows.clone()), json!(17));
        assert_eq!(one("length", rows.clone()), json!(3));
        assert_eq!(
            one("group_by(.cat) | map({cat: .[0].cat, n: length})", rows.clone()),
            json!([{"cat": "Doors", "n": 1}, {"cat": "Walls", "n": 2}])
        );
        assert_eq!(one("max_by(.area) | .area", rows.clone()), json!(10));
        assert_eq!(one("[.[].cat] | unique", rows.clone()), json!(["Doors", "Walls"]));
        assert_eq!(one("reduce .[] as $r (0; . + $r.area)", rows), json!(17));
    }

    #[test]
    fn test_strings_and_conditionals() {
        assert_eq!(one(r#""\(.a)-\(.b)""#, json!({"a": "x", "b": 2})), json!("x-2"));
        assert_eq!(one(r#"if . > 2 then "big" elif . > 0 then "small" else "none" end"#, json!(1)), json!("small"));
        assert_eq!(one(r#"split(", ") | join("/")"#, json!("a, b, c")), json!("a/b/c"));
        assert_eq!(one(r#"test("^wall"; "i")"#, json!("Wall Basic")), json!(true));
        assert_eq!(one(".a // \"none\"", json!({})), json!("none"));
    }

    #[test]
    fn test_try_and_optional() {
        assert_eq!(one("[.[] | .a?]", json!([1, {"a": 2}])), json!([2]));
        assert_eq!(one(r#"try error("boom") catch ."#, json!(null)), json!("boom"));
        assert_eq!(one("[.[] | tonumber?]", json!(["1", "x", "2.5"])), json!([1, 2.5]));
    }

    #[test]
    fn test_runtime_error_message() {
        let err = run(".[] | .Width", r#"[[1]]"#).unwrap_err();
        assert_eq!(err, TransformError::Evaluation("Cannot index array with \"Width\"".into()));
    }

    #[test]
    fn test_syntax_error_before_input() {
        let err = run(".[", "not json").unwrap_err();
        assert!(matches!(err, TransformError::Syntax(_)));
    }

    #[test]
    fn test_deep_nesting_is_a_syntax_error() {
        let parens = format!("{}.{}", "(".repeat(300), ")".repeat(300));
        assert!(matches!(Filter::compile(&parens), Err(TransformError::Syntax(_))));

        let arrays = format!("{}.{}", "[".repeat(300), "]".repeat(300));
        assert!(matches!(Filter::compile(&arrays), Err(TransformError::Syntax(_))));
    }

    #[test]
    fn test_invalid_input() {
        let err = run(".", "{\"a\": ").unwrap_err();
        assert!(matches!(err, TransformError::Input(_)));
    }

    #[test]
    fn test_budget_stops_runaway_filters() {
        let err = run("[range(1e9)]", "null").unwrap_err();
        assert_eq!(err, TransformError::Evaluation("evaluation step budget exhausted".into()));

        let err = run("[recurse(. + 1)]", "0").unwrap_err();
        assert!(err.to_string().contains("budget"));

        let err = run("[range(0; 10; 0)]", "null").unwrap_err();
        assert!(err.to_string().contains("budget"));
    }

    #[test]
    fn test_budget_is_not_catchable() {
        let err = run("try [range(1e9)] catch 0", "null").unwrap_err();
        assert!(err.to_string().contains("budget"));
        let err = run("[range(1e9)] // 0", "null").unwrap_err();
        assert!(err.to_string().contains("budget"));
    }

    #[test]
    fn test_budget_is_shared_across_inputs() {
        let limits = TransformLimits::default().with_max_steps(60);
        let input = "[1,2,3] ".repeat(20);
        assert!(transform(".[]", &input, &limits).is_err());
        assert!(transform(".[]", "[1,2,3]", &limits).is_ok());
    }

    #[test]
    fn test_output_cap() {
        let limits = TransformLimits::default().with_max_outputs(5);
        let err = transform("range(10)", "null", &limits).unwrap_err();
        assert!(err.to_string().contains("more than 5 outputs"));
    }

    #[test]
    fn test_error_mapping() {
        let syntax: PropsError = TransformError::Syntax("bad".into()).into();
        assert!(matches!(syntax, PropsError::FilterSyntax(_)));
        let eval: PropsError = TransformError::Input("eof".into()).into();
        assert!(matches!(eval, PropsError::FilterEvaluation(_)));
        assert!(eval.is_recoverable());
    }
}
