//! Built-in gate evaluators (§4.G "Registered gate kinds"). Each returns a
//! boxed [`super::Evaluator`] ready to hand to [`super::Gate::new`].

use serde_json::Value;

use super::{Evaluation, Evaluator, Severity};

/// Passes when `output.ac_met == "yes"`.
pub fn ac_validation() -> Evaluator {
    Box::new(|output: &Value| match output.get("ac_met").and_then(Value::as_str) {
        Some("yes") => Evaluation::pass(),
        Some(other) => Evaluation::fail(Severity::Error, vec![format!("ac_met = \"{other}\", expected \"yes\"")]),
        None => Evaluation::fail(Severity::Error, vec!["missing field: ac_met".to_string()]),
    })
}

/// Passes when `output.tests.fail == 0`.
pub fn test_coverage() -> Evaluator {
    Box::new(|output: &Value| match output.pointer("/tests/fail").and_then(Value::as_i64) {
        Some(0) => Evaluation::pass(),
        Some(n) => Evaluation::fail(Severity::Error, vec![format!("{n} failing test(s)")]),
        None => Evaluation::fail(Severity::Error, vec!["missing field: tests.fail".to_string()]),
    })
}

/// Passes when `output.verdict == "SHIP_IT"`.
pub fn code_review_verdict() -> Evaluator {
    Box::new(|output: &Value| match output.get("verdict").and_then(Value::as_str) {
        Some("SHIP_IT") => Evaluation::pass(),
        Some(other) => Evaluation::fail(Severity::Warn, vec![format!("verdict = \"{other}\"")]),
        None => Evaluation::fail(Severity::Error, vec!["missing field: verdict".to_string()]),
    })
}

/// Parameterized by a schema: every top-level key in `schema` must be
/// present in the output. Mirrors the dispatcher's shallow schema check
/// (`crate::dispatcher`) since both enforce the same "does the agent's
/// structured output carry the fields we asked for" contract.
pub fn schema_compliance(schema: Value) -> Evaluator {
    Box::new(move |output: &Value| {
        let Value::Object(schema_fields) = &schema else {
            return Evaluation::pass();
        };
        let Value::Object(output_fields) = output else {
            return Evaluation::fail(Severity::Error, vec!["expected an object at the top level".to_string()]);
        };
        let missing: Vec<String> = schema_fields
            .keys()
            .filter(|key| !output_fields.contains_key(*key))
            .map(|key| format!("missing field: {key}"))
            .collect();
        if missing.is_empty() {
            Evaluation::pass()
        } else {
            Evaluation::fail(Severity::Error, missing)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ac_validation_requires_yes() {
        let eval = ac_validation();
        assert!(eval(&json!({"ac_met": "yes"})).pass);
        assert!(!eval(&json!({"ac_met": "no"})).pass);
        assert!(!eval(&json!({})).pass);
    }

    #[test]
    fn test_coverage_requires_zero_failures() {
        let eval = test_coverage();
        assert!(eval(&json!({"tests": {"fail": 0}})).pass);
        assert!(!eval(&json!({"tests": {"fail": 2}})).pass);
    }

    #[test]
    fn code_review_verdict_requires_ship_it() {
        let eval = code_review_verdict();
        assert!(eval(&json!({"verdict": "SHIP_IT"})).pass);
        assert!(!eval(&json!({"verdict": "NEEDS_WORK"})).pass);
    }

    #[test]
    fn schema_compliance_checks_top_level_keys() {
        let eval = schema_compliance(json!({"result": null, "cost_usd": null}));
        assert!(eval(&json!({"result": "success", "cost_usd": 0.1})).pass);
        assert!(!eval(&json!({"result": "success"})).pass);
    }
}
