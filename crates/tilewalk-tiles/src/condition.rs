use serde_json::Value;
use tracing::warn;

use tilewalk_core::types::WorkflowData;

/// Truthiness of a configured condition value.
///
/// Booleans are taken as is; null is false; numbers are true when non-zero;
/// strings, arrays and objects are true when non-empty.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Evaluate a simple conditional expression against workflow data.
///
/// Supported expressions:
/// - `key == "value"`: exact match
/// - `key != "value"`: not equal
/// - `key contains "substr"`: substring match
/// - `key matches "regex"`: regular expression match
///
/// Non-string values are compared through their JSON rendering.
/// Returns `false` for unparseable expressions and missing keys.
pub fn evaluate_expression(expr: &str, data: &WorkflowData) -> bool {
    let expr = expr.trim();

    // The key never contains an operator, so the leftmost one splits the
    // expression. Operators inside the quoted value stay part of the value.
    let Some((op, at)) = OPERATORS
        .iter()
        .filter_map(|op| expr.find(op.token()).map(|at| (*op, at)))
        .min_by_key(|(_, at)| *at)
    else {
        return false;
    };

    let key = expr[..at].trim();
    if key.is_empty() {
        return false;
    }
    let value = expr[at + op.token().len()..].trim().trim_matches('"');
    let Some(text) = lookup(data, key) else {
        return false;
    };

    match op {
        Operator::Matches => match regex::Regex::new(value) {
            Ok(re) => re.is_match(&text),
            Err(e) => {
                warn!(pattern = value, error = %e, "Invalid regex in condition expression");
                false
            }
        },
        Operator::Contains => text.contains(value),
        Operator::NotEquals => text != value,
        Operator::Equals => text == value,
    }
}

#[derive(Debug, Clone, Copy)]
enum Operator {
    Matches,
    Contains,
    NotEquals,
    Equals,
}

const OPERATORS: [Operator; 4] = [
    Operator::Matches,
    Operator::Contains,
    Operator::NotEquals,
    Operator::Equals,
];

impl Operator {
    fn token(self) -> &'static str {
        match self {
            Operator::Matches => " matches ",
            Operator::Contains => " contains ",
            Operator::NotEquals => "!=",
            Operator::Equals => "==",
        }
    }
}

fn lookup(data: &WorkflowData, key: &str) -> Option<String> {
    match data.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data() -> WorkflowData {
        let mut data = WorkflowData::new();
        data.set_str("selected_option", "Yes");
        data.set_str("output", "The file was created successfully.");
        data.set("attempts", json!(3));
        data
    }

    #[test]
    fn test_truthiness() {
        assert!(is_truthy(&json!(true)));
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&Value::Null));
        assert!(is_truthy(&json!(2)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!(0.0)));
        assert!(is_truthy(&json!("no")));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!([])));
        assert!(is_truthy(&json!({"k": 1})));
    }

    #[test]
    fn test_equals() {
        assert!(evaluate_expression(r#"selected_option == "Yes""#, &data()));
        assert!(!evaluate_expression(r#"selected_option == "No""#, &data()));
    }

    #[test]
    fn test_not_equals() {
        assert!(evaluate_expression(r#"selected_option != "No""#, &data()));
        assert!(!evaluate_expression(r#"selected_option != "Yes""#, &data()));
    }

    #[test]
    fn test_operator_inside_value() {
        let mut data = WorkflowData::new();
        data.set_str("k", "a != b");
        data.set_str("note", "x == y");
        assert!(evaluate_expression(r#"k == "a != b""#, &data));
        assert!(!evaluate_expression(r#"k != "a != b""#, &data));
        assert!(evaluate_expression(r#"note contains "==""#, &data));
        assert!(evaluate_expression(r#"note != "x""#, &data));
    }

    #[test]
    fn test_contains() {
        assert!(evaluate_expression(r#"output contains "created""#, &data()));
        assert!(!evaluate_expression(r#"output contains "deleted""#, &data()));
    }

    #[test]
    fn test_matches() {
        assert!(evaluate_expression(r#"output matches "^The .* successfully\.$""#, &data()));
        assert!(!evaluate_expression(r#"output matches "^deleted""#, &data()));
        assert!(!evaluate_expression(r#"output matches "(unclosed""#, &data()));
    }

    #[test]
    fn test_number_comparison() {
        assert!(evaluate_expression(r#"attempts == "3""#, &data()));
    }

    #[test]
    fn test_missing_key() {
        assert!(!evaluate_expression(r#"missing == "value""#, &data()));
        assert!(!evaluate_expression(r#"missing != "value""#, &data()));
    }

    #[test]
    fn test_invalid_expr() {
        assert!(!evaluate_expression("this is not valid", &data()));
        assert!(!evaluate_expression(r#"== "x""#, &data()));
    }
}
