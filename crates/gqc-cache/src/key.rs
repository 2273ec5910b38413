//! Raw key evaluation.
//!
//! Raw keys keep `$variable` tokens literal (`items(completed: $completed)`)
//! so one declared field can store many argument-distinct results. Evaluation
//! substitutes each token with the JSON rendering of the variable, producing
//! the concrete storage key.

use serde_json::Value;

/// Evaluate a raw key against a variables object.
///
/// `$name` tokens outside string literals are replaced with the JSON text of
/// `variables[name]`, or the literal text `undefined` when the variable is
/// absent. Deterministic for fixed inputs.
#[must_use]
pub fn evaluate_key(key: &str, variables: &Value) -> String {
    let mut evaluated = String::with_capacity(key.len());
    let mut variable_name = String::new();
    let mut in_string = false;
    let mut in_variable = false;

    for ch in key.chars() {
        if in_variable {
            if ch.is_alphanumeric() || ch == '_' {
                variable_name.push(ch);
                continue;
            }
            push_variable(&mut evaluated, &variable_name, variables);
            variable_name.clear();
            in_variable = false;
        }

        match ch {
            '"' => {
                in_string = !in_string;
                evaluated.push(ch);
            }
            '$' if !in_string => in_variable = true,
            _ => evaluated.push(ch),
        }
    }

    if in_variable {
        push_variable(&mut evaluated, &variable_name, variables);
    }

    evaluated
}

/// Returns `true` if the raw key embeds any `$variable` token.
#[must_use]
pub fn key_has_variables(key: &str) -> bool {
    let mut in_string = false;
    for ch in key.chars() {
        match ch {
            '"' => in_string = !in_string,
            '$' if !in_string => return true,
            _ => {}
        }
    }
    false
}

fn push_variable(out: &mut String, name: &str, variables: &Value) {
    match variables.get(name) {
        Some(value) => out.push_str(&value.to_string()),
        None => out.push_str("undefined"),
    }
}
