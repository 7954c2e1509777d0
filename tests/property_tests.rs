//! Property-based tests for parameter handling
//!
//! These tests verify that:
//! - Named keys are normalized to exactly one `:` prefix
//! - IN-clause placeholders are unique, ordered and bound to their values
//! - Bound values round-trip through the engine with the type they were given

#[cfg(test)]
mod tests {
    use dbgate::{build_in_clause, Gate, GateConfig, ParamKey, ParamValue, Params, Value};
    use proptest::prelude::*;
    use std::collections::HashSet;
    use tempfile::TempDir;

    fn memory_gate(dir: &TempDir) -> Gate {
        let config = GateConfig::default_for(dir.path().join("app")).with_env_map([
            ("DB_HOST", "localhost"),
            ("DB_PORT", "3306"),
            ("DB_NAME", ":memory:"),
            ("DB_USER", "app"),
            ("DB_PASS", "pw"),
            ("DB_CHARSET", "utf8mb4"),
        ]);
        Gate::new(config)
    }

    fn arb_name() -> impl Strategy<Value = String> {
        "[a-zA-Z_][a-zA-Z0-9_]{0,20}".prop_map(|s: String| s)
    }

    fn arb_param_value() -> impl Strategy<Value = ParamValue> {
        prop_oneof![
            any::<i64>().prop_map(ParamValue::Int),
            any::<bool>().prop_map(ParamValue::Bool),
            Just(ParamValue::Null),
            "[ -~]{0,30}".prop_map(ParamValue::Str),
        ]
    }

    proptest! {
        #[test]
        fn prop_named_keys_have_single_prefix(name in arb_name()) {
            let bare = ParamKey::named(&name);
            let prefixed = ParamKey::named(&format!(":{}", name));
            prop_assert_eq!(&bare, &prefixed);
            prop_assert_eq!(bare, ParamKey::Name(format!(":{}", name)));
        }

        #[test]
        fn prop_in_clause_placeholders_are_unique(values in prop::collection::vec(any::<i64>(), 0..50)) {
            let clause = build_in_clause(values.clone());

            let names: Vec<&str> = if clause.placeholders.is_empty() {
                Vec::new()
            } else {
                clause.placeholders.split(',').collect()
            };
            prop_assert_eq!(names.len(), values.len());
            prop_assert_eq!(names.iter().collect::<HashSet<_>>().len(), values.len());

            for (i, (name, value)) in names.iter().zip(&values).enumerate() {
                prop_assert_eq!(*name, format!(":in_{}", i));
                prop_assert_eq!(
                    clause.bindings.get(&ParamKey::named(name)),
                    Some(&ParamValue::Int(*value))
                );
            }
        }

        #[test]
        fn prop_bound_values_round_trip(value in arb_param_value()) {
            let dir = TempDir::new().unwrap();
            let gate = memory_gate(&dir);

            let row = gate
                .fetch_one("SELECT :v AS v, typeof(:v) AS t", &Params::new().named("v", value.clone()))
                .unwrap()
                .unwrap();

            let (expected, expected_type) = match value {
                ParamValue::Int(i) => (Value::Integer(i), "integer"),
                ParamValue::Bool(b) => (Value::Integer(i64::from(b)), "integer"),
                ParamValue::Null => (Value::Null, "null"),
                ParamValue::Str(s) => (Value::Text(s), "text"),
            };
            prop_assert_eq!(row.get("v"), Some(&expected));
            prop_assert_eq!(row.get("t").and_then(Value::as_str), Some(expected_type));
        }
    }
}
