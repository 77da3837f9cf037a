use serde_json::Value;

/// Headline field of each command, in priority order.
const PRIORITY_KEYS: [&str; 6] = [
    "monthly_pension",
    "first_monthly_amount",
    "irr",
    "rate",
    "npv",
    "final_balances",
];

/// Print just the key answer value from the output.
///
/// An undefined IRR is a headline in its own right and prints as "n/a"
/// rather than falling through to the next field.
pub fn print_minimal(value: &Value) {
    let result_obj = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    if let Value::Object(map) = result_obj {
        for key in &PRIORITY_KEYS {
            if let Some(val) = map.get(*key) {
                println!("{}", format_minimal(val));
                return;
            }
        }

        // Fall back to first field
        if let Some((key, val)) = map.iter().next() {
            println!("{}: {}", key, format_minimal(val));
            return;
        }
    }

    println!("{}", format_minimal(result_obj));
}

fn format_minimal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "n/a".to_string(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_null_formats_as_not_available() {
        assert_eq!(format_minimal(&Value::Null), "n/a");
        assert_eq!(format_minimal(&json!("1124.30")), "1124.30");
    }
}
