use serde_json::{json, Value};

use crate::cli::OutputFormat;

/// Output a success message in the appropriate format
pub fn output_success(output_format: &OutputFormat, message: &str, data: Option<Value>) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let mut response = json!({
                "success": true,
                "message": message
            });

            if let (Some(Value::Object(extra)), Some(target)) = (data, response.as_object_mut()) {
                target.extend(extra);
            }

            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            println!("✓ {}", message);
        }
    }
    Ok(())
}

/// Output an empty collection in the appropriate format
pub fn output_empty_collection(output_format: &OutputFormat, collection_name: &str, message: &str) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&json!({ collection_name: [] }))?);
        }
        OutputFormat::Text => {
            println!("{}", message);
        }
    }
    Ok(())
}

/// Print an API payload: pretty JSON, or `key: value` lines for objects in text mode
pub fn output_value(output_format: &OutputFormat, value: &Value) -> anyhow::Result<()> {
    match (output_format, value) {
        (OutputFormat::Text, Value::Object(map)) => {
            for (key, field) in map {
                match field {
                    Value::String(s) => println!("{}: {}", key, s),
                    Value::Null => println!("{}: -", key),
                    other => println!("{}: {}", key, other),
                }
            }
        }
        _ => println!("{}", serde_json::to_string_pretty(value)?),
    }
    Ok(())
}

/// Upper-case the first letter: "tenant" -> "Tenant"
pub fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Extract target item name from optional parameter or use current
pub fn resolve_target_item(
    provided_name: Option<String>,
    current_getter: impl Fn() -> anyhow::Result<Option<String>>,
    item_type: &str,
) -> anyhow::Result<String> {
    match provided_name {
        Some(name) => Ok(name),
        None => current_getter()?.ok_or_else(|| anyhow::anyhow!("No current {} set", item_type)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capitalizes_item_types() {
        assert_eq!(capitalize("server"), "Server");
        assert_eq!(capitalize(""), "");
    }

    #[test]
    fn explicit_name_wins_over_current() {
        let name = resolve_target_item(Some("prod".into()), || Ok(Some("local".into())), "server").unwrap();
        assert_eq!(name, "prod");

        let name = resolve_target_item(None, || Ok(Some("local".into())), "server").unwrap();
        assert_eq!(name, "local");

        assert!(resolve_target_item(None, || Ok(None), "server").is_err());
    }
}
