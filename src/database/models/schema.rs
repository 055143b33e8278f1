use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Schema {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "field_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Integer,
    Decimal,
    Date,
    Boolean,
    Choice,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SchemaField {
    pub id: Uuid,
    pub schema_id: Uuid,
    pub name: String,
    pub label: String,
    pub field_type: FieldType,
    pub is_required: bool,
    pub max_length: Option<i32>,
    pub options: Vec<String>,
    pub display_order: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDetails {
    #[serde(flatten)]
    pub schema: Schema,
    pub fields: Vec<SchemaField>,
}

/// Maps a key produced by document extraction onto a schema field
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FieldMapping {
    pub id: Uuid,
    pub schema_field_id: Uuid,
    pub source_key: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl SchemaField {
    /// Validate a raw value against the field definition and return its stored form.
    pub fn normalize_value(&self, raw: &str) -> Result<String, String> {
        let value = raw.trim();
        if value.is_empty() {
            return Err("Value cannot be empty".to_string());
        }

        match self.field_type {
            FieldType::Text => {
                if let Some(max) = self.max_length {
                    if value.chars().count() > max.max(0) as usize {
                        return Err(format!("Must be at most {} characters", max));
                    }
                }
                Ok(value.to_string())
            }
            FieldType::Integer => value
                .parse::<i64>()
                .map(|n| n.to_string())
                .map_err(|_| format!("'{}' is not a whole number", value)),
            FieldType::Decimal => Decimal::from_str(value)
                .map(|d| d.normalize().to_string())
                .map_err(|_| format!("'{}' is not a decimal number", value)),
            FieldType::Date => NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .map(|d| d.format("%Y-%m-%d").to_string())
                .map_err(|_| format!("'{}' is not a date (expected YYYY-MM-DD)", value)),
            FieldType::Boolean => match value.to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Ok("true".to_string()),
                "false" | "no" | "0" => Ok("false".to_string()),
                _ => Err(format!("'{}' is not a boolean", value)),
            },
            FieldType::Choice => self
                .options
                .iter()
                .find(|option| option.eq_ignore_ascii_case(value))
                .cloned()
                .ok_or_else(|| format!("'{}' is not one of: {}", value, self.options.join(", "))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(field_type: FieldType) -> SchemaField {
        let now = Utc::now();
        SchemaField {
            id: Uuid::new_v4(),
            schema_id: Uuid::new_v4(),
            name: "amount".into(),
            label: "Amount".into(),
            field_type,
            is_required: true,
            max_length: None,
            options: vec![],
            display_order: 1,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn integers_and_decimals() {
        assert_eq!(field(FieldType::Integer).normalize_value(" 42 ").unwrap(), "42");
        assert!(field(FieldType::Integer).normalize_value("4.2").is_err());
        assert_eq!(field(FieldType::Decimal).normalize_value("12.500").unwrap(), "12.5");
        assert!(field(FieldType::Decimal).normalize_value("12,5").is_err());
    }

    #[test]
    fn dates_use_iso_format() {
        assert_eq!(field(FieldType::Date).normalize_value("2024-02-29").unwrap(), "2024-02-29");
        assert!(field(FieldType::Date).normalize_value("2023-02-29").is_err());
        assert!(field(FieldType::Date).normalize_value("29/02/2024").is_err());
    }

    #[test]
    fn booleans_accept_common_spellings() {
        let f = field(FieldType::Boolean);
        assert_eq!(f.normalize_value("Yes").unwrap(), "true");
        assert_eq!(f.normalize_value("0").unwrap(), "false");
        assert!(f.normalize_value("maybe").is_err());
    }

    #[test]
    fn choices_match_case_insensitively_and_store_canonical_option() {
        let mut f = field(FieldType::Choice);
        f.options = vec!["Invoice".into(), "Receipt".into()];
        assert_eq!(f.normalize_value("invoice").unwrap(), "Invoice");
        assert!(f.normalize_value("Contract").is_err());
    }

    #[test]
    fn text_respects_max_length() {
        let mut f = field(FieldType::Text);
        f.max_length = Some(5);
        assert_eq!(f.normalize_value("abcde").unwrap(), "abcde");
        assert!(f.normalize_value("abcdef").is_err());
        assert!(f.normalize_value("   ").is_err());
    }
}
