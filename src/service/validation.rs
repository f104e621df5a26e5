//! Request validation: identifiers and record fields against their schema.

use crate::error::AppError;
use crate::model::{Fields, MAX_CUSTOMER_NAME_LEN};
use crate::schema::{FieldDescriptor, SchemaDescriptor};
use regex::Regex;
use serde_json::Value;

/// Tenant ids become part of a schema name (`tenant-<id>`), which PostgreSQL truncates
/// past 63 bytes; longer ids could collide.
pub const MAX_TENANT_ID_LEN: usize = 56;

pub struct RequestValidator;

impl RequestValidator {
    pub fn tenant_id(tenant_id: &str) -> Result<(), AppError> {
        if tenant_id.is_empty() {
            return Err(AppError::Validation("tenantId is required".into()));
        }
        if tenant_id.len() > MAX_TENANT_ID_LEN {
            return Err(AppError::Validation(format!(
                "tenantId must be at most {} bytes",
                MAX_TENANT_ID_LEN
            )));
        }
        reject_nul("tenantId", tenant_id)
    }

    pub fn customer_name(customer_name: &str) -> Result<(), AppError> {
        if customer_name.trim().is_empty() {
            return Err(AppError::Validation("customerName is required".into()));
        }
        if customer_name.chars().count() > MAX_CUSTOMER_NAME_LEN {
            return Err(AppError::Validation(format!(
                "customerName must be at most {} characters",
                MAX_CUSTOMER_NAME_LEN
            )));
        }
        reject_nul("customerName", customer_name)
    }

    /// Validate a write: every field must be declared with a matching kind, required
    /// fields must be present, and the key field must equal `natural_key`.
    pub fn validate(fields: &Fields, natural_key: &str, schema: &SchemaDescriptor) -> Result<(), AppError> {
        if natural_key.is_empty() {
            return Err(AppError::Validation(format!("{} is required", schema.key_field)));
        }
        for (name, value) in fields {
            let field = schema
                .get_field(name)
                .ok_or_else(|| AppError::Validation(format!("unknown field '{}' for {}", name, schema.name)))?;
            validate_field(field, value)?;
        }
        for field in schema.fields.iter().filter(|f| f.required) {
            if fields.get(&field.name).map(Value::is_null).unwrap_or(true) {
                return Err(AppError::Validation(format!("{} is required", field.name)));
            }
        }
        match fields.get(&schema.key_field).and_then(Value::as_str) {
            Some(key) if key == natural_key => Ok(()),
            _ => Err(AppError::Validation(format!(
                "{} must equal the natural key '{}'",
                schema.key_field, natural_key
            ))),
        }
    }
}

/// PostgreSQL text and jsonb cannot store NUL.
fn reject_nul(name: &str, s: &str) -> Result<(), AppError> {
    if s.contains('\0') {
        return Err(AppError::Validation(format!("{} must not contain NUL characters", name)));
    }
    Ok(())
}

fn validate_field(field: &FieldDescriptor, v: &Value) -> Result<(), AppError> {
    if v.is_null() {
        return Ok(());
    }
    if !field.kind.matches(v) {
        return Err(AppError::Validation(format!(
            "{} must be of type {:?}",
            field.name, field.kind
        )));
    }
    let Some(s) = v.as_str() else {
        return Ok(());
    };
    reject_nul(&field.name, s)?;
    if let Some(max) = field.max_length {
        if s.chars().count() > max {
            return Err(AppError::Validation(format!(
                "{} must be at most {} characters",
                field.name, max
            )));
        }
    }
    if let Some(ref pattern) = field.pattern {
        let re = Regex::new(pattern)
            .map_err(|_| AppError::Validation(format!("invalid pattern for {}", field.name)))?;
        if !re.is_match(s) {
            return Err(AppError::Validation(format!(
                "{} does not match required pattern",
                field.name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Customer, Entity, Tenant};
    use crate::schema::FieldKind;
    use serde_json::json;

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    #[test]
    fn tenant_ids() {
        for ok in ["42", "acme", "Acme_Corp-1", "acme.corp", "_x", "café", "tenant 1"] {
            assert!(RequestValidator::tenant_id(ok).is_ok(), "{ok}");
        }
        for bad in ["", "a\0b"] {
            assert!(RequestValidator::tenant_id(bad).is_err(), "{bad:?}");
        }
        assert!(RequestValidator::tenant_id(&"x".repeat(MAX_TENANT_ID_LEN)).is_ok());
        assert!(RequestValidator::tenant_id(&"x".repeat(MAX_TENANT_ID_LEN + 1)).is_err());
        // 28 two-byte characters fill the cap exactly
        assert!(RequestValidator::tenant_id(&"é".repeat(28)).is_ok());
        assert!(RequestValidator::tenant_id(&"é".repeat(29)).is_err());
    }

    #[test]
    fn customer_names() {
        assert!(RequestValidator::customer_name("Acme Inc.").is_ok());
        assert!(RequestValidator::customer_name("   ").is_err());
        assert!(RequestValidator::customer_name(&"n".repeat(MAX_CUSTOMER_NAME_LEN + 1)).is_err());
        let err = RequestValidator::customer_name("Acme\0Inc").unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn nul_in_field_value_is_rejected() {
        let f = fields(json!({"id": "42", "name": "4\u{0}2"}));
        let err = RequestValidator::validate(&f, "42", Tenant::schema()).unwrap_err();
        assert!(err.to_string().contains("NUL"));
    }

    #[test]
    fn pattern_is_enforced() {
        let schema = SchemaDescriptor::new("Widget", "widgets", "sku").pattern("sku", r"^[A-Z]{2}-\d+$");
        let ok = fields(json!({"sku": "WX-12"}));
        assert!(RequestValidator::validate(&ok, "WX-12", &schema).is_ok());
        let bad = fields(json!({"sku": "wx12"}));
        let err = RequestValidator::validate(&bad, "wx12", &schema).unwrap_err();
        assert!(err.to_string().contains("pattern"));
    }

    #[test]
    fn registration_fields_fit_their_schemas() {
        RequestValidator::validate(&Tenant::registration_fields("42"), "42", Tenant::schema()).unwrap();
        RequestValidator::validate(&Customer::registration_fields("Acme"), "Acme", Customer::schema()).unwrap();
    }

    #[test]
    fn unknown_field_is_rejected() {
        let f = fields(json!({"id": "42", "name": "42", "plan": "gold"}));
        let err = RequestValidator::validate(&f, "42", Tenant::schema()).unwrap_err();
        assert!(err.to_string().contains("plan"));
    }

    #[test]
    fn wrong_kind_is_rejected() {
        let f = fields(json!({"id": "42", "name": 42}));
        assert!(RequestValidator::validate(&f, "42", Tenant::schema()).is_err());
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let f = fields(json!({"id": "42"}));
        let err = RequestValidator::validate(&f, "42", Tenant::schema()).unwrap_err();
        assert!(err.to_string().contains("name is required"));
    }

    #[test]
    fn key_field_must_match_natural_key() {
        let f = fields(json!({"id": "43", "name": "42"}));
        assert!(RequestValidator::validate(&f, "42", Tenant::schema()).is_err());
    }

    #[test]
    fn optional_field_may_be_null() {
        let schema = SchemaDescriptor::new("Widget", "widgets", "sku").field("color", FieldKind::String);
        let f = fields(json!({"sku": "w1", "color": null}));
        assert!(RequestValidator::validate(&f, "w1", &schema).is_ok());
    }
}
