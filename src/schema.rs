//! Schema descriptors: the one canonical shape per entity, used to create collections,
//! validate writes and detect conflicting model registrations.

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldKind {
    String,
    Number,
    Boolean,
}

impl FieldKind {
    pub fn matches(&self, value: &serde_json::Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Number => value.is_number(),
            FieldKind::Boolean => value.is_boolean(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
    pub max_length: Option<usize>,
    /// Regular expression a string value must match.
    pub pattern: Option<String>,
}

/// Structural description of a record type. Two descriptors are the same schema only if
/// every part compares equal.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SchemaDescriptor {
    /// Model name, the second half of the model cache key (e.g. `Tenant`).
    pub name: String,
    /// Collection (table) the records live in.
    pub collection: String,
    /// Natural key field; its value identifies a record.
    pub key_field: String,
    pub fields: Vec<FieldDescriptor>,
    /// Maintain `createdAt` / `updatedAt` on every record.
    pub timestamps: bool,
}

impl SchemaDescriptor {
    /// Start a descriptor whose natural key is a required string field.
    pub fn new(name: impl Into<String>, collection: impl Into<String>, key_field: impl Into<String>) -> Self {
        let key_field = key_field.into();
        SchemaDescriptor {
            name: name.into(),
            collection: collection.into(),
            fields: vec![FieldDescriptor {
                name: key_field.clone(),
                kind: FieldKind::String,
                required: true,
                max_length: None,
                pattern: None,
            }],
            key_field,
            timestamps: false,
        }
    }

    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldDescriptor {
            name: name.into(),
            kind,
            required: false,
            max_length: None,
            pattern: None,
        });
        self
    }

    pub fn required(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldDescriptor {
            name: name.into(),
            kind,
            required: true,
            max_length: None,
            pattern: None,
        });
        self
    }

    /// Cap the length of a string field already declared on this descriptor.
    pub fn max_length(mut self, name: &str, max: usize) -> Self {
        if let Some(f) = self.fields.iter_mut().find(|f| f.name == name) {
            f.max_length = Some(max);
        }
        self
    }

    /// Require a string field already declared on this descriptor to match `pattern`.
    pub fn pattern(mut self, name: &str, pattern: impl Into<String>) -> Self {
        if let Some(f) = self.fields.iter_mut().find(|f| f.name == name) {
            f.pattern = Some(pattern.into());
        }
        self
    }

    pub fn with_timestamps(mut self) -> Self {
        self.timestamps = true;
        self
    }

    pub fn get_field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_field_is_declared_and_required() {
        let s = SchemaDescriptor::new("Widget", "widgets", "sku");
        let key = s.get_field("sku").unwrap();
        assert!(key.required);
        assert_eq!(key.kind, FieldKind::String);
    }

    #[test]
    fn descriptors_compare_structurally() {
        let a = SchemaDescriptor::new("Widget", "widgets", "sku").field("color", FieldKind::String);
        let b = SchemaDescriptor::new("Widget", "widgets", "sku").field("color", FieldKind::String);
        let c = SchemaDescriptor::new("Widget", "widgets", "sku").field("color", FieldKind::Number);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, a.clone().with_timestamps());
    }

    #[test]
    fn kinds_match_json_types() {
        assert!(FieldKind::String.matches(&serde_json::json!("x")));
        assert!(!FieldKind::String.matches(&serde_json::json!(1)));
        assert!(FieldKind::Number.matches(&serde_json::json!(1.5)));
        assert!(FieldKind::Boolean.matches(&serde_json::json!(false)));
    }
}
