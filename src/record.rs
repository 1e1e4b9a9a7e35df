use serde_json::Value;

/// A single flat row of named patent fields, in source order. Values are
/// pre-rendered display strings so the responder can splice them straight
/// into a grounding prompt.
#[derive(Debug, Clone, Default)]
pub struct PatentRecord {
    fields: Vec<(String, String)>,
}

impl PatentRecord {
    pub fn columns(&self) -> Vec<&str> {
        self.fields.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }

    /// Last write wins on column-name collisions.
    pub fn insert(&mut self, column: &str, value: String) {
        if let Some(existing) = self.fields.iter_mut().find(|(name, _)| name == column) {
            existing.1 = value;
        } else {
            self.fields.push((column.to_string(), value));
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Flattens a structured record into a single row: scalar fields copied,
/// nested-object fields flattened one level, null/empty fields omitted.
/// Best-effort per field: a field that cannot be rendered is reported in the
/// returned diagnostics and skipped, never fatal.
pub fn flatten_record(data: &Value) -> (PatentRecord, Vec<String>) {
    let mut record = PatentRecord::default();
    let mut skipped = Vec::new();

    let Some(object) = data.as_object() else {
        skipped.push("record root is not an object".to_string());
        return (record, skipped);
    };

    for (key, value) in object {
        match value {
            Value::Object(nested) => {
                for (subkey, subvalue) in nested {
                    fold_field(&mut record, &mut skipped, subkey, subvalue);
                }
            }
            other => fold_field(&mut record, &mut skipped, key, other),
        }
    }

    (record, skipped)
}

fn fold_field(record: &mut PatentRecord, skipped: &mut Vec<String>, key: &str, value: &Value) {
    match render_value(value) {
        Ok(Some(text)) => record.insert(key, text),
        Ok(None) => {}
        Err(reason) => skipped.push(format!("{key}: {reason}")),
    }
}

/// `Ok(None)` means the field is empty/falsy and should be omitted.
fn render_value(value: &Value) -> Result<Option<String>, String> {
    match value {
        Value::Null => Ok(None),
        Value::Bool(b) => Ok(Some(b.to_string())),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Ok(None)
            } else {
                Ok(Some(trimmed.to_string()))
            }
        }
        Value::Array(items) => {
            if items.is_empty() {
                return Ok(None);
            }
            let mut rendered = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::String(s) => rendered.push(s.clone()),
                    Value::Number(n) => rendered.push(n.to_string()),
                    Value::Bool(b) => rendered.push(b.to_string()),
                    Value::Null => {}
                    other => rendered.push(
                        serde_json::to_string(other).map_err(|e| e.to_string())?,
                    ),
                }
            }
            if rendered.is_empty() {
                Ok(None)
            } else {
                Ok(Some(rendered.join(", ")))
            }
        }
        Value::Object(map) => {
            if map.is_empty() {
                return Ok(None);
            }
            // Deeper nesting than the one flattened level is kept as compact JSON.
            serde_json::to_string(value).map(Some).map_err(|e| e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalars_become_columns() {
        let (record, skipped) = flatten_record(&json!({
            "title": "Widget",
            "claims": "A device...",
            "priority_year": 2019,
        }));

        assert!(skipped.is_empty());
        assert_eq!(record.get("title"), Some("Widget"));
        assert_eq!(record.get("claims"), Some("A device..."));
        assert_eq!(record.get("priority_year"), Some("2019"));
    }

    #[test]
    fn nested_objects_flatten_one_level() {
        let (record, _) = flatten_record(&json!({
            "applicant": { "name": "Acme Corp", "country": "US" },
            "title": "Widget",
        }));

        assert_eq!(record.get("name"), Some("Acme Corp"));
        assert_eq!(record.get("country"), Some("US"));
        assert_eq!(record.get("title"), Some("Widget"));
        assert_eq!(record.get("applicant"), None);
    }

    #[test]
    fn empty_fields_are_omitted() {
        let (record, skipped) = flatten_record(&json!({
            "title": "Widget",
            "abstract": "",
            "inventors": [],
            "assignee": null,
        }));

        assert!(skipped.is_empty());
        assert_eq!(record.len(), 1);
        assert_eq!(record.get("title"), Some("Widget"));
    }

    #[test]
    fn arrays_render_as_joined_values() {
        let (record, _) = flatten_record(&json!({
            "inventors": ["A. Ada", "B. Babbage"],
        }));

        assert_eq!(record.get("inventors"), Some("A. Ada, B. Babbage"));
    }

    #[test]
    fn collision_keeps_last_write() {
        let (record, _) = flatten_record(&json!({
            "status": "pending",
            "prosecution": { "status": "granted" },
        }));

        assert_eq!(record.get("status"), Some("granted"));
    }

    #[test]
    fn non_object_root_returns_empty_record_with_diagnostic() {
        let (record, skipped) = flatten_record(&json!([1, 2, 3]));
        assert!(record.is_empty());
        assert_eq!(skipped.len(), 1);
    }
}
