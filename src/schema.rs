//! Declarative schemas: a mapping from field name to the rules that field must satisfy.
//!
//! Schemas are written by route authors, either in code via `FieldRules::builder()` or as
//! JSON, e.g. `{"name": {"type": "string", "required": true}}`. Any rule key that isn't built in
//! is kept as a custom rule and evaluated by the route's `Validator`.
use crate::errors::SchemaError;
use crate::validator::Validator;
use bon::Builder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// The JSON type a field's value must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    /// A whole number. Booleans and fractional numbers don't qualify.
    Integer,
    /// Any number; JSON doesn't distinguish integral and fractional values on the wire.
    Float,
    Number,
    Boolean,
    List,
    Dict,
}

impl FieldType {
    pub fn matches(self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Integer => value.is_i64() || value.is_u64(),
            FieldType::Float | FieldType::Number => value.is_number(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::List => value.is_array(),
            FieldType::Dict => value.is_object(),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::List => "list",
            FieldType::Dict => "dict",
        };
        f.write_str(name)
    }
}

/// How a field's raw value is converted before the rules run.
///
/// Names other than the built-in ones refer to coercions provided by the validator.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum Coercion {
    Integer,
    Float,
    Boolean,
    String,
    Custom(String),
}

impl From<String> for Coercion {
    fn from(name: String) -> Self {
        match name.as_str() {
            "integer" | "int" => Coercion::Integer,
            "float" => Coercion::Float,
            "boolean" | "bool" => Coercion::Boolean,
            "string" | "str" => Coercion::String,
            _ => Coercion::Custom(name),
        }
    }
}

impl From<&str> for Coercion {
    fn from(name: &str) -> Self {
        Coercion::from(name.to_owned())
    }
}

/// The rule-set for a single field.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Builder)]
pub struct FieldRules {
    #[serde(rename = "type")]
    pub ty: Option<FieldType>,
    #[serde(default)]
    #[builder(default)]
    pub required: bool,
    #[serde(default)]
    #[builder(default)]
    pub nullable: bool,
    #[builder(into)]
    pub coerce: Option<Coercion>,
    /// Inserted when the field is absent from the document.
    #[builder(into)]
    pub default: Option<Value>,
    pub allowed: Option<Vec<Value>>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub minlength: Option<usize>,
    pub maxlength: Option<usize>,
    /// Schema for the members of a `dict` value.
    #[builder(into)]
    pub schema: Option<Box<Schema>>,
    /// Rules applied to each element of a `list` value.
    #[builder(into)]
    pub items: Option<Box<FieldRules>>,
    /// Rules the validator provides, keyed by rule name.
    #[serde(flatten)]
    #[builder(default)]
    pub custom: BTreeMap<String, Value>,
}

impl FieldRules {
    /// Add a custom rule with its constraint.
    pub fn with_rule(mut self, rule: impl Into<String>, constraint: impl Into<Value>) -> Self {
        self.custom.insert(rule.into(), constraint.into());
        self
    }

    fn check_at<V: Validator + ?Sized>(&self, validator: &V, path: &str) -> Result<(), SchemaError> {
        for rule in self.custom.keys() {
            if !validator.custom_rules().iter().any(|known| *known == rule.as_str()) {
                return Err(SchemaError::UnknownRule {
                    field: path.to_owned(),
                    rule: rule.clone(),
                });
            }
        }

        if let Some(Coercion::Custom(name)) = &self.coerce
            && !validator.custom_coercions().iter().any(|known| *known == name.as_str())
        {
            return Err(SchemaError::UnknownCoercion {
                field: path.to_owned(),
                coercion: name.clone(),
            });
        }

        if let Some(schema) = &self.schema {
            schema.check_at(validator, path)?;
        }
        if let Some(items) = &self.items {
            items.check_at(validator, &format!("{path}[]"))?;
        }
        Ok(())
    }
}

/// A mapping from field name to `FieldRules`.
///
/// Documents may not carry fields the schema doesn't name unless `allow_unknown` is set.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "BTreeMap<String, FieldRules>")]
pub struct Schema {
    fields: BTreeMap<String, FieldRules>,
    allow_unknown: bool,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, rules: FieldRules) -> Self {
        self.fields.insert(name.into(), rules);
        self
    }

    pub fn allow_unknown(mut self, allow: bool) -> Self {
        self.allow_unknown = allow;
        self
    }

    pub fn allows_unknown(&self) -> bool {
        self.allow_unknown
    }

    pub fn get(&self, name: &str) -> Option<&FieldRules> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldRules)> {
        self.fields.iter().map(|(name, rules)| (name.as_str(), rules))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Check that every custom rule and coercion in this schema (nested schemas included) is
    /// provided by `validator`.
    pub fn check<V: Validator + ?Sized>(&self, validator: &V) -> Result<(), SchemaError> {
        self.check_at(validator, "")
    }

    fn check_at<V: Validator + ?Sized>(&self, validator: &V, prefix: &str) -> Result<(), SchemaError> {
        for (name, rules) in &self.fields {
            let path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{prefix}.{name}")
            };
            rules.check_at(validator, &path)?;
        }
        Ok(())
    }
}

impl From<BTreeMap<String, FieldRules>> for Schema {
    fn from(fields: BTreeMap<String, FieldRules>) -> Self {
        Self {
            fields,
            allow_unknown: false,
        }
    }
}

impl<K: Into<String>> FromIterator<(K, FieldRules)> for Schema {
    fn from_iter<I: IntoIterator<Item = (K, FieldRules)>>(iter: I) -> Self {
        iter.into_iter()
            .map(|(name, rules)| (name.into(), rules))
            .collect::<BTreeMap<_, _>>()
            .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::{DefaultValidator, RuleContext};
    use serde_json::json;

    struct Reversing;

    impl Validator for Reversing {
        fn custom_rules(&self) -> &[&'static str] {
            &["reversed_string"]
        }

        fn check_rule(&self, _ctx: &RuleContext<'_>) -> Result<(), String> {
            Ok(())
        }
    }

    #[test]
    fn test_schema_from_json() {
        let schema: Schema = serde_json::from_value(json!({
            "name": {"type": "string", "required": true},
            "val": {"type": "integer", "coerce": "integer", "min": 1},
            "tags": {"type": "list", "items": {"type": "string"}},
        }))
        .unwrap();

        let name = schema.get("name").unwrap();
        assert_eq!(name.ty, Some(FieldType::String));
        assert!(name.required);
        assert!(name.custom.is_empty());

        let val = schema.get("val").unwrap();
        assert_eq!(val.coerce, Some(Coercion::Integer));
        assert_eq!(val.min, Some(1.0));
        assert!(!val.required);

        let tags = schema.get("tags").unwrap();
        assert_eq!(
            tags.items.as_deref().and_then(|items| items.ty),
            Some(FieldType::String)
        );
        assert!(!schema.allows_unknown());
    }

    #[test]
    fn test_unrecognised_keys_become_custom_rules() {
        let schema: Schema = serde_json::from_value(json!({
            "reversed": {"type": "string", "reversed_string": "name"},
        }))
        .unwrap();

        let reversed = schema.get("reversed").unwrap();
        assert_eq!(reversed.custom.get("reversed_string"), Some(&json!("name")));
    }

    #[test]
    fn test_nested_schema_from_json() {
        let schema: Schema = serde_json::from_value(json!({
            "address": {"type": "dict", "schema": {"zip": {"type": "string", "required": true}}},
        }))
        .unwrap();

        let nested = schema.get("address").unwrap().schema.as_deref().unwrap();
        assert!(nested.get("zip").unwrap().required);
    }

    #[test]
    fn test_builder_matches_json_form() {
        let built = Schema::new().field(
            "name",
            FieldRules::builder()
                .ty(FieldType::String)
                .required(true)
                .build(),
        );
        let parsed: Schema =
            serde_json::from_value(json!({"name": {"type": "string", "required": true}})).unwrap();

        assert_eq!(built, parsed);
    }

    #[test]
    fn test_check_rejects_rules_the_validator_lacks() {
        let schema = Schema::new().field(
            "reversed",
            FieldRules::builder()
                .ty(FieldType::String)
                .build()
                .with_rule("reversed_string", "name"),
        );

        assert_eq!(
            schema.check(&DefaultValidator),
            Err(SchemaError::UnknownRule {
                field: "reversed".into(),
                rule: "reversed_string".into(),
            })
        );
        assert_eq!(schema.check(&Reversing), Ok(()));
    }

    #[test]
    fn test_check_reports_nested_paths() {
        let schema: Schema = serde_json::from_value(json!({
            "user": {"type": "dict", "schema": {"slug": {"coerce": "slugify"}}},
        }))
        .unwrap();

        assert_eq!(
            schema.check(&DefaultValidator),
            Err(SchemaError::UnknownCoercion {
                field: "user.slug".into(),
                coercion: "slugify".into(),
            })
        );
    }

    #[test]
    fn test_check_reports_item_paths() {
        let coerced: Schema = serde_json::from_value(json!({
            "tags": {"type": "list", "items": {"coerce": "slugify"}},
        }))
        .unwrap();
        assert_eq!(
            coerced.check(&DefaultValidator),
            Err(SchemaError::UnknownCoercion {
                field: "tags[]".into(),
                coercion: "slugify".into(),
            })
        );

        let ruled: Schema = serde_json::from_value(json!({
            "people": {"type": "list", "items": {"type": "dict", "schema": {
                "reversed": {"type": "string", "reversed_string": "name"}
            }}},
        }))
        .unwrap();
        assert_eq!(
            ruled.check(&DefaultValidator),
            Err(SchemaError::UnknownRule {
                field: "people[].reversed".into(),
                rule: "reversed_string".into(),
            })
        );
        assert_eq!(ruled.check(&Reversing), Ok(()));
    }
}
