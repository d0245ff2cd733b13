//! The validation engine and its extension point.
//!
//! A `Validator` runs a `Schema` over a document in two passes. Normalisation applies coercions
//! and defaults. Validation then checks unknown fields, required fields and every field's rules.
//! The output is either the normalised document or the per-field errors.
//!
//! Routes that need rules beyond the built-in ones implement `Validator` on their own type and
//! declare the rule names in `custom_rules`:
//!
//! ```ignore
//! struct Reversing;
//!
//! impl Validator for Reversing {
//!     fn custom_rules(&self) -> &[&'static str] {
//!         &["reversed_string"]
//!     }
//!
//!     fn check_rule(&self, ctx: &RuleContext<'_>) -> Result<(), String> {
//!         let other = ctx.constraint.as_str().and_then(|f| ctx.document.get(f));
//!         // ...
//!     }
//! }
//! ```
use crate::errors::{FieldError, ValidationErrors};
use crate::schema::{Coercion, FieldRules, Schema};
use serde_json::{Map, Number, Value};

/// A request document: the parsed JSON body or the normalised query arguments.
pub type Document = Map<String, Value>;

/// Everything a custom rule can see while it runs.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    /// The rule's name as written in the schema.
    pub rule: &'a str,
    /// The value the schema gives the rule.
    pub constraint: &'a Value,
    pub field: &'a str,
    pub value: &'a Value,
    /// The normalised document the field belongs to.
    pub document: &'a Document,
}

pub trait Validator: Send + Sync + 'static {
    /// Names of the custom rules `check_rule` understands.
    fn custom_rules(&self) -> &[&'static str] {
        &[]
    }

    /// Evaluate a custom rule. An `Err` carries the message recorded against the field.
    fn check_rule(&self, ctx: &RuleContext<'_>) -> Result<(), String> {
        Err(format!("no handler for rule '{}'", ctx.rule))
    }

    /// Names of the custom coercions `coerce` understands.
    fn custom_coercions(&self) -> &[&'static str] {
        &[]
    }

    /// Apply a custom coercion.
    fn coerce(&self, name: &str, _value: &Value) -> Result<Value, String> {
        Err(format!("no coercion named '{name}'"))
    }

    /// Normalise and validate `document` against `schema`.
    fn validate(&self, schema: &Schema, document: Document) -> Result<Document, ValidationErrors> {
        run(self, schema, document)
    }
}

/// The validator used when a route doesn't supply its own: built-in rules only.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultValidator;

impl Validator for DefaultValidator {}

fn run<V: Validator + ?Sized>(
    validator: &V,
    schema: &Schema,
    mut document: Document,
) -> Result<Document, ValidationErrors> {
    let mut errors = ValidationErrors::new();
    normalize(validator, schema, &mut document, &mut errors);

    if !schema.allows_unknown() {
        for field in document.keys() {
            if schema.get(field).is_none() {
                errors.add(field.as_str(), "unknown field");
            }
        }
    }

    let mut replacements = Vec::new();
    for (field, rules) in schema.fields() {
        // Fields whose coercion failed have already been reported.
        if errors.contains(field) {
            continue;
        }
        match document.get(field) {
            None if rules.required => errors.add(field, "required field"),
            None => {}
            Some(value) => match check_value(validator, field, rules, value, &document) {
                Ok(Some(replacement)) => replacements.push((field.to_owned(), replacement)),
                Ok(None) => {}
                Err(field_errors) => errors.extend(field, field_errors),
            },
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }
    document.extend(replacements);
    Ok(document)
}

fn normalize<V: Validator + ?Sized>(
    validator: &V,
    schema: &Schema,
    document: &mut Document,
    errors: &mut ValidationErrors,
) {
    for (field, rules) in schema.fields() {
        // Defaults fill absent fields and nulls the field doesn't accept, before coercion.
        if let Some(default) = &rules.default {
            let missing = document
                .get(field)
                .is_none_or(|value| value.is_null() && !rules.nullable);
            if missing {
                document.insert(field.to_owned(), default.clone());
            }
        }

        let (Some(coercion), Some(value)) = (&rules.coerce, document.get_mut(field)) else {
            continue;
        };
        match coerce(validator, coercion, value) {
            Ok(coerced) => *value = coerced,
            Err(reason) => errors.add(field, format!("cannot be coerced: {reason}")),
        }
    }
}

/// Check one present value against its rules.
///
/// Returns the value to store in place of the original when nested normalisation changed it.
fn check_value<V: Validator + ?Sized>(
    validator: &V,
    field: &str,
    rules: &FieldRules,
    value: &Value,
    document: &Document,
) -> Result<Option<Value>, Vec<FieldError>> {
    if value.is_null() {
        return if rules.nullable {
            Ok(None)
        } else {
            Err(vec!["null value not allowed".into()])
        };
    }

    if let Some(ty) = rules.ty
        && !ty.matches(value)
    {
        return Err(vec![format!("must be of {ty} type").into()]);
    }

    let mut errors: Vec<FieldError> = Vec::new();

    if let Some(allowed) = &rules.allowed {
        match value {
            Value::Array(elements) => {
                let unallowed: Vec<String> = elements
                    .iter()
                    .filter(|element| !allowed.contains(element))
                    .map(bare)
                    .collect();
                if !unallowed.is_empty() {
                    errors.push(format!("unallowed values [{}]", unallowed.join(", ")).into());
                }
            }
            _ if !allowed.contains(value) => {
                errors.push(format!("unallowed value {}", bare(value)).into());
            }
            _ => {}
        }
    }

    if let Some(n) = value.as_f64() {
        if let Some(min) = rules.min
            && n < min
        {
            errors.push(format!("min value is {min}").into());
        }
        if let Some(max) = rules.max
            && n > max
        {
            errors.push(format!("max value is {max}").into());
        }
    }

    if let Some(len) = length(value) {
        if let Some(minlength) = rules.minlength
            && len < minlength
        {
            errors.push(format!("min length is {minlength}").into());
        }
        if let Some(maxlength) = rules.maxlength
            && len > maxlength
        {
            errors.push(format!("max length is {maxlength}").into());
        }
    }

    let mut replacement = None;

    if let (Some(schema), Value::Object(members)) = (&rules.schema, value) {
        match run(validator, schema, members.clone()) {
            Ok(normalized) => replacement = Some(Value::Object(normalized)),
            Err(nested) => errors.push(nested.into()),
        }
    }

    if let (Some(item_rules), Value::Array(elements)) = (&rules.items, value) {
        let mut item_errors = ValidationErrors::new();
        let mut normalized = Vec::with_capacity(elements.len());
        for (i, element) in elements.iter().enumerate() {
            let index = i.to_string();
            let element = match &item_rules.coerce {
                Some(coercion) => match coerce(validator, coercion, element) {
                    Ok(coerced) => coerced,
                    Err(reason) => {
                        item_errors.add(index, format!("cannot be coerced: {reason}"));
                        continue;
                    }
                },
                None => element.clone(),
            };
            match check_value(validator, &index, item_rules, &element, document) {
                Ok(Some(replaced)) => normalized.push(replaced),
                Ok(None) => normalized.push(element),
                Err(element_errors) => item_errors.extend(index, element_errors),
            }
        }
        if item_errors.is_empty() {
            replacement = Some(Value::Array(normalized));
        } else {
            errors.push(item_errors.into());
        }
    }

    for (rule, constraint) in &rules.custom {
        let ctx = RuleContext {
            rule,
            constraint,
            field,
            value,
            document,
        };
        if let Err(message) = validator.check_rule(&ctx) {
            errors.push(message.into());
        }
    }

    if errors.is_empty() {
        Ok(replacement)
    } else {
        Err(errors)
    }
}

/// A value as it reads in a message: strings without their quotes.
fn bare(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn length(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(elements) => Some(elements.len()),
        Value::Object(members) => Some(members.len()),
        _ => None,
    }
}

fn coerce<V: Validator + ?Sized>(
    validator: &V,
    coercion: &Coercion,
    value: &Value,
) -> Result<Value, String> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    match coercion {
        Coercion::Integer => to_integer(value),
        Coercion::Float => to_float(value),
        Coercion::Boolean => to_boolean(value),
        Coercion::String => to_string(value),
        Coercion::Custom(name) => validator.coerce(name, value),
    }
}

fn to_integer(value: &Value) -> Result<Value, String> {
    match value {
        Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value.clone()),
        Value::Number(n) => match n.as_f64() {
            // i64::MAX as f64 rounds up to 2^63, which is already out of range.
            Some(f) if f.is_finite() && f.trunc() >= i64::MIN as f64 && f.trunc() < i64::MAX as f64 => {
                Ok(Value::from(f.trunc() as i64))
            }
            _ => Err(format!("{n} is out of integer range")),
        },
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|e| format!("invalid integer literal '{s}': {e}")),
        Value::Bool(b) => Ok(Value::from(i64::from(*b))),
        other => Err(format!("{} cannot be converted to integer", kind(other))),
    }
}

fn to_float(value: &Value) -> Result<Value, String> {
    let f = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => Some(
            s.trim()
                .parse::<f64>()
                .map_err(|e| format!("invalid float literal '{s}': {e}"))?,
        ),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        other => return Err(format!("{} cannot be converted to float", kind(other))),
    };
    f.and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| format!("{value} is not a finite float"))
}

fn to_boolean(value: &Value) -> Result<Value, String> {
    match value {
        Value::Bool(_) => Ok(value.clone()),
        Value::Number(n) => Ok(Value::Bool(n.as_f64().is_some_and(|f| f != 0.0))),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(Value::Bool(true)),
            "false" | "0" | "no" | "off" => Ok(Value::Bool(false)),
            _ => Err(format!("invalid boolean literal '{s}'")),
        },
        other => Err(format!("{} cannot be converted to boolean", kind(other))),
    }
}

fn to_string(value: &Value) -> Result<Value, String> {
    match value {
        Value::String(_) => Ok(value.clone()),
        Value::Number(n) => Ok(Value::String(n.to_string())),
        Value::Bool(b) => Ok(Value::String(b.to_string())),
        other => Err(format!("{} cannot be converted to string", kind(other))),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}
