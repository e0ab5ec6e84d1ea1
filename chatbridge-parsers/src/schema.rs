use schemars::JsonSchema;
use serde_json::{Map, Value};

/// Target shape of a structured generation.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectSchema {
    name: String,
    schema: Value,
}

impl ObjectSchema {
    pub fn new(name: impl Into<String>, schema: Value) -> Self {
        Self {
            name: sanitize_name(&name.into()),
            schema,
        }
    }

    pub fn for_type<T: JsonSchema>() -> Self {
        let schema = schemars::schema_for!(T);
        Self::new(T::schema_name(), Value::from(schema))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Value {
        &self.schema
    }

    /// Schema in the form accepted by strict structured-output decoding:
    /// every object closed to extra properties and listing all of its
    /// properties as required.
    pub fn to_provider_schema(&self) -> Value {
        let mut schema = self.schema.clone();
        if let Value::Object(map) = &mut schema {
            map.remove("$schema");
        }
        close_objects(&mut schema);
        schema
    }

    pub fn validate(&self, value: &Value) -> Result<(), String> {
        let validator = jsonschema::validator_for(&self.schema)
            .map_err(|e| format!("invalid schema {}: {}", self.name, e))?;
        validator.validate(value).map_err(|e| e.to_string())
    }
}

fn sanitize_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if sanitized.is_empty() {
        "response".to_string()
    } else {
        sanitized
    }
}

fn is_object_schema(map: &Map<String, Value>) -> bool {
    map.contains_key("properties")
        || map.get("type").and_then(Value::as_str) == Some("object")
}

// keywords whose value is a single schema, a list of schemas, or a map
// from names to schemas
const SCHEMA_KEYWORDS: &[&str] = &[
    "items",
    "additionalItems",
    "contains",
    "not",
    "if",
    "then",
    "else",
    "propertyNames",
];
const SCHEMA_LIST_KEYWORDS: &[&str] = &["anyOf", "oneOf", "allOf", "prefixItems"];
const SCHEMA_MAP_KEYWORDS: &[&str] = &["properties", "patternProperties", "$defs", "definitions"];

/// Walk a schema and close every object schema in it. Only schema positions
/// are visited, so a property that happens to be named `properties` or a
/// `default` value shaped like a schema is left alone.
fn close_objects(schema: &mut Value) {
    let Value::Object(map) = schema else {
        return;
    };

    if is_object_schema(map) {
        map.insert("additionalProperties".to_string(), Value::Bool(false));
        if let Some(Value::Object(properties)) = map.get("properties") {
            let required = properties
                .keys()
                .map(|key| Value::String(key.clone()))
                .collect();
            map.insert("required".to_string(), Value::Array(required));
        }
    }

    for keyword in SCHEMA_KEYWORDS {
        match map.get_mut(*keyword) {
            // draft-04 tuple form of `items`
            Some(Value::Array(schemas)) => schemas.iter_mut().for_each(close_objects),
            Some(child) => close_objects(child),
            None => {}
        }
    }
    for keyword in SCHEMA_LIST_KEYWORDS {
        if let Some(Value::Array(schemas)) = map.get_mut(*keyword) {
            schemas.iter_mut().for_each(close_objects);
        }
    }
    for keyword in SCHEMA_MAP_KEYWORDS {
        if let Some(Value::Object(schemas)) = map.get_mut(*keyword) {
            schemas.values_mut().for_each(close_objects);
        }
    }
}
