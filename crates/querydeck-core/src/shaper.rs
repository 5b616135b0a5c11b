//! Response payload shaping
//!
//! Trims result documents before they leave the layer. Precedence when
//! several options are set: include list > exclude list > essential preset.

use serde_json::{Map, Value};

/// Fields kept by the essential preset
pub const ESSENTIAL_FIELDS: &[&str] = &["_id", "title", "status", "createdAt", "updatedAt"];

/// Key under which a store document wrapper nests the plain object
const DOCUMENT_WRAPPER_KEY: &str = "_doc";

/// Field selection for [`shape`]
///
/// Empty include/exclude lists count as unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShapeOptions {
    pub include_fields: Vec<String>,
    pub exclude_fields: Vec<String>,
    pub limit_fields: bool,
}

impl ShapeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn exclude<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn essential(mut self) -> Self {
        self.limit_fields = true;
        self
    }

    /// Parse comma-separated lists as they arrive in a query string
    pub fn from_lists(include: Option<&str>, exclude: Option<&str>, limit_fields: bool) -> Self {
        fn split(list: Option<&str>) -> Vec<String> {
            list.map(|l| {
                l.split(',')
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
        }

        Self {
            include_fields: split(include),
            exclude_fields: split(exclude),
            limit_fields,
        }
    }

    pub fn is_passthrough(&self) -> bool {
        self.include_fields.is_empty() && self.exclude_fields.is_empty() && !self.limit_fields
    }
}

/// Shape a single document or each element of an array
///
/// Non-object values (and non-object array elements) pass through unchanged.
pub fn shape(data: Value, options: &ShapeOptions) -> Value {
    match data {
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| shape_one(item, options))
                .collect(),
        ),
        other => shape_one(other, options),
    }
}

fn shape_one(value: Value, options: &ShapeOptions) -> Value {
    let Value::Object(object) = value else {
        return value;
    };
    let object = unwrap_document(object);

    let shaped = if !options.include_fields.is_empty() {
        pick(object, options.include_fields.iter().map(String::as_str))
    } else if !options.exclude_fields.is_empty() {
        let mut object = object;
        for field in &options.exclude_fields {
            object.remove(field);
        }
        object
    } else if options.limit_fields {
        pick(object, ESSENTIAL_FIELDS.iter().copied())
    } else {
        object
    };

    Value::Object(shaped)
}

fn pick<'a>(mut object: Map<String, Value>, fields: impl Iterator<Item = &'a str>) -> Map<String, Value> {
    let mut out = Map::new();
    for field in fields {
        if let Some(value) = object.remove(field) {
            out.insert(field.to_string(), value);
        }
    }
    out
}

/// Strip a store document wrapper down to the plain object
fn unwrap_document(mut object: Map<String, Value>) -> Map<String, Value> {
    match object.remove(DOCUMENT_WRAPPER_KEY) {
        Some(Value::Object(inner)) => inner,
        Some(other) => {
            object.insert(DOCUMENT_WRAPPER_KEY.to_string(), other);
            object
        }
        None => object,
    }
}
