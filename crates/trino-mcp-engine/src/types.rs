//! Engine type signatures and value coercion.
//!
//! Trino reports each column's type as a signature string such as
//! `decimal(10,2)`, `array(map(varchar, bigint))` or
//! `row(name varchar, "home address" row(city varchar))`. Values arrive as
//! JSON, but not always in a shape a client can use directly: rows are
//! positional arrays, decimals are strings, and new engine types appear over
//! time. Coercion maps every value onto strings, numbers, booleans, null, or
//! nested arrays/objects of those. It never fails: anything it does not
//! understand is stringified.

use serde_json::{Map, Value};

/// Parsed column type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineType {
    Boolean,
    /// tinyint, smallint, integer, bigint
    Integer,
    /// real, double
    Float,
    /// decimal(p, s); kept as text to preserve precision
    Decimal,
    /// varchar, char, temporal types, uuid, json, varbinary and friends
    Text,
    Array(Box<EngineType>),
    Map(Box<EngineType>, Box<EngineType>),
    Row(Vec<RowField>),
    /// Anything else, with the original signature.
    Other(String),
}

/// One field of a `row(...)` type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowField {
    pub name: Option<String>,
    pub field_type: EngineType,
}

impl EngineType {
    /// Parse a Trino type signature. Unknown signatures become [`EngineType::Other`].
    pub fn parse(signature: &str) -> Self {
        let signature = signature.trim();
        let Some(open) = signature.find('(') else {
            return Self::from_base(signature, signature);
        };

        let base = signature[..open].trim().to_ascii_lowercase();
        let Some(close) = matching_paren(signature, open) else {
            return EngineType::Other(signature.to_string());
        };
        let args = &signature[open + 1..close];

        match base.as_str() {
            "array" => EngineType::Array(Box::new(Self::parse(args))),
            "map" => {
                let parts = split_top_level(args);
                match parts.as_slice() {
                    [key, value] => {
                        EngineType::Map(Box::new(Self::parse(key)), Box::new(Self::parse(value)))
                    }
                    _ => EngineType::Other(signature.to_string()),
                }
            }
            "row" => EngineType::Row(split_top_level(args).into_iter().map(parse_row_field).collect()),
            _ => Self::from_base(&base, signature),
        }
    }

    fn from_base(base: &str, signature: &str) -> Self {
        let base = base.to_ascii_lowercase();
        match base.as_str() {
            "boolean" => EngineType::Boolean,
            "tinyint" | "smallint" | "integer" | "int" | "bigint" => EngineType::Integer,
            "real" | "double" | "double precision" | "float" => EngineType::Float,
            "decimal" | "numeric" => EngineType::Decimal,
            "varchar" | "char" | "varbinary" | "json" | "uuid" | "ipaddress" | "ipprefix"
            | "date" => EngineType::Text,
            b if b.starts_with("time") || b.starts_with("interval") => EngineType::Text,
            _ => EngineType::Other(signature.to_string()),
        }
    }

    fn is_known(&self) -> bool {
        !matches!(self, EngineType::Other(_))
    }
}

/// Find the index of the `)` matching the `(` at `open`.
fn matching_paren(s: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_quotes = false;
    for (i, c) in s.char_indices().skip_while(|(i, _)| *i < open) {
        match c {
            '"' => in_quotes = !in_quotes,
            '(' if !in_quotes => depth += 1,
            ')' if !in_quotes => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Split on commas that are not nested inside parentheses or quotes.
fn split_top_level(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut in_quotes = false;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            '(' if !in_quotes => depth += 1,
            ')' if !in_quotes => depth = depth.saturating_sub(1),
            ',' if !in_quotes && depth == 0 => {
                parts.push(s[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    let last = s[start..].trim();
    if !last.is_empty() {
        parts.push(last);
    }
    parts
}

fn parse_row_field(field: &str) -> RowField {
    let field = field.trim();

    if let Some(rest) = field.strip_prefix('"') {
        // Quoted name; "" is an escaped quote.
        let mut name = String::new();
        let mut chars = rest.char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            if c == '"' {
                if matches!(chars.peek(), Some((_, '"'))) {
                    name.push('"');
                    chars.next();
                    continue;
                }
                return RowField {
                    name: Some(name),
                    field_type: EngineType::parse(&rest[i + 1..]),
                };
            }
            name.push(c);
        }
        return RowField {
            name: None,
            field_type: EngineType::Other(field.to_string()),
        };
    }

    if let Some((head, tail)) = field.split_once(char::is_whitespace)
        && !head.contains('(')
    {
        let field_type = EngineType::parse(tail);
        // An unnamed multi-word type such as `double precision` reads as a
        // known type as a whole but not after its first word.
        if !field_type.is_known() && EngineType::parse(field).is_known() {
            return RowField {
                name: None,
                field_type: EngineType::parse(field),
            };
        }
        return RowField {
            name: Some(head.to_string()),
            field_type,
        };
    }

    RowField {
        name: None,
        field_type: EngineType::parse(field),
    }
}

/// Coerce one engine value into a transport-safe JSON value.
pub fn coerce(value: Value, ty: &EngineType) -> Value {
    if value.is_null() {
        return Value::Null;
    }

    match ty {
        EngineType::Boolean => match value {
            Value::Bool(_) => value,
            Value::String(s) if s.eq_ignore_ascii_case("true") => Value::Bool(true),
            Value::String(s) if s.eq_ignore_ascii_case("false") => Value::Bool(false),
            other => stringify(other),
        },
        EngineType::Integer => match value {
            Value::Number(_) => value,
            Value::String(s) => match s.trim().parse::<i64>() {
                Ok(n) => Value::from(n),
                Err(_) => Value::String(s),
            },
            other => stringify(other),
        },
        // NaN and the infinities arrive as strings and stay that way.
        EngineType::Float => match value {
            Value::Number(_) | Value::String(_) => value,
            other => stringify(other),
        },
        EngineType::Decimal | EngineType::Text => stringify(value),
        EngineType::Array(inner) => match value {
            Value::Array(items) => {
                Value::Array(items.into_iter().map(|v| coerce(v, inner)).collect())
            }
            other => stringify(other),
        },
        EngineType::Map(_, value_type) => match value {
            Value::Object(entries) => Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, coerce(v, value_type)))
                    .collect(),
            ),
            other => stringify(other),
        },
        EngineType::Row(fields) => match value {
            Value::Array(items) => {
                let mut object = Map::with_capacity(items.len());
                for (i, item) in items.into_iter().enumerate() {
                    let (key, coerced) = match fields.get(i) {
                        Some(field) => (
                            field.name.clone().unwrap_or_else(|| i.to_string()),
                            coerce(item, &field.field_type),
                        ),
                        None => (i.to_string(), passthrough(item)),
                    };
                    object.insert(key, coerced);
                }
                Value::Object(object)
            }
            Value::Object(entries) => Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| {
                        let field_type = fields
                            .iter()
                            .find(|f| f.name.as_deref() == Some(k.as_str()))
                            .map(|f| &f.field_type);
                        let v = match field_type {
                            Some(t) => coerce(v, t),
                            None => passthrough(v),
                        };
                        (k, v)
                    })
                    .collect(),
            ),
            other => stringify(other),
        },
        EngineType::Other(_) => passthrough(value),
    }
}

/// Coerce a full row against the column types.
pub fn coerce_row(row: Vec<Value>, types: &[EngineType]) -> Vec<Value> {
    row.into_iter()
        .enumerate()
        .map(|(i, v)| match types.get(i) {
            Some(t) => coerce(v, t),
            None => passthrough(v),
        })
        .collect()
}

/// Primitives pass through untouched; composites of unknown type are stringified.
fn passthrough(value: Value) -> Value {
    match value {
        Value::Array(_) | Value::Object(_) => stringify(value),
        primitive => primitive,
    }
}

fn stringify(value: Value) -> Value {
    match value {
        Value::String(_) => value,
        other => Value::String(other.to_string()),
    }
}
