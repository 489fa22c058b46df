//! Conversion of DynamoDB attribute-value maps into plain JSON

use serde_json::{Map, Number, Value};

use super::ParsingError;

/// Unmarshall a `NewImage`-style map (`{"Id": {"N": "101"}}`) into `{"Id": 101}`
pub fn unmarshall_image(image: &Value) -> Result<Value, ParsingError> {
    let attributes = image
        .as_object()
        .ok_or_else(|| ParsingError::Envelope("DynamoDB image is not an object".to_string()))?;

    attributes
        .iter()
        .map(|(name, attribute)| Ok((name.clone(), unmarshall_attribute(attribute)?)))
        .collect::<Result<Map<String, Value>, ParsingError>>()
        .map(Value::Object)
}

/// Unmarshall a single typed attribute value
pub fn unmarshall_attribute(attribute: &Value) -> Result<Value, ParsingError> {
    let (tag, inner) = attribute
        .as_object()
        .filter(|obj| obj.len() == 1)
        .and_then(|obj| obj.iter().next())
        .ok_or_else(|| invalid(attribute, "expected a single-key attribute value"))?;

    match (tag.as_str(), inner) {
        ("S", Value::String(s)) => Ok(Value::String(s.clone())),
        ("N", Value::String(n)) => parse_number(n),
        ("BOOL", Value::Bool(b)) => Ok(Value::Bool(*b)),
        ("NULL", Value::Bool(true)) => Ok(Value::Null),
        ("M", Value::Object(_)) => unmarshall_image(inner),
        ("L", Value::Array(items)) => items
            .iter()
            .map(unmarshall_attribute)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        ("SS", Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(|s| Value::String(s.to_string()))
                    .ok_or_else(|| invalid(item, "string set member is not a string"))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        ("NS", Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .ok_or_else(|| invalid(item, "number set member is not a string"))
                    .and_then(parse_number)
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        (tag, _) => Err(invalid(attribute, &format!("unsupported attribute type '{}'", tag))),
    }
}

fn parse_number(raw: &str) -> Result<Value, ParsingError> {
    if let Ok(int) = raw.parse::<i64>() {
        return Ok(Value::Number(int.into()));
    }
    raw.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| ParsingError::Envelope(format!("'{}' is not a DynamoDB number", raw)))
}

fn invalid(value: &Value, reason: &str) -> ParsingError {
    ParsingError::Envelope(format!("{}: {}", reason, value))
}
