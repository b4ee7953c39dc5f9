use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CellError;
use crate::format::StyleId;

/// A single cell value as seen by readers
///
/// Serializes untagged: `null`, a number, a string, a boolean, or the error literal.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Scalar {
    #[default]
    Empty,
    Number(f64),
    Text(String),
    Boolean(bool),
    Error(CellError),
}

impl Scalar {
    /// Build a number, normalizing NaN and infinities to `Empty`
    pub fn number(n: f64) -> Self {
        if n.is_finite() {
            Scalar::Number(n)
        } else {
            Scalar::Empty
        }
    }

    /// Coerce an arbitrary JSON payload into a scalar
    ///
    /// Rich objects that carry a display string (`text` or `display`) collapse to that string;
    /// any other composite is stringified as JSON.
    pub fn from_json(value: &serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Null => Scalar::Empty,
            Value::Bool(b) => Scalar::Boolean(*b),
            Value::Number(n) => n.as_f64().map(Scalar::number).unwrap_or_default(),
            Value::String(s) => match CellError::from_literal(s) {
                Some(err) => Scalar::Error(err),
                None => Scalar::Text(s.clone()),
            },
            Value::Object(map) => {
                let display = map
                    .get("text")
                    .or_else(|| map.get("display"))
                    .and_then(Value::as_str);
                match display {
                    Some(s) => Scalar::Text(s.to_string()),
                    None => Scalar::Text(value.to_string()),
                }
            }
            Value::Array(_) => Scalar::Text(value.to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Scalar::Empty)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Scalar::Error(_))
    }

    /// Try to get the value as a number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Scalar::Number(n) => Some(*n),
            Scalar::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            Scalar::Text(s) => s.trim().parse().ok(),
            Scalar::Empty => Some(0.0),
            Scalar::Error(_) => None,
        }
    }

    /// Display text for the value
    pub fn as_text(&self) -> String {
        match self {
            Scalar::Empty => String::new(),
            Scalar::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            Scalar::Text(s) => s.clone(),
            Scalar::Boolean(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            Scalar::Error(e) => e.to_string(),
        }
    }
}

impl From<f64> for Scalar {
    fn from(n: f64) -> Self {
        Scalar::number(n)
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Boolean(b)
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::Text(s.to_string())
    }
}

impl From<CellError> for Scalar {
    fn from(e: CellError) -> Self {
        Scalar::Error(e)
    }
}

impl Serialize for Scalar {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Scalar::Empty => serializer.serialize_none(),
            Scalar::Number(n) => serializer.serialize_f64(*n),
            Scalar::Text(s) => serializer.serialize_str(s),
            Scalar::Boolean(b) => serializer.serialize_bool(*b),
            Scalar::Error(e) => serializer.serialize_str(e.literal()),
        }
    }
}

impl<'de> Deserialize<'de> for Scalar {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        Ok(Scalar::from_json(&raw))
    }
}

/// Classified user input: either a literal value or formula text
#[derive(Debug, Clone, PartialEq)]
pub enum CellContent {
    Value(Scalar),
    /// Formula text including the leading `=`
    Formula(String),
}

/// A stored cell
///
/// When `formula` is set, `value` is only the cached result of that formula (possibly `Empty`,
/// meaning "not computed yet"); the formula is what identifies the content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    #[serde(default)]
    pub value: Scalar,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    #[serde(default)]
    pub style_id: StyleId,
}

impl Cell {
    /// Create a cell holding a literal value
    pub fn value(value: impl Into<Scalar>) -> Self {
        Cell {
            value: value.into(),
            ..Cell::default()
        }
    }

    /// Create a cell holding a formula with no cached result
    pub fn formula(expression: impl Into<String>) -> Self {
        Cell {
            formula: Some(expression.into()),
            ..Cell::default()
        }
    }

    /// Builder pattern: attach a cached formula result
    pub fn with_cached_value(mut self, value: impl Into<Scalar>) -> Self {
        self.value = value.into();
        self
    }

    /// Builder pattern: set the explicit style id
    pub fn with_style(mut self, style_id: StyleId) -> Self {
        self.style_id = style_id;
        self
    }

    pub fn has_formula(&self) -> bool {
        self.formula.is_some()
    }

    /// True when the cell carries no content and no style
    pub fn is_empty(&self) -> bool {
        self.value.is_empty() && self.formula.is_none() && self.style_id == 0
    }
}

/// Parse user input to determine cell content type
pub fn parse_cell_input(input: &str) -> CellContent {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return CellContent::Value(Scalar::Empty);
    }

    if trimmed.starts_with('=') {
        return CellContent::Formula(trimmed.to_string());
    }

    match trimmed.to_uppercase().as_str() {
        "TRUE" => return CellContent::Value(Scalar::Boolean(true)),
        "FALSE" => return CellContent::Value(Scalar::Boolean(false)),
        _ => {}
    }

    if let Some(err) = CellError::from_literal(trimmed) {
        return CellContent::Value(Scalar::Error(err));
    }

    if let Ok(num) = trimmed.parse::<f64>() {
        return CellContent::Value(Scalar::number(num));
    }

    if let Some(pct) = trimmed.strip_suffix('%') {
        if let Ok(num) = pct.trim().parse::<f64>() {
            return CellContent::Value(Scalar::number(num / 100.0));
        }
    }

    CellContent::Value(Scalar::Text(trimmed.to_string()))
}
