use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::mcp::tools::error::ToolError;
use crate::utils::error::McpError;

/// JSON type of a tool parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    /// A JSON string
    String,
    /// Any JSON number
    Number,
    /// A JSON number without fractional part
    Integer,
    /// `true` or `false`
    Boolean,
    /// A JSON object
    Object,
    /// A JSON array
    Array,
    /// No type constraint
    Any,
}

impl ParamType {
    /// Returns true if `value` is acceptable for this type.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Number => value.is_number(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Object => value.is_object(),
            ParamType::Array => value.is_array(),
            ParamType::Any => true,
        }
    }

    /// The JSON Schema name of this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::Integer => "integer",
            ParamType::Boolean => "boolean",
            ParamType::Object => "object",
            ParamType::Array => "array",
            ParamType::Any => "any",
        }
    }

    fn from_schema_name(name: &str) -> Option<Self> {
        match name {
            "string" => Some(ParamType::String),
            "number" => Some(ParamType::Number),
            "integer" => Some(ParamType::Integer),
            "boolean" => Some(ParamType::Boolean),
            "object" => Some(ParamType::Object),
            "array" => Some(ParamType::Array),
            _ => None,
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declaration of one tool parameter
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    /// Accepted JSON type
    pub param_type: ParamType,
    /// Whether the caller must supply the parameter
    pub required: bool,
    /// Value filled in when an optional parameter is absent
    pub default: Option<Value>,
    /// Human-readable description
    pub description: Option<String>,
}

impl ParamSpec {
    /// A required parameter of the given type.
    pub fn required(param_type: ParamType) -> Self {
        Self {
            param_type,
            required: true,
            default: None,
            description: None,
        }
    }

    /// An optional parameter, filled with `default` when absent.
    pub fn optional(param_type: ParamType, default: Option<Value>) -> Self {
        Self {
            param_type,
            required: false,
            default,
            description: None,
        }
    }

    /// Attaches a description.
    pub fn describe(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }
}

/// Mapping from parameter name to its declaration.
///
/// Serialized as a JSON Schema object so that it can be sent as the
/// `inputSchema` of a tool descriptor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(into = "Value", try_from = "Value")]
pub struct InputSchema {
    params: BTreeMap<String, ParamSpec>,
}

impl InputSchema {
    /// An empty schema: the tool takes no arguments.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parameter.
    pub fn param(mut self, name: &str, spec: ParamSpec) -> Self {
        self.params.insert(name.to_string(), spec);
        self
    }

    /// Looks up a parameter by name.
    pub fn get(&self, name: &str) -> Option<&ParamSpec> {
        self.params.get(name)
    }

    /// Iterates over the parameters in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamSpec)> {
        self.params.iter()
    }

    /// Names of the required parameters, in name order.
    pub fn required_names(&self) -> Vec<&str> {
        self.params
            .iter()
            .filter(|(_, spec)| spec.required)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Renders the schema as JSON Schema.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        for (name, spec) in &self.params {
            let mut property = Map::new();
            if spec.param_type != ParamType::Any {
                property.insert("type".to_string(), json!(spec.param_type.as_str()));
            }
            if let Some(description) = &spec.description {
                property.insert("description".to_string(), json!(description));
            }
            if let Some(default) = &spec.default {
                property.insert("default".to_string(), default.clone());
            }
            properties.insert(name.clone(), Value::Object(property));
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": self.required_names(),
        })
    }

    /// Reads a JSON Schema object as produced by [`InputSchema::to_json_schema`]
    /// or by another host. Unknown property types are accepted without constraint.
    pub fn from_json_schema(schema: &Value) -> Result<Self, McpError> {
        let object = schema.as_object().ok_or_else(|| {
            McpError::Deserialization("input schema must be a JSON object".to_string())
        })?;
        let required: Vec<&str> = object
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let mut params = BTreeMap::new();
        if let Some(properties) = object.get("properties") {
            let properties = properties.as_object().ok_or_else(|| {
                McpError::Deserialization("schema properties must be a JSON object".to_string())
            })?;
            for (name, property) in properties {
                let param_type = property
                    .get("type")
                    .and_then(Value::as_str)
                    .and_then(ParamType::from_schema_name)
                    .unwrap_or(ParamType::Any);
                params.insert(
                    name.clone(),
                    ParamSpec {
                        param_type,
                        required: required.contains(&name.as_str()),
                        default: property.get("default").cloned(),
                        description: property
                            .get("description")
                            .and_then(Value::as_str)
                            .map(str::to_string),
                    },
                );
            }
        }
        Ok(Self { params })
    }

    /// Checks `arguments` against the schema and fills in defaults.
    ///
    /// Absent arguments count as an empty object. An explicit `null` counts as
    /// absent. Undeclared arguments are dropped.
    pub fn validate(&self, arguments: Option<&Value>) -> Result<Map<String, Value>, ToolError> {
        let empty = Map::new();
        let supplied = match arguments {
            None | Some(Value::Null) => &empty,
            Some(Value::Object(map)) => map,
            Some(other) => {
                return Err(ToolError::InvalidArguments(format!(
                    "arguments must be a JSON object, got {}",
                    json_kind(other)
                )))
            }
        };

        let mut validated = Map::new();
        for (name, spec) in &self.params {
            match supplied.get(name).filter(|value| !value.is_null()) {
                Some(value) if !spec.param_type.matches(value) => {
                    return Err(ToolError::InvalidArguments(format!(
                        "parameter '{}' must be of type {}, got {}",
                        name,
                        spec.param_type,
                        json_kind(value)
                    )));
                }
                Some(value) => {
                    validated.insert(name.clone(), value.clone());
                }
                None if spec.required => {
                    return Err(ToolError::InvalidArguments(format!(
                        "missing required parameter '{}'",
                        name
                    )));
                }
                None => {
                    if let Some(default) = &spec.default {
                        validated.insert(name.clone(), default.clone());
                    }
                }
            }
        }
        Ok(validated)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl From<InputSchema> for Value {
    fn from(schema: InputSchema) -> Self {
        schema.to_json_schema()
    }
}

impl TryFrom<Value> for InputSchema {
    type Error = McpError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        InputSchema::from_json_schema(&value)
    }
}

/// Represents a single tool that can be invoked by a model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    /// Unique identifier for the tool
    pub name: String,

    /// Human-readable description of functionality
    pub description: String,

    /// Declared parameters
    pub input_schema: InputSchema,

    /// Optional properties describing tool behavior
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<HashMap<String, Value>>,
}

impl Tool {
    /// Creates a new tool with the given name, description, and input schema
    pub fn new(name: &str, description: &str, input_schema: InputSchema) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            input_schema,
            annotations: None,
        }
    }

    /// Adds an annotation to the tool
    pub fn with_annotation(mut self, key: &str, value: Value) -> Self {
        let annotations = self.annotations.get_or_insert_with(HashMap::new);
        annotations.insert(key.to_string(), value);
        self
    }
}

/// Represents different content types for tool results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ToolResultContent {
    /// Text content
    #[serde(rename = "text")]
    Text {
        /// The text content
        text: String,
    },
}

/// Represents the result of a tool execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    /// List of content items in the result
    pub content: Vec<ToolResultContent>,

    /// The returned value when it is not plain text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,

    /// Whether the tool execution resulted in an error
    #[serde(default)]
    pub is_error: bool,
}

impl ToolResult {
    /// Creates a new success result with text content
    pub fn text(text: &str) -> Self {
        Self {
            content: vec![ToolResultContent::Text {
                text: text.to_string(),
            }],
            structured_content: None,
            is_error: false,
        }
    }

    /// Wraps a tool's return value.
    ///
    /// Strings become text content. Any other value is kept as structured
    /// content with its JSON text as the text content.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::String(text) => Self::text(&text),
            other => Self {
                content: vec![ToolResultContent::Text {
                    text: other.to_string(),
                }],
                structured_content: Some(other),
                is_error: false,
            },
        }
    }

    /// The returned value: the structured content if present, otherwise the
    /// text content joined into one string.
    pub fn value(&self) -> Value {
        match &self.structured_content {
            Some(structured) => structured.clone(),
            None => Value::String(self.text_content()),
        }
    }

    /// The text content joined into one string.
    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .map(|ToolResultContent::Text { text }| text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
