use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::errors::SerenaError;

/// JSON Schema 定义
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum Schema {
    Object(SchemaObject),
    String(SchemaString),
    Integer(SchemaInteger),
    Boolean(SchemaBoolean),
}

impl Schema {
    pub fn validate(&self, value: &Value) -> std::result::Result<(), SerenaError> {
        match self {
            Schema::Object(obj) => obj.validate(value),
            Schema::String(s) => s.validate(value),
            Schema::Integer(i) => i.validate(value),
            Schema::Boolean(b) => b.validate(value),
        }
    }

    /// 转换为 MCP `inputSchema` 使用的标准 JSON Schema
    pub fn to_json_schema(&self) -> Value {
        match self {
            Schema::Object(obj) => obj.to_json_schema(),
            Schema::String(s) => {
                let mut schema = json!({ "type": "string" });
                if let Some(description) = &s.description {
                    schema["description"] = json!(description);
                }
                if let Some(values) = &s.enum_values {
                    schema["enum"] = json!(values);
                }
                schema
            }
            Schema::Integer(i) => {
                let mut schema = json!({ "type": "integer" });
                if let Some(description) = &i.description {
                    schema["description"] = json!(description);
                }
                if let Some(min) = i.minimum {
                    schema["minimum"] = json!(min);
                }
                if let Some(max) = i.maximum {
                    schema["maximum"] = json!(max);
                }
                schema
            }
            Schema::Boolean(b) => {
                let mut schema = json!({ "type": "boolean" });
                if let Some(description) = &b.description {
                    schema["description"] = json!(description);
                }
                schema
            }
        }
    }
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct SchemaObject {
    pub required: Vec<String>,
    pub properties: HashMap<String, Schema>,
    pub description: Option<String>,
}

impl SchemaObject {
    pub fn new(description: &str) -> Self {
        Self {
            description: Some(description.to_string()),
            ..Default::default()
        }
    }

    pub fn property(mut self, name: &str, schema: Schema) -> Self {
        self.properties.insert(name.to_string(), schema);
        self
    }

    pub fn required_property(mut self, name: &str, schema: Schema) -> Self {
        self.required.push(name.to_string());
        self.property(name, schema)
    }

    pub fn validate(&self, value: &Value) -> std::result::Result<(), SerenaError> {
        let obj = value
            .as_object()
            .ok_or_else(|| SerenaError::InvalidArgument("expected an object of arguments".to_string()))?;

        for req in &self.required {
            match obj.get(req) {
                None | Some(Value::Null) => return Err(SerenaError::MissingArgument(req.clone())),
                Some(_) => {}
            }
        }

        for (key, schema) in &self.properties {
            match obj.get(key) {
                None | Some(Value::Null) => {}
                Some(v) => schema.validate(v).map_err(|e| match e {
                    SerenaError::InvalidArgument(msg) => SerenaError::InvalidArgument(format!("{}: {}", key, msg)),
                    other => other,
                })?,
            }
        }

        Ok(())
    }

    fn to_json_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .properties
            .iter()
            .map(|(name, schema)| (name.clone(), schema.to_json_schema()))
            .collect();

        let mut schema = json!({
            "type": "object",
            "properties": properties,
            "required": self.required,
        });
        if let Some(description) = &self.description {
            schema["description"] = json!(description);
        }
        schema
    }
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct SchemaString {
    pub description: Option<String>,
    pub enum_values: Option<Vec<String>>,
}

impl SchemaString {
    pub fn described(description: &str) -> Schema {
        Schema::String(Self {
            description: Some(description.to_string()),
            enum_values: None,
        })
    }

    pub fn one_of(description: &str, values: &[&str]) -> Schema {
        Schema::String(Self {
            description: Some(description.to_string()),
            enum_values: Some(values.iter().map(|v| v.to_string()).collect()),
        })
    }

    pub fn validate(&self, value: &Value) -> std::result::Result<(), SerenaError> {
        let s = value
            .as_str()
            .ok_or_else(|| SerenaError::InvalidArgument("expected string".to_string()))?;

        if let Some(enum_values) = &self.enum_values {
            if !enum_values.iter().any(|v| v == s) {
                return Err(SerenaError::InvalidArgument(format!(
                    "value must be one of: {}",
                    enum_values.join(", ")
                )));
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct SchemaInteger {
    pub description: Option<String>,
    pub minimum: Option<i64>,
    pub maximum: Option<i64>,
}

impl SchemaInteger {
    pub fn validate(&self, value: &Value) -> std::result::Result<(), SerenaError> {
        let num = value
            .as_i64()
            .ok_or_else(|| SerenaError::InvalidArgument("expected integer".to_string()))?;

        if let Some(min) = self.minimum {
            if num < min {
                return Err(SerenaError::InvalidArgument(format!("value must be >= {}", min)));
            }
        }
        if let Some(max) = self.maximum {
            if num > max {
                return Err(SerenaError::InvalidArgument(format!("value must be <= {}", max)));
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct SchemaBoolean {
    pub description: Option<String>,
}

impl SchemaBoolean {
    pub fn described(description: &str) -> Schema {
        Schema::Boolean(Self {
            description: Some(description.to_string()),
        })
    }

    pub fn validate(&self, value: &Value) -> std::result::Result<(), SerenaError> {
        if !value.is_boolean() {
            return Err(SerenaError::InvalidArgument("expected boolean".to_string()));
        }
        Ok(())
    }
}

// Tool 的基础 trait 定义
#[async_trait]
pub trait MCPTool: Send + Sync {
    /// 获取工具名称
    fn name(&self) -> &str;

    /// 获取工具描述
    fn description(&self) -> &str;

    /// 获取工具参数Schema
    fn parameters_schema(&self) -> &Schema;

    /// 执行工具，参数已通过校验
    async fn execute(&self, params: Value) -> Result<Value>;

    /// 验证输入参数
    fn validate_params(&self, params: &Value) -> std::result::Result<(), SerenaError> {
        self.parameters_schema().validate(params)
    }
}

/// 读取可选的字符串参数，空字符串视为未提供
pub fn optional_str<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}
