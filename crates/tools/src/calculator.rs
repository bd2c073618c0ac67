//! Calculator tool: applies one arithmetic operation to two numbers.
//!
//! Parameters: `operation` (`add`, `subtract`, `multiply`, `divide`, or the
//! symbols `+ - * /`), `a`, `b`. Numbers may be JSON numbers or numeric
//! strings. Integral results are returned as JSON integers.

use async_trait::async_trait;
use ponder_core::error::ToolError;
use ponder_core::tool::{Tool, ToolParams};
use serde_json::Value;

pub struct CalculatorTool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl Operation {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "add" | "plus" | "sum" | "+" => Some(Self::Add),
            "subtract" | "sub" | "minus" | "-" => Some(Self::Subtract),
            "multiply" | "mul" | "times" | "*" | "x" => Some(Self::Multiply),
            "divide" | "div" | "/" => Some(Self::Divide),
            _ => None,
        }
    }

    pub fn apply(self, a: f64, b: f64) -> Result<f64, String> {
        match self {
            Self::Add => Ok(a + b),
            Self::Subtract => Ok(a - b),
            Self::Multiply => Ok(a * b),
            Self::Divide if b == 0.0 => Err("Division by zero".into()),
            Self::Divide => Ok(a / b),
        }
    }
}

fn number_arg(params: &ToolParams, key: &str) -> Result<f64, ToolError> {
    match params.get(key) {
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| ToolError::InvalidArguments(format!("'{key}' is not a finite number"))),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map_err(|_| ToolError::InvalidArguments(format!("'{key}' is not a number: {s}"))),
        Some(other) => Err(ToolError::InvalidArguments(format!(
            "'{key}' must be a number, got {other}"
        ))),
        None => Err(ToolError::InvalidArguments(format!("Missing '{key}' argument"))),
    }
}

/// Integral results become JSON integers so `2 + 2` reads as `4`, not `4.0`.
fn to_json_number(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        Value::from(value as i64)
    } else {
        Value::from(value)
    }
}

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Apply an arithmetic operation (add, subtract, multiply, divide) to two numbers a and b."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "operation": {
                    "type": "string",
                    "enum": ["add", "subtract", "multiply", "divide"],
                    "description": "The operation to apply"
                },
                "a": { "type": "number", "description": "Left operand" },
                "b": { "type": "number", "description": "Right operand" }
            },
            "required": ["operation", "a", "b"]
        })
    }

    async fn invoke(&self, params: ToolParams) -> Result<Value, ToolError> {
        let op_name = params
            .get("operation")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'operation' argument".into()))?;
        let op = Operation::parse(op_name).ok_or_else(|| {
            ToolError::InvalidArguments(format!("Unknown operation: {op_name}"))
        })?;
        let a = number_arg(&params, "a")?;
        let b = number_arg(&params, "b")?;

        let value = op.apply(a, b).map_err(|reason| ToolError::ExecutionFailed {
            tool_name: self.name().into(),
            reason,
        })?;
        tracing::debug!(?op, a, b, value, "Calculator evaluated");
        Ok(to_json_number(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(v: Value) -> ToolParams {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn adds_integers() {
        let out = CalculatorTool
            .invoke(params(json!({"operation": "add", "a": 2, "b": 2})))
            .await
            .unwrap();
        assert_eq!(out, json!(4));
        assert_eq!(out.to_string(), "4");
    }

    #[tokio::test]
    async fn symbols_and_strings_accepted() {
        let out = CalculatorTool
            .invoke(params(json!({"operation": "*", "a": "3", "b": 2.5})))
            .await
            .unwrap();
        assert_eq!(out, json!(7.5));
    }

    #[tokio::test]
    async fn division() {
        let out = CalculatorTool
            .invoke(params(json!({"operation": "divide", "a": 10, "b": 4})))
            .await
            .unwrap();
        assert_eq!(out, json!(2.5));
    }

    #[tokio::test]
    async fn division_by_zero_fails() {
        let err = CalculatorTool
            .invoke(params(json!({"operation": "divide", "a": 1, "b": 0})))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Division by zero"));
    }

    #[tokio::test]
    async fn unknown_operation_rejected() {
        let err = CalculatorTool
            .invoke(params(json!({"operation": "pow", "a": 2, "b": 3})))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn missing_operand_rejected() {
        let err = CalculatorTool
            .invoke(params(json!({"operation": "add", "a": 2})))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("'b'"));
    }

    #[test]
    fn operation_aliases() {
        assert_eq!(Operation::parse("Plus"), Some(Operation::Add));
        assert_eq!(Operation::parse(" - "), Some(Operation::Subtract));
        assert_eq!(Operation::parse("modulo"), None);
    }

    #[test]
    fn tool_definition() {
        let def = CalculatorTool.to_definition();
        assert_eq!(def.name, "calculator");
        assert_eq!(def.parameters["required"], json!(["operation", "a", "b"]));
    }
}
