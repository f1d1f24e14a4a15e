use crate::tool::{ToolError, ToolHandler, ToolInput, ToolSpec};
use async_trait::async_trait;
use broker_core::Payload;
use serde_json::{json, Number, Value};

pub const PROVIDER_ID: &str = "math";

const OPERATIONS: [(&str, &str); 4] = [
    ("add", "Adds b to a"),
    ("subtract", "Subtracts b from a"),
    ("multiply", "Multiplies a by b"),
    ("divide", "Divides a by b"),
];

/// Arithmetic over two numeric arguments `a` and `b`.
pub struct MathTools;

impl MathTools {
    fn operand(input: &ToolInput, key: &str) -> Result<Number, ToolError> {
        match input.arguments.get(key) {
            Some(Value::Number(n)) => Ok(n.clone()),
            Some(other) => Err(ToolError::new(
                input.name.clone(),
                format!("Argument '{key}' must be a number, got {other}"),
            )),
            None => Err(ToolError::new(
                input.name.clone(),
                format!("Argument '{key}' not found"),
            )),
        }
    }

    fn compute(op: &str, a: &Number, b: &Number) -> Result<Value, String> {
        if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
            let exact = match op {
                "add" => a.checked_add(b),
                "subtract" => a.checked_sub(b),
                "multiply" => a.checked_mul(b),
                "divide" if b == 0 => return Err("division by zero".to_string()),
                "divide" if a.checked_rem(b) == Some(0) => a.checked_div(b),
                _ => None,
            };
            if let Some(value) = exact {
                return Ok(Value::from(value));
            }
        }

        let (a, b) = match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => (a, b),
            _ => return Err("operands are not representable as numbers".to_string()),
        };
        let value = match op {
            "add" => a + b,
            "subtract" => a - b,
            "multiply" => a * b,
            "divide" if b == 0.0 => return Err("division by zero".to_string()),
            "divide" => a / b,
            other => return Err(format!("unsupported operation '{other}'")),
        };

        Number::from_f64(value)
            .map(Value::Number)
            .ok_or_else(|| "result is not a finite number".to_string())
    }
}

#[async_trait]
impl ToolHandler for MathTools {
    fn provider_id(&self) -> &str {
        PROVIDER_ID
    }

    fn tools(&self) -> Vec<ToolSpec> {
        OPERATIONS
            .iter()
            .map(|(name, description)| ToolSpec {
                name: name.to_string(),
                description: description.to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "a": {"type": "number"},
                        "b": {"type": "number"}
                    },
                    "required": ["a", "b"]
                }),
            })
            .collect()
    }

    async fn call(&self, input: ToolInput) -> Result<Payload, ToolError> {
        self.validate_input(&input)?;

        let a = Self::operand(&input, "a")?;
        let b = Self::operand(&input, "b")?;
        let result = Self::compute(&input.name, &a, &b)
            .map_err(|message| ToolError::new(input.name.clone(), message))?;

        Ok(Payload::Object(
            [("result".to_string(), result)].into_iter().collect(),
        ))
    }
}
