//! Demonstration tools served by the `tool-host` binary.
//!
//! Arithmetic on two integers stays integral (`15 + 27` gives `42`); any
//! float operand, or an integer overflow, switches to floating point.
//! Domain-level failures such as division by zero are returned as
//! `"Error: ..."` strings, the way a calculator would print them, while
//! malformed input fails the call.

use anyhow::{anyhow, Context};
use chrono::Local;
use serde_json::{json, Number, Value};

use crate::mcp::tools::{InputSchema, ParamSpec, ParamType, Tool, ToolArguments, ToolRegistry};
use crate::utils::error::McpResult;

/// Greeting language used when none is given
pub const DEFAULT_LANGUAGE: &str = "es";

/// Format of `current-datetime`
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Builds a registry holding every builtin tool
pub fn builtin_registry() -> McpResult<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    register_builtin_tools(&mut registry)?;
    Ok(registry)
}

/// Adds the builtin tools to `registry`
pub fn register_builtin_tools(registry: &mut ToolRegistry) -> McpResult<()> {
    registry.register_fn(
        Tool::new("sum-two-numbers", "Adds two numbers", two_numbers()),
        |args| arithmetic(args, i64::checked_add, |a, b| a + b),
    )?;
    registry.register_fn(
        Tool::new("multiply-two-numbers", "Multiplies two numbers", two_numbers()),
        |args| arithmetic(args, i64::checked_mul, |a, b| a * b),
    )?;
    registry.register_fn(
        Tool::new(
            "power",
            "Raises a base to an exponent",
            InputSchema::new()
                .param("base", number("Base"))
                .param("exponent", number("Exponent")),
        ),
        power,
    )?;
    registry.register_fn(
        Tool::new(
            "count-words",
            "Counts the whitespace-separated words of a text",
            InputSchema::new().param("text", text("Text to analyse")),
        ),
        |args| Ok(json!(string_arg(args, "text")?.split_whitespace().count())),
    )?;
    registry.register_fn(
        Tool::new(
            "to-uppercase",
            "Converts a text to upper case",
            InputSchema::new().param("text", text("Text to convert")),
        ),
        |args| Ok(json!(string_arg(args, "text")?.to_uppercase())),
    )?;
    registry.register_fn(
        Tool::new(
            "greet",
            "Greets someone in Spanish, English or French",
            InputSchema::new()
                .param("name", text("Name of the person to greet"))
                .param(
                    "language",
                    ParamSpec::optional(ParamType::String, Some(json!(DEFAULT_LANGUAGE)))
                        .describe("Greeting language (es, en, fr)"),
                ),
        ),
        greet,
    )?;
    registry.register_fn(
        Tool::new(
            "current-datetime",
            "Returns the local date and time",
            InputSchema::new(),
        ),
        |_| Ok(json!(Local::now().format(DATETIME_FORMAT).to_string())),
    )?;
    registry.register_fn(
        Tool::new(
            "calculate",
            "Applies a basic arithmetic operation to two numbers",
            InputSchema::new()
                .param(
                    "operation",
                    text("One of add, subtract, multiply, divide"),
                )
                .param("a", number("First operand"))
                .param("b", number("Second operand")),
        )
        .with_annotation("readOnlyHint", json!(true)),
        calculate,
    )?;
    Ok(())
}

fn number(description: &str) -> ParamSpec {
    ParamSpec::required(ParamType::Number).describe(description)
}

fn text(description: &str) -> ParamSpec {
    ParamSpec::required(ParamType::String).describe(description)
}

fn two_numbers() -> InputSchema {
    InputSchema::new()
        .param("a", number("First number"))
        .param("b", number("Second number"))
}

fn value_arg<'a>(args: &'a ToolArguments, name: &str) -> anyhow::Result<&'a Value> {
    args.get(name)
        .ok_or_else(|| anyhow!("missing argument '{}'", name))
}

fn float_arg(args: &ToolArguments, name: &str) -> anyhow::Result<f64> {
    value_arg(args, name)?
        .as_f64()
        .with_context(|| format!("argument '{}' is not a number", name))
}

fn string_arg<'a>(args: &'a ToolArguments, name: &str) -> anyhow::Result<&'a str> {
    value_arg(args, name)?
        .as_str()
        .with_context(|| format!("argument '{}' is not a string", name))
}

fn float_value(value: f64) -> anyhow::Result<Value> {
    Number::from_f64(value)
        .map(Value::Number)
        .ok_or_else(|| anyhow!("result {} is not a finite number", value))
}

fn arithmetic(
    args: &ToolArguments,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> anyhow::Result<Value> {
    let (a, b) = (value_arg(args, "a")?, value_arg(args, "b")?);
    if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
        if let Some(result) = int_op(a, b) {
            return Ok(json!(result));
        }
    }
    float_value(float_op(float_arg(args, "a")?, float_arg(args, "b")?))
}

fn power(args: &ToolArguments) -> anyhow::Result<Value> {
    let base = float_arg(args, "base")?;
    let exponent = float_arg(args, "exponent")?;
    let result = base.powf(exponent);
    if result.is_infinite() {
        return Ok(json!(format!(
            "Error: the result of {}^{} is too large",
            base, exponent
        )));
    }
    if result.is_nan() {
        return Ok(json!(format!(
            "Error: {}^{} is not a real number",
            base, exponent
        )));
    }
    float_value(result)
}

fn greet(args: &ToolArguments) -> anyhow::Result<Value> {
    let name = string_arg(args, "name")?;
    let language = args
        .get("language")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_LANGUAGE);
    let greeting = match language {
        "en" => format!("Hello {}!", name),
        "fr" => format!("Bonjour {}!", name),
        _ => format!("¡Hola {}!", name),
    };
    Ok(json!(greeting))
}

fn calculate(args: &ToolArguments) -> anyhow::Result<Value> {
    match string_arg(args, "operation")? {
        "add" => arithmetic(args, i64::checked_add, |a, b| a + b),
        "subtract" => arithmetic(args, i64::checked_sub, |a, b| a - b),
        "multiply" => arithmetic(args, i64::checked_mul, |a, b| a * b),
        "divide" => {
            let divisor = float_arg(args, "b")?;
            if divisor == 0.0 {
                return Ok(json!("Error: cannot divide by zero"));
            }
            float_value(float_arg(args, "a")? / divisor)
        }
        other => Ok(json!(format!("Error: invalid operation '{}'", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::tools::ToolErrorKind;
    use proptest::prelude::*;

    async fn call(name: &str, arguments: Value) -> Value {
        builtin_registry()
            .unwrap()
            .invoke(name, Some(&arguments))
            .await
            .unwrap()
            .value()
    }

    #[tokio::test]
    async fn integer_arithmetic_stays_integral() {
        assert_eq!(call("sum-two-numbers", json!({"a": 15, "b": 27})).await, json!(42));
        assert_eq!(call("multiply-two-numbers", json!({"a": 8, "b": 7})).await, json!(56));
        assert_eq!(call("sum-two-numbers", json!({"a": 1.5, "b": 2})).await, json!(3.5));
    }

    #[tokio::test]
    async fn overflow_falls_back_to_float() {
        let result = call("sum-two-numbers", json!({"a": i64::MAX, "b": 1})).await;
        assert!(result.is_f64());
    }

    #[tokio::test]
    async fn text_tools() {
        assert_eq!(
            call("count-words", json!({"text": "  el  texto tiene cuatro "})).await,
            json!(4)
        );
        assert_eq!(call("count-words", json!({"text": ""})).await, json!(0));
        assert_eq!(call("to-uppercase", json!({"text": "hola"})).await, json!("HOLA"));
    }

    #[tokio::test]
    async fn greeting_defaults_to_spanish() {
        assert_eq!(call("greet", json!({"name": "Ana"})).await, json!("¡Hola Ana!"));
        assert_eq!(
            call("greet", json!({"name": "Ana", "language": "en"})).await,
            json!("Hello Ana!")
        );
        assert_eq!(
            call("greet", json!({"name": "Ana", "language": "de"})).await,
            json!("¡Hola Ana!")
        );
    }

    #[tokio::test]
    async fn power_reports_overflow_as_text() {
        assert_eq!(call("power", json!({"base": 2, "exponent": 10})).await, json!(1024.0));
        let too_large = call("power", json!({"base": 10, "exponent": 400})).await;
        assert!(too_large.as_str().unwrap().starts_with("Error:"));
    }

    #[tokio::test]
    async fn calculator_operations() {
        assert_eq!(
            call("calculate", json!({"operation": "subtract", "a": 10, "b": 4})).await,
            json!(6)
        );
        assert_eq!(
            call("calculate", json!({"operation": "divide", "a": 7, "b": 2})).await,
            json!(3.5)
        );
        assert_eq!(
            call("calculate", json!({"operation": "divide", "a": 7, "b": 0})).await,
            json!("Error: cannot divide by zero")
        );
        assert_eq!(
            call("calculate", json!({"operation": "modulo", "a": 7, "b": 2})).await,
            json!("Error: invalid operation 'modulo'")
        );
    }

    #[tokio::test]
    async fn current_datetime_has_fixed_shape() {
        let value = call("current-datetime", json!({})).await;
        let text = value.as_str().unwrap();
        assert!(chrono::NaiveDateTime::parse_from_str(text, DATETIME_FORMAT).is_ok());
    }

    #[tokio::test]
    async fn missing_operand_is_invalid_arguments() {
        let err = builtin_registry()
            .unwrap()
            .invoke("sum-two-numbers", Some(&json!({"a": 1})))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ToolErrorKind::InvalidArguments);
    }

    #[test]
    fn registry_is_sorted_and_complete() {
        let names: Vec<String> = builtin_registry()
            .unwrap()
            .list_tools()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(
            names,
            [
                "calculate",
                "count-words",
                "current-datetime",
                "greet",
                "multiply-two-numbers",
                "power",
                "sum-two-numbers",
                "to-uppercase",
            ]
        );
    }

    proptest! {
        #[test]
        fn integer_sum_matches_i64_addition(a in -1_000_000i64..1_000_000, b in -1_000_000i64..1_000_000) {
            let mut args = ToolArguments::new();
            args.insert("a".into(), json!(a));
            args.insert("b".into(), json!(b));
            prop_assert_eq!(arithmetic(&args, i64::checked_add, |x, y| x + y).unwrap(), json!(a + b));
        }

        #[test]
        fn multiplication_commutes(a in -10_000i64..10_000, b in -10_000i64..10_000) {
            let mut ab = ToolArguments::new();
            ab.insert("a".into(), json!(a));
            ab.insert("b".into(), json!(b));
            let mut ba = ToolArguments::new();
            ba.insert("a".into(), json!(b));
            ba.insert("b".into(), json!(a));
            prop_assert_eq!(
                arithmetic(&ab, i64::checked_mul, |x, y| x * y).unwrap(),
                arithmetic(&ba, i64::checked_mul, |x, y| x * y).unwrap()
            );
        }
    }
}
