//! Built-in tools available to every agent configuration

use anyhow::{anyhow, bail, Context as _};
use chrono::{SecondsFormat, Utc};
use rhai::{Dynamic, Engine, EvalAltResult, Scope, FLOAT, INT};
use serde_json::{json, Value};

use super::ToolDefinition;

/// All built-in tools
pub fn builtin_tools() -> Vec<ToolDefinition> {
    vec![calculator(), current_time(), json_parse()]
}

/// Arithmetic expression evaluation.
///
/// Supports `+ - * / % **`, parentheses, the constants `pi` and `e`, and
/// `abs round min max pow sqrt sin cos tan log log10 exp`. Division is
/// always floating point and results are returned as floats.
pub fn calculator() -> ToolDefinition {
    ToolDefinition::from_fn(
        "calculator",
        "Perform mathematical calculations. Supports basic arithmetic, powers, roots, and common math functions.",
        json!({
            "type": "object",
            "properties": {
                "expression": {
                    "type": "string",
                    "description": "Mathematical expression to evaluate (e.g., '2 + 2', 'sqrt(16)', 'pow(2, 8)')"
                }
            },
            "required": ["expression"]
        }),
        |args| async move {
            let expression = args
                .get("expression")
                .and_then(Value::as_str)
                .ok_or_else(|| anyhow!("'expression' must be a string"))?;
            evaluate(expression).map(|n| json!(n))
        },
    )
    .require_arguments()
}

/// Current UTC date and time
pub fn current_time() -> ToolDefinition {
    ToolDefinition::from_fn(
        "current_time",
        "Get the current date and time (UTC) in various formats.",
        json!({
            "type": "object",
            "properties": {
                "format": {
                    "type": "string",
                    "description": "Output format: 'iso', 'date', 'time', 'datetime'",
                    "enum": ["iso", "date", "time", "datetime"]
                }
            },
            "required": []
        }),
        |args| async move {
            let now = Utc::now();
            let formatted = match args.get("format").and_then(Value::as_str) {
                Some("date") => now.format("%Y-%m-%d").to_string(),
                Some("time") => now.format("%H:%M:%S").to_string(),
                Some("datetime") => now.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
                _ => now.to_rfc3339_opts(SecondsFormat::Micros, true),
            };
            Ok(json!(formatted))
        },
    )
}

/// JSON parsing with optional path extraction
pub fn json_parse() -> ToolDefinition {
    ToolDefinition::from_fn(
        "json_parse",
        "Parse a JSON string and optionally extract a specific path.",
        json!({
            "type": "object",
            "properties": {
                "json_string": {
                    "type": "string",
                    "description": "JSON string to parse"
                },
                "path": {
                    "type": "string",
                    "description": "Optional dot-notation path to extract (e.g., 'data.items[0].name')"
                }
            },
            "required": ["json_string"]
        }),
        |args| async move {
            let raw = args
                .get("json_string")
                .and_then(Value::as_str)
                .ok_or_else(|| anyhow!("'json_string' must be a string"))?;
            let data: Value = serde_json::from_str(raw).context("invalid JSON")?;

            match args.get("path").and_then(Value::as_str) {
                Some(path) if !path.is_empty() => extract_path(data, path),
                _ => Ok(data),
            }
        },
    )
    .require_arguments()
}

fn extract_path(data: Value, path: &str) -> anyhow::Result<Value> {
    let normalized = path.replace('[', ".").replace(']', "");
    let mut current = data;

    for part in normalized.split('.').filter(|p| !p.is_empty()) {
        current = match current {
            Value::Array(mut items) => {
                let index: usize = part
                    .parse()
                    .with_context(|| format!("'{}' is not an array index", part))?;
                if index >= items.len() {
                    bail!("index {} out of range (length {})", index, items.len());
                }
                items.swap_remove(index)
            }
            Value::Object(mut fields) => fields
                .remove(part)
                .ok_or_else(|| anyhow!("key '{}' not found", part))?,
            _ => bail!("cannot navigate to '{}'", part),
        };
    }

    Ok(current)
}

fn evaluate(expression: &str) -> anyhow::Result<FLOAT> {
    let engine = math_engine();
    let mut scope = Scope::new();
    scope.push_constant("pi", std::f64::consts::PI);
    scope.push_constant("e", std::f64::consts::E);

    let value: Dynamic = engine
        .eval_expression_with_scope(&mut scope, expression)
        .map_err(|e| anyhow!("Invalid expression: {}", e))?;

    let number = if let Ok(i) = value.as_int() {
        i as FLOAT
    } else if let Ok(f) = value.as_float() {
        f
    } else {
        bail!("Invalid expression: result is not a number");
    };

    if !number.is_finite() {
        bail!("Invalid expression: result is not finite");
    }
    Ok(number)
}

fn math_engine() -> Engine {
    let mut engine = Engine::new_raw();
    engine.set_fast_operators(false);
    engine.set_max_operations(10_000);
    engine.set_max_expr_depths(64, 32);

    engine.register_fn("/", |a: INT, b: INT| -> Result<FLOAT, Box<EvalAltResult>> {
        if b == 0 {
            return Err("division by zero".into());
        }
        Ok(a as FLOAT / b as FLOAT)
    });

    register_unary(&mut engine, "abs", FLOAT::abs);
    register_unary(&mut engine, "round", FLOAT::round);
    register_unary(&mut engine, "sqrt", FLOAT::sqrt);
    register_unary(&mut engine, "sin", FLOAT::sin);
    register_unary(&mut engine, "cos", FLOAT::cos);
    register_unary(&mut engine, "tan", FLOAT::tan);
    register_unary(&mut engine, "log", FLOAT::ln);
    register_unary(&mut engine, "log10", FLOAT::log10);
    register_unary(&mut engine, "exp", FLOAT::exp);

    register_binary(&mut engine, "pow", FLOAT::powf);
    register_binary(&mut engine, "min", FLOAT::min);
    register_binary(&mut engine, "max", FLOAT::max);

    engine
}

fn register_unary(engine: &mut Engine, name: &str, f: fn(FLOAT) -> FLOAT) {
    engine.register_fn(name, move |x: FLOAT| f(x));
    engine.register_fn(name, move |x: INT| f(x as FLOAT));
}

fn register_binary(engine: &mut Engine, name: &str, f: fn(FLOAT, FLOAT) -> FLOAT) {
    engine.register_fn(name, move |a: FLOAT, b: FLOAT| f(a, b));
    engine.register_fn(name, move |a: INT, b: INT| f(a as FLOAT, b as FLOAT));
    engine.register_fn(name, move |a: INT, b: FLOAT| f(a as FLOAT, b));
    engine.register_fn(name, move |a: FLOAT, b: INT| f(a, b as FLOAT));
}
