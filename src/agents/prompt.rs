//! System prompt rendering

use std::collections::HashMap;

use serde_json::Value;
use tera::{Context, Tera};

use crate::agents::domain::Message;

/// Render the system prompt as a Tera template against the chat context
///
/// This allows system prompts to use template variables like:
/// ```text
/// You are a {{role}} assistant. The user's name is {{user_name}}.
/// ```
///
/// Falls back to the raw prompt if rendering fails.
pub fn render_system_prompt(system_prompt: &str, context: &HashMap<String, Value>) -> String {
    if !system_prompt.contains("{{") && !system_prompt.contains("{%") {
        return system_prompt.to_string();
    }

    let mut tera_context = Context::new();
    for (key, value) in context {
        match value {
            Value::Null => tera_context.insert(key, ""),
            other => tera_context.insert(key, other),
        }
    }

    match Tera::one_off(system_prompt, &tera_context, false) {
        Ok(rendered) => rendered,
        Err(e) => {
            tracing::warn!("Failed to render system prompt template: {}", e);
            system_prompt.to_string()
        }
    }
}

/// Full system message: the rendered prompt followed by a `Context:` block
/// listing the context entries (sorted by key) and any recalled messages.
pub fn compose_system_prompt(
    system_prompt: &str,
    context: &HashMap<String, Value>,
    recalled: &[Message],
) -> String {
    let mut prompt = render_system_prompt(system_prompt, context);

    if context.is_empty() && recalled.is_empty() {
        return prompt;
    }

    let mut keys: Vec<&String> = context.keys().collect();
    keys.sort();

    let mut lines = Vec::with_capacity(keys.len() + recalled.len() + 1);
    for key in keys {
        lines.push(format!("- {}: {}", key, display_value(&context[key])));
    }
    if !recalled.is_empty() {
        lines.push("- relevant history:".to_string());
        for message in recalled {
            lines.push(format!("  - [{}] {}", message.role, message.content));
        }
    }

    if !prompt.is_empty() {
        prompt.push_str("\n\n");
    }
    prompt.push_str("Context:\n");
    prompt.push_str(&lines.join("\n"));
    prompt
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_render_template_variables() {
        let ctx = context(&[("user_name", json!("Ada")), ("count", json!(3))]);
        let rendered = render_system_prompt("Hello {{user_name}}, you have {{count}} items.", &ctx);
        assert_eq!(rendered, "Hello Ada, you have 3 items.");
    }

    #[test]
    fn test_render_falls_back_on_error() {
        let rendered = render_system_prompt("Hi {{missing}}", &HashMap::new());
        assert_eq!(rendered, "Hi {{missing}}");
    }

    #[test]
    fn test_context_block() {
        let ctx = context(&[("zone", json!("UTC")), ("account", json!({ "tier": "pro" }))]);
        let recalled = vec![Message::user("I prefer metric units")];
        let prompt = compose_system_prompt("You help.", &ctx, &recalled);

        assert_eq!(
            prompt,
            "You help.\n\nContext:\n- account: {\"tier\":\"pro\"}\n- zone: UTC\n- relevant history:\n  - [user] I prefer metric units"
        );
    }

    #[test]
    fn test_no_context_leaves_prompt_untouched() {
        assert_eq!(compose_system_prompt("Plain.", &HashMap::new(), &[]), "Plain.");
    }
}
