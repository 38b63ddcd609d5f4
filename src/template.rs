use serde_json::Value;
use std::collections::HashMap;

/// Variables substituted into `{{name}}` placeholders before any network call.
pub type TemplateVars = HashMap<String, Value>;

/// Replace every `{{name}}` placeholder with its variable value.
///
/// String values are inserted verbatim, array values are newline-joined,
/// other scalars use their display form. Placeholders with no matching
/// variable are left untouched.
pub fn render(template: &str, vars: &TemplateVars) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            // Unterminated placeholder: keep the tail as-is.
            out.push_str(&rest[start..]);
            return out;
        };

        let name = after[..end].trim();
        match vars.get(name) {
            Some(value) => out.push_str(&render_value(value)),
            None => out.push_str(&rest[start..start + 2 + end + 2]),
        }
        rest = &after[end + 2..];
    }

    out.push_str(rest);
    out
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Array(items) => items
            .iter()
            .map(render_value)
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(pairs: &[(&str, Value)]) -> TemplateVars {
        pairs
            .iter()
            .map(|(name, value)| ((*name).to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn substitutes_strings_and_numbers() {
        let vars = vars(&[("name", json!("Ada")), ("age", json!(30))]);
        assert_eq!(
            render("Hello {{name}}, you are {{age}}", &vars),
            "Hello Ada, you are 30"
        );
    }

    #[test]
    fn joins_array_values_with_newlines() {
        let vars = vars(&[("items", json!(["alpha", "beta", "gamma"]))]);
        assert_eq!(render("List:\n{{items}}", &vars), "List:\nalpha\nbeta\ngamma");
    }

    #[test]
    fn tolerates_spaces_inside_braces() {
        let vars = vars(&[("name", json!("Ada"))]);
        assert_eq!(render("Hi {{ name }}!", &vars), "Hi Ada!");
    }

    #[test]
    fn unknown_placeholder_is_left_untouched() {
        let vars = TemplateVars::new();
        assert_eq!(render("Hello {{who}}", &vars), "Hello {{who}}");
    }

    #[test]
    fn unterminated_placeholder_is_preserved() {
        let vars = vars(&[("name", json!("Ada"))]);
        assert_eq!(render("Hello {{name", &vars), "Hello {{name");
    }

    #[test]
    fn repeated_placeholders_all_substituted() {
        let vars = vars(&[("x", json!("v"))]);
        assert_eq!(render("{{x}}-{{x}}-{{x}}", &vars), "v-v-v");
    }
}
