//! `<x-name>` component tags.
//!
//! A component renders another view with the tag's attributes as variables:
//!
//! ```text
//! <x-alert type="error" :message="user.error" />
//! ```
//!
//! compiles to
//!
//! ```text
//! {% with type="error", message=(user.error) %}{% include component_view("alert") %}{% endwith %}
//! ```
//!
//! Paired tags capture their body into a `slot` variable. `component_view` is
//! a template function that maps the tag name to a view at render time, so
//! aliases registered after compilation still apply. The dynamic component
//! takes its target from its `component` attribute instead of its tag name.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use super::Component;
use crate::error::ViewError;

static TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"<x-([\w\-.:]+)((?:\s+[\w\-.:]+(?:\s*=\s*(?:"[^"]*"|'[^']*'))?)*)\s*(/?)>|</x-([\w\-.:]+)\s*>"#,
    )
    .expect("component tag pattern is valid")
});

static ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([\w\-.:]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'))?"#)
        .expect("attribute pattern is valid")
});

static INTERPOLATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{\{(.+?)\}\}").expect("interpolation pattern is valid"));

/// Name of the template function that maps a component name to a view.
pub(crate) const COMPONENT_VIEW_FN: &str = "component_view";

#[derive(Debug)]
struct Attribute {
    key: String,
    expr: String,
}

struct OpenTag {
    name: String,
    attributes: Vec<Attribute>,
}

/// Replaces every component tag in `source`.
pub(crate) fn compile_components(
    source: &str,
    components: &HashMap<String, Component>,
) -> Result<String, ViewError> {
    let mut out = String::with_capacity(source.len());
    let mut stack: Vec<OpenTag> = Vec::new();
    let mut last = 0;

    for caps in TAG.captures_iter(source) {
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(&source[last..whole.start()]);
        last = whole.end();

        if let Some(close) = caps.get(4) {
            let open = stack.pop().ok_or_else(|| {
                ViewError::Syntax(format!("unexpected closing tag </x-{}>", close.as_str()))
            })?;
            if open.name != close.as_str() {
                return Err(ViewError::Syntax(format!(
                    "expected </x-{}>, found </x-{}>",
                    open.name,
                    close.as_str()
                )));
            }
            out.push_str("{% endset %}");
            out.push_str(&include(
                &open.name,
                open.attributes,
                Some(&slot_var(stack.len())),
                components,
            )?);
            continue;
        }

        let name = caps.get(1).map_or("", |m| m.as_str()).to_string();
        let attributes = parse_attributes(caps.get(2).map_or("", |m| m.as_str()))?;
        let self_closing = caps.get(3).is_some_and(|m| m.as_str() == "/");

        if self_closing {
            out.push_str(&include(&name, attributes, None, components)?);
        } else {
            out.push_str(&format!("{{% set {} %}}", slot_var(stack.len())));
            stack.push(OpenTag { name, attributes });
        }
    }

    if let Some(open) = stack.pop() {
        return Err(ViewError::Syntax(format!(
            "unclosed component <x-{}>",
            open.name
        )));
    }

    out.push_str(&source[last..]);
    Ok(out)
}

fn include(
    name: &str,
    mut attributes: Vec<Attribute>,
    slot: Option<&str>,
    components: &HashMap<String, Component>,
) -> Result<String, ViewError> {
    let target = match components.get(name) {
        Some(Component::Dynamic) => {
            let index = attributes
                .iter()
                .position(|a| a.key == "component")
                .ok_or_else(|| {
                    ViewError::Syntax(format!("<x-{name}> requires a component attribute"))
                })?;
            let component = attributes.remove(index);
            format!("{COMPONENT_VIEW_FN}({})", component.expr)
        }
        _ => format!("{COMPONENT_VIEW_FN}({})", string_literal(name)),
    };

    let mut bindings: Vec<String> = attributes
        .into_iter()
        .map(|a| format!("{}={}", a.key, a.expr))
        .collect();
    if let Some(slot) = slot {
        // The body was escaped as it was captured
        bindings.push(format!("slot=({slot}|safe)"));
    }

    if bindings.is_empty() {
        Ok(format!("{{% include {target} %}}"))
    } else {
        Ok(format!(
            "{{% with {} %}}{{% include {target} %}}{{% endwith %}}",
            bindings.join(", ")
        ))
    }
}

fn parse_attributes(raw: &str) -> Result<Vec<Attribute>, ViewError> {
    ATTRIBUTE
        .captures_iter(raw)
        .map(|caps| {
            let name = caps.get(1).map_or("", |m| m.as_str());
            let value = caps.get(2).or_else(|| caps.get(3)).map(|m| m.as_str());
            let (bound, name) = match name.strip_prefix(':') {
                Some(stripped) => (true, stripped),
                None => (false, name),
            };
            let key = variable_name(name)?;
            let expr = match (bound, value) {
                (_, None) => "true".to_string(),
                (true, Some(expr)) if !expr.trim().is_empty() => format!("({})", expr.trim()),
                (true, Some(_)) => {
                    return Err(ViewError::Syntax(format!(
                        "bound attribute :{name} has no expression"
                    )))
                }
                (false, Some(literal)) => literal_expr(literal),
            };
            Ok(Attribute { key, expr })
        })
        .collect()
}

/// `user-id` and `user.id` become `user_id`.
fn variable_name(attribute: &str) -> Result<String, ViewError> {
    let key: String = attribute
        .chars()
        .map(|c| if c == '-' || c == '.' || c == ':' { '_' } else { c })
        .collect();
    let valid = key
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(key)
    } else {
        Err(ViewError::Syntax(format!(
            "[{attribute}] is not a valid attribute name"
        )))
    }
}

/// A literal attribute value, with `{{ expr }}` interpolations concatenated in.
fn literal_expr(value: &str) -> String {
    if !INTERPOLATION.is_match(value) {
        return string_literal(value);
    }

    let mut parts = Vec::new();
    let mut last = 0;
    for caps in INTERPOLATION.captures_iter(value) {
        let Some(whole) = caps.get(0) else { continue };
        if whole.start() > last {
            parts.push(string_literal(&value[last..whole.start()]));
        }
        let expr = caps.get(1).map_or("", |m| m.as_str().trim());
        parts.push(format!("(({expr})|string)"));
        last = whole.end();
    }
    if last < value.len() {
        parts.push(string_literal(&value[last..]));
    }
    format!("({})", parts.join(" ~ "))
}

fn string_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn slot_var(depth: usize) -> String {
    format!("__slot_{depth}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> HashMap<String, Component> {
        let mut components = HashMap::new();
        components.insert("dynamic-component".to_string(), Component::Dynamic);
        components
    }

    #[test]
    fn test_self_closing_without_attributes() {
        let out = compile_components("<x-divider/>", &defaults()).unwrap();
        assert_eq!(out, "{% include component_view(\"divider\") %}");
    }

    #[test]
    fn test_literal_and_bound_attributes() {
        let out = compile_components(
            r#"<x-alert type="error" :message="user.error" dismissible />"#,
            &defaults(),
        )
        .unwrap();
        assert_eq!(
            out,
            "{% with type=\"error\", message=(user.error), dismissible=true %}\
             {% include component_view(\"alert\") %}{% endwith %}"
        );
    }

    #[test]
    fn test_paired_tags_capture_slot() {
        let out = compile_components(
            "<x-card title=\"Hi\"><x-badge/>body</x-card>",
            &defaults(),
        )
        .unwrap();
        assert_eq!(
            out,
            "{% set __slot_0 %}{% include component_view(\"badge\") %}body{% endset %}\
             {% with title=\"Hi\", slot=(__slot_0|safe) %}{% include component_view(\"card\") %}{% endwith %}"
        );
    }

    #[test]
    fn test_nested_paired_tags_use_distinct_slots() {
        let out = compile_components("<x-a><x-b>in</x-b></x-a>", &defaults()).unwrap();
        assert!(out.starts_with("{% set __slot_0 %}{% set __slot_1 %}in{% endset %}"));
        assert!(out.contains("slot=(__slot_1|safe)"));
        assert!(out.ends_with("{% with slot=(__slot_0|safe) %}{% include component_view(\"a\") %}{% endwith %}"));
    }

    #[test]
    fn test_dynamic_component_uses_attribute() {
        let out = compile_components(
            r#"<x-dynamic-component :component="widget" size="lg" />"#,
            &defaults(),
        )
        .unwrap();
        assert_eq!(
            out,
            "{% with size=\"lg\" %}{% include component_view((widget)) %}{% endwith %}"
        );

        let err = compile_components("<x-dynamic-component />", &defaults()).unwrap_err();
        assert!(matches!(err, ViewError::Syntax(_)));
    }

    #[test]
    fn test_interpolated_literal() {
        assert_eq!(
            literal_expr("Hello {{ name }}!"),
            "(\"Hello \" ~ ((name)|string) ~ \"!\")"
        );
    }

    #[test]
    fn test_attribute_names_normalized() {
        let out = compile_components(r#"<x-field data-id="7" />"#, &defaults()).unwrap();
        assert!(out.contains("data_id=\"7\""));
    }

    #[test]
    fn test_mismatched_tags_rejected() {
        assert!(compile_components("<x-a>text</x-b>", &defaults()).is_err());
        assert!(compile_components("<x-a>text", &defaults()).is_err());
        assert!(compile_components("text</x-a>", &defaults()).is_err());
    }

    #[test]
    fn test_plain_html_untouched() {
        let source = "<div class=\"x\"><span>hi</span></div>";
        assert_eq!(compile_components(source, &defaults()).unwrap(), source);
    }
}
