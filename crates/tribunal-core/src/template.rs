//! Prompt templates.
//!
//! Templates are Handlebars, compiled once when a unit is built and rendered
//! in strict mode, so a misspelled variable fails at render time instead of
//! producing an empty prompt. Output is never HTML-escaped.
//!
//! Helpers registered on every template:
//!
//! | Helper | Example |
//! |---|---|
//! | `add` `sub` `mul` `div` `mod` | `{{add index 1}}` (integer; `div`/`mod` by zero give 0) |
//! | `contains` `hasPrefix` `hasSuffix` | `{{#if (contains answer "yes")}}` |
//! | `lower` `upper` `trim` | `{{lower question}}` |
//! | `replace` | `{{replace answer "\n" " "}}` |
//! | `join` `split` | `{{join (split tags ",") "; "}}` |
//! | `truncate` | `{{truncate answer 200}}` |

use std::fmt;
use std::sync::Arc;

use handlebars::{handlebars_helper, no_escape, Handlebars};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::error::EvalError;

const TEMPLATE_NAME: &str = "prompt";

lazy_static! {
    static ref EXPRESSION: Regex = Regex::new(r"\{\{([^}]*)\}\}").unwrap();
    static ref IDENTIFIER: Regex = Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").unwrap();
}

/// Shorten `s` to at most `n` characters.
///
/// Returns `""` for `n <= 0` and `s` unchanged when it already fits. Longer
/// strings keep their first `n - 3` characters plus `"..."` when `n > 3`,
/// otherwise just the first `n` characters. Counts Unicode scalar values.
pub fn truncate(s: &str, n: i64) -> String {
    if n <= 0 {
        return String::new();
    }
    let n = usize::try_from(n).unwrap_or(usize::MAX);
    if s.chars().count() <= n {
        return s.to_string();
    }
    if n > 3 {
        let mut out: String = s.chars().take(n - 3).collect();
        out.push_str("...");
        out
    } else {
        s.chars().take(n).collect()
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

handlebars_helper!(add: |a: i64, b: i64| a.wrapping_add(b));
handlebars_helper!(sub: |a: i64, b: i64| a.wrapping_sub(b));
handlebars_helper!(mul: |a: i64, b: i64| a.wrapping_mul(b));
handlebars_helper!(div: |a: i64, b: i64| if b == 0 { 0 } else { a.wrapping_div(b) });
handlebars_helper!(modulo: |a: i64, b: i64| if b == 0 { 0 } else { a.wrapping_rem(b) });
handlebars_helper!(contains: |s: str, needle: str| s.contains(needle));
handlebars_helper!(has_prefix: |s: str, prefix: str| s.starts_with(prefix));
handlebars_helper!(has_suffix: |s: str, suffix: str| s.ends_with(suffix));
handlebars_helper!(lower: |s: str| s.to_lowercase());
handlebars_helper!(upper: |s: str| s.to_uppercase());
handlebars_helper!(trim: |s: str| s.trim());
handlebars_helper!(replace: |s: str, from: str, to: str| s.replace(from, to));
handlebars_helper!(join: |items: array, sep: str| {
    items.iter().map(display_value).collect::<Vec<_>>().join(sep)
});
handlebars_helper!(split: |s: str, sep: str| s.split(sep).collect::<Vec<_>>());
handlebars_helper!(truncate_helper: |s: str, n: i64| truncate(s, n));

fn registry() -> Handlebars<'static> {
    let mut hb = Handlebars::new();
    hb.set_strict_mode(true);
    hb.register_escape_fn(no_escape);

    hb.register_helper("add", Box::new(add));
    hb.register_helper("sub", Box::new(sub));
    hb.register_helper("mul", Box::new(mul));
    hb.register_helper("div", Box::new(div));
    hb.register_helper("mod", Box::new(modulo));
    hb.register_helper("contains", Box::new(contains));
    hb.register_helper("hasPrefix", Box::new(has_prefix));
    hb.register_helper("hasSuffix", Box::new(has_suffix));
    hb.register_helper("lower", Box::new(lower));
    hb.register_helper("upper", Box::new(upper));
    hb.register_helper("trim", Box::new(trim));
    hb.register_helper("replace", Box::new(replace));
    hb.register_helper("join", Box::new(join));
    hb.register_helper("split", Box::new(split));
    hb.register_helper("truncate", Box::new(truncate_helper));
    hb
}

/// A compiled prompt template.
#[derive(Clone)]
pub struct PromptTemplate {
    source: String,
    registry: Arc<Handlebars<'static>>,
}

impl PromptTemplate {
    pub fn parse(source: &str) -> Result<Self, EvalError> {
        let mut hb = registry();
        hb.register_template_string(TEMPLATE_NAME, source)
            .map_err(|e| EvalError::TemplateParse(e.to_string()))?;
        Ok(Self {
            source: source.to_string(),
            registry: Arc::new(hb),
        })
    }

    pub fn render<T: Serialize>(&self, data: &T) -> Result<String, EvalError> {
        self.registry
            .render(TEMPLATE_NAME, data)
            .map_err(|e| EvalError::TemplateExecution(e.to_string()))
    }

    /// Whether any `{{ ... }}` expression mentions `variable` as a whole word.
    pub fn references(&self, variable: &str) -> bool {
        EXPRESSION.captures_iter(&self.source).any(|expr| {
            IDENTIFIER
                .find_iter(&expr[1])
                .any(|ident| ident.as_str() == variable)
        })
    }

    /// Fail with an invalid-config error naming the first missing variable.
    pub fn require_references(&self, field: &str, variables: &[&str]) -> Result<(), EvalError> {
        match variables.iter().find(|v| !self.references(v)) {
            Some(missing) => Err(EvalError::invalid_config(format!(
                "{} must reference {{{{{}}}}}",
                field, missing
            ))),
            None => Ok(()),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

impl fmt::Debug for PromptTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromptTemplate")
            .field("source", &self.source)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn render(source: &str, data: Value) -> String {
        PromptTemplate::parse(source).unwrap().render(&data).unwrap()
    }

    #[test]
    fn test_truncate_rules() {
        assert_eq!(truncate("hello world", 0), "");
        assert_eq!(truncate("hello world", -4), "");
        assert_eq!(truncate("hello", 5), "hello");
        assert_eq!(truncate("hello world", 8), "hello...");
        assert_eq!(truncate("hello world", 3), "hel");
        assert_eq!(truncate("日本語のテキスト", 5), "日本...");
    }

    #[test]
    fn test_arithmetic_helpers() {
        let data = json!({"a": 7, "b": 2, "z": 0});
        assert_eq!(render("{{add a b}}", data.clone()), "9");
        assert_eq!(render("{{sub a b}}", data.clone()), "5");
        assert_eq!(render("{{mul a b}}", data.clone()), "14");
        assert_eq!(render("{{div a b}}", data.clone()), "3");
        assert_eq!(render("{{mod a b}}", data.clone()), "1");
        assert_eq!(render("{{div a z}}", data.clone()), "0");
        assert_eq!(render("{{mod a z}}", data), "0");
    }

    #[test]
    fn test_string_helpers() {
        let data = json!({"s": "  Hello World  ", "t": "a,b,c"});
        assert_eq!(render("{{trim s}}", data.clone()), "Hello World");
        assert_eq!(render("{{lower (trim s)}}", data.clone()), "hello world");
        assert_eq!(render("{{upper (trim s)}}", data.clone()), "HELLO WORLD");
        assert_eq!(render("{{replace t \",\" \"-\"}}", data.clone()), "a-b-c");
        assert_eq!(render("{{join (split t \",\") \" | \"}}", data.clone()), "a | b | c");
        assert_eq!(
            render("{{#if (hasPrefix t \"a,\")}}yes{{else}}no{{/if}}", data.clone()),
            "yes"
        );
        assert_eq!(
            render("{{#if (hasSuffix t \"x\")}}yes{{else}}no{{/if}}", data.clone()),
            "no"
        );
        assert_eq!(
            render("{{#if (contains s \"World\")}}yes{{else}}no{{/if}}", data),
            "yes"
        );
    }

    #[test]
    fn test_no_html_escaping() {
        assert_eq!(render("{{q}}", json!({"q": "<b>&\"x\"</b>"})), "<b>&\"x\"</b>");
    }

    #[test]
    fn test_missing_variable_fails_at_render() {
        let template = PromptTemplate::parse("Question: {{question}}").unwrap();
        let err = template.render(&json!({})).unwrap_err();
        assert!(matches!(err, EvalError::TemplateExecution(_)));
    }

    #[test]
    fn test_parse_error() {
        let err = PromptTemplate::parse("{{#if question}}unclosed").unwrap_err();
        assert!(matches!(err, EvalError::TemplateParse(_)));
    }

    #[test]
    fn test_references() {
        let template =
            PromptTemplate::parse("Q: {{question}}\n{{#each answers}}{{this.content}}{{/each}}")
                .unwrap();
        assert!(template.references("question"));
        assert!(template.references("answers"));
        assert!(!template.references("answer"));
        assert!(template.require_references("prompt", &["question", "answers"]).is_ok());
        let err = template
            .require_references("prompt", &["question", "judge_scores"])
            .unwrap_err();
        assert!(err.to_string().contains("{{judge_scores}}"));
    }

    #[test]
    fn test_plain_text_mention_is_not_a_reference() {
        let template = PromptTemplate::parse("Answer the question: {{q}}").unwrap();
        assert!(!template.references("question"));
    }
}
