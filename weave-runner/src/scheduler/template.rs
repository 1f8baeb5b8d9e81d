//! Stage argument templates
//!
//! Placeholders:
//! - `{run_id}`, `{shared_data}`, `{inputs_csv}`, `{input_count}` are
//!   substituted anywhere inside an argument
//! - an argument that is exactly `{inputs}` expands to one argument per input
//!
//! String values of a stage's static input are rendered the same way.

use serde_json::Value as JsonValue;
use std::path::Path;

const INPUTS: &str = "{inputs}";

/// Values available to argument templates of one run
#[derive(Debug, Clone)]
pub struct TemplateContext<'a> {
    pub run_id: &'a str,
    pub shared_data: &'a Path,
    pub inputs: &'a [String],
}

impl TemplateContext<'_> {
    /// Renders a stage's argument list
    pub fn render(&self, template: &[String]) -> Vec<String> {
        let mut rendered = Vec::with_capacity(template.len() + self.inputs.len());

        for argument in template {
            if argument == INPUTS {
                rendered.extend(self.inputs.iter().cloned());
            } else {
                rendered.push(self.substitute(argument));
            }
        }

        rendered
    }

    /// Renders every string inside a JSON value; `{inputs}` becomes an array
    pub fn render_value(&self, value: &JsonValue) -> JsonValue {
        match value {
            JsonValue::String(s) if s == INPUTS => {
                JsonValue::Array(self.inputs.iter().cloned().map(JsonValue::String).collect())
            }
            JsonValue::String(s) => JsonValue::String(self.substitute(s)),
            JsonValue::Array(items) => {
                JsonValue::Array(items.iter().map(|v| self.render_value(v)).collect())
            }
            JsonValue::Object(map) => JsonValue::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.render_value(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    fn substitute(&self, argument: &str) -> String {
        if !argument.contains('{') {
            return argument.to_string();
        }

        argument
            .replace("{run_id}", self.run_id)
            .replace("{shared_data}", &self.shared_data.to_string_lossy())
            .replace("{inputs_csv}", &self.inputs.join(","))
            .replace("{input_count}", &self.inputs.len().to_string())
    }
}
