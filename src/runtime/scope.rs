//! Variable scope seen by conditions and parameter templates
//!
//! Combines the execution context with the read-only incident fields.
//! `severity`, `category` and `priority` always come from the incident;
//! everything else is a dotted path into the context, resolved with
//! jsonpath (`asset.hosts.0` becomes `$['asset']['hosts'][0]`).

use crate::error::ActionError;
use crate::incident::Incident;
use crate::runtime::expression::Variables;
use serde_json::{Map, Value};

pub struct Scope<'a> {
    context: Value,
    incident: &'a Incident,
}

impl<'a> Scope<'a> {
    pub fn new(context: &Map<String, Value>, incident: &'a Incident) -> Self {
        Self { context: Value::Object(context.clone()), incident }
    }

    fn incident_field(&self, field: &str) -> Option<Option<Value>> {
        let value = match field {
            "severity" => self.incident.severity.clone(),
            "category" => self.incident.category.clone(),
            "priority" => self.incident.priority.clone(),
            "id" | "incident_id" => Some(self.incident.id.clone()),
            "title" => Some(self.incident.title.clone()),
            _ => return None,
        };
        Some(value.map(Value::String))
    }

    fn context_path(&self, path: &str) -> Option<Value> {
        let selector: String = std::iter::once("$".to_string())
            .chain(path.split('.').map(|segment| match segment.parse::<usize>() {
                Ok(index) => format!("[{}]", index),
                Err(_) => format!("['{}']", segment.replace('\'', "\\'")),
            }))
            .collect();

        match jsonpath_lib::select(&self.context, &selector) {
            Ok(found) => found.first().map(|v| (*v).clone()),
            Err(e) => {
                tracing::debug!("🔍 Path '{}' did not resolve: {:?}", path, e);
                None
            }
        }
    }

    /// Render `{{var}}` placeholders in action parameters
    ///
    /// A string that is exactly one placeholder is replaced by the resolved
    /// JSON value (type preserved); placeholders embedded in text are
    /// stringified. Unresolved placeholders are a non-retryable error.
    pub fn render(&self, parameters: &Map<String, Value>) -> Result<Map<String, Value>, ActionError> {
        parameters
            .iter()
            .map(|(key, value)| Ok::<_, ActionError>((key.clone(), self.render_value(value)?)))
            .collect()
    }

    fn render_value(&self, value: &Value) -> Result<Value, ActionError> {
        match value {
            Value::String(text) => self.render_string(text),
            Value::Array(items) => items.iter().map(|v| self.render_value(v)).collect::<Result<_, _>>().map(Value::Array),
            Value::Object(map) => self.render(map).map(Value::Object),
            other => Ok(other.clone()),
        }
    }

    fn render_string(&self, text: &str) -> Result<Value, ActionError> {
        let trimmed = text.trim();
        if let Some(inner) = trimmed.strip_prefix("{{").and_then(|t| t.strip_suffix("}}")) {
            if !inner.contains("{{") && !inner.contains("}}") {
                return self.resolve_placeholder(inner);
            }
        }

        let mut rendered = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(open) = rest.find("{{") {
            let Some(close) = rest[open + 2..].find("}}") else {
                break;
            };
            rendered.push_str(&rest[..open]);
            let inner = &rest[open + 2..open + 2 + close];
            match self.resolve_placeholder(inner)? {
                Value::String(s) => rendered.push_str(&s),
                other => rendered.push_str(&other.to_string()),
            }
            rest = &rest[open + 2 + close + 2..];
        }
        rendered.push_str(rest);
        Ok(Value::String(rendered))
    }

    fn resolve_placeholder(&self, inner: &str) -> Result<Value, ActionError> {
        let path = inner.trim();
        self.lookup(path)
            .ok_or_else(|| ActionError::InvalidParameters(format!("unresolved variable '{}'", path)))
    }
}

impl Variables for Scope<'_> {
    fn lookup(&self, path: &str) -> Option<Value> {
        if path.is_empty() {
            return None;
        }
        let field = path.strip_prefix("incident.").unwrap_or(path);
        if let Some(value) = self.incident_field(field) {
            return value;
        }
        self.context_path(path)
    }
}
