//! Prompt template registry
//!
//! Each template declares its required arguments; rendering checks that all
//! of them are present and that no unknown argument was supplied.

use serde_json::{Map, Value};
use thiserror::Error;

pub type TemplateArgs = Map<String, Value>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Template '{0}' not found")]
    NotFound(String),

    #[error("Missing arguments for template '{template}'. Requires: {}", .required.join(", "))]
    MissingArgs {
        template: String,
        required: Vec<&'static str>,
    },

    #[error("Unexpected argument '{0}'")]
    UnexpectedArg(String),

    #[error("Argument '{name}' must be {expected}")]
    InvalidArg {
        name: &'static str,
        expected: &'static str,
    },
}

pub struct PromptTemplate {
    pub name: &'static str,
    pub description: &'static str,
    pub required_args: &'static [&'static str],
    example_args: fn() -> Value,
    render: fn(&TemplateArgs) -> Result<String, TemplateError>,
}

pub static TEMPLATES: &[PromptTemplate] = &[
    PromptTemplate {
        name: "summarize",
        description: "Summarizes a block of text.",
        required_args: &["text_to_summarize"],
        example_args: || {
            serde_json::json!({
                "text_to_summarize": "Artificial intelligence (AI) is intelligence demonstrated by machines, as opposed to the natural intelligence displayed by humans and other animals."
            })
        },
        render: |args| {
            let text = text_arg(args, "text_to_summarize")?;
            Ok(format!(
                "Please provide a concise summary of the following text:\n\n---\n{text}\n---\n\nSummary:"
            ))
        },
    },
    PromptTemplate {
        name: "creative_writing",
        description: "Writes a creative piece (e.g. poem, short story) about a topic in a given style.",
        required_args: &["topic", "style"],
        example_args: || {
            serde_json::json!({
                "topic": "a lonely lighthouse on a distant planet",
                "style": "short story"
            })
        },
        render: |args| {
            let topic = text_arg(args, "topic")?;
            let style = text_arg(args, "style")?;
            Ok(format!(
                "Write a {style} about the following topic: {topic}. Be creative and engaging."
            ))
        },
    },
    PromptTemplate {
        name: "extract_json",
        description: "Extracts specific fields from a text and returns them as JSON.",
        required_args: &["text_to_parse", "fields"],
        example_args: || {
            serde_json::json!({
                "text_to_parse": "Event: AI Conference 2024, Location: Lisbon, Date: October 26th.",
                "fields": ["Event", "Location", "Date"]
            })
        },
        render: |args| {
            let text = text_arg(args, "text_to_parse")?;
            let fields = list_arg(args, "fields")?
                .iter()
                .map(|field| format!("\"{field}\""))
                .collect::<Vec<_>>()
                .join(", ");
            Ok(format!(
                "From the text below, extract the following fields: {fields}.\nReturn ONLY a valid JSON object with these fields. If a field is not found, use null.\n\nText: \"{text}\"\n\nJSON Output:\n"
            ))
        },
    },
];

impl PromptTemplate {
    pub fn example_args(&self) -> Value {
        (self.example_args)()
    }

    /// Check arguments, then fill the template.
    pub fn render(&self, args: &TemplateArgs) -> Result<String, TemplateError> {
        if !self.required_args.iter().all(|arg| args.contains_key(*arg)) {
            return Err(TemplateError::MissingArgs {
                template: self.name.to_string(),
                required: self.required_args.to_vec(),
            });
        }
        if let Some(extra) = args
            .keys()
            .find(|key| !self.required_args.contains(&key.as_str()))
        {
            return Err(TemplateError::UnexpectedArg(extra.clone()));
        }
        (self.render)(args)
    }
}

pub fn find(name: &str) -> Option<&'static PromptTemplate> {
    TEMPLATES.iter().find(|t| t.name == name)
}

/// Render `name` with `args`; absent args count as an empty map.
pub fn render(name: &str, args: Option<&TemplateArgs>) -> Result<String, TemplateError> {
    let template = find(name).ok_or_else(|| TemplateError::NotFound(name.to_string()))?;
    let empty = TemplateArgs::new();
    template.render(args.unwrap_or(&empty))
}

/// Catalog served by `GET /templates/text`.
pub fn catalog() -> Value {
    let entries: Map<String, Value> = TEMPLATES
        .iter()
        .map(|t| {
            (
                t.name.to_string(),
                serde_json::json!({
                    "description": t.description,
                    "required_args": t.required_args,
                    "example_args": t.example_args(),
                }),
            )
        })
        .collect();
    Value::Object(entries)
}

/// Scalar argument rendered as text. Strings are used verbatim.
fn text_arg(args: &TemplateArgs, name: &'static str) -> Result<String, TemplateError> {
    scalar_text(&args[name]).ok_or(TemplateError::InvalidArg {
        name,
        expected: "a string",
    })
}

fn list_arg(args: &TemplateArgs, name: &'static str) -> Result<Vec<String>, TemplateError> {
    let invalid = TemplateError::InvalidArg {
        name,
        expected: "a list of strings",
    };
    match &args[name] {
        Value::Array(items) => items
            .iter()
            .map(|item| scalar_text(item).ok_or(invalid.clone()))
            .collect(),
        _ => Err(invalid),
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
