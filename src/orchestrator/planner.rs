//! Turns a task into an execution plan

use super::{Task, TaskError};
use crate::document::{Content, ContentType};
use crate::error::ErrorKind;
use crate::reasoning::ExtractionSchema;
use base64::Engine as _;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Where the reasoner's input comes from
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    Inline {
        content: Content,
        content_type: ContentType,
    },
    Document(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    /// Reasoner-only structured extraction
    Extract {
        source: Source,
        schema: ExtractionSchema,
    },
    /// Reasoner-only analysis of one piece of content
    Analyze { source: Source, query: String },
    /// Retrieve fragments, reason over them in passes
    RetrieveThenReason {
        query: String,
        k: usize,
        document_id: Option<String>,
    },
}

/// Serializable view of a plan for task metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub kind: String,
    pub steps: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
}

impl Plan {
    pub fn summary(&self) -> PlanSummary {
        let fetch = |source: &Source| match source {
            Source::Document(id) => (vec!["fetch_document".to_string()], Some(id.clone())),
            Source::Inline { .. } => (Vec::new(), None),
        };

        match self {
            Plan::Extract { source, schema } => {
                let (mut steps, document_id) = fetch(source);
                steps.push("extract_information".to_string());
                PlanSummary {
                    kind: "extract".to_string(),
                    steps,
                    query: None,
                    document_id,
                    k: None,
                    fields: schema.names().into_iter().map(String::from).collect(),
                }
            }
            Plan::Analyze { source, query } => {
                let (mut steps, document_id) = fetch(source);
                steps.push("analyze_document".to_string());
                PlanSummary {
                    kind: "analyze".to_string(),
                    steps,
                    query: Some(query.clone()),
                    document_id,
                    k: None,
                    fields: Vec::new(),
                }
            }
            Plan::RetrieveThenReason {
                query,
                k,
                document_id,
            } => PlanSummary {
                kind: "retrieve_then_reason".to_string(),
                steps: vec!["retrieve".to_string(), "analyze_fragments".to_string()],
                query: Some(query.clone()),
                document_id: document_id.clone(),
                k: Some(*k),
                fields: Vec::new(),
            },
        }
    }
}

/// `extract fields {a, b} [from doc D]`
const EXTRACT_PATTERN: &str = concat!(
    r"(?i)\bextract\s+(?:the\s+)?fields?\s*\{([^}]*)\}",
    r"(?:\s+from\s+(?:(?:the\s+)?doc(?:ument)?\s+)?([A-Za-z0-9_.#-]+))?",
);

/// Build the plan for `task`; `default_k` applies when the context has no `k`
pub fn plan(task: &Task, default_k: usize) -> Result<Plan, TaskError> {
    let context = &task.context;
    let pattern = Regex::new(EXTRACT_PATTERN).map_err(|e| {
        TaskError::new(ErrorKind::Backend, format!("Invalid extract pattern: {}", e))
    })?;
    let described = pattern.captures(&task.description);

    let schema = match context.get("schema") {
        Some(value) => Some(ExtractionSchema::from_value(value)?),
        None => described.as_ref().and_then(|caps| {
            let names: Vec<String> = caps
                .get(1)
                .map(|m| m.as_str())
                .unwrap_or_default()
                .split(',')
                .map(|name| name.trim().trim_matches(|c| c == '"' || c == '\'').to_string())
                .filter(|name| !name.is_empty())
                .collect();
            (!names.is_empty()).then(|| ExtractionSchema::from_names(names))
        }),
    };

    let inline = inline_source(task)?;
    let document_id = string_field(task, "document_id")?;

    // Rule 1: extraction
    if let Some(schema) = schema {
        let source = inline
            .or_else(|| document_id.map(Source::Document))
            .or_else(|| {
                described
                    .as_ref()
                    .and_then(|caps| caps.get(2))
                    .map(|m| Source::Document(m.as_str().to_string()))
            })
            .ok_or_else(|| {
                TaskError::new(
                    ErrorKind::InvalidQuery,
                    "extraction needs inline content or a document id",
                )
            })?;
        return Ok(Plan::Extract { source, schema });
    }
    if described.is_some() {
        return Err(TaskError::new(
            ErrorKind::InvalidQuery,
            "extraction names no fields",
        ));
    }

    let query = match string_field(task, "query")? {
        Some(query) => query,
        None => task.description.clone(),
    };

    // Rule 2: inline content
    if let Some(source) = inline {
        return Ok(Plan::Analyze { source, query });
    }

    // Rule 3: retrieval
    if !query.trim().is_empty() {
        let k = match context.get("k") {
            Some(value) => value.as_u64().map(|k| k as usize).ok_or_else(|| {
                TaskError::new(
                    ErrorKind::InvalidQuery,
                    format!("k must be a non-negative integer, got {}", value),
                )
            })?,
            None => default_k,
        };
        if k == 0 {
            return Err(TaskError::new(ErrorKind::InvalidQuery, "k must be at least 1"));
        }
        return Ok(Plan::RetrieveThenReason {
            query: query.trim().to_string(),
            k,
            document_id,
        });
    }

    // Rule 4: whole-document analysis
    if let Some(id) = document_id {
        return Ok(Plan::Analyze {
            source: Source::Document(id),
            query,
        });
    }

    Err(TaskError::new(
        ErrorKind::InvalidQuery,
        "task has no query, content or document to work on",
    ))
}

fn string_field(task: &Task, key: &str) -> Result<Option<String>, TaskError> {
    match task.context.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(TaskError::new(
            ErrorKind::InvalidQuery,
            format!("context.{} must be a string, got {}", key, other),
        )),
    }
}

/// `context.content`; binary content types carry base64
fn inline_source(task: &Task) -> Result<Option<Source>, TaskError> {
    let Some(content) = string_field(task, "content")? else {
        return Ok(None);
    };

    let content_type = match string_field(task, "content_type")? {
        Some(name) => name
            .parse::<ContentType>()
            .map_err(|e| TaskError::new(ErrorKind::UnsupportedContentType, e.to_string()))?,
        None => ContentType::Text,
    };

    let content = match content_type {
        ContentType::Text | ContentType::Table => Content::Text(content),
        ContentType::Image | ContentType::Pdf => {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(content.trim())
                .map_err(|e| {
                    TaskError::new(
                        ErrorKind::InvalidQuery,
                        format!("{} content must be base64: {}", content_type, e),
                    )
                })?;
            Content::Binary(bytes)
        }
    };

    Ok(Some(Source::Inline {
        content,
        content_type,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn task(description: &str, context: Value) -> Task {
        Task::new(description).with_context(context.as_object().cloned().unwrap_or_default())
    }

    #[test]
    fn test_extract_from_description() {
        let plan = plan(&task("Extract fields {x, y} from doc report-1", json!({})), 5).unwrap();
        match plan {
            Plan::Extract { source, schema } => {
                assert_eq!(source, Source::Document("report-1".into()));
                assert_eq!(schema.names(), vec!["x", "y"]);
            }
            other => panic!("unexpected plan {other:?}"),
        }
    }

    #[test]
    fn test_extract_prefers_inline_content() {
        let plan = plan(
            &task(
                "extract fields {total}",
                json!({"content": "total: 4", "content_type": "table"}),
            ),
            5,
        )
        .unwrap();
        assert!(matches!(
            plan,
            Plan::Extract { source: Source::Inline { content_type: ContentType::Table, .. }, .. }
        ));
    }

    #[test]
    fn test_extract_without_source_is_invalid() {
        let err = plan(&task("extract fields {x}", json!({})), 5).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidQuery);
    }

    #[test]
    fn test_schema_in_context() {
        let plan = plan(
            &task("pull data", json!({"schema": {"amount": "number"}, "document_id": "d"})),
            5,
        )
        .unwrap();
        assert_eq!(plan.summary().kind, "extract");
        assert_eq!(plan.summary().steps, vec!["fetch_document", "extract_information"]);
    }

    #[test]
    fn test_inline_analysis() {
        let plan = plan(&task("summarize", json!({"content": "hello", "query": ""})), 5).unwrap();
        assert_eq!(
            plan,
            Plan::Analyze {
                source: Source::Inline {
                    content: Content::Text("hello".into()),
                    content_type: ContentType::Text
                },
                query: String::new()
            }
        );
    }

    #[test]
    fn test_retrieval_plan() {
        let plan = plan(&task("what is the refund policy?", json!({"k": 3})), 5).unwrap();
        assert_eq!(
            plan,
            Plan::RetrieveThenReason {
                query: "what is the refund policy?".into(),
                k: 3,
                document_id: None
            }
        );
    }

    #[test]
    fn test_whole_document_analysis() {
        let plan = plan(&task("", json!({"document_id": "d", "query": ""})), 5).unwrap();
        assert_eq!(plan.summary().steps, vec!["fetch_document", "analyze_document"]);
    }

    #[test]
    fn test_invalid_tasks() {
        assert_eq!(plan(&task("  ", json!({})), 5).unwrap_err().kind, ErrorKind::InvalidQuery);
        assert_eq!(plan(&task("q", json!({"k": 0})), 5).unwrap_err().kind, ErrorKind::InvalidQuery);
        assert_eq!(
            plan(&task("q", json!({"content": "x", "content_type": "audio"})), 5)
                .unwrap_err()
                .kind,
            ErrorKind::UnsupportedContentType
        );
        assert_eq!(
            plan(&task("q", json!({"content": "not base64!", "content_type": "image"})), 5)
                .unwrap_err()
                .kind,
            ErrorKind::InvalidQuery
        );
    }
}
