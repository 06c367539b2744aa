//! JSON boundary for the code search tool.
//!
//! Arguments arrive as untyped JSON. They are validated into a
//! [`SearchToolInput`], run through the [`HybridSearcher`], and the outcome
//! is always returned as JSON, whether it is results, a search failure or a
//! list of validation issues.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::chunker::ChunkKind;
use crate::search::{HybridSearcher, SearchResponse};

pub const TOOL_NAME: &str = "search_code";

pub const DEFAULT_TOOL_LIMIT: usize = 20;

pub const MAX_TOOL_LIMIT: usize = 50;

/// Accepted values of the `type` argument.
pub const TYPE_VALUES: [&str; 8] = [
    "all",
    "function",
    "class",
    "component",
    "hook",
    "interface",
    "type",
    "unknown",
];

/// Raw tool arguments as the caller sends them. The input schema is derived
/// from this type; value rules are checked by [`SearchToolInput::validate`].
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SearchToolArgs {
    #[schemars(
        description = "Words, identifiers or a natural-language description",
        length(min = 1)
    )]
    pub query: String,

    #[schemars(
        description = "Maximum number of files to return (default: 20)",
        range(min = 1, max = 50)
    )]
    pub limit: Option<i64>,

    #[serde(rename = "type")]
    #[schemars(
        description = "Restrict results to one kind of symbol (default: all)",
        extend(
            "enum" = [
                "all", "function", "class", "component", "hook", "interface", "type", "unknown"
            ],
            "default" = "all"
        )
    )]
    pub kind: Option<String>,
}

/// Validated tool arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchToolInput {
    pub query: String,
    pub limit: usize,
    /// `None` for `all`
    pub kind: Option<ChunkKind>,
}

/// One problem with the tool arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub path: String,
    pub message: String,
}

impl ValidationIssue {
    fn new(path: &str, message: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            message: message.into(),
        }
    }
}

/// What the tool hands back to its caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ToolOutput {
    Response(SearchResponse),
    Invalid {
        error: String,
        issues: Vec<ValidationIssue>,
    },
}

impl SearchToolInput {
    /// Validate with the standard default limit.
    pub fn validate(args: &Value) -> Result<Self, Vec<ValidationIssue>> {
        Self::validate_with_default(args, DEFAULT_TOOL_LIMIT)
    }

    /// Deserialize raw arguments into [`SearchToolArgs`], then check the
    /// value rules, collecting every issue rather than stopping at the first.
    ///
    /// A malformed document (wrong JSON types, missing `query`) is reported
    /// as one issue at path `""` carrying the deserializer's message.
    pub fn validate_with_default(
        args: &Value,
        default_limit: usize,
    ) -> Result<Self, Vec<ValidationIssue>> {
        if !args.is_object() {
            return Err(vec![ValidationIssue::new("", "arguments must be a JSON object")]);
        }
        let raw: SearchToolArgs = serde_json::from_value(args.clone())
            .map_err(|e| vec![ValidationIssue::new("", e.to_string())])?;

        let mut issues = Vec::new();

        if raw.query.trim().is_empty() {
            issues.push(ValidationIssue::new("query", "must not be empty"));
        }

        let limit = match raw.limit {
            None => Some(default_limit.clamp(1, MAX_TOOL_LIMIT)),
            Some(v) if (1..=MAX_TOOL_LIMIT as i64).contains(&v) => Some(v as usize),
            Some(_) => {
                issues.push(ValidationIssue::new(
                    "limit",
                    format!("must be between 1 and {}", MAX_TOOL_LIMIT),
                ));
                None
            }
        };

        let kind = match raw.kind.as_deref() {
            None | Some("all") => Some(None),
            Some(value) => match value.parse::<ChunkKind>() {
                Ok(kind) => Some(Some(kind)),
                Err(_) => {
                    issues.push(ValidationIssue::new(
                        "type",
                        format!("must be one of: {}", TYPE_VALUES.join(", ")),
                    ));
                    None
                }
            },
        };

        match (limit, kind) {
            (Some(limit), Some(kind)) if issues.is_empty() => Ok(Self {
                query: raw.query,
                limit,
                kind,
            }),
            _ => Err(issues),
        }
    }
}

/// Tool descriptor with the input schema derived from [`SearchToolArgs`].
pub fn tool_definition() -> Value {
    json!({
        "name": TOOL_NAME,
        "description": "Search the codebase by keyword and meaning. \
            Returns files with line ranges and previews.",
        "inputSchema": schemars::schema_for!(SearchToolArgs).to_value(),
    })
}

/// Validate `args`, run the search and return the outcome.
pub async fn execute(searcher: &HybridSearcher, args: &Value) -> ToolOutput {
    match SearchToolInput::validate_with_default(args, searcher.config().default_limit) {
        Ok(input) => {
            debug!("Running {} with {:?}", TOOL_NAME, input);
            ToolOutput::Response(searcher.search(&input.query, input.limit, input.kind).await)
        }
        Err(issues) => ToolOutput::Invalid {
            error: "Invalid search arguments".to_string(),
            issues,
        },
    }
}

/// Like [`execute`] but serialized. Always returns a JSON object.
pub async fn run_search_tool(searcher: &HybridSearcher, args: &Value) -> Value {
    let output = execute(searcher, args).await;
    serde_json::to_value(&output).unwrap_or_else(|e| {
        json!({
            "error": format!("Failed to serialize search output: {}", e),
            "suggestion": "Report this as a bug",
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issues(args: Value) -> Vec<ValidationIssue> {
        SearchToolInput::validate(&args).unwrap_err()
    }

    /// Every value stored under `key` anywhere in `value`.
    fn find_all<'a>(value: &'a Value, key: &str, out: &mut Vec<&'a Value>) {
        match value {
            Value::Object(map) => {
                for (k, v) in map {
                    if k == key {
                        out.push(v);
                    }
                    find_all(v, key, out);
                }
            }
            Value::Array(items) => items.iter().for_each(|v| find_all(v, key, out)),
            _ => {}
        }
    }

    #[test]
    fn test_defaults() {
        let input = SearchToolInput::validate(&json!({"query": "contact list"})).unwrap();
        assert_eq!(input.query, "contact list");
        assert_eq!(input.limit, 20);
        assert!(input.kind.is_none());
    }

    #[test]
    fn test_explicit_values() {
        let args = json!({"query": "useDeals", "limit": 50, "type": "hook"});
        let input = SearchToolInput::validate(&args).unwrap();
        assert_eq!(input.limit, 50);
        assert_eq!(input.kind, Some(ChunkKind::Hook));

        let input = SearchToolInput::validate(&json!({"query": "x", "type": "all"})).unwrap();
        assert!(input.kind.is_none());

        let args = json!({"query": "x", "type": "unknown"});
        let input = SearchToolInput::validate(&args).unwrap();
        assert_eq!(input.kind, Some(ChunkKind::Unknown));

        let args = json!({"query": "x", "limit": null, "type": null});
        let input = SearchToolInput::validate(&args).unwrap();
        assert_eq!(input.limit, 20);
        assert!(input.kind.is_none());
    }

    #[test]
    fn test_custom_default_limit_is_clamped() {
        let input = SearchToolInput::validate_with_default(&json!({"query": "q"}), 500).unwrap();
        assert_eq!(input.limit, 50);
    }

    #[test]
    fn test_empty_query() {
        let found = issues(json!({"query": "   "}));
        assert_eq!(found, vec![ValidationIssue::new("query", "must not be empty")]);
    }

    #[test]
    fn test_missing_query() {
        let found = issues(json!({"limit": 5}));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].path, "");
        assert!(found[0].message.contains("query"));
    }

    #[test]
    fn test_limit_bounds() {
        for bad in [json!(0), json!(51), json!(-3)] {
            let found = issues(json!({"query": "q", "limit": bad}));
            assert_eq!(found.len(), 1);
            assert_eq!(found[0].path, "limit");
            assert!(found[0].message.contains("between 1 and 50"));
        }

        for bad in [json!(2.5), json!("10")] {
            let found = issues(json!({"query": "q", "limit": bad}));
            assert_eq!(found.len(), 1);
            assert!(found[0].message.contains("invalid type"));
        }
    }

    #[test]
    fn test_bad_type() {
        let found = issues(json!({"query": "q", "type": "module"}));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].path, "type");
        assert!(found[0].message.contains("component"));
    }

    #[test]
    fn test_collects_all_issues() {
        let found = issues(json!({"query": " ", "limit": 99, "type": "module"}));
        let paths: Vec<&str> = found.iter().map(|i| i.path.as_str()).collect();
        assert_eq!(paths, vec!["query", "limit", "type"]);
    }

    #[test]
    fn test_wrong_json_types() {
        let found = issues(json!({"query": 5}));
        assert_eq!(found.len(), 1);
        assert!(found[0].message.contains("invalid type"));
    }

    #[test]
    fn test_non_object_arguments() {
        let found = issues(json!("find contacts"));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].path, "");
    }

    #[test]
    fn test_invalid_output_shape() {
        let output = ToolOutput::Invalid {
            error: "Invalid search arguments".to_string(),
            issues: vec![ValidationIssue::new("query", "is required")],
        };
        let value = serde_json::to_value(&output).unwrap();
        assert_eq!(
            value,
            json!({
                "error": "Invalid search arguments",
                "issues": [{"path": "query", "message": "is required"}]
            })
        );
    }

    #[test]
    fn test_tool_definition() {
        let def = tool_definition();
        assert_eq!(def["name"], TOOL_NAME);

        let schema = &def["inputSchema"];
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["required"], json!(["query"]));
        assert!(schema["properties"]["query"]["description"].is_string());

        let mut maximums = Vec::new();
        find_all(&schema["properties"]["limit"], "maximum", &mut maximums);
        assert!(maximums.contains(&&json!(50)));

        let mut enums = Vec::new();
        find_all(schema, "enum", &mut enums);
        let values: Vec<&str> = enums
            .iter()
            .filter_map(|e| e.as_array())
            .flatten()
            .filter_map(Value::as_str)
            .collect();
        for expected in ["all", "function", "component", "hook", "type", "unknown"] {
            assert!(values.contains(&expected), "missing {}", expected);
        }
    }

    #[test]
    fn test_schema_enum_matches_accepted_types() {
        let def = tool_definition();
        let property = &def["inputSchema"]["properties"]["type"];
        let listed: Vec<&str> = property["enum"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert_eq!(listed, TYPE_VALUES);
        assert_eq!(property["default"], "all");

        for value in TYPE_VALUES {
            let args = json!({"query": "q", "type": value});
            assert!(SearchToolInput::validate(&args).is_ok(), "rejected {}", value);
        }
    }
}
