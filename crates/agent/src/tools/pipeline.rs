//! Parsing and structural checks for aggregation pipelines written by the model.

use querent_core::domain::tenant::TenantId;
use serde_json::{json, Value};
use thiserror::Error;

/// Stages that write data; pipelines containing them are refused.
const WRITE_STAGES: &[&str] = &["$out", "$merge"];

/// Stages that read documents outside the pipeline's own input.
const CROSS_COLLECTION_STAGES: &[&str] = &["$lookup", "$graphLookup", "$unionWith"];

/// Shell helpers rewritten to their Extended JSON form.
const SHELL_HELPERS: &[(&str, &str)] = &[("ObjectId", "$oid"), ("ISODate", "$date")];

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("pipeline is not valid JSON: {0}")]
    Syntax(String),
    #[error("{}", .0.join("; "))]
    Rejected(Vec<String>),
}

/// Reads a pipeline from tool arguments: either a `pipeline` array or a
/// `query` string such as `db.entities_data.aggregate([...])`.
pub fn pipeline_from_arguments(arguments: &Value) -> Result<Value, PipelineError> {
    if let Some(pipeline) = arguments.get("pipeline") {
        return match pipeline {
            Value::String(text) => parse_pipeline_text(text),
            other => Ok(other.clone()),
        };
    }
    match arguments.get("query").and_then(Value::as_str) {
        Some(text) => parse_pipeline_text(text),
        None => Err(PipelineError::Syntax("expected a `query` string or a `pipeline` array".to_string())),
    }
}

pub fn parse_pipeline_text(text: &str) -> Result<Value, PipelineError> {
    let (Some(open), Some(close)) = (text.find('['), text.rfind(']')) else {
        return Err(PipelineError::Syntax("no `[...]` stage list found".to_string()));
    };
    if close < open {
        return Err(PipelineError::Syntax("unbalanced stage list".to_string()));
    }
    let rewritten = rewrite_shell_helpers(&text[open..=close]);
    serde_json::from_str(&rewritten).map_err(|error| PipelineError::Syntax(error.to_string()))
}

/// Validates stage shape and returns the stages.
pub fn check_pipeline(pipeline: &Value) -> Result<Vec<Value>, PipelineError> {
    let Some(stages) = pipeline.as_array() else {
        return Err(PipelineError::Rejected(vec!["pipeline must be an array of stages".to_string()]));
    };
    if stages.is_empty() {
        return Err(PipelineError::Rejected(vec!["pipeline has no stages".to_string()]));
    }

    let mut problems = Vec::new();
    for (index, stage) in stages.iter().enumerate() {
        let Some(object) = stage.as_object().filter(|object| object.len() == 1) else {
            problems.push(format!("stage {index} must be an object with exactly one operator"));
            continue;
        };
        let Some(operator) = object.keys().next() else {
            continue;
        };
        if !operator.starts_with('$') {
            problems.push(format!("stage {index} operator `{operator}` is not an aggregation stage"));
        } else if WRITE_STAGES.contains(&operator.as_str()) {
            problems.push(format!("stage {index} uses `{operator}`, which writes data"));
        } else if CROSS_COLLECTION_STAGES.contains(&operator.as_str())
            && !is_scopable(operator, &object[operator])
        {
            problems.push(format!("stage {index} `{operator}` needs an object body with an array `pipeline`"));
        }
    }

    if problems.is_empty() {
        Ok(stages.clone())
    } else {
        Err(PipelineError::Rejected(problems))
    }
}

/// `$match` restricting a pipeline to one tenant's active records.
pub fn tenant_scope_stage(tenant_id: &TenantId) -> Value {
    let company = if is_object_id(&tenant_id.0) {
        json!({ "$oid": tenant_id.0 })
    } else {
        json!(tenant_id.0)
    };
    json!({ "$match": { "company": company, "status": "ACTIVE" } })
}

/// Restricts a checked pipeline to one tenant: the scope `$match` goes first,
/// and every `$lookup`, `$graphLookup` and `$unionWith` (nested ones included)
/// gets the same restriction on the documents it pulls in.
pub fn scope_to_tenant(stages: Vec<Value>, tenant_id: &TenantId) -> Vec<Value> {
    let scope = tenant_scope_stage(tenant_id);
    std::iter::once(scope.clone()).chain(stages.into_iter().map(|stage| scope_stage(stage, &scope))).collect()
}

fn scope_stage(stage: Value, scope: &Value) -> Value {
    let Value::Object(mut object) = stage else {
        return stage;
    };
    let filter = &scope["$match"];
    for (operator, body) in object.iter_mut() {
        match operator.as_str() {
            "$lookup" => scope_sub_pipeline(body, scope),
            "$unionWith" => {
                if let Value::String(collection) = body {
                    *body = json!({ "coll": collection });
                }
                scope_sub_pipeline(body, scope);
            }
            "$graphLookup" => {
                if let Value::Object(options) = body {
                    let restricted = match options.remove("restrictSearchWithMatch") {
                        Some(existing) => json!({ "$and": [existing, filter] }),
                        None => filter.clone(),
                    };
                    options.insert("restrictSearchWithMatch".to_string(), restricted);
                }
            }
            "$facet" => {
                if let Value::Object(facets) = body {
                    for branch in facets.values_mut() {
                        if let Value::Array(stages) = branch {
                            let nested = std::mem::take(stages);
                            *stages = nested.into_iter().map(|stage| scope_stage(stage, scope)).collect();
                        }
                    }
                }
            }
            _ => {}
        }
    }
    Value::Object(object)
}

/// Prepends the scope to the stage's `pipeline`, creating it when absent.
fn scope_sub_pipeline(body: &mut Value, scope: &Value) {
    let Value::Object(options) = body else {
        return;
    };
    let nested = match options.remove("pipeline") {
        Some(Value::Array(stages)) => stages,
        _ => Vec::new(),
    };
    let scoped: Vec<Value> =
        std::iter::once(scope.clone()).chain(nested.into_iter().map(|stage| scope_stage(stage, scope))).collect();
    options.insert("pipeline".to_string(), Value::Array(scoped));
}

/// Whether the pipeline already filters on the tenant's company.
pub fn mentions_tenant(stages: &[Value], tenant_id: &TenantId) -> bool {
    stages.iter().any(|stage| {
        stage
            .get("$match")
            .and_then(|filter| filter.get("company"))
            .is_some_and(|company| {
                company.as_str() == Some(tenant_id.0.as_str())
                    || company.get("$oid").and_then(Value::as_str) == Some(tenant_id.0.as_str())
            })
    })
}

/// Cross-collection stages must have a shape the tenant scope can be put into.
fn is_scopable(operator: &str, body: &Value) -> bool {
    match (operator, body) {
        ("$unionWith", Value::String(_)) => true,
        (_, Value::Object(options)) => options.get("pipeline").map_or(true, Value::is_array),
        _ => false,
    }
}

fn is_object_id(value: &str) -> bool {
    value.len() == 24 && value.chars().all(|c| c.is_ascii_hexdigit())
}

/// `ObjectId("x")` -> `{"$oid": "x"}`, `ISODate("x")` -> `{"$date": "x"}`.
fn rewrite_shell_helpers(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut rest = text;
    loop {
        let next = SHELL_HELPERS
            .iter()
            .filter_map(|(name, key)| rest.find(&format!("{name}(")).map(|at| (at, *name, *key)))
            .min_by_key(|(at, _, _)| *at);
        let Some((at, name, key)) = next else {
            output.push_str(rest);
            return output;
        };

        let call_start = at + name.len() + 1;
        match quoted_argument(&rest[call_start..]) {
            Some((argument, consumed)) => {
                output.push_str(rest[..at].trim_end_matches("new "));
                output.push_str(&format!("{{\"{key}\": {}}}", Value::String(argument.to_string())));
                rest = &rest[call_start + consumed..];
            }
            None => {
                output.push_str(&rest[..call_start]);
                rest = &rest[call_start..];
            }
        }
    }
}

/// Parses `"value")` or `'value')`; returns the value and bytes consumed.
fn quoted_argument(text: &str) -> Option<(&str, usize)> {
    let leading = text.len() - text.trim_start().len();
    let body = &text[leading..];
    let quote = body.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let close = body[1..].find(quote)? + 1;
    let after = &body[close + 1..];
    let padding = after.len() - after.trim_start().len();
    after[padding..].starts_with(')').then(|| (&body[1..close], leading + close + 1 + padding + 1))
}
