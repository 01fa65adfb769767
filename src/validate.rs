use jsonschema::{Draft, JSONSchema};
use serde_json::Value;
use anyhow::{anyhow, Result, bail};
use std::collections::HashSet;


pub struct Validator {
compiled: JSONSchema,
}


impl Validator {
pub fn new(schema: &serde_json::Value) -> Result<Self> {
let compiled = JSONSchema::options()
    .with_draft(Draft::Draft202012)
    .compile(schema)
    .map_err(|e| anyhow!("invalid schema at {}: {}", e.schema_path, e))?;
Ok(Self { compiled })
}


/// Validator for the run configuration file.
pub fn for_run_config() -> Result<Self> {
let schema: Value = serde_json::from_str(include_str!("../schema/run_config.schema.json"))?;
Self::new(&schema)
}


pub fn validate_and_fix(&self, mut v: Value) -> Result<Value> {
// quick invariants not expressible in schema
if let Some(obj) = v.as_object_mut() {
// blank optional column names mean "not configured"
for key in ["system_prompt_column", "reference_response_column", "dataset_subdir", "metrics_file"] {
if obj.get(key).and_then(|x| x.as_str()).is_some_and(|s| s.trim().is_empty()) {
obj.insert(key.to_string(), Value::Null);
}
}
}


// model ids must be unique once trimmed
if let Some(models) = v.get_mut("models").and_then(|m| m.as_array_mut()) {
let mut seen = HashSet::new();
for m in models.iter_mut() {
if let Some(id) = m.as_str() {
let id = id.trim().to_string();
if !seen.insert(id.clone()) { bail!("duplicate model id: {}", id); }
*m = Value::String(id);
}
}
}


if let Err(errors) = self.compiled.validate(&v) {
let msgs: Vec<String> = errors.map(|e| format!("{}: {}", e.instance_path, e)).collect();
bail!("config schema error at {}", msgs.join("; "));
}
Ok(v)
}
}
