//! Rule files on disk, JSON or YAML. Parsing goes through the same
//! validating boundary as the store: individually malformed records are
//! quarantined, not fatal; only an unreadable path is an error.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::error::{EngineError, Result};
use crate::rule::Rule;
use crate::store::{DeadLetter, RuleStore};

/// Outcome of loading one path: the rules that passed validation and the
/// records that did not.
#[derive(Debug, Default)]
pub struct LoadedRules {
    pub rules: Vec<Rule>,
    pub dead_letters: Vec<DeadLetter>,
}

pub fn load_rules(path: impl AsRef<Path>) -> Result<LoadedRules> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(EngineError::MissingPath(path.display().to_string()));
    }

    let mut raw_records = if path.is_dir() {
        load_from_directory(path)?
    } else {
        load_from_file(path)?
    };

    let staging = RuleStore::new();
    let mut loaded = LoadedRules::default();
    let mut seen = HashSet::new();
    for raw in raw_records.drain(..) {
        let Some(stored) = staging.ingest("loader", raw.clone(), None) else {
            continue;
        };
        if !seen.insert(stored.rule.id.clone()) {
            staging.quarantine(
                "loader",
                raw,
                format!("duplicate rule identifier: {}", stored.rule.id),
            );
            continue;
        }
        loaded.rules.push(stored.rule);
    }
    loaded.dead_letters = staging.dead_letters("loader");

    Ok(loaded)
}

fn load_from_directory(path: &Path) -> Result<Vec<Value>> {
    let mut records = Vec::new();
    for entry in fs::read_dir(path).map_err(|err| EngineError::from_io(path, err))? {
        let entry = entry.map_err(|err| EngineError::from_io(path, err))?;
        let file_type = entry
            .file_type()
            .map_err(|err| EngineError::from_io(entry.path(), err))?;
        if file_type.is_dir() {
            continue;
        }
        if let Some(ext) = entry.path().extension().and_then(|value| value.to_str()) {
            if matches!(ext, "json" | "yaml" | "yml") {
                records.append(&mut load_from_file(&entry.path())?);
            }
        }
    }
    Ok(records)
}

fn load_from_file(path: &Path) -> Result<Vec<Value>> {
    let raw = fs::read_to_string(path).map_err(|err| EngineError::from_io(path, err))?;
    parse_records(&raw, path)
}

/// Accepts a `{rules: [...]}` document, a bare list, or a single record.
/// YAML is a superset of JSON here, so one parser covers both extensions.
fn parse_records(raw: &str, path: &Path) -> Result<Vec<Value>> {
    let document: Value = serde_yaml::from_str(raw)
        .map_err(|err| EngineError::parse_error(path, err.to_string()))?;

    match document {
        Value::Object(mut map) if map.contains_key("rules") => match map.remove("rules") {
            Some(Value::Array(items)) => Ok(items),
            Some(other) => Ok(vec![other]),
            None => Ok(Vec::new()),
        },
        Value::Array(items) => Ok(items),
        single @ Value::Object(_) => Ok(vec![single]),
        other => Err(EngineError::parse_error(
            path,
            format!("expected a rules document, found {other}"),
        )),
    }
}
