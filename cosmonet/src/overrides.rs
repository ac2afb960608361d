//! Dotted-path overrides for genesis (JSON) and node/app config (TOML) documents.
//!
//! Both formats are patched through the same tree, a [`serde_json::Value`]. Paths are
//! split on `.`:
//!
//! * a segment that parses as an unsigned integer indexes into an array, if the node it
//!   applies to is an array. The index may name an existing item or the slot right after
//!   the last one, which appends. Anything further is rejected.
//! * any other segment is an object key. Missing intermediate nodes are created as
//!   objects, and a scalar found part way down a path is replaced by an object.
//! * empty segments (`a..b`, a leading or trailing `.`) are rejected.
use std::{collections::BTreeMap, path::Path};

use anyhow::{Context as _, Result, anyhow};
use serde_json::{Map, Value};

use crate::error::TestnetError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    Key(&'a str),
    Index(usize),
}

pub fn parse_path(path: &str) -> Result<Vec<Segment<'_>>> {
    path.split('.')
        .map(|part| -> Result<Segment<'_>> {
            if part.is_empty() {
                Err(TestnetError::invalid(format!("override path `{path}` has an empty segment")).into())
            } else if let Ok(index) = part.parse::<usize>() {
                Ok(Segment::Index(index))
            } else {
                Ok(Segment::Key(part))
            }
        })
        .collect()
}

/// Set `value` at `path` inside `doc`.
pub fn set_path(doc: &mut Value, path: &str, value: Value) -> Result<()> {
    let segments = parse_path(path)?;
    let mut node = doc;
    for segment in &segments {
        node = child_mut(node, segment, path)?;
    }
    *node = value;
    Ok(())
}

fn child_mut<'v>(node: &'v mut Value, segment: &Segment<'_>, path: &str) -> Result<&'v mut Value> {
    match (segment, node.is_array()) {
        (Segment::Index(index), true) => {
            let Value::Array(items) = node else {
                unreachable!("checked above")
            };
            let len = items.len();
            if *index == len {
                items.push(Value::Null);
            }
            items.get_mut(*index).ok_or_else(|| {
                TestnetError::invalid(format!(
                    "override path `{path}`: index {index} is past the end of an array of {len}"
                ))
                .into()
            })
        }
        _ => {
            let key = match segment {
                Segment::Key(key) => key.to_string(),
                Segment::Index(index) => index.to_string(),
            };
            if !node.is_object() {
                *node = Value::Object(Map::new());
            }
            let Value::Object(map) = node else {
                unreachable!("replaced above")
            };
            Ok(map.entry(key).or_insert(Value::Null))
        }
    }
}

/// Apply every override in `overrides`. Keys are applied in sorted order, so a parent
/// path is always written before its children.
pub fn apply(doc: &mut Value, overrides: &BTreeMap<String, Value>) -> Result<()> {
    for (path, value) in overrides {
        set_path(doc, path, value.clone())?;
    }
    Ok(())
}

pub fn toml_to_json(value: toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::from(i),
        toml::Value::Float(f) => Value::from(f),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(d) => Value::String(d.to_string()),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

/// Whether a null appears anywhere in `value`. TOML has no way to write one.
pub fn contains_null(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.iter().any(contains_null),
        Value::Object(map) => map.values().any(contains_null),
        _ => false,
    }
}

pub fn json_to_toml(value: Value) -> Result<toml::Value> {
    Ok(match value {
        Value::Null => return Err(anyhow!("null cannot be represented in TOML")),
        Value::Bool(b) => toml::Value::Boolean(b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                toml::Value::Integer(i)
            } else {
                toml::Value::Float(
                    n.as_f64()
                        .ok_or_else(|| anyhow!("{n} cannot be represented in TOML"))?,
                )
            }
        }
        Value::String(s) => toml::Value::String(s),
        Value::Array(items) => toml::Value::Array(
            items
                .into_iter()
                .map(json_to_toml)
                .collect::<Result<Vec<_>>>()?,
        ),
        Value::Object(map) => {
            let mut table = toml::Table::new();
            for (k, v) in map {
                let v = json_to_toml(v).with_context(|| format!("at key `{k}`"))?;
                table.insert(k, v);
            }
            toml::Value::Table(table)
        }
    })
}

pub fn patch_json_str(contents: &str, overrides: &BTreeMap<String, Value>) -> Result<String> {
    let mut doc: Value = serde_json::from_str(contents)?;
    apply(&mut doc, overrides)?;
    Ok(serde_json::to_string_pretty(&doc)?)
}

pub fn patch_toml_str(contents: &str, overrides: &BTreeMap<String, Value>) -> Result<String> {
    let parsed: toml::Table = toml::from_str(contents)?;
    let mut doc = toml_to_json(toml::Value::Table(parsed));
    apply(&mut doc, overrides)?;
    to_toml_string(doc)
}

pub fn to_toml_string(doc: Value) -> Result<String> {
    match json_to_toml(doc)? {
        toml::Value::Table(table) => Ok(toml::to_string(&table)?),
        other => Err(anyhow!("a TOML document must be a table, not {}", other.type_str())),
    }
}

/// Rewrite a genesis file in place.
pub async fn patch_json_file(file: &Path, overrides: &BTreeMap<String, Value>) -> Result<()> {
    let contents = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Cannot read {}", file.display()))?;
    let patched = patch_json_str(&contents, overrides)
        .with_context(|| format!("Cannot patch {}", file.display()))?;
    tokio::fs::write(file, patched)
        .await
        .with_context(|| format!("Cannot write {}", file.display()))
}

/// Rewrite a TOML config file in place.
pub async fn patch_toml_file(file: &Path, overrides: &BTreeMap<String, Value>) -> Result<()> {
    let contents = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Cannot read {}", file.display()))?;
    let patched = patch_toml_str(&contents, overrides)
        .with_context(|| format!("Cannot patch {}", file.display()))?;
    tokio::fs::write(file, patched)
        .await
        .with_context(|| format!("Cannot write {}", file.display()))
}
