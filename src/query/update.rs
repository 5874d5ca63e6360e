use crate::errors::DbError;
use crate::types::Record;
use serde_json::{Map, Number, Value};

/// Applies an update specification to a record and returns the new record.
///
/// Two operator groups are supported, `$set` and `$inc`, both mapping dotted
/// paths to values. `$inc` is applied before `$set`, so a literal `$set` on
/// the same path wins deterministically.
///
/// # Errors
/// Returns `MalformedUpdate` if the specification carries an unknown operator
/// group, a group that is not a mapping, or `$inc` touches a non-numeric
/// value on either side.
pub fn apply(record: &Record, update: &Record) -> Result<Record, DbError> {
    for key in update.keys() {
        if key != "$set" && key != "$inc" {
            return Err(DbError::MalformedUpdate(format!("unsupported operator group: {key}")));
        }
    }
    let mut out = record.clone();
    if let Some(inc) = update.get("$inc") {
        for (path, delta) in as_group(inc, "$inc")? {
            inc_path(&mut out, path, delta)?;
        }
    }
    if let Some(set) = update.get("$set") {
        for (path, value) in as_group(set, "$set")? {
            set_path(&mut out, path, value.clone());
        }
    }
    Ok(out)
}

fn as_group<'a>(v: &'a Value, name: &str) -> Result<&'a Map<String, Value>, DbError> {
    v.as_object().ok_or_else(|| DbError::MalformedUpdate(format!("{name} must be a mapping")))
}

/// Sets the leaf of `path` to `value`, creating intermediate mappings as
/// needed. A non-mapping intermediate is replaced by a mapping.
fn set_path(root: &mut Record, path: &str, value: Value) {
    let (parent, leaf) = traverse_to_parent(root, path);
    parent.insert(leaf, value);
}

fn inc_path(root: &mut Record, path: &str, delta: &Value) -> Result<(), DbError> {
    let Value::Number(delta) = delta else {
        return Err(DbError::MalformedUpdate(format!("$inc delta for {path} must be numeric")));
    };
    let (parent, leaf) = traverse_to_parent(root, path);
    let current = match parent.get(&leaf) {
        None => Number::from(0),
        Some(Value::Number(n)) => n.clone(),
        Some(other) => {
            return Err(DbError::MalformedUpdate(format!(
                "$inc target {path} is non-numeric: {other}"
            )));
        }
    };
    let sum = add_numbers(&current, delta).ok_or_else(|| {
        DbError::MalformedUpdate(format!("$inc on {path} does not produce a finite number"))
    })?;
    parent.insert(leaf, Value::Number(sum));
    Ok(())
}

/// Integer addition when both sides are integral, float otherwise.
fn add_numbers(a: &Number, b: &Number) -> Option<Number> {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return x.checked_add(y).map(Number::from);
    }
    let sum = a.as_f64()? + b.as_f64()?;
    Number::from_f64(sum)
}

fn traverse_to_parent<'a>(root: &'a mut Record, path: &str) -> (&'a mut Record, String) {
    let mut cur = root;
    let mut iter = path.split('.').peekable();
    let mut last = String::new();
    while let Some(seg) = iter.next() {
        if iter.peek().is_none() {
            last = seg.to_string();
            break;
        }
        cur = ensure_submap(cur, seg);
    }
    (cur, last)
}

fn ensure_submap<'a>(root: &'a mut Record, key: &str) -> &'a mut Record {
    let needs_new = !matches!(root.get(key), Some(Value::Object(_)));
    if needs_new {
        root.insert(key.to_string(), Value::Object(Map::new()));
    }
    match root.get_mut(key) {
        Some(Value::Object(m)) => m,
        _ => unreachable!(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(v: serde_json::Value) -> Record {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn set_creates_intermediate_paths() {
        let doc = rec(json!({"a": 1}));
        let out = apply(&doc, &rec(json!({"$set": {"b.c.d": 5, "a": 2}}))).unwrap();
        assert_eq!(out["a"], json!(2));
        assert_eq!(out["b"]["c"]["d"], json!(5));
    }

    #[test]
    fn set_replaces_non_mapping_intermediate() {
        let doc = rec(json!({"a": "scalar"}));
        let out = apply(&doc, &rec(json!({"$set": {"a.b": 1}}))).unwrap();
        assert_eq!(out["a"]["b"], json!(1));
    }

    #[test]
    fn inc_from_absent_starts_at_zero() {
        let doc = rec(json!({}));
        let out = apply(&doc, &rec(json!({"$inc": {"activity.journal_entries": 3}}))).unwrap();
        assert_eq!(out["activity"]["journal_entries"], json!(3));
    }

    #[test]
    fn inc_preserves_integers_and_mixes_to_float() {
        let doc = rec(json!({"n": 1, "f": 1.5}));
        let out = apply(&doc, &rec(json!({"$inc": {"n": 2, "f": 0.5}}))).unwrap();
        assert_eq!(out["n"], json!(3));
        assert_eq!(out["f"], json!(2.0));
    }

    #[test]
    fn inc_on_non_numeric_is_malformed() {
        let doc = rec(json!({"name": "alice"}));
        let err = apply(&doc, &rec(json!({"$inc": {"name": 1}}))).unwrap_err();
        assert!(matches!(err, DbError::MalformedUpdate(_)));

        let err = apply(&doc, &rec(json!({"$inc": {"x": "one"}}))).unwrap_err();
        assert!(matches!(err, DbError::MalformedUpdate(_)));
    }

    #[test]
    fn set_wins_over_inc_on_same_path() {
        let doc = rec(json!({"count": 10}));
        let out = apply(&doc, &rec(json!({"$inc": {"count": 5}, "$set": {"count": 1}}))).unwrap();
        assert_eq!(out["count"], json!(1));
    }

    #[test]
    fn unknown_group_is_malformed() {
        let doc = rec(json!({}));
        let err = apply(&doc, &rec(json!({"$unset": {"a": 1}}))).unwrap_err();
        assert!(matches!(err, DbError::MalformedUpdate(_)));
    }

    #[test]
    fn original_record_is_untouched() {
        let doc = rec(json!({"count": 1}));
        let _ = apply(&doc, &rec(json!({"$inc": {"count": 1}}))).unwrap();
        assert_eq!(doc["count"], json!(1));
    }
}
