use crate::types::Record;
use serde_json::Value;
use std::cmp::Ordering;

/// Evaluates `filter` against `record`.
///
/// Filter keys are AND'd. A key maps either to a literal value (equality) or
/// to an operator mapping (`$gte`, `$lte`, `$in`, `$regex` with a sibling
/// `$options`). The reserved key `$or` holds a list of sub-filters, at least
/// one of which must match in addition to the filter's other keys. An absent
/// field never matches, equality against null included.
#[must_use]
pub fn matches(record: &Record, filter: &Record) -> bool {
    for (key, cond) in filter {
        if key == "$or" {
            let Value::Array(branches) = cond else {
                return false;
            };
            let hit = branches.iter().any(|branch| match branch {
                Value::Object(sub) => matches(record, sub),
                _ => false,
            });
            if !hit {
                return false;
            }
            continue;
        }
        let field = record.get(key);
        let ok = match cond {
            Value::Object(ops) if is_operator_map(ops) => {
                field.is_some_and(|v| eval_operators(v, ops))
            }
            literal => field == Some(literal),
        };
        if !ok {
            return false;
        }
    }
    true
}

/// A condition object is an operator mapping when any key is `$`-prefixed;
/// otherwise it is a literal to compare for equality.
pub(crate) fn is_operator_map(ops: &Record) -> bool {
    ops.keys().any(|k| k.starts_with('$'))
}

fn eval_operators(value: &Value, ops: &Record) -> bool {
    for (op, arg) in ops {
        let ok = match op.as_str() {
            "$gte" => compare(value, arg).is_some_and(|o| o != Ordering::Less),
            "$lte" => compare(value, arg).is_some_and(|o| o != Ordering::Greater),
            "$in" => match arg {
                Value::Array(set) => set.contains(value),
                _ => false,
            },
            "$regex" => regex_match(value, arg, ops.get("$options")),
            // Consumed by $regex.
            "$options" => continue,
            _ => false,
        };
        if !ok {
            return false;
        }
    }
    true
}

/// Ordered comparison for `$gte`/`$lte`: numeric for numbers, lexicographic
/// for strings (which orders ISO-8601 timestamps chronologically). Mixed or
/// unordered types do not compare.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            x.as_f64().zip(y.as_f64()).and_then(|(x, y)| x.partial_cmp(&y))
        }
        (Value::String(x), Value::String(y)) => Some(x.as_str().cmp(y.as_str())),
        _ => None,
    }
}

fn regex_match(value: &Value, pattern: &Value, options: Option<&Value>) -> bool {
    let (Value::String(s), Value::String(pat)) = (value, pattern) else {
        return false;
    };
    let case_insensitive = matches!(options, Some(Value::String(o)) if o.contains('i'));
    let mut builder = regex::RegexBuilder::new(pat);
    builder.case_insensitive(case_insensitive);
    if let Ok(re) = builder.build() { re.is_match(s) } else { false }
}
