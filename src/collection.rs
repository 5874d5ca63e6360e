use crate::errors::DbError;
use crate::query;
use crate::query::filter::is_operator_map;
use crate::types::{CollectionName, DocumentId, ID_FIELD, Record};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Outcome of `update_one`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UpdateReport {
    pub matched: bool,
    pub upserted_id: Option<DocumentId>,
}

/// Outcome of `delete_one`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeleteReport {
    pub deleted: bool,
}

/// A named collection backed by one JSON file holding an array of records in
/// insertion order.
///
/// Every mutation reads the file, computes the new state, and rewrites the
/// whole file. There is no internal locking and no write-ahead log: callers
/// serialize concurrent writers externally, and a failure mid-rewrite can
/// leave the file truncated or stale.
pub struct Collection {
    name: CollectionName,
    path: PathBuf,
}

impl Collection {
    pub(crate) fn new(dir: &Path, name: &str) -> Result<Self, DbError> {
        let path = dir.join(format!("{name}.json"));
        if !path.exists() {
            fs::write(&path, "[]")?;
        }
        Ok(Self { name: name.to_string(), path })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// First record matching `filter`, in collection order.
    pub fn find_one(&self, filter: &Record) -> Result<Option<Record>, DbError> {
        Ok(self.read_records()?.into_iter().find(|r| query::matches(r, filter)))
    }

    /// All records matching `filter`; all records when `filter` is `None`.
    /// Eager and restartable, not a live cursor.
    pub fn find(&self, filter: Option<&Record>) -> Result<Vec<Record>, DbError> {
        let records = self.read_records()?;
        Ok(match filter {
            Some(f) => records.into_iter().filter(|r| query::matches(r, f)).collect(),
            None => records,
        })
    }

    /// Appends a record and returns the identifier under which it was stored,
    /// generating one when the record carries none.
    ///
    /// # Errors
    /// `UniquenessViolation` when an explicit `_id` already exists in the
    /// collection.
    pub fn insert_one(&self, mut record: Record) -> Result<DocumentId, DbError> {
        let mut records = self.read_records()?;
        let id = ensure_id(&mut record)?;
        if records.iter().any(|r| record_id(r) == Some(id.as_str())) {
            return Err(DbError::UniquenessViolation(format!(
                "duplicate _id {id} in collection {}",
                self.name
            )));
        }
        records.push(record);
        self.write_records(&records)?;
        Ok(id)
    }

    /// Replaces the first record matching `filter` with the update applied to
    /// it; the record keeps its identifier.
    ///
    /// With `upsert` and no match, a new record is synthesized from the
    /// filter's literal (non-operator) fields with the full update applied:
    /// `$set` values as given, `$inc` deltas counted from zero.
    pub fn update_one(
        &self,
        filter: &Record,
        update: &Record,
        upsert: bool,
    ) -> Result<UpdateReport, DbError> {
        let mut records = self.read_records()?;
        if let Some(pos) = records.iter().position(|r| query::matches(r, filter)) {
            let prior_id = records[pos].get(ID_FIELD).cloned();
            let mut updated = query::apply(&records[pos], update)?;
            if let Some(id) = prior_id {
                updated.insert(ID_FIELD.to_string(), id);
            }
            records[pos] = updated;
            self.write_records(&records)?;
            return Ok(UpdateReport { matched: true, upserted_id: None });
        }
        if !upsert {
            return Ok(UpdateReport::default());
        }
        let base = literal_fields(filter);
        let mut synthesized = query::apply(&base, update)?;
        let id = ensure_id(&mut synthesized)?;
        // A literal _id in the filter can collide with a record the filter's
        // other keys excluded.
        if records.iter().any(|r| record_id(r) == Some(id.as_str())) {
            return Err(DbError::UniquenessViolation(format!(
                "duplicate _id {id} in collection {}",
                self.name
            )));
        }
        records.push(synthesized);
        self.write_records(&records)?;
        Ok(UpdateReport { matched: false, upserted_id: Some(id) })
    }

    /// Removes the first record matching `filter`.
    pub fn delete_one(&self, filter: &Record) -> Result<DeleteReport, DbError> {
        let mut records = self.read_records()?;
        match records.iter().position(|r| query::matches(r, filter)) {
            Some(pos) => {
                records.remove(pos);
                self.write_records(&records)?;
                Ok(DeleteReport { deleted: true })
            }
            None => Ok(DeleteReport { deleted: false }),
        }
    }

    /// Reads all records. A missing or malformed file is reinitialized as an
    /// empty collection; the corruption is logged, not propagated.
    fn read_records(&self) -> Result<Vec<Record>, DbError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.write_records(&[])?;
                return Ok(Vec::new());
            }
            Err(e) => return Err(DbError::Io(e)),
        };
        match serde_json::from_str::<Vec<Record>>(&raw) {
            Ok(records) => Ok(records),
            Err(e) => {
                // Recovered locally, reported for operator visibility.
                let err = DbError::CorruptStorage(format!("collection {}: {e}", self.name));
                log::error!("{err}; reinitializing as empty");
                self.write_records(&[])?;
                Ok(Vec::new())
            }
        }
    }

    fn write_records(&self, records: &[Record]) -> Result<(), DbError> {
        let body = serde_json::to_string_pretty(records)?;
        fs::write(&self.path, body)?;
        Ok(())
    }
}

fn record_id(record: &Record) -> Option<&str> {
    match record.get(ID_FIELD) {
        Some(Value::String(s)) => Some(s),
        _ => None,
    }
}

fn ensure_id(record: &mut Record) -> Result<DocumentId, DbError> {
    match record.get(ID_FIELD) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        None | Some(Value::Null) => {
            let id = Uuid::new_v4().to_string();
            record.insert(ID_FIELD.to_string(), Value::String(id.clone()));
            Ok(id)
        }
        Some(other) => {
            Err(DbError::MalformedUpdate(format!("_id must be a non-empty string, got {other}")))
        }
    }
}

/// The filter's literal fields: everything that is neither a `$`-prefixed
/// key nor an operator mapping. Used to seed upserted records.
fn literal_fields(filter: &Record) -> Record {
    filter
        .iter()
        .filter(|(k, v)| {
            !k.starts_with('$') && !matches!(v, Value::Object(m) if is_operator_map(m))
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}
