use serde_json::{Map, Value};

pub type CollectionName = String;
pub type DocumentId = String;

/// A stored record: a JSON object mapping field names to values.
pub type Record = Map<String, Value>;

/// The identifier field every record carries.
pub const ID_FIELD: &str = "_id";
