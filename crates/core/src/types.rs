/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Tasks and generated images are keyed by opaque UUID strings.
pub type EntityId = String;
