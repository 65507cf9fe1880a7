/// Current UTC timestamp in milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Random v4 UUID string, used for queue entry and claim ids
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
