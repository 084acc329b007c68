use chrono::Utc;
use uuid::Uuid;

/// Current wall-clock time as epoch milliseconds.
///
/// Workflow event timestamps (submission, review, settlement) are persisted in
/// this form; audit timestamps use full `DateTime<Utc>` values.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// High-entropy uppercase reference with the given prefix, e.g. `TXN3F9A21BC`.
///
/// Used for transaction references and receipt numbers, which must stay unique
/// under concurrent settlement. A counter would collide; a uuid segment won't.
pub fn entropy_ref(prefix: &str, chars: usize) -> String {
    let id = Uuid::new_v4().simple().to_string();
    let chars = chars.min(id.len());
    format!("{}{}", prefix, id[..chars].to_uppercase())
}
