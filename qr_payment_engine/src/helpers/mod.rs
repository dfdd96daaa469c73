use chrono::Utc;
use rand::Rng;

use crate::db_types::Reference;

/// Generates a fresh checkout reference: a time-based token with a random suffix to keep back-to-back checkouts on
/// the same terminal distinct.
pub fn new_reference() -> Reference {
    let millis = Utc::now().timestamp_millis();
    let suffix: u32 = rand::thread_rng().gen();
    Reference::from(format!("QR-{millis}-{suffix:08x}"))
}
