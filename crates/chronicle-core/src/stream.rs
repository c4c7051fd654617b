//! Stream naming.

use uuid::Uuid;

/// Builds the stream name for an aggregate instance: the aggregate type name
/// with its first character lower-cased, a dash, then the identity as 32
/// lower-case hex digits.
///
/// `TestAggregate` + `1d8ea2e9-dd5c-4832-91bc-8abab1502273` gives
/// `testAggregate-1d8ea2e9dd5c483291bc8abab1502273`.
#[must_use]
pub fn stream_name(aggregate_type: &str, id: Uuid) -> String {
    let mut name = String::with_capacity(aggregate_type.len() + 1 + 32);
    let mut chars = aggregate_type.chars();
    if let Some(first) = chars.next() {
        name.extend(first.to_lowercase());
        name.push_str(chars.as_str());
    }
    name.push('-');
    name.push_str(&id.simple().to_string());
    name
}
