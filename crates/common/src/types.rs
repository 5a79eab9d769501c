use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an order.
///
/// Generated at intake in the form `ORD-<yyyyMMdd>-<8 upper-case hex>`. Identifiers
/// arriving from the wire are accepted verbatim so that validation can report
/// malformed or empty values instead of failing deserialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    /// Creates a new order ID stamped with the current UTC date.
    pub fn generate() -> Self {
        Self::generate_at(Utc::now())
    }

    /// Creates a new order ID stamped with the given date.
    pub fn generate_at(at: DateTime<Utc>) -> Self {
        let random = Uuid::new_v4().simple().to_string();
        Self(format!(
            "ORD-{}-{}",
            at.format("%Y%m%d"),
            random[..8].to_ascii_uppercase()
        ))
    }

    /// Wraps an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Returns true if the identifier matches the generated `ORD-<date>-<random8>` shape.
    pub fn is_well_formed(&self) -> bool {
        let mut parts = self.0.splitn(3, '-');
        let (Some(prefix), Some(date), Some(random)) = (parts.next(), parts.next(), parts.next())
        else {
            return false;
        };
        prefix == "ORD"
            && date.len() == 8
            && date.chars().all(|c| c.is_ascii_digit())
            && random.len() == 8
            && random
                .chars()
                .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c))
    }
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for OrderId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Identifier threaded through every message and event of one order flow.
///
/// Opaque on the wire; freshly generated values are UUIDs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Creates a new random correlation ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CorrelationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for CorrelationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Unique identifier for a single message send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Creates a new random message ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for MessageId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn order_id_generate_uses_date_and_random_suffix() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap();
        let id = OrderId::generate_at(at);

        assert!(id.as_str().starts_with("ORD-20240309-"));
        assert_eq!(id.as_str().len(), "ORD-20240309-".len() + 8);
        assert!(id.is_well_formed());
    }

    #[test]
    fn order_id_generate_creates_unique_ids() {
        let id1 = OrderId::generate();
        let id2 = OrderId::generate();
        assert_ne!(id1, id2);
    }

    #[test]
    fn order_id_well_formed_rejects_other_shapes() {
        assert!(!OrderId::new("").is_well_formed());
        assert!(!OrderId::new("ORD-2024-ABCDEF12").is_well_formed());
        assert!(!OrderId::new("ORD-20240309-abcdef12").is_well_formed());
        assert!(!OrderId::new("XYZ-20240309-ABCDEF12").is_well_formed());
        assert!(OrderId::new("ORD-20240309-ABCDEF12").is_well_formed());
    }

    #[test]
    fn order_id_serializes_as_plain_string() {
        let id = OrderId::new("ORD-20240309-ABCDEF12");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"ORD-20240309-ABCDEF12\"");

        let deserialized: OrderId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, deserialized);
    }

    #[test]
    fn correlation_id_new_creates_unique_ids() {
        assert_ne!(CorrelationId::new(), CorrelationId::new());
    }

    #[test]
    fn message_id_from_uuid_preserves_value() {
        let uuid = Uuid::new_v4();
        let id = MessageId::from(uuid);
        assert_eq!(id.as_uuid(), uuid);
    }
}
