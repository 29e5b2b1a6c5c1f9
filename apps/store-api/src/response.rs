//! JSON response envelope.
//!
//! Every endpoint answers the same shape so clients parse one envelope:
//!
//! ```json
//! { "success": true, "message": "...", "data": { ... } }
//! ```
//!
//! Paginated lists nest the page metadata inside `data`.

use serde::Serialize;

use tally_db::Paginated;

/// Standard response envelope.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    pub message: String,
    pub data: Option<T>,
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Envelope {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }
}

/// Page metadata alongside the items, with the field names the channel
/// integrations already expect.
#[derive(Debug, Serialize)]
pub struct PageEnvelope<T: Serialize> {
    pub items: Vec<T>,
    pub current_page: u32,
    pub last_page: i64,
    pub per_page: u32,
    pub total: i64,
}

impl<T: Serialize> From<Paginated<T>> for PageEnvelope<T> {
    fn from(page: Paginated<T>) -> Self {
        let last_page = page.last_page();
        PageEnvelope {
            current_page: page.page,
            per_page: page.per_page,
            total: page.total,
            last_page,
            items: page.items,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_shape() {
        let envelope = Envelope::ok("Order created", serde_json::json!({"id": "o-1"}));
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["message"], "Order created");
        assert_eq!(value["data"]["id"], "o-1");
    }

    #[test]
    fn test_page_envelope() {
        let page = Paginated {
            items: vec![1, 2, 3],
            total: 7,
            page: 1,
            per_page: 3,
        };
        let envelope = PageEnvelope::from(page);
        assert_eq!(envelope.last_page, 3);
        assert_eq!(envelope.current_page, 1);
        assert_eq!(envelope.total, 7);
    }
}
