use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A reservation that still needs a technician for its delivery leg. Field
/// names follow the reservations table, so they stay snake_case on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnassignedReservation {
    pub id: String,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub delivery_time: Option<String>,
    #[serde(default)]
    pub delivery_task_id: Option<String>,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub customer_phone: Option<String>,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub delivery_address: Option<String>,
    #[serde(default)]
    pub delivery_city: Option<String>,
    #[serde(default)]
    pub delivery_postal_code: Option<String>,
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default)]
    pub quantity: Option<u32>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl UnassignedReservation {
    pub fn order_number(&self) -> String {
        let prefix: String = self.id.chars().take(8).collect();
        format!("ORD-{prefix}")
    }
}

#[cfg(test)]
mod tests {
    use super::UnassignedReservation;

    fn reservation(id: &str) -> UnassignedReservation {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "start_date": "2026-02-01",
        }))
        .unwrap()
    }

    #[test]
    fn order_number_uses_first_eight_characters() {
        assert_eq!(
            reservation("a1b2c3d4-e5f6-7890").order_number(),
            "ORD-a1b2c3d4"
        );
    }

    #[test]
    fn short_ids_are_used_whole() {
        assert_eq!(reservation("r1").order_number(), "ORD-r1");
    }
}
