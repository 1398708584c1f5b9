use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Technician {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub vehicle_id: Option<String>,
    #[serde(default = "active_by_default")]
    pub active: bool,
}

pub(crate) fn active_by_default() -> bool {
    true
}
