use serde::{Deserialize, Serialize};

/// Stock level of one product on one shelf
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryRecord {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub product_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    pub warehouse_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shelf_id: Option<String>,
    pub quantity: u32,
    pub min_stock_level: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_stock_level: Option<u32>,
}

impl InventoryRecord {
    pub fn label(&self) -> &str {
        self.product_name.as_deref().unwrap_or(&self.product_id)
    }
}

/// Physical shelf a weight sensor sits on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shelf {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub warehouse_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Capacity in the same unit the sensors report
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_weight: Option<f64>,
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_negative_quantity_rejected() {
        let result = serde_json::from_value::<InventoryRecord>(serde_json::json!({
            "productId": "p-1",
            "warehouseId": "wh-1",
            "quantity": -3,
            "minStockLevel": 5
        }));
        assert!(result.is_err());
    }
}
