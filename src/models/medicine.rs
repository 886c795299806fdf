use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Inventory entity owned by the store-keeping service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Medicine {
    pub id: Uuid,
    pub name: String,
    pub stock_on_hand: u32,
    #[serde(default)]
    pub unit: Option<String>,
}

impl Medicine {
    /// Case-insensitive substring match used for offline suggestion filtering.
    pub fn matches(&self, query: &str) -> bool {
        let needle = query.trim().to_lowercase();
        !needle.is_empty() && self.name.to_lowercase().contains(&needle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn medicine(name: &str) -> Medicine {
        Medicine {
            id: Uuid::new_v4(),
            name: name.into(),
            stock_on_hand: 5,
            unit: None,
        }
    }

    #[test]
    fn matches_ignores_case_and_padding() {
        let m = medicine("Paracetamol 500mg");
        assert!(m.matches("PARA"));
        assert!(m.matches("  cetam "));
        assert!(!m.matches("ibu"));
    }

    #[test]
    fn blank_query_matches_nothing() {
        assert!(!medicine("Amoxicillin").matches("   "));
    }
}
