use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::LabOrderStatus;

/// A physician's request for a quantity of a medicine against a case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicationOrder {
    pub id: Uuid,
    pub case_id: Uuid,
    pub medicine_id: Uuid,
    #[serde(default)]
    pub medicine_name: Option<String>,
    pub quantity_ordered: u32,
    /// Set at most once, by pharmacy.
    #[serde(default)]
    pub quantity_dispensed: Option<u32>,
    #[serde(default)]
    pub instructions: Option<String>,
}

impl MedicationOrder {
    pub fn is_prescribed(&self) -> bool {
        self.quantity_ordered > 0
    }

    pub fn is_issued(&self) -> bool {
        self.quantity_dispensed.is_some_and(|q| q > 0)
    }
}

/// A physician's request for a diagnostic test, completed by the lab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabOrder {
    pub id: Uuid,
    pub case_id: Uuid,
    pub test_name: String,
    pub status: LabOrderStatus,
    /// Result reference (report URL or text). Only present once completed.
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl LabOrder {
    pub fn is_completed(&self) -> bool {
        self.status == LabOrderStatus::Completed
    }
}

/// Body of `PUT /medication-orders/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispenseRequest {
    pub quantity_dispensed: u32,
}

/// Body of `PUT /lab-orders/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabResultRequest {
    pub status: LabOrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

/// New medication order as submitted by a physician.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMedicationOrder {
    pub medicine_id: Uuid,
    pub quantity_ordered: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

/// New lab order as submitted by a physician.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLabOrder {
    pub test_name: String,
}
