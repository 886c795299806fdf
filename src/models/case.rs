use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::orders::{LabOrder, MedicationOrder};
use crate::status::{derive_status, CanonicalStatus};

/// Who the case is for. Registered students carry a roll number; anyone
/// else is recorded ad hoc at intake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PatientRef {
    #[serde(rename_all = "camelCase")]
    Student { student_id: String, name: String },
    #[serde(rename_all = "camelCase")]
    OtherPatient {
        name: String,
        #[serde(default)]
        age: Option<u8>,
        #[serde(default)]
        contact: Option<String>,
    },
}

impl PatientRef {
    pub fn display_name(&self) -> &str {
        match self {
            Self::Student { name, .. } | Self::OtherPatient { name, .. } => name,
        }
    }
}

/// Intake vitals. Every reading is optional; nurses record what they take.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vitals {
    #[serde(default)]
    pub temperature_c: Option<f32>,
    #[serde(default)]
    pub pulse_bpm: Option<u16>,
    #[serde(default)]
    pub blood_pressure: Option<String>,
    #[serde(default)]
    pub respiratory_rate: Option<u16>,
    #[serde(default)]
    pub spo2_percent: Option<u8>,
    #[serde(default)]
    pub weight_kg: Option<f32>,
}

/// References to media owned by the external upload services.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachments {
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub audio_url: Option<String>,
}

/// One patient encounter, from intake through resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseRecord {
    pub id: Uuid,
    pub patient: PatientRef,
    #[serde(default)]
    pub vitals: Vitals,
    #[serde(default)]
    pub intake_notes: Option<String>,
    #[serde(default)]
    pub physician_notes: Option<String>,
    #[serde(default)]
    pub attachments: Attachments,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub medication_orders: Vec<MedicationOrder>,
    #[serde(default)]
    pub lab_orders: Vec<LabOrder>,
}

impl CaseRecord {
    /// Fresh intake record with no orders attached.
    pub fn intake(patient: PatientRef, vitals: Vitals, intake_notes: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            patient,
            vitals,
            intake_notes,
            physician_notes: None,
            attachments: Attachments::default(),
            created_at: Utc::now(),
            medication_orders: Vec::new(),
            lab_orders: Vec::new(),
        }
    }

    /// Recomputed on every call; never cached on the record.
    pub fn canonical_status(&self) -> CanonicalStatus {
        derive_status(&self.medication_orders, &self.lab_orders)
    }

    /// An order still waiting on pharmacy or the lab.
    pub fn has_outstanding_orders(&self) -> bool {
        self.medication_orders.iter().any(|o| !o.is_issued())
            || self.lab_orders.iter().any(|l| !l.is_completed())
    }

    /// Closed cases accept no further mutation: terminal status and nothing
    /// left to dispense or complete.
    pub fn is_closed(&self) -> bool {
        self.canonical_status().is_terminal() && !self.has_outstanding_orders()
    }
}
