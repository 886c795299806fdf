//! Canonical case status derivation.
//!
//! A case's lifecycle label is never stored. It is projected from the
//! medication and lab orders attached to the case, by reducing them to four
//! signals and walking an ordered rule table. The first rule that applies
//! wins; later rules are unreachable once an earlier one matches, so the
//! order of `RULES` is part of the contract.

use serde::{Deserialize, Serialize};

use crate::models::{LabOrder, LabOrderStatus, MedicationOrder, ModelError};

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

/// Human-readable lifecycle label computed from a case's orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CanonicalStatus {
    MedicationIssuedAndLabCompleted,
    MedicationIssuedAndLabRequested,
    MedicationPrescribedAndLabRequested,
    MedicationPrescribedAndLabCompleted,
    LabTestCompleted,
    LabTestRequested,
    MedicationIssued,
    MedicationPrescribed,
    InitiatedByNurse,
}

impl CanonicalStatus {
    pub const ALL: [CanonicalStatus; 9] = [
        Self::MedicationIssuedAndLabCompleted,
        Self::MedicationIssuedAndLabRequested,
        Self::MedicationPrescribedAndLabRequested,
        Self::MedicationPrescribedAndLabCompleted,
        Self::LabTestCompleted,
        Self::LabTestRequested,
        Self::MedicationIssued,
        Self::MedicationPrescribed,
        Self::InitiatedByNurse,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MedicationIssuedAndLabCompleted => "Medication issued and Lab Test Completed",
            Self::MedicationIssuedAndLabRequested => "Medication issued and Lab Test Requested",
            Self::MedicationPrescribedAndLabRequested => {
                "Medication Prescribed and Lab Test Requested"
            }
            Self::MedicationPrescribedAndLabCompleted => {
                "Medication Prescribed and Lab Test Completed"
            }
            Self::LabTestCompleted => "Lab Test Completed",
            Self::LabTestRequested => "Lab Test Requested",
            Self::MedicationIssued => "Medication Issued by Pharmacist",
            Self::MedicationPrescribed => "Medication Prescribed by Doctor",
            Self::InitiatedByNurse => "Initiated by Nurse",
        }
    }

    /// Only the fully resolved combination can close a case. A lab result
    /// alone or an issue alone may still be followed by new orders; see
    /// [`crate::models::CaseRecord::is_closed`] for the order-level check.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::MedicationIssuedAndLabCompleted)
    }
}

impl std::fmt::Display for CanonicalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CanonicalStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ModelError::InvalidEnum {
                field: "CanonicalStatus".into(),
                value: s.into(),
            })
    }
}

impl TryFrom<String> for CanonicalStatus {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CanonicalStatus> for String {
    fn from(status: CanonicalStatus) -> Self {
        status.as_str().to_string()
    }
}

/// The four case-level facts the rule table is evaluated over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusSignals {
    pub meds_prescribed: bool,
    pub meds_issued: bool,
    pub lab_requested: bool,
    pub lab_result: bool,
}

impl StatusSignals {
    pub fn collect(medication_orders: &[MedicationOrder], lab_orders: &[LabOrder]) -> Self {
        Self {
            meds_prescribed: medication_orders.iter().any(MedicationOrder::is_prescribed),
            meds_issued: medication_orders.iter().any(MedicationOrder::is_issued),
            lab_requested: lab_orders
                .iter()
                .any(|l| l.status == LabOrderStatus::Requested),
            lab_result: lab_orders.iter().any(LabOrder::is_completed),
        }
    }

    /// First matching rule, or `None` for a case with no orders at all.
    pub fn matching_rule(&self) -> Option<&'static StatusRule> {
        RULES.iter().find(|rule| (rule.applies)(self))
    }

    pub fn resolve(&self) -> CanonicalStatus {
        self.matching_rule()
            .map(|rule| rule.status)
            .unwrap_or(CanonicalStatus::InitiatedByNurse)
    }
}

/// One row of the precedence table.
pub struct StatusRule {
    pub name: &'static str,
    pub applies: fn(&StatusSignals) -> bool,
    pub status: CanonicalStatus,
}

impl std::fmt::Debug for StatusRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusRule")
            .field("name", &self.name)
            .field("status", &self.status)
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════
// Rule table
// ═══════════════════════════════════════════════════════════

static RULES: [StatusRule; 8] = [
    StatusRule {
        name: "issued_with_lab_result",
        applies: |s| s.meds_issued && s.lab_result,
        status: CanonicalStatus::MedicationIssuedAndLabCompleted,
    },
    StatusRule {
        name: "issued_with_lab_requested",
        applies: |s| s.meds_issued && s.lab_requested,
        status: CanonicalStatus::MedicationIssuedAndLabRequested,
    },
    StatusRule {
        name: "prescribed_with_lab_requested",
        applies: |s| s.meds_prescribed && !s.meds_issued && s.lab_requested,
        status: CanonicalStatus::MedicationPrescribedAndLabRequested,
    },
    StatusRule {
        name: "prescribed_with_lab_result",
        applies: |s| s.meds_prescribed && !s.meds_issued && s.lab_result,
        status: CanonicalStatus::MedicationPrescribedAndLabCompleted,
    },
    StatusRule {
        name: "lab_result",
        applies: |s| s.lab_result,
        status: CanonicalStatus::LabTestCompleted,
    },
    StatusRule {
        name: "lab_requested",
        applies: |s| s.lab_requested,
        status: CanonicalStatus::LabTestRequested,
    },
    StatusRule {
        name: "issued",
        applies: |s| s.meds_issued,
        status: CanonicalStatus::MedicationIssued,
    },
    StatusRule {
        name: "prescribed",
        applies: |s| s.meds_prescribed,
        status: CanonicalStatus::MedicationPrescribed,
    },
];

/// The ordered rule table, highest precedence first. The fallback
/// `InitiatedByNurse` is not a row.
pub fn rules() -> &'static [StatusRule] {
    &RULES
}

/// Derive the canonical status of a case from its orders.
pub fn derive_status(medication_orders: &[MedicationOrder], lab_orders: &[LabOrder]) -> CanonicalStatus {
    StatusSignals::collect(medication_orders, lab_orders).resolve()
}

/// Name of the rule that decided a case's status, for audit views.
pub fn explain(medication_orders: &[MedicationOrder], lab_orders: &[LabOrder]) -> &'static str {
    StatusSignals::collect(medication_orders, lab_orders)
        .matching_rule()
        .map(|rule| rule.name)
        .unwrap_or("initial")
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
