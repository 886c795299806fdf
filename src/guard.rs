//! Workflow transition guard.
//!
//! Validates pharmacy dispenses, lab result entry and physician amendments
//! against the current aggregate state. Rejections are values, never errors:
//! a rejected mutation changes nothing and is reported inline.
//!
//! Dispensing touches `Medicine::stock_on_hand`, the one resource shared by
//! independent pharmacist sessions. The check-decrement-set triple is applied
//! as one unit by [`apply_dispense`] and, remotely, by a single conditional
//! update at the store ([`CaseStore::dispense`]). The client never reads
//! stock and then writes it back in a second call.

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{
    CaseRecord, LabOrder, LabOrderStatus, MedicationOrder, Medicine, NewLabOrder,
    NewMedicationOrder, RejectionReason,
};
use crate::status;
use crate::store::CaseStore;

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

/// Why a proposed transition was refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}: {message}")]
pub struct Rejection {
    pub reason: RejectionReason,
    pub message: String,
}

impl Rejection {
    pub fn new(reason: RejectionReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }
}

/// Outcome of a proposed transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision<T> {
    Accepted(T),
    Rejected(Rejection),
}

impl<T> Decision<T> {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Accepted(_) => None,
            Self::Rejected(r) => Some(r),
        }
    }
}

/// What an accepted dispense did to the stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispenseReceipt {
    pub order_id: Uuid,
    pub medicine_id: Uuid,
    pub quantity: u32,
    pub stock_remaining: u32,
}

// ═══════════════════════════════════════════════════════════
// Pure checks
// ═══════════════════════════════════════════════════════════

pub fn check_dispense(
    order: &MedicationOrder,
    requested: u32,
    medicine: &Medicine,
) -> Result<(), Rejection> {
    if requested == 0 {
        return Err(Rejection::new(
            RejectionReason::InvalidQuantity,
            "dispensed quantity must be positive",
        ));
    }
    if let Some(already) = order.quantity_dispensed {
        return Err(Rejection::new(
            RejectionReason::AlreadyDispensed,
            format!("{already} already dispensed for this order"),
        ));
    }
    if requested > order.quantity_ordered {
        return Err(Rejection::new(
            RejectionReason::ExceedsOrderedQuantity,
            format!(
                "requested {requested} but only {} ordered",
                order.quantity_ordered
            ),
        ));
    }
    if requested > medicine.stock_on_hand {
        return Err(Rejection::new(
            RejectionReason::InsufficientStock,
            format!(
                "requested {requested} but {} has {} on hand",
                medicine.name, medicine.stock_on_hand
            ),
        ));
    }
    Ok(())
}

/// Check, decrement stock and record the dispense together. On rejection
/// neither the order nor the medicine is touched.
pub fn apply_dispense(
    order: &mut MedicationOrder,
    medicine: &mut Medicine,
    requested: u32,
) -> Result<DispenseReceipt, Rejection> {
    check_dispense(order, requested, medicine)?;
    medicine.stock_on_hand -= requested;
    order.quantity_dispensed = Some(requested);
    Ok(DispenseReceipt {
        order_id: order.id,
        medicine_id: medicine.id,
        quantity: requested,
        stock_remaining: medicine.stock_on_hand,
    })
}

pub fn check_lab_result(order: &LabOrder, result: &str) -> Result<(), Rejection> {
    if order.status == LabOrderStatus::Completed {
        return Err(Rejection::new(
            RejectionReason::AlreadyCompleted,
            format!("{} already has a result", order.test_name),
        ));
    }
    if result.trim().is_empty() {
        return Err(Rejection::new(
            RejectionReason::InvalidResult,
            "lab result cannot be empty",
        ));
    }
    Ok(())
}

/// `Requested -> Completed`, exactly once.
pub fn apply_lab_result(
    order: &mut LabOrder,
    result: &str,
    completed_at: DateTime<Utc>,
) -> Result<(), Rejection> {
    check_lab_result(order, result)?;
    order.status = LabOrderStatus::Completed;
    order.result = Some(result.trim().to_string());
    order.completed_at = Some(completed_at);
    Ok(())
}

/// Any mutation of a closed case is refused: new orders, attachments,
/// dispenses and lab results alike.
pub fn check_amendment(case: &CaseRecord) -> Result<(), Rejection> {
    if case.is_closed() {
        let status = case.canonical_status();
        tracing::debug!(
            case_id = %case.id,
            rule = status::explain(&case.medication_orders, &case.lab_orders),
            "Case closed to amendments"
        );
        return Err(Rejection::new(
            RejectionReason::CaseClosed,
            format!("case is closed ({status})"),
        ));
    }
    Ok(())
}

pub fn check_new_medication_order(
    case: &CaseRecord,
    order: &NewMedicationOrder,
) -> Result<(), Rejection> {
    check_amendment(case)?;
    if order.quantity_ordered == 0 {
        return Err(Rejection::new(
            RejectionReason::InvalidQuantity,
            "ordered quantity must be positive",
        ));
    }
    Ok(())
}

pub fn check_new_lab_order(case: &CaseRecord, order: &NewLabOrder) -> Result<(), Rejection> {
    check_amendment(case)?;
    if order.test_name.trim().is_empty() {
        return Err(Rejection::new(
            RejectionReason::InvalidTestName,
            "lab test name cannot be empty",
        ));
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════
// Proposals against the store
// ═══════════════════════════════════════════════════════════

/// Lift a store rejection into a decision; transport failures stay errors.
fn decide<T>(outcome: Result<T, StoreError>) -> Result<Decision<T>, StoreError> {
    match outcome {
        Ok(value) => Ok(Decision::Accepted(value)),
        Err(StoreError::Rejected(rejection)) => {
            tracing::info!(reason = %rejection.reason, "Store rejected transition");
            Ok(Decision::Rejected(rejection))
        }
        Err(e) => Err(e),
    }
}

/// Propose a dispense. The local check gives immediate feedback from the
/// caller's view of the stock; the store re-validates atomically against the
/// live stock, so a concurrent dispense elsewhere still cannot overdraw it.
pub async fn propose_dispense(
    store: &dyn CaseStore,
    order: &MedicationOrder,
    requested: u32,
    medicine: &Medicine,
) -> Result<Decision<MedicationOrder>, StoreError> {
    if let Err(rejection) = check_dispense(order, requested, medicine) {
        tracing::info!(
            order_id = %order.id,
            requested,
            reason = %rejection.reason,
            "Dispense rejected locally"
        );
        return Ok(Decision::Rejected(rejection));
    }
    decide(store.dispense(order.id, requested).await)
}

pub async fn propose_lab_result(
    store: &dyn CaseStore,
    order: &LabOrder,
    result: &str,
) -> Result<Decision<LabOrder>, StoreError> {
    if let Err(rejection) = check_lab_result(order, result) {
        tracing::info!(lab_order_id = %order.id, reason = %rejection.reason, "Lab result rejected locally");
        return Ok(Decision::Rejected(rejection));
    }
    decide(store.complete_lab_order(order.id, result.trim()).await)
}

pub async fn propose_medication_order(
    store: &dyn CaseStore,
    case: &CaseRecord,
    order: &NewMedicationOrder,
) -> Result<Decision<MedicationOrder>, StoreError> {
    if let Err(rejection) = check_new_medication_order(case, order) {
        return Ok(Decision::Rejected(rejection));
    }
    decide(store.add_medication_order(case.id, order).await)
}

pub async fn propose_lab_order(
    store: &dyn CaseStore,
    case: &CaseRecord,
    order: &NewLabOrder,
) -> Result<Decision<LabOrder>, StoreError> {
    if let Err(rejection) = check_new_lab_order(case, order) {
        return Ok(Decision::Rejected(rejection));
    }
    decide(store.add_lab_order(case.id, order).await)
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
