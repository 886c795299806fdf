//! In-process case store.
//!
//! Holds cases and medicines behind one lock, so every conditional update
//! (dispense, lab completion, order creation) is validated and applied
//! without interleaving. Used by tests and demos; it is also the reference
//! for the semantics the remote service must provide.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::CaseStore;
use crate::error::StoreError;
use crate::guard;
use crate::models::{
    CaseFilter, CaseRecord, LabOrder, LabOrderStatus, MedicationOrder, Medicine, NewLabOrder,
    NewMedicationOrder, Page, PatientRef,
};

#[derive(Default)]
struct Inner {
    cases: Vec<CaseRecord>,
    medicines: HashMap<Uuid, Medicine>,
}

#[derive(Default)]
pub struct MemoryCaseStore {
    inner: Mutex<Inner>,
}

impl MemoryCaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert_case(&self, case: CaseRecord) -> CaseRecord {
        self.lock().cases.push(case.clone());
        case
    }

    pub fn insert_medicine(&self, medicine: Medicine) -> Medicine {
        self.lock().medicines.insert(medicine.id, medicine.clone());
        medicine
    }

    pub fn medicine(&self, id: Uuid) -> Option<Medicine> {
        self.lock().medicines.get(&id).cloned()
    }
}

fn matches_filter(case: &CaseRecord, filter: &CaseFilter) -> bool {
    if let Some(status) = filter.status {
        if case.canonical_status() != status {
            return false;
        }
    }
    if let Some(date) = filter.date {
        if case.created_at.date_naive() != date {
            return false;
        }
    }
    let needle = match filter.search.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => s.to_lowercase(),
        _ => return true,
    };
    let mut haystacks = vec![case.patient.display_name()];
    if let PatientRef::Student { student_id, .. } = &case.patient {
        haystacks.push(student_id.as_str());
    }
    haystacks.extend(case.intake_notes.as_deref());
    haystacks.extend(case.physician_notes.as_deref());
    haystacks
        .iter()
        .any(|h| h.to_lowercase().contains(&needle))
}

fn not_found(kind: &str, id: Uuid) -> StoreError {
    StoreError::NotFound(format!("{kind} {id}"))
}

#[async_trait]
impl CaseStore for MemoryCaseStore {
    async fn get_case(&self, id: Uuid) -> Result<CaseRecord, StoreError> {
        self.lock()
            .cases
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| not_found("case", id))
    }

    async fn list_cases(
        &self,
        filter: &CaseFilter,
        page: u32,
        limit: u32,
    ) -> Result<Page<CaseRecord>, StoreError> {
        let inner = self.lock();
        let mut matching: Vec<&CaseRecord> = inner
            .cases
            .iter()
            .filter(|c| matches_filter(c, filter))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let start = (page.max(1) as usize - 1) * limit as usize;
        let data: Vec<CaseRecord> = matching
            .iter()
            .skip(start)
            .take(limit as usize)
            .map(|c| (*c).clone())
            .collect();
        let has_more = start + data.len() < matching.len();
        Ok(Page::new(data, has_more))
    }

    async fn dispense(&self, order_id: Uuid, quantity: u32) -> Result<MedicationOrder, StoreError> {
        let mut inner = self.lock();
        let Inner { cases, medicines } = &mut *inner;
        let case = cases
            .iter_mut()
            .find(|c| c.medication_orders.iter().any(|o| o.id == order_id))
            .ok_or_else(|| not_found("medication order", order_id))?;
        guard::check_amendment(case).map_err(StoreError::Rejected)?;
        let order = case
            .medication_orders
            .iter_mut()
            .find(|o| o.id == order_id)
            .ok_or_else(|| not_found("medication order", order_id))?;
        let medicine = medicines
            .get_mut(&order.medicine_id)
            .ok_or_else(|| not_found("medicine", order.medicine_id))?;

        let receipt =
            guard::apply_dispense(order, medicine, quantity).map_err(StoreError::Rejected)?;
        tracing::debug!(
            order_id = %receipt.order_id,
            quantity = receipt.quantity,
            stock_remaining = receipt.stock_remaining,
            "Dispense applied"
        );
        Ok(order.clone())
    }

    async fn complete_lab_order(
        &self,
        order_id: Uuid,
        result: &str,
    ) -> Result<LabOrder, StoreError> {
        let mut inner = self.lock();
        let case = inner
            .cases
            .iter_mut()
            .find(|c| c.lab_orders.iter().any(|o| o.id == order_id))
            .ok_or_else(|| not_found("lab order", order_id))?;
        guard::check_amendment(case).map_err(StoreError::Rejected)?;
        let order = case
            .lab_orders
            .iter_mut()
            .find(|o| o.id == order_id)
            .ok_or_else(|| not_found("lab order", order_id))?;
        guard::apply_lab_result(order, result, Utc::now()).map_err(StoreError::Rejected)?;
        Ok(order.clone())
    }

    async fn add_medication_order(
        &self,
        case_id: Uuid,
        order: &NewMedicationOrder,
    ) -> Result<MedicationOrder, StoreError> {
        let mut inner = self.lock();
        let medicine_name = inner
            .medicines
            .get(&order.medicine_id)
            .map(|m| m.name.clone())
            .ok_or_else(|| not_found("medicine", order.medicine_id))?;
        let case = inner
            .cases
            .iter_mut()
            .find(|c| c.id == case_id)
            .ok_or_else(|| not_found("case", case_id))?;
        guard::check_new_medication_order(case, order).map_err(StoreError::Rejected)?;

        let created = MedicationOrder {
            id: Uuid::new_v4(),
            case_id,
            medicine_id: order.medicine_id,
            medicine_name: Some(medicine_name),
            quantity_ordered: order.quantity_ordered,
            quantity_dispensed: None,
            instructions: order.instructions.clone(),
        };
        case.medication_orders.push(created.clone());
        Ok(created)
    }

    async fn add_lab_order(
        &self,
        case_id: Uuid,
        order: &NewLabOrder,
    ) -> Result<LabOrder, StoreError> {
        let mut inner = self.lock();
        let case = inner
            .cases
            .iter_mut()
            .find(|c| c.id == case_id)
            .ok_or_else(|| not_found("case", case_id))?;
        guard::check_new_lab_order(case, order).map_err(StoreError::Rejected)?;

        let created = LabOrder {
            id: Uuid::new_v4(),
            case_id,
            test_name: order.test_name.trim().to_string(),
            status: LabOrderStatus::Requested,
            result: None,
            completed_at: None,
        };
        case.lab_orders.push(created.clone());
        Ok(created)
    }

    async fn search_medicines(&self, query: &str) -> Result<Vec<Medicine>, StoreError> {
        let mut found: Vec<Medicine> = self
            .lock()
            .medicines
            .values()
            .filter(|m| m.matches(query))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }

    async fn list_medicines(&self) -> Result<Vec<Medicine>, StoreError> {
        let mut all: Vec<Medicine> = self.lock().medicines.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }
}
