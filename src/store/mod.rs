//! Case store client: the contract consumed from the external case-record
//! service, with an HTTP implementation and an in-process one.

pub mod http;
pub mod memory;

pub use http::HttpCaseStore;
pub use memory::MemoryCaseStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{
    CaseFilter, CaseRecord, LabOrder, MedicationOrder, Medicine, NewLabOrder, NewMedicationOrder,
    Page,
};

/// Operations the reconciler needs from the case-record service.
///
/// `dispense` and `complete_lab_order` are conditional updates: the store
/// validates and applies them in one step and answers with
/// [`StoreError::Rejected`] when the transition is no longer allowed.
#[async_trait]
pub trait CaseStore: Send + Sync {
    async fn get_case(&self, id: Uuid) -> Result<CaseRecord, StoreError>;

    async fn list_cases(
        &self,
        filter: &CaseFilter,
        page: u32,
        limit: u32,
    ) -> Result<Page<CaseRecord>, StoreError>;

    async fn dispense(&self, order_id: Uuid, quantity: u32) -> Result<MedicationOrder, StoreError>;

    async fn complete_lab_order(&self, order_id: Uuid, result: &str)
        -> Result<LabOrder, StoreError>;

    async fn add_medication_order(
        &self,
        case_id: Uuid,
        order: &NewMedicationOrder,
    ) -> Result<MedicationOrder, StoreError>;

    async fn add_lab_order(&self, case_id: Uuid, order: &NewLabOrder)
        -> Result<LabOrder, StoreError>;

    async fn search_medicines(&self, query: &str) -> Result<Vec<Medicine>, StoreError>;

    /// Full reference list, used as the offline suggestion snapshot.
    async fn list_medicines(&self) -> Result<Vec<Medicine>, StoreError>;
}
