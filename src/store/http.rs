//! REST client for the external case-record service.
//!
//! Endpoints:
//! - `GET  /cases/{id}`
//! - `GET  /cases?search=&status=&date=&page=&limit=` → `{ data, has_more }`
//! - `PUT  /medication-orders/{id}` `{ quantityDispensed }`
//! - `PUT  /lab-orders/{id}` `{ status, result }`
//! - `POST /cases/{id}/medication-orders`, `POST /cases/{id}/lab-orders`
//! - `GET  /medicines?search=`, `GET /medicines`
//!
//! Rejected transitions come back as 409/422 with
//! `{ "error": { "code": "<REASON>", "message": "..." } }`.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use uuid::Uuid;

use super::CaseStore;
use crate::config::ReconcilerConfig;
use crate::error::StoreError;
use crate::guard::Rejection;
use crate::models::{
    CaseFilter, CaseRecord, DispenseRequest, LabOrder, LabOrderStatus, LabResultRequest,
    MedicationOrder, Medicine, NewLabOrder, NewMedicationOrder, Page, RejectionReason,
};

/// Error envelope used by the case service.
#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    code: String,
    #[serde(default)]
    message: String,
}

/// HTTP implementation of [`CaseStore`].
pub struct HttpCaseStore {
    base_url: String,
    client: reqwest::Client,
}

impl HttpCaseStore {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn from_config(config: &ReconcilerConfig) -> Result<Self, StoreError> {
        Self::new(&config.api_base_url, config.request_timeout)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, StoreError> {
        let response = request.send().await.map_err(|e| {
            if e.is_connect() {
                StoreError::Network(format!("cannot connect to {}", self.base_url))
            } else if e.is_timeout() {
                StoreError::Network("request timed out".into())
            } else {
                StoreError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status.as_u16(), body));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }
}

/// 409/422 with a known reason code is a rejection; anything else goes
/// through the status taxonomy.
fn classify_failure(status: u16, body: String) -> StoreError {
    if status == 409 || status == 422 {
        if let Ok(parsed) = serde_json::from_str::<ErrorBody>(&body) {
            if let Ok(reason) = parsed.error.code.parse::<RejectionReason>() {
                return StoreError::Rejected(Rejection::new(reason, parsed.error.message));
            }
        }
    }
    StoreError::from_status(status, body)
}

#[async_trait]
impl CaseStore for HttpCaseStore {
    async fn get_case(&self, id: Uuid) -> Result<CaseRecord, StoreError> {
        self.send(self.client.get(self.url(&format!("/cases/{id}"))))
            .await
    }

    async fn list_cases(
        &self,
        filter: &CaseFilter,
        page: u32,
        limit: u32,
    ) -> Result<Page<CaseRecord>, StoreError> {
        let request = self
            .client
            .get(self.url("/cases"))
            .query(&filter.query_pairs(page, limit));
        self.send(request).await
    }

    async fn dispense(&self, order_id: Uuid, quantity: u32) -> Result<MedicationOrder, StoreError> {
        let body = DispenseRequest {
            quantity_dispensed: quantity,
        };
        let request = self
            .client
            .put(self.url(&format!("/medication-orders/{order_id}")))
            .json(&body);
        self.send(request).await
    }

    async fn complete_lab_order(
        &self,
        order_id: Uuid,
        result: &str,
    ) -> Result<LabOrder, StoreError> {
        let body = LabResultRequest {
            status: LabOrderStatus::Completed,
            result: Some(result.to_string()),
        };
        let request = self
            .client
            .put(self.url(&format!("/lab-orders/{order_id}")))
            .json(&body);
        self.send(request).await
    }

    async fn add_medication_order(
        &self,
        case_id: Uuid,
        order: &NewMedicationOrder,
    ) -> Result<MedicationOrder, StoreError> {
        let request = self
            .client
            .post(self.url(&format!("/cases/{case_id}/medication-orders")))
            .json(order);
        self.send(request).await
    }

    async fn add_lab_order(
        &self,
        case_id: Uuid,
        order: &NewLabOrder,
    ) -> Result<LabOrder, StoreError> {
        let request = self
            .client
            .post(self.url(&format!("/cases/{case_id}/lab-orders")))
            .json(order);
        self.send(request).await
    }

    async fn search_medicines(&self, query: &str) -> Result<Vec<Medicine>, StoreError> {
        let request = self
            .client
            .get(self.url("/medicines"))
            .query(&[("search", query)]);
        self.send(request).await
    }

    async fn list_medicines(&self) -> Result<Vec<Medicine>, StoreError> {
        self.send(self.client.get(self.url("/medicines"))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PatientRef, Vitals};
    use axum::extract::{Path, Query, State};
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Response};
    use axum::routing::{get, post, put};
    use axum::{Json, Router};
    use chrono::Utc;
    use std::collections::{HashMap, HashSet};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Stub {
        seen_queries: Arc<Mutex<Vec<HashMap<String, String>>>>,
        seen_bodies: Arc<Mutex<Vec<serde_json::Value>>>,
        completed_labs: Arc<Mutex<HashSet<Uuid>>>,
    }

    fn reject(status: StatusCode, code: &str, message: &str) -> Response {
        let error = serde_json::json!({ "error": { "code": code, "message": message } });
        (status, Json(error)).into_response()
    }

    fn sample_case() -> CaseRecord {
        CaseRecord::intake(
            PatientRef::Student {
                student_id: "EE-12".into(),
                name: "Kemi".into(),
            },
            Vitals::default(),
            None,
        )
    }

    async fn list_cases(
        State(stub): State<Stub>,
        Query(params): Query<HashMap<String, String>>,
    ) -> Json<serde_json::Value> {
        stub.seen_queries.lock().unwrap().push(params);
        Json(serde_json::json!({ "data": [sample_case()], "has_more": true }))
    }

    async fn get_case(Path(id): Path<String>) -> Response {
        if id == Uuid::nil().to_string() {
            return (StatusCode::NOT_FOUND, "case not found").into_response();
        }
        Json(sample_case()).into_response()
    }

    async fn dispense(Path(id): Path<Uuid>, Json(body): Json<DispenseRequest>) -> Response {
        if body.quantity_dispensed > 10 {
            let error = serde_json::json!({
                "error": { "code": "EXCEEDS_ORDERED_QUANTITY", "message": "only 10 ordered" }
            });
            return (StatusCode::UNPROCESSABLE_ENTITY, Json(error)).into_response();
        }
        Json(MedicationOrder {
            id,
            case_id: Uuid::new_v4(),
            medicine_id: Uuid::new_v4(),
            medicine_name: None,
            quantity_ordered: 10,
            quantity_dispensed: Some(body.quantity_dispensed),
            instructions: None,
        })
        .into_response()
    }

    async fn complete_lab(
        State(stub): State<Stub>,
        Path(id): Path<Uuid>,
        Json(body): Json<serde_json::Value>,
    ) -> Response {
        stub.seen_bodies.lock().unwrap().push(body.clone());
        if !stub.completed_labs.lock().unwrap().insert(id) {
            return reject(StatusCode::CONFLICT, "ALREADY_COMPLETED", "result already recorded");
        }
        Json(LabOrder {
            id,
            case_id: Uuid::new_v4(),
            test_name: "CBC".into(),
            status: LabOrderStatus::Completed,
            result: body["result"].as_str().map(str::to_string),
            completed_at: Some(Utc::now()),
        })
        .into_response()
    }

    async fn add_medication_order(
        Path(case_id): Path<Uuid>,
        Json(body): Json<NewMedicationOrder>,
    ) -> Response {
        if case_id.is_nil() {
            return reject(StatusCode::UNPROCESSABLE_ENTITY, "CASE_CLOSED", "case is closed");
        }
        Json(MedicationOrder {
            id: Uuid::new_v4(),
            case_id,
            medicine_id: body.medicine_id,
            medicine_name: Some("Paracetamol".into()),
            quantity_ordered: body.quantity_ordered,
            quantity_dispensed: None,
            instructions: body.instructions,
        })
        .into_response()
    }

    async fn add_lab_order(Path(case_id): Path<Uuid>, Json(body): Json<NewLabOrder>) -> Response {
        if body.test_name.trim().is_empty() {
            return reject(StatusCode::UNPROCESSABLE_ENTITY, "INVALID_TEST_NAME", "blank");
        }
        Json(LabOrder {
            id: Uuid::new_v4(),
            case_id,
            test_name: body.test_name,
            status: LabOrderStatus::Requested,
            result: None,
            completed_at: None,
        })
        .into_response()
    }

    async fn medicines(Query(params): Query<HashMap<String, String>>) -> Response {
        match params.get("search").map(String::as_str) {
            Some("restricted") => StatusCode::FORBIDDEN.into_response(),
            Some("broken") => (StatusCode::OK, "not json").into_response(),
            _ => Json(vec![Medicine {
                id: Uuid::new_v4(),
                name: "Paracetamol".into(),
                stock_on_hand: 40,
                unit: None,
            }])
            .into_response(),
        }
    }

    async fn serve(stub: Stub) -> String {
        let app = Router::new()
            .route("/cases", get(list_cases))
            .route("/cases/:id", get(get_case))
            .route("/medication-orders/:id", put(dispense))
            .route("/lab-orders/:id", put(complete_lab))
            .route("/cases/:id/medication-orders", post(add_medication_order))
            .route("/cases/:id/lab-orders", post(add_lab_order))
            .route("/medicines", get(medicines))
            .with_state(stub);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn client(base: &str) -> HttpCaseStore {
        HttpCaseStore::new(base, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn list_sends_filters_as_query_parameters() {
        let stub = Stub::default();
        let base = serve(stub.clone()).await;
        let store = client(&base);

        let filter = CaseFilter::default()
            .with_search("kemi")
            .with_status(crate::status::CanonicalStatus::LabTestRequested);
        let page = store.list_cases(&filter, 2, 15).await.unwrap();
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.has_more, Some(true));

        let seen = stub.seen_queries.lock().unwrap();
        assert_eq!(seen[0]["search"], "kemi");
        assert_eq!(seen[0]["status"], "Lab Test Requested");
        assert_eq!(seen[0]["page"], "2");
        assert_eq!(seen[0]["limit"], "15");
    }

    #[tokio::test]
    async fn missing_case_is_not_found() {
        let base = serve(Stub::default()).await;
        let err = client(&base).get_case(Uuid::nil()).await.unwrap_err();
        assert_eq!(err, StoreError::NotFound("case not found".into()));
    }

    #[tokio::test]
    async fn rejection_body_becomes_rejected_error() {
        let base = serve(Stub::default()).await;
        let err = client(&base).dispense(Uuid::new_v4(), 12).await.unwrap_err();
        match err {
            StoreError::Rejected(rejection) => {
                assert_eq!(rejection.reason, RejectionReason::ExceedsOrderedQuantity);
                assert_eq!(rejection.message, "only 10 ordered");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn accepted_dispense_returns_updated_order() {
        let base = serve(Stub::default()).await;
        let order = client(&base).dispense(Uuid::new_v4(), 7).await.unwrap();
        assert_eq!(order.quantity_dispensed, Some(7));
    }

    #[tokio::test]
    async fn lab_completion_sends_status_and_result() {
        let stub = Stub::default();
        let base = serve(stub.clone()).await;
        let store = client(&base);
        let lab_id = Uuid::new_v4();

        let order = store.complete_lab_order(lab_id, "Hb 12.9").await.unwrap();
        assert_eq!(order.status, LabOrderStatus::Completed);
        assert_eq!(order.result.as_deref(), Some("Hb 12.9"));
        assert_eq!(
            stub.seen_bodies.lock().unwrap()[0],
            serde_json::json!({ "status": "Completed", "result": "Hb 12.9" })
        );

        match store.complete_lab_order(lab_id, "Hb 10.0").await.unwrap_err() {
            StoreError::Rejected(rejection) => {
                assert_eq!(rejection.reason, RejectionReason::AlreadyCompleted);
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn new_orders_post_to_the_case() {
        let base = serve(Stub::default()).await;
        let store = client(&base);
        let case_id = Uuid::new_v4();
        let medicine_id = Uuid::new_v4();

        let med = store
            .add_medication_order(
                case_id,
                &NewMedicationOrder {
                    medicine_id,
                    quantity_ordered: 8,
                    instructions: Some("after food".into()),
                },
            )
            .await
            .unwrap();
        assert_eq!(med.case_id, case_id);
        assert_eq!(med.medicine_id, medicine_id);
        assert_eq!(med.quantity_ordered, 8);
        assert!(med.is_prescribed() && !med.is_issued());

        let lab = store
            .add_lab_order(case_id, &NewLabOrder { test_name: "Widal".into() })
            .await
            .unwrap();
        assert_eq!(lab.case_id, case_id);
        assert_eq!(lab.status, LabOrderStatus::Requested);
    }

    #[tokio::test]
    async fn rejected_order_creation_maps_reason() {
        let base = serve(Stub::default()).await;
        let store = client(&base);

        let closed = store
            .add_medication_order(
                Uuid::nil(),
                &NewMedicationOrder {
                    medicine_id: Uuid::new_v4(),
                    quantity_ordered: 1,
                    instructions: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            closed,
            StoreError::Rejected(ref r) if r.reason == RejectionReason::CaseClosed
        ));

        let blank = store
            .add_lab_order(Uuid::new_v4(), &NewLabOrder { test_name: " ".into() })
            .await
            .unwrap_err();
        assert!(matches!(
            blank,
            StoreError::Rejected(ref r) if r.reason == RejectionReason::InvalidTestName
        ));
    }

    #[tokio::test]
    async fn forbidden_and_malformed_responses_are_classified() {
        let base = serve(Stub::default()).await;
        let store = client(&base);
        assert_eq!(
            store.search_medicines("restricted").await.unwrap_err(),
            StoreError::Forbidden
        );
        assert!(matches!(
            store.search_medicines("broken").await.unwrap_err(),
            StoreError::Decode(_)
        ));
        assert_eq!(store.search_medicines("para").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unreachable_service_is_network_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client(&format!("http://{addr}"))
            .list_medicines()
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Network(_)));
        assert!(err.allows_fallback());
    }

    #[test]
    fn unknown_rejection_code_falls_back_to_status() {
        let body = r#"{"error":{"code":"SOMETHING_NEW","message":"?"}}"#.to_string();
        assert!(matches!(
            classify_failure(409, body),
            StoreError::Server { status: 409, .. }
        ));
    }

    #[test]
    fn base_url_is_normalized() {
        let store = client("http://cases.local/api/");
        assert_eq!(store.base_url(), "http://cases.local/api");
        assert_eq!(store.url("/cases"), "http://cases.local/api/cases");
    }
}
