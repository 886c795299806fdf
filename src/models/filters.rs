use chrono::NaiveDate;

use crate::status::CanonicalStatus;

/// Filters for the case list view. Empty fields are not sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaseFilter {
    pub search: Option<String>,
    pub status: Option<CanonicalStatus>,
    pub date: Option<NaiveDate>,
}

impl CaseFilter {
    pub fn with_search(mut self, text: impl Into<String>) -> Self {
        self.search = Some(text.into());
        self
    }

    pub fn with_status(mut self, status: CanonicalStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    /// Query parameters for `GET /cases`, paging included.
    pub fn query_pairs(&self, page: u32, limit: u32) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::with_capacity(5);
        if let Some(search) = self.search.as_deref().map(str::trim) {
            if !search.is_empty() {
                pairs.push(("search", search.to_string()));
            }
        }
        if let Some(status) = self.status {
            pairs.push(("status", status.as_str().to_string()));
        }
        if let Some(date) = self.date {
            pairs.push(("date", date.format("%Y-%m-%d").to_string()));
        }
        pairs.push(("page", page.to_string()));
        pairs.push(("limit", limit.to_string()));
        pairs
    }
}
