use serde::{Deserialize, Serialize};

/// Pagination envelope returned by every list endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    /// Absent on older endpoints; see [`Page::has_more`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_more: Option<bool>,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, has_more: bool) -> Self {
        Self {
            data,
            has_more: Some(has_more),
        }
    }

    /// Server flag when present, otherwise a full page implies more remain.
    pub fn has_more(&self, page_size: u32) -> bool {
        self.has_more
            .unwrap_or(self.data.len() >= page_size as usize)
    }
}
