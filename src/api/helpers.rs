use serde::Serialize;

use crate::requests::types::Page;

#[derive(Debug, Serialize)]
pub struct ListResponse<T: Serialize> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub size: i64,
}

impl<T: Serialize> ListResponse<T> {
    /// Convert each item of a store page into its response shape.
    pub fn from_page<S>(page: Page<S>, f: impl FnMut(S) -> T) -> Self {
        Self {
            items: page.items.into_iter().map(f).collect(),
            total: page.total,
            page: page.page,
            size: page.size,
        }
    }
}
