// Navigation fields shared by every paged listing.

use serde::Serialize;

use crate::incident::Page;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub current_page: u64,
    pub total_items: u64,
    pub total_pages: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_page: Option<String>,
}

impl PageMeta {
    /// `link` renders the URL of a neighbouring page number.
    pub fn new<T>(page: &Page<T>, link: impl Fn(u64) -> String) -> Self {
        Self {
            current_page: page.page,
            total_items: page.total_items,
            total_pages: page.total_pages(),
            next_page: page.has_next().then(|| link(page.page + 1)),
            previous_page: page.has_previous().then(|| link(page.page - 1)),
        }
    }
}
