use serde::{Deserialize, Serialize};

/// First page index of the remote API.
pub const FIRST_PAGE: u32 = 1;

/// Pagination bookkeeping for one feed.
///
/// `next_page` is `None` once a page came back short, meaning the remote has
/// nothing further. `prev_page` stays `None` because the feed always starts at
/// page 1 and only grows forward.
///
/// Page numbers only mean something together with the page size they were
/// counted in, so the cursor records that size too.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub next_page: Option<u32>,
    pub prev_page: Option<u32>,
    #[serde(default)]
    pub page_size: Option<u32>,
}

impl Cursor {
    pub fn new(next_page: Option<u32>, prev_page: Option<u32>) -> Self {
        Self {
            next_page,
            prev_page,
            page_size: None,
        }
    }

    /// Cursor to store after fetching `page` and getting `received` of
    /// `requested` items back.
    pub fn after_page(page: u32, received: usize, requested: usize) -> Self {
        let next_page = if received < requested {
            None
        } else {
            Some(page + 1)
        };
        // Pages before the refresh page are never cached, so there is nothing
        // to prepend even when `page > FIRST_PAGE`.
        Self {
            next_page,
            prev_page: None,
            page_size: u32::try_from(requested).ok(),
        }
    }

    /// Whether `next_page`/`prev_page` were counted in pages of `page_size`.
    /// A cursor with no recorded size is taken as matching.
    pub fn counts_pages_of(&self, page_size: u32) -> bool {
        self.page_size.map_or(true, |size| size == page_size)
    }

    pub fn is_end_of_data(&self) -> bool {
        self.next_page.is_none()
    }
}
