/// Stores shown per listing page.
pub const PAGE_SIZE: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub page: u32,
    pub skip: u32,
    pub limit: u32,
}

impl PageWindow {
    /// Window for a 1-based page number. Page 0 is treated as page 1.
    pub fn for_page(page: u32) -> Self {
        let page = page.max(1);
        Self {
            page,
            skip: (page - 1).saturating_mul(PAGE_SIZE),
            limit: PAGE_SIZE,
        }
    }

    /// If this window ran past the end of the listing, the page to redirect to.
    pub fn overflow_redirect(&self, total: u32, returned: usize) -> Option<u32> {
        (returned == 0 && self.skip > 0).then(|| page_count(total).max(1))
    }
}

pub fn page_count(total: u32) -> u32 {
    total.div_ceil(PAGE_SIZE)
}
