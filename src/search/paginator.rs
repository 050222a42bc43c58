use serde::Serialize;

pub const PAGE_SIZE: usize = 8;
const MAX_VISIBLE_PAGES: usize = 5;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub page_size: usize,
    pub total_count: usize,
    pub total_pages: usize,
}

/// Slices `[(page-1)*size, page*size)` out of the full result set.
/// Pages past the end are empty; page 0 is read as page 1.
pub fn paginate<T>(items: Vec<T>, page: usize, page_size: usize) -> Page<T> {
    let page = page.max(1);
    let page_size = page_size.max(1);
    let total_count = items.len();
    let total_pages = total_count.div_ceil(page_size);
    let start = (page - 1).saturating_mul(page_size);
    let items = items.into_iter().skip(start).take(page_size).collect();

    Page {
        items,
        page,
        page_size,
        total_count,
        total_pages,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageLink {
    pub number: usize,
    pub active: bool,
    // An ellipsis between the window and the first/last page
    pub gap: bool,
}

impl PageLink {
    fn page(number: usize, current: usize) -> Self {
        Self {
            number,
            active: number == current,
            gap: false,
        }
    }

    fn gap() -> Self {
        Self {
            number: 0,
            active: false,
            gap: true,
        }
    }
}

/// Pagination controls: a window of up to five pages around the current one,
/// plus first/last links. Out-of-range moves are disabled, not errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageNav {
    pub current: usize,
    pub total_pages: usize,
    pub links: Vec<PageLink>,
    pub prev: Option<usize>,
    pub next: Option<usize>,
}

impl PageNav {
    pub fn new(current: usize, total_pages: usize) -> Self {
        let mut links = Vec::new();
        if total_pages > 0 {
            let current = current.clamp(1, total_pages);
            let mut start = current.saturating_sub(MAX_VISIBLE_PAGES / 2).max(1);
            let end = (start + MAX_VISIBLE_PAGES - 1).min(total_pages);
            if end + 1 - start < MAX_VISIBLE_PAGES {
                start = (end + 1).saturating_sub(MAX_VISIBLE_PAGES).max(1);
            }

            if start > 1 {
                links.push(PageLink::page(1, current));
                if start > 2 {
                    links.push(PageLink::gap());
                }
            }
            links.extend((start..=end).map(|n| PageLink::page(n, current)));
            if end < total_pages {
                if end + 1 < total_pages {
                    links.push(PageLink::gap());
                }
                links.push(PageLink::page(total_pages, current));
            }
        }

        Self {
            current,
            total_pages,
            links,
            prev: (current > 1 && current <= total_pages).then(|| current - 1),
            next: (current < total_pages).then(|| current + 1),
        }
    }

    /// Nothing to navigate with a single page.
    pub fn is_visible(&self) -> bool {
        self.total_pages > 1
    }
}
