//! Page-number pagination for feeds.
//!
//! Out-of-range requests are clamped rather than rejected: anything missing,
//! non-numeric or below one resolves to the first page, and anything past the
//! end resolves to the last page. An empty listing still has one page.

use std::num::NonZeroU32;

/// A page number as requested by the client, before it is clamped against the
/// size of the listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    requested: u64,
}

impl PageRequest {
    pub fn first() -> Self {
        Self { requested: 1 }
    }

    pub fn number(requested: u64) -> Self {
        Self {
            requested: requested.max(1),
        }
    }

    /// Interpret the raw `page` query value.
    pub fn from_query(raw: Option<&str>) -> Self {
        let Some(raw) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
            return Self::first();
        };

        if let Ok(value) = raw.parse::<u64>() {
            return Self::number(value);
        }

        // Negative numbers clamp to the first page like every other value below one.
        Self::first()
    }

    pub fn requested(&self) -> u64 {
        self.requested
    }

    /// Resolve against a listing of `total` items.
    pub fn resolve(&self, total: u64, page_size: NonZeroU32) -> PageWindow {
        let size = u64::from(page_size.get());
        let num_pages = total.div_ceil(size).max(1);
        let number = self.requested.clamp(1, num_pages);
        PageWindow {
            number,
            num_pages,
            total,
            limit: size,
            offset: (number - 1) * size,
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::first()
    }
}

/// A clamped page position, ready to be turned into `LIMIT`/`OFFSET`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub number: u64,
    pub num_pages: u64,
    pub total: u64,
    pub limit: u64,
    pub offset: u64,
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub number: u64,
    pub num_pages: u64,
    pub total: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, window: PageWindow) -> Self {
        Self {
            items,
            number: window.number,
            num_pages: window.num_pages,
            total: window.total,
        }
    }

    pub fn has_previous(&self) -> bool {
        self.number > 1
    }

    pub fn has_next(&self) -> bool {
        self.number < self.num_pages
    }

    pub fn previous_number(&self) -> Option<u64> {
        self.has_previous().then(|| self.number - 1)
    }

    pub fn next_number(&self) -> Option<u64> {
        self.has_next().then(|| self.number + 1)
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            number: self.number,
            num_pages: self.num_pages,
            total: self.total,
        }
    }
}
