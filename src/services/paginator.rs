// src/services/paginator.rs
use serde::Serialize;

/// Splits a listing of `count` items into pages of `per_page`.
#[derive(Debug, Clone, Copy)]
pub struct Paginator {
    count: i64,
    per_page: i64,
}

/// The slice of storage a page covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub number: i64,
    pub num_pages: i64,
    pub count: i64,
    pub offset: i64,
    pub limit: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub object_list: Vec<T>,
    pub number: i64,
    pub num_pages: i64,
    pub count: i64,
    pub has_next: bool,
    pub has_previous: bool,
    pub next_page_number: Option<i64>,
    pub previous_page_number: Option<i64>,
}

impl Paginator {
    pub fn new(count: i64, per_page: i64) -> Self {
        Self { count: count.max(0), per_page: per_page.max(1) }
    }

    /// There is always at least one page, even for an empty listing.
    pub fn num_pages(&self) -> i64 {
        if self.count == 0 {
            1
        } else {
            (self.count + self.per_page - 1) / self.per_page
        }
    }

    /// Resolves a raw `?page=` value the lenient way: anything that is not
    /// an integer gives the first page, integers out of range give the last.
    pub fn get_page(&self, raw: Option<&str>) -> PageWindow {
        let num_pages = self.num_pages();
        let number = match raw.map(str::trim).map(str::parse::<i64>) {
            Some(Ok(n)) if (1..=num_pages).contains(&n) => n,
            Some(Ok(_)) => num_pages,
            Some(Err(_)) | None => 1,
        };

        PageWindow {
            number,
            num_pages,
            count: self.count,
            offset: (number - 1) * self.per_page,
            limit: self.per_page,
        }
    }
}

impl PageWindow {
    pub fn into_page<T>(self, object_list: Vec<T>) -> Page<T> {
        let has_next = self.number < self.num_pages;
        let has_previous = self.number > 1;
        Page {
            object_list,
            number: self.number,
            num_pages: self.num_pages,
            count: self.count,
            has_next,
            has_previous,
            next_page_number: has_next.then_some(self.number + 1),
            previous_page_number: has_previous.then_some(self.number - 1),
        }
    }
}
