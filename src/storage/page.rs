// Page-based row storage
// Rows are grouped into fixed-size pages; a row id encodes (page, slot) so
// lookups by id never scan

use super::Row;

/// A fixed-capacity block of rows
#[derive(Debug, Clone)]
pub struct Page {
    pub id: usize,
    pub rows: Vec<Row>,
    pub max_rows: usize,
}

impl Page {
    pub fn new(id: usize, max_rows: usize) -> Self {
        Self {
            id,
            rows: Vec::with_capacity(max_rows),
            max_rows,
        }
    }

    /// Append a row; returns false if the page is full
    pub fn insert(&mut self, row: Row) -> bool {
        if self.is_full() {
            return false;
        }

        self.rows.push(row);
        true
    }

    pub fn is_full(&self) -> bool {
        self.rows.len() >= self.max_rows
    }

    pub fn get(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }
}

/// Owns the pages of one table.
///
/// Storage is append-only: rows are never moved or removed, so row ids grow
/// in insertion order and a scan visits rows in the order they were loaded.
#[derive(Debug)]
pub struct PageManager {
    pages: Vec<Page>,
    max_rows_per_page: usize,
}

impl PageManager {
    pub fn new(max_rows_per_page: usize) -> Self {
        Self {
            pages: Vec::new(),
            max_rows_per_page: max_rows_per_page.max(1),
        }
    }

    /// Append a row, opening a new page when the last one is full.
    /// Returns the row id.
    pub fn insert(&mut self, row: Row) -> usize {
        if let Some(page) = self.pages.last_mut().filter(|p| !p.is_full()) {
            let slot = page.rows.len();
            page.insert(row);
            return page.id * self.max_rows_per_page + slot;
        }

        let page_id = self.pages.len();
        let mut page = Page::new(page_id, self.max_rows_per_page);
        page.insert(row);
        self.pages.push(page);

        page_id * self.max_rows_per_page
    }

    /// Get a row by id: `page_id * max_rows_per_page + slot`
    pub fn get(&self, row_id: usize) -> Option<&Row> {
        let page_id = row_id / self.max_rows_per_page;
        let slot = row_id % self.max_rows_per_page;

        self.pages.get(page_id)?.get(slot)
    }

    /// Iterate over every row with its id, in insertion order
    pub fn scan(&self) -> impl Iterator<Item = (usize, &Row)> + '_ {
        let per_page = self.max_rows_per_page;
        self.pages.iter().flat_map(move |page| {
            page.rows
                .iter()
                .enumerate()
                .map(move |(slot, row)| (page.id * per_page + slot, row))
        })
    }

    pub fn total_rows(&self) -> usize {
        self.pages.iter().map(|p| p.rows.len()).sum()
    }
}
