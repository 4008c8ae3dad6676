//! Pagination.
//!
//! `total_pages = ceil(found / per_page)`, or 0 when nothing was found.
//! Navigation clamps to `[1, total_pages]` and does nothing when there is
//! at most one page.

use serde::Serialize;

/// Number of pages needed for `found` results.
pub fn total_pages(found: u64, per_page: u32) -> u32 {
    if found == 0 || per_page == 0 {
        return 0;
    }
    let pages = found.div_ceil(u64::from(per_page));
    u32::try_from(pages).unwrap_or(u32::MAX)
}

/// A navigation action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageNav {
    First,
    Prev,
    Next,
    Last,
    Goto(u32),
}

/// Current position within a result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
    pub found: u64,
}

impl Pagination {
    pub fn new(page: u32, per_page: u32, found: u64) -> Self {
        Self {
            page,
            per_page,
            found,
        }
    }

    pub fn total_pages(&self) -> u32 {
        total_pages(self.found, self.per_page)
    }

    /// The page `nav` leads to. Returns the current page unchanged when
    /// there is nothing to navigate.
    pub fn navigate(&self, nav: PageNav) -> u32 {
        let total = self.total_pages();
        if total <= 1 {
            return self.page;
        }
        let target = match nav {
            PageNav::First => 1,
            PageNav::Prev => self.page.saturating_sub(1),
            PageNav::Next => self.page.saturating_add(1),
            PageNav::Last => total,
            PageNav::Goto(page) => page,
        };
        target.clamp(1, total)
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages()
    }

    /// 1-based `(from, to)` of the results on the current page, `None` when
    /// the page is empty.
    pub fn showing(&self) -> Option<(u64, u64)> {
        if self.found == 0 || self.page == 0 {
            return None;
        }
        let per_page = u64::from(self.per_page);
        let from = u64::from(self.page - 1) * per_page + 1;
        if from > self.found {
            return None;
        }
        let to = (u64::from(self.page) * per_page).min(self.found);
        Some((from, to))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_pages_rounds_up() {
        assert_eq!(total_pages(101, 25), 5);
        assert_eq!(total_pages(100, 25), 4);
        assert_eq!(total_pages(1, 25), 1);
        assert_eq!(total_pages(0, 25), 0);
    }

    #[test]
    fn next_on_last_page_is_noop() {
        let p = Pagination::new(5, 25, 101);
        assert_eq!(p.navigate(PageNav::Next), 5);
        assert!(!p.has_next());
    }

    #[test]
    fn navigation_clamps() {
        let p = Pagination::new(1, 25, 101);
        assert_eq!(p.navigate(PageNav::Prev), 1);
        assert_eq!(p.navigate(PageNav::Next), 2);
        assert_eq!(p.navigate(PageNav::Last), 5);
        assert_eq!(p.navigate(PageNav::Goto(9)), 5);
        assert_eq!(p.navigate(PageNav::Goto(0)), 1);
        assert_eq!(Pagination::new(3, 25, 101).navigate(PageNav::First), 1);
    }

    #[test]
    fn single_page_ignores_navigation() {
        let p = Pagination::new(1, 25, 10);
        assert_eq!(p.navigate(PageNav::Next), 1);
        assert_eq!(p.navigate(PageNav::Goto(3)), 1);
        let empty = Pagination::new(1, 25, 0);
        assert_eq!(empty.navigate(PageNav::Last), 1);
    }

    #[test]
    fn showing_range() {
        assert_eq!(Pagination::new(1, 25, 101).showing(), Some((1, 25)));
        assert_eq!(Pagination::new(5, 25, 101).showing(), Some((101, 101)));
        assert_eq!(Pagination::new(1, 25, 0).showing(), None);
        assert_eq!(Pagination::new(7, 25, 101).showing(), None);
    }
}
