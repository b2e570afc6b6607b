use std::fmt;

pub const PAGE_SIZE_CHOICES: [usize; 5] = [25, 50, 100, 250, 500];
pub const DEFAULT_PAGE_SIZE: usize = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageSize(usize);

impl PageSize {
    pub fn new(value: usize) -> Result<Self, String> {
        if PAGE_SIZE_CHOICES.contains(&value) {
            Ok(Self(value))
        } else {
            Err(format!(
                "invalid page size {value}, expected one of {}",
                PAGE_SIZE_CHOICES
                    .iter()
                    .map(|c| c.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        }
    }

    pub fn parse(value: &str) -> Result<Self, String> {
        let n = value
            .trim()
            .parse::<usize>()
            .map_err(|_| format!("invalid page size '{value}'"))?;
        Self::new(n)
    }

    pub fn get(self) -> usize {
        self.0
    }
}

impl Default for PageSize {
    fn default() -> Self {
        Self(DEFAULT_PAGE_SIZE)
    }
}

/// Header data for one rendered page. `start`/`end` are 1-based display
/// indices and `start` is 0 when nothing matched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageMeta {
    pub start: usize,
    pub end: usize,
    pub total: usize,
    pub page: usize,
    pub total_pages: usize,
    pub has_prev: bool,
    pub has_next: bool,
}

impl fmt::Display for PageMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Showing {}-{} of {} \u{2022} Page {}/{}",
            self.start, self.end, self.total, self.page, self.total_pages
        )
    }
}

pub fn total_pages(total: usize, page_size: PageSize) -> usize {
    std::cmp::max(1, total.div_ceil(page_size.get()))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageView {
    page: usize,
    page_size: PageSize,
}

impl Default for PageView {
    fn default() -> Self {
        Self::new(PageSize::default())
    }
}

impl PageView {
    pub fn new(page_size: PageSize) -> Self {
        Self { page: 1, page_size }
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_size(&self) -> PageSize {
        self.page_size
    }

    pub fn reset(&mut self) {
        self.page = 1;
    }

    pub fn set_page_size(&mut self, page_size: PageSize) {
        self.page_size = page_size;
        self.page = 1;
    }

    /// Jump to `page`, clamped into `1..=total_pages` for `total` items.
    pub fn goto(&mut self, page: usize, total: usize) -> usize {
        let last = total_pages(total, self.page_size);
        self.page = page.clamp(1, last);
        self.page
    }

    pub fn next(&mut self, total: usize) -> bool {
        if self.page < total_pages(total, self.page_size) {
            self.page += 1;
            true
        } else {
            false
        }
    }

    pub fn prev(&mut self) -> bool {
        if self.page > 1 {
            self.page -= 1;
            true
        } else {
            false
        }
    }

    /// Slice `items` for the current page, first clamping the page down if
    /// the set shrank below it.
    pub fn slice<'a, T>(&mut self, items: &'a [T]) -> (&'a [T], PageMeta) {
        let total = items.len();
        let last = total_pages(total, self.page_size);
        if self.page > last {
            self.page = last;
        }
        let size = self.page_size.get();
        let start_idx = (self.page - 1) * size;
        let end_idx = std::cmp::min(start_idx + size, total);
        let slice = &items[start_idx.min(total)..end_idx];
        let meta = PageMeta {
            start: if total == 0 { 0 } else { start_idx + 1 },
            end: start_idx + slice.len(),
            total,
            page: self.page,
            total_pages: last,
            has_prev: self.page > 1,
            has_next: self.page < last,
        };
        (slice, meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn size(n: usize) -> PageSize {
        PageSize::new(n).unwrap()
    }

    #[test]
    fn page_count_is_at_least_one() {
        assert_eq!(total_pages(0, size(25)), 1);
        assert_eq!(total_pages(25, size(25)), 1);
        assert_eq!(total_pages(26, size(25)), 2);
        assert_eq!(total_pages(1000, size(100)), 10);
    }

    #[test]
    fn slice_lengths_match_for_every_valid_page() {
        let items: Vec<usize> = (0..237).collect();
        for s in PAGE_SIZE_CHOICES {
            let mut view = PageView::new(size(s));
            let pages = total_pages(items.len(), size(s));
            for page in 1..=pages {
                view.goto(page, items.len());
                let (slice, meta) = view.slice(&items);
                let expected = std::cmp::min(s, items.len() - (page - 1) * s);
                assert_eq!(slice.len(), expected);
                assert_eq!(meta.start, (page - 1) * s + 1);
                assert_eq!(meta.end, meta.start + expected - 1);
                assert_eq!(slice[0], (page - 1) * s);
            }
        }
    }

    #[test]
    fn page_clamps_down_when_set_shrinks() {
        let big: Vec<u8> = vec![0; 300];
        let mut view = PageView::new(size(100));
        view.goto(3, big.len());
        assert_eq!(view.page(), 3);

        let small: Vec<u8> = vec![0; 120];
        let (slice, meta) = view.slice(&small);
        assert_eq!(meta.page, 2);
        assert_eq!(slice.len(), 20);
        assert!(meta.has_prev);
        assert!(!meta.has_next);
    }

    #[test]
    fn empty_set_renders_zero_range() {
        let empty: Vec<u8> = Vec::new();
        let mut view = PageView::default();
        let (slice, meta) = view.slice(&empty);
        assert!(slice.is_empty());
        assert_eq!(meta.to_string(), "Showing 0-0 of 0 \u{2022} Page 1/1");
        assert!(!meta.has_prev && !meta.has_next);
    }

    #[test]
    fn page_size_change_resets_to_first_page() {
        let mut view = PageView::new(size(25));
        view.goto(4, 200);
        view.set_page_size(size(50));
        assert_eq!(view.page(), 1);
    }

    #[test]
    fn next_and_prev_stop_at_bounds() {
        let mut view = PageView::new(size(50));
        assert!(!view.prev());
        assert!(view.next(60));
        assert!(!view.next(60));
        assert_eq!(view.page(), 2);
    }

    #[test]
    fn page_size_rejects_unlisted_values() {
        assert!(PageSize::parse("100").is_ok());
        assert!(PageSize::parse("7").is_err());
        assert!(PageSize::parse("abc").is_err());
    }
}
