use super::PageRequest;
use serde::Serialize;

/// One page of results with total-count metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    content: Vec<T>,
    index: u64,
    size: u64,
    total_elements: u64,
}

impl<T> Page<T> {
    pub fn new(content: Vec<T>, request: &PageRequest, total_elements: u64) -> Self {
        Self {
            content,
            index: request.index(),
            size: request.size(),
            total_elements,
        }
    }

    pub fn content(&self) -> &[T] {
        &self.content
    }

    pub fn into_content(self) -> Vec<T> {
        self.content
    }

    pub fn number_of_elements(&self) -> usize {
        self.content.len()
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn total_elements(&self) -> u64 {
        self.total_elements
    }

    pub fn total_pages(&self) -> u64 {
        self.total_elements.div_ceil(self.size.max(1))
    }

    pub fn is_first(&self) -> bool {
        self.index == 0
    }

    pub fn has_next(&self) -> bool {
        self.index
            .saturating_add(1)
            .saturating_mul(self.size)
            < self.total_elements
    }

    pub fn is_last(&self) -> bool {
        !self.has_next()
    }

    pub fn has_previous(&self) -> bool {
        self.index > 0
    }

    /// Converts the content, keeping paging metadata.
    pub fn map<U, F>(self, f: F) -> Page<U>
    where
        F: FnMut(T) -> U,
    {
        Page {
            content: self.content.into_iter().map(f).collect(),
            index: self.index,
            size: self.size,
            total_elements: self.total_elements,
        }
    }
}

/// A window of results that only knows whether a next window exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Slice<T> {
    content: Vec<T>,
    index: u64,
    size: u64,
    has_next: bool,
}

impl<T> Slice<T> {
    /// Builds a slice from up to `size + 1` fetched rows; the probe row is
    /// dropped and only recorded as `has_next`.
    pub fn from_probe(mut rows: Vec<T>, request: &PageRequest) -> Self {
        let limit = usize::try_from(request.size()).unwrap_or(usize::MAX);
        let has_next = rows.len() > limit;
        rows.truncate(limit);
        Self {
            content: rows,
            index: request.index(),
            size: request.size(),
            has_next,
        }
    }

    pub fn content(&self) -> &[T] {
        &self.content
    }

    pub fn into_content(self) -> Vec<T> {
        self.content
    }

    pub fn number_of_elements(&self) -> usize {
        self.content.len()
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn has_next(&self) -> bool {
        self.has_next
    }

    pub fn is_first(&self) -> bool {
        self.index == 0
    }

    pub fn is_last(&self) -> bool {
        !self.has_next
    }

    pub fn has_previous(&self) -> bool {
        self.index > 0
    }

    pub fn map<U, F>(self, f: F) -> Slice<U>
    where
        F: FnMut(T) -> U,
    {
        Slice {
            content: self.content.into_iter().map(f).collect(),
            index: self.index,
            size: self.size,
            has_next: self.has_next,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Page, Slice};
    use crate::page::PageRequest;

    #[test]
    fn page_metadata_follows_total() {
        let request = PageRequest::of(0, 3).expect("valid");
        let page = Page::new(vec![1, 2, 3], &request, 5);
        assert_eq!(page.total_pages(), 2);
        assert!(page.is_first());
        assert!(page.has_next());
        assert!(!page.has_previous());

        let last = Page::new(vec![4, 5], &request.next(), 5);
        assert!(last.is_last());
        assert!(last.has_previous());
    }

    #[test]
    fn empty_total_has_zero_pages() {
        let request = PageRequest::of(0, 3).expect("valid");
        let page = Page::<i32>::new(Vec::new(), &request, 0);
        assert_eq!(page.total_pages(), 0);
        assert!(!page.has_next());
    }

    #[test]
    fn slice_drops_probe_row() {
        let request = PageRequest::of(0, 3).expect("valid");
        let slice = Slice::from_probe(vec![1, 2, 3, 4], &request);
        assert_eq!(slice.content(), &[1, 2, 3]);
        assert!(slice.has_next());

        let tail = Slice::from_probe(vec![4, 5], &request.next());
        assert!(!tail.has_next());
        assert_eq!(tail.map(|n| n * 10).content(), &[40, 50]);
    }
}
