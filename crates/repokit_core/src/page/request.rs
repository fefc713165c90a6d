use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Rejected page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageRequestError {
    ZeroSize,
}

impl Display for PageRequestError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ZeroSize => write!(f, "page size must be greater than zero"),
        }
    }
}

impl Error for PageRequestError {}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

/// One ordering term.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Order {
    pub field: String,
    pub direction: Direction,
}

/// Ordered list of ordering terms.
///
/// The repository appends an ascending identifier term unless the sort
/// already names the identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sort {
    orders: Vec<Order>,
}

impl Sort {
    pub fn unsorted() -> Self {
        Self::default()
    }

    /// Ascending sort on `field`; use [`Sort::desc`] to flip the last term.
    pub fn by(field: impl Into<String>) -> Self {
        Self::unsorted().then(field)
    }

    pub fn then(mut self, field: impl Into<String>) -> Self {
        self.orders.push(Order {
            field: field.into(),
            direction: Direction::Asc,
        });
        self
    }

    pub fn asc(self) -> Self {
        self.with_last_direction(Direction::Asc)
    }

    pub fn desc(self) -> Self {
        self.with_last_direction(Direction::Desc)
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    pub fn is_unsorted(&self) -> bool {
        self.orders.is_empty()
    }

    fn with_last_direction(mut self, direction: Direction) -> Self {
        if let Some(last) = self.orders.last_mut() {
            last.direction = direction;
        }
        self
    }
}

impl FromIterator<Order> for Sort {
    fn from_iter<I: IntoIterator<Item = Order>>(iter: I) -> Self {
        Self {
            orders: iter.into_iter().collect(),
        }
    }
}

/// Zero-based page index plus page size and ordering.
///
/// Deserialization goes through [`PageRequest::of`], so a zero size is
/// rejected there too.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "PageRequestFields")]
pub struct PageRequest {
    index: u64,
    size: u64,
    sort: Sort,
}

#[derive(Deserialize)]
struct PageRequestFields {
    #[serde(default)]
    index: u64,
    size: u64,
    #[serde(default)]
    sort: Sort,
}

impl TryFrom<PageRequestFields> for PageRequest {
    type Error = PageRequestError;

    fn try_from(fields: PageRequestFields) -> Result<Self, Self::Error> {
        Ok(Self::of(fields.index, fields.size)?.with_sort(fields.sort))
    }
}

impl PageRequest {
    pub fn of(index: u64, size: u64) -> Result<Self, PageRequestError> {
        if size == 0 {
            return Err(PageRequestError::ZeroSize);
        }
        Ok(Self {
            index,
            size,
            sort: Sort::unsorted(),
        })
    }

    pub fn with_sort(mut self, sort: Sort) -> Self {
        self.sort = sort;
        self
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn sort(&self) -> &Sort {
        &self.sort
    }

    /// Row offset of the first element of this page.
    pub fn offset(&self) -> u64 {
        self.index.saturating_mul(self.size)
    }

    pub fn next(&self) -> Self {
        Self {
            index: self.index.saturating_add(1),
            ..self.clone()
        }
    }

    pub fn previous_or_first(&self) -> Self {
        Self {
            index: self.index.saturating_sub(1),
            ..self.clone()
        }
    }

    pub fn first(&self) -> Self {
        Self {
            index: 0,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Direction, PageRequest, PageRequestError, Sort};

    #[test]
    fn zero_size_is_rejected() {
        assert_eq!(PageRequest::of(0, 0), Err(PageRequestError::ZeroSize));
    }

    #[test]
    fn deserialized_zero_size_is_rejected() {
        let err = serde_json::from_str::<PageRequest>(r#"{"index":0,"size":0,"sort":{"orders":[]}}"#)
            .expect_err("zero size");
        assert!(err.to_string().contains("page size must be greater than zero"));
    }

    #[test]
    fn deserialized_request_keeps_fields() {
        let request = PageRequest::of(2, 5)
            .expect("valid")
            .with_sort(Sort::by("age").desc());
        let json = serde_json::to_string(&request).expect("serialize");
        let parsed: PageRequest = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, request);

        let minimal: PageRequest = serde_json::from_str(r#"{"size":4}"#).expect("defaults");
        assert_eq!(minimal, PageRequest::of(0, 4).expect("valid"));
    }

    #[test]
    fn navigation_keeps_size_and_sort() {
        let request = PageRequest::of(1, 3)
            .expect("valid")
            .with_sort(Sort::by("username").desc());
        let next = request.next();
        assert_eq!(next.index(), 2);
        assert_eq!(next.size(), 3);
        assert_eq!(next.sort(), request.sort());
        assert_eq!(request.previous_or_first().index(), 0);
        assert_eq!(request.first().previous_or_first().index(), 0);
        assert_eq!(next.offset(), 6);
    }

    #[test]
    fn direction_applies_to_last_term() {
        let sort = Sort::by("age").desc().then("username");
        let directions: Vec<_> = sort.orders().iter().map(|o| o.direction).collect();
        assert_eq!(directions, vec![Direction::Desc, Direction::Asc]);
    }
}
