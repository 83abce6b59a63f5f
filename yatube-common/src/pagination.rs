//! Fixed-size, 1-indexed pages over an ordered result set.
//!
//! Requests for pages that do not exist never fail: they resolve to the nearest page that does.

pub const POSTS_PER_PAGE: u64 = 10;

/// The page a client asked for, as given in the `page` query parameter.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Hash)]
pub enum PageRequest {
    #[default]
    First,
    Last,
    Number(i64),
}

impl PageRequest {
    /// Anything that is neither a number nor `last` asks for the first page. Numbers too large
    /// to represent ask for the last one.
    #[must_use]
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("last") => Self::Last,
            Some(number) => match number.parse() {
                Ok(number) => Self::Number(number),
                Err(_) if is_unsigned_integer(number) => Self::Last,
                Err(_) => Self::First,
            },
            None => Self::First,
        }
    }
}

fn is_unsigned_integer(raw: &str) -> bool {
    let digits = raw.strip_prefix('+').unwrap_or(raw);
    !digits.is_empty() && digits.bytes().all(|byte| byte.is_ascii_digit())
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct Paginator {
    total: u64,
    per_page: u64,
}

/// Where a resolved page sits in the full result set.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct PageWindow {
    pub number: u64,
    pub offset: u64,
    pub limit: u64,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub number: u64,
    pub num_pages: u64,
    pub total: u64,
}

impl Paginator {
    #[must_use]
    pub fn new(total: u64, per_page: u64) -> Self {
        Self {
            total,
            per_page: per_page.max(1),
        }
    }

    /// An empty result set still has one (empty) page.
    #[must_use]
    pub fn num_pages(self) -> u64 {
        self.total.div_ceil(self.per_page).max(1)
    }

    #[must_use]
    pub fn locate(self, request: PageRequest) -> PageWindow {
        let num_pages = self.num_pages();
        let number = match request {
            PageRequest::First => 1,
            PageRequest::Last => num_pages,
            PageRequest::Number(number) => {
                u64::try_from(number).map_or(1, |number| number.clamp(1, num_pages))
            }
        };

        PageWindow {
            number,
            offset: (number - 1) * self.per_page,
            limit: self.per_page,
        }
    }

    #[must_use]
    pub fn page<T>(self, window: PageWindow, items: Vec<T>) -> Page<T> {
        Page {
            items,
            number: window.number,
            num_pages: self.num_pages(),
            total: self.total,
        }
    }
}

impl<T> Page<T> {
    #[must_use]
    pub fn has_previous(&self) -> bool {
        self.number > 1
    }

    #[must_use]
    pub fn has_next(&self) -> bool {
        self.number < self.num_pages
    }

    #[must_use]
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            number: self.number,
            num_pages: self.num_pages,
            total: self.total,
        }
    }
}
