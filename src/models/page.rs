//! Pagination request and paged response types

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::config::PaginationConfig;

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    /// Case-insensitive `asc` / `desc`
    pub fn parse(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("asc") {
            Some(Direction::Asc)
        } else if s.eq_ignore_ascii_case("desc") {
            Some(Direction::Desc)
        } else {
            None
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

/// One `ORDER BY` term, named by its API property
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SortOrder {
    pub property: String,
    pub direction: Direction,
}

impl SortOrder {
    pub fn asc(property: &str) -> Self {
        Self {
            property: property.to_string(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(property: &str) -> Self {
        Self {
            property: property.to_string(),
            direction: Direction::Desc,
        }
    }
}

/// Raw `page`, `size` and repeated `sort` query parameters
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageParams {
    /// Zero-based page index (default: 0)
    pub page: Option<i64>,
    /// Page size (default: 20)
    pub size: Option<i64>,
    /// `property[,property...][,asc|desc]`, may be repeated
    #[serde(default)]
    pub sort: Vec<String>,
}

/// A validated page request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pageable {
    pub page: u32,
    pub size: u32,
    pub sort: Vec<SortOrder>,
}

impl Pageable {
    pub fn of(page: u32, size: u32) -> Self {
        Self {
            page,
            size: size.max(1),
            sort: Vec::new(),
        }
    }

    pub fn with_sort(mut self, order: SortOrder) -> Self {
        self.sort.push(order);
        self
    }

    /// Row offset of the first element of this page
    pub fn offset(&self) -> i64 {
        i64::from(self.page) * i64::from(self.size)
    }

    /// Apply defaults and bounds to raw query parameters. Sort properties are
    /// kept as given; the repository decides which ones it can order by.
    pub fn from_params(params: &PageParams, config: &PaginationConfig) -> Self {
        let page = params
            .page
            .unwrap_or(0)
            .clamp(0, i64::from(u32::MAX)) as u32;

        let max_size = config.max_size.max(1);
        let size = match params.size {
            Some(size) if size >= 1 => size.min(i64::from(max_size)) as u32,
            _ => config.default_size.clamp(1, max_size),
        };

        let sort = params.sort.iter().flat_map(|s| parse_sort(s)).collect();

        Self { page, size, sort }
    }
}

/// Parse `name`, `name,desc` or `name,price,asc` into sort orders
fn parse_sort(value: &str) -> Vec<SortOrder> {
    let mut parts: Vec<&str> = value
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    let direction = match parts.last().and_then(|p| Direction::parse(p)) {
        Some(direction) if parts.len() > 1 => {
            parts.pop();
            direction
        }
        _ => Direction::Asc,
    };

    parts
        .into_iter()
        .map(|property| SortOrder {
            property: property.to_string(),
            direction,
        })
        .collect()
}

/// One page of results plus totals
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Page<T>
where
    T: for<'a> ToSchema<'a>,
{
    pub content: Vec<T>,
    /// Rows across all pages
    pub total_elements: i64,
    pub total_pages: u32,
    /// Zero-based index of this page
    pub number: u32,
    /// Requested page size
    pub size: u32,
    /// Rows on this page
    pub number_of_elements: u32,
    pub first: bool,
    pub last: bool,
    pub empty: bool,
    pub sort: Vec<SortOrder>,
}

impl<T> Page<T>
where
    T: for<'a> ToSchema<'a>,
{
    pub fn new(content: Vec<T>, pageable: &Pageable, total_elements: i64) -> Self {
        let size = pageable.size.max(1);
        let total = total_elements.max(0) as u64;
        let total_pages = total.div_ceil(u64::from(size)) as u32;

        Self {
            number_of_elements: content.len() as u32,
            empty: content.is_empty(),
            content,
            total_elements,
            total_pages,
            number: pageable.page,
            size,
            first: pageable.page == 0,
            last: pageable.page.saturating_add(1) >= total_pages,
            sort: pageable.sort.clone(),
        }
    }
}
