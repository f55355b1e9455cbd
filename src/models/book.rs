//! Book model and its transfer object.
//!
//! [`Book`] is the row loaded from `book` plus its categories resolved through
//! `book_category`; [`BookDto`] is what travels over HTTP.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

use super::category::{Category, CategoryDto};

/// Book entity
#[derive(Debug, Clone, PartialEq, Default, FromRow)]
pub struct Book {
    /// `None` until the store assigns one on insert
    pub id: Option<i64>,
    pub name: String,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub img_url: Option<String>,
    pub date: Option<DateTime<Utc>>,
    // Loaded separately from book_category
    #[sqlx(skip)]
    pub categories: Vec<Category>,
}

impl Book {
    /// Category ids attached to this book, in association order
    pub fn category_ids(&self) -> Vec<i64> {
        self.categories.iter().map(|c| c.id).collect()
    }
}

/// Book as exposed by the API.
///
/// `id` is ignored on input: inserts get a store-generated id and updates take
/// the id from the path. Only `id` is read from each entry of `categories`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookDto {
    #[serde(default)]
    pub id: Option<i64>,
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    #[serde(default)]
    #[schema(value_type = Option<f64>)]
    #[validate(custom(function = "validate_price"))]
    pub price: Option<Decimal>,
    #[serde(default)]
    #[validate(url(message = "Image URL must be a valid URL"))]
    pub img_url: Option<String>,
    #[serde(default)]
    pub categories: Vec<CategoryDto>,
}

/// `book.price` is `NUMERIC(12,2)`: after rounding to cents the magnitude
/// must stay below 10^10
fn validate_price(price: &Decimal) -> Result<(), ValidationError> {
    let stored = price.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    if stored.abs() >= Decimal::new(10_000_000_000, 0) {
        let mut error = ValidationError::new("price_range");
        error.message = Some("Price must be below 10000000000".into());
        return Err(error);
    }
    Ok(())
}

impl From<Book> for BookDto {
    fn from(book: Book) -> Self {
        Self {
            id: book.id,
            name: book.name,
            description: book.description,
            date: book.date,
            price: book.price,
            img_url: book.img_url,
            categories: book.categories.into_iter().map(CategoryDto::from).collect(),
        }
    }
}
