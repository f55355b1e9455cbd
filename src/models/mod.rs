//! Data models for the book catalog

pub mod book;
pub mod category;
pub mod page;

// Re-export commonly used types
pub use book::{Book, BookDto};
pub use category::{Category, CategoryDto};
pub use page::{Direction, Page, PageParams, Pageable, SortOrder};
