//! Repository layer for database operations

pub mod books;
pub mod categories;

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Transaction};

use crate::{
    error::AppResult,
    models::{Book, Category, Pageable},
};

/// Data access for books and their category associations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BookRepository: Send + Sync {
    /// One page of books (with categories) and the total row count
    async fn find_all_paged(&self, pageable: &Pageable) -> AppResult<(Vec<Book>, i64)>;

    async fn find_by_id(&self, id: i64) -> AppResult<Option<Book>>;

    async fn exists_by_id(&self, id: i64) -> AppResult<bool>;

    /// Insert when `book.id` is `None`, otherwise replace the stored row and
    /// its whole category set. Runs in a single transaction.
    async fn save(&self, book: Book) -> AppResult<Book>;

    /// Number of book rows removed (0 or 1)
    async fn delete_by_id(&self, id: i64) -> AppResult<u64>;

    /// Round-trip to the store
    async fn ping(&self) -> AppResult<()>;
}

/// Read access to categories
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CategoryRepository: Send + Sync {
    /// Categories whose id is in `ids`; unknown ids are simply absent
    async fn find_all_by_ids(&self, ids: &[i64]) -> AppResult<Vec<Category>>;
}

/// Repositories shared by the services
#[derive(Clone)]
pub struct Repository {
    pub books: Arc<dyn BookRepository>,
    pub categories: Arc<dyn CategoryRepository>,
}

impl Repository {
    /// Create PostgreSQL-backed repositories on the given pool
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            books: Arc::new(books::PgBookRepository::new(pool.clone())),
            categories: Arc::new(categories::PgCategoryRepository::new(pool)),
        }
    }

    /// Assemble from arbitrary implementations
    pub fn from_parts(
        books: Arc<dyn BookRepository>,
        categories: Arc<dyn CategoryRepository>,
    ) -> Self {
        Self { books, categories }
    }
}

/// Open a transaction that rejects writes
pub(crate) async fn begin_read_only(
    pool: &Pool<Postgres>,
) -> Result<Transaction<'static, Postgres>, sqlx::Error> {
    let mut tx = pool.begin().await?;
    sqlx::query("SET TRANSACTION READ ONLY")
        .execute(&mut *tx)
        .await?;
    Ok(tx)
}
