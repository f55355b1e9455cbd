//! Books repository for database operations.
//!
//! A book row lives in `book`; its categories are the `book_category` rows
//! pointing at it. Every write touches both tables inside one transaction so
//! that scalar fields and associations commit or roll back together.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{PgConnection, Pool, Postgres, Row};

use super::{begin_read_only, BookRepository};
use crate::{
    error::{AppError, AppResult},
    models::{Book, Category, Pageable, SortOrder},
};

const BOOK_COLUMNS: &str = "id, name, description, price, img_url, date";

/// Column backing a sortable API property
fn sort_column(property: &str) -> Option<&'static str> {
    match property {
        "id" => Some("id"),
        "name" => Some("name"),
        "description" => Some("description"),
        "price" => Some("price"),
        "imgUrl" => Some("img_url"),
        "date" => Some("date"),
        _ => None,
    }
}

/// Build the `ORDER BY` list. `id` is appended as a tiebreaker so that
/// consecutive pages never overlap.
fn order_by_clause(sort: &[SortOrder]) -> AppResult<String> {
    let mut terms = Vec::with_capacity(sort.len() + 1);
    let mut has_id = false;

    for order in sort {
        let column = sort_column(&order.property).ok_or_else(|| {
            AppError::BadRequest(format!("Cannot sort by unknown property '{}'", order.property))
        })?;
        has_id |= column == "id";
        terms.push(format!("{} {}", column, order.direction.as_sql()));
    }

    if !has_id {
        terms.push("id ASC".to_string());
    }
    Ok(terms.join(", "))
}

#[derive(Clone)]
pub struct PgBookRepository {
    pool: Pool<Postgres>,
}

impl PgBookRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

/// Load the categories of every book in `books` with a single query
async fn attach_categories(conn: &mut PgConnection, books: &mut [Book]) -> AppResult<()> {
    let ids: Vec<i64> = books.iter().filter_map(|b| b.id).collect();
    if ids.is_empty() {
        return Ok(());
    }

    let rows = sqlx::query(
        r#"
        SELECT bc.book_id, c.id, c.name
        FROM book_category bc
        JOIN category c ON c.id = bc.category_id
        WHERE bc.book_id = ANY($1)
        ORDER BY c.id
        "#,
    )
    .bind(ids)
    .fetch_all(&mut *conn)
    .await?;

    let mut by_book: HashMap<i64, Vec<Category>> = HashMap::new();
    for row in rows {
        by_book
            .entry(row.get("book_id"))
            .or_default()
            .push(Category {
                id: row.get("id"),
                name: row.get("name"),
            });
    }

    for book in books.iter_mut() {
        if let Some(id) = book.id {
            book.categories = by_book.remove(&id).unwrap_or_default();
        }
    }
    Ok(())
}

#[async_trait]
impl BookRepository for PgBookRepository {
    async fn find_all_paged(&self, pageable: &Pageable) -> AppResult<(Vec<Book>, i64)> {
        let order_by = order_by_clause(&pageable.sort)?;

        let mut tx = begin_read_only(&self.pool).await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM book")
            .fetch_one(&mut *tx)
            .await?;

        let query = format!(
            "SELECT {} FROM book ORDER BY {} LIMIT $1 OFFSET $2",
            BOOK_COLUMNS, order_by
        );
        let mut books = sqlx::query_as::<_, Book>(&query)
            .bind(i64::from(pageable.size))
            .bind(pageable.offset())
            .fetch_all(&mut *tx)
            .await?;

        attach_categories(&mut *tx, &mut books).await?;
        tx.commit().await?;

        Ok((books, total))
    }

    async fn find_by_id(&self, id: i64) -> AppResult<Option<Book>> {
        let mut tx = begin_read_only(&self.pool).await?;

        let query = format!("SELECT {} FROM book WHERE id = $1", BOOK_COLUMNS);
        let book = sqlx::query_as::<_, Book>(&query)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

        let book = match book {
            Some(mut book) => {
                attach_categories(&mut *tx, std::slice::from_mut(&mut book)).await?;
                Some(book)
            }
            None => None,
        };
        tx.commit().await?;

        Ok(book)
    }

    async fn exists_by_id(&self, id: i64) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM book WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn save(&self, book: Book) -> AppResult<Book> {
        let mut tx = self.pool.begin().await?;

        // Read back what the column types actually kept (price scale, date precision)
        let mut stored: Book = match book.id {
            None => {
                sqlx::query_as(
                    r#"
                    INSERT INTO book (name, description, price, img_url, date)
                    VALUES ($1, $2, $3, $4, $5)
                    RETURNING id, name, description, price, img_url, date
                    "#,
                )
                .bind(&book.name)
                .bind(&book.description)
                .bind(book.price)
                .bind(&book.img_url)
                .bind(book.date)
                .fetch_one(&mut *tx)
                .await?
            }
            Some(id) => sqlx::query_as(
                r#"
                UPDATE book
                SET name = $1, description = $2, price = $3, img_url = $4, date = $5
                WHERE id = $6
                RETURNING id, name, description, price, img_url, date
                "#,
            )
            .bind(&book.name)
            .bind(&book.description)
            .bind(book.price)
            .bind(&book.img_url)
            .bind(book.date)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Id not found {}", id)))?,
        };

        let id = stored
            .id
            .ok_or_else(|| AppError::Internal("Stored book has no id".to_string()))?;

        // Associations are replaced wholesale, never merged
        sqlx::query("DELETE FROM book_category WHERE book_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let category_ids = book.category_ids();
        if !category_ids.is_empty() {
            sqlx::query(
                r#"
                INSERT INTO book_category (book_id, category_id)
                SELECT $1, UNNEST($2::bigint[])
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(id)
            .bind(category_ids)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        stored.categories = book.categories;
        Ok(stored)
    }

    async fn delete_by_id(&self, id: i64) -> AppResult<u64> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM book_category WHERE book_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM book WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected())
    }

    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
