//! Book catalog service

use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    models::{Book, BookDto, Page, Pageable},
    repository::{BookRepository, CategoryRepository, Repository},
};

#[derive(Clone)]
pub struct BookService {
    books: Arc<dyn BookRepository>,
    categories: Arc<dyn CategoryRepository>,
}

impl BookService {
    pub fn new(repository: Repository) -> Self {
        Self {
            books: repository.books,
            categories: repository.categories,
        }
    }

    /// List one page of books
    pub async fn find_all_paged(&self, pageable: &Pageable) -> AppResult<Page<BookDto>> {
        let (books, total) = self.books.find_all_paged(pageable).await?;
        let content = books.into_iter().map(BookDto::from).collect();
        Ok(Page::new(content, pageable, total))
    }

    /// Get a book with its categories
    pub async fn find_by_id(&self, id: i64) -> AppResult<BookDto> {
        let book = self
            .books
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Entity not found".to_string()))?;
        Ok(BookDto::from(book))
    }

    /// Create a book; any id in `dto` is ignored
    pub async fn insert(&self, dto: BookDto) -> AppResult<BookDto> {
        let mut entity = Book::default();
        self.copy_dto_to_entity(dto, &mut entity).await?;

        let saved = self
            .books
            .save(entity)
            .await
            .map_err(|e| e.into_integrity("Integrity violation"))?;

        tracing::info!("Book created: id={:?}", saved.id);
        Ok(BookDto::from(saved))
    }

    /// Replace every field and the whole category set of an existing book
    pub async fn update(&self, id: i64, dto: BookDto) -> AppResult<BookDto> {
        if !self.books.exists_by_id(id).await? {
            return Err(AppError::NotFound(format!("Id not found {}", id)));
        }

        let mut entity = Book {
            id: Some(id),
            ..Book::default()
        };
        self.copy_dto_to_entity(dto, &mut entity).await?;

        let saved = self
            .books
            .save(entity)
            .await
            .map_err(|e| e.into_integrity("Integrity violation"))?;

        tracing::info!("Book updated: id={}", id);
        Ok(BookDto::from(saved))
    }

    /// Delete a book
    pub async fn delete(&self, id: i64) -> AppResult<()> {
        let deleted = self
            .books
            .delete_by_id(id)
            .await
            .map_err(|e| e.into_integrity("Integrity violation"))?;

        if deleted == 0 {
            return Err(AppError::NotFound(format!("Id not found {}", id)));
        }

        tracing::info!("Book deleted: id={}", id);
        Ok(())
    }

    /// Overwrite scalars and rebuild the category set from `dto`.
    /// Every referenced category must exist.
    async fn copy_dto_to_entity(&self, dto: BookDto, entity: &mut Book) -> AppResult<()> {
        entity.name = dto.name;
        entity.description = dto.description;
        entity.date = dto.date;
        entity.img_url = dto.img_url;
        entity.price = dto.price;

        let mut ids: Vec<i64> = Vec::with_capacity(dto.categories.len());
        for category in &dto.categories {
            if !ids.contains(&category.id) {
                ids.push(category.id);
            }
        }

        let found = if ids.is_empty() {
            Vec::new()
        } else {
            self.categories.find_all_by_ids(&ids).await?
        };

        entity.categories.clear();
        for id in ids {
            let category = found
                .iter()
                .find(|c| c.id == id)
                .cloned()
                .ok_or_else(|| AppError::NotFound(format!("Category {} not found", id)))?;
            entity.categories.push(category);
        }
        Ok(())
    }
}
