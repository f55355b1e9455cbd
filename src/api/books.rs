//! Book endpoints

use axum::{
    extract::{OriginalUri, Path, State},
    http::{header, HeaderMap, HeaderName, StatusCode},
    Json,
};
use axum_extra::extract::{Query, WithRejection};
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{BookDto, Page, PageParams, Pageable},
    AppState,
};

/// List books with pagination and sorting
#[utoipa::path(
    get,
    path = "/books",
    tag = "books",
    params(PageParams),
    responses(
        (status = 200, description = "One page of books", body = Page<BookDto>),
        (status = 400, description = "Unknown sort property", body = crate::error::ErrorResponse)
    )
)]
pub async fn find_all(
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> AppResult<Json<Page<BookDto>>> {
    let pageable = Pageable::from_params(&params, &state.config.pagination);
    let page = state.services.books.find_all_paged(&pageable).await?;
    Ok(Json(page))
}

/// Get book details by ID
#[utoipa::path(
    get,
    path = "/books/{id}",
    tag = "books",
    params(
        ("id" = i64, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Book details", body = BookDto),
        (status = 404, description = "Book not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn find_by_id(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<BookDto>> {
    let book = state.services.books.find_by_id(id).await?;
    Ok(Json(book))
}

/// Create a new book
#[utoipa::path(
    post,
    path = "/books",
    tag = "books",
    request_body = BookDto,
    responses(
        (status = 201, description = "Book created", body = BookDto,
            headers(("Location" = String, description = "URI of the new book"))),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 404, description = "Unknown category", body = crate::error::ErrorResponse)
    )
)]
pub async fn insert(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    WithRejection(Json(dto), _): WithRejection<Json<BookDto>, AppError>,
) -> AppResult<(StatusCode, [(HeaderName, String); 1], Json<BookDto>)> {
    dto.validate()?;

    let created = state.services.books.insert(dto).await?;
    let id = created
        .id
        .ok_or_else(|| AppError::Internal("Book id is null".to_string()))?;
    let path = format!("{}/{}", uri.path().trim_end_matches('/'), id);
    let location = absolute_uri(&headers, &path);

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(created),
    ))
}

/// Prefix `path` with the scheme and authority the client used, falling back
/// to the bare path when the request carries no `Host`.
fn absolute_uri(headers: &HeaderMap, path: &str) -> String {
    let Some(host) = headers.get(header::HOST).and_then(|h| h.to_str().ok()) else {
        return path.to_string();
    };
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|h| h.to_str().ok())
        .unwrap_or("http");
    format!("{}://{}{}", scheme, host, path)
}

/// Replace an existing book
#[utoipa::path(
    put,
    path = "/books/{id}",
    tag = "books",
    params(
        ("id" = i64, Path, description = "Book ID")
    ),
    request_body = BookDto,
    responses(
        (status = 200, description = "Book updated", body = BookDto),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 404, description = "Book or category not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    WithRejection(Json(dto), _): WithRejection<Json<BookDto>, AppError>,
) -> AppResult<Json<BookDto>> {
    dto.validate()?;

    let updated = state.services.books.update(id, dto).await?;
    Ok(Json(updated))
}

/// Delete a book
#[utoipa::path(
    delete,
    path = "/books/{id}",
    tag = "books",
    params(
        ("id" = i64, Path, description = "Book ID")
    ),
    responses(
        (status = 204, description = "Book deleted"),
        (status = 400, description = "Book is still referenced", body = crate::error::ErrorResponse),
        (status = 404, description = "Book not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    state.services.books.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
        Router,
    };
    use mockall::predicate::eq;
    use serde_json::{json, Value};
    use sqlx::error::ErrorKind;
    use tower::ServiceExt;

    use crate::{
        api::create_router,
        config::AppConfig,
        error::tests::db_error,
        models::{Book, Category, Pageable, SortOrder},
        repository::{MockBookRepository, MockCategoryRepository, Repository},
        services::Services,
        AppState,
    };

    fn router(books: MockBookRepository, categories: MockCategoryRepository) -> Router {
        let repository = Repository::from_parts(Arc::new(books), Arc::new(categories));
        create_router(AppState {
            config: Arc::new(AppConfig::default()),
            services: Arc::new(Services::new(repository)),
        })
    }

    fn book(id: i64, name: &str) -> Book {
        Book {
            id: Some(id),
            name: name.to_string(),
            categories: vec![Category {
                id: 1,
                name: "Electronics".to_string(),
            }],
            ..Book::default()
        }
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn empty_request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_find_all_passes_page_request() {
        let mut books = MockBookRepository::new();
        books
            .expect_find_all_paged()
            .withf(|p: &Pageable| p.page == 0 && p.size == 12 && p.sort == vec![SortOrder::asc("name")])
            .returning(|_| {
                Ok((
                    vec![book(3, "Macbook Pro"), book(4, "PC Gamer"), book(8, "PC Gamer Alfa")],
                    25,
                ))
            });

        let response = router(books, MockCategoryRepository::new())
            .oneshot(empty_request("GET", "/books?page=0&size=12&sort=name,asc"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["totalElements"], 25);
        assert_eq!(body["content"][0]["name"], "Macbook Pro");
        assert_eq!(body["content"][1]["name"], "PC Gamer");
        assert_eq!(body["content"][2]["name"], "PC Gamer Alfa");
    }

    #[tokio::test]
    async fn test_find_all_accepts_repeated_sort() {
        let mut books = MockBookRepository::new();
        books
            .expect_find_all_paged()
            .withf(|p: &Pageable| p.sort == vec![SortOrder::desc("price"), SortOrder::asc("name")])
            .returning(|_| Ok((Vec::new(), 0)));

        let response = router(books, MockCategoryRepository::new())
            .oneshot(empty_request("GET", "/books?sort=price,desc&sort=name"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["empty"], true);
        assert_eq!(body["size"], 20);
    }

    #[tokio::test]
    async fn test_find_by_id() {
        let mut books = MockBookRepository::new();
        books
            .expect_find_by_id()
            .with(eq(1))
            .returning(|id| Ok(Some(book(id, "Phone"))));

        let response = router(books, MockCategoryRepository::new())
            .oneshot(empty_request("GET", "/books/1"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["id"], 1);
        assert_eq!(body["categories"][0]["name"], "Electronics");
    }

    #[tokio::test]
    async fn test_find_by_id_not_found() {
        let mut books = MockBookRepository::new();
        books.expect_find_by_id().returning(|_| Ok(None));

        let response = router(books, MockCategoryRepository::new())
            .oneshot(empty_request("GET", "/books/1000"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["status"], 404);
        assert_eq!(body["message"], "Entity not found");
    }

    #[tokio::test]
    async fn test_insert_sets_location() {
        let mut books = MockBookRepository::new();
        books.expect_save().returning(|mut b| {
            b.id = Some(26);
            Ok(b)
        });
        let mut categories = MockCategoryRepository::new();
        categories.expect_find_all_by_ids().returning(|_| {
            Ok(vec![Category {
                id: 1,
                name: "Electronics".to_string(),
            }])
        });

        let response = router(books, categories)
            .oneshot(json_request(
                "POST",
                "/books",
                json!({
                    "id": 5,
                    "name": "Phone",
                    "price": 800.0,
                    "imgUrl": "https://img.com/img.png",
                    "date": "2020-10-20T03:00:00Z",
                    "categories": [{ "id": 1 }]
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()[header::LOCATION], "/books/26");
        let body = body_json(response).await;
        assert_eq!(body["id"], 26);
        assert_eq!(body["categories"][0]["name"], "Electronics");
    }

    #[tokio::test]
    async fn test_insert_location_uses_host() {
        let mut books = MockBookRepository::new();
        books.expect_save().returning(|mut b| {
            b.id = Some(26);
            Ok(b)
        });

        let request = Request::builder()
            .method("POST")
            .uri("/books")
            .header(header::HOST, "catalog.example.com:8080")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({ "name": "Phone" }).to_string()))
            .unwrap();

        let response = router(books, MockCategoryRepository::new())
            .oneshot(request)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            response.headers()[header::LOCATION],
            "http://catalog.example.com:8080/books/26"
        );
    }

    #[tokio::test]
    async fn test_malformed_body_is_json_bad_request() {
        for body in [json!({ "description": "x" }), json!({ "name": "Dune", "price": "abc" })] {
            let mut books = MockBookRepository::new();
            books.expect_save().never();

            let response = router(books, MockCategoryRepository::new())
                .oneshot(json_request("POST", "/books", body))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            let body = body_json(response).await;
            assert_eq!(body["status"], 400);
            assert_eq!(body["error"], "Bad request");
        }
    }

    #[tokio::test]
    async fn test_update_malformed_body_is_json_bad_request() {
        let mut books = MockBookRepository::new();
        books.expect_exists_by_id().never();

        let response = router(books, MockCategoryRepository::new())
            .oneshot(json_request("PUT", "/books/1", json!({ "description": "x" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Bad request");
    }

    #[tokio::test]
    async fn test_insert_rejects_invalid_body() {
        let mut books = MockBookRepository::new();
        books.expect_save().never();

        let response = router(books, MockCategoryRepository::new())
            .oneshot(json_request("POST", "/books", json!({ "name": "" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_insert_rejects_price_beyond_column() {
        let mut books = MockBookRepository::new();
        books.expect_save().never();

        let response = router(books, MockCategoryRepository::new())
            .oneshot(json_request(
                "POST",
                "/books",
                json!({ "name": "Dune", "price": 12345678901234.5 }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Validation exception");
    }

    #[tokio::test]
    async fn test_update_not_found() {
        let mut books = MockBookRepository::new();
        books.expect_exists_by_id().returning(|_| Ok(false));

        let response = router(books, MockCategoryRepository::new())
            .oneshot(json_request(
                "PUT",
                "/books/1000",
                json!({ "name": "Phone", "categories": [] }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_update_returns_body() {
        let mut books = MockBookRepository::new();
        books.expect_exists_by_id().returning(|_| Ok(true));
        books.expect_save().returning(|b| Ok(b));

        let response = router(books, MockCategoryRepository::new())
            .oneshot(json_request(
                "PUT",
                "/books/1",
                json!({ "name": "Phone", "description": "Good Phone" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["id"], 1);
        assert_eq!(body["name"], "Phone");
        assert_eq!(body["description"], "Good Phone");
    }

    #[tokio::test]
    async fn test_delete() {
        let mut books = MockBookRepository::new();
        books.expect_delete_by_id().returning(|_| Ok(1));

        let response = router(books, MockCategoryRepository::new())
            .oneshot(empty_request("DELETE", "/books/1"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_delete_referenced_book() {
        let mut books = MockBookRepository::new();
        books
            .expect_delete_by_id()
            .returning(|_| Err(db_error(ErrorKind::ForeignKeyViolation).into()));

        let response = router(books, MockCategoryRepository::new())
            .oneshot(empty_request("DELETE", "/books/1"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Database exception");
    }
}
