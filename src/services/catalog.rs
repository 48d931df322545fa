//! Catalog management service: books and favorites

use crate::{
    error::{AppError, AppResult},
    models::book::{normalize_isbn, Book, BookDetails, BookQuery, CreateBook, FavoriteStatus, UpdateBook},
    repository::Repository,
};

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
}

/// Normalize an optional ISBN; blank values count as absent
fn clean_isbn(raw: Option<&str>) -> AppResult<Option<String>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(isbn) => normalize_isbn(isbn).map(Some).map_err(AppError::Validation),
        None => Ok(None),
    }
}

impl CatalogService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Search books with filters
    pub async fn search_books(&self, query: &BookQuery) -> AppResult<(Vec<BookDetails>, i64)> {
        self.repository.books.search(query).await
    }

    /// Get a book with availability and rating
    pub async fn get_book(&self, id: i32) -> AppResult<BookDetails> {
        self.repository.books.get_details(id).await
    }

    pub async fn categories(&self) -> AppResult<Vec<String>> {
        self.repository.books.categories().await
    }

    pub async fn create_book(&self, book: CreateBook) -> AppResult<Book> {
        let isbn = clean_isbn(book.isbn.as_deref())?;
        let created = self.repository.books.create(&book, isbn).await?;
        tracing::info!(book_id = created.id, stock = created.stock, "book created");
        Ok(created)
    }

    pub async fn update_book(&self, id: i32, book: UpdateBook) -> AppResult<Book> {
        let isbn = clean_isbn(book.isbn.as_deref())?;
        let updated = self.repository.books.update(id, &book, isbn).await?;
        tracing::info!(book_id = id, stock = updated.stock, "book updated");
        Ok(updated)
    }

    pub async fn delete_book(&self, id: i32) -> AppResult<()> {
        self.repository.books.delete(id).await?;
        tracing::info!(book_id = id, "book deleted");
        Ok(())
    }

    /// Add or remove a book from the user's favorites
    pub async fn toggle_favorite(&self, user_id: i32, book_id: i32) -> AppResult<FavoriteStatus> {
        self.repository.books.get_by_id(book_id).await?;
        let favorited = self.repository.favorites.toggle(user_id, book_id).await?;
        Ok(FavoriteStatus { book_id, favorited })
    }

    pub async fn favorites(&self, user_id: i32) -> AppResult<Vec<BookDetails>> {
        self.repository.favorites.list(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_isbn_is_treated_as_missing() {
        assert_eq!(clean_isbn(None).unwrap(), None);
        assert_eq!(clean_isbn(Some("   ")).unwrap(), None);
    }

    #[test]
    fn isbn_is_normalized_before_storage() {
        assert_eq!(
            clean_isbn(Some("978-0-306-40615-7")).unwrap().as_deref(),
            Some("9780306406157")
        );
        assert!(matches!(clean_isbn(Some("978-0-306-40615-8")), Err(AppError::Validation(_))));
    }
}
