use rusqlite::{params, params_from_iter, Connection, Error as SqlError, ErrorCode, OptionalExtension, Row};
use tracing::debug;

use crate::error::{EntityKind, LibraryError, Result, StorageContext};
use crate::models::{normalize_isbn, Book, BookStock, NewBook};

use super::criteria::Criteria;

const BOOK_COLUMNS: &str = "id, title, author, total_copies, isbn";

/// Equality filter for [`find_books`]. Unset fields match anything.
#[derive(Debug, Clone, Default)]
pub struct BookFilter {
    pub title: Option<String>,
    pub author: Option<String>,
    pub total_copies: Option<i64>,
    pub isbn: Option<String>,
}

fn book_from_row(row: &Row<'_>) -> rusqlite::Result<Book> {
    Ok(Book::from_row(
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
    ))
}

/// Every book in insertion order.
pub fn fetch_books(conn: &Connection) -> Result<Vec<Book>> {
    find_books(conn, &BookFilter::default())
}

pub fn find_book(conn: &Connection, id: i64) -> Result<Option<Book>> {
    conn.query_row(
        &format!("SELECT {BOOK_COLUMNS} FROM books WHERE id = ?1"),
        [id],
        book_from_row,
    )
    .optional()
    .storage("failed to load book")
}

/// Books whose fields equal every value set in `filter`. Text is compared
/// after the same trimming the setters apply, and ISBNs after normalization.
pub fn find_books(conn: &Connection, filter: &BookFilter) -> Result<Vec<Book>> {
    let mut criteria = Criteria::default();
    if let Some(title) = &filter.title {
        criteria.eq("title", title.trim().to_string());
    }
    if let Some(author) = &filter.author {
        criteria.eq("author", author.trim().to_string());
    }
    if let Some(total_copies) = filter.total_copies {
        criteria.eq("total_copies", total_copies);
    }
    if let Some(isbn) = &filter.isbn {
        // A malformed ISBN cannot be stored, so it matches nothing.
        match normalize_isbn(isbn) {
            Ok(isbn) => criteria.eq("isbn", isbn),
            Err(_) => return Ok(Vec::new()),
        };
    }

    let sql = format!(
        "SELECT {BOOK_COLUMNS} FROM books{} ORDER BY id",
        criteria.where_clause()
    );
    let mut stmt = conn.prepare(&sql).storage("failed to prepare book query")?;
    let books = stmt
        .query_map(params_from_iter(criteria.values()), book_from_row)
        .storage("failed to load books")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .storage("failed to collect books")?;

    Ok(books)
}

/// Insert a new book and return it with its assigned id.
pub fn create_book(conn: &Connection, book: &NewBook) -> Result<Book> {
    conn.execute(
        "INSERT INTO books (title, author, total_copies, isbn) VALUES (?1, ?2, ?3, ?4)",
        params![book.title, book.author, book.total_copies, book.isbn],
    )
    .map_err(|err| map_isbn_conflict(err, book.isbn.as_deref(), "failed to insert book"))?;

    let id = conn.last_insert_rowid();
    debug!(book_id = id, title = %book.title, "book created");
    Ok(Book::from_row(
        id,
        book.title.clone(),
        book.author.clone(),
        book.total_copies,
        book.isbn.clone(),
    ))
}

/// Persist the editable fields of `book`. Callers that lower
/// `total_copies` should go through `lending::revise_book`, which checks the
/// new count against the copies on loan.
pub fn update_book(conn: &Connection, book: &Book) -> Result<()> {
    let updated = conn
        .execute(
            "UPDATE books SET title = ?1, author = ?2, total_copies = ?3, isbn = ?4 WHERE id = ?5",
            params![
                book.title(),
                book.author(),
                book.total_copies(),
                book.isbn(),
                book.id()
            ],
        )
        .map_err(|err| map_isbn_conflict(err, book.isbn(), "failed to update book"))?;

    if updated == 0 {
        Err(LibraryError::not_found(EntityKind::Book, book.id()))
    } else {
        debug!(book_id = book.id(), "book updated");
        Ok(())
    }
}

/// Remove a book row. The schema cascades to `borrow_records`; the
/// active-loan guard lives in `lending::remove_book`.
pub fn delete_book(conn: &Connection, id: i64) -> Result<()> {
    let deleted = conn
        .execute("DELETE FROM books WHERE id = ?1", [id])
        .storage("failed to delete book")?;

    if deleted == 0 {
        Err(LibraryError::not_found(EntityKind::Book, id))
    } else {
        debug!(book_id = id, "book deleted");
        Ok(())
    }
}

/// Copies of `book_id` not currently on loan, derived from the open borrow
/// records. Run it inside the same transaction as any decision based on it.
pub fn available_copies(conn: &Connection, book_id: i64) -> Result<i64> {
    conn.query_row(
        "SELECT b.total_copies - (
             SELECT COUNT(*) FROM borrow_records r
             WHERE r.book_id = b.id AND r.return_date IS NULL
         )
         FROM books b WHERE b.id = ?1",
        [book_id],
        |row| row.get(0),
    )
    .optional()
    .storage("failed to count available copies")?
    .ok_or_else(|| LibraryError::not_found(EntityKind::Book, book_id))
}

/// Every book with its availability, for listings.
pub fn fetch_book_stock(conn: &Connection) -> Result<Vec<BookStock>> {
    let mut stmt = conn
        .prepare(
            "SELECT b.id, b.title, b.author, b.total_copies, b.isbn,
                    b.total_copies - COUNT(r.id)
             FROM books b
             LEFT JOIN borrow_records r ON r.book_id = b.id AND r.return_date IS NULL
             GROUP BY b.id
             ORDER BY b.title COLLATE NOCASE, b.author COLLATE NOCASE, b.id",
        )
        .storage("failed to prepare book stock query")?;

    let stock = stmt
        .query_map([], |row| {
            Ok(BookStock {
                book: book_from_row(row)?,
                available_copies: row.get(5)?,
            })
        })
        .storage("failed to load book stock")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .storage("failed to collect book stock")?;

    Ok(stock)
}

/// Turn a UNIQUE violation on `isbn` into a conflict the user can act on.
fn map_isbn_conflict(err: SqlError, isbn: Option<&str>, context: &'static str) -> LibraryError {
    match (err.sqlite_error_code(), isbn) {
        (Some(ErrorCode::ConstraintViolation), Some(isbn)) => {
            LibraryError::conflict(format!("A book with ISBN {isbn} already exists."))
        }
        _ => LibraryError::Storage {
            context,
            source: err,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{memory_db, seed_book, seed_member};
    use crate::lending::borrow_book;

    #[test]
    fn create_and_find_round_trip() {
        let conn = memory_db();
        let draft = NewBook::new("1984", "George Orwell", 2)
            .unwrap()
            .with_isbn(Some("978-0451524935"))
            .unwrap();
        let book = create_book(&conn, &draft).unwrap();

        let found = find_book(&conn, book.id()).unwrap().unwrap();
        assert_eq!(found, book);
        assert_eq!(found.isbn(), Some("9780451524935"));
        assert!(find_book(&conn, book.id() + 1).unwrap().is_none());
    }

    #[test]
    fn duplicate_titles_are_allowed_but_isbns_are_not() {
        let conn = memory_db();
        seed_book(&conn, "Dune", 1);
        seed_book(&conn, "Dune", 1);
        assert_eq!(fetch_books(&conn).unwrap().len(), 2);

        let with_isbn = NewBook::new("Emma", "Austen", 1)
            .unwrap()
            .with_isbn(Some("0141439580"))
            .unwrap();
        create_book(&conn, &with_isbn).unwrap();
        let err = create_book(&conn, &with_isbn).unwrap_err();
        assert!(matches!(err, LibraryError::Conflict(_)));
        assert_eq!(fetch_books(&conn).unwrap().len(), 3);
    }

    #[test]
    fn find_books_matches_every_given_field() {
        let conn = memory_db();
        seed_book(&conn, "Dune", 1);
        seed_book(&conn, "Dune", 3);
        seed_book(&conn, "Emma", 3);

        let filter = BookFilter {
            title: Some(" Dune ".into()),
            total_copies: Some(3),
            ..BookFilter::default()
        };
        let found = find_books(&conn, &filter).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].total_copies(), 3);

        let partial = BookFilter {
            title: Some("Dun".into()),
            ..BookFilter::default()
        };
        assert!(find_books(&conn, &partial).unwrap().is_empty());
    }

    #[test]
    fn update_and_delete_report_missing_rows() {
        let conn = memory_db();
        let mut book = seed_book(&conn, "Dune", 1);
        book.set_title("Dune Messiah").unwrap();
        update_book(&conn, &book).unwrap();
        assert_eq!(find_book(&conn, book.id()).unwrap().unwrap().title(), "Dune Messiah");

        delete_book(&conn, book.id()).unwrap();
        assert!(matches!(
            update_book(&conn, &book),
            Err(LibraryError::NotFound { entity: EntityKind::Book, .. })
        ));
        assert!(matches!(
            delete_book(&conn, book.id()),
            Err(LibraryError::NotFound { entity: EntityKind::Book, .. })
        ));
    }

    #[test]
    fn stock_reflects_open_loans() {
        let mut conn = memory_db();
        let book = seed_book(&conn, "Dune", 2);
        let member = seed_member(&conn, "alice@example.com");
        assert_eq!(available_copies(&conn, book.id()).unwrap(), 2);

        borrow_book(&mut conn, book.id(), member.id()).unwrap();
        assert_eq!(available_copies(&conn, book.id()).unwrap(), 1);

        let stock = fetch_book_stock(&conn).unwrap();
        assert_eq!(stock.len(), 1);
        assert_eq!(stock[0].available_copies, 1);
        assert_eq!(stock[0].on_loan(), 1);

        assert!(matches!(
            available_copies(&conn, 99),
            Err(LibraryError::NotFound { entity: EntityKind::Book, id: 99 })
        ));
    }
}
