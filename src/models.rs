//! Domain models that mirror the SQLite schema. Fields are private so every
//! mutation runs through a validating setter; rows coming back from the store
//! are trusted and hydrated through crate-private constructors.

use std::fmt;

use chrono::{Local, NaiveDate};

use crate::error::{LibraryError, Result};

/// The local calendar date used for borrow, return and join dates.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Trim a free-text field and reject it when nothing is left.
fn required_text(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(LibraryError::validation(format!("{field} is required.")));
    }
    Ok(trimmed.to_string())
}

fn validate_copies(total_copies: i64) -> Result<i64> {
    if total_copies < 1 {
        return Err(LibraryError::validation(
            "Total copies must be at least 1.",
        ));
    }
    Ok(total_copies)
}

/// Lower-case and trim an email, then check it has the `local@domain.tld`
/// shape: exactly one `@`, something on each side, and a dot inside the
/// domain with text on both sides of it.
pub(crate) fn normalize_email(value: &str) -> Result<String> {
    let email = value.trim().to_lowercase();
    let invalid = || LibraryError::validation(format!("\"{}\" is not a valid email.", value.trim()));

    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }
    let has_dotted_domain = domain
        .char_indices()
        .any(|(idx, ch)| ch == '.' && idx > 0 && idx + 1 < domain.len());
    if !has_dotted_domain {
        return Err(invalid());
    }
    Ok(email)
}

/// Strip spaces and hyphens and accept ISBN-10 (check digit may be `X`) or
/// ISBN-13.
pub(crate) fn normalize_isbn(value: &str) -> Result<String> {
    let isbn: String = value
        .chars()
        .filter(|ch| !ch.is_whitespace() && *ch != '-')
        .map(|ch| ch.to_ascii_uppercase())
        .collect();
    let chars: Vec<char> = isbn.chars().collect();
    let valid = match chars.as_slice() {
        [body @ .., check] if chars.len() == 10 => {
            body.iter().all(char::is_ascii_digit) && (check.is_ascii_digit() || *check == 'X')
        }
        digits if digits.len() == 13 => digits.iter().all(char::is_ascii_digit),
        _ => false,
    };
    if !valid {
        return Err(LibraryError::validation(format!(
            "\"{}\" is not a valid ISBN.",
            value.trim()
        )));
    }
    Ok(isbn)
}

fn optional_isbn(value: Option<&str>) -> Result<Option<String>> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => normalize_isbn(raw).map(Some),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Book {
    id: i64,
    title: String,
    author: String,
    total_copies: i64,
    isbn: Option<String>,
}

impl Book {
    pub(crate) fn from_row(
        id: i64,
        title: String,
        author: String,
        total_copies: i64,
        isbn: Option<String>,
    ) -> Self {
        Self {
            id,
            title,
            author,
            total_copies,
            isbn,
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn total_copies(&self) -> i64 {
        self.total_copies
    }

    pub fn isbn(&self) -> Option<&str> {
        self.isbn.as_deref()
    }

    pub fn set_title(&mut self, title: &str) -> Result<()> {
        self.title = required_text("Title", title)?;
        Ok(())
    }

    pub fn set_author(&mut self, author: &str) -> Result<()> {
        self.author = required_text("Author", author)?;
        Ok(())
    }

    /// Only the lower bound is checked here; keeping the count above the
    /// number of copies on loan is the lending workflow's job.
    pub fn set_total_copies(&mut self, total_copies: i64) -> Result<()> {
        self.total_copies = validate_copies(total_copies)?;
        Ok(())
    }

    /// Blank input clears the ISBN.
    pub fn set_isbn(&mut self, isbn: Option<&str>) -> Result<()> {
        self.isbn = optional_isbn(isbn)?;
        Ok(())
    }
}

impl fmt::Display for Book {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.title)
    }
}

/// Validated field set for a book that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBook {
    pub(crate) title: String,
    pub(crate) author: String,
    pub(crate) total_copies: i64,
    pub(crate) isbn: Option<String>,
}

impl NewBook {
    pub fn new(title: &str, author: &str, total_copies: i64) -> Result<Self> {
        Ok(Self {
            title: required_text("Title", title)?,
            author: required_text("Author", author)?,
            total_copies: validate_copies(total_copies)?,
            isbn: None,
        })
    }

    pub fn with_isbn(mut self, isbn: Option<&str>) -> Result<Self> {
        self.isbn = optional_isbn(isbn)?;
        Ok(self)
    }
}

/// A book together with its derived availability at the time of the read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookStock {
    pub book: Book,
    pub available_copies: i64,
}

impl BookStock {
    pub fn on_loan(&self) -> i64 {
        self.book.total_copies() - self.available_copies
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    id: i64,
    name: String,
    email: String,
    join_date: NaiveDate,
}

impl Member {
    pub(crate) fn from_row(id: i64, name: String, email: String, join_date: NaiveDate) -> Self {
        Self {
            id,
            name,
            email,
            join_date,
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    /// Fixed at creation; there is no setter.
    pub fn join_date(&self) -> NaiveDate {
        self.join_date
    }

    pub fn set_name(&mut self, name: &str) -> Result<()> {
        self.name = required_text("Name", name)?;
        Ok(())
    }

    pub fn set_email(&mut self, email: &str) -> Result<()> {
        self.email = normalize_email(email)?;
        Ok(())
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.name, self.email)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMember {
    pub(crate) name: String,
    pub(crate) email: String,
    pub(crate) join_date: NaiveDate,
}

impl NewMember {
    /// Joins today unless overridden with [`NewMember::joined_on`].
    pub fn new(name: &str, email: &str) -> Result<Self> {
        Ok(Self {
            name: required_text("Name", name)?,
            email: normalize_email(email)?,
            join_date: today(),
        })
    }

    pub fn joined_on(mut self, join_date: NaiveDate) -> Self {
        self.join_date = join_date;
        self
    }

    pub fn email(&self) -> &str {
        &self.email
    }
}

/// Lifecycle of a borrow record. Transitions only go forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoanStatus {
    Active,
    Returned,
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoanStatus::Active => f.write_str("Active"),
            LoanStatus::Returned => f.write_str("Returned"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BorrowRecord {
    id: i64,
    book_id: i64,
    member_id: i64,
    borrow_date: NaiveDate,
    return_date: Option<NaiveDate>,
}

impl BorrowRecord {
    pub(crate) fn from_row(
        id: i64,
        book_id: i64,
        member_id: i64,
        borrow_date: NaiveDate,
        return_date: Option<NaiveDate>,
    ) -> Self {
        Self {
            id,
            book_id,
            member_id,
            borrow_date,
            return_date,
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn book_id(&self) -> i64 {
        self.book_id
    }

    pub fn member_id(&self) -> i64 {
        self.member_id
    }

    pub fn borrow_date(&self) -> NaiveDate {
        self.borrow_date
    }

    pub fn return_date(&self) -> Option<NaiveDate> {
        self.return_date
    }

    pub fn is_returned(&self) -> bool {
        self.return_date.is_some()
    }

    pub fn status(&self) -> LoanStatus {
        if self.is_returned() {
            LoanStatus::Returned
        } else {
            LoanStatus::Active
        }
    }

    /// Whole days between borrowing and the return date, or `today` while the
    /// loan is still open.
    pub fn days_borrowed(&self, today: NaiveDate) -> i64 {
        let end = self.return_date.unwrap_or(today);
        (end - self.borrow_date).num_days()
    }

    /// Close the record. A record can be closed once, and never before it
    /// was opened.
    pub fn mark_returned(&mut self, on: NaiveDate) -> Result<()> {
        if self.is_returned() {
            return Err(LibraryError::AlreadyReturned(self.id));
        }
        if on < self.borrow_date {
            return Err(LibraryError::validation(format!(
                "Return date {on} is before borrow date {}.",
                self.borrow_date
            )));
        }
        self.return_date = Some(on);
        Ok(())
    }
}

/// A borrow record joined with the names the UI and CLI show next to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoanDetails {
    pub record: BorrowRecord,
    pub book_title: String,
    pub member_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn new_book_trims_and_rejects_blank_fields() {
        let book = NewBook::new("  1984 ", " Orwell", 2).unwrap();
        assert_eq!(book.title, "1984");
        assert_eq!(book.author, "Orwell");

        assert!(matches!(
            NewBook::new("   ", "Orwell", 1),
            Err(LibraryError::Validation(_))
        ));
        assert!(matches!(
            NewBook::new("1984", "", 1),
            Err(LibraryError::Validation(_))
        ));
        assert!(matches!(
            NewBook::new("1984", "Orwell", 0),
            Err(LibraryError::Validation(_))
        ));
    }

    #[test]
    fn book_setters_keep_old_value_on_error() {
        let mut book = Book::from_row(1, "Dune".into(), "Herbert".into(), 3, None);
        assert!(book.set_title(" ").is_err());
        assert!(book.set_total_copies(-1).is_err());
        assert_eq!(book.title(), "Dune");
        assert_eq!(book.total_copies(), 3);

        book.set_author("Frank Herbert").unwrap();
        assert_eq!(book.author(), "Frank Herbert");
    }

    #[test]
    fn email_is_normalized_and_checked() {
        assert_eq!(
            normalize_email("  Alice@Example.COM ").unwrap(),
            "alice@example.com"
        );
        for bad in ["BAD-EMAIL", "a@b", "@example.com", "a@@example.com", "a@example.", "a@.com"] {
            assert!(
                matches!(normalize_email(bad), Err(LibraryError::Validation(_))),
                "{bad} should be rejected"
            );
        }
        assert!(normalize_email("first.last@mail.example.org").is_ok());
    }

    #[test]
    fn isbn_accepts_both_lengths() {
        assert_eq!(normalize_isbn("978-0-451-52493-5").unwrap(), "9780451524935");
        assert_eq!(normalize_isbn("0-8044-2957-x").unwrap(), "080442957X");
        assert!(normalize_isbn("12345").is_err());
        assert!(normalize_isbn("97804515249X5").is_err());
        assert_eq!(optional_isbn(Some("  ")).unwrap(), None);
    }

    #[test]
    fn member_has_no_way_to_change_join_date() {
        let draft = NewMember::new("Alice", "alice@example.com")
            .unwrap()
            .joined_on(date(2024, 1, 2));
        assert_eq!(draft.join_date, date(2024, 1, 2));

        let mut member = Member::from_row(1, draft.name, draft.email, draft.join_date);
        member.set_email("ALICE@work.example").unwrap();
        assert_eq!(member.email(), "alice@work.example");
        assert_eq!(member.join_date(), date(2024, 1, 2));
    }

    #[test]
    fn record_closes_once_and_not_before_borrowing() {
        let mut record = BorrowRecord::from_row(5, 1, 1, date(2024, 3, 10), None);
        assert_eq!(record.status(), LoanStatus::Active);
        assert_eq!(record.days_borrowed(date(2024, 3, 15)), 5);

        assert!(matches!(
            record.mark_returned(date(2024, 3, 9)),
            Err(LibraryError::Validation(_))
        ));
        assert!(!record.is_returned());

        record.mark_returned(date(2024, 3, 12)).unwrap();
        assert_eq!(record.status(), LoanStatus::Returned);
        assert_eq!(record.days_borrowed(date(2030, 1, 1)), 2);

        assert!(matches!(
            record.mark_returned(date(2024, 3, 20)),
            Err(LibraryError::AlreadyReturned(5))
        ));
        assert_eq!(record.return_date(), Some(date(2024, 3, 12)));
    }
}
