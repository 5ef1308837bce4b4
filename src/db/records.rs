use chrono::NaiveDate;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use tracing::debug;

use crate::error::{EntityKind, LibraryError, Result, StorageContext};
use crate::models::{BorrowRecord, LoanDetails, LoanStatus};

use super::criteria::Criteria;

const RECORD_COLUMNS: &str = "r.id, r.book_id, r.member_id, r.borrow_date, r.return_date";

/// Equality filter over borrow records. `status` selects open or closed
/// loans without having to match a concrete return date.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub book_id: Option<i64>,
    pub member_id: Option<i64>,
    pub borrow_date: Option<NaiveDate>,
    pub status: Option<LoanStatus>,
}

impl RecordFilter {
    fn criteria(&self) -> Criteria {
        let mut criteria = Criteria::default();
        if let Some(book_id) = self.book_id {
            criteria.eq("r.book_id", book_id);
        }
        if let Some(member_id) = self.member_id {
            criteria.eq("r.member_id", member_id);
        }
        if let Some(borrow_date) = self.borrow_date {
            criteria.eq("r.borrow_date", borrow_date.to_string());
        }
        match self.status {
            Some(LoanStatus::Active) => {
                criteria.raw("r.return_date IS NULL");
            }
            Some(LoanStatus::Returned) => {
                criteria.raw("r.return_date IS NOT NULL");
            }
            None => {}
        }
        criteria
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<BorrowRecord> {
    Ok(BorrowRecord::from_row(
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
    ))
}

pub fn fetch_records(conn: &Connection) -> Result<Vec<BorrowRecord>> {
    find_records(conn, &RecordFilter::default())
}

pub fn find_record(conn: &Connection, id: i64) -> Result<Option<BorrowRecord>> {
    conn.query_row(
        &format!("SELECT {RECORD_COLUMNS} FROM borrow_records r WHERE r.id = ?1"),
        [id],
        record_from_row,
    )
    .optional()
    .storage("failed to load borrow record")
}

pub fn find_records(conn: &Connection, filter: &RecordFilter) -> Result<Vec<BorrowRecord>> {
    let criteria = filter.criteria();
    let sql = format!(
        "SELECT {RECORD_COLUMNS} FROM borrow_records r{} ORDER BY r.id",
        criteria.where_clause()
    );
    let mut stmt = conn
        .prepare(&sql)
        .storage("failed to prepare borrow record query")?;
    let records = stmt
        .query_map(params_from_iter(criteria.values()), record_from_row)
        .storage("failed to load borrow records")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .storage("failed to collect borrow records")?;

    Ok(records)
}

/// The member's open loans.
pub fn active_borrows(conn: &Connection, member_id: i64) -> Result<Vec<BorrowRecord>> {
    find_records(
        conn,
        &RecordFilter {
            member_id: Some(member_id),
            status: Some(LoanStatus::Active),
            ..RecordFilter::default()
        },
    )
}

/// Number of copies of `book_id` currently out.
pub fn count_active_loans(conn: &Connection, book_id: i64) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM borrow_records WHERE book_id = ?1 AND return_date IS NULL",
        [book_id],
        |row| row.get(0),
    )
    .storage("failed to count active loans")
}

/// Records joined with book title and member name, newest first, for the
/// loan listings.
pub fn fetch_loan_details(conn: &Connection, filter: &RecordFilter) -> Result<Vec<LoanDetails>> {
    let criteria = filter.criteria();
    let sql = format!(
        "SELECT {RECORD_COLUMNS}, b.title, m.name
         FROM borrow_records r
         INNER JOIN books b ON b.id = r.book_id
         INNER JOIN members m ON m.id = r.member_id{}
         ORDER BY r.return_date IS NOT NULL, r.borrow_date DESC, r.id DESC",
        criteria.where_clause()
    );
    let mut stmt = conn
        .prepare(&sql)
        .storage("failed to prepare loan details query")?;
    let loans = stmt
        .query_map(params_from_iter(criteria.values()), |row| {
            Ok(LoanDetails {
                record: record_from_row(row)?,
                book_title: row.get(5)?,
                member_name: row.get(6)?,
            })
        })
        .storage("failed to load loan details")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .storage("failed to collect loan details")?;

    Ok(loans)
}

/// Open a new loan. Only the borrow workflow calls this, after it has checked
/// availability in the same transaction.
pub(crate) fn insert_record(
    conn: &Connection,
    book_id: i64,
    member_id: i64,
    borrow_date: NaiveDate,
) -> Result<BorrowRecord> {
    conn.execute(
        "INSERT INTO borrow_records (book_id, member_id, borrow_date) VALUES (?1, ?2, ?3)",
        params![book_id, member_id, borrow_date],
    )
    .storage("failed to insert borrow record")?;

    let id = conn.last_insert_rowid();
    Ok(BorrowRecord::from_row(id, book_id, member_id, borrow_date, None))
}

/// Write the return date of a record closed in memory. The `IS NULL` guard
/// keeps a stored return date from ever being overwritten.
pub(crate) fn save_return(conn: &Connection, record: &BorrowRecord) -> Result<()> {
    let updated = conn
        .execute(
            "UPDATE borrow_records SET return_date = ?1 WHERE id = ?2 AND return_date IS NULL",
            params![record.return_date(), record.id()],
        )
        .storage("failed to record return")?;

    if updated == 0 {
        Err(LibraryError::AlreadyReturned(record.id()))
    } else {
        Ok(())
    }
}

/// Administrative cleanup: removes a record whatever its state.
pub fn delete_record(conn: &Connection, id: i64) -> Result<()> {
    let deleted = conn
        .execute("DELETE FROM borrow_records WHERE id = ?1", [id])
        .storage("failed to delete borrow record")?;

    if deleted == 0 {
        Err(LibraryError::not_found(EntityKind::Record, id))
    } else {
        debug!(record_id = id, "borrow record deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{memory_db, seed_book, seed_member};
    use crate::lending::{borrow_book_on, return_book_on};

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    #[test]
    fn filters_by_status_and_owner() {
        let mut conn = memory_db();
        let book = seed_book(&conn, "Dune", 3);
        let alice = seed_member(&conn, "alice@example.com");
        let bob = seed_member(&conn, "bob@example.com");

        let first = borrow_book_on(&mut conn, book.id(), alice.id(), date(1)).unwrap();
        borrow_book_on(&mut conn, book.id(), alice.id(), date(2)).unwrap();
        borrow_book_on(&mut conn, book.id(), bob.id(), date(2)).unwrap();
        return_book_on(&mut conn, first.id(), date(5)).unwrap();

        assert_eq!(fetch_records(&conn).unwrap().len(), 3);
        assert_eq!(active_borrows(&conn, alice.id()).unwrap().len(), 1);
        assert_eq!(count_active_loans(&conn, book.id()).unwrap(), 2);

        let returned = find_records(
            &conn,
            &RecordFilter {
                status: Some(LoanStatus::Returned),
                ..RecordFilter::default()
            },
        )
        .unwrap();
        assert_eq!(returned.len(), 1);
        assert_eq!(returned[0].return_date(), Some(date(5)));

        let on_day_two = find_records(
            &conn,
            &RecordFilter {
                borrow_date: Some(date(2)),
                member_id: Some(bob.id()),
                ..RecordFilter::default()
            },
        )
        .unwrap();
        assert_eq!(on_day_two.len(), 1);
    }

    #[test]
    fn loan_details_list_open_loans_first() {
        let mut conn = memory_db();
        let book = seed_book(&conn, "Dune", 2);
        let alice = seed_member(&conn, "alice@example.com");

        let old = borrow_book_on(&mut conn, book.id(), alice.id(), date(1)).unwrap();
        return_book_on(&mut conn, old.id(), date(3)).unwrap();
        let open = borrow_book_on(&mut conn, book.id(), alice.id(), date(4)).unwrap();

        let loans = fetch_loan_details(&conn, &RecordFilter::default()).unwrap();
        assert_eq!(loans.len(), 2);
        assert_eq!(loans[0].record.id(), open.id());
        assert_eq!(loans[0].book_title, "Dune");
        assert_eq!(loans[0].member_name, alice.name());
    }

    #[test]
    fn save_return_never_overwrites() {
        let mut conn = memory_db();
        let book = seed_book(&conn, "Dune", 1);
        let alice = seed_member(&conn, "alice@example.com");
        let mut record = borrow_book_on(&mut conn, book.id(), alice.id(), date(1)).unwrap();

        record.mark_returned(date(2)).unwrap();
        save_return(&conn, &record).unwrap();

        let mut stale = BorrowRecord::from_row(record.id(), book.id(), alice.id(), date(1), None);
        stale.mark_returned(date(9)).unwrap();
        assert!(matches!(
            save_return(&conn, &stale),
            Err(LibraryError::AlreadyReturned(_))
        ));
        let stored = find_record(&conn, record.id()).unwrap().unwrap();
        assert_eq!(stored.return_date(), Some(date(2)));
    }

    #[test]
    fn delete_record_is_unconditional() {
        let mut conn = memory_db();
        let book = seed_book(&conn, "Dune", 1);
        let alice = seed_member(&conn, "alice@example.com");
        let record = borrow_book_on(&mut conn, book.id(), alice.id(), date(1)).unwrap();

        delete_record(&conn, record.id()).unwrap();
        assert!(find_record(&conn, record.id()).unwrap().is_none());
        assert!(matches!(
            delete_record(&conn, record.id()),
            Err(LibraryError::NotFound { entity: EntityKind::Record, .. })
        ));
    }
}
