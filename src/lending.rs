//! Borrow/return transitions and the cross-entity guards a single-table
//! repository call cannot see. Each operation runs in one IMMEDIATE
//! transaction: SQLite takes the write lock before the availability or
//! active-loan check, so a concurrent writer on another connection waits and
//! then observes the committed result. Dropping an uncommitted transaction
//! rolls it back, which is what every early `?` return relies on.

use chrono::NaiveDate;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use tracing::{info, instrument, warn};

use crate::db::{
    active_borrows, available_copies, count_active_loans, delete_book, delete_member, find_book,
    find_member, find_record, insert_record, save_return, update_book,
};
use crate::error::{EntityKind, LibraryError, Result, StorageContext};
use crate::models::{today, Book, BorrowRecord};

fn write_transaction(conn: &mut Connection) -> Result<Transaction<'_>> {
    conn.transaction_with_behavior(TransactionBehavior::Immediate)
        .storage("failed to begin transaction")
}

/// Lend one copy of `book_id` to `member_id`, dated today.
pub fn borrow_book(conn: &mut Connection, book_id: i64, member_id: i64) -> Result<BorrowRecord> {
    borrow_book_on(conn, book_id, member_id, today())
}

#[instrument(skip(conn))]
pub fn borrow_book_on(
    conn: &mut Connection,
    book_id: i64,
    member_id: i64,
    borrow_date: NaiveDate,
) -> Result<BorrowRecord> {
    let tx = write_transaction(conn)?;

    let book = find_book(&tx, book_id)?
        .ok_or_else(|| LibraryError::not_found(EntityKind::Book, book_id))?;
    if find_member(&tx, member_id)?.is_none() {
        return Err(LibraryError::not_found(EntityKind::Member, member_id));
    }

    if available_copies(&tx, book_id)? <= 0 {
        warn!(book_id, "no copies left to borrow");
        return Err(LibraryError::Unavailable {
            book_id,
            title: book.title().to_string(),
        });
    }

    let record = insert_record(&tx, book_id, member_id, borrow_date)?;
    tx.commit().storage("failed to commit borrow")?;

    info!(record_id = record.id(), "book borrowed");
    Ok(record)
}

/// Close an open loan, dated today.
pub fn return_book(conn: &mut Connection, record_id: i64) -> Result<BorrowRecord> {
    return_book_on(conn, record_id, today())
}

/// Returning twice is an error, not a no-op; the stored return date is left
/// untouched.
#[instrument(skip(conn))]
pub fn return_book_on(
    conn: &mut Connection,
    record_id: i64,
    return_date: NaiveDate,
) -> Result<BorrowRecord> {
    let tx = write_transaction(conn)?;

    let mut record = find_record(&tx, record_id)?
        .ok_or_else(|| LibraryError::not_found(EntityKind::Record, record_id))?;
    if let Err(err) = record.mark_returned(return_date) {
        warn!(error = %err, "return rejected");
        return Err(err);
    }
    save_return(&tx, &record)?;
    tx.commit().storage("failed to commit return")?;

    info!(book_id = record.book_id(), "book returned");
    Ok(record)
}

/// Delete a book and its loan history, unless a copy is still out.
#[instrument(skip(conn))]
pub fn remove_book(conn: &mut Connection, book_id: i64) -> Result<()> {
    let tx = write_transaction(conn)?;

    let book = find_book(&tx, book_id)?
        .ok_or_else(|| LibraryError::not_found(EntityKind::Book, book_id))?;
    let on_loan = count_active_loans(&tx, book_id)?;
    if on_loan > 0 {
        warn!(on_loan, "book delete blocked by active loans");
        return Err(LibraryError::conflict(format!(
            "\"{}\" has {on_loan} cop{} on loan and cannot be deleted.",
            book.title(),
            if on_loan == 1 { "y" } else { "ies" }
        )));
    }

    delete_book(&tx, book_id)?;
    tx.commit().storage("failed to commit book deletion")?;
    info!("book removed");
    Ok(())
}

/// Delete a member and their loan history, unless they still hold a book.
#[instrument(skip(conn))]
pub fn remove_member(conn: &mut Connection, member_id: i64) -> Result<()> {
    let tx = write_transaction(conn)?;

    let member = find_member(&tx, member_id)?
        .ok_or_else(|| LibraryError::not_found(EntityKind::Member, member_id))?;
    let open = active_borrows(&tx, member_id)?;
    if !open.is_empty() {
        warn!(active = open.len(), "member delete blocked by active loans");
        return Err(LibraryError::conflict(format!(
            "{} still has {} book(s) on loan and cannot be deleted.",
            member.name(),
            open.len()
        )));
    }

    delete_member(&tx, member_id)?;
    tx.commit().storage("failed to commit member deletion")?;
    info!("member removed");
    Ok(())
}

/// Save edits to a book. Lowering `total_copies` below the number of copies
/// currently on loan is refused, so availability can never go negative.
#[instrument(skip(conn, book), fields(book_id = book.id()))]
pub fn revise_book(conn: &mut Connection, book: &Book) -> Result<()> {
    let tx = write_transaction(conn)?;

    let on_loan = count_active_loans(&tx, book.id())?;
    if book.total_copies() < on_loan {
        warn!(on_loan, requested = book.total_copies(), "copy count edit blocked");
        return Err(LibraryError::conflict(format!(
            "{on_loan} copies of \"{}\" are on loan; total copies cannot drop below that.",
            book.title()
        )));
    }

    update_book(&tx, book)?;
    tx.commit().storage("failed to commit book update")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::Duration;

    use proptest::prelude::*;

    use super::*;
    use crate::db::test_support::{memory_db, seed_book, seed_member};
    use crate::db::{
        create_book, create_member, fetch_records, find_records, open_database, RecordFilter,
    };
    use crate::models::{LoanStatus, NewBook, NewMember};

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 2, d).unwrap()
    }

    #[test]
    fn single_copy_scenario() {
        let mut conn = memory_db();
        let book = create_book(&conn, &NewBook::new("1984", "Orwell", 1).unwrap()).unwrap();
        assert_eq!(available_copies(&conn, book.id()).unwrap(), 1);

        let alice = create_member(&conn, &NewMember::new("Alice", "alice@example.com").unwrap())
            .unwrap();
        let bob = seed_member(&conn, "bob@example.com");

        let record = borrow_book(&mut conn, book.id(), alice.id()).unwrap();
        assert_eq!(record.status(), LoanStatus::Active);
        assert_eq!(record.borrow_date(), today());
        assert_eq!(available_copies(&conn, book.id()).unwrap(), 0);

        let err = borrow_book(&mut conn, book.id(), bob.id()).unwrap_err();
        assert!(matches!(err, LibraryError::Unavailable { .. }));
        assert_eq!(fetch_records(&conn).unwrap().len(), 1);

        let returned = return_book(&mut conn, record.id()).unwrap();
        assert!(returned.is_returned());
        assert_eq!(available_copies(&conn, book.id()).unwrap(), 1);
    }

    #[test]
    fn borrow_resolves_book_before_member() {
        let mut conn = memory_db();
        let book = seed_book(&conn, "Dune", 1);
        let alice = seed_member(&conn, "alice@example.com");

        assert!(matches!(
            borrow_book(&mut conn, 42, 43),
            Err(LibraryError::NotFound { entity: EntityKind::Book, id: 42 })
        ));
        assert!(matches!(
            borrow_book(&mut conn, book.id(), 43),
            Err(LibraryError::NotFound { entity: EntityKind::Member, id: 43 })
        ));
        assert!(borrow_book(&mut conn, book.id(), alice.id()).is_ok());
    }

    #[test]
    fn returning_twice_is_rejected_and_keeps_the_first_date() {
        let mut conn = memory_db();
        let book = seed_book(&conn, "Dune", 1);
        let alice = seed_member(&conn, "alice@example.com");
        let record = borrow_book_on(&mut conn, book.id(), alice.id(), date(1)).unwrap();

        return_book_on(&mut conn, record.id(), date(4)).unwrap();
        let err = return_book_on(&mut conn, record.id(), date(9)).unwrap_err();
        assert!(matches!(err, LibraryError::AlreadyReturned(id) if id == record.id()));

        let stored = find_record(&conn, record.id()).unwrap().unwrap();
        assert_eq!(stored.return_date(), Some(date(4)));
        assert_eq!(stored.days_borrowed(date(28)), 3);

        assert!(matches!(
            return_book(&mut conn, 999),
            Err(LibraryError::NotFound { entity: EntityKind::Record, .. })
        ));
    }

    #[test]
    fn return_before_borrow_date_is_invalid() {
        let mut conn = memory_db();
        let book = seed_book(&conn, "Dune", 1);
        let alice = seed_member(&conn, "alice@example.com");
        let record = borrow_book_on(&mut conn, book.id(), alice.id(), date(10)).unwrap();

        assert!(matches!(
            return_book_on(&mut conn, record.id(), date(9)),
            Err(LibraryError::Validation(_))
        ));
        assert!(!find_record(&conn, record.id()).unwrap().unwrap().is_returned());
    }

    #[test]
    fn book_with_active_loan_cannot_be_removed() {
        let mut conn = memory_db();
        let book = seed_book(&conn, "Dune", 2);
        let alice = seed_member(&conn, "alice@example.com");
        let old = borrow_book_on(&mut conn, book.id(), alice.id(), date(1)).unwrap();
        return_book_on(&mut conn, old.id(), date(2)).unwrap();
        let open = borrow_book_on(&mut conn, book.id(), alice.id(), date(3)).unwrap();

        assert!(matches!(
            remove_book(&mut conn, book.id()),
            Err(LibraryError::Conflict(_))
        ));
        assert!(find_book(&conn, book.id()).unwrap().is_some());

        return_book_on(&mut conn, open.id(), date(5)).unwrap();
        remove_book(&mut conn, book.id()).unwrap();
        assert!(find_book(&conn, book.id()).unwrap().is_none());
        assert!(fetch_records(&conn).unwrap().is_empty());
    }

    #[test]
    fn member_with_active_loan_cannot_be_removed() {
        let mut conn = memory_db();
        let book = seed_book(&conn, "Dune", 1);
        let alice = seed_member(&conn, "alice@example.com");
        let bob = seed_member(&conn, "bob@example.com");
        let record = borrow_book(&mut conn, book.id(), alice.id()).unwrap();

        assert!(matches!(
            remove_member(&mut conn, alice.id()),
            Err(LibraryError::Conflict(_))
        ));
        remove_member(&mut conn, bob.id()).unwrap();

        return_book(&mut conn, record.id()).unwrap();
        remove_member(&mut conn, alice.id()).unwrap();
        assert!(find_member(&conn, alice.id()).unwrap().is_none());
        let leftover = find_records(
            &conn,
            &RecordFilter {
                member_id: Some(alice.id()),
                ..RecordFilter::default()
            },
        )
        .unwrap();
        assert!(leftover.is_empty());
        assert!(matches!(
            remove_member(&mut conn, alice.id()),
            Err(LibraryError::NotFound { entity: EntityKind::Member, .. })
        ));
    }

    #[test]
    fn total_copies_cannot_drop_below_copies_on_loan() {
        let mut conn = memory_db();
        let mut book = seed_book(&conn, "Dune", 3);
        let alice = seed_member(&conn, "alice@example.com");
        borrow_book(&mut conn, book.id(), alice.id()).unwrap();
        borrow_book(&mut conn, book.id(), alice.id()).unwrap();

        book.set_total_copies(1).unwrap();
        assert!(matches!(
            revise_book(&mut conn, &book),
            Err(LibraryError::Conflict(_))
        ));
        assert_eq!(find_book(&conn, book.id()).unwrap().unwrap().total_copies(), 3);

        book.set_total_copies(2).unwrap();
        revise_book(&mut conn, &book).unwrap();
        assert_eq!(available_copies(&conn, book.id()).unwrap(), 0);
    }

    #[test]
    fn concurrent_borrows_of_the_last_copy_admit_one() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("race.sqlite");
        let timeout = Duration::from_secs(5);

        let (book_id, member_ids) = {
            let conn = open_database(&path, timeout).unwrap();
            let book = seed_book(&conn, "Last Copy", 1);
            let a = seed_member(&conn, "a@example.com");
            let b = seed_member(&conn, "b@example.com");
            (book.id(), [a.id(), b.id()])
        };

        let barrier = Arc::new(Barrier::new(member_ids.len()));
        let handles: Vec<_> = member_ids
            .into_iter()
            .map(|member_id| {
                let barrier = Arc::clone(&barrier);
                let path = path.clone();
                thread::spawn(move || {
                    let mut conn = open_database(&path, timeout).unwrap();
                    barrier.wait();
                    borrow_book(&mut conn, book_id, member_id)
                })
            })
            .collect();

        let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let successes = outcomes.iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1);
        assert!(outcomes
            .iter()
            .any(|r| matches!(r, Err(LibraryError::Unavailable { .. }))));

        let conn = open_database(&path, timeout).unwrap();
        assert_eq!(available_copies(&conn, book_id).unwrap(), 0);
    }

    #[derive(Debug, Clone)]
    enum Step {
        Borrow { member: usize },
        Return { nth_open: usize },
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            (0usize..3).prop_map(|member| Step::Borrow { member }),
            (0usize..4).prop_map(|nth_open| Step::Return { nth_open }),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn availability_stays_within_bounds(copies in 1i64..4, steps in prop::collection::vec(step(), 0..24)) {
            let mut conn = memory_db();
            let book = seed_book(&conn, "Prop", copies);
            let members: Vec<_> = (0..3)
                .map(|i| seed_member(&conn, &format!("m{i}@example.com")))
                .collect();

            for step in steps {
                match step {
                    Step::Borrow { member } => {
                        let before = available_copies(&conn, book.id()).unwrap();
                        let outcome = borrow_book(&mut conn, book.id(), members[member].id());
                        if before == 0 {
                            let unavailable = matches!(outcome, Err(LibraryError::Unavailable { .. }));
                            prop_assert!(unavailable);
                        } else {
                            prop_assert!(outcome.is_ok());
                        }
                    }
                    Step::Return { nth_open } => {
                        let open = find_records(&conn, &RecordFilter {
                            status: Some(LoanStatus::Active),
                            ..RecordFilter::default()
                        }).unwrap();
                        if let Some(record) = open.get(nth_open) {
                            prop_assert!(return_book(&mut conn, record.id()).is_ok());
                        }
                    }
                }

                let available = available_copies(&conn, book.id()).unwrap();
                prop_assert!((0..=copies).contains(&available));
                let open = count_active_loans(&conn, book.id()).unwrap();
                prop_assert_eq!(available, copies - open);
            }
        }
    }
}
