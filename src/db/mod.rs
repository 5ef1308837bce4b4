//! Persistence module split by entity. Every function takes a plain
//! `&Connection`, so the same calls work on their own or inside a lending
//! transaction (a `Transaction` derefs to `Connection`).

mod books;
mod connection;
mod criteria;
mod members;
mod records;

pub use books::{
    available_copies, create_book, delete_book, fetch_book_stock, fetch_books, find_book,
    find_books, update_book, BookFilter,
};
pub use connection::{ensure_schema, open_database, open_in_memory};
pub use members::{
    create_member, delete_member, fetch_members, find_member, find_member_by_email, find_members,
    update_member, MemberFilter,
};
pub use records::{
    active_borrows, count_active_loans, delete_record, fetch_loan_details, fetch_records,
    find_record, find_records, RecordFilter,
};
pub(crate) use records::{insert_record, save_return};
