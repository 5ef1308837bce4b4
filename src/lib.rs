//! Library catalog: books, members and the loans between them, stored in
//! SQLite. The lending core (`models`, `db`, `lending`) knows nothing about
//! terminals; `cli` and `ui` are two front-ends over it.
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod lending;
pub mod logging;
pub mod models;
pub mod ui;

pub use db::{ensure_schema, open_database, open_in_memory};
pub use error::{EntityKind, LibraryError};
pub use lending::{borrow_book, remove_book, remove_member, return_book, revise_book};
pub use models::{Book, BookStock, BorrowRecord, LoanDetails, LoanStatus, Member, NewBook, NewMember};

pub use ui::{run_app, App};
