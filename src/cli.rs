//! One-shot subcommands for scripting. Running without a subcommand opens the
//! terminal UI instead.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use rusqlite::Connection;

use crate::db::{
    create_book, create_member, delete_record, fetch_book_stock, fetch_loan_details,
    fetch_members, find_book, find_member, update_member, RecordFilter,
};
use crate::error::{EntityKind, LibraryError};
use crate::lending::{borrow_book, remove_book, remove_member, return_book, revise_book};
use crate::models::{today, LoanStatus, NewBook, NewMember};

#[derive(Debug, Parser)]
#[command(name = "library-catalog", version, about = "Track books, members and loans")]
pub struct Cli {
    /// SQLite database to use instead of the configured one
    #[arg(long, global = true, value_name = "PATH")]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Open the interactive terminal UI (the default)
    Tui,
    /// Manage books
    #[command(subcommand)]
    Book(BookCommand),
    /// Manage members
    #[command(subcommand)]
    Member(MemberCommand),
    /// Lend a copy of a book to a member
    Borrow {
        #[arg(long)]
        book: i64,
        #[arg(long)]
        member: i64,
    },
    /// Return a borrowed book
    Return {
        #[arg(long)]
        record: i64,
    },
    /// Inspect or clean up borrow records
    #[command(subcommand)]
    Loan(LoanCommand),
}

#[derive(Debug, Subcommand)]
pub enum BookCommand {
    Add {
        #[arg(long)]
        title: String,
        #[arg(long)]
        author: String,
        #[arg(long, default_value_t = 1)]
        copies: i64,
        #[arg(long)]
        isbn: Option<String>,
    },
    List,
    Update {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        author: Option<String>,
        #[arg(long)]
        copies: Option<i64>,
        /// Pass an empty string to clear the ISBN
        #[arg(long)]
        isbn: Option<String>,
    },
    Delete {
        #[arg(long)]
        id: i64,
    },
}

#[derive(Debug, Subcommand)]
pub enum MemberCommand {
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
    },
    List,
    Update {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    Delete {
        #[arg(long)]
        id: i64,
    },
}

#[derive(Debug, Subcommand)]
pub enum LoanCommand {
    List(LoanListArgs),
    /// Remove a record outright, open or not
    Delete {
        #[arg(long)]
        record: i64,
    },
}

#[derive(Debug, Args)]
pub struct LoanListArgs {
    /// Only loans that have not been returned
    #[arg(long)]
    active: bool,
    #[arg(long)]
    book: Option<i64>,
    #[arg(long)]
    member: Option<i64>,
}

/// Run a single subcommand against `conn`, writing human-readable output.
pub fn execute(conn: &mut Connection, command: Command, out: &mut impl Write) -> Result<()> {
    match command {
        Command::Tui => bail!("the terminal UI cannot run as a one-shot command"),
        Command::Book(cmd) => execute_book(conn, cmd, out),
        Command::Member(cmd) => execute_member(conn, cmd, out),
        Command::Borrow { book, member } => {
            let record = borrow_book(conn, book, member)?;
            writeln!(out, "Borrow record #{} created.", record.id())?;
            Ok(())
        }
        Command::Return { record } => {
            let record = return_book(conn, record)?;
            writeln!(
                out,
                "Borrow record #{} returned after {} day(s).",
                record.id(),
                record.days_borrowed(today())
            )?;
            Ok(())
        }
        Command::Loan(LoanCommand::List(args)) => {
            let filter = RecordFilter {
                book_id: args.book,
                member_id: args.member,
                status: args.active.then_some(LoanStatus::Active),
                ..RecordFilter::default()
            };
            let loans = fetch_loan_details(conn, &filter)?;
            if loans.is_empty() {
                writeln!(out, "No loans found.")?;
                return Ok(());
            }
            let today = today();
            let rows = loans
                .iter()
                .map(|loan| {
                    vec![
                        loan.record.id().to_string(),
                        loan.book_title.clone(),
                        loan.member_name.clone(),
                        loan.record.borrow_date().to_string(),
                        loan.record
                            .return_date()
                            .map(|d| d.to_string())
                            .unwrap_or_default(),
                        loan.record.days_borrowed(today).to_string(),
                        loan.record.status().to_string(),
                    ]
                })
                .collect::<Vec<_>>();
            write!(
                out,
                "{}",
                render_table(
                    &["ID", "Book", "Member", "Borrowed", "Returned", "Days", "Status"],
                    &rows
                )
            )?;
            Ok(())
        }
        Command::Loan(LoanCommand::Delete { record }) => {
            delete_record(conn, record)?;
            writeln!(out, "Borrow record #{record} deleted.")?;
            Ok(())
        }
    }
}

fn execute_book(conn: &mut Connection, command: BookCommand, out: &mut impl Write) -> Result<()> {
    match command {
        BookCommand::Add {
            title,
            author,
            copies,
            isbn,
        } => {
            let draft = NewBook::new(&title, &author, copies)?.with_isbn(isbn.as_deref())?;
            let book = create_book(conn, &draft)?;
            writeln!(
                out,
                "Book '{}' by {} added with id {}.",
                book.title(),
                book.author(),
                book.id()
            )?;
        }
        BookCommand::List => {
            let stock = fetch_book_stock(conn)?;
            if stock.is_empty() {
                writeln!(out, "No books found.")?;
                return Ok(());
            }
            let rows = stock
                .iter()
                .map(|entry| {
                    vec![
                        entry.book.id().to_string(),
                        entry.book.title().to_string(),
                        entry.book.author().to_string(),
                        entry.book.isbn().unwrap_or("").to_string(),
                        entry.on_loan().to_string(),
                        format!("{}/{}", entry.available_copies, entry.book.total_copies()),
                    ]
                })
                .collect::<Vec<_>>();
            write!(
                out,
                "{}",
                render_table(
                    &["ID", "Title", "Author", "ISBN", "On loan", "Available"],
                    &rows
                )
            )?;
        }
        BookCommand::Update {
            id,
            title,
            author,
            copies,
            isbn,
        } => {
            let mut book =
                find_book(conn, id)?.ok_or_else(|| LibraryError::not_found(EntityKind::Book, id))?;
            if let Some(title) = title {
                book.set_title(&title)?;
            }
            if let Some(author) = author {
                book.set_author(&author)?;
            }
            if let Some(copies) = copies {
                book.set_total_copies(copies)?;
            }
            if let Some(isbn) = isbn {
                book.set_isbn(Some(isbn.as_str()))?;
            }
            revise_book(conn, &book)?;
            writeln!(out, "Book #{id} updated.")?;
        }
        BookCommand::Delete { id } => {
            remove_book(conn, id)?;
            writeln!(out, "Book #{id} deleted.")?;
        }
    }
    Ok(())
}

fn execute_member(
    conn: &mut Connection,
    command: MemberCommand,
    out: &mut impl Write,
) -> Result<()> {
    match command {
        MemberCommand::Add { name, email } => {
            let member = create_member(conn, &NewMember::new(&name, &email)?)?;
            writeln!(
                out,
                "Member {} added with id {}.",
                member.name(),
                member.id()
            )?;
        }
        MemberCommand::List => {
            let members = fetch_members(conn)?;
            if members.is_empty() {
                writeln!(out, "No members found.")?;
                return Ok(());
            }
            let rows = members
                .iter()
                .map(|member| {
                    vec![
                        member.id().to_string(),
                        member.name().to_string(),
                        member.email().to_string(),
                        member.join_date().to_string(),
                    ]
                })
                .collect::<Vec<_>>();
            write!(
                out,
                "{}",
                render_table(&["ID", "Name", "Email", "Joined"], &rows)
            )?;
        }
        MemberCommand::Update { id, name, email } => {
            let mut member =
                find_member(conn, id)?.ok_or_else(|| LibraryError::not_found(EntityKind::Member, id))?;
            if let Some(name) = name {
                member.set_name(&name)?;
            }
            if let Some(email) = email {
                member.set_email(&email)?;
            }
            update_member(conn, &member)?;
            writeln!(out, "Member #{id} updated.")?;
        }
        MemberCommand::Delete { id } => {
            remove_member(conn, id)?;
            writeln!(out, "Member #{id} deleted.")?;
        }
    }
    Ok(())
}

/// Left-aligned, space-padded columns with a dashed rule under the header.
fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut table = format_row(headers.iter().copied(), &widths);
    let rule_len = widths.iter().sum::<usize>() + 3 * widths.len().saturating_sub(1);
    table.push_str(&"-".repeat(rule_len));
    table.push('\n');
    for row in rows {
        table.push_str(&format_row(row.iter().map(String::as_str), &widths));
    }
    table
}

fn format_row<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    let line = cells
        .zip(widths)
        .map(|(cell, width)| format!("{cell:<width$}"))
        .collect::<Vec<_>>()
        .join(" | ");
    format!("{}\n", line.trim_end())
}

/// Exit status for a failed command: recoverable library errors are the
/// user's to fix (2); anything else is an internal failure (1).
pub fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<LibraryError>() {
        Some(lib) if lib.is_recoverable() => 2,
        _ => 1,
    }
}
