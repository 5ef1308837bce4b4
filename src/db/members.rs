use chrono::NaiveDate;
use rusqlite::{params, params_from_iter, Connection, Error as SqlError, ErrorCode, OptionalExtension, Row};
use tracing::debug;

use crate::error::{EntityKind, LibraryError, Result, StorageContext};
use crate::models::{normalize_email, Member, NewMember};

use super::criteria::Criteria;

const MEMBER_COLUMNS: &str = "id, name, email, join_date";

/// Equality filter for [`find_members`]. Unset fields match anything.
#[derive(Debug, Clone, Default)]
pub struct MemberFilter {
    pub name: Option<String>,
    pub email: Option<String>,
    pub join_date: Option<NaiveDate>,
}

fn member_from_row(row: &Row<'_>) -> rusqlite::Result<Member> {
    Ok(Member::from_row(row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

/// Every member in insertion order.
pub fn fetch_members(conn: &Connection) -> Result<Vec<Member>> {
    find_members(conn, &MemberFilter::default())
}

pub fn find_member(conn: &Connection, id: i64) -> Result<Option<Member>> {
    conn.query_row(
        &format!("SELECT {MEMBER_COLUMNS} FROM members WHERE id = ?1"),
        [id],
        member_from_row,
    )
    .optional()
    .storage("failed to load member")
}

/// Look a member up by email, normalizing it first so the comparison is
/// case-insensitive.
pub fn find_member_by_email(conn: &Connection, email: &str) -> Result<Option<Member>> {
    let Ok(email) = normalize_email(email) else {
        return Ok(None);
    };
    conn.query_row(
        &format!("SELECT {MEMBER_COLUMNS} FROM members WHERE email = ?1"),
        [email],
        member_from_row,
    )
    .optional()
    .storage("failed to load member by email")
}

pub fn find_members(conn: &Connection, filter: &MemberFilter) -> Result<Vec<Member>> {
    let mut criteria = Criteria::default();
    if let Some(name) = &filter.name {
        criteria.eq("name", name.trim().to_string());
    }
    if let Some(email) = &filter.email {
        criteria.eq("email", email.trim().to_lowercase());
    }
    if let Some(join_date) = filter.join_date {
        criteria.eq("join_date", join_date.to_string());
    }

    let sql = format!(
        "SELECT {MEMBER_COLUMNS} FROM members{} ORDER BY id",
        criteria.where_clause()
    );
    let mut stmt = conn.prepare(&sql).storage("failed to prepare member query")?;
    let members = stmt
        .query_map(params_from_iter(criteria.values()), member_from_row)
        .storage("failed to load members")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .storage("failed to collect members")?;

    Ok(members)
}

/// Insert a new member. The email is checked up front so the common case gets
/// a friendly conflict; the UNIQUE constraint still catches a racing insert.
pub fn create_member(conn: &Connection, member: &NewMember) -> Result<Member> {
    if find_member_by_email(conn, &member.email)?.is_some() {
        return Err(email_taken(&member.email));
    }

    conn.execute(
        "INSERT INTO members (name, email, join_date) VALUES (?1, ?2, ?3)",
        params![member.name, member.email, member.join_date],
    )
    .map_err(|err| map_email_conflict(err, &member.email, "failed to insert member"))?;

    let id = conn.last_insert_rowid();
    debug!(member_id = id, "member created");
    Ok(Member::from_row(
        id,
        member.name.clone(),
        member.email.clone(),
        member.join_date,
    ))
}

/// Persist name and email. The join date column is never written after
/// creation.
pub fn update_member(conn: &Connection, member: &Member) -> Result<()> {
    if let Some(existing) = find_member_by_email(conn, member.email())? {
        if existing.id() != member.id() {
            return Err(email_taken(member.email()));
        }
    }

    let updated = conn
        .execute(
            "UPDATE members SET name = ?1, email = ?2 WHERE id = ?3",
            params![member.name(), member.email(), member.id()],
        )
        .map_err(|err| map_email_conflict(err, member.email(), "failed to update member"))?;

    if updated == 0 {
        Err(LibraryError::not_found(EntityKind::Member, member.id()))
    } else {
        debug!(member_id = member.id(), "member updated");
        Ok(())
    }
}

/// Remove a member row; borrow records cascade. The active-loan guard lives
/// in `lending::remove_member`.
pub fn delete_member(conn: &Connection, id: i64) -> Result<()> {
    let deleted = conn
        .execute("DELETE FROM members WHERE id = ?1", [id])
        .storage("failed to delete member")?;

    if deleted == 0 {
        Err(LibraryError::not_found(EntityKind::Member, id))
    } else {
        debug!(member_id = id, "member deleted");
        Ok(())
    }
}

fn email_taken(email: &str) -> LibraryError {
    LibraryError::conflict(format!("A member with email {email} already exists."))
}

fn map_email_conflict(err: SqlError, email: &str, context: &'static str) -> LibraryError {
    if matches!(
        err.sqlite_error_code(),
        Some(ErrorCode::ConstraintViolation)
    ) {
        email_taken(email)
    } else {
        LibraryError::Storage {
            context,
            source: err,
        }
    }
}
