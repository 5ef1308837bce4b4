use anyhow::{anyhow, Result};
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};

use crate::models::{Book, Member, NewBook, NewMember};

/// Build a `Label: value` line, highlighting the field that has focus and
/// greying out empty placeholders.
fn field_line(label: &str, value: &str, placeholder: &str, is_active: bool) -> Line<'static> {
    let display = if value.is_empty() {
        placeholder.to_string()
    } else {
        value.to_string()
    };

    let style = if is_active {
        Style::default().fg(Color::Yellow)
    } else if value.is_empty() {
        Style::default().fg(Color::DarkGray)
    } else {
        Style::default()
    };

    Line::from(vec![
        Span::raw(format!("{label}: ")),
        Span::styled(display, style),
    ])
}

/// Input state for the add/edit book modal.
#[derive(Default, Clone)]
pub(crate) struct BookForm {
    pub(crate) title: String,
    pub(crate) author: String,
    pub(crate) copies: String,
    pub(crate) isbn: String,
    pub(crate) active: BookField,
    pub(crate) error: Option<String>,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub(crate) enum BookField {
    #[default]
    Title,
    Author,
    Copies,
    Isbn,
}

impl BookField {
    pub(crate) const ALL: [BookField; 4] = [
        BookField::Title,
        BookField::Author,
        BookField::Copies,
        BookField::Isbn,
    ];

    pub(crate) fn label(self) -> &'static str {
        match self {
            BookField::Title => "Title",
            BookField::Author => "Author",
            BookField::Copies => "Copies",
            BookField::Isbn => "ISBN",
        }
    }

    fn row(self) -> u16 {
        match self {
            BookField::Title => 0,
            BookField::Author => 1,
            BookField::Copies => 2,
            BookField::Isbn => 3,
        }
    }
}

impl BookForm {
    /// A fresh form starts with one copy.
    pub(crate) fn new() -> Self {
        Self {
            copies: "1".to_string(),
            ..Self::default()
        }
    }

    pub(crate) fn from_book(book: &Book) -> Self {
        Self {
            title: book.title().to_string(),
            author: book.author().to_string(),
            copies: book.total_copies().to_string(),
            isbn: book.isbn().unwrap_or_default().to_string(),
            active: BookField::Title,
            error: None,
        }
    }

    pub(crate) fn next_field(&mut self) {
        self.active = match self.active {
            BookField::Title => BookField::Author,
            BookField::Author => BookField::Copies,
            BookField::Copies => BookField::Isbn,
            BookField::Isbn => BookField::Title,
        };
    }

    pub(crate) fn previous_field(&mut self) {
        self.active = match self.active {
            BookField::Title => BookField::Isbn,
            BookField::Author => BookField::Title,
            BookField::Copies => BookField::Author,
            BookField::Isbn => BookField::Copies,
        };
    }

    fn value_mut(&mut self, field: BookField) -> &mut String {
        match field {
            BookField::Title => &mut self.title,
            BookField::Author => &mut self.author,
            BookField::Copies => &mut self.copies,
            BookField::Isbn => &mut self.isbn,
        }
    }

    pub(crate) fn value(&self, field: BookField) -> &str {
        match field {
            BookField::Title => &self.title,
            BookField::Author => &self.author,
            BookField::Copies => &self.copies,
            BookField::Isbn => &self.isbn,
        }
    }

    /// Append a character to the active field. The copies field only takes
    /// digits.
    pub(crate) fn push_char(&mut self, ch: char) -> bool {
        if ch.is_control() || (self.active == BookField::Copies && !ch.is_ascii_digit()) {
            return false;
        }
        let field = self.active;
        self.value_mut(field).push(ch);
        true
    }

    pub(crate) fn backspace(&mut self) {
        let field = self.active;
        self.value_mut(field).pop();
    }

    fn parse_copies(&self) -> Result<i64> {
        let raw = self.copies.trim();
        if raw.is_empty() {
            return Err(anyhow!("Copies is required."));
        }
        raw.parse::<i64>()
            .map_err(|_| anyhow!("Copies must be a whole number no larger than {}.", i64::MAX))
    }

    /// Validate the inputs into a draft ready for `create_book`.
    pub(crate) fn parse_new(&self) -> Result<NewBook> {
        let copies = self.parse_copies()?;
        let draft = NewBook::new(&self.title, &self.author, copies)?
            .with_isbn(Some(self.isbn.as_str()))?;
        Ok(draft)
    }

    /// Copy the inputs onto `book`, leaving it untouched if any field fails.
    pub(crate) fn apply_to(&self, book: &Book) -> Result<Book> {
        let copies = self.parse_copies()?;
        let mut edited = book.clone();
        edited.set_title(&self.title)?;
        edited.set_author(&self.author)?;
        edited.set_total_copies(copies)?;
        edited.set_isbn(Some(self.isbn.as_str()))?;
        Ok(edited)
    }

    pub(crate) fn build_line(&self, field: BookField) -> Line<'static> {
        let placeholder = match field {
            BookField::Isbn => "<optional>",
            _ => "<required>",
        };
        field_line(field.label(), self.value(field), placeholder, self.active == field)
    }

    /// Terminal cursor offset (column, row) inside the form body.
    pub(crate) fn cursor_offset(&self) -> (u16, u16) {
        let field = self.active;
        let column = field.label().len() + 2 + self.value(field).chars().count();
        (column as u16, field.row())
    }
}

/// Input state for the add/edit member modal.
#[derive(Default, Clone)]
pub(crate) struct MemberForm {
    pub(crate) name: String,
    pub(crate) email: String,
    pub(crate) active: MemberField,
    pub(crate) error: Option<String>,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub(crate) enum MemberField {
    #[default]
    Name,
    Email,
}

impl MemberField {
    pub(crate) const ALL: [MemberField; 2] = [MemberField::Name, MemberField::Email];

    pub(crate) fn label(self) -> &'static str {
        match self {
            MemberField::Name => "Name",
            MemberField::Email => "Email",
        }
    }
}

impl MemberForm {
    pub(crate) fn from_member(member: &Member) -> Self {
        Self {
            name: member.name().to_string(),
            email: member.email().to_string(),
            active: MemberField::Name,
            error: None,
        }
    }

    /// Only two fields, so forward and backward are the same move.
    pub(crate) fn toggle_field(&mut self) {
        self.active = match self.active {
            MemberField::Name => MemberField::Email,
            MemberField::Email => MemberField::Name,
        };
    }

    pub(crate) fn value(&self, field: MemberField) -> &str {
        match field {
            MemberField::Name => &self.name,
            MemberField::Email => &self.email,
        }
    }

    pub(crate) fn push_char(&mut self, ch: char) -> bool {
        if ch.is_control() {
            return false;
        }
        match self.active {
            MemberField::Name => self.name.push(ch),
            MemberField::Email => self.email.push(ch),
        }
        true
    }

    pub(crate) fn backspace(&mut self) {
        match self.active {
            MemberField::Name => {
                self.name.pop();
            }
            MemberField::Email => {
                self.email.pop();
            }
        }
    }

    pub(crate) fn parse_new(&self) -> Result<NewMember> {
        Ok(NewMember::new(&self.name, &self.email)?)
    }

    pub(crate) fn apply_to(&self, member: &Member) -> Result<Member> {
        let mut edited = member.clone();
        edited.set_name(&self.name)?;
        edited.set_email(&self.email)?;
        Ok(edited)
    }

    pub(crate) fn build_line(&self, field: MemberField) -> Line<'static> {
        field_line(field.label(), self.value(field), "<required>", self.active == field)
    }

    pub(crate) fn cursor_offset(&self) -> (u16, u16) {
        let field = self.active;
        let column = field.label().len() + 2 + self.value(field).chars().count();
        let row = if field == MemberField::Name { 0 } else { 1 };
        (column as u16, row)
    }
}

/// What a pending delete confirmation refers to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum ConfirmDelete {
    Book { id: i64, title: String },
    Member { id: i64, name: String },
    Record {
        id: i64,
        book_title: String,
        member_name: String,
        active: bool,
    },
}

impl ConfirmDelete {
    pub(crate) fn title(&self) -> &'static str {
        match self {
            ConfirmDelete::Book { .. } => "Delete Book",
            ConfirmDelete::Member { .. } => "Delete Member",
            ConfirmDelete::Record { .. } => "Delete Borrow Record",
        }
    }

    /// Question plus a line about what else goes with it.
    pub(crate) fn lines(&self) -> [String; 2] {
        match self {
            ConfirmDelete::Book { title, .. } => [
                format!("Delete \"{title}\"?"),
                "Its returned loan history is deleted too.".to_string(),
            ],
            ConfirmDelete::Member { name, .. } => [
                format!("Delete member {name}?"),
                "Their returned loan history is deleted too.".to_string(),
            ],
            ConfirmDelete::Record {
                id,
                book_title,
                member_name,
                active,
            } => [
                format!("Delete record #{id} ({book_title} / {member_name})?"),
                if *active {
                    "The loan is still open; deleting frees the copy without a return.".to_string()
                } else {
                    "This only removes history.".to_string()
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LibraryError;
    use crate::ui::helpers::surface_error;

    fn type_text(form: &mut BookForm, text: &str) {
        for ch in text.chars() {
            form.push_char(ch);
        }
    }

    #[test]
    fn copies_field_only_accepts_digits() {
        let mut form = BookForm::new();
        form.active = BookField::Copies;
        form.backspace();
        assert!(!form.push_char('x'));
        assert!(form.push_char('3'));
        assert_eq!(form.copies, "3");
    }

    #[test]
    fn field_focus_cycles_both_ways() {
        let mut form = BookForm::new();
        form.previous_field();
        assert_eq!(form.active, BookField::Isbn);
        form.next_field();
        form.next_field();
        assert_eq!(form.active, BookField::Author);
    }

    #[test]
    fn book_form_parses_into_a_draft() {
        let mut form = BookForm::new();
        type_text(&mut form, " Dune ");
        form.next_field();
        type_text(&mut form, "Herbert");
        let draft = form.parse_new().unwrap();
        assert_eq!(draft, NewBook::new("Dune", "Herbert", 1).unwrap());

        form.copies.clear();
        assert!(form.parse_new().is_err());
        form.copies = "0".into();
        let err = form.parse_new().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LibraryError>(),
            Some(LibraryError::Validation(_))
        ));
    }

    #[test]
    fn overflowing_copies_names_the_field() {
        let mut form = BookForm::new();
        type_text(&mut form, "Dune");
        form.next_field();
        type_text(&mut form, "Herbert");
        form.next_field();
        type_text(&mut form, "99999999999999999999");

        let err = form.parse_new().unwrap_err();
        assert!(surface_error(&err).starts_with("Copies must be a whole number"));
    }

    #[test]
    fn failed_edit_leaves_the_book_alone() {
        let book = Book::from_row(1, "Dune".into(), "Herbert".into(), 2, None);
        let mut form = BookForm::from_book(&book);
        form.author.clear();
        assert!(form.apply_to(&book).is_err());

        form.author = "Frank Herbert".into();
        form.isbn = "0441013597".into();
        let edited = form.apply_to(&book).unwrap();
        assert_eq!(edited.author(), "Frank Herbert");
        assert_eq!(edited.isbn(), Some("0441013597"));
        assert_eq!(book.author(), "Herbert");
    }

    #[test]
    fn member_form_cursor_tracks_active_field() {
        let mut form = MemberForm::default();
        form.push_char('A');
        assert_eq!(form.cursor_offset(), (7, 0));
        form.toggle_field();
        for ch in "a@b.co".chars() {
            form.push_char(ch);
        }
        assert_eq!(form.cursor_offset(), (13, 1));
        assert_eq!(form.parse_new().unwrap().email(), "a@b.co");
    }
}
