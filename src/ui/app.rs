use std::mem;

use anyhow::Result;
use crossterm::event::KeyCode;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{
    Block, Borders, Cell, Clear, List, ListItem, ListState, Paragraph, Row, Table, TableState,
    Tabs, Wrap,
};
use ratatui::Frame;
use rusqlite::Connection;
use tracing::error;

use crate::db::{
    create_book, create_member, delete_record, fetch_book_stock, fetch_loan_details,
    fetch_members, update_member,
};
use crate::error::LibraryError;
use crate::lending::{borrow_book, remove_book, remove_member, return_book, revise_book};
use crate::models::{today, Book, BookStock, LoanStatus, Member};

use super::forms::{BookField, BookForm, ConfirmDelete, MemberField, MemberForm};
use super::helpers::{availability_style, centered_rect, key_hints, surface_error};
use super::screens::{FilteredList, LoanScope, LoanScreen, MemberPicker, Searchable};

const HEADER_HEIGHT: u16 = 3;
/// Footer space reserved for status messages and instructions.
const FOOTER_HEIGHT: u16 = 3;
/// Rows skipped by PageUp/PageDown.
const PAGE: isize = 10;

/// Top-level tabs.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum Screen {
    Books,
    Members,
    Loans,
}

impl Screen {
    const ALL: [Screen; 3] = [Screen::Books, Screen::Members, Screen::Loans];

    fn index(self) -> usize {
        match self {
            Screen::Books => 0,
            Screen::Members => 1,
            Screen::Loans => 2,
        }
    }

    fn next(self) -> Self {
        Self::ALL[(self.index() + 1) % Self::ALL.len()]
    }

    fn previous(self) -> Self {
        Self::ALL[(self.index() + Self::ALL.len() - 1) % Self::ALL.len()]
    }
}

/// Fine-grained modes layered over the current screen.
enum Mode {
    Normal,
    AddingBook(BookForm),
    EditingBook { book: Book, form: BookForm },
    AddingMember(MemberForm),
    EditingMember { member: Member, form: MemberForm },
    ConfirmDelete(ConfirmDelete),
    PickingMember(MemberPicker),
    Searching(SearchState),
}

/// Inline search over the current screen's list.
struct SearchState {
    query: String,
}

/// Holds the footer message text plus its severity.
struct StatusMessage {
    text: String,
    kind: StatusKind,
}

/// Severity levels shown in the footer.
enum StatusKind {
    Info,
    Error,
}

impl StatusKind {
    fn style(&self) -> Style {
        match self {
            StatusKind::Info => Style::default().fg(Color::Green),
            StatusKind::Error => Style::default().fg(Color::Red),
        }
    }
}

/// Central application state shared across the TUI.
pub struct App {
    conn: Connection,
    screen: Screen,
    mode: Mode,
    status: Option<StatusMessage>,
    books: FilteredList<BookStock>,
    members: FilteredList<Member>,
    loans: LoanScreen,
}

impl App {
    /// Wrap an open connection and load every list.
    pub fn new(conn: Connection) -> Result<Self> {
        let mut app = Self {
            conn,
            screen: Screen::Books,
            mode: Mode::Normal,
            status: None,
            books: FilteredList::new(Vec::new()),
            members: FilteredList::new(Vec::new()),
            loans: LoanScreen::new(),
        };
        app.reload_all()?;
        Ok(app)
    }

    /// Process one key press. Returns `true` when the user asked to quit.
    pub fn handle_key(&mut self, code: KeyCode) -> Result<bool> {
        let mut exit = false;
        let mode = mem::replace(&mut self.mode, Mode::Normal);

        self.mode = match mode {
            Mode::Normal => self.handle_normal_key(code, &mut exit)?,
            Mode::AddingBook(form) => self.handle_book_form(code, form, None)?,
            Mode::EditingBook { book, form } => self.handle_book_form(code, form, Some(book))?,
            Mode::AddingMember(form) => self.handle_member_form(code, form, None)?,
            Mode::EditingMember { member, form } => {
                self.handle_member_form(code, form, Some(member))?
            }
            Mode::ConfirmDelete(confirm) => self.handle_confirm_delete(code, confirm)?,
            Mode::PickingMember(picker) => self.handle_member_picker(code, picker)?,
            Mode::Searching(state) => self.handle_search(code, state),
        };

        Ok(exit)
    }

    /// Re-read every list, picking up writes made by other processes such as
    /// the one-shot subcommands.
    pub(crate) fn refresh(&mut self) -> Result<()> {
        self.reload_all()?;
        self.set_status("Reloaded from the database.", StatusKind::Info);
        Ok(())
    }

    fn handle_normal_key(&mut self, code: KeyCode, exit: &mut bool) -> Result<Mode> {
        match code {
            KeyCode::Char('q') => *exit = true,
            KeyCode::Tab => self.switch_screen(self.screen.next())?,
            KeyCode::BackTab => self.switch_screen(self.screen.previous())?,
            KeyCode::Char('1') => self.switch_screen(Screen::Books)?,
            KeyCode::Char('2') => self.switch_screen(Screen::Members)?,
            KeyCode::Char('3') => self.switch_screen(Screen::Loans)?,
            KeyCode::Up => self.move_cursor(-1),
            KeyCode::Down => self.move_cursor(1),
            KeyCode::PageUp => self.move_cursor(-PAGE),
            KeyCode::PageDown => self.move_cursor(PAGE),
            KeyCode::Home => self.move_cursor(isize::MIN),
            KeyCode::End => self.move_cursor(isize::MAX),
            KeyCode::Char('f') | KeyCode::Char('/') => {
                self.clear_status();
                return Ok(Mode::Searching(SearchState {
                    query: self.current_filter().unwrap_or_default().to_string(),
                }));
            }
            KeyCode::Esc => self.handle_escape()?,
            _ => {
                return match self.screen {
                    Screen::Books => self.handle_books_key(code),
                    Screen::Members => self.handle_members_key(code),
                    Screen::Loans => self.handle_loans_key(code),
                };
            }
        }
        Ok(Mode::Normal)
    }

    fn handle_books_key(&mut self, code: KeyCode) -> Result<Mode> {
        let selected = self.books.current().map(|entry| entry.book.clone());
        match (code, selected) {
            (KeyCode::Char('+'), _) => {
                self.clear_status();
                return Ok(Mode::AddingBook(BookForm::new()));
            }
            (KeyCode::Char('e') | KeyCode::Char('E'), Some(book)) => {
                self.clear_status();
                return Ok(Mode::EditingBook {
                    form: BookForm::from_book(&book),
                    book,
                });
            }
            (KeyCode::Char('-') | KeyCode::Delete, Some(book)) => {
                self.clear_status();
                return Ok(Mode::ConfirmDelete(ConfirmDelete::Book {
                    id: book.id(),
                    title: book.title().to_string(),
                }));
            }
            (KeyCode::Char('b') | KeyCode::Char('B'), Some(book)) => {
                let members = fetch_members(&self.conn)?;
                if members.is_empty() {
                    self.set_status("Add a member before lending books.", StatusKind::Error);
                } else {
                    self.clear_status();
                    return Ok(Mode::PickingMember(MemberPicker::new(book, members)));
                }
            }
            (KeyCode::Enter, Some(book)) => {
                self.loans.scope = LoanScope::Book {
                    id: book.id(),
                    title: book.title().to_string(),
                };
                self.switch_screen(Screen::Loans)?;
            }
            (
                KeyCode::Char('e')
                | KeyCode::Char('E')
                | KeyCode::Char('-')
                | KeyCode::Delete
                | KeyCode::Char('b')
                | KeyCode::Char('B')
                | KeyCode::Enter,
                None,
            ) => self.set_status("No book selected.", StatusKind::Error),
            _ => {}
        }
        Ok(Mode::Normal)
    }

    fn handle_members_key(&mut self, code: KeyCode) -> Result<Mode> {
        let selected = self.members.current().cloned();
        match (code, selected) {
            (KeyCode::Char('+'), _) => {
                self.clear_status();
                return Ok(Mode::AddingMember(MemberForm::default()));
            }
            (KeyCode::Char('e') | KeyCode::Char('E'), Some(member)) => {
                self.clear_status();
                return Ok(Mode::EditingMember {
                    form: MemberForm::from_member(&member),
                    member,
                });
            }
            (KeyCode::Char('-') | KeyCode::Delete, Some(member)) => {
                self.clear_status();
                return Ok(Mode::ConfirmDelete(ConfirmDelete::Member {
                    id: member.id(),
                    name: member.name().to_string(),
                }));
            }
            (KeyCode::Enter, Some(member)) => {
                self.loans.scope = LoanScope::Member {
                    id: member.id(),
                    name: member.name().to_string(),
                };
                self.switch_screen(Screen::Loans)?;
            }
            (
                KeyCode::Char('e') | KeyCode::Char('E') | KeyCode::Char('-') | KeyCode::Delete
                | KeyCode::Enter,
                None,
            ) => self.set_status("No member selected.", StatusKind::Error),
            _ => {}
        }
        Ok(Mode::Normal)
    }

    fn handle_loans_key(&mut self, code: KeyCode) -> Result<Mode> {
        let selected = self.loans.loans.current().cloned();
        match (code, selected) {
            (KeyCode::Char('r') | KeyCode::Char('R'), Some(loan)) => {
                match return_book(&mut self.conn, loan.record.id()) {
                    Ok(record) => {
                        self.reload_all()?;
                        self.set_status(
                            format!(
                                "{} returned \"{}\" after {} day(s).",
                                loan.member_name,
                                loan.book_title,
                                record.days_borrowed(today())
                            ),
                            StatusKind::Info,
                        );
                    }
                    Err(err) => {
                        self.report(err.into())?;
                    }
                }
            }
            (KeyCode::Char('-') | KeyCode::Delete, Some(loan)) => {
                self.clear_status();
                return Ok(Mode::ConfirmDelete(ConfirmDelete::Record {
                    id: loan.record.id(),
                    book_title: loan.book_title,
                    member_name: loan.member_name,
                    active: !loan.record.is_returned(),
                }));
            }
            (KeyCode::Char('a') | KeyCode::Char('A'), _) => {
                self.loans.active_only = !self.loans.active_only;
                self.reload_loans()?;
                let message = if self.loans.active_only {
                    "Showing open loans only."
                } else {
                    "Showing open and returned loans."
                };
                self.set_status(message, StatusKind::Info);
            }
            (
                KeyCode::Char('r') | KeyCode::Char('R') | KeyCode::Char('-') | KeyCode::Delete,
                None,
            ) => self.set_status("No loan selected.", StatusKind::Error),
            _ => {}
        }
        Ok(Mode::Normal)
    }

    /// Esc peels back one layer: the search filter first, then a scoped loan
    /// view.
    fn handle_escape(&mut self) -> Result<()> {
        self.clear_status();
        if self.current_filter().is_some() {
            self.set_current_filter(None);
        } else if self.screen == Screen::Loans && self.loans.scope != LoanScope::All {
            self.loans.scope = LoanScope::All;
            self.reload_loans()?;
        }
        Ok(())
    }

    fn handle_book_form(
        &mut self,
        code: KeyCode,
        mut form: BookForm,
        editing: Option<Book>,
    ) -> Result<Mode> {
        let mut keep_open = true;
        match code {
            KeyCode::Esc => {
                self.set_status("Cancelled.", StatusKind::Info);
                keep_open = false;
            }
            KeyCode::Tab | KeyCode::Down => form.next_field(),
            KeyCode::BackTab | KeyCode::Up => form.previous_field(),
            KeyCode::Backspace => form.backspace(),
            KeyCode::Enter => match self.save_book(&form, editing.as_ref()) {
                Ok(()) => keep_open = false,
                Err(err) => form.error = Some(self.report(err)?),
            },
            KeyCode::Char(ch) => {
                if form.push_char(ch) {
                    form.error = None;
                }
            }
            _ => {}
        }

        Ok(match (keep_open, editing) {
            (false, _) => Mode::Normal,
            (true, Some(book)) => Mode::EditingBook { book, form },
            (true, None) => Mode::AddingBook(form),
        })
    }

    fn handle_member_form(
        &mut self,
        code: KeyCode,
        mut form: MemberForm,
        editing: Option<Member>,
    ) -> Result<Mode> {
        let mut keep_open = true;
        match code {
            KeyCode::Esc => {
                self.set_status("Cancelled.", StatusKind::Info);
                keep_open = false;
            }
            KeyCode::Tab | KeyCode::BackTab | KeyCode::Up | KeyCode::Down => form.toggle_field(),
            KeyCode::Backspace => form.backspace(),
            KeyCode::Enter => match self.save_member(&form, editing.as_ref()) {
                Ok(()) => keep_open = false,
                Err(err) => form.error = Some(self.report(err)?),
            },
            KeyCode::Char(ch) => {
                if form.push_char(ch) {
                    form.error = None;
                }
            }
            _ => {}
        }

        Ok(match (keep_open, editing) {
            (false, _) => Mode::Normal,
            (true, Some(member)) => Mode::EditingMember { member, form },
            (true, None) => Mode::AddingMember(form),
        })
    }

    fn handle_confirm_delete(&mut self, code: KeyCode, confirm: ConfirmDelete) -> Result<Mode> {
        match code {
            KeyCode::Esc | KeyCode::Char('n') | KeyCode::Char('N') => {
                self.set_status("Deletion cancelled.", StatusKind::Info);
                Ok(Mode::Normal)
            }
            KeyCode::Enter | KeyCode::Char('y') | KeyCode::Char('Y') => {
                if let Err(err) = self.perform_delete(&confirm) {
                    self.report(err)?;
                }
                Ok(Mode::Normal)
            }
            _ => Ok(Mode::ConfirmDelete(confirm)),
        }
    }

    fn handle_member_picker(&mut self, code: KeyCode, mut picker: MemberPicker) -> Result<Mode> {
        match code {
            KeyCode::Esc => {
                self.set_status("Borrow cancelled.", StatusKind::Info);
                return Ok(Mode::Normal);
            }
            KeyCode::Up => picker.members.move_selection(-1),
            KeyCode::Down => picker.members.move_selection(1),
            KeyCode::PageUp => picker.members.move_selection(-PAGE),
            KeyCode::PageDown => picker.members.move_selection(PAGE),
            KeyCode::Backspace => picker.backspace(),
            KeyCode::Char(ch) if !ch.is_control() => picker.push_char(ch),
            KeyCode::Enter => {
                let Some(member) = picker.members.current().cloned() else {
                    self.set_status("No member matches the search.", StatusKind::Error);
                    return Ok(Mode::PickingMember(picker));
                };
                match borrow_book(&mut self.conn, picker.book.id(), member.id()) {
                    Ok(record) => {
                        self.reload_all()?;
                        self.set_status(
                            format!(
                                "Lent \"{}\" to {} (record #{}).",
                                picker.book.title(),
                                member.name(),
                                record.id()
                            ),
                            StatusKind::Info,
                        );
                    }
                    Err(err) => {
                        self.report(err.into())?;
                        self.reload_all()?;
                    }
                }
                return Ok(Mode::Normal);
            }
            _ => {}
        }
        Ok(Mode::PickingMember(picker))
    }

    fn handle_search(&mut self, code: KeyCode, mut state: SearchState) -> Mode {
        match code {
            KeyCode::Esc => {
                self.set_current_filter(None);
                return Mode::Normal;
            }
            KeyCode::Enter => return Mode::Normal,
            KeyCode::Up => self.move_cursor(-1),
            KeyCode::Down => self.move_cursor(1),
            KeyCode::Backspace => {
                state.query.pop();
                self.set_current_filter(Some(state.query.clone()));
            }
            KeyCode::Char(ch) if !ch.is_control() => {
                state.query.push(ch);
                self.set_current_filter(Some(state.query.clone()));
            }
            _ => {}
        }
        Mode::Searching(state)
    }

    /// Turn an action failure into a footer message and return it. Storage
    /// failures are not the user's to fix, so they end the session instead.
    fn report(&mut self, err: anyhow::Error) -> Result<String> {
        if let Some(lib) = err.downcast_ref::<LibraryError>() {
            if !lib.is_recoverable() {
                error!(error = ?err, "storage failure in terminal UI");
                return Err(err);
            }
        }
        let message = surface_error(&err);
        self.set_status(message.clone(), StatusKind::Error);
        Ok(message)
    }

    fn save_book(&mut self, form: &BookForm, editing: Option<&Book>) -> Result<()> {
        match editing {
            Some(book) => {
                let edited = form.apply_to(book)?;
                revise_book(&mut self.conn, &edited)?;
                self.reload_all()?;
                self.books.select_where(|entry| entry.book.id() == edited.id());
                self.set_status(format!("Updated \"{}\".", edited.title()), StatusKind::Info);
            }
            None => {
                let book = create_book(&self.conn, &form.parse_new()?)?;
                self.reload_books()?;
                self.books.select_where(|entry| entry.book.id() == book.id());
                self.set_status(
                    format!("Added \"{}\" by {}.", book.title(), book.author()),
                    StatusKind::Info,
                );
            }
        }
        Ok(())
    }

    fn save_member(&mut self, form: &MemberForm, editing: Option<&Member>) -> Result<()> {
        let member = match editing {
            Some(member) => {
                let edited = form.apply_to(member)?;
                update_member(&self.conn, &edited)?;
                self.set_status(format!("Updated {}.", edited.name()), StatusKind::Info);
                edited
            }
            None => {
                let member = create_member(&self.conn, &form.parse_new()?)?;
                self.set_status(format!("Added member {}.", member.name()), StatusKind::Info);
                member
            }
        };
        self.reload_members()?;
        self.reload_loans()?;
        self.members.select_where(|m| m.id() == member.id());
        Ok(())
    }

    fn perform_delete(&mut self, confirm: &ConfirmDelete) -> Result<()> {
        let message = match confirm {
            ConfirmDelete::Book { id, title } => {
                remove_book(&mut self.conn, *id)?;
                format!("Deleted \"{title}\".")
            }
            ConfirmDelete::Member { id, name } => {
                remove_member(&mut self.conn, *id)?;
                format!("Deleted member {name}.")
            }
            ConfirmDelete::Record { id, .. } => {
                delete_record(&self.conn, *id)?;
                format!("Deleted borrow record #{id}.")
            }
        };
        self.reload_all()?;
        self.set_status(message, StatusKind::Info);
        Ok(())
    }

    fn switch_screen(&mut self, screen: Screen) -> Result<()> {
        if screen == Screen::Loans {
            self.reload_loans()?;
        }
        self.screen = screen;
        Ok(())
    }

    /// `isize::MIN` and `isize::MAX` jump to the first and last rows.
    fn move_cursor(&mut self, offset: isize) {
        match self.screen {
            Screen::Books => Self::move_in(&mut self.books, offset),
            Screen::Members => Self::move_in(&mut self.members, offset),
            Screen::Loans => Self::move_in(&mut self.loans.loans, offset),
        }
    }

    fn move_in<T: Searchable>(list: &mut FilteredList<T>, offset: isize) {
        match offset {
            isize::MIN => list.select_first(),
            isize::MAX => list.select_last(),
            _ => list.move_selection(offset),
        }
    }

    fn current_filter(&self) -> Option<&str> {
        match self.screen {
            Screen::Books => self.books.filter(),
            Screen::Members => self.members.filter(),
            Screen::Loans => self.loans.loans.filter(),
        }
    }

    fn set_current_filter(&mut self, filter: Option<String>) {
        let filter = filter.filter(|q| !q.trim().is_empty());
        match self.screen {
            Screen::Books => self.books.set_filter(filter),
            Screen::Members => self.members.set_filter(filter),
            Screen::Loans => self.loans.loans.set_filter(filter),
        }
    }

    fn reload_all(&mut self) -> Result<()> {
        self.reload_books()?;
        self.reload_members()?;
        self.reload_loans()
    }

    fn reload_books(&mut self) -> Result<()> {
        self.books.set_items(fetch_book_stock(&self.conn)?);
        Ok(())
    }

    fn reload_members(&mut self) -> Result<()> {
        self.members.set_items(fetch_members(&self.conn)?);
        Ok(())
    }

    fn reload_loans(&mut self) -> Result<()> {
        let filter = self.loans.record_filter();
        self.loans.loans.set_items(fetch_loan_details(&self.conn, &filter)?);
        Ok(())
    }

    fn set_status<S: Into<String>>(&mut self, text: S, kind: StatusKind) {
        self.status = Some(StatusMessage {
            text: text.into(),
            kind,
        });
    }

    fn clear_status(&mut self) {
        self.status = None;
    }

    pub(crate) fn draw(&self, frame: &mut Frame) {
        let area = frame.area();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(HEADER_HEIGHT),
                Constraint::Min(0),
                Constraint::Length(FOOTER_HEIGHT),
            ])
            .split(area);

        self.draw_tabs(frame, chunks[0]);
        match self.screen {
            Screen::Books => self.draw_books(frame, chunks[1]),
            Screen::Members => self.draw_members(frame, chunks[1]),
            Screen::Loans => self.draw_loans(frame, chunks[1]),
        }
        self.draw_footer(frame, chunks[2]);

        match &self.mode {
            Mode::AddingBook(form) => self.draw_book_form(frame, area, "Add Book", form),
            Mode::EditingBook { form, .. } => self.draw_book_form(frame, area, "Edit Book", form),
            Mode::AddingMember(form) => self.draw_member_form(frame, area, "Add Member", form),
            Mode::EditingMember { form, .. } => {
                self.draw_member_form(frame, area, "Edit Member", form)
            }
            Mode::ConfirmDelete(confirm) => self.draw_confirm_delete(frame, area, confirm),
            Mode::PickingMember(picker) => self.draw_member_picker(frame, area, picker),
            Mode::Searching(state) => self.draw_search_bar(frame, chunks[1], state),
            Mode::Normal => {}
        }
    }

    fn draw_tabs(&self, frame: &mut Frame, area: Rect) {
        let titles = [
            format!("1 Books ({})", self.books.total_len()),
            format!("2 Members ({})", self.members.total_len()),
            format!("3 Loans ({})", self.loans.loans.total_len()),
        ];
        let tabs = Tabs::new(titles)
            .block(Block::default().borders(Borders::ALL).title("Library Catalog"))
            .select(self.screen.index())
            .highlight_style(
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            );
        frame.render_widget(tabs, area);
    }

    /// Block title with the active search filter appended.
    fn list_block(title: String, filter: Option<&str>) -> Block<'static> {
        let title = match filter {
            Some(query) => format!("{title} • filter \"{query}\""),
            None => title,
        };
        Block::default().borders(Borders::ALL).title(title)
    }

    fn draw_empty(frame: &mut Frame, area: Rect, block: Block<'static>, message: &str) {
        let paragraph = Paragraph::new(message.to_string())
            .alignment(Alignment::Center)
            .block(block);
        frame.render_widget(paragraph, area);
    }

    fn render_table(
        frame: &mut Frame,
        area: Rect,
        block: Block<'static>,
        header: &[&'static str],
        widths: &[Constraint],
        rows: Vec<Row<'static>>,
        selected: usize,
    ) {
        let header = Row::new(header.iter().copied())
            .style(Style::default().add_modifier(Modifier::BOLD));
        let table = Table::new(rows, widths.iter().copied())
            .header(header)
            .block(block)
            .row_highlight_style(
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol("▶ ");
        let mut state = TableState::default().with_selected(Some(selected));
        frame.render_stateful_widget(table, area, &mut state);
    }

    fn draw_books(&self, frame: &mut Frame, area: Rect) {
        let block = Self::list_block("Books".to_string(), self.books.filter());
        if self.books.visible_len() == 0 {
            let message = if self.books.total_len() == 0 {
                "No books yet. Press '+' to add one."
            } else {
                "No books match the search."
            };
            Self::draw_empty(frame, area, block, message);
            return;
        }

        let rows = self
            .books
            .visible_items()
            .map(|entry| {
                let availability = format!(
                    "{}/{}",
                    entry.available_copies,
                    entry.book.total_copies()
                );
                Row::new(vec![
                    Cell::from(entry.book.id().to_string()),
                    Cell::from(entry.book.title().to_string()),
                    Cell::from(entry.book.author().to_string()),
                    Cell::from(entry.book.isbn().unwrap_or_default().to_string()),
                    Cell::from(entry.on_loan().to_string()),
                    Cell::from(Span::styled(
                        availability,
                        availability_style(entry.available_copies, entry.book.total_copies()),
                    )),
                ])
            })
            .collect();

        Self::render_table(
            frame,
            area,
            block,
            &["ID", "Title", "Author", "ISBN", "On loan", "Available"],
            &[
                Constraint::Length(5),
                Constraint::Percentage(35),
                Constraint::Percentage(25),
                Constraint::Length(14),
                Constraint::Length(8),
                Constraint::Length(10),
            ],
            rows,
            self.books.selected(),
        );
    }

    fn draw_members(&self, frame: &mut Frame, area: Rect) {
        let block = Self::list_block("Members".to_string(), self.members.filter());
        if self.members.visible_len() == 0 {
            let message = if self.members.total_len() == 0 {
                "No members yet. Press '+' to add one."
            } else {
                "No members match the search."
            };
            Self::draw_empty(frame, area, block, message);
            return;
        }

        let rows = self
            .members
            .visible_items()
            .map(|member| {
                Row::new(vec![
                    member.id().to_string(),
                    member.name().to_string(),
                    member.email().to_string(),
                    member.join_date().to_string(),
                ])
            })
            .collect();

        Self::render_table(
            frame,
            area,
            block,
            &["ID", "Name", "Email", "Joined"],
            &[
                Constraint::Length(5),
                Constraint::Percentage(35),
                Constraint::Percentage(45),
                Constraint::Length(12),
            ],
            rows,
            self.members.selected(),
        );
    }

    fn draw_loans(&self, frame: &mut Frame, area: Rect) {
        let block = Self::list_block(self.loans.heading(), self.loans.loans.filter());
        if self.loans.loans.visible_len() == 0 {
            Self::draw_empty(frame, area, block, "No loans to show.");
            return;
        }

        let today = today();
        let rows = self
            .loans
            .loans
            .visible_items()
            .map(|loan| {
                let status = loan.record.status();
                let status_style = match status {
                    LoanStatus::Active => Style::default().fg(Color::Yellow),
                    LoanStatus::Returned => Style::default().fg(Color::DarkGray),
                };
                Row::new(vec![
                    Cell::from(loan.record.id().to_string()),
                    Cell::from(loan.book_title.clone()),
                    Cell::from(loan.member_name.clone()),
                    Cell::from(loan.record.borrow_date().to_string()),
                    Cell::from(
                        loan.record
                            .return_date()
                            .map(|d| d.to_string())
                            .unwrap_or_default(),
                    ),
                    Cell::from(loan.record.days_borrowed(today).to_string()),
                    Cell::from(Span::styled(status.to_string(), status_style)),
                ])
            })
            .collect();

        Self::render_table(
            frame,
            area,
            block,
            &["ID", "Book", "Member", "Borrowed", "Returned", "Days", "Status"],
            &[
                Constraint::Length(5),
                Constraint::Percentage(35),
                Constraint::Percentage(25),
                Constraint::Length(11),
                Constraint::Length(11),
                Constraint::Length(5),
                Constraint::Length(9),
            ],
            rows,
            self.loans.loans.selected(),
        );
    }

    fn draw_footer(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default().borders(Borders::TOP);
        frame.render_widget(block.clone(), area);
        let inner = block.inner(area);

        let status_line = if let Some(status) = &self.status {
            Line::from(vec![Span::styled(status.text.clone(), status.kind.style())])
        } else {
            Line::from("")
        };

        let paragraph = Paragraph::new(vec![status_line, self.footer_instructions()])
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, inner);
    }

    fn footer_instructions(&self) -> Line<'static> {
        let hints: &[(&str, &str)] = match (&self.mode, self.screen) {
            (Mode::AddingBook(_) | Mode::EditingBook { .. }, _)
            | (Mode::AddingMember(_) | Mode::EditingMember { .. }, _) => {
                &[("Enter", "Save"), ("Tab", "Next field"), ("Esc", "Cancel")]
            }
            (Mode::ConfirmDelete(_), _) => &[("Y", "Confirm"), ("N/Esc", "Cancel")],
            (Mode::PickingMember(_), _) => &[
                ("↑↓", "Navigate"),
                ("Type", "Search"),
                ("Enter", "Lend"),
                ("Esc", "Cancel"),
            ],
            (Mode::Searching(_), _) => {
                &[("Enter", "Keep filter"), ("Esc", "Clear"), ("↑↓", "Navigate")]
            }
            (Mode::Normal, Screen::Books) => &[
                ("+", "Add"),
                ("E", "Edit"),
                ("-", "Delete"),
                ("B", "Lend"),
                ("Enter", "Loans"),
                ("F", "Search"),
                ("Tab", "Next tab"),
                ("Q", "Quit"),
            ],
            (Mode::Normal, Screen::Members) => &[
                ("+", "Add"),
                ("E", "Edit"),
                ("-", "Delete"),
                ("Enter", "Loans"),
                ("F", "Search"),
                ("Tab", "Next tab"),
                ("Q", "Quit"),
            ],
            (Mode::Normal, Screen::Loans) => &[
                ("R", "Return"),
                ("-", "Delete record"),
                ("A", "Open only"),
                ("Esc", "All loans"),
                ("F", "Search"),
                ("Tab", "Next tab"),
                ("Q", "Quit"),
            ],
        };
        Line::from(key_hints(hints))
    }

    fn draw_form_popup(
        frame: &mut Frame,
        area: Rect,
        title: &str,
        mut lines: Vec<Line<'static>>,
        error: Option<&str>,
        cursor: (u16, u16),
    ) {
        let popup_area = centered_rect(60, 40, area);
        frame.render_widget(Clear, popup_area);

        let block = Block::default().title(title.to_string()).borders(Borders::ALL);
        frame.render_widget(block.clone(), popup_area);
        let inner = block.inner(popup_area);

        lines.push(Line::from(""));
        match error {
            Some(error) => lines.push(Line::from(Span::styled(
                error.to_string(),
                Style::default().fg(Color::Red),
            ))),
            None => lines.push(Line::from(Span::styled(
                "Enter to save • Tab to switch • Esc to cancel",
                Style::default().fg(Color::Gray),
            ))),
        }

        let paragraph = Paragraph::new(lines).wrap(Wrap { trim: true });
        frame.render_widget(paragraph, inner);
        frame.set_cursor_position((inner.x + cursor.0, inner.y + cursor.1));
    }

    fn draw_book_form(&self, frame: &mut Frame, area: Rect, title: &str, form: &BookForm) {
        let lines = BookField::ALL
            .iter()
            .map(|field| form.build_line(*field))
            .collect();
        Self::draw_form_popup(
            frame,
            area,
            title,
            lines,
            form.error.as_deref(),
            form.cursor_offset(),
        );
    }

    fn draw_member_form(&self, frame: &mut Frame, area: Rect, title: &str, form: &MemberForm) {
        let lines = MemberField::ALL
            .iter()
            .map(|field| form.build_line(*field))
            .collect();
        Self::draw_form_popup(
            frame,
            area,
            title,
            lines,
            form.error.as_deref(),
            form.cursor_offset(),
        );
    }

    fn draw_confirm_delete(&self, frame: &mut Frame, area: Rect, confirm: &ConfirmDelete) {
        let popup_area = centered_rect(60, 30, area);
        frame.render_widget(Clear, popup_area);

        let block = Block::default()
            .title(confirm.title())
            .borders(Borders::ALL);
        frame.render_widget(block.clone(), popup_area);
        let inner = block.inner(popup_area);

        let [question, detail] = confirm.lines();
        let lines = vec![
            Line::from(question),
            Line::from(detail),
            Line::from(""),
            Line::from(Span::styled(
                "Press Y to confirm or N / Esc to cancel.",
                Style::default().fg(Color::Gray),
            )),
        ];

        let paragraph = Paragraph::new(lines)
            .alignment(Alignment::Left)
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, inner);
    }

    fn draw_member_picker(&self, frame: &mut Frame, area: Rect, picker: &MemberPicker) {
        let popup_area = centered_rect(60, 60, area);
        frame.render_widget(Clear, popup_area);

        let block = Block::default()
            .title(format!("Lend \"{}\" to", picker.book.title()))
            .borders(Borders::ALL);
        frame.render_widget(block.clone(), popup_area);
        let inner = block.inner(popup_area);

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(2), Constraint::Min(0)])
            .split(inner);

        let search = Paragraph::new(format!("Search: {}", picker.query));
        frame.render_widget(search, chunks[0]);

        let items: Vec<ListItem> = picker
            .members
            .visible_items()
            .map(|member| ListItem::new(member.to_string()))
            .collect();
        let list = List::new(items)
            .highlight_style(Style::default().fg(Color::Yellow))
            .highlight_symbol("▶ ");
        let mut list_state = ListState::default();
        list_state.select(Some(picker.members.selected()));
        frame.render_stateful_widget(list, chunks[1], &mut list_state);

        let cursor_x = chunks[0].x + "Search: ".len() as u16 + picker.query.chars().count() as u16;
        frame.set_cursor_position((cursor_x, chunks[0].y));
    }

    fn draw_search_bar(&self, frame: &mut Frame, area: Rect, state: &SearchState) {
        let height = 3u16.min(area.height);
        let popup_area = Rect {
            x: area.x,
            y: area.y,
            width: area.width,
            height,
        };
        frame.render_widget(Clear, popup_area);

        let block = Block::default().borders(Borders::ALL).title("Search");
        let paragraph = Paragraph::new(Span::raw(format!("Search: {}", state.query)))
            .block(block.clone())
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, popup_area);

        let inner = block.inner(popup_area);
        let cursor_x = inner.x + "Search: ".len() as u16 + state.query.chars().count() as u16;
        frame.set_cursor_position((cursor_x, inner.y));
    }
}
