use crate::db::RecordFilter;
use crate::models::{Book, BookStock, LoanDetails, LoanStatus, Member};

/// Rows that can be narrowed down by the inline search.
pub(crate) trait Searchable {
    /// `query` is already lower-cased and trimmed.
    fn matches(&self, query: &str) -> bool;
}

impl Searchable for BookStock {
    fn matches(&self, query: &str) -> bool {
        self.book.title().to_lowercase().contains(query)
            || self.book.author().to_lowercase().contains(query)
            || self.book.isbn().is_some_and(|isbn| isbn.to_lowercase().contains(query))
    }
}

impl Searchable for Member {
    fn matches(&self, query: &str) -> bool {
        self.name().to_lowercase().contains(query) || self.email().contains(query)
    }
}

impl Searchable for LoanDetails {
    fn matches(&self, query: &str) -> bool {
        self.book_title.to_lowercase().contains(query)
            || self.member_name.to_lowercase().contains(query)
    }
}

/// A list with an optional search filter and a selection cursor that always
/// points at a visible row (or 0 when nothing is visible).
pub(crate) struct FilteredList<T> {
    items: Vec<T>,
    visible: Vec<usize>,
    filter: Option<String>,
    selected: usize,
}

impl<T: Searchable> FilteredList<T> {
    pub(crate) fn new(items: Vec<T>) -> Self {
        let mut list = Self {
            items,
            visible: Vec::new(),
            filter: None,
            selected: 0,
        };
        list.apply_filter();
        list
    }

    fn apply_filter(&mut self) {
        let query = self
            .filter
            .as_deref()
            .map(|q| q.trim().to_lowercase())
            .filter(|q| !q.is_empty());
        self.visible = self
            .items
            .iter()
            .enumerate()
            .filter(|(_, item)| query.as_deref().map_or(true, |q| item.matches(q)))
            .map(|(idx, _)| idx)
            .collect();
        self.ensure_in_bounds();
    }

    fn ensure_in_bounds(&mut self) {
        if self.visible.is_empty() {
            self.selected = 0;
        } else if self.selected >= self.visible.len() {
            self.selected = self.visible.len() - 1;
        }
    }

    /// Replace the rows, keeping the filter.
    pub(crate) fn set_items(&mut self, items: Vec<T>) {
        self.items = items;
        self.apply_filter();
    }

    pub(crate) fn set_filter(&mut self, filter: Option<String>) {
        self.filter = filter;
        self.apply_filter();
    }

    pub(crate) fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    pub(crate) fn current(&self) -> Option<&T> {
        self.visible.get(self.selected).map(|&idx| &self.items[idx])
    }

    pub(crate) fn visible_items(&self) -> impl Iterator<Item = &T> {
        self.visible.iter().map(|&idx| &self.items[idx])
    }

    pub(crate) fn selected(&self) -> usize {
        self.selected
    }

    pub(crate) fn visible_len(&self) -> usize {
        self.visible.len()
    }

    pub(crate) fn total_len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn move_selection(&mut self, offset: isize) {
        if self.visible.is_empty() {
            return;
        }
        let last = self.visible.len() as isize - 1;
        self.selected = (self.selected as isize + offset).clamp(0, last) as usize;
    }

    pub(crate) fn select_first(&mut self) {
        self.selected = 0;
    }

    pub(crate) fn select_last(&mut self) {
        self.selected = self.visible.len().saturating_sub(1);
    }

    /// Move the cursor to the first visible row matching `predicate`, if any.
    pub(crate) fn select_where(&mut self, predicate: impl Fn(&T) -> bool) -> bool {
        match self
            .visible
            .iter()
            .position(|&idx| predicate(&self.items[idx]))
        {
            Some(pos) => {
                self.selected = pos;
                true
            }
            None => false,
        }
    }
}

/// Which borrow records the Loans screen shows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum LoanScope {
    All,
    Book { id: i64, title: String },
    Member { id: i64, name: String },
}

/// State for the Loans screen: the rows plus the scope and status toggle
/// used to query them.
pub(crate) struct LoanScreen {
    pub(crate) loans: FilteredList<LoanDetails>,
    pub(crate) scope: LoanScope,
    pub(crate) active_only: bool,
}

impl LoanScreen {
    pub(crate) fn new() -> Self {
        Self {
            loans: FilteredList::new(Vec::new()),
            scope: LoanScope::All,
            active_only: false,
        }
    }

    pub(crate) fn record_filter(&self) -> RecordFilter {
        let mut filter = RecordFilter {
            status: self.active_only.then_some(LoanStatus::Active),
            ..RecordFilter::default()
        };
        match &self.scope {
            LoanScope::All => {}
            LoanScope::Book { id, .. } => filter.book_id = Some(*id),
            LoanScope::Member { id, .. } => filter.member_id = Some(*id),
        }
        filter
    }

    pub(crate) fn heading(&self) -> String {
        let scope = match &self.scope {
            LoanScope::All => "All loans".to_string(),
            LoanScope::Book { title, .. } => format!("Loans of \"{title}\""),
            LoanScope::Member { name, .. } => format!("Loans by {name}"),
        };
        if self.active_only {
            format!("{scope} (open only)")
        } else {
            scope
        }
    }
}

/// Member chooser opened when lending a book.
pub(crate) struct MemberPicker {
    pub(crate) book: Book,
    pub(crate) members: FilteredList<Member>,
    pub(crate) query: String,
}

impl MemberPicker {
    pub(crate) fn new(book: Book, members: Vec<Member>) -> Self {
        Self {
            book,
            members: FilteredList::new(members),
            query: String::new(),
        }
    }

    pub(crate) fn push_char(&mut self, ch: char) {
        self.query.push(ch);
        self.members.set_filter(Some(self.query.clone()));
    }

    pub(crate) fn backspace(&mut self) {
        self.query.pop();
        self.members.set_filter(Some(self.query.clone()));
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::models::BorrowRecord;

    fn member(id: i64, name: &str) -> Member {
        Member::from_row(
            id,
            name.to_string(),
            format!("{}@example.com", name.to_lowercase()),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        )
    }

    #[test]
    fn filter_keeps_selection_on_a_visible_row() {
        let mut list = FilteredList::new(vec![member(1, "Alice"), member(2, "Bob"), member(3, "Alina")]);
        list.select_last();
        assert_eq!(list.current().map(Member::id), Some(3));

        list.set_filter(Some("  AL ".into()));
        assert_eq!(list.visible_len(), 2);
        assert_eq!(list.total_len(), 3);
        assert_eq!(list.current().map(Member::id), Some(3));

        list.set_filter(Some("bob".into()));
        assert_eq!(list.selected(), 0);
        assert_eq!(list.current().map(Member::id), Some(2));

        list.set_filter(Some("zed".into()));
        assert!(list.current().is_none());
        list.move_selection(1);
        assert_eq!(list.selected(), 0);
    }

    #[test]
    fn selection_is_clamped() {
        let mut list = FilteredList::new(vec![member(1, "A"), member(2, "B")]);
        list.move_selection(-5);
        assert_eq!(list.selected(), 0);
        list.move_selection(10);
        assert_eq!(list.selected(), 1);
        assert!(list.select_where(|m| m.id() == 1));
        assert_eq!(list.selected(), 0);
        assert!(!list.select_where(|m| m.id() == 9));
    }

    #[test]
    fn loan_scope_drives_the_record_filter() {
        let mut screen = LoanScreen::new();
        screen.scope = LoanScope::Member {
            id: 4,
            name: "Alice".into(),
        };
        screen.active_only = true;
        let filter = screen.record_filter();
        assert_eq!(filter.member_id, Some(4));
        assert_eq!(filter.book_id, None);
        assert_eq!(filter.status, Some(LoanStatus::Active));
        assert_eq!(screen.heading(), "Loans by Alice (open only)");
    }

    #[test]
    fn loans_match_on_book_or_member() {
        let loan = LoanDetails {
            record: BorrowRecord::from_row(1, 1, 1, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), None),
            book_title: "Dune".into(),
            member_name: "Alice".into(),
        };
        assert!(loan.matches("dun"));
        assert!(loan.matches("ali"));
        assert!(!loan.matches("bob"));
    }

    #[test]
    fn picker_filters_as_you_type() {
        let book = Book::from_row(1, "Dune".into(), "Herbert".into(), 1, None);
        let mut picker = MemberPicker::new(book, vec![member(1, "Alice"), member(2, "Bob")]);
        picker.push_char('b');
        assert_eq!(picker.members.visible_len(), 1);
        picker.backspace();
        assert_eq!(picker.members.visible_len(), 2);
    }
}
