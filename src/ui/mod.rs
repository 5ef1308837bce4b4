//! Ratatui front-end: three tabs (books, members, loans) over the lending
//! core, with modal forms, a member picker and delete confirmations layered
//! on top.

mod app;
mod forms;
mod helpers;
mod screens;
mod terminal;

pub use app::App;
pub use terminal::run_app;
