pub mod clean;
pub mod list;
pub mod schedule;
pub mod undo;
pub mod worker;
