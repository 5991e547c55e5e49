//! Data models for the library server

pub mod book;
pub mod borrow;
pub mod pagination;

// Re-export commonly used types
pub use book::{Book, BookPage, NewBook};
pub use borrow::{BorrowDetails, BorrowFilter, BorrowPage, BorrowRecord, BorrowStatus, NewBorrowRecord};
pub use pagination::{PageRequest, Pagination};
