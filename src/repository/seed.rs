//! Sample catalog loaded at startup when `seed.sample_data` is set

use chrono::{DateTime, Utc};

use super::Store;
use crate::{error::AppResult, models::NewBook};

/// (title, author, isbn, copies)
pub const SAMPLE_BOOKS: &[(&str, &str, &str, i32)] = &[
    ("Clean Code", "Robert C. Martin", "0132350882", 3),
    ("The Pragmatic Programmer", "Andrew Hunt & David Thomas", "0135957052", 2),
    ("Design Patterns", "Gang of Four", "0201633612", 1),
    ("Refactoring", "Martin Fowler", "0201485672", 2),
    ("Domain-Driven Design", "Eric Evans", "0321125215", 1),
    ("Introduction to Algorithms", "Thomas H. Cormen", "9780262033848", 4),
    ("The Rust Programming Language", "Steve Klabnik & Carol Nichols", "9781718503106", 3),
    ("Structure and Interpretation of Computer Programs", "Harold Abelson", "0262510871", 1),
];

/// Load the sample catalog. Books whose ISBN is already present are skipped.
pub async fn seed_sample_books(store: &dyn Store, now: DateTime<Utc>) -> AppResult<usize> {
    let mut inserted = 0;
    for (title, author, isbn, copies) in SAMPLE_BOOKS {
        if store.find_book_by_isbn(isbn).await?.is_some() {
            continue;
        }
        store
            .insert_book(NewBook {
                title: title.to_string(),
                author: author.to_string(),
                isbn: isbn.to_string(),
                total_copies: *copies,
                created_at: now,
            })
            .await?;
        inserted += 1;
    }
    Ok(inserted)
}
