//! Pure helpers with no I/O.

mod retry;

pub use retry::retry_delay;
