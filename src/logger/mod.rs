//! Activity logging.

pub mod jsonl;
