//! Reporting sink: classified scan events written as append-only JSONL by a
//! dedicated thread, with graceful degradation.

pub mod jsonl;
pub mod sink;
