//! Tree scanning: streaming hasher, parallel walker, snapshot builder.

pub mod hasher;
pub mod snapshot;
pub mod walker;
