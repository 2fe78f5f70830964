//! Honeyfile decoys: planted lure files whose modification is a strong
//! intrusion signal.

pub mod manager;
