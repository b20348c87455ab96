//! E2E test scenarios
//!
//! Nested calls, value transfers and their recovery, delegate calls,
//! read-only queries and signature checks, run through the full
//! transaction lifecycle.
