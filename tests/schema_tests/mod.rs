//! Tests for ArraySchema: validation, lookups, orderings and persistence

mod order_tests;
mod schema_tests;
