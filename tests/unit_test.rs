//! Grouped unit tests.

mod unit;
