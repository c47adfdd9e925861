//! Cross-module scenarios: record through a `LogSession`, replay through a
//! `ReplayReader`, and check what reached the disk.

mod close_tests;
mod harness;
