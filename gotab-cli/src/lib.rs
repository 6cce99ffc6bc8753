//! Library surface of the gotab CLI: the command tasks and their shared
//! option handling, kept separate from the binary for integration testing.

pub mod commands;
