//! Integration tests, compiled as a single test binary.

mod mock_source;
mod poll_loop;
mod scenarios;
