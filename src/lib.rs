//! Root crate for the taskfab workspace. Carries no library code of its own;
//! real functionality lives in `crates/taskfab-*`. This crate exists to host
//! the end-to-end test suite under `tests/`.
