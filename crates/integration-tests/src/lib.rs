//! Cross-crate tests live under `tests/`; shared fixtures are in
//! `tests/support`.
