// Aggregator for Minimed integration tests located in `tests/minimed/`.

#[path = "minimed/message_test.rs"]
mod message_test;

#[path = "minimed/session_test.rs"]
mod session_test;
