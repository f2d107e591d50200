//! Behavioural suites for the dispatch service and daemon.

mod support;
