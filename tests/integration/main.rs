//! Integration tests for the Jobline server.

mod helpers;

mod api_test;
mod queue_test;
