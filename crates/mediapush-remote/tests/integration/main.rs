//! Integration tests for mediapush-remote
//!
//! Uses wiremock to simulate the content store and the OAuth token endpoint
//! and verifies the wire protocol of both transfer phases, the HTTP error
//! mapping and the refresh grant.

mod common;

mod test_commit;
mod test_refresh;
mod test_upload;
