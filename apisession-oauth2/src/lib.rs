//! apisession OAuth2 - token endpoint client
//!
//! Implements the `TokenProvider` contract over HTTP for authorization
//! servers that follow RFC 6749 token requests and responses.

pub mod client;
pub mod response;

pub use client::TokenEndpointClient;
pub use response::{parse_error_response, parse_token_response, EXPIRES_TIMESTAMP_THRESHOLD};
