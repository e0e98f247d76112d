//! Response bodies of the query API
//!
//! - `GET /get/{id}` returns [`EntriesResponse`]
//! - `GET /find?messageId=...` returns [`FindResponse`]
//! - errors come back as [`ErrorResponse`] with a matching status code

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::ledger::{LoggedEntry, MessageMatch};

#[derive(Debug, Serialize)]
pub struct EntriesResponse {
    pub id: String,
    pub entries: Vec<LoggedEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindQuery {
    pub message_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FindResponse {
    pub message_id: String,
    pub entries: Vec<MessageMatch>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: BTreeMap<String, String>,
    pub version: String,
}
