//! Conversion between `http::HeaderMap` and envelope [`Headers`].
//!
//! Header values are bytes, not text. Each byte is carried as one `char`
//! (latin-1), so obs-text such as a raw UTF-8 filename survives the JSON
//! envelope and comes back out byte for byte.

use std::collections::btree_map::Entry;

use axum::http::{HeaderMap, HeaderName, HeaderValue};

use crate::ipc::envelope::{HeaderValues, Headers};

/// Collect a header map into envelope form, grouping repeated names.
pub fn from_header_map(map: &HeaderMap) -> Headers {
    let mut headers = Headers::new();
    for (name, value) in map {
        let value = latin1_decode(value.as_bytes());
        match headers.entry(name.as_str().to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(HeaderValues::Single(value));
            }
            Entry::Occupied(mut slot) => slot.get_mut().push(value),
        }
    }
    headers
}

fn latin1_decode(bytes: &[u8]) -> String {
    bytes.iter().copied().map(char::from).collect()
}

/// `None` if any char is outside latin-1.
fn latin1_encode(value: &str) -> Option<Vec<u8>> {
    value.chars().map(|c| u8::try_from(c).ok()).collect()
}

/// Build a header map from envelope headers, leaving out `skip` names.
pub fn to_header_map(headers: &Headers, skip: &[HeaderName]) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, values) in headers {
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
            tracing::debug!(header = %name, "Skipping invalid header name");
            continue;
        };
        if skip.contains(&name) {
            continue;
        }
        for value in values.as_slice() {
            let Some(bytes) = latin1_encode(value) else {
                tracing::debug!(header = %name, "Skipping header value outside latin-1");
                continue;
            };
            match HeaderValue::from_bytes(&bytes) {
                Ok(value) => {
                    map.append(name.clone(), value);
                }
                Err(_) => tracing::debug!(header = %name, "Skipping invalid header value"),
            }
        }
    }
    map
}
