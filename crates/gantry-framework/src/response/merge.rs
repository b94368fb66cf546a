//! Cookie and header merging shared by the response strategies.

use gantry_core::{Cookie, HeaderValues, ResponseHeaders};

/// Merges two cookie lists.
///
/// Every `local` cookie is kept. An `other` cookie is appended only when no
/// cookie with its key is present yet. Descriptions are dropped.
pub fn merge_cookies(local: &[Cookie], other: &[Cookie]) -> Vec<Cookie> {
    let mut merged: Vec<Cookie> = local.iter().map(strip_description).collect();
    for cookie in other {
        if !merged.iter().any(|c| c.key == cookie.key) {
            merged.push(strip_description(cookie));
        }
    }
    merged
}

fn strip_description(cookie: &Cookie) -> Cookie {
    Cookie {
        description: None,
        ..cookie.clone()
    }
}

/// Projects header declarations down to their values.
pub fn get_headers(headers: &ResponseHeaders) -> HeaderValues {
    headers
        .iter()
        .map(|(name, header)| (name.clone(), header.value.clone()))
        .collect()
}

/// Merges header maps; later maps override earlier ones by name.
pub fn merge_headers<'a>(sources: impl IntoIterator<Item = &'a HeaderValues>) -> HeaderValues {
    let mut merged = HeaderValues::new();
    for source in sources {
        merged.extend(source.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    merged
}
