//! Canonical signing strings.
//!
//! The gateway signs `key1=value1&key2=value2&...` where keys are sorted in
//! byte-wise ascending order and fields with an empty value are left out.
//! Values are used verbatim: no escaping, no URL encoding.

use std::collections::BTreeMap;

use crate::types::{FIELD_SIGN, FIELD_SIGN_TYPE};

/// Notification format variant.
///
/// Life-channel notifications keep `sign_type` in their signing string;
/// every other notification drops it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotificationKind {
    #[default]
    Standard,
    LifeChannel,
}

/// Build the canonical string for a set of fields.
///
/// Keys are expected to be unique. Ordering of the input is irrelevant.
pub fn canonicalize<K, V>(fields: impl IntoIterator<Item = (K, V)>) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut pairs: Vec<(K, V)> = fields
        .into_iter()
        .filter(|(_, value)| !value.as_ref().is_empty())
        .collect();
    pairs.sort_by(|a, b| a.0.as_ref().as_bytes().cmp(b.0.as_ref().as_bytes()));

    let mut out = String::new();
    for (i, (key, value)) in pairs.iter().enumerate() {
        if i > 0 {
            out.push('&');
        }
        out.push_str(key.as_ref());
        out.push('=');
        out.push_str(value.as_ref());
    }
    out
}

/// Build the signing string of an inbound notification.
///
/// `fields` must already be URL-decoded. `sign` is always excluded;
/// `sign_type` is excluded unless the notification is a life-channel one.
pub fn notification_sign_content(
    fields: &BTreeMap<String, String>,
    kind: NotificationKind,
) -> String {
    canonicalize(fields.iter().filter(|(key, _)| {
        let key = key.as_str();
        key != FIELD_SIGN && (kind == NotificationKind::LifeChannel || key != FIELD_SIGN_TYPE)
    }))
}
