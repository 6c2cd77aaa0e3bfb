use parcell_core::types::{QueryArgs, QueryValue};

/// Append the query string for `args` to `base`.
pub fn build_url(base: &str, args: &QueryArgs) -> String {
    let mut url = String::from(base);
    url.push_str(&encode_args(args));
    url
}

/// Render `args` as `?k=v&k2=v2`, in insertion order.
///
/// Keys and values are percent-encoded, leaving only `A-Z a-z 0-9 - _ . ~`
/// as is; `!'()*` are escaped too, which servers decode the same way. Keys
/// whose value is [`QueryValue::Absent`] are left out; an empty args map
/// gives `""`.
pub fn encode_args(args: &QueryArgs) -> String {
    let mut query = String::new();
    for (key, value) in args.iter() {
        let QueryValue::Text(value) = value else {
            continue;
        };
        query.push(if query.is_empty() { '?' } else { '&' });
        query.push_str(&urlencoding::encode(key));
        query.push('=');
        query.push_str(&urlencoding::encode(value));
    }
    query
}
