use hyper::HeaderMap;

/// Copies every header from the inbound request into the outbound one.
///
/// The first value for a key replaces whatever the client library may have
/// pre-set on the target map; further values for the same key are appended,
/// so multi-valued headers survive with their per-key order intact. Keys and
/// values are cloned, never shared: mutating one map cannot affect the other.
pub fn copy_request_headers(src: &HeaderMap, dst: &mut HeaderMap) {
    for key in src.keys() {
        let mut values = src.get_all(key).iter();
        if let Some(first) = values.next() {
            dst.insert(key.clone(), first.clone());
        }
        for value in values {
            dst.append(key.clone(), value.clone());
        }
    }
}

/// Copies every header from the origin response into the client-facing one.
///
/// Append semantics throughout: each value is added, not overwritten, so
/// repeated keys such as `Set-Cookie` all reach the client.
pub fn copy_response_headers(src: &HeaderMap, dst: &mut HeaderMap) {
    for (key, value) in src {
        dst.append(key.clone(), value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::{HeaderName, HeaderValue};

    fn header_map(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (key, value) in pairs {
            map.append(
                HeaderName::from_static(key),
                HeaderValue::from_static(value),
            );
        }
        map
    }

    #[test]
    fn test_request_copy_preserves_multiple_values_in_order() {
        let src = header_map(&[("x-test", "a"), ("x-test", "b"), ("accept", "*/*")]);
        let mut dst = HeaderMap::new();

        copy_request_headers(&src, &mut dst);

        let values: Vec<_> = dst.get_all("x-test").iter().collect();
        assert_eq!(values, vec!["a", "b"]);
        assert_eq!(dst.get("accept").unwrap(), "*/*");
        assert_eq!(dst.len(), 3);
    }

    #[test]
    fn test_request_copy_overwrites_preset_defaults() {
        let src = header_map(&[("user-agent", "curl/8.0")]);
        let mut dst = header_map(&[("user-agent", "hyper-default")]);

        copy_request_headers(&src, &mut dst);

        let values: Vec<_> = dst.get_all("user-agent").iter().collect();
        assert_eq!(values, vec!["curl/8.0"]);
    }

    #[test]
    fn test_response_copy_appends_repeated_keys() {
        let src = header_map(&[("set-cookie", "a=1"), ("set-cookie", "b=2")]);
        let mut dst = HeaderMap::new();

        copy_response_headers(&src, &mut dst);

        let values: Vec<_> = dst.get_all("set-cookie").iter().collect();
        assert_eq!(values, vec!["a=1", "b=2"]);
    }

    #[test]
    fn test_copies_do_not_alias() {
        let src = header_map(&[("x-test", "a")]);
        let mut dst = HeaderMap::new();

        copy_request_headers(&src, &mut dst);
        dst.insert(
            HeaderName::from_static("x-test"),
            HeaderValue::from_static("changed"),
        );

        assert_eq!(src.get("x-test").unwrap(), "a");
    }
}
