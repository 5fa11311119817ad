use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use std::path::Path;
use url::Url;

/// Key used when nothing usable can be taken from the source URL.
pub const FALLBACK_KEY: &str = "download";

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// S3's default region, served from the generic `s3.amazonaws.com` host.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Everything except `A-Z a-z 0-9 - _ . ! ~ * ' ( )`, the same set a
/// browser's `encodeURIComponent` escapes.
const KEY_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Derive an object key from the last non-empty path segment of `source_url`.
///
/// Never fails: an unparsable URL or one without a path segment resolves to
/// [`FALLBACK_KEY`]. Runs of whitespace collapse into a single underscore.
pub fn resolve_key(source_url: &str) -> String {
    let Ok(parsed) = Url::parse(source_url) else {
        return FALLBACK_KEY.to_string();
    };

    let base_name = parsed
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(|segment| percent_decode_str(segment).decode_utf8_lossy().into_owned());

    match base_name {
        Some(name) if !name.is_empty() => underscore_whitespace(&name),
        _ => FALLBACK_KEY.to_string(),
    }
}

/// Map a key's extension to a canonical image MIME type.
pub fn guess_content_type(key: &str) -> Option<&'static str> {
    let ext = Path::new(key).extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "svg" => Some("image/svg+xml"),
        _ => None,
    }
}

/// Pick the content type for a stored object.
///
/// Explicit value first, then what the source reported, then the extension
/// table, then [`DEFAULT_CONTENT_TYPE`].
pub fn resolve_content_type(explicit: Option<&str>, fetched: Option<&str>, key: &str) -> String {
    explicit
        .filter(|v| !v.trim().is_empty())
        .or_else(|| fetched.filter(|v| !v.trim().is_empty()))
        .or_else(|| guess_content_type(key))
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string()
}

pub fn storage_uri_of(bucket: &str, key: &str) -> String {
    format!("s3://{}/{}", bucket, key)
}

/// Virtual-hosted public URL for an object. Pure string work, no request is made.
pub fn public_url_of(bucket: &str, key: &str, region: Option<&str>) -> String {
    let encoded = utf8_percent_encode(key, KEY_COMPONENT);
    match region {
        Some(region) if !region.is_empty() && region != DEFAULT_REGION => {
            format!("https://{}.s3.{}.amazonaws.com/{}", bucket, region, encoded)
        }
        _ => format!("https://{}.s3.amazonaws.com/{}", bucket, encoded),
    }
}

fn underscore_whitespace(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_space = false;
    for c in name.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push('_');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }
    out
}
