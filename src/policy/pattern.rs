/// Matches a request path against a rule's object pattern.
///
/// A pattern without `*` must equal the path. Otherwise everything before the
/// first `*` is a prefix the path must start with, and the rest of the
/// pattern is ignored. So `/dataset1/*` covers `/dataset1/a/b` but not
/// `/dataset10/a`, and `/data*` covers both.
pub fn key_match(path: &str, pattern: &str) -> bool {
    match pattern.find('*') {
        None => path == pattern,
        Some(star) => path.starts_with(&pattern[..star]),
    }
}
