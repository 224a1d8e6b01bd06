use crate::error::ParseErrorKind;
use crate::model::EnvMap;

/// Replace `${KEY}` and `$KEY` tokens for every key already in `resolved`.
///
/// Keys are visited longest-first so `$HELLO_WORLD` is consumed before
/// `$HELLO` gets a chance to match its prefix. Each key is visited once;
/// unknown names stay in the value as literal text.
pub(crate) fn substitute(value: String, resolved: &EnvMap) -> Result<String, ParseErrorKind> {
    if resolved.is_empty() || !value.contains('$') {
        return Ok(value);
    }

    let mut keys: Vec<&str> = resolved.keys().map(String::as_str).collect();
    keys.sort_unstable_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

    let mut out = value;
    for key in keys {
        let replacement = &resolved[key];
        check_braced(&out, key)?;
        out = replace_token(out, &format!("${{{key}}}"), replacement);
        out = replace_token(out, &format!("${key}"), replacement);
    }

    Ok(out)
}

/// Fail on `${KEY` that is neither closed by `}` nor part of a longer name.
fn check_braced(value: &str, key: &str) -> Result<(), ParseErrorKind> {
    let open = format!("${{{key}");
    let bytes = value.as_bytes();

    for (idx, _) in value.match_indices(&open) {
        match bytes.get(idx + open.len()) {
            Some(b'}') => {}
            Some(byte) if is_name_byte(*byte) => {}
            _ => return Err(ParseErrorKind::InvalidSubstitution),
        }
    }

    Ok(())
}

fn replace_token(mut haystack: String, token: &str, replacement: &str) -> String {
    if !haystack.contains(token) {
        return haystack;
    }
    if replacement.contains(token) {
        return haystack.replace(token, replacement);
    }

    // A replacement can splice a fresh token together at its edges.
    let mut passes = haystack.len();
    while passes > 0 && haystack.contains(token) {
        haystack = haystack.replace(token, replacement);
        passes -= 1;
    }
    haystack
}

fn is_name_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}
