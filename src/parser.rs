use std::io::BufRead;
use std::path::Path;

use tracing::trace;

use crate::error::{Error, ParseError, ParseErrorKind};
use crate::lines::valid_lines;
use crate::model::{EnvMap, SubstitutionMode};
use crate::substitution::substitute;

const EXPORT_PREFIX: &str = "export";
const INLINE_COMMENT: &str = " #";

/// Parse dotenv entries from UTF-8 text.
pub fn parse_str(input: &str) -> Result<EnvMap, Error> {
    parse_str_with_mode(input, SubstitutionMode::Expand)
}

/// Parse dotenv entries from UTF-8 text using a specific substitution mode.
pub fn parse_str_with_mode(input: &str, mode: SubstitutionMode) -> Result<EnvMap, Error> {
    parse_source(input.as_bytes(), mode, None)
}

/// Parse dotenv entries from UTF-8 bytes.
pub fn parse_bytes(input: &[u8]) -> Result<EnvMap, Error> {
    parse_bytes_with_mode(input, SubstitutionMode::Expand)
}

/// Parse dotenv entries from UTF-8 bytes using a specific substitution mode.
pub fn parse_bytes_with_mode(input: &[u8], mode: SubstitutionMode) -> Result<EnvMap, Error> {
    parse_source(input, mode, None)
}

/// Parse dotenv entries from a buffered reader.
pub fn parse_reader<R: BufRead>(reader: R) -> Result<EnvMap, Error> {
    parse_reader_with_mode(reader, SubstitutionMode::Expand)
}

/// Parse dotenv entries from a buffered reader using a specific substitution mode.
pub fn parse_reader_with_mode<R: BufRead>(
    reader: R,
    mode: SubstitutionMode,
) -> Result<EnvMap, Error> {
    parse_source(reader, mode, None)
}

/// Single forward pass: each value only sees keys resolved on earlier lines.
pub(crate) fn parse_source<R: BufRead>(
    reader: R,
    mode: SubstitutionMode,
    path: Option<&Path>,
) -> Result<EnvMap, Error> {
    let mut env_map = EnvMap::new();

    for line in valid_lines(reader) {
        let line = line?;
        let fail = |kind| {
            let err = ParseError::new(line.number, kind);
            match path {
                Some(path) => err.with_path(path),
                None => err,
            }
        };

        let (key, raw_value) = extract_key(&line.text).map_err(fail)?;
        let value = extract_value(raw_value, &env_map, mode).map_err(fail)?;

        trace!(key, line = line.number, "parsed entry");
        env_map.insert(key.to_owned(), value);
    }

    Ok(env_map)
}

/// Split a line at its first unescaped `=` into a key and the raw value region.
fn extract_key(line: &str) -> Result<(&str, &str), ParseErrorKind> {
    let Some(eq_idx) = find_unescaped(line.as_bytes(), b'=') else {
        return Err(ParseErrorKind::MalformedLine);
    };

    let key = strip_export(&line[..eq_idx]).trim();
    if key.is_empty() {
        return Err(ParseErrorKind::EmptyKey);
    }

    Ok((key, line[eq_idx + 1..].trim()))
}

fn strip_export(key: &str) -> &str {
    match key.strip_prefix(EXPORT_PREFIX) {
        Some("") => "",
        Some(rest) if rest.starts_with(char::is_whitespace) => rest.trim_start(),
        _ => key,
    }
}

fn find_unescaped(bytes: &[u8], target: u8) -> Option<usize> {
    (0..bytes.len()).find(|&idx| bytes[idx] == target && (idx == 0 || bytes[idx - 1] != b'\\'))
}

fn extract_value(
    raw: &str,
    resolved: &EnvMap,
    mode: SubstitutionMode,
) -> Result<String, ParseErrorKind> {
    if raw.is_empty() {
        return Ok(String::new());
    }

    let value = match raw.as_bytes()[0] {
        quote @ (b'"' | b'\'') => parse_quoted(raw, quote)?,
        _ => strip_inline_comment(raw).to_owned(),
    };

    match mode {
        SubstitutionMode::Expand => substitute(value, resolved),
        SubstitutionMode::Disabled => Ok(value),
    }
}

/// Take the text between `quote` and its first unescaped match.
///
/// Only `\` followed by the quote character is unescaped; every other
/// backslash sequence is kept verbatim. Only whitespace or a `#` comment
/// may follow the closing quote; any other text means the quote did not
/// end the value.
fn parse_quoted(raw: &str, quote: u8) -> Result<String, ParseErrorKind> {
    let bytes = raw.as_bytes();
    let close = (1..bytes.len())
        .find(|&idx| bytes[idx] == quote && bytes[idx - 1] != b'\\')
        .ok_or(ParseErrorKind::UnterminatedQuote)?;

    let tail = raw[close + 1..].trim_start();
    if !tail.is_empty() && !tail.starts_with('#') {
        return Err(ParseErrorKind::UnterminatedQuote);
    }

    let quote = char::from(quote);
    let escaped = format!("\\{quote}");
    Ok(raw[1..close].replace(&escaped, quote.encode_utf8(&mut [0; 4])))
}

fn strip_inline_comment(raw: &str) -> &str {
    match raw.find(INLINE_COMMENT) {
        Some(idx) => raw[..idx].trim_end(),
        None => raw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_err(input: &str) -> ParseError {
        match parse_str(input).expect_err("expected parse error") {
            Error::Parse(err) => err,
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn parses_plain_values_with_surrounding_whitespace() {
        let map = parse_str("A=1\n  B =  2  \nC=hello world\nD=\n").expect("parse should succeed");

        assert_eq!(map.len(), 4);
        assert_eq!(map["A"], "1");
        assert_eq!(map["B"], "2");
        assert_eq!(map["C"], "hello world");
        assert_eq!(map["D"], "");
    }

    #[test]
    fn unescapes_only_the_matching_quote() {
        let map = parse_str("A=\"a\\\"b\"\nB='a\\'b'\nC=\"\\n\"\nD='a\\\"b'\n")
            .expect("parse should succeed");

        assert_eq!(map["A"], "a\"b");
        assert_eq!(map["B"], "a'b");
        assert_eq!(map["C"], "\\n");
        assert_eq!(map["D"], "a\\\"b");
    }

    #[test]
    fn mixed_quote_characters_are_literal_content() {
        let map = parse_str("CMD=\"echo 'asd'\"\n").expect("parse should succeed");
        assert_eq!(map["CMD"], "echo 'asd'");
    }

    #[test]
    fn strips_inline_comments_only_outside_quotes() {
        let map = parse_str("A=foo #bar\nB=\"foo #bar\"\nC=foo#bar\nD='x' # note\nE=#lead\n")
            .expect("parse should succeed");

        assert_eq!(map["A"], "foo");
        assert_eq!(map["B"], "foo #bar");
        assert_eq!(map["C"], "foo#bar");
        assert_eq!(map["D"], "x");
        assert_eq!(map["E"], "#lead");
    }

    #[test]
    fn empty_quotes_give_empty_value() {
        let map = parse_str("A=\"\"\nB=''\n").expect("parse should succeed");
        assert_eq!(map["A"], "");
        assert_eq!(map["B"], "");
    }

    #[test]
    fn export_prefix_is_stripped() {
        let exported = parse_str("export FOO=bar\n").expect("parse should succeed");
        let plain = parse_str("FOO=bar\n").expect("parse should succeed");
        assert_eq!(exported, plain);

        let tabbed = parse_str("export\tFOO = bar\n").expect("parse should succeed");
        assert_eq!(tabbed["FOO"], "bar");
    }

    #[test]
    fn export_needs_whitespace_to_be_a_prefix() {
        let map = parse_str("exporter=1\nEXPORT_X=2\n").expect("parse should succeed");
        assert_eq!(map["exporter"], "1");
        assert_eq!(map["EXPORT_X"], "2");
    }

    #[test]
    fn bare_export_key_is_empty() {
        assert_eq!(parse_err("export=1\n").kind, ParseErrorKind::EmptyKey);
    }

    #[test]
    fn duplicate_keys_keep_last() {
        let map = parse_str("A=1\nA=2\n").expect("parse should succeed");
        assert_eq!(map.len(), 1);
        assert_eq!(map["A"], "2");
    }

    #[test]
    fn skips_escaped_separator_in_key() {
        let map = parse_str("A\\=B=c\n").expect("parse should succeed");
        assert_eq!(map["A\\=B"], "c");
    }

    #[test]
    fn value_keeps_later_separators() {
        let map = parse_str("URL=postgres://u:p@host/db?x=1\n").expect("parse should succeed");
        assert_eq!(map["URL"], "postgres://u:p@host/db?x=1");
    }

    #[test]
    fn reports_missing_separator() {
        let err = parse_err("A=1\nKEYVALUE\n");
        assert_eq!(err.kind, ParseErrorKind::MalformedLine);
        assert_eq!(err.line, 2);
    }

    #[test]
    fn reports_empty_key() {
        assert_eq!(parse_err("  = value\n").kind, ParseErrorKind::EmptyKey);
    }

    #[test]
    fn reports_unterminated_quote() {
        assert_eq!(parse_err("KEY=\"abc\n").kind, ParseErrorKind::UnterminatedQuote);
        assert_eq!(parse_err("KEY='abc\\'\n").kind, ParseErrorKind::UnterminatedQuote);
    }

    #[test]
    fn text_after_closing_quote_leaves_value_unterminated() {
        assert_eq!(parse_err("KEY=\"abc\" def\n").kind, ParseErrorKind::UnterminatedQuote);
        assert_eq!(parse_err("A=1\nKEY='abc'def\n").line, 2);
        assert_eq!(parse_err("KEY='abc'def\n").kind, ParseErrorKind::UnterminatedQuote);

        let map = parse_str("KEY=\"abc\"   # note\n").expect("parse should succeed");
        assert_eq!(map["KEY"], "abc");
    }

    #[test]
    fn substitutes_earlier_keys() {
        let input = "HELLO=hello\nWORLD=world\nMSG=${HELLO} ${WORLD}\nMSG2=$HELLO $WORLD\n\
                     MSG3=\"$HELLO ${WORLD}\"\nMSG4='$HELLO ${HELLO} $WORLD ${WORLD}'\n";
        let map = parse_str(input).expect("parse should succeed");

        assert_eq!(map["MSG"], "hello world");
        assert_eq!(map["MSG2"], "hello world");
        assert_eq!(map["MSG3"], "hello world");
        assert_eq!(map["MSG4"], "hello hello world world");
    }

    #[test]
    fn forward_references_stay_literal() {
        let map = parse_str("A=${B}\nB=x\nC=$B\n").expect("parse should succeed");
        assert_eq!(map["A"], "${B}");
        assert_eq!(map["B"], "x");
        assert_eq!(map["C"], "x");
    }

    #[test]
    fn substitution_uses_value_as_of_the_referencing_line() {
        let map = parse_str("A=1\nB=$A\nA=2\nC=$A\n").expect("parse should succeed");
        assert_eq!(map["B"], "1");
        assert_eq!(map["C"], "2");
    }

    #[test]
    fn substitution_runs_after_comment_stripping() {
        let map = parse_str("HASH=#\nA=$HASH tail\nB=x #$HASH\n").expect("parse should succeed");
        assert_eq!(map["A"], "# tail");
        assert_eq!(map["B"], "x");
    }

    #[test]
    fn disabled_substitution_keeps_tokens() {
        let map = parse_str_with_mode("A=1\nB=${A}$A\n", SubstitutionMode::Disabled)
            .expect("parse should succeed");
        assert_eq!(map["B"], "${A}$A");
    }

    #[test]
    fn reports_invalid_substitution() {
        let err = parse_err("HELLO=hello\nMSG=${HELLO\n");
        assert_eq!(err.kind, ParseErrorKind::InvalidSubstitution);
        assert_eq!(err.line, 2);
    }

    #[test]
    fn parses_unicode_values() {
        let map = parse_str("GREETING=こんにちは\n").expect("parse should succeed");
        assert_eq!(map["GREETING"], "こんにちは");
    }

    #[test]
    fn parse_reader_matches_parse_str() {
        let input = "A=1\nB=$A\n";
        let from_reader = parse_reader(std::io::Cursor::new(input)).expect("parse should succeed");
        assert_eq!(from_reader, parse_str(input).expect("parse should succeed"));
        assert_eq!(
            parse_bytes(input.as_bytes()).expect("parse should succeed"),
            from_reader
        );
    }

    #[test]
    fn attaches_path_to_parse_errors() {
        let err = parse_source(
            "BROKEN\n".as_bytes(),
            SubstitutionMode::Expand,
            Some(Path::new("app.env")),
        )
        .expect_err("expected parse error");

        match err {
            Error::Parse(err) => assert_eq!(err.path.as_deref(), Some(Path::new("app.env"))),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
