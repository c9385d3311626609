//! Character-set resolution for buffered HTTP bodies.
//!
//! Precedence: byte order mark, `Content-Type` charset parameter, a
//! `<meta>` prescan of the first KiB, then UTF-8 when the body validates
//! and windows-1252 otherwise.

use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, UTF_8, WINDOWS_1252};

const PRESCAN_LIMIT: usize = 1024;

pub fn resolve_encoding(body: &[u8], content_type: Option<&str>) -> &'static Encoding {
    if let Some((enc, _)) = Encoding::for_bom(body) {
        return enc;
    }
    if let Some(enc) = content_type
        .and_then(charset_param)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
    {
        return enc;
    }
    if let Some(enc) = prescan_meta(body) {
        return enc;
    }
    if std::str::from_utf8(body).is_ok() {
        UTF_8
    } else {
        WINDOWS_1252
    }
}

fn charset_param(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|part| {
        let (name, value) = part.split_once('=')?;
        if !name.trim().eq_ignore_ascii_case("charset") {
            return None;
        }
        let label = value.trim().trim_matches(|c| c == '"' || c == '\'');
        (!label.is_empty()).then_some(label)
    })
}

fn prescan_meta(body: &[u8]) -> Option<&'static Encoding> {
    let prefix = String::from_utf8_lossy(&body[..body.len().min(PRESCAN_LIMIT)]);
    let lower = prefix.to_ascii_lowercase();

    let mut from = 0;
    while let Some(rel) = lower[from..].find("<meta") {
        let start = from + rel;
        let end = lower[start..].find('>').map_or(lower.len(), |e| start + e);
        let tag = &lower[start..end];
        if let Some(pos) = tag.find("charset=") {
            if let Some(enc) = charset_label(&tag[pos + "charset=".len()..])
                .and_then(|label| Encoding::for_label(label.as_bytes()))
            {
                // A document cannot declare itself UTF-16 from inside ASCII markup.
                return Some(if enc == UTF_16LE || enc == UTF_16BE {
                    UTF_8
                } else {
                    enc
                });
            }
        }
        from = end;
    }
    None
}

fn charset_label(input: &str) -> Option<&str> {
    let trimmed = input.trim_start();
    let trimmed = trimmed.trim_start_matches(|c| c == '"' || c == '\'');
    let end = trimmed
        .find(|c: char| c.is_whitespace() || matches!(c, '"' | '\'' | ';' | '>' | '/'))
        .unwrap_or(trimmed.len());
    let label = &trimmed[..end];
    (!label.is_empty()).then_some(label)
}
