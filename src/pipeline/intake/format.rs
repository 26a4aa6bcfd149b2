//! Payload type sniffing from leading bytes, and upload filename cleanup.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// What a payload's bytes say it is, independent of any declared mime type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    Pdf,
    Image,
    Text,
    Json,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sniffed {
    pub mime: &'static str,
    pub kind: PayloadKind,
}

impl Sniffed {
    const fn new(mime: &'static str, kind: PayloadKind) -> Self {
        Self { mime, kind }
    }
}

/// (offset, signature, result)
const SIGNATURES: &[(usize, &[u8], Sniffed)] = &[
    (0, b"%PDF", Sniffed::new("application/pdf", PayloadKind::Pdf)),
    (0, &[0xFF, 0xD8, 0xFF], Sniffed::new("image/jpeg", PayloadKind::Image)),
    (0, b"\x89PNG", Sniffed::new("image/png", PayloadKind::Image)),
    (0, b"II*\x00", Sniffed::new("image/tiff", PayloadKind::Image)),
    (0, b"MM\x00*", Sniffed::new("image/tiff", PayloadKind::Image)),
    (4, b"ftyp", Sniffed::new("image/heic", PayloadKind::Image)),
];

const TEXT_SAMPLE: usize = 4096;

/// Identify a payload by its bytes. Mime hints from the sender are never consulted.
pub fn sniff_format(bytes: &[u8]) -> Sniffed {
    let signature = SIGNATURES.iter().find(|(offset, magic, _)| {
        bytes
            .get(*offset..offset + magic.len())
            .is_some_and(|window| window == *magic)
    });
    if let Some((_, _, sniffed)) = signature {
        return *sniffed;
    }

    match sample_text(bytes) {
        Some(text) if text.trim_start().starts_with('{') => Sniffed::new("application/json", PayloadKind::Json),
        Some(_) => Sniffed::new("text/plain", PayloadKind::Text),
        None => Sniffed::new("application/octet-stream", PayloadKind::Unknown),
    }
}

/// The leading sample as text, when it is UTF-8 and overwhelmingly printable.
fn sample_text(bytes: &[u8]) -> Option<&str> {
    let sample = &bytes[..bytes.len().min(TEXT_SAMPLE)];
    let text = match std::str::from_utf8(sample) {
        Ok(text) => text,
        // The cut may land inside a multi-byte character.
        Err(e) if e.error_len().is_none() && e.valid_up_to() > 0 => {
            std::str::from_utf8(&sample[..e.valid_up_to()]).ok()?
        }
        Err(_) => return None,
    };
    if text.is_empty() {
        return None;
    }

    let (chars, printable) = text.chars().fold((0usize, 0usize), |(chars, printable), c| {
        let ok = c.is_whitespace() || !c.is_control();
        (chars + 1, printable + usize::from(ok))
    });
    (printable * 5 > chars * 4).then_some(text)
}

/// Keep only the final path component of a sender-supplied filename.
pub fn sanitize_filename(original: &str) -> String {
    let base = Path::new(original)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default();

    let clean: String = base
        .chars()
        .filter(|c| !c.is_control() && *c != '/' && *c != '\\')
        .take(255)
        .collect();

    match clean.trim() {
        "" => "quote".to_string(),
        trimmed => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn images_are_recognized_by_signature() {
        assert_eq!(sniff_format(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00]).mime, "image/jpeg");
        assert_eq!(sniff_format(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A]).mime, "image/png");
        assert_eq!(sniff_format(b"II*\x00\x08").mime, "image/tiff");
        assert_eq!(sniff_format(b"MM\x00*\x00").mime, "image/tiff");
        assert_eq!(sniff_format(b"\x00\x00\x00\x18ftypheic\x00\x00\x00\x00").mime, "image/heic");
        assert_eq!(sniff_format(&[0xFF, 0xD8, 0xFF]).kind, PayloadKind::Image);
    }

    #[test]
    fn pdf_header() {
        assert_eq!(sniff_format(b"%PDF-1.7\n...").kind, PayloadKind::Pdf);
    }

    #[test]
    fn text_and_json_bodies() {
        assert_eq!(sniff_format(b"Total: $1,250.00, completion in 3 days").kind, PayloadKind::Text);
        assert_eq!(sniff_format(b"  {\"total_amount\": 10}").kind, PayloadKind::Json);
    }

    #[test]
    fn split_multibyte_at_sample_edge_is_still_text() {
        let mut body = "a".repeat(TEXT_SAMPLE - 1).into_bytes();
        body.extend_from_slice("€ deck".as_bytes());
        assert_eq!(sniff_format(&body).kind, PayloadKind::Text);
    }

    #[test]
    fn binary_and_empty_are_unknown() {
        assert_eq!(sniff_format(&[0x00, 0x01, 0x02, 0x03, 0xFE, 0xFF, 0x10, 0x11]).kind, PayloadKind::Unknown);
        assert_eq!(sniff_format(&[]).kind, PayloadKind::Unknown);
    }

    #[test]
    fn filenames_lose_directories() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("roof quote.pdf"), "roof quote.pdf");
        assert_eq!(sanitize_filename(""), "quote");
        assert_eq!(sanitize_filename("/tmp/"), "tmp");
    }
}
