//! Word document extraction.
//!
//! A .docx is a zip container; the body lives in `word/document.xml`. We
//! locate that entry through the zip central directory, inflate it, and keep
//! the `<w:t>` text runs with one line per `<w:p>` paragraph. Legacy binary
//! `.doc` files are routed here too and fail with a parse error.

use std::io::Read;
use std::path::Path;
use std::sync::LazyLock;

use flate2::read::DeflateDecoder;
use regex::Regex;

use super::sanitize::sanitize_extracted_text;
use super::types::ExtractionStrategy;
use super::ExtractionError;

const BODY_ENTRY: &str = "word/document.xml";

const EOCD_SIGNATURE: u32 = 0x0605_4b50;
const CENTRAL_SIGNATURE: u32 = 0x0201_4b50;
const LOCAL_SIGNATURE: u32 = 0x0403_4b50;
const EOCD_MIN_LEN: usize = 22;

const METHOD_STORED: u16 = 0;
const METHOD_DEFLATE: u16 = 8;

/// Text runs, paragraph ends and explicit breaks, in document order.
static BODY_TOKENS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<w:t(?:\s[^>]*)?>([^<]*)</w:t>|</w:p>|<w:br\s*/>|<w:tab\s*/>")
        .unwrap_or_else(|e| panic!("invalid docx token regex: {e}"))
});

pub struct DocxStrategy;

impl ExtractionStrategy for DocxStrategy {
    fn name(&self) -> &'static str {
        "docx"
    }

    fn type_keys(&self) -> &'static [&'static str] {
        &["docx", "doc"]
    }

    fn extract_text(&self, path: &Path) -> Result<String, ExtractionError> {
        let archive = std::fs::read(path)?;
        let xml = read_zip_entry(&archive, BODY_ENTRY)?;
        let xml = String::from_utf8(xml).map_err(|e| ExtractionError::Encoding(e.to_string()))?;
        Ok(sanitize_extracted_text(&body_text(&xml)))
    }
}

/// Flatten WordprocessingML into plain text.
fn body_text(xml: &str) -> String {
    let mut out = String::with_capacity(xml.len() / 4);
    for token in BODY_TOKENS.captures_iter(xml) {
        match token.get(1) {
            Some(run) => out.push_str(&unescape_xml(run.as_str())),
            None if token[0].starts_with("<w:tab") => out.push('\t'),
            None => out.push('\n'),
        }
    }
    out
}

fn unescape_xml(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

// ═══════════════════════════════════════════════════════════
// Zip container
// ═══════════════════════════════════════════════════════════

fn read_zip_entry(archive: &[u8], wanted: &str) -> Result<Vec<u8>, ExtractionError> {
    let eocd = find_eocd(archive)?;
    let entry_count = read_u16(archive, eocd + 10)? as usize;
    let mut cursor = read_u32(archive, eocd + 16)? as usize;

    for _ in 0..entry_count {
        if read_u32(archive, cursor)? != CENTRAL_SIGNATURE {
            return Err(corrupt("bad central directory entry"));
        }
        let method = read_u16(archive, cursor + 10)?;
        let compressed_size = read_u32(archive, cursor + 20)? as usize;
        let uncompressed_size = read_u32(archive, cursor + 24)? as usize;
        let name_len = read_u16(archive, cursor + 28)? as usize;
        let extra_len = read_u16(archive, cursor + 30)? as usize;
        let comment_len = read_u16(archive, cursor + 32)? as usize;
        let local_offset = read_u32(archive, cursor + 42)? as usize;
        let name = slice(archive, cursor + 46, name_len)?;

        if name == wanted.as_bytes() {
            let data = local_data(archive, local_offset, compressed_size)?;
            return decompress(data, method, uncompressed_size);
        }
        cursor += 46 + name_len + extra_len + comment_len;
    }

    Err(ExtractionError::DocxParsing(format!("missing {wanted}")))
}

fn find_eocd(archive: &[u8]) -> Result<usize, ExtractionError> {
    if archive.len() < EOCD_MIN_LEN {
        return Err(corrupt("not a zip archive"));
    }
    (0..=archive.len() - EOCD_MIN_LEN)
        .rev()
        .find(|&pos| read_u32(archive, pos).ok() == Some(EOCD_SIGNATURE))
        .ok_or_else(|| corrupt("not a zip archive"))
}

fn local_data(archive: &[u8], offset: usize, len: usize) -> Result<&[u8], ExtractionError> {
    if read_u32(archive, offset)? != LOCAL_SIGNATURE {
        return Err(corrupt("bad local file header"));
    }
    let name_len = read_u16(archive, offset + 26)? as usize;
    let extra_len = read_u16(archive, offset + 28)? as usize;
    slice(archive, offset + 30 + name_len + extra_len, len)
}

fn decompress(data: &[u8], method: u16, size_hint: usize) -> Result<Vec<u8>, ExtractionError> {
    match method {
        METHOD_STORED => Ok(data.to_vec()),
        METHOD_DEFLATE => {
            // Header sizes are untrusted; cap the preallocation.
            let mut out = Vec::with_capacity(size_hint.min(data.len().saturating_mul(8)));
            DeflateDecoder::new(data)
                .read_to_end(&mut out)
                .map_err(|e| ExtractionError::DocxParsing(format!("inflate failed: {e}")))?;
            Ok(out)
        }
        other => Err(ExtractionError::DocxParsing(format!(
            "unsupported compression method {other}"
        ))),
    }
}

fn slice(buf: &[u8], offset: usize, len: usize) -> Result<&[u8], ExtractionError> {
    offset
        .checked_add(len)
        .and_then(|end| buf.get(offset..end))
        .ok_or_else(|| corrupt("truncated archive"))
}

fn read_u16(buf: &[u8], offset: usize) -> Result<u16, ExtractionError> {
    let b = slice(buf, offset, 2)?;
    Ok(u16::from_le_bytes([b[0], b[1]]))
}

fn read_u32(buf: &[u8], offset: usize) -> Result<u32, ExtractionError> {
    let b = slice(buf, offset, 4)?;
    Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

fn corrupt(what: &str) -> ExtractionError {
    ExtractionError::DocxParsing(what.to_string())
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
