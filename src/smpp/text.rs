//! DCS-driven text encodings for outgoing message payloads.
//!
//! The configured data-coding selector maps to an encoding the same way the
//! protocol does: 0 is the GSM 7-bit default alphabet (packed), 3 is
//! Latin-1, 4 is binary passthrough, 8 is UCS-2, anything else is sent as
//! raw bytes.

/// Encode `text` for the given data-coding selector.
pub fn encode(dcs: u8, text: &str) -> Vec<u8> {
    match dcs {
        0 => gsm7_packed(text),
        3 => latin1(text),
        4 => text.as_bytes().to_vec(),
        8 => ucs2(text),
        _ => text.as_bytes().to_vec(),
    }
}

/// Encode as UCS-2 (UTF-16 big-endian). Characters outside the BMP expand
/// to surrogate pairs, which most SMSCs pass through.
pub fn ucs2(text: &str) -> Vec<u8> {
    text.encode_utf16().flat_map(u16::to_be_bytes).collect()
}

/// Decode a UCS-2 payload back to text.
pub fn ucs2_decode(payload: &[u8]) -> Result<String, std::char::DecodeUtf16Error> {
    let units: Vec<u16> = payload
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    char::decode_utf16(units).collect()
}

/// Encode as ISO-8859-1; unrepresentable characters become `?`.
pub fn latin1(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| if (c as u32) <= 0xFF { c as u8 } else { b'?' })
        .collect()
}

/// Map to GSM 7-bit septets and pack them eight-per-seven-bytes.
pub fn gsm7_packed(text: &str) -> Vec<u8> {
    pack_septets(&gsm7_septets(text))
}

enum Gsm7 {
    Basic(u8),
    Extended(u8),
    Unsupported,
}

// GSM 03.38 default alphabet. Characters with no mapping (including the
// extension-table escape itself) degrade to '?'.
fn gsm7_lookup(c: char) -> Gsm7 {
    use Gsm7::*;
    match c {
        '@' => Basic(0x00),
        '£' => Basic(0x01),
        '$' => Basic(0x02),
        '¥' => Basic(0x03),
        'è' => Basic(0x04),
        'é' => Basic(0x05),
        'ù' => Basic(0x06),
        'ì' => Basic(0x07),
        'ò' => Basic(0x08),
        'Ç' => Basic(0x09),
        '\n' => Basic(0x0A),
        'Ø' => Basic(0x0B),
        'ø' => Basic(0x0C),
        '\r' => Basic(0x0D),
        'Å' => Basic(0x0E),
        'å' => Basic(0x0F),
        '_' => Basic(0x11),
        'Æ' => Basic(0x1C),
        'æ' => Basic(0x1D),
        'ß' => Basic(0x1E),
        'É' => Basic(0x1F),
        '¤' => Basic(0x24),
        '¡' => Basic(0x40),
        'Ä' => Basic(0x5B),
        'Ö' => Basic(0x5C),
        'Ñ' => Basic(0x5D),
        'Ü' => Basic(0x5E),
        '§' => Basic(0x5F),
        '¿' => Basic(0x60),
        'ä' => Basic(0x7B),
        'ö' => Basic(0x7C),
        'ñ' => Basic(0x7D),
        'ü' => Basic(0x7E),
        'à' => Basic(0x7F),
        '^' => Extended(0x14),
        '{' => Extended(0x28),
        '}' => Extended(0x29),
        '\\' => Extended(0x2F),
        '[' => Extended(0x3C),
        '~' => Extended(0x3D),
        ']' => Extended(0x3E),
        '|' => Extended(0x40),
        '€' => Extended(0x65),
        ' '..='#' | '%'..='?' | 'A'..='Z' | 'a'..='z' => Basic(c as u8),
        _ => Unsupported,
    }
}

fn gsm7_septets(text: &str) -> Vec<u8> {
    let mut septets = Vec::with_capacity(text.len());
    for c in text.chars() {
        match gsm7_lookup(c) {
            Gsm7::Basic(v) => septets.push(v),
            Gsm7::Extended(v) => {
                septets.push(0x1B);
                septets.push(v);
            }
            Gsm7::Unsupported => septets.push(0x3F),
        }
    }
    septets
}

fn pack_septets(septets: &[u8]) -> Vec<u8> {
    if septets.is_empty() {
        return Vec::new();
    }
    if septets.len() == 1 {
        return vec![septets[0] << 1];
    }
    let mut out = Vec::with_capacity(septets.len());
    let mut shift = 1u32;
    let mut i = 0;
    while i < septets.len() - 1 {
        out.push((septets[i] & 0x7F) << shift | (septets[i + 1] & 0x7F) >> (7 - shift));
        shift += 1;
        if shift == 8 {
            i += 1;
            shift = 1;
        }
        i += 1;
    }
    if shift != 1 {
        out.push(septets[septets.len() - 1] << shift);
    }
    out
}
