//! Outgoing message composition
//!
//! Builds single-part `text/plain` RFC 822 messages and encodes them as
//! base64url, the form Gmail's `raw` field expects. Header values are
//! checked for line breaks so caller input cannot inject extra headers.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use chrono::Utc;

use crate::errors::{AppError, AppResult};
use crate::models::ComposeInput;

/// Maximum line length for a 7bit body (RFC 5322 §2.1.1)
const MAX_7BIT_LINE: usize = 998;
/// Raw bytes per RFC 2047 encoded word, keeping each word under 75 chars
const ENCODED_WORD_BYTES: usize = 45;
/// Base64 body line width
const BASE64_LINE: usize = 76;

/// Compose a message and return it base64url-encoded
///
/// # Errors
///
/// Returns `InvalidInput` if `to` is empty or any header value contains a
/// line break.
pub fn encode_raw_message(input: &ComposeInput) -> AppResult<String> {
    let message = compose_message(input)?;
    Ok(URL_SAFE.encode(message.as_bytes()))
}

/// Compose the RFC 822 text of a plain-text message
pub fn compose_message(input: &ComposeInput) -> AppResult<String> {
    if input.to.trim().is_empty() {
        return Err(AppError::invalid("to must not be empty"));
    }
    validate_header_value(&input.to, "to")?;
    validate_header_value(&input.cc, "cc")?;
    validate_header_value(&input.bcc, "bcc")?;
    validate_header_value(&input.subject, "subject")?;

    let mut out = String::new();
    push_header(&mut out, "To", input.to.trim());
    if !input.cc.trim().is_empty() {
        push_header(&mut out, "Cc", input.cc.trim());
    }
    if !input.bcc.trim().is_empty() {
        push_header(&mut out, "Bcc", input.bcc.trim());
    }
    push_header(&mut out, "Subject", &encode_subject(&input.subject));
    push_header(&mut out, "Date", &Utc::now().to_rfc2822());
    push_header(&mut out, "MIME-Version", "1.0");

    let body = normalize_newlines(&input.body);
    if is_7bit_safe(&body) {
        push_header(&mut out, "Content-Type", "text/plain; charset=\"us-ascii\"");
        push_header(&mut out, "Content-Transfer-Encoding", "7bit");
        out.push_str("\r\n");
        out.push_str(&body);
    } else {
        push_header(&mut out, "Content-Type", "text/plain; charset=\"utf-8\"");
        push_header(&mut out, "Content-Transfer-Encoding", "base64");
        out.push_str("\r\n");
        out.push_str(&wrap_base64(&STANDARD.encode(body.as_bytes())));
    }
    if !out.ends_with("\r\n") {
        out.push_str("\r\n");
    }
    Ok(out)
}

fn push_header(out: &mut String, name: &str, value: &str) {
    out.push_str(name);
    out.push_str(": ");
    out.push_str(value);
    out.push_str("\r\n");
}

/// Reject CR/LF (and other controls except tab) in a header value
fn validate_header_value(value: &str, field: &str) -> AppResult<()> {
    if value.chars().any(|ch| ch.is_control() && ch != '\t') {
        return Err(AppError::InvalidInput(format!(
            "{field} must not contain line breaks or control characters"
        )));
    }
    Ok(())
}

/// Encode a non-ASCII subject as folded RFC 2047 `B` encoded words
fn encode_subject(subject: &str) -> String {
    if subject.is_ascii() {
        return subject.to_owned();
    }

    let mut words = Vec::new();
    let mut chunk = String::new();
    for ch in subject.chars() {
        if chunk.len() + ch.len_utf8() > ENCODED_WORD_BYTES && !chunk.is_empty() {
            words.push(format!("=?utf-8?b?{}?=", STANDARD.encode(chunk.as_bytes())));
            chunk.clear();
        }
        chunk.push(ch);
    }
    if !chunk.is_empty() {
        words.push(format!("=?utf-8?b?{}?=", STANDARD.encode(chunk.as_bytes())));
    }
    words.join("\r\n ")
}

fn normalize_newlines(body: &str) -> String {
    body.replace("\r\n", "\n").replace('\r', "\n").replace('\n', "\r\n")
}

fn is_7bit_safe(body: &str) -> bool {
    body.is_ascii() && body.split("\r\n").all(|line| line.len() <= MAX_7BIT_LINE)
}

fn wrap_base64(encoded: &str) -> String {
    let mut out = String::with_capacity(encoded.len() + encoded.len() / BASE64_LINE * 2 + 2);
    for (i, ch) in encoded.chars().enumerate() {
        if i > 0 && i % BASE64_LINE == 0 {
            out.push_str("\r\n");
        }
        out.push(ch);
    }
    out
}
