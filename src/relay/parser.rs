//! Response Parser
//!
//! Turns the raw text posted back by the peer into ordered content segments.
//! The peer appends attached screenshots after [`IMAGE_MARKER`] as inline
//! `data:image/<subtype>;base64,<payload>` URLs.

use crate::models::Segment;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use regex::Regex;
use std::sync::OnceLock;

/// Marker the peer inserts between the typed text and attached images.
pub const IMAGE_MARKER: &str = "[图片已附加]";

/// Sentinel returned for an empty answer.
pub const SESSION_ENDED: &str = "Session ended by user.";

const INSTRUCTIONS_PREFIX: &str = "User instructions:\n\n";
const TRAILING_INSTRUCTION: &str = "\n\nExecute the instructions. Call io again when done.";

/// Standard alphabet, tolerating non-zero bits in the final symbol.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_allow_trailing_bits(true),
);

fn image_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"data:image/([^;\s]+);base64,([A-Za-z0-9+/]+={0,2})").expect("image pattern is valid")
    })
}

/// Split a raw answer into segments. Pure and deterministic.
pub fn parse(raw: &str) -> Vec<Segment> {
    if raw.trim().is_empty() {
        return vec![Segment::text(SESSION_ENDED)];
    }

    let Some((text, images)) = raw.split_once(IMAGE_MARKER) else {
        return vec![Segment::text(raw)];
    };

    let mut segments = Vec::new();

    let text = text.trim();
    if !text.is_empty() {
        segments.push(Segment::text(format!("{}{}", INSTRUCTIONS_PREFIX, text)));
    }

    segments.extend(parse_images(images));
    segments.push(Segment::text(TRAILING_INSTRUCTION));
    segments
}

/// Extract image segments from the portion after the marker.
///
/// Stray text between images is kept as text, minus any repeated marker. A
/// match whose payload is not valid base64 degrades to a text segment holding
/// the matched span verbatim.
fn parse_images(portion: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut last_end = 0;

    for captures in image_pattern().captures_iter(portion) {
        let Some(whole) = captures.get(0) else {
            continue;
        };

        push_text(&mut segments, &portion[last_end..whole.start()]);
        last_end = whole.end();

        let subtype = &captures[1];
        let payload = &captures[2];
        if LENIENT_BASE64.decode(payload).is_ok() {
            segments.push(Segment::image(subtype, payload));
        } else {
            log::debug!("Invalid base64 payload for image/{}, keeping as text", subtype);
            segments.push(Segment::text(whole.as_str()));
        }
    }

    push_text(&mut segments, &portion[last_end..]);
    segments
}

fn push_text(segments: &mut Vec<Segment>, text: &str) {
    let text = text.replace(IMAGE_MARKER, "");
    let text = text.trim();
    if !text.is_empty() {
        segments.push(Segment::text(text));
    }
}
