//! `Message`: a `NamedList` plus dispatch metadat (spec §3 "Message", §4.1
//! wire codec).
//!
//! Grounded in `engine/Message.cpp`'s `encode`/`decode`/`commonEncode`/
//! `commonDecode`. The wire prefix for a request is `%%>message:`; a reply
//! uses `%%<message:` and substitutes a `received` boolean for the time
//! field (SPEC_FULL §4). Escaping only ever needs to protect `:` — the
//! field separator — plus a literal backslash and raw control bytes, so
//! splitting a decoded line on unescaped `:` is always safe.

use std::any::Any;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::named_list::NamedList;

static NEXT_MESSAGE_ID: AtomicU64 = AtomicU64::new(1);

/// A named parameter set routed through the [`crate::dispatcher::Dispatcher`].
///
/// `Message` derefs to its embedded [`NamedList`] (design note §9: "a
/// concrete `NamedList` value type embedded in `Message`" rather than a
/// virtual inheritance chain), so `msg.get_param("callto")` works directly.
pub struct Message {
    params: NamedList,
    time_us: u64,
    retval: String,
    user_data: Option<Box<dyn Any + Send + Sync>>,
    dispatched: AtomicBool,
    broadcast: bool,
    internal_id: u64,
}

impl Message {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            params: NamedList::new(name),
            time_us: crate::time::unix_time_us(),
            retval: String::new(),
            user_data: None,
            dispatched: AtomicBool::new(false),
            broadcast: false,
            internal_id: NEXT_MESSAGE_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn name(&self) -> &str {
        self.params.kind()
    }

    pub fn time_us(&self) -> u64 {
        self.time_us
    }

    pub fn retval(&self) -> &str {
        &self.retval
    }

    pub fn set_retval(&mut self, retval: impl Into<String>) {
        self.retval = retval.into();
    }

    pub fn broadcast(&self) -> bool {
        self.broadcast
    }

    pub fn set_broadcast(&mut self, broadcast: bool) -> &mut Self {
        self.broadcast = broadcast;
        self
    }

    pub fn set_user_data(&mut self, data: Box<dyn Any + Send + Sync>) {
        self.user_data = Some(data);
    }

    pub fn user_data(&self) -> Option<&(dyn Any + Send + Sync)> {
        self.user_data.as_deref()
    }

    pub fn take_user_data(&mut self) -> Option<Box<dyn Any + Send + Sync>> {
        self.user_data.take()
    }

    pub fn is_dispatched(&self) -> bool {
        self.dispatched.load(Ordering::Acquire)
    }

    pub(crate) fn mark_dispatched(&self) {
        self.dispatched.store(true, Ordering::Release);
    }

    /// Identity used only to detect accidental double-enqueue of a message
    /// that escaped ownership tracking (e.g. via interior mutability); the
    /// common case of moving a `Message` by value already makes a literal
    /// double-enqueue impossible in safe Rust.
    pub(crate) fn internal_id(&self) -> u64 {
        self.internal_id
    }

    /// Encodes a request line: `%%>message:id:sec:name:retval:k=v...`.
    pub fn encode(&self, id: &str) -> String {
        let mut out = String::from("%%>message:");
        out.push_str(&msg_escape(id));
        out.push(':');
        out.push_str(&(self.time_us / 1_000_000).to_string());
        out.push(':');
        self.encode_common(&mut out);
        out
    }

    /// Encodes a reply line: `%%<message:id:received:name:retval:k=v...`.
    pub fn encode_reply(&self, id: &str, received: bool) -> String {
        let mut out = String::from("%%<message:");
        out.push_str(&msg_escape(id));
        out.push(':');
        out.push_str(if received { "true" } else { "false" });
        out.push(':');
        self.encode_common(&mut out);
        out
    }

    fn encode_common(&self, out: &mut String) {
        out.push_str(&msg_escape(self.params.kind()));
        out.push(':');
        out.push_str(&msg_escape(&self.retval));
        for param in self.params.iter() {
            out.push(':');
            out.push_str(&msg_escape(param.name()));
            out.push('=');
            out.push_str(&msg_escape(param.value()));
        }
    }

    /// Decodes a request line, returning the message and the wire id.
    pub fn decode(line: &str) -> Result<(Message, String), DecodeError> {
        let rest = line
            .strip_prefix("%%>message:")
            .ok_or(DecodeError::BadPrefix)?;
        let fields: Vec<&str> = rest.split(':').collect();
        if fields.len() < 4 {
            return Err(DecodeError::Truncated);
        }
        let id = msg_unescape(fields[0])?;
        let sec: u64 = fields[1].parse().map_err(|_| DecodeError::BadTime)?;
        let mut msg = Message::new(msg_unescape(fields[2])?);
        msg.time_us = sec * 1_000_000;
        msg.retval = msg_unescape(fields[3])?;
        for field in &fields[4..] {
            let decoded = msg_unescape(field)?;
            match decoded.find('=') {
                Some(pos) => {
                    let (name, value) = decoded.split_at(pos);
                    msg.params.set_param(name, value[1..].to_owned());
                }
                None => {
                    if !decoded.is_empty() {
                        msg.params.clear_param(decoded);
                    }
                }
            }
        }
        Ok((msg, id))
    }

    /// Decodes a reply line for a request previously sent under `id`.
    pub fn decode_reply(line: &str, id: &str) -> Result<(Message, bool), DecodeError> {
        let prefix = format!("%%<message:{}:", msg_escape(id));
        let rest = line.strip_prefix(&prefix).ok_or(DecodeError::BadPrefix)?;
        let fields: Vec<&str> = rest.split(':').collect();
        if fields.len() < 3 {
            return Err(DecodeError::Truncated);
        }
        let received = fields[0] == "true";
        let mut msg = Message::new(msg_unescape(fields[1])?);
        msg.retval = msg_unescape(fields[2])?;
        for field in &fields[3..] {
            let decoded = msg_unescape(field)?;
            if let Some(pos) = decoded.find('=') {
                let (name, value) = decoded.split_at(pos);
                msg.params.set_param(name, value[1..].to_owned());
            }
        }
        Ok((msg, received))
    }
}

impl Deref for Message {
    type Target = NamedList;
    fn deref(&self) -> &NamedList {
        &self.params
    }
}

impl DerefMut for Message {
    fn deref_mut(&mut self) -> &mut NamedList {
        &mut self.params
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("missing %%>message: / %%<message: prefix")]
    BadPrefix,
    #[error("line has fewer fields than the wire grammar requires")]
    Truncated,
    #[error("time field is not a valid unsigned integer")]
    BadTime,
    #[error("invalid escape sequence at byte offset {0}")]
    BadEscape(usize),
}

/// Escapes `:`, `\`, and control characters so the result can ride
/// unambiguously inside a `:`-delimited wire line. Walks `input` by `char`,
/// not by byte — a multi-byte UTF-8 code point is never one of the
/// characters that needs escaping, so it is always copied through whole.
pub fn msg_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            ':' => out.push_str("\\:"),
            '\\' => out.push_str("\\\\"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\{:02X}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

/// Inverse of [`msg_escape`]. Escape sequences are always ASCII, so the
/// byte-wise scan below is exact; unescaped bytes are decoded back to
/// `char`s through the UTF-8 boundary they started at, so multi-byte input
/// round-trips correctly.
pub fn msg_unescape(input: &str) -> Result<String, DecodeError> {
    let bytes = input.as_bytes();
    let mut out = String::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            if i + 1 >= bytes.len() {
                return Err(DecodeError::BadEscape(i));
            }
            match bytes[i + 1] {
                b':' => {
                    out.push(':');
                    i += 2;
                }
                b'\\' => {
                    out.push('\\');
                    i += 2;
                }
                _ => {
                    if i + 3 > bytes.len() {
                        return Err(DecodeError::BadEscape(i));
                    }
                    let hex = std::str::from_utf8(&bytes[i + 1..i + 3])
                        .map_err(|_| DecodeError::BadEscape(i))?;
                    let value = u8::from_str_radix(hex, 16).map_err(|_| DecodeError::BadEscape(i))?;
                    out.push(value as char);
                    i += 3;
                }
            }
        } else {
            let ch = input[i..].chars().next().unwrap();
            out.push(ch);
            i += ch.len_utf8();
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_unescape_round_trip_is_identity() {
        // Round-trip law (spec §8).
        for sample in ["plain", "a:b", "a\\b", "a:b\\c", "tab\there", ""] {
            let escaped = msg_escape(sample);
            assert_eq!(msg_unescape(&escaped).unwrap(), sample);
        }
    }

    #[test]
    fn escape_unescape_round_trip_preserves_multi_byte_utf8() {
        for sample in ["café", "naïve:résumé", "日本語\\テスト"] {
            let escaped = msg_escape(sample);
            assert_eq!(msg_unescape(&escaped).unwrap(), sample);
        }
    }

    #[test]
    fn wire_round_trip_for_call_route() {
        // Scenario 3 (spec §8), decode-of-encode form.
        let mut msg = Message::new("call.route");
        msg.set_param("caller", "alice:1");
        msg.set_param("called", "bob");
        let encoded = msg.encode("id-7");
        assert!(encoded.starts_with("%%>message:id-7:"));
        assert!(encoded.contains("caller=alice\\:1"));
        let (decoded, id) = Message::decode(&encoded).unwrap();
        assert_eq!(id, "id-7");
        assert_eq!(decoded.name(), "call.route");
        assert_eq!(decoded.get_value("caller", ""), "alice:1");
        assert_eq!(decoded.get_value("called", ""), "bob");
    }

    #[test]
    fn decode_rejects_bad_prefix() {
        assert_eq!(Message::decode("nope").unwrap_err(), DecodeError::BadPrefix);
    }

    #[test]
    fn reply_round_trip() {
        let mut msg = Message::new("call.route");
        msg.set_retval("ok");
        let encoded = msg.encode_reply("id-9", true);
        let (decoded, received) = Message::decode_reply(&encoded, "id-9").unwrap();
        assert!(received);
        assert_eq!(decoded.retval(), "ok");
    }
}
