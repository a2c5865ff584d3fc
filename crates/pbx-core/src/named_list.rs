//! Ordered name→string mapping, the universal message payload container
//! (spec §3 "NamedList", §4.1).
//!
//! Grounded in `engine/NamedList.cpp`: `setParam` rewrites the first
//! matching entry in place, `clearParam` removes every matching entry, and
//! `getParam` returns the first match. Duplicate names are legal and
//! iteration order is insertion order.

use std::any::Any;
use std::fmt;

/// One (name, value) entry. `value` may carry an attached owned payload —
/// spec's "binary blobs and endpoint pointers ride inside messages" — that
/// only the holder can address via [`NamedString::payload`]/`take_payload`.
pub struct NamedString {
    name: String,
    value: String,
    payload: Option<Box<dyn Any + Send + Sync>>,
}

impl NamedString {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            payload: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn set_value(&mut self, value: impl Into<String>) {
        self.value = value.into();
    }

    pub fn attach_payload(&mut self, payload: Box<dyn Any + Send + Sync>) {
        self.payload = Some(payload);
    }

    pub fn payload(&self) -> Option<&(dyn Any + Send + Sync)> {
        self.payload.as_deref()
    }

    /// Detaches the payload, transferring ownership to the caller. The
    /// message payload lock (§5 "Shared-resource policy") is the caller's
    /// own synchronization around the `NamedList` that owns this entry.
    pub fn take_payload(&mut self) -> Option<Box<dyn Any + Send + Sync>> {
        self.payload.take()
    }
}

impl fmt::Debug for NamedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedString")
            .field("name", &self.name)
            .field("value", &self.value)
            .field("has_payload", &self.payload.is_some())
            .finish()
    }
}

impl Clone for NamedString {
    fn clone(&self) -> Self {
        // Attached payloads are not `Clone`-able in general; cloning a
        // NamedList (e.g. for a broadcast snapshot) drops them rather than
        // trying to duplicate arbitrary `dyn Any` state.
        Self {
            name: self.name.clone(),
            value: self.value.clone(),
            payload: None,
        }
    }
}

/// Ordered sequence of [`NamedString`] pairs plus the list's own "kind"
/// name (for a `Message`, the message name).
#[derive(Clone, Debug, Default)]
pub struct NamedList {
    kind: String,
    params: Vec<NamedString>,
}

impl NamedList {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            params: Vec::new(),
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn set_kind(&mut self, kind: impl Into<String>) {
        self.kind = kind.into();
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Appends a parameter unconditionally, even if `name` already exists —
    /// this is how duplicate names accumulate.
    pub fn add_param(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.params.push(NamedString::new(name, value));
        self
    }

    pub fn add_named(&mut self, param: NamedString) -> &mut Self {
        self.params.push(param);
        self
    }

    /// Updates the first entry named `name` in place, or appends a new one.
    pub fn set_param(&mut self, name: impl AsRef<str>, value: impl Into<String>) -> &mut Self {
        let name = name.as_ref();
        if let Some(existing) = self.params.iter_mut().find(|p| p.name == name) {
            existing.set_value(value);
        } else {
            self.params.push(NamedString::new(name, value));
        }
        self
    }

    /// Removes every entry named `name`.
    pub fn clear_param(&mut self, name: impl AsRef<str>) -> &mut Self {
        let name = name.as_ref();
        self.params.retain(|p| p.name != name);
        self
    }

    pub fn get_param(&self, name: impl AsRef<str>) -> Option<&NamedString> {
        let name = name.as_ref();
        self.params.iter().find(|p| p.name == name)
    }

    pub fn get_param_mut(&mut self, name: impl AsRef<str>) -> Option<&mut NamedString> {
        let name = name.as_ref();
        self.params.iter_mut().find(|p| p.name == name)
    }

    pub fn get_param_at(&self, index: usize) -> Option<&NamedString> {
        self.params.get(index)
    }

    pub fn get_value<'a>(&'a self, name: impl AsRef<str>, default: &'a str) -> &'a str {
        self.get_param(name).map(NamedString::value).unwrap_or(default)
    }

    pub fn get_int_value(&self, name: impl AsRef<str>, default: i64) -> i64 {
        self.get_param(name)
            .and_then(|p| p.value().trim().parse::<i64>().ok())
            .unwrap_or(default)
    }

    /// Strict boolean parser accepting `true`/`yes`/`1`/`enable` (case
    /// insensitive) as true and `false`/`no`/`0`/`disable` as false; any
    /// other value falls back to `default`, matching §9's "uniform
    /// default-on-missing policy" guidance extended to malformed values.
    pub fn get_bool_value(&self, name: impl AsRef<str>, default: bool) -> bool {
        match self.get_param(name).map(|p| p.value().to_ascii_lowercase()) {
            Some(v) if matches!(v.as_str(), "true" | "yes" | "1" | "enable") => true,
            Some(v) if matches!(v.as_str(), "false" | "no" | "0" | "disable") => false,
            _ => default,
        }
    }

    /// Copies the named parameters from `src` into `self`, skipping ones
    /// absent from `src`.
    pub fn copy_params(&mut self, src: &NamedList, names: &[&str]) -> &mut Self {
        for &name in names {
            if let Some(p) = src.get_param(name) {
                self.set_param(name, p.value().to_owned());
            }
        }
        self
    }

    /// Substitutes `${name}` occurrences in `template` with the escaped
    /// value of the matching parameter (empty string if absent); `$$` is a
    /// literal dollar sign.
    pub fn replace_params(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let bytes = template.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'$' {
                if template[i..].starts_with("$$") {
                    out.push('$');
                    i += 2;
                    continue;
                }
                if template[i..].starts_with("${") {
                    if let Some(end) = template[i + 2..].find('}') {
                        let name = &template[i + 2..i + 2 + end];
                        let value = self.get_value(name, "");
                        out.push_str(&crate::message::msg_escape(value));
                        i += 2 + end + 1;
                        continue;
                    }
                }
            }
            let ch = template[i..].chars().next().unwrap();
            out.push(ch);
            i += ch.len_utf8();
        }
        out
    }

    pub fn iter(&self) -> impl Iterator<Item = &NamedString> {
        self.params.iter()
    }
}
