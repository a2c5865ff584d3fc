//! Sectioned config-file loader, read-only after load (spec §2
//! "Configuration", §6 "Config files").
//!
//! UTF-8, `[section]` headers, `key=value` lines, `;`/`#` comments. Order
//! within a section is preserved; a given key may repeat (later lines
//! overwrite, matching `NamedList::set_param`'s in-place update semantics,
//! since each section is itself backed by a [`NamedList`]).

use crate::named_list::NamedList;

#[derive(Debug, Clone, Default)]
pub struct Config {
    sections: Vec<NamedList>,
}

impl Config {
    pub fn parse(input: &str) -> Self {
        let mut sections: Vec<NamedList> = Vec::new();
        let mut current: Option<NamedList> = None;

        for raw_line in input.lines() {
            let line = strip_comment(raw_line).trim();
            if line.is_empty() {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
                if let Some(section) = current.take() {
                    sections.push(section);
                }
                current = Some(NamedList::new(name.trim()));
                continue;
            }
            if let Some(pos) = line.find('=') {
                let key = line[..pos].trim();
                let value = line[pos + 1..].trim();
                if key.is_empty() {
                    continue;
                }
                match current.as_mut() {
                    Some(section) => {
                        section.set_param(key, value);
                    }
                    None => {
                        // a `key=value` before any `[section]` header is
                        // dropped rather than panicking; malformed config
                        // is an operator error, not a crash.
                    }
                }
            }
        }
        if let Some(section) = current.take() {
            sections.push(section);
        }
        Self { sections }
    }

    pub fn section(&self, name: &str) -> Option<&NamedList> {
        self.sections.iter().find(|s| s.kind() == name)
    }

    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.iter().map(NamedList::kind)
    }

    /// Expands `${name}` references in every value of `section` against
    /// `runtime`, the engine's live parameter set (spec §6).
    pub fn expand_section(&self, name: &str, runtime: &NamedList) -> Option<NamedList> {
        let section = self.section(name)?;
        let mut expanded = NamedList::new(section.kind());
        for param in section.iter() {
            expanded.set_param(param.name(), runtime.replace_params(param.value()));
        }
        Some(expanded)
    }
}

fn strip_comment(line: &str) -> &str {
    for (idx, ch) in line.char_indices() {
        if ch == ';' || ch == '#' {
            return &line[..idx];
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sections_and_preserves_order() {
        let input = "\
[general]
; a comment
workers=4 # inline
name=demo

[sip]
port=5060
";
        let cfg = Config::parse(input);
        assert_eq!(cfg.section_names().collect::<Vec<_>>(), vec!["general", "sip"]);
        let general = cfg.section("general").unwrap();
        assert_eq!(general.get_value("workers", ""), "4");
        assert_eq!(general.get_value("name", ""), "demo");
        assert_eq!(cfg.section("sip").unwrap().get_value("port", ""), "5060");
    }

    #[test]
    fn later_key_wins_within_a_section() {
        let cfg = Config::parse("[general]\nworkers=4\nworkers=8\n");
        assert_eq!(cfg.section("general").unwrap().get_value("workers", ""), "8");
    }

    #[test]
    fn expand_section_substitutes_runtime_params() {
        let cfg = Config::parse("[general]\ngreeting=hello ${who}\n");
        let mut runtime = NamedList::new("runtime");
        runtime.set_param("who", "world");
        let expanded = cfg.expand_section("general", &runtime).unwrap();
        assert_eq!(expanded.get_value("greeting", ""), "hello world");
    }
}
