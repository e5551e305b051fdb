//! Name handling: wire-path sanitizing, 8.3 short-name mangling, and the
//! case-insensitive wildcard matcher behind FIND patterns.

use crate::{Error, Result};

/// Maps a wire path (`\` separated, share-relative) to a safe relative
/// local path. Rejects traversal components outright.
pub fn sanitize_wire_path(wire: &str) -> Result<String> {
    let mut parts = Vec::new();
    for component in wire.split(['\\', '/']) {
        match component {
            "" | "." => {}
            ".." => return Err(Error::AccessDenied("path traversal")),
            other => parts.push(other),
        }
    }
    Ok(parts.join("/"))
}

/// Splits a wire path into its directory part and a final component,
/// which may be a wildcard pattern.
pub fn split_last_component(wire: &str) -> (&str, &str) {
    match wire.trim_end_matches(['\\', '/']).rfind(['\\', '/']) {
        Some(pos) => (&wire[..pos], wire[pos + 1..].trim_end_matches(['\\', '/'])),
        None => ("", wire),
    }
}

pub fn has_wildcard(name: &str) -> bool {
    name.contains(['*', '?'])
}

/// Case-insensitive DOS wildcard match: `*` spans any run, `?` one
/// character.
pub fn wildcard_match(pattern: &str, name: &str) -> bool {
    fn matches(pattern: &[char], name: &[char]) -> bool {
        match (pattern.first(), name.first()) {
            (None, None) => true,
            (Some('*'), _) => {
                matches(&pattern[1..], name)
                    || (!name.is_empty() && matches(pattern, &name[1..]))
            }
            (Some('?'), Some(_)) => matches(&pattern[1..], &name[1..]),
            (Some(p), Some(n)) => {
                p.eq_ignore_ascii_case(n) && matches(&pattern[1..], &name[1..])
            }
            _ => false,
        }
    }
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();
    let name: Vec<char> = name.to_lowercase().chars().collect();
    matches(&pattern, &name)
}

/// The base-43 alphabet of the mangling checksum characters.
const MANGLE_ALPHABET: &[u8; 43] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_-!@#$%";

/// Whether a name already fits the 8.3 form and needs no mangling.
pub fn fits_83(name: &str) -> bool {
    if name.starts_with('.') {
        return false;
    }
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) => (stem, ext),
        None => (name, ""),
    };
    let ok_part = |part: &str, max: usize| {
        part.len() <= max
            && !part.is_empty()
            && part
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || "_-!@#$%".contains(c))
    };
    ok_part(stem, 8) && (ext.is_empty() || ok_part(ext, 3)) && !stem.contains('.')
}

/// Mangles a long name into its deterministic 8.3 form:
/// the upper-cased first five base characters, `~`, two base-43 checksum
/// characters from `sum(bytes) mod 43²`, then the upper-cased first three
/// extension characters (`___` for dotfiles).
pub fn mangle_83(name: &str) -> String {
    let checksum = name.bytes().fold(0u32, |acc, b| acc + u32::from(b)) % (43 * 43);
    let hi = MANGLE_ALPHABET[(checksum / 43) as usize] as char;
    let lo = MANGLE_ALPHABET[(checksum % 43) as usize] as char;

    let (stem, ext) = if let Some(rest) = name.strip_prefix('.') {
        (rest, "___".to_string())
    } else {
        match name.rsplit_once('.') {
            Some((stem, ext)) => (stem, ext.chars().take(3).collect::<String>()),
            None => (name, String::new()),
        }
    };

    let base: String = stem
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '.')
        .take(5)
        .collect::<String>()
        .to_uppercase();

    let mut mangled = format!("{base}~{hi}{lo}");
    if !ext.is_empty() {
        mangled.push('.');
        mangled.push_str(&ext.to_uppercase());
    }
    mangled
}

/// The short name to report for a directory entry: empty when the real
/// name already fits.
pub fn short_name_for(name: &str) -> Option<String> {
    if fits_83(name) {
        None
    } else {
        Some(mangle_83(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_rejects_traversal() {
        assert!(sanitize_wire_path("\\a\\..\\b").is_err());
        assert_eq!(sanitize_wire_path("\\d\\f.txt").unwrap(), "d/f.txt");
        assert_eq!(sanitize_wire_path("\\").unwrap(), "");
    }

    #[test]
    fn test_split_last_component() {
        assert_eq!(split_last_component("\\d\\*.TXT"), ("\\d", "*.TXT"));
        assert_eq!(split_last_component("f.txt"), ("", "f.txt"));
    }

    #[test]
    fn test_wildcard_match() {
        assert!(wildcard_match("*.TXT", "a.txt"));
        assert!(wildcard_match("a?.txt", "ab.TXT"));
        assert!(!wildcard_match("*.TXT", "a.txt.bak"));
        assert!(wildcard_match("*", "anything"));
        assert!(!wildcard_match("b*", "abc"));
    }

    #[test]
    fn test_mangling_is_deterministic() {
        let a = mangle_83("longfilename.txt");
        let b = mangle_83("longfilename.txt");
        assert_eq!(a, b);
        assert_ne!(a, mangle_83("longfilename2.txt"));
    }

    #[test]
    fn test_mangled_shape() {
        let mangled = mangle_83("averylongname.jpeg");
        let (stem, ext) = mangled.rsplit_once('.').unwrap();
        assert_eq!(ext, "JPE");
        assert_eq!(stem.len(), 8);
        assert_eq!(stem.chars().nth(5), Some('~'));
        assert!(stem.starts_with("AVERY"));
    }

    #[test]
    fn test_dotfile_gets_underscore_extension() {
        let mangled = mangle_83(".bashrc");
        assert!(mangled.ends_with(".___"));
    }

    #[test]
    fn test_fits_83() {
        assert!(fits_83("README.MD"));
        assert!(fits_83("notes"));
        assert!(!fits_83("longfilename.txt"));
        assert!(!fits_83(".hidden"));
        assert!(!fits_83("two.dots.txt"));
        assert!(short_name_for("README.MD").is_none());
        assert!(short_name_for("longfilename.txt").is_some());
    }
}
