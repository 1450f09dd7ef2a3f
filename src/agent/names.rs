//! Package-name character substitution.
//!
//! The agent rewrites characters that are unsafe in file names before it
//! stores a package name. Applying the same table on our side makes the
//! name usable as an exact lookup key.

/// Characters the agent replaces, with their replacements.
const CHAR_SUBSTITUTIONS: &[(char, &str)] = &[
    (':', ";"),
    ('/', "\u{2044}"),
    ('\\', ""),
    ('*', ""),
    ('?', ""),
    ('"', "'"),
    ('<', "("),
    ('>', ")"),
    ('|', "-"),
];

/// Applies the agent's file-name substitutions to a package name.
///
/// Idempotent: substituted characters never map onto another substituted
/// character.
#[must_use]
pub fn normalize_package_name(name: &str) -> String {
    let mut normalized = String::with_capacity(name.len());
    for ch in name.chars() {
        match CHAR_SUBSTITUTIONS.iter().find(|(from, _)| *from == ch) {
            Some((_, replacement)) => normalized.push_str(replacement),
            None => normalized.push(ch),
        }
    }
    normalized
}
