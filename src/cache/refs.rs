//! Stage ref naming
//!
//! A stage's ref is `<branch>/<escaped stage>`. Escaping keeps ASCII
//! alphanumerics, `-`, `_` and `.`, and replaces every other byte with its
//! lowercase hex value without padding. Stores written by earlier runs rely
//! on this exact form.

/// Escape a stage name into a single ref path component
pub fn escape_stage(stage: &str) -> String {
    let mut escaped = String::with_capacity(stage.len());
    for byte in stage.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.') {
            escaped.push(char::from(byte));
        } else {
            escaped.push_str(&format!("{:x}", byte));
        }
    }
    escaped
}

/// Full ref name for a stage of a branch
pub fn stage_ref(branch: &str, stage: &str) -> String {
    format!("{}/{}", branch, escape_stage(stage))
}
