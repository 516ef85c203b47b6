use crate::memory::UserIdentity;

const MAX_FIELD_LEN: usize = 60;

/// Scan a message for first-person identity statements and fold them into
/// the profile. Returns true when anything changed.
///
/// Deliberately conservative: only unambiguous openings are captured, and an
/// existing field is overwritten only by a new statement of the same kind
/// (the newest self-description wins).
pub fn apply_message_heuristics(identity: &mut UserIdentity, message: &str) -> bool {
    let mut changed = false;

    for sentence in split_sentences(message) {
        let lower = sentence.to_lowercase();

        if let Some(value) = capture(&lower, &sentence, &["my name is ", "i'm called ", "i am called "]) {
            changed |= set_field(&mut identity.name, value);
        } else if let Some(value) = capture(&lower, &sentence, &["i'm from ", "i am from ", "i grew up in "]) {
            changed |= set_field(&mut identity.origin, value);
        } else if let Some(value) = capture(&lower, &sentence, &["i work as ", "my job is ", "i work at "]) {
            changed |= set_field(&mut identity.primary_role, value);
        } else if let Some(value) =
            capture(&lower, &sentence, &["i'm working on ", "i am working on ", "these days i'm "])
        {
            changed |= set_field(&mut identity.current_context, value);
        }
    }

    if changed {
        identity.touch();
    }
    changed
}

fn split_sentences(message: &str) -> impl Iterator<Item = &str> {
    message
        .split(['.', '!', '?', '\n', ';'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Find the first matching prefix in the lowercased sentence and return the
/// remainder from the original casing, length-capped.
fn capture(lower: &str, original: &str, prefixes: &[&str]) -> Option<String> {
    for prefix in prefixes {
        if let Some(pos) = lower.find(prefix) {
            // Byte offsets can drift between the lowercased copy and the
            // original for non-ASCII text; bail out of this prefix if so.
            let Some(rest) = original.get(pos + prefix.len()..) else {
                continue;
            };
            let rest = rest.trim();
            let value: String = rest.chars().take(MAX_FIELD_LEN).collect();
            let value = value.trim_end_matches(',').trim().to_string();
            if !value.is_empty() {
                return Some(value);
            }
        }
    }
    None
}

fn set_field(field: &mut Option<String>, value: String) -> bool {
    if field.as_deref() == Some(value.as_str()) {
        return false;
    }
    *field = Some(value);
    true
}
