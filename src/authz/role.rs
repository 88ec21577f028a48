use super::roles;

/// Map an arbitrary role label to its canonical role name.
///
/// Case-insensitive. Known synonyms collapse onto one canonical name;
/// unknown labels are lowercased and passed through so they still resolve
/// deterministically (they fall out as implicit deny at lookup time).
/// Missing or empty input means an unprivileged `user`.
pub fn normalize_role(raw: Option<&str>) -> String {
    let label = match raw {
        Some(value) => value.trim(),
        None => return roles::USER.to_string(),
    };
    if label.is_empty() {
        return roles::USER.to_string();
    }

    let lowered = label.to_lowercase();
    match lowered.as_str() {
        "administrator" | "admin" | "superadmin" | "super-admin" => roles::ADMIN.to_string(),
        "editor" => roles::EDITOR.to_string(),
        "viewer" | "read-only" | "readonly" => roles::VIEWER.to_string(),
        _ => lowered,
    }
}
