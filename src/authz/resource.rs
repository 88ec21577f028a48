use super::resources;

/// Alias table: variants seen in permission rows and client requests mapped
/// to the canonical resource name. Keys are lowercase.
const ALIASES: &[(&str, &str)] = &[
    ("qr_codes", resources::QR_CODE),
    ("qr", resources::QR_CODE),
    ("qrcode", resources::QR_CODE),
    ("short_urls", resources::SHORT_URL),
    ("urls", resources::SHORT_URL),
    ("url", resources::SHORT_URL),
    ("user", resources::USERS),
    ("user_analytics", resources::USERS),
];

/// Map a resource-type label to its canonical name.
///
/// Case-insensitive; unmapped names pass through lowercased. Total: never
/// fails, never returns an empty string for non-empty input.
pub fn canonicalize_resource(resource_type: &str) -> String {
    let lowered = resource_type.trim().to_lowercase();
    if lowered.is_empty() {
        // Whitespace-only input still round-trips as something non-empty.
        return resource_type.to_lowercase();
    }
    for (alias, canonical) in ALIASES {
        if lowered == *alias {
            return (*canonical).to_string();
        }
    }
    lowered
}
