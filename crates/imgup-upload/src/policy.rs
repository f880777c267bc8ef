//! Accepted upload types

/// MIME types accepted for upload and the extension each is stored under
const ALLOWED: [(&str, &str); 4] = [
    ("image/gif", ".gif"),
    ("image/webp", ".webp"),
    ("image/png", ".png"),
    ("image/jpeg", ".jpeg"),
];

/// Closed allow-list of image types.
///
/// Lookups are exact string matches against the sniffed type; there is no
/// wildcard or parameter stripping.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypePolicy;

impl TypePolicy {
    /// Extension for an accepted MIME type, `None` if the type is rejected
    pub fn resolve(&self, mime: &str) -> Option<&'static str> {
        ALLOWED
            .iter()
            .find(|(allowed, _)| *allowed == mime)
            .map(|(_, ext)| *ext)
    }

    /// Whether `ext` (with leading dot) is one this policy ever produces
    pub fn is_known_extension(&self, ext: &str) -> bool {
        ALLOWED.iter().any(|(_, known)| *known == ext)
    }

    pub fn allowed_types(&self) -> impl Iterator<Item = &'static str> {
        ALLOWED.iter().map(|(mime, _)| *mime)
    }
}
