/// Canonical URL-safe identifier for a display name or filename stem.
///
/// Normalization steps:
/// - lowercase (full Unicode lowercasing, so `\u{212A}` KELVIN SIGN becomes `k`)
/// - collapse every run of characters outside `[a-z0-9]` into a single `-`
/// - strip leading/trailing `-`
///
/// `normalize(normalize(x)) == normalize(x)` for every input; symbol-only input
/// yields an empty string.
pub fn normalize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_sep = false;
    for c in name.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_sep && !out.is_empty() {
                out.push('-');
            }
            pending_sep = false;
            out.push(c);
        } else {
            pending_sep = true;
        }
    }
    out
}

/// Filename without its final extension. Dotfiles (`.env`) keep their name.
pub fn stem(filename: &str) -> &str {
    split_extension(filename).0
}

/// Split `name.ext` into `("name", Some("ext"))`. A leading dot is not an
/// extension separator and a trailing dot yields no extension.
pub fn split_extension(filename: &str) -> (&str, Option<&str>) {
    match filename.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < filename.len() => {
            (&filename[..idx], Some(&filename[idx + 1..]))
        }
        _ => (filename, None),
    }
}

/// Normalize a filename while keeping its extension.
///
/// The stem goes through [`normalize`]; the extension is only case-folded.
/// Returns `None` when the stem normalizes to nothing, since such a file has
/// no usable storage name.
pub fn normalize_filename(filename: &str) -> Option<String> {
    let (base, ext) = split_extension(filename);
    let slug = normalize(base);
    if slug.is_empty() {
        return None;
    }
    Some(match ext {
        Some(ext) => format!("{slug}.{}", ext.to_ascii_lowercase()),
        None => slug,
    })
}
