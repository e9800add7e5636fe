//! Helpers for the slash-separated asset URLs used throughout the engine.

/// Last path segment of `url`.
pub fn file_name(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

/// Last path segment of `url` without its final extension.
///
/// A name without a dot yields an empty string, matching `"a.b.c" -> "a.b"`.
pub fn base_file_name(url: &str) -> &str {
    let name = file_name(url);
    match name.rfind('.') {
        Some(dot) => &name[..dot],
        None => "",
    }
}

/// Resolves `relative` against the directory containing `base`.
pub fn resolve_relative(base: &str, relative: &str) -> String {
    if relative.starts_with('/') {
        return relative.trim_start_matches('/').to_string();
    }
    match base.rfind('/') {
        Some(slash) => format!("{}/{}", &base[..slash], relative),
        None => relative.to_string(),
    }
}

/// Joins a directory URL and a file name, inserting a slash when needed.
pub fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() || dir.ends_with('/') {
        format!("{dir}{name}")
    } else {
        format!("{dir}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_takes_last_segment() {
        assert_eq!(file_name("../tilesets/grass.json"), "grass.json");
        assert_eq!(file_name("grass.json"), "grass.json");
        assert_eq!(file_name("assets/maps/"), "");
    }

    #[test]
    fn base_file_name_drops_only_the_last_extension() {
        assert_eq!(base_file_name("assets/gfx/keen.atlas.json"), "keen.atlas");
        assert_eq!(base_file_name("assets/gfx/keen.png"), "keen");
        assert_eq!(base_file_name("assets/README"), "");
    }

    #[test]
    fn resolve_relative_uses_base_directory() {
        assert_eq!(
            resolve_relative("assets/gfx/keen.json", "keen.png"),
            "assets/gfx/keen.png"
        );
        assert_eq!(resolve_relative("keen.json", "keen.png"), "keen.png");
        assert_eq!(join("assets/tilesets/", "a.json"), "assets/tilesets/a.json");
        assert_eq!(join("assets/tilesets", "a.json"), "assets/tilesets/a.json");
    }
}
