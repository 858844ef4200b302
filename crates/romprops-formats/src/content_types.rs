//! STFS content type names

static CONTENT_TYPES: &[(u32, &str)] = &[
    (0x0000_0001, "Saved Game"),
    (0x0000_0002, "Marketplace Content"),
    (0x0000_0003, "Publisher"),
    (0x0000_1000, "Xbox 360 Title"),
    (0x0000_2000, "IPTV Pause Buffer"),
    (0x0000_4000, "Installed Game"),
    (0x0000_5000, "Original Xbox Game"),
    (0x0000_9000, "Avatar Item"),
    (0x0001_0000, "Profile"),
    (0x0002_0000, "Gamer Picture"),
    (0x0003_0000, "Theme"),
    (0x0004_0000, "Cache File"),
    (0x0005_0000, "Storage Download"),
    (0x0006_0000, "Xbox Saved Game"),
    (0x0007_0000, "Xbox Download"),
    (0x0008_0000, "Game Demo"),
    (0x0009_0000, "Video"),
    (0x000A_0000, "Game Title"),
    (0x000B_0000, "Installer"),
    (0x000C_0000, "Game Trailer"),
    (0x000D_0000, "Arcade Title"),
    (0x000E_0000, "XNA"),
    (0x000F_0000, "License Store"),
    (0x0010_0000, "Movie"),
    (0x0020_0000, "TV"),
    (0x0030_0000, "Music Video"),
    (0x0040_0000, "Game Video"),
    (0x0050_0000, "Podcast Video"),
    (0x0060_0000, "Viral Video"),
    (0x0200_0000, "Community Game"),
];

/// Name of an STFS content type
pub fn lookup(content_type: u32) -> Option<&'static str> {
    CONTENT_TYPES
        .binary_search_by_key(&content_type, |&(t, _)| t)
        .ok()
        .map(|i| CONTENT_TYPES[i].1)
}

/// Content type name, or `Unknown (0xXXXXXXXX)`
pub fn display(content_type: u32) -> String {
    lookup(content_type).map_or_else(|| format!("Unknown (0x{content_type:08X})"), str::to_string)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_sorted_and_lookup() {
        assert!(CONTENT_TYPES.windows(2).all(|w| w[0].0 < w[1].0));
        assert_eq!(lookup(0x000D_0000), Some("Arcade Title"));
        assert_eq!(lookup(0x0200_0000), Some("Community Game"));
        assert_eq!(display(0x1234), "Unknown (0x00001234)");
    }
}
