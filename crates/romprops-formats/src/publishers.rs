//! Xbox publisher codes
//!
//! The high 16 bits of an Xbox / Xbox 360 title ID are two ASCII letters
//! naming the publisher. The table is sorted by code so lookups are a
//! binary search.

const fn code(c: &[u8; 2]) -> u16 {
    ((c[0] as u16) << 8) | c[1] as u16
}

static PUBLISHERS: &[(u16, &str)] = &[
    (code(b"AC"), "Acclaim Entertainment"),
    (code(b"AH"), "ARUSH Entertainment"),
    (code(b"AQ"), "Aqua System"),
    (code(b"AS"), "ASK"),
    (code(b"AT"), "Atlus"),
    (code(b"AV"), "Activision"),
    (code(b"AY"), "Aspyr Media"),
    (code(b"BA"), "Bandai"),
    (code(b"BL"), "Black Box"),
    (code(b"BM"), "BAM! Entertainment"),
    (code(b"BR"), "Broccoli Co."),
    (code(b"BS"), "Bethesda Softworks"),
    (code(b"BU"), "Bunkasha Co."),
    (code(b"BV"), "Buena Vista Games"),
    (code(b"BW"), "BBC Multimedia"),
    (code(b"BZ"), "Blizzard"),
    (code(b"CC"), "Capcom"),
    (code(b"CK"), "Kemco Corporation"),
    (code(b"CM"), "Codemasters"),
    (code(b"CV"), "Crave Entertainment"),
    (code(b"DC"), "DreamCatcher Interactive"),
    (code(b"DX"), "Davilex"),
    (code(b"EA"), "Electronic Arts"),
    (code(b"EC"), "Encore inc"),
    (code(b"EL"), "Enlight Software"),
    (code(b"EM"), "Empire Interactive"),
    (code(b"ES"), "Eidos Interactive"),
    (code(b"FI"), "Fox Interactive"),
    (code(b"FS"), "From Software"),
    (code(b"GE"), "Genki Co."),
    (code(b"GV"), "Groove Games"),
    (code(b"HE"), "Tru Blu Entertainment"),
    (code(b"HP"), "Hip games"),
    (code(b"HU"), "Hudson Soft"),
    (code(b"HW"), "Highwaymen"),
    (code(b"IA"), "Mad Catz Interactive"),
    (code(b"IF"), "Idea Factory"),
    (code(b"IG"), "Infogrames"),
    (code(b"IL"), "Interlex Corporation"),
    (code(b"IM"), "Imagine Media"),
    (code(b"IO"), "Ignition Entertainment"),
    (code(b"IP"), "Interplay Entertainment"),
    (code(b"IX"), "InXile Entertainment"),
    (code(b"JA"), "Jaleco"),
    (code(b"JW"), "JoWooD"),
    (code(b"KB"), "Kemco"),
    (code(b"KI"), "Kids Station Inc."),
    (code(b"KN"), "Konami"),
    (code(b"KO"), "KOEI"),
    (code(b"KU"), "Kobi and/or GAE"),
    (code(b"KY"), "Kalypso Media"),
    (code(b"LA"), "LucasArts"),
    (code(b"LS"), "Black Bean Games"),
    (code(b"MD"), "Metro3D"),
    (code(b"ME"), "Medix"),
    (code(b"MI"), "Microïds"),
    (code(b"MJ"), "Majesco Entertainment"),
    (code(b"MM"), "Myelin Media"),
    (code(b"MP"), "MediaQuest"),
    (code(b"MS"), "Microsoft Game Studios"),
    (code(b"MW"), "Midway Games"),
    (code(b"MX"), "Empire Interactive"),
    (code(b"NK"), "NewKidCo"),
    (code(b"NL"), "NovaLogic"),
    (code(b"NM"), "Namco"),
    (code(b"OX"), "Oxygen Interactive"),
    (code(b"PC"), "Playlogic Entertainment"),
    (code(b"PL"), "Phantagram Co., Ltd."),
    (code(b"RA"), "Rage"),
    (code(b"SA"), "Sammy"),
    (code(b"SC"), "SCi Games"),
    (code(b"SE"), "SEGA"),
    (code(b"SN"), "SNK"),
    (code(b"SS"), "Simon & Schuster"),
    (code(b"SU"), "Success Corporation"),
    (code(b"SW"), "Swing! Deutschland"),
    (code(b"TA"), "Takara"),
    (code(b"TC"), "Tecmo"),
    (code(b"TD"), "The 3DO Company"),
    (code(b"TK"), "Takuyo"),
    (code(b"TM"), "TDK Mediactive"),
    (code(b"TQ"), "THQ"),
    (code(b"TS"), "Titus Interactive"),
    (code(b"TT"), "Take-Two Interactive Software"),
    (code(b"US"), "Ubisoft"),
    (code(b"VC"), "Victor Interactive Software"),
    (code(b"VN"), "Vivendi Universal"),
    (code(b"VU"), "Vivendi Universal Games"),
    (code(b"VV"), "Vivendi Universal Games"),
    (code(b"WE"), "Wanadoo Edition"),
    (code(b"WR"), "Warner Bros. Interactive Entertainment"),
    (code(b"XI"), "XPEC Entertainment and Idea Factory"),
    (code(b"XK"), "Xbox kiosk disk"),
    (code(b"XM"), "Evolved Games"),
    (code(b"XP"), "XPEC Entertainment"),
    (code(b"XR"), "Panorama"),
    (code(b"YB"), "YBM Sisa"),
    (code(b"ZD"), "Zushi Games"),
];

/// Publisher name for a two-letter code packed as `a << 8 | b`
pub fn lookup(code: u16) -> Option<&'static str> {
    PUBLISHERS
        .binary_search_by_key(&code, |&(c, _)| c)
        .ok()
        .map(|i| PUBLISHERS[i].1)
}

/// Publisher name for the two letters of a title ID
pub fn lookup_chars(a: u8, b: u8) -> Option<&'static str> {
    lookup((u16::from(a) << 8) | u16::from(b))
}

/// Publisher display string, with a fallback naming the raw code
pub fn display(a: u8, b: u8) -> String {
    if let Some(name) = lookup_chars(a, b) {
        return name.to_string();
    }
    if a.is_ascii_alphanumeric() && b.is_ascii_alphanumeric() {
        format!("Unknown ({}{})", a as char, b as char)
    } else {
        format!("Unknown ({a:02X} {b:02X})")
    }
}

/// Two publisher characters for a title ID string
///
/// Uppercase letters are printed as-is; anything else as `\xHH`.
pub fn title_id_prefix(a: u8, b: u8) -> String {
    let fmt = |c: u8| {
        if c.is_ascii_uppercase() {
            (c as char).to_string()
        } else {
            format!("\\x{c:02X}")
        }
    };
    format!("{}{}", fmt(a), fmt(b))
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_sorted() {
        assert!(PUBLISHERS.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn test_lookup() {
        assert_eq!(lookup_chars(b'M', b'S'), Some("Microsoft Game Studios"));
        assert_eq!(lookup_chars(b'A', b'C'), Some("Acclaim Entertainment"));
        assert_eq!(lookup_chars(b'Z', b'D'), Some("Zushi Games"));
        assert_eq!(lookup_chars(b'Q', b'Q'), None);
    }

    #[test]
    fn test_display_fallbacks() {
        assert_eq!(display(b'E', b'A'), "Electronic Arts");
        assert_eq!(display(b'Q', b'Q'), "Unknown (QQ)");
        assert_eq!(display(0x01, 0xFF), "Unknown (01 FF)");
        assert_eq!(title_id_prefix(b'M', b'S'), "MS");
        assert_eq!(title_id_prefix(b'M', 0x07), "M\\x07");
    }
}
