//! Versioned data tables consumed by the permutation generator.
//!
//! The TLD popularity list, the combo-squat keyword list and the IDN
//! confusable map are plain text files under `data/`, compiled into the
//! binary. Updating a table is a data change, not a code change.

use std::collections::HashMap;

use lazy_static::lazy_static;

const TLDS_RAW: &str = include_str!("../../data/tlds.txt");
const KEYWORDS_RAW: &str = include_str!("../../data/keywords.txt");
const CONFUSABLES_RAW: &str = include_str!("../../data/confusables.txt");

lazy_static! {
    /// Popular TLDs, most common first, for the tld-swap fuzzer.
    pub static ref TLDS: Vec<&'static str> = data_lines(TLDS_RAW);

    /// Keywords for the combo-squat fuzzer.
    pub static ref KEYWORDS: Vec<&'static str> = data_lines(KEYWORDS_RAW);

    /// ASCII letter -> visually-confusable Unicode code points.
    pub static ref CONFUSABLES: HashMap<char, Vec<char>> = parse_confusables(CONFUSABLES_RAW);
}

fn data_lines(raw: &'static str) -> Vec<&'static str> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect()
}

fn parse_confusables(raw: &str) -> HashMap<char, Vec<char>> {
    let mut map = HashMap::new();
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut fields = line.split_whitespace();
        let ascii = match fields.next().and_then(|f| f.chars().next()) {
            Some(c) => c,
            None => continue,
        };
        let alternatives: Vec<char> = fields.filter_map(|f| f.chars().next()).collect();
        if !alternatives.is_empty() {
            map.insert(ascii, alternatives);
        }
    }
    map
}

/// Keyboard-adjacent characters on a QWERTY layout, used by the
/// replacement fuzzer.
pub fn keyboard_neighbors(c: char) -> &'static str {
    match c {
        'q' => "wa1",
        'w' => "qase2",
        'e' => "wsdr3",
        'r' => "edft4",
        't' => "rfgy5",
        'y' => "tghu6",
        'u' => "yhji7",
        'i' => "ujko8",
        'o' => "iklp9",
        'p' => "ol0",
        'a' => "qwsz",
        's' => "awedxz",
        'd' => "serfcx",
        'f' => "drtgvc",
        'g' => "ftyhbv",
        'h' => "gyujnb",
        'j' => "huikmn",
        'k' => "jiolm",
        'l' => "kop",
        'z' => "asx",
        'x' => "zsdc",
        'c' => "xdfv",
        'v' => "cfgb",
        'b' => "vghn",
        'n' => "bhjm",
        'm' => "njk",
        '1' => "2q",
        '2' => "13w",
        '3' => "24e",
        '4' => "35r",
        '5' => "46t",
        '6' => "57y",
        '7' => "68u",
        '8' => "79i",
        '9' => "80o",
        '0' => "9p",
        _ => "",
    }
}

/// ASCII lookalike substitutions for the homoglyph fuzzer. Multi-char
/// entries cover glyph pairs that render like a single letter.
pub fn ascii_lookalikes(c: char) -> &'static [&'static str] {
    match c {
        'o' => &["0"],
        '0' => &["o"],
        'l' => &["1", "i"],
        'i' => &["1", "l"],
        '1' => &["l", "i"],
        'e' => &["3"],
        '3' => &["e"],
        's' => &["5"],
        '5' => &["s"],
        'b' => &["8"],
        '8' => &["b"],
        'g' => &["q", "9"],
        'q' => &["g"],
        '9' => &["g"],
        'z' => &["2"],
        '2' => &["z"],
        'm' => &["rn", "nn"],
        'w' => &["vv"],
        'd' => &["cl"],
        'u' => &["v"],
        'v' => &["u"],
        _ => &[],
    }
}
