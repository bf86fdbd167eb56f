//! Candidate lookalike generation.
//!
//! `generate` expands one seed domain into the deduplicated union of all
//! fuzzer outputs. Generation is pure and deterministic; candidates are
//! produced stage by stage so consumers that only look at the head never
//! pay for the full set. Fuzzer stages run in tag order, which makes the
//! dedup rule (lexicographically-first tag wins) fall out of plain
//! first-emitted-wins, with the seed itself always claimed by `original`.

use std::collections::HashSet;

use serde_derive::{Deserialize, Serialize};

use crate::scan::phonetic::{metaphone, soundex};
use crate::scan::tables::{ascii_lookalikes, keyboard_neighbors, CONFUSABLES, KEYWORDS, TLDS};

/// The transformation rule that produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Fuzzer {
    Addition,
    Bitsquat,
    Combo,
    Homoglyph,
    Hyphenation,
    IdnHomograph,
    Omission,
    Original,
    Repetition,
    Replacement,
    Soundalike,
    Subdomain,
    TldSwap,
    Transposition,
    VowelSwap,
}

impl Fuzzer {
    pub fn tag(&self) -> &'static str {
        match self {
            Fuzzer::Addition => "addition",
            Fuzzer::Bitsquat => "bitsquat",
            Fuzzer::Combo => "combo",
            Fuzzer::Homoglyph => "homoglyph",
            Fuzzer::Hyphenation => "hyphenation",
            Fuzzer::IdnHomograph => "idn-homograph",
            Fuzzer::Omission => "omission",
            Fuzzer::Original => "original",
            Fuzzer::Repetition => "repetition",
            Fuzzer::Replacement => "replacement",
            Fuzzer::Soundalike => "soundalike",
            Fuzzer::Subdomain => "subdomain",
            Fuzzer::TldSwap => "tld-swap",
            Fuzzer::Transposition => "transposition",
            Fuzzer::VowelSwap => "vowel-swap",
        }
    }
}

impl std::fmt::Display for Fuzzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// One generated lookalike.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Candidate {
    pub domain: String,
    pub fuzzer: Fuzzer,
}

/// Switches for the expensive optional fuzzers. All off by default.
#[derive(Debug, Clone, Copy, Default)]
pub struct FuzzerToggles {
    pub combosquatting: bool,
    pub soundalike: bool,
    pub idn_homograph: bool,
}

/// Lowercase, punycode and sanity-check one input seed.
pub fn normalize_seed(raw: &str) -> Result<String, String> {
    let trimmed = raw.trim().trim_end_matches('.').to_lowercase();
    if trimmed.is_empty() {
        return Err("empty domain".to_string());
    }
    let ascii = idna::domain_to_ascii(&trimmed)
        .map_err(|err| format!("'{}' is not a valid domain name: {:?}", trimmed, err))?;
    if !ascii.contains('.') {
        return Err(format!("'{}' is not a registrable domain", ascii));
    }
    Ok(ascii)
}

/// Expand `seed` into its candidate stream. The seed is normalized first;
/// the error carries the reason a seed is unusable.
pub fn generate(seed: &str, toggles: &FuzzerToggles) -> Result<Permutations, String> {
    let normalized = normalize_seed(seed)?;
    let (label, suffix) = match normalized.split_once('.') {
        Some((label, suffix)) => (label.to_string(), suffix.to_string()),
        None => return Err(format!("'{}' has no TLD", normalized)),
    };

    // stage order is tag order, with `original` pulled to the front so
    // the seed always keeps its tag
    let mut stages = vec![Fuzzer::Original, Fuzzer::Addition, Fuzzer::Bitsquat];
    if toggles.combosquatting {
        stages.push(Fuzzer::Combo);
    }
    stages.extend([Fuzzer::Homoglyph, Fuzzer::Hyphenation]);
    if toggles.idn_homograph {
        stages.push(Fuzzer::IdnHomograph);
    }
    stages.extend([Fuzzer::Omission, Fuzzer::Repetition, Fuzzer::Replacement]);
    if toggles.soundalike {
        stages.push(Fuzzer::Soundalike);
    }
    stages.extend([
        Fuzzer::Subdomain,
        Fuzzer::TldSwap,
        Fuzzer::Transposition,
        Fuzzer::VowelSwap,
    ]);

    Ok(Permutations {
        seed: normalized,
        label,
        suffix,
        stages,
        stage_idx: 0,
        pending: Vec::new().into_iter(),
        seen: HashSet::new(),
    })
}

/// Lazy candidate stream; one fuzzer stage is expanded at a time.
pub struct Permutations {
    seed: String,
    label: String,
    suffix: String,
    stages: Vec<Fuzzer>,
    stage_idx: usize,
    pending: std::vec::IntoIter<Candidate>,
    seen: HashSet<String>,
}

impl Iterator for Permutations {
    type Item = Candidate;

    fn next(&mut self) -> Option<Candidate> {
        loop {
            for candidate in self.pending.by_ref() {
                if self.seen.insert(candidate.domain.clone()) {
                    return Some(candidate);
                }
            }
            let fuzzer = *self.stages.get(self.stage_idx)?;
            self.stage_idx += 1;
            self.pending = self.expand(fuzzer).into_iter();
        }
    }
}

impl Permutations {
    fn expand(&self, fuzzer: Fuzzer) -> Vec<Candidate> {
        let domains = match fuzzer {
            Fuzzer::Original => vec![self.seed.clone()],
            Fuzzer::Addition => self.from_labels(addition(&self.label)),
            Fuzzer::Bitsquat => self.from_labels(bitsquat(&self.label)),
            Fuzzer::Combo => self.from_labels(combo(&self.label)),
            Fuzzer::Homoglyph => self.from_labels(homoglyph(&self.label)),
            Fuzzer::Hyphenation => self.from_labels(hyphenation(&self.label)),
            Fuzzer::IdnHomograph => idn_homograph(&self.label, &self.suffix),
            Fuzzer::Omission => self.from_labels(omission(&self.label)),
            Fuzzer::Repetition => self.from_labels(repetition(&self.label)),
            Fuzzer::Replacement => self.from_labels(replacement(&self.label)),
            Fuzzer::Soundalike => self.from_labels(soundalike(&self.label)),
            Fuzzer::Subdomain => subdomain(&self.label, &self.suffix),
            Fuzzer::TldSwap => tld_swap(&self.label, &self.suffix),
            Fuzzer::Transposition => self.from_labels(transposition(&self.label)),
            Fuzzer::VowelSwap => self.from_labels(vowel_swap(&self.label)),
        };

        domains
            .into_iter()
            .filter(|domain| is_valid_domain(domain))
            .map(|domain| Candidate { domain, fuzzer })
            .collect()
    }

    fn from_labels(&self, labels: Vec<String>) -> Vec<String> {
        labels
            .into_iter()
            .map(|label| format!("{}.{}", label, self.suffix))
            .collect()
    }
}

/// DNS-label legality: 1..=63 chars of `[a-z0-9_-]`, no edge hyphens.
/// Underscore is admitted for the combo-squat separator case.
pub fn is_valid_label(label: &str) -> bool {
    if label.is_empty() || label.len() > 63 {
        return false;
    }
    if label.starts_with('-') || label.ends_with('-') {
        return false;
    }
    label
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
}

fn is_valid_domain(domain: &str) -> bool {
    if domain.len() > 253 || domain.is_empty() {
        return false;
    }
    domain.split('.').all(is_valid_label)
}

const ALPHABET: &str = "abcdefghijklmnopqrstuvwxyz0123456789";
const VOWELS: &str = "aeiou";

fn addition(label: &str) -> Vec<String> {
    ALPHABET.chars().map(|c| format!("{}{}", label, c)).collect()
}

fn omission(label: &str) -> Vec<String> {
    (0..label.len())
        .map(|i| format!("{}{}", &label[..i], &label[i + 1..]))
        .collect()
}

fn repetition(label: &str) -> Vec<String> {
    label
        .char_indices()
        .map(|(i, c)| format!("{}{}{}", &label[..i], c, &label[i..]))
        .collect()
}

fn replacement(label: &str) -> Vec<String> {
    let mut out = Vec::new();
    for (i, c) in label.char_indices() {
        for r in keyboard_neighbors(c).chars() {
            out.push(format!("{}{}{}", &label[..i], r, &label[i + 1..]));
        }
    }
    out
}

fn transposition(label: &str) -> Vec<String> {
    let chars: Vec<char> = label.chars().collect();
    let mut out = Vec::new();
    for i in 0..chars.len().saturating_sub(1) {
        if chars[i] == chars[i + 1] {
            continue;
        }
        let mut swapped = chars.clone();
        swapped.swap(i, i + 1);
        out.push(swapped.into_iter().collect());
    }
    out
}

fn hyphenation(label: &str) -> Vec<String> {
    (1..label.len())
        .map(|i| format!("{}-{}", &label[..i], &label[i..]))
        .collect()
}

fn vowel_swap(label: &str) -> Vec<String> {
    let mut out = Vec::new();
    for (i, c) in label.char_indices() {
        if !VOWELS.contains(c) {
            continue;
        }
        for v in VOWELS.chars().filter(|&v| v != c) {
            out.push(format!("{}{}{}", &label[..i], v, &label[i + 1..]));
        }
    }
    out
}

fn bitsquat(label: &str) -> Vec<String> {
    let mut out = Vec::new();
    for (i, c) in label.char_indices() {
        for bit in 0..8u8 {
            let flipped = (c as u8) ^ (1 << bit);
            let flipped = flipped as char;
            if flipped.is_ascii_lowercase() || flipped.is_ascii_digit() || flipped == '-' {
                out.push(format!("{}{}{}", &label[..i], flipped, &label[i + 1..]));
            }
        }
    }
    out
}

fn homoglyph(label: &str) -> Vec<String> {
    let mut out = Vec::new();
    for (i, c) in label.char_indices() {
        for glyph in ascii_lookalikes(c) {
            out.push(format!("{}{}{}", &label[..i], glyph, &label[i + 1..]));
        }
    }
    out
}

fn tld_swap(label: &str, suffix: &str) -> Vec<String> {
    TLDS.iter()
        .filter(|tld| **tld != suffix)
        .map(|tld| format!("{}.{}", label, tld))
        .collect()
}

fn subdomain(label: &str, suffix: &str) -> Vec<String> {
    (1..label.len())
        .map(|i| format!("{}.{}.{}", &label[..i], &label[i..], suffix))
        .collect()
}

fn combo(label: &str) -> Vec<String> {
    let mut out = Vec::new();
    for keyword in KEYWORDS.iter() {
        for sep in ["", "-", "_"] {
            out.push(format!("{}{}{}", label, sep, keyword));
            out.push(format!("{}{}{}", keyword, sep, label));
        }
    }
    for digit in 0..10u8 {
        out.push(format!("{}{}", label, digit));
    }
    out
}

fn soundalike(label: &str) -> Vec<String> {
    let target_soundex = soundex(label);
    let target_metaphone = metaphone(label);
    let mut out = Vec::new();

    let mut consider = |variant: String, out: &mut Vec<String>| {
        if variant != label
            && (soundex(&variant) == target_soundex || metaphone(&variant) == target_metaphone)
        {
            out.push(variant);
        }
    };

    for i in 0..label.len() {
        consider(format!("{}{}", &label[..i], &label[i + 1..]), &mut out);
        for c in 'a'..='z' {
            consider(
                format!("{}{}{}", &label[..i], c, &label[i + 1..]),
                &mut out,
            );
        }
    }
    for i in 0..=label.len() {
        for c in 'a'..='z' {
            consider(format!("{}{}{}", &label[..i], c, &label[i..]), &mut out);
        }
    }
    out
}

fn idn_homograph(label: &str, suffix: &str) -> Vec<String> {
    let mut out = Vec::new();
    for (i, c) in label.char_indices() {
        let alternatives = match CONFUSABLES.get(&c) {
            Some(alternatives) => alternatives,
            None => continue,
        };
        for &glyph in alternatives {
            let mutated = format!("{}{}{}", &label[..i], glyph, &label[i + c.len_utf8()..]);
            if let Ok(ascii) = idna::domain_to_ascii(&format!("{}.{}", mutated, suffix)) {
                out.push(ascii);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all(seed: &str, toggles: &FuzzerToggles) -> Vec<Candidate> {
        generate(seed, toggles).expect("generate").collect()
    }

    #[test]
    fn seed_is_always_present_and_tagged_original() {
        let candidates = all("example.com", &FuzzerToggles::default());
        let original: Vec<_> = candidates
            .iter()
            .filter(|c| c.fuzzer == Fuzzer::Original)
            .collect();
        assert_eq!(original.len(), 1);
        assert_eq!(original[0].domain, "example.com");
        assert_eq!(candidates[0].domain, "example.com");
    }

    #[test]
    fn domains_are_unique_within_a_seed() {
        let toggles = FuzzerToggles {
            combosquatting: true,
            soundalike: true,
            idn_homograph: true,
        };
        let candidates = all("example.com", &toggles);
        let mut seen = HashSet::new();
        for c in &candidates {
            assert!(seen.insert(c.domain.clone()), "duplicate domain {}", c.domain);
        }
    }

    #[test]
    fn classic_fuzzers_produce_known_variants() {
        let candidates = all("example.com", &FuzzerToggles::default());
        let find = |domain: &str| candidates.iter().find(|c| c.domain == domain);

        assert_eq!(find("examples.com").map(|c| c.fuzzer), Some(Fuzzer::Addition));
        assert_eq!(find("exmple.com").map(|c| c.fuzzer), Some(Fuzzer::Omission));
        assert_eq!(find("exaample.com").map(|c| c.fuzzer), Some(Fuzzer::Repetition));
        assert_eq!(find("exampel.com").map(|c| c.fuzzer), Some(Fuzzer::Transposition));
        assert_eq!(find("ex-ample.com").map(|c| c.fuzzer), Some(Fuzzer::Hyphenation));
        assert_eq!(find("ex.ample.com").map(|c| c.fuzzer), Some(Fuzzer::Subdomain));
        assert_eq!(find("example.net").map(|c| c.fuzzer), Some(Fuzzer::TldSwap));
        assert_eq!(find("examp1e.com").map(|c| c.fuzzer), Some(Fuzzer::Homoglyph));
    }

    #[test]
    fn earlier_tag_wins_on_collision() {
        // addition (append 'e') and repetition (double the final 'e')
        // both produce "examplee.com"; addition is first in tag order
        let candidates = all("example.com", &FuzzerToggles::default());
        let hit = candidates
            .iter()
            .find(|c| c.domain == "examplee.com")
            .expect("examplee.com generated");
        assert_eq!(hit.fuzzer, Fuzzer::Addition);
    }

    #[test]
    fn combo_is_off_by_default_and_rich_when_enabled() {
        let without = all("example.com", &FuzzerToggles::default());
        assert!(without.iter().all(|c| c.fuzzer != Fuzzer::Combo));

        let toggles = FuzzerToggles {
            combosquatting: true,
            ..Default::default()
        };
        let with = all("example.com", &toggles);
        let combos: Vec<_> = with.iter().filter(|c| c.fuzzer == Fuzzer::Combo).collect();
        assert!(combos.len() >= 300, "only {} combo candidates", combos.len());
        assert!(combos.iter().any(|c| c.domain == "login-example.com"));
        assert!(combos.iter().any(|c| c.domain == "example-login.com"));
        assert!(combos.iter().any(|c| c.domain == "example1.com"));
    }

    #[test]
    fn generated_labels_are_dns_legal() {
        let toggles = FuzzerToggles {
            combosquatting: true,
            soundalike: true,
            idn_homograph: true,
        };
        for candidate in generate("example.com", &toggles).expect("generate") {
            assert!(candidate.domain.len() <= 253);
            for label in candidate.domain.split('.') {
                assert!(is_valid_label(label), "illegal label in {}", candidate.domain);
            }
        }
    }

    #[test]
    fn idn_candidates_come_out_as_punycode() {
        let toggles = FuzzerToggles {
            idn_homograph: true,
            ..Default::default()
        };
        let candidates = all("apple.com", &toggles);
        let idn: Vec<_> = candidates
            .iter()
            .filter(|c| c.fuzzer == Fuzzer::IdnHomograph)
            .collect();
        assert!(!idn.is_empty());
        assert!(idn.iter().all(|c| c.domain.is_ascii()));
        assert!(idn.iter().any(|c| c.domain.starts_with("xn--")));
    }

    #[test]
    fn unicode_seed_is_punycoded_before_permutation() {
        // Cyrillic 'а' in place of the first 'a'
        let unicode = all("\u{0430}pple.com", &FuzzerToggles::default());
        let original = unicode
            .iter()
            .find(|c| c.fuzzer == Fuzzer::Original)
            .expect("original candidate");
        assert!(original.domain.starts_with("xn--"));
        assert!(unicode.iter().all(|c| c.domain.is_ascii()));
    }

    #[test]
    fn generation_is_deterministic() {
        let toggles = FuzzerToggles {
            combosquatting: true,
            soundalike: true,
            idn_homograph: true,
        };
        assert_eq!(all("example.com", &toggles), all("example.com", &toggles));
    }

    #[test]
    fn tld_swap_respects_multi_label_suffixes() {
        let candidates = all("example.co.uk", &FuzzerToggles::default());
        assert!(candidates.iter().any(|c| c.domain == "example.com"));
        assert!(candidates.iter().all(|c| c.domain != "example.co.uk" || c.fuzzer == Fuzzer::Original));
    }

    #[test]
    fn rejects_unusable_seeds() {
        assert!(generate("", &FuzzerToggles::default()).is_err());
        assert!(generate("nodots", &FuzzerToggles::default()).is_err());
    }

    #[test]
    fn label_validity_rules() {
        assert!(is_valid_label("example"));
        assert!(is_valid_label("ex-ample"));
        assert!(is_valid_label("login_example"));
        assert!(!is_valid_label(""));
        assert!(!is_valid_label("-example"));
        assert!(!is_valid_label("example-"));
        assert!(!is_valid_label(&"a".repeat(64)));
        assert!(is_valid_label(&"a".repeat(63)));
    }
}
