//! Phonetic codes for the sound-alike fuzzer.
//!
//! Two coders are provided: American Soundex and a compact Metaphone
//! variant adequate for label-sized inputs. A generated string is a
//! sound-alike of the seed label when either code matches.

/// American Soundex: first letter plus three digits.
pub fn soundex(word: &str) -> String {
    let letters: Vec<char> = word
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    let first = match letters.first() {
        Some(&c) => c,
        None => return String::new(),
    };

    let mut code = String::with_capacity(4);
    code.push(first.to_ascii_uppercase());
    let mut last_digit = soundex_digit(first);

    for &c in &letters[1..] {
        if code.len() == 4 {
            break;
        }
        match soundex_digit(c) {
            Some(d) => {
                if last_digit != Some(d) {
                    code.push(d);
                }
                last_digit = Some(d);
            }
            None => {
                // 'h' and 'w' are transparent: same-coded consonants
                // around them still collapse
                if c != 'h' && c != 'w' {
                    last_digit = None;
                }
            }
        }
    }

    while code.len() < 4 {
        code.push('0');
    }
    code
}

fn soundex_digit(c: char) -> Option<char> {
    match c {
        'b' | 'f' | 'p' | 'v' => Some('1'),
        'c' | 'g' | 'j' | 'k' | 'q' | 's' | 'x' | 'z' => Some('2'),
        'd' | 't' => Some('3'),
        'l' => Some('4'),
        'm' | 'n' => Some('5'),
        'r' => Some('6'),
        _ => None,
    }
}

/// Compact Metaphone variant: consonant skeleton with the classic
/// digraph foldings (ph -> F, th -> 0, gh silent, soft c/g, sh -> X).
pub fn metaphone(word: &str) -> String {
    let letters: Vec<char> = word
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    if letters.is_empty() {
        return String::new();
    }

    let mut i = 0;
    // silent initial clusters
    if letters.len() >= 2 {
        match (letters[0], letters[1]) {
            ('k', 'n') | ('g', 'n') | ('p', 'n') | ('w', 'r') | ('a', 'e') => i = 1,
            ('w', 'h') => i = 1,
            ('x', _) => {}
            _ => {}
        }
    }

    let mut out = String::new();
    let mut push = |out: &mut String, c: char| {
        if out.chars().last() != Some(c) {
            out.push(c);
        }
    };

    while i < letters.len() {
        let c = letters[i];
        let next = letters.get(i + 1).copied();
        let next2 = letters.get(i + 2).copied();

        // collapse doubled letters except 'c'
        if c != 'c' && next == Some(c) {
            i += 1;
            continue;
        }

        match c {
            'a' | 'e' | 'i' | 'o' | 'u' => {
                if i == 0 {
                    push(&mut out, c.to_ascii_uppercase());
                }
                i += 1;
            }
            'b' => {
                // silent terminal -mb
                let silent = i + 1 == letters.len() && i > 0 && letters[i - 1] == 'm';
                if !silent {
                    push(&mut out, 'B');
                }
                i += 1;
            }
            'c' => {
                if next == Some('h') {
                    push(&mut out, 'X');
                    i += 2;
                } else if matches!(next, Some('i') | Some('e') | Some('y')) {
                    push(&mut out, 'S');
                    i += 1;
                } else {
                    push(&mut out, 'K');
                    i += 1;
                }
            }
            'd' => {
                if next == Some('g') && matches!(next2, Some('e') | Some('i') | Some('y')) {
                    push(&mut out, 'J');
                    i += 2;
                } else {
                    push(&mut out, 'T');
                    i += 1;
                }
            }
            'g' => {
                if next == Some('h') {
                    let vowel_after = matches!(next2, Some('a' | 'e' | 'i' | 'o' | 'u'));
                    if vowel_after {
                        push(&mut out, 'K');
                        i += 2;
                    } else {
                        // silent as in "night"
                        i += 2;
                    }
                } else if matches!(next, Some('i') | Some('e') | Some('y')) {
                    push(&mut out, 'J');
                    i += 1;
                } else {
                    push(&mut out, 'K');
                    i += 1;
                }
            }
            'h' => {
                let prev_vowel = i > 0 && matches!(letters[i - 1], 'a' | 'e' | 'i' | 'o' | 'u');
                let next_vowel = matches!(next, Some('a' | 'e' | 'i' | 'o' | 'u'));
                if !prev_vowel || next_vowel {
                    push(&mut out, 'H');
                }
                i += 1;
            }
            'k' => {
                // silent after 'c' (the 'c' already coded K)
                if !(i > 0 && letters[i - 1] == 'c') {
                    push(&mut out, 'K');
                }
                i += 1;
            }
            'p' => {
                if next == Some('h') {
                    push(&mut out, 'F');
                    i += 2;
                } else {
                    push(&mut out, 'P');
                    i += 1;
                }
            }
            'q' => {
                push(&mut out, 'K');
                i += 1;
            }
            's' => {
                if next == Some('h') {
                    push(&mut out, 'X');
                    i += 2;
                } else if next == Some('i') && matches!(next2, Some('o') | Some('a')) {
                    push(&mut out, 'X');
                    i += 1;
                } else {
                    push(&mut out, 'S');
                    i += 1;
                }
            }
            't' => {
                if next == Some('h') {
                    push(&mut out, '0');
                    i += 2;
                } else if next == Some('i') && matches!(next2, Some('o') | Some('a')) {
                    push(&mut out, 'X');
                    i += 1;
                } else {
                    push(&mut out, 'T');
                    i += 1;
                }
            }
            'v' => {
                push(&mut out, 'F');
                i += 1;
            }
            'w' | 'y' => {
                if matches!(next, Some('a' | 'e' | 'i' | 'o' | 'u')) {
                    push(&mut out, c.to_ascii_uppercase());
                }
                i += 1;
            }
            'x' => {
                push(&mut out, 'K');
                push(&mut out, 'S');
                i += 1;
            }
            'z' => {
                push(&mut out, 'S');
                i += 1;
            }
            'f' | 'j' | 'l' | 'm' | 'n' | 'r' => {
                push(&mut out, c.to_ascii_uppercase());
                i += 1;
            }
            _ => {
                i += 1;
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn soundex_reference_vectors() {
        assert_eq!(soundex("robert"), "R163");
        assert_eq!(soundex("rupert"), "R163");
        assert_eq!(soundex("ashcraft"), "A261");
        assert_eq!(soundex("tymczak"), "T522");
        assert_eq!(soundex("pfister"), "P236");
        assert_eq!(soundex("honeyman"), "H555");
    }

    #[test]
    fn soundex_pads_short_words() {
        assert_eq!(soundex("at"), "A300");
        assert_eq!(soundex("a"), "A000");
    }

    #[test]
    fn soundex_ignores_non_letters() {
        assert_eq!(soundex("ro-bert"), soundex("robert"));
        assert_eq!(soundex(""), "");
    }

    #[test]
    fn metaphone_folds_common_digraphs() {
        assert_eq!(metaphone("phone"), metaphone("fone"));
        assert_eq!(metaphone("night"), metaphone("nite"));
        assert_eq!(metaphone("shop"), "XP");
    }

    #[test]
    fn metaphone_distinguishes_unrelated_words() {
        assert_ne!(metaphone("paypal"), metaphone("amazon"));
        assert_ne!(metaphone("google"), metaphone("example"));
    }
}
