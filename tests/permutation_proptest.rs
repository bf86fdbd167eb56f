//! Property tests for the permutation generator.

use std::collections::HashSet;

use proptest::prelude::*;
use typo_sniper::scan::permutation::{generate, is_valid_label, Fuzzer, FuzzerToggles};

fn seed_strategy() -> impl Strategy<Value = String> {
    ("[a-z][a-z0-9]{1,11}", prop_oneof!["com", "net", "org", "io"])
        .prop_map(|(label, tld)| format!("{}.{}", label, tld))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn no_two_candidates_share_a_domain(seed in seed_strategy()) {
        let toggles = FuzzerToggles {
            combosquatting: true,
            soundalike: false,
            idn_homograph: true,
        };
        let mut seen = HashSet::new();
        for candidate in generate(&seed, &toggles).expect("generate") {
            prop_assert!(
                seen.insert(candidate.domain.clone()),
                "duplicate domain {}",
                candidate.domain
            );
        }
    }

    #[test]
    fn every_candidate_is_dns_legal(seed in seed_strategy()) {
        let toggles = FuzzerToggles {
            combosquatting: true,
            soundalike: false,
            idn_homograph: true,
        };
        for candidate in generate(&seed, &toggles).expect("generate") {
            prop_assert!(candidate.domain.len() <= 253);
            for label in candidate.domain.split('.') {
                prop_assert!(is_valid_label(label), "bad label in {}", candidate.domain);
            }
        }
    }

    #[test]
    fn the_seed_leads_the_stream_tagged_original(seed in seed_strategy()) {
        let mut stream = generate(&seed, &FuzzerToggles::default()).expect("generate");
        let first = stream.next().expect("at least the seed itself");
        prop_assert_eq!(first.fuzzer, Fuzzer::Original);
        prop_assert_eq!(first.domain, seed);
    }

    #[test]
    fn generation_is_deterministic(seed in seed_strategy()) {
        let toggles = FuzzerToggles {
            combosquatting: true,
            soundalike: false,
            idn_homograph: false,
        };
        let first: Vec<_> = generate(&seed, &toggles).expect("generate").collect();
        let second: Vec<_> = generate(&seed, &toggles).expect("generate").collect();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn lazy_head_consumption_matches_full_expansion(seed in seed_strategy()) {
        let toggles = FuzzerToggles::default();
        let head: Vec<_> = generate(&seed, &toggles)
            .expect("generate")
            .take(10)
            .collect();
        let full: Vec<_> = generate(&seed, &toggles).expect("generate").collect();
        prop_assert_eq!(&full[..head.len()], &head[..]);
    }
}
