//! An approximate weighted-ratio scorer in `[0, 100]`, standing in for the
//! source engine's RapidFuzz `WRatio`. Composes several of `strsim`'s
//! string-distance metrics the way `WRatio` composes its own simple,
//! partial, and token-based ratios, and takes their maximum.

/// Whether `query` looks like noise rather than a real search term: long,
/// and mixing digits with letters. Noisy queries get a stricter score
/// cutoff (see [`crate::config::Config::fuzzy_score_cutoff_noisy`]).
pub fn is_likely_noise(query: &str) -> bool {
    let has_digit = query.chars().any(|c| c.is_ascii_digit());
    let has_alpha = query.chars().any(|c| c.is_alphabetic());
    query.chars().count() > 12 && has_digit && has_alpha
}

/// A weighted-ratio similarity score between `query` and `text`, in
/// `[0, 100]`. Takes the best of a whole-string ratio, a best-substring
/// ("partial") ratio, and token-order-insensitive ratios, mirroring
/// `WRatio`'s strategy of picking whichever comparison best fits the
/// relative lengths and word structure of the two inputs.
pub fn score(query: &str, text: &str) -> u32 {
    if query.is_empty() || text.is_empty() {
        return 0;
    }
    let candidates = [
        ratio(query, text),
        partial_ratio(query, text),
        token_sort_ratio(query, text),
        token_set_ratio(query, text),
    ];
    let best = candidates.into_iter().fold(0.0_f64, f64::max);
    (best * 100.0).round().clamp(0.0, 100.0) as u32
}

fn ratio(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b)
}

/// The best alignment of `query` against any equal-length window of `text`
/// (or vice versa, if `text` is shorter), approximating RapidFuzz's
/// `partial_ratio`.
fn partial_ratio(query: &str, text: &str) -> f64 {
    let (shorter, longer) = if query.chars().count() <= text.chars().count() {
        (query, text)
    } else {
        (text, query)
    };
    let short_len = shorter.chars().count();
    if short_len == 0 {
        return 0.0;
    }
    let long_chars: Vec<char> = longer.chars().collect();
    if long_chars.len() <= short_len {
        return ratio(shorter, longer);
    }

    let mut best = 0.0_f64;
    for start in 0..=(long_chars.len() - short_len) {
        let window: String = long_chars[start..start + short_len].iter().collect();
        best = best.max(ratio(shorter, &window));
    }
    best
}

fn sorted_tokens(s: &str) -> Vec<&str> {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens
}

fn token_sort_ratio(a: &str, b: &str) -> f64 {
    let a_sorted = sorted_tokens(a).join(" ");
    let b_sorted = sorted_tokens(b).join(" ");
    ratio(&a_sorted, &b_sorted)
}

fn token_set_ratio(a: &str, b: &str) -> f64 {
    use std::collections::BTreeSet;
    let a_set: BTreeSet<&str> = a.split_whitespace().collect();
    let b_set: BTreeSet<&str> = b.split_whitespace().collect();

    let intersection: Vec<&str> = a_set.intersection(&b_set).copied().collect();
    let a_only: Vec<&str> = a_set.difference(&b_set).copied().collect();
    let b_only: Vec<&str> = b_set.difference(&a_set).copied().collect();

    let shared = intersection.join(" ");
    let combined_a = [shared.as_str(), a_only.join(" ").as_str()].join(" ");
    let combined_a = combined_a.trim();
    let combined_b = [shared.as_str(), b_only.join(" ").as_str()].join(" ");
    let combined_b = combined_b.trim();

    [
        ratio(&shared, combined_a),
        ratio(&shared, combined_b),
        ratio(combined_a, combined_b),
    ]
    .into_iter()
    .fold(0.0_f64, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_strings_score_100() {
        assert_eq!(score("architect", "architect"), 100);
    }

    #[test]
    fn single_character_typo_scores_well_above_cutoff() {
        assert!(score("architet", "architect") > 35);
        assert!(score("archittect", "architect") > 35);
    }

    #[test]
    fn unrelated_strings_score_low() {
        assert!(score("architect", "zzzzzzzzz") < 35);
    }

    #[test]
    fn noise_detection_requires_length_digits_and_letters() {
        assert!(is_likely_noise("xyznonexistent123"));
        assert!(!is_likely_noise("architect"));
        assert!(!is_likely_noise("12345678901234"));
    }
}
