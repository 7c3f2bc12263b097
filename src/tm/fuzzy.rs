use std::collections::BTreeSet;

/// Levenshtein-distance-based ratio in `[0, 100]`. This stands in for
/// `rapidfuzz`'s indel-based `ratio`, which this crate does not depend on;
/// the two agree closely on short strings and diverge only on inputs with
/// long common subsequences interrupted by transpositions.
fn simple_ratio(a: &str, b: &str) -> f64 {
    let a_len = a.chars().count();
    let b_len = b.chars().count();
    let total = a_len + b_len;
    if total == 0 {
        return 100.0;
    }
    let distance = strsim::levenshtein(a, b) as f64;
    ((total as f64 - distance) / total as f64) * 100.0
}

fn tokens(text: &str) -> BTreeSet<&str> {
    text.split_whitespace().collect()
}

/// Reimplementation of `fuzzywuzzy`/`rapidfuzz`'s `token_set_ratio`: split
/// both strings into word sets, compare the shared-token core against each
/// side's leftover tokens and against each other, and take the best of the
/// three pairwise ratios. This rewards a match where one string is a
/// superset of the other's words, even when word order or extra
/// qualifiers differ.
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let tokens_a = tokens(a);
    let tokens_b = tokens(b);

    let intersection: Vec<&str> = tokens_a.intersection(&tokens_b).copied().collect();
    let only_a: Vec<&str> = tokens_a.difference(&tokens_b).copied().collect();
    let only_b: Vec<&str> = tokens_b.difference(&tokens_a).copied().collect();

    let sorted_intersection = intersection.join(" ");
    let combined_with_a = join_nonempty(&sorted_intersection, &only_a.join(" "));
    let combined_with_b = join_nonempty(&sorted_intersection, &only_b.join(" "));

    let pairwise = [
        simple_ratio(&sorted_intersection, &combined_with_a),
        simple_ratio(&sorted_intersection, &combined_with_b),
        simple_ratio(&combined_with_a, &combined_with_b),
    ];

    pairwise.into_iter().fold(0.0_f64, f64::max)
}

fn join_nonempty(left: &str, right: &str) -> String {
    if left.is_empty() {
        right.to_string()
    } else if right.is_empty() {
        left.to_string()
    } else {
        format!("{left} {right}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_strings_score_100() {
        assert_eq!(token_set_ratio("hello world", "hello world"), 100.0);
    }

    #[test]
    fn superset_of_words_scores_highly() {
        let score = token_set_ratio("attack the goblin", "attack the goblin now");
        assert!(score > 85.0, "expected high score, got {score}");
    }

    #[test]
    fn unrelated_strings_score_low() {
        let score = token_set_ratio("attack the goblin", "completely different sentence");
        assert!(score < 50.0, "expected low score, got {score}");
    }
}
