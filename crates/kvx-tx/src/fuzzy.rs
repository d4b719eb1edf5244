//! Deterministic weighted name similarity on a 0-100 scale.
//!
//! Used to discover foreign-key relationships between inferred names
//! ("movie_id" vs the "Movie" table) and to spot id-carrying paths when
//! flattening. The algorithm is pinned: normalized Levenshtein over
//! case-folded, punctuation-folded strings, a token-sort variant for
//! reordered names, and a 0.9-weighted best-window partial ratio when one
//! name is much longer than the other.

use strsim::levenshtein;

/// Case-fold and replace every non-alphanumeric character with a space.
fn full_process(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
        } else {
            out.push(' ');
        }
    }
    out.trim().to_string()
}

/// Normalized Levenshtein ratio on already-processed strings.
fn ratio(a: &str, b: &str) -> u32 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 100;
    }
    let dist = levenshtein(a, b);
    (100.0 * (1.0 - dist as f64 / max_len as f64)).round() as u32
}

/// Ratio over whitespace-split tokens in sorted order, so `"first last"`
/// and `"last first"` compare equal.
fn token_sort_ratio(a: &str, b: &str) -> u32 {
    let mut ta: Vec<&str> = a.split_whitespace().collect();
    let mut tb: Vec<&str> = b.split_whitespace().collect();
    ta.sort_unstable();
    tb.sort_unstable();
    ratio(&ta.join(" "), &tb.join(" "))
}

/// Best ratio of the shorter string against every same-length window of the
/// longer one.
fn partial_ratio(a: &str, b: &str) -> u32 {
    let ca: Vec<char> = a.chars().collect();
    let cb: Vec<char> = b.chars().collect();
    let (short, long) = if ca.len() <= cb.len() { (ca, cb) } else { (cb, ca) };
    if short.is_empty() {
        return 0;
    }
    let needle: String = short.iter().collect();
    let mut best = 0;
    for window in long.windows(short.len()) {
        let hay: String = window.iter().collect();
        best = best.max(ratio(&needle, &hay));
        if best == 100 {
            break;
        }
    }
    best
}

/// Weighted similarity between two names, 0-100.
///
/// Near-equal lengths compare by plain and token-sorted ratio. When the
/// lengths diverge by 1.5x or more, the best partial window is scored
/// instead, damped by 0.9 (0.6 past an 8x divergence) so a short name
/// embedded in a long one still has to earn the match.
pub fn weighted_ratio(a: &str, b: &str) -> u32 {
    let pa = full_process(a);
    let pb = full_process(b);
    if pa.is_empty() || pb.is_empty() {
        return 0;
    }

    let base = ratio(&pa, &pb);
    let la = pa.chars().count() as f64;
    let lb = pb.chars().count() as f64;
    let len_ratio = la.max(lb) / la.min(lb);

    if len_ratio < 1.5 {
        base.max(token_sort_ratio(&pa, &pb))
    } else {
        let scale = if len_ratio > 8.0 { 0.6 } else { 0.9 };
        let partial = (partial_ratio(&pa, &pb) as f64 * scale).round() as u32;
        base.max(partial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_names_score_100() {
        assert_eq!(weighted_ratio("Movie", "Movie"), 100);
        assert_eq!(weighted_ratio("UserID", "userId"), 100);
    }

    #[test]
    fn id_suffixed_names_clear_the_default_threshold() {
        assert!(weighted_ratio("movie_id", "Movie") >= 75);
        assert!(weighted_ratio("watchedMovies", "Movie") >= 75);
    }

    #[test]
    fn unrelated_names_stay_below_threshold() {
        assert!(weighted_ratio("watched", "Movie") < 75);
        assert!(weighted_ratio("name", "User") < 75);
        assert!(weighted_ratio("email", "Addr") < 75);
    }

    #[test]
    fn token_order_does_not_matter() {
        assert_eq!(weighted_ratio("first_name", "name_first"), 100);
    }

    #[test]
    fn empty_inputs_score_zero() {
        assert_eq!(weighted_ratio("", "Movie"), 0);
        assert_eq!(weighted_ratio("__", "--"), 0);
    }
}
