//! "Did you mean" lookups for misspelled names

/// Pick the closest candidate to `name`.
///
/// Case-insensitive containment wins first; otherwise the candidate with
/// the smallest edit distance, if that distance is at most 2. Ties keep
/// the earliest candidate.
pub fn closest<'a, I>(name: &str, candidates: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let lower = name.to_lowercase();
    let candidates: Vec<&str> = candidates.into_iter().filter(|c| *c != name).collect();

    if !lower.is_empty() {
        let contained = candidates.iter().find(|c| {
            let other = c.to_lowercase();
            !other.is_empty() && (other.contains(&lower) || lower.contains(&other))
        });
        if let Some(found) = contained {
            return Some(found.to_string());
        }
    }

    let mut best: Option<(usize, &str)> = None;
    for candidate in candidates {
        let distance = levenshtein(&lower, &candidate.to_lowercase());
        if distance <= 2 && best.is_none_or(|(d, _)| distance < d) {
            best = Some((distance, candidate));
        }
    }
    best.map(|(_, c)| c.to_string())
}

fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.chars().enumerate() {
        let mut current = vec![i + 1; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            current[j + 1] = (previous[j] + cost)
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }
        previous = current;
    }
    previous[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_containment_first() {
        assert_eq!(
            closest("fetch", ["Parse", "HttpFetch"]),
            Some("HttpFetch".to_string())
        );
    }

    #[test]
    fn test_edit_distance() {
        assert_eq!(closest("Pasre", ["Parse", "Log"]), Some("Parse".to_string()));
        assert_eq!(closest("Completely", ["Parse", "Log"]), None);
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("same", "same"), 0);
    }
}
