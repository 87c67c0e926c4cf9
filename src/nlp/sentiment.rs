//! Hand-rolled lexical sentiment scorer.
//!
//! No sentiment-analysis crate is present anywhere in this codebase's
//! dependency stack, so polarity is computed directly over a small
//! AFINN-style signed word-weight table, the same way the risk engine
//! elsewhere in this codebase implements its quantitative models directly
//! over numeric primitives rather than reaching for an external library.
//! A preceding "not"/"no"/"never" flips the sign of the following weighted
//! word, a minimal negation handle that covers the headline-style titles
//! this scorer sees.

const NEGATORS: &[&str] = &["not", "no", "never", "without"];

/// word -> weight in [-5, 5], matching AFINN's convention.
const LEXICON: &[(&str, i32)] = &[
    ("war", -4),
    ("attack", -4),
    ("attacks", -4),
    ("violence", -4),
    ("violent", -4),
    ("kill", -5),
    ("kills", -5),
    ("killed", -5),
    ("killing", -5),
    ("dead", -4),
    ("death", -4),
    ("terrorism", -5),
    ("terrorist", -5),
    ("bombing", -5),
    ("bomb", -4),
    ("crisis", -3),
    ("conflict", -3),
    ("invasion", -4),
    ("insurgency", -4),
    ("unrest", -3),
    ("riot", -3),
    ("riots", -3),
    ("protest", -2),
    ("protests", -2),
    ("strike", -2),
    ("sanctions", -3),
    ("embargo", -3),
    ("collapse", -4),
    ("crash", -4),
    ("recession", -3),
    ("inflation", -2),
    ("corruption", -3),
    ("scandal", -3),
    ("threat", -3),
    ("threatens", -3),
    ("fear", -2),
    ("fears", -2),
    ("tension", -2),
    ("tensions", -2),
    ("fight", -2),
    ("fighting", -3),
    ("battle", -3),
    ("assault", -4),
    ("military", -1),
    ("wounded", -3),
    ("injured", -2),
    ("displaced", -3),
    ("emergency", -2),
    ("disaster", -4),
    ("peace", 3),
    ("peaceful", 3),
    ("agreement", 2),
    ("agreements", 2),
    ("treaty", 2),
    ("deal", 1),
    ("talks", 1),
    ("summit", 1),
    ("cooperation", 3),
    ("growth", 2),
    ("recovery", 2),
    ("stability", 2),
    ("stable", 2),
    ("progress", 2),
    ("success", 3),
    ("successful", 3),
    ("win", 2),
    ("wins", 2),
    ("support", 1),
    ("supports", 1),
    ("boost", 2),
    ("investment", 1),
    ("celebrate", 3),
    ("celebrates", 3),
    ("welcome", 2),
    ("welcomes", 2),
];

fn lookup(word: &str) -> Option<i32> {
    LEXICON
        .iter()
        .find(|(w, _)| *w == word)
        .map(|(_, weight)| *weight)
}

fn normalize(token: &str) -> String {
    token
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

/// Polarity of `title` in [-1, 1]. Returns an error only if the title
/// tokenizes to nothing usable; callers fold that into a degraded path
/// where the event's sentiment becomes 0.0 and confidence is halved.
pub fn lexical_polarity(title: &str) -> anyhow::Result<f64> {
    let tokens: Vec<String> = title.split_whitespace().map(normalize).collect();
    if tokens.is_empty() {
        anyhow::bail!("empty title, nothing to score");
    }

    let mut total = 0.0_f64;
    let mut matched = 0usize;
    let mut negate_next = false;

    for token in &tokens {
        if NEGATORS.contains(&token.as_str()) {
            negate_next = true;
            continue;
        }
        if let Some(weight) = lookup(token) {
            let signed = if negate_next { -weight } else { weight };
            total += signed as f64;
            matched += 1;
            negate_next = false;
        }
    }

    if matched == 0 {
        return Ok(0.0);
    }

    Ok((total / (matched as f64 * 5.0)).clamp(-1.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strongly_negative_title_scores_negative() {
        let score = lexical_polarity("Bombing and terrorism attack kills 10").unwrap();
        assert!(score < -0.5, "expected strongly negative, got {score}");
    }

    #[test]
    fn positive_title_scores_positive() {
        let score = lexical_polarity("Leaders celebrate peace agreement after summit").unwrap();
        assert!(score > 0.0, "expected positive, got {score}");
    }

    #[test]
    fn neutral_title_with_no_lexicon_hits_scores_zero() {
        let score = lexical_polarity("Quarterly report released on schedule").unwrap();
        assert_eq!(score, 0.0);
    }

    #[test]
    fn negation_flips_sign() {
        let positive = lexical_polarity("A peaceful resolution").unwrap();
        let negated = lexical_polarity("Not a peaceful resolution").unwrap();
        assert!(negated < positive);
    }

    #[test]
    fn stays_within_bounds() {
        let score = lexical_polarity(
            "War war war attack attack kill kill kill kill terrorism terrorism bombing",
        )
        .unwrap();
        assert!((-1.0..=1.0).contains(&score));
    }
}
