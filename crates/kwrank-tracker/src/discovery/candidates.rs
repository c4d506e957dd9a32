//! Keyword candidates extracted from listing text and category seeds.

use std::collections::{HashMap, HashSet};

use kwrank_core::{normalize_keyword, AppListing, CategorySeeds, Confidence};

/// Longest n-gram taken from the app name and subtitle.
const MAX_NGRAM: usize = 3;
/// Occurrences a description term needs before it becomes a candidate.
const DESCRIPTION_MIN_OCCURRENCES: usize = 2;
const MIN_TOKEN_CHARS: usize = 3;
/// One candidate in this many is held back for category seeds.
const SEED_SHARE_DIVISOR: usize = 4;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "app", "apps", "are", "as", "at", "be", "best", "by", "can", "for", "free",
    "from", "get", "has", "have", "in", "into", "is", "it", "its", "more", "new", "now", "of",
    "on", "or", "our", "the", "this", "to", "with", "you", "your",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub keyword: String,
    pub confidence: Confidence,
}

fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(&token)
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_content_token(token: &str) -> bool {
    token.chars().count() >= MIN_TOKEN_CHARS
        && !is_stopword(token)
        && !token.chars().all(|c| c.is_ascii_digit())
}

/// Every 1..=3-gram that neither starts nor ends on a stopword.
fn ngrams(tokens: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    for len in 1..=MAX_NGRAM {
        for window in tokens.windows(len) {
            let (Some(first), Some(last)) = (window.first(), window.last()) else {
                continue;
            };
            if !is_content_token(first) || !is_content_token(last) {
                continue;
            }
            out.push(window.join(" "));
        }
    }
    out
}

/// Terms and bigrams repeated at least twice in the description, most frequent first.
fn repeated_terms(description: &str) -> Vec<String> {
    let tokens = tokenize(description);
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();

    let mut bump = |term: String, index: usize| {
        counts.entry(term).or_insert((0, index)).0 += 1;
    };
    for (i, token) in tokens.iter().enumerate() {
        if is_content_token(token) {
            bump(token.clone(), i);
        }
    }
    for (i, pair) in tokens.windows(2).enumerate() {
        if is_content_token(&pair[0]) && is_content_token(&pair[1]) {
            bump(pair.join(" "), i);
        }
    }

    let mut repeated: Vec<(String, usize, usize)> = counts
        .into_iter()
        .filter(|(_, (count, _))| *count >= DESCRIPTION_MIN_OCCURRENCES)
        .map(|(term, (count, first))| (term, count, first))
        .collect();
    repeated.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)).then(a.0.cmp(&b.0)));
    repeated.into_iter().map(|(term, _, _)| term).collect()
}

fn dedup_normalized<'a>(
    terms: impl IntoIterator<Item = &'a str>,
    seen: &mut HashSet<String>,
) -> Vec<String> {
    terms
        .into_iter()
        .filter_map(|raw| normalize_keyword(raw).ok())
        .filter(|keyword| seen.insert(keyword.clone()))
        .collect()
}

/// Build the ordered, de-duplicated candidate list for `listing`.
///
/// Listing-derived candidates come first and are `High`; category seeds follow
/// as `Medium`. At most `max` candidates are returned, and when `max > 1` up
/// to a quarter of them (rounded up) are kept for seeds. Space one source
/// leaves unused goes to the other.
#[must_use]
pub fn build_candidates(listing: &AppListing, seeds: &CategorySeeds, max: usize) -> Vec<Candidate> {
    let mut listing_terms = ngrams(&tokenize(&listing.name));
    if let Some(subtitle) = &listing.subtitle {
        listing_terms.extend(ngrams(&tokenize(subtitle)));
    }
    if let Some(description) = &listing.description {
        listing_terms.extend(repeated_terms(description));
    }

    let seed_terms = listing
        .category
        .as_deref()
        .map(|category| seeds.for_category(category))
        .unwrap_or_default();

    let mut seen = HashSet::new();
    let high = dedup_normalized(listing_terms.iter().map(String::as_str), &mut seen);
    let medium = dedup_normalized(seed_terms.iter().map(String::as_str), &mut seen);

    let reserved = if max > 1 {
        max.div_ceil(SEED_SHARE_DIVISOR).min(medium.len())
    } else {
        0
    };
    let high_taken = high.len().min(max - reserved);
    let medium_taken = medium.len().min(max - high_taken);

    high.into_iter()
        .take(high_taken)
        .map(|keyword| Candidate {
            keyword,
            confidence: Confidence::High,
        })
        .chain(medium.into_iter().take(medium_taken).map(|keyword| Candidate {
            keyword,
            confidence: Confidence::Medium,
        }))
        .collect()
}
