//! Plain-text heuristics shared by the channel processors.

/// Ratio of uppercase letters among alphabetic characters.
pub fn uppercase_ratio(text: &str) -> f64 {
    let mut alpha = 0usize;
    let mut upper = 0usize;
    for c in text.chars() {
        if c.is_alphabetic() {
            alpha += 1;
            if c.is_uppercase() {
                upper += 1;
            }
        }
    }
    if alpha == 0 {
        return 0.0;
    }
    upper as f64 / alpha as f64
}

pub fn exclamation_count(text: &str) -> usize {
    text.chars().filter(|c| *c == '!').count()
}

pub fn mention_count(text: &str) -> usize {
    text.chars().filter(|c| *c == '@').count()
}

/// Rough emoji count: characters in the common emoji/symbol planes.
pub fn emoji_count(text: &str) -> usize {
    text.chars()
        .filter(|c| {
            let cp = *c as u32;
            (0x1F300..=0x1FAFF).contains(&cp) || (0x2600..=0x27BF).contains(&cp)
        })
        .count()
}

/// Case-insensitive substring check over a set of keywords. Returns how many
/// keywords are present.
pub fn keyword_hits(text: &str, keywords: &[&str]) -> usize {
    let lowered = text.to_lowercase();
    keywords.iter().filter(|k| lowered.contains(*k)).count()
}
