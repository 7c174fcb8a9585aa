//! Fractional ranks for sibling ordering
//!
//! A rank is a short string; siblings sort by plain lexicographic comparison.
//! New ranks are always produced strictly between two neighbours, so a move
//! rewrites only the moved item's rank.
//!
//! Keys are drawn from `0-9a-z` in ASCII order. Generated keys never end in
//! the minimum symbol `0`, which guarantees there is always room below them.
//! Ranks from older data may contain other characters; they are compared as
//! they are and copied through when they form a shared prefix.

/// Rank symbols in ascending order
pub const ALPHABET: &str = "0123456789abcdefghijklmnopqrstuvwxyz";

/// Smallest symbol
pub const MIN: char = '0';

/// Key for the first item of an empty sibling list, and the extension symbol
pub const MID: char = 'h';

fn symbols() -> impl Iterator<Item = char> {
    ALPHABET.chars()
}

fn middle(candidates: &[char]) -> Option<char> {
    candidates.get(candidates.len() / 2).copied()
}

/// A key strictly between `prev` and `next`; an empty bound means unbounded.
///
/// When `prev >= next` (equal ranks from older data, or a caller passing the
/// bounds the wrong way round) the result is `prev` extended by [`MID`]: it
/// sorts after `prev` and nothing else is renumbered.
pub fn between(prev: &str, next: &str) -> String {
    if next.is_empty() {
        return after(prev);
    }
    if prev >= next {
        return format!("{}{}", prev, MID);
    }

    let a: Vec<char> = prev.chars().collect();
    let b: Vec<char> = next.chars().collect();
    let mut out = String::new();
    let mut i = 0;
    loop {
        match (a.get(i).copied(), b.get(i).copied()) {
            (Some(ca), Some(cb)) if ca == cb => {
                out.push(ca);
                i += 1;
            }
            (Some(ca), Some(cb)) => {
                // Common prefix ends here and ca < cb.
                let inside: Vec<char> = symbols().filter(|c| *c > ca && *c < cb).collect();
                if let Some(c) = middle(&inside) {
                    out.push(c);
                } else {
                    out.push(ca);
                    out.push_str(&after_chars(&a[i + 1..]));
                }
                return out;
            }
            (None, Some(_)) => {
                // prev is a proper prefix of next
                out.push_str(&below(&b[i..]));
                return out;
            }
            (_, None) => {
                // Unreachable for prev < next; keep the documented fallback.
                return format!("{}{}", prev, MID);
            }
        }
    }
}

/// A key strictly greater than `prev`.
pub fn after(prev: &str) -> String {
    let a: Vec<char> = prev.chars().collect();
    after_chars(&a)
}

/// A key strictly less than `next` (and greater than the empty string).
pub fn before(next: &str) -> String {
    between("", next)
}

fn after_chars(a: &[char]) -> String {
    let mut out = String::new();
    for &c in a {
        let higher: Vec<char> = symbols().filter(|x| *x > c).collect();
        if let Some(h) = middle(&higher) {
            out.push(h);
            return out;
        }
        out.push(c);
    }
    out.push(MID);
    out
}

/// Non-empty key strictly below the non-empty `rest`.
fn below(rest: &[char]) -> String {
    let mut out = String::new();
    for (i, &c) in rest.iter().enumerate() {
        let lower: Vec<char> = symbols().filter(|x| *x < c).collect();
        match lower.len() {
            0 if i + 1 < rest.len() => {
                // Bound starts with the minimum; go one character deeper.
                out.push(c);
            }
            0 => {
                // Bound is all minimum symbols: step just outside the alphabet.
                if let Some(prev) = (c as u32).checked_sub(1).and_then(char::from_u32) {
                    out.push(prev);
                }
                out.push(MID);
                return out;
            }
            1 => {
                out.push(lower[0]);
                out.push(MID);
                return out;
            }
            n => {
                out.push(lower[n / 2]);
                return out;
            }
        }
    }
    out.push(MID);
    out
}
