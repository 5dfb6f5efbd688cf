//! Natural (human) ordering for file names.
//!
//! Digit runs compare numerically, everything else compares as
//! case-insensitive characters, so `image2.png` sorts before `image10.png`.

use std::cmp::Ordering;

/// Compare two strings under natural order.
pub fn compare(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();

    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(lc), Some(rc)) if lc.is_ascii_digit() && rc.is_ascii_digit() => {
                let ln = take_digits(&mut left);
                let rn = take_digits(&mut right);
                match compare_digit_runs(&ln, &rn) {
                    Ordering::Equal => continue,
                    other => return other,
                }
            }
            (Some(lc), Some(rc)) => {
                let lc = lc.to_ascii_lowercase();
                let rc = rc.to_ascii_lowercase();
                if lc != rc {
                    return lc.cmp(&rc);
                }
                left.next();
                right.next();
            }
        }
    }
}

/// Consume a run of ASCII digits.
fn take_digits(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut run = String::new();
    while let Some(c) = chars.peek().copied() {
        if !c.is_ascii_digit() {
            break;
        }
        run.push(c);
        chars.next();
    }
    run
}

/// Compare two digit runs numerically without parsing into a fixed-width
/// integer (runs can be arbitrarily long).
fn compare_digit_runs(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_runs_compare_numerically() {
        assert_eq!(compare("image2.png", "image10.png"), Ordering::Less);
        assert_eq!(compare("image10.png", "image9.png"), Ordering::Greater);
    }

    #[test]
    fn leading_zeros_do_not_inflate_numbers() {
        assert_eq!(compare("image002.png", "image3.png"), Ordering::Less);
        assert_eq!(compare("image010.png", "image10.png"), Ordering::Equal);
    }

    #[test]
    fn comparison_ignores_ascii_case() {
        assert_eq!(compare("Logo1.png", "logo1.PNG"), Ordering::Equal);
    }

    #[test]
    fn plain_strings_fall_back_to_lexicographic() {
        assert_eq!(compare("alpha.png", "beta.png"), Ordering::Less);
        assert_eq!(compare("a", "ab"), Ordering::Less);
    }

    #[test]
    fn sorting_a_directory_listing() {
        let mut names = vec!["image10.png", "image1.png", "image2.png"];
        names.sort_by(|a, b| compare(a, b));
        assert_eq!(names, vec!["image1.png", "image2.png", "image10.png"]);
    }
}
