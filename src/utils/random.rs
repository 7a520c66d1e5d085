//! Random strings drawn from a fixed character set with positional rules.

use rand::Rng;

pub const LOWER_ALNUM: &str = "abcdefghijklmnopqrstuvwxyz0123456789";
pub const ALNUM: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
pub const PASSWORD: &str =
    "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!@#$%^&*()_+[]{}|;:',.<>?";

/// Constraint on which characters may appear at a given position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionRule {
    Any,
    /// No `-` as first or last character.
    DomainLabel,
    /// First character is not an ASCII digit.
    NoLeadingDigit,
}

impl PositionRule {
    pub fn allows(&self, c: char, index: usize, len: usize) -> bool {
        match self {
            PositionRule::Any => true,
            PositionRule::DomainLabel => !(c == '-' && (index == 0 || index + 1 == len)),
            PositionRule::NoLeadingDigit => !(index == 0 && c.is_ascii_digit()),
        }
    }
}

/// Uniformly draw `len` characters from `charset`, re-rolling any that break `rule`.
///
/// Returns an empty string if `charset` has no character that satisfies the rule at some
/// position.
pub fn random_string(charset: &str, len: usize, rule: PositionRule) -> String {
    random_string_with(&mut rand::thread_rng(), charset, len, rule)
}

pub fn random_string_with<R: Rng + ?Sized>(
    rng: &mut R,
    charset: &str,
    len: usize,
    rule: PositionRule,
) -> String {
    let chars: Vec<char> = charset.chars().collect();
    let mut out = String::with_capacity(len);

    for index in 0..len {
        let allowed: Vec<char> = chars
            .iter()
            .copied()
            .filter(|c| rule.allows(*c, index, len))
            .collect();
        if allowed.is_empty() {
            return String::new();
        }
        out.push(allowed[rng.gen_range(0..allowed.len())]);
    }

    out
}
