//! Arithmetic facts about a number. Stateless and total on `0..=999`.

use serde::Serialize;

/// Where `σ(n) - n` puts a positive integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Abundance {
    Deficient,
    Perfect,
    Abundant,
}

impl Abundance {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Deficient => "deficient",
            Self::Perfect => "perfect",
            Self::Abundant => "abundant",
        }
    }
}

/// Everything the facts block of a page shows.
///
/// Divisor-based fields are `None` for 0, where they are undefined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NumberFacts {
    pub n: u16,
    pub is_prime: bool,
    /// `(prime, exponent)` pairs in ascending prime order.
    pub factors: Vec<(u32, u32)>,
    pub divisor_count: Option<u32>,
    pub divisor_sum: Option<u32>,
    pub proper_divisor_sum: Option<u32>,
    pub abundance: Option<Abundance>,
    pub totient: Option<u32>,
    pub digit_sum: u32,
    pub is_even: bool,
    pub is_square: bool,
    pub is_cube: bool,
    pub is_triangular: bool,
    pub is_fibonacci: bool,
    /// Of the form `2^k - 1` with `k >= 1`.
    pub is_mersenne: bool,
    pub binary: String,
    pub octal: String,
    pub hexadecimal: String,
    pub roman: Option<String>,
    pub english: String,
}

impl NumberFacts {
    /// `2^3 × 5`; `0` and `1` render as themselves.
    pub fn factorization(&self) -> String {
        if self.factors.is_empty() {
            return self.n.to_string();
        }
        self.factors
            .iter()
            .map(|&(p, e)| if e == 1 { p.to_string() } else { format!("{p}^{e}") })
            .collect::<Vec<_>>()
            .join(" × ")
    }

    /// `prime`, `composite`, or `neither` (0 and 1).
    pub fn class(&self) -> &'static str {
        if self.is_prime {
            "prime"
        } else if self.n < 2 {
            "neither prime nor composite"
        } else {
            "composite"
        }
    }

    /// Names of the special forms this number takes.
    pub fn flags(&self) -> Vec<&'static str> {
        [
            (self.is_square, "square"),
            (self.is_cube, "cube"),
            (self.is_triangular, "triangular"),
            (self.is_fibonacci, "Fibonacci"),
            (self.is_mersenne, "Mersenne"),
        ]
        .into_iter()
        .filter_map(|(on, name)| on.then_some(name))
        .collect()
    }
}

/// Compute all facts for `n`.
pub fn compute(n: u16) -> NumberFacts {
    let value = u32::from(n);
    let factors = factorize(value);

    let (divisor_count, divisor_sum) = if value == 0 {
        (None, None)
    } else {
        let (count, sum) = divisor_count_and_sum(&factors);
        (Some(count), Some(sum))
    };
    let proper_divisor_sum = divisor_sum.map(|s| s - value);
    let abundance = divisor_sum.map(|s| match s.cmp(&(2 * value)) {
        std::cmp::Ordering::Less => Abundance::Deficient,
        std::cmp::Ordering::Equal => Abundance::Perfect,
        std::cmp::Ordering::Greater => Abundance::Abundant,
    });
    let totient = (value > 0).then(|| totient(value, &factors));

    NumberFacts {
        n,
        is_prime: factors.len() == 1 && factors[0].1 == 1,
        factors,
        divisor_count,
        divisor_sum,
        proper_divisor_sum,
        abundance,
        totient,
        digit_sum: n.to_string().chars().filter_map(|c| c.to_digit(10)).sum(),
        is_even: value % 2 == 0,
        is_square: is_square(value),
        is_cube: is_cube(value),
        is_triangular: is_square(8 * value + 1),
        is_fibonacci: is_square(5 * value * value + 4)
            || (value > 0 && is_square(5 * value * value - 4)),
        is_mersenne: value > 0 && (value + 1).is_power_of_two(),
        binary: format!("{value:b}"),
        octal: format!("{value:o}"),
        hexadecimal: format!("{value:X}"),
        roman: roman(n),
        english: english_words(n),
    }
}

fn factorize(mut n: u32) -> Vec<(u32, u32)> {
    let mut factors = Vec::new();
    if n < 2 {
        return factors;
    }
    let mut p = 2;
    while p * p <= n {
        let mut e = 0;
        while n % p == 0 {
            n /= p;
            e += 1;
        }
        if e > 0 {
            factors.push((p, e));
        }
        p += if p == 2 { 1 } else { 2 };
    }
    if n > 1 {
        factors.push((n, 1));
    }
    factors
}

/// `(d(n), σ(n))` from the factorization; `(1, 1)` for 1.
fn divisor_count_and_sum(factors: &[(u32, u32)]) -> (u32, u32) {
    factors.iter().fold((1, 1), |(count, sum), &(p, e)| {
        (count * (e + 1), sum * (p.pow(e + 1) - 1) / (p - 1))
    })
}

fn totient(n: u32, factors: &[(u32, u32)]) -> u32 {
    factors.iter().fold(n, |acc, &(p, _)| acc / p * (p - 1))
}

fn is_square(n: u32) -> bool {
    let r = n.isqrt();
    r * r == n
}

fn is_cube(n: u32) -> bool {
    (0..=10).any(|r: u32| r * r * r == n)
}

/// Roman numeral for `1..=999`.
pub fn roman(n: u16) -> Option<String> {
    const NUMERALS: [(u16, &str); 12] = [
        (900, "CM"),
        (500, "D"),
        (400, "CD"),
        (100, "C"),
        (90, "XC"),
        (50, "L"),
        (40, "XL"),
        (10, "X"),
        (9, "IX"),
        (5, "V"),
        (4, "IV"),
        (1, "I"),
    ];
    if !(1..=999).contains(&n) {
        return None;
    }
    let mut remaining = n;
    let mut out = String::new();
    for (value, symbol) in NUMERALS {
        while remaining >= value {
            out.push_str(symbol);
            remaining -= value;
        }
    }
    Some(out)
}

/// English cardinal, e.g. `one hundred forty-two`.
pub fn english_words(n: u16) -> String {
    const UNDER_20: [&str; 20] = [
        "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
        "eleven", "twelve", "thirteen", "fourteen", "fifteen", "sixteen", "seventeen", "eighteen",
        "nineteen",
    ];
    const TENS: [&str; 10] = [
        "", "", "twenty", "thirty", "forty", "fifty", "sixty", "seventy", "eighty", "ninety",
    ];

    let n = usize::from(n);
    match n {
        0..20 => UNDER_20[n].to_string(),
        20..100 if n % 10 == 0 => TENS[n / 10].to_string(),
        20..100 => format!("{}-{}", TENS[n / 10], UNDER_20[n % 10]),
        _ if n % 100 == 0 => format!("{} hundred", UNDER_20[n / 100]),
        _ => format!("{} hundred {}", UNDER_20[n / 100], english_words((n % 100) as u16)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn facts_for_42() {
        let f = compute(42);
        assert!(!f.is_prime);
        assert_eq!(f.factorization(), "2 × 3 × 7");
        assert_eq!(f.divisor_count, Some(8));
        assert_eq!(f.divisor_sum, Some(96));
        assert_eq!(f.proper_divisor_sum, Some(54));
        assert_eq!(f.abundance, Some(Abundance::Abundant));
        assert_eq!(f.totient, Some(12));
        assert_eq!(f.digit_sum, 6);
        assert_eq!(f.binary, "101010");
        assert_eq!(f.hexadecimal, "2A");
        assert_eq!(f.roman.as_deref(), Some("XLII"));
        assert_eq!(f.english, "forty-two");
        assert!(f.flags().is_empty());
    }

    #[test]
    fn powers_render_with_exponents() {
        assert_eq!(compute(40).factorization(), "2^3 × 5");
        assert_eq!(compute(997).factorization(), "997");
        assert!(compute(997).is_prime);
    }

    #[test]
    fn zero_and_one_edges() {
        let zero = compute(0);
        assert_eq!(zero.factorization(), "0");
        assert_eq!(zero.divisor_count, None);
        assert_eq!(zero.totient, None);
        assert_eq!(zero.roman, None);
        assert_eq!(zero.class(), "neither prime nor composite");
        assert!(!zero.is_mersenne);

        let one = compute(1);
        assert_eq!(one.factorization(), "1");
        assert_eq!(one.divisor_count, Some(1));
        assert_eq!(one.proper_divisor_sum, Some(0));
        assert_eq!(one.abundance, Some(Abundance::Deficient));
        assert_eq!(one.totient, Some(1));
        assert!(one.is_square && one.is_cube && one.is_fibonacci && one.is_mersenne);
    }

    #[test]
    fn special_forms() {
        assert_eq!(compute(6).abundance, Some(Abundance::Perfect));
        assert_eq!(compute(496).abundance, Some(Abundance::Perfect));
        assert!(compute(511).is_mersenne);
        assert!(compute(987).is_fibonacci);
        assert!(compute(729).is_cube && compute(729).is_square);
        assert!(compute(666).is_triangular);
        assert!(!compute(4).is_fibonacci);
    }

    #[test]
    fn roman_and_words_at_range_ends() {
        assert_eq!(roman(999).as_deref(), Some("CMXCIX"));
        assert_eq!(english_words(999), "nine hundred ninety-nine");
        assert_eq!(english_words(100), "one hundred");
        assert_eq!(english_words(13), "thirteen");
    }
}
