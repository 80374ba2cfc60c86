use tally_core::Direction;

pub const DEFAULT_DEBIT_KEYWORDS: &[&str] = &[
    "purchase",
    "withdrawal",
    "debit",
    "payment",
    "transfer out",
    "check",
    "fee",
    "charge",
    "atm",
    "pos",
    "online",
];

pub const DEFAULT_CREDIT_KEYWORDS: &[&str] = &[
    "deposit",
    "credit",
    "transfer in",
    "refund",
    "interest",
    "dividend",
    "salary",
    "payroll",
    "direct deposit",
];

/// Whole-word keyword lists used when the amount carries no sign.
#[derive(Debug, Clone)]
pub(crate) struct DirectionKeywords {
    debit: Vec<String>,
    credit: Vec<String>,
}

/// Upper-case, letters and digits only, single-space separated and padded so
/// `" KW "` finds whole words.
fn normalize(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push(' ');
    for word in s
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        out.push_str(&word.to_uppercase());
        out.push(' ');
    }
    out
}

impl DirectionKeywords {
    pub fn new<S: AsRef<str>>(debit: &[S], credit: &[S]) -> Self {
        let prep = |list: &[S]| -> Vec<String> {
            list.iter()
                .map(|k| normalize(k.as_ref()))
                .filter(|k: &String| !k.trim().is_empty())
                .collect()
        };
        Self {
            debit: prep(debit),
            credit: prep(credit),
        }
    }

    /// `None` when neither list matches, or when both do.
    pub fn infer(&self, description: &str) -> Option<Direction> {
        let text = normalize(description);
        let debit = self.debit.iter().any(|k| text.contains(k.as_str()));
        let credit = self.credit.iter().any(|k| text.contains(k.as_str()));
        match (debit, credit) {
            (true, false) => Some(Direction::Debit),
            (false, true) => Some(Direction::Credit),
            _ => None,
        }
    }
}
