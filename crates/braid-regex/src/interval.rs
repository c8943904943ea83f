use crate::alphabet::{Alphabet, Sym};

/// A set of symbols stored as sorted, merged, non-overlapping closed
/// intervals.
///
/// The normal form guarantees: intervals are ordered by low bound, never
/// overlap, and never touch (`hi + 1 < next.lo`). All set operations
/// preserve it.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct CharSet {
    ranges: Vec<(Sym, Sym)>,
}

impl CharSet {
    pub fn empty() -> Self {
        CharSet { ranges: Vec::new() }
    }

    pub fn single(s: Sym) -> Self {
        CharSet {
            ranges: vec![(s, s)],
        }
    }

    /// A single closed interval. `lo` and `hi` may arrive swapped.
    pub fn range(lo: Sym, hi: Sym) -> Self {
        if lo <= hi {
            CharSet {
                ranges: vec![(lo, hi)],
            }
        } else {
            CharSet {
                ranges: vec![(hi, lo)],
            }
        }
    }

    /// Build from arbitrary intervals, normalizing as needed.
    pub fn from_ranges<I: IntoIterator<Item = (Sym, Sym)>>(iter: I) -> Self {
        let mut ranges: Vec<(Sym, Sym)> = iter
            .into_iter()
            .map(|(lo, hi)| if lo <= hi { (lo, hi) } else { (hi, lo) })
            .collect();
        ranges.sort_unstable();
        let mut merged: Vec<(Sym, Sym)> = Vec::with_capacity(ranges.len());
        for (lo, hi) in ranges {
            match merged.last_mut() {
                // merge overlapping and adjacent intervals
                Some((_, prev_hi)) if lo <= prev_hi.saturating_add(1) => {
                    *prev_hi = (*prev_hi).max(hi);
                }
                _ => merged.push((lo, hi)),
            }
        }
        CharSet { ranges: merged }
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn contains(&self, s: Sym) -> bool {
        self.ranges
            .binary_search_by(|&(lo, hi)| {
                if s < lo {
                    std::cmp::Ordering::Greater
                } else if s > hi {
                    std::cmp::Ordering::Less
                } else {
                    std::cmp::Ordering::Equal
                }
            })
            .is_ok()
    }

    pub fn ranges(&self) -> &[(Sym, Sym)] {
        &self.ranges
    }

    pub fn union(&self, other: &CharSet) -> CharSet {
        CharSet::from_ranges(
            self.ranges
                .iter()
                .chain(other.ranges.iter())
                .copied()
                .collect::<Vec<_>>(),
        )
    }

    pub fn intersect(&self, other: &CharSet) -> CharSet {
        let mut out = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < self.ranges.len() && j < other.ranges.len() {
            let (alo, ahi) = self.ranges[i];
            let (blo, bhi) = other.ranges[j];
            let lo = alo.max(blo);
            let hi = ahi.min(bhi);
            if lo <= hi {
                out.push((lo, hi));
            }
            if ahi < bhi {
                i += 1;
            } else {
                j += 1;
            }
        }
        CharSet { ranges: out }
    }

    /// The complement within the given alphabet's `min..=max` range.
    pub fn negate(&self, alphabet: &dyn Alphabet) -> CharSet {
        let (min, max) = (alphabet.min(), alphabet.max());
        let mut out = Vec::new();
        let mut next = min;
        for &(lo, hi) in &self.ranges {
            if hi < min || lo > max {
                continue;
            }
            let lo = lo.max(min);
            if lo > next {
                out.push((next, alphabet.before(lo)));
            }
            if hi >= max {
                return CharSet { ranges: out };
            }
            next = alphabet.after(hi.max(next));
        }
        out.push((next, max));
        CharSet { ranges: out }
    }

    /// Render in character-class notation for describe strings.
    pub fn display(&self, alphabet: &dyn Alphabet) -> String {
        let mut out = String::new();
        if self.ranges.len() == 1 && self.ranges[0].0 == self.ranges[0].1 {
            return alphabet.display(self.ranges[0].0);
        }
        out.push('[');
        for &(lo, hi) in &self.ranges {
            if lo == hi {
                out.push_str(&alphabet.display(lo));
            } else {
                out.push_str(&alphabet.display(lo));
                out.push('-');
                out.push_str(&alphabet.display(hi));
            }
        }
        out.push(']');
        out
    }
}

impl std::fmt::Debug for CharSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CharSet{:?}", self.ranges)
    }
}
