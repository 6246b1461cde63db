/*
 * Created on Sun Mar 16 2025
 *
 * This file is a part of Skytable
 * Skytable (formerly known as TerrabaseDB or Skybase) is a free and open-source
 * NoSQL database written by Sayan Nandan ("the Author") with the
 * vision to provide flexibility in data modelling without compromising
 * on performance, queryability or scalability.
 *
 * Copyright (c) 2025, Sayan Nandan <ohsayan@outlook.com>
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

use std::{
    cmp::Ordering,
    collections::{BTreeSet, HashMap},
};

/// An `f64` wrapper ordered with `total_cmp`-like semantics so it can live in a `BTreeSet`.
/// Scores are never NaN by construction (`ZINCRBY` producing NaN is rejected upstream).
#[derive(Debug, Clone, Copy, PartialEq)]
struct Score(f64);

impl Eq for Score {}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.partial_cmp(&other.0).unwrap_or(Ordering::Equal)
    }
}

/// A sorted set: a `member -> score` map plus an auxiliary `(score, member)` ordering with
/// lexicographic tiebreak on equal scores (§3.1).
#[derive(Debug, Clone, Default)]
pub struct ZSet {
    scores: HashMap<Vec<u8>, f64>,
    order: BTreeSet<(Score, Vec<u8>)>,
}

impl ZSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn score(&self, member: &[u8]) -> Option<f64> {
        self.scores.get(member).copied()
    }

    /// Inserts or updates a member's score. Returns `true` if the member is new.
    pub fn insert(&mut self, member: Vec<u8>, score: f64) -> bool {
        let is_new = match self.scores.get(&member) {
            Some(&old) => {
                self.order.remove(&(Score(old), member.clone()));
                false
            }
            None => true,
        };
        self.scores.insert(member.clone(), score);
        self.order.insert((Score(score), member));
        is_new
    }

    pub fn remove(&mut self, member: &[u8]) -> bool {
        match self.scores.remove(member) {
            Some(old) => {
                self.order.remove(&(Score(old), member.to_vec()));
                true
            }
            None => false,
        }
    }

    /// 0-based rank in ascending score order, or `None` if the member is absent.
    pub fn rank(&self, member: &[u8]) -> Option<usize> {
        let score = self.score(member)?;
        self.order
            .iter()
            .position(|(s, m)| s.0 == score && m == member)
    }

    pub fn iter_ascending(&self) -> impl DoubleEndedIterator<Item = (&[u8], f64)> {
        self.order.iter().map(|(s, m)| (m.as_slice(), s.0))
    }

    /// Returns `(member, score)` pairs whose 0-based rank falls in `[start, stop]` inclusive,
    /// after Redis-style negative-index normalization (`-1` is the last element).
    pub fn range_by_rank(&self, start: i64, stop: i64, rev: bool) -> Vec<(Vec<u8>, f64)> {
        let len = self.len();
        let Some((lo, hi)) = normalize_range(len, start, stop) else {
            return vec![];
        };
        let items: Vec<(Vec<u8>, f64)> = if rev {
            self.order
                .iter()
                .rev()
                .map(|(s, m)| (m.clone(), s.0))
                .collect()
        } else {
            self.order.iter().map(|(s, m)| (m.clone(), s.0)).collect()
        };
        items[lo..=hi].to_vec()
    }

    /// Returns `(member, score)` pairs with `min <= score <= max`, in ascending score order
    /// (or descending if `rev`).
    pub fn range_by_score(
        &self,
        min: f64,
        max: f64,
        min_excl: bool,
        max_excl: bool,
        rev: bool,
    ) -> Vec<(Vec<u8>, f64)> {
        let mut out: Vec<(Vec<u8>, f64)> = self
            .order
            .iter()
            .filter(|(s, _)| {
                let above_min = if min_excl { s.0 > min } else { s.0 >= min };
                let below_max = if max_excl { s.0 < max } else { s.0 <= max };
                above_min && below_max
            })
            .map(|(s, m)| (m.clone(), s.0))
            .collect();
        if rev {
            out.reverse();
        }
        out
    }

    pub fn count_by_score(&self, min: f64, max: f64) -> usize {
        self.order
            .iter()
            .filter(|(s, _)| s.0 >= min && s.0 <= max)
            .count()
    }

    pub fn remove_range_by_rank(&mut self, start: i64, stop: i64) -> usize {
        let len = self.len();
        let Some((lo, hi)) = normalize_range(len, start, stop) else {
            return 0;
        };
        let members: Vec<Vec<u8>> = self
            .order
            .iter()
            .skip(lo)
            .take(hi - lo + 1)
            .map(|(_, m)| m.clone())
            .collect();
        for m in &members {
            self.remove(m);
        }
        members.len()
    }

    pub fn remove_range_by_score(&mut self, min: f64, max: f64) -> usize {
        let members: Vec<Vec<u8>> = self
            .order
            .iter()
            .filter(|(s, _)| s.0 >= min && s.0 <= max)
            .map(|(_, m)| m.clone())
            .collect();
        for m in &members {
            self.remove(m);
        }
        members.len()
    }

    /// The lowest-scoring member, used by `BZPOPMIN`.
    pub fn pop_min(&mut self) -> Option<(Vec<u8>, f64)> {
        let (score, member) = self.order.iter().next().cloned()?;
        self.remove(&member);
        Some((member, score.0))
    }

    pub fn pop_max(&mut self) -> Option<(Vec<u8>, f64)> {
        let (score, member) = self.order.iter().next_back().cloned()?;
        self.remove(&member);
        Some((member, score.0))
    }
}

/// Shared by `ZSet` and list range commands: normalizes Redis-style (possibly negative,
/// possibly out-of-bounds) `[start, stop]` indices against a collection of length `len`.
/// Returns `None` if the normalized range is empty.
pub fn normalize_range(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    if len == 0 {
        return None;
    }
    let len_i = len as i64;
    let norm = |i: i64| -> i64 {
        if i < 0 {
            (len_i + i).max(0)
        } else {
            i
        }
    };
    let start = norm(start).min(len_i - 1).max(0);
    let stop = norm(stop).min(len_i - 1);
    if stop < start || stop < 0 {
        return None;
    }
    Some((start as usize, stop as usize))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ties_break_lexicographically() {
        let mut z = ZSet::new();
        z.insert(b"b".to_vec(), 1.0);
        z.insert(b"a".to_vec(), 1.0);
        z.insert(b"c".to_vec(), 2.0);
        let members: Vec<_> = z.iter_ascending().map(|(m, _)| m.to_vec()).collect();
        assert_eq!(members, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn range_by_rank_handles_negative_indices() {
        let mut z = ZSet::new();
        for (m, s) in [("a", 1.0), ("b", 2.0), ("c", 3.0)] {
            z.insert(m.as_bytes().to_vec(), s);
        }
        let all = z.range_by_rank(0, -1, false);
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].0, b"a".to_vec());
        assert_eq!(all[2].0, b"c".to_vec());
    }
}
