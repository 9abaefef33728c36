//! A fixed size set of dense indices, one bit per possible element.

use std::fmt;
use std::marker::PhantomData;


type Word = u64;
const WORD_BITS: usize = Word::BITS as usize;

/// A set of the indices `0..domain_size`. `T` is usually an entity newtype like `Block`.
///
/// Elements outside the domain cause a panic. Operations on two sets require equal domains.
pub struct BitSet<T> {
    domain_size: usize,
    words: Vec<Word>,
    marker: PhantomData<fn(T)>,
}

impl<T> BitSet<T> {
    pub fn domain_size(&self) -> usize {
        self.domain_size
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&word| word == 0)
    }

    pub fn count(&self) -> usize {
        self.words.iter().map(|word| word.count_ones() as usize).sum()
    }

    pub fn clear(&mut self) {
        self.words.fill(0);
    }

    /// Adds every element of `other`. Returns whether `self` changed.
    pub fn union(&mut self, other: &BitSet<T>) -> bool {
        self.combine(other, |a, b| a | b)
    }

    /// Keeps only the elements that are also in `other`. Returns whether `self` changed.
    pub fn intersect(&mut self, other: &BitSet<T>) -> bool {
        self.combine(other, |a, b| a & b)
    }

    /// Drops the elements of `other`. Returns whether `self` changed.
    pub fn subtract(&mut self, other: &BitSet<T>) -> bool {
        self.combine(other, |a, b| a & !b)
    }

    pub fn is_disjoint(&self, other: &BitSet<T>) -> bool {
        assert_eq!(self.domain_size, other.domain_size);
        self.words.iter().zip(&other.words).all(|(a, b)| a & b == 0)
    }

    pub fn superset(&self, other: &BitSet<T>) -> bool {
        assert_eq!(self.domain_size, other.domain_size);
        self.words.iter().zip(&other.words).all(|(a, b)| a & b == *b)
    }

    fn combine(&mut self, other: &BitSet<T>, op: impl Fn(Word, Word) -> Word) -> bool {
        assert_eq!(self.domain_size, other.domain_size);
        let mut changed = false;
        for (word, &other) in self.words.iter_mut().zip(&other.words) {
            let new = op(*word, other);
            changed |= new != *word;
            *word = new;
        }
        changed
    }
}

impl<T: From<usize> + Into<usize>> BitSet<T> {
    pub fn new_empty(domain_size: usize) -> BitSet<T> {
        BitSet { domain_size, words: vec![0; words_for(domain_size)], marker: PhantomData }
    }

    pub fn new_filled(domain_size: usize) -> BitSet<T> {
        let words = vec![!0; words_for(domain_size)];
        let mut set = BitSet { domain_size, words, marker: PhantomData };
        let used = domain_size % WORD_BITS;
        if let (Some(last), true) = (set.words.last_mut(), used != 0) {
            *last &= (1 << used) - 1;
        }
        set
    }

    /// Empties the set and resizes it to a new domain.
    pub fn reset(&mut self, domain_size: usize) {
        self.words.clear();
        self.words.resize(words_for(domain_size), 0);
        self.domain_size = domain_size;
    }

    pub fn contains(&self, elem: T) -> bool {
        let (idx, mask) = self.locate(elem);
        self.words[idx] & mask != 0
    }

    /// Returns `true` if `elem` was not in the set before.
    pub fn insert(&mut self, elem: T) -> bool {
        let (idx, mask) = self.locate(elem);
        let word = &mut self.words[idx];
        let absent = *word & mask == 0;
        *word |= mask;
        absent
    }

    /// Returns `true` if `elem` was in the set before.
    pub fn remove(&mut self, elem: T) -> bool {
        let (idx, mask) = self.locate(elem);
        let word = &mut self.words[idx];
        let present = *word & mask != 0;
        *word &= !mask;
        present
    }

    /// The elements in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        self.words.iter().enumerate().flat_map(|(idx, &word)| {
            let base = idx * WORD_BITS;
            let mut rest = word;
            std::iter::from_fn(move || {
                if rest == 0 {
                    return None;
                }
                let bit = rest.trailing_zeros() as usize;
                rest &= rest - 1;
                Some(T::from(base + bit))
            })
        })
    }

    fn locate(&self, elem: T) -> (usize, Word) {
        let elem: usize = elem.into();
        assert!(elem < self.domain_size, "{elem} is outside of the domain {}", self.domain_size);
        (elem / WORD_BITS, 1 << (elem % WORD_BITS))
    }
}

fn words_for(domain_size: usize) -> usize {
    (domain_size + WORD_BITS - 1) / WORD_BITS
}

impl<T: From<usize> + Into<usize>> Extend<T> for BitSet<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for elem in iter {
            self.insert(elem);
        }
    }
}

impl<T> Clone for BitSet<T> {
    fn clone(&self) -> Self {
        BitSet { domain_size: self.domain_size, words: self.words.clone(), marker: PhantomData }
    }

    fn clone_from(&mut self, from: &Self) {
        self.domain_size = from.domain_size;
        self.words.clone_from(&from.words);
    }
}

impl<T> PartialEq for BitSet<T> {
    fn eq(&self, other: &Self) -> bool {
        self.domain_size == other.domain_size && self.words == other.words
    }
}

impl<T> Eq for BitSet<T> {}

impl<T: From<usize> + Into<usize> + fmt::Debug> fmt::Debug for BitSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
