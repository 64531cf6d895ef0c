//! Named collision layers and per-object exclusion masks.

use std::collections::HashMap;

/// Numeric identifier of a named layer.
///
/// IDs are handed out in declaration order starting from zero
/// and stay stable for the lifetime of the physics world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(pub(crate) usize);

impl LayerId {
    #[inline]
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Insertion-ordered set of layer names.
#[derive(Clone, Debug, Default)]
pub struct Layers {
    names: Vec<String>,
    ids: HashMap<String, LayerId>,
}

impl Layers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a layer, returning its ID. Declaring an existing layer
    /// returns the ID it was first given.
    pub fn add(&mut self, name: &str) -> LayerId {
        if let Some(&id) = self.ids.get(name) {
            return id;
        }
        let id = LayerId(self.names.len());
        self.names.push(name.to_owned());
        self.ids.insert(name.to_owned(), id);
        id
    }

    pub fn add_all<'a>(&mut self, names: impl IntoIterator<Item = &'a str>) {
        for name in names {
            self.add(name);
        }
    }

    #[inline]
    pub fn id(&self, name: &str) -> Option<LayerId> {
        self.ids.get(name).copied()
    }

    #[inline]
    pub fn name(&self, id: LayerId) -> Option<&str> {
        self.names.get(id.0).map(String::as_str)
    }

    /// All declared layer names in declaration order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Compare two layer names, declaring either of them if it wasn't known yet.
    pub fn compare(&mut self, a: &str, b: &str) -> bool {
        self.add(a) == self.add(b)
    }
}

/// A growable set of layer IDs stored as a bitset.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LayerMask {
    words: Vec<u64>,
}

impl LayerMask {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: LayerId) {
        let word_idx = id.0 / 64;
        let bit_idx = id.0 % 64;
        if word_idx >= self.words.len() {
            self.words.resize(word_idx + 1, 0);
        }
        self.words[word_idx] |= 1_u64 << bit_idx;
    }

    pub fn remove(&mut self, id: LayerId) {
        let word_idx = id.0 / 64;
        if let Some(word) = self.words.get_mut(word_idx) {
            *word &= !(1_u64 << (id.0 % 64));
        }
    }

    pub fn contains(&self, id: LayerId) -> bool {
        let word_idx = id.0 / 64;
        let bit_idx = id.0 % 64;
        self.words
            .get(word_idx)
            .map(|w| w & (1_u64 << bit_idx) != 0)
            .unwrap_or(false)
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    /// Iterate over the layers in this mask in ascending ID order.
    pub fn iter(&self) -> MaskIter<'_> {
        MaskIter {
            words: &self.words,
            word_idx: 0,
            curr_word: self.words.first().copied().unwrap_or(0),
        }
    }
}

impl FromIterator<LayerId> for LayerMask {
    fn from_iter<I: IntoIterator<Item = LayerId>>(iter: I) -> Self {
        let mut mask = LayerMask::new();
        for id in iter {
            mask.insert(id);
        }
        mask
    }
}

#[derive(Debug, Clone)]
pub struct MaskIter<'a> {
    words: &'a [u64],
    word_idx: usize,
    // copy each word into the iterator so we can remove bits from it
    // instead of reading from the original bitset every time
    curr_word: u64,
}

impl<'a> Iterator for MaskIter<'a> {
    type Item = LayerId;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.curr_word != 0 {
                let first_bit_idx = self.curr_word.trailing_zeros();
                self.curr_word ^= 1 << first_bit_idx;
                return Some(LayerId(self.word_idx * 64 + first_bit_idx as usize));
            }
            self.word_idx += 1;
            if self.word_idx >= self.words.len() {
                return None;
            }
            self.curr_word = self.words[self.word_idx];
        }
    }
}

/// The layer an object is in and the layers it refuses to collide with.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LayerFilter {
    pub layer: LayerId,
    pub excluded: LayerMask,
}

impl Default for LayerId {
    fn default() -> Self {
        LayerId(0)
    }
}

impl LayerFilter {
    pub fn new(layer: LayerId) -> Self {
        Self {
            layer,
            excluded: LayerMask::new(),
        }
    }

    /// Whether two objects are allowed to collide.
    /// A pair is rejected if either side excludes the other's layer.
    #[inline]
    pub fn allows(&self, other: &LayerFilter) -> bool {
        !self.excluded.contains(other.layer) && !other.excluded.contains(self.layer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask(idxs: &[usize]) -> LayerMask {
        idxs.iter().map(|i| LayerId(*i)).collect()
    }

    #[test]
    fn mask_iter_is_sorted() {
        let m = mask(&[0, 5, 3, 130, 120]);
        itertools::assert_equal(m.iter().map(|l| l.index()), [0, 3, 5, 120, 130]);
        assert!(m.contains(LayerId(130)));
        assert!(!m.contains(LayerId(4)));
        assert!(!m.contains(LayerId(5000)));
    }

    #[test]
    fn mask_remove() {
        let mut m = mask(&[1, 64]);
        m.remove(LayerId(64));
        m.remove(LayerId(999));
        itertools::assert_equal(m.iter().map(|l| l.index()), [1]);
        m.remove(LayerId(1));
        assert!(m.is_empty());
    }

    #[test]
    fn layer_ids_are_first_come() {
        let mut layers = Layers::new();
        let a = layers.add("default");
        let b = layers.add("player");
        assert_eq!(layers.add("default"), a);
        assert_eq!((a.index(), b.index()), (0, 1));
        assert_eq!(layers.name(b), Some("player"));
        assert_eq!(layers.id("enemy"), None);
        assert!(!layers.compare("enemy", "player"));
        assert_eq!(layers.id("enemy"), Some(LayerId(2)));
        assert!(layers.compare("enemy", "enemy"));
        itertools::assert_equal(layers.names(), ["default", "player", "enemy"]);
    }

    #[test]
    fn exclusion_works_from_either_side() {
        let mut a = LayerFilter::new(LayerId(0));
        let b = LayerFilter::new(LayerId(1));
        assert!(a.allows(&b));
        a.excluded.insert(LayerId(1));
        assert!(!a.allows(&b));
        assert!(!b.allows(&a));
    }
}
