//! A bitmap with one bit per arena word, set where an object header lives.

const BITS: usize = u64::BITS as usize;

#[derive(Default)]
pub struct StartMap {
    bits: Vec<u64>,
}

impl StartMap {
    pub fn with_words(words: usize) -> Self {
        let mut map = Self::default();
        map.ensure(words);
        map
    }

    /// Makes room for `words` entries.
    pub fn ensure(&mut self, words: usize) {
        let needed = words.div_ceil(BITS);
        if needed > self.bits.len() {
            self.bits.resize(needed, 0);
        }
    }

    #[inline]
    pub fn set(&mut self, index: usize) {
        self.bits[index / BITS] |= 1 << (index % BITS);
    }

    #[inline]
    pub fn is_start(&self, index: usize) -> bool {
        self.bits
            .get(index / BITS)
            .is_some_and(|word| word & (1 << (index % BITS)) != 0)
    }

    pub fn clear_all(&mut self) {
        self.bits.fill(0);
    }

    /// The closest object start at or below `index`.
    pub fn start_at_or_before(&self, index: usize) -> Option<usize> {
        let mut word = index / BITS;
        if word >= self.bits.len() {
            return None;
        }

        let bit = index % BITS;
        let below = if bit == BITS - 1 {
            u64::MAX
        } else {
            (1u64 << (bit + 1)) - 1
        };

        let mut current = self.bits[word] & below;
        loop {
            if current != 0 {
                let highest = BITS - 1 - current.leading_zeros() as usize;
                return Some(word * BITS + highest);
            }
            if word == 0 {
                return None;
            }
            word -= 1;
            current = self.bits[word];
        }
    }
}
