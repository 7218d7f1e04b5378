use std::fmt;
use std::str::FromStr;
use thiserror::Error;

//
// Public Interface
//

const WORD: usize = 64;
const NIBBLE: usize = 4;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BitseqError {
    #[error("cannot parse bitseq '{0}'")]
    Parse(String),

    #[error("cannot create empty bitseq")]
    Empty,

    #[error("granularity {granularity} is not a divisor of bitseq length {bits}")]
    Granularity { granularity: usize, bits: usize },

    #[error("granularity {0} is not supported")]
    UnsupportedGranularity(usize),

    #[error("bitseq 0x{seq} has no {index}-th child")]
    NoChild { seq: String, index: usize },
}

/// A series of memory orderings or atomicity flags of operations, encoded as
/// a sequence of bits of explicit length.
///
/// Bit `i` lives in word `i / 64` at position `i % 64`; bits beyond the
/// length are kept zero, so structural equality is value equality.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Bitseq {
    data: Vec<u64>,
    bits: usize,
}

impl Bitseq {
    /// Returns an all-zero sequence of the given length.
    pub fn new(bits: usize) -> Self {
        Self {
            data: vec![0; words(bits)],
            bits,
        }
    }

    /// Parses a bit sequence with a target bit length. The literals `"0"`
    /// and `"-1"` denote the all-zeros and all-ones sequences of that
    /// length; everything else must be a `0b…` or `0x…` literal, fitted to
    /// `length` afterwards.
    pub fn parse(str: &str, length: usize) -> Result<Self, BitseqError> {
        match str {
            "0" => Ok(Self::new(length)),
            "-1" => {
                if length == 0 {
                    return Ok(Self::new(0));
                }
                Ok(Self::new(0).set_range(0, length - 1))
            }
            _ => Ok(str.parse::<Self>()?.fit(length)),
        }
    }

    /// Parses a string of '1's and '0's, most significant bit first.
    pub fn from_bin_str(str: &str) -> Result<Self, BitseqError> {
        if str.is_empty() {
            return Err(BitseqError::Empty);
        }
        let mut s = Self::new(str.len());
        for (i, c) in str.bytes().rev().enumerate() {
            match c {
                b'1' => s.data[i / WORD] |= 1 << (i % WORD),
                b'0' => {}
                _ => return Err(BitseqError::Parse(str.to_string())),
            }
        }
        Ok(s)
    }

    /// Parses a string of hex digits; the resulting length is four bits per
    /// digit.
    pub fn from_hex_str(str: &str) -> Result<Self, BitseqError> {
        if str.is_empty() {
            return Err(BitseqError::Empty);
        }
        let mut s = Self::new(str.len() * NIBBLE);
        for (i, c) in str.bytes().rev().enumerate() {
            let nibble = match c {
                b'0'..=b'9' => (c - b'0') as u64,
                b'a'..=b'f' => (c - b'a' + 10) as u64,
                b'A'..=b'F' => (c - b'A' + 10) as u64,
                _ => return Err(BitseqError::Parse(str.to_string())),
            };
            let bit = i * NIBBLE;
            s.data[bit / WORD] |= nibble << (bit % WORD);
        }
        Ok(s)
    }

    /// Creates a bit sequence from an integer; the length is the number of
    /// significant bits of `v` (one for zero).
    pub fn from_uint(v: u64) -> Self {
        let bits = (WORD - v.leading_zeros() as usize).max(1);
        let mut s = Self::new(bits);
        s.data[0] = v;
        s
    }

    /// Number of bits of the sequence.
    pub fn len(&self) -> usize {
        self.bits
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    /// True if all bits are zero.
    pub fn is_zero(&self) -> bool {
        self.data.iter().all(|&d| d == 0)
    }

    /// Binary string representation, most significant bit first, padded to
    /// the sequence length.
    pub fn to_bin_string(&self) -> String {
        let mut str = String::with_capacity(self.bits);
        for i in (0..self.bits).rev() {
            str.push(if self.get(i) { '1' } else { '0' });
        }
        str
    }

    /// Hex string representation, one digit per four bits of length (rounded
    /// up).
    pub fn to_hex_string(&self) -> String {
        let nibbles = div_ceil(self.bits, NIBBLE).max(1);
        let mut str = String::with_capacity(nibbles);
        for k in (0..nibbles).rev() {
            let bit = k * NIBBLE;
            let word = self.data.get(bit / WORD).copied().unwrap_or(0);
            let nibble = (word >> (bit % WORD)) & 0xf;
            str.push(char::from_digit(nibble as u32, 16).unwrap());
        }
        str
    }

    /// Extends or shrinks the sequence to `n` bits; new bits are zero,
    /// dropped bits are discarded.
    pub fn fit(mut self, n: usize) -> Self {
        self.bits = n;
        self.data.resize(words(n), 0);
        self.mask_top();
        self
    }

    /// Returns a copy with the given bits set, extending the length when an
    /// index lies beyond it.
    pub fn set(&self, bits: &[usize]) -> Self {
        let mut s = self.clone();
        for &b in bits {
            if b >= s.bits {
                s = s.fit(b + 1);
            }
            s.data[b / WORD] |= 1 << (b % WORD);
        }
        s
    }

    /// Returns a copy with the given bits cleared, extending the length when
    /// an index lies beyond it.
    pub fn unset(&self, bits: &[usize]) -> Self {
        let mut s = self.clone();
        for &b in bits {
            if b >= s.bits {
                s = s.fit(b + 1);
            }
            s.data[b / WORD] &= !(1 << (b % WORD));
        }
        s
    }

    /// Sets the inclusive range `[from; to]`, extending if necessary.
    pub fn set_range(&self, from: usize, to: usize) -> Self {
        let mut s = self.clone();
        for b in from..=to {
            s = s.set(&[b]);
        }
        s
    }

    /// Tests whether `self` is a strict subset of `o`: equal lengths, every
    /// one-bit of `self` is a one-bit of `o`, and the two differ.
    pub fn subset_of(&self, o: &Self) -> bool {
        if self.bits != o.bits || self == o {
            return false;
        }
        self.data
            .iter()
            .zip(o.data.iter())
            .all(|(&a, &b)| a & b == a)
    }

    /// True if `self` and `o` have one-bits in common.
    pub fn intersects(&self, o: &Self) -> bool {
        if self.bits != o.bits {
            return false;
        }
        self.data.iter().zip(o.data.iter()).any(|(&a, &b)| a & b != 0)
    }

    /// Number of one-bits.
    pub fn ones(&self) -> usize {
        self.data.iter().map(|d| d.count_ones() as usize).sum()
    }

    /// Ascending indices of the one-bits.
    pub fn indices(&self) -> Vec<usize> {
        let mut r = Vec::with_capacity(self.ones());
        for (w, &d) in self.data.iter().enumerate() {
            let mut d = d;
            while d != 0 {
                let i = d.trailing_zeros() as usize;
                r.push(w * WORD + i);
                d &= d - 1;
            }
        }
        r
    }

    /// Repeats every bit `n` times: bit `b` becomes a run of `n` equal bits
    /// at `[b*n; (b+1)*n)`.
    pub fn repeat(&self, n: usize) -> Self {
        let mut s = Self::new(self.bits * n);
        for i in self.indices() {
            s = s.set_range(i * n, (i + 1) * n - 1);
        }
        s
    }

    /// Reverses the bit order, keeping the length.
    pub fn reverse(&self) -> Self {
        let ones: Vec<usize> = self.indices().iter().map(|i| self.bits - i - 1).collect();
        Self::new(self.bits).set(&ones)
    }

    pub fn and(&self, o: &Self) -> Self {
        self.zip_words(o, |a, b| a & b, "AND")
    }

    pub fn or(&self, o: &Self) -> Self {
        self.zip_words(o, |a, b| a | b, "OR")
    }

    pub fn xor(&self, o: &Self) -> Self {
        self.zip_words(o, |a, b| a ^ b, "XOR")
    }

    /// Number of trailing zeros; the full length if the sequence is zero.
    pub fn trailing(&self) -> usize {
        if self.is_zero() {
            return self.bits;
        }
        let mut count = 0;
        for &d in &self.data {
            if d == 0 {
                count += WORD;
            } else {
                count += d.trailing_zeros() as usize;
                break;
            }
        }
        count
    }

    /// Returns the `i`-th child of `self`, i.e. a copy with the `i`-th
    /// trailing-zero position set. Fails when `i` is not below the number of
    /// trailing zeros.
    pub fn child(&self, i: usize) -> Result<Self, BitseqError> {
        if i >= self.trailing() {
            return Err(BitseqError::NoChild {
                seq: self.to_hex_string(),
                index: i,
            });
        }
        Ok(self.set(&[i]))
    }

    /// Converts the sequence chunk-wise into an arbitrary object through the
    /// `translate` closure, which receives the chunk index and the
    /// `granularity`-bit value read from word storage, in ascending order.
    /// An error from the closure stops the iteration.
    pub fn translate<E, F>(&self, granularity: usize, mut translate: F) -> Result<(), E>
    where
        F: FnMut(usize, u64) -> Result<(), E>,
        E: From<BitseqError>,
    {
        if granularity == 0 || granularity > 2 {
            return Err(BitseqError::UnsupportedGranularity(granularity).into());
        }
        if self.bits % granularity != 0 {
            return Err(BitseqError::Granularity {
                granularity,
                bits: self.bits,
            }
            .into());
        }

        let per_word = WORD / granularity;
        let mask = (1u64 << granularity) - 1;
        let items = self.bits / granularity;
        for k in 0..items {
            let word = self.data[k / per_word];
            let val = (word >> ((k % per_word) * granularity)) & mask;
            translate(k, val)?;
        }
        Ok(())
    }

    //
    // Private Implementation
    //

    fn get(&self, i: usize) -> bool {
        self.data[i / WORD] & (1 << (i % WORD)) != 0
    }

    fn mask_top(&mut self) {
        if self.bits % WORD != 0 {
            if let Some(last) = self.data.last_mut() {
                *last &= (1 << (self.bits % WORD)) - 1;
            }
        }
    }

    fn zip_words(&self, o: &Self, f: impl Fn(u64, u64) -> u64, op: &str) -> Self {
        assert_eq!(
            self.bits, o.bits,
            "cannot {} different sized bitseqs",
            op
        );
        Self {
            data: self
                .data
                .iter()
                .zip(o.data.iter())
                .map(|(&a, &b)| f(a, b))
                .collect(),
            bits: self.bits,
        }
    }
}

impl FromStr for Bitseq {
    type Err = BitseqError;

    fn from_str(str: &str) -> Result<Self, Self::Err> {
        if let Some(hex) = str.strip_prefix("0x") {
            Self::from_hex_str(hex)
        } else if let Some(bin) = str.strip_prefix("0b") {
            Self::from_bin_str(bin)
        } else {
            Err(BitseqError::Parse(str.to_string()))
        }
    }
}

impl fmt::Display for Bitseq {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.bits <= 32 {
            write!(f, "0x{} (0b{})", self.to_hex_string(), self.to_bin_string())
        } else {
            write!(f, "0x{}", self.to_hex_string())
        }
    }
}

fn div_ceil(a: usize, b: usize) -> usize {
    (a + b - 1) / b
}

fn words(bits: usize) -> usize {
    div_ceil(bits, WORD)
}
