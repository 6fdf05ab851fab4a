//! Update sequence generation.
//!
//! Tokens are fixed-width strings over a 64-symbol alphabet whose symbols are
//! in ascending ASCII order, so byte-wise comparison of two tokens matches the
//! order in which they were issued. The generator is an odometer: the last
//! position is incremented and carries propagate leftwards.
//!
//! The generator is not synchronized. It lives inside the document store's
//! writer slot and is only ever advanced by the current writer.

use crate::error::{CoreError, CoreResult};
use crate::types::UpdateSeq;
use rand::Rng;

/// Token alphabet, ascending.
pub const ALPHABET: &[u8; 64] =
    b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

/// Width of every issued token.
pub const TOKEN_WIDTH: usize = 24;

/// The informational ordinal wraps back to 1 when it reaches this value.
pub const NUMBER_CEILING: u64 = 16_773_120;

/// Odometer producing strictly increasing update sequences.
#[derive(Debug, Clone)]
pub struct SequenceGenerator {
    digits: [u8; TOKEN_WIDTH],
    number: u64,
}

impl SequenceGenerator {
    /// Resumes after the last persisted sequence.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the token has the wrong width or contains a
    /// symbol outside the alphabet.
    pub fn seeded(last: &UpdateSeq) -> CoreResult<Self> {
        let bytes = last.id.as_bytes();
        if bytes.len() != TOKEN_WIDTH {
            return Err(CoreError::invalid_input(format!(
                "update sequence token must be {TOKEN_WIDTH} symbols, got {}",
                bytes.len()
            )));
        }

        let mut digits = [0u8; TOKEN_WIDTH];
        for (slot, byte) in digits.iter_mut().zip(bytes) {
            *slot = symbol_index(*byte).ok_or_else(|| {
                CoreError::invalid_input(format!("invalid update sequence symbol {:?}", *byte as char))
            })?;
        }

        Ok(Self {
            digits,
            number: last.number,
        })
    }

    /// Starts from a random position.
    ///
    /// The most significant symbol is drawn from the lower half of the
    /// alphabet so the odometer cannot run out in practice.
    #[must_use]
    pub fn random() -> Self {
        let mut rng = rand::thread_rng();
        let mut digits = [0u8; TOKEN_WIDTH];
        digits[0] = rng.gen_range(0..32);
        for digit in &mut digits[1..] {
            *digit = rng.gen_range(0..64);
        }
        Self { digits, number: 0 }
    }

    /// Seeds from `last`, or randomly when the store is empty.
    pub fn resume(last: &UpdateSeq) -> CoreResult<Self> {
        if last.is_empty() {
            Ok(Self::random())
        } else {
            Self::seeded(last)
        }
    }

    /// Issues the next sequence.
    ///
    /// # Errors
    ///
    /// Returns `SequenceExhausted` when the most significant position would
    /// wrap. The generator state is left unchanged in that case.
    pub fn next(&mut self) -> CoreResult<UpdateSeq> {
        let mut digits = self.digits;
        let mut position = TOKEN_WIDTH;
        loop {
            if position == 0 {
                return Err(CoreError::SequenceExhausted);
            }
            position -= 1;
            digits[position] += 1;
            if usize::from(digits[position]) < ALPHABET.len() {
                break;
            }
            digits[position] = 0;
        }
        self.digits = digits;

        self.number += 1;
        if self.number >= NUMBER_CEILING {
            self.number = 1;
        }

        Ok(UpdateSeq::new(self.number, self.token()))
    }

    fn token(&self) -> String {
        self.digits
            .iter()
            .map(|&d| ALPHABET[usize::from(d)] as char)
            .collect()
    }
}

fn symbol_index(byte: u8) -> Option<u8> {
    ALPHABET
        .iter()
        .position(|&s| s == byte)
        .and_then(|i| u8::try_from(i).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn token_of(prefix: &str, last: char) -> String {
        let mut s = String::from(prefix);
        while s.len() < TOKEN_WIDTH - 1 {
            s.push('-');
        }
        s.push(last);
        s
    }

    #[test]
    fn alphabet_is_ascending() {
        assert!(ALPHABET.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn increments_last_symbol() {
        let mut gen = SequenceGenerator::seeded(&UpdateSeq::new(5, token_of("", '-'))).unwrap();
        let next = gen.next().unwrap();
        assert_eq!(next.number, 6);
        assert_eq!(next.id, token_of("", '0'));
    }

    #[test]
    fn carries_into_next_position() {
        let mut gen = SequenceGenerator::seeded(&UpdateSeq::new(1, token_of("", 'z'))).unwrap();
        let next = gen.next().unwrap();
        let mut expected = "-".repeat(TOKEN_WIDTH - 2);
        expected.push('0');
        expected.push('-');
        assert_eq!(next.id, expected);
    }

    #[test]
    fn exhaustion_is_an_error() {
        let last = UpdateSeq::new(9, "z".repeat(TOKEN_WIDTH));
        let mut gen = SequenceGenerator::seeded(&last).unwrap();
        assert!(matches!(gen.next(), Err(CoreError::SequenceExhausted)));
        assert!(matches!(gen.next(), Err(CoreError::SequenceExhausted)));
    }

    #[test]
    fn number_wraps_to_one() {
        let last = UpdateSeq::new(NUMBER_CEILING - 1, token_of("", '-'));
        let mut gen = SequenceGenerator::seeded(&last).unwrap();
        assert_eq!(gen.next().unwrap().number, 1);
    }

    #[test]
    fn rejects_bad_seed() {
        assert!(SequenceGenerator::seeded(&UpdateSeq::new(1, "short")).is_err());
        let bad = "!".repeat(TOKEN_WIDTH);
        assert!(SequenceGenerator::seeded(&UpdateSeq::new(1, bad)).is_err());
    }

    #[test]
    fn random_seed_keeps_headroom() {
        for _ in 0..64 {
            let mut gen = SequenceGenerator::random();
            let seq = gen.next().unwrap();
            assert_eq!(seq.id.len(), TOKEN_WIDTH);
            assert!(seq.id.as_bytes()[0] <= ALPHABET[32]);
        }
    }

    proptest! {
        #[test]
        fn tokens_strictly_increase(steps in 1usize..500) {
            let mut gen = SequenceGenerator::random();
            let mut prev = gen.next().unwrap();
            for _ in 0..steps {
                let next = gen.next().unwrap();
                prop_assert!(next.id > prev.id);
                prop_assert_eq!(next.id.len(), TOKEN_WIDTH);
                prev = next;
            }
        }
    }
}
