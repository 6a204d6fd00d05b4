//! One-time codes gating the start and end of physical work

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;
use thiserror::Error;
use tracing::debug;

/// Why an entered code could not be parsed
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OtpFormatError {
    #[error("OTP is blank")]
    Blank,

    #[error("OTP must be exactly {expected} digits, got {got} characters")]
    WrongLength { expected: usize, got: usize },

    #[error("OTP must contain only digits")]
    NotNumeric,
}

/// A six-digit numeric code
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Otp(String);

impl Otp {
    pub const LEN: usize = 6;

    /// Validate user input; surrounding whitespace is ignored
    pub fn parse(input: &str) -> Result<Self, OtpFormatError> {
        let code = input.trim();
        if code.is_empty() {
            return Err(OtpFormatError::Blank);
        }
        let got = code.chars().count();
        if got != Self::LEN {
            return Err(OtpFormatError::WrongLength {
                expected: Self::LEN,
                got,
            });
        }
        if !code.chars().all(|c| c.is_ascii_digit()) {
            return Err(OtpFormatError::NotNumeric);
        }
        Ok(Self(code.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compare without short-circuiting on the first differing digit
    pub fn matches(&self, other: &Otp) -> bool {
        self.0
            .bytes()
            .zip(other.0.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl fmt::Display for Otp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Codes end up in session structs that get logged with `?`
impl fmt::Debug for Otp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Otp(******)")
    }
}

impl TryFrom<String> for Otp {
    type Error = OtpFormatError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Otp> for String {
    fn from(otp: Otp) -> Self {
        otp.0
    }
}

/// Source of fresh codes
pub trait OtpGenerator: Send + Sync {
    fn generate(&self) -> Otp;
}

/// Uniformly random codes from the thread-local RNG
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomOtpGenerator;

impl OtpGenerator for RandomOtpGenerator {
    fn generate(&self) -> Otp {
        let n: u32 = rand::rng().random_range(0..1_000_000);
        Otp(format!("{:06}", n))
    }
}

/// Hands out a fixed list of codes, then falls back to random ones.
///
/// For demos and tests that need to know the code in advance.
#[derive(Debug, Default)]
pub struct SequenceOtpGenerator {
    codes: Mutex<VecDeque<Otp>>,
}

impl SequenceOtpGenerator {
    pub fn new<I, S>(codes: I) -> Result<Self, OtpFormatError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let codes = codes
            .into_iter()
            .map(|c| Otp::parse(c.as_ref()))
            .collect::<Result<VecDeque<_>, _>>()?;
        Ok(Self {
            codes: Mutex::new(codes),
        })
    }
}

impl OtpGenerator for SequenceOtpGenerator {
    fn generate(&self) -> Otp {
        let next = match self.codes.lock() {
            Ok(mut codes) => codes.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        };
        next.unwrap_or_else(|| {
            debug!("SequenceOtpGenerator::generate: sequence exhausted, using random code");
            RandomOtpGenerator.generate()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid() {
        assert_eq!(Otp::parse(" 482913 ").unwrap().as_str(), "482913");
        assert_eq!(Otp::parse("000000").unwrap().as_str(), "000000");
    }

    #[test]
    fn test_parse_invalid() {
        assert_eq!(Otp::parse("   "), Err(OtpFormatError::Blank));
        assert_eq!(
            Otp::parse("12345"),
            Err(OtpFormatError::WrongLength { expected: 6, got: 5 })
        );
        assert_eq!(Otp::parse("12a456"), Err(OtpFormatError::NotNumeric));
        assert!(Otp::parse("１２３４５６").is_err());
    }

    #[test]
    fn test_matches() {
        let a = Otp::parse("482913").unwrap();
        assert!(a.matches(&Otp::parse("482913").unwrap()));
        assert!(!a.matches(&Otp::parse("482914").unwrap()));
    }

    #[test]
    fn test_random_codes_are_six_digits() {
        let generator = RandomOtpGenerator;
        for _ in 0..200 {
            let code = generator.generate();
            assert_eq!(code.as_str().len(), 6);
            assert!(Otp::parse(code.as_str()).is_ok());
        }
    }

    #[test]
    fn test_sequence_then_random() {
        let generator = SequenceOtpGenerator::new(["482913", "111111"]).unwrap();
        assert_eq!(generator.generate().as_str(), "482913");
        assert_eq!(generator.generate().as_str(), "111111");
        assert_eq!(generator.generate().as_str().len(), 6);
    }

    #[test]
    fn test_debug_redacts_code() {
        let code = Otp::parse("482913").unwrap();
        assert!(!format!("{:?}", code).contains("482913"));
        assert_eq!(code.to_string(), "482913");
    }

    #[test]
    fn test_deserialize_validates() {
        assert!(serde_json::from_str::<Otp>("\"12\"").is_err());
        assert_eq!(serde_json::from_str::<Otp>("\"654321\"").unwrap().as_str(), "654321");
    }
}
