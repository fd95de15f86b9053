//! Validated primitives shared across the clinic client crates.
//!
//! Each type here can only be constructed through a checking constructor, so holding a value is
//! proof that it passed validation. Wire (de)serialisation goes through the same checks.

/// Errors that can occur when creating validated primitive types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TypesError {
    /// The input text was empty or contained only whitespace
    #[error("Text cannot be empty")]
    Empty,
    /// The CPF did not contain exactly 11 digits
    #[error("CPF must have 11 digits")]
    CpfLength,
    /// The CPF had the right length but failed the repeated-digit or check-digit tests
    #[error("invalid CPF")]
    CpfChecksum,
    /// Office numbers start at 1
    #[error("office number must be a positive integer")]
    OfficeNumber,
}

/// A string type that guarantees non-empty content.
///
/// This type wraps a `String` and ensures it contains at least one non-whitespace character.
/// The input is automatically trimmed of leading and trailing whitespace during construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText` from the given input.
    ///
    /// The input is trimmed of leading and trailing whitespace. If the trimmed
    /// result is empty, an error is returned.
    ///
    /// # Errors
    ///
    /// Returns `TypesError::Empty` if the input is empty or contains only whitespace.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TypesError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TypesError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the inner string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns an upper-cased copy, as the backend stores professional names.
    pub fn to_uppercase(&self) -> NonEmptyText {
        NonEmptyText(self.0.to_uppercase())
    }
}

impl std::fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for NonEmptyText {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for NonEmptyText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NonEmptyText::new(&s).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// CPF
// ============================================================================

/// Brazilian individual taxpayer number (Cadastro de Pessoas Físicas).
///
/// Always holds exactly 11 ASCII digits with valid mod-11 check digits. Punctuation is a
/// display concern and never stored; see [`Cpf::formatted`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cpf(String);

impl Cpf {
    /// Parses a CPF from user input, ignoring any non-digit characters.
    ///
    /// # Errors
    ///
    /// - `TypesError::CpfLength` if the input does not contain exactly 11 digits.
    /// - `TypesError::CpfChecksum` if all digits are equal or either check digit is wrong.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, TypesError> {
        let digits: Vec<u32> = input
            .as_ref()
            .chars()
            .filter_map(|c| c.to_digit(10))
            .collect();

        if digits.len() != 11 {
            return Err(TypesError::CpfLength);
        }

        if digits.iter().all(|d| *d == digits[0]) {
            return Err(TypesError::CpfChecksum);
        }

        if check_digit(&digits[..9]) != digits[9] || check_digit(&digits[..10]) != digits[10] {
            return Err(TypesError::CpfChecksum);
        }

        Ok(Self(digits.iter().map(|d| char::from(b'0' + *d as u8)).collect()))
    }

    /// Returns the 11 digits.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the `XXX.XXX.XXX-XX` display form.
    pub fn formatted(&self) -> String {
        format!(
            "{}.{}.{}-{}",
            &self.0[0..3],
            &self.0[3..6],
            &self.0[6..9],
            &self.0[9..11]
        )
    }
}

/// Mod-11 check digit over `digits`, weighting from `len + 1` down to 2.
fn check_digit(digits: &[u32]) -> u32 {
    let weight_start = digits.len() as u32 + 1;
    let sum: u32 = digits
        .iter()
        .enumerate()
        .map(|(i, d)| d * (weight_start - i as u32))
        .sum();
    let digit = 11 - (sum % 11);
    if digit > 9 {
        0
    } else {
        digit
    }
}

impl std::fmt::Display for Cpf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Cpf {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Cpf::parse(s)
    }
}

impl serde::Serialize for Cpf {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for Cpf {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Cpf::parse(&s).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// OFFICE NUMBER
// ============================================================================

/// Consulting office number a doctor works from. Always at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OfficeNumber(u32);

impl OfficeNumber {
    /// # Errors
    ///
    /// Returns `TypesError::OfficeNumber` for zero.
    pub fn new(value: u32) -> Result<Self, TypesError> {
        if value == 0 {
            return Err(TypesError::OfficeNumber);
        }
        Ok(Self(value))
    }

    /// Parses a user-typed office number.
    ///
    /// # Errors
    ///
    /// Returns `TypesError::OfficeNumber` for anything that is not a positive integer.
    pub fn parse(input: &str) -> Result<Self, TypesError> {
        let value: u32 = input.trim().parse().map_err(|_| TypesError::OfficeNumber)?;
        Self::new(value)
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for OfficeNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl serde::Serialize for OfficeNumber {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u32(self.0)
    }
}

impl<'de> serde::Deserialize<'de> for OfficeNumber {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = u32::deserialize(deserializer)?;
        OfficeNumber::new(value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_empty_text_trims_and_rejects_blank() {
        let text = NonEmptyText::new("  Maria Silva ").expect("should accept text");
        assert_eq!(text.as_str(), "Maria Silva");
        assert_eq!(NonEmptyText::new("   "), Err(TypesError::Empty));
    }

    #[test]
    fn test_cpf_accepts_valid_formatted_and_bare_input() {
        let formatted = Cpf::parse("529.982.247-25").expect("valid CPF should parse");
        let bare = Cpf::parse("52998224725").expect("valid CPF should parse");
        assert_eq!(formatted, bare);
        assert_eq!(formatted.as_str(), "52998224725");
        assert_eq!(formatted.formatted(), "529.982.247-25");
    }

    #[test]
    fn test_cpf_rejects_repeated_digits() {
        assert_eq!(Cpf::parse("111.111.111-11"), Err(TypesError::CpfChecksum));
        assert_eq!(Cpf::parse("00000000000"), Err(TypesError::CpfChecksum));
    }

    #[test]
    fn test_cpf_rejects_wrong_check_digits() {
        assert_eq!(Cpf::parse("529.982.247-24"), Err(TypesError::CpfChecksum));
        assert_eq!(Cpf::parse("529.982.247-35"), Err(TypesError::CpfChecksum));
    }

    #[test]
    fn test_cpf_rejects_wrong_length() {
        assert_eq!(Cpf::parse("5299822472"), Err(TypesError::CpfLength));
        assert_eq!(Cpf::parse("529982247251"), Err(TypesError::CpfLength));
        assert_eq!(Cpf::parse(""), Err(TypesError::CpfLength));
    }

    #[test]
    fn test_cpf_check_digit_remainder_over_nine_becomes_zero() {
        // First check digit wraps to 0.
        Cpf::parse("123.456.789-09").expect("valid CPF should parse");
        // Second check digit wraps to 0.
        Cpf::parse("100.000.002-80").expect("valid CPF should parse");
    }

    #[test]
    fn test_cpf_deserialize_validates() {
        let ok: Cpf = serde_json::from_str("\"52998224725\"").expect("should deserialize");
        assert_eq!(ok.as_str(), "52998224725");
        assert!(serde_json::from_str::<Cpf>("\"11111111111\"").is_err());
    }

    #[test]
    fn test_office_number_rejects_zero_and_garbage() {
        assert_eq!(OfficeNumber::parse(" 3 ").map(OfficeNumber::get), Ok(3));
        assert_eq!(OfficeNumber::parse("0"), Err(TypesError::OfficeNumber));
        assert_eq!(OfficeNumber::parse("-1"), Err(TypesError::OfficeNumber));
        assert_eq!(OfficeNumber::parse("abc"), Err(TypesError::OfficeNumber));
    }
}
