//! Test utilities shared by the format test modules

use crate::BinaryFormat;
use std::fmt::Debug;

/// Build a value, parse it back and compare
pub fn test_round_trip<T>(original: &T) -> Result<(), Box<dyn std::error::Error>>
where
    T: BinaryFormat + PartialEq + Debug,
{
    let data = original.build()?;
    let parsed = T::parse(&data)?;

    if original != &parsed {
        return Err(format!(
            "Round-trip verification failed:\nOriginal: {:?}\nParsed: {:?}",
            original, parsed
        )
        .into());
    }

    Ok(())
}

/// Test that parsing invalid data fails
pub fn test_invalid_data_rejected<T>(invalid_data: &[u8]) -> Result<(), Box<dyn std::error::Error>>
where
    T: BinaryFormat,
{
    match T::parse(invalid_data) {
        Ok(_) => Err("Expected parsing to fail for invalid data, but it succeeded".into()),
        Err(_) => Ok(()),
    }
}

/// Assert that a value survives build then parse
#[macro_export]
macro_rules! assert_round_trip {
    ($value:expr) => {
        $crate::test_utils::test_round_trip(&$value).expect("Round-trip should succeed")
    };
}

/// Assert that invalid data is rejected
#[macro_export]
macro_rules! assert_invalid_data_rejected {
    ($type:ty, $data:expr) => {
        $crate::test_utils::test_invalid_data_rejected::<$type>($data)
            .expect("Invalid data should be rejected")
    };
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Word {
        value: u32,
    }

    impl BinaryFormat for Word {
        fn parse(data: &[u8]) -> Result<Self, Box<dyn std::error::Error>> {
            let bytes: [u8; 4] = data.try_into()?;
            Ok(Word {
                value: u32::from_le_bytes(bytes),
            })
        }

        fn build(&self) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
            Ok(self.value.to_le_bytes().to_vec())
        }
    }

    #[test]
    fn test_round_trip_utility() {
        assert_round_trip!(Word { value: 42 });
        Word::verify_round_trip(&7u32.to_le_bytes()).expect("verify");
    }

    #[test]
    fn test_invalid_data_rejected_utility() {
        assert_invalid_data_rejected!(Word, &[1, 2]);
    }
}
