use std::fmt;
use std::str::FromStr;

use crate::error::ModelError;

/// One of the two physical copies of the published index.
///
/// Exactly one instance serves live reads at any time; the other receives the
/// writes of a Full publish cycle until it is promoted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u8", into = "u8"))]
pub struct InstanceId(u8);

impl InstanceId {
    pub const ZERO: InstanceId = InstanceId(0);
    pub const ONE: InstanceId = InstanceId(1);

    pub fn from_bit(bit: u8) -> Result<Self, ModelError> {
        match bit {
            0 => Ok(Self::ZERO),
            1 => Ok(Self::ONE),
            other => Err(ModelError::InvalidInstance(other.to_string())),
        }
    }

    pub fn bit(&self) -> u8 {
        self.0
    }

    /// The opposite instance.
    pub fn other(&self) -> InstanceId {
        InstanceId(self.0 ^ 1)
    }
}

impl TryFrom<u8> for InstanceId {
    type Error = ModelError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_bit(value)
    }
}

impl From<InstanceId> for u8 {
    fn from(value: InstanceId) -> Self {
        value.0
    }
}

impl FromStr for InstanceId {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "0" => Ok(Self::ZERO),
            "1" => Ok(Self::ONE),
            other => Err(ModelError::InvalidInstance(other.to_string())),
        }
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Storage partition inside an instance. Protected records carry sensitive
/// locations and live apart from the diffused public copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Partition {
    Public,
    Protected,
}

impl Partition {
    pub const ALL: [Partition; 2] = [Partition::Public, Partition::Protected];

    pub fn as_str(&self) -> &'static str {
        match self {
            Partition::Public => "public",
            Partition::Protected => "protected",
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn other_flips_the_bit() {
        assert_eq!(InstanceId::ZERO.other(), InstanceId::ONE);
        assert_eq!(InstanceId::ONE.other(), InstanceId::ZERO);
        assert_eq!(InstanceId::ONE.other().other(), InstanceId::ONE);
    }

    #[test]
    fn rejects_bits_other_than_zero_and_one() {
        assert!(InstanceId::from_bit(2).is_err());
        assert!("7".parse::<InstanceId>().is_err());
        assert_eq!("1".parse::<InstanceId>(), Ok(InstanceId::ONE));
    }
}
