use crate::ser::{ByteReader, ByteWriter, Error, Readable, Writeable, RECORD_VERSION};
use crate::types::{Pkid, U256};

/// Liquid balance of one coin held by one pkid. The native coin is the entry
/// whose creator is the zero pkid and is additionally capped below 2^64.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceEntry {
	pub hodler: Pkid,
	pub creator: Pkid,
	pub balance: U256,
}

impl BalanceEntry {
	pub fn new(hodler: Pkid, creator: Pkid) -> Self {
		Self {
			hodler,
			creator,
			balance: U256::zero(),
		}
	}

	pub fn is_native(&self) -> bool {
		self.creator.is_zero()
	}

	/// Empty entries are not persisted; flush deletes their key.
	pub fn is_empty(&self) -> bool {
		self.balance.is_zero()
	}
}

impl Writeable for BalanceEntry {
	fn write(&self, writer: &mut ByteWriter) {
		writer.write_u8(RECORD_VERSION);
		writer.write_fixed(self.hodler.as_bytes());
		writer.write_fixed(self.creator.as_bytes());
		writer.write_u256_var(&self.balance);
	}
}

impl Readable for BalanceEntry {
	fn read(reader: &mut ByteReader<'_>) -> Result<Self, Error> {
		reader.read_version()?;
		let hodler = Pkid::from_bytes(reader.read_fixed(33)?)
			.ok_or_else(|| Error::Corrupted("bad hodler pkid".to_string()))?;
		let creator = Pkid::from_bytes(reader.read_fixed(33)?)
			.ok_or_else(|| Error::Corrupted("bad creator pkid".to_string()))?;
		let balance = reader.read_u256_var()?;
		Ok(Self {
			hodler,
			creator,
			balance,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::ser;

	#[test]
	fn test_round_trip() {
		let entry = BalanceEntry {
			hodler: Pkid([3u8; 33]),
			creator: Pkid([4u8; 33]),
			balance: U256::from(123_456_789u64),
		};
		let decoded: BalanceEntry = ser::from_bytes(&ser::to_bytes(&entry)).unwrap();
		assert_eq!(entry, decoded);
	}

	#[test]
	fn test_native_and_empty() {
		let mut entry = BalanceEntry::new(Pkid([1u8; 33]), Pkid::zero());
		assert!(entry.is_native());
		assert!(entry.is_empty());
		entry.balance = U256::from(1u8);
		assert!(!entry.is_empty());
	}
}
