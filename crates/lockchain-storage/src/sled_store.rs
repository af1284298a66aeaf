use crate::kv::{KvSnapshot, KvStore, WriteBatch, WriteOp};
use crate::Result;
use std::path::Path;

/// Durable store backed by sled.
///
/// sled batches are atomic, which covers the flush contract. sled has no
/// native point-in-time snapshots; `snapshot()` returns a read-through view,
/// which is consistent because the pipeline is the only writer and holds all
/// writes in its overlay between flushes.
pub struct SledKvStore {
	db: sled::Db,
}

impl SledKvStore {
	pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
		let db = sled::open(path)?;
		Ok(Self { db })
	}
}

fn scan_tree(
	db: &sled::Db,
	prefix: &[u8],
	limit: usize,
	reverse: bool,
) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
	let take = if limit == 0 { usize::MAX } else { limit };
	let mut out = Vec::new();
	if reverse {
		for item in db.scan_prefix(prefix).rev().take(take) {
			let (k, v) = item?;
			out.push((k.to_vec(), v.to_vec()));
		}
	} else {
		for item in db.scan_prefix(prefix).take(take) {
			let (k, v) = item?;
			out.push((k.to_vec(), v.to_vec()));
		}
	}
	Ok(out)
}

impl KvStore for SledKvStore {
	fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
		Ok(self.db.get(key)?.map(|v| v.to_vec()))
	}

	fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
		self.db.insert(key, value)?;
		Ok(())
	}

	fn delete(&self, key: &[u8]) -> Result<()> {
		self.db.remove(key)?;
		Ok(())
	}

	fn prefix_scan(
		&self,
		prefix: &[u8],
		limit: usize,
		reverse: bool,
	) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
		scan_tree(&self.db, prefix, limit, reverse)
	}

	fn write_batch(&self, batch: &WriteBatch) -> Result<()> {
		let mut sled_batch = sled::Batch::default();
		for op in &batch.ops {
			match op {
				WriteOp::Put { key, value } => sled_batch.insert(key.as_slice(), value.as_slice()),
				WriteOp::Delete { key } => sled_batch.remove(key.as_slice()),
			}
		}
		self.db.apply_batch(sled_batch)?;
		self.db.flush()?;
		Ok(())
	}

	fn snapshot(&self) -> Box<dyn KvSnapshot> {
		Box::new(SledSnapshot {
			db: self.db.clone(),
		})
	}
}

/// Read-through view over the sled tree; see the note on `SledKvStore`.
pub struct SledSnapshot {
	db: sled::Db,
}

impl KvSnapshot for SledSnapshot {
	fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
		Ok(self.db.get(key)?.map(|v| v.to_vec()))
	}

	fn prefix_scan(
		&self,
		prefix: &[u8],
		limit: usize,
		reverse: bool,
	) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
		scan_tree(&self.db, prefix, limit, reverse)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_sled_round_trip() {
		let dir = tempfile::tempdir().unwrap();
		let store = SledKvStore::open(dir.path()).unwrap();
		store.set(b"k", b"v").unwrap();
		assert_eq!(store.get(b"k").unwrap(), Some(b"v".to_vec()));

		let mut batch = WriteBatch::new();
		batch.delete(b"k".to_vec());
		batch.put(b"k2".to_vec(), b"v2".to_vec());
		store.write_batch(&batch).unwrap();

		assert_eq!(store.get(b"k").unwrap(), None);
		assert_eq!(store.get(b"k2").unwrap(), Some(b"v2".to_vec()));
	}

	#[test]
	fn test_sled_prefix_scan_reverse() {
		let dir = tempfile::tempdir().unwrap();
		let store = SledKvStore::open(dir.path()).unwrap();
		for i in 0u8..4 {
			store.set(&[7, i], &[i]).unwrap();
		}
		let rev = store.prefix_scan(&[7], 0, true).unwrap();
		assert_eq!(rev.first().unwrap().0, vec![7, 3]);
		assert_eq!(rev.last().unwrap().0, vec![7, 0]);
	}
}
