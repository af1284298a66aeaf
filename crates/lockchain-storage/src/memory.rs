use crate::kv::{prefix_upper_bound, KvSnapshot, KvStore, WriteBatch, WriteOp};
use crate::Result;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::RwLock;

/// In-memory ordered store. Snapshots are point-in-time copies, so they give
/// real snapshot isolation; the backing map stays small enough in tests that
/// the copy is not a concern.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
	inner: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryKvStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn len(&self) -> usize {
		self.inner.read().unwrap().len()
	}

	pub fn is_empty(&self) -> bool {
		self.inner.read().unwrap().is_empty()
	}
}

fn scan_map(
	map: &BTreeMap<Vec<u8>, Vec<u8>>,
	prefix: &[u8],
	limit: usize,
	reverse: bool,
) -> Vec<(Vec<u8>, Vec<u8>)> {
	let upper = match prefix_upper_bound(prefix) {
		Some(bound) => Bound::Excluded(bound),
		None => Bound::Unbounded,
	};
	let range = map.range((Bound::Included(prefix.to_vec()), upper));
	let take = if limit == 0 { usize::MAX } else { limit };
	if reverse {
		range
			.rev()
			.take(take)
			.map(|(k, v)| (k.clone(), v.clone()))
			.collect()
	} else {
		range
			.take(take)
			.map(|(k, v)| (k.clone(), v.clone()))
			.collect()
	}
}

impl KvStore for MemoryKvStore {
	fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
		Ok(self.inner.read().unwrap().get(key).cloned())
	}

	fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
		self.inner
			.write()
			.unwrap()
			.insert(key.to_vec(), value.to_vec());
		Ok(())
	}

	fn delete(&self, key: &[u8]) -> Result<()> {
		self.inner.write().unwrap().remove(key);
		Ok(())
	}

	fn prefix_scan(
		&self,
		prefix: &[u8],
		limit: usize,
		reverse: bool,
	) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
		Ok(scan_map(&self.inner.read().unwrap(), prefix, limit, reverse))
	}

	fn write_batch(&self, batch: &WriteBatch) -> Result<()> {
		// single lock acquisition makes the batch atomic w.r.t. readers
		let mut map = self.inner.write().unwrap();
		for op in &batch.ops {
			match op {
				WriteOp::Put { key, value } => {
					map.insert(key.clone(), value.clone());
				}
				WriteOp::Delete { key } => {
					map.remove(key);
				}
			}
		}
		Ok(())
	}

	fn snapshot(&self) -> Box<dyn KvSnapshot> {
		Box::new(MemorySnapshot {
			map: self.inner.read().unwrap().clone(),
		})
	}
}

/// A frozen copy of the store contents.
pub struct MemorySnapshot {
	map: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl KvSnapshot for MemorySnapshot {
	fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
		Ok(self.map.get(key).cloned())
	}

	fn prefix_scan(
		&self,
		prefix: &[u8],
		limit: usize,
		reverse: bool,
	) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
		Ok(scan_map(&self.map, prefix, limit, reverse))
	}
}
