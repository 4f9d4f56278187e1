use vecagg_error::{DbError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    /// The hash value for this entry.
    pub hash: u64,
    /// Index of the group in the table's entry list.
    ///
    /// None if this slot isn't occupied.
    pub group: Option<u32>,
}

impl Entry {
    const EMPTY: Self = Entry {
        hash: 0,
        group: None,
    };
}

/// Open addressing directory mapping hashes to group indices.
///
/// Linear probing over a power of two sized slot array.
#[derive(Debug)]
pub struct Directory {
    /// Number of occupied slots.
    pub num_occupied: usize,
    pub entries: Vec<Entry>,
}

const _: () = {
    assert!(
        Directory::DEFAULT_CAPACITY.is_power_of_two(),
        "must be power of two"
    );
};

impl Directory {
    const LOAD_NUM: usize = 7;
    const LOAD_DEN: usize = 10;

    pub const DEFAULT_CAPACITY: usize = 512;

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = usize::max(capacity, 1).next_power_of_two();
        Directory {
            num_occupied: 0,
            entries: vec![Entry::EMPTY; capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Grow the directory to at least `new_capacity` slots, reinserting all
    /// occupied entries.
    pub fn resize(&mut self, new_capacity: usize) -> Result<()> {
        let new_capacity = new_capacity
            .checked_next_power_of_two()
            .ok_or_else(|| DbError::new("Requested capacity for directory too high"))?;
        if new_capacity < self.entries.len() {
            return Err(DbError::new("Cannot reduce capacity of hash table")
                .with_field("current", self.entries.len())
                .with_field("new", new_capacity));
        }

        let old_entries = std::mem::replace(&mut self.entries, vec![Entry::EMPTY; new_capacity]);

        for ent in old_entries.into_iter().filter(|ent| ent.group.is_some()) {
            let mut offset = compute_offset_from_hash(ent.hash, new_capacity as u64) as usize;
            while self.entries[offset].group.is_some() {
                offset = inc_and_wrap_offset(offset, new_capacity);
            }
            self.entries[offset] = ent;
        }

        debug_assert_eq!(
            self.num_occupied,
            self.entries.iter().filter(|ent| ent.group.is_some()).count()
        );

        Ok(())
    }

    pub fn needs_resize(&self, num_inputs: usize) -> bool {
        // (num_occupied + num_inputs) / capacity > 7/10
        (self.num_occupied + num_inputs) * Self::LOAD_DEN > self.capacity() * Self::LOAD_NUM
    }

    /// Find the slot holding `hash` for which `is_match` accepts the group,
    /// or the empty slot where it should be inserted.
    pub fn probe(&self, hash: u64, mut is_match: impl FnMut(u32) -> bool) -> ProbeResult {
        let cap = self.capacity();
        let mut offset = compute_offset_from_hash(hash, cap as u64) as usize;

        loop {
            let ent = &self.entries[offset];
            match ent.group {
                None => return ProbeResult::Empty(offset),
                Some(group) if ent.hash == hash && is_match(group) => {
                    return ProbeResult::Found(group);
                }
                Some(_) => offset = inc_and_wrap_offset(offset, cap),
            }
        }
    }

    /// Occupy an empty slot previously returned from `probe`.
    pub fn insert_at(&mut self, offset: usize, hash: u64, group: u32) {
        debug_assert!(self.entries[offset].group.is_none());
        self.entries[offset] = Entry {
            hash,
            group: Some(group),
        };
        self.num_occupied += 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    Found(u32),
    Empty(usize),
}

/// Increment offset by one, wrapping around if necessary.
///
/// Requires that `cap` be a power of 2.
pub const fn inc_and_wrap_offset(offset: usize, cap: usize) -> usize {
    (offset + 1) & (cap - 1)
}

/// Compute the initial offset using a hash.
///
/// Requires that `cap` be a power of 2.
pub const fn compute_offset_from_hash(hash: u64, cap: u64) -> u64 {
    hash & (cap - 1)
}
