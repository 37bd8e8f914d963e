use std::fmt;

use redb::TableDefinition;

/// Typed table definition backing every bucket: byte keys to byte values.
pub(crate) type BucketTable = TableDefinition<'static, &'static [u8], &'static [u8]>;

/// A named bucket of byte keys to byte values.
///
/// Buckets are declared as constants by the crates that own them:
///
/// ```
/// use vault_store::Bucket;
///
/// const BLOCKS: Bucket = Bucket::new("blocks");
/// assert_eq!(BLOCKS.name(), "blocks");
/// ```
///
/// Keys are compared bytewise, so integer keys should be big-endian for
/// iteration to follow numeric order.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Bucket {
    name: &'static str,
}

impl Bucket {
    pub const fn new(name: &'static str) -> Self {
        Self { name }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn definition(&self) -> BucketTable {
        TableDefinition::new(self.name)
    }
}

impl fmt::Debug for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bucket({})", self.name)
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}
