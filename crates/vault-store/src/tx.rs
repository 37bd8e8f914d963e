use redb::{
    ReadTransaction, ReadableTable, ReadableTableMetadata, TableError, TableHandle,
    WriteTransaction,
};

use crate::bucket::Bucket;
use crate::error::{StoreError, StoreResult};

type Entry = (Vec<u8>, Vec<u8>);

/// A read or write transaction on a [`Store`](crate::Store).
///
/// Read methods work on both kinds. Mutating methods fail with
/// [`StoreError::ReadOnlyTransaction`] on a read transaction. Reading a
/// bucket that does not exist behaves like reading an empty bucket and never
/// creates it.
pub struct Tx<'a> {
    inner: TxInner<'a>,
}

enum TxInner<'a> {
    Read(&'a ReadTransaction),
    Write(&'a WriteTransaction),
}

/// Run `$body` against the bucket's table if it exists, otherwise yield `$missing`.
macro_rules! with_table {
    ($tx:expr, $bucket:expr, $missing:expr, |$table:ident| $body:expr) => {
        match $tx.inner {
            TxInner::Read(txn) => match txn.open_table($bucket.definition()) {
                Ok($table) => $body,
                Err(TableError::TableDoesNotExist(_)) => Ok($missing),
                Err(e) => Err(StoreError::from(e)),
            },
            TxInner::Write(txn) => {
                if $tx.bucket_exists($bucket)? {
                    let $table = txn.open_table($bucket.definition())?;
                    $body
                } else {
                    Ok($missing)
                }
            }
        }
    };
}

impl<'a> Tx<'a> {
    pub(crate) fn read(txn: &'a ReadTransaction) -> Self {
        Self {
            inner: TxInner::Read(txn),
        }
    }

    pub(crate) fn write(txn: &'a WriteTransaction) -> Self {
        Self {
            inner: TxInner::Write(txn),
        }
    }

    /// Returns `true` for transactions opened with [`Store::update`](crate::Store::update).
    pub fn is_writable(&self) -> bool {
        matches!(self.inner, TxInner::Write(_))
    }

    /// Whether the bucket has been created in this store.
    pub fn bucket_exists(&self, bucket: Bucket) -> StoreResult<bool> {
        let found = match self.inner {
            TxInner::Read(txn) => txn
                .list_tables()?
                .any(|handle| handle.name() == bucket.name()),
            TxInner::Write(txn) => txn
                .list_tables()?
                .any(|handle| handle.name() == bucket.name()),
        };
        Ok(found)
    }

    /// Read the value stored under `key`.
    pub fn get(&self, bucket: Bucket, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        with_table!(self, bucket, None, |table| get_in(&table, key))
    }

    /// The entry with the greatest key.
    pub fn last(&self, bucket: Bucket) -> StoreResult<Option<Entry>> {
        with_table!(self, bucket, None, |table| last_in(&table))
    }

    /// The smallest key greater than or equal to `from`.
    pub fn next_key(&self, bucket: Bucket, from: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        with_table!(self, bucket, None, |table| next_key_in(&table, from))
    }

    /// Number of entries in the bucket.
    pub fn len(&self, bucket: Bucket) -> StoreResult<u64> {
        with_table!(self, bucket, 0, |table| Ok(table.len()?))
    }

    /// Every entry of the bucket in key order.
    pub fn entries(&self, bucket: Bucket) -> StoreResult<Vec<Entry>> {
        with_table!(self, bucket, Vec::new(), |table| entries_in(&table))
    }

    /// Insert or overwrite `key`, creating the bucket if needed.
    pub fn put(&self, bucket: Bucket, key: &[u8], value: &[u8]) -> StoreResult<()> {
        let txn = self.writable()?;
        let mut table = txn.open_table(bucket.definition())?;
        table.insert(key, value)?;
        Ok(())
    }

    /// Remove `key`. Returns `true` if it was present.
    pub fn delete(&self, bucket: Bucket, key: &[u8]) -> StoreResult<bool> {
        let txn = self.writable()?;
        if !self.bucket_exists(bucket)? {
            return Ok(false);
        }
        let mut table = txn.open_table(bucket.definition())?;
        let removed = table.remove(key)?.is_some();
        Ok(removed)
    }

    /// Delete the bucket and all its entries. Returns `true` if it existed.
    pub fn drop_bucket(&self, bucket: Bucket) -> StoreResult<bool> {
        let txn = self.writable()?;
        Ok(txn.delete_table(bucket.definition())?)
    }

    fn writable(&self) -> StoreResult<&'a WriteTransaction> {
        match self.inner {
            TxInner::Write(txn) => Ok(txn),
            TxInner::Read(_) => Err(StoreError::ReadOnlyTransaction),
        }
    }
}

fn get_in<T>(table: &T, key: &[u8]) -> StoreResult<Option<Vec<u8>>>
where
    T: ReadableTable<&'static [u8], &'static [u8]>,
{
    Ok(table.get(key)?.map(|value| value.value().to_vec()))
}

fn last_in<T>(table: &T) -> StoreResult<Option<Entry>>
where
    T: ReadableTable<&'static [u8], &'static [u8]>,
{
    Ok(table
        .last()?
        .map(|(k, v)| (k.value().to_vec(), v.value().to_vec())))
}

fn next_key_in<T>(table: &T, from: &[u8]) -> StoreResult<Option<Vec<u8>>>
where
    T: ReadableTable<&'static [u8], &'static [u8]>,
{
    match table.range::<&[u8]>(from..)?.next() {
        Some(item) => Ok(Some(item?.0.value().to_vec())),
        None => Ok(None),
    }
}

fn entries_in<T>(table: &T) -> StoreResult<Vec<Entry>>
where
    T: ReadableTable<&'static [u8], &'static [u8]>,
{
    let mut out = Vec::new();
    for item in table.iter()? {
        let (k, v) = item?;
        out.push((k.value().to_vec(), v.value().to_vec()));
    }
    Ok(out)
}
