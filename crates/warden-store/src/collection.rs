//! Typed document collections over `RocksDB` column families.
//!
//! A [`Collection`] binds a column family to a document type. Values are
//! CBOR-encoded. Reads that touch many records return a store-level `Result`
//! wrapping per-record results, so one undecodable record does not hide the rest.

use std::marker::PhantomData;
use std::sync::Arc;

use rocksdb::{BoundColumnFamily, DBWithThreadMode, IteratorMode, MultiThreaded, WriteBatch};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, StoreError};

pub(crate) type Db = DBWithThreadMode<MultiThreaded>;

/// A record that can be stored in a [`Collection`].
pub trait Document: Serialize + DeserializeOwned {
    /// Primary key of this record.
    fn key(&self) -> Vec<u8>;
}

/// A typed view of one column family.
pub struct Collection<T> {
    db: Arc<Db>,
    name: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Document> Collection<T> {
    pub(crate) fn new(db: Arc<Db>, name: impl Into<String>) -> Self {
        Self {
            db,
            name: name.into(),
            _marker: PhantomData,
        }
    }

    /// Column family name backing this collection.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn handle(&self) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db.cf_handle(&self.name).ok_or_else(|| {
            StoreError::Database(format!("column family not found: {}", self.name))
        })
    }

    /// Encode a document using CBOR.
    pub(crate) fn encode(doc: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(doc, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Decode a document from CBOR.
    pub(crate) fn decode(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Fetch one document by key.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Database` on read failure and
    /// `StoreError::Serialization` if the stored bytes do not decode.
    pub fn get(&self, key: &[u8]) -> Result<Option<T>> {
        let cf = self.handle()?;
        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::decode(&data))
            .transpose()
    }

    /// Fetch several documents by key. Missing keys are skipped.
    ///
    /// # Errors
    ///
    /// The outer result fails on a database error. Each inner result carries
    /// that record's decode outcome.
    pub fn get_many<K: AsRef<[u8]>>(&self, keys: &[K]) -> Result<Vec<Result<T>>> {
        let cf = self.handle()?;
        let mut docs = Vec::with_capacity(keys.len());
        for key in keys {
            let data = self
                .db
                .get_cf(&cf, key.as_ref())
                .map_err(|e| StoreError::Database(e.to_string()))?;
            if let Some(data) = data {
                docs.push(Self::decode(&data));
            }
        }
        Ok(docs)
    }

    /// Stage a put of `doc` into `batch`.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be encoded.
    pub fn stage_put(&self, batch: &mut WriteBatch, doc: &T) -> Result<()> {
        let cf = self.handle()?;
        batch.put_cf(&cf, doc.key(), Self::encode(doc)?);
        Ok(())
    }

    /// Write raw bytes under `key`, bypassing encoding.
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails.
    pub fn put_raw(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let cf = self.handle()?;
        self.db
            .put_cf(&cf, key, value)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    /// Iterate the whole collection.
    ///
    /// # Errors
    ///
    /// The outer result fails on a database error. Each inner result carries
    /// that record's decode outcome.
    pub fn scan(&self) -> Result<Vec<Result<T>>> {
        let cf = self.handle()?;
        let mut docs = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            docs.push(Self::decode(&value));
        }
        Ok(docs)
    }
}
