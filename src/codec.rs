//! Wire formats for snapshots and deltas
//!
//! Two codecs are provided: a JSON one (field names included, for humans and
//! interoperability) and a compact binary one (fixed field order, for
//! storage and transport between trusted peers). Both go through serde, so
//! anything that this crate produces can be encoded with either of them.

use crate::error::Error;
use crate::snapshot::Snapshot;
use serde::de::DeserializeOwned;
use serde::Serialize;


/// Something that can encode snapshots into bytes, and back
pub trait Codec {
    /// Encode a snapshot
    fn serialize<T: Serialize>(&self, snapshot: &Snapshot<T>)
        -> Result<Vec<u8>, Error>;

    /// Decode a snapshot
    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8])
        -> Result<Snapshot<T>, Error>;
}


/// JSON codec, with tagged field names
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonCodec {
    /// Truth that the output should be indented
    pub pretty: bool,
}
//
impl Codec for JsonCodec {
    fn serialize<T: Serialize>(&self, snapshot: &Snapshot<T>)
        -> Result<Vec<u8>, Error>
    {
        let bytes = if self.pretty {
            serde_json::to_vec_pretty(snapshot)?
        } else {
            serde_json::to_vec(snapshot)?
        };
        Ok(bytes)
    }

    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8])
        -> Result<Snapshot<T>, Error>
    {
        Ok(serde_json::from_slice(bytes)?)
    }
}


/// Binary codec, with a fixed field layout
#[derive(Clone, Copy, Debug, Default)]
pub struct BinaryCodec;
//
impl Codec for BinaryCodec {
    fn serialize<T: Serialize>(&self, snapshot: &Snapshot<T>)
        -> Result<Vec<u8>, Error>
    {
        Ok(bincode::serialize(snapshot)?)
    }

    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8])
        -> Result<Snapshot<T>, Error>
    {
        Ok(bincode::deserialize(bytes)?)
    }
}
