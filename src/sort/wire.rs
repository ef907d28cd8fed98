//! Serializable form of a [`TupleComparator`].
//!
//! A compiled plan ships its comparators to workers as a [`ComparatorWire`]
//! record. The record carries the resolved keys so a worker never repeats
//! name resolution, plus the named sort specs for explain output and
//! re-planning. Field names are the stable identity of each member.

use serde::{Deserialize, Serialize};

use super::{CompiledKey, ComparatorError, SortSpec, TupleComparator};
use crate::{
    logging::tessera_log,
    record::Schema,
};

/// Current wire layout version.
pub const WIRE_VERSION: u16 = 1;

/// The record a comparator travels as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparatorWire {
    /// Layout version, currently [`WIRE_VERSION`].
    pub version: u16,
    /// Schema the keys were resolved against.
    pub schema: Schema,
    /// Provenance only; decoding never resolves these names.
    #[serde(default)]
    pub sort_specs: Vec<SortSpec>,
    /// Resolved keys, in precedence order.
    pub comp_specs: Vec<CompiledKey>,
}

impl ComparatorWire {
    fn validate(&self) -> Result<(), ComparatorError> {
        if self.version != WIRE_VERSION {
            return Err(ComparatorError::Serialization(format!(
                "unsupported wire version {} (expected {WIRE_VERSION})",
                self.version
            )));
        }
        if self.comp_specs.is_empty() {
            return Err(ComparatorError::Serialization(
                "payload carries no compiled sort keys".to_string(),
            ));
        }
        if !self.sort_specs.is_empty() && self.sort_specs.len() != self.comp_specs.len() {
            return Err(ComparatorError::Serialization(format!(
                "{} sort specs do not pair with {} compiled keys",
                self.sort_specs.len(),
                self.comp_specs.len()
            )));
        }
        if let Some(key) = self
            .comp_specs
            .iter()
            .find(|key| key.column_id >= self.schema.len())
        {
            return Err(ComparatorError::Serialization(format!(
                "column id {} out of range for a schema of {} columns",
                key.column_id,
                self.schema.len()
            )));
        }
        Ok(())
    }
}

impl TupleComparator {
    /// The wire record for this comparator.
    pub fn to_wire(&self) -> ComparatorWire {
        ComparatorWire {
            version: WIRE_VERSION,
            schema: self.schema.clone(),
            sort_specs: self.sort_specs.clone(),
            comp_specs: self.keys.clone(),
        }
    }

    /// Rebuild a comparator from its wire form, trusting the resolved ids.
    pub fn from_wire(wire: ComparatorWire) -> Result<Self, ComparatorError> {
        wire.validate()?;
        Ok(Self {
            schema: wire.schema,
            sort_specs: wire.sort_specs,
            keys: wire.comp_specs,
        })
    }

    /// JSON bytes of [`TupleComparator::to_wire`].
    pub fn encode(&self) -> Result<Vec<u8>, ComparatorError> {
        serde_json::to_vec(&self.to_wire())
            .map_err(|err| ComparatorError::Serialization(err.to_string()))
    }

    /// Parse bytes produced by [`TupleComparator::encode`]. The result is
    /// equal to the encoded comparator and orders tuples identically.
    pub fn decode(bytes: &[u8]) -> Result<Self, ComparatorError> {
        let wire: ComparatorWire = serde_json::from_slice(bytes)
            .map_err(|err| ComparatorError::Serialization(err.to_string()))?;
        let comparator = Self::from_wire(wire)?;
        tessera_log!(
            log::Level::Debug,
            "comparator_decode",
            "keys=[{}] payload_bytes={}",
            comparator,
            bytes.len()
        );
        Ok(comparator)
    }
}
