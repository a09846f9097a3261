use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::{
    archive::{item_count, nested, ArchiveReader, ArchiveWriter},
    Error, FString, Result,
};

/// A property type name with its nested parameters, e.g.
/// `MapProperty(StrProperty, StructProperty(Vector(/Script/CoreUObject)))`.
///
/// Before [`crate::ObjectVersionUE5::PROPERTY_TAG_COMPLETE_TYPE_NAME`] only the outer name is
/// stored and parameters stay empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FPropertyTypeName {
    pub name: FString,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<FPropertyTypeName>,
}

impl FPropertyTypeName {
    pub fn new(name: impl Into<FString>) -> Self {
        Self {
            name: name.into(),
            parameters: vec![],
        }
    }
    pub fn with_parameters(name: impl Into<FString>, parameters: Vec<FPropertyTypeName>) -> Self {
        Self {
            name: name.into(),
            parameters,
        }
    }
    pub fn parameter(&self, index: usize) -> Option<&FPropertyTypeName> {
        self.parameters.get(index)
    }

    #[instrument(name = "FPropertyTypeName_read", skip_all)]
    pub fn read<A: ArchiveReader + ?Sized>(ar: &mut A) -> Result<Self> {
        let name = ar.read_string()?;
        if !ar.version().complete_type_name() {
            return Ok(Self::new(name));
        }
        let count = ar.read_i32::<LE>()?;
        if count < 0 {
            return Err(Error::Other(format!(
                "type {name} has a negative parameter count {count}"
            )));
        }
        let parameters = (0..count)
            .map(|_| nested(ar, Self::read))
            .collect::<Result<_>>()?;
        Ok(Self { name, parameters })
    }

    #[instrument(name = "FPropertyTypeName_write", skip_all)]
    pub fn write<A: ArchiveWriter + ?Sized>(&self, ar: &mut A) -> Result<()> {
        ar.write_string(&self.name)?;
        if ar.version().complete_type_name() {
            ar.write_i32::<LE>(item_count(self.name.as_str(), self.parameters.len())?)?;
            for parameter in &self.parameters {
                parameter.write(ar)?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for FPropertyTypeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some((first, rest)) = self.parameters.split_first() {
            write!(f, "({first}")?;
            for parameter in rest {
                write!(f, ", {parameter}")?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}
