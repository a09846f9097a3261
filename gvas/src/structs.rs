//! Struct payloads and the registry that maps struct type names to decoders.

use std::{any::Any, collections::HashMap};

use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::{
    archive::{ArchiveReader, ArchiveWriter},
    types, Color, Error, FGuid, GameplayTagContainer, IntPoint, IntVector, LinearColor,
    PropertyList, Quat, Result, Rotator, SoftObjectPath, Vector, Vector2D,
};

/// A struct payload decoded by host code. Register a factory with
/// [`StructRegistry::register_custom`]; the decoder gets a fresh value for every payload.
///
/// Implementors get [`CustomStructClone`] for free by deriving `Clone` and `PartialEq`.
pub trait CustomStruct: std::fmt::Debug + CustomStructClone {
    fn read(&mut self, ar: &mut dyn ArchiveReader) -> Result<()>;
    fn write(&self, ar: &mut dyn ArchiveWriter) -> Result<()>;
}

pub trait CustomStructClone {
    fn box_clone(&self) -> Box<dyn CustomStruct>;
    fn as_any(&self) -> &dyn Any;
    fn dyn_eq(&self, other: &dyn CustomStruct) -> bool;
}

impl<T> CustomStructClone for T
where
    T: CustomStruct + Clone + PartialEq + 'static,
{
    fn box_clone(&self) -> Box<dyn CustomStruct> {
        Box::new(self.clone())
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn dyn_eq(&self, other: &dyn CustomStruct) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| other == self)
    }
}

impl dyn CustomStruct {
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.as_any().downcast_ref()
    }
}

impl Clone for Box<dyn CustomStruct> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

impl PartialEq for Box<dyn CustomStruct> {
    fn eq(&self, other: &Self) -> bool {
        self.dyn_eq(other.as_ref())
    }
}

/// The payload of a `StructProperty`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StructData {
    Vector(Vector),
    Vector2D(Vector2D),
    Quat(Quat),
    Rotator(Rotator),
    Color(Color),
    LinearColor(LinearColor),
    Guid(FGuid),
    /// Ticks since 0001-01-01
    DateTime(u64),
    Timespan(i64),
    IntPoint(IntPoint),
    IntVector(IntVector),
    Box(types::Box),
    SoftObjectPath(SoftObjectPath),
    GameplayTagContainer(GameplayTagContainer),
    #[serde(skip)]
    Custom(Box<dyn CustomStruct>),
    /// Natively serialized struct with no registered decoder, kept verbatim.
    Raw(Vec<u8>),
    /// Any other struct: a nested, `None`-terminated property list.
    Properties(PropertyList),
}

impl StructData {
    /// The struct type name this payload is normally stored under, for the built-in kinds.
    pub fn type_name(&self) -> Option<&'static str> {
        Some(match self {
            StructData::Vector(_) => "Vector",
            StructData::Vector2D(_) => "Vector2D",
            StructData::Quat(_) => "Quat",
            StructData::Rotator(_) => "Rotator",
            StructData::Color(_) => "Color",
            StructData::LinearColor(_) => "LinearColor",
            StructData::Guid(_) => "Guid",
            StructData::DateTime(_) => "DateTime",
            StructData::Timespan(_) => "Timespan",
            StructData::IntPoint(_) => "IntPoint",
            StructData::IntVector(_) => "IntVector",
            StructData::Box(_) => "Box",
            StructData::SoftObjectPath(_) => "SoftObjectPath",
            StructData::GameplayTagContainer(_) => "GameplayTagContainer",
            StructData::Custom(_) | StructData::Raw(_) | StructData::Properties(_) => return None,
        })
    }

    /// Whether the payload is written by a dedicated codec rather than as a property list.
    pub fn is_native(&self) -> bool {
        !matches!(self, StructData::Properties(_))
    }

    #[instrument(name = "StructData_write", skip_all)]
    pub fn write<A: ArchiveWriter + ?Sized>(&self, ar: &mut A) -> Result<()> {
        match self {
            StructData::Vector(v) => v.write(ar)?,
            StructData::Vector2D(v) => v.write(ar)?,
            StructData::Quat(v) => v.write(ar)?,
            StructData::Rotator(v) => v.write(ar)?,
            StructData::Color(v) => v.write(ar)?,
            StructData::LinearColor(v) => v.write(ar)?,
            StructData::Guid(v) => v.write(ar)?,
            StructData::DateTime(v) => ar.write_u64::<LE>(*v)?,
            StructData::Timespan(v) => ar.write_i64::<LE>(*v)?,
            StructData::IntPoint(v) => v.write(ar)?,
            StructData::IntVector(v) => v.write(ar)?,
            StructData::Box(v) => v.write(ar)?,
            StructData::SoftObjectPath(v) => v.write(ar)?,
            StructData::GameplayTagContainer(v) => v.write(ar)?,
            StructData::Custom(v) => {
                let mut ar = ar;
                v.write(&mut ar)?
            }
            StructData::Raw(v) => ar.write_all(v)?,
            StructData::Properties(v) => v.write(ar)?,
        }
        Ok(())
    }
}

/// A decoder for one struct payload shape.
#[derive(Debug, Clone, Copy)]
pub enum StructKind {
    Vector,
    Vector2D,
    Quat,
    Rotator,
    Color,
    LinearColor,
    Guid,
    DateTime,
    Timespan,
    IntPoint,
    IntVector,
    Box,
    SoftObjectPath,
    GameplayTagContainer,
    Custom(fn() -> Box<dyn CustomStruct>),
}

impl StructKind {
    #[instrument(name = "StructKind_read", skip_all)]
    pub fn read<A: ArchiveReader + ?Sized>(self, ar: &mut A) -> Result<StructData> {
        Ok(match self {
            StructKind::Vector => StructData::Vector(Vector::read(ar)?),
            StructKind::Vector2D => StructData::Vector2D(Vector2D::read(ar)?),
            StructKind::Quat => StructData::Quat(Quat::read(ar)?),
            StructKind::Rotator => StructData::Rotator(Rotator::read(ar)?),
            StructKind::Color => StructData::Color(Color::read(ar)?),
            StructKind::LinearColor => StructData::LinearColor(LinearColor::read(ar)?),
            StructKind::Guid => StructData::Guid(FGuid::read(ar)?),
            StructKind::DateTime => StructData::DateTime(ar.read_u64::<LE>()?),
            StructKind::Timespan => StructData::Timespan(ar.read_i64::<LE>()?),
            StructKind::IntPoint => StructData::IntPoint(IntPoint::read(ar)?),
            StructKind::IntVector => StructData::IntVector(IntVector::read(ar)?),
            StructKind::Box => StructData::Box(types::Box::read(ar)?),
            StructKind::SoftObjectPath => StructData::SoftObjectPath(SoftObjectPath::read(ar)?),
            StructKind::GameplayTagContainer => {
                StructData::GameplayTagContainer(GameplayTagContainer::read(ar)?)
            }
            StructKind::Custom(factory) => {
                let mut value = factory();
                let mut ar = ar;
                value.read(&mut ar)?;
                StructData::Custom(value)
            }
        })
    }
}

/// Package path used when synthesizing the complete type name of a struct.
pub(crate) fn struct_package(struct_type: &str) -> &'static str {
    match struct_type {
        "GameplayTagContainer" | "GameplayTag" => "/Script/GameplayTags",
        _ => "/Script/CoreUObject",
    }
}

/// Maps struct type names (and, for payloads stored without one, property names) to decoders.
///
/// Populate it before reading; a name may only be claimed once.
#[derive(Debug, Clone, Default)]
pub struct StructRegistry {
    by_type: HashMap<String, StructKind>,
    by_property: HashMap<String, StructKind>,
}

impl StructRegistry {
    /// An empty registry: every struct decodes as a property list.
    pub fn new() -> Self {
        Self::default()
    }

    /// The engine's common math and core struct types.
    pub fn builtin() -> Self {
        let by_type = [
            ("Vector", StructKind::Vector),
            ("Vector2D", StructKind::Vector2D),
            ("Quat", StructKind::Quat),
            ("Rotator", StructKind::Rotator),
            ("Color", StructKind::Color),
            ("LinearColor", StructKind::LinearColor),
            ("Guid", StructKind::Guid),
            ("DateTime", StructKind::DateTime),
            ("Timespan", StructKind::Timespan),
            ("IntPoint", StructKind::IntPoint),
            ("IntVector", StructKind::IntVector),
            ("Box", StructKind::Box),
            ("SoftObjectPath", StructKind::SoftObjectPath),
            ("SoftClassPath", StructKind::SoftObjectPath),
            ("GameplayTagContainer", StructKind::GameplayTagContainer),
        ]
        .into_iter()
        .map(|(name, kind)| (name.to_owned(), kind))
        .collect();
        Self {
            by_type,
            by_property: HashMap::new(),
        }
    }

    /// Registers `kind` under every type name and property name given. Fails without changing the
    /// registry if any of the names is already taken.
    ///
    /// Untyped struct keys and values of old-layout maps are looked up as `<Map>.Key` and
    /// `<Map>.Value`.
    pub fn register(
        &mut self,
        type_names: &[&str],
        property_names: &[&str],
        kind: StructKind,
    ) -> Result<()> {
        let taken = type_names
            .iter()
            .find(|name| self.by_type.contains_key(**name))
            .map(|name| format!("struct type {name}"))
            .or_else(|| {
                property_names
                    .iter()
                    .find(|name| self.by_property.contains_key(**name))
                    .map(|name| format!("struct property {name}"))
            });
        if let Some(taken) = taken {
            return Err(Error::ExtensibilityConflict(taken));
        }
        for name in type_names {
            self.by_type.insert((*name).to_owned(), kind);
        }
        for name in property_names {
            self.by_property.insert((*name).to_owned(), kind);
        }
        Ok(())
    }

    pub fn register_custom(
        &mut self,
        type_names: &[&str],
        property_names: &[&str],
        factory: fn() -> Box<dyn CustomStruct>,
    ) -> Result<()> {
        self.register(type_names, property_names, StructKind::Custom(factory))
    }

    pub fn resolve_type(&self, struct_type: &str) -> Option<StructKind> {
        self.by_type.get(struct_type).copied()
    }

    pub fn resolve_property(&self, property_name: &str) -> Option<StructKind> {
        self.by_property.get(property_name).copied()
    }
}
