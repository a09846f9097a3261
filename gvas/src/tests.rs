use std::{
    io::{Cursor, Seek},
    rc::Rc,
};

use byteorder::{ReadBytesExt, WriteBytesExt, LE};

use crate::*;

/// UE4 file: old tags, `f32` math types, joined soft object paths.
fn ue4() -> PackageVersion {
    PackageVersion::new(522, 0)
}
/// UE5 file from before complete type names: old tags, `f64` math types.
fn lwc() -> PackageVersion {
    PackageVersion::new(522, 1009)
}
fn complete() -> PackageVersion {
    PackageVersion::new(522, 1012)
}

/// Little-endian byte builder for hand-written fixtures.
#[derive(Default)]
struct Bytes(Vec<u8>);

impl Bytes {
    fn u8(mut self, value: u8) -> Self {
        self.0.push(value);
        self
    }
    fn u16(mut self, value: u16) -> Self {
        self.0.extend(value.to_le_bytes());
        self
    }
    fn i32(mut self, value: i32) -> Self {
        self.0.extend(value.to_le_bytes());
        self
    }
    fn u32(mut self, value: u32) -> Self {
        self.0.extend(value.to_le_bytes());
        self
    }
    fn str(self, value: &str) -> Self {
        let mut this = self.i32(value.len() as i32 + 1);
        this.0.extend(value.as_bytes());
        this.u8(0)
    }
    fn raw(mut self, bytes: &[u8]) -> Self {
        self.0.extend(bytes);
        self
    }
    fn len(&self) -> i32 {
        self.0.len() as i32
    }
}

fn find_all(haystack: &[u8], needle: &[u8]) -> Vec<usize> {
    haystack
        .windows(needle.len())
        .enumerate()
        .filter(|(_, window)| *window == needle)
        .map(|(index, _)| index)
        .collect()
}

fn write_tag(version: PackageVersion, tag: &FPropertyTag) -> Result<Vec<u8>> {
    let mut ar = SaveGameArchive::new(Cursor::new(vec![]), version);
    tag.write(&mut ar)?;
    Ok(ar.into_inner().into_inner())
}

fn read_tag_with(
    version: PackageVersion,
    bytes: &[u8],
    structs: StructRegistry,
) -> Result<FPropertyTag> {
    let mut ar = SaveGameArchive::with_structs(Cursor::new(bytes), version, Rc::new(structs));
    let tag = FPropertyTag::read(&mut ar)?.expect("a property, not the None terminator");
    assert_eq!(bytes.len() as u64, ar.stream_position()?, "whole tag consumed");
    Ok(tag)
}

fn read_tag(version: PackageVersion, bytes: &[u8]) -> Result<FPropertyTag> {
    read_tag_with(version, bytes, StructRegistry::builtin())
}

/// Encodes, decodes and re-encodes one property, checking the value survives and the second
/// encoding matches the first.
fn round_trip(version: PackageVersion, name: &str, value: Property) -> Result<()> {
    let tag = FPropertyTag::new(name, value)?;
    let bytes = write_tag(version, &tag)?;
    let read = read_tag(version, &bytes)?;
    assert_eq!(tag, read, "{name} at {version:?}");
    assert_eq!(bytes, write_tag(version, &read)?, "{name} at {version:?}");
    Ok(())
}

fn vector(x: f64, y: f64, z: f64) -> Vector {
    Vector {
        x: Double(x),
        y: Double(y),
        z: Double(z),
    }
}

fn named_struct(struct_type: &str, value: StructData) -> Property {
    Property::Struct {
        struct_type: Some(struct_type.into()),
        guid: FGuid::nil(),
        value,
    }
}

fn player_stats(level: i32) -> Result<StructData> {
    let mut stats = PropertyList::new();
    stats.insert("Level", Property::Int(level))?;
    Ok(StructData::Properties(stats))
}

fn sample_values() -> Result<Vec<(&'static str, Property)>> {
    let mut player = PropertyList::new();
    player.insert("Health", Property::Float(Float(87.5)))?;
    player.insert(
        "Home",
        named_struct("Vector", StructData::Vector(vector(1.0, -2.0, 0.5))),
    )?;
    player.insert("Stats", named_struct("PlayerStats", player_stats(12)?))?;

    Ok(vec![
        ("Int", Property::Int(-7)),
        ("Int64", Property::Int64(1 << 40)),
        ("UInt32", Property::UInt32(u32::MAX)),
        ("UInt64", Property::UInt64(u64::MAX)),
        ("Float", Property::Float(Float(1.5))),
        ("Double", Property::Double(Double(-2.25))),
        ("Enabled", Property::Bool(true)),
        ("Disabled", Property::Bool(false)),
        ("Ascii", Property::Str(Some("Hero".into()))),
        ("Wide", Property::Str(Some("Héro ✓".into()))),
        ("Null", Property::Str(None)),
        ("Empty", Property::Str(Some("".into()))),
        ("Level", Property::Name(Some("Lobby".into()))),
        ("Owner", Property::Object(Some("/Game/Player.Player_C".into()))),
        (
            "Title",
            Property::Text(Text::base(
                Some("Menu".into()),
                Some("Title".into()),
                Some("Main Menu".into()),
            )),
        ),
        (
            "Asset",
            Property::SoftObject(SoftObjectPath {
                package_name: Some("/Game/Maps/Level".into()),
                asset_name: Some("Level".into()),
                sub_path: None,
            }),
        ),
        (
            "OnDeath",
            Property::MulticastDelegate(vec![Delegate {
                object: Some("/Game/Maps/Level.Level:PersistentLevel.Spawner".into()),
                function: Some("Respawn".into()),
            }]),
        ),
        ("OnHit", Property::MulticastInlineDelegate(vec![])),
        (
            "Raw",
            Property::Byte {
                enum_type: None,
                value: Byte::Byte(7),
            },
        ),
        (
            "Color",
            Property::Byte {
                enum_type: Some("EColor".into()),
                value: Byte::Label(Some("EColor::Red".into())),
            },
        ),
        (
            "Mode",
            Property::Enum {
                enum_type: Some("EMode".into()),
                value: Some("EMode::Hard".into()),
            },
        ),
        (
            "Location",
            named_struct("Vector", StructData::Vector(vector(1.0, 2.0, 3.0))),
        ),
        (
            "Id",
            named_struct("Guid", StructData::Guid(FGuid::new(1, 2, 3, 4))),
        ),
        (
            "SavedAt",
            named_struct("DateTime", StructData::DateTime(637_000_000_000_000_000)),
        ),
        (
            "Tint",
            named_struct(
                "Color",
                StructData::Color(Color {
                    r: 255,
                    g: 128,
                    b: 0,
                    a: 255,
                }),
            ),
        ),
        (
            "Tags",
            named_struct(
                "GameplayTagContainer",
                StructData::GameplayTagContainer(GameplayTagContainer {
                    tags: vec![Some("Status.Burning".into())],
                }),
            ),
        ),
        (
            "Player",
            named_struct("PlayerData", StructData::Properties(player)),
        ),
        (
            "Scores",
            Property::Array(PropertyArray::Simple(ValueVec::Int(vec![1, 2, 3]))),
        ),
        (
            "Flags",
            Property::Array(PropertyArray::Simple(ValueVec::Bool(vec![true, false]))),
        ),
        (
            "Bytes",
            Property::Array(PropertyArray::Simple(ValueVec::Byte(ByteArray::Byte(
                vec![1, 2, 3],
            )))),
        ),
        (
            "Names",
            Property::Array(PropertyArray::Simple(ValueVec::Name(vec![
                Some("A".into()),
                None,
            ]))),
        ),
        (
            "Nothing",
            Property::Array(PropertyArray::Simple(ValueVec::Str(vec![]))),
        ),
        (
            "Points",
            Property::Array(PropertyArray::Struct {
                struct_type: Some("Vector".into()),
                guid: FGuid::nil(),
                items: vec![
                    StructData::Vector(vector(0.0, 0.0, 0.0)),
                    StructData::Vector(vector(1.0, 1.0, 1.0)),
                ],
            }),
        ),
        (
            "History",
            Property::Array(PropertyArray::Struct {
                struct_type: Some("PlayerStats".into()),
                guid: FGuid::nil(),
                items: vec![player_stats(1)?, player_stats(2)?],
            }),
        ),
        (
            "Titles",
            Property::Array(PropertyArray::Complex {
                item_kind: PropertyKind::Text,
                items: vec![Property::Text(Text::base(
                    None,
                    Some("Key".into()),
                    Some("Source".into()),
                ))],
            }),
        ),
        (
            "Visited",
            Property::Set(PropertyArray::Simple(ValueVec::Name(vec![
                Some("Town".into()),
                Some("Cave".into()),
            ]))),
        ),
        (
            "Inventory",
            Property::Map {
                key_type: PropertyKind::Str,
                value_type: PropertyKind::Int,
                entries: vec![
                    MapEntry::new(Property::Str(Some("Potion".into())), Property::Int(3)),
                    MapEntry::new(Property::Str(Some("Arrow".into())), Property::Int(99)),
                ],
            },
        ),
        (
            "Unlocked",
            Property::Map {
                key_type: PropertyKind::Name,
                value_type: PropertyKind::Bool,
                entries: vec![MapEntry::new(
                    Property::Name(Some("Forest".into())),
                    Property::Bool(true),
                )],
            },
        ),
        (
            "Difficulty",
            Property::Map {
                key_type: PropertyKind::Str,
                value_type: PropertyKind::Enum,
                entries: vec![MapEntry::new(
                    Property::Str(Some("Forest".into())),
                    Property::Enum {
                        enum_type: Some("EMode".into()),
                        value: Some("EMode::Hard".into()),
                    },
                )],
            },
        ),
    ])
}

#[test]
fn properties_round_trip_in_every_layout() -> Result<()> {
    for version in [ue4(), lwc(), complete()] {
        for (name, value) in sample_values()? {
            round_trip(version, name, value)?;
        }
    }
    Ok(())
}

#[test]
fn written_size_matches_payload() -> Result<()> {
    let tag = FPropertyTag::new("Name", Property::Str(Some("Hero".into())))?;
    let bytes = write_tag(ue4(), &tag)?;
    // name (9) + type (16), then size, array index and the property guid flag
    let mut cursor = Cursor::new(&bytes[25..]);
    let size = cursor.read_i32::<LE>()?;
    assert_eq!(9, size);
    assert_eq!(bytes.len(), 34 + size as usize);

    let read = read_tag(ue4(), &bytes)?;
    assert_eq!(9, read.size);
    Ok(())
}

#[test]
fn declared_size_is_checked_on_read() -> Result<()> {
    let tag = FPropertyTag::new("Name", Property::Str(Some("Hero".into())))?;
    let mut bytes = write_tag(ue4(), &tag)?;
    bytes[25] += 1;
    let err = read_tag(ue4(), &bytes).unwrap_err();
    assert!(
        matches!(err, Error::SizeMismatch { declared: 10, actual: 9, .. }),
        "{err}"
    );
    assert_eq!(ErrorKind::MalformedInput, err.kind());
    Ok(())
}

#[test]
fn layouts_decode_to_the_same_value() -> Result<()> {
    let values = vec![
        (
            "Mode",
            Property::Enum {
                enum_type: Some("EMode".into()),
                value: Some("EMode::Hard".into()),
            },
        ),
        (
            "Scores",
            Property::Array(PropertyArray::Simple(ValueVec::Int(vec![1, 2, 3]))),
        ),
        (
            "Points",
            Property::Array(PropertyArray::Struct {
                struct_type: Some("Vector".into()),
                guid: FGuid::nil(),
                items: vec![StructData::Vector(vector(1.0, 2.0, 3.0))],
            }),
        ),
        (
            "Location",
            named_struct("Vector", StructData::Vector(vector(4.0, 5.0, 6.0))),
        ),
        (
            "Inventory",
            Property::Map {
                key_type: PropertyKind::Str,
                value_type: PropertyKind::Int,
                entries: vec![MapEntry::new(
                    Property::Str(Some("Potion".into())),
                    Property::Int(3),
                )],
            },
        ),
    ];
    for (name, value) in values {
        let tag = FPropertyTag::new(name, value.clone())?;
        let old = write_tag(lwc(), &tag)?;
        let new = write_tag(complete(), &tag)?;
        assert_ne!(old, new, "{name}");
        let old = read_tag(lwc(), &old)?;
        let new = read_tag(complete(), &new)?;
        assert_eq!(value, old.value, "{name}");
        assert_eq!(old.value, new.value, "{name}");
        assert_eq!(old.type_name.name, new.type_name.name);
        assert!(old.type_name.parameters.is_empty());
    }
    Ok(())
}

#[test]
fn complete_type_name_tag_layout() -> Result<()> {
    let tag = FPropertyTag::new("Score", Property::Int(42))?;
    let expected = Bytes::default()
        .str("Score")
        .str("IntProperty")
        .i32(0)
        .i32(4)
        .u8(0)
        .i32(42);
    assert_eq!(expected.0, write_tag(complete(), &tag)?);

    let tag = FPropertyTag::new("Slot", Property::Bool(true))?.with_array_index(2);
    let expected = Bytes::default()
        .str("Slot")
        .str("BoolProperty")
        .i32(0)
        .i32(0)
        .u8((EPropertyTagFlags::HasArrayIndex | EPropertyTagFlags::BoolTrue).bits())
        .i32(2);
    let bytes = write_tag(complete(), &tag)?;
    assert_eq!(expected.0, bytes);
    let read = read_tag(complete(), &bytes)?;
    assert_eq!(PropertyKey(2, "Slot".into()), read.key());
    assert_eq!(Property::Bool(true), read.value);
    Ok(())
}

#[test]
fn synthesized_type_names() -> Result<()> {
    let map = Property::Map {
        key_type: PropertyKind::Str,
        value_type: PropertyKind::Struct,
        entries: vec![MapEntry::new(
            Property::Str(Some("Home".into())),
            named_struct("Vector", StructData::Vector(vector(0.0, 0.0, 0.0))),
        )],
    };
    assert_eq!(
        "MapProperty(StrProperty, StructProperty(Vector(/Script/CoreUObject)))",
        map.type_name()?.to_string()
    );
    let tags = named_struct(
        "GameplayTagContainer",
        StructData::GameplayTagContainer(GameplayTagContainer::default()),
    );
    assert_eq!(
        "StructProperty(GameplayTagContainer(/Script/GameplayTags))",
        tags.type_name()?.to_string()
    );
    let mode = Property::Enum {
        enum_type: Some("EMode".into()),
        value: None,
    };
    assert_eq!(
        "EnumProperty(EMode(/Script/CoreUObject), ByteProperty)",
        mode.type_name()?.to_string()
    );

    let unnamed = Property::Struct {
        struct_type: None,
        guid: FGuid::nil(),
        value: StructData::Properties(PropertyList::new()),
    };
    assert!(FPropertyTag::new("Unnamed", unnamed).is_err());
    Ok(())
}

#[test]
fn every_kind_has_an_empty_value() -> Result<()> {
    for kind in PropertyKind::ALL {
        assert_eq!(kind, Property::empty(kind).kind());
        assert_eq!(kind, PropertyKind::from_type_name(kind.type_name())?);
    }
    Ok(())
}

#[test]
fn unknown_struct_is_kept_byte_for_byte() -> Result<()> {
    let inner = Bytes::default()
        .str("Level")
        .str("IntProperty")
        .i32(4)
        .i32(0)
        .u8(0)
        .i32(7)
        .str("None");
    let bytes = Bytes::default()
        .str("Stats")
        .str("StructProperty")
        .i32(inner.len())
        .i32(0)
        .str("PlayerStats")
        .raw(&[0; 16])
        .u8(0)
        .raw(&inner.0)
        .0;

    let tag = read_tag(ue4(), &bytes)?;
    match &tag.value {
        Property::Struct {
            struct_type,
            value: StructData::Properties(properties),
            ..
        } => {
            assert_eq!(Some(&FString::new("PlayerStats")), struct_type.as_ref());
            assert_eq!(Property::Int(7), properties["Level"]);
        }
        other => panic!("expected a property bag, got {other:?}"),
    }
    assert_eq!(bytes, write_tag(ue4(), &tag)?);
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq)]
struct ItemId {
    id: u32,
    quality: u8,
}

impl CustomStruct for ItemId {
    fn read(&mut self, ar: &mut dyn ArchiveReader) -> Result<()> {
        self.id = ar.read_u32::<LE>()?;
        self.quality = ar.read_u8()?;
        Ok(())
    }
    fn write(&self, ar: &mut dyn ArchiveWriter) -> Result<()> {
        ar.write_u32::<LE>(self.id)?;
        ar.write_u8(self.quality)?;
        Ok(())
    }
}

fn item_id() -> Box<dyn CustomStruct> {
    Box::<ItemId>::default()
}

#[test]
fn custom_struct_decoder() -> Result<()> {
    let item = ItemId {
        id: 1337,
        quality: 3,
    };
    let tag = FPropertyTag::new(
        "Item",
        named_struct("ItemId", StructData::Custom(Box::new(item.clone()))),
    )?;
    assert!(tag
        .flags
        .contains(EPropertyTagFlags::HasBinaryOrNativeSerialize));
    let bytes = write_tag(complete(), &tag)?;

    let mut structs = StructRegistry::builtin();
    structs.register_custom(&["ItemId"], &[], item_id)?;
    let read = read_tag_with(complete(), &bytes, structs)?;
    match &read.value {
        Property::Struct {
            value: StructData::Custom(value),
            ..
        } => assert_eq!(Some(&item), value.downcast_ref::<ItemId>()),
        other => panic!("expected a custom struct, got {other:?}"),
    }
    assert_eq!(tag, read);

    // without a decoder the natively serialized payload is kept as is
    let raw = read_tag(complete(), &bytes)?;
    match &raw.value {
        Property::Struct {
            value: StructData::Raw(data),
            ..
        } => assert_eq!(&[0x39, 0x05, 0, 0, 3], data.as_slice()),
        other => panic!("expected raw struct data, got {other:?}"),
    }
    assert_eq!(bytes, write_tag(complete(), &raw)?);
    Ok(())
}

#[test]
fn struct_array_shares_one_prototype() -> Result<()> {
    let items = vec![
        StructData::Vector(vector(1.0, 2.0, 3.0)),
        StructData::Vector(vector(4.0, 5.0, 6.0)),
        StructData::Vector(vector(7.0, 8.0, 9.0)),
    ];
    let tag = FPropertyTag::new(
        "Points",
        Property::Array(PropertyArray::Struct {
            struct_type: Some("Vector".into()),
            guid: FGuid::nil(),
            items: items.clone(),
        }),
    )?;
    let bytes = write_tag(lwc(), &tag)?;

    assert_eq!(1, find_all(&bytes, b"Vector\0").len());
    let struct_property = find_all(&bytes, b"StructProperty\0");
    assert_eq!(2, struct_property.len(), "item type and prototype");
    let prototype_size = &bytes[struct_property[1] + 15..];
    assert_eq!(3 * 24, Cursor::new(prototype_size).read_i32::<LE>()?);
    assert!(bytes.ends_with(&9.0f64.to_le_bytes()));

    match read_tag(lwc(), &bytes)?.value {
        Property::Array(PropertyArray::Struct {
            struct_type,
            guid,
            items: read,
        }) => {
            assert_eq!(Some(FString::new("Vector")), struct_type);
            assert!(guid.is_nil());
            assert_eq!(items, read);
        }
        other => panic!("expected struct items, got {other:?}"),
    }
    Ok(())
}

#[test]
fn untyped_map_keys_are_recognized() -> Result<()> {
    let guid_key = Property::Struct {
        struct_type: None,
        guid: FGuid::nil(),
        value: StructData::Guid(FGuid::new(0xdead_beef, 1, 2, 3)),
    };
    let bag_key = Property::Struct {
        struct_type: None,
        guid: FGuid::nil(),
        value: player_stats(9)?,
    };
    for key in [guid_key, bag_key] {
        let value = Property::Map {
            key_type: PropertyKind::Struct,
            value_type: PropertyKind::Int,
            entries: vec![MapEntry::new(key, Property::Int(5))],
        };
        let tag = FPropertyTag {
            name: "Owners".into(),
            type_name: FPropertyTypeName::new("MapProperty"),
            size: 0,
            array_index: 0,
            flags: EPropertyTagFlags::empty(),
            property_guid: None,
            value,
        };
        let bytes = write_tag(ue4(), &tag)?;
        assert_eq!(tag, read_tag(ue4(), &bytes)?);
    }
    Ok(())
}

#[test]
fn property_guid_is_preserved() -> Result<()> {
    let tag = FPropertyTag {
        property_guid: Some(FGuid::new(9, 8, 7, 6)),
        ..FPropertyTag::new("Score", Property::Int(1))?
    };
    let bytes = write_tag(ue4(), &tag)?;
    let read = read_tag(ue4(), &bytes)?;
    assert_eq!(Some(FGuid::new(9, 8, 7, 6)), read.property_guid);
    assert_eq!(bytes, write_tag(ue4(), &read)?);
    Ok(())
}

#[test]
fn text_argument_width_follows_large_world_coordinates() -> Result<()> {
    let text = Text {
        flags: TextFlags::empty(),
        history: TextHistory::ArgumentFormat {
            format_text: Box::new(Text::base(
                Some("Hud".into()),
                Some("Kills".into()),
                Some("{Count} kills".into()),
            )),
            arguments: vec![FormatArgument {
                name: Some("Count".into()),
                value: FormatArgumentValue::Int(3),
            }],
        },
    };
    let narrow_version = PackageVersion::new(522, 1003);
    let tag = FPropertyTag::new("Kills", Property::Text(text.clone()))?;
    let narrow = write_tag(narrow_version, &tag)?;
    let wide = write_tag(lwc(), &tag)?;
    assert_eq!(narrow.len() + 4, wide.len());
    assert_eq!(tag, read_tag(narrow_version, &narrow)?);
    assert_eq!(tag, read_tag(lwc(), &wide)?);

    let mut too_big = text;
    if let TextHistory::ArgumentFormat { arguments, .. } = &mut too_big.history {
        arguments[0].value = FormatArgumentValue::Int(1 << 40);
    }
    let tag = FPropertyTag::new("Kills", Property::Text(too_big))?;
    assert!(write_tag(narrow_version, &tag).is_err());
    assert!(write_tag(lwc(), &tag).is_ok());
    Ok(())
}

#[test]
fn text_histories_round_trip() -> Result<()> {
    let histories = vec![
        TextHistory::None {
            has_culture_invariant: true,
            culture_invariant: Some("Invariant".into()),
        },
        TextHistory::None {
            has_culture_invariant: false,
            culture_invariant: None,
        },
        TextHistory::AsNumber {
            source_value: FormatArgumentValue::Double(Double(0.25)),
            format_options: Some(NumberFormattingOptions {
                always_sign: false,
                use_grouping: true,
                rounding_mode: 0,
                minimum_integral_digits: 1,
                maximum_integral_digits: 324,
                minimum_fractional_digits: 0,
                maximum_fractional_digits: 3,
            }),
            target_culture: None,
        },
        TextHistory::AsDate {
            source_date_time: 630_822_816_000_000_000,
            date_style: 2,
            time_zone: Some("UTC".into()),
            target_culture: None,
        },
        TextHistory::AsDateTime {
            ticks: 630_822_816_000_000_000,
            date_style: 1,
            time_style: 1,
            time_zone: None,
            target_culture: Some("en".into()),
        },
        TextHistory::StringTableEntry {
            table_id: Some("/Game/Strings.Strings".into()),
            key: Some("Greeting".into()),
        },
    ];
    for history in histories {
        let text = Text {
            flags: TextFlags::CultureInvariant,
            history,
        };
        for version in [ue4(), complete()] {
            round_trip(version, "Label", Property::Text(text.clone()))?;
        }
    }
    Ok(())
}

#[test]
fn unsupported_variants_are_rejected() -> Result<()> {
    // set with removed items
    let bytes = Bytes::default()
        .str("Ids")
        .str("SetProperty")
        .i32(8)
        .i32(0)
        .str("IntProperty")
        .u8(0)
        .i32(1)
        .i32(0)
        .0;
    let err = read_tag(ue4(), &bytes).unwrap_err();
    assert!(matches!(err, Error::NotSupported(_)), "{err}");
    assert_eq!(ErrorKind::UnsupportedFormat, err.kind());

    // map with removed entries
    let bytes = Bytes::default()
        .str("Scores")
        .str("MapProperty")
        .i32(8)
        .i32(0)
        .str("StrProperty")
        .str("IntProperty")
        .u8(0)
        .i32(2)
        .i32(0)
        .0;
    let err = read_tag(ue4(), &bytes).unwrap_err();
    assert!(matches!(err, Error::NotSupported(_)), "{err}");

    // property guid in a complete type name tag
    let bytes = Bytes::default()
        .str("Score")
        .str("IntProperty")
        .i32(0)
        .i32(4)
        .u8(EPropertyTagFlags::HasPropertyGuid.bits())
        .raw(&[0; 16])
        .i32(42)
        .0;
    let err = read_tag(complete(), &bytes).unwrap_err();
    assert!(matches!(err, Error::NotSupported(_)), "{err}");

    // unknown text history
    let bytes = Bytes::default().u32(0).u8(2).0;
    let mut ar = SaveGameArchive::new(Cursor::new(&bytes[..]), ue4());
    let err = Text::read(&mut ar).unwrap_err();
    assert!(matches!(err, Error::NotSupported(_)), "{err}");

    // unknown property type
    let bytes = Bytes::default()
        .str("Score")
        .str("FancyProperty")
        .i32(0)
        .i32(0)
        .0;
    let err = read_tag(ue4(), &bytes).unwrap_err();
    assert!(matches!(err, Error::UnknownPropertyType(_)), "{err}");
    assert_eq!(ErrorKind::UnknownType, err.kind());
    Ok(())
}

#[test]
fn registrations_do_not_overlap() -> Result<()> {
    let mut structs = StructRegistry::builtin();
    let err = structs
        .register(&["Inventory", "Vector"], &[], StructKind::Guid)
        .unwrap_err();
    assert_eq!(ErrorKind::ExtensibilityConflict, err.kind());
    assert!(structs.resolve_type("Inventory").is_none());

    structs.register(&[], &["OwnerId"], StructKind::Guid)?;
    assert!(matches!(
        structs.resolve_property("OwnerId"),
        Some(StructKind::Guid)
    ));
    assert!(structs.register(&[], &["OwnerId"], StructKind::Guid).is_err());

    let mut save_classes = SaveClassRegistry::new();
    save_classes.register(&["/Script/Game.GameSave"], length_prefixed)?;
    let err = save_classes
        .register(&["/Script/Game.GameSave"], length_prefixed)
        .unwrap_err();
    assert!(matches!(err, Error::ExtensibilityConflict(_)));
    Ok(())
}

fn header(save_game_version: i32, package_version: PackageVersion) -> SaveGameHeader {
    SaveGameHeader {
        save_game_version,
        package_version,
        engine_version: EngineVersion {
            major: 4,
            minor: 27,
            patch: 2,
            build: 0,
            build_id: Some("++UE4+Release-4.27".into()),
        },
        custom_formats: CustomFormats {
            version: 3,
            entries: vec![],
        },
    }
}

fn example_save() -> Result<SaveGame> {
    let mut save = SaveGame::new(header(2, ue4()), "/Script/Game.GameSave");
    save.properties.insert("Score", Property::Int(42))?;
    save.properties
        .insert("Name", Property::Str(Some("Hero".into())))?;
    save.properties.insert(
        "Items",
        Property::Array(PropertyArray::Simple(ValueVec::Int(vec![1, 2, 3]))),
    )?;
    Ok(save)
}

fn example_bytes() -> Vec<u8> {
    Bytes::default()
        .raw(b"GVAS")
        .i32(2)
        .u32(522)
        .u16(4)
        .u16(27)
        .u16(2)
        .u32(0)
        .str("++UE4+Release-4.27")
        .i32(3)
        .u32(0)
        .str("/Script/Game.GameSave")
        .str("Score")
        .str("IntProperty")
        .i32(4)
        .i32(0)
        .u8(0)
        .i32(42)
        .str("Name")
        .str("StrProperty")
        .i32(9)
        .i32(0)
        .u8(0)
        .str("Hero")
        .str("Items")
        .str("ArrayProperty")
        .i32(16)
        .i32(0)
        .str("IntProperty")
        .u8(0)
        .i32(3)
        .i32(1)
        .i32(2)
        .i32(3)
        .str("None")
        .i32(0)
        .0
}

#[test]
fn end_to_end_bytes() -> Result<()> {
    let mut bytes = vec![];
    example_save()?.write(&mut bytes)?;
    assert_eq!(example_bytes(), bytes);

    let save = SaveGame::read(&bytes[..]).map_err(|e| e.error)?;
    assert_eq!(header(2, ue4()), save.header);
    assert_eq!("/Script/Game.GameSave", save.save_class.as_str());
    let names: Vec<&str> = save.properties.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(["Score", "Name", "Items"], names.as_slice());
    assert_eq!(Property::Int(42), save.properties["Score"]);
    assert_eq!(Property::Str(Some("Hero".into())), save.properties["Name"]);
    assert_eq!(
        Property::Array(PropertyArray::Simple(ValueVec::Int(vec![1, 2, 3]))),
        save.properties["Items"]
    );
    assert_eq!(example_save()?.properties, save.properties);
    Ok(())
}

#[test]
fn ue5_save_round_trips() -> Result<()> {
    let mut save = SaveGame::new(header(3, complete()), "/Script/Game.GameSave");
    for (name, value) in sample_values()? {
        save.properties.insert(name, value)?;
    }
    let mut bytes = vec![];
    save.write(&mut bytes)?;
    let read = SaveGame::read(&bytes[..]).map_err(|e| e.error)?;
    assert_eq!(save.header, read.header);
    assert_eq!(save.properties, read.properties);

    let mut again = vec![];
    read.write(&mut again)?;
    assert_eq!(bytes, again);
    Ok(())
}

#[test]
fn envelope_errors() {
    let err = SaveGame::read(&b"GVAX\x02\0\0\0"[..]).unwrap_err();
    assert!(matches!(err.error, Error::BadMagic(magic) if &magic == b"GVAX"));
    assert_eq!(4, err.offset);
    assert_eq!(ErrorKind::MalformedInput, err.kind());

    let err = SaveGame::read(&b"GVAS\x01\0\0\0"[..]).unwrap_err();
    assert!(matches!(err.error, Error::UnsupportedSaveGameVersion(1)));
    assert_eq!(ErrorKind::UnsupportedFormat, err.kind());

    let mut bytes = example_bytes();
    bytes.push(0xaa);
    let err = SaveGame::read(&bytes[..]).unwrap_err();
    assert!(matches!(err.error, Error::TrailingData(1)), "{err}");

    let bytes = example_bytes();
    let err = SaveGame::read(&bytes[..bytes.len() - 2]).unwrap_err();
    assert!(matches!(err.error, Error::Io(_)), "{err}");

    let err = SaveReader::new()
        .max_string_length(8)
        .read(&example_bytes()[..])
        .unwrap_err();
    assert!(matches!(err.error, Error::MalformedString(_)), "{err}");
}

/// Prefixes the data with its length.
#[derive(Debug, Default)]
struct LengthPrefixed {
    data_length: u64,
    short: bool,
}

impl SaveClass for LengthPrefixed {
    fn has_custom_header(&self) -> bool {
        true
    }
    fn header_size(&self) -> u64 {
        8
    }
    fn read_header(&mut self, ar: &mut dyn ArchiveReader) -> Result<()> {
        self.data_length = ar.read_u64::<LE>()?;
        Ok(())
    }
    fn write_header(&self, ar: &mut dyn ArchiveWriter, data_length: u64) -> Result<()> {
        if self.short {
            ar.write_u32::<LE>(data_length as u32)?;
        } else {
            ar.write_u64::<LE>(data_length)?;
        }
        Ok(())
    }
}

fn length_prefixed() -> Box<dyn SaveClass> {
    Box::<LengthPrefixed>::default()
}

#[test]
fn custom_save_class_header() -> Result<()> {
    let mut plain = vec![];
    example_save()?.write(&mut plain)?;

    let mut save = example_save()?;
    save.custom = Some(length_prefixed());
    let mut bytes = vec![];
    save.write(&mut bytes)?;
    assert_eq!(plain.len() + 8, bytes.len());

    let class_name = b"/Script/Game.GameSave\0";
    let header_start = find_all(&plain, class_name)[0] + class_name.len();
    let mut header = Cursor::new(&bytes[header_start..]);
    assert_eq!((plain.len() - header_start) as u64, header.read_u64::<LE>()?);

    let mut save_classes = SaveClassRegistry::new();
    save_classes.register(&["/Script/Game.GameSave"], length_prefixed)?;
    let read = SaveReader::new()
        .save_classes(save_classes)
        .read(&bytes[..])
        .map_err(|e| e.error)?;
    assert!(read.custom.is_some());
    assert_eq!(example_save()?.properties, read.properties);

    let mut again = vec![];
    read.write(&mut again)?;
    assert_eq!(bytes, again);

    save.custom = Some(Box::new(LengthPrefixed {
        data_length: 0,
        short: true,
    }));
    let err = save.write(&mut vec![]).unwrap_err();
    assert!(
        matches!(
            err,
            Error::CustomHeaderSizeMismatch {
                declared: 8,
                written: 4,
                ..
            }
        ),
        "{err}"
    );
    Ok(())
}

#[test]
fn property_list_lookup() -> Result<()> {
    let mut properties = PropertyList::new();
    properties.insert("Slot", Property::Int(1))?;
    properties.push(FPropertyTag::new("Slot", Property::Int(2))?.with_array_index(1));
    properties.insert("Name", Property::Str(None))?;
    assert_eq!(3, properties.len());
    assert_eq!(Property::Int(2), properties[("Slot", 1)]);

    properties["Slot"] = Property::Int(10);
    assert_eq!(
        Some(&Property::Int(10)),
        properties.get("Slot").map(|tag| &tag.value)
    );

    assert!(properties.remove(("Slot", 1)).is_some());
    let names: Vec<_> = properties.iter().map(|tag| tag.key()).collect();
    assert_eq!(
        vec![PropertyKey(0, "Slot".into()), PropertyKey(0, "Name".into())],
        names
    );
    Ok(())
}

#[test]
fn serde_mirror_round_trip() -> Result<()> {
    let mut save = SaveGame::new(header(3, complete()), "/Script/Game.GameSave");
    for (name, value) in sample_values()? {
        save.properties.insert(name, value)?;
    }
    let json = serde_json::to_string(&save).expect("serialize");
    assert!(json.contains("\"Int_0\""));
    let read: SaveGame = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(save.header, read.header);
    assert_eq!(save.save_class, read.save_class);
    assert_eq!(save.properties, read.properties);

    let mut from_json = vec![];
    read.write(&mut from_json)?;
    let mut original = vec![];
    save.write(&mut original)?;
    assert_eq!(original, from_json);
    Ok(())
}

/// A tag with only the outer type name, as read from an old-layout file.
fn outer_tag(name: &str, type_name: &str, value: Property) -> FPropertyTag {
    FPropertyTag {
        name: name.into(),
        type_name: FPropertyTypeName::new(type_name),
        size: 0,
        array_index: 0,
        flags: EPropertyTagFlags::empty(),
        property_guid: None,
        value,
    }
}

fn untyped_struct(value: StructData) -> Property {
    Property::Struct {
        struct_type: None,
        guid: FGuid::nil(),
        value,
    }
}

#[test]
fn map_keys_and_values_resolve_separately() -> Result<()> {
    let owners = Property::Map {
        key_type: PropertyKind::Struct,
        value_type: PropertyKind::Struct,
        entries: vec![
            MapEntry::new(
                untyped_struct(StructData::Guid(FGuid::new(0xdead_beef, 1, 2, 3))),
                untyped_struct(StructData::Vector(vector(1.0, 2.0, 3.0))),
            ),
            MapEntry::new(
                untyped_struct(StructData::Guid(FGuid::new(5, 6, 7, 8))),
                untyped_struct(StructData::Vector(vector(-1.0, 0.5, 0.0))),
            ),
        ],
    };
    let tag = outer_tag("Owners", "MapProperty", owners);
    let bytes = write_tag(ue4(), &tag)?;

    // values resolved by registration, keys by the guid fallback
    let mut structs = StructRegistry::builtin();
    structs.register(&[], &["Owners.Value"], StructKind::Vector)?;
    assert_eq!(tag, read_tag_with(ue4(), &bytes, structs)?);

    let mut structs = StructRegistry::builtin();
    structs.register(&[], &["Owners.Key"], StructKind::Guid)?;
    structs.register(&[], &["Owners.Value"], StructKind::Vector)?;
    assert_eq!(tag, read_tag_with(ue4(), &bytes, structs)?);

    // the bare map name does not apply to its entries
    let mut structs = StructRegistry::builtin();
    structs.register(&[], &["Owners"], StructKind::Vector)?;
    assert!(read_tag_with(ue4(), &bytes, structs).is_err());
    Ok(())
}

fn byte_map(key: Byte, enum_type: Option<&str>) -> Property {
    Property::Map {
        key_type: PropertyKind::Byte,
        value_type: PropertyKind::Int,
        entries: vec![MapEntry::new(
            Property::Byte {
                enum_type: enum_type.map(FString::new),
                value: key,
            },
            Property::Int(1),
        )],
    }
}

#[test]
fn map_byte_keys_use_one_encoding_per_layout() -> Result<()> {
    let raw = FPropertyTag::new("Slots", byte_map(Byte::Byte(3), None))?;
    round_trip(complete(), "Slots", raw.value.clone())?;
    let err = write_tag(ue4(), &raw).unwrap_err();
    assert!(matches!(err, Error::Other(_)), "{err}");

    let label = byte_map(Byte::Label(Some("EColor::Red".into())), Some("EColor"));
    round_trip(ue4(), "Slots", label.clone())?;
    round_trip(complete(), "Slots", label)?;

    let unnamed = FPropertyTag::new("Slots", byte_map(Byte::Label(Some("Red".into())), None))?;
    let err = write_tag(complete(), &unnamed).unwrap_err();
    assert!(matches!(err, Error::Other(_)), "{err}");
    Ok(())
}

#[test]
fn deep_nesting_is_an_error() -> Result<()> {
    let mut type_name = Bytes::default().str("Deep");
    for _ in 0..200 {
        type_name = type_name.str("A").i32(1);
    }
    let type_name = type_name.str("A").i32(0).i32(0).u8(0);
    let err = read_tag(complete(), &type_name.0).unwrap_err();
    assert!(matches!(err, Error::Other(_)), "{err}");
    assert_eq!(ErrorKind::MalformedInput, err.kind());

    let mut structs = Bytes::default();
    for _ in 0..200 {
        structs = structs
            .str("Inner")
            .str("StructProperty")
            .i32(1)
            .i32(0)
            .str("Nested")
            .raw(&[0; 16])
            .u8(0);
    }
    let err = read_tag(ue4(), &structs.0).unwrap_err();
    assert!(matches!(err, Error::Other(_)), "{err}");

    let mut text = Bytes::default();
    for _ in 0..200 {
        text = text.u32(0).u8(3);
    }
    let mut ar = SaveGameArchive::new(Cursor::new(&text.0[..]), ue4());
    let err = Text::read(&mut ar).unwrap_err();
    assert!(matches!(err, Error::Other(_)), "{err}");

    // moderate nesting is fine
    let mut nested = player_stats(1)?;
    for depth in 0..20 {
        let mut outer = PropertyList::new();
        outer.insert("Inner", named_struct(&format!("Level{depth}"), nested))?;
        nested = StructData::Properties(outer);
    }
    round_trip(ue4(), "Outer", named_struct("Top", nested))?;
    Ok(())
}

#[test]
fn sizes_beyond_the_stream_are_rejected() {
    let raw = Bytes::default()
        .str("Item")
        .str("StructProperty")
        .i32(1)
        .str("ItemId")
        .i32(1)
        .str("/Script/Game")
        .i32(0)
        .i32(i32::MAX)
        .u8(EPropertyTagFlags::HasBinaryOrNativeSerialize.bits());
    let err = read_tag(complete(), &raw.0).unwrap_err();
    assert!(matches!(err, Error::Io(_)), "{err}");

    let bytes = Bytes::default()
        .str("Bytes")
        .str("ArrayProperty")
        .i32(i32::MAX)
        .i32(0)
        .str("ByteProperty")
        .u8(0)
        .i32(i32::MAX - 4);
    let err = read_tag(ue4(), &bytes.0).unwrap_err();
    assert!(matches!(err, Error::Io(_)), "{err}");
}

#[test]
fn item_counts_must_fit_on_disk() {
    assert_eq!(3, crate::archive::item_count("Items", 3).unwrap());
    let err = crate::archive::item_count("Items", i32::MAX as usize + 1).unwrap_err();
    assert!(matches!(err, Error::Other(_)), "{err}");
}

#[test]
fn fguid_property_is_a_guid() -> Result<()> {
    let id = named_struct("UniqueId", StructData::Guid(FGuid::new(1, 2, 3, 4)));
    for version in [ue4(), complete()] {
        round_trip(version, "FGuid", id.clone())?;
    }
    // under any other name the unknown struct would be parsed as a property list
    let bytes = write_tag(ue4(), &FPropertyTag::new("OwnerGuid", id)?)?;
    assert!(read_tag(ue4(), &bytes).is_err());
    Ok(())
}

#[test]
fn struct_sets_share_the_prototype() -> Result<()> {
    let visited = Property::Set(PropertyArray::Struct {
        struct_type: Some("Vector".into()),
        guid: FGuid::nil(),
        items: vec![
            StructData::Vector(vector(1.0, 2.0, 3.0)),
            StructData::Vector(vector(4.0, 5.0, 6.0)),
        ],
    });
    let bytes = write_tag(ue4(), &FPropertyTag::new("Visited", visited.clone())?)?;
    assert_eq!(1, find_all(&bytes, b"Vector\0").len());
    assert_eq!(2, find_all(&bytes, b"StructProperty\0").len());
    round_trip(ue4(), "Visited", visited.clone())?;
    round_trip(complete(), "Visited", visited)?;
    Ok(())
}

#[test]
fn struct_arrays_before_inner_tags_have_no_prototype() -> Result<()> {
    let version = PackageVersion::new(400, 0);
    let history = outer_tag(
        "History",
        "ArrayProperty",
        Property::Array(PropertyArray::Struct {
            struct_type: None,
            guid: FGuid::nil(),
            items: vec![player_stats(1)?, player_stats(2)?],
        }),
    );
    let bytes = write_tag(version, &history)?;
    assert_eq!(1, find_all(&bytes, b"StructProperty\0").len());
    let read = read_tag(version, &bytes)?;
    assert_eq!(history, read);
    assert_eq!(bytes, write_tag(version, &read)?);
    Ok(())
}

#[test]
fn reserved_byte_after_save_class_must_be_zero() -> Result<()> {
    let mut save = SaveGame::new(header(3, complete()), "/Script/Game.GameSave");
    save.properties.insert("Score", Property::Int(42))?;
    let mut bytes = vec![];
    save.write(&mut bytes)?;

    let class_name = b"/Script/Game.GameSave\0";
    let reserved = find_all(&bytes, class_name)[0] + class_name.len();
    assert_eq!(0, bytes[reserved]);
    bytes[reserved] = 1;
    let err = SaveGame::read(&bytes[..]).unwrap_err();
    assert!(matches!(err.error, Error::Other(_)), "{err}");
    assert_eq!(reserved + 1, err.offset);
    Ok(())
}

#[test]
fn additional_struct_kinds_round_trip() -> Result<()> {
    let values = vec![
        (
            "Cooldown",
            named_struct("Timespan", StructData::Timespan(-36_000_000_000)),
        ),
        (
            "HudClass",
            named_struct(
                "SoftClassPath",
                StructData::SoftObjectPath(SoftObjectPath {
                    package_name: Some("/Game/UI/Hud".into()),
                    asset_name: Some("Hud_C".into()),
                    sub_path: None,
                }),
            ),
        ),
        (
            "Cell",
            named_struct(
                "IntVector",
                StructData::IntVector(IntVector { x: -1, y: 2, z: 3 }),
            ),
        ),
        (
            "Bounds",
            named_struct(
                "Box",
                StructData::Box(types::Box {
                    min: vector(-1.0, -2.0, -3.0),
                    max: vector(1.0, 2.0, 3.0),
                    is_valid: true,
                }),
            ),
        ),
    ];
    for version in [PackageVersion::new(400, 0), ue4(), lwc(), complete()] {
        for (name, value) in &values {
            round_trip(version, name, value.clone())?;
        }
    }
    Ok(())
}
