#![allow(missing_docs)]

mod common;

use std::sync::Arc;

use common::{DocBuilder, i32s, ints, pointer, read_f32, read_i32, read_pointer};
use strand::document::ChunkHandler;
use strand::format::{ChunkCode, Endian, PointerWidth};
use strand::link::StructLink;
use strand::schema::{MemberFlags, SchemaBuilder, SchemaTable};
use strand::{
    ChunkRecord, ChunkState, CollectReport, CurrentSchema, Document, DocumentConfig,
    DuplicatePolicy, ParseMode, ParseState, ReportLevel, StrandError,
};

fn native() -> Endian {
    Endian::native()
}

fn parse(current: &CurrentSchema, bytes: &[u8]) -> strand::Result<Document> {
    let mut doc = Document::new(current)?;
    doc.parse_bytes(bytes, ParseMode::Uncompressed, false)?;
    Ok(doc)
}

fn relocated(chunk: &ChunkRecord) -> &[u8] {
    chunk.relocated().expect("chunk should be relocated")
}

// --- SCHEMA EVOLUTION ---

/// A field added since the document was written comes back zeroed.
#[test]
fn test_added_field_is_zeroed() -> strand::Result<()> {
    let pw = PointerWidth::native();
    let current = CurrentSchema::new(common::point_v2(pw).build()?);
    let payload = [i32s(&[1, 2], native()), i32s(&[-3, 4], native())].concat();
    let bytes = DocBuilder::native()
        .data(0x1000, 0, 2, &payload)?
        .schema(&common::point_v1(pw).build()?)?
        .end()?;

    let doc = parse(&current, &bytes)?;
    assert_eq!(doc.state(), ParseState::Done);
    assert_eq!(doc.chunks().len(), 1);

    let chunk = &doc.chunks()[0];
    assert_eq!(chunk.state(), ChunkState::Relocated);
    assert_eq!(chunk.memory_type(), Some(0));
    assert!(chunk.raw().is_none());
    let data = relocated(chunk);
    assert_eq!(data.len(), 24);
    let values: Vec<i32> = (0..6).map(|i| read_i32(data, i * 4)).collect();
    assert_eq!(values, vec![1, 2, 0, -3, 4, 0]);

    let Some(StructLink::Linked { members, .. }) = doc.link().and_then(|l| l.structure(0)) else {
        panic!("Point should link");
    };
    assert!(members[2].flags.contains(MemberFlags::MISSING));

    let header = chunk.current_header();
    assert_eq!(header.len, 24);
    assert_eq!(chunk.header().len, 16);
    Ok(())
}

/// A removed field is dropped and the remaining ones shift.
#[test]
fn test_removed_field_is_dropped() -> strand::Result<()> {
    let pw = PointerWidth::native();
    let current = CurrentSchema::new(common::point_v1(pw).build()?);
    let bytes = DocBuilder::native()
        .data(0x1000, 0, 1, &i32s(&[7, 8, 9], native()))?
        .schema(&common::point_v2(pw).build()?)?
        .end()?;

    let doc = parse(&current, &bytes)?;
    let data = relocated(&doc.chunks()[0]);
    assert_eq!(data.len(), 8);
    assert_eq!((read_i32(data, 0), read_i32(data, 4)), (7, 8));

    let z = doc
        .file_schema()
        .and_then(|s| s.find_member("Point", "z"))
        .expect("file z");
    assert!(z.flags.contains(MemberFlags::MISSING));
    Ok(())
}

#[test]
fn test_integer_array_cast_to_float() -> strand::Result<()> {
    let pw = PointerWidth::native();
    let file = SchemaBuilder::new(pw)
        .with_primitives()
        .structure("Point", &[("short", "pos[2]")]);
    let memory = SchemaBuilder::new(pw)
        .with_primitives()
        .structure("Point", &[("float", "pos[2]")]);
    let current = CurrentSchema::new(memory.build()?);
    let bytes = DocBuilder::native()
        .data(0x40, 0, 1, &ints(&[3i16, -7i16], 2, native()))?
        .schema(&file.build()?)?
        .end()?;

    let doc = parse(&current, &bytes)?;
    let data = relocated(&doc.chunks()[0]);
    assert_eq!((read_f32(data, 0), read_f32(data, 4)), (3.0, -7.0));
    assert_eq!(doc.link().map(|l| l.stats().cast), Some(1));
    Ok(())
}

/// Integers are sign- or zero-extended when widened and truncated when narrowed.
#[test]
fn test_integer_width_changes() -> strand::Result<()> {
    let pw = PointerWidth::native();
    let file = SchemaBuilder::new(pw).with_primitives().structure(
        "Rec",
        &[("int", "a"), ("int", "b"), ("short", "c"), ("uchar", "d")],
    );
    let memory = SchemaBuilder::new(pw).with_primitives().structure(
        "Rec",
        &[("short", "a"), ("uchar", "b"), ("int64_t", "c"), ("int", "d")],
    );
    let current = CurrentSchema::new(memory.build()?);
    let payload = [
        ints(&[0x12345], 4, native()),
        ints(&[300], 4, native()),
        ints(&[-5], 2, native()),
        ints(&[200], 1, native()),
    ]
    .concat();
    let bytes = DocBuilder::native()
        .data(0x40, 0, 1, &payload)?
        .schema(&file.build()?)?
        .end()?;

    let doc = parse(&current, &bytes)?;
    let data = relocated(&doc.chunks()[0]);
    assert_eq!(data.len(), 2 + 1 + 8 + 4);
    assert_eq!(i16::from_ne_bytes([data[0], data[1]]), 0x2345);
    assert_eq!(data[2], 44);
    let mut c = [0u8; 8];
    c.copy_from_slice(&data[3..11]);
    assert_eq!(i64::from_ne_bytes(c), -5);
    assert_eq!(read_i32(data, 11), 200);
    Ok(())
}

/// A document written on a host of the other byte order reads back the same values.
#[test]
fn test_foreign_byte_order() -> strand::Result<()> {
    let pw = PointerWidth::native();
    let foreign = native().swapped();
    let current = CurrentSchema::new(common::point_v2(pw).build()?);
    let bytes = DocBuilder::new(pw, foreign)
        .data(0x1000, 0, 1, &i32s(&[1, 2], foreign))?
        .schema(&common::point_v1(pw).with_endian(foreign).build()?)?
        .end()?;

    let doc = parse(&current, &bytes)?;
    assert!(doc.flags().is_endian_swap());
    let data = relocated(&doc.chunks()[0]);
    assert_eq!(
        (read_i32(data, 0), read_i32(data, 4), read_i32(data, 8)),
        (1, 2, 0)
    );
    Ok(())
}

/// Integer and float conversions read the file's byte order before converting.
#[test]
fn test_foreign_byte_order_conversions() -> strand::Result<()> {
    let pw = PointerWidth::native();
    let foreign = native().swapped();
    let file = SchemaBuilder::new(pw)
        .with_primitives()
        .with_endian(foreign)
        .structure("Rec", &[("short", "a"), ("int", "b"), ("uint64_t", "c")]);
    let memory = SchemaBuilder::new(pw)
        .with_primitives()
        .structure("Rec", &[("int", "a"), ("float", "b"), ("uint", "c")]);
    let current = CurrentSchema::new(memory.build()?);
    let payload = [
        ints(&[-300], 2, foreign),
        ints(&[70_000], 4, foreign),
        ints(&[0x1_0000_0102_i64], 8, foreign),
    ]
    .concat();
    let bytes = DocBuilder::new(pw, foreign)
        .data(0x40, 0, 1, &payload)?
        .schema(&file.build()?)?
        .end()?;

    let doc = parse(&current, &bytes)?;
    let data = relocated(&doc.chunks()[0]);
    assert_eq!(read_i32(data, 0), -300);
    assert_eq!(read_f32(data, 4), 70_000.0);
    assert_eq!(read_i32(data, 8), 0x102);
    Ok(())
}

/// Same-width exact matches are byte-reversed, so float payloads survive bit for bit.
#[test]
fn test_foreign_floats_keep_their_bits() -> strand::Result<()> {
    let pw = PointerWidth::native();
    let foreign = native().swapped();
    let schema = |endian| {
        SchemaBuilder::new(pw)
            .with_primitives()
            .with_endian(endian)
            .structure("Rec", &[("float", "f[2]"), ("double", "d")])
    };
    let current = CurrentSchema::new(schema(native()).build()?);
    let (nan, half, wide_nan) = (0x7fa0_0001_u32, 1.5f32.to_bits(), 0x7ff0_0000_0000_0001_u64);
    let payload = [ints(&[nan, half], 4, foreign), ints(&[wide_nan], 8, foreign)].concat();
    let bytes = DocBuilder::new(pw, foreign)
        .data(0x40, 0, 1, &payload)?
        .schema(&schema(foreign).build()?)?
        .end()?;

    let doc = parse(&current, &bytes)?;
    let expected = [ints(&[nan, half], 4, native()), ints(&[wide_nan], 8, native())].concat();
    assert_eq!(relocated(&doc.chunks()[0]), expected.as_slice());
    Ok(())
}

/// A type whose width differs between the two schemas is converted, not copied.
#[test]
fn test_same_type_different_width() -> strand::Result<()> {
    let pw = PointerWidth::native();
    let schema = |long: u16, endian| {
        SchemaBuilder::new(pw)
            .with_primitives()
            .primitive("long", long)
            .with_endian(endian)
            .structure("Rec", &[("long", "v[2]"), ("int", "tail")])
    };
    let current = CurrentSchema::new(schema(4, native()).build()?);

    for endian in [native(), native().swapped()] {
        let payload = [ints(&[7_i64, -9], 8, endian), i32s(&[5], endian)].concat();
        let bytes = DocBuilder::new(pw, endian)
            .data(0x40, 0, 1, &payload)?
            .schema(&schema(8, endian).build()?)?
            .end()?;

        let doc = parse(&current, &bytes)?;
        let stats = doc.link().map(|l| l.stats()).expect("linked");
        assert_eq!((stats.exact, stats.integer), (1, 1));
        let data = relocated(&doc.chunks()[0]);
        assert_eq!(data.len(), 12);
        assert_eq!(
            (read_i32(data, 0), read_i32(data, 4), read_i32(data, 8)),
            (7, -9, 5)
        );
    }
    Ok(())
}

/// Relocated chunks may not grow past the configured chunk length.
#[test]
fn test_relocated_length_is_capped() -> strand::Result<()> {
    let pw = PointerWidth::native();
    let empty = SchemaBuilder::new(pw).with_primitives().structure("Rec", &[("void", "pad")]);
    let grown = SchemaBuilder::new(pw).with_primitives().structure("Rec", &[("int", "x")]);
    let current = CurrentSchema::new(grown.build()?);

    let document = |count| -> strand::Result<Vec<u8>> {
        DocBuilder::native()
            .data(0x40, 0, count, &[])?
            .schema(&empty.build()?)?
            .end()
    };

    let mut doc = Document::new(&current)?;
    let result = doc.parse_bytes(&document(u32::MAX)?, ParseMode::Uncompressed, false);
    assert!(matches!(result, Err(StrandError::InvalidChunkLength { .. })));
    assert!(doc.chunks().is_empty());

    let config = DocumentConfig::default().with_max_chunk_len(1024);
    let mut doc = Document::new(&current)?.with_config(config);
    doc.parse_bytes(&document(256)?, ParseMode::Uncompressed, false)?;
    assert_eq!(relocated(&doc.chunks()[0]).len(), 1024);
    let result = doc.parse_bytes(&document(257)?, ParseMode::Uncompressed, false);
    assert!(matches!(result, Err(StrandError::InvalidChunkLength { .. })));

    // Nothing to transcribe on either side.
    let current = CurrentSchema::new(empty.build()?);
    let doc = parse(&current, &document(u32::MAX)?)?;
    assert_eq!(doc.chunks()[0].current_header().len, 0);
    Ok(())
}

// --- POINTERS ---

fn node_schema(pw: PointerWidth) -> SchemaBuilder {
    SchemaBuilder::new(pw)
        .with_primitives()
        .structure("Node", &[("Node", "*next"), ("int", "value"), ("float", "w[2]")])
}

fn node(next: u64, value: i32) -> Vec<u8> {
    let pw = PointerWidth::native();
    [
        pointer(next, pw, native()),
        i32s(&[value], native()),
        [1.5f32.to_ne_bytes(), (-2.0f32).to_ne_bytes()].concat(),
    ]
    .concat()
}

/// Reading a document into the schema it was written with changes no byte.
#[test]
fn test_identity_transcription() -> strand::Result<()> {
    let pw = PointerWidth::native();
    let current = CurrentSchema::new(node_schema(pw).build()?);
    let payloads = [node(0x200, 1), node(0x300, 2), node(0, 3)];
    let bytes = DocBuilder::native()
        .data(0x100, 0, 1, &payloads[0])?
        .data(0x200, 0, 1, &payloads[1])?
        .data(0x300, 0, 1, &payloads[2])?
        .schema(&node_schema(pw).build()?)?
        .end()?;

    let doc = parse(&current, &bytes)?;
    assert_eq!(doc.chunks().len(), 3);
    for (chunk, payload) in doc.chunks().iter().zip(&payloads) {
        assert_eq!(relocated(chunk), payload.as_slice());
    }
    assert_eq!(doc.relocate_stats().unresolved_pointers, 0);
    assert_eq!(doc.link().map(|l| l.stats().missing), Some(0));

    // Following pointers walks the list.
    let mut values = Vec::new();
    let mut at = 0x100;
    while let Some(chunk) = doc.resolve(at) {
        let data = relocated(chunk);
        values.push(read_i32(data, pw.bytes()));
        at = read_pointer(data, 0, pw);
    }
    assert_eq!(values, vec![1, 2, 3]);
    Ok(())
}

#[test]
fn test_unresolved_pointer_is_nulled() -> strand::Result<()> {
    let pw = PointerWidth::native();
    let current = CurrentSchema::new(node_schema(pw).build()?);
    let bytes = DocBuilder::native()
        .data(0x100, 0, 1, &node(0xdead, 1))?
        .schema(&node_schema(pw).build()?)?
        .end()?;

    let doc = parse(&current, &bytes)?;
    let data = relocated(&doc.chunks()[0]);
    assert_eq!(read_pointer(data, 0, pw), 0);
    assert_eq!(read_i32(data, pw.bytes()), 1);
    assert_eq!(doc.relocate_stats().unresolved_pointers, 1);
    assert!(doc.resolve(0xdead).is_none());
    Ok(())
}

fn holder_schema(pw: PointerWidth) -> SchemaBuilder {
    SchemaBuilder::new(pw)
        .with_primitives()
        .structure("Link", &[("Link", "*next"), ("Link", "*prev")])
        .structure("Node", &[("int", "value")])
        .structure("Holder", &[("Node", "**items"), ("int", "n")])
}

/// A 32-bit document's pointer array is widened once, however many members share it.
#[test]
fn test_pointer_array_widened_once() -> strand::Result<()> {
    let file_pw = PointerWidth::Four;
    let memory_pw = PointerWidth::Eight;
    let current =
        CurrentSchema::new(holder_schema(memory_pw).build()?).with_pointer_width(memory_pw);

    let array = [pointer(0x10, file_pw, native()), pointer(0x20, file_pw, native())].concat();
    let holder = [pointer(0x30, file_pw, native()), i32s(&[2], native())].concat();
    // Types: 0 Link (opaque), 1 Node, 2 Holder.
    let bytes = DocBuilder::new(file_pw, native())
        .data(0x10, 1, 1, &i32s(&[7], native()))?
        .data(0x20, 1, 1, &i32s(&[9], native()))?
        .data(0x30, 0, 1, &array)?
        .data(0x40, 2, 1, &holder)?
        .data(0x50, 2, 1, &holder)?
        .data(0x60, 0, 1, &[1, 2, 3])?
        .schema(&holder_schema(file_pw).build()?)?
        .end()?;

    let doc = parse(&current, &bytes)?;
    let stats = doc.relocate_stats();
    assert_eq!(stats.pointer_arrays, 1);
    assert_eq!(stats.structs, 4);
    assert_eq!(stats.opaque, 1);

    let array = doc.resolve(0x30).expect("array chunk");
    let data = relocated(array);
    assert_eq!(data.len(), 16);
    assert_eq!(read_pointer(data, 0, memory_pw), 0x10);
    assert_eq!(read_pointer(data, 8, memory_pw), 0x20);

    for old in [0x40, 0x50] {
        let data = relocated(doc.resolve(old).expect("holder"));
        assert_eq!(data.len(), 12);
        assert_eq!(read_pointer(data, 0, memory_pw), 0x30);
        assert_eq!(read_i32(data, 8), 2);
    }

    // Unreferenced opaque blocks are copied as is.
    assert_eq!(relocated(doc.resolve(0x60).expect("blob")), &[1, 2, 3]);
    Ok(())
}

/// Pointers in a document of the other byte order still resolve.
#[test]
fn test_foreign_pointers_resolve() -> strand::Result<()> {
    let pw = PointerWidth::native();
    let foreign = native().swapped();
    let current = CurrentSchema::new(node_schema(pw).build()?);
    let foreign_node = |next: u64, value: i32| {
        [
            pointer(next, pw, foreign),
            i32s(&[value], foreign),
            ints(&[1.5f32.to_bits(), (-2.0f32).to_bits()], 4, foreign),
        ]
        .concat()
    };
    let bytes = DocBuilder::new(pw, foreign)
        .data(0x100, 0, 1, &foreign_node(0x200, 1))?
        .data(0x200, 0, 1, &foreign_node(0, 2))?
        .schema(&node_schema(pw).with_endian(foreign).build()?)?
        .end()?;

    let doc = parse(&current, &bytes)?;
    assert_eq!(relocated(&doc.chunks()[0]), node(0x200, 1).as_slice());
    assert_eq!(relocated(&doc.chunks()[1]), node(0, 2).as_slice());
    assert_eq!(doc.relocate_stats().unresolved_pointers, 0);
    Ok(())
}

/// A 64-bit document's pointer array is narrowed; addresses wider than 32 bits become null.
#[test]
fn test_pointer_array_narrowed() -> strand::Result<()> {
    let file_pw = PointerWidth::Eight;
    let memory_pw = PointerWidth::Four;
    let current =
        CurrentSchema::new(holder_schema(memory_pw).build()?).with_pointer_width(memory_pw);
    let report = Arc::new(CollectReport::new());

    let high = 0x1_0000_0020;
    let array = [pointer(0x10, file_pw, native()), pointer(high, file_pw, native())].concat();
    let holder = [pointer(0x30, file_pw, native()), i32s(&[2], native())].concat();
    let bytes = DocBuilder::new(file_pw, native())
        .data(0x10, 1, 1, &i32s(&[7], native()))?
        .data(high, 1, 1, &i32s(&[9], native()))?
        .data(0x30, 0, 1, &array)?
        .data(0x40, 2, 1, &holder)?
        .schema(&holder_schema(file_pw).build()?)?
        .end()?;

    let mut doc = Document::new(&current)?.with_report(report.clone());
    doc.parse_bytes(&bytes, ParseMode::Uncompressed, false)?;
    let stats = doc.relocate_stats();
    assert_eq!(stats.pointer_arrays, 1);
    assert_eq!(stats.unresolved_pointers, 1);
    assert!(report.contains("does not fit a 32-bit pointer"));

    let data = relocated(doc.resolve(0x30).expect("array chunk"));
    assert_eq!(data.len(), 8);
    assert_eq!(read_pointer(data, 0, memory_pw), 0x10);
    assert_eq!(read_pointer(data, 4, memory_pw), 0);

    let data = relocated(doc.resolve(0x40).expect("holder"));
    assert_eq!(data.len(), 8);
    assert_eq!(read_pointer(data, 0, memory_pw), 0x30);
    assert_eq!(read_i32(data, 4), 2);
    assert!(doc.resolve(high).is_some());
    Ok(())
}

// --- SCANNING ---

#[test]
fn test_invalid_chunk_length_aborts() -> strand::Result<()> {
    let pw = PointerWidth::native();
    let current = CurrentSchema::new(common::point_v1(pw).build()?);
    let mut bad = DocBuilder::native()
        .data(0x10, 0, 1, &i32s(&[1, 2], native()))?
        .into_bytes();
    let header = strand::format::ChunkHeader {
        code: ChunkCode::DATA,
        len: strand::format::INVALID_CHUNK_LEN,
        old: strand::format::OldAddr(0x20),
        type_index: 0,
        count: 1,
    };
    header.encode_into(strand::format::HeaderFlags::native(), &mut bad)?;

    let mut doc = Document::new(&current)?;
    let result = doc.parse_bytes(&bad, ParseMode::Uncompressed, false);
    assert!(matches!(result, Err(StrandError::InvalidChunkLength { .. })));
    assert!(doc.chunks().is_empty());
    assert!(doc.addresses().is_empty());
    assert_eq!(doc.state(), ParseState::Header);
    Ok(())
}

#[test]
fn test_chunk_length_limits() -> strand::Result<()> {
    let pw = PointerWidth::native();
    let current = CurrentSchema::new(common::point_v1(pw).build()?);

    // Longer than the configured limit.
    let bytes = DocBuilder::native()
        .data(0x10, 0, 1, &i32s(&[1, 2], native()))?
        .schema(&common::point_v1(pw).build()?)?
        .end()?;
    let mut doc =
        Document::new(&current)?.with_config(DocumentConfig::default().with_max_chunk_len(4));
    assert!(matches!(
        doc.parse_bytes(&bytes, ParseMode::Uncompressed, false),
        Err(StrandError::InvalidChunkLength { .. })
    ));

    // Too short for its declared count.
    let bytes = DocBuilder::native()
        .data(0x10, 0, 3, &i32s(&[1, 2], native()))?
        .schema(&common::point_v1(pw).build()?)?
        .end()?;
    let mut doc = Document::new(&current)?;
    assert!(matches!(
        doc.parse_bytes(&bytes, ParseMode::Uncompressed, false),
        Err(StrandError::InvalidRead(_))
    ));
    assert!(doc.chunks().is_empty());
    Ok(())
}

#[test]
fn test_truncated_document() -> strand::Result<()> {
    let pw = PointerWidth::native();
    let current = CurrentSchema::new(common::point_v1(pw).build()?);
    let bytes = DocBuilder::native()
        .data(0x10, 0, 1, &i32s(&[1, 2], native()))?
        .into_bytes();
    let mut doc = Document::new(&current)?;
    assert!(matches!(
        doc.parse_bytes(&bytes[..bytes.len() - 2], ParseMode::Uncompressed, false),
        Err(StrandError::InvalidRead(_))
    ));
    Ok(())
}

#[test]
fn test_end_without_schema() -> strand::Result<()> {
    let pw = PointerWidth::native();
    let current = CurrentSchema::new(common::point_v1(pw).build()?);
    let bytes = DocBuilder::native()
        .data(0x10, 0, 1, &i32s(&[1, 2], native()))?
        .end()?;
    let mut doc = Document::new(&current)?;
    assert!(matches!(
        doc.parse_bytes(&bytes, ParseMode::Uncompressed, false),
        Err(StrandError::LinkFailure(_))
    ));
    Ok(())
}

/// Two chunks claiming one address: the first is kept.
#[test]
fn test_duplicate_addresses() -> strand::Result<()> {
    let pw = PointerWidth::native();
    let current = CurrentSchema::new(common::point_v1(pw).build()?);
    let schema = common::point_v1(pw).build()?;
    let differing = DocBuilder::native()
        .data(0x10, 0, 1, &i32s(&[1, 2], native()))?
        .data(0x10, 0, 1, &i32s(&[5, 6], native()))?
        .schema(&schema)?
        .end()?;

    let doc = parse(&current, &differing)?;
    assert_eq!(doc.chunks().len(), 1);
    assert_eq!(doc.duplicates(), 1);
    assert_eq!(read_i32(relocated(&doc.chunks()[0]), 0), 1);

    let strict = DocumentConfig::default().with_duplicate_policy(DuplicatePolicy::CompareContent);
    let mut doc = Document::new(&current)?.with_config(strict.clone());
    assert!(matches!(
        doc.parse_bytes(&differing, ParseMode::Uncompressed, false),
        Err(StrandError::TableConflict(_))
    ));

    let identical = DocBuilder::native()
        .data(0x10, 0, 1, &i32s(&[1, 2], native()))?
        .data(0x10, 0, 1, &i32s(&[1, 2], native()))?
        .schema(&schema)?
        .end()?;
    let mut doc = Document::new(&current)?.with_config(strict.clone());
    doc.parse_bytes(&identical, ParseMode::Uncompressed, false)?;
    assert_eq!(doc.duplicates(), 1);

    // A longer payload sharing the same prefix still conflicts.
    let extended = DocBuilder::native()
        .data(0x10, 0, 1, &i32s(&[1, 2], native()))?
        .data(0x10, 0, 1, &i32s(&[1, 2, 3], native()))?
        .schema(&schema)?
        .end()?;
    let mut doc = Document::new(&current)?.with_config(strict);
    assert!(matches!(
        doc.parse_bytes(&extended, ParseMode::Uncompressed, false),
        Err(StrandError::TableConflict(_))
    ));
    Ok(())
}

/// A schema blob with no chunk header in front of it.
#[test]
fn test_bare_schema_blob() -> strand::Result<()> {
    let pw = PointerWidth::native();
    let current = CurrentSchema::new(common::point_v2(pw).build()?);
    let bytes = DocBuilder::native()
        .data(0x10, 0, 1, &i32s(&[4, 5], native()))?
        .raw(&common::point_v1(pw).build()?)
        .into_bytes();

    let doc = parse(&current, &bytes)?;
    assert_eq!(doc.state(), ParseState::Done);
    assert_eq!(read_i32(relocated(&doc.chunks()[0]), 4), 5);
    Ok(())
}

#[test]
fn test_stripped_signature() -> strand::Result<()> {
    let pw = PointerWidth::native();
    let current = CurrentSchema::new(common::point_v1(pw).build()?);
    let bytes = DocBuilder::with_signature(b"STRAND", pw, native())
        .data(0x10, 0, 1, &i32s(&[1, 2], native()))?
        .schema(&common::point_v1(pw).build()?)?
        .end()?;

    let doc = parse(&current, &bytes)?;
    assert!(doc.header().is_some_and(|h| h.stripped));
    assert_eq!(doc.version(), Some(300));
    assert_eq!(doc.chunks().len(), 1);
    Ok(())
}

#[test]
fn test_header_error_reporting() -> strand::Result<()> {
    let current = CurrentSchema::new(common::point_v1(PointerWidth::native()).build()?);
    let report = Arc::new(CollectReport::new());
    let mut doc = Document::new(&current)?.with_report(report.clone());

    let result = doc.parse_bytes(b"garbage!!!!!", ParseMode::Uncompressed, true);
    assert!(matches!(result, Err(StrandError::InvalidHeader(_))));
    assert_eq!(report.count(ReportLevel::Error), 0);

    let result = doc.parse_bytes(b"garbage!!!!!", ParseMode::Uncompressed, false);
    assert!(matches!(result, Err(StrandError::InvalidHeader(_))));
    assert_eq!(report.count(ReportLevel::Error), 1);
    Ok(())
}

// --- CHUNK STATES ---

#[test]
fn test_skipped_and_unlinked_chunks() -> strand::Result<()> {
    let pw = PointerWidth::native();
    let current = CurrentSchema::new(common::point_v1(pw).build()?);
    let file = common::point_v1(pw).structure("Ghost", &[("int", "g")]);
    let skip = ChunkCode::from_name("SK");
    let bytes = DocBuilder::native()
        .data(0x10, 0, 1, &i32s(&[1, 2], native()))?
        .chunk(skip, 0x20, 0, 1, &i32s(&[3, 4], native()))?
        .data(0x30, 1, 1, &i32s(&[5], native()))?
        .data(0x40, 99, 1, &i32s(&[6], native()))?
        .schema(&file.build()?)?
        .end()?;

    let mut doc = Document::new(&current)?.with_config(DocumentConfig::default().skip_code(skip));
    doc.parse_bytes(&bytes, ParseMode::Uncompressed, false)?;

    let states: Vec<ChunkState> = doc.chunks().iter().map(ChunkRecord::state).collect();
    assert_eq!(
        states,
        vec![
            ChunkState::Relocated,
            ChunkState::Skipped,
            ChunkState::Unlinked,
            ChunkState::Unlinked
        ]
    );
    let skipped = &doc.chunks()[1];
    assert_eq!(skipped.raw(), Some(i32s(&[3, 4], native()).as_slice()));
    assert!(skipped.relocated().is_none());
    assert_eq!(skipped.data(), skipped.raw());

    let stats = doc.relocate_stats();
    assert_eq!((stats.structs, stats.skipped, stats.unlinked), (1, 1, 2));
    assert_eq!(doc.records(skip).count(), 0);

    let mut doc =
        Document::new(&current)?.with_config(DocumentConfig::default().skip_type("Point"));
    doc.parse_bytes(&bytes, ParseMode::Uncompressed, false)?;
    assert_eq!(doc.chunks()[0].state(), ChunkState::Skipped);
    Ok(())
}

struct PointSum {
    code: ChunkCode,
    seen: usize,
    sum: i32,
}

impl ChunkHandler for PointSum {
    fn code(&self) -> ChunkCode {
        self.code
    }

    fn handle(&mut self, record: &ChunkRecord, schema: &SchemaTable) -> strand::Result<()> {
        let x = schema
            .find_member("Point", "x")
            .ok_or_else(|| StrandError::Failed("no x".into()))?;
        let data = record
            .relocated()
            .ok_or_else(|| StrandError::Failed("not relocated".into()))?;
        self.sum += read_i32(data, x.offset);
        self.seen += 1;
        Ok(())
    }
}

#[test]
fn test_records_and_dispatch() -> strand::Result<()> {
    let pw = PointerWidth::native();
    let current = CurrentSchema::new(common::point_v2(pw).build()?);
    let points = ChunkCode::from_name("PT");
    let bytes = DocBuilder::native()
        .chunk(points, 0x10, 0, 1, &i32s(&[1, 0], native()))?
        .data(0x20, 0, 1, &i32s(&[100, 0], native()))?
        .chunk(points, 0x30, 0, 1, &i32s(&[2, 0], native()))?
        .schema(&common::point_v1(pw).build()?)?
        .end()?;
    let doc = parse(&current, &bytes)?;

    assert_eq!(doc.record_lists().len(), 2);
    let olds: Vec<u64> = doc.records(points).map(|c| c.old().0).collect();
    assert_eq!(olds, vec![0x10, 0x30]);

    let mut handler = PointSum {
        code: points,
        seen: 0,
        sum: 0,
    };
    let handled = doc.dispatch(&mut [&mut handler])?;
    assert_eq!(handled, 2);
    assert_eq!((handler.seen, handler.sum), (2, 3));
    Ok(())
}

#[test]
fn test_clear_resets() -> strand::Result<()> {
    let pw = PointerWidth::native();
    let current = CurrentSchema::new(common::point_v1(pw).build()?);
    let bytes = DocBuilder::native()
        .data(0x10, 0, 1, &i32s(&[1, 2], native()))?
        .schema(&common::point_v1(pw).build()?)?
        .end()?;
    let mut doc = parse(&current, &bytes)?;
    assert!(doc.file_schema().is_some());

    doc.clear();
    assert_eq!(doc.state(), ParseState::Header);
    assert!(doc.chunks().is_empty());
    assert!(doc.link().is_none());
    assert!(doc.record_lists().is_empty());
    Ok(())
}
