#![allow(missing_docs)]

use strand::containers::{BufferPool, HashTable};
use strand::format::{
    ChunkCode, ChunkHeader, Endian, FileHeader, HeaderFlags, OldAddr, PointerWidth,
};
use strand::hash::{bytes_hash, name_hash, wang_hash};
use strand::io::{ByteStream, MemoryStream, StreamMode, StreamState};
use strand::StrandError;

fn sample(old: u64) -> ChunkHeader {
    ChunkHeader {
        code: ChunkCode::from_name("OB"),
        len: 1234,
        old: OldAddr(old),
        type_index: 17,
        count: 3,
    }
}

// --- CHUNK HEADERS ---

/// Encoding then decoding returns the same header on every width/byte-order path.
#[test]
fn test_chunk_header_round_trip() -> strand::Result<()> {
    for chunk_64 in [false, true] {
        for swap in [false, true] {
            let flags = HeaderFlags::new(chunk_64, false, swap);
            let old = if chunk_64 { 0x0000_7f12_3456_78a0 } else { 0x0804_a010 };
            let header = sample(old);

            let bytes = header.encode(flags)?;
            assert_eq!(bytes.len(), ChunkHeader::size(flags));

            let decoded = ChunkHeader::decode(&bytes, flags)?;
            assert_eq!(decoded, header, "chunk_64={chunk_64} swap={swap}");
        }
    }
    Ok(())
}

/// The two halves of a 64-bit address are not swapped individually.
#[test]
fn test_swapped_address_reassembled() -> strand::Result<()> {
    let flags = HeaderFlags::new(true, false, true);
    let bytes = sample(0x1122_3344_5566_7788).encode(flags)?;
    let expected = match flags.endian() {
        Endian::Big => 0x1122_3344_5566_7788u64.to_be_bytes(),
        Endian::Little => 0x1122_3344_5566_7788u64.to_le_bytes(),
    };
    assert_eq!(&bytes[8..16], &expected);
    Ok(())
}

#[test]
fn test_invalid_length_sentinel() -> strand::Result<()> {
    let flags = HeaderFlags::native();
    let mut header = sample(0x1000);
    header.len = strand::format::INVALID_CHUNK_LEN;
    let bytes = header.encode(flags)?;

    match ChunkHeader::decode(&bytes, flags) {
        Err(StrandError::InvalidChunkLength { len, .. }) => assert_eq!(len, u32::MAX),
        other => panic!("expected InvalidChunkLength, got {other:?}"),
    }
    Ok(())
}

#[test]
fn test_wide_address_rejected_by_32_bit_header() {
    let flags = HeaderFlags::new(false, false, false);
    let result = sample(0x1_0000_0000).encode(flags);
    assert!(matches!(result, Err(StrandError::Unsupported(_))));
}

/// A code whose leading two bytes are zero is shifted down.
#[test]
fn test_legacy_short_code() -> strand::Result<()> {
    let flags = HeaderFlags::native();
    let mut bytes = sample(0x10).encode(flags)?;
    bytes[..4].copy_from_slice(&[0, 0, b'O', b'B']);

    let decoded = ChunkHeader::decode(&bytes, flags)?;
    assert_eq!(decoded.code, ChunkCode::from_name("OB"));
    assert_eq!(decoded.code.to_string(), "OB");
    Ok(())
}

// --- FILE HEADER ---

#[test]
fn test_file_header_round_trip() -> strand::Result<()> {
    let header = FileHeader::new(b"STRAND!", PointerWidth::Eight, Endian::Big, 281);
    let bytes = header.to_bytes();
    assert_eq!(bytes, b"STRAND!-V281");

    let mut stream = MemoryStream::from_slice(&bytes);
    let read = FileHeader::read(&mut stream, b"STRAND!")?;
    assert_eq!(read, header);
    assert_eq!(read.as_text(), "STRAND!-V281");
    assert_eq!(stream.position(), 12);
    Ok(())
}

#[test]
fn test_stripped_header() -> strand::Result<()> {
    let mut stream = MemoryStream::from_slice(b"STRAND_v042");
    let header = FileHeader::read(&mut stream, b"STRAND!")?;
    assert!(header.stripped);
    assert_eq!(header.signature, b"STRAND");
    assert_eq!(header.pointer_width, PointerWidth::Four);
    assert_eq!(header.endian, Endian::Little);
    assert_eq!(header.version, 42);
    assert_eq!(stream.position(), 11);
    Ok(())
}

#[test]
fn test_bad_headers() {
    for bytes in [
        &b"NOTMINE-v300"[..],
        &b"STRAND!xv300"[..],
        &b"STRAND!-x300"[..],
        &b"STRAND!-v3a0"[..],
    ] {
        let mut stream = MemoryStream::from_slice(bytes);
        let result = FileHeader::read(&mut stream, b"STRAND!");
        assert!(
            matches!(result, Err(StrandError::InvalidHeader(_))),
            "{:?} -> {result:?}",
            String::from_utf8_lossy(bytes)
        );
    }

    let mut short = MemoryStream::from_slice(b"STRAND!-");
    assert!(matches!(
        FileHeader::read(&mut short, b"STRAND!"),
        Err(StrandError::InvalidRead(_))
    ));
}

#[test]
fn test_header_flags() {
    let header = FileHeader::new(b"STRAND!", PointerWidth::Four, Endian::native().swapped(), 1);
    let flags = header.flags(PointerWidth::Eight);
    assert!(!flags.is_chunk_64());
    assert!(flags.is_var_bits());
    assert!(flags.is_endian_swap());
    assert_eq!(flags.endian(), Endian::native().swapped());
}

// --- HASHING ---

#[test]
fn test_hashes_are_stable() {
    assert_eq!(bytes_hash(b""), 0xcbf2_9ce4_8422_2325);
    assert_eq!(bytes_hash(b"a"), 0xaf63_dc4c_8601_ec8c);
    assert_eq!(name_hash("Point"), name_hash("Point"));
    assert_ne!(name_hash("Point"), name_hash("point"));
    assert_eq!(wang_hash(42), wang_hash(42));
    assert_ne!(wang_hash(1), wang_hash(2));
}

// --- CONTAINERS ---

/// Removing moves the last entry into the hole; every remaining key stays reachable.
#[test]
fn test_hash_table_remove_swaps_last() -> strand::Result<()> {
    let mut table: HashTable<u64, &str> = HashTable::new();
    for (k, v) in [(10, "a"), (20, "b"), (30, "c"), (40, "d")] {
        table.try_insert(k, v)?;
    }
    assert!(matches!(table.try_insert(20, "x"), Err(StrandError::TableConflict(_))));

    assert_eq!(table.remove(&20), Some("b"));
    assert_eq!(table.len(), 3);
    assert_eq!(table.find_index(&40), Some(1));
    assert_eq!(table.get_index(1), Some((&40, &"d")));
    for (k, v) in [(10, "a"), (30, "c"), (40, "d")] {
        assert_eq!(table.find(&k), Some(&v));
    }
    assert_eq!(table.find(&20), None);
    Ok(())
}

#[test]
fn test_hash_table_grows() {
    let mut table: HashTable<u64, u64> = HashTable::new();
    for k in 0..1_000u64 {
        assert_eq!(table.insert(k * 7919, k), None);
    }
    assert_eq!(table.len(), 1_000);
    assert!(table.bucket_count().is_power_of_two());
    assert!(table.bucket_count() >= 1_000);
    for k in 0..1_000u64 {
        assert_eq!(table.find(&(k * 7919)), Some(&k));
    }
    assert_eq!(table.insert(0, 99), Some(0));
}

#[test]
fn test_buffer_pool_reuses() -> strand::Result<()> {
    let mut pool = BufferPool::with_limit(2);
    let mut buf = pool.take(64)?;
    buf[0] = 0xff;
    pool.give(buf);
    assert_eq!(pool.retained(), 1);

    let again = pool.take(32)?;
    assert_eq!(again.len(), 32);
    assert!(again.iter().all(|b| *b == 0));
    assert_eq!(pool.reuse_count(), 1);

    pool.give(again);
    pool.give(vec![0; 8]);
    pool.give(vec![0; 8]);
    assert_eq!(pool.retained(), 2);
    pool.reset();
    assert_eq!(pool.retained(), 0);
    Ok(())
}

// --- STREAMS ---

#[test]
fn test_memory_stream_bounds() -> strand::Result<()> {
    let mut stream = MemoryStream::writer();
    stream.write_all(b"hello world")?;
    assert!(matches!(stream.read(&mut [0u8; 1]), Err(StrandError::InvalidRead(_))));

    stream.reopen(StreamMode::Read);
    let mut buf = [0u8; 5];
    stream.read_exact(&mut buf)?;
    assert_eq!(&buf, b"hello");
    assert_eq!(stream.seek(std::io::SeekFrom::End(-5))?, 6);
    assert_eq!(stream.remaining(), b"world");
    assert!(stream.seek(std::io::SeekFrom::Current(100)).is_err());

    let mut rest = [0u8; 8];
    assert!(matches!(stream.read_exact(&mut rest), Err(StrandError::InvalidRead(_))));

    stream.close()?;
    assert_eq!(stream.state(), StreamState::Closed);
    assert!(stream.read(&mut buf).is_err());
    Ok(())
}

#[test]
fn test_file_stream_lifecycle() -> strand::Result<()> {
    use strand::io::FileStream;

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("bytes.bin");

    let mut out = FileStream::create(&path)?;
    assert_eq!(out.state(), StreamState::Open(StreamMode::Write));
    out.write_all(b"0123456789")?;
    out.close()?;
    assert!(!out.is_open());

    let mut input = FileStream::open_read(&path)?;
    assert_eq!(input.size(), Some(10));
    input.seek(std::io::SeekFrom::Start(4))?;
    let mut buf = [0u8; 3];
    input.read_exact(&mut buf)?;
    assert_eq!(&buf, b"456");
    assert_eq!(input.position(), 7);
    Ok(())
}
