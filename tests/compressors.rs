//! Plug custom compressors into the write pipeline.

use std::io::{Cursor, ErrorKind};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use exr_scanline_writer::prelude::*;


/// Pretends to compress by keeping the first bytes, or fails on one group.
struct Fake {
    lines_per_group: usize,
    keep: Option<usize>,
    failing_group_y: Option<i32>,
}

impl Compressor for Fake {
    fn compress(&mut self, packed: &[u8], group_start_y: i32) -> Result<Vec<u8>> {
        if Some(group_start_y) == self.failing_group_y {
            return Err(Error::Io(std::io::Error::new(ErrorKind::Other, "codec failure")));
        }

        Ok(match self.keep {
            Some(count) => packed[.. count.min(packed.len())].to_vec(),
            None => [packed, &[0xff]].concat(),
        })
    }

    fn byte_order(&self) -> SampleByteOrder { SampleByteOrder::Native }
    fn lines_per_group(&self) -> usize { self.lines_per_group }
}

fn header(compression: Compression, height: usize) -> Header {
    Header::new((3, height), smallvec::smallvec![ ChannelDescription::named("I", SampleType::U32) ])
        .with_compression(compression)
}


#[test_log::test]
fn failure_of_one_group_is_reported_after_all_tasks() {
    let header = header(Compression::PIZ, 100);
    let ids: Vec<u32> = (0 .. 300).collect();
    let frame_buffer = FrameBuffer::new().with_slice("I", Slice::packed(ids.as_slice(), header.data_window));

    let options = WriteOptions::default()
        .with_worker_count(2)
        .with_compressor_factory(|_| Ok(Box::new(Fake { lines_per_group: 32, keep: Some(8), failing_group_y: Some(32) })));

    let mut bytes = Cursor::new(Vec::new());
    let mut file = ScanLineOutputFile::new(&mut bytes, header, options).unwrap();
    file.set_frame_buffer(&frame_buffer).unwrap();

    match file.write_pixels(100) {
        Err(Error::Io(error)) => assert!(error.to_string().contains("codec failure"), "{}", error),
        other => panic!("expected the codec error, got {:?}", other),
    }

    assert_eq!(file.current_scan_line(), 32);
    assert_eq!(file.missing_scan_lines(), 68);
    assert_ne!(file.line_offsets()[0], 0);
    assert_eq!(file.line_offsets()[1 ..], [0, 0, 0]);
}

#[test_log::test]
fn incompressible_groups_are_stored_in_little_endian() {
    let header = header(Compression::B44, 40);
    let ids: Vec<u32> = (0 .. 120).map(|index| 0x0102_0304 * index).collect();
    let frame_buffer = FrameBuffer::new().with_slice("I", Slice::packed(ids.as_slice(), header.data_window));

    let options = WriteOptions::default()
        .with_compressor_factory(|_| Ok(Box::new(Fake { lines_per_group: 32, keep: None, failing_group_y: None })));

    let mut bytes = Cursor::new(Vec::new());

    {
        let mut file = ScanLineOutputFile::new(&mut bytes, header, options).unwrap();
        file.set_frame_buffer(&frame_buffer).unwrap();
        file.write_pixels(40).unwrap();
        file.close().unwrap();
    }

    let mut reader = RawChunkReader::new(Cursor::new(bytes.into_inner())).unwrap();

    let first_group = reader.read_raw_chunk(0).unwrap();
    let expected: Vec<u8> = ids[.. 96].iter().flat_map(|id| id.to_le_bytes()).collect();
    assert_eq!(first_group, expected);

    let second_group = reader.read_little_endian_group(39).unwrap();
    let expected: Vec<u8> = ids[96 ..].iter().flat_map(|id| id.to_le_bytes()).collect();
    assert_eq!(second_group, expected);
}

#[test_log::test]
fn compressors_receive_native_samples_and_smaller_results_are_kept() {
    let header = header(Compression::DWAA, 32);
    let ids: Vec<u32> = (7 .. 7 + 96).collect();
    let frame_buffer = FrameBuffer::new().with_slice("I", Slice::packed(ids.as_slice(), header.data_window));

    let options = WriteOptions::default()
        .with_worker_count(1)
        .with_compressor_factory(|_| Ok(Box::new(Fake { lines_per_group: 32, keep: Some(4), failing_group_y: None })));

    let mut bytes = Cursor::new(Vec::new());

    {
        let mut file = ScanLineOutputFile::new(&mut bytes, header, options).unwrap();
        file.set_frame_buffer(&frame_buffer).unwrap();
        file.write_pixels(32).unwrap();
    }

    let mut reader = RawChunkReader::new(Cursor::new(bytes.into_inner())).unwrap();
    assert_eq!(reader.read_raw_chunk(0).unwrap(), 7_u32.to_ne_bytes().to_vec());
}

#[test_log::test]
fn compressor_configuration_is_validated_on_open() {
    let mut bytes = Cursor::new(Vec::new());

    match ScanLineOutputFile::new(&mut bytes, header(Compression::PXR24, 4), write_options::sequential()) {
        Err(Error::NotSupported(message)) => assert!(message.contains("pxr24"), "{}", message),
        other => panic!("expected missing compressor, got {:?}", other.map(|_| ())),
    }

    let wrong_group_size = WriteOptions::default()
        .with_compressor_factory(|_| Ok(Box::new(Fake { lines_per_group: 1, keep: None, failing_group_y: None })));

    let error = ScanLineOutputFile::new(&mut bytes, header(Compression::ZIP16, 4), wrong_group_size).unwrap_err();
    assert!(error.is_configuration_error(), "{}", error);
}

#[test_log::test]
fn factory_replaces_built_in_compressors_but_not_uncompressed() {
    let calls = Arc::new(AtomicUsize::new(0));

    let options = {
        let calls = calls.clone();

        WriteOptions::default().with_worker_count(2).with_compressor_factory(move |header| {
            calls.fetch_add(1, Ordering::SeqCst);

            Ok(Box::new(Fake {
                lines_per_group: header.compression.scan_lines_per_block(),
                keep: None, failing_group_y: None,
            }))
        })
    };

    let mut bytes = Cursor::new(Vec::new());
    drop(ScanLineOutputFile::new(&mut bytes, header(Compression::Uncompressed, 4), options.clone()).unwrap());
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let mut bytes = Cursor::new(Vec::new());
    drop(ScanLineOutputFile::new(&mut bytes, header(Compression::RLE, 4), options).unwrap());
    assert_eq!(calls.load(Ordering::SeqCst), 4, "one compressor per line buffer");
}
