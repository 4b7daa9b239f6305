
//! Write the chunks of a scan line file and the table
//! that tells readers where each chunk starts.

use crate::error::*;
use crate::io::*;


/// Write one chunk at the current position and return the position where it starts.
///
/// The chunk consists of the part number (only in multi-part files),
/// the first scan line of the group, the byte count of the payload, and the payload.
/// The position cache is left empty if any write fails.
pub fn write_chunk<W: Write + Seek>(
    stream: &mut StreamState<W>, part_number: Option<usize>,
    group_start_y: i32, payload: &[u8]
) -> Result<u64>
{
    let start = stream.take_position()?;

    let mut chunk_header = Vec::with_capacity(3 * i32::BYTE_SIZE);

    if let Some(part_number) = part_number {
        usize_to_i32(part_number, "part number")?.write_le(&mut chunk_header)?;
    }

    group_start_y.write_le(&mut chunk_header)?;
    usize_to_i32(payload.len(), "chunk byte size")?.write_le(&mut chunk_header)?;

    stream.write_raw(&chunk_header)?;
    stream.write_raw(payload)?;

    let end = start + usize_to_u64(chunk_header.len() + payload.len());
    stream.restore_position(end);

    log::trace!("wrote chunk of line {} with {} bytes at byte {}", group_start_y, payload.len(), start);
    Ok(start)
}


/// The table of chunk positions that follows the headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetTable {

    /// The byte position of the first entry.
    pub position: u64,

    /// The number of entries, one per scan line group.
    pub entry_count: usize,
}

impl OffsetTable {

    /// Reserve the table at the current position, filled with zeroes.
    /// Leaves the position cache at the end of the table.
    pub fn write_placeholder<W: Write + Seek>(stream: &mut StreamState<W>, entry_count: usize) -> Result<Self> {
        let position = stream.take_position()?;
        let zeroes = vec![0_u8; entry_count * u64::BYTE_SIZE];

        stream.write_raw(&zeroes)?;
        stream.restore_position(position + usize_to_u64(zeroes.len()));

        Ok(OffsetTable { position, entry_count })
    }

    /// Overwrite the table with the final chunk positions,
    /// then move back to where the stream was before.
    pub fn patch<W: Write + Seek>(&self, stream: &mut StreamState<W>, offsets: &[u64]) -> UnitResult {
        if offsets.len() != self.entry_count {
            return Err(Error::logic("offset table size mismatch"));
        }

        let previous_position = stream.position()?;

        stream.seek_to(self.position)?;
        u64::write_slice_le(stream.uncached_writer(), offsets)?;
        stream.seek_to(previous_position)?;

        Ok(())
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn chunk_layout_with_and_without_part_number() {
        let mut stream = StreamState::new(Cursor::new(Vec::new()));

        assert_eq!(write_chunk(&mut stream, None, -3, &[7, 8]).unwrap(), 0);
        assert_eq!(write_chunk(&mut stream, Some(2), 16, &[9]).unwrap(), 10);
        assert_eq!(stream.cached_position(), Some(23));

        let bytes = stream.into_inner().into_inner();
        assert_eq!(bytes, vec![
            0xfd, 0xff, 0xff, 0xff,  2, 0, 0, 0,  7, 8,
            2, 0, 0, 0,  16, 0, 0, 0,  1, 0, 0, 0,  9,
        ]);
    }

    #[test]
    fn patched_table_keeps_the_stream_position() {
        let mut stream = StreamState::new(Cursor::new(Vec::new()));
        stream.write_raw(&[1, 2, 3]).unwrap();

        let table = OffsetTable::write_placeholder(&mut stream, 2).unwrap();
        assert_eq!(table.position, 3);

        write_chunk(&mut stream, None, 0, &[5]).unwrap();
        table.patch(&mut stream, &[19, 0x0102]).unwrap();

        assert_eq!(stream.query_position().unwrap(), 28);
        assert!(table.patch(&mut stream, &[1]).is_err());

        let bytes = stream.into_inner().into_inner();
        assert_eq!(&bytes[3 .. 19], &[19, 0, 0, 0, 0, 0, 0, 0,  2, 1, 0, 0, 0, 0, 0, 0]);
        assert_eq!(bytes.len(), 28);
    }
}
