
// see https://github.com/openexr/openexr/blob/master/OpenEXR/IlmImf/ImfZip.cpp

use super::*;
use super::optimize_bytes::*;
use zune_inflate::{DeflateDecoder, DeflateOptions};


/// Inflate a zlib stream and undo the byte separation and the delta prediction.
/// The result is in little endian byte order.
pub fn decompress_bytes(compressed: Bytes<'_>, expected_byte_size: usize) -> Result<ByteVec> {
    let options = DeflateOptions::default()
        .set_limit(expected_byte_size)
        .set_size_hint(expected_byte_size);

    let mut decompressed = DeflateDecoder::new_with_options(compressed, options)
        .decode_zlib()
        .map_err(|_| Error::invalid("zlib-compressed data malformed"))?;

    differences_to_samples(&mut decompressed);
    interleave_byte_blocks(&mut decompressed);
    Ok(decompressed)
}

/// Expects the samples in little endian byte order.
pub fn compress_bytes(mut little_endian: ByteVec) -> Result<ByteVec> {
    separate_bytes_fragments(&mut little_endian);
    samples_to_differences(&mut little_endian);

    Ok(miniz_oxide::deflate::compress_to_vec_zlib(little_endian.as_slice(), 4))
}


#[cfg(test)]
mod test {

    #[test]
    fn roundtrip(){
        let data: Vec<u8> = (0 .. 600_u32).map(|index| (index % 7 * index / 13) as u8).collect();
        let compressed = super::compress_bytes(data.clone()).unwrap();
        assert!(compressed.len() < data.len());

        let decompressed = super::decompress_bytes(&compressed, data.len()).unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn malformed_stream(){
        assert!(super::decompress_bytes(&[1, 2, 3, 4], 16).is_err());
    }
}
