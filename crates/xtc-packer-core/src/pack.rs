use crate::error::{Result, XtcError};
use image::GrayImage;
use md5::{Digest, Md5};

/// Per-page chunk magics.
pub const XTG_MAGIC: [u8; 4] = *b"XTG\0";
pub const XTH_MAGIC: [u8; 4] = *b"XTH\0";

/// Chunk header length in bytes.
pub const CHUNK_HEADER_LEN: usize = 22;

/// Gray levels for the four 2-bit bands, indexed by band value
/// (0 = white .. 3 = black).
const XTH_LEVELS: [u8; 4] = [255, 170, 85, 0];

/// Parsed 22-byte chunk header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub two_bit: bool,
    pub width: u16,
    pub height: u16,
    pub color_mode: u8,
    pub compression: u8,
    pub payload_len: u32,
    pub digest: [u8; 8],
}

/// Full chunk length (header + payload) for a page of the given
/// dimensions.
pub fn packed_page_size(w: u32, h: u32, two_bit: bool) -> usize {
    let payload = if two_bit {
        2 * h.div_ceil(8) as usize * w as usize
    } else {
        w.div_ceil(8) as usize * h as usize
    };
    CHUNK_HEADER_LEN + payload
}

/// Pack a quantized grayscale page into a chunk (22-byte header followed
/// by the packed payload).
pub fn pack_page(img: &GrayImage, two_bit: bool) -> Vec<u8> {
    let payload = if two_bit {
        pack_xth_payload(img)
    } else {
        pack_xtg_payload(img)
    };

    let (w, h) = img.dimensions();
    let mut chunk = Vec::with_capacity(CHUNK_HEADER_LEN + payload.len());
    chunk.extend_from_slice(if two_bit { &XTH_MAGIC } else { &XTG_MAGIC });
    chunk.extend_from_slice(&(w as u16).to_le_bytes());
    chunk.extend_from_slice(&(h as u16).to_le_bytes());
    chunk.push(0); // color mode
    chunk.push(0); // compression
    chunk.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    let digest = Md5::digest(&payload);
    chunk.extend_from_slice(&digest[..8]);
    chunk.extend_from_slice(&payload);
    chunk
}

/// 1-bit row-major payload: `ceil(w/8)` bytes per row, MSB-first, bit set
/// means white (gray >= 128).
fn pack_xtg_payload(img: &GrayImage) -> Vec<u8> {
    let (w, h) = img.dimensions();
    let row_bytes = w.div_ceil(8) as usize;
    let mut payload = vec![0u8; row_bytes * h as usize];
    for y in 0..h {
        let row = y as usize * row_bytes;
        for x in 0..w {
            if img.get_pixel(x, y)[0] >= 128 {
                payload[row + (x >> 3) as usize] |= 1 << (7 - (x & 7));
            }
        }
    }
    payload
}

/// 2-bit planar payload: two bit-planes of `ceil(h/8) * w` bytes each,
/// columns written right-to-left, vertical bits MSB-first. Plane 0 holds
/// bit 0 of the band value, plane 1 holds bit 1.
fn pack_xth_payload(img: &GrayImage) -> Vec<u8> {
    let (w, h) = img.dimensions();
    let col_bytes = h.div_ceil(8) as usize;
    let plane_len = col_bytes * w as usize;
    let mut payload = vec![0u8; 2 * plane_len];
    for x in 0..w {
        let col_offset = (w - 1 - x) as usize * col_bytes;
        for y in 0..h {
            let band = xth_band(img.get_pixel(x, y)[0]);
            let byte = col_offset + (y >> 3) as usize;
            let bit = 1u8 << (7 - (y & 7));
            if band & 1 != 0 {
                payload[byte] |= bit;
            }
            if band & 2 != 0 {
                payload[plane_len + byte] |= bit;
            }
        }
    }
    payload
}

/// Band value for a gray level: 0 white, 1 light, 2 dark, 3 black.
#[inline]
fn xth_band(gray: u8) -> u8 {
    if gray >= 212 {
        0
    } else if gray >= 127 {
        1
    } else if gray >= 42 {
        2
    } else {
        3
    }
}

/// Parse and validate a 22-byte chunk header.
pub fn parse_chunk_header(bytes: &[u8]) -> Result<ChunkHeader> {
    if bytes.len() < CHUNK_HEADER_LEN {
        return Err(XtcError::MalformedChunk(format!(
            "truncated header ({} bytes)",
            bytes.len()
        )));
    }
    let two_bit = match &bytes[0..4] {
        [b'X', b'T', b'G', 0x00] => false,
        [b'X', b'T', b'H', 0x00] => true,
        magic => {
            return Err(XtcError::MalformedChunk(format!(
                "unknown chunk magic {magic:02x?}"
            )))
        }
    };
    let width = u16::from_le_bytes([bytes[4], bytes[5]]);
    let height = u16::from_le_bytes([bytes[6], bytes[7]]);
    let payload_len = u32::from_le_bytes([bytes[10], bytes[11], bytes[12], bytes[13]]);
    let mut digest = [0u8; 8];
    digest.copy_from_slice(&bytes[14..22]);

    let expected = packed_page_size(width as u32, height as u32, two_bit) - CHUNK_HEADER_LEN;
    if payload_len as usize != expected {
        return Err(XtcError::MalformedChunk(format!(
            "payload length {payload_len} does not match {width}x{height} ({expected} expected)"
        )));
    }

    Ok(ChunkHeader {
        two_bit,
        width,
        height,
        color_mode: bytes[8],
        compression: bytes[9],
        payload_len,
        digest,
    })
}

/// Decode a full chunk back into the quantized grayscale page that
/// entered the packer.
pub fn unpack_page(chunk: &[u8]) -> Result<GrayImage> {
    let header = parse_chunk_header(chunk)?;
    let payload = &chunk[CHUNK_HEADER_LEN..];
    if payload.len() != header.payload_len as usize {
        return Err(XtcError::MalformedChunk(format!(
            "chunk length {} does not match declared payload {}",
            payload.len(),
            header.payload_len
        )));
    }

    let w = header.width as u32;
    let h = header.height as u32;
    let mut img = GrayImage::new(w, h);
    if header.two_bit {
        let col_bytes = h.div_ceil(8) as usize;
        let plane_len = col_bytes * w as usize;
        for x in 0..w {
            let col_offset = (w - 1 - x) as usize * col_bytes;
            for y in 0..h {
                let byte = col_offset + (y >> 3) as usize;
                let bit = 7 - (y & 7);
                let b0 = (payload[byte] >> bit) & 1;
                let b1 = (payload[plane_len + byte] >> bit) & 1;
                let band = (b0 | (b1 << 1)) as usize;
                img.put_pixel(x, y, image::Luma([XTH_LEVELS[band]]));
            }
        }
    } else {
        let row_bytes = w.div_ceil(8) as usize;
        for y in 0..h {
            let row = y as usize * row_bytes;
            for x in 0..w {
                let bit = (payload[row + (x >> 3) as usize] >> (7 - (x & 7))) & 1;
                let gray = if bit != 0 { 255 } else { 0 };
                img.put_pixel(x, y, image::Luma([gray]));
            }
        }
    }
    Ok(img)
}
