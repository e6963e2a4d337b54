//! The binary glTF container.
//!
//! ```text
//! header  magic "glTF" | version 2 | total length        (3 x u32 LE)
//! chunk   length | type "JSON" | payload padded with ' '
//! chunk   length | type "BIN\0" | payload padded with 0  (omitted if empty)
//! ```

const MAGIC: u32 = 0x4654_6C67;
const VERSION: u32 = 2;
const CHUNK_JSON: u32 = 0x4E4F_534A;
const CHUNK_BIN: u32 = 0x004E_4942;

/// Pad `bytes` with `fill` to a multiple of four.
pub(crate) fn pad_to_4(bytes: &mut Vec<u8>, fill: u8) {
    while bytes.len() % 4 != 0 {
        bytes.push(fill);
    }
}

/// Wrap a serialized glTF document and its binary buffer in a GLB container.
pub fn to_glb(json: &[u8], bin: &[u8]) -> Vec<u8> {
    let mut json = json.to_vec();
    pad_to_4(&mut json, b' ');
    let mut bin = bin.to_vec();
    pad_to_4(&mut bin, 0);

    let mut total = 12 + 8 + json.len();
    if !bin.is_empty() {
        total += 8 + bin.len();
    }

    let mut out = Vec::with_capacity(total);
    for word in [MAGIC, VERSION, total as u32] {
        out.extend_from_slice(&word.to_le_bytes());
    }
    write_chunk(&mut out, CHUNK_JSON, &json);
    if !bin.is_empty() {
        write_chunk(&mut out, CHUNK_BIN, &bin);
    }
    out
}

fn write_chunk(out: &mut Vec<u8>, kind: u32, payload: &[u8]) {
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&kind.to_le_bytes());
    out.extend_from_slice(payload);
}
