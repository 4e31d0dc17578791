//! MP4/MOV (ISO base media) container parsing.
//!
//! Hand-rolled box walk over the in-memory payload, extracting only what the
//! conversion controller needs: presentation duration from `moov/mvhd` and
//! frame dimensions from `moov/trak/tkhd`.

use vidfit_core::{Error, Result};

use crate::prober::MetadataProber;
use crate::types::SourceMeta;

/// Pure-Rust prober for ISO-BMFF payloads (MP4, M4V, QuickTime MOV).
#[derive(Debug, Default)]
pub struct Mp4Prober;

impl Mp4Prober {
    pub fn new() -> Self {
        Self
    }
}

impl MetadataProber for Mp4Prober {
    fn name(&self) -> &'static str {
        "mp4"
    }

    fn probe(&self, bytes: &[u8], _declared_mime: &str) -> Result<SourceMeta> {
        let moov = find_box(bytes, b"moov")?
            .ok_or_else(|| Error::decode("no moov box in payload"))?;

        let mut meta = SourceMeta::unknown();

        if let Some(mvhd) = find_box(moov, b"mvhd")? {
            meta.duration_secs = parse_mvhd(mvhd)?;
        }

        // The video trak has nonzero tkhd dimensions; audio traks report
        // zeros. Keep the largest area seen.
        let mut offset = 0;
        while let Some((kind, payload, next)) = next_box(moov, offset)? {
            if &kind == b"trak" {
                if let Some(tkhd) = find_box(payload, b"tkhd")? {
                    let (w, h) = parse_tkhd(tkhd)?;
                    if u64::from(w) * u64::from(h)
                        > u64::from(meta.width) * u64::from(meta.height)
                    {
                        meta.width = w;
                        meta.height = h;
                    }
                }
            }
            offset = next;
        }

        Ok(meta)
    }

    fn supports(&self, bytes: &[u8], declared_mime: &str) -> bool {
        let mime = declared_mime.to_ascii_lowercase();
        if mime.contains("video/mp4") || mime.contains("quicktime") {
            return true;
        }
        // Sniff: an ftyp box at the start marks ISO-BMFF regardless of mime.
        bytes.len() >= 12 && &bytes[4..8] == b"ftyp"
    }
}

// ---------------------------------------------------------------------------
// Box walking
// ---------------------------------------------------------------------------

/// Read the box starting at `offset`, returning its type, payload, and the
/// offset of the following box. `None` at end of data.
fn next_box(data: &[u8], offset: usize) -> Result<Option<([u8; 4], &[u8], usize)>> {
    if offset == data.len() {
        return Ok(None);
    }
    if offset + 8 > data.len() {
        return Err(Error::decode("truncated box header"));
    }

    let size32 = read_u32(data, offset)? as u64;
    let mut kind = [0u8; 4];
    kind.copy_from_slice(&data[offset + 4..offset + 8]);

    let (header_len, total) = match size32 {
        // Box extends to the end of the enclosing container.
        0 => (8, (data.len() - offset) as u64),
        // 64-bit largesize follows the type field.
        1 => (16, read_u64(data, offset + 8)?),
        n => (8, n),
    };

    if total < header_len as u64 || offset as u64 + total > data.len() as u64 {
        return Err(Error::decode(format!(
            "box '{}' overruns payload",
            String::from_utf8_lossy(&kind)
        )));
    }

    let payload = &data[offset + header_len..offset + total as usize];
    Ok(Some((kind, payload, offset + total as usize)))
}

/// Find the first direct child box of the given type.
fn find_box<'a>(data: &'a [u8], wanted: &[u8; 4]) -> Result<Option<&'a [u8]>> {
    let mut offset = 0;
    while let Some((kind, payload, next)) = next_box(data, offset)? {
        if &kind == wanted {
            return Ok(Some(payload));
        }
        offset = next;
    }
    Ok(None)
}

/// Extract the presentation duration in seconds from an `mvhd` payload.
fn parse_mvhd(payload: &[u8]) -> Result<f64> {
    let version = *payload
        .first()
        .ok_or_else(|| Error::decode("empty mvhd box"))?;

    let (timescale, duration) = match version {
        0 => {
            // version/flags, creation, modification, then timescale/duration.
            let timescale = read_u32(payload, 12)?;
            let duration = read_u32(payload, 16)?;
            // All-ones means the duration is unknown.
            let duration = if duration == u32::MAX { 0 } else { duration };
            (timescale, u64::from(duration))
        }
        1 => {
            // 64-bit creation/modification times shift everything down.
            let timescale = read_u32(payload, 20)?;
            let duration = read_u64(payload, 24)?;
            let duration = if duration == u64::MAX { 0 } else { duration };
            (timescale, duration)
        }
        v => return Err(Error::decode(format!("unsupported mvhd version {v}"))),
    };

    if timescale == 0 {
        return Ok(0.0);
    }
    Ok(duration as f64 / f64::from(timescale))
}

/// Extract the track dimensions from a `tkhd` payload.
///
/// Width and height are stored as 16.16 fixed-point at the end of the box.
fn parse_tkhd(payload: &[u8]) -> Result<(u32, u32)> {
    let version = *payload
        .first()
        .ok_or_else(|| Error::decode("empty tkhd box"))?;

    let dims_offset = match version {
        0 => 76,
        1 => 88,
        v => return Err(Error::decode(format!("unsupported tkhd version {v}"))),
    };

    let width = read_u32(payload, dims_offset)? >> 16;
    let height = read_u32(payload, dims_offset + 4)? >> 16;
    Ok((width, height))
}

fn read_u32(data: &[u8], offset: usize) -> Result<u32> {
    let bytes: [u8; 4] = data
        .get(offset..offset + 4)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| Error::decode("truncated field"))?;
    Ok(u32::from_be_bytes(bytes))
}

fn read_u64(data: &[u8], offset: usize) -> Result<u64> {
    let bytes: [u8; 8] = data
        .get(offset..offset + 8)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| Error::decode("truncated field"))?;
    Ok(u64::from_be_bytes(bytes))
}
