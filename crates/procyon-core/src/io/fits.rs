use std::fs::File;
use std::io::Write;
use std::path::Path;

use byteorder::{BigEndian, ByteOrder};
use memmap2::Mmap;
use ndarray::Array2;

use crate::error::{ProcyonError, Result};

/// FITS block and card sizes are fixed by the standard.
pub const FITS_BLOCK_SIZE: usize = 2880;
pub const FITS_CARD_SIZE: usize = 80;

/// Typed value of one header card.
#[derive(Clone, Debug, PartialEq)]
pub enum CardValue {
    Logical(bool),
    Integer(i64),
    Real(f64),
    Text(String),
}

/// Primary-HDU header: keyword cards in file order.
#[derive(Clone, Debug, Default)]
pub struct FitsHeader {
    cards: Vec<(String, CardValue)>,
}

impl FitsHeader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&CardValue> {
        self.cards.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        match self.get(key)? {
            CardValue::Real(v) => Some(*v),
            CardValue::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        match self.get(key)? {
            CardValue::Integer(v) => Some(*v),
            CardValue::Real(v) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.get(key)? {
            CardValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Append or replace a card.
    pub fn set(&mut self, key: &str, value: CardValue) {
        if let Some(slot) = self.cards.iter_mut().find(|(k, _)| k == key) {
            slot.1 = value;
        } else {
            self.cards.push((key.to_string(), value));
        }
    }

    pub fn set_f64(&mut self, key: &str, value: f64) {
        self.set(key, CardValue::Real(value));
    }

    pub fn set_str(&mut self, key: &str, value: &str) {
        self.set(key, CardValue::Text(value.to_string()));
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, CardValue)> {
        self.cards.iter()
    }
}

/// Read the primary HDU of a FITS file as a 2-D f32 image.
///
/// Supports BITPIX 16 (with the BZERO/BSCALE unsigned convention) and -32.
/// Data is big-endian per the standard.
pub fn read_image(path: &Path) -> Result<(Array2<f32>, FitsHeader)> {
    let file = File::open(path)?;
    let mmap = unsafe { Mmap::map(&file)? };

    if mmap.len() < FITS_BLOCK_SIZE {
        return Err(ProcyonError::InvalidFits(
            "file too small for a FITS header block".into(),
        ));
    }

    let (header, data_offset) = parse_header(&mmap)?;

    if !matches!(header.get("SIMPLE"), Some(CardValue::Logical(true))) {
        return Err(ProcyonError::InvalidFits("missing SIMPLE = T card".into()));
    }

    let bitpix = header
        .get_i64("BITPIX")
        .ok_or_else(|| ProcyonError::InvalidFits("missing BITPIX".into()))?;
    let naxis = header.get_i64("NAXIS").unwrap_or(0);
    if naxis != 2 {
        return Err(ProcyonError::InvalidFits(format!(
            "expected NAXIS = 2, got {naxis}"
        )));
    }
    let width = header
        .get_i64("NAXIS1")
        .ok_or_else(|| ProcyonError::InvalidFits("missing NAXIS1".into()))? as usize;
    let height = header
        .get_i64("NAXIS2")
        .ok_or_else(|| ProcyonError::InvalidFits("missing NAXIS2".into()))? as usize;
    if width == 0 || height == 0 {
        return Err(ProcyonError::InvalidDimensions { width, height });
    }

    let bzero = header.get_f64("BZERO").unwrap_or(0.0) as f32;
    let bscale = header.get_f64("BSCALE").unwrap_or(1.0) as f32;

    let pixels = width * height;
    let bytes_per_pixel = (bitpix.unsigned_abs() / 8) as usize;
    let data_end = data_offset + pixels * bytes_per_pixel;
    if mmap.len() < data_end {
        return Err(ProcyonError::InvalidFits(format!(
            "file truncated: need {} bytes, got {}",
            data_end,
            mmap.len()
        )));
    }
    let raw = &mmap[data_offset..data_end];

    let mut data = Array2::<f32>::zeros((height, width));
    let flat = data
        .as_slice_mut()
        .expect("freshly allocated array is contiguous");

    match bitpix {
        16 => {
            let mut samples = vec![0i16; pixels];
            BigEndian::read_i16_into(raw, &mut samples);
            for (dst, &s) in flat.iter_mut().zip(samples.iter()) {
                *dst = bzero + bscale * s as f32;
            }
        }
        -32 => {
            BigEndian::read_f32_into(raw, flat);
            if bzero != 0.0 || bscale != 1.0 {
                for dst in flat.iter_mut() {
                    *dst = bzero + bscale * *dst;
                }
            }
        }
        other => {
            return Err(ProcyonError::InvalidFits(format!(
                "unsupported BITPIX {other}"
            )))
        }
    }

    Ok((data, header))
}

/// Read only the header of a FITS file.
pub fn read_header(path: &Path) -> Result<FitsHeader> {
    let file = File::open(path)?;
    let mmap = unsafe { Mmap::map(&file)? };
    if mmap.len() < FITS_BLOCK_SIZE {
        return Err(ProcyonError::InvalidFits(
            "file too small for a FITS header block".into(),
        ));
    }
    let (header, _) = parse_header(&mmap)?;
    Ok(header)
}

/// Write a 2-D f32 image as a minimal BITPIX -32 primary HDU.
///
/// `extra` cards (WCS solution, observation metadata) are appended after the
/// mandatory ones.
pub fn write_image(path: &Path, data: &Array2<f32>, extra: &FitsHeader) -> Result<()> {
    let (height, width) = data.dim();
    let mut cards: Vec<String> = Vec::new();

    cards.push(format_card("SIMPLE", &CardValue::Logical(true)));
    cards.push(format_card("BITPIX", &CardValue::Integer(-32)));
    cards.push(format_card("NAXIS", &CardValue::Integer(2)));
    cards.push(format_card("NAXIS1", &CardValue::Integer(width as i64)));
    cards.push(format_card("NAXIS2", &CardValue::Integer(height as i64)));
    for (key, value) in extra.iter() {
        cards.push(format_card(key, value));
    }
    cards.push(format!("{:<80}", "END"));

    let mut header_bytes: Vec<u8> = cards.concat().into_bytes();
    pad_to_block(&mut header_bytes, b' ');

    let mut data_bytes = vec![0u8; data.len() * 4];
    let flat: Vec<f32> = data.iter().copied().collect();
    BigEndian::write_f32_into(&flat, &mut data_bytes);
    pad_to_block(&mut data_bytes, 0u8);

    let mut file = File::create(path)?;
    file.write_all(&header_bytes)?;
    file.write_all(&data_bytes)?;
    Ok(())
}

fn pad_to_block(bytes: &mut Vec<u8>, fill: u8) {
    let rem = bytes.len() % FITS_BLOCK_SIZE;
    if rem != 0 {
        bytes.resize(bytes.len() + FITS_BLOCK_SIZE - rem, fill);
    }
}

fn format_card(key: &str, value: &CardValue) -> String {
    let body = match value {
        CardValue::Logical(true) => format!("{key:<8}= {:>20}", "T"),
        CardValue::Logical(false) => format!("{key:<8}= {:>20}", "F"),
        CardValue::Integer(v) => format!("{key:<8}= {v:>20}"),
        CardValue::Real(v) => format!("{key:<8}= {:>20}", format_real(*v)),
        CardValue::Text(s) => format!("{key:<8}= '{s}'"),
    };
    format!("{body:<80}")
}

/// FITS real values must carry a decimal point or exponent.
fn format_real(v: f64) -> String {
    format!("{v:.12E}")
}

fn parse_header(mmap: &[u8]) -> Result<(FitsHeader, usize)> {
    let mut header = FitsHeader::new();
    let mut offset = 0usize;

    loop {
        if offset + FITS_CARD_SIZE > mmap.len() {
            return Err(ProcyonError::InvalidFits("header missing END card".into()));
        }
        let card = &mmap[offset..offset + FITS_CARD_SIZE];
        offset += FITS_CARD_SIZE;

        let key = std::str::from_utf8(&card[0..8])
            .map_err(|_| ProcyonError::InvalidFits("non-ASCII header card".into()))?
            .trim_end()
            .to_string();

        if key == "END" {
            break;
        }
        if key.is_empty() || key == "COMMENT" || key == "HISTORY" {
            continue;
        }
        // Value indicator: bytes 8..10 must be "= "
        if &card[8..10] != b"= " {
            continue;
        }
        let raw_value = std::str::from_utf8(&card[10..])
            .map_err(|_| ProcyonError::InvalidFits("non-ASCII header value".into()))?;
        if let Some(value) = parse_value(raw_value) {
            header.set(&key, value);
        }
    }

    // Data begins at the next 2880-byte boundary after END.
    let data_offset = offset.div_ceil(FITS_BLOCK_SIZE) * FITS_BLOCK_SIZE;
    Ok((header, data_offset))
}

fn parse_value(raw: &str) -> Option<CardValue> {
    // Strip inline comment (outside of quoted strings).
    let trimmed = raw.trim();
    if let Some(rest) = trimmed.strip_prefix('\'') {
        let end = rest.find('\'')?;
        return Some(CardValue::Text(rest[..end].trim_end().to_string()));
    }
    let value_part = match trimmed.find('/') {
        Some(pos) => trimmed[..pos].trim(),
        None => trimmed,
    };
    match value_part {
        "T" => Some(CardValue::Logical(true)),
        "F" => Some(CardValue::Logical(false)),
        "" => None,
        v => {
            if let Ok(i) = v.parse::<i64>() {
                Some(CardValue::Integer(i))
            } else {
                v.parse::<f64>().ok().map(CardValue::Real)
            }
        }
    }
}
