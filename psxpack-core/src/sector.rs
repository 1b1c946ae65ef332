//! Raw sector codec for CD-ROM XA Mode 2.
//!
//! A data sector is laid out as
//! `sync[12] | header[4] | subheader[8] | payload | EDC | ECC`,
//! where Form 1 carries 2048 payload bytes plus 4 EDC and 276 ECC bytes,
//! and Form 2 carries 2324 payload bytes plus 4 optional EDC bytes.
//! Audio sectors are 2352 raw bytes with no structure at all.

use crc::{CRC_32_CD_ROM_EDC, Crc};

use crate::error::DiscError;
use crate::msf::Msf;
use crate::{M2F2_PAYLOAD_SIZE, RAW_SECTOR_SIZE};

/// Sync pattern at the start of every raw data sector.
pub const SYNC_PATTERN: [u8; 12] = [
    0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x00,
];

// Submode bits of XA subheader byte 2.
pub const SM_EOR: u8 = 0x01;
pub const SM_VIDEO: u8 = 0x02;
pub const SM_AUDIO: u8 = 0x04;
pub const SM_DATA: u8 = 0x08;
pub const SM_TRIGGER: u8 = 0x10;
pub const SM_FORM2: u8 = 0x20;
pub const SM_REALTIME: u8 = 0x40;
pub const SM_EOF: u8 = 0x80;

// Byte windows within the raw sector.
const HEADER_OFFSET: usize = 12;
const SUBHEADER_OFFSET: usize = 16;
const PAYLOAD_OFFSET: usize = 24;
const FORM1_EDC_OFFSET: usize = 2072;
const ECC_P_OFFSET: usize = 2076;
const ECC_Q_OFFSET: usize = 2248;
const FORM2_EDC_OFFSET: usize = 2348;

const EDC: Crc<u32> = Crc::<u32>::new(&CRC_32_CD_ROM_EDC);

/// The two payload forms a Mode 2 sector can take, advertised by submode
/// bit 5 of the subheader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XaForm {
    /// 2048 payload bytes, EDC and ECC.
    Form1,
    /// 2324 payload bytes, EDC only (often zeroed in shipped images).
    Form2,
}

impl XaForm {
    /// Payload bytes per sector of this form.
    pub fn payload_size(self) -> usize {
        match self {
            Self::Form1 => 2048,
            Self::Form2 => M2F2_PAYLOAD_SIZE,
        }
    }
}

/// The four XA subheader fields. On disc they are stored twice, in bytes
/// 16..20 and again in 20..24.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Subheader {
    pub file_number: u8,
    pub channel: u8,
    pub submode: u8,
    pub coding: u8,
}

impl Subheader {
    /// Subheader of the empty Form 2 sectors used in allocation gaps and
    /// type 2/3 postgaps: `00 00 20 00 00 00 20 00`.
    pub const EMPTY_FORM2: Self = Self {
        file_number: 0,
        channel: 0,
        submode: SM_FORM2,
        coding: 0,
    };

    pub fn new(file_number: u8, channel: u8, submode: u8, coding: u8) -> Self {
        Self {
            file_number,
            channel,
            submode,
            coding,
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            file_number: bytes[0],
            channel: bytes[1],
            submode: bytes[2],
            coding: bytes[3],
        }
    }

    pub fn to_bytes(self) -> [u8; 8] {
        [
            self.file_number,
            self.channel,
            self.submode,
            self.coding,
            self.file_number,
            self.channel,
            self.submode,
            self.coding,
        ]
    }

    pub fn form(self) -> XaForm {
        if self.submode & SM_FORM2 != 0 {
            XaForm::Form2
        } else {
            XaForm::Form1
        }
    }
}

/// Whether the Form 2 EDC field is computed or forced to zero (the
/// convention for streamed audio/video payloads).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdcPolicy {
    Compute,
    Zero,
}

/// Encode one Mode 2 data sector into `dst`.
///
/// The payload may be shorter than the form's capacity; the remainder is
/// zero-filled. The `Zero` EDC policy only applies when the subheader
/// actually marks the sector as Form 2.
pub fn encode_mode2(
    dst: &mut [u8; RAW_SECTOR_SIZE],
    payload: &[u8],
    lbn: u32,
    subheader: Subheader,
    edc_policy: EdcPolicy,
) {
    dst.fill(0);
    dst[..12].copy_from_slice(&SYNC_PATTERN);

    let bcd = Msf::from_lbn(lbn).to_bcd();
    dst[HEADER_OFFSET..HEADER_OFFSET + 3].copy_from_slice(&bcd);
    dst[HEADER_OFFSET + 3] = 2;

    dst[SUBHEADER_OFFSET..SUBHEADER_OFFSET + 8].copy_from_slice(&subheader.to_bytes());

    let form = subheader.form();
    let n = payload.len().min(form.payload_size());
    dst[PAYLOAD_OFFSET..PAYLOAD_OFFSET + n].copy_from_slice(&payload[..n]);

    match form {
        XaForm::Form1 => {
            let edc = EDC.checksum(&dst[SUBHEADER_OFFSET..FORM1_EDC_OFFSET]);
            dst[FORM1_EDC_OFFSET..FORM1_EDC_OFFSET + 4].copy_from_slice(&edc.to_le_bytes());
            generate_ecc(dst);
        }
        XaForm::Form2 => {
            if edc_policy == EdcPolicy::Compute {
                let edc = EDC.checksum(&dst[SUBHEADER_OFFSET..FORM2_EDC_OFFSET]);
                dst[FORM2_EDC_OFFSET..].copy_from_slice(&edc.to_le_bytes());
            }
        }
    }
}

/// A decoded view of one Mode 2 data sector.
#[derive(Debug)]
pub struct DecodedSector<'a> {
    pub subheader: Subheader,
    pub form: XaForm,
    pub payload: &'a [u8],
    /// True when the stored EDC matches the payload. A zeroed Form 2 EDC
    /// field reports false here.
    pub edc_ok: bool,
}

/// Decode one Mode 2 data sector, validating sync and mode.
pub fn decode_mode2(src: &[u8; RAW_SECTOR_SIZE]) -> Result<DecodedSector<'_>, DiscError> {
    if src[..12] != SYNC_PATTERN {
        return Err(DiscError::invalid_format("missing sector sync pattern"));
    }
    if src[15] != 2 {
        return Err(DiscError::invalid_format(format!(
            "expected mode 2 sector, got mode {}",
            src[15]
        )));
    }

    let subheader = Subheader::from_bytes(&src[SUBHEADER_OFFSET..]);
    let form = subheader.form();
    let (payload, edc_ok) = match form {
        XaForm::Form1 => {
            let stored = read_u32_le(src, FORM1_EDC_OFFSET);
            let computed = EDC.checksum(&src[SUBHEADER_OFFSET..FORM1_EDC_OFFSET]);
            (&src[PAYLOAD_OFFSET..PAYLOAD_OFFSET + 2048], stored == computed)
        }
        XaForm::Form2 => {
            let stored = read_u32_le(src, FORM2_EDC_OFFSET);
            let computed = EDC.checksum(&src[SUBHEADER_OFFSET..FORM2_EDC_OFFSET]);
            (
                &src[PAYLOAD_OFFSET..PAYLOAD_OFFSET + M2F2_PAYLOAD_SIZE],
                stored == computed,
            )
        }
    };

    Ok(DecodedSector {
        subheader,
        form,
        payload,
        edc_ok,
    })
}

/// Encode the empty Form 2 sector written into allocation gaps.
pub fn encode_empty_form2(dst: &mut [u8; RAW_SECTOR_SIZE], lbn: u32, edc_policy: EdcPolicy) {
    encode_mode2(dst, &[], lbn, Subheader::EMPTY_FORM2, edc_policy);
    if edc_policy == EdcPolicy::Zero {
        dst[FORM2_EDC_OFFSET..].fill(0);
    }
}

/// Encode the fully blank sector used for type 1 postgaps: valid sync and
/// header, everything after zeroed. Encoding a zero Form 1 payload with a
/// zero subheader yields zero EDC and parity, so no special case is needed.
pub fn encode_empty(dst: &mut [u8; RAW_SECTOR_SIZE], lbn: u32) {
    encode_mode2(dst, &[], lbn, Subheader::default(), EdcPolicy::Compute);
}

fn read_u32_le(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

// ---------------------------------------------------------------------------
// Postgap classification
// ---------------------------------------------------------------------------

/// What the last sector of the data track looks like. Determines how the
/// postgap is regenerated on rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostgapKind {
    /// Unrecognized pattern; the raw sector is preserved and re-inserted.
    Raw,
    /// Sync and header only, everything else zero.
    Empty,
    /// Empty Form 2 subheader (`00 00 20 00 00 00 20 00`), zero payload
    /// and zero EDC field.
    EmptyForm2,
    /// As `EmptyForm2` but with a computed EDC in the last four bytes.
    EmptyForm2WithEdc,
}

impl PostgapKind {
    /// Numeric code stored in the catalog (`track1_postgap_type`).
    pub fn code(self) -> u8 {
        match self {
            Self::Raw => 0,
            Self::Empty => 1,
            Self::EmptyForm2 => 2,
            Self::EmptyForm2WithEdc => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Raw),
            1 => Some(Self::Empty),
            2 => Some(Self::EmptyForm2),
            3 => Some(Self::EmptyForm2WithEdc),
            _ => None,
        }
    }
}

/// Classify the last data-track sector into a postgap kind.
pub fn classify_postgap(sector: &[u8; RAW_SECTOR_SIZE]) -> PostgapKind {
    if sector[..12] != SYNC_PATTERN {
        return PostgapKind::Raw;
    }

    let subheader = &sector[SUBHEADER_OFFSET..PAYLOAD_OFFSET];
    let payload_zero = sector[PAYLOAD_OFFSET..FORM2_EDC_OFFSET].iter().all(|&b| b == 0);
    let edc_zero = sector[FORM2_EDC_OFFSET..].iter().all(|&b| b == 0);

    if subheader.iter().all(|&b| b == 0) && payload_zero && edc_zero {
        return PostgapKind::Empty;
    }

    if subheader == Subheader::EMPTY_FORM2.to_bytes() && payload_zero {
        return if edc_zero {
            PostgapKind::EmptyForm2
        } else {
            PostgapKind::EmptyForm2WithEdc
        };
    }

    PostgapKind::Raw
}

// ---------------------------------------------------------------------------
// Reed-Solomon P/Q parity (ECMA-130 annex A)
// ---------------------------------------------------------------------------

// GF(2^8) with primitive polynomial x^8 + x^4 + x^3 + x^2 + 1. F maps x to
// 2x, B inverts x ^ 2x.
const GF8_LUTS: ([u8; 256], [u8; 256]) = build_gf8_luts();

const fn build_gf8_luts() -> ([u8; 256], [u8; 256]) {
    let mut f = [0u8; 256];
    let mut b = [0u8; 256];
    let mut i = 0usize;
    while i < 256 {
        let j = ((i << 1) ^ if i & 0x80 != 0 { 0x11D } else { 0 }) as u8;
        f[i] = j;
        b[(i as u8 ^ j) as usize] = i as u8;
        i += 1;
    }
    (f, b)
}

fn ecc_compute_block(
    src: &[u8],
    major_count: usize,
    minor_count: usize,
    major_mult: usize,
    minor_inc: usize,
    dest: &mut [u8],
) {
    let (f_lut, b_lut) = (&GF8_LUTS.0, &GF8_LUTS.1);
    let size = major_count * minor_count;

    for major in 0..major_count {
        let mut index = (major >> 1) * major_mult + (major & 1);
        let mut ecc_a = 0u8;
        let mut ecc_b = 0u8;

        for _ in 0..minor_count {
            let temp = src[index];
            index += minor_inc;
            if index >= size {
                index -= size;
            }
            ecc_a ^= temp;
            ecc_b ^= temp;
            ecc_a = f_lut[ecc_a as usize];
        }

        ecc_a = b_lut[(f_lut[ecc_a as usize] ^ ecc_b) as usize];
        dest[major] = ecc_a;
        dest[major + major_count] = ecc_a ^ ecc_b;
    }
}

/// Compute P and Q parity over bytes 12..2076 into 2076..2352. For Mode 2
/// the four header bytes take part as zeroes.
fn generate_ecc(sector: &mut [u8; RAW_SECTOR_SIZE]) {
    let mut header = [0u8; 4];
    header.copy_from_slice(&sector[HEADER_OFFSET..HEADER_OFFSET + 4]);
    sector[HEADER_OFFSET..HEADER_OFFSET + 4].fill(0);

    let mut p = [0u8; 172];
    let mut q = [0u8; 104];
    ecc_compute_block(&sector[HEADER_OFFSET..], 86, 24, 2, 86, &mut p);
    sector[ECC_P_OFFSET..ECC_P_OFFSET + 172].copy_from_slice(&p);
    ecc_compute_block(&sector[HEADER_OFFSET..], 52, 43, 86, 88, &mut q);
    sector[ECC_Q_OFFSET..ECC_Q_OFFSET + 104].copy_from_slice(&q);

    sector[HEADER_OFFSET..HEADER_OFFSET + 4].copy_from_slice(&header);
}

#[cfg(test)]
#[path = "tests/sector_tests.rs"]
mod tests;
