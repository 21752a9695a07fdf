//! Declared pixel density, read from the JPEG JFIF header or the PNG `pHYs`
//! chunk, normalized to dots per inch.

/// Density used when a page declares none or an invalid one (72 DPI).
pub const DEFAULT_DPI: u16 = 72;

const JFIF_UNIT_DPI: u8 = 1;
const JFIF_UNIT_DPCM: u8 = 2;
const PNG_UNIT_METER: u8 = 1;
const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];

/// Horizontal and vertical density in DPI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dpi {
    pub x: u16,
    pub y: u16,
}

impl Dpi {
    #[must_use]
    pub const fn uniform(dpi: u16) -> Self {
        Self { x: dpi, y: dpi }
    }

    /// True when both axes are positive.
    #[must_use]
    pub fn is_valid(self) -> bool {
        self.x > 0 && self.y > 0
    }
}

/// Raw density as stored in the file, before validation.
#[derive(Debug, Clone, Copy, PartialEq)]
enum RawDensity {
    PerInch(f64, f64),
    Unitless,
}

/// The density an emitted page carries: the declared one when it is valid,
/// otherwise `default_dpi` (itself replaced by [`DEFAULT_DPI`] if zero).
#[must_use]
pub fn effective_density(bytes: &[u8], default_dpi: u16) -> Dpi {
    let fallback = Dpi::uniform(if default_dpi == 0 { DEFAULT_DPI } else { default_dpi });
    declared_density(bytes)
        .filter(|d| d.is_valid())
        .unwrap_or(fallback)
}

/// Declared density in DPI, or `None` when absent, unitless or out of range.
#[must_use]
pub fn declared_density(bytes: &[u8]) -> Option<Dpi> {
    let raw = if bytes.starts_with(&[0xFF, 0xD8]) {
        read_jfif_density(bytes)?
    } else if bytes.starts_with(&PNG_SIGNATURE) {
        read_png_density(bytes)?
    } else {
        return None;
    };

    match raw {
        RawDensity::PerInch(x, y) => Some(Dpi {
            x: to_dpi(x)?,
            y: to_dpi(y)?,
        }),
        RawDensity::Unitless => None,
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_dpi(value: f64) -> Option<u16> {
    let rounded = value.round();
    if rounded.is_finite() && rounded >= 0.0 && rounded <= f64::from(u16::MAX) {
        Some(rounded as u16)
    } else {
        None
    }
}

fn read_u16_be(bytes: &[u8], at: usize) -> Option<u16> {
    Some(u16::from_be_bytes([*bytes.get(at)?, *bytes.get(at + 1)?]))
}

fn read_u32_be(bytes: &[u8], at: usize) -> Option<u32> {
    let slice = bytes.get(at..at + 4)?;
    Some(u32::from_be_bytes([slice[0], slice[1], slice[2], slice[3]]))
}

/// Walks JPEG marker segments up to start-of-scan looking for APP0/JFIF.
fn read_jfif_density(bytes: &[u8]) -> Option<RawDensity> {
    let mut pos = 2;
    while pos + 4 <= bytes.len() {
        if bytes[pos] != 0xFF {
            return None;
        }
        let marker = bytes[pos + 1];
        // start of scan: no more header segments
        if marker == 0xDA {
            return None;
        }
        let length = usize::from(read_u16_be(bytes, pos + 2)?);
        let segment = bytes.get(pos + 4..pos + 2 + length)?;

        if marker == 0xE0 && segment.starts_with(b"JFIF\0") && segment.len() >= 12 {
            let unit = segment[7];
            let x = f64::from(read_u16_be(segment, 8)?);
            let y = f64::from(read_u16_be(segment, 10)?);
            return Some(match unit {
                JFIF_UNIT_DPI => RawDensity::PerInch(x, y),
                JFIF_UNIT_DPCM => RawDensity::PerInch(x * 2.54, y * 2.54),
                _ => RawDensity::Unitless,
            });
        }
        pos += 2 + length;
    }
    None
}

/// Walks PNG chunks up to the first `IDAT` looking for `pHYs`.
fn read_png_density(bytes: &[u8]) -> Option<RawDensity> {
    let mut pos = PNG_SIGNATURE.len();
    while pos + 8 <= bytes.len() {
        let length = read_u32_be(bytes, pos)? as usize;
        let chunk_type = bytes.get(pos + 4..pos + 8)?;
        if chunk_type == b"IDAT" {
            return None;
        }
        if chunk_type == b"pHYs" && length >= 9 {
            let data = bytes.get(pos + 8..pos + 8 + length)?;
            let x = f64::from(read_u32_be(data, 0)?);
            let y = f64::from(read_u32_be(data, 4)?);
            return Some(if data[8] == PNG_UNIT_METER {
                RawDensity::PerInch(x * 0.0254, y * 0.0254)
            } else {
                RawDensity::Unitless
            });
        }
        // length + type + data + crc
        pos += 12 + length;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jfif(unit: u8, x: u16, y: u16) -> Vec<u8> {
        let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];
        bytes.extend_from_slice(b"JFIF\0");
        bytes.extend_from_slice(&[1, 1, unit]);
        bytes.extend_from_slice(&x.to_be_bytes());
        bytes.extend_from_slice(&y.to_be_bytes());
        bytes.extend_from_slice(&[0, 0, 0xFF, 0xDA]);
        bytes
    }

    fn png_with_phys(x: u32, y: u32, unit: u8) -> Vec<u8> {
        let mut bytes = PNG_SIGNATURE.to_vec();
        bytes.extend_from_slice(&13u32.to_be_bytes());
        bytes.extend_from_slice(b"IHDR");
        bytes.extend_from_slice(&[0; 13]);
        bytes.extend_from_slice(&[0; 4]);
        bytes.extend_from_slice(&9u32.to_be_bytes());
        bytes.extend_from_slice(b"pHYs");
        bytes.extend_from_slice(&x.to_be_bytes());
        bytes.extend_from_slice(&y.to_be_bytes());
        bytes.push(unit);
        bytes.extend_from_slice(&[0; 4]);
        bytes
    }

    #[test]
    fn test_jfif_dpi_is_read() {
        assert_eq!(declared_density(&jfif(1, 300, 300)), Some(Dpi::uniform(300)));
    }

    #[test]
    fn test_jfif_dpcm_is_converted() {
        assert_eq!(declared_density(&jfif(2, 118, 118)), Some(Dpi::uniform(300)));
    }

    #[test]
    fn test_jfif_zero_density_is_coerced() {
        let bytes = jfif(1, 0, 0);
        assert_eq!(declared_density(&bytes), Some(Dpi { x: 0, y: 0 }));
        assert_eq!(effective_density(&bytes, 96), Dpi::uniform(96));
    }

    #[test]
    fn test_jfif_unitless_uses_default() {
        assert_eq!(declared_density(&jfif(0, 1, 1)), None);
        assert_eq!(effective_density(&jfif(0, 1, 1), DEFAULT_DPI), Dpi::uniform(72));
    }

    #[test]
    fn test_png_phys_meter_is_converted() {
        assert_eq!(
            declared_density(&png_with_phys(11811, 11811, 1)),
            Some(Dpi::uniform(300))
        );
    }

    #[test]
    fn test_png_phys_zero_is_coerced() {
        assert_eq!(effective_density(&png_with_phys(0, 3780, 1), 72), Dpi::uniform(72));
    }

    #[test]
    fn test_unknown_format_and_zero_default() {
        assert_eq!(declared_density(b"GIF89a......"), None);
        assert_eq!(effective_density(b"GIF89a", 0), Dpi::uniform(DEFAULT_DPI));
    }

    #[test]
    fn test_truncated_headers_do_not_panic() {
        assert_eq!(declared_density(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00]), None);
        assert_eq!(declared_density(&PNG_SIGNATURE), None);
    }
}
