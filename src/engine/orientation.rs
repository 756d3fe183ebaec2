// src/engine/orientation.rs
//
// EXIF orientation: a bounded, allocation-free JPEG marker walk that finds
// tag 0x0112 in IFD0, plus the canonical pixel transform for each value.
//
// The reader never fails. Orientation is an enhancement: any structural
// anomaly means "no orientation metadata" and yields Orientation::Normal.

use image::DynamicImage;

/// Only this many leading bytes are examined. EXIF lives in APP1, which
/// sits right after SOI in camera output.
pub const ORIENTATION_SCAN_LIMIT: usize = 64 * 1024;

const MARKER_SOI: u16 = 0xFFD8;
const MARKER_APP1: u16 = 0xFFE1;
const MARKER_SOS: u16 = 0xFFDA;
const MARKER_EOI: u16 = 0xFFD9;
const EXIF_SIGNATURE: &[u8; 6] = b"Exif\0\0";
const TAG_ORIENTATION: u16 = 0x0112;
const TYPE_SHORT: u16 = 3;
const IFD_ENTRY_LEN: usize = 12;

/// EXIF orientation tag values 1..=8.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Orientation {
    #[default]
    Normal = 1,
    FlipHorizontal = 2,
    Rotate180 = 3,
    FlipVertical = 4,
    Transpose = 5,
    Rotate90 = 6,
    Transverse = 7,
    Rotate270 = 8,
}

impl Orientation {
    pub const ALL: [Orientation; 8] = [
        Orientation::Normal,
        Orientation::FlipHorizontal,
        Orientation::Rotate180,
        Orientation::FlipVertical,
        Orientation::Transpose,
        Orientation::Rotate90,
        Orientation::Transverse,
        Orientation::Rotate270,
    ];

    pub fn from_exif(value: u16) -> Option<Self> {
        match value {
            1 => Some(Self::Normal),
            2 => Some(Self::FlipHorizontal),
            3 => Some(Self::Rotate180),
            4 => Some(Self::FlipVertical),
            5 => Some(Self::Transpose),
            6 => Some(Self::Rotate90),
            7 => Some(Self::Transverse),
            8 => Some(Self::Rotate270),
            _ => None,
        }
    }

    pub fn exif_value(self) -> u16 {
        self as u16
    }

    /// Values 5..=8 turn the image on its side.
    pub fn swaps_dimensions(self) -> bool {
        matches!(
            self,
            Self::Transpose | Self::Rotate90 | Self::Transverse | Self::Rotate270
        )
    }

    /// Values 2, 3, 4, 5 and 7 involve a mirror or a half turn.
    pub fn mirrors(self) -> bool {
        matches!(
            self,
            Self::FlipHorizontal
                | Self::Rotate180
                | Self::FlipVertical
                | Self::Transpose
                | Self::Transverse
        )
    }

    /// Turn stored pixels into display pixels.
    pub fn apply(self, img: DynamicImage) -> DynamicImage {
        match self {
            Self::Normal => img,
            Self::FlipHorizontal => img.fliph(),
            Self::Rotate180 => img.rotate180(),
            Self::FlipVertical => img.flipv(),
            Self::Transpose => img.rotate90().fliph(),
            Self::Rotate90 => img.rotate90(),
            Self::Transverse => img.rotate270().fliph(),
            Self::Rotate270 => img.rotate270(),
        }
    }
}

/// Display dimensions of a `width x height` image stored with `orientation`.
pub fn get_oriented_dimensions(width: u32, height: u32, orientation: Orientation) -> (u32, u32) {
    if orientation.swaps_dimensions() {
        (height, width)
    } else {
        (width, height)
    }
}

/// Read the EXIF orientation of a JPEG. Anything unexpected yields `Normal`.
pub fn read_orientation(bytes: &[u8]) -> Orientation {
    let window = &bytes[..bytes.len().min(ORIENTATION_SCAN_LIMIT)];
    find_orientation(window).unwrap_or_default()
}

fn be_u16(data: &[u8], offset: usize) -> Option<u16> {
    let b = data.get(offset..offset.checked_add(2)?)?;
    Some(u16::from_be_bytes([b[0], b[1]]))
}

fn find_orientation(data: &[u8]) -> Option<Orientation> {
    if be_u16(data, 0)? != MARKER_SOI {
        return None;
    }
    let mut offset = 2usize;
    loop {
        let marker = be_u16(data, offset)?;
        if marker & 0xFF00 != 0xFF00 {
            return None;
        }
        if marker == 0xFFFF {
            // Fill byte before a marker.
            offset += 1;
            continue;
        }
        if marker == MARKER_SOS || marker == MARKER_EOI {
            return None;
        }
        let len = be_u16(data, offset + 2)? as usize;
        if len < 2 {
            return None;
        }
        if marker == MARKER_APP1 {
            let payload = data.get(offset + 4..offset + 2 + len)?;
            if payload.starts_with(EXIF_SIGNATURE) {
                return TiffReader::new(&payload[EXIF_SIGNATURE.len()..])?.orientation();
            }
            // Non-EXIF APP1 (XMP); keep looking.
        }
        offset = offset.checked_add(2 + len)?;
    }
}

#[derive(Clone, Copy)]
enum ByteOrder {
    Little,
    Big,
}

/// Bounds-checked view over a TIFF structure.
struct TiffReader<'a> {
    data: &'a [u8],
    order: ByteOrder,
}

impl<'a> TiffReader<'a> {
    fn new(data: &'a [u8]) -> Option<Self> {
        let order = match data.get(0..2)? {
            b"II" => ByteOrder::Little,
            b"MM" => ByteOrder::Big,
            _ => return None,
        };
        let reader = Self { data, order };
        if reader.u16_at(2)? != 42 {
            return None;
        }
        Some(reader)
    }

    fn u16_at(&self, offset: usize) -> Option<u16> {
        let b = self.data.get(offset..offset.checked_add(2)?)?;
        Some(match self.order {
            ByteOrder::Little => u16::from_le_bytes([b[0], b[1]]),
            ByteOrder::Big => u16::from_be_bytes([b[0], b[1]]),
        })
    }

    fn u32_at(&self, offset: usize) -> Option<u32> {
        let b = self.data.get(offset..offset.checked_add(4)?)?;
        Some(match self.order {
            ByteOrder::Little => u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            ByteOrder::Big => u32::from_be_bytes([b[0], b[1], b[2], b[3]]),
        })
    }

    fn orientation(&self) -> Option<Orientation> {
        let ifd = usize::try_from(self.u32_at(4)?).ok()?;
        let count = self.u16_at(ifd)? as usize;
        (0..count).find_map(|i| {
            let entry = ifd.checked_add(2)?.checked_add(i.checked_mul(IFD_ENTRY_LEN)?)?;
            if self.u16_at(entry)? != TAG_ORIENTATION {
                return None;
            }
            if self.u16_at(entry + 2)? != TYPE_SHORT || self.u32_at(entry + 4)? != 1 {
                return None;
            }
            Orientation::from_exif(self.u16_at(entry + 8)?)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// SOI + APP1(Exif) with one IFD0 entry + EOI.
    fn jpeg_with_entry(big_endian: bool, tag: u16, typ: u16, count: u32, value: u16) -> Vec<u8> {
        let mut tiff = Vec::new();
        let (u16b, u32b): (fn(u16) -> [u8; 2], fn(u32) -> [u8; 4]) = if big_endian {
            tiff.extend_from_slice(b"MM");
            (u16::to_be_bytes, u32::to_be_bytes)
        } else {
            tiff.extend_from_slice(b"II");
            (u16::to_le_bytes, u32::to_le_bytes)
        };
        tiff.extend_from_slice(&u16b(42));
        tiff.extend_from_slice(&u32b(8));
        tiff.extend_from_slice(&u16b(1));
        tiff.extend_from_slice(&u16b(tag));
        tiff.extend_from_slice(&u16b(typ));
        tiff.extend_from_slice(&u32b(count));
        tiff.extend_from_slice(&u16b(value));
        tiff.extend_from_slice(&[0, 0]);
        tiff.extend_from_slice(&u32b(0));

        let mut app1 = b"Exif\0\0".to_vec();
        app1.extend_from_slice(&tiff);

        let mut out = vec![0xFF, 0xD8, 0xFF, 0xE1];
        out.extend_from_slice(&((app1.len() + 2) as u16).to_be_bytes());
        out.extend_from_slice(&app1);
        out.extend_from_slice(&[0xFF, 0xD9]);
        out
    }

    mod reader_tests {
        use super::*;

        #[test]
        fn test_reads_all_values_both_byte_orders() {
            for value in 1..=8u16 {
                for big in [false, true] {
                    let data = jpeg_with_entry(big, TAG_ORIENTATION, TYPE_SHORT, 1, value);
                    assert_eq!(read_orientation(&data).exif_value(), value);
                }
            }
        }

        #[test]
        fn test_skips_xmp_app1_before_exif() {
            let exif = jpeg_with_entry(false, TAG_ORIENTATION, TYPE_SHORT, 1, 6);
            let xmp_payload = b"http://ns.adobe.com/xap/1.0/\0<x/>";
            let mut data = vec![0xFF, 0xD8, 0xFF, 0xE1];
            data.extend_from_slice(&((xmp_payload.len() + 2) as u16).to_be_bytes());
            data.extend_from_slice(xmp_payload);
            data.extend_from_slice(&exif[2..]);
            assert_eq!(read_orientation(&data), Orientation::Rotate90);
        }

        #[test]
        fn test_non_jpeg_is_normal() {
            assert_eq!(read_orientation(b"\x89PNG\r\n\x1a\n"), Orientation::Normal);
            assert_eq!(read_orientation(&[]), Orientation::Normal);
            assert_eq!(read_orientation(&[0xFF]), Orientation::Normal);
        }

        #[test]
        fn test_wrong_type_or_count_is_normal() {
            let long = jpeg_with_entry(false, TAG_ORIENTATION, 4, 1, 6);
            assert_eq!(read_orientation(&long), Orientation::Normal);
            let multi = jpeg_with_entry(false, TAG_ORIENTATION, TYPE_SHORT, 2, 6);
            assert_eq!(read_orientation(&multi), Orientation::Normal);
        }

        #[test]
        fn test_out_of_range_value_is_normal() {
            for value in [0u16, 9, 0xFFFF] {
                let data = jpeg_with_entry(true, TAG_ORIENTATION, TYPE_SHORT, 1, value);
                assert_eq!(read_orientation(&data), Orientation::Normal);
            }
        }

        #[test]
        fn test_other_tag_is_normal() {
            let data = jpeg_with_entry(false, 0x010F, TYPE_SHORT, 1, 6);
            assert_eq!(read_orientation(&data), Orientation::Normal);
        }

        #[test]
        fn test_every_truncation_is_normal_or_correct() {
            let data = jpeg_with_entry(false, TAG_ORIENTATION, TYPE_SHORT, 1, 8);
            for cut in 0..data.len() {
                let o = read_orientation(&data[..cut]);
                assert!(o == Orientation::Normal || o == Orientation::Rotate270);
            }
        }

        #[test]
        fn test_bad_signature_and_tiff_magic() {
            let mut data = jpeg_with_entry(false, TAG_ORIENTATION, TYPE_SHORT, 1, 6);
            data[6] = b'X'; // "Exif" -> "Xxif"
            assert_eq!(read_orientation(&data), Orientation::Normal);

            let mut data = jpeg_with_entry(false, TAG_ORIENTATION, TYPE_SHORT, 1, 6);
            data[12] = b'Z'; // byte order mark
            assert_eq!(read_orientation(&data), Orientation::Normal);

            let mut data = jpeg_with_entry(false, TAG_ORIENTATION, TYPE_SHORT, 1, 6);
            data[14] = 43; // magic 42 -> 43
            assert_eq!(read_orientation(&data), Orientation::Normal);
        }

        #[test]
        fn test_ifd_offset_past_end_is_normal() {
            let mut data = jpeg_with_entry(false, TAG_ORIENTATION, TYPE_SHORT, 1, 6);
            data[16..20].copy_from_slice(&0xFFFF_FFF0u32.to_le_bytes());
            assert_eq!(read_orientation(&data), Orientation::Normal);
        }

        #[test]
        fn test_segment_beyond_scan_limit_is_ignored() {
            let exif = jpeg_with_entry(false, TAG_ORIENTATION, TYPE_SHORT, 1, 6);
            let mut data = vec![0xFF, 0xD8];
            // Pad with COM segments until the APP1 starts past the limit.
            while data.len() < ORIENTATION_SCAN_LIMIT {
                data.extend_from_slice(&[0xFF, 0xFE, 0xFF, 0xFF]);
                data.extend(std::iter::repeat(0u8).take(0xFFFD));
            }
            data.extend_from_slice(&exif[2..]);
            assert_eq!(read_orientation(&data), Orientation::Normal);
        }

        #[test]
        fn test_stops_at_start_of_scan() {
            let exif = jpeg_with_entry(false, TAG_ORIENTATION, TYPE_SHORT, 1, 6);
            let mut data = vec![0xFF, 0xD8, 0xFF, 0xDA, 0x00, 0x02];
            data.extend_from_slice(&exif[2..]);
            assert_eq!(read_orientation(&data), Orientation::Normal);
        }
    }

    mod transform_tests {
        use super::*;
        use image::{GenericImageView, Rgb, RgbImage};

        #[test]
        fn test_oriented_dimensions() {
            for o in Orientation::ALL {
                let expected = if o.exif_value() >= 5 { (30, 40) } else { (40, 30) };
                assert_eq!(get_oriented_dimensions(40, 30, o), expected, "{o:?}");
            }
        }

        #[test]
        fn test_mirror_set() {
            let mirrored: Vec<u16> = Orientation::ALL
                .iter()
                .filter(|o| o.mirrors())
                .map(|o| o.exif_value())
                .collect();
            assert_eq!(mirrored, vec![2, 3, 4, 5, 7]);
        }

        #[test]
        fn test_top_left_pixel_lands_in_expected_corner() {
            let marker = Rgb([255, 0, 0]);
            let mut src = RgbImage::from_pixel(4, 2, Rgb([0, 0, 255]));
            src.put_pixel(0, 0, marker);
            let src = DynamicImage::ImageRgb8(src);

            for o in Orientation::ALL {
                let out = o.apply(src.clone());
                let (w, h) = out.dimensions();
                assert_eq!((w, h), get_oriented_dimensions(4, 2, o));
                let corner = match o.exif_value() {
                    1 | 5 => (0, 0),
                    2 | 6 => (w - 1, 0),
                    3 | 7 => (w - 1, h - 1),
                    _ => (0, h - 1),
                };
                assert_eq!(out.to_rgb8().get_pixel(corner.0, corner.1), &marker, "{o:?}");
            }
        }
    }
}
