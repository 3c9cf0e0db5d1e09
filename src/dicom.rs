use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::{fs, io::Cursor};

use anyhow::{bail, Context, Result};
use dicom_object::{from_reader, open_file, DefaultDicomObject, OpenFileOptions, ReadError, Tag};
use dicom_pixeldata::{ConvertOptions, ModalityLutOption, PixelDecoder};

use crate::windowing::WindowLevel;

const PIXEL_DATA: Tag = Tag(0x7FE0, 0x0010);

pub const NOT_AVAILABLE: &str = "N/A";

pub const METADATA_FIELD_NAMES: &[&str] = &[
    "PatientName",
    "PatientID",
    "StudyDate",
    "Modality",
    "StudyDescription",
    "SeriesDescription",
    "ImagePositionPatient",
    "PixelSpacing",
    "SliceThickness",
    "Rows",
    "Columns",
    "WindowCenter",
    "WindowWidth",
    "RescaleSlope",
    "RescaleIntercept",
    "PhotometricInterpretation",
    "InstanceNumber",
];

#[derive(Debug, Clone)]
pub enum FrameSamples {
    Monochrome(Arc<[i32]>),
    Rgb {
        samples: Arc<[u8]>,
        samples_per_pixel: u16,
    },
}

/// First frame of a DICOM file, with what is needed to window and label it.
#[derive(Debug, Clone)]
pub struct PixelFrame {
    pub path: PathBuf,
    pub width: usize,
    pub height: usize,
    pub samples: FrameSamples,
    pub rescale_slope: f32,
    pub rescale_intercept: f32,
    pub invert: bool,
    pub default_window: WindowLevel,
    pub min_value: f32,
    pub max_value: f32,
    pub metadata: Vec<(String, String)>,
}

impl PixelFrame {
    pub fn monochrome(
        width: usize,
        height: usize,
        raw: Vec<i32>,
        rescale_slope: f32,
        rescale_intercept: f32,
    ) -> Result<Self> {
        let expected = width
            .checked_mul(height)
            .context("Overflow while calculating frame size")?;
        if raw.len() != expected {
            bail!(
                "Decoded pixel count mismatch: got {}, expected {}",
                raw.len(),
                expected
            );
        }

        let (raw_min, raw_max) = min_max(&raw).context("No pixels available for rendering")?;
        let low = raw_min as f32 * rescale_slope + rescale_intercept;
        let high = raw_max as f32 * rescale_slope + rescale_intercept;
        let (min_value, max_value) = if low <= high { (low, high) } else { (high, low) };

        Ok(Self {
            path: PathBuf::new(),
            width,
            height,
            samples: FrameSamples::Monochrome(Arc::from(raw.into_boxed_slice())),
            rescale_slope,
            rescale_intercept,
            invert: false,
            default_window: WindowLevel::new(
                (min_value + max_value) / 2.0,
                max_value - min_value,
            ),
            min_value,
            max_value,
            metadata: Vec::new(),
        })
    }

    pub fn rgb(width: usize, height: usize, samples: Vec<u8>, samples_per_pixel: u16) -> Result<Self> {
        let expected = width
            .checked_mul(height)
            .and_then(|v| v.checked_mul(samples_per_pixel as usize))
            .context("Overflow while calculating color frame size")?;
        if samples.len() != expected {
            bail!(
                "Decoded color pixel count mismatch: got {}, expected {}",
                samples.len(),
                expected
            );
        }

        Ok(Self {
            path: PathBuf::new(),
            width,
            height,
            samples: FrameSamples::Rgb {
                samples: Arc::from(samples.into_boxed_slice()),
                samples_per_pixel,
            },
            rescale_slope: 1.0,
            rescale_intercept: 0.0,
            invert: false,
            default_window: WindowLevel::new(127.5, 255.0),
            min_value: 0.0,
            max_value: 255.0,
            metadata: Vec::new(),
        })
    }

    pub fn is_monochrome(&self) -> bool {
        matches!(self.samples, FrameSamples::Monochrome(_))
    }

    pub fn modality_value(&self, raw: i32) -> f32 {
        raw as f32 * self.rescale_slope + self.rescale_intercept
    }
}

/// Header attributes used to order a series.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesHeader {
    pub series_uid: String,
    pub image_position: Option<Vec<f64>>,
    pub image_orientation: Option<Vec<f64>>,
    pub slice_location: Option<f64>,
    pub instance_number: Option<f64>,
}

/// Parses everything up to the pixel data. Fails for non-DICOM files.
pub fn read_series_header(path: &Path) -> Result<SeriesHeader> {
    let obj = open_dicom_header(path)?;
    Ok(SeriesHeader {
        series_uid: read_string(&obj, "SeriesInstanceUID").unwrap_or_default(),
        image_position: read_multi_f64(&obj, "ImagePositionPatient"),
        image_orientation: read_multi_f64(&obj, "ImageOrientationPatient"),
        slice_location: read_multi_f64(&obj, "SliceLocation").and_then(|v| v.first().copied()),
        instance_number: read_multi_f64(&obj, "InstanceNumber").and_then(|v| v.first().copied()),
    })
}

pub fn load_frame(path: &Path) -> Result<PixelFrame> {
    let obj = open_dicom_object(path)?;

    let width: usize = obj
        .element_by_name("Columns")
        .context("Missing Columns tag")?
        .to_int()
        .context("Invalid Columns value")?;
    let height: usize = obj
        .element_by_name("Rows")
        .context("Missing Rows tag")?
        .to_int()
        .context("Invalid Rows value")?;

    let photometric = read_string_or_default(&obj, "PhotometricInterpretation", "MONOCHROME2");
    let invert = photometric.trim().eq_ignore_ascii_case("MONOCHROME1");

    let decoded = obj
        .decode_pixel_data_frame(0)
        .context("Failed to decode PixelData frame 0")?;

    let decoded_width = decoded.columns() as usize;
    let decoded_height = decoded.rows() as usize;
    if decoded_width != width || decoded_height != height {
        bail!(
            "Decoded frame dimensions mismatch: decoded={}x{}, tags={}x{}",
            decoded_width,
            decoded_height,
            width,
            height
        );
    }

    let bits_allocated = decoded.bits_allocated();
    let samples_per_pixel = decoded.samples_per_pixel();
    let mut frame = match samples_per_pixel {
        1 => {
            if bits_allocated != 8 && bits_allocated != 16 && bits_allocated != 32 {
                bail!("BitsAllocated={} is not supported (only 8/16/32)", bits_allocated);
            }

            // Rescale is applied at render time from the slope/intercept kept on the frame.
            let options =
                ConvertOptions::default().with_modality_lut(ModalityLutOption::None);
            let raw: Vec<i32> = decoded
                .to_vec_frame_with_options(0, &options)
                .context("Could not convert decoded frame 0 to i32 samples")?;

            let slope = read_float_first(&obj, "RescaleSlope")
                .filter(|value| *value != 0.0)
                .unwrap_or(1.0);
            let intercept = read_float_first(&obj, "RescaleIntercept").unwrap_or(0.0);

            let mut frame = PixelFrame::monochrome(width, height, raw, slope, intercept)?;
            frame.invert = invert;
            if let (Some(center), Some(window_width)) = (
                read_float_first(&obj, "WindowCenter"),
                read_float_first(&obj, "WindowWidth"),
            ) {
                frame.default_window = WindowLevel::new(center, window_width);
            }
            frame
        }
        spp if spp >= 3 => {
            if bits_allocated != 8 && bits_allocated != 16 {
                bail!(
                    "BitsAllocated={} is not supported for color images (only 8/16)",
                    bits_allocated
                );
            }

            let samples: Vec<u8> = if bits_allocated == 8 {
                decoded
                    .to_vec_frame(0)
                    .context("Could not convert decoded frame 0 to u8 samples")?
            } else {
                let bits_shift = decoded.bits_stored().saturating_sub(8);
                let samples_u16: Vec<u16> = decoded
                    .to_vec_frame(0)
                    .context("Could not convert decoded frame 0 to u16 samples")?;
                samples_u16
                    .into_iter()
                    .map(|sample| (sample >> bits_shift) as u8)
                    .collect()
            };
            PixelFrame::rgb(width, height, samples, spp)?
        }
        other => bail!(
            "Unsupported SamplesPerPixel={} (supports 1 for monochrome and >=3 for color)",
            other
        ),
    };

    frame.path = path.to_path_buf();
    frame.metadata = collect_metadata(&obj);
    Ok(frame)
}

/// User-facing message for a failed decode.
pub fn describe_load_error(err: &anyhow::Error) -> String {
    let message = format!("{err:#}");
    let lowered = message.to_ascii_lowercase();
    if lowered.contains("transfer syntax")
        || lowered.contains("compressed")
        || lowered.contains("unsupported")
        || lowered.contains("not supported")
    {
        return format!(
            "Unable to decode pixel data. This file may use a compressed or unsupported transfer syntax. ({message})"
        );
    }
    format!("Error loading image: {message}")
}

fn open_dicom_header(path: &Path) -> Result<DefaultDicomObject> {
    match OpenFileOptions::new().read_until(PIXEL_DATA).open_file(path) {
        Ok(obj) => Ok(obj),
        Err(err) if lacks_meta_group_length(&err) => open_dicom_object(path),
        Err(err) => Err(err).with_context(|| format!("Could not read header of {}", path.display())),
    }
}

fn open_dicom_object(path: &Path) -> Result<DefaultDicomObject> {
    let err = match open_file(path) {
        Ok(obj) => return Ok(obj),
        Err(err) => err,
    };

    if lacks_meta_group_length(&err) {
        let bytes = fs::read(path).with_context(|| format!("Could not read {}", path.display()))?;
        if let Some(repaired) = insert_meta_group_length(&bytes) {
            log::debug!(
                "Inserted File Meta Information Group Length into {}",
                path.display()
            );
            return from_reader(Cursor::new(repaired)).with_context(|| {
                format!(
                    "Could not open {} even with a File Meta Information Group Length (0002,0000)",
                    path.display()
                )
            });
        }
    }

    Err(err).with_context(|| format!("Could not open {}", path.display()))
}

/// Some writers omit (0002,0000), which the meta parser requires as the first element.
fn lacks_meta_group_length(error: &ReadError) -> bool {
    matches!(
        error,
        ReadError::ParseMetaDataSet {
            source: dicom_object::meta::Error::UnexpectedTag { tag, .. }
        } if tag.group() == 0x0002 && tag.element() != 0x0000
    )
}

/// Explicit VR types whose value length takes 4 bytes after 2 reserved ones.
const LONG_LENGTH_VRS: &[&[u8; 2]] = &[
    b"OB", b"OD", b"OF", b"OL", b"OW", b"SQ", b"UC", b"UR", b"UT", b"UN",
];

/// Where the file meta group starts and how many bytes it spans.
#[derive(Debug, PartialEq, Eq)]
struct MetaGroup {
    start: usize,
    len: u32,
}

impl MetaGroup {
    /// Walks the explicit VR little endian elements of group 0002 that follow
    /// the `DICM` marker (with or without the 128 byte preamble).
    fn locate(bytes: &[u8]) -> Option<Self> {
        let start = [132usize, 4]
            .into_iter()
            .find(|&end| bytes.get(end - 4..end) == Some(b"DICM".as_slice()))?;

        let mut cursor = start;
        while let Some(header) = bytes.get(cursor..cursor + 8) {
            if header[..2] != [0x02u8, 0x00] {
                break;
            }
            let (header_len, value_len) = if LONG_LENGTH_VRS.contains(&&[header[4], header[5]]) {
                let raw: [u8; 4] = bytes.get(cursor + 8..cursor + 12)?.try_into().ok()?;
                let len = u32::from_le_bytes(raw);
                // Undefined length has no place in the meta group.
                if len == u32::MAX {
                    return None;
                }
                (12, len as usize)
            } else {
                (8, u16::from_le_bytes([header[6], header[7]]) as usize)
            };
            cursor = cursor
                .checked_add(header_len + value_len)
                .filter(|&end| end <= bytes.len())?;
        }

        let len = u32::try_from(cursor - start).ok().filter(|&len| len > 0)?;
        Some(Self { start, len })
    }

    fn has_group_length(&self, bytes: &[u8]) -> bool {
        bytes.get(self.start..self.start + 4) == Some([0x02, 0x00, 0x00, 0x00].as_slice())
    }
}

/// Copy of `bytes` with a (0002,0000) UL element in front of the meta group,
/// or `None` when the group is absent or already has one.
fn insert_meta_group_length(bytes: &[u8]) -> Option<Vec<u8>> {
    let group = MetaGroup::locate(bytes)?;
    if group.has_group_length(bytes) {
        return None;
    }

    let mut element = Vec::with_capacity(12);
    element.extend_from_slice(&[0x02, 0x00, 0x00, 0x00]);
    element.extend_from_slice(b"UL");
    element.extend_from_slice(&4u16.to_le_bytes());
    element.extend_from_slice(&group.len.to_le_bytes());

    let mut repaired = Vec::with_capacity(bytes.len() + element.len());
    repaired.extend_from_slice(&bytes[..group.start]);
    repaired.extend_from_slice(&element);
    repaired.extend_from_slice(&bytes[group.start..]);
    Some(repaired)
}

fn collect_metadata(obj: &DefaultDicomObject) -> Vec<(String, String)> {
    METADATA_FIELD_NAMES
        .iter()
        .map(|name| {
            let value = match *name {
                "ImagePositionPatient" => {
                    read_multi_f64(obj, name).and_then(|values| format_position(&values))
                }
                "PixelSpacing" => read_multi_f64(obj, name).and_then(|values| format_spacing(&values)),
                "SliceThickness" => read_string(obj, name).map(|value| format!("{value} mm")),
                _ => read_string(obj, name),
            };
            (
                (*name).to_string(),
                value.unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            )
        })
        .collect()
}

fn format_position(values: &[f64]) -> Option<String> {
    if values.is_empty() {
        return None;
    }
    let parts = values
        .iter()
        .map(|value| format!("{value:.1}"))
        .collect::<Vec<_>>();
    Some(format!("[{}]", parts.join(", ")))
}

fn format_spacing(values: &[f64]) -> Option<String> {
    match values {
        [row, column, ..] => Some(format!("{row:.3} x {column:.3} mm")),
        _ => None,
    }
}

fn read_string_or_default(obj: &DefaultDicomObject, name: &str, default: &str) -> String {
    obj.element_by_name(name)
        .ok()
        .and_then(|el| el.to_str().ok())
        .map(|v| v.to_string())
        .unwrap_or_else(|| default.to_string())
}

fn read_string(obj: &DefaultDicomObject, name: &str) -> Option<String> {
    obj.element_by_name(name)
        .ok()
        .and_then(|el| el.to_str().ok())
        .map(|v| v.trim().trim_end_matches('\0').trim().to_string())
        .filter(|v| !v.is_empty())
}

fn read_float_first(obj: &DefaultDicomObject, name: &str) -> Option<f32> {
    obj.element_by_name(name)
        .ok()
        .and_then(|el| el.to_str().ok())
        .and_then(|s| parse_multi_valued_number(&s))
}

fn read_multi_f64(obj: &DefaultDicomObject, name: &str) -> Option<Vec<f64>> {
    let text = read_string(obj, name)?;
    let values = text
        .split('\\')
        .map(|part| part.trim().parse::<f64>().ok().filter(|value| value.is_finite()))
        .collect::<Option<Vec<_>>>()?;
    if values.is_empty() {
        None
    } else {
        Some(values)
    }
}

/// First value of a multi-valued number. "NaN" and "inf" parse as floats but
/// are never valid attribute values.
fn parse_multi_valued_number(value: &str) -> Option<f32> {
    value
        .split('\\')
        .next()?
        .trim()
        .parse::<f32>()
        .ok()
        .filter(|value| value.is_finite())
}

fn min_max(values: &[i32]) -> Option<(i32, i32)> {
    let mut iter = values.iter().copied();
    let first = iter.next()?;
    Some(iter.fold((first, first), |(min_v, max_v), v| (min_v.min(v), max_v.max(v))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{scratch_dir, write_slice, SliceSpec};

    fn metadata_value<'a>(frame: &'a PixelFrame, name: &str) -> Option<&'a str> {
        frame
            .metadata
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Explicit VR little endian element with a short length field.
    fn meta_element(group: u16, element: u16, vr: &[u8; 2], value: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&group.to_le_bytes());
        bytes.extend_from_slice(&element.to_le_bytes());
        bytes.extend_from_slice(vr);
        bytes.extend_from_slice(&(value.len() as u16).to_le_bytes());
        bytes.extend_from_slice(value);
        bytes
    }

    fn preamble() -> Vec<u8> {
        let mut bytes = vec![0u8; 128];
        bytes.extend_from_slice(b"DICM");
        bytes
    }

    #[test]
    fn missing_group_length_is_inserted_before_meta_group() {
        let mut bytes = preamble();
        bytes.extend(meta_element(0x0002, 0x0002, b"UI", b"1.2.3\0"));
        bytes.extend(meta_element(0x0002, 0x0010, b"UI", b"1.2.840.10008.1.2.1\0"));
        bytes.extend(meta_element(0x0008, 0x0060, b"CS", b"CT"));

        let repaired = insert_meta_group_length(&bytes).expect("group length should be inserted");
        assert_eq!(repaired.len(), bytes.len() + 12);
        assert_eq!(
            &repaired[132..144],
            meta_element(0x0002, 0x0000, b"UL", &42u32.to_le_bytes()).as_slice()
        );
        assert_eq!(&repaired[144..], &bytes[132..]);
    }

    #[test]
    fn meta_group_walk_handles_long_length_vrs_and_bare_marker() {
        let mut bytes = b"DICM".to_vec();
        bytes.extend_from_slice(&[0x02, 0x00, 0x01, 0x00, b'O', b'B', 0x00, 0x00]);
        bytes.extend_from_slice(&2u32.to_le_bytes());
        bytes.extend_from_slice(&[0x00, 0x01]);
        bytes.extend(meta_element(0x0008, 0x0060, b"CS", b"MR"));

        assert_eq!(MetaGroup::locate(&bytes), Some(MetaGroup { start: 4, len: 14 }));
    }

    #[test]
    fn existing_group_length_or_truncated_group_is_left_alone() {
        let mut complete = preamble();
        complete.extend(meta_element(0x0002, 0x0000, b"UL", &26u32.to_le_bytes()));
        complete.extend(meta_element(0x0002, 0x0010, b"UI", b"1.2.840.10008.1.2\0"));
        assert!(insert_meta_group_length(&complete).is_none());

        let mut truncated = preamble();
        truncated.extend(meta_element(0x0002, 0x0010, b"UI", b"1.2.840.10008.1.2\0"));
        truncated.truncate(truncated.len() - 4);
        assert!(insert_meta_group_length(&truncated).is_none());

        assert!(insert_meta_group_length(b"not a dicom file at all").is_none());
    }

    #[test]
    fn monochrome_frame_tracks_rescaled_range() {
        let frame = PixelFrame::monochrome(2, 2, vec![0, 1024, 2048, 1000], 1.0, -1024.0)
            .expect("frame should build");
        assert_eq!(frame.min_value, -1024.0);
        assert_eq!(frame.max_value, 1024.0);
        assert_eq!(frame.default_window.center, 0.0);
        assert_eq!(frame.default_window.width, 2048.0);
        assert_eq!(frame.modality_value(1024), 0.0);
    }

    #[test]
    fn monochrome_frame_rejects_wrong_pixel_count() {
        assert!(PixelFrame::monochrome(3, 3, vec![0; 8], 1.0, 0.0).is_err());
        assert!(PixelFrame::rgb(2, 2, vec![0; 11], 3).is_err());
    }

    #[test]
    fn load_frame_reads_pixels_rescale_and_metadata() {
        let dir = scratch_dir("load-frame");
        let spec = SliceSpec {
            instance_number: Some(7),
            position: Some([0.0, 0.0, 12.5]),
            window: Some((40.0, 400.0)),
            ..SliceSpec::default()
        };
        let path = write_slice(&dir, "slice.dcm", &spec);

        let frame = load_frame(&path).expect("synthetic slice should load");
        assert_eq!((frame.width, frame.height), (spec.columns, spec.rows));
        assert!(frame.is_monochrome());
        assert!(!frame.invert);
        assert_eq!(frame.rescale_slope, 1.0);
        assert_eq!(frame.rescale_intercept, -1024.0);
        assert_eq!(frame.default_window, WindowLevel::new(40.0, 400.0));
        match &frame.samples {
            FrameSamples::Monochrome(samples) => assert_eq!(&samples[..], &spec.pixels()[..]),
            FrameSamples::Rgb { .. } => panic!("expected monochrome samples"),
        }
        assert_eq!(metadata_value(&frame, "PatientName"), Some("Doe^Jane"));
        assert_eq!(metadata_value(&frame, "Modality"), Some("CT"));
        assert_eq!(metadata_value(&frame, "ImagePositionPatient"), Some("[0.0, 0.0, 12.5]"));
        assert_eq!(metadata_value(&frame, "PixelSpacing"), Some("0.700 x 0.700 mm"));
        assert_eq!(metadata_value(&frame, "SliceThickness"), Some("2.5 mm"));
        assert_eq!(metadata_value(&frame, "StudyDescription"), Some(NOT_AVAILABLE));
        assert_eq!(frame.metadata.len(), METADATA_FIELD_NAMES.len());

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn load_frame_falls_back_to_pixel_range_without_window_tags() {
        let dir = scratch_dir("load-frame-no-window");
        let path = write_slice(&dir, "slice.dcm", &SliceSpec::default());

        let frame = load_frame(&path).expect("synthetic slice should load");
        let expected_low = frame.modality_value(*SliceSpec::default().pixels().iter().min().unwrap());
        assert_eq!(frame.min_value, expected_low);
        assert_eq!(
            frame.default_window.width,
            (frame.max_value - frame.min_value).max(1.0)
        );

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn non_finite_window_tags_are_ignored() {
        let dir = scratch_dir("load-frame-nan-window");
        let plain = load_frame(&write_slice(&dir, "plain.dcm", &SliceSpec::default()))
            .expect("synthetic slice should load");
        let spec = SliceSpec {
            window: Some((f32::NAN, f32::INFINITY)),
            ..SliceSpec::default()
        };
        let frame = load_frame(&write_slice(&dir, "nan.dcm", &spec))
            .expect("synthetic slice should load");

        assert_eq!(frame.default_window, plain.default_window);
        assert!(frame.default_window.center.is_finite());

        assert_eq!(parse_multi_valued_number(" 40\\80"), Some(40.0));
        assert_eq!(parse_multi_valued_number("NaN"), None);
        assert_eq!(parse_multi_valued_number("-inf\\400"), None);

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn series_header_reads_ordering_attributes() {
        let dir = scratch_dir("series-header");
        let spec = SliceSpec {
            instance_number: Some(3),
            position: Some([-10.0, 5.0, 42.0]),
            ..SliceSpec::default()
        };
        let path = write_slice(&dir, "slice.dcm", &spec);

        let header = read_series_header(&path).expect("header should parse");
        assert_eq!(header.series_uid, spec.series_uid);
        assert_eq!(header.instance_number, Some(3.0));
        assert_eq!(header.image_position, Some(vec![-10.0, 5.0, 42.0]));
        assert_eq!(
            header.image_orientation,
            Some(vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0])
        );

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn non_dicom_file_fails_to_parse() {
        let dir = scratch_dir("non-dicom");
        let path = dir.join("notes.txt");
        fs::write(&path, "definitely not DICOM").expect("should write temp file");

        assert!(read_series_header(&path).is_err());
        assert!(load_frame(&path).is_err());

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn load_errors_mention_transfer_syntax_hint() {
        let err = anyhow::anyhow!("Unsupported transfer syntax 1.2.840.10008.1.2.4.90");
        assert!(describe_load_error(&err).starts_with("Unable to decode pixel data."));

        let err = anyhow::anyhow!("Missing Rows tag");
        assert_eq!(describe_load_error(&err), "Error loading image: Missing Rows tag");
    }
}
