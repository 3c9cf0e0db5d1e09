//! Synthetic DICOM fixtures for unit tests.

use std::fs;
use std::path::{Path, PathBuf};

use dicom_core::{DataElement, PrimitiveValue, Tag, VR};
use dicom_object::{FileMetaTableBuilder, InMemDicomObject};

const CT_IMAGE_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.2";
const EXPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2.1";

#[derive(Debug, Clone)]
pub struct SliceSpec {
    pub rows: usize,
    pub columns: usize,
    pub series_uid: String,
    pub instance_number: Option<i32>,
    pub position: Option<[f64; 3]>,
    pub slice_location: Option<f64>,
    pub window: Option<(f32, f32)>,
    pub seed: i32,
}

impl Default for SliceSpec {
    fn default() -> Self {
        Self {
            rows: 4,
            columns: 6,
            series_uid: "1.2.826.0.1.3680043.2.1125.1".to_string(),
            instance_number: None,
            position: None,
            slice_location: None,
            window: None,
            seed: 11,
        }
    }
}

impl SliceSpec {
    pub fn pixels(&self) -> Vec<i32> {
        (0..self.rows * self.columns)
            .map(|index| (index as i32 * 97 + self.seed) % 2048)
            .collect()
    }
}

pub fn scratch_dir(label: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "dicomscope-{label}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos()
    ));
    fs::create_dir_all(&dir).expect("should create scratch dir");
    dir
}

pub fn write_slice(dir: &Path, file_name: &str, spec: &SliceSpec) -> PathBuf {
    let sop_uid = format!("{}.{}", spec.series_uid, spec.seed);
    let mut obj = InMemDicomObject::new_empty();

    let mut put_str = |tag: Tag, vr: VR, value: String| {
        obj.put(DataElement::new(tag, vr, PrimitiveValue::from(value)));
    };
    put_str(Tag(0x0008, 0x0016), VR::UI, CT_IMAGE_STORAGE.to_string());
    put_str(Tag(0x0008, 0x0018), VR::UI, sop_uid.clone());
    put_str(Tag(0x0008, 0x0020), VR::DA, "20240115".to_string());
    put_str(Tag(0x0008, 0x0060), VR::CS, "CT".to_string());
    put_str(Tag(0x0010, 0x0010), VR::PN, "Doe^Jane".to_string());
    put_str(Tag(0x0010, 0x0020), VR::LO, "PID-001".to_string());
    put_str(Tag(0x0018, 0x0050), VR::DS, "2.5".to_string());
    put_str(Tag(0x0020, 0x000E), VR::UI, spec.series_uid.clone());
    if let Some(number) = spec.instance_number {
        put_str(Tag(0x0020, 0x0013), VR::IS, number.to_string());
    }
    if let Some([x, y, z]) = spec.position {
        put_str(Tag(0x0020, 0x0032), VR::DS, format!("{x}\\{y}\\{z}"));
        put_str(Tag(0x0020, 0x0037), VR::DS, "1\\0\\0\\0\\1\\0".to_string());
    }
    if let Some(location) = spec.slice_location {
        put_str(Tag(0x0020, 0x1041), VR::DS, location.to_string());
    }
    put_str(Tag(0x0028, 0x0004), VR::CS, "MONOCHROME2".to_string());
    put_str(Tag(0x0028, 0x0030), VR::DS, "0.7\\0.7".to_string());
    if let Some((center, width)) = spec.window {
        put_str(Tag(0x0028, 0x1050), VR::DS, center.to_string());
        put_str(Tag(0x0028, 0x1051), VR::DS, width.to_string());
    }
    put_str(Tag(0x0028, 0x1052), VR::DS, "-1024".to_string());
    put_str(Tag(0x0028, 0x1053), VR::DS, "1".to_string());

    let mut put_us = |tag: Tag, value: u16| {
        obj.put(DataElement::new(tag, VR::US, PrimitiveValue::from(value)));
    };
    put_us(Tag(0x0028, 0x0002), 1);
    put_us(Tag(0x0028, 0x0010), spec.rows as u16);
    put_us(Tag(0x0028, 0x0011), spec.columns as u16);
    put_us(Tag(0x0028, 0x0100), 16);
    put_us(Tag(0x0028, 0x0101), 16);
    put_us(Tag(0x0028, 0x0102), 15);
    put_us(Tag(0x0028, 0x0103), 0);

    let samples = spec
        .pixels()
        .into_iter()
        .map(|value| value as u16)
        .collect::<Vec<_>>();
    obj.put(DataElement::new(
        Tag(0x7FE0, 0x0010),
        VR::OW,
        PrimitiveValue::U16(samples.into()),
    ));

    let file_obj = obj
        .with_meta(
            FileMetaTableBuilder::new()
                .transfer_syntax(EXPLICIT_VR_LITTLE_ENDIAN)
                .media_storage_sop_class_uid(CT_IMAGE_STORAGE)
                .media_storage_sop_instance_uid(sop_uid.as_str()),
        )
        .expect("fixture meta should build");
    let path = dir.join(file_name);
    file_obj
        .write_to_file(&path)
        .expect("fixture should be written");
    path
}
