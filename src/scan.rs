use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use snafu::{ensure, ResultExt, Snafu};

use crate::dicom::{read_series_header, SeriesHeader};
use crate::series::ImageSeries;

#[derive(Debug, Snafu)]
pub enum ScanError {
    #[snafu(display("Please choose a directory to scan."))]
    EmptyPath,

    #[snafu(display("Directory not found: {}", path.display()))]
    NotADirectory { path: PathBuf },

    #[snafu(display("Could not read directory {}: {source}", path.display()))]
    ReadDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display(
        "No valid DICOM files found in {} ({skipped} file(s) skipped).",
        path.display()
    ))]
    NoDicomFiles { path: PathBuf, skipped: usize },
}

#[derive(Debug, Clone)]
pub struct ScanReport {
    pub directory: PathBuf,
    pub series: ImageSeries,
    pub skipped: usize,
}

/// Collects the parseable DICOM files directly inside `dir`, in slice order.
pub fn scan_directory(dir: &Path) -> Result<ScanReport, ScanError> {
    ensure!(!dir.as_os_str().is_empty(), EmptyPathSnafu);
    ensure!(dir.is_dir(), NotADirectorySnafu { path: dir });
    let directory = fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf());

    let mut files = Vec::new();
    for entry in fs::read_dir(&directory).context(ReadDirectorySnafu { path: &directory })? {
        let entry = entry.context(ReadDirectorySnafu { path: &directory })?;
        let path = entry.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();

    let mut sortable = Vec::with_capacity(files.len());
    let mut skipped = 0usize;
    for path in files {
        match read_series_header(&path) {
            Ok(header) => sortable.push((SliceSortKey::new(&header, &path), path)),
            Err(err) => {
                skipped += 1;
                log::warn!("Skipping invalid DICOM file {}: {err:#}", path.display());
            }
        }
    }

    ensure!(
        !sortable.is_empty(),
        NoDicomFilesSnafu {
            path: &directory,
            skipped
        }
    );

    sortable.sort_by(|(a, _), (b, _)| a.compare(b));
    log::info!(
        "Scanned {}: {} DICOM file(s), {} skipped",
        directory.display(),
        sortable.len(),
        skipped
    );

    Ok(ScanReport {
        series: ImageSeries::from_paths(sortable.into_iter().map(|(_, path)| path)),
        directory,
        skipped,
    })
}

/// Position along the slice normal, falling back to the z coordinate and then
/// to SliceLocation.
pub fn slice_position(header: &SeriesHeader) -> Option<f64> {
    if let (Some(position), Some(orientation)) = (&header.image_position, &header.image_orientation) {
        if position.len() >= 3 && orientation.len() >= 6 {
            let row = [orientation[0], orientation[1], orientation[2]];
            let column = [orientation[3], orientation[4], orientation[5]];
            let normal = cross(row, column);
            if dot(normal, normal).sqrt() > 0.0 {
                return Some(dot(normal, [position[0], position[1], position[2]]));
            }
        }
    }

    if let Some(position) = &header.image_position {
        if position.len() >= 3 {
            return Some(position[2]);
        }
    }

    header.slice_location
}

#[derive(Debug, Clone, PartialEq)]
struct SliceSortKey {
    series_uid: String,
    primary: f64,
    secondary: f64,
    file_name: String,
}

impl SliceSortKey {
    fn new(header: &SeriesHeader, path: &Path) -> Self {
        let instance = header.instance_number;
        Self {
            series_uid: header.series_uid.clone(),
            primary: slice_position(header)
                .or(instance)
                .unwrap_or(f64::INFINITY),
            secondary: instance.unwrap_or(f64::INFINITY),
            file_name: path
                .file_name()
                .map(|name| name.to_string_lossy().to_lowercase())
                .unwrap_or_default(),
        }
    }

    fn compare(&self, other: &Self) -> Ordering {
        self.series_uid
            .cmp(&other.series_uid)
            .then_with(|| self.primary.total_cmp(&other.primary))
            .then_with(|| self.secondary.total_cmp(&other.secondary))
            .then_with(|| self.file_name.cmp(&other.file_name))
    }
}

fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}
