use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesEntry {
    pub path: PathBuf,
    pub file_name: String,
}

impl SeriesEntry {
    pub fn new(path: PathBuf) -> Self {
        let file_name = path
            .file_name()
            .and_then(|value| value.to_str())
            .unwrap_or("DICOM")
            .to_string();
        Self { path, file_name }
    }
}

/// Ordered files of a scanned directory and the current position in them.
///
/// The index is always valid unless the series is empty. Navigation saturates
/// at both ends and reports whether the index actually moved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageSeries {
    entries: Vec<SeriesEntry>,
    index: usize,
}

impl ImageSeries {
    pub fn new(entries: Vec<SeriesEntry>) -> Self {
        Self { entries, index: 0 }
    }

    pub fn from_paths(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        Self::new(paths.into_iter().map(SeriesEntry::new).collect())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[SeriesEntry] {
        &self.entries
    }

    pub fn index(&self) -> Option<usize> {
        (!self.entries.is_empty()).then_some(self.index)
    }

    pub fn current(&self) -> Option<&SeriesEntry> {
        self.entries.get(self.index)
    }

    pub fn current_path(&self) -> Option<&Path> {
        self.current().map(|entry| entry.path.as_path())
    }

    pub fn last_index(&self) -> usize {
        self.entries.len().saturating_sub(1)
    }

    pub fn next(&mut self) -> bool {
        self.seek(self.index.saturating_add(1))
    }

    pub fn previous(&mut self) -> bool {
        if self.index == 0 {
            return false;
        }
        self.seek(self.index - 1)
    }

    pub fn first(&mut self) -> bool {
        self.seek(0)
    }

    pub fn last(&mut self) -> bool {
        self.seek(self.last_index())
    }

    /// Moves to `index` when it lies inside the series; anything else is a no-op.
    pub fn seek(&mut self, index: usize) -> bool {
        if index >= self.entries.len() || index == self.index {
            return false;
        }
        self.index = index;
        true
    }

    /// Moves by `delta`, clamping to the ends of the series.
    pub fn step(&mut self, delta: i64) -> bool {
        if self.entries.is_empty() {
            return false;
        }
        let target = (self.index as i64)
            .saturating_add(delta)
            .clamp(0, self.last_index() as i64) as usize;
        self.seek(target)
    }

    /// `"3 / 10"`, or `"0 / 0"` for an empty series.
    pub fn position_text(&self) -> String {
        match self.index() {
            Some(index) => format!("{} / {}", index + 1, self.entries.len()),
            None => "0 / 0".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series_of(len: usize) -> ImageSeries {
        ImageSeries::from_paths((0..len).map(|i| PathBuf::from(format!("/data/slice-{i:02}.dcm"))))
    }

    #[test]
    fn previous_at_first_index_is_noop() {
        let mut series = series_of(10);
        assert_eq!(series.index(), Some(0));
        assert!(!series.previous());
        assert_eq!(series.index(), Some(0));
    }

    #[test]
    fn next_at_last_index_is_noop() {
        let mut series = series_of(10);
        assert!(series.last());
        assert_eq!(series.index(), Some(9));
        assert!(!series.next());
        assert_eq!(series.index(), Some(9));
    }

    #[test]
    fn seek_out_of_range_is_ignored() {
        let mut series = series_of(5);
        assert!(series.seek(3));
        assert!(!series.seek(5));
        assert!(!series.seek(usize::MAX));
        assert_eq!(series.index(), Some(3));
        assert!(!series.seek(3));
    }

    #[test]
    fn step_clamps_to_bounds() {
        let mut series = series_of(5);
        assert!(series.step(100));
        assert_eq!(series.index(), Some(4));
        assert!(series.step(-2));
        assert_eq!(series.index(), Some(2));
        assert!(series.step(i64::MIN));
        assert_eq!(series.index(), Some(0));
        assert!(!series.step(-1));
    }

    #[test]
    fn empty_series_has_no_index() {
        let mut series = ImageSeries::default();
        assert_eq!(series.index(), None);
        assert!(series.current().is_none());
        assert!(!series.next());
        assert!(!series.previous());
        assert!(!series.first());
        assert!(!series.last());
        assert!(!series.step(1));
        assert_eq!(series.position_text(), "0 / 0");
    }

    #[test]
    fn entries_keep_insertion_order_and_names() {
        let mut series = series_of(3);
        assert_eq!(series.entries()[1].file_name, "slice-01.dcm");
        assert!(series.next());
        assert_eq!(
            series.current_path(),
            Some(Path::new("/data/slice-01.dcm"))
        );
        assert_eq!(series.position_text(), "2 / 3");
    }
}
